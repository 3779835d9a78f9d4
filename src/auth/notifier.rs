use async_trait::async_trait;
use tracing::info;

/// Delivers password-reset links. Email delivery lives behind this seam.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset_link(&self, email: &str, reset_url: &str) -> anyhow::Result<()>;
}

/// Writes the link to the log instead of sending mail.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset_link(&self, email: &str, reset_url: &str) -> anyhow::Result<()> {
        info!(%email, %reset_url, "password reset requested");
        Ok(())
    }
}

/// Keeps every link it is handed. Used by tests to read the issued token.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn last_token(&self) -> Option<String> {
        let sent = self.sent.lock().ok()?;
        let (_, url) = sent.last()?;
        url.split("token=").nth(1).map(str::to_string)
    }
}

#[cfg(test)]
#[async_trait]
impl ResetNotifier for RecordingNotifier {
    async fn send_reset_link(&self, email: &str, reset_url: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("notifier lock poisoned"))?
            .push((email.to_string(), reset_url.to_string()));
        Ok(())
    }
}
