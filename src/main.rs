use propfeed::{app, logging, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let app_state = AppState::init().await?;
    let app = app::build_app(app_state);

    app::serve(app).await
}
