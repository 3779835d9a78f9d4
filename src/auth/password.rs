use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordParams;

fn hasher(params: &PasswordParams) -> anyhow::Result<Argon2<'static>> {
    let params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
        .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(plain: &str, params: &PasswordParams) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(params)?
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Cost parameters are read back from the PHC string, so hashes made under
/// older settings keep verifying.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// What a stored password column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredPassword {
    Argon2,
    /// A hash in some other scheme. The plaintext is unrecoverable, so it is left alone.
    Foreign,
    Plaintext,
}

pub fn classify_stored(value: &str) -> StoredPassword {
    match PasswordHash::new(value) {
        Ok(parsed) if parsed.algorithm.as_str().starts_with("argon2") => StoredPassword::Argon2,
        _ if value.starts_with('$') => StoredPassword::Foreign,
        _ => StoredPassword::Plaintext,
    }
}

#[cfg(test)]
pub(crate) fn cheap_params() -> PasswordParams {
    PasswordParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password, &cheap_params()).expect("hashing should succeed");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password, &cheap_params()).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("secret1", &cheap_params()).unwrap();
        let b = hash_password("secret1", &cheap_params()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn classifies_stored_values() {
        let hash = hash_password("secret1", &cheap_params()).unwrap();
        assert_eq!(classify_stored(&hash), StoredPassword::Argon2);
        assert_eq!(
            classify_stored("$2b$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy"),
            StoredPassword::Foreign
        );
        assert_eq!(classify_stored("hunter22"), StoredPassword::Plaintext);
    }

    #[test]
    fn rejects_impossible_params() {
        let params = PasswordParams {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(hash_password("secret1", &params).is_err());
    }
}
