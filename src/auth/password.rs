use std::sync::Arc;

use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;

/// Argon2id hasher with fixed cost parameters.
#[derive(Clone)]
pub struct Passwords {
    params: Params,
    /// Hash checked against when no user matches, so a miss costs as much
    /// as a wrong password.
    dummy_hash: Arc<str>,
}

impl Passwords {
    pub fn new(cfg: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let mut passwords = Self {
            params,
            dummy_hash: Arc::from(""),
        };
        passwords.dummy_hash = Arc::from(passwords.hash("not-a-real-password")?);
        Ok(passwords)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes with a fresh random salt; the result is a PHC string.
    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` on mismatch; `Err` only when `hash` is not a valid PHC string.
    /// Params and salt are taken from the stored hash.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// Runs a full verify against the dummy hash. Always `Ok(false)` unless
    /// the dummy hash is broken.
    pub fn verify_dummy(&self, plain: &str) -> anyhow::Result<bool> {
        self.verify(plain, &self.dummy_hash).map(|_| false)
    }

    /// [`hash`](Self::hash) on the blocking pool.
    pub async fn hash_blocking(&self, plain: String) -> anyhow::Result<String> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.hash(&plain))
            .await
            .context("hash task panicked")?
    }

    /// [`verify`](Self::verify) on the blocking pool. With `hash: None` the
    /// dummy hash is checked and the result is always `false`.
    pub async fn verify_blocking(
        &self,
        plain: String,
        hash: Option<String>,
    ) -> anyhow::Result<bool> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => this.verify(&plain, &hash),
            None => this.verify_dummy(&plain),
        })
        .await
        .context("verify task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Passwords {
        Passwords::new(&PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .expect("params")
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let pw = Passwords::new(&PasswordConfig::default()).expect("default params");
        let hash = pw.hash("secret1").expect("hashing should succeed");
        assert!(pw.verify("secret1", &hash).expect("verify should succeed"));
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let pw = cheap();
        let hash = pw.hash("correct-horse-battery-staple").expect("hash");
        assert!(!pw.verify("wrong-password", &hash).expect("verify should not error"));
        assert!(!pw.verify("", &hash).expect("verify should not error"));
    }

    #[test]
    fn same_password_hashes_differ() {
        let pw = cheap();
        let a = pw.hash("secret1").expect("hash a");
        let b = pw.hash("secret1").expect("hash b");
        assert_ne!(a, b);
        assert!(pw.verify("secret1", &a).expect("verify a"));
        assert!(pw.verify("secret1", &b).expect("verify b"));
    }

    #[test]
    fn verify_uses_params_embedded_in_hash() {
        let hash = cheap().hash("secret1").expect("hash");
        let pw = Passwords::new(&PasswordConfig::default()).expect("default params");
        assert!(pw.verify("secret1", &hash).expect("verify"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = cheap().verify("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn rejects_invalid_params() {
        let cfg = PasswordConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(Passwords::new(&cfg).is_err());
    }

    #[test]
    fn dummy_hash_uses_configured_params_and_never_matches() {
        let pw = cheap();
        let parsed = PasswordHash::new(&pw.dummy_hash).expect("dummy hash is a PHC string");
        assert_eq!(parsed.params.get_decimal("m"), Some(1024));
        assert_eq!(parsed.params.get_decimal("t"), Some(1));
        assert!(!pw.verify_dummy("not-a-real-password").expect("verify dummy"));
        assert!(!pw.verify_dummy("secret1").expect("verify dummy"));
    }

    #[tokio::test]
    async fn blocking_variants_match_sync_ones() {
        let pw = cheap();
        let hash = pw.hash_blocking("secret1".into()).await.expect("hash");
        assert!(pw
            .verify_blocking("secret1".into(), Some(hash.clone()))
            .await
            .expect("verify"));
        assert!(!pw
            .verify_blocking("secret2".into(), Some(hash))
            .await
            .expect("verify"));
        assert!(!pw
            .verify_blocking("secret1".into(), None)
            .await
            .expect("verify dummy"));
    }
}
