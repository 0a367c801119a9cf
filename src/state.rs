use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        password::Passwords,
        repo::{MemoryUserStore, PgUserStore, UserStore},
    },
    config::{AppConfig, JwtConfig, PasswordConfig, StorageBackend},
    db,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub keys: JwtKeys,
    pub passwords: Passwords,
}

impl AppState {
    /// Builds state from config, picking the user store once for the
    /// lifetime of the process.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match (config.storage, config.database_url.as_deref()) {
            (StorageBackend::Postgres, Some(url)) => {
                let pool = db::connect(url).await?;
                db::migrate(&pool).await?;
                info!("using postgres user store");
                Arc::new(PgUserStore::new(pool))
            }
            (StorageBackend::Postgres, None) => {
                anyhow::bail!("postgres storage selected without DATABASE_URL")
            }
            (StorageBackend::Memory, _) => {
                warn!("using in-memory user store; accounts are lost on restart");
                MemoryUserStore::shared()
            }
        };

        if config.jwt.secret_is_fallback {
            warn!("JWT_SECRET is not set; signing tokens with the built-in fallback secret");
        }

        Self::from_parts(&config, store)
    }

    pub fn from_parts(config: &AppConfig, store: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let keys = JwtKeys::new(&config.jwt);
        let passwords = Passwords::new(&config.password)?;
        Ok(Self {
            store,
            keys,
            passwords,
        })
    }

    /// State over the given store with a fixed secret and cheap hashing
    /// parameters.
    pub fn for_tests(store: Arc<dyn UserStore>) -> Self {
        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            storage: store.backend(),
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                secret_is_fallback: false,
                ttl_minutes: 60 * 24,
            },
            password: PasswordConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        };
        Self::from_parts(&config, store).expect("valid test config")
    }
}
