use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    auth::{jwt::JwtKeys, password::Passwords, repo::UserRepo, services::AuthService},
    config::AppConfig,
    db::PgStore,
    memory::MemoryStore,
    recipes::{repo::RecipeRepo, services::RecipeService},
    storage::{LocalMediaStore, MediaStore},
};

/// `DATABASE_URL` prefix that selects the in-process store.
pub const MEMORY_URL_SCHEME: &str = "memory:";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub users: Arc<dyn UserRepo>,
    pub media: Arc<dyn MediaStore>,
    pub auth: AuthService,
    pub recipes: RecipeService,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let (users, recipes): (Arc<dyn UserRepo>, Arc<dyn RecipeRepo>) =
            if config.database_url.starts_with(MEMORY_URL_SCHEME) {
                warn!("using in-memory store; data is lost on exit");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn UserRepo>, store as Arc<dyn RecipeRepo>)
            } else {
                let store = Arc::new(PgStore::connect(&config.database_url).await?);
                store.migrate().await?;
                info!("database ready");
                (store.clone() as Arc<dyn UserRepo>, store as Arc<dyn RecipeRepo>)
            };

        let media = Arc::new(LocalMediaStore::new(&config.upload_dir).await?) as Arc<dyn MediaStore>;
        let passwords = Passwords::new(config.password)?;

        Ok(Self::from_parts(config, users, recipes, media, passwords))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepo>,
        recipes: Arc<dyn RecipeRepo>,
        media: Arc<dyn MediaStore>,
        passwords: Passwords,
    ) -> Self {
        let keys = JwtKeys::new(&config.jwt);
        let auth = AuthService::new(users.clone(), passwords, keys.clone());
        let recipes = RecipeService::new(recipes, users.clone());
        Self {
            config,
            keys,
            users,
            media,
            auth,
            recipes,
        }
    }

    /// State backed by the in-memory store and a throwaway upload dir.
    #[cfg(test)]
    pub async fn fake(upload_dir: &std::path::Path) -> Self {
        use crate::config::{JwtConfig, PasswordConfig};

        let config = Arc::new(AppConfig {
            database_url: "memory://".into(),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            password: PasswordConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            host: "127.0.0.1".into(),
            port: 0,
            upload_dir: upload_dir.display().to_string(),
            max_upload_bytes: 1024 * 1024,
            cors_origin: "http://localhost:3000".into(),
        });

        let store = Arc::new(MemoryStore::new());
        let media = Arc::new(
            LocalMediaStore::new(upload_dir)
                .await
                .expect("create upload dir"),
        ) as Arc<dyn MediaStore>;
        let passwords = Passwords::new(config.password).expect("cheap argon2 params");

        Self::from_parts(config, store.clone(), store, media, passwords)
    }
}
