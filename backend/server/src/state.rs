use std::sync::Arc;

use ai::{Nutritionist, nutritionist};
use deadpool_postgres::Pool;
use tracing::info;

use super::{
    auth::{Authenticator, DbAuth, JsonAuth},
    config::{AuthBackend, Config},
    database::{init_pool, migrate},
    error::AppError,
};

pub struct AppState {
    pub config: Config,
    pub pool: Pool,
    pub auth: Arc<dyn Authenticator>,
    pub nutritionist: Arc<dyn Nutritionist>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, AppError> {
        let pool = init_pool(&config.postgres).await?;
        migrate(&pool, config.auth_backend).await?;

        let auth: Arc<dyn Authenticator> = match config.auth_backend {
            AuthBackend::Postgres => Arc::new(DbAuth::new(pool.clone(), config.bcrypt_cost)),
            AuthBackend::Json => Arc::new(
                JsonAuth::open(config.users_file.clone(), config.bcrypt_cost).await?,
            ),
        };
        info!("Auth backend: {:?}", config.auth_backend);

        let nutritionist = nutritionist(&config.ai);
        info!("AI provider: {}", config.ai.provider);

        Ok(Arc::new(Self {
            config,
            pool,
            auth,
            nutritionist,
        }))
    }
}
