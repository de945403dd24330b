use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::config::SegmentSettings;
use crate::errors::Result;

/// Wrapper around a Postgres connection pool shared by the stores.
#[derive(Clone)]
pub struct DatabasePool {
    pool: Pool<Postgres>,
}

impl DatabasePool {
    /// Connects to `SEGLINE_DATABASE_URL` with the configured pool size.
    pub async fn connect(settings: &SegmentSettings) -> Result<Self> {
        let url = settings.require_database_url()?;
        let pool = pool_options(settings.max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    /// Connects to a database URL with the default pool size.
    pub async fn connect_with_url(database_url: &str) -> Result<Self> {
        let max_connections = SegmentSettings::default().max_connections;
        let pool = pool_options(max_connections).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn inner(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
}

/// Implemented by stores that own database migrations.
#[async_trait]
pub trait DatabaseMigrator {
    async fn run_migrations(&self, pool: &DatabasePool) -> Result<()>;
}

/// Run migrations by delegating to the provided migrators.
pub async fn run_migrations(
    pool: &DatabasePool,
    migrators: &[Box<dyn DatabaseMigrator + Send + Sync>],
) -> Result<()> {
    for migrator in migrators {
        migrator.run_migrations(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingMigrator(Arc<AtomicUsize>);

    #[async_trait]
    impl DatabaseMigrator for CountingMigrator {
        async fn run_migrations(&self, _pool: &DatabasePool) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn runs_all_migrators() {
        let lazy = pool_options(1)
            .connect_lazy("postgres://localhost/postgres")
            .unwrap();
        let pool = DatabasePool { pool: lazy };
        let counter = Arc::new(AtomicUsize::new(0));
        let migrators: Vec<Box<dyn DatabaseMigrator + Send + Sync>> = vec![
            Box::new(CountingMigrator(counter.clone())),
            Box::new(CountingMigrator(counter.clone())),
        ];
        run_migrations(&pool, &migrators)
            .await
            .expect("should run migrations");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connect_requires_database_url() {
        let err = DatabasePool::connect(&SegmentSettings::default())
            .await
            .err()
            .expect("missing url must fail");
        assert!(err.to_string().contains("SEGLINE_DATABASE_URL"));
    }
}
