//! Shared test infrastructure: one Postgres container, reused across all
//! integration tests, migrated once on first use.

use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct SharedPostgres {
    db_url: String,
    _container: ContainerAsync<Postgres>,
}

static SHARED: OnceCell<SharedPostgres> = OnceCell::const_new();

async fn shared() -> &'static SharedPostgres {
    SHARED
        .get_or_init(|| async {
            let container = Postgres::default()
                .start()
                .await
                .expect("failed to start postgres container");
            let host = container.get_host().await.expect("container host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("container port");
            let db_url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

            let pool = PgPool::connect(&db_url)
                .await
                .expect("failed to connect for migrations");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("failed to run migrations");
            pool.close().await;

            SharedPostgres {
                db_url,
                _container: container,
            }
        })
        .await
}

/// A fresh connection pool against the shared, already-migrated database.
pub async fn pool() -> PgPool {
    let infra = shared().await;
    PgPool::connect(&infra.db_url)
        .await
        .expect("failed to connect test pool")
}
