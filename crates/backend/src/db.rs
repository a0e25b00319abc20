use diesel::prelude::*;
use diesel_async::{
    async_connection_wrapper::AsyncConnectionWrapper,
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use shared_types::User;
use uuid::Uuid;

use crate::models::NewUser;

pub type DbPool = Pool<AsyncPgConnection>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn install_crypto_provider() {
    // rustls needs a process-wide crypto provider; a second install is a no-op error
    let _ = rustls::crypto::ring::default_provider().install_default();
}

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    // sslmode=prefer (the default) falls back to plaintext for local servers
    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    install_crypto_provider();

    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

/// Dedicated connection for the sync migration harness, which must run off
/// the async workers.
async fn migration_connection(
    database_url: &str,
) -> anyhow::Result<AsyncConnectionWrapper<AsyncPgConnection>> {
    install_crypto_provider();
    let conn = establish_tls_connection(database_url.to_string()).await?;
    Ok(AsyncConnectionWrapper::from(conn))
}

/// Apply every pending embedded migration. Returns the versions applied.
pub async fn run_migrations(database_url: &str) -> anyhow::Result<Vec<String>> {
    let mut conn = migration_connection(database_url).await?;

    tokio::task::spawn_blocking(move || {
        conn.run_pending_migrations(MIGRATIONS)
            .map(|versions| versions.iter().map(ToString::to_string).collect())
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))
    })
    .await?
}

/// Revert the most recently applied migration. Returns its version.
pub async fn revert_last_migration(database_url: &str) -> anyhow::Result<String> {
    let mut conn = migration_connection(database_url).await?;

    tokio::task::spawn_blocking(move || {
        conn.revert_last_migration(MIGRATIONS)
            .map(|version| version.to_string())
            .map_err(|e| anyhow::anyhow!("Failed to revert migration: {}", e))
    })
    .await?
}

// User database operations
pub mod users {
    use super::*;

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> QueryResult<Option<User>> {
        use crate::schema::users::dsl::*;

        users
            .filter(id.eq(user_id))
            .first::<User>(conn)
            .await
            .optional()
    }

    pub async fn get_by_email(
        conn: &mut AsyncPgConnection,
        email_val: &str,
    ) -> QueryResult<Option<User>> {
        use crate::schema::users::dsl::*;

        users
            .filter(email.eq(email_val))
            .first::<User>(conn)
            .await
            .optional()
    }

    pub async fn create(
        conn: &mut AsyncPgConnection,
        email_val: &str,
        full_name_val: Option<&str>,
    ) -> QueryResult<User> {
        use crate::schema::users::dsl::*;

        diesel::insert_into(users)
            .values(NewUser::new(email_val, full_name_val))
            .get_result::<User>(conn)
            .await
    }

    /// Insert unless a row with this email exists, then read the winning row.
    ///
    /// A single statement decides the race between concurrent first logins,
    /// so neither caller sees a unique violation.
    pub async fn upsert_by_email(
        conn: &mut AsyncPgConnection,
        email_val: &str,
        full_name_val: Option<&str>,
    ) -> QueryResult<User> {
        use crate::schema::users::dsl::*;

        diesel::insert_into(users)
            .values(NewUser::new(email_val, full_name_val))
            .on_conflict(email)
            .do_nothing()
            .execute(conn)
            .await?;

        users
            .filter(email.eq(email_val))
            .first::<User>(conn)
            .await
    }
}
