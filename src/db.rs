use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use flexi_logger::{Age, Cleanup, Criterion, FileSpec, Logger, Naming};
use std::env;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

diesel::define_sql_function! {
    fn last_insert_rowid() -> diesel::sql_types::Integer;
}

/// Initialize file logger with daily rotation
pub fn init_logger() {
    Logger::try_with_str("info")
        .unwrap()
        .log_to_file(FileSpec::default().directory("logs"))
        .rotate(
            Criterion::Age(Age::Day),
            Naming::Numbers,
            Cleanup::KeepLogFiles(7),
        )
        .start()
        .unwrap();
}

/// Initialize DB connection pool
pub fn init_pool() -> DbPool {
    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "assettrail.db".to_string());
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .build(manager)
        .expect("Failed to create DB pool")
}

/// Id of the last row inserted on this connection.
pub fn last_insert_id(conn: &mut SqliteConnection) -> QueryResult<i32> {
    diesel::select(last_insert_rowid()).get_result(conn)
}

/// Create default admin user if DB is empty
pub fn create_default_admin(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    use crate::schema::users::dsl::*;

    let count: i64 = users.count().get_result(conn)?;
    if count == 0 {
        let hash = bcrypt::hash("admin123", bcrypt::DEFAULT_COST)
            .map_err(|_| diesel::result::Error::RollbackTransaction)?;

        diesel::insert_into(users)
            .values((
                username.eq("admin"),
                password_hash.eq(hash),
                display_name.eq("Local Admin"),
                role.eq("admin"),
            ))
            .execute(conn)?;

        log::info!("default admin created (admin / admin123), change the password");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_conn() -> SqliteConnection {
    use diesel_migrations::MigrationHarness;

    let mut conn = SqliteConnection::establish(":memory:").expect("in-memory sqlite");
    conn.run_pending_migrations(MIGRATIONS).expect("migrations");
    conn
}
