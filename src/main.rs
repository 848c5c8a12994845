#[macro_use]
extern crate rocket;

use rocket::http::Status;
use rocket::serde::json::Json;
use serde_json::{Value, json};

mod agents;
mod auth;
mod custom_fields;
mod db;
mod models;
mod reconcile;
mod routes;
mod schema;
mod store;

#[catch(401)]
fn unauthorized() -> Json<Value> {
    Json(json!({ "error": "not_authenticated" }))
}

#[catch(403)]
fn forbidden() -> Json<Value> {
    Json(json!({ "error": "forbidden" }))
}

#[catch(404)]
fn not_found() -> Json<Value> {
    Json(json!({ "error": "not_found" }))
}

#[catch(422)]
fn unprocessable() -> Json<Value> {
    Json(json!({ "error": "invalid_payload" }))
}

#[catch(default)]
fn internal_error(status: Status, _req: &rocket::Request<'_>) -> Json<Value> {
    Json(json!({ "error": "server_error", "status": status.code }))
}

/// Run pending migrations and seed the default admin on an empty database.
fn bootstrap(pool: &db::DbPool) -> anyhow::Result<()> {
    use diesel_migrations::MigrationHarness;

    let mut conn = pool.get()?;
    conn.run_pending_migrations(db::MIGRATIONS)
        .map_err(|e| anyhow::anyhow!(e))?;
    db::create_default_admin(&mut conn)?;
    Ok(())
}

#[launch]
fn rocket() -> _ {
    db::init_logger();

    let pool = db::init_pool();
    bootstrap(&pool).expect("Failed to initialize database");

    rocket::build()
        .manage(pool)
        .mount("/api", routes::api_routes())
        .register(
            "/",
            catchers![
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                internal_error
            ],
        )
}
