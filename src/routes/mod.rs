use rocket::Route;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};

use crate::store::StoreError;

pub mod agents;
pub mod assets;
pub mod auth;
pub mod custom_fields;

/// API routes
pub fn api_routes() -> Vec<Route> {
    routes![
        // Auth
        auth::login,
        auth::logout,
        auth::me,
        // Assets
        assets::list_assets,
        assets::lookup_asset,
        assets::get_asset,
        assets::create_asset,
        assets::update_asset,
        assets::delete_asset,
        assets::get_changes,
        assets::get_asset_fields,
        assets::set_asset_field,
        // Custom fields
        custom_fields::list_fields,
        custom_fields::fields_for_type,
        custom_fields::get_field,
        custom_fields::create_field,
        custom_fields::update_field,
        custom_fields::delete_field,
        // Agents
        agents::register_agent,
        agents::list_agents,
        agents::revoke_agent,
        agents::push,
    ]
}

pub type ApiError = Custom<Json<Value>>;

pub fn reject(status: Status, code: &str, message: &str) -> ApiError {
    Custom(status, Json(json!({ "error": code, "message": message })))
}

pub fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound => reject(Status::NotFound, "not_found", "Asset not found"),
        StoreError::Db(e) => {
            log::error!("storage failure: {e}");
            reject(
                Status::InternalServerError,
                "storage_error",
                "Storage operation failed",
            )
        }
    }
}

pub fn db_error(e: diesel::result::Error) -> ApiError {
    store_error(StoreError::from(e))
}

pub fn pool_error() -> ApiError {
    reject(
        Status::InternalServerError,
        "storage_error",
        "Failed to get DB connection",
    )
}
