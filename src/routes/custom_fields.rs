use rocket::State;
use rocket::http::Status;
use rocket::serde::json::Json;
use serde_json::{Value, json};

use crate::auth::AuthUser;
use crate::custom_fields as engine;
use crate::db::DbPool;
use crate::routes::{ApiError, db_error, pool_error, reject, store_error};

#[get("/custom-fields")]
pub async fn list_fields(
    pool: &State<DbPool>,
    _user: AuthUser,
) -> Result<Json<Vec<Value>>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let rows = engine::list_fields(&mut conn).map_err(db_error)?;
    Ok(Json(rows.iter().map(engine::field_to_json).collect()))
}

/// Fields applicable to one asset type (exact match or global).
#[get("/custom-fields/for-type/<asset_type>")]
pub async fn fields_for_type(
    pool: &State<DbPool>,
    _user: AuthUser,
    asset_type: &str,
) -> Result<Json<Vec<Value>>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let rows = engine::fields_for_type(&mut conn, asset_type).map_err(db_error)?;
    Ok(Json(rows.iter().map(engine::field_to_json).collect()))
}

#[get("/custom-fields/<id>")]
pub async fn get_field(
    pool: &State<DbPool>,
    _user: AuthUser,
    id: i32,
) -> Result<Json<Value>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let field = engine::get_field(&mut conn, id).map_err(store_error)?;
    Ok(Json(engine::field_to_json(&field)))
}

#[post("/custom-fields", data = "<body>")]
pub async fn create_field(
    pool: &State<DbPool>,
    user: AuthUser,
    body: Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let id = engine::create_field(&mut conn, &body).map_err(store_error)?;
    Ok(Json(json!({ "id": id, "message": "Custom field created" })))
}

#[put("/custom-fields/<id>", data = "<body>")]
pub async fn update_field(
    pool: &State<DbPool>,
    user: AuthUser,
    id: i32,
    body: Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let mut conn = pool.get().map_err(|_| pool_error())?;
    engine::update_field(&mut conn, id, &body).map_err(store_error)?;
    Ok(Json(json!({ "message": "Custom field updated" })))
}

#[delete("/custom-fields/<id>")]
pub async fn delete_field(
    pool: &State<DbPool>,
    user: AuthUser,
    id: i32,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let mut conn = pool.get().map_err(|_| pool_error())?;
    engine::delete_field(&mut conn, id).map_err(store_error)?;
    Ok(Json(json!({ "message": "Custom field deleted" })))
}

fn require_admin(user: &AuthUser) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(reject(
            Status::Forbidden,
            "forbidden",
            "Only admins may manage custom fields",
        ))
    }
}
