use rocket::State;
use rocket::http::Status;
use rocket::serde::json::Json;
use serde_json::{Value, json};

use crate::auth::AuthUser;
use crate::custom_fields;
use crate::db::DbPool;
use crate::models::Change;
use crate::routes::{ApiError, db_error, pool_error, reject, store_error};
use crate::store::{self, Actor, AssetPatch, AssetView};

/// List assets, optionally filtered by a substring search on name/MAC/id.
#[get("/assets?<search>")]
pub async fn list_assets(
    pool: &State<DbPool>,
    _user: AuthUser,
    search: Option<String>,
) -> Result<Json<Vec<AssetView>>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let rows = store::list_assets(&mut conn, search.as_deref()).map_err(store_error)?;
    Ok(Json(rows))
}

/// Resolve assets by IP and/or MAC. The IP parameter accepts several
/// addresses separated by whitespace or commas; MAC matching ignores
/// separator style.
#[get("/assets/lookup?<ip>&<mac>")]
pub async fn lookup_asset(
    pool: &State<DbPool>,
    _user: AuthUser,
    ip: Option<String>,
    mac: Option<String>,
) -> Result<Json<Value>, ApiError> {
    let ip_param = ip.as_deref().unwrap_or("").trim().to_string();
    let mac_param = mac.as_deref().unwrap_or("").trim().to_string();
    if ip_param.is_empty() && mac_param.is_empty() {
        return Err(reject(
            Status::BadRequest,
            "invalid_query",
            "Provide an ip or mac query parameter",
        ));
    }

    let mut conn = pool.get().map_err(|_| pool_error())?;

    let mut candidates: Vec<String> = Vec::new();
    for raw in ip_param.split([' ', '\t', '\n', ',']) {
        let c = raw.trim();
        if !c.is_empty() && !candidates.iter().any(|x| x == c) {
            candidates.push(c.to_string());
        }
    }

    let mut matched: Vec<String> = Vec::new();
    for candidate in &candidates {
        for id in store::find_ids_by_ip(&mut conn, candidate).map_err(db_error)? {
            if !matched.contains(&id) {
                matched.push(id);
            }
        }
    }

    let mut mac_normalized: Option<String> = None;
    if !mac_param.is_empty() {
        let normalized = store::normalize_mac(&mac_param);
        if normalized.len() >= 12 {
            for id in
                store::find_ids_by_normalized_mac(&mut conn, &normalized).map_err(db_error)?
            {
                if !matched.contains(&id) {
                    matched.push(id);
                }
            }
            mac_normalized = Some(normalized);
        }
    }

    if matched.is_empty() {
        let mut parts = Vec::new();
        if !ip_param.is_empty() {
            parts.push(format!("IP: {ip_param}"));
        }
        if !mac_param.is_empty() {
            parts.push(format!("MAC: {mac_param}"));
        }
        return Err(reject(
            Status::NotFound,
            "not_found",
            &format!("No asset found for {}", parts.join(" or ")),
        ));
    }

    let mut found = Vec::new();
    for id in &matched {
        if let Ok(view) = store::get_asset(&mut conn, id) {
            found.push(view);
        }
    }
    if found.is_empty() {
        return Err(reject(
            Status::NotFound,
            "not_found",
            "Assets were matched but could not be loaded",
        ));
    }

    let single = if found.len() == 1 {
        Some(serde_json::to_value(&found[0]).unwrap_or(Value::Null))
    } else {
        None
    };
    let mut response = json!({
        "count": found.len(),
        "assets": found,
        "query": { "ip": candidates, "mac": mac_normalized },
    });
    if let Some(asset) = single {
        response["asset"] = asset;
    }
    Ok(Json(response))
}

/// Full asset snapshot: record, IPs, attributes, custom fields and changes.
#[get("/assets/<id>")]
pub async fn get_asset(
    pool: &State<DbPool>,
    _user: AuthUser,
    id: &str,
) -> Result<Json<AssetView>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let view = store::get_asset(&mut conn, id).map_err(store_error)?;
    Ok(Json(view))
}

#[post("/assets", data = "<body>")]
pub async fn create_asset(
    pool: &State<DbPool>,
    user: AuthUser,
    body: Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let data = AssetPatch::from_value(&body);
    let id = store::create_asset(&mut conn, &data, Actor::manual(&user.username))
        .map_err(store_error)?;
    Ok(Json(json!({ "success": true, "id": id })))
}

#[put("/assets/<id>", data = "<body>")]
pub async fn update_asset(
    pool: &State<DbPool>,
    user: AuthUser,
    id: &str,
    body: Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let patch = AssetPatch::from_value(&body);
    let changed = store::update_asset(&mut conn, id, &patch, Actor::manual(&user.username))
        .map_err(store_error)?;
    Ok(Json(json!({ "success": true, "changed": changed })))
}

/// Deleting an asset is an admin action; it takes the whole history with it.
#[delete("/assets/<id>")]
pub async fn delete_asset(
    pool: &State<DbPool>,
    user: AuthUser,
    id: &str,
) -> Result<Json<Value>, ApiError> {
    if !user.is_admin() {
        return Err(reject(
            Status::Forbidden,
            "forbidden",
            "Only admins may delete assets",
        ));
    }
    let mut conn = pool.get().map_err(|_| pool_error())?;
    store::delete_asset(&mut conn, id).map_err(store_error)?;
    log::info!("asset {} deleted by {}", id, user.username);
    Ok(Json(json!({ "ok": true })))
}

/// Change feed for one asset, newest first, capped at 200 entries.
#[get("/assets/<id>/changes")]
pub async fn get_changes(
    pool: &State<DbPool>,
    _user: AuthUser,
    id: &str,
) -> Result<Json<Vec<Change>>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let rows = store::get_changes(&mut conn, id).map_err(db_error)?;
    Ok(Json(rows))
}

/// Custom field values for one asset (all defined fields, value or null).
#[get("/assets/<id>/fields")]
pub async fn get_asset_fields(
    pool: &State<DbPool>,
    _user: AuthUser,
    id: &str,
) -> Result<Json<Vec<Value>>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let rows = custom_fields::values_for_asset(&mut conn, id).map_err(db_error)?;
    Ok(Json(rows))
}

#[put("/assets/<id>/fields/<field_id>", data = "<body>")]
pub async fn set_asset_field(
    pool: &State<DbPool>,
    _user: AuthUser,
    id: &str,
    field_id: i32,
    body: Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let value = body.get("value").and_then(Value::as_str);
    custom_fields::set_value(&mut conn, id, field_id, value).map_err(db_error)?;
    Ok(Json(json!({ "message": "Value saved" })))
}
