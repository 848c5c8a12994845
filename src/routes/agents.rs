use chrono::Utc;
use rocket::State;
use rocket::http::Status;
use rocket::serde::json::Json;
use serde_json::{Value, json};

use crate::agents;
use crate::auth::{AgentToken, AuthUser};
use crate::db::DbPool;
use crate::models::Agent;
use crate::reconcile::{self, PushError, PushOutcome};
use crate::routes::{ApiError, db_error, pool_error, reject};

#[post("/agents", data = "<body>")]
pub async fn register_agent(
    pool: &State<DbPool>,
    user: AuthUser,
    body: Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !user.is_admin() {
        return Err(reject(
            Status::Forbidden,
            "forbidden",
            "Only admins may register agents",
        ));
    }
    let name = body.get("name").and_then(Value::as_str).unwrap_or("agent");
    let platform = body
        .get("platform")
        .and_then(Value::as_str)
        .unwrap_or("linux");
    let bound_asset = body.get("bound_asset").and_then(Value::as_str);

    let mut conn = pool.get().map_err(|_| pool_error())?;
    let agent = agents::register(&mut conn, name, platform, bound_asset).map_err(db_error)?;
    log::info!("agent {} registered by {}", agent.name, user.username);
    Ok(Json(json!({ "id": agent.id, "token": agent.token })))
}

#[get("/agents")]
pub async fn list_agents(
    pool: &State<DbPool>,
    _user: AuthUser,
) -> Result<Json<Vec<Agent>>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let rows = agents::list(&mut conn).map_err(db_error)?;
    Ok(Json(rows))
}

#[post("/agents/<agent_id>/revoke")]
pub async fn revoke_agent(
    pool: &State<DbPool>,
    user: AuthUser,
    agent_id: i32,
) -> Result<Json<Value>, ApiError> {
    if !user.is_admin() {
        return Err(reject(
            Status::Forbidden,
            "forbidden",
            "Only admins may revoke agents",
        ));
    }
    let mut conn = pool.get().map_err(|_| pool_error())?;
    let updated = agents::revoke(&mut conn, agent_id).map_err(db_error)?;
    if updated == 0 {
        return Err(reject(Status::NotFound, "not_found", "Unknown agent"));
    }
    Ok(Json(json!({ "success": true })))
}

/// Agent/poller push endpoint. Token auth strictly precedes reconciliation:
/// an inactive or unknown token never reaches the merge logic.
#[post("/push", data = "<payload>")]
pub async fn push(
    pool: &State<DbPool>,
    token: AgentToken,
    payload: Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;

    let Some(agent) = agents::find_by_token(&mut conn, &token.0).map_err(db_error)? else {
        return Err(reject(
            Status::Unauthorized,
            "invalid_agent_token",
            "Unknown or revoked agent token",
        ));
    };

    match reconcile::submit_push(&mut conn, &agent, &payload) {
        Ok(PushOutcome::Updated { changed, .. }) => {
            Ok(Json(json!({ "ok": true, "changed": changed })))
        }
        Ok(PushOutcome::Created { asset_id }) => {
            Ok(Json(json!({ "success": true, "id": asset_id })))
        }
        Err(e) => Err(push_error(e)),
    }
}

fn push_error(e: PushError) -> ApiError {
    let timestamp = Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S");
    match e {
        PushError::InvalidPayload(msg) => reject(Status::BadRequest, "invalid_payload", msg),
        PushError::ProbeFailed(msg) => {
            log::warn!("push rejected, probe failed: {msg}");
            rocket::response::status::Custom(
                Status::UnprocessableEntity,
                Json(json!({
                    "error": "probe_failed",
                    "message": msg,
                    "timestamp": timestamp.to_string(),
                })),
            )
        }
        PushError::EmptyUpdate => rocket::response::status::Custom(
            Status::UnprocessableEntity,
            Json(json!({
                "error": "empty_update",
                "message": "Probe did not collect any asset changes; update rejected",
                "timestamp": timestamp.to_string(),
            })),
        ),
        PushError::NotFound => reject(Status::NotFound, "not_found", "Asset not found"),
        PushError::Db(e) => {
            log::error!("push storage failure: {e}");
            reject(
                Status::InternalServerError,
                "storage_error",
                "Storage operation failed",
            )
        }
    }
}
