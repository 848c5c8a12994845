use bcrypt::verify;
use diesel::prelude::*;
use rocket::State;
use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use serde_json::{Value, json};

use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::models::{LoginRequest, User};
use crate::routes::{ApiError, pool_error, reject};
use crate::schema::users;

/// Handle login POST
#[post("/login", data = "<body>")]
pub async fn login(
    pool: &State<DbPool>,
    cookies: &CookieJar<'_>,
    body: Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut conn = pool.get().map_err(|_| pool_error())?;

    let user: Option<User> = users::table
        .filter(users::username.eq(&body.username))
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|_| pool_error())?;

    if let Some(user) = user {
        if verify(&body.password, &user.password_hash).unwrap_or(false) {
            cookies.add_private(Cookie::new("user_id", user.id.to_string()));
            log::info!("user {} logged in", user.username);
            return Ok(Json(json!({
                "success": true,
                "user": {
                    "id": user.id,
                    "username": user.username,
                    "display_name": user.display_name,
                    "role": user.role,
                }
            })));
        }
    }

    Err(reject(
        Status::Unauthorized,
        "invalid_credentials",
        "Unknown username or wrong password",
    ))
}

/// Handle logout
#[post("/logout")]
pub async fn logout(cookies: &CookieJar<'_>) -> Json<Value> {
    cookies.remove_private(Cookie::from("user_id"));
    Json(json!({ "success": true }))
}

/// Current session identity
#[get("/me")]
pub async fn me(user: AuthUser) -> Json<Value> {
    Json(json!({
        "id": user.id,
        "username": user.username,
        "role": user.role,
    }))
}
