use diesel::prelude::*;
use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};

use crate::db::DbPool;
use crate::models::User;
use crate::schema::users;

/// Authenticated session user, resolved from the private session cookie.
/// Threaded into handlers as an explicit parameter so ledger attribution
/// never depends on ambient state.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, ()> {
        let Some(pool) = req.rocket().state::<DbPool>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        let Some(uid) = req
            .cookies()
            .get_private("user_id")
            .and_then(|c| c.value().parse::<i32>().ok())
        else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let Ok(mut conn) = pool.get() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        match users::table
            .find(uid)
            .select(User::as_select())
            .first(&mut conn)
            .optional()
        {
            Ok(Some(u)) => Outcome::Success(AuthUser {
                id: u.id,
                username: u.username,
                role: u.role,
            }),
            _ => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

/// Raw bearer token from the `X-Agent-Token` header. Resolution against the
/// registry happens in the handler so rejections carry a typed reason body.
pub struct AgentToken(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AgentToken {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, ()> {
        let token = req.headers().get_one("X-Agent-Token").unwrap_or_default();
        Outcome::Success(AgentToken(token.to_string()))
    }
}
