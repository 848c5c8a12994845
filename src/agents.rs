//! Agent registry: bearer tokens, registration and revocation. Token checks
//! happen before any asset data is touched.

use chrono::Utc;
use diesel::prelude::*;
use rand::RngCore;

use crate::models::{Agent, NewAgent};
use crate::schema::agents;

/// 24 random bytes, hex encoded. Generated once at registration and never
/// rotated automatically.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn register(
    conn: &mut SqliteConnection,
    name: &str,
    platform: &str,
    bound_asset: Option<&str>,
) -> QueryResult<Agent> {
    let token = generate_token();
    let new_agent = NewAgent {
        name,
        token: &token,
        platform,
        bound_asset,
        status: "active",
        created_at: Utc::now().naive_utc(),
    };
    diesel::insert_into(agents::table)
        .values(&new_agent)
        .execute(conn)?;
    agents::table
        .filter(agents::token.eq(&token))
        .select(Agent::as_select())
        .first(conn)
}

/// Look up an active agent by bearer token, bumping its last-contact
/// timestamp. Unknown and revoked tokens both come back as `None`.
pub fn find_by_token(conn: &mut SqliteConnection, token: &str) -> QueryResult<Option<Agent>> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let agent: Option<Agent> = agents::table
        .filter(agents::token.eq(trimmed))
        .filter(agents::status.eq("active"))
        .select(Agent::as_select())
        .first(conn)
        .optional()?;

    if let Some(a) = &agent {
        diesel::update(agents::table.find(a.id))
            .set(agents::last_seen.eq(Utc::now().naive_utc()))
            .execute(conn)?;
    }
    Ok(agent)
}

pub fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Agent>> {
    agents::table
        .order(agents::created_at.desc())
        .select(Agent::as_select())
        .load(conn)
}

pub fn revoke(conn: &mut SqliteConnection, agent_id: i32) -> QueryResult<usize> {
    diesel::update(agents::table.find(agent_id))
        .set(agents::status.eq("revoked"))
        .execute(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_conn;

    #[test]
    fn token_is_48_hex_chars() {
        let tok = generate_token();
        assert_eq!(tok.len(), 48);
        assert!(tok.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(tok, generate_token());
    }

    #[test]
    fn lookup_bumps_last_seen() {
        let mut conn = test_conn();
        let agent = register(&mut conn, "probe", "linux", None).unwrap();
        assert!(agent.last_seen.is_none());

        let found = find_by_token(&mut conn, &agent.token).unwrap().unwrap();
        assert_eq!(found.id, agent.id);

        let again = find_by_token(&mut conn, &agent.token).unwrap().unwrap();
        assert!(again.last_seen.is_some());
    }

    #[test]
    fn revoked_and_unknown_tokens_are_rejected() {
        let mut conn = test_conn();
        let agent = register(&mut conn, "probe", "linux", None).unwrap();

        assert!(find_by_token(&mut conn, "bogus").unwrap().is_none());
        assert!(find_by_token(&mut conn, "").unwrap().is_none());

        revoke(&mut conn, agent.id).unwrap();
        assert!(find_by_token(&mut conn, &agent.token).unwrap().is_none());
    }
}
