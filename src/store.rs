//! Canonical asset storage: the identity record, its IP set, its attribute
//! document, and the append-only change ledger. Every mutation is attributed
//! to an explicit [`Actor`] so nothing in here reads ambient session state.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::{Value, json};
use std::net::Ipv6Addr;
use uuid::Uuid;

use crate::models::{Asset, AssetChangeset, Change, NewAsset, NewAssetIp, NewChange};
use crate::schema::{asset_attributes, asset_ips, assets, changes, custom_field_values, users};

/// Cap on rows returned by list/search and by the per-asset change feed.
pub const LIST_CAP: i64 = 200;

/// Who is responsible for a mutation: a username for manual edits, an agent
/// name (including the poller's agent) for pushed updates.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub name: &'a str,
    pub source: &'a str,
}

impl<'a> Actor<'a> {
    pub fn manual(name: &'a str) -> Self {
        Actor {
            name,
            source: "manual",
        }
    }

    pub fn agent(name: &'a str) -> Self {
        Actor {
            name,
            source: "agent",
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    NotFound,
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for StoreError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => StoreError::NotFound,
            other => StoreError::Db(other),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "asset not found"),
            StoreError::Db(e) => write!(f, "storage error: {e}"),
        }
    }
}

/// A sparse asset update. `None` means "not supplied"; for nullable fields the
/// inner option distinguishes "set this value" from "clear this field". The
/// distinction matters: sources only report what they actually collected.
#[derive(Debug, Default, Clone)]
pub struct AssetPatch {
    pub name: Option<String>,
    pub asset_type: Option<String>,
    pub mac: Option<Option<String>>,
    pub poll_address: Option<Option<String>>,
    pub owner_user_id: Option<Option<i32>>,
    pub online_status: Option<String>,
    pub last_seen: Option<Option<NaiveDateTime>>,
    pub poll_enabled: Option<bool>,
    pub poll_type: Option<String>,
    pub poll_username: Option<Option<String>>,
    pub poll_password: Option<Option<String>>,
    pub poll_enable_password: Option<Option<String>>,
    pub poll_port: Option<Option<i32>>,
    pub ips: Option<Vec<String>>,
    pub attributes: Option<Value>,
}

impl AssetPatch {
    /// Build a patch from a loosely-typed JSON body. Only keys present in the
    /// object are carried over; a present-but-null key clears the field.
    pub fn from_value(body: &Value) -> Self {
        let mut p = AssetPatch::default();
        let map = match body.as_object() {
            Some(m) => m,
            None => return p,
        };

        if let Some(v) = map.get("name").and_then(Value::as_str) {
            p.name = Some(v.to_string());
        }
        if let Some(v) = map.get("type").and_then(Value::as_str) {
            p.asset_type = Some(v.to_string());
        }
        if let Some(v) = map.get("mac") {
            p.mac = Some(opt_string(v));
        }
        if let Some(v) = map.get("poll_address") {
            // blank poll addresses collapse to null
            let addr = opt_string(v)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            p.poll_address = Some(addr);
        }
        if let Some(v) = map.get("owner_user_id") {
            p.owner_user_id = Some(coerce_owner_id(v));
        }
        if let Some(v) = map.get("online_status").and_then(Value::as_str) {
            p.online_status = Some(v.to_string());
        }
        if let Some(v) = map.get("last_seen") {
            p.last_seen = Some(v.as_str().and_then(parse_timestamp));
        }
        if let Some(v) = map.get("poll_enabled") {
            p.poll_enabled = Some(truthy(v));
        }
        if let Some(v) = map.get("poll_type").and_then(Value::as_str) {
            p.poll_type = Some(v.to_string());
        }
        if let Some(v) = map.get("poll_username") {
            p.poll_username = Some(opt_string(v));
        }
        if let Some(v) = map.get("poll_password") {
            p.poll_password = Some(opt_string(v));
        }
        if let Some(v) = map.get("poll_enable_password") {
            p.poll_enable_password = Some(opt_string(v));
        }
        if let Some(v) = map.get("poll_port") {
            p.poll_port = Some(v.as_i64().map(|n| n as i32));
        }
        if let Some(v) = map.get("ips") {
            p.ips = Some(string_list(v));
        }
        if let Some(v) = map.get("attributes") {
            if !v.is_null() {
                p.attributes = Some(v.clone());
            }
        }
        p
    }
}

fn opt_string(v: &Value) -> Option<String> {
    v.as_str().map(str::to_string)
}

/// Owner references accept null/empty (clear) or a numeric id; anything else
/// is coerced to null rather than rejected.
pub fn coerce_owner_id(v: &Value) -> Option<i32> {
    match v {
        Value::Number(n) => n.as_i64().map(|n| n as i32),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() { None } else { t.parse().ok() }
        }
        _ => None,
    }
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => false,
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

fn string_list(v: &Value) -> Vec<String> {
    match v.as_array() {
        Some(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

fn is_empty_doc(v: &Value) -> bool {
    match v {
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

/// Append one ledger entry. Values are stored serialized so the timeline can
/// be reconstructed without knowing field types.
pub fn change_log(
    conn: &mut SqliteConnection,
    asset_id: &str,
    actor: Actor,
    field: &str,
    old: Option<Value>,
    new: Option<Value>,
) -> QueryResult<()> {
    let entry = NewChange {
        asset_id,
        actor: actor.name,
        source: actor.source,
        field,
        old_value: old.map(|v| v.to_string()),
        new_value: new.map(|v| v.to_string()),
        changed_at: Utc::now().naive_utc(),
    };
    diesel::insert_into(changes::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}

/// Per-asset change feed, newest first, capped.
pub fn get_changes(conn: &mut SqliteConnection, asset_id: &str) -> QueryResult<Vec<Change>> {
    changes::table
        .filter(changes::asset_id.eq(asset_id))
        .order(changes::changed_at.desc())
        .then_order_by(changes::id.desc())
        .limit(LIST_CAP)
        .select(Change::as_select())
        .load(conn)
}

/// Create a new asset and write the synthetic "created" ledger entry.
pub fn create_asset(
    conn: &mut SqliteConnection,
    data: &AssetPatch,
    actor: Actor,
) -> Result<String, StoreError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    let new_asset = NewAsset {
        id: &id,
        name: data.name.as_deref().unwrap_or("Unnamed"),
        asset_type: data.asset_type.as_deref().unwrap_or("unknown"),
        mac: data.mac.as_ref().and_then(|m| m.as_deref()),
        poll_address: data.poll_address.as_ref().and_then(|p| p.as_deref()),
        owner_user_id: data.owner_user_id.flatten(),
        source: actor.source,
        online_status: data.online_status.as_deref().unwrap_or("offline"),
        last_seen: data.last_seen.flatten(),
        poll_enabled: data.poll_enabled.unwrap_or(false),
        poll_type: data.poll_type.as_deref().unwrap_or("ping"),
        poll_username: data.poll_username.as_ref().and_then(|p| p.as_deref()),
        poll_password: data.poll_password.as_ref().and_then(|p| p.as_deref()),
        poll_enable_password: data.poll_enable_password.as_ref().and_then(|p| p.as_deref()),
        poll_port: data.poll_port.flatten(),
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(assets::table)
        .values(&new_asset)
        .execute(conn)?;

    if let Some(ips) = &data.ips {
        if !ips.is_empty() {
            replace_ips(conn, &id, ips, actor)?;
        }
    }
    if let Some(attrs) = &data.attributes {
        if !is_empty_doc(attrs) {
            replace_attributes(conn, &id, attrs, actor)?;
        }
    }
    change_log(conn, &id, actor, "asset", None, Some(json!({"created": true})))?;
    Ok(id)
}

/// Apply a sparse update. Only supplied fields are touched; a supplied value
/// equal to the stored one is silent. Returns the names of fields that
/// actually changed (one ledger entry each). `last_seen` is liveness
/// bookkeeping and updates without a ledger entry.
pub fn update_asset(
    conn: &mut SqliteConnection,
    id: &str,
    patch: &AssetPatch,
    actor: Actor,
) -> Result<Vec<String>, StoreError> {
    let old: Asset = assets::table
        .find(id)
        .select(Asset::as_select())
        .first(conn)
        .optional()?
        .ok_or(StoreError::NotFound)?;

    let has_column_update = patch.name.is_some()
        || patch.asset_type.is_some()
        || patch.mac.is_some()
        || patch.poll_address.is_some()
        || patch.owner_user_id.is_some()
        || patch.online_status.is_some()
        || patch.last_seen.is_some()
        || patch.poll_enabled.is_some()
        || patch.poll_type.is_some()
        || patch.poll_username.is_some()
        || patch.poll_password.is_some()
        || patch.poll_enable_password.is_some()
        || patch.poll_port.is_some();

    let mut changed: Vec<String> = Vec::new();

    if has_column_update {
        let changeset = AssetChangeset {
            name: patch.name.as_deref(),
            asset_type: patch.asset_type.as_deref(),
            mac: patch.mac.as_ref().map(|v| v.as_deref()),
            poll_address: patch.poll_address.as_ref().map(|v| v.as_deref()),
            owner_user_id: patch.owner_user_id,
            online_status: patch.online_status.as_deref(),
            last_seen: patch.last_seen,
            poll_enabled: patch.poll_enabled,
            poll_type: patch.poll_type.as_deref(),
            poll_username: patch.poll_username.as_ref().map(|v| v.as_deref()),
            poll_password: patch.poll_password.as_ref().map(|v| v.as_deref()),
            poll_enable_password: patch.poll_enable_password.as_ref().map(|v| v.as_deref()),
            poll_port: patch.poll_port,
            updated_at: Some(Utc::now().naive_utc()),
        };
        diesel::update(assets::table.find(id))
            .set(&changeset)
            .execute(conn)?;

        if let Some(v) = &patch.name {
            if old.name != *v {
                change_log(conn, id, actor, "name", Some(json!(old.name)), Some(json!(v)))?;
                changed.push("name".into());
            }
        }
        if let Some(v) = &patch.asset_type {
            if old.asset_type != *v {
                change_log(conn, id, actor, "type", Some(json!(old.asset_type)), Some(json!(v)))?;
                changed.push("type".into());
            }
        }
        if let Some(v) = &patch.mac {
            if old.mac != *v {
                change_log(conn, id, actor, "mac", to_json(&old.mac), to_json(v))?;
                changed.push("mac".into());
            }
        }
        if let Some(v) = &patch.poll_address {
            if old.poll_address != *v {
                change_log(conn, id, actor, "poll_address", to_json(&old.poll_address), to_json(v))?;
                changed.push("poll_address".into());
            }
        }
        if let Some(v) = patch.owner_user_id {
            if old.owner_user_id != v {
                change_log(
                    conn,
                    id,
                    actor,
                    "owner_user_id",
                    old.owner_user_id.map(|n| json!(n)),
                    v.map(|n| json!(n)),
                )?;
                changed.push("owner_user_id".into());
            }
        }
        if let Some(v) = &patch.online_status {
            if old.online_status != *v {
                change_log(
                    conn,
                    id,
                    actor,
                    "online_status",
                    Some(json!(old.online_status)),
                    Some(json!(v)),
                )?;
                changed.push("online_status".into());
            }
        }
        if let Some(v) = patch.poll_enabled {
            if old.poll_enabled != v {
                change_log(
                    conn,
                    id,
                    actor,
                    "poll_enabled",
                    Some(json!(old.poll_enabled)),
                    Some(json!(v)),
                )?;
                changed.push("poll_enabled".into());
            }
        }
        if let Some(v) = &patch.poll_type {
            if old.poll_type != *v {
                change_log(conn, id, actor, "poll_type", Some(json!(old.poll_type)), Some(json!(v)))?;
                changed.push("poll_type".into());
            }
        }
        if let Some(v) = &patch.poll_username {
            if old.poll_username != *v {
                change_log(conn, id, actor, "poll_username", to_json(&old.poll_username), to_json(v))?;
                changed.push("poll_username".into());
            }
        }
        if let Some(v) = &patch.poll_password {
            if old.poll_password != *v {
                change_log(conn, id, actor, "poll_password", to_json(&old.poll_password), to_json(v))?;
                changed.push("poll_password".into());
            }
        }
        if let Some(v) = &patch.poll_enable_password {
            if old.poll_enable_password != *v {
                change_log(
                    conn,
                    id,
                    actor,
                    "poll_enable_password",
                    to_json(&old.poll_enable_password),
                    to_json(v),
                )?;
                changed.push("poll_enable_password".into());
            }
        }
        if let Some(v) = patch.poll_port {
            if old.poll_port != v {
                change_log(
                    conn,
                    id,
                    actor,
                    "poll_port",
                    old.poll_port.map(|n| json!(n)),
                    v.map(|n| json!(n)),
                )?;
                changed.push("poll_port".into());
            }
        }
    }

    if let Some(ips) = &patch.ips {
        if replace_ips(conn, id, ips, actor)? {
            changed.push("ips".into());
        }
    }
    if let Some(doc) = &patch.attributes {
        if replace_attributes(conn, id, doc, actor)? {
            changed.push("attributes".into());
        }
    }
    Ok(changed)
}

fn to_json(v: &Option<String>) -> Option<Value> {
    v.as_ref().map(|s| json!(s))
}

/// Replace the asset's IP set wholesale. Identical lists are a silent no-op so
/// repeated heartbeats stay idempotent; an actual replacement (including an
/// explicit clear to the empty list) writes one ledger entry with a null old
/// value.
pub fn replace_ips(
    conn: &mut SqliteConnection,
    asset_id: &str,
    new_ips: &[String],
    actor: Actor,
) -> Result<bool, StoreError> {
    let current: Vec<String> = asset_ips::table
        .filter(asset_ips::asset_id.eq(asset_id))
        .order(asset_ips::id.asc())
        .select(asset_ips::ip)
        .load(conn)?;
    if current.as_slice() == new_ips {
        return Ok(false);
    }

    diesel::delete(asset_ips::table.filter(asset_ips::asset_id.eq(asset_id))).execute(conn)?;
    for ip in new_ips {
        // anything that is not an IPv6 literal is tagged ipv4, garbage included
        let family = if ip.parse::<Ipv6Addr>().is_ok() {
            "ipv6"
        } else {
            "ipv4"
        };
        diesel::insert_into(asset_ips::table)
            .values(&NewAssetIp {
                asset_id,
                family,
                ip,
            })
            .execute(conn)?;
    }
    change_log(conn, asset_id, actor, "ips", None, Some(json!(new_ips)))?;
    Ok(true)
}

/// Replace the asset's attribute document wholesale. An identical document is
/// a silent no-op; otherwise the document is upserted and logged with a null
/// old value (previous content is not diffed, the new-value trail is the
/// history).
pub fn replace_attributes(
    conn: &mut SqliteConnection,
    asset_id: &str,
    doc: &Value,
    actor: Actor,
) -> Result<bool, StoreError> {
    let current: Option<String> = asset_attributes::table
        .find(asset_id)
        .select(asset_attributes::attributes)
        .first(conn)
        .optional()?;
    if let Some(raw) = &current {
        if serde_json::from_str::<Value>(raw).is_ok_and(|v| v == *doc) {
            return Ok(false);
        }
    }

    let serialized = doc.to_string();
    diesel::insert_into(asset_attributes::table)
        .values((
            asset_attributes::asset_id.eq(asset_id),
            asset_attributes::attributes.eq(&serialized),
            asset_attributes::updated_by.eq(actor.source),
        ))
        .on_conflict(asset_attributes::asset_id)
        .do_update()
        .set((
            asset_attributes::attributes.eq(&serialized),
            asset_attributes::updated_by.eq(actor.source),
        ))
        .execute(conn)?;
    change_log(conn, asset_id, actor, "attributes", None, Some(doc.clone()))?;
    Ok(true)
}

pub fn get_attributes(conn: &mut SqliteConnection, asset_id: &str) -> QueryResult<Value> {
    let raw: Option<String> = asset_attributes::table
        .find(asset_id)
        .select(asset_attributes::attributes)
        .first(conn)
        .optional()?;
    Ok(raw
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_else(|| json!({})))
}

#[derive(Serialize, Debug, Clone)]
pub struct IpPair {
    pub family: String,
    pub ip: String,
}

pub fn get_ips(conn: &mut SqliteConnection, asset_id: &str) -> QueryResult<Vec<IpPair>> {
    let rows: Vec<(String, String)> = asset_ips::table
        .filter(asset_ips::asset_id.eq(asset_id))
        .order(asset_ips::id.asc())
        .select((asset_ips::family, asset_ips::ip))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(family, ip)| IpPair { family, ip })
        .collect())
}

/// Asset record enriched with its sub-documents, as returned by the API.
#[derive(Serialize, Debug)]
pub struct AssetView {
    #[serde(flatten)]
    pub asset: Asset,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub ips: Vec<IpPair>,
    pub attributes: Value,
    pub custom_fields: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<Change>>,
}

fn build_view(
    conn: &mut SqliteConnection,
    asset: Asset,
    with_changes: bool,
) -> Result<AssetView, StoreError> {
    let (owner_name, owner_email) = match asset.owner_user_id {
        Some(uid) => users::table
            .find(uid)
            .select((users::display_name, users::email))
            .first::<(Option<String>, Option<String>)>(conn)
            .optional()?
            .unwrap_or((None, None)),
        None => (None, None),
    };
    let ips = get_ips(conn, &asset.id)?;
    let attributes = get_attributes(conn, &asset.id)?;
    let custom_fields = crate::custom_fields::values_for_asset(conn, &asset.id).unwrap_or_default();
    let changes = if with_changes {
        Some(get_changes(conn, &asset.id)?)
    } else {
        None
    };
    Ok(AssetView {
        asset,
        owner_name,
        owner_email,
        ips,
        attributes,
        custom_fields,
        changes,
    })
}

pub fn get_asset(conn: &mut SqliteConnection, id: &str) -> Result<AssetView, StoreError> {
    let asset: Asset = assets::table
        .find(id)
        .select(Asset::as_select())
        .first(conn)
        .optional()?
        .ok_or(StoreError::NotFound)?;
    build_view(conn, asset, true)
}

/// Most recently updated assets first, optionally filtered by a substring
/// match on name, MAC or id.
pub fn list_assets(
    conn: &mut SqliteConnection,
    search: Option<&str>,
) -> Result<Vec<AssetView>, StoreError> {
    let rows: Vec<Asset> = match search.filter(|s| !s.is_empty()) {
        Some(s) => {
            let like = format!("%{s}%");
            assets::table
                .filter(assets::name.like(like.clone()))
                .or_filter(assets::id.like(like.clone()))
                .or_filter(assets::mac.like(like))
                .order(assets::updated_at.desc())
                .limit(LIST_CAP)
                .select(Asset::as_select())
                .load(conn)?
        }
        None => assets::table
            .order(assets::updated_at.desc())
            .limit(LIST_CAP)
            .select(Asset::as_select())
            .load(conn)?,
    };
    rows.into_iter()
        .map(|a| build_view(conn, a, false))
        .collect()
}

/// Delete an asset and everything hanging off it: identifiers, attributes,
/// custom field values and the full change history.
pub fn delete_asset(conn: &mut SqliteConnection, id: &str) -> Result<(), StoreError> {
    diesel::delete(custom_field_values::table.filter(custom_field_values::asset_id.eq(id)))
        .execute(conn)?;
    diesel::delete(changes::table.filter(changes::asset_id.eq(id))).execute(conn)?;
    diesel::delete(asset_ips::table.filter(asset_ips::asset_id.eq(id))).execute(conn)?;
    diesel::delete(asset_attributes::table.filter(asset_attributes::asset_id.eq(id)))
        .execute(conn)?;
    diesel::delete(assets::table.find(id)).execute(conn)?;
    Ok(())
}

pub fn find_id_by_mac(conn: &mut SqliteConnection, mac: &str) -> QueryResult<Option<String>> {
    assets::table
        .filter(assets::mac.eq(mac))
        .select(assets::id)
        .first::<String>(conn)
        .optional()
}

pub fn find_id_by_name(conn: &mut SqliteConnection, name: &str) -> QueryResult<Option<String>> {
    assets::table
        .filter(assets::name.eq(name))
        .select(assets::id)
        .first::<String>(conn)
        .optional()
}

pub fn find_ids_by_ip(conn: &mut SqliteConnection, ip: &str) -> QueryResult<Vec<String>> {
    asset_ips::table
        .filter(asset_ips::ip.eq(ip))
        .select(asset_ips::asset_id)
        .distinct()
        .load(conn)
}

/// Lowercased hex digits only, so "AA:BB..." and "aa-bb..." compare equal.
pub fn normalize_mac(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn find_ids_by_normalized_mac(
    conn: &mut SqliteConnection,
    normalized: &str,
) -> QueryResult<Vec<String>> {
    let rows: Vec<(String, Option<String>)> = assets::table
        .filter(assets::mac.is_not_null())
        .select((assets::id, assets::mac))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .filter(|(_, mac)| {
            mac.as_deref()
                .is_some_and(|m| !m.is_empty() && normalize_mac(m) == normalized)
        })
        .map(|(id, _)| id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_conn;

    fn ledger_count(conn: &mut SqliteConnection, id: &str) -> i64 {
        changes::table
            .filter(changes::asset_id.eq(id))
            .count()
            .get_result(conn)
            .unwrap()
    }

    #[test]
    fn create_applies_defaults_and_logs_creation() {
        let mut conn = test_conn();
        let id = create_asset(&mut conn, &AssetPatch::default(), Actor::manual("alice")).unwrap();

        let view = get_asset(&mut conn, &id).unwrap();
        assert_eq!(view.asset.name, "Unnamed");
        assert_eq!(view.asset.asset_type, "unknown");
        assert_eq!(view.asset.source, "manual");
        assert_eq!(view.asset.poll_type, "ping");

        let log = get_changes(&mut conn, &id).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].field, "asset");
        assert_eq!(log[0].actor, "alice");
        assert_eq!(log[0].old_value, None);
        assert_eq!(log[0].new_value.as_deref(), Some(r#"{"created":true}"#));
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let mut conn = test_conn();
        let patch = AssetPatch {
            name: Some("x".into()),
            ..Default::default()
        };
        match update_asset(&mut conn, "no-such-id", &patch, Actor::manual("alice")) {
            Err(StoreError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
        // nothing written against the missing asset
        assert_eq!(ledger_count(&mut conn, "no-such-id"), 0);
    }

    #[test]
    fn noop_fields_are_silent() {
        let mut conn = test_conn();
        let patch = AssetPatch {
            name: Some("srv1".into()),
            asset_type: Some("server".into()),
            ..Default::default()
        };
        let id = create_asset(&mut conn, &patch, Actor::manual("alice")).unwrap();
        let before = ledger_count(&mut conn, &id);

        let changed = update_asset(&mut conn, &id, &patch, Actor::manual("alice")).unwrap();
        assert!(changed.is_empty());
        assert_eq!(ledger_count(&mut conn, &id), before);
    }

    #[test]
    fn one_ledger_entry_per_changed_field() {
        let mut conn = test_conn();
        let id = create_asset(&mut conn, &AssetPatch::default(), Actor::manual("alice")).unwrap();

        let patch = AssetPatch {
            name: Some("core-sw".into()),
            asset_type: Some("switch".into()),
            mac: Some(Some("AA:BB:CC:DD:EE:FF".into())),
            ..Default::default()
        };
        let changed = update_asset(&mut conn, &id, &patch, Actor::manual("alice")).unwrap();
        assert_eq!(changed, vec!["name", "type", "mac"]);
        // created + three field changes
        assert_eq!(ledger_count(&mut conn, &id), 4);
    }

    #[test]
    fn owner_reference_is_coerced_not_rejected() {
        assert_eq!(coerce_owner_id(&json!(7)), Some(7));
        assert_eq!(coerce_owner_id(&json!("12")), Some(12));
        assert_eq!(coerce_owner_id(&json!("")), None);
        assert_eq!(coerce_owner_id(&json!("garbage")), None);
        assert_eq!(coerce_owner_id(&Value::Null), None);
        assert_eq!(coerce_owner_id(&json!([1, 2])), None);
    }

    #[test]
    fn last_seen_updates_without_ledger_entry() {
        let mut conn = test_conn();
        let id = create_asset(&mut conn, &AssetPatch::default(), Actor::manual("alice")).unwrap();
        let before = ledger_count(&mut conn, &id);

        let patch = AssetPatch {
            last_seen: Some(Some(Utc::now().naive_utc())),
            ..Default::default()
        };
        let changed = update_asset(&mut conn, &id, &patch, Actor::agent("probe")).unwrap();
        assert!(changed.is_empty());
        assert_eq!(ledger_count(&mut conn, &id), before);

        let view = get_asset(&mut conn, &id).unwrap();
        assert!(view.asset.last_seen.is_some());
    }

    #[test]
    fn ip_family_is_derived_and_garbage_is_ipv4() {
        let mut conn = test_conn();
        let id = create_asset(&mut conn, &AssetPatch::default(), Actor::manual("alice")).unwrap();

        let ips = vec![
            "10.0.0.5".to_string(),
            "fe80::1".to_string(),
            "not-an-ip".to_string(),
        ];
        assert!(replace_ips(&mut conn, &id, &ips, Actor::manual("alice")).unwrap());

        let stored = get_ips(&mut conn, &id).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].family, "ipv4");
        assert_eq!(stored[1].family, "ipv6");
        assert_eq!(stored[2].family, "ipv4");
    }

    #[test]
    fn identical_ip_list_is_a_silent_noop() {
        let mut conn = test_conn();
        let id = create_asset(&mut conn, &AssetPatch::default(), Actor::manual("alice")).unwrap();
        let ips = vec!["192.168.1.10".to_string()];

        assert!(replace_ips(&mut conn, &id, &ips, Actor::manual("alice")).unwrap());
        let before = ledger_count(&mut conn, &id);
        assert!(!replace_ips(&mut conn, &id, &ips, Actor::manual("alice")).unwrap());
        assert_eq!(ledger_count(&mut conn, &id), before);
    }

    #[test]
    fn clearing_all_ips_is_a_logged_event() {
        let mut conn = test_conn();
        let id = create_asset(&mut conn, &AssetPatch::default(), Actor::manual("alice")).unwrap();
        replace_ips(
            &mut conn,
            &id,
            &["10.1.1.1".to_string()],
            Actor::manual("alice"),
        )
        .unwrap();

        assert!(replace_ips(&mut conn, &id, &[], Actor::manual("alice")).unwrap());
        let log = get_changes(&mut conn, &id).unwrap();
        assert_eq!(log[0].field, "ips");
        assert_eq!(log[0].old_value, None);
        assert_eq!(log[0].new_value.as_deref(), Some("[]"));
        assert!(get_ips(&mut conn, &id).unwrap().is_empty());
    }

    #[test]
    fn attribute_replacement_logs_null_old_value() {
        let mut conn = test_conn();
        let id = create_asset(&mut conn, &AssetPatch::default(), Actor::manual("alice")).unwrap();

        let doc = json!({"os": "debian", "cores": 8});
        assert!(replace_attributes(&mut conn, &id, &doc, Actor::agent("probe")).unwrap());
        let log = get_changes(&mut conn, &id).unwrap();
        assert_eq!(log[0].field, "attributes");
        assert_eq!(log[0].old_value, None);

        // identical document is silent
        let before = ledger_count(&mut conn, &id);
        assert!(!replace_attributes(&mut conn, &id, &doc, Actor::agent("probe")).unwrap());
        assert_eq!(ledger_count(&mut conn, &id), before);

        // a different document replaces and logs again
        let doc2 = json!({"os": "debian", "cores": 16});
        assert!(replace_attributes(&mut conn, &id, &doc2, Actor::agent("probe")).unwrap());
        assert_eq!(get_attributes(&mut conn, &id).unwrap(), doc2);
    }

    #[test]
    fn delete_cascades_to_subrecords() {
        let mut conn = test_conn();
        let patch = AssetPatch {
            ips: Some(vec!["10.0.0.9".to_string()]),
            attributes: Some(json!({"rack": "b2"})),
            ..Default::default()
        };
        let id = create_asset(&mut conn, &patch, Actor::manual("alice")).unwrap();
        assert!(ledger_count(&mut conn, &id) > 0);

        delete_asset(&mut conn, &id).unwrap();
        assert!(matches!(
            get_asset(&mut conn, &id),
            Err(StoreError::NotFound)
        ));
        assert_eq!(ledger_count(&mut conn, &id), 0);
        assert!(get_ips(&mut conn, &id).unwrap().is_empty());
        assert_eq!(get_attributes(&mut conn, &id).unwrap(), json!({}));
    }

    #[test]
    fn mac_normalization_strips_separators() {
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF"), "aabbccddeeff");
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee-ff"), "aabbccddeeff");
        assert_eq!(normalize_mac("aabb.ccdd.eeff"), "aabbccddeeff");
    }

    #[test]
    fn patch_distinguishes_missing_from_null() {
        let p = AssetPatch::from_value(&json!({"mac": null, "name": "x"}));
        assert_eq!(p.mac, Some(None));
        assert_eq!(p.name.as_deref(), Some("x"));
        assert!(p.poll_address.is_none());
        assert!(p.ips.is_none());

        let p = AssetPatch::from_value(&json!({"ips": []}));
        assert_eq!(p.ips, Some(vec![]));

        let p = AssetPatch::from_value(&json!({"poll_address": "  "}));
        assert_eq!(p.poll_address, Some(None));
    }
}
