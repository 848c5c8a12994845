//! Merge logic for pushed updates. Agents and the poller submit partial asset
//! reports through the same interface; this module decides whether a report
//! carries enough real information to apply, resolves which asset it belongs
//! to, and hands the accepted fields to the store. Manual edits do not pass
//! through here, a human is trusted to know what they are doing.

use chrono::Utc;
use diesel::prelude::*;
use serde_json::{Map, Value};

use crate::models::Agent;
use crate::store::{self, Actor, AssetPatch, StoreError};

/// Attribute-bag keys that are pure probe bookkeeping. A payload whose poller
/// metadata carries nothing beyond these collected literally nothing and must
/// not overwrite prior attribute content. This key list is a compatibility
/// contract with deployed agents and pollers.
const BOOKKEEPING_KEYS: [&str; 2] = ["collected_at", "warnings"];

#[derive(Debug)]
pub enum PushError {
    /// Malformed envelope, e.g. `asset` is not an object.
    InvalidPayload(&'static str),
    /// The probe itself reported an error; nothing it sent is trustworthy.
    ProbeFailed(String),
    /// No mac, no ips, no substantive attributes and not going offline.
    EmptyUpdate,
    /// Explicit asset id that does not exist.
    NotFound,
    Db(diesel::result::Error),
}

impl From<StoreError> for PushError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => PushError::NotFound,
            StoreError::Db(e) => PushError::Db(e),
        }
    }
}

impl From<diesel::result::Error> for PushError {
    fn from(e: diesel::result::Error) -> Self {
        PushError::Db(e)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Updated {
        asset_id: String,
        changed: Vec<String>,
    },
    Created {
        asset_id: String,
    },
}

impl PushOutcome {
    pub fn asset_id(&self) -> &str {
        match self {
            PushOutcome::Updated { asset_id, .. } => asset_id,
            PushOutcome::Created { asset_id } => asset_id,
        }
    }
}

/// Apply one pushed payload on behalf of an authenticated agent.
///
/// Payload shape: `{ asset: { id?, name?, type?, mac?, ips?, attributes?,
/// owner_user_id? }, online_status?: bool }`. Absent fields mean "not
/// reported", never "clear".
pub fn submit_push(
    conn: &mut SqliteConnection,
    agent: &Agent,
    payload: &Value,
) -> Result<PushOutcome, PushError> {
    let empty = Map::new();
    let asset = match payload.get("asset") {
        None => &empty,
        Some(v) => v
            .as_object()
            .ok_or(PushError::InvalidPayload("asset payload must be an object"))?,
    };

    // Heartbeat semantics: a loosely-typed payload that says nothing about
    // liveness counts as online.
    let online = match payload.get("online_status") {
        None | Some(Value::Null) => true,
        Some(v) => store::truthy(v),
    };
    let status = if online { "online" } else { "offline" };

    let mut candidate = AssetPatch {
        last_seen: Some(Some(Utc::now().naive_utc())),
        online_status: Some(status.to_string()),
        ..Default::default()
    };

    if let Some(mac) = asset.get("mac").and_then(Value::as_str) {
        if !mac.is_empty() {
            candidate.mac = Some(Some(mac.to_string()));
        }
    }

    if let Some(raw) = asset.get("ips") {
        let ips: Vec<String> = raw
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if !ips.is_empty() {
            candidate.ips = Some(ips);
        }
    }

    let attrs = asset.get("attributes").and_then(Value::as_object);

    if let Some(msg) = poller_error(attrs) {
        return Err(PushError::ProbeFailed(msg));
    }

    if attrs.is_some_and(has_substantive_content) {
        candidate.attributes = asset.get("attributes").cloned();
    }

    let offline = !online;
    if candidate.mac.is_none()
        && candidate.ips.is_none()
        && candidate.attributes.is_none()
        && !offline
    {
        return Err(PushError::EmptyUpdate);
    }

    let actor = Actor::agent(&agent.name);

    // Correlation: explicit id wins, then exact MAC, then exact name.
    let explicit_id = asset
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let resolved = match explicit_id {
        Some(id) => Some(id.to_string()),
        None => {
            let mut found = None;
            if let Some(Some(mac)) = &candidate.mac {
                found = store::find_id_by_mac(conn, mac)?;
            }
            if found.is_none() {
                if let Some(name) = asset.get("name").and_then(Value::as_str) {
                    if !name.is_empty() {
                        found = store::find_id_by_name(conn, name)?;
                    }
                }
            }
            found
        }
    };

    match resolved {
        Some(id) => {
            let changed = store::update_asset(conn, &id, &candidate, actor)?;
            log::info!(
                "agent {} updated asset {} ({} field(s) changed)",
                agent.name,
                id,
                changed.len()
            );
            Ok(PushOutcome::Updated {
                asset_id: id,
                changed,
            })
        }
        None => {
            // First contact from this source: create the asset as reported.
            let fallback = format!("agent-{}", &agent.token[..agent.token.len().min(6)]);
            let data = AssetPatch {
                name: Some(
                    asset
                        .get("name")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .unwrap_or(fallback),
                ),
                asset_type: asset.get("type").and_then(Value::as_str).map(str::to_string),
                mac: asset
                    .get("mac")
                    .map(|v| v.as_str().map(str::to_string)),
                owner_user_id: asset.get("owner_user_id").map(store::coerce_owner_id),
                ips: asset.get("ips").map(|v| {
                    v.as_array()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default()
                }),
                attributes: asset.get("attributes").cloned().filter(|v| !v.is_null()),
                ..Default::default()
            };
            let id = store::create_asset(conn, &data, actor)?;
            log::info!("agent {} created asset {}", agent.name, id);
            Ok(PushOutcome::Created { asset_id: id })
        }
    }
}

/// Non-empty `poller.error` text vetoes the whole update: a probe that errored
/// must not overwrite a previously good state with stale defaults.
fn poller_error(attrs: Option<&Map<String, Value>>) -> Option<String> {
    let err = attrs?
        .get("poller")
        .and_then(Value::as_object)?
        .get("error")?;
    let msg = match err {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if msg.is_empty() { None } else { Some(msg) }
}

/// An attribute document is substantive when it carries at least one
/// non-`poller` key, or when the poller metadata itself (minus bookkeeping)
/// still holds a non-empty value. A probe that collected nothing must not
/// replace prior rich attribute data with an empty shell.
fn has_substantive_content(attrs: &Map<String, Value>) -> bool {
    if attrs.is_empty() {
        return false;
    }
    if attrs.keys().any(|k| k != "poller") {
        return true;
    }
    let Some(meta) = attrs.get("poller").and_then(Value::as_object) else {
        return false;
    };
    meta.iter().any(|(k, v)| {
        if BOOKKEEPING_KEYS.contains(&k.as_str()) {
            return false;
        }
        match v {
            Value::Array(items) => items.iter().any(|i| !is_blank(i)),
            Value::Object(inner) => inner.values().any(|i| !is_blank(i)),
            other => !is_blank(other),
        }
    })
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}
