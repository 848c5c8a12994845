use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{agents, asset_ips, assets, changes, custom_fields, users};

#[derive(Queryable, Identifiable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = assets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    pub mac: Option<String>,
    pub poll_address: Option<String>,
    pub owner_user_id: Option<i32>,
    pub source: String,
    pub online_status: String,
    pub last_seen: Option<NaiveDateTime>,
    pub poll_enabled: bool,
    pub poll_type: String,
    pub poll_username: Option<String>,
    pub poll_password: Option<String>,
    pub poll_enable_password: Option<String>,
    pub poll_port: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = assets)]
pub struct NewAsset<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub asset_type: &'a str,
    pub mac: Option<&'a str>,
    pub poll_address: Option<&'a str>,
    pub owner_user_id: Option<i32>,
    pub source: &'a str,
    pub online_status: &'a str,
    pub last_seen: Option<NaiveDateTime>,
    pub poll_enabled: bool,
    pub poll_type: &'a str,
    pub poll_username: Option<&'a str>,
    pub poll_password: Option<&'a str>,
    pub poll_enable_password: Option<&'a str>,
    pub poll_port: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Sparse column update; `None` leaves a column alone, `Some(None)` clears it.
#[derive(AsChangeset, Default)]
#[diesel(table_name = assets)]
pub struct AssetChangeset<'a> {
    pub name: Option<&'a str>,
    pub asset_type: Option<&'a str>,
    pub mac: Option<Option<&'a str>>,
    pub poll_address: Option<Option<&'a str>>,
    pub owner_user_id: Option<Option<i32>>,
    pub online_status: Option<&'a str>,
    pub last_seen: Option<Option<NaiveDateTime>>,
    pub poll_enabled: Option<bool>,
    pub poll_type: Option<&'a str>,
    pub poll_username: Option<Option<&'a str>>,
    pub poll_password: Option<Option<&'a str>>,
    pub poll_enable_password: Option<Option<&'a str>>,
    pub poll_port: Option<Option<i32>>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = asset_ips)]
pub struct NewAssetIp<'a> {
    pub asset_id: &'a str,
    pub family: &'a str,
    pub ip: &'a str,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = changes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Change {
    #[serde(skip_serializing)]
    pub id: i32,
    #[serde(skip_serializing)]
    pub asset_id: String,
    pub actor: String,
    pub source: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = changes)]
pub struct NewChange<'a> {
    pub asset_id: &'a str,
    pub actor: &'a str,
    pub source: &'a str,
    pub field: &'a str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: NaiveDateTime,
}

#[derive(Queryable, Identifiable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = custom_fields)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CustomField {
    pub id: i32,
    pub name: String,
    pub label: String,
    pub field_type: String,
    pub is_required: bool,
    pub default_value: Option<String>,
    pub select_options: Option<String>,
    pub applies_to_types: Option<String>,
    pub display_order: i32,
    pub help_text: Option<String>,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = custom_fields)]
pub struct NewCustomField {
    pub name: String,
    pub label: String,
    pub field_type: String,
    pub is_required: bool,
    pub default_value: Option<String>,
    pub select_options: Option<String>,
    pub applies_to_types: Option<String>,
    pub display_order: i32,
    pub help_text: Option<String>,
}

#[derive(Queryable, Identifiable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = agents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Agent {
    pub id: i32,
    pub name: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub platform: String,
    pub bound_asset: Option<String>,
    pub status: String,
    pub last_seen: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = agents)]
pub struct NewAgent<'a> {
    pub name: &'a str,
    pub token: &'a str,
    pub platform: &'a str,
    pub bound_asset: Option<&'a str>,
    pub status: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Identifiable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: String,
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}
