//! User-defined typed fields and their per-asset values. Values are plain
//! upserts with no history, unlike core asset fields.

use diesel::prelude::*;
use serde_json::{Value, json};

use crate::db;
use crate::models::{CustomField, NewCustomField};
use crate::schema::{custom_field_values, custom_fields};
use crate::store::StoreError;

/// Normalize a required flag from any of the truthy forms clients send.
pub fn normalize_required(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) != 0.0,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => false,
    }
}

pub fn normalize_integer(v: Option<&Value>, default: i32) -> i32 {
    match v {
        Some(Value::Number(n)) => n.as_i64().map(|n| n as i32).unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

/// Store a list-ish input as serialized JSON. Blank strings collapse to null;
/// a string that parses as JSON is re-encoded canonically, anything else is
/// kept as a JSON string.
pub fn prepare_json_field(v: Option<&Value>) -> Option<String> {
    match v {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(parsed) => Some(parsed.to_string()),
                Err(_) => Some(Value::String(trimmed.to_string()).to_string()),
            }
        }
        Some(other) => Some(other.to_string()),
    }
}

fn field_from_payload(data: &Value) -> NewCustomField {
    let get_str = |key: &str, default: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };
    NewCustomField {
        name: get_str("name", ""),
        label: get_str("label", ""),
        field_type: get_str("field_type", "text"),
        is_required: normalize_required(data.get("is_required")),
        default_value: data
            .get("default_value")
            .and_then(Value::as_str)
            .map(str::to_string),
        select_options: prepare_json_field(data.get("select_options")),
        applies_to_types: prepare_json_field(data.get("applies_to_types")),
        display_order: normalize_integer(data.get("display_order"), 0),
        help_text: data
            .get("help_text")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

pub fn create_field(conn: &mut SqliteConnection, data: &Value) -> Result<i32, StoreError> {
    diesel::insert_into(custom_fields::table)
        .values(&field_from_payload(data))
        .execute(conn)?;
    Ok(db::last_insert_id(conn)?)
}

pub fn update_field(conn: &mut SqliteConnection, id: i32, data: &Value) -> Result<(), StoreError> {
    let exists: Option<i32> = custom_fields::table
        .find(id)
        .select(custom_fields::id)
        .first(conn)
        .optional()?;
    if exists.is_none() {
        return Err(StoreError::NotFound);
    }
    diesel::update(custom_fields::table.find(id))
        .set(&field_from_payload(data))
        .execute(conn)?;
    Ok(())
}

/// Deleting a field removes all of its values; no orphans.
pub fn delete_field(conn: &mut SqliteConnection, id: i32) -> Result<(), StoreError> {
    let exists: Option<i32> = custom_fields::table
        .find(id)
        .select(custom_fields::id)
        .first(conn)
        .optional()?;
    if exists.is_none() {
        return Err(StoreError::NotFound);
    }
    diesel::delete(custom_field_values::table.filter(custom_field_values::field_id.eq(id)))
        .execute(conn)?;
    diesel::delete(custom_fields::table.find(id)).execute(conn)?;
    Ok(())
}

pub fn get_field(conn: &mut SqliteConnection, id: i32) -> Result<CustomField, StoreError> {
    custom_fields::table
        .find(id)
        .select(CustomField::as_select())
        .first(conn)
        .optional()?
        .ok_or(StoreError::NotFound)
}

pub fn list_fields(conn: &mut SqliteConnection) -> QueryResult<Vec<CustomField>> {
    custom_fields::table
        .order((custom_fields::display_order.asc(), custom_fields::id.asc()))
        .select(CustomField::as_select())
        .load(conn)
}

/// Fields whose allow-list is unset (global) or contains the type exactly.
/// No wildcard or prefix matching.
pub fn fields_for_type(
    conn: &mut SqliteConnection,
    asset_type: &str,
) -> QueryResult<Vec<CustomField>> {
    let all = list_fields(conn)?;
    Ok(all
        .into_iter()
        .filter(|f| match applies_to(f) {
            None => true,
            Some(types) => types.iter().any(|t| t == asset_type),
        })
        .collect())
}

fn applies_to(field: &CustomField) -> Option<Vec<String>> {
    field
        .applies_to_types
        .as_deref()
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
}

/// Upsert one value per (asset, field) pair. No history is kept.
pub fn set_value(
    conn: &mut SqliteConnection,
    asset_id: &str,
    field_id: i32,
    value: Option<&str>,
) -> QueryResult<()> {
    diesel::insert_into(custom_field_values::table)
        .values((
            custom_field_values::asset_id.eq(asset_id),
            custom_field_values::field_id.eq(field_id),
            custom_field_values::value.eq(value),
        ))
        .on_conflict((custom_field_values::asset_id, custom_field_values::field_id))
        .do_update()
        .set(custom_field_values::value.eq(value))
        .execute(conn)?;
    Ok(())
}

/// All defined fields with this asset's value joined in (null when unset).
pub fn values_for_asset(conn: &mut SqliteConnection, asset_id: &str) -> QueryResult<Vec<Value>> {
    let fields = list_fields(conn)?;
    let values: Vec<(i32, Option<String>)> = custom_field_values::table
        .filter(custom_field_values::asset_id.eq(asset_id))
        .select((custom_field_values::field_id, custom_field_values::value))
        .load(conn)?;

    Ok(fields
        .iter()
        .map(|f| {
            let value = values
                .iter()
                .find(|(fid, _)| *fid == f.id)
                .and_then(|(_, v)| v.clone());
            let mut doc = field_to_json(f);
            doc["value"] = value.map(Value::String).unwrap_or(Value::Null);
            doc
        })
        .collect())
}

/// API shape with the serialized list columns decoded back into JSON.
pub fn field_to_json(f: &CustomField) -> Value {
    let decode = |raw: &Option<String>| {
        raw.as_deref()
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .unwrap_or(Value::Null)
    };
    json!({
        "id": f.id,
        "name": f.name,
        "label": f.label,
        "field_type": f.field_type,
        "is_required": f.is_required,
        "default_value": f.default_value,
        "select_options": decode(&f.select_options),
        "applies_to_types": decode(&f.applies_to_types),
        "display_order": f.display_order,
        "help_text": f.help_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_conn;
    use crate::store::{Actor, AssetPatch, create_asset};

    #[test]
    fn required_flag_accepts_truthy_forms() {
        assert!(normalize_required(Some(&json!(true))));
        assert!(normalize_required(Some(&json!(1))));
        assert!(normalize_required(Some(&json!("1"))));
        assert!(normalize_required(Some(&json!("TRUE"))));
        assert!(normalize_required(Some(&json!("yes"))));
        assert!(normalize_required(Some(&json!("on"))));

        assert!(!normalize_required(Some(&json!(false))));
        assert!(!normalize_required(Some(&json!(0))));
        assert!(!normalize_required(Some(&json!(""))));
        assert!(!normalize_required(Some(&json!("no"))));
        assert!(!normalize_required(Some(&Value::Null)));
        assert!(!normalize_required(None));
    }

    #[test]
    fn json_field_preparation() {
        assert_eq!(prepare_json_field(None), None);
        assert_eq!(prepare_json_field(Some(&Value::Null)), None);
        assert_eq!(prepare_json_field(Some(&json!(""))), None);
        assert_eq!(prepare_json_field(Some(&json!("  "))), None);
        assert_eq!(
            prepare_json_field(Some(&json!(["a", "b"]))),
            Some(r#"["a","b"]"#.to_string())
        );
        assert_eq!(
            prepare_json_field(Some(&json!(r#"["a","b"]"#))),
            Some(r#"["a","b"]"#.to_string())
        );
        // non-JSON strings are kept as a JSON string
        assert_eq!(
            prepare_json_field(Some(&json!("plain"))),
            Some(r#""plain""#.to_string())
        );
    }

    #[test]
    fn applicability_is_exact_match_or_global() {
        let mut conn = test_conn();
        create_field(
            &mut conn,
            &json!({
                "name": "warranty",
                "label": "Warranty",
                "applies_to_types": ["server", "workstation"]
            }),
        )
        .unwrap();
        create_field(
            &mut conn,
            &json!({"name": "notes", "label": "Notes"}),
        )
        .unwrap();

        let names = |t: &str, conn: &mut SqliteConnection| {
            fields_for_type(conn, t)
                .unwrap()
                .into_iter()
                .map(|f| f.name)
                .collect::<Vec<_>>()
        };
        assert_eq!(names("server", &mut conn), vec!["warranty", "notes"]);
        assert_eq!(names("workstation", &mut conn), vec!["warranty", "notes"]);
        assert_eq!(names("printer", &mut conn), vec!["notes"]);
    }

    #[test]
    fn value_upsert_keeps_one_row_per_pair() {
        let mut conn = test_conn();
        let asset = create_asset(&mut conn, &AssetPatch::default(), Actor::manual("alice"))
            .unwrap();
        let field = create_field(&mut conn, &json!({"name": "loc", "label": "Location"}))
            .unwrap();

        set_value(&mut conn, &asset, field, Some("rack 4")).unwrap();
        set_value(&mut conn, &asset, field, Some("rack 7")).unwrap();

        let rows = values_for_asset(&mut conn, &asset).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["value"], "rack 7");

        let count: i64 = custom_field_values::table
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn deleting_a_field_removes_its_values() {
        let mut conn = test_conn();
        let asset = create_asset(&mut conn, &AssetPatch::default(), Actor::manual("alice"))
            .unwrap();
        let field = create_field(&mut conn, &json!({"name": "loc", "label": "Location"}))
            .unwrap();
        set_value(&mut conn, &asset, field, Some("rack 4")).unwrap();

        delete_field(&mut conn, field).unwrap();
        assert!(matches!(
            get_field(&mut conn, field),
            Err(StoreError::NotFound)
        ));
        let count: i64 = custom_field_values::table
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn update_normalizes_and_overwrites() {
        let mut conn = test_conn();
        let id = create_field(
            &mut conn,
            &json!({"name": "os", "label": "OS", "is_required": "yes", "display_order": "3"}),
        )
        .unwrap();
        let f = get_field(&mut conn, id).unwrap();
        assert!(f.is_required);
        assert_eq!(f.display_order, 3);

        update_field(
            &mut conn,
            id,
            &json!({"name": "os", "label": "Operating system", "field_type": "select",
                    "select_options": ["linux", "windows"]}),
        )
        .unwrap();
        let f = get_field(&mut conn, id).unwrap();
        assert_eq!(f.label, "Operating system");
        assert!(!f.is_required);
        assert_eq!(f.select_options.as_deref(), Some(r#"["linux","windows"]"#));

        assert!(matches!(
            update_field(&mut conn, 9999, &json!({})),
            Err(StoreError::NotFound)
        ));
    }
}
