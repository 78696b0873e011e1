//! Field normalizer: maps heterogeneous row shapes onto a canonical [`Field`].
//!
//! Column aliases are resolved through a decision table. For each logical
//! attribute the candidate keys are tried in order and the first non-empty
//! value wins. Rows missing `system`, `object` or `field` still normalize;
//! rejecting them is the caller's job.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::field::{Field, FieldOrigin};
use crate::parsers::RawRow;
use crate::services::identity;

const SYSTEM_KEYS: &[&str] = &["system", "System", "system_name"];
const OBJECT_KEYS: &[&str] = &["object", "Object", "business_object"];
const FIELD_KEYS: &[&str] = &["field", "Field", "field_name"];
const DATA_TYPE_KEYS: &[&str] = &["data_type", "type", "Type", "dataType"];
const REQUIRED_KEYS: &[&str] = &["required", "Required"];
const KEY_TYPE_KEYS: &[&str] = &["key_type", "KeyType", "key"];
const DESCRIPTION_KEYS: &[&str] = &["description", "Description"];

/// Strings accepted as `true` for boolean columns (compared lowercase).
const TRUTHY_FLAGS: &[&str] = &["y", "yes", "true", "1"];

/// Caller-supplied context for normalization.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Provenance recorded when the row does not carry its own `source`.
    pub source: Option<FieldOrigin>,
    pub now: DateTime<Utc>,
}

impl NormalizeOptions {
    pub fn import(now: DateTime<Utc>) -> Self {
        Self {
            source: Some(FieldOrigin::Import),
            now,
        }
    }
}

/// A normalized field together with the index of the row it came from.
#[derive(Debug, Clone)]
pub struct NormalizedField {
    pub row_index: usize,
    pub field: Field,
}

impl NormalizedField {
    /// Rows missing any identifying attribute cannot enter the catalog.
    pub fn missing_identity(&self) -> Option<&'static str> {
        if self.field.system.is_empty() {
            Some("system")
        } else if self.field.object.is_empty() {
            Some("object")
        } else if self.field.field.is_empty() {
            Some("field")
        } else {
            None
        }
    }
}

/// Normalize one raw row into a canonical field.
pub fn normalize_field(row: &RawRow, row_index: usize, options: &NormalizeOptions) -> NormalizedField {
    let system = text(row, SYSTEM_KEYS);
    let object = text(row, OBJECT_KEYS);
    let field = text(row, FIELD_KEYS);

    let required = first_truthy(row, REQUIRED_KEYS).is_some_and(coerce_flag);
    let is_custom = row.get("is_custom").is_some_and(coerce_flag);

    let base_id = identity::base_id(&system, &object, &field);

    let source = row
        .get("source")
        .and_then(Value::as_str)
        .and_then(parse_origin)
        .or(options.source)
        .unwrap_or_default();

    let imported_at = timestamp(row, "imported_at").or_else(|| {
        (options.source == Some(FieldOrigin::Import)).then_some(options.now)
    });

    let origin_id = match row.get("originId").and_then(Value::as_str) {
        Some(origin) if !origin.is_empty() => origin.to_string(),
        _ => base_id.clone(),
    };

    NormalizedField {
        row_index,
        field: Field {
            id: base_id,
            origin_id,
            system,
            object,
            field,
            data_type: text(row, DATA_TYPE_KEYS),
            required,
            key_type: text(row, KEY_TYPE_KEYS),
            description: text(row, DESCRIPTION_KEYS),
            is_custom,
            source,
            version: version(row),
            imported_at,
            edited_at: timestamp(row, "edited_at"),
            created_at: timestamp(row, "created_at"),
        },
    }
}

/// Coerce a boolean-ish value: booleans as-is, strings via [`TRUTHY_FLAGS`],
/// numbers when non-zero.
pub fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => TRUTHY_FLAGS.contains(&s.trim().to_lowercase().as_str()),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// First candidate value that is present and non-empty.
fn first_truthy<'a>(row: &'a RawRow, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| row.get(*k)).find(|v| is_truthy(v))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Resolve a text attribute through its candidate keys.
fn text(row: &RawRow, keys: &[&str]) -> String {
    match first_truthy(row, keys) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn parse_origin(raw: &str) -> Option<FieldOrigin> {
    match raw.trim().to_lowercase().as_str() {
        "import" => Some(FieldOrigin::Import),
        "manual" => Some(FieldOrigin::Manual),
        _ => None,
    }
}

fn timestamp(row: &RawRow, key: &str) -> Option<DateTime<Utc>> {
    row.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn version(row: &RawRow) -> u32 {
    let parsed = match row.get("version") {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| *v > 0).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RawRow {
        match value {
            Value::Object(map) => map,
            _ => panic!("test rows must be objects"),
        }
    }

    fn opts() -> NormalizeOptions {
        NormalizeOptions::import(Utc::now())
    }

    #[test]
    fn required_yes_string_and_bool_true_agree() {
        let a = normalize_field(&row(json!({"Required": "Yes"})), 0, &opts());
        let b = normalize_field(&row(json!({"required": true})), 1, &opts());
        let c = normalize_field(&row(json!({"Required": "no"})), 2, &opts());
        assert!(a.field.required);
        assert!(b.field.required);
        assert!(!c.field.required);
    }

    #[test]
    fn required_accepts_flag_variants() {
        for raw in ["y", "YES", "True", "1"] {
            let n = normalize_field(&row(json!({"required": raw})), 0, &opts());
            assert!(n.field.required, "{raw} should be true");
        }
        for raw in ["n", "false", "0", "", "maybe"] {
            let n = normalize_field(&row(json!({"required": raw})), 0, &opts());
            assert!(!n.field.required, "{raw} should be false");
        }
    }

    #[test]
    fn column_aliases_resolve_first_non_empty() {
        let n = normalize_field(
            &row(json!({
                "system": "",
                "System": "Centric",
                "system_name": "Ignored",
                "business_object": "Style",
                "field_name": "season",
                "dataType": "string",
                "KeyType": "FK",
                "Description": "Season code"
            })),
            4,
            &opts(),
        );
        assert_eq!(n.row_index, 4);
        assert_eq!(n.field.system, "Centric");
        assert_eq!(n.field.object, "Style");
        assert_eq!(n.field.field, "season");
        assert_eq!(n.field.data_type, "string");
        assert_eq!(n.field.key_type, "FK");
        assert_eq!(n.field.description, "Season code");
    }

    #[test]
    fn id_and_origin_are_synthesized() {
        let n = normalize_field(
            &row(json!({"system": "A", "object": "B", "field": "C"})),
            0,
            &opts(),
        );
        assert_eq!(n.field.id, "A.B.C");
        assert_eq!(n.field.origin_id, "A.B.C");
        assert_eq!(n.field.version, 1);
        assert_eq!(n.field.source, FieldOrigin::Import);
        assert!(n.field.imported_at.is_some());
    }

    #[test]
    fn explicit_origin_id_is_kept() {
        let n = normalize_field(
            &row(json!({"system": "A", "object": "B", "field": "C2", "originId": "A.B.C"})),
            0,
            &opts(),
        );
        assert_eq!(n.field.id, "A.B.C2");
        assert_eq!(n.field.origin_id, "A.B.C");
    }

    #[test]
    fn reimported_metadata_is_preserved() {
        let n = normalize_field(
            &row(json!({
                "system": "A", "object": "B", "field": "C",
                "is_custom": true, "source": "manual", "version": 4,
                "edited_at": "2025-01-02T03:04:05Z"
            })),
            0,
            &opts(),
        );
        assert!(n.field.is_custom);
        assert_eq!(n.field.source, FieldOrigin::Manual);
        assert_eq!(n.field.version, 4);
        assert!(n.field.edited_at.is_some());
    }

    #[test]
    fn manual_source_does_not_stamp_import_time() {
        let options = NormalizeOptions {
            source: Some(FieldOrigin::Manual),
            now: Utc::now(),
        };
        let n = normalize_field(&row(json!({"system": "A", "object": "B", "field": "C"})), 0, &options);
        assert_eq!(n.field.source, FieldOrigin::Manual);
        assert!(n.field.imported_at.is_none());
    }

    #[test]
    fn missing_identity_is_reported_not_rejected() {
        let n = normalize_field(&row(json!({"system": "A", "object": "B"})), 0, &opts());
        assert_eq!(n.missing_identity(), Some("field"));
        assert_eq!(n.field.id, "A.B.");
    }

    #[test]
    fn numeric_cells_become_text() {
        let n = normalize_field(
            &row(json!({"system": "A", "object": "B", "field": 42, "required": 1})),
            0,
            &opts(),
        );
        assert_eq!(n.field.field, "42");
        assert!(n.field.required);
    }
}
