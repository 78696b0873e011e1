//! Catalog field model and the DTOs used to create and edit fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// How a field entered the catalog.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldOrigin {
    #[default]
    Import,
    Manual,
}

impl std::fmt::Display for FieldOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Import => write!(f, "import"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

fn default_version() -> u32 {
    1
}

/// Canonical catalog entry.
///
/// `id` is unique within one catalog snapshot and may carry a `_N` suffix
/// (duplicate rows) or a `custom_<millis>_` prefix (manual fields).
/// `origin_id` is the stable `system.object.field` business key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub id: String,
    #[serde(rename = "originId", default)]
    pub origin_id: String,
    pub system: String,
    pub object: String,
    pub field: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub key_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub source: FieldOrigin,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub imported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Field {
    /// The `system.object.field` tuple this field currently carries.
    pub fn base_id(&self) -> String {
        crate::services::identity::base_id(&self.system, &self.object, &self.field)
    }
}

/// Input for manual (custom) field creation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateField {
    #[validate(length(min = 1, message = "system is required"))]
    pub system: String,
    #[validate(length(min = 1, message = "object is required"))]
    pub object: String,
    #[validate(length(min = 1, message = "field is required"))]
    pub field: String,
    pub data_type: Option<String>,
}

/// Partial update applied to an existing catalog field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateField {
    pub system: Option<String>,
    pub object: Option<String>,
    pub field: Option<String>,
    pub data_type: Option<String>,
    pub required: Option<bool>,
    pub key_type: Option<String>,
    pub description: Option<String>,
}

impl UpdateField {
    /// True when the update touches the identifying tuple.
    pub fn changes_identity(&self) -> bool {
        self.system.is_some() || self.object.is_some() || self.field.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.changes_identity()
            && self.data_type.is_none()
            && self.required.is_none()
            && self.key_type.is_none()
            && self.description.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_origin_serializes_lowercase() {
        let json = serde_json::to_value(FieldOrigin::Manual).unwrap();
        assert_eq!(json, "manual");
        assert_eq!(FieldOrigin::Import.to_string(), "import");
    }

    #[test]
    fn field_deserializes_with_defaults() {
        let field: Field = serde_json::from_value(serde_json::json!({
            "id": "Centric.Style.name",
            "system": "Centric",
            "object": "Style",
            "field": "name"
        }))
        .unwrap();
        assert_eq!(field.version, 1);
        assert_eq!(field.source, FieldOrigin::Import);
        assert!(!field.is_custom);
        assert!(field.imported_at.is_none());
    }

    #[test]
    fn field_uses_origin_id_key() {
        let field: Field = serde_json::from_value(serde_json::json!({
            "id": "A.B.C_1",
            "originId": "A.B.C",
            "system": "A",
            "object": "B",
            "field": "C"
        }))
        .unwrap();
        assert_eq!(field.origin_id, "A.B.C");
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["originId"], "A.B.C");
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn create_field_validation() {
        let input = CreateField {
            system: "Fulfil".to_string(),
            object: String::new(),
            field: "sku".to_string(),
            data_type: None,
        };
        let err = input.validate().unwrap_err();
        assert!(err.field_errors().contains_key("object"));
    }

    #[test]
    fn update_field_identity_detection() {
        let update = UpdateField {
            description: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!update.changes_identity());
        assert!(!update.is_empty());

        let update = UpdateField {
            field: Some("sku_code".to_string()),
            ..Default::default()
        };
        assert!(update.changes_identity());
        assert!(UpdateField::default().is_empty());
    }
}
