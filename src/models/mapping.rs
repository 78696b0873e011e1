//! Mapping table rows and the field projections placed on each side.

use serde::{Deserialize, Serialize};

use crate::models::field::Field;

/// Priority levels offered for a mapping side. The empty string means unset.
pub const PRIORITY_LEVELS: [&str; 4] = ["", "P0", "P1", "P2"];

/// Which side of a mapping row a field sits on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Projection of a catalog field onto one side of a mapping row, plus the
/// flags that belong to the mapping rather than the field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldRef {
    pub id: String,
    #[serde(rename = "originId", default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub field: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub key_type: String,
    #[serde(default)]
    pub required_by_system: bool,
    #[serde(default)]
    pub required_in_integration: bool,
    #[serde(default)]
    pub priority_level: String,
}

impl FieldRef {
    /// Fresh projection with per-mapping flags reset.
    pub fn from_field(field: &Field) -> Self {
        Self {
            id: field.id.clone(),
            origin_id: Some(field.origin_id.clone()),
            system: field.system.clone(),
            object: field.object.clone(),
            field: field.field.clone(),
            data_type: field.data_type.clone(),
            required: field.required,
            key_type: field.key_type.clone(),
            required_by_system: false,
            required_in_integration: false,
            priority_level: String::new(),
        }
    }

    /// Re-project from a catalog field, keeping this side's mapping flags.
    pub fn refreshed_from(&self, field: &Field) -> Self {
        Self {
            required_by_system: self.required_by_system,
            required_in_integration: self.required_in_integration,
            priority_level: self.priority_level.clone(),
            ..Self::from_field(field)
        }
    }

    /// Dotted `system.object.field` path used by the profile export.
    pub fn path(&self) -> String {
        format!("{}.{}.{}", self.system, self.object, self.field)
    }
}

/// Annotations shared by both sides of a row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SharedAnnotations {
    #[serde(default)]
    pub human_name: String,
    #[serde(default)]
    pub transform_rule: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: String,
}

/// One row of a mapping table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_id: Option<String>,
    #[serde(default)]
    pub source: Option<FieldRef>,
    #[serde(default)]
    pub target: Option<FieldRef>,
    #[serde(default)]
    pub shared: SharedAnnotations,
}

impl MappingRow {
    pub fn new(id: String, flow_id: Option<String>, map_id: Option<String>) -> Self {
        Self {
            id,
            flow_id,
            map_id,
            source: None,
            target: None,
            shared: SharedAnnotations::default(),
        }
    }

    pub fn side(&self, side: Side) -> Option<&FieldRef> {
        match side {
            Side::Source => self.source.as_ref(),
            Side::Target => self.target.as_ref(),
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut Option<FieldRef> {
        match side {
            Side::Source => &mut self.source,
            Side::Target => &mut self.target,
        }
    }

    /// A row with neither side filled.
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.target.is_none()
    }

    /// True when either side points at the catalog field `field_id`.
    pub fn references(&self, field_id: &str) -> bool {
        self.source.as_ref().is_some_and(|s| s.id == field_id)
            || self.target.as_ref().is_some_and(|t| t.id == field_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::FieldOrigin;

    fn sample_field() -> Field {
        Field {
            id: "Centric.Style.season_1".to_string(),
            origin_id: "Centric.Style.season".to_string(),
            system: "Centric".to_string(),
            object: "Style".to_string(),
            field: "season".to_string(),
            data_type: "string".to_string(),
            required: true,
            key_type: String::new(),
            description: String::new(),
            is_custom: false,
            source: FieldOrigin::Import,
            version: 1,
            imported_at: None,
            edited_at: None,
            created_at: None,
        }
    }

    #[test]
    fn field_ref_uses_type_key() {
        let r = FieldRef::from_field(&sample_field());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], "string");
        assert_eq!(json["originId"], "Centric.Style.season");
        assert_eq!(json["priority_level"], "");
    }

    #[test]
    fn refresh_keeps_mapping_flags() {
        let mut r = FieldRef::from_field(&sample_field());
        r.required_by_system = true;
        r.priority_level = "P1".to_string();

        let mut updated = sample_field();
        updated.data_type = "enum".to_string();
        let refreshed = r.refreshed_from(&updated);
        assert_eq!(refreshed.data_type, "enum");
        assert!(refreshed.required_by_system);
        assert_eq!(refreshed.priority_level, "P1");
    }

    #[test]
    fn row_reference_checks_both_sides() {
        let mut row = MappingRow::new("m1".to_string(), None, None);
        assert!(row.is_empty());
        row.target = Some(FieldRef::from_field(&sample_field()));
        assert!(row.references("Centric.Style.season_1"));
        assert!(!row.references("Centric.Style.season"));
        assert!(!row.is_empty());
    }

    #[test]
    fn legacy_row_without_ids_deserializes() {
        let row: MappingRow = serde_json::from_value(serde_json::json!({
            "id": "mapping-1",
            "source": {"id": "A.B.C", "system": "A", "object": "B", "field": "C"},
            "target": null,
            "shared": {"human_name": "Colour"}
        }))
        .unwrap();
        assert_eq!(row.source.unwrap().origin_id, None);
        assert_eq!(row.shared.human_name, "Colour");
        assert_eq!(row.shared.status, "");
    }
}
