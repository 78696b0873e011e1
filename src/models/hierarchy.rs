//! Package → Sequence → Flow → Map containment hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::mapping::MappingRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub collapsed: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SequenceTrigger {
    Event,
    Schedule,
    #[default]
    Manual,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SequenceStatus {
    Active,
    #[default]
    Draft,
    Disabled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SequenceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Ordered chain of flows inside a package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    pub package_id: String,
    #[serde(default)]
    pub trigger: SequenceTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_timeout: Option<String>,
    #[serde(default)]
    pub status: SequenceStatus,
    /// Ordered flow ids.
    #[serde(default)]
    pub flows: Vec<String>,
    #[serde(default)]
    pub metadata: SequenceMetadata,
}

/// A named source → target integration context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub package_id: String,
    #[serde(default)]
    pub sequence_id: String,
    #[serde(default)]
    pub source_system: String,
    #[serde(default)]
    pub target_system: String,
    /// Pre-hierarchy storage. Moved into a [`Map`] by migration; empty afterwards.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<MappingRow>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MapStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MapMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Mapping table owned by a flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Map {
    pub id: String,
    pub name: String,
    pub flow_id: String,
    #[serde(default)]
    pub mappings: Vec<MappingRow>,
    #[serde(default)]
    pub status: MapStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MapMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_defaults() {
        let seq: Sequence = serde_json::from_value(serde_json::json!({
            "id": "seq_01",
            "name": "Centric → Fulfil",
            "package_id": "pkg_01"
        }))
        .unwrap();
        assert_eq!(seq.trigger, SequenceTrigger::Manual);
        assert_eq!(seq.status, SequenceStatus::Draft);
        assert!(seq.flows.is_empty());
    }

    #[test]
    fn flow_omits_empty_legacy_mappings() {
        let flow = Flow {
            id: "flow_01".to_string(),
            name: "Flow 01".to_string(),
            package_id: "pkg_01".to_string(),
            sequence_id: "seq_01".to_string(),
            source_system: "Centric".to_string(),
            target_system: "Fulfil".to_string(),
            mappings: vec![],
        };
        let json = serde_json::to_value(&flow).unwrap();
        assert!(json.get("mappings").is_none());
    }

    #[test]
    fn map_status_serialization() {
        assert_eq!(serde_json::to_value(MapStatus::Archived).unwrap(), "archived");
    }
}
