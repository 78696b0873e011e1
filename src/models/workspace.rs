//! Persisted workspace state and the portable workspace export document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::catalog::CatalogMeta;
use crate::models::field::Field;
use crate::models::hierarchy::{Flow, Map, MapMetadata, MapStatus, Package, Sequence};
use crate::models::mapping::MappingRow;

/// Workspace export format written by this crate.
pub const EXPORT_VERSION: &str = "2.0";

/// Export versions accepted on import.
pub const SUPPORTED_EXPORT_VERSIONS: [&str; 2] = ["1.0", "2.0"];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dark => write!(f, "dark"),
            Self::Light => write!(f, "light"),
        }
    }
}

/// Everything persisted under the state key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub maps: Vec<Map>,
    #[serde(default)]
    pub active_flow_id: Option<String>,
    #[serde(default)]
    pub active_sequence_id: Option<String>,
    #[serde(default)]
    pub active_map_id: Option<String>,
    #[serde(default)]
    pub fields_catalog: Vec<Field>,
    #[serde(default)]
    pub catalog_meta: Option<CatalogMeta>,
}

impl WorkspaceState {
    /// Fresh workspace: one package, sequence, flow and empty map, all active.
    pub fn new(now: DateTime<Utc>) -> Self {
        let package = Package {
            id: "pkg_01".to_string(),
            name: "Package 01".to_string(),
            collapsed: false,
        };
        let flow = Flow {
            id: "flow_01".to_string(),
            name: "Flow 01".to_string(),
            package_id: package.id.clone(),
            sequence_id: "seq_01".to_string(),
            source_system: String::new(),
            target_system: String::new(),
            mappings: vec![],
        };
        let sequence = Sequence {
            id: "seq_01".to_string(),
            name: "Sequence 01".to_string(),
            package_id: package.id.clone(),
            trigger: Default::default(),
            sla_frequency: None,
            sla_timeout: None,
            status: Default::default(),
            flows: vec![flow.id.clone()],
            metadata: Default::default(),
        };
        let map = Map {
            id: "map_01".to_string(),
            name: "Map 01".to_string(),
            flow_id: flow.id.clone(),
            mappings: vec![],
            status: MapStatus::Draft,
            created_at: now,
            updated_at: now,
            metadata: MapMetadata::default(),
        };

        Self {
            schema_version: crate::services::migration::CURRENT_SCHEMA_VERSION,
            active_flow_id: Some(flow.id.clone()),
            active_sequence_id: Some(sequence.id.clone()),
            active_map_id: Some(map.id.clone()),
            packages: vec![package],
            sequences: vec![sequence],
            flows: vec![flow],
            maps: vec![map],
            fields_catalog: vec![],
            catalog_meta: None,
        }
    }

    pub fn find_field(&self, field_id: &str) -> Option<&Field> {
        self.fields_catalog.iter().find(|f| f.id == field_id)
    }

    pub fn find_flow(&self, flow_id: &str) -> Option<&Flow> {
        self.flows.iter().find(|f| f.id == flow_id)
    }

    pub fn find_map(&self, map_id: &str) -> Option<&Map> {
        self.maps.iter().find(|m| m.id == map_id)
    }

    pub fn find_map_mut(&mut self, map_id: &str) -> Option<&mut Map> {
        self.maps.iter_mut().find(|m| m.id == map_id)
    }

    /// Maps owned by a flow, in storage order.
    pub fn maps_of_flow<'a>(&'a self, flow_id: &'a str) -> impl Iterator<Item = &'a Map> + 'a {
        self.maps.iter().filter(move |m| m.flow_id == flow_id)
    }

    /// Every mapping row in the workspace, across all maps and any rows
    /// still held by flows in legacy form.
    pub fn mapping_rows(&self) -> impl Iterator<Item = &MappingRow> {
        self.maps
            .iter()
            .flat_map(|m| m.mappings.iter())
            .chain(self.flows.iter().flat_map(|f| f.mappings.iter()))
    }

    /// Mutable counterpart of [`WorkspaceState::mapping_rows`].
    pub fn mapping_rows_mut(&mut self) -> impl Iterator<Item = &mut MappingRow> {
        self.maps
            .iter_mut()
            .flat_map(|m| m.mappings.iter_mut())
            .chain(self.flows.iter_mut().flat_map(|f| f.mappings.iter_mut()))
    }

    /// Apply `f` to every mapping-row list (maps and legacy flow lists).
    pub fn for_each_row_list(&mut self, mut f: impl FnMut(&mut Vec<MappingRow>)) {
        for map in &mut self.maps {
            f(&mut map.mappings);
        }
        for flow in &mut self.flows {
            if !flow.mappings.is_empty() {
                f(&mut flow.mappings);
            }
        }
    }
}

/// Portable workspace document produced by export and accepted by import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub maps: Vec<Map>,
    #[serde(rename = "fieldsCatalog", default)]
    pub fields_catalog: Vec<Field>,
    #[serde(rename = "catalogMeta", default)]
    pub catalog_meta: Option<CatalogMeta>,
    #[serde(rename = "activeFlowId", default)]
    pub active_flow_id: Option<String>,
    #[serde(rename = "activeSequenceId", default)]
    pub active_sequence_id: Option<String>,
    #[serde(rename = "activeMapId", default)]
    pub active_map_id: Option<String>,
    #[serde(default)]
    pub theme: Theme,
}
