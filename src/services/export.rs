//! Export formatters: mapping CSV, JSON data contract and integration
//! profile. Every input row produces exactly one output entry, in order.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::mapping::{FieldRef, MappingRow};

pub const MAPPINGS_CSV_FILENAME: &str = "icd_mappings_export.csv";

const CONTRACT_VERSION: &str = "1.0";
const PROFILE_VERSION: &str = "1.0";

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// One flattened CSV line.
#[derive(Debug, Serialize)]
struct CsvRecord<'a> {
    flow_id: &'a str,
    source_system: &'a str,
    source_object: &'a str,
    source_field: &'a str,
    source_type: &'a str,
    source_key_type: &'a str,
    source_required_by_system: &'static str,
    source_required_in_integration: &'static str,
    source_priority_level: &'a str,
    target_system: &'a str,
    target_object: &'a str,
    target_field: &'a str,
    target_type: &'a str,
    target_key_type: &'a str,
    target_required_by_system: &'static str,
    target_required_in_integration: &'static str,
    target_priority_level: &'a str,
    human_name: &'a str,
    transform_rule: &'a str,
    notes: &'a str,
    status: &'a str,
}

/// Render rows as the flattened mapping CSV.
pub fn mappings_csv(rows: &[MappingRow]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let empty = FieldRef::default();

    for row in rows {
        let source = row.source.as_ref().unwrap_or(&empty);
        let target = row.target.as_ref().unwrap_or(&empty);
        writer
            .serialize(CsvRecord {
                flow_id: row.flow_id.as_deref().unwrap_or_default(),
                source_system: &source.system,
                source_object: &source.object,
                source_field: &source.field,
                source_type: &source.data_type,
                source_key_type: &source.key_type,
                source_required_by_system: yes_no(source.required_by_system),
                source_required_in_integration: yes_no(source.required_in_integration),
                source_priority_level: &source.priority_level,
                target_system: &target.system,
                target_object: &target.object,
                target_field: &target.field,
                target_type: &target.data_type,
                target_key_type: &target.key_type,
                target_required_by_system: yes_no(target.required_by_system),
                target_required_in_integration: yes_no(target.required_in_integration),
                target_priority_level: &target.priority_level,
                human_name: &row.shared.human_name,
                transform_rule: &row.shared.transform_rule,
                notes: &row.shared.notes,
                status: &row.shared.status,
            })
            .map_err(|e| AppError::Internal(format!("Failed to write CSV record: {e}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(e.to_string()))
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ContractSide {
    pub system: String,
    pub object: String,
    pub field: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub required: bool,
    pub key_type: String,
    pub required_by_system: bool,
    pub required_in_integration: bool,
    pub priority_level: String,
}

impl From<Option<&FieldRef>> for ContractSide {
    fn from(side: Option<&FieldRef>) -> Self {
        match side {
            Some(r) => Self {
                system: r.system.clone(),
                object: r.object.clone(),
                field: r.field.clone(),
                data_type: r.data_type.clone(),
                required: r.required,
                key_type: r.key_type.clone(),
                required_by_system: r.required_by_system,
                required_in_integration: r.required_in_integration,
                priority_level: r.priority_level.clone(),
            },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContractMapping {
    pub source: ContractSide,
    pub target: ContractSide,
    pub human_name: String,
    pub transform: String,
    pub notes: String,
    pub status: String,
}

/// Nested JSON description of a flow's mappings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DataContract {
    pub flow_id: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub mappings: Vec<ContractMapping>,
}

pub fn data_contract(rows: &[MappingRow], flow_id: &str, now: DateTime<Utc>) -> DataContract {
    DataContract {
        flow_id: flow_id.to_string(),
        version: CONTRACT_VERSION.to_string(),
        timestamp: now,
        mappings: rows
            .iter()
            .map(|row| ContractMapping {
                source: row.source.as_ref().into(),
                target: row.target.as_ref().into(),
                human_name: row.shared.human_name.clone(),
                transform: row.shared.transform_rule.clone(),
                notes: row.shared.notes.clone(),
                status: row.shared.status.clone(),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationRules {
    pub type_check: bool,
    pub required_check: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SideRequirements {
    pub required_by_system: bool,
    pub required_in_integration: bool,
    pub priority_level: String,
}

impl From<Option<&FieldRef>> for SideRequirements {
    fn from(side: Option<&FieldRef>) -> Self {
        side.map(|r| Self {
            required_by_system: r.required_by_system,
            required_in_integration: r.required_in_integration,
            priority_level: r.priority_level.clone(),
        })
        .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Requirements {
    pub source: SideRequirements,
    pub target: SideRequirements,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileMetadata {
    pub source_type: String,
    pub target_type: String,
    pub notes: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileMapping {
    pub mapping_id: String,
    pub source_path: String,
    pub target_path: String,
    pub human_name: String,
    pub transform_function: String,
    pub validation_rules: ValidationRules,
    pub requirements: Requirements,
    pub metadata: ProfileMetadata,
}

/// Path-oriented profile consumed by the downstream integration engine.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IntegrationProfile {
    pub profile_id: String,
    pub profile_name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub field_mappings: Vec<ProfileMapping>,
}

pub fn integration_profile(rows: &[MappingRow], flow_id: &str, now: DateTime<Utc>) -> IntegrationProfile {
    let field_mappings = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let source = row.source.as_ref();
            let target = row.target.as_ref();
            // Two empty sides compare equal, one empty side never does.
            let type_check = source.map(|s| &s.data_type) == target.map(|t| &t.data_type);
            let required_check = source.is_some_and(|s| s.required) && target.is_some_and(|t| t.required);

            ProfileMapping {
                mapping_id: format!("{flow_id}_{}", i + 1),
                source_path: source.map(FieldRef::path).unwrap_or_default(),
                target_path: target.map(FieldRef::path).unwrap_or_default(),
                human_name: row.shared.human_name.clone(),
                transform_function: row.shared.transform_rule.clone(),
                validation_rules: ValidationRules {
                    type_check,
                    required_check,
                },
                requirements: Requirements {
                    source: source.into(),
                    target: target.into(),
                },
                metadata: ProfileMetadata {
                    source_type: source.map(|s| s.data_type.clone()).unwrap_or_default(),
                    target_type: target.map(|t| t.data_type.clone()).unwrap_or_default(),
                    notes: row.shared.notes.clone(),
                    status: row.shared.status.clone(),
                },
            }
        })
        .collect();

    IntegrationProfile {
        profile_id: flow_id.to_string(),
        profile_name: format!("Integration Profile - {flow_id}"),
        version: PROFILE_VERSION.to_string(),
        created_at: now,
        field_mappings,
    }
}

pub fn data_contract_filename(flow_id: &str) -> String {
    format!("data_contract_{flow_id}.json")
}

pub fn integration_profile_filename(flow_id: &str) -> String {
    format!("integration_profile_{flow_id}.json")
}

pub fn workspace_filename(now: DateTime<Utc>) -> String {
    format!("icd_workspace_{}.json", now.format("%Y-%m-%dT%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn side(system: &str, object: &str, field: &str, data_type: &str, required: bool) -> FieldRef {
        FieldRef {
            id: format!("{system}.{object}.{field}"),
            origin_id: Some(format!("{system}.{object}.{field}")),
            system: system.to_string(),
            object: object.to_string(),
            field: field.to_string(),
            data_type: data_type.to_string(),
            required,
            ..Default::default()
        }
    }

    fn rows() -> Vec<MappingRow> {
        let mut full = MappingRow::new("m1".to_string(), Some("flow_01".to_string()), Some("map_01".to_string()));
        let mut source = side("Centric", "Style", "season", "string", true);
        source.required_by_system = true;
        source.priority_level = "P0".to_string();
        full.source = Some(source);
        full.target = Some(side("Fulfil", "Product", "season", "string", true));
        full.shared.human_name = "Season, \"core\"".to_string();
        full.shared.transform_rule = "enum_lookup".to_string();

        let mut half = MappingRow::new("m2".to_string(), Some("flow_01".to_string()), Some("map_01".to_string()));
        half.target = Some(side("Fulfil", "Product", "weight", "number", false));

        let empty = MappingRow::new("m3".to_string(), None, None);
        vec![full, half, empty]
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let csv = mappings_csv(&rows()).unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 21);
        assert_eq!(&headers[0], "flow_id");
        assert_eq!(&headers[6], "source_required_by_system");
        assert_eq!(&headers[20], "status");

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(&records[0][1], "Centric");
        assert_eq!(&records[0][6], "Yes");
        assert_eq!(&records[0][8], "P0");
        assert_eq!(&records[0][17], "Season, \"core\"");
        assert_eq!(&records[1][1], "");
        assert_eq!(&records[1][6], "No");
        assert_eq!(&records[2][0], "");
    }

    #[test]
    fn csv_of_no_rows_is_empty() {
        assert_eq!(mappings_csv(&[]).unwrap(), "");
    }

    #[test]
    fn contract_defaults_missing_sides() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let contract = data_contract(&rows(), "flow_01", now);
        assert_eq!(contract.mappings.len(), 3);
        assert_eq!(contract.version, "1.0");
        assert_eq!(contract.mappings[0].transform, "enum_lookup");
        assert_eq!(contract.mappings[1].source, ContractSide::default());

        let json = serde_json::to_value(&contract).unwrap();
        assert_eq!(json["mappings"][0]["source"]["type"], "string");
        assert_eq!(json["mappings"][2]["target"]["required"], false);
        assert_eq!(json["timestamp"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn profile_numbers_mappings_and_builds_paths() {
        let profile = integration_profile(&rows(), "flow_01", Utc::now());
        let ids: Vec<&str> = profile.field_mappings.iter().map(|m| m.mapping_id.as_str()).collect();
        assert_eq!(ids, vec!["flow_01_1", "flow_01_2", "flow_01_3"]);

        let first = &profile.field_mappings[0];
        assert_eq!(first.source_path, "Centric.Style.season");
        assert!(first.validation_rules.type_check);
        assert!(first.validation_rules.required_check);
        assert_eq!(first.requirements.source.priority_level, "P0");

        let half = &profile.field_mappings[1];
        assert_eq!(half.source_path, "");
        assert!(!half.validation_rules.type_check);
        assert!(!half.validation_rules.required_check);
        assert_eq!(half.metadata.target_type, "number");

        assert!(profile.field_mappings[2].validation_rules.type_check);
    }

    #[test]
    fn suggested_filenames() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(workspace_filename(now), "icd_workspace_2024-03-01T09-05-07.json");
        assert_eq!(data_contract_filename("flow_02"), "data_contract_flow_02.json");
        assert_eq!(integration_profile_filename("flow_02"), "integration_profile_flow_02.json");
    }
}
