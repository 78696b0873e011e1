//! Mapping table editing and row validation.
//!
//! Every operation addresses one map. Placing a catalog field projects it
//! into a fresh [`FieldRef`] with the per-mapping flags reset; moving an
//! already placed field keeps its flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::field::Field;
use crate::models::hierarchy::Map;
use crate::models::mapping::{FieldRef, MappingRow, Side, PRIORITY_LEVELS};
use crate::models::workspace::WorkspaceState;
use crate::services::identity;

/// Transform rules offered for the shared `transform_rule` annotation.
pub const TRANSFORM_RULES: [&str; 8] = [
    "identity",
    "enum_lookup",
    "cnl_resolve",
    "string_to_number",
    "number_to_string",
    "compose",
    "uppercase",
    "lowercase",
];

/// Where a placed field lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// A specific existing row.
    Row(String),
    /// A new row appended to the map.
    New,
    /// The first row with that side empty, else a new row.
    Auto,
}

/// Partial update of a side's per-mapping flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SideFlags {
    pub required_by_system: Option<bool>,
    pub required_in_integration: Option<bool>,
    pub priority_level: Option<String>,
}

/// Partial update of a row's shared annotations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Annotations {
    pub human_name: Option<String>,
    pub transform_rule: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowIssue {
    #[serde(rename = "Missing source")]
    MissingSource,
    #[serde(rename = "Missing target")]
    MissingTarget,
    #[serde(rename = "Type mismatch")]
    TypeMismatch,
    #[serde(rename = "Required → optional")]
    RequiredToOptional,
    #[serde(rename = "Optional → required")]
    OptionalToRequired,
}

impl RowIssue {
    pub fn is_missing_side(self) -> bool {
        matches!(self, Self::MissingSource | Self::MissingTarget)
    }
}

impl std::fmt::Display for RowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSource => write!(f, "Missing source"),
            Self::MissingTarget => write!(f, "Missing target"),
            Self::TypeMismatch => write!(f, "Type mismatch"),
            Self::RequiredToOptional => write!(f, "Required → optional"),
            Self::OptionalToRequired => write!(f, "Optional → required"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowValidation {
    pub row_id: String,
    pub issues: Vec<RowIssue>,
    pub severity: Severity,
}

/// Put a catalog field on one side of a row.
pub fn place_field(
    state: &mut WorkspaceState,
    map_id: &str,
    field_id: &str,
    side: Side,
    placement: Placement,
    now: DateTime<Utc>,
) -> Result<MappingRow, AppError> {
    let field_ref = FieldRef::from_field(catalog_field(state, field_id)?);
    let map = map_mut(state, map_id)?;

    let index = match placement {
        Placement::Row(row_id) => row_index(map, &row_id)?,
        Placement::New => push_row(map),
        Placement::Auto => match map.mappings.iter().position(|r| r.side(side).is_none()) {
            Some(i) => i,
            None => push_row(map),
        },
    };

    *map.mappings[index].side_mut(side) = Some(field_ref);
    map.updated_at = now;
    tracing::debug!(map_id, field_id, side = %side, row_id = %map.mappings[index].id, "Field placed");
    Ok(map.mappings[index].clone())
}

/// One new row per field, in the given order.
pub fn bulk_add(
    state: &mut WorkspaceState,
    map_id: &str,
    field_ids: &[String],
    side: Side,
    now: DateTime<Utc>,
) -> Result<Vec<MappingRow>, AppError> {
    let refs: Vec<FieldRef> = field_ids
        .iter()
        .map(|id| catalog_field(state, id).map(FieldRef::from_field))
        .collect::<Result<_, _>>()?;

    let map = map_mut(state, map_id)?;
    let first = map.mappings.len();
    for field_ref in refs {
        let index = push_row(map);
        *map.mappings[index].side_mut(side) = Some(field_ref);
    }
    map.updated_at = now;
    tracing::info!(map_id, side = %side, added = field_ids.len(), "Fields bulk added");
    Ok(map.mappings[first..].to_vec())
}

/// Append an empty row.
pub fn add_row(state: &mut WorkspaceState, map_id: &str, now: DateTime<Utc>) -> Result<MappingRow, AppError> {
    let map = map_mut(state, map_id)?;
    let index = push_row(map);
    map.updated_at = now;
    Ok(map.mappings[index].clone())
}

/// Move a placed field to another row or side, keeping its flags.
///
/// Whatever sat on the destination side is replaced.
pub fn move_field(
    state: &mut WorkspaceState,
    map_id: &str,
    from: (&str, Side),
    to: (&str, Side),
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let map = map_mut(state, map_id)?;
    let (from_row, from_side) = from;
    let (to_row, to_side) = to;

    let source_index = row_index(map, from_row)?;
    let target_index = row_index(map, to_row)?;
    if source_index == target_index && from_side == to_side {
        return Ok(());
    }

    let moving = map.mappings[source_index]
        .side_mut(from_side)
        .take()
        .ok_or_else(|| AppError::Validation(format!("Row {from_row} has no {from_side} field")))?;
    *map.mappings[target_index].side_mut(to_side) = Some(moving);
    map.updated_at = now;
    Ok(())
}

/// Move the row at `from` to position `to`.
pub fn reorder(state: &mut WorkspaceState, map_id: &str, from: usize, to: usize, now: DateTime<Utc>) -> Result<(), AppError> {
    let map = map_mut(state, map_id)?;
    let len = map.mappings.len();
    if from >= len || to >= len {
        return Err(AppError::Validation(format!(
            "Row position out of range: map has {len} row(s)"
        )));
    }
    if from != to {
        let row = map.mappings.remove(from);
        map.mappings.insert(to, row);
        map.updated_at = now;
    }
    Ok(())
}

pub fn set_side_flags(
    state: &mut WorkspaceState,
    map_id: &str,
    row_id: &str,
    side: Side,
    flags: SideFlags,
    now: DateTime<Utc>,
) -> Result<FieldRef, AppError> {
    if let Some(level) = flags.priority_level.as_deref() {
        if !PRIORITY_LEVELS.contains(&level) {
            return Err(AppError::Validation(format!(
                "Unknown priority level '{level}'; expected one of P0, P1, P2 or empty"
            )));
        }
    }

    let map = map_mut(state, map_id)?;
    let index = row_index(map, row_id)?;
    let field_ref = map.mappings[index]
        .side_mut(side)
        .as_mut()
        .ok_or_else(|| AppError::Validation(format!("Row {row_id} has no {side} field")))?;

    if let Some(v) = flags.required_by_system {
        field_ref.required_by_system = v;
    }
    if let Some(v) = flags.required_in_integration {
        field_ref.required_in_integration = v;
    }
    if let Some(level) = flags.priority_level {
        field_ref.priority_level = level;
    }
    let updated = field_ref.clone();
    map.updated_at = now;
    Ok(updated)
}

pub fn annotate(
    state: &mut WorkspaceState,
    map_id: &str,
    row_id: &str,
    annotations: Annotations,
    now: DateTime<Utc>,
) -> Result<MappingRow, AppError> {
    if let Some(rule) = annotations.transform_rule.as_deref() {
        if !rule.is_empty() && !TRANSFORM_RULES.contains(&rule) {
            return Err(AppError::Validation(format!(
                "Unknown transform rule '{rule}'; expected one of {}",
                TRANSFORM_RULES.join(", ")
            )));
        }
    }

    let map = map_mut(state, map_id)?;
    let index = row_index(map, row_id)?;
    let shared = &mut map.mappings[index].shared;
    if let Some(v) = annotations.human_name {
        shared.human_name = v;
    }
    if let Some(v) = annotations.transform_rule {
        shared.transform_rule = v;
    }
    if let Some(v) = annotations.notes {
        shared.notes = v;
    }
    if let Some(v) = annotations.status {
        shared.status = v;
    }
    map.updated_at = now;
    Ok(map.mappings[index].clone())
}

pub fn remove_row(state: &mut WorkspaceState, map_id: &str, row_id: &str, now: DateTime<Utc>) -> Result<MappingRow, AppError> {
    let map = map_mut(state, map_id)?;
    let index = row_index(map, row_id)?;
    let row = map.mappings.remove(index);
    map.updated_at = now;
    Ok(row)
}

pub fn list_rows(state: &WorkspaceState, map_id: &str) -> Result<Vec<MappingRow>, AppError> {
    state
        .find_map(map_id)
        .map(|m| m.mappings.clone())
        .ok_or_else(|| AppError::NotFound(format!("Map {map_id}")))
}

/// Check one row for missing sides and attribute mismatches.
pub fn validate_row(row: &MappingRow) -> RowValidation {
    let mut issues = Vec::new();
    if row.source.is_none() {
        issues.push(RowIssue::MissingSource);
    }
    if row.target.is_none() {
        issues.push(RowIssue::MissingTarget);
    }

    if let (Some(source), Some(target)) = (&row.source, &row.target) {
        if !source.data_type.is_empty() && !target.data_type.is_empty() && source.data_type != target.data_type {
            issues.push(RowIssue::TypeMismatch);
        }
        if source.required && !target.required {
            issues.push(RowIssue::RequiredToOptional);
        }
        if !source.required && target.required {
            issues.push(RowIssue::OptionalToRequired);
        }
    }

    let severity = if issues.iter().any(|i| i.is_missing_side()) {
        Severity::Error
    } else if !issues.is_empty() {
        Severity::Warning
    } else {
        Severity::Ok
    };

    RowValidation {
        row_id: row.id.clone(),
        issues,
        severity,
    }
}

pub fn validate_map(state: &WorkspaceState, map_id: &str) -> Result<Vec<RowValidation>, AppError> {
    let map = state
        .find_map(map_id)
        .ok_or_else(|| AppError::NotFound(format!("Map {map_id}")))?;
    Ok(map.mappings.iter().map(validate_row).collect())
}

fn catalog_field<'a>(state: &'a WorkspaceState, field_id: &str) -> Result<&'a Field, AppError> {
    state
        .find_field(field_id)
        .ok_or_else(|| AppError::NotFound(format!("Field {field_id}")))
}

fn map_mut<'a>(state: &'a mut WorkspaceState, map_id: &str) -> Result<&'a mut Map, AppError> {
    state
        .find_map_mut(map_id)
        .ok_or_else(|| AppError::NotFound(format!("Map {map_id}")))
}

fn row_index(map: &Map, row_id: &str) -> Result<usize, AppError> {
    map.mappings
        .iter()
        .position(|r| r.id == row_id)
        .ok_or_else(|| AppError::NotFound(format!("Mapping row {row_id}")))
}

fn push_row(map: &mut Map) -> usize {
    map.mappings.push(MappingRow::new(
        identity::new_row_id(),
        Some(map.flow_id.clone()),
        Some(map.id.clone()),
    ));
    map.mappings.len() - 1
}
