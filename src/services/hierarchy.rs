//! Package → Sequence → Flow → Map management and active selection.
//!
//! Ids are `pkg_NN`, `seq_NN` and `flow_NN`, numbered past the highest id
//! in use. Names are trimmed, must be non-empty and are unique among
//! siblings of the same kind. Deletions that would orphan children or leave
//! the workspace without a flow or a flow without a map are rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::hierarchy::{
    Flow, Map, MapMetadata, MapStatus, Package, Sequence, SequenceMetadata, SequenceStatus,
    SequenceTrigger,
};
use crate::models::workspace::WorkspaceState;
use crate::services::identity;

/// Sequence attributes editable after creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SequenceUpdate {
    pub trigger: Option<SequenceTrigger>,
    pub status: Option<SequenceStatus>,
    pub sla_frequency: Option<String>,
    pub sla_timeout: Option<String>,
    pub owner: Option<String>,
}

/// Flow attributes editable after creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowUpdate {
    pub source_system: Option<String>,
    pub target_system: Option<String>,
    pub package_id: Option<String>,
}

/// Nested view of the hierarchy for listing.
#[derive(Debug, Serialize)]
pub struct PackageNode {
    #[serde(flatten)]
    pub package: Package,
    pub sequences: Vec<SequenceNode>,
}

#[derive(Debug, Serialize)]
pub struct SequenceNode {
    pub id: String,
    pub name: String,
    pub trigger: SequenceTrigger,
    pub status: SequenceStatus,
    pub flows: Vec<FlowNode>,
}

#[derive(Debug, Serialize)]
pub struct FlowNode {
    pub id: String,
    pub name: String,
    pub source_system: String,
    pub target_system: String,
    pub maps: Vec<MapNode>,
}

#[derive(Debug, Serialize)]
pub struct MapNode {
    pub id: String,
    pub name: String,
    pub status: MapStatus,
    pub rows: usize,
}

/// Active selection after a change.
#[derive(Debug, Serialize)]
pub struct Selection {
    pub flow_id: Option<String>,
    pub sequence_id: Option<String>,
    pub map_id: Option<String>,
}

impl Selection {
    pub fn of(state: &WorkspaceState) -> Self {
        Self {
            flow_id: state.active_flow_id.clone(),
            sequence_id: state.active_sequence_id.clone(),
            map_id: state.active_map_id.clone(),
        }
    }
}

// ---- packages ----

pub fn add_package(state: &mut WorkspaceState) -> Result<Package, AppError> {
    let (id, n) = identity::next_numbered_id("pkg_", state.packages.iter().map(|p| p.id.as_str()))?;
    let package = Package {
        id,
        name: format!("Package {n:02}"),
        collapsed: false,
    };
    tracing::info!(package_id = %package.id, "Package added");
    state.packages.push(package.clone());
    Ok(package)
}

pub fn rename_package(state: &mut WorkspaceState, package_id: &str, name: &str) -> Result<Package, AppError> {
    let name = checked_name(name, "package")?;
    if state.packages.iter().any(|p| p.id != package_id && p.name == name) {
        return Err(duplicate_name("package"));
    }
    let package = package_mut(state, package_id)?;
    package.name = name;
    Ok(package.clone())
}

pub fn toggle_package(state: &mut WorkspaceState, package_id: &str) -> Result<Package, AppError> {
    let package = package_mut(state, package_id)?;
    package.collapsed = !package.collapsed;
    Ok(package.clone())
}

pub fn delete_package(state: &mut WorkspaceState, package_id: &str) -> Result<Package, AppError> {
    let position = state
        .packages
        .iter()
        .position(|p| p.id == package_id)
        .ok_or_else(|| not_found("Package", package_id))?;
    if state.flows.iter().any(|f| f.package_id == package_id) {
        return Err(AppError::Conflict(
            "Cannot delete package with existing flows. Delete or move all flows first.".to_string(),
        ));
    }
    if state.packages.len() == 1 {
        return Err(AppError::Validation("Cannot delete the last package".to_string()));
    }

    state.sequences.retain(|s| s.package_id != package_id);
    let package = state.packages.remove(position);
    tracing::info!(package_id, "Package deleted");
    Ok(package)
}

// ---- sequences ----

pub fn add_sequence(
    state: &mut WorkspaceState,
    package_id: &str,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Sequence, AppError> {
    package_ref(state, package_id)?;
    let (id, n) = identity::next_numbered_id("seq_", state.sequences.iter().map(|s| s.id.as_str()))?;
    let name = match name {
        Some(name) => {
            let name = checked_name(name, "sequence")?;
            if state.sequences.iter().any(|s| s.name == name) {
                return Err(duplicate_name("sequence"));
            }
            name
        }
        None => format!("Sequence {n:02}"),
    };

    let sequence = Sequence {
        id,
        name,
        package_id: package_id.to_string(),
        trigger: SequenceTrigger::default(),
        sla_frequency: None,
        sla_timeout: None,
        status: SequenceStatus::default(),
        flows: Vec::new(),
        metadata: SequenceMetadata {
            owner: None,
            created_at: Some(now),
            updated_at: Some(now),
        },
    };
    tracing::info!(sequence_id = %sequence.id, package_id, "Sequence added");
    state.sequences.push(sequence.clone());
    Ok(sequence)
}

pub fn rename_sequence(
    state: &mut WorkspaceState,
    sequence_id: &str,
    name: &str,
    now: DateTime<Utc>,
) -> Result<Sequence, AppError> {
    let name = checked_name(name, "sequence")?;
    if state.sequences.iter().any(|s| s.id != sequence_id && s.name == name) {
        return Err(duplicate_name("sequence"));
    }
    let sequence = sequence_mut(state, sequence_id)?;
    sequence.name = name;
    sequence.metadata.updated_at = Some(now);
    Ok(sequence.clone())
}

pub fn configure_sequence(
    state: &mut WorkspaceState,
    sequence_id: &str,
    update: SequenceUpdate,
    now: DateTime<Utc>,
) -> Result<Sequence, AppError> {
    let sequence = sequence_mut(state, sequence_id)?;
    if let Some(trigger) = update.trigger {
        sequence.trigger = trigger;
    }
    if let Some(status) = update.status {
        sequence.status = status;
    }
    if let Some(frequency) = update.sla_frequency {
        sequence.sla_frequency = non_empty(frequency);
    }
    if let Some(timeout) = update.sla_timeout {
        sequence.sla_timeout = non_empty(timeout);
    }
    if let Some(owner) = update.owner {
        sequence.metadata.owner = non_empty(owner);
    }
    sequence.metadata.updated_at = Some(now);
    Ok(sequence.clone())
}

pub fn delete_sequence(state: &mut WorkspaceState, sequence_id: &str) -> Result<Sequence, AppError> {
    let position = state
        .sequences
        .iter()
        .position(|s| s.id == sequence_id)
        .ok_or_else(|| not_found("Sequence", sequence_id))?;
    let owns_flows = !state.sequences[position].flows.is_empty()
        || state.flows.iter().any(|f| f.sequence_id == sequence_id);
    if owns_flows {
        return Err(AppError::Conflict(
            "Cannot delete sequence with existing flows. Delete or move all flows first.".to_string(),
        ));
    }

    let sequence = state.sequences.remove(position);
    if state.active_sequence_id.as_deref() == Some(sequence_id) {
        state.active_sequence_id = state
            .active_flow_id
            .as_deref()
            .and_then(|id| state.find_flow(id))
            .map(|f| f.sequence_id.clone());
    }
    tracing::info!(sequence_id, "Sequence deleted");
    Ok(sequence)
}

// ---- flows ----

/// Add a flow with an empty `Map 01` and make it active.
pub fn add_flow(
    state: &mut WorkspaceState,
    package_id: Option<&str>,
    sequence_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Flow, AppError> {
    let (id, n) = next_flow_id(state)?;
    let package_id = match (package_id, sequence_id) {
        (Some(id), _) => package_ref(state, id)?.id.clone(),
        (None, Some(seq)) => sequence_ref(state, seq)?.package_id.clone(),
        (None, None) => match state.packages.first() {
            Some(first) => first.id.clone(),
            None => add_package(state)?.id,
        },
    };
    let sequence_id = resolve_sequence(state, &package_id, sequence_id, now)?;
    let flow = Flow {
        id,
        name: format!("Flow {n:02}"),
        package_id,
        sequence_id: sequence_id.clone(),
        source_system: String::new(),
        target_system: String::new(),
        mappings: Vec::new(),
    };
    let map = new_map(&flow.id, "Map 01".to_string(), now);

    attach_flow(state, &sequence_id, &flow.id);
    state.active_flow_id = Some(flow.id.clone());
    state.active_sequence_id = Some(sequence_id);
    state.active_map_id = Some(map.id.clone());
    state.maps.push(map);
    state.flows.push(flow.clone());

    tracing::info!(flow_id = %flow.id, "Flow added");
    Ok(flow)
}

/// Copy a flow with all its maps and rows under fresh ids.
pub fn duplicate_flow(state: &mut WorkspaceState, flow_id: &str, now: DateTime<Utc>) -> Result<Flow, AppError> {
    let source = flow_ref(state, flow_id)?.clone();
    let (id, _) = next_flow_id(state)?;

    let flow = Flow {
        id: id.clone(),
        name: unique_copy_name(state, &source.name),
        mappings: Vec::new(),
        ..source.clone()
    };

    let copies: Vec<Map> = state
        .maps_of_flow(flow_id)
        .map(|map| {
            let map_id = identity::new_map_id();
            let mappings = map
                .mappings
                .iter()
                .map(|row| {
                    let mut row = row.clone();
                    row.id = identity::new_row_id();
                    row.flow_id = Some(id.clone());
                    row.map_id = Some(map_id.clone());
                    row
                })
                .collect();
            Map {
                id: map_id,
                flow_id: id.clone(),
                mappings,
                created_at: now,
                updated_at: now,
                ..map.clone()
            }
        })
        .collect();

    attach_flow(state, &flow.sequence_id, &flow.id);
    state.active_flow_id = Some(flow.id.clone());
    state.active_map_id = copies.first().map(|m| m.id.clone());
    state.maps.extend(copies);
    state.flows.push(flow.clone());

    tracing::info!(source = flow_id, flow_id = %flow.id, "Flow duplicated");
    Ok(flow)
}

pub fn rename_flow(state: &mut WorkspaceState, flow_id: &str, name: &str) -> Result<Flow, AppError> {
    let name = checked_name(name, "flow")?;
    if state.flows.iter().any(|f| f.id != flow_id && f.name == name) {
        return Err(duplicate_name("flow"));
    }
    let flow = flow_mut(state, flow_id)?;
    flow.name = name;
    Ok(flow.clone())
}

/// Change a flow's systems or move it to another package.
pub fn configure_flow(
    state: &mut WorkspaceState,
    flow_id: &str,
    update: FlowUpdate,
    now: DateTime<Utc>,
) -> Result<Flow, AppError> {
    flow_ref(state, flow_id)?;

    if let Some(package_id) = update.package_id.as_deref() {
        package_ref(state, package_id)?;
        let current = flow_ref(state, flow_id)?;
        if current.package_id != package_id {
            let old_sequence = current.sequence_id.clone();
            let sequence_id = resolve_sequence(state, package_id, None, now)?;
            detach_flow(state, &old_sequence, flow_id);
            attach_flow(state, &sequence_id, flow_id);
            let flow = flow_mut(state, flow_id)?;
            flow.package_id = package_id.to_string();
            flow.sequence_id = sequence_id;
        }
    }

    let flow = flow_mut(state, flow_id)?;
    if let Some(system) = update.source_system {
        flow.source_system = system.trim().to_string();
    }
    if let Some(system) = update.target_system {
        flow.target_system = system.trim().to_string();
    }
    Ok(flow.clone())
}

/// Delete a flow and its maps. The last flow cannot be deleted.
pub fn delete_flow(state: &mut WorkspaceState, flow_id: &str) -> Result<Flow, AppError> {
    let position = state
        .flows
        .iter()
        .position(|f| f.id == flow_id)
        .ok_or_else(|| not_found("Flow", flow_id))?;
    if state.flows.len() == 1 {
        return Err(AppError::Validation("Cannot delete the last flow".to_string()));
    }

    let flow = state.flows.remove(position);
    state.maps.retain(|m| m.flow_id != flow_id);
    detach_flow(state, &flow.sequence_id, flow_id);

    if state.active_flow_id.as_deref() == Some(flow_id) {
        if let Some(first) = state.flows.first().map(|f| f.id.clone()) {
            select_flow(state, &first)?;
        }
    }
    tracing::info!(flow_id, "Flow deleted");
    Ok(flow)
}

// ---- maps ----

pub fn add_map(state: &mut WorkspaceState, flow_id: &str, now: DateTime<Utc>) -> Result<Map, AppError> {
    flow_ref(state, flow_id)?;
    let highest = state
        .maps_of_flow(flow_id)
        .filter_map(|m| m.name.strip_prefix("Map ")?.trim().parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        .max(u32::try_from(state.maps_of_flow(flow_id).count()).unwrap_or(u32::MAX));
    let next = highest
        .checked_add(1)
        .ok_or_else(|| AppError::Validation(format!("No map number left after Map {highest}")))?;

    let map = new_map(flow_id, format!("Map {next:02}"), now);
    state.active_flow_id = Some(flow_id.to_string());
    state.active_map_id = Some(map.id.clone());
    state.maps.push(map.clone());
    tracing::info!(map_id = %map.id, flow_id, "Map added");
    Ok(map)
}

pub fn rename_map(state: &mut WorkspaceState, map_id: &str, name: &str, now: DateTime<Utc>) -> Result<Map, AppError> {
    let name = checked_name(name, "map")?;
    let flow_id = map_ref(state, map_id)?.flow_id.clone();
    if state.maps_of_flow(&flow_id).any(|m| m.id != map_id && m.name == name) {
        return Err(duplicate_name("map"));
    }
    let map = map_mut(state, map_id)?;
    map.name = name;
    map.updated_at = now;
    Ok(map.clone())
}

pub fn set_map_status(
    state: &mut WorkspaceState,
    map_id: &str,
    status: MapStatus,
    now: DateTime<Utc>,
) -> Result<Map, AppError> {
    let map = map_mut(state, map_id)?;
    map.status = status;
    map.updated_at = now;
    Ok(map.clone())
}

/// Delete a map. A flow always keeps at least one map.
pub fn delete_map(state: &mut WorkspaceState, map_id: &str) -> Result<Map, AppError> {
    let position = state
        .maps
        .iter()
        .position(|m| m.id == map_id)
        .ok_or_else(|| not_found("Map", map_id))?;
    let flow_id = state.maps[position].flow_id.clone();
    if state.maps_of_flow(&flow_id).count() == 1 {
        return Err(AppError::Validation("Cannot delete the last map of a flow".to_string()));
    }

    let map = state.maps.remove(position);
    if state.active_map_id.as_deref() == Some(map_id) {
        let next_map_id = state.maps_of_flow(&flow_id).next().map(|m| m.id.clone());
        state.active_map_id = next_map_id;
    }
    tracing::info!(map_id, flow_id = %flow_id, "Map deleted");
    Ok(map)
}

// ---- selection ----

/// Select a flow together with its sequence and first map.
pub fn select_flow(state: &mut WorkspaceState, flow_id: &str) -> Result<Selection, AppError> {
    let sequence_id = flow_ref(state, flow_id)?.sequence_id.clone();
    let first_map_id = state.maps_of_flow(flow_id).next().map(|m| m.id.clone());
    state.active_map_id = first_map_id;
    state.active_flow_id = Some(flow_id.to_string());
    state.active_sequence_id = non_empty(sequence_id);
    Ok(Selection::of(state))
}

/// Select a map and the flow it belongs to.
pub fn select_map(state: &mut WorkspaceState, map_id: &str) -> Result<Selection, AppError> {
    let flow_id = map_ref(state, map_id)?.flow_id.clone();
    select_flow(state, &flow_id)?;
    state.active_map_id = Some(map_id.to_string());
    Ok(Selection::of(state))
}

/// Select a sequence; the active flow moves into it when it lies elsewhere.
pub fn select_sequence(state: &mut WorkspaceState, sequence_id: &str) -> Result<Selection, AppError> {
    let first_flow = sequence_ref(state, sequence_id)?.flows.first().cloned();
    let active_inside = state
        .active_flow_id
        .as_deref()
        .and_then(|id| state.find_flow(id))
        .is_some_and(|f| f.sequence_id == sequence_id);
    if !active_inside {
        if let Some(flow_id) = first_flow {
            select_flow(state, &flow_id)?;
        }
    }
    state.active_sequence_id = Some(sequence_id.to_string());
    Ok(Selection::of(state))
}

/// Map rows are edited in; defaults to the active map.
pub fn resolve_map_id(state: &WorkspaceState, map_id: Option<&str>) -> Result<String, AppError> {
    match map_id.or(state.active_map_id.as_deref()) {
        Some(id) => Ok(map_ref(state, id)?.id.clone()),
        None => Err(AppError::Validation("No map selected".to_string())),
    }
}

/// Repair structural gaps: at least one package and flow, a map per flow and
/// a valid selection.
pub fn ensure_minimum(state: &mut WorkspaceState, now: DateTime<Utc>) {
    if state.packages.is_empty() {
        if let Err(e) = add_package(state) {
            tracing::warn!(error = %e, "Could not create a default package");
            return;
        }
    }
    if state.flows.is_empty() {
        let package_id = state.packages[0].id.clone();
        if let Err(e) = add_flow(state, Some(&package_id), None, now) {
            tracing::warn!(error = %e, "Could not create a default flow");
        }
    }

    let missing: Vec<String> = state
        .flows
        .iter()
        .filter(|f| state.maps_of_flow(&f.id).next().is_none())
        .map(|f| f.id.clone())
        .collect();
    for flow_id in missing {
        state.maps.push(new_map(&flow_id, "Map 01".to_string(), now));
    }

    let active_valid = state
        .active_flow_id
        .as_deref()
        .is_some_and(|id| state.find_flow(id).is_some());
    let map_valid = state
        .active_map_id
        .as_deref()
        .and_then(|id| state.find_map(id))
        .is_some_and(|m| Some(m.flow_id.as_str()) == state.active_flow_id.as_deref());
    if !active_valid || !map_valid {
        let flow_id = match state.active_flow_id.clone().filter(|_| active_valid) {
            Some(id) => id,
            None => match state.flows.first() {
                Some(flow) => flow.id.clone(),
                None => return,
            },
        };
        // The flow exists, selection cannot fail.
        let _ = select_flow(state, &flow_id);
    }
}

/// Full hierarchy for display.
pub fn tree(state: &WorkspaceState) -> Vec<PackageNode> {
    state
        .packages
        .iter()
        .map(|package| PackageNode {
            package: package.clone(),
            sequences: state
                .sequences
                .iter()
                .filter(|s| s.package_id == package.id)
                .map(|sequence| SequenceNode {
                    id: sequence.id.clone(),
                    name: sequence.name.clone(),
                    trigger: sequence.trigger,
                    status: sequence.status,
                    flows: sequence
                        .flows
                        .iter()
                        .filter_map(|id| state.find_flow(id))
                        .map(|flow| FlowNode {
                            id: flow.id.clone(),
                            name: flow.name.clone(),
                            source_system: flow.source_system.clone(),
                            target_system: flow.target_system.clone(),
                            maps: state
                                .maps_of_flow(&flow.id)
                                .map(|m| MapNode {
                                    id: m.id.clone(),
                                    name: m.name.clone(),
                                    status: m.status,
                                    rows: m.mappings.len(),
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

// ---- helpers ----

fn new_map(flow_id: &str, name: String, now: DateTime<Utc>) -> Map {
    Map {
        id: identity::new_map_id(),
        name,
        flow_id: flow_id.to_string(),
        mappings: Vec::new(),
        status: MapStatus::Draft,
        created_at: now,
        updated_at: now,
        metadata: MapMetadata::default(),
    }
}

fn next_flow_id(state: &WorkspaceState) -> Result<(String, u32), AppError> {
    identity::next_numbered_id("flow_", state.flows.iter().map(|f| f.id.as_str()))
}

fn unique_copy_name(state: &WorkspaceState, name: &str) -> String {
    let base = format!("{name} (Copy)");
    let mut candidate = base.clone();
    let mut n = 2;
    while state.flows.iter().any(|f| f.name == candidate) {
        candidate = format!("{base} {n}");
        n += 1;
    }
    candidate
}

/// Given sequence, else the package's first sequence, else a new one.
fn resolve_sequence(
    state: &mut WorkspaceState,
    package_id: &str,
    sequence_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    if let Some(id) = sequence_id {
        let sequence = sequence_ref(state, id)?;
        if sequence.package_id != package_id {
            return Err(AppError::Validation(format!(
                "Sequence {id} belongs to package {}",
                sequence.package_id
            )));
        }
        return Ok(sequence.id.clone());
    }
    match state.sequences.iter().find(|s| s.package_id == package_id) {
        Some(sequence) => Ok(sequence.id.clone()),
        None => Ok(add_sequence(state, package_id, None, now)?.id),
    }
}

fn attach_flow(state: &mut WorkspaceState, sequence_id: &str, flow_id: &str) {
    if let Some(sequence) = state.sequences.iter_mut().find(|s| s.id == sequence_id) {
        if !sequence.flows.iter().any(|f| f == flow_id) {
            sequence.flows.push(flow_id.to_string());
        }
    }
}

fn detach_flow(state: &mut WorkspaceState, sequence_id: &str, flow_id: &str) {
    if let Some(sequence) = state.sequences.iter_mut().find(|s| s.id == sequence_id) {
        sequence.flows.retain(|f| f != flow_id);
    }
}

fn checked_name(name: &str, kind: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("The {kind} name cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn duplicate_name(kind: &str) -> AppError {
    AppError::Conflict(format!(
        "A {kind} with this name already exists. Please choose a unique name."
    ))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn not_found(kind: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{kind} {id}"))
}

fn package_ref<'a>(state: &'a WorkspaceState, id: &str) -> Result<&'a Package, AppError> {
    state.packages.iter().find(|p| p.id == id).ok_or_else(|| not_found("Package", id))
}

fn package_mut<'a>(state: &'a mut WorkspaceState, id: &str) -> Result<&'a mut Package, AppError> {
    state.packages.iter_mut().find(|p| p.id == id).ok_or_else(|| not_found("Package", id))
}

fn sequence_ref<'a>(state: &'a WorkspaceState, id: &str) -> Result<&'a Sequence, AppError> {
    state.sequences.iter().find(|s| s.id == id).ok_or_else(|| not_found("Sequence", id))
}

fn sequence_mut<'a>(state: &'a mut WorkspaceState, id: &str) -> Result<&'a mut Sequence, AppError> {
    state.sequences.iter_mut().find(|s| s.id == id).ok_or_else(|| not_found("Sequence", id))
}

fn flow_ref<'a>(state: &'a WorkspaceState, id: &str) -> Result<&'a Flow, AppError> {
    state.find_flow(id).ok_or_else(|| not_found("Flow", id))
}

fn flow_mut<'a>(state: &'a mut WorkspaceState, id: &str) -> Result<&'a mut Flow, AppError> {
    state.flows.iter_mut().find(|f| f.id == id).ok_or_else(|| not_found("Flow", id))
}

fn map_ref<'a>(state: &'a WorkspaceState, id: &str) -> Result<&'a Map, AppError> {
    state.find_map(id).ok_or_else(|| not_found("Map", id))
}

fn map_mut<'a>(state: &'a mut WorkspaceState, id: &str) -> Result<&'a mut Map, AppError> {
    state.find_map_mut(id).ok_or_else(|| not_found("Map", id))
}
