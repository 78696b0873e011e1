//! Versioned migration chain for persisted and imported workspace blobs.
//!
//! Steps run on raw JSON before deserialization so that shapes the typed
//! model no longer accepts can still be repaired. Every step is idempotent:
//! running it on data that already satisfies it changes nothing.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::{json, Map as JsonMap, Value};

use crate::errors::AppError;
use crate::services::identity;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

type Step = fn(&mut JsonMap<String, Value>, DateTime<Utc>) -> Result<(), AppError>;

/// Ordered migration steps: (target version, name, step).
const STEPS: &[(u32, &str, Step)] = &[
    (1, "field_metadata_backfill", backfill_field_metadata),
    (2, "flow_id_repair", repair_flow_ids),
    (3, "hierarchy_synthesis", synthesize_hierarchy),
];

/// Migrate a blob to [`CURRENT_SCHEMA_VERSION`].
pub fn migrate(value: Value) -> Result<Value, AppError> {
    migrate_at(value, Utc::now())
}

/// Migrate with an explicit clock, used for timestamps on synthesized maps.
pub fn migrate_at(value: Value, now: DateTime<Utc>) -> Result<Value, AppError> {
    let Value::Object(mut blob) = value else {
        return Err(AppError::Import("Workspace data must be a JSON object".to_string()));
    };

    // Versions past u32 can only come from a newer writer.
    let from = blob
        .get("schemaVersion")
        .and_then(Value::as_u64)
        .map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX));

    if from > CURRENT_SCHEMA_VERSION {
        tracing::warn!(
            from,
            current = CURRENT_SCHEMA_VERSION,
            "Workspace written by a newer schema, loading as-is"
        );
        return Ok(Value::Object(blob));
    }

    for (version, name, step) in STEPS {
        if *version > from {
            step(&mut blob, now)?;
            tracing::debug!(version, step = name, "Applied migration step");
        }
    }

    if from < CURRENT_SCHEMA_VERSION {
        tracing::info!(from, to = CURRENT_SCHEMA_VERSION, "Workspace migrated");
    }

    blob.insert("schemaVersion".to_string(), json!(CURRENT_SCHEMA_VERSION));
    Ok(Value::Object(blob))
}

// ---- v1: field metadata ----

fn backfill_field_metadata(blob: &mut JsonMap<String, Value>, _now: DateTime<Utc>) -> Result<(), AppError> {
    if let Some(catalog) = blob.get_mut("fieldsCatalog").and_then(Value::as_array_mut) {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();

        for field in catalog.iter_mut().filter_map(Value::as_object_mut) {
            backfill_field(field);

            let id = str_of(field, "id").to_string();
            let count = seen.entry(id.clone()).or_insert(0);
            let unique = if *count > 0 || taken.contains(&id) {
                let mut n = (*count).max(1);
                while taken.contains(&identity::suffixed(&id, n)) {
                    n += 1;
                }
                *count = n + 1;
                identity::suffixed(&id, n)
            } else {
                *count = 1;
                id
            };
            taken.insert(unique.clone());
            field.insert("id".to_string(), Value::String(unique));
        }
    }

    if let Some(meta) = blob.get_mut("catalogMeta").and_then(Value::as_object_mut) {
        if !is_set(meta.get("version")) {
            meta.insert("version".to_string(), json!(1));
            meta.insert("importStrategy".to_string(), json!("replace"));
        }
    }
    Ok(())
}

fn backfill_field(field: &mut JsonMap<String, Value>) {
    let is_custom = field.get("is_custom").and_then(Value::as_bool).unwrap_or(false);
    let created_at = field.get("created_at").filter(|v| is_set(Some(v))).cloned();

    if !is_set(field.get("source")) {
        let source = if is_custom { "manual" } else { "import" };
        field.insert("source".to_string(), json!(source));
    }
    if !is_set(field.get("imported_at")) && str_of(field, "source") == "import" {
        field.insert("imported_at".to_string(), created_at.clone().unwrap_or(Value::Null));
    }
    if !is_set(field.get("edited_at")) {
        if let Some(created) = created_at {
            field.insert("edited_at".to_string(), created);
        }
    }
    if !is_set(field.get("originId")) {
        let id = str_of(field, "id");
        let origin = if is_custom && id.starts_with("custom_") {
            match identity::parse_custom_id(id) {
                Some((_, base)) => base.to_string(),
                None => identity::base_id(
                    str_of(field, "system"),
                    str_of(field, "object"),
                    str_of(field, "field"),
                ),
            }
        } else {
            identity::strip_numeric_suffix(id).to_string()
        };
        field.insert("originId".to_string(), Value::String(origin));
    }
    if !is_set(field.get("version")) {
        field.insert("version".to_string(), json!(1));
    }
}

// ---- v2: flow ids ----

fn repair_flow_ids(blob: &mut JsonMap<String, Value>, _now: DateTime<Utc>) -> Result<(), AppError> {
    let Some(flows) = blob.get_mut("flows").and_then(Value::as_array_mut) else {
        return Ok(());
    };

    let mut used: Vec<String> = flows
        .iter()
        .filter_map(|f| f.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    let mut seen: HashSet<String> = HashSet::new();

    for flow in flows.iter_mut().filter_map(Value::as_object_mut) {
        let id = str_of(flow, "id").to_string();
        if seen.insert(id.clone()) {
            continue;
        }

        let (new_id, _) = identity::next_numbered_id("flow_", used.iter().map(String::as_str)).map_err(exhausted)?;
        tracing::warn!(duplicate = %id, reassigned = %new_id, "Duplicate flow id repaired");
        if let Some(rows) = flow.get_mut("mappings").and_then(Value::as_array_mut) {
            for row in rows.iter_mut().filter_map(Value::as_object_mut) {
                row.insert("flow_id".to_string(), Value::String(new_id.clone()));
            }
        }
        flow.insert("id".to_string(), Value::String(new_id.clone()));
        seen.insert(new_id.clone());
        used.push(new_id);
    }
    Ok(())
}

// ---- v3: Package → Sequence → Flow → Map ----

fn synthesize_hierarchy(blob: &mut JsonMap<String, Value>, now: DateTime<Utc>) -> Result<(), AppError> {
    if !blob.get("flows").is_some_and(Value::is_array) {
        return Ok(());
    }

    ensure_packages(blob);
    ensure_sequences(blob)?;
    ensure_maps(blob, now);
    ensure_selection(blob);
    Ok(())
}

fn ensure_packages(blob: &mut JsonMap<String, Value>) {
    let has_packages = blob
        .get("packages")
        .and_then(Value::as_array)
        .is_some_and(|p| !p.is_empty());
    if !has_packages {
        blob.insert(
            "packages".to_string(),
            json!([{ "id": "pkg_01", "name": "Package 01", "collapsed": false }]),
        );
    }

    let package_ids = ids_of(blob, "packages");
    let fallback = package_ids.first().cloned().unwrap_or_default();
    for flow in array_objects_mut(blob, "flows") {
        if !package_ids.contains(&str_of(flow, "package_id").to_string()) {
            flow.insert("package_id".to_string(), Value::String(fallback.clone()));
        }
    }
}

fn ensure_sequences(blob: &mut JsonMap<String, Value>) -> Result<(), AppError> {
    if !blob.get("sequences").is_some_and(Value::is_array) {
        blob.insert("sequences".to_string(), json!([]));
    }

    // Flow ids already listed by some sequence.
    let mut listed: HashSet<String> = HashSet::new();
    let mut sequence_ids: Vec<String> = Vec::new();
    for seq in array_objects_mut(blob, "sequences") {
        sequence_ids.push(str_of(seq, "id").to_string());
        if let Some(flows) = seq.get("flows").and_then(Value::as_array) {
            listed.extend(flows.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }

    let flows: Vec<(String, String, String)> = array_objects_mut(blob, "flows")
        .map(|f| {
            (
                str_of(f, "id").to_string(),
                str_of(f, "package_id").to_string(),
                str_of(f, "sequence_id").to_string(),
            )
        })
        .collect();

    for (flow_id, package_id, sequence_id) in flows {
        if sequence_ids.contains(&sequence_id) {
            if !listed.contains(&flow_id) {
                append_flow_to_sequence(blob, &sequence_id, &flow_id);
                listed.insert(flow_id);
            }
            continue;
        }

        let target = match sequence_in_package(blob, &package_id) {
            Some(id) => id,
            None => {
                let (id, n) =
                    identity::next_numbered_id("seq_", sequence_ids.iter().map(String::as_str)).map_err(exhausted)?;
                if let Some(seqs) = blob.get_mut("sequences").and_then(Value::as_array_mut) {
                    seqs.push(json!({
                        "id": id,
                        "name": format!("Sequence {n:02}"),
                        "package_id": package_id,
                        "trigger": "manual",
                        "status": "draft",
                        "flows": [],
                    }));
                }
                sequence_ids.push(id.clone());
                id
            }
        };

        if !listed.contains(&flow_id) {
            append_flow_to_sequence(blob, &target, &flow_id);
            listed.insert(flow_id.clone());
        }
        if let Some(flow) = array_objects_mut(blob, "flows").find(|f| str_of(f, "id") == flow_id) {
            flow.insert("sequence_id".to_string(), Value::String(target));
        }
    }
    Ok(())
}

fn sequence_in_package(blob: &mut JsonMap<String, Value>, package_id: &str) -> Option<String> {
    array_objects_mut(blob, "sequences")
        .find(|s| str_of(s, "package_id") == package_id)
        .map(|s| str_of(s, "id").to_string())
}

fn append_flow_to_sequence(blob: &mut JsonMap<String, Value>, sequence_id: &str, flow_id: &str) {
    if let Some(seq) = array_objects_mut(blob, "sequences").find(|s| str_of(s, "id") == sequence_id) {
        match seq.get_mut("flows").and_then(Value::as_array_mut) {
            Some(flows) => flows.push(Value::String(flow_id.to_string())),
            None => {
                seq.insert("flows".to_string(), json!([flow_id]));
            }
        }
    }
}

fn ensure_maps(blob: &mut JsonMap<String, Value>, now: DateTime<Utc>) {
    if !blob.get("maps").is_some_and(Value::is_array) {
        blob.insert("maps".to_string(), json!([]));
    }

    // Take legacy rows out of every flow.
    let legacy: Vec<(String, Vec<Value>)> = array_objects_mut(blob, "flows")
        .map(|flow| {
            let rows = match flow.remove("mappings") {
                Some(Value::Array(rows)) => rows,
                _ => Vec::new(),
            };
            (str_of(flow, "id").to_string(), rows)
        })
        .collect();

    let stamp = Value::String(now.to_rfc3339());
    for (flow_id, rows) in legacy {
        let existing = array_objects_mut(blob, "maps")
            .find(|m| str_of(m, "flow_id") == flow_id)
            .map(|m| str_of(m, "id").to_string());
        let map_id = match existing {
            Some(id) => id,
            None => {
                let id = identity::new_map_id();
                if let Some(maps) = blob.get_mut("maps").and_then(Value::as_array_mut) {
                    maps.push(json!({
                        "id": id,
                        "name": "Map 01",
                        "flow_id": flow_id,
                        "mappings": [],
                        "status": "draft",
                        "created_at": stamp,
                        "updated_at": stamp,
                        "metadata": {},
                    }));
                }
                id
            }
        };

        if rows.is_empty() {
            continue;
        }
        let moved = rows.len();
        let rows = rows.into_iter().map(|mut row| {
            if let Some(obj) = row.as_object_mut() {
                obj.insert("flow_id".to_string(), Value::String(flow_id.clone()));
                obj.insert("map_id".to_string(), Value::String(map_id.clone()));
            }
            row
        });
        if let Some(map) = array_objects_mut(blob, "maps").find(|m| str_of(m, "id") == map_id) {
            match map.get_mut("mappings").and_then(Value::as_array_mut) {
                Some(existing) => existing.extend(rows),
                None => {
                    map.insert("mappings".to_string(), Value::Array(rows.collect()));
                }
            }
        }
        tracing::info!(flow_id = %flow_id, map_id = %map_id, rows = moved, "Legacy flow mappings moved into map");
    }
}

fn ensure_selection(blob: &mut JsonMap<String, Value>) {
    let flow_ids = ids_of(blob, "flows");
    let active_flow = match blob.get("activeFlowId").and_then(Value::as_str) {
        Some(id) if flow_ids.iter().any(|f| f == id) => id.to_string(),
        _ => match flow_ids.first() {
            Some(first) => first.clone(),
            None => return,
        },
    };
    blob.insert("activeFlowId".to_string(), Value::String(active_flow.clone()));

    let flow_sequence = array_objects_mut(blob, "flows")
        .find(|f| str_of(f, "id") == active_flow)
        .map(|f| str_of(f, "sequence_id").to_string());
    if !is_set(blob.get("activeSequenceId")) {
        if let Some(seq) = flow_sequence {
            blob.insert("activeSequenceId".to_string(), Value::String(seq));
        }
    }

    let active_map_valid = blob
        .get("activeMapId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .is_some_and(|id| array_objects_mut(blob, "maps").any(|m| str_of(m, "id") == id));
    if !active_map_valid {
        let first_map = array_objects_mut(blob, "maps")
            .find(|m| str_of(m, "flow_id") == active_flow)
            .map(|m| Value::String(str_of(m, "id").to_string()))
            .unwrap_or(Value::Null);
        blob.insert("activeMapId".to_string(), first_map);
    }
}

// ---- helpers ----

fn exhausted(err: AppError) -> AppError {
    AppError::Import(format!("Cannot repair workspace ids: {err}"))
}

fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

fn str_of<'a>(obj: &'a JsonMap<String, Value>, key: &str) -> &'a str {
    obj.get(key).and_then(Value::as_str).unwrap_or("")
}

fn ids_of(blob: &JsonMap<String, Value>, key: &str) -> Vec<String> {
    blob.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn array_objects_mut<'a>(
    blob: &'a mut JsonMap<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a mut JsonMap<String, Value>> {
    blob.get_mut(key)
        .and_then(Value::as_array_mut)
        .into_iter()
        .flat_map(|items| items.iter_mut().filter_map(Value::as_object_mut))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workspace::WorkspaceState;

    fn legacy_blob() -> Value {
        json!({
            "packages": [{ "id": "pkg_01", "name": "Package 01" }],
            "flows": [
                {
                    "id": "flow_01",
                    "name": "Styles",
                    "package_id": "pkg_01",
                    "mappings": [
                        { "id": "m1", "flow_id": "flow_01",
                          "source": { "id": "Centric.Style.season_1", "system": "Centric", "object": "Style", "field": "season" },
                          "target": null,
                          "shared": { "human_name": "Season" } }
                    ]
                },
                { "id": "flow_01", "name": "Dup", "package_id": "pkg_01", "mappings": [
                    { "id": "m2", "flow_id": "flow_01", "source": null, "target": null }
                ] }
            ],
            "activeFlowId": "flow_01",
            "fieldsCatalog": [
                { "id": "Centric.Style.season", "system": "Centric", "object": "Style", "field": "season", "created_at": "2024-05-01T00:00:00Z" },
                { "id": "Centric.Style.season", "system": "Centric", "object": "Style", "field": "season" },
                { "id": "custom_1700000000000_Fulfil.Product.sku", "system": "Fulfil", "object": "Product", "field": "sku", "is_custom": true }
            ],
            "catalogMeta": { "filename": "centric.csv", "recordCount": 3, "uploadedAt": "2024-05-01T00:00:00Z" }
        })
    }

    #[test]
    fn legacy_blob_loads_into_typed_state() {
        let migrated = migrate(legacy_blob()).unwrap();
        let state: WorkspaceState = serde_json::from_value(migrated).unwrap();

        assert_eq!(state.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(state.flows.len(), 2);
        assert_eq!(state.flows[1].id, "flow_02");
        assert!(state.flows.iter().all(|f| f.mappings.is_empty()));

        assert_eq!(state.maps.len(), 2);
        let first = state.maps.iter().find(|m| m.flow_id == "flow_01").unwrap();
        assert_eq!(first.name, "Map 01");
        assert_eq!(first.mappings.len(), 1);
        assert_eq!(first.mappings[0].map_id.as_deref(), Some(first.id.as_str()));
        let second = state.maps.iter().find(|m| m.flow_id == "flow_02").unwrap();
        assert_eq!(second.mappings[0].flow_id.as_deref(), Some("flow_02"));

        assert_eq!(state.sequences.len(), 1);
        assert_eq!(state.sequences[0].flows, vec!["flow_01", "flow_02"]);
        assert!(state.flows.iter().all(|f| f.sequence_id == "seq_01"));

        assert_eq!(state.active_sequence_id.as_deref(), Some("seq_01"));
        assert_eq!(state.active_map_id.as_deref(), Some(first.id.as_str()));
    }

    #[test]
    fn catalog_metadata_is_backfilled() {
        let migrated = migrate(legacy_blob()).unwrap();
        let state: WorkspaceState = serde_json::from_value(migrated).unwrap();

        let catalog = &state.fields_catalog;
        assert_eq!(catalog[0].id, "Centric.Style.season");
        assert_eq!(catalog[1].id, "Centric.Style.season_1");
        assert_eq!(catalog[1].origin_id, "Centric.Style.season");
        assert!(catalog[0].imported_at.is_some());
        assert!(catalog[0].edited_at.is_some());
        assert_eq!(catalog[2].origin_id, "Fulfil.Product.sku");
        assert_eq!(catalog[2].source, crate::models::field::FieldOrigin::Manual);

        let meta = state.catalog_meta.unwrap();
        assert_eq!(meta.version, 1);
    }

    #[test]
    fn migration_is_idempotent() {
        let once = migrate(legacy_blob()).unwrap();
        let twice = migrate(once.clone()).unwrap();
        assert_eq!(once, twice);

        // Rerunning every step on current data changes nothing either.
        let mut blob = once.clone();
        if let Value::Object(obj) = &mut blob {
            obj.insert("schemaVersion".to_string(), json!(0));
        }
        assert_eq!(migrate(blob).unwrap(), once);
    }

    #[test]
    fn fresh_state_survives_migration_unchanged() {
        let state = WorkspaceState::new(Utc::now());
        let value = serde_json::to_value(&state).unwrap();
        let mut reset = value.clone();
        reset["schemaVersion"] = json!(0);
        let migrated = migrate(reset).unwrap();
        let back: WorkspaceState = serde_json::from_value(migrated).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn newer_schema_is_left_alone() {
        let blob = json!({ "schemaVersion": 99, "flows": [] });
        assert_eq!(migrate(blob.clone()).unwrap(), blob);
    }

    #[test]
    fn out_of_range_schema_version_is_treated_as_newer() {
        // 2^32 + 1 would read as version 1 if truncated.
        let blob = json!({ "schemaVersion": 4_294_967_297_u64, "flows": [] });
        assert_eq!(migrate(blob.clone()).unwrap(), blob);
    }

    #[test]
    fn duplicate_flow_without_free_id_is_an_import_error() {
        let blob = json!({
            "flows": [
                { "id": "flow_4294967295", "name": "A", "mappings": [] },
                { "id": "flow_4294967295", "name": "B", "mappings": [] }
            ]
        });
        let err = migrate(blob).unwrap_err();
        assert_eq!(err.code(), "IMPORT_ERROR");
    }

    #[test]
    fn non_object_is_rejected() {
        let err = migrate(json!([1, 2])).unwrap_err();
        assert_eq!(err.code(), "IMPORT_ERROR");
    }

    #[test]
    fn blob_without_flows_only_gets_catalog_repairs() {
        let migrated = migrate(json!({ "fieldsCatalog": [] })).unwrap();
        assert!(migrated.get("maps").is_none());
        assert!(migrated.get("packages").is_none());
    }
}
