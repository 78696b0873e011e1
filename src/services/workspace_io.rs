//! Workspace export and validated, sanitized import.
//!
//! An import is checked and fully materialized before anything is applied,
//! so a rejected file never leaves the workspace half-replaced.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value};

use crate::errors::AppError;
use crate::models::workspace::{Theme, WorkspaceExport, WorkspaceState, EXPORT_VERSION, SUPPORTED_EXPORT_VERSIONS};
use crate::services::{hierarchy, migration};

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script>").expect("valid script pattern"));
static JAVASCRIPT_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript:").expect("valid uri pattern"));
static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)on\w+\s*=").expect("valid handler pattern"));

/// Sections that must be arrays when present.
const ARRAY_SECTIONS: [&str; 5] = ["packages", "sequences", "flows", "maps", "fieldsCatalog"];

/// Sections copied from an import file over the current workspace.
const STATE_SECTIONS: [&str; 9] = [
    "packages",
    "sequences",
    "flows",
    "maps",
    "fieldsCatalog",
    "catalogMeta",
    "activeFlowId",
    "activeSequenceId",
    "activeMapId",
];

pub fn export_workspace(state: &WorkspaceState, theme: Theme, now: DateTime<Utc>) -> WorkspaceExport {
    WorkspaceExport {
        version: EXPORT_VERSION.to_string(),
        exported_at: now,
        packages: state.packages.clone(),
        sequences: state.sequences.clone(),
        flows: state.flows.clone(),
        maps: state.maps.clone(),
        fields_catalog: state.fields_catalog.clone(),
        catalog_meta: state.catalog_meta.clone(),
        active_flow_id: state.active_flow_id.clone(),
        active_sequence_id: state.active_sequence_id.clone(),
        active_map_id: state.active_map_id.clone(),
        theme,
    }
}

/// A validated import, ready to replace the workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceImport {
    pub version: String,
    pub state: WorkspaceState,
    pub theme: Option<Theme>,
    pub sections: Vec<String>,
    pub sanitized: usize,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceImportSummary {
    pub version: String,
    pub sections: Vec<String>,
    /// String values that had script-like content stripped.
    pub sanitized: usize,
    pub packages: usize,
    pub flows: usize,
    pub maps: usize,
    pub fields: usize,
    pub theme: Option<Theme>,
}

/// Validate, sanitize and migrate an exported workspace file.
///
/// Sections present in the file replace the matching sections of `current`.
/// When `flows` (or `packages`) are replaced, the current sections that only
/// describe the old hierarchy are dropped unless the file carries them too.
pub fn import_workspace(current: &WorkspaceState, data: &[u8], now: DateTime<Utc>) -> Result<WorkspaceImport, AppError> {
    // 1. Parse and check the envelope
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| AppError::Import(format!("Workspace file is not valid JSON: {e}")))?;
    let Value::Object(file) = value else {
        return Err(AppError::Import("Workspace file must be a JSON object".to_string()));
    };

    let version = match file.get("version") {
        Some(Value::String(v)) if !v.is_empty() => v.clone(),
        _ => return Err(missing_envelope()),
    };
    if !is_present(file.get("exported_at")) {
        return Err(missing_envelope());
    }
    if !SUPPORTED_EXPORT_VERSIONS.contains(&version.as_str()) {
        return Err(AppError::Import(format!(
            "Unsupported workspace version: {version}. Expected {}",
            SUPPORTED_EXPORT_VERSIONS.join(" or ")
        )));
    }
    for section in ARRAY_SECTIONS {
        if let Some(v) = file.get(section) {
            if !v.is_null() && !v.is_array() {
                return Err(AppError::Import(format!("Invalid workspace: {section} must be an array")));
            }
        }
    }

    // 2. Sanitize every string value
    let mut sanitized = 0;
    let Value::Object(file) = sanitize(Value::Object(file), &mut sanitized) else {
        return Err(AppError::Internal("Sanitized workspace is no longer an object".to_string()));
    };

    // 3. Overlay present sections on the current workspace
    let Value::Object(mut blob) = serde_json::to_value(current)? else {
        return Err(AppError::Internal("Workspace state did not serialize to an object".to_string()));
    };
    blob.remove("schemaVersion");

    let sections: Vec<String> = STATE_SECTIONS
        .iter()
        .filter(|s| is_present(file.get(**s)))
        .map(|s| s.to_string())
        .collect();
    let has = |name: &str| sections.iter().any(|s| s == name);
    if has("flows") && !has("maps") {
        blob.remove("maps");
    }
    if (has("flows") || has("packages")) && !has("sequences") {
        blob.remove("sequences");
    }
    for section in &sections {
        if let Some(v) = file.get(section) {
            blob.insert(section.clone(), v.clone());
        }
    }

    // 4. Migrate and materialize
    let migrated = migration::migrate_at(Value::Object(blob), now)?;
    let mut state: WorkspaceState = serde_json::from_value(migrated)
        .map_err(|e| AppError::Import(format!("Invalid workspace contents: {e}")))?;
    hierarchy::ensure_minimum(&mut state, now);

    let theme = theme_of(&file);

    tracing::info!(
        version = %version,
        sections = sections.len(),
        sanitized,
        fields = state.fields_catalog.len(),
        maps = state.maps.len(),
        "Workspace file validated"
    );

    Ok(WorkspaceImport {
        version,
        state,
        theme,
        sections,
        sanitized,
    })
}

/// Replace the workspace with a validated import.
pub fn apply_import(state: &mut WorkspaceState, import: WorkspaceImport) -> WorkspaceImportSummary {
    *state = import.state;
    WorkspaceImportSummary {
        version: import.version,
        sections: import.sections,
        sanitized: import.sanitized,
        packages: state.packages.len(),
        flows: state.flows.len(),
        maps: state.maps.len(),
        fields: state.fields_catalog.len(),
        theme: import.theme,
    }
}

/// Strip script blocks, `javascript:` URIs and inline event handlers.
pub fn sanitize_str(input: &str) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(input, "");
    let without_uris = JAVASCRIPT_URI.replace_all(&without_scripts, "");
    EVENT_HANDLER.replace_all(&without_uris, "").into_owned()
}

fn sanitize(value: Value, changed: &mut usize) -> Value {
    match value {
        Value::String(s) => {
            let clean = sanitize_str(&s);
            if clean != s {
                *changed += 1;
            }
            Value::String(clean)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|v| sanitize(v, changed)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize(v, changed)))
                .collect::<JsonMap<String, Value>>(),
        ),
        other => other,
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn theme_of(file: &JsonMap<String, Value>) -> Option<Theme> {
    let raw = file.get("theme").filter(|v| is_present(Some(v)))?;
    match serde_json::from_value(raw.clone()) {
        Ok(theme) => Some(theme),
        Err(_) => {
            tracing::warn!(theme = %raw, "Ignoring unknown theme in workspace file");
            None
        }
    }
}

fn missing_envelope() -> AppError {
    AppError::Import("Invalid workspace file format - missing version or timestamp".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::{Field, FieldOrigin};
    use serde_json::json;

    fn field(id: &str, description: &str) -> Field {
        let parts: Vec<&str> = id.split('.').collect();
        Field {
            id: id.to_string(),
            origin_id: id.to_string(),
            system: parts[0].to_string(),
            object: parts[1].to_string(),
            field: parts[2].to_string(),
            data_type: "string".to_string(),
            required: false,
            key_type: String::new(),
            description: description.to_string(),
            is_custom: false,
            source: FieldOrigin::Import,
            version: 1,
            imported_at: None,
            edited_at: None,
            created_at: None,
        }
    }

    fn exported(state: &WorkspaceState) -> Vec<u8> {
        serde_json::to_vec(&export_workspace(state, Theme::Light, Utc::now())).unwrap()
    }

    #[test]
    fn sanitize_strips_script_like_content() {
        assert_eq!(sanitize_str("a<script>alert(1)</script>b"), "ab");
        assert_eq!(sanitize_str("<SCRIPT type=x>\nbad()\n</script>ok"), "ok");
        assert_eq!(sanitize_str("JavaScript:void(0)"), "void(0)");
        assert_eq!(sanitize_str("<img onerror = x>"), "<img  x>");
        assert_eq!(sanitize_str("Season code"), "Season code");
    }

    #[test]
    fn round_trip_reproduces_catalog_and_hierarchy() {
        let mut state = WorkspaceState::new(Utc::now());
        state.fields_catalog = vec![field("A.B.c", "plain"), field("A.B.d", "")];
        hierarchy::add_map(&mut state, "flow_01", Utc::now()).unwrap();

        let import = import_workspace(&WorkspaceState::new(Utc::now()), &exported(&state), Utc::now()).unwrap();
        assert_eq!(import.sanitized, 0);
        assert_eq!(import.theme, Some(Theme::Light));

        let mut target = WorkspaceState::new(Utc::now());
        apply_import(&mut target, import);
        assert_eq!(target.fields_catalog, state.fields_catalog);
        assert_eq!(target.flows, state.flows);
        assert_eq!(target.maps, state.maps);
    }

    #[test]
    fn injected_scripts_are_stripped() {
        let mut state = WorkspaceState::new(Utc::now());
        state.fields_catalog = vec![field("A.B.c", "Season<script>steal()</script>")];
        let import = import_workspace(&state, &exported(&state), Utc::now()).unwrap();
        assert_eq!(import.sanitized, 1);
        assert_eq!(import.state.fields_catalog[0].description, "Season");
    }

    #[test]
    fn envelope_is_required() {
        let state = WorkspaceState::new(Utc::now());
        let no_time = json!({"version": "2.0", "flows": []});
        let err = import_workspace(&state, no_time.to_string().as_bytes(), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "IMPORT_ERROR");

        let old = json!({"version": "0.9", "exported_at": "2024-01-01T00:00:00Z"});
        let err = import_workspace(&state, old.to_string().as_bytes(), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("Unsupported workspace version: 0.9"));

        assert!(import_workspace(&state, b"[1,2]", Utc::now()).is_err());
        assert!(import_workspace(&state, b"not json", Utc::now()).is_err());
    }

    #[test]
    fn array_sections_must_be_arrays() {
        let state = WorkspaceState::new(Utc::now());
        let bad = json!({"version": "2.0", "exported_at": "2024-01-01T00:00:00Z", "maps": {"a": 1}});
        let err = import_workspace(&state, bad.to_string().as_bytes(), Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Import error: Invalid workspace: maps must be an array");
    }

    #[test]
    fn absent_sections_keep_current_values() {
        let mut state = WorkspaceState::new(Utc::now());
        state.fields_catalog = vec![field("A.B.c", "")];
        let file = json!({"version": "1.0", "exported_at": "2024-01-01T00:00:00Z", "theme": "neon"});
        let import = import_workspace(&state, file.to_string().as_bytes(), Utc::now()).unwrap();
        assert!(import.sections.is_empty());
        assert_eq!(import.theme, None);
        assert_eq!(import.state.fields_catalog, state.fields_catalog);
        assert_eq!(import.state.maps, state.maps);
    }

    #[test]
    fn legacy_flows_get_maps_and_sequences() {
        let state = WorkspaceState::new(Utc::now());
        let file = json!({
            "version": "1.0",
            "exported_at": "2024-01-01T00:00:00Z",
            "packages": [{"id": "pkg_01", "name": "Core"}],
            "flows": [
                {"id": "flow_07", "name": "Styles", "package_id": "pkg_01",
                 "mappings": [{"id": "mapping-1", "source": null, "target": null, "shared": {"notes": "x"}}]}
            ],
            "activeFlowId": "flow_07"
        });
        let import = import_workspace(&state, file.to_string().as_bytes(), Utc::now()).unwrap();
        let migrated = import.state;

        assert_eq!(migrated.flows.len(), 1);
        assert!(migrated.flows[0].mappings.is_empty());
        let maps: Vec<_> = migrated.maps_of_flow("flow_07").collect();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].mappings.len(), 1);
        assert_eq!(migrated.sequences.len(), 1);
        assert_eq!(migrated.active_map_id.as_deref(), Some(maps[0].id.as_str()));
    }

    #[test]
    fn rejected_import_leaves_nothing_behind() {
        let state = WorkspaceState::new(Utc::now());
        let before = state.clone();
        let bad = json!({"version": "2.0", "exported_at": "x", "fieldsCatalog": "nope"});
        assert!(import_workspace(&state, bad.to_string().as_bytes(), Utc::now()).is_err());
        assert_eq!(state, before);
    }
}
