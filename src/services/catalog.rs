//! Catalog editing: custom fields, in-place edits, deletion and lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::AppError;
use crate::models::field::{CreateField, Field, FieldOrigin, UpdateField};
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::workspace::WorkspaceState;
use crate::services::identity;

/// Listing filter for the catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFilter {
    pub system: Option<String>,
    pub object: Option<String>,
    #[serde(default)]
    pub custom_only: bool,
    /// Case-insensitive substring over system, object, field and description.
    pub query: Option<String>,
}

impl CatalogFilter {
    fn matches(&self, field: &Field) -> bool {
        if self.custom_only && !field.is_custom {
            return false;
        }
        if let Some(system) = &self.system {
            if &field.system != system {
                return false;
            }
        }
        if let Some(object) = &self.object {
            if &field.object != object {
                return false;
            }
        }
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                [&field.system, &field.object, &field.field, &field.description]
                    .iter()
                    .any(|s| s.to_lowercase().contains(&q))
            }
            _ => true,
        }
    }
}

/// Where a field is used.
#[derive(Debug, Serialize)]
pub struct FieldUsage {
    pub field_id: String,
    /// Mapping sides pointing at the field.
    pub sides: usize,
    /// Rows with at least one side pointing at the field.
    pub rows: usize,
    /// Maps containing such rows.
    pub maps: Vec<String>,
}

/// Outcome of deleting a field.
#[derive(Debug, Serialize)]
pub struct DeletedField {
    pub field: Field,
    pub cleared_sides: usize,
}

/// Create a manual field and append it to the catalog.
pub fn create_custom_field(
    state: &mut WorkspaceState,
    input: CreateField,
    now: DateTime<Utc>,
) -> Result<Field, AppError> {
    let input = CreateField {
        system: input.system.trim().to_string(),
        object: input.object.trim().to_string(),
        field: input.field.trim().to_string(),
        data_type: input.data_type,
    };
    input.validate()?;

    let base = identity::base_id(&input.system, &input.object, &input.field);
    if state.fields_catalog.iter().any(|f| f.origin_id == base) {
        return Err(AppError::Conflict(format!(
            "A field with identifier {base} already exists"
        )));
    }

    let field = Field {
        id: identity::custom_id(now.timestamp_millis(), &base),
        origin_id: base,
        system: input.system,
        object: input.object,
        field: input.field,
        data_type: input
            .data_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "string".to_string()),
        required: false,
        key_type: String::new(),
        description: String::new(),
        is_custom: true,
        source: FieldOrigin::Manual,
        version: 1,
        imported_at: None,
        edited_at: Some(now),
        created_at: Some(now),
    };

    tracing::info!(field_id = %field.id, "Custom field created");
    state.fields_catalog.push(field.clone());
    Ok(field)
}

/// Edit a field in place and refresh every mapping side pointing at it.
pub fn update_field(
    state: &mut WorkspaceState,
    field_id: &str,
    changes: UpdateField,
    now: DateTime<Utc>,
) -> Result<Field, AppError> {
    let original = state
        .find_field(field_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Field {field_id}")))?;

    if changes.is_empty() {
        return Ok(original);
    }

    let identity_changed = changes.changes_identity();
    let mut updated = Field {
        system: changes.system.unwrap_or_else(|| original.system.clone()).trim().to_string(),
        object: changes.object.unwrap_or_else(|| original.object.clone()).trim().to_string(),
        field: changes.field.unwrap_or_else(|| original.field.clone()).trim().to_string(),
        data_type: changes.data_type.unwrap_or_else(|| original.data_type.clone()),
        required: changes.required.unwrap_or(original.required),
        key_type: changes.key_type.unwrap_or_else(|| original.key_type.clone()),
        description: changes.description.unwrap_or_else(|| original.description.clone()),
        edited_at: Some(now),
        version: original.version.saturating_add(1),
        ..original.clone()
    };

    if updated.system.is_empty() || updated.object.is_empty() || updated.field.is_empty() {
        return Err(AppError::Validation(
            "Field name, system, and object are required".to_string(),
        ));
    }

    if identity_changed {
        let base = updated.base_id();
        if state
            .fields_catalog
            .iter()
            .any(|f| f.id != field_id && (f.origin_id == base || f.id == base))
        {
            tracing::warn!(field_id, identifier = %base, "Rejected edit: identifier already exists");
            return Err(AppError::Conflict(format!(
                "A field with identifier {base} already exists"
            )));
        }

        updated.id = match identity::parse_custom_id(&original.id) {
            Some((millis, _)) if original.is_custom => format!("custom_{millis}_{base}"),
            None if original.is_custom => identity::custom_id(now.timestamp_millis(), &base),
            _ => base.clone(),
        };
        updated.origin_id = base;
    }

    if let Some(slot) = state.fields_catalog.iter_mut().find(|f| f.id == field_id) {
        *slot = updated.clone();
    }

    let refreshed = refresh_references(state, field_id, &updated);
    tracing::info!(
        field_id,
        new_id = %updated.id,
        version = updated.version,
        refreshed,
        "Catalog field updated"
    );
    Ok(updated)
}

/// Re-project every side pointing at `old_id` from `field`.
fn refresh_references(state: &mut WorkspaceState, old_id: &str, field: &Field) -> usize {
    let mut refreshed = 0;
    for row in state.mapping_rows_mut() {
        for side in [&mut row.source, &mut row.target] {
            if let Some(current) = side.as_mut().filter(|s| s.id == old_id) {
                *current = current.refreshed_from(field);
                refreshed += 1;
            }
        }
    }
    refreshed
}

/// Delete a field. Referenced fields need `confirmed`; their sides are cleared.
pub fn delete_field(
    state: &mut WorkspaceState,
    field_id: &str,
    confirmed: bool,
) -> Result<DeletedField, AppError> {
    let position = state
        .fields_catalog
        .iter()
        .position(|f| f.id == field_id)
        .ok_or_else(|| AppError::NotFound(format!("Field {field_id}")))?;

    let usage = field_usage(state, field_id)?;
    if usage.sides > 0 && !confirmed {
        return Err(AppError::ConfirmationRequired(format!(
            "Field {field_id} is used by {} mapping row(s); confirm to clear those sides",
            usage.rows
        )));
    }

    let mut cleared_sides = 0;
    for row in state.mapping_rows_mut() {
        for side in [&mut row.source, &mut row.target] {
            if side.as_ref().is_some_and(|s| s.id == field_id) {
                *side = None;
                cleared_sides += 1;
            }
        }
    }

    let field = state.fields_catalog.remove(position);
    tracing::info!(field_id, cleared_sides, "Catalog field deleted");
    Ok(DeletedField {
        field,
        cleared_sides,
    })
}

/// Filtered, paginated view of the catalog.
pub fn list_fields(state: &WorkspaceState, filter: &CatalogFilter, pagination: &Pagination) -> PagedResult<Field> {
    let matching: Vec<Field> = state
        .fields_catalog
        .iter()
        .filter(|f| filter.matches(f))
        .cloned()
        .collect();
    pagination.apply(&matching)
}

pub fn get_field(state: &WorkspaceState, field_id: &str) -> Result<Field, AppError> {
    state
        .find_field(field_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Field {field_id}")))
}

/// Count the mapping sides and rows referencing a field.
pub fn field_usage(state: &WorkspaceState, field_id: &str) -> Result<FieldUsage, AppError> {
    if state.find_field(field_id).is_none() {
        return Err(AppError::NotFound(format!("Field {field_id}")));
    }

    let mut usage = FieldUsage {
        field_id: field_id.to_string(),
        sides: 0,
        rows: 0,
        maps: Vec::new(),
    };
    for map in &state.maps {
        let mut used = false;
        for row in &map.mappings {
            let sides = [row.source.as_ref(), row.target.as_ref()]
                .into_iter()
                .flatten()
                .filter(|s| s.id == field_id)
                .count();
            if sides > 0 {
                usage.sides += sides;
                usage.rows += 1;
                used = true;
            }
        }
        if used {
            usage.maps.push(map.id.clone());
        }
    }
    Ok(usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mapping::{FieldRef, MappingRow};

    fn create(state: &mut WorkspaceState, system: &str, object: &str, field: &str) -> Result<Field, AppError> {
        create_custom_field(
            state,
            CreateField {
                system: system.to_string(),
                object: object.to_string(),
                field: field.to_string(),
                data_type: None,
            },
            Utc::now(),
        )
    }

    fn imported(origin: &str) -> Field {
        let parts: Vec<&str> = origin.split('.').collect();
        Field {
            id: origin.to_string(),
            origin_id: origin.to_string(),
            system: parts[0].to_string(),
            object: parts[1].to_string(),
            field: parts[2].to_string(),
            data_type: "string".to_string(),
            required: false,
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

    fn state_with(fields: Vec<Field>) -> WorkspaceState {
        let mut state = WorkspaceState::new(Utc::now());
        state.fields_catalog = fields;
        state
    }

    fn place(state: &mut WorkspaceState, row_id: &str, source: &Field, target: Option<&Field>) {
        let mut row = MappingRow::new(row_id.to_string(), Some("flow_01".to_string()), Some("map_01".to_string()));
        row.source = Some(FieldRef::from_field(source));
        row.target = target.map(FieldRef::from_field);
        state.maps[0].mappings.push(row);
    }

    #[test]
    fn custom_field_defaults() {
        let mut state = state_with(vec![]);
        let field = create(&mut state, "Fulfil", "Product", "sku").unwrap();
        assert!(field.id.starts_with("custom_"));
        assert!(field.id.ends_with("_Fulfil.Product.sku"));
        assert_eq!(field.origin_id, "Fulfil.Product.sku");
        assert_eq!(field.data_type, "string");
        assert_eq!(field.source, FieldOrigin::Manual);
        assert!(field.is_custom);
        assert_eq!(state.fields_catalog.len(), 1);
    }

    #[test]
    fn custom_field_requires_identity() {
        let mut state = state_with(vec![]);
        let err = create(&mut state, "Fulfil", "  ", "sku").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(state.fields_catalog.is_empty());
    }

    #[test]
    fn custom_field_rejects_duplicate_origin() {
        let mut state = state_with(vec![imported("Fulfil.Product.sku")]);
        let err = create(&mut state, "Fulfil", "Product", "sku").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn rename_collision_is_rejected_and_catalog_unchanged() {
        let mut state = state_with(vec![imported("A.B.C"), imported("A.B.D")]);
        let before = state.clone();

        let err = update_field(
            &mut state,
            "A.B.D",
            UpdateField {
                field: Some("C".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state, before);
    }

    #[test]
    fn rename_regenerates_ids_and_refreshes_mappings() {
        let abc = imported("A.B.C");
        let mut state = state_with(vec![abc.clone()]);
        place(&mut state, "r1", &abc, None);
        state.maps[0].mappings[0].source.as_mut().unwrap().priority_level = "P0".to_string();

        let updated = update_field(
            &mut state,
            "A.B.C",
            UpdateField {
                field: Some("renamed".to_string()),
                data_type: Some("number".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(updated.id, "A.B.renamed");
        assert_eq!(updated.origin_id, "A.B.renamed");
        assert_eq!(updated.version, 2);

        let side = state.maps[0].mappings[0].source.as_ref().unwrap();
        assert_eq!(side.id, "A.B.renamed");
        assert_eq!(side.data_type, "number");
        assert_eq!(side.priority_level, "P0");
    }

    #[test]
    fn custom_rename_keeps_timestamp() {
        let mut state = state_with(vec![]);
        let field = create(&mut state, "Fulfil", "Product", "sku").unwrap();
        let (millis, _) = identity::parse_custom_id(&field.id).unwrap();
        let millis = millis.to_string();

        let updated = update_field(
            &mut state,
            &field.id,
            UpdateField {
                field: Some("sku_code".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(updated.id, format!("custom_{millis}_Fulfil.Product.sku_code"));
    }

    #[test]
    fn attribute_edit_keeps_ids_and_refreshes_sides() {
        let abc = imported("A.B.C");
        let mut state = state_with(vec![abc.clone()]);
        place(&mut state, "r1", &abc, Some(&abc));

        let updated = update_field(
            &mut state,
            "A.B.C",
            UpdateField {
                required: Some(true),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(updated.id, "A.B.C");
        let row = &state.maps[0].mappings[0];
        assert!(row.source.as_ref().unwrap().required);
        assert!(row.target.as_ref().unwrap().required);
    }

    #[test]
    fn blank_identity_edit_is_rejected() {
        let mut state = state_with(vec![imported("A.B.C")]);
        let err = update_field(
            &mut state,
            "A.B.C",
            UpdateField {
                system: Some(" ".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn delete_requires_confirmation_when_referenced() {
        let abc = imported("A.B.C");
        let mut state = state_with(vec![abc.clone()]);
        place(&mut state, "r1", &abc, None);
        let before = state.clone();

        let err = delete_field(&mut state, "A.B.C", false).unwrap_err();
        assert_eq!(err.code(), "CONFIRMATION_REQUIRED");
        assert_eq!(state, before);
    }

    #[test]
    fn confirmed_delete_clears_every_reference() {
        let abc = imported("A.B.C");
        let other = imported("A.B.D");
        let mut state = state_with(vec![abc.clone(), other.clone()]);
        place(&mut state, "r1", &abc, Some(&abc));
        place(&mut state, "r2", &other, Some(&abc));

        let mut second_map = state.maps[0].clone();
        second_map.id = "map_02".to_string();
        state.maps.push(second_map);

        let deleted = delete_field(&mut state, "A.B.C", true).unwrap();
        assert_eq!(deleted.cleared_sides, 6);
        assert!(state.mapping_rows().all(|r| !r.references("A.B.C")));
        // Rows are kept even when emptied.
        assert_eq!(state.maps[0].mappings.len(), 2);
        assert_eq!(state.fields_catalog.len(), 1);
    }

    #[test]
    fn unreferenced_delete_needs_no_confirmation() {
        let mut state = state_with(vec![imported("A.B.C")]);
        assert!(delete_field(&mut state, "A.B.C", false).is_ok());
        assert!(delete_field(&mut state, "A.B.C", false).unwrap_err().is_not_found());
    }

    #[test]
    fn list_filters_and_paginates() {
        let mut fields: Vec<Field> = (0..30).map(|i| imported(&format!("Centric.Style.f{i}"))).collect();
        fields.push(imported("Fulfil.Product.sku"));
        let mut state = state_with(fields);
        create(&mut state, "Fulfil", "Product", "barcode").unwrap();

        let page = list_fields(&state, &CatalogFilter::default(), &Pagination::default());
        assert_eq!(page.total, 32);
        assert_eq!(page.items.len(), 25);
        assert_eq!(page.total_pages, 2);

        let filter = CatalogFilter {
            system: Some("Fulfil".to_string()),
            ..Default::default()
        };
        assert_eq!(list_fields(&state, &filter, &Pagination::default()).total, 2);

        let filter = CatalogFilter {
            custom_only: true,
            ..Default::default()
        };
        assert_eq!(list_fields(&state, &filter, &Pagination::default()).total, 1);

        let filter = CatalogFilter {
            query: Some("SKU".to_string()),
            ..Default::default()
        };
        assert_eq!(list_fields(&state, &filter, &Pagination::default()).items[0].field, "sku");
    }

    #[test]
    fn usage_counts_sides_and_rows() {
        let abc = imported("A.B.C");
        let mut state = state_with(vec![abc.clone()]);
        place(&mut state, "r1", &abc, Some(&abc));
        let usage = field_usage(&state, "A.B.C").unwrap();
        assert_eq!(usage.sides, 2);
        assert_eq!(usage.rows, 1);
        assert_eq!(usage.maps, vec!["map_01"]);
    }
}
