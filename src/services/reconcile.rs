//! Catalog reconciliation: merges a freshly imported batch into the
//! existing catalog and re-links mapping rows to the surviving entries.
//!
//! Identity across re-imports is carried by `originId`. Under `replace` the
//! batch becomes the catalog, keeping existing ids for non-custom matches.
//! Under `merge` matches are overwritten in place and everything else is
//! retained.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::catalog::ImportStrategy;
use crate::models::field::{Field, FieldOrigin};
use crate::models::mapping::{FieldRef, MappingRow};
use crate::models::workspace::WorkspaceState;
use crate::services::identity;

/// Outcome of reconciling a batch against the catalog.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub strategy: ImportStrategy,
    pub catalog: Vec<Field>,
    /// `originId` → surviving field, used for re-linking.
    pub by_origin: HashMap<String, Field>,
    pub stats: ReconcileStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Existing entries overwritten by an imported field.
    pub updated: usize,
    /// Imported fields inserted as new entries.
    pub added: usize,
    /// Existing entries carried over untouched (merge only).
    pub retained: usize,
    /// Existing entries no longer in the catalog (replace only).
    pub dropped: usize,
}

/// Counts from re-linking mapping rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelinkSummary {
    /// Sides re-pointed at a catalog entry.
    pub refreshed: usize,
    /// Sides cleared because their field left the catalog.
    pub cleared: usize,
    /// Rows removed because both sides ended up empty.
    pub pruned: usize,
}

/// Make ids unique within an imported batch.
///
/// The first occurrence of an id is kept; later ones get `_1`, `_2`, … in
/// encounter order. A suffix that is already taken is skipped so the result
/// never contains duplicates. The existing catalog is not consulted.
pub fn dedupe_batch(fields: Vec<Field>) -> Vec<Field> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();

    fields
        .into_iter()
        .map(|mut field| {
            let base = field.id.clone();
            let count = seen.entry(base.clone()).or_insert(0);
            if *count > 0 || taken.contains(&base) {
                let mut n = (*count).max(1);
                while taken.contains(&identity::suffixed(&base, n)) {
                    n += 1;
                }
                field.id = identity::suffixed(&base, n);
                *count = n + 1;
            } else {
                *count = 1;
            }
            taken.insert(field.id.clone());
            field
        })
        .collect()
}

/// Number of imported fields whose `originId` already exists in the catalog.
pub fn conflict_count(batch: &[Field], catalog: &[Field]) -> usize {
    let existing: HashSet<&str> = catalog.iter().map(|f| f.origin_id.as_str()).collect();
    batch
        .iter()
        .filter(|f| existing.contains(f.origin_id.as_str()))
        .count()
}

/// Reconcile a de-duplicated batch into the catalog.
pub fn reconcile(
    catalog: &[Field],
    batch: Vec<Field>,
    strategy: ImportStrategy,
    now: DateTime<Utc>,
) -> Reconciliation {
    let (entries, stats) = match strategy {
        ImportStrategy::Replace => reconcile_replace(catalog, batch, now),
        ImportStrategy::Merge => reconcile_merge(catalog, batch, now),
    };

    let catalog = assign_unique_ids(entries);
    let by_origin = catalog
        .iter()
        .map(|f| (f.origin_id.clone(), f.clone()))
        .collect();

    tracing::debug!(
        strategy = %strategy,
        updated = stats.updated,
        added = stats.added,
        retained = stats.retained,
        dropped = stats.dropped,
        "Catalog reconciled"
    );

    Reconciliation {
        strategy,
        catalog,
        by_origin,
        stats,
    }
}

/// A reconciled entry and whether it is newly inserted.
type Entry = (Field, bool);

fn reconcile_replace(catalog: &[Field], batch: Vec<Field>, now: DateTime<Utc>) -> (Vec<Entry>, ReconcileStats) {
    // Custom fields are never carried across a replace.
    let mut existing = origin_queues(catalog, |f| !f.is_custom);
    let mut stats = ReconcileStats::default();
    let mut entries = Vec::with_capacity(batch.len());

    for field in batch {
        match claim(&mut existing, &field.origin_id) {
            Some(idx) => {
                let prev = &catalog[idx];
                stats.updated += 1;
                entries.push((
                    Field {
                        id: prev.id.clone(),
                        version: prev.version.saturating_add(1),
                        edited_at: Some(now),
                        ..field
                    },
                    false,
                ));
            }
            None => {
                stats.added += 1;
                entries.push((field, true));
            }
        }
    }

    stats.dropped = catalog.len() - stats.updated;
    (entries, stats)
}

fn reconcile_merge(catalog: &[Field], batch: Vec<Field>, now: DateTime<Utc>) -> (Vec<Entry>, ReconcileStats) {
    let mut existing = origin_queues(catalog, |_| true);
    let mut matched: HashSet<usize> = HashSet::new();
    let mut stats = ReconcileStats::default();
    let mut entries = Vec::with_capacity(batch.len() + catalog.len());

    for field in batch {
        match claim(&mut existing, &field.origin_id) {
            Some(idx) => {
                let prev = &catalog[idx];
                matched.insert(idx);
                stats.updated += 1;
                entries.push((
                    Field {
                        id: prev.id.clone(),
                        is_custom: prev.is_custom,
                        version: prev.version.saturating_add(1),
                        edited_at: Some(now),
                        source: FieldOrigin::Import,
                        ..field
                    },
                    false,
                ));
            }
            None => {
                stats.added += 1;
                entries.push((field, true));
            }
        }
    }

    for (idx, prev) in catalog.iter().enumerate() {
        if !matched.contains(&idx) {
            stats.retained += 1;
            entries.push((prev.clone(), false));
        }
    }

    (entries, stats)
}

/// Catalog indexes per `originId`, in catalog order.
///
/// Imported fields claim entries front to back, so the n-th imported field
/// with a given origin matches the n-th existing entry with that origin.
fn origin_queues(catalog: &[Field], eligible: impl Fn(&Field) -> bool) -> HashMap<&str, VecDeque<usize>> {
    let mut queues: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (idx, field) in catalog.iter().enumerate() {
        if eligible(field) {
            queues.entry(field.origin_id.as_str()).or_default().push_back(idx);
        }
    }
    queues
}

fn claim(queues: &mut HashMap<&str, VecDeque<usize>>, origin_id: &str) -> Option<usize> {
    queues.get_mut(origin_id).and_then(VecDeque::pop_front)
}

/// Keep ids of carried-over entries; suffix new entries that collide.
fn assign_unique_ids(entries: Vec<Entry>) -> Vec<Field> {
    let mut taken: HashSet<String> = entries
        .iter()
        .filter(|(_, is_new)| !is_new)
        .map(|(f, _)| f.id.clone())
        .collect();

    entries
        .into_iter()
        .map(|(mut field, is_new)| {
            if is_new {
                if taken.contains(&field.id) {
                    let base = field.id.clone();
                    let mut n = 1;
                    while taken.contains(&identity::suffixed(&base, n)) {
                        n += 1;
                    }
                    field.id = identity::suffixed(&base, n);
                }
                taken.insert(field.id.clone());
            }
            field
        })
        .collect()
}

/// Re-point every mapping row in the workspace at the reconciled catalog.
///
/// Under `replace`, a side whose origin is gone becomes empty and rows with
/// both sides empty are removed. Under `merge`, unresolved sides are left
/// as they are and no row is removed.
pub fn relink_rows(state: &mut WorkspaceState, reconciliation: &Reconciliation) -> RelinkSummary {
    let mut summary = RelinkSummary::default();
    let by_origin = &reconciliation.by_origin;
    let by_id: HashMap<&str, &Field> = reconciliation
        .catalog
        .iter()
        .map(|f| (f.id.as_str(), f))
        .collect();

    match reconciliation.strategy {
        ImportStrategy::Replace => state.for_each_row_list(|rows| {
            for row in rows.iter_mut() {
                for side in [&mut row.source, &mut row.target] {
                    let Some(current) = side.as_ref() else {
                        continue;
                    };
                    let origin = side_origin(current, false);
                    match resolve(&by_id, by_origin, current, &origin) {
                        Some(field) => {
                            *side = Some(current.refreshed_from(field));
                            summary.refreshed += 1;
                        }
                        None => {
                            *side = None;
                            summary.cleared += 1;
                        }
                    }
                }
            }
            let before = rows.len();
            rows.retain(|row| !row.is_empty());
            summary.pruned += before - rows.len();
        }),
        ImportStrategy::Merge => state.for_each_row_list(|rows| {
            for row in rows.iter_mut() {
                for side in [&mut row.source, &mut row.target] {
                    let Some(current) = side.as_ref() else {
                        continue;
                    };
                    let origin = side_origin(current, true);
                    if let Some(field) = resolve(&by_id, by_origin, current, &origin) {
                        *side = Some(current.refreshed_from(field));
                        summary.refreshed += 1;
                    }
                }
            }
        }),
    }

    summary
}

/// Catalog entry for a side. Among entries sharing the side's origin, the
/// one carrying the side's own id wins.
fn resolve<'a>(
    by_id: &HashMap<&str, &'a Field>,
    by_origin: &'a HashMap<String, Field>,
    side: &FieldRef,
    origin: &str,
) -> Option<&'a Field> {
    by_id
        .get(side.id.as_str())
        .copied()
        .filter(|f| f.origin_id == origin)
        .or_else(|| by_origin.get(origin))
}

/// Business key of a mapping side, recovered from its id when the side
/// predates `originId` tracking.
fn side_origin(side: &FieldRef, strip_custom_prefix: bool) -> String {
    match side.origin_id.as_deref() {
        Some(origin) if !origin.is_empty() => origin.to_string(),
        _ if strip_custom_prefix => identity::recover_origin_id(&side.id),
        _ => identity::strip_numeric_suffix(&side.id).to_string(),
    }
}

/// Rows that would lose a side under `replace`, for previewing an import.
pub fn rows_at_risk<'a>(rows: impl Iterator<Item = &'a MappingRow>, batch: &[Field]) -> usize {
    let incoming: HashSet<&str> = batch.iter().map(|f| f.origin_id.as_str()).collect();
    rows.filter(|row| {
        [row.source.as_ref(), row.target.as_ref()]
            .into_iter()
            .flatten()
            .any(|side| !incoming.contains(side_origin(side, false).as_str()))
    })
    .count()
}
