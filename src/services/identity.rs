//! Identifier derivation for catalog fields and mapping rows.
//!
//! A field's business key is its `system.object.field` tuple. Catalog ids
//! add decorations on top of that key: a `_N` suffix for duplicate rows and
//! a `custom_<millis>_` prefix for manually created fields. Recovering the
//! key from a decorated id is needed for data persisted before `originId`
//! existed.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::errors::AppError;

static NUMERIC_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\d+$").expect("valid suffix pattern"));

static CUSTOM_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^custom_(\d+)_(.+)$").expect("valid prefix pattern"));

/// Compute the business key for a field tuple.
pub fn base_id(system: &str, object: &str, field: &str) -> String {
    format!("{system}.{object}.{field}")
}

/// Id for a manually created field.
pub fn custom_id(timestamp_millis: i64, base: &str) -> String {
    format!("custom_{timestamp_millis}_{base}")
}

/// Append the `_N` duplicate suffix.
pub fn suffixed(base: &str, n: usize) -> String {
    format!("{base}_{n}")
}

/// Drop one trailing `_N` suffix if present.
pub fn strip_numeric_suffix(id: &str) -> &str {
    match NUMERIC_SUFFIX.find(id) {
        Some(m) => &id[..m.start()],
        None => id,
    }
}

/// Split a custom id into its timestamp and base key.
pub fn parse_custom_id(id: &str) -> Option<(&str, &str)> {
    let caps = CUSTOM_PREFIX.captures(id)?;
    let millis = caps.get(1)?.as_str();
    let base = caps.get(2)?.as_str();
    Some((millis, base))
}

/// Drop the `custom_<millis>_` prefix if present.
pub fn strip_custom_prefix(id: &str) -> &str {
    parse_custom_id(id).map(|(_, base)| base).unwrap_or(id)
}

/// Best-effort recovery of the business key from a decorated id.
pub fn recover_origin_id(id: &str) -> String {
    strip_numeric_suffix(strip_custom_prefix(id)).to_string()
}

/// Fresh mapping row id.
pub fn new_row_id() -> String {
    format!("mapping_{}", Uuid::now_v7().simple())
}

/// Fresh map id.
pub fn new_map_id() -> String {
    format!("map_{}", Uuid::now_v7().simple())
}

/// Parse the numeric part of a `<prefix>NN` id, e.g. `flow_07` → 7.
pub fn sequence_number(id: &str, prefix: &str) -> Option<u32> {
    id.strip_prefix(prefix)?.parse().ok()
}

/// Next `<prefix>NN` id given the ids already in use.
pub fn next_numbered_id<'a>(
    prefix: &str,
    existing: impl Iterator<Item = &'a str>,
) -> Result<(String, u32), AppError> {
    let next = match existing.filter_map(|id| sequence_number(id, prefix)).max() {
        Some(n) => n
            .checked_add(1)
            .ok_or_else(|| AppError::Validation(format!("No '{prefix}' id left after {prefix}{n}")))?,
        None => 1,
    };
    Ok((format!("{prefix}{next:02}"), next))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_id_joins_with_dots() {
        assert_eq!(base_id("Centric", "Style", "season"), "Centric.Style.season");
    }

    #[test]
    fn strips_single_numeric_suffix() {
        assert_eq!(strip_numeric_suffix("A.B.C_2"), "A.B.C");
        assert_eq!(strip_numeric_suffix("A.B.C"), "A.B.C");
        assert_eq!(strip_numeric_suffix("A.B.field_name"), "A.B.field_name");
    }

    #[test]
    fn parses_custom_ids() {
        let id = custom_id(1_700_000_000_000, "Fulfil.Product.sku");
        assert_eq!(id, "custom_1700000000000_Fulfil.Product.sku");
        assert_eq!(
            parse_custom_id(&id),
            Some(("1700000000000", "Fulfil.Product.sku"))
        );
        assert_eq!(parse_custom_id("Fulfil.Product.sku"), None);
    }

    #[test]
    fn recovers_origin_from_decorated_ids() {
        assert_eq!(recover_origin_id("custom_123_A.B.C"), "A.B.C");
        assert_eq!(recover_origin_id("A.B.C_4"), "A.B.C");
        assert_eq!(recover_origin_id("A.B.C"), "A.B.C");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(new_row_id(), new_row_id());
        assert!(new_map_id().starts_with("map_"));
    }

    #[test]
    fn next_numbered_id_skips_gaps() {
        let ids = ["flow_01", "flow_04", "custom"];
        let (id, n) = next_numbered_id("flow_", ids.iter().copied()).unwrap();
        assert_eq!(id, "flow_05");
        assert_eq!(n, 5);

        let (id, _) = next_numbered_id("pkg_", std::iter::empty()).unwrap();
        assert_eq!(id, "pkg_01");
    }

    #[test]
    fn next_numbered_id_rejects_exhausted_range() {
        let ids = ["flow_01", "flow_4294967295"];
        let err = next_numbered_id("flow_", ids.iter().copied()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
