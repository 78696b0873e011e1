//! Domain models for the catalog, mapping tables and workspace hierarchy.

pub mod catalog;
pub mod field;
pub mod hierarchy;
pub mod mapping;
pub mod pagination;
pub mod workspace;
