//! Business logic services.

pub mod catalog;
pub mod export;
pub mod hierarchy;
pub mod identity;
pub mod import;
pub mod mapping;
pub mod migration;
pub mod reconcile;
pub mod workspace_io;
