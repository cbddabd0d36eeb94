//! Domain layer types and invariants.

pub mod columns;
pub mod error;
pub mod readings;
pub mod timestamp;

pub use icelog_api_types::Region;
