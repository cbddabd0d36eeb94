//! Application layer: use-cases, query compilation and repository contracts.

pub mod auth;
pub mod error;
pub mod filter;
pub mod pagination;
pub mod readings;
pub mod repos;
