//! Ice sensor readings service: a REST backend over SQLite with a
//! read-through response cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
