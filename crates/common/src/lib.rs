//! Shared building blocks for the deckmail crates: configuration, errors,
//! the MySQL pool and the domain types exchanged between components.

pub mod config;
pub mod db;
pub mod error;
pub mod types;
