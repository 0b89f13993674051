//! Shared plumbing for the deckmail binaries.

pub mod telemetry;
