//! Assignment notification engine.
//!
//! One run reconciles the notification ledger against the board's
//! assignments ([`reconciler`]) and then drains pending ledger entries by
//! emailing each assignee exactly once ([`dispatcher`]).

pub mod dispatcher;
pub mod ledger;
pub mod lock;
pub mod reconciler;
pub mod render;
pub mod run;
pub mod source;

#[cfg(test)]
mod memory;
