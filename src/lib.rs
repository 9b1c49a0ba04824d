//! Resilient selector engine for browser end-to-end tests.
//!
//! Extracts interactive elements from page markup, ranks stable locators
//! for each, diffs snapshots structurally, keeps an append-only snapshot
//! history per URL, and proposes replacement locators when a test selector
//! stops resolving.

pub mod cli;
pub mod diff;
pub mod dom;
pub mod heal;
pub mod locator;
pub mod snapshot;
