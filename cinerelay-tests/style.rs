//! Style Enforcement Tests
//!
//! Scans the workspace sources for naming and documentation conventions that
//! clippy does not cover.

#[path = "style/naming_conventions.rs"]
mod naming_conventions;
