//! Batch lifecycle orchestration.
//!
//! This module owns the batch state machine (start/abort/cleanup) and the
//! controller glue that translates UI triggers into state transitions and
//! reflects state back as events. UI/CLI layers call into this module to keep
//! responsibilities separated.

mod batch;
mod controller;

pub use batch::BatchOrchestrator;
pub use controller::{run_controller, UiCommand};
