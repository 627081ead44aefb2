//! Progress of the per-point soil stages.
//!
//! Attribution walks every grid point once and reports through this trait.
//! The terminal bar lives in `soil_trade_cli_utils`; the pipeline's own
//! tests pass [`NullProgress`].

use std::sync::Arc;

/// Receives point counts from a soil stage.
pub trait ProgressCallback: Send + Sync {
    /// Number of grid points the stage will visit.
    fn set_total(&self, total: u64);

    /// `delta` more points visited.
    fn inc(&self, delta: u64);

    /// Replaces the stage label.
    fn set_message(&self, msg: String);

    /// The stage is done; `msg` says how many points matched.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// A shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
