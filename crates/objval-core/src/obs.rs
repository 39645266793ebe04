//! Structured lifecycle events for validation jobs.
//!
//! Events are emitted at `info!` (rejections at `warn!`) and can be
//! filtered through `OBJVAL_LOG`.

use tracing::{info, warn};

/// RAII guard entering a job-scoped span; events emitted while it lives
/// carry the job token.
pub struct JobSpan {
    _span: tracing::span::EnteredSpan,
}

impl JobSpan {
    pub fn enter(token: &str) -> Self {
        let span = tracing::info_span!("objval.job", token = %token);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_job_started(token: &str, target: &str, modules: usize, rejections: usize) {
    info!(
        event = "job.started",
        token = %token,
        target = %target,
        modules = modules,
        rejections = rejections,
    );
}

pub fn emit_job_finished(token: &str, duration_ms: u64, success: bool, valid: Option<bool>) {
    info!(
        event = "job.finished",
        token = %token,
        duration_ms = duration_ms,
        success = success,
        valid = ?valid,
    );
}

/// A plugin returned; `records` is the number of record results.
pub fn emit_plugin_finished(
    module: &str,
    plugin: &str,
    records: usize,
    success: Option<bool>,
    valid: Option<bool>,
) {
    info!(
        event = "plugin.finished",
        module = %module,
        plugin = %plugin,
        records = records,
        success = ?success,
        valid = ?valid,
    );
}

pub fn emit_module_rejected(module: &str, reason: &str) {
    warn!(event = "module.rejected", module = %module, reason = %reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_span_create() {
        let _span = JobSpan::enter("0b6f1c1e-job");
        emit_module_rejected("bogus", "Unknown or unavailable module 'bogus'.");
    }
}
