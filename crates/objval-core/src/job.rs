//! Validation jobs.
//!
//! A job runs every module of a [`ModuleSelectionPlan`] against one target
//! and folds the plugin results and selection rejections into a single
//! [`Report`] with an overall verdict.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::log::{Log, LogLevel};
use crate::obs::{self, JobSpan};
use crate::plugin::{Args, CancelToken, ExecutionContext, ValidationResult};
use crate::selection::ModuleSelectionPlan;

/// Origin attributed to messages written by the job itself.
pub const JOB_ORIGIN: &str = "Validation-Job";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// Verdict for a plan without modules and without rejections.
    pub empty_plan_valid: bool,
}

/// Overall outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Invalid,
    /// Some module was rejected or did not run to completion.
    Incomplete,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportData {
    pub success: bool,
    /// Absent when the job is incomplete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    /// Plugin results keyed by module id.
    pub details: BTreeMap<String, ValidationResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub token: Uuid,
    pub target: PathBuf,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: String,
    pub log: Log,
    pub data: ReportData,
}

impl Report {
    fn new(target: &Path) -> Self {
        Self {
            token: Uuid::new_v4(),
            target: target.to_path_buf(),
            started_at: Utc::now(),
            finished_at: None,
            progress: String::new(),
            log: Log::new(JOB_ORIGIN),
            data: ReportData::default(),
        }
    }

    pub fn verdict(&self) -> Verdict {
        match (self.data.success, self.data.valid) {
            (true, Some(true)) => Verdict::Valid,
            (true, Some(false)) => Verdict::Invalid,
            _ => Verdict::Incomplete,
        }
    }
}

pub struct ValidationJob {
    target: PathBuf,
    plan: ModuleSelectionPlan,
    options: JobOptions,
    cancel: CancelToken,
}

impl ValidationJob {
    pub fn new(target: impl Into<PathBuf>, plan: ModuleSelectionPlan) -> Self {
        Self {
            target: target.into(),
            plan,
            options: JobOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the job before its next record or plugin.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn plan(&self) -> &ModuleSelectionPlan {
        &self.plan
    }

    /// Run without progress reporting.
    pub fn run_detached(&self) -> Report {
        self.run(&mut |_| {})
    }

    /// Run the plan; every progress change is passed to `push`.
    pub fn run(&self, push: &mut dyn FnMut(&str)) -> Report {
        let clock = Instant::now();
        let mut report = Report::new(&self.target);
        let token = report.token.to_string();
        let _span = JobSpan::enter(&token);
        let target = self.target.to_string_lossy().into_owned();

        report.progress = format!("preparing validation of '{target}'");
        push(&report.progress);
        obs::emit_job_started(
            &token,
            &target,
            self.plan.modules.len(),
            self.plan.rejections.len(),
        );

        for rejection in &self.plan.rejections {
            report
                .log
                .error(format!("Module Selector: {}", rejection.reason));
        }

        let mut failed = 0;
        let mut all_valid = true;
        let mut cancelled = false;
        for module in &self.plan.modules {
            let display = module.plugin.display_name().to_string();
            if self.cancel.is_cancelled() {
                report
                    .log
                    .error(format!("Validation cancelled before plugin '{display}'."));
                cancelled = true;
                break;
            }
            report.log.info(format!("Calling plugin '{display}'"));
            report.progress = format!("running module '{}'", module.id);
            push(&report.progress);

            let mut args = Args::new();
            args.insert("path".to_string(), json!(target));
            args.extend(module.args.iter().map(|(k, v)| (k.clone(), v.clone())));
            debug!(module = %module.id, plugin = %module.plugin.name(), "executing plugin");

            let result = {
                let mut forward = |progress: &str| push(progress);
                let mut context =
                    ExecutionContext::new(display.as_str(), &mut forward, self.cancel.clone());
                module.plugin.execute(&mut context, &args)
            };
            obs::emit_plugin_finished(
                &module.id,
                module.plugin.name(),
                result.record_count(),
                result.success,
                result.valid,
            );

            report.log.merge(result.log.pick(LogLevel::Error));
            if result.success == Some(true) {
                all_valid &= result.valid == Some(true);
            } else {
                report
                    .log
                    .error(format!("Call to plugin '{display}' failed."));
                failed += 1;
            }
            report.data.details.insert(module.id.clone(), result);
        }

        let rejected = self.plan.rejections.len();
        report.data.success = !cancelled && failed == 0 && rejected == 0;
        if report.data.success {
            let valid = if self.plan.modules.is_empty() {
                report.log.info("No validation modules selected.");
                self.options.empty_plan_valid
            } else {
                all_valid
            };
            report.data.valid = Some(valid);
            if valid {
                report.log.info("Target is valid.");
            } else {
                let errors = report.log.count(LogLevel::Error);
                report
                    .log
                    .error(format!("Target is invalid (got {errors} error(s))."));
            }
        } else if !cancelled {
            report.log.error(format!(
                "Validation incomplete ({} plugin(s) gave bad response).",
                failed + rejected
            ));
        }

        report.progress = if report.data.success {
            "completed".to_string()
        } else {
            "failed".to_string()
        };
        push(&report.progress);
        report.finished_at = Some(Utc::now());
        obs::emit_job_finished(
            &token,
            clock.elapsed().as_millis() as u64,
            report.data.success,
            report.data.valid,
        );
        report
    }
}
