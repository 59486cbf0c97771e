#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the roadside planner.
//!
//! [`StageProgress`] renders pipeline stages as `indicatif` bars behind the
//! pipeline's [`ProgressCallback`] trait, and [`init_logger`] routes `log`
//! output through `indicatif-log-bridge` so log lines and bars do not
//! interleave.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use roadside_pipeline::progress::{ProgressCallback, Stage};

pub use indicatif::MultiProgress;

/// One `indicatif` bar per pipeline stage.
///
/// A stage with a known number of work items gets a bar with a count and
/// ETA; other stages get a spinner. Finished stages stay on screen with
/// their summary.
pub struct StageProgress {
    multi: MultiProgress,
    current: Mutex<Option<ProgressBar>>,
}

impl StageProgress {
    /// Creates a stage renderer drawing into `multi`.
    #[must_use]
    pub fn new(multi: &MultiProgress) -> Arc<dyn ProgressCallback> {
        Arc::new(Self {
            multi: multi.clone(),
            current: Mutex::new(None),
        })
    }

    fn with_current(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }
}

fn spinner(stage: Stage) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{prefix}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_prefix(stage.to_string());
    bar
}

fn counted(stage: Stage, total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "  [{prefix}] {msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-"),
    );
    bar.set_prefix(stage.to_string());
    bar
}

impl ProgressCallback for StageProgress {
    fn stage_started(&self, stage: Stage, total: Option<u64>) {
        let bar = match total {
            Some(total) if total > 0 => counted(stage, total),
            _ => spinner(stage),
        };
        let bar = self.multi.add(bar);
        bar.set_message("running");

        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = guard.replace(bar) {
            previous.finish();
        }
    }

    fn advance(&self, delta: u64) {
        self.with_current(|bar| bar.inc(delta));
    }

    fn stage_finished(&self, _stage: Stage, summary: String) {
        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = guard.take() {
            bar.set_style(
                ProgressStyle::with_template("  [{prefix}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.finish_with_message(summary);
        }
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
///
/// The filter comes from `RUST_LOG`. Returns the [`MultiProgress`] every
/// progress bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set when called twice (tests).
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
