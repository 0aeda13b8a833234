#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for the `snow_posts` binary.
//!
//! The sync and repair pipelines walk the posts one at a time and report
//! through [`ProgressCallback`]; [`IndicatifProgress`] draws that as a
//! per-post bar. [`init_logger`] routes `log` output through the same
//! [`MultiProgress`] so warnings about failed lookups do not tear the bar.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use snow_posts_source::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "warn,snow_posts=info";

/// Which pipeline a bar belongs to. Only changes the colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sync,
    Repair,
}

impl Stage {
    const fn colour(self) -> &'static str {
        match self {
            Self::Sync => "cyan",
            Self::Repair => "yellow",
        }
    }
}

/// Per-post progress bar.
///
/// Starts as a spinner while the feature service is paged (the post count
/// is unknown until then) and becomes a bar with ETA on
/// [`ProgressCallback::set_total()`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    counted_style: ProgressStyle,
}

impl IndicatifProgress {
    fn new(multi: &MultiProgress, stage: Stage, message: &str) -> Self {
        let colour = stage.colour();
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template(&format!("{{spinner:.{colour}}} {{msg}}"))
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let counted_style = ProgressStyle::with_template(&format!(
            "  {{msg}} {{wide_bar:.{colour}/dim}} {{pos}}/{{len}} postes [{{eta}}]"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, counted_style }
    }

    /// Adds a ticking posts bar for `stage` to `multi`.
    #[must_use]
    pub fn posts_bar(
        multi: &MultiProgress,
        stage: Stage,
        message: &str,
    ) -> Arc<dyn ProgressCallback> {
        let progress = Self::new(multi, stage, message);
        progress.bar.enable_steady_tick(Duration::from_millis(100));
        Arc::new(progress)
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.counted_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge`.
///
/// `RUST_LOG` wins when set; otherwise [`DEFAULT_LOG_FILTER`] shows the
/// pipelines' info lines (pages fetched, batches projected, summaries).
/// Returns the [`MultiProgress`] that bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.parse_filters(DEFAULT_LOG_FILTER),
    };
    let logger = builder.build();
    let level = logger.filter();

    // Already installed when called twice in one process.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
