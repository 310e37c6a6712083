//! Progress, feedback and cancellation between algorithms and their host
//!
//! A host (GUI, CLI, test harness) implements [`PluginHost`]. Algorithms
//! never talk to it directly: each run gets a fresh [`ProgressReporter`]
//! that throttles progress updates and turns a cancellation request into
//! [`Error::Cancelled`].

use crate::error::{Error, ErrorKind, Result};
use crate::Algorithm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Artifact handed back to the host when a run produces something to show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnData {
    /// A raster written to disk
    Raster(PathBuf),
    /// Plain text for display
    Text(String),
    /// A titled, preformatted report
    Report { title: String, body: String },
}

/// Services a host offers to a running algorithm.
///
/// All methods take `&self`; hosts use interior mutability for any state.
pub trait PluginHost {
    /// Non-fatal, user-visible message
    fn show_feedback(&self, message: &str);

    /// Progress of the current step, `percent` in `0..=100`
    fn update_progress(&self, label: &str, percent: u8);

    fn return_data(&self, data: ReturnData);

    /// Polled by algorithms at least once per scan-line
    fn is_cancel_requested(&self) -> bool;

    /// Called exactly once at the end of every run
    fn plugin_complete(&self);
}

/// Host that ignores everything and never cancels
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl PluginHost for NullHost {
    fn show_feedback(&self, _message: &str) {}
    fn update_progress(&self, _label: &str, _percent: u8) {}
    fn return_data(&self, _data: ReturnData) {}
    fn is_cancel_requested(&self) -> bool {
        false
    }
    fn plugin_complete(&self) {}
}

static NULL_HOST: NullHost = NullHost;

/// Host that forwards everything to `tracing`
#[derive(Debug, Default)]
pub struct LogHost {
    cancel: AtomicBool,
}

impl LogHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running algorithm to stop
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

impl PluginHost for LogHost {
    fn show_feedback(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn update_progress(&self, label: &str, percent: u8) {
        tracing::debug!("{} {}%", label, percent);
    }

    fn return_data(&self, data: ReturnData) {
        match data {
            ReturnData::Raster(path) => tracing::info!("Output raster: {}", path.display()),
            ReturnData::Text(text) => tracing::info!("{}", text),
            ReturnData::Report { title, body } => tracing::info!("{}\n{}", title, body),
        }
    }

    fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn plugin_complete(&self) {
        tracing::debug!("Plugin complete");
    }
}

/// Per-run progress state.
///
/// Only forwards an update when the label or the percentage changed since
/// the last one sent.
pub struct ProgressReporter<'a> {
    host: &'a dyn PluginHost,
    label: String,
    last: Option<(String, u8)>,
    cancel_reported: bool,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(host: &'a dyn PluginHost) -> Self {
        Self {
            host,
            label: String::new(),
            last: None,
            cancel_reported: false,
        }
    }

    /// Reporter connected to nothing, for direct library calls
    pub fn silent() -> ProgressReporter<'static> {
        ProgressReporter::new(&NULL_HOST)
    }

    /// Set the label used by subsequent [`ProgressReporter::update`] calls
    pub fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    pub fn update(&mut self, percent: u8) {
        let label = std::mem::take(&mut self.label);
        self.update_with_label(&label, percent);
        self.label = label;
    }

    pub fn update_with_label(&mut self, label: &str, percent: u8) {
        let percent = percent.min(100);
        let changed = match &self.last {
            Some((l, p)) => l != label || *p != percent,
            None => true,
        };
        if changed {
            self.host.update_progress(label, percent);
            self.last = Some((label.to_string(), percent));
        }
    }

    /// Report `done` out of `total` as a percentage
    pub fn fraction(&mut self, done: usize, total: usize) {
        let percent = if total == 0 {
            100
        } else {
            ((done as f64 / total as f64) * 100.0) as u8
        };
        self.update(percent);
    }

    pub fn feedback(&self, message: &str) {
        self.host.show_feedback(message);
    }

    pub fn return_data(&self, data: ReturnData) {
        self.host.return_data(data);
    }

    /// `Err(Error::Cancelled)` once the host has asked to stop. The user is
    /// told about it only the first time.
    pub fn check_cancelled(&mut self) -> Result<()> {
        if !self.host.is_cancel_requested() {
            return Ok(());
        }
        if !self.cancel_reported {
            self.host.show_feedback("Operation cancelled");
            self.cancel_reported = true;
        }
        Err(Error::Cancelled)
    }

    /// Tell the user why a run failed, worded by error kind
    pub fn report_error(&mut self, operation: &str, error: &Error) {
        let message = match error.kind() {
            ErrorKind::Cancelled => {
                if self.cancel_reported {
                    return;
                }
                self.cancel_reported = true;
                "Operation cancelled".to_string()
            }
            ErrorKind::ResourceExhausted => format!(
                "{}: not enough memory ({}). Try a smaller grid.",
                operation, error
            ),
            ErrorKind::Configuration => format!("{}: invalid input: {}", operation, error),
            ErrorKind::Io => format!("{}: could not read or write a raster: {}", operation, error),
            ErrorKind::Algorithm => format!("{} failed: {}", operation, error),
        };
        self.host.show_feedback(&message);
    }

    pub fn reset(&mut self) {
        self.label.clear();
        self.update_with_label("", 0);
    }
}

struct CompletionGuard<'a> {
    host: &'a dyn PluginHost,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.host.plugin_complete();
    }
}

/// Run an algorithm on behalf of a host.
///
/// Failures are reported through the host's feedback channel before being
/// returned. `plugin_complete` is called exactly once on every path,
/// including unwinding.
pub fn run_plugin<A>(
    host: &dyn PluginHost,
    algorithm: &A,
    input: A::Input,
    params: A::Params,
) -> Result<A::Output>
where
    A: Algorithm<Error = Error>,
{
    let _guard = CompletionGuard { host };
    tracing::info!("Running {}", algorithm.name());

    let mut progress = ProgressReporter::new(host);
    let result = algorithm.execute(input, params, &mut progress);
    match &result {
        Ok(_) => tracing::info!("{} finished", algorithm.name()),
        Err(e) => {
            tracing::warn!("{} failed: {}", algorithm.name(), e);
            progress.report_error(algorithm.name(), e);
        }
    }
    progress.reset();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingHost {
        progress: RefCell<Vec<(String, u8)>>,
        feedback: RefCell<Vec<String>>,
        completed: Cell<usize>,
        cancel: Cell<bool>,
    }

    impl PluginHost for RecordingHost {
        fn show_feedback(&self, message: &str) {
            self.feedback.borrow_mut().push(message.to_string());
        }
        fn update_progress(&self, label: &str, percent: u8) {
            self.progress.borrow_mut().push((label.to_string(), percent));
        }
        fn return_data(&self, _data: ReturnData) {}
        fn is_cancel_requested(&self) -> bool {
            self.cancel.get()
        }
        fn plugin_complete(&self) {
            self.completed.set(self.completed.get() + 1);
        }
    }

    struct Countdown;

    impl Algorithm for Countdown {
        type Input = u32;
        type Output = u32;
        type Params = ();
        type Error = Error;

        fn name(&self) -> &'static str {
            "Countdown"
        }

        fn description(&self) -> &'static str {
            "Counts down, failing on zero"
        }

        fn execute(&self, input: u32, _params: (), progress: &mut ProgressReporter<'_>) -> Result<u32> {
            for i in 0..input {
                progress.check_cancelled()?;
                progress.fraction(i as usize, input as usize);
            }
            if input == 0 {
                return Err(Error::InvalidParameter {
                    name: "input",
                    value: "0".into(),
                    reason: "must be positive".into(),
                });
            }
            Ok(input)
        }
    }

    #[test]
    fn test_progress_is_throttled() {
        let host = RecordingHost::default();
        let mut progress = ProgressReporter::new(&host);
        progress.set_label("Loop 1");
        progress.update(10);
        progress.update(10);
        progress.update(11);
        progress.update_with_label("Loop 2", 11);
        progress.update_with_label("Loop 2", 11);
        assert_eq!(
            *host.progress.borrow(),
            vec![
                ("Loop 1".to_string(), 10),
                ("Loop 1".to_string(), 11),
                ("Loop 2".to_string(), 11),
            ]
        );
    }

    #[test]
    fn test_completion_on_success() {
        let host = RecordingHost::default();
        assert_eq!(run_plugin(&host, &Countdown, 50, ()).unwrap(), 50);
        assert_eq!(host.completed.get(), 1);
        assert_eq!(host.progress.borrow().last(), Some(&(String::new(), 0)));
        assert!(host.feedback.borrow().is_empty());
    }

    #[test]
    fn test_completion_on_failure() {
        let host = RecordingHost::default();
        let err = run_plugin(&host, &Countdown, 0, ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(host.completed.get(), 1);
        assert_eq!(host.feedback.borrow().len(), 1);
        assert!(host.feedback.borrow()[0].contains("invalid input"));
    }

    #[test]
    fn test_cancellation() {
        let host = RecordingHost::default();
        host.cancel.set(true);
        let err = run_plugin(&host, &Countdown, 5, ()).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(host.completed.get(), 1);
        assert_eq!(*host.feedback.borrow(), vec!["Operation cancelled".to_string()]);
    }

    #[test]
    fn test_resource_exhaustion_is_reported_distinctly() {
        let host = RecordingHost::default();
        let mut progress = ProgressReporter::new(&host);
        progress.report_error("Clump", &Error::ResourceExhausted { cells: 1 << 40 });
        assert!(host.feedback.borrow()[0].contains("not enough memory"));
    }

    #[test]
    fn test_log_host_cancel() {
        let host = LogHost::new();
        assert!(!host.is_cancel_requested());
        host.cancel();
        let mut progress = ProgressReporter::new(&host);
        assert!(progress.check_cancelled().is_err());
    }
}
