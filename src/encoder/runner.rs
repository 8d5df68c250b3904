//! External encoder process supervision.
//!
//! One [`EncoderInvocation`] is one run of the tool: arguments are rendered
//! from the template, the process is started with both output streams piped
//! into a channel, and the runner waits up to the invocation's timeout.
//!
//! Failures never reach the caller. A timeout, a non-zero exit, or a missing
//! tool is handed to the [`EventRecorder`] and the caller receives an empty
//! string, which every consumer treats as "no usable result".

use super::template::{TemplateValues, render_args, split_args};
use super::EncoderError;
use crate::config::GallerySettings;
use crate::events::{EventContext, EventRecorder};
use crate::types::Orientation;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// How often the cancellation flag is checked while the tool is silent.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cooperative cancellation flag shared between the requester and the runner.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single encoder run. Created per call, executed once, discarded.
#[derive(Debug, Clone)]
pub struct EncoderInvocation {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub args_template: String,
    pub width: u32,
    pub height: u32,
    pub source_dimensions: Option<(u32, u32)>,
    pub orientation: Orientation,
    pub seek_seconds: u32,
    pub timeout: Duration,
    pub cancel: CancellationSignal,
    pub context: EventContext,
}

impl EncoderInvocation {
    pub fn new(source: impl Into<PathBuf>, args_template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            source: source.into(),
            destination: None,
            args_template: args_template.into(),
            width: 0,
            height: 0,
            source_dimensions: None,
            orientation: Orientation::default(),
            seek_seconds: 0,
            timeout,
            cancel: CancellationSignal::new(),
            context: EventContext::default(),
        }
    }

    pub fn destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Upright dimensions of the source, used for `{AspectRatio}`.
    pub fn source_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        self.source_dimensions = dimensions;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn seek_seconds(mut self, seconds: u32) -> Self {
        self.seek_seconds = seconds;
        self
    }

    pub fn cancel_with(mut self, signal: CancellationSignal) -> Self {
        self.cancel = signal;
        self
    }

    pub fn context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }
}

/// Runs the configured encoder executable.
pub struct EncoderRunner {
    tool_path: Option<PathBuf>,
    resources_path: PathBuf,
    recorder: Arc<dyn EventRecorder>,
}

impl EncoderRunner {
    pub fn new(
        tool_path: Option<PathBuf>,
        resources_path: impl Into<PathBuf>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            tool_path,
            resources_path: resources_path.into(),
            recorder,
        }
    }

    pub fn from_settings(settings: &GallerySettings, recorder: Arc<dyn EventRecorder>) -> Self {
        Self::new(
            settings.encoder.tool_path.clone(),
            settings.paths.resources_path.clone(),
            recorder,
        )
    }

    /// Whether an executable is configured at all.
    pub fn is_configured(&self) -> bool {
        self.tool_path.is_some()
    }

    /// Run the invocation and return the collected output text.
    ///
    /// Returns an empty string on timeout, cancellation, non-zero exit or a
    /// missing tool. Failures other than cancellation are recorded.
    pub fn execute(&self, invocation: &EncoderInvocation) -> String {
        match self.try_execute(invocation) {
            Ok(output) => output,
            Err(EncoderError::Cancelled) => {
                tracing::info!(source = %invocation.source.display(), "encoder run cancelled");
                String::new()
            }
            Err(e) => {
                let detail = match &e {
                    EncoderError::NonZeroExit { output, .. } => output.clone(),
                    _ => invocation.args_template.clone(),
                };
                self.recorder
                    .record(&e, invocation.context.clone().with_detail(detail));
                String::new()
            }
        }
    }

    /// Run the invocation, returning failures instead of recording them.
    pub fn try_execute(&self, invocation: &EncoderInvocation) -> Result<String, EncoderError> {
        let tool = self
            .tool_path
            .as_deref()
            .ok_or(EncoderError::NotConfigured)?;
        let args = render_args(
            &invocation.args_template,
            &TemplateValues {
                source: &invocation.source,
                destination: invocation.destination.as_deref(),
                width: invocation.width,
                height: invocation.height,
                source_dimensions: invocation.source_dimensions,
                orientation: invocation.orientation,
                seek_seconds: invocation.seek_seconds,
                bin_path: tool.parent(),
                resources_path: &self.resources_path,
            },
        );
        tracing::debug!(tool = %tool.display(), %args, "starting encoder");

        let mut command = Command::new(tool);
        command
            .args(split_args(&args))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so an abort also reaches wrapper scripts'
        // children.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut child = command
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    EncoderError::ToolMissing(tool.display().to_string())
                }
                _ => EncoderError::Spawn(e),
            })?;

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx.clone());
        }
        drop(tx);

        let deadline = Instant::now() + invocation.timeout;
        let mut output = String::new();

        // Collect until both streams close.
        loop {
            if invocation.cancel.is_cancelled() {
                abort(&mut child, invocation.destination.as_deref());
                return Err(EncoderError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                abort(&mut child, invocation.destination.as_deref());
                return Err(EncoderError::Timeout {
                    timeout_ms: invocation.timeout.as_millis() as u64,
                    command: format!("{} {args}", tool.display()),
                });
            }
            match rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(line) => {
                    output.push_str(&line);
                    output.push('\n');
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                abort(&mut child, invocation.destination.as_deref());
                return Err(EncoderError::Timeout {
                    timeout_ms: invocation.timeout.as_millis() as u64,
                    command: format!("{} {args}", tool.display()),
                });
            }
            thread::sleep(Duration::from_millis(10));
        };

        if !status.success() {
            return Err(EncoderError::NonZeroExit {
                code: status.code(),
                output,
            });
        }
        tracing::debug!(tool = %tool.display(), "encoder finished");
        Ok(output)
    }
}

fn spawn_line_reader(stream: impl Read + Send + 'static, tx: Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Kill the process with everything it spawned and remove whatever it
/// managed to write.
fn abort(child: &mut Child, destination: Option<&Path>) {
    kill_process_group(child);
    // The process may already have exited; that is not an error here.
    let _ = child.kill();
    let _ = child.wait();
    if let Some(dest) = destination
        && dest.exists()
        && let Err(e) = std::fs::remove_file(dest)
    {
        tracing::warn!(path = %dest.display(), "could not remove partial output: {e}");
    }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    // SAFETY: plain signal delivery; the group id is the child's own pid,
    // set through `process_group(0)` at spawn.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}
