//! Host collaborators for a terminal process.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use nterrupt_core::host::{DismissTarget, ForegroundProbe, Presenter, WakeScheduler};
use nterrupt_core::{HostError, SurfaceView};

/// Scheduler for one-shot commands. The process exits right after the
/// command, so no timer is armed; the next invocation reconciles from the
/// durable store instead.
pub struct DetachedScheduler;

impl WakeScheduler for DetachedScheduler {
    fn schedule_one_shot(&mut self, entity_id: &str, at_ms: u64) -> Result<(), HostError> {
        tracing::info!(
            "Not arming wake-up for {} at {}: one-shot command exits immediately",
            entity_id,
            at_ms
        );
        Ok(())
    }

    fn cancel_one_shot(&mut self, _entity_id: &str) {}

    fn schedule_repeating(&mut self, interval_ms: u64) -> Result<(), HostError> {
        tracing::info!("Not arming {}ms refresh: one-shot command exits immediately", interval_ms);
        Ok(())
    }

    fn cancel_repeating(&mut self) {}
}

/// Presenter that reports surfaces through the log.
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn show(&mut self, entity_id: &str, display_name: &str, expiry_ms: u64) -> Result<(), HostError> {
        tracing::info!("[surface] show {} ({}) until {}", display_name, entity_id, expiry_ms);
        Ok(())
    }

    fn bring_to_front(&mut self, entity_id: &str) -> Result<(), HostError> {
        tracing::info!("[surface] bring {} to front", entity_id);
        Ok(())
    }

    fn render(&mut self, view: &SurfaceView) {
        tracing::debug!("[surface] {}: {} {}", view.title, view.countdown, view.message);
    }

    fn dismiss(&mut self, target: &DismissTarget) {
        match target {
            DismissTarget::Entity(id) => tracing::info!("[surface] dismiss {}", id),
            DismissTarget::All => tracing::info!("[surface] dismiss all"),
        }
    }
}

/// Upper bound on foreground command output read into memory.
const MAX_PROBE_OUTPUT_BYTES: u64 = 4096;

const PROBE_POLL: Duration = Duration::from_millis(10);

/// Foreground probe backed by a user-configured shell command.
///
/// The command runs with a deadline. One that is still running when the
/// deadline passes is killed and the probe reports nothing.
pub struct CommandProbe {
    command: Option<String>,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(command: Option<String>, timeout_ms: u64) -> Self {
        Self {
            command,
            timeout: Duration::from_millis(timeout_ms.max(1)),
        }
    }

    /// Run `command`, returning its stdout when it exits successfully in time.
    fn run_bounded(&self, command: &str) -> Option<Vec<u8>> {
        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Foreground command failed to run: {}", e);
                return None;
            }
        };

        // The reader owns the pipe so the caller can kill the child at any time.
        let stdout = child.stdout.take()?;
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut output = Vec::new();
            let result = stdout.take(MAX_PROBE_OUTPUT_BYTES).read_to_end(&mut output);
            // The receiver is gone after a timeout.
            let _ = tx.send(result.map(|_| output));
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    tracing::warn!(
                        "Foreground command still running after {}ms; killing it",
                        self.timeout.as_millis()
                    );
                    if let Err(e) = child.kill() {
                        tracing::debug!("Could not kill foreground command: {}", e);
                    }
                    if let Err(e) = child.wait() {
                        tracing::debug!("Could not reap foreground command: {}", e);
                    }
                    return None;
                }
                Ok(None) => std::thread::sleep(PROBE_POLL),
                Err(e) => {
                    tracing::warn!("Foreground command could not be awaited: {}", e);
                    return None;
                }
            }
        };

        if !status.success() {
            tracing::debug!("Foreground command exited with {}", status);
            return None;
        }
        // A background grandchild may keep the pipe open past the exit.
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining.max(PROBE_POLL)) {
            Ok(Ok(output)) => Some(output),
            Ok(Err(e)) => {
                tracing::warn!("Failed to read foreground command output: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!("Foreground command output not closed before the deadline");
                None
            }
        }
    }
}

impl ForegroundProbe for CommandProbe {
    fn current_foreground_entity(&mut self) -> Option<String> {
        let command = self.command.as_deref()?;
        let output = self.run_bounded(command)?;
        let entity = String::from_utf8_lossy(&output).trim().to_string();
        (!entity.is_empty()).then_some(entity)
    }
}
