//! Worker process lifecycle and output interpretation.
//!
//! One worker process per [`WorkerSupervisor::run`] call: spawn with derived
//! arguments, drain stdout and stderr concurrently, classify every stdout
//! line into a [`StatusEvent`] pushed to the caller as it arrives, then
//! resolve a single terminal [`ProcessOutcome`] at exit. Overlapping runs
//! against the same worker are the caller layer's job to reject; this
//! component assumes single-flight usage and offers no cancellation API.

pub mod args;

use crate::classify::StatusClassifier;
use crate::config::{ConfigLocator, CONFIG_FILE_NAME};
use crate::error::SupervisorError;
use crate::model::{ProcessOutcome, SearchRequest, StatusEvent};
use crate::table;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Duration;
use tracing::debug;

/// File-fallback retry schedule: the worker may still be flushing its
/// output file moments after exit.
const FALLBACK_ATTEMPTS: u32 = 3;
const FALLBACK_DELAY_STEP: Duration = Duration::from_millis(300);

pub struct WorkerSupervisor {
    worker_program: PathBuf,
    working_dir: PathBuf,
}

impl WorkerSupervisor {
    /// Supervisor for the given worker executable. The working directory
    /// defaults to the executable's own directory, since the worker looks
    /// for its config file relative to where it runs.
    pub fn new(worker_program: PathBuf) -> Self {
        let working_dir = worker_program
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            worker_program,
            working_dir,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    /// Run one search. Status events are pushed on `event_tx` in exactly the
    /// order the worker emitted their source lines; the returned outcome is
    /// always the last word. A non-zero worker exit is reported through the
    /// outcome, not as an `Err` — errors are reserved for conditions where
    /// no outcome exists (missing config, spawn failure, broken pipes).
    pub async fn run(
        &self,
        locator: &mut ConfigLocator,
        request: &SearchRequest,
        event_tx: &UnboundedSender<StatusEvent>,
    ) -> Result<ProcessOutcome, SupervisorError> {
        // Fatal precondition: an active, existing configuration file,
        // checked before any process is spawned.
        let config_file = locator.existing_config_file()?;
        self.ensure_config_copy(&config_file);

        let output_path = args::output_file_path(request);
        if let Err(e) = std::fs::create_dir_all(&request.output_directory) {
            debug!(error = %e, "could not create output directory, worker may fail to save");
        }
        let argv = args::derive_args(request, &output_path);
        debug!(program = %self.worker_program.display(), ?argv, "spawning worker");

        let mut child = tokio::process::Command::new(&self.worker_program)
            .args(&argv)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SupervisorError::SpawnFailure {
                program: self.worker_program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        // stderr is accumulated only: not classified, not streamed. It is
        // drained concurrently so the worker can never block on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        // stdout feeds a single ordered classify-and-forward path.
        let mut classifier = StatusClassifier::new();
        let mut stdout_text = String::new();
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    stdout_text.push_str(&line);
                    stdout_text.push('\n');
                    if let Some(event) = classifier.classify(&line) {
                        let _ = event_tx.send(event);
                    }
                }
                Ok(None) => break,
                Err(e) => return Err(SupervisorError::OutputStream(e)),
            }
        }

        let status = child.wait().await.map_err(SupervisorError::OutputStream)?;
        let stderr_text = stderr_task.await.unwrap_or_default();
        let exit_code = status.code().unwrap_or(-1);
        debug!(exit_code, "worker exited");

        let table = if status.success() {
            let records = self.extract_table(&stdout_text, &output_path).await;
            let _ = event_tx.send(StatusEvent::Completed);
            records
        } else {
            None
        };

        Ok(ProcessOutcome {
            exit_code,
            stdout_text,
            stderr_text,
            table,
            output_file_path: output_path,
        })
    }

    /// The worker reads its config from its working directory, so make sure
    /// a copy of the active file exists there. Copy only when missing,
    /// never overwrite.
    fn ensure_config_copy(&self, config_file: &Path) {
        let dest = self.working_dir.join(CONFIG_FILE_NAME);
        if dest.exists() || dest == *config_file {
            return;
        }
        if let Err(e) = std::fs::copy(config_file, &dest) {
            debug!(dest = %dest.display(), error = %e, "could not copy config into working directory");
        }
    }

    /// Embedded block first; absence of markers is not an error, it only
    /// triggers the file fallback with a bounded escalating-delay retry.
    async fn extract_table(
        &self,
        stdout_text: &str,
        output_path: &Path,
    ) -> Option<Vec<crate::model::BusinessRecord>> {
        if let Some(block) =
            table::extract_embedded(stdout_text, table::CSV_START_MARKER, table::CSV_END_MARKER)
        {
            match table::records_from_text(&block) {
                Ok(records) => return Some(records),
                Err(e) => debug!(error = %e, "embedded block did not parse, trying result file"),
            }
        }

        for attempt in 1..=FALLBACK_ATTEMPTS {
            match table::read_result_file(output_path) {
                Ok(records) => return Some(records),
                Err(e) => {
                    debug!(attempt, error = %e, "result file not readable yet");
                    if attempt < FALLBACK_ATTEMPTS {
                        tokio::time::sleep(FALLBACK_DELAY_STEP * attempt).await;
                    }
                }
            }
        }
        None
    }
}
