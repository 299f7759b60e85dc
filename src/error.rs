use std::path::PathBuf;
use thiserror::Error;

/// One failed writability probe, kept for diagnostics when every candidate
/// configuration directory is exhausted.
#[derive(Debug, Clone)]
pub struct ProbeAttempt {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// No active configuration file exists. Checked before any process is
    /// spawned; the remediation is part of the message because permission
    /// problems here are installation-specific and users must self-diagnose.
    #[error(
        "no configuration file found; run `bizfinder config set-key <API_KEY>` to create one"
    )]
    ConfigMissing,

    /// Every candidate directory failed the write probe.
    #[error("no writable configuration directory; attempted:{}", format_attempts(.attempts))]
    NoWritableLocation { attempts: Vec<ProbeAttempt> },

    /// The worker executable could not be started at all. Distinct from a
    /// non-zero exit, which is reported through the outcome instead.
    #[error("failed to start worker `{}`: {source}", .program.display())]
    SpawnFailure {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed reading worker output: {0}")]
    OutputStream(#[source] std::io::Error),
}

fn format_attempts(attempts: &[ProbeAttempt]) -> String {
    let mut out = String::new();
    for a in attempts {
        out.push_str(&format!("\n  {} ({})", a.path.display(), a.reason));
    }
    out
}
