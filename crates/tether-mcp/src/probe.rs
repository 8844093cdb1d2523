//! Bounded-time availability probes. A probe never opens a session.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{Endpoint, ServerDescriptor};

/// Default probe budget.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityStatus {
    Available,
    /// The endpoint answered but refused the probe, so reachability is
    /// unconfirmed rather than disproved.
    PossiblyAvailable,
    Unavailable,
}

impl std::fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::PossiblyAvailable => "possibly available",
            AvailabilityStatus::Unavailable => "unavailable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub status: AvailabilityStatus,
    pub latency: Duration,
    pub diagnostic: String,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        self.status != AvailabilityStatus::Unavailable
    }
}

/// Probe `descriptor` within `timeout`.
pub async fn probe(http: &reqwest::Client, descriptor: &ServerDescriptor, timeout: Duration) -> Availability {
    let started = Instant::now();
    let (status, diagnostic) = match &descriptor.endpoint {
        Endpoint::Http { url } => probe_http(http, url, timeout).await,
        Endpoint::Stdio { command, .. } => probe_command(command),
    };
    Availability {
        status,
        latency: started.elapsed(),
        diagnostic,
    }
}

async fn probe_http(http: &reqwest::Client, url: &str, timeout: Duration) -> (AvailabilityStatus, String) {
    match http.get(url).timeout(timeout).send().await {
        Ok(response) => classify_status(response.status().as_u16()),
        Err(e) if e.is_timeout() => (
            AvailabilityStatus::Unavailable,
            format!("no response within {}ms", timeout.as_millis()),
        ),
        Err(e) if e.is_connect() => (AvailabilityStatus::Unavailable, format!("connection failed: {e}")),
        Err(e) => (AvailabilityStatus::PossiblyAvailable, format!("probe inconclusive: {e}")),
    }
}

fn classify_status(status: u16) -> (AvailabilityStatus, String) {
    match status {
        401 | 403 | 405 => (
            AvailabilityStatus::PossiblyAvailable,
            format!("endpoint rejected the probe with HTTP {status}"),
        ),
        500..=599 => (AvailabilityStatus::Unavailable, format!("server error HTTP {status}")),
        _ => (AvailabilityStatus::Available, format!("HTTP {status}")),
    }
}

fn probe_command(command: &str) -> (AvailabilityStatus, String) {
    match resolve_command(command) {
        Some(path) => (AvailabilityStatus::Available, format!("found {}", path.display())),
        None => (AvailabilityStatus::Unavailable, format!("'{command}' not found on PATH")),
    }
}

/// Resolve a command the way a shell would: paths as given, bare names via `PATH`.
fn resolve_command(command: &str) -> Option<PathBuf> {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}
