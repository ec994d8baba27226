// Marker line format shared by the job wrappers and the progress parser
use serde::{Deserialize, Serialize};

pub const PROCESSING_MARKER: &str = "Processing:";
pub const SUCCESS_MARKER: &str = "SUCCESS:";
pub const FAILED_MARKER: &str = "FAILED:";
pub const SUMMARY_PREFIX: &str = "All jobs completed.";
pub const LOG_BANNER: &str = "=== EZ-PHASE Execution Log ===";
pub const LOG_RULE: &str = "================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Started,
    Succeeded,
    Failed,
}

impl MarkerKind {
    fn prefix(self) -> &'static str {
        match self {
            MarkerKind::Started => PROCESSING_MARKER,
            MarkerKind::Succeeded => SUCCESS_MARKER,
            MarkerKind::Failed => FAILED_MARKER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub name: String,
    pub seed: u64,
}

/// `"{PREFIX} {name} seed {seed}"`
pub fn marker_line(kind: MarkerKind, name: &str, seed: u64) -> String {
    format!("{} {} seed {}", kind.prefix(), name, seed)
}

pub fn summary_line(total: usize, succeeded: usize, failed: usize) -> String {
    format!(
        "{} Total: {}, Succeeded: {}, Failed: {}",
        SUMMARY_PREFIX, total, succeeded, failed
    )
}

/// Parse one output line. Lines that merely mention a marker mid-text are
/// not markers.
pub fn parse_marker(line: &str) -> Option<Marker> {
    let line = line.trim();
    let (kind, rest) = [MarkerKind::Started, MarkerKind::Succeeded, MarkerKind::Failed]
        .into_iter()
        .find_map(|kind| {
            line.strip_prefix(kind.prefix())
                .map(|rest| (kind, rest.trim_start()))
        })?;

    let (name, seed) = rest.rsplit_once(" seed ")?;
    let seed = seed.trim().parse().ok()?;
    if name.is_empty() {
        return None;
    }

    Some(Marker {
        kind,
        name: name.to_string(),
        seed,
    })
}
