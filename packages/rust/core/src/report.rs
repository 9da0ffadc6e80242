//! Per-source outcomes and the run-level report.

use std::time::Duration;

use serde::Serialize;

/// Result of processing one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// The snapshot write step ran. `changed == false` means the stored
    /// snapshot already matched.
    Written {
        changed: bool,
        created: bool,
        hash: String,
        previous_hash: Option<String>,
    },
    /// The source failed at some stage. `kind` is a fetch failure kind
    /// (`timeout`, `robots_blocked`, ...) or an error category
    /// (`parse`, `validation`, `io`, ...).
    Failed { kind: String, message: String },
}

impl SourceOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// One entry per input source, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub url: String,
    pub output_path: String,
    pub outcome: SourceOutcome,
}

/// Aggregate result of a pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub sources: Vec<SourceReport>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl IngestReport {
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Written { created: true, .. }))
    }

    /// Existing snapshots whose content changed.
    pub fn updated(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                SourceOutcome::Written {
                    changed: true,
                    created: false,
                    ..
                }
            )
        })
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Written { changed: false, .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(SourceOutcome::is_failure)
    }

    /// Sources whose content or sidecar was written this run.
    pub fn writes(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Written { changed: true, .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.outcome.is_failure())
    }

    /// Process exit code: `0` all succeeded (or nothing to do), `1` some
    /// sources failed, `3` every source failed.
    pub fn exit_code(&self) -> i32 {
        let failed = self.failed();
        if failed == 0 {
            0
        } else if failed == self.sources.len() {
            3
        } else {
            1
        }
    }

    fn count(&self, pred: impl Fn(&SourceOutcome) -> bool) -> usize {
        self.sources.iter().filter(|s| pred(&s.outcome)).count()
    }
}
