//! End-to-end ingest pipeline: source → fetch → normalize → tag → snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use govsnap_fetch::{FetchConfig, FetchOutcome, Fetcher};
use govsnap_normalize::normalizer_for;
use govsnap_shared::{AppConfig, IngestError, ProvenanceDefaults, Result, SourceDescriptor};
use govsnap_provenance::TaggedDocument;
use govsnap_snapshot::{SnapshotStore, WriteResult};

use crate::report::{IngestReport, SourceOutcome, SourceReport};
use crate::tagging::tag_document;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a source starts processing.
    fn source_started(&self, source: &SourceDescriptor, index: usize, total: usize);
    /// Called when a source has an outcome.
    fn source_finished(&self, report: &SourceReport, index: usize, total: usize);
    /// Called once after every source has finished.
    fn done(&self, report: &IngestReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn source_started(&self, _source: &SourceDescriptor, _index: usize, _total: usize) {}
    fn source_finished(&self, _report: &SourceReport, _index: usize, _total: usize) {}
    fn done(&self, _report: &IngestReport) {}
}

enum Event {
    Started(usize),
    Finished(usize, SourceOutcome),
}

/// State shared by every source task of a run.
struct Stages {
    fetcher: Fetcher,
    store: Arc<SnapshotStore>,
    provenance: ProvenanceDefaults,
}

/// One configured ingest run. Owns the domain gate (through its fetcher) and
/// the snapshot store, so nothing leaks between pipelines.
pub struct Pipeline {
    stages: Arc<Stages>,
    concurrency: usize,
}

impl Pipeline {
    /// Build a pipeline writing under `config.output.root`.
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_output_root(config, PathBuf::from(&config.output.root))
    }

    /// Build a pipeline writing under `root` instead of the configured root.
    pub fn with_output_root(config: &AppConfig, root: PathBuf) -> Result<Self> {
        let fetcher = Fetcher::new(FetchConfig::from(&config.http))?;
        Ok(Self {
            stages: Arc::new(Stages {
                fetcher,
                store: Arc::new(SnapshotStore::new(root)),
                provenance: config.provenance.clone(),
            }),
            concurrency: config.http.concurrency.max(1) as usize,
        })
    }

    pub fn output_root(&self) -> &std::path::Path {
        self.stages.store.root()
    }

    /// Process every source. A failing source never stops the others;
    /// the report lists outcomes in input order.
    #[instrument(skip_all, fields(sources = sources.len(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        sources: &[SourceDescriptor],
        progress: &dyn ProgressReporter,
    ) -> IngestReport {
        let start = Instant::now();
        let total = sources.len();
        info!(root = %self.output_root().display(), "starting ingest run");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for (index, source) in sources.iter().cloned().enumerate() {
            let stages = Arc::clone(&self.stages);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let _ = tx.send(Event::Started(index));
                let outcome = stages.process(&source).await;
                let _ = tx.send(Event::Finished(index, outcome));
            });
        }
        drop(tx);

        let mut outcomes: Vec<Option<SourceOutcome>> = vec![None; total];
        while let Some(event) = rx.recv().await {
            match event {
                Event::Started(index) => progress.source_started(&sources[index], index, total),
                Event::Finished(index, outcome) => {
                    let report = source_report(&sources[index], outcome.clone());
                    progress.source_finished(&report, index, total);
                    outcomes[index] = Some(outcome);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "source task aborted");
            }
        }

        let reports = sources
            .iter()
            .zip(outcomes)
            .map(|(source, outcome)| {
                let outcome = outcome.unwrap_or_else(|| SourceOutcome::Failed {
                    kind: "internal".into(),
                    message: "source task aborted before finishing".into(),
                });
                source_report(source, outcome)
            })
            .collect();

        let report = IngestReport {
            sources: reports,
            elapsed: start.elapsed(),
        };

        info!(
            created = report.created(),
            updated = report.updated(),
            unchanged = report.unchanged(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingest run complete"
        );
        progress.done(&report);
        report
    }
}

fn source_report(source: &SourceDescriptor, outcome: SourceOutcome) -> SourceReport {
    SourceReport {
        url: source.url.clone(),
        output_path: source.output_path.clone(),
        outcome,
    }
}

impl Stages {
    #[instrument(skip_all, fields(url = %source.url, output = %source.output_path))]
    async fn process(&self, source: &SourceDescriptor) -> SourceOutcome {
        match self.try_process(source).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "source failed");
                SourceOutcome::Failed {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn try_process(&self, source: &SourceDescriptor) -> Result<SourceOutcome> {
        let url = Url::parse(&source.url)
            .map_err(|e| IngestError::config(format!("invalid URL '{}': {e}", source.url)))?;

        let success = match self.fetcher.fetch(&url).await {
            FetchOutcome::Success(success) => success,
            FetchOutcome::Failure(failure) => {
                return Ok(SourceOutcome::Failed {
                    kind: failure.kind.as_str().to_string(),
                    message: failure.message,
                });
            }
        };
        let retrieved_at = Utc::now();

        let normalizer = normalizer_for(source.source_type);
        let document = normalizer.normalize(&success.body, &source.url)?;
        debug!(normalizer = normalizer.name(), title = %document.title, "normalized");

        let final_url = success.redirected.then_some(success.final_url.as_str());
        let tagged = tag_document(source, document, &self.provenance, retrieved_at, final_url)?;

        let written = self.write_snapshot(&source.output_path, &tagged).await?;

        Ok(SourceOutcome::Written {
            changed: written.changed,
            created: written.created,
            hash: written.hash,
            previous_hash: written.previous_hash,
        })
    }

    /// Filesystem work and the per-path lock stay off the async workers.
    async fn write_snapshot(
        &self,
        output_path: &str,
        tagged: &TaggedDocument,
    ) -> Result<WriteResult> {
        let store = Arc::clone(&self.store);
        let path = output_path.to_string();
        let content = tagged.render();
        let fingerprint = tagged.fingerprint();

        tokio::task::spawn_blocking(move || {
            store.write_if_changed_with_hash(&path, &content, &fingerprint)
        })
        .await
        .map_err(|e| IngestError::io(output_path, std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use govsnap_shared::SourceType;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.http.max_retries = 1;
        config.http.retry_delay_ms = 10;
        config.http.rate_limit = 0;
        config.http.timeout_ms = 2_000;
        config
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recorder {
        fn source_started(&self, source: &SourceDescriptor, _index: usize, _total: usize) {
            self.events.lock().unwrap().push(format!("start {}", source.output_path));
        }
        fn source_finished(&self, report: &SourceReport, _index: usize, _total: usize) {
            self.events.lock().unwrap().push(format!("finish {}", report.output_path));
        }
        fn done(&self, report: &IngestReport) {
            self.events.lock().unwrap().push(format!("done {}", report.sources.len()));
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><head><title>Ok</title></head><body><main><p>Fine.</p></main></body></html>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::with_output_root(&config(), dir.path().to_path_buf()).unwrap();
        let sources = vec![
            SourceDescriptor::new(format!("{}/gone", server.uri()), "gone.md", SourceType::Html),
            SourceDescriptor::new(format!("{}/ok", server.uri()), "ok.md", SourceType::Html),
        ];

        let recorder = Recorder::default();
        let report = pipeline.run(&sources, &recorder).await;

        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[0].output_path, "gone.md");
        assert!(matches!(
            &report.sources[0].outcome,
            SourceOutcome::Failed { kind, .. } if kind == "http"
        ));
        assert!(matches!(
            report.sources[1].outcome,
            SourceOutcome::Written { changed: true, created: true, .. }
        ));
        assert_eq!(report.exit_code(), 1);
        assert!(dir.path().join("ok.md").is_file());
        assert!(!dir.path().join("gone.md").exists());

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(events.last().map(String::as_str), Some("done 2"));
    }

    #[tokio::test]
    async fn bad_structured_payload_is_a_parse_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/record"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::with_output_root(&config(), dir.path().to_path_buf()).unwrap();
        let sources = vec![SourceDescriptor::new(
            format!("{}/record", server.uri()),
            "record.md",
            SourceType::Catalog,
        )];

        let report = pipeline.run(&sources, &SilentProgress).await;
        assert!(matches!(
            &report.sources[0].outcome,
            SourceOutcome::Failed { kind, .. } if kind == "parse"
        ));
        assert_eq!(report.exit_code(), 3);
    }

    #[tokio::test]
    async fn empty_source_list_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::with_output_root(&config(), dir.path().to_path_buf()).unwrap();
        let report = pipeline.run(&[], &SilentProgress).await;
        assert!(report.sources.is_empty());
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn concurrent_run_keeps_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain body"))
            .mount(&server)
            .await;

        let mut config = config();
        config.http.concurrency = 4;
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::with_output_root(&config, dir.path().to_path_buf()).unwrap();

        let sources: Vec<_> = (0..8)
            .map(|i| {
                SourceDescriptor::new(
                    format!("{}/doc/{i}", server.uri()),
                    format!("docs/{i}.md"),
                    SourceType::Text,
                )
            })
            .collect();

        let report = pipeline.run(&sources, &SilentProgress).await;
        let paths: Vec<_> = report.sources.iter().map(|s| s.output_path.clone()).collect();
        let expected: Vec<_> = (0..8).map(|i| format!("docs/{i}.md")).collect();
        assert_eq!(paths, expected);
        assert_eq!(report.created(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sources_sharing_an_output_path_write_in_turn() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("shared body"))
            .mount(&server)
            .await;

        let mut config = config();
        config.http.concurrency = 2;
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::with_output_root(&config, dir.path().to_path_buf()).unwrap();
        let sources = vec![
            SourceDescriptor::new(format!("{}/a", server.uri()), "shared.md", SourceType::Text),
            SourceDescriptor::new(format!("{}/b", server.uri()), "shared.md", SourceType::Text),
        ];

        let report = pipeline.run(&sources, &SilentProgress).await;
        assert_eq!(report.created(), 1);
        assert_eq!(report.updated(), 1);

        let sidecar: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("shared.md.meta.json")).unwrap(),
        )
        .unwrap();
        let hashes: Vec<_> = report
            .sources
            .iter()
            .filter_map(|s| match &s.outcome {
                SourceOutcome::Written { hash, .. } => Some(hash.clone()),
                SourceOutcome::Failed { .. } => None,
            })
            .collect();
        assert!(hashes.iter().any(|h| sidecar["hash"] == h.as_str()));
    }
}
