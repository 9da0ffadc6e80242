//! Full pipeline runs against a mock portal.

use govsnap_core::{Pipeline, SilentProgress, SourceOutcome};
use govsnap_provenance::decode;
use govsnap_shared::{AppConfig, Sensitivity, SourceDescriptor, SourceType};
use govsnap_snapshot::{clean_orphaned_metadata, stats};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOTICE_V1: &str = r#"<html><head><title>Public Hearing</title></head>
<body>
  <nav><a href="/">Home</a></nav>
  <main>
    <h1>Public Hearing</h1>
    <p>The council meets on <strong>Monday</strong>.</p>
  </main>
  <footer>City of Example</footer>
</body></html>"#;

const NOTICE_V2: &str = r#"<html><head><title>Public Hearing</title></head>
<body>
  <main>
    <h1>Public Hearing</h1>
    <p>The council meets on <strong>Tuesday</strong>.</p>
  </main>
</body></html>"#;

const DATASET: &str = r#"{"result": {"title": "Permits", "notes": "Issued permits.",
    "organization": {"title": "Building Department"},
    "resources": [{"name": "CSV", "format": "CSV", "url": "https://data.example.gov/p.csv"}]}}"#;

async fn mount(server: &MockServer, notice: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin/\n"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notices/hearing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(notice))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dataset/permits"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DATASET))
        .mount(server)
        .await;
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.http.max_retries = 2;
    config.http.retry_delay_ms = 10;
    config.http.rate_limit = 0;
    config.http.timeout_ms = 2_000;
    config.provenance.publisher = "City of Example".into();
    config.provenance.sensitivity_ceiling = Sensitivity::Internal;
    config
}

fn sources(base: &str) -> Vec<SourceDescriptor> {
    let mut notice = SourceDescriptor::new(
        format!("{base}/notices/hearing"),
        "council/hearing.md",
        SourceType::Html,
    );
    notice.department = Some("Clerk".into());
    notice.sensitivity = Some("confidential".into());

    let dataset = SourceDescriptor::new(
        format!("{base}/api/dataset/permits"),
        "data/permits.md",
        SourceType::Catalog,
    );
    let withdrawn = SourceDescriptor::new(
        format!("{base}/notices/withdrawn"),
        "council/withdrawn.md",
        SourceType::Html,
    );
    vec![notice, dataset, withdrawn]
}

#[tokio::test]
async fn rerun_writes_nothing_and_changes_are_captured_once() {
    let server = MockServer::start().await;
    mount(&server, NOTICE_V1).await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let sources = sources(&server.uri());

    // First run: two snapshots created, one permanent HTTP failure.
    let pipeline = Pipeline::with_output_root(&config(), root.clone()).unwrap();
    let first = pipeline.run(&sources, &SilentProgress).await;
    assert_eq!(first.created(), 2);
    assert_eq!(first.failed(), 1);
    assert_eq!(first.exit_code(), 1);
    assert!(matches!(
        &first.sources[2].outcome,
        SourceOutcome::Failed { kind, .. } if kind == "http"
    ));

    let hearing_path = root.join("council/hearing.md");
    let snapshot = std::fs::read_to_string(&hearing_path).unwrap();
    let decoded = decode(&snapshot).unwrap();
    let meta = decoded.metadata.unwrap();
    assert_eq!(meta.title.as_deref(), Some("Public Hearing"));
    assert_eq!(meta.publisher, "City of Example");
    assert_eq!(meta.department.as_deref(), Some("Clerk"));
    assert_eq!(meta.sensitivity, Some(Sensitivity::Internal));
    assert!(decoded.body.contains("The council meets on **Monday**."));
    assert!(!decoded.body.contains("Home"));
    let sidecar_v1 = std::fs::read_to_string(root.join("council/hearing.md.meta.json")).unwrap();

    // Second run with a fresh pipeline: nothing changes on disk.
    let pipeline = Pipeline::with_output_root(&config(), root.clone()).unwrap();
    let second = pipeline.run(&sources, &SilentProgress).await;
    assert_eq!(second.writes(), 0);
    assert_eq!(second.unchanged(), 2);
    assert_eq!(std::fs::read_to_string(&hearing_path).unwrap(), snapshot);
    assert_eq!(
        std::fs::read_to_string(root.join("council/hearing.md.meta.json")).unwrap(),
        sidecar_v1
    );

    // Third run after the notice changes upstream: exactly one update.
    server.reset().await;
    mount(&server, NOTICE_V2).await;
    let pipeline = Pipeline::with_output_root(&config(), root.clone()).unwrap();
    let third = pipeline.run(&sources, &SilentProgress).await;
    assert_eq!(third.updated(), 1);
    assert_eq!(third.unchanged(), 1);
    match &third.sources[0].outcome {
        SourceOutcome::Written {
            changed,
            created,
            hash,
            previous_hash,
        } => {
            assert!(*changed);
            assert!(!*created);
            assert_ne!(previous_hash.as_deref(), Some(hash.as_str()));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    let updated = decode(&std::fs::read_to_string(&hearing_path).unwrap()).unwrap();
    assert!(updated.body.contains("**Tuesday**"));

    let s = stats(&root).unwrap();
    assert_eq!(s.total_files, 2);
    assert!(s.newest_update.is_some());
    assert!(!root.join("council/withdrawn.md").exists());
    assert!(clean_orphaned_metadata(&root).unwrap().is_empty());
}
