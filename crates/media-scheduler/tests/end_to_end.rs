//! Full path: scheduler -> provider client (mock HTTP) -> local file persister.

use media_provider::{ModelRegistry, PollPolicy, ProviderClient, ProviderConfig, ProviderGenerator};
use media_scheduler::{BatchScheduler, ProgressCallback, SchedulerConfig};
use media_store::{InMemoryJobStore, LocalFilePersister};
use media_types::{BatchJob, BatchSettings, JobStatus, ModelFamily, ResultStatus};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn batch_of_four_polls_once_each_and_persists() {
    let server = MockServer::start().await;
    let poll_url = format!("{}/predictions/p/result", server.uri());
    let artifact_url = format!("{}/files/out.png", server.uri());
    Mock::given(method("POST"))
        .and(path("/wavespeed-ai/flux-dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": { "id": "p", "status": "processing", "urls": { "get": poll_url } }
        })))
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/predictions/p/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": { "id": "p", "status": "completed", "outputs": [artifact_url] }
        })))
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/out.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
        .mount(&server)
        .await;

    let client = ProviderClient::new(
        ProviderConfig::new("wavespeed", server.uri(), Some("k".into())),
        ModelRegistry::builtin(),
    )
    .with_poll_policy(
        ModelFamily::Image,
        PollPolicy::new(Duration::from_millis(20), 5),
    );
    let generator = Arc::new(ProviderGenerator::new().with_client(client));

    let dir = tempfile::tempdir().unwrap();
    let scheduler = BatchScheduler::new(
        Arc::new(InMemoryJobStore::new()),
        Arc::new(LocalFilePersister::new(dir.path())),
        SchedulerConfig::default(),
    );
    let mut settings = BatchSettings::new("a quiet harbour", "flux-dev", 4);
    settings.max_concurrency = Some(2);
    settings.seed = Some(7);
    let job = scheduler.create_job("owner-a", settings).await.unwrap();

    let snapshots: Arc<Mutex<Vec<BatchJob>>> = Arc::default();
    let sink = Arc::clone(&snapshots);
    let progress: ProgressCallback = Arc::new(move |j: &BatchJob| {
        sink.lock().unwrap().push(j.clone());
    });
    let done = scheduler
        .execute_batch(&job.id, generator, Some(progress))
        .await
        .unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.completed_count, 4);
    assert_eq!(done.failed_count, 0);
    for (i, r) in done.results.iter().enumerate() {
        assert_eq!(r.index, i);
        assert_eq!(r.status, ResultStatus::Completed);
        assert!(r.duration_ms.unwrap() > 0);
        assert_eq!(r.remote_url.as_deref(), Some(artifact_url.as_str()));
        let locator = r.result.as_deref().unwrap();
        assert_eq!(std::fs::read(locator).unwrap(), b"png-bytes");
    }

    let snapshots = snapshots.lock().unwrap();
    assert!(snapshots.iter().all(|s| s.running_count() <= 2));
    assert!(snapshots
        .iter()
        .all(|s| s.completed_count + s.failed_count <= s.total_count));
    assert_eq!(snapshots.last().unwrap().status, JobStatus::Completed);

    let listed = scheduler.list_jobs_for_owner("owner-a").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, job.id);
}
