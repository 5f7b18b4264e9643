//! Provider protocol tests against a mock HTTP server: inline vs poll, envelopes, failures.

use media_provider::{
    ModelRegistry, ModelSpec, PollOutcome, PollPolicy, ProviderClient, ProviderConfig,
    ProviderError, SubmitOutcome,
};
use media_types::{BatchSettings, ImageParams, ModelFamily, ModelParams, VideoParams};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_client(server: &MockServer, api_key: Option<&str>) -> ProviderClient {
    let fast = PollPolicy::new(Duration::from_millis(10), 3);
    ProviderClient::new(
        ProviderConfig::new("wavespeed", server.uri(), api_key.map(str::to_string)),
        ModelRegistry::builtin(),
    )
    .with_poll_policy(ModelFamily::Image, fast)
    .with_poll_policy(ModelFamily::Video, fast)
}

fn flux_settings() -> BatchSettings {
    BatchSettings::new("a lighthouse in fog", "flux", 1)
}

#[tokio::test]
async fn inline_submit_never_polls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wavespeed-ai/flux-dev"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "message": "success",
            "data": { "id": "p1", "status": "completed", "outputs": ["https://cdn/p1.png"] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "processing" })))
        .expect(0)
        .mount(&server)
        .await;

    let client = fast_client(&server, Some("test-key"));
    let outputs = client.generate(&flux_settings()).await.unwrap();
    assert_eq!(outputs, vec!["https://cdn/p1.png".to_string()]);
}

#[tokio::test]
async fn poll_url_is_followed_until_terminal() {
    let server = MockServer::start().await;
    let poll_url = format!("{}/predictions/p2/result", server.uri());
    Mock::given(method("POST"))
        .and(path("/wavespeed-ai/flux-dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p2", "status": "created", "outputs": [], "urls": { "get": poll_url }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/predictions/p2/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "p2", "status": "processing", "outputs": [] }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/predictions/p2/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "p2", "status": "completed", "outputs": ["https://cdn/p2.png"] }
        })))
        .mount(&server)
        .await;

    let client = fast_client(&server, Some("k"));
    let outputs = client.generate(&flux_settings()).await.unwrap();
    assert_eq!(outputs, vec!["https://cdn/p2.png".to_string()]);

    let polls = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(polls, 2);
}

#[tokio::test]
async fn submit_returns_poll_outcome_for_running_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kwaivgi/kling-v2.1-i2v-pro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "v1", "status": "processing" }
        })))
        .mount(&server)
        .await;

    let client = fast_client(&server, Some("k"));
    let outcome = client
        .submit("kling", &serde_json::Map::new())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Poll(format!("{}/predictions/v1/result", server.uri()))
    );
}

#[tokio::test]
async fn rejected_submit_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("prompt is required"))
        .mount(&server)
        .await;

    let client = fast_client(&server, Some("k"));
    match client.generate(&flux_settings()).await {
        Err(ProviderError::Protocol(msg)) => assert!(msg.contains("prompt is required")),
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_model_and_missing_key_send_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = fast_client(&server, Some("k"));
    let mut settings = flux_settings();
    settings.model = "does-not-exist".into();
    assert!(matches!(
        client.generate(&settings).await,
        Err(ProviderError::Configuration(_))
    ));

    let keyless = fast_client(&server, None);
    assert!(matches!(
        keyless.generate(&flux_settings()).await,
        Err(ProviderError::Configuration(_))
    ));
}

#[tokio::test]
async fn poll_budget_exhaustion_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "queued", "poll_url": format!("{}/jobs/slow", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "processing" })))
        .expect(3)
        .mount(&server)
        .await;

    let client = fast_client(&server, Some("k"));
    assert!(matches!(
        client.generate(&flux_settings()).await,
        Err(ProviderError::Timeout(_))
    ));
}

#[tokio::test]
async fn provider_failure_keeps_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "f1", "status": "created", "urls": { "get": format!("{}/predictions/f1/result", server.uri()) } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "f1", "status": "failed", "error": "Input image violates content policy" }
        })))
        .mount(&server)
        .await;

    let client = fast_client(&server, Some("k"));
    match client.generate(&flux_settings()).await {
        Err(ProviderError::Generation(msg)) => {
            assert_eq!(msg, "Input image violates content policy")
        }
        other => panic!("expected generation error, got {:?}", other),
    }
    assert_eq!(
        client
            .poll(&format!("{}/predictions/f1/result", server.uri()))
            .await
            .unwrap(),
        PollOutcome::Failed("Input image violates content policy".to_string())
    );
}

#[tokio::test]
async fn submitted_body_follows_model_field_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed", "outputs": ["https://cdn/out.mp4"]
        })))
        .mount(&server)
        .await;

    let registry = ModelRegistry::builtin().with(
        ModelSpec::video("cfg-video", "acme/cfg-video")
            .guidance_field("cfg_scale")
            .end_image_field("tail_image"),
    );
    let client = ProviderClient::new(
        ProviderConfig::new("wavespeed", server.uri(), Some("k".into())),
        registry,
    );

    let mut settings = BatchSettings::new("a train at night", "cfg-video", 1);
    settings.seed = Some(11);
    settings.params = ModelParams::Video(VideoParams {
        guidance: Some(6.0),
        image: Some("https://in/start.png".into()),
        end_image: Some("https://in/end.png".into()),
        duration: Some(5),
        ..Default::default()
    });
    settings
        .extra
        .insert("guidance_scale".into(), json!(3.0));
    client.generate(&settings).await.unwrap();

    let mut image_settings = BatchSettings::new("a bowl of fruit", "flux-dev", 1);
    image_settings.params = ModelParams::Image(ImageParams {
        guidance: Some(3.5),
        ..Default::default()
    });
    client.generate(&image_settings).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);

    let video: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(requests[0].url.path(), "/acme/cfg-video");
    assert_eq!(video["cfg_scale"], json!(6.0));
    assert!(video.get("guidance_scale").is_none());
    assert_eq!(video["tail_image"], json!("https://in/end.png"));
    assert_eq!(video["seed"], json!(11));

    let image: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(requests[1].url.path(), "/wavespeed-ai/flux-dev");
    assert_eq!(image["guidance_scale"], json!(3.5));
    assert!(image.get("cfg_scale").is_none());
}
