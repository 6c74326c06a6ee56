//! Segmentation client behavior against a mock processing service.

use std::time::Duration;

use tokio::sync::watch;
use vseg_ci::{CiConfig, CiError, PollOutcome, SegmentationJob, SegmentationJobClient};
use vseg_models::{SegmentationMode, SegmentationState};
use vseg_storage::{Credential, RetryPolicy};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> SegmentationJobClient {
    let mut config = CiConfig::new(Credential::new("AKIDtest", "secret").unwrap(), "media-125", "ap-beijing");
    config.scheme = "http".to_string();
    config.host = Some(server.address().to_string());
    config.poll_interval = Duration::from_millis(10);
    config.poll_retry_interval = Duration::from_millis(10);
    config.provision_settle = Duration::from_millis(1);
    config.retry = RetryPolicy::new("ci_request")
        .with_max_attempts(2)
        .with_backoff(vec![Duration::from_millis(1)])
        .with_timeouts(vec![Duration::from_secs(5)]);
    SegmentationJobClient::new(config).unwrap()
}

fn job_state(state: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        "<Response><JobsDetail><Code>Success</Code><Message></Message><JobId>j1</JobId><State>{}</State></JobsDetail></Response>",
        state
    ))
}

fn queue_list(entries: &[(&str, &str, &str)]) -> ResponseTemplate {
    let body: String = entries
        .iter()
        .map(|(id, state, category)| {
            format!(
                "<QueueList><QueueId>{id}</QueueId><Name>{id}</Name><State>{state}</State><Category>{category}</Category></QueueList>"
            )
        })
        .collect();
    ResponseTemplate::new(200).set_body_string(format!(
        "<Response><RequestId>r</RequestId><TotalCount>{}</TotalCount>{}</Response>",
        entries.len(),
        body
    ))
}

fn submitted(job_id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        "<Response><JobsDetail><Code>Success</Code><JobId>{job_id}</JobId><State>Submitted</State></JobsDetail></Response>"
    ))
}

fn unbound() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_string(
        "<Error><Code>AIBucketUnBinded</Code><Message>the bucket is not bound</Message></Error>",
    )
}

fn tracked(job_id: &str) -> SegmentationJob {
    SegmentationJob::submitted(job_id, "input/v.mp4", "output/p.mp4", SegmentationMode::Foreground, None)
}

#[tokio::test]
async fn poll_terminates_on_first_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(job_state("Submitted"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(job_state("Running"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(job_state("Success"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (_tx, mut cancel) = watch::channel(false);
    let mut job = tracked("j1");

    let outcome = client.poll(&mut job, Duration::from_secs(5), &mut cancel).await;
    assert_eq!(outcome, PollOutcome::Success);
    assert_eq!(job.state, SegmentationState::Success);
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn poll_reports_remote_failure_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<Response><JobsDetail><Code>Failed</Code><Message>no person detected</Message><JobId>j1</JobId><State>Failed</State></JobsDetail></Response>",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (_tx, mut cancel) = watch::channel(false);
    let mut job = tracked("j1");

    let outcome = client.poll(&mut job, Duration::from_secs(5), &mut cancel).await;
    assert_eq!(
        outcome,
        PollOutcome::Failed {
            message: "no person detected".into()
        }
    );
    assert_eq!(job.state, SegmentationState::Failed);
}

#[tokio::test]
async fn poll_timeout_is_not_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(job_state("Running"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (_tx, mut cancel) = watch::channel(false);
    let mut job = tracked("j1");

    let outcome = client.poll(&mut job, Duration::from_millis(100), &mut cancel).await;
    assert_eq!(
        outcome,
        PollOutcome::Timeout {
            last_state: SegmentationState::Running
        }
    );
    // Bounded by budget / interval plus the final query.
    let queries = server.received_requests().await.unwrap().len();
    assert!(queries >= 2 && queries <= 12, "unexpected query count {queries}");
}

#[tokio::test]
async fn poll_with_only_unknown_states_times_out_instead_of_failing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(job_state("Pausing"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (_tx, mut cancel) = watch::channel(false);
    let mut job = tracked("j1");

    let outcome = client.poll(&mut job, Duration::from_millis(100), &mut cancel).await;
    assert_eq!(
        outcome,
        PollOutcome::Timeout {
            last_state: SegmentationState::Submitted
        }
    );
    assert_eq!(job.state, SegmentationState::Submitted);
    assert!(server.received_requests().await.unwrap().len() >= 2);
}

#[tokio::test]
async fn poll_budget_bounds_a_slow_status_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(job_state("Running").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (_tx, mut cancel) = watch::channel(false);
    let mut job = tracked("j1");

    let started = std::time::Instant::now();
    let outcome = client.poll(&mut job, Duration::from_millis(200), &mut cancel).await;
    let elapsed = started.elapsed();

    assert_eq!(
        outcome,
        PollOutcome::Timeout {
            last_state: SegmentationState::Submitted
        }
    );
    assert!(elapsed < Duration::from_secs(1), "poll overran its budget: {elapsed:?}");
}

#[tokio::test]
async fn cancel_interrupts_a_slow_status_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(job_state("Running").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (tx, mut cancel) = watch::channel(false);
    let mut job = tracked("j1");

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(true);
    });

    let started = std::time::Instant::now();
    let outcome = client.poll(&mut job, Duration::from_secs(5), &mut cancel).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, PollOutcome::Cancelled);
    assert!(elapsed < Duration::from_secs(1), "cancel waited for the query: {elapsed:?}");
}

#[tokio::test]
async fn poll_tolerates_unknown_states_and_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(job_state("Pausing"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(job_state("Success"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (_tx, mut cancel) = watch::channel(false);
    let mut job = tracked("j1");

    let outcome = client.poll(&mut job, Duration::from_secs(5), &mut cancel).await;
    assert_eq!(outcome, PollOutcome::Success);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn poll_observes_cancellation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(job_state("Running"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (tx, mut cancel) = watch::channel(false);
    let mut job = tracked("j1");

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
        // Keep the sender alive until the poll loop has seen the change.
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let outcome = client.poll(&mut job, Duration::from_secs(10), &mut cancel).await;
    assert_eq!(outcome, PollOutcome::Cancelled);
    canceller.abort();
}

#[tokio::test]
async fn submit_uses_cached_active_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ai_queue"))
        .respond_with(queue_list(&[("p-trans", "Active", "Transcoding"), ("p-ai", "Active", "AIProcess")]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(body_string_contains("<QueueId>p-ai</QueueId>"))
        .and(body_string_contains("<Mode>Foreground</Mode>"))
        .respond_with(submitted("j-100"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client
        .submit("input/v.mp4", "output/p.mp4", &SegmentationMode::Foreground)
        .await
        .unwrap();
    assert_eq!(first.job_id, "j-100");
    assert_eq!(first.queue_id.as_deref(), Some("p-ai"));
    assert_eq!(first.state, SegmentationState::Submitted);

    client
        .submit("input/v2.mp4", "output/p2.mp4", &SegmentationMode::Foreground)
        .await
        .unwrap();

    let authorization = server.received_requests().await.unwrap()[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(authorization.starts_with("q-sign-algorithm=sha1&q-ak=AKIDtest"));
}

#[tokio::test]
async fn submit_activates_paused_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ai_queue"))
        .respond_with(queue_list(&[("p-paused", "Paused", "AIProcess")]))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/ai_queue/p-paused"))
        .and(body_string_contains("<State>Active</State>"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<Response/>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(body_string_contains("<QueueId>p-paused</QueueId>"))
        .respond_with(submitted("j-2"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let combo = SegmentationMode::Combination {
        background_url: "https://media-125.cos.ap-beijing.myqcloud.com/backgrounds/bg.png".into(),
    };
    let job = client.submit("input/v.mp4", "output/p.mp4", &combo).await.unwrap();
    assert_eq!(job.job_id, "j-2");
}

#[tokio::test]
async fn missing_queues_provision_then_rediscover() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ai_queue"))
        .respond_with(queue_list(&[]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ai_queue"))
        .respond_with(queue_list(&[("p-new", "Active", "AIProcess")]))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ai_bucket"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<Response/>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.resolve_queue().await.unwrap().as_deref(), Some("p-new"));
}

#[tokio::test]
async fn unbound_capability_is_provisioned_and_retried_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ai_queue"))
        .respond_with(queue_list(&[("p-trans", "Active", "Transcoding")]))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(unbound())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(submitted("j-3"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ai_bucket"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<Response/>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let job = client
        .submit("input/v.mp4", "output/p.mp4", &SegmentationMode::Foreground)
        .await
        .unwrap();
    assert_eq!(job.job_id, "j-3");
    assert_eq!(job.queue_id, None);
}

#[tokio::test]
async fn persistent_unbound_capability_gives_guidance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ai_queue"))
        .respond_with(queue_list(&[("p-trans", "Active", "Transcoding")]))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(unbound())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ai_bucket"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<Response/>"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .submit("input/v.mp4", "output/p.mp4", &SegmentationMode::Foreground)
        .await
        .unwrap_err();
    match err {
        CiError::CapabilityNotEnabled(message) => assert!(message.contains("AIProcess")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn submission_error_forces_queue_rediscovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ai_queue"))
        .respond_with(queue_list(&[("p-ai", "Active", "AIProcess")]))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            "<Error><Code>InvalidArgument</Code><Message>queue is invalid</Message></Error>",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(submitted("j-4"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .submit("input/v.mp4", "output/p.mp4", &SegmentationMode::Foreground)
        .await
        .unwrap_err();
    assert!(matches!(err, CiError::Api { status: 400, .. }));

    let job = client
        .submit("input/v.mp4", "output/p.mp4", &SegmentationMode::Foreground)
        .await
        .unwrap();
    assert_eq!(job.job_id, "j-4");
}
