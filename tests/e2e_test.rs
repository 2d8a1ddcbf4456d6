//! End-to-end rendering tests
//!
//! These tests require:
//! 1. Redis running
//! 2. Gateway running on the configured port
//! 3. At least one worker running (two for the concurrency test), with
//!    Chrome available and OUTPUT_DIR readable from this process
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:3000)

mod helpers;

use helpers::*;
use serde_json::json;

const JOB_TIMEOUT_SECS: u64 = 120;

#[tokio::test]
#[ignore] // Requires running gateway, worker and Redis
async fn test_e2e_health_check() {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", base_url()))
        .send()
        .await
        .expect("Health check failed");

    assert!(response.status().is_success(), "{}", response.status());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
#[ignore] // Requires running gateway, worker and Redis
async fn test_e2e_html_renders_to_pdf() {
    let base_url = base_url();
    let client = reqwest::Client::new();

    let submitted = submit(
        &client,
        &base_url,
        &json!({ "inputType": "html", "content": "<h1>Hi</h1>" }),
    )
    .await
    .expect("Failed to submit job");
    assert_eq!(submitted.status, "queued");

    let status = poll_until_terminal(&client, &base_url, submitted.job_id, JOB_TIMEOUT_SECS)
        .await
        .expect("Job never finished");
    assert_eq!(status.state, "completed", "{:?}", status.error);

    let reference = status.result.expect("completed job has a result");
    assert!(reference.ends_with(".pdf"), "{reference}");

    if let Ok(bytes) = std::fs::read(&reference) {
        assert!(bytes.starts_with(b"%PDF"));
    }

    // Terminal status is stable across polls.
    let again = job_status(&client, &base_url, submitted.job_id).await.unwrap();
    assert_eq!(again.state, "completed");
    assert_eq!(again.result.as_deref(), Some(reference.as_str()));
}

#[tokio::test]
#[ignore] // Requires running gateway, worker and Redis
async fn test_e2e_canvas_renders_to_png() {
    let base_url = base_url();
    let client = reqwest::Client::new();

    let content = "<canvas id='c' width='200' height='100'></canvas>\
        <script>const g = document.getElementById('c').getContext('2d');\
        g.fillStyle = '#c00'; g.fillRect(0, 0, 200, 100);</script>";
    let submitted = submit(
        &client,
        &base_url,
        &json!({ "inputType": "html", "content": content, "options": { "format": "png" } }),
    )
    .await
    .expect("Failed to submit job");

    let status = poll_until_terminal(&client, &base_url, submitted.job_id, JOB_TIMEOUT_SECS)
        .await
        .expect("Job never finished");
    assert_eq!(status.state, "completed", "{:?}", status.error);

    let reference = status.result.unwrap();
    assert!(reference.ends_with(".png"), "{reference}");

    if let Ok(bytes) = std::fs::read(&reference) {
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Png);
        let png = image::load_from_memory(&bytes).unwrap().to_rgba8();
        let pixel = png.get_pixel(20, 20);
        assert!(pixel[0] > 150 && pixel[1] < 80, "canvas content missing: {pixel:?}");
    }
}

#[tokio::test]
#[ignore] // Requires running gateway, worker and Redis
async fn test_e2e_unreachable_url_fails_repeatedly() {
    let base_url = base_url();
    let client = reqwest::Client::new();

    // Repeated failures must not exhaust the worker's browser resources.
    for _ in 0..3 {
        let submitted = submit(
            &client,
            &base_url,
            &json!({ "inputType": "url", "content": "https://example.invalid" }),
        )
        .await
        .expect("Failed to submit job");

        let status = poll_until_terminal(&client, &base_url, submitted.job_id, JOB_TIMEOUT_SECS)
            .await
            .expect("Job never finished");
        assert_eq!(status.state, "failed");
        assert!(status.result.is_none());
        assert!(!status.error.unwrap_or_default().is_empty());
    }

    let healthy = submit(
        &client,
        &base_url,
        &json!({ "inputType": "html", "content": "<p>still alive</p>" }),
    )
    .await
    .unwrap();
    let status = poll_until_terminal(&client, &base_url, healthy.job_id, JOB_TIMEOUT_SECS)
        .await
        .unwrap();
    assert_eq!(status.state, "completed");
}

#[tokio::test]
#[ignore] // Requires running gateway, two workers and Redis
async fn test_e2e_concurrent_jobs_keep_their_results() {
    let base_url = base_url();
    let client = reqwest::Client::new();

    let first_body = json!({
        "inputType": "html",
        "content": "<h1>first</h1>",
        "options": { "hoverSelectors": ["#does-not-exist"] }
    });
    let second_body = json!({
        "inputType": "html",
        "content": "<h1>second</h1>",
        "options": { "format": "docx", "waitForEvent": "neverSet" }
    });

    let (first, second) = tokio::join!(
        submit(&client, &base_url, &first_body),
        submit(&client, &base_url, &second_body),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    assert_ne!(first.job_id, second.job_id);

    let polls = [first.job_id, second.job_id]
        .map(|id| poll_until_terminal(&client, &base_url, id, JOB_TIMEOUT_SECS));
    let mut results = futures::future::join_all(polls).await.into_iter();
    let a = results.next().unwrap().unwrap();
    let b = results.next().unwrap().unwrap();

    assert_eq!(a.state, "completed", "{:?}", a.error);
    assert_eq!(b.state, "completed", "{:?}", b.error);

    let ra = a.result.unwrap();
    let rb = b.result.unwrap();
    assert!(ra.contains(&first.job_id.to_string()) && ra.ends_with(".pdf"), "{ra}");
    assert!(rb.contains(&second.job_id.to_string()) && rb.ends_with(".docx"), "{rb}");
}

#[tokio::test]
#[ignore] // Requires running gateway and Redis
async fn test_e2e_invalid_submission_is_rejected() {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/v1/render", base_url()))
        .json(&json!({ "content": "<h1>Hi</h1>" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    assert!(body.get("jobId").is_none());
}
