//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive whole
//! crawl runs through the supervisor, observing them the way a stream
//! consumer would.

use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use sumi_gleaner::config::Config;
use sumi_gleaner::crawler::RunHandle;
use sumi_gleaner::output::TERMINAL_PREFIX;
use sumi_gleaner::{
    stream_events, CrawlEvent, EndReason, GleanerError, RunStatus, Supervisor, UrlError,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with short timeouts
fn create_test_config() -> Config {
    let mut config = Config::default();
    config.crawler.page_timeout_secs = 5;
    config.crawler.image_timeout_secs = 5;
    config.crawler.cancel_timeout_secs = 5;
    config
}

async fn mount_page(server: &MockServer, p: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(format!("<html><body>{}</body></html>", html), "text/html"),
        )
        .mount(server)
        .await;
}

async fn mount_image(server: &MockServer, p: &str, bytes: &[u8], expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes.to_vec(), "image/png"))
        .expect(expected_hits)
        .mount(server)
        .await;
}

/// Drains a run's events up to and including the terminal one
async fn drain(handle: &mut RunHandle) -> Vec<CrawlEvent> {
    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(20), handle.next_event())
        .await
        .expect("event stream stalled")
    {
        events.push(event);
    }
    events
}

fn image_paths(events: &[CrawlEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            CrawlEvent::ImageFound(record) => Some(record.source_url.path().to_string()),
            CrawlEvent::CrawlEnded { .. } => None,
        })
        .collect()
}

fn terminal_reason(events: &[CrawlEvent]) -> EndReason {
    match events.last() {
        Some(CrawlEvent::CrawlEnded { reason }) => *reason,
        other => panic!("stream did not end with a terminal event: {:?}", other),
    }
}

fn requested_paths(requests: &[wiremock::Request]) -> Vec<String> {
    requests.iter().map(|r| r.url.path().to_string()).collect()
}

#[tokio::test]
async fn test_duplicate_image_downloaded_once() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/",
        r#"<img src="/img/red.png">
           <img src="/img/blue.png">
           <img src="img/red.png">
           <a href="/page2">next</a>"#,
    )
    .await;
    mount_page(&server, "/page2", r#"<img src="/img/green.png">"#).await;
    mount_image(&server, "/img/red.png", b"red-bytes", 1).await;
    mount_image(&server, "/img/blue.png", b"blue-bytes", 1).await;
    mount_image(&server, "/img/green.png", b"green-bytes", 1).await;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let mut handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 10, dir.path())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        // Every announced file is already on disk
        if let CrawlEvent::ImageFound(record) = &event {
            assert!(record.path.exists(), "{} missing", record.path.display());
        }
        events.push(event);
    }

    assert_eq!(events.len(), 4);
    assert_eq!(
        image_paths(&events),
        vec!["/img/red.png", "/img/blue.png", "/img/green.png"]
    );
    assert_eq!(terminal_reason(&events), EndReason::QueueExhausted);

    let run = handle.wait_finished().await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.pages_visited, 2);
    assert_eq!(run.images_found, 3);
}

#[tokio::test]
async fn test_image_shared_across_pages_emitted_once() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/",
        r#"<img src="/img/red.png"><a href="/page2">next</a>"#,
    )
    .await;
    mount_page(
        &server,
        "/page2",
        r#"<img src="/img/red.png"><img src="/img/green.png">"#,
    )
    .await;
    mount_image(&server, "/img/red.png", b"red-bytes", 1).await;
    mount_image(&server, "/img/green.png", b"green-bytes", 1).await;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let mut handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 10, dir.path())
        .await
        .unwrap();

    let events = drain(&mut handle).await;
    assert_eq!(image_paths(&events), vec!["/img/red.png", "/img/green.png"]);
}

#[tokio::test]
async fn test_page_cap_of_one_stops_after_seed() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/",
        r#"<img src="/img/seed.png">
           <a href="/p1">1</a><a href="/p2">2</a><a href="/p3">3</a>
           <a href="/p4">4</a><a href="/p5">5</a>"#,
    )
    .await;
    mount_image(&server, "/img/seed.png", b"seed-bytes", 1).await;
    for p in ["/p1", "/p2", "/p3", "/p4", "/p5"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>never</p>", "text/html"))
            .expect(0)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let mut handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 1, dir.path())
        .await
        .unwrap();

    let events = drain(&mut handle).await;
    assert_eq!(image_paths(&events), vec!["/img/seed.png"]);
    assert_eq!(terminal_reason(&events), EndReason::PageCapReached);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requested_paths(&requests), vec!["/", "/img/seed.png"]);
    assert_eq!(handle.wait_finished().await.pages_visited, 1);
}

#[tokio::test]
async fn test_page_cap_of_one_without_links_exhausts_queue() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<img src="/img/seed.png">"#).await;
    mount_image(&server, "/img/seed.png", b"seed-bytes", 1).await;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let mut handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 1, dir.path())
        .await
        .unwrap();

    let events = drain(&mut handle).await;
    assert_eq!(terminal_reason(&events), EndReason::QueueExhausted);
}

#[tokio::test]
async fn test_missing_image_does_not_stop_run() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/",
        r#"<img src="/img/missing.png"><img src="/img/present.png">"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/img/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_image(&server, "/img/present.png", b"present", 1).await;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let mut handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 5, dir.path())
        .await
        .unwrap();

    let events = drain(&mut handle).await;
    assert_eq!(image_paths(&events), vec!["/img/present.png"]);
    assert_eq!(terminal_reason(&events), EndReason::QueueExhausted);
    assert_eq!(handle.wait_finished().await.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_malformed_seed_is_rejected() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();

    let result = supervisor.start_crawl("example.com", 5, dir.path()).await;

    assert!(matches!(
        result,
        Err(GleanerError::InvalidUrl(UrlError::Parse(_)))
    ));
    assert!(supervisor.current_run().await.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_new_crawl_supersedes_active_run() {
    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"<a href="/more">more</a>"#, "text/html")
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&slow)
        .await;
    mount_page(&slow, "/more", "<p>unreachable</p>").await;

    let fast = MockServer::start().await;
    mount_page(&fast, "/", r#"<img src="/img/fresh.png">"#).await;
    mount_image(&fast, "/img/fresh.png", b"fresh", 1).await;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();

    let mut first = supervisor
        .start_crawl(&format!("{}/", slow.uri()), 10, dir.path())
        .await
        .unwrap();

    // Let the first run get into its slow page fetch
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut second = supervisor
        .start_crawl(&format!("{}/", fast.uri()), 10, dir.path())
        .await
        .unwrap();

    // The old run is terminal before the new handle is even returned
    let old = first.progress();
    assert!(old.is_terminal());
    assert_eq!(old.status, RunStatus::Cancelled);
    assert!(second.id() > first.id());

    let old_events = drain(&mut first).await;
    assert_eq!(
        old_events,
        vec![CrawlEvent::CrawlEnded {
            reason: EndReason::Cancelled
        }]
    );

    let new_events = drain(&mut second).await;
    assert_eq!(image_paths(&new_events), vec!["/img/fresh.png"]);
    assert_eq!(terminal_reason(&new_events), EndReason::QueueExhausted);

    let requests = slow.received_requests().await.unwrap();
    assert_eq!(requested_paths(&requests), vec!["/"]);
}

#[tokio::test]
async fn test_superseding_run_with_full_event_buffer_is_prompt() {
    let server = MockServer::start().await;
    let names: Vec<String> = (1..=3).map(|n| format!("/img/still{}.png", n)).collect();
    let html: String = names
        .iter()
        .map(|n| format!(r#"<img src="{}">"#, n))
        .collect();
    mount_page(&server, "/", &html).await;
    for (n, name) in names.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(name.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(format!("still-{}", n).into_bytes(), "image/png"),
            )
            .mount(&server)
            .await;
    }

    let fresh = MockServer::start().await;
    mount_page(&fresh, "/", "<p>nothing here</p>").await;

    let mut config = create_test_config();
    config.crawler.event_buffer = 1;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(config).unwrap();

    // Nobody reads this handle, so the scheduler stalls on a full buffer
    let mut first = supervisor
        .start_crawl(&format!("{}/", server.uri()), 10, dir.path())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;

    let started = std::time::Instant::now();
    let mut second = supervisor
        .start_crawl(&format!("{}/", fresh.uri()), 10, dir.path())
        .await
        .unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "supersession took {:?}",
        started.elapsed()
    );

    assert_eq!(first.progress().status, RunStatus::Cancelled);

    let old_events = drain(&mut first).await;
    assert_eq!(terminal_reason(&old_events), EndReason::Cancelled);
    assert!(image_paths(&old_events).len() <= 1);

    let new_events = drain(&mut second).await;
    assert_eq!(terminal_reason(&new_events), EndReason::QueueExhausted);
}

#[tokio::test]
async fn test_non_html_page_is_skipped() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/",
        r#"<img src="/img/a.png"><a href="/feed">feed</a><a href="/gone">gone</a>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"img": "/img/b.png"}"#, "application/json"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_image(&server, "/img/a.png", b"a", 1).await;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let mut handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 10, dir.path())
        .await
        .unwrap();

    let events = drain(&mut handle).await;
    assert_eq!(image_paths(&events), vec!["/img/a.png"]);
    assert_eq!(terminal_reason(&events), EndReason::QueueExhausted);

    let run = handle.wait_finished().await;
    assert_eq!(run.pages_visited, 3);
    assert_eq!(run.status, RunStatus::Completed);
}

/// Seed served as `localhost`, link pointing at `127.0.0.1`: a different site
async fn mount_cross_site(seed_server: &MockServer, other: &MockServer, other_hits: u64) {
    let other_url = format!("{}/elsewhere", other.uri());
    mount_page(
        seed_server,
        "/",
        &format!(r#"<a href="{}">elsewhere</a>"#, other_url),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>other site</p>", "text/html"))
        .expect(other_hits)
        .mount(other)
        .await;
}

fn localhost_seed(server: &MockServer) -> String {
    format!("http://localhost:{}/", server.address().port())
}

#[tokio::test]
async fn test_off_site_links_not_followed_by_default() {
    let seed_server = MockServer::start().await;
    let other = MockServer::start().await;
    mount_cross_site(&seed_server, &other, 0).await;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let mut handle = supervisor
        .start_crawl(&localhost_seed(&seed_server), 10, dir.path())
        .await
        .unwrap();

    drain(&mut handle).await;
    assert_eq!(handle.wait_finished().await.pages_visited, 1);
}

#[tokio::test]
async fn test_off_site_links_followed_when_allowed() {
    let seed_server = MockServer::start().await;
    let other = MockServer::start().await;
    mount_cross_site(&seed_server, &other, 1).await;

    let mut config = create_test_config();
    config.crawler.same_origin_only = false;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(config).unwrap();
    let mut handle = supervisor
        .start_crawl(&localhost_seed(&seed_server), 10, dir.path())
        .await
        .unwrap();

    drain(&mut handle).await;
    assert_eq!(handle.wait_finished().await.pages_visited, 2);
}

#[tokio::test]
async fn test_stream_lines_end_with_terminal_line() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<img src="/img/one.png"><img src="/img/two%20words.png">"#,
    )
    .await;
    mount_image(&server, "/img/one.png", b"one", 1).await;
    mount_image(&server, "/img/two%20words.png", b"two", 1).await;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 10, dir.path())
        .await
        .unwrap();

    let lines: Vec<String> = stream_events(handle).collect().await;

    assert_eq!(
        lines,
        vec![
            "/images/127.0.0.1/one.png".to_string(),
            "/images/127.0.0.1/two%20words.png".to_string(),
            format!("{} queue_exhausted", TERMINAL_PREFIX),
        ]
    );
    assert!(dir.path().join("127.0.0.1").join("two words.png").exists());
}

#[tokio::test]
async fn test_slow_consumer_sees_every_event_in_order() {
    let server = MockServer::start().await;
    let names: Vec<String> = (1..=6).map(|n| format!("/img/photo{}.png", n)).collect();
    let html: String = names
        .iter()
        .map(|n| format!(r#"<img src="{}">"#, n))
        .collect();
    mount_page(&server, "/", &html).await;
    for (n, name) in names.iter().enumerate() {
        mount_image(&server, name, format!("bytes-{}", n).as_bytes(), 1).await;
    }

    let mut config = create_test_config();
    config.crawler.event_buffer = 1;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(config).unwrap();
    let mut handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 10, dir.path())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        tokio::time::sleep(Duration::from_millis(20)).await;
        events.push(event);
    }

    assert_eq!(image_paths(&events), names);
    assert_eq!(terminal_reason(&events), EndReason::QueueExhausted);
}

#[tokio::test]
async fn test_unwritable_output_fails_run() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<img src="/img/a.png">"#).await;

    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("occupied");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let mut handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 5, Path::new(&blocker))
        .await
        .unwrap();

    let events = drain(&mut handle).await;
    assert_eq!(
        events,
        vec![CrawlEvent::CrawlEnded {
            reason: EndReason::InternalError
        }]
    );
    assert_eq!(handle.wait_finished().await.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_cancel_active_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<p>slow</p>", "text/html")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(create_test_config()).unwrap();
    let mut handle = supervisor
        .start_crawl(&format!("{}/", server.uri()), 5, dir.path())
        .await
        .unwrap();

    assert!(supervisor.current_run().await.is_some());

    let run = supervisor.cancel_active().await.unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(supervisor.current_run().await.is_none());

    let events = drain(&mut handle).await;
    assert_eq!(terminal_reason(&events), EndReason::Cancelled);
}
