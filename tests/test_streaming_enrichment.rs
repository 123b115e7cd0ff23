mod fixtures;

use std::collections::HashSet;
use std::time::Duration;

use claim::*;
use enricher::enrich::{PipelineState, StreamingEnrichment};
use enricher::error::PipelineError;
use enricher::Measurement;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use self::fixtures::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_streaming_enriches_every_measurement_once() -> anyhow::Result<()> {
    once_cell::sync::Lazy::force(&enricher::tracing::TEST_TRACING);
    let main_span = tracing::info_span!("test_streaming_enriches_every_measurement_once");
    let _ = main_span.enter();

    const M: usize = 60;
    const N: i64 = 4;

    let server = MockServer::start().await;
    for i in 0..M {
        mount_widget_for(&server, &i.to_string()).await;
    }

    let settings = settings_for(&server, WIDGET_QUERY);
    let mut pipeline = StreamingEnrichment::new(make_enricher(&settings), N);
    let (tx, mut rx) = mpsc::channel(4);
    let collector = tokio::spawn(async move {
        let mut acc = Vec::new();
        while let Some(m) = rx.recv().await {
            acc.push(m);
        }
        acc
    });

    pipeline.start(tx).await?;
    for i in 0..M {
        pipeline.enqueue(Measurement::new("ping").with_tag("id", i.to_string())).await?;
    }
    pipeline.stop().await?;
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    let delivered = collector.await?;
    assert_eq!(delivered.len(), M);

    let ids: HashSet<String> = delivered
        .iter()
        .map(|m| {
            let id = assert_some!(m.tag("id")).to_string();
            assert_eq!(m.tag("name").map(|n| n.to_string()), Some(format!("widget-{}", id)));
            id
        })
        .collect();
    assert_eq!(ids.len(), M);

    let requests = assert_some!(server.received_requests().await);
    assert_eq!(requests.len(), M);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_waits_for_slow_enrichments() -> anyhow::Result<()> {
    once_cell::sync::Lazy::force(&enricher::tracing::TEST_TRACING);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "__root_element": { "__tag_name": "slow" } } }))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let mut pipeline = StreamingEnrichment::new(make_enricher(&settings_for(&server, WIDGET_QUERY)), 2);
    let (tx, mut rx) = mpsc::channel(16);
    pipeline.start(tx).await?;
    for i in 0..5 {
        pipeline.enqueue(Measurement::new("ping").with_tag("id", i.to_string())).await?;
    }

    pipeline.stop().await?;

    let mut delivered = Vec::new();
    while let Some(m) = rx.recv().await {
        delivered.push(m);
    }
    assert_eq!(delivered.len(), 5);
    assert!(delivered.iter().all(|m| m.tag("name") == Some("slow")));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_service_still_delivers_measurements() -> anyhow::Result<()> {
    once_cell::sync::Lazy::force(&enricher::tracing::TEST_TRACING);

    let settings = settings_with_url(url::Url::parse("http://127.0.0.1:1/graphql/")?, WIDGET_QUERY);
    let mut pipeline = StreamingEnrichment::new(make_enricher(&settings), 0);
    let (tx, mut rx) = mpsc::channel(16);
    pipeline.start(tx).await?;

    let input: Vec<Measurement> = (0..8).map(|i| Measurement::new("ping").with_tag("id", i.to_string())).collect();
    for m in input.iter().cloned() {
        pipeline.enqueue(m).await?;
    }
    pipeline.stop().await?;

    let mut delivered = Vec::new();
    while let Some(m) = rx.recv().await {
        delivered.push(m);
    }
    delivered.sort_by_key(|m| m.tag("id").map(|id| id.to_string()));
    assert_eq!(delivered, input);
    Ok(())
}

#[tokio::test]
async fn test_enqueue_after_stop_hands_measurement_back() -> anyhow::Result<()> {
    let settings = settings_with_url(url::Url::parse("http://127.0.0.1:1/graphql/")?, WIDGET_QUERY);
    let mut pipeline = StreamingEnrichment::new(make_enricher(&settings), 1);
    let (tx, _rx) = mpsc::channel(1);
    pipeline.start(tx).await?;
    pipeline.stop().await?;

    let m = Measurement::new("late").with_tag("id", "1");
    match assert_err!(pipeline.enqueue(m.clone()).await) {
        PipelineError::NotRunning(returned) => assert_eq!(returned, m),
        other => panic!("expected not running but got: {:?}", other),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_held_downstream_suspends_enqueue_until_released() -> anyhow::Result<()> {
    once_cell::sync::Lazy::force(&enricher::tracing::TEST_TRACING);
    let main_span = tracing::info_span!("test_held_downstream_suspends_enqueue_until_released");
    let _ = main_span.enter();

    const M: usize = 30;
    const N: usize = 2;

    let server = MockServer::start().await;
    for i in 0..M {
        mount_widget_for(&server, &i.to_string()).await;
    }

    let mut pipeline = StreamingEnrichment::new(make_enricher(&settings_for(&server, WIDGET_QUERY)), N as i64);
    let (tx, rx) = mpsc::channel(1);
    pipeline.start(tx).await?;

    let make = |i: usize| Measurement::new("ping").with_tag("id", i.to_string());
    let mut accepted = 0;
    while accepted < M {
        match tokio::time::timeout(Duration::from_millis(250), pipeline.enqueue(make(accepted))).await {
            Ok(enqueued) => {
                enqueued?;
                accepted += 1;
            },
            Err(_elapsed) => break,
        }
    }
    assert!(accepted < M, "enqueue never suspended");
    assert!(accepted <= N + 1 + N, "accepted {} measurements before suspending", accepted);

    let collector = tokio::spawn(async move {
        let mut rx = rx;
        let mut acc = Vec::new();
        while let Some(m) = rx.recv().await {
            acc.push(m);
        }
        acc
    });
    for i in accepted..M {
        pipeline.enqueue(make(i)).await?;
    }
    pipeline.stop().await?;

    let delivered = collector.await?;
    assert_eq!(delivered.len(), M);
    let ids: HashSet<String> = delivered.iter().filter_map(|m| m.tag("id").map(|id| id.to_string())).collect();
    assert_eq!(ids.len(), M);
    assert!(delivered.iter().all(|m| m.tag("name").is_some()));
    Ok(())
}
