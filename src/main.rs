use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use enricher::enrich::{BatchEnrichment, Enricher, HttpGraphQueryClient, QueryTemplate, StreamingEnrichment};
use enricher::graph::stage;
use enricher::graph::{Connect, Graph, SinkShape, SourceShape};
use enricher::metrics::register_enrichment_metrics;
use enricher::settings::{load_settings, EnrichmentSettings};
use enricher::tracing::{get_subscriber, init_subscriber};
use enricher::Measurement;
use prometheus::{Encoder, TextEncoder};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Enriches newline-delimited JSON measurements read on stdin with tags resolved from a GraphQL
/// service, writing the enriched measurements as JSON lines on stdout.
#[derive(Debug, Parser)]
#[command(version, author = "Damon Rolfs")]
struct CliOptions {
    /// configuration file to load; `APP__` prefixed environment variables override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// enrich all input as one batch, sequentially, instead of streaming.
    #[arg(long)]
    batch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("enricher", "info", std::io::stderr);
    init_subscriber(subscriber);

    let main_span = tracing::info_span!("main");
    let _main_span_guard = main_span.enter();

    let options = CliOptions::parse();
    tracing::info!(?options, "CLI parsed");

    let settings = load_settings(options.config.as_deref()).context("failed to load enrichment settings")?;
    register_enrichment_metrics(prometheus::default_registry())?;

    let enricher = make_enricher(&settings)?;
    if options.batch {
        run_batch(enricher, &settings).await?;
    } else {
        run_streaming(enricher, &settings).await?;
    }

    log_metrics();
    Ok(())
}

fn make_enricher(settings: &EnrichmentSettings) -> anyhow::Result<Enricher> {
    let client = HttpGraphQueryClient::from_settings(settings)?;
    let template = QueryTemplate::parse(settings.query.as_str());
    Ok(Enricher::new("enricher", Arc::new(template), Arc::new(client)))
}

#[tracing::instrument(level = "info", skip(enricher, settings))]
async fn run_streaming(enricher: Enricher, settings: &EnrichmentSettings) -> anyhow::Result<()> {
    let mut pipeline = StreamingEnrichment::new(enricher, settings.max_parallel);
    let (tx, rx) = mpsc::channel(settings.effective_max_parallel());
    let writer = spawn_writer(rx);
    pipeline.start(tx).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(measurement) = decode_line(&line) {
            pipeline.enqueue(measurement).await?;
        }
    }

    pipeline.stop().await?;
    writer.await??;
    Ok(())
}

#[tracing::instrument(level = "info", skip(enricher, settings))]
async fn run_batch(enricher: Enricher, settings: &EnrichmentSettings) -> anyhow::Result<()> {
    let mut measurements = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        measurements.extend(decode_line(&line));
    }

    let mut batch = BatchEnrichment::new(enricher, settings.template_policy);
    let enriched = batch.apply(measurements).await;

    let lines = encode_json_lines(enriched).await?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&lines).await?;
    stdout.flush().await?;
    Ok(())
}

async fn encode_json_lines(enriched: Vec<Measurement>) -> anyhow::Result<Vec<u8>> {
    let source = stage::Sequence::new("batch_enriched", enriched);
    let mut output = stage::Fold::new("batch_output", Vec::new(), append_json_line);
    let rx_output = output.take_final_rx().context("batch output receiver already taken")?;
    (source.outlet(), output.inlet()).connect().await;

    let mut graph = Graph::default();
    graph.push_back(Box::new(source));
    graph.push_back(Box::new(output));
    graph.run().await?;

    Ok(rx_output.await?)
}

fn append_json_line(mut lines: Vec<u8>, measurement: Measurement) -> Vec<u8> {
    match serde_json::to_vec(&measurement) {
        Ok(line) => {
            lines.extend(line);
            lines.push(b'\n');
        },
        Err(err) => tracing::error!(error=?err, measurement=%measurement.name, "failed to encode enriched measurement"),
    }
    lines
}

fn decode_line(line: &str) -> Option<Measurement> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str(line) {
        Ok(measurement) => Some(measurement),
        Err(err) => {
            tracing::warn!(error=?err, %line, "skipping undecodable measurement");
            None
        },
    }
}

fn spawn_writer(mut rx: mpsc::Receiver<Measurement>) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(measurement) = rx.recv().await {
            let mut line = serde_json::to_vec(&measurement)?;
            line.push(b'\n');
            stdout.write_all(&line).await?;
        }
        stdout.flush().await?;
        Ok(())
    })
}

fn log_metrics() {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => tracing::info!(metrics=%String::from_utf8_lossy(&buffer), "enrichment metrics"),
        Err(err) => tracing::warn!(error=?err, "failed to encode enrichment metrics"),
    }
}
