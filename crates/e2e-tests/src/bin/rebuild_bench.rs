use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use catalog_indexing::{EngineConfig, RebuildMode, RebuildOptions};
use catalog_storage::ScanDirection;
use e2e_tests::{touched, TestHarness};

const DEFAULT_RECORDS: usize = 10_000;
const DEFAULT_CHANGED: usize = 50;
const DEFAULT_ITERATIONS: usize = 3;

#[derive(Parser, Debug)]
#[command(name = "rebuild_bench", about = "Collection index rebuild benchmark")]
struct Args {
    #[arg(long, default_value_t = DEFAULT_RECORDS)]
    records: usize,
    #[arg(long, default_value_t = DEFAULT_CHANGED)]
    changed: usize,
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,
    #[arg(long, default_value_t = 100)]
    batch_size: usize,
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StepMetrics {
    p50_ms: f64,
    p90_ms: f64,
    max_ms: f64,
    samples: usize,
    records_per_sec: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct BenchmarkOutput {
    records: usize,
    changed: usize,
    iterations: usize,
    batch_size: usize,
    concurrency: usize,
    generated_at: String,
    steps: BTreeMap<String, StepMetrics>,
}

#[derive(Default)]
struct SampleCollector {
    durations: HashMap<String, Vec<f64>>,
    scanned: HashMap<String, u64>,
}

impl SampleCollector {
    fn record(&mut self, step: &str, started: Instant, scanned: u64) {
        let ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.durations.entry(step.to_string()).or_default().push(ms);
        *self.scanned.entry(step.to_string()).or_default() += scanned;
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    if args.changed > args.records {
        return Err(format!(
            "--changed ({}) cannot exceed --records ({})",
            args.changed, args.records
        ));
    }

    let config = EngineConfig::default()
        .with_batch_size(args.batch_size)
        .with_concurrency(args.concurrency);
    config.validate().map_err(|e| e.to_string())?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut collector = SampleCollector::default();

    for iteration in 0..args.iterations {
        run_iteration(&args, config, &mut rng, &mut collector).await?;
        eprintln!("iteration {} complete", iteration + 1);
    }

    let output = BenchmarkOutput {
        records: args.records,
        changed: args.changed,
        iterations: args.iterations,
        batch_size: args.batch_size,
        concurrency: args.concurrency,
        generated_at: Utc::now().to_rfc3339(),
        steps: summarize(&collector),
    };

    let json = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    let table = render_table(&output);
    if let Some(out_dir) = &args.out_dir {
        write_outputs(out_dir, &json, &table)?;
    }

    println!("{}", table);
    println!("\n{}", json);
    Ok(())
}

async fn run_iteration(
    args: &Args,
    config: EngineConfig,
    rng: &mut StdRng,
    collector: &mut SampleCollector,
) -> Result<(), String> {
    let harness = TestHarness::with_config(config);
    let records = harness.seed(args.records);

    let started = Instant::now();
    let initial = run_step(&harness, RebuildMode::ChangedOnly).await?;
    collector.record("initial", started, initial);

    let started = Instant::now();
    let noop = run_step(&harness, RebuildMode::ChangedOnly).await?;
    collector.record("unchanged", started, noop);

    let mut picked: Vec<_> = records.iter().collect();
    picked.shuffle(rng);
    for (i, record) in picked.into_iter().take(args.changed).enumerate() {
        harness.primary.upsert(touched(record, 1 + i as i64));
    }
    let started = Instant::now();
    let incremental = run_step(&harness, RebuildMode::ChangedOnly).await?;
    collector.record("incremental", started, incremental);

    let started = Instant::now();
    let verify = run_step(&harness, RebuildMode::Verify).await?;
    collector.record("verify", started, verify);

    let started = Instant::now();
    let force = run_step(&harness, RebuildMode::ForceRebuildAll).await?;
    collector.record("force", started, force);

    let started = Instant::now();
    let mut cursor: Option<String> = None;
    let mut walked = 0u64;
    loop {
        let page = harness
            .reader
            .page(cursor.as_deref(), 100, ScanDirection::Forward)
            .map_err(|e| e.to_string())?;
        walked += page.ids.len() as u64;
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    collector.record("page_walk", started, walked);

    Ok(())
}

async fn run_step(harness: &TestHarness, mode: RebuildMode) -> Result<u64, String> {
    let summary = harness
        .run(mode, RebuildOptions::default())
        .await
        .map_err(|e| format!("{} run failed: {}", mode, e))?;
    if !summary.errors.is_empty() {
        return Err(format!(
            "{} run reported {} record errors",
            mode,
            summary.errors.len()
        ));
    }
    Ok(summary.scanned)
}

fn summarize(collector: &SampleCollector) -> BTreeMap<String, StepMetrics> {
    let mut steps = BTreeMap::new();
    for (step, samples) in &collector.durations {
        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let total_ms: f64 = sorted.iter().sum();
        let scanned = collector.scanned.get(step).copied().unwrap_or(0);
        let records_per_sec = if total_ms > 0.0 {
            scanned as f64 / (total_ms / 1_000.0)
        } else {
            0.0
        };
        steps.insert(
            step.clone(),
            StepMetrics {
                p50_ms: percentile(&sorted, 50.0),
                p90_ms: percentile(&sorted, 90.0),
                max_ms: sorted.last().copied().unwrap_or(0.0),
                samples: sorted.len(),
                records_per_sec,
            },
        );
    }
    steps
}

fn percentile(values: &[f64], percentile: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let rank = (percentile / 100.0) * (values.len() as f64 - 1.0);
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        values[low]
    } else {
        let weight = rank - low as f64;
        values[low] + (values[high] - values[low]) * weight
    }
}

fn render_table(output: &BenchmarkOutput) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Rebuild Benchmark (records={}, changed={}, iterations={}, batch={}, concurrency={})",
        output.records, output.changed, output.iterations, output.batch_size, output.concurrency
    ));
    lines.push("step\tp50_ms\tp90_ms\tmax_ms\trecords_per_sec".to_string());
    for (step, metrics) in &output.steps {
        lines.push(format!(
            "{}\t{:.2}\t{:.2}\t{:.2}\t{:.0}",
            step, metrics.p50_ms, metrics.p90_ms, metrics.max_ms, metrics.records_per_sec
        ));
    }
    lines.join("\n")
}

fn write_outputs(out_dir: &Path, json: &str, table: &str) -> Result<(), String> {
    fs::create_dir_all(out_dir).map_err(|e| format!("Failed to create out dir: {e}"))?;
    fs::write(out_dir.join("latest.json"), json).map_err(|e| e.to_string())?;
    fs::write(out_dir.join("latest.txt"), table).map_err(|e| e.to_string())?;
    Ok(())
}
