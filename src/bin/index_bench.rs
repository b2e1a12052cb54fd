//! Index-construction benchmark
//!
//! Builds the same index three times (original dataset order, shuffled,
//! and sorted ascending), then replays one shared sample of equality
//! queries against each. Emits six CSV rows (method x phase) of paged-file
//! counters and wall time.

use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use pagedb::index::BtreeFile;
use pagedb::{PagedFileManager, ReplacementPolicy, Stats};

#[derive(Clone, Copy)]
struct RecordKey {
    roll: i32,
    rec_id: i32,
}

struct Options {
    data: String,
    rel_base: String,
    metrics: String,
    buffers: usize,
    policy: ReplacementPolicy,
    queries: usize,
    seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            data: String::new(),
            rel_base: "student_index".to_string(),
            metrics: "index_metrics.csv".to_string(),
            buffers: 60,
            policy: ReplacementPolicy::Lru,
            queries: 500,
            seed: None,
        }
    }
}

#[derive(Serialize)]
struct MetricRow {
    method: &'static str,
    phase: &'static str,
    logical_reads: u64,
    logical_writes: u64,
    physical_reads: u64,
    physical_writes: u64,
    page_fixes: u64,
    dirty_marks: u64,
    elapsed_ms: f64,
}

fn usage(prog: &str) {
    eprintln!("Usage: {} --data <file> [options]", prog);
    eprintln!("Options:");
    eprintln!("  --rel-base <name>      Base name for generated indexes");
    eprintln!("  --metrics <file>       CSV output path");
    eprintln!("  --buffers <n>          Buffer pool size (default 60)");
    eprintln!("  --policy <lru|mru>     Replacement policy (default lru)");
    eprintln!("  --queries <n>          Number of query samples (default 500)");
    eprintln!("  --seed <val>           RNG seed");
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut opts = Options::default();
    let mut i = 0;

    let value = |args: &[String], i: &mut usize, name: &str| -> Result<String, String> {
        *i += 1;
        args.get(*i)
            .cloned()
            .ok_or_else(|| format!("{} requires a value", name))
    };

    while i < args.len() {
        match args[i].as_str() {
            "--data" => opts.data = value(args, &mut i, "--data")?,
            "--rel-base" => opts.rel_base = value(args, &mut i, "--rel-base")?,
            "--metrics" => opts.metrics = value(args, &mut i, "--metrics")?,
            "--buffers" => {
                opts.buffers = value(args, &mut i, "--buffers")?
                    .parse()
                    .map_err(|_| "invalid --buffers value".to_string())?
            }
            "--policy" => opts.policy = value(args, &mut i, "--policy")?.parse()?,
            "--queries" => {
                opts.queries = value(args, &mut i, "--queries")?
                    .parse()
                    .map_err(|_| "invalid --queries value".to_string())?
            }
            "--seed" => {
                opts.seed = Some(
                    value(args, &mut i, "--seed")?
                        .parse()
                        .map_err(|_| "invalid --seed value".to_string())?,
                )
            }
            "--help" => return Ok(None),
            other => return Err(format!("Unknown option {}", other)),
        }
        i += 1;
    }

    if opts.data.is_empty() {
        return Err("--data is required".to_string());
    }
    if opts.buffers == 0 {
        return Err("buffers must be positive".to_string());
    }
    Ok(Some(opts))
}

/// Extract (roll, record-id) pairs from the dataset
///
/// Rows are `;`-separated with the roll number in field 1. Rows that do
/// not start with a digit or whose roll does not parse are skipped, the
/// record id is the 1-based position among accepted rows.
fn load_records(path: &str) -> Result<Vec<RecordKey>, Box<dyn Error>> {
    let mut records = Vec::new();
    let reader = BufReader::new(File::open(path)?);

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || !line.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let roll = line
            .split(';')
            .nth(1)
            .and_then(|field| field.trim().parse::<i32>().ok())
            .unwrap_or(0);
        if roll == 0 {
            continue;
        }
        records.push(RecordKey {
            roll,
            rec_id: records.len() as i32 + 1,
        });
    }
    Ok(records)
}

/// Build a fresh index named `rel` by inserting `records` in order
fn build_index(
    mgr: &mut PagedFileManager,
    rel: &str,
    records: &[RecordKey],
    policy: ReplacementPolicy,
) -> Result<(Stats, f64), Box<dyn Error>> {
    // Remove leftovers from a previous run
    let _ = BtreeFile::destroy(mgr, rel);

    let mut index = BtreeFile::create(mgr, rel)?;
    mgr.set_file_policy(index.handle(), policy)?;

    mgr.reset_stats();
    let start = Instant::now();
    for record in records {
        index.insert(mgr, record.roll, record.rec_id)?;
    }
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let stats = mgr.stats();

    index.close(mgr)?;
    Ok((stats, elapsed_ms))
}

/// Replay equality queries against an existing index
fn run_queries(
    mgr: &mut PagedFileManager,
    rel: &str,
    queries: &[i32],
    policy: ReplacementPolicy,
) -> Result<(Stats, f64), Box<dyn Error>> {
    let index = BtreeFile::open(mgr, rel)?;
    mgr.set_file_policy(index.handle(), policy)?;

    mgr.reset_stats();
    let start = Instant::now();
    for &key in queries {
        if index.search(mgr, key)?.is_none() {
            eprintln!("Query key {} not found", key);
        }
    }
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let stats = mgr.stats();

    index.close(mgr)?;
    Ok((stats, elapsed_ms))
}

fn metric_row(method: &'static str, phase: &'static str, stats: Stats, elapsed_ms: f64) -> MetricRow {
    MetricRow {
        method,
        phase,
        logical_reads: stats.logical_reads,
        logical_writes: stats.logical_writes,
        physical_reads: stats.physical_reads,
        physical_writes: stats.physical_writes,
        page_fixes: stats.page_fixes,
        dirty_marks: stats.dirty_marks,
        elapsed_ms,
    }
}

fn run(opts: &Options) -> Result<(), Box<dyn Error>> {
    let records = load_records(&opts.data)?;
    if records.is_empty() {
        return Err("Dataset is empty".into());
    }

    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let original = records.clone();
    let mut shuffled = records.clone();
    shuffled.shuffle(&mut rng);
    let mut sorted = records.clone();
    sorted.sort_by_key(|record| record.roll);

    // The same query sample is replayed against all three indexes
    let queries: Vec<i32> = (0..opts.queries)
        .map(|_| records[rng.gen_range(0..records.len())].roll)
        .collect();

    let mut mgr = PagedFileManager::with_capacity(opts.buffers);
    mgr.set_default_policy(opts.policy)?;

    let mut rows = Vec::with_capacity(6);
    let runs: [(&'static str, &str, &[RecordKey]); 3] = [
        ("post", "post", &original),
        ("incremental", "inc", &shuffled),
        ("bulk", "bulk", &sorted),
    ];

    for (method, suffix, ordering) in runs {
        let rel = format!("{}_{}", opts.rel_base, suffix);

        let (stats, elapsed_ms) = build_index(&mut mgr, &rel, ordering, opts.policy)?;
        rows.push(metric_row(method, "build", stats, elapsed_ms));

        let (stats, elapsed_ms) = run_queries(&mut mgr, &rel, &queries, opts.policy)?;
        rows.push(metric_row(method, "query", stats, elapsed_ms));
    }

    let mut writer = csv::Writer::from_path(&opts.metrics)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let opts = match parse_args(&args[1..]) {
        Ok(Some(opts)) => opts,
        Ok(None) => {
            usage(&args[0]);
            return;
        }
        Err(msg) => {
            eprintln!("{}", msg);
            usage(&args[0]);
            process::exit(1);
        }
    };

    if let Err(e) = run(&opts) {
        eprintln!("index_bench: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(dir: &std::path::Path, rows: usize) -> String {
        let path = dir.join("students.txt");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "# header comment").unwrap();
        for i in 0..rows {
            writeln!(file, "{};{};name-{};dept", i, 5000 + i as i32, i).unwrap();
        }
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_load_records_filters_and_numbers_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset(dir.path(), 10);

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[0].roll, 5000);
        assert_eq!(records[0].rec_id, 1);
        assert_eq!(records[9].roll, 5009);
        assert_eq!(records[9].rec_id, 10);
    }

    #[test]
    fn test_full_comparison_emits_six_rows() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_dataset(dir.path(), 800);
        let metrics = dir.path().join("index_metrics.csv");

        let opts = Options {
            data,
            rel_base: dir.path().join("idx").to_str().unwrap().to_string(),
            metrics: metrics.to_str().unwrap().to_string(),
            buffers: 16,
            queries: 50,
            seed: Some(42),
            ..Options::default()
        };
        run(&opts).unwrap();

        let text = std::fs::read_to_string(&metrics).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "method,phase,logical_reads,logical_writes,physical_reads,physical_writes,page_fixes,dirty_marks,elapsed_ms"
        );
        assert_eq!(lines.len(), 7);
        assert!(lines[1].starts_with("post,build,"));
        assert!(lines[2].starts_with("post,query,"));
        assert!(lines[5].starts_with("bulk,build,"));
        assert!(lines[6].starts_with("bulk,query,"));
    }
}
