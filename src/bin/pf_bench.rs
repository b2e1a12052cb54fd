//! Mixed read/write benchmark against the paged-file layer
//!
//! Creates a file, initializes a set of pages, then replays a random
//! workload of reads and writes with a configurable mix. Emits one CSV row
//! of counters and wall time to stdout.

use std::error::Error;
use std::io;
use std::process;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use pagedb::{PagedFileManager, ReplacementPolicy};

struct Options {
    file: String,
    pages: usize,
    ops: usize,
    buffers: usize,
    policy: ReplacementPolicy,
    read_weight: u32,
    write_weight: u32,
    seed: Option<u64>,
    print_header: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            file: "pf_bench.pf".to_string(),
            pages: 200,
            ops: 5000,
            buffers: 40,
            policy: ReplacementPolicy::Lru,
            read_weight: 8,
            write_weight: 2,
            seed: None,
            print_header: false,
        }
    }
}

#[derive(Serialize)]
struct BenchRow {
    policy: &'static str,
    read_weight: u32,
    write_weight: u32,
    buffers: usize,
    pages: usize,
    ops: usize,
    logical_reads: u64,
    logical_writes: u64,
    physical_reads: u64,
    physical_writes: u64,
    input_count: u64,
    output_count: u64,
    page_fixes: u64,
    dirty_marks: u64,
    elapsed_ms: f64,
}

fn usage(prog: &str) {
    eprintln!("Usage: {} [options]", prog);
    eprintln!("Options:");
    eprintln!("  --file <name>       File to create (default pf_bench.pf)");
    eprintln!("  --pages <n>         Number of pages to initialize (default 200)");
    eprintln!("  --ops <n>           Operations to perform (default 5000)");
    eprintln!("  --buffers <n>       Buffer pool size (default 40)");
    eprintln!("  --policy <lru|mru>  Replacement policy (default lru)");
    eprintln!("  --mix R:W           Read/write weights (default 8:2)");
    eprintln!("  --seed <val>        RNG seed");
    eprintln!("  --header            Print CSV header");
}

/// Parse an `R:W` (or `R/W`) weight pair
fn parse_mix(arg: &str) -> Result<(u32, u32), String> {
    let (read, write) = arg
        .split_once(':')
        .or_else(|| arg.split_once('/'))
        .ok_or_else(|| format!("invalid mix specification: {}", arg))?;

    let read: u32 = read
        .parse()
        .map_err(|_| format!("invalid read weight: {}", read))?;
    let write: u32 = write
        .parse()
        .map_err(|_| format!("invalid write weight: {}", write))?;
    if read + write == 0 {
        return Err("mix weights must not both be zero".to_string());
    }
    Ok((read, write))
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
            "--file" => opts.file = value(args, &mut i, "--file")?,
            "--pages" => {
                opts.pages = value(args, &mut i, "--pages")?
                    .parse()
                    .map_err(|_| "invalid --pages value".to_string())?
            }
            "--ops" => {
                opts.ops = value(args, &mut i, "--ops")?
                    .parse()
                    .map_err(|_| "invalid --ops value".to_string())?
            }
            "--buffers" => {
                opts.buffers = value(args, &mut i, "--buffers")?
                    .parse()
                    .map_err(|_| "invalid --buffers value".to_string())?
            }
            "--policy" => opts.policy = value(args, &mut i, "--policy")?.parse()?,
            "--mix" => {
                let (read, write) = parse_mix(&value(args, &mut i, "--mix")?)?;
                opts.read_weight = read;
                opts.write_weight = write;
            }
            "--seed" => {
                opts.seed = Some(
                    value(args, &mut i, "--seed")?
                        .parse()
                        .map_err(|_| "invalid --seed value".to_string())?,
                )
            }
            "--header" => opts.print_header = true,
            "--help" => return Ok(None),
            other => return Err(format!("Unknown option {}", other)),
        }
        i += 1;
    }

    if opts.pages == 0 || opts.ops == 0 {
        return Err("pages and ops must be positive".to_string());
    }
    if opts.buffers == 0 {
        return Err("buffers must be positive".to_string());
    }
    Ok(Some(opts))
}

fn run(opts: &Options) -> Result<(), Box<dyn Error>> {
    let mut mgr = PagedFileManager::with_capacity(opts.buffers);
    mgr.set_default_policy(opts.policy)?;

    // A stale file from a previous run is fair game
    let _ = mgr.destroy_file(&opts.file);
    mgr.create_file(&opts.file)?;
    let handle = mgr.open_file_with_policy(&opts.file, opts.policy)?;

    let mut pages = Vec::with_capacity(opts.pages);
    for i in 0..opts.pages {
        let (page_id, buf) = mgr.alloc_page(handle)?;
        buf[0..4].copy_from_slice(&(i as i32).to_le_bytes());
        mgr.unfix_page(handle, page_id, true)?;
        pages.push(page_id);
    }

    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    mgr.reset_stats();
    let start = Instant::now();
    for op in 0..opts.ops {
        let pick = rng.gen_range(0..opts.read_weight + opts.write_weight);
        let is_write = pick >= opts.read_weight;
        let page_id = pages[rng.gen_range(0..pages.len())];

        let buf = mgr.get_this_page(handle, page_id)?;
        if is_write {
            buf[0..4].copy_from_slice(&(op as i32).to_le_bytes());
            mgr.unfix_page(handle, page_id, true)?;
        } else {
            let value = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
            std::hint::black_box(value);
            mgr.unfix_page(handle, page_id, false)?;
        }
    }
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let stats = mgr.stats();
    mgr.close_file(handle)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(opts.print_header)
        .from_writer(io::stdout());
    writer.serialize(BenchRow {
        policy: opts.policy.name(),
        read_weight: opts.read_weight,
        write_weight: opts.write_weight,
        buffers: opts.buffers,
        pages: opts.pages,
        ops: opts.ops,
        logical_reads: stats.logical_reads,
        logical_writes: stats.logical_writes,
        physical_reads: stats.physical_reads,
        physical_writes: stats.physical_writes,
        input_count: stats.input_count,
        output_count: stats.output_count,
        page_fixes: stats.page_fixes,
        dirty_marks: stats.dirty_marks,
        elapsed_ms,
    })?;
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
        eprintln!("pf_bench: {}", e);
        process::exit(1);
    }
}
