//! Variable-length record loader with space-utilization accounting
//!
//! Packs a text dataset into slotted pages, optionally deletes every k-th
//! record in scan order, then compares the achieved utilization against
//! hypothetical fixed-length layouts in a metrics CSV.

use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process;

use serde::Serialize;

use pagedb::file::{FileHandle, PageId};
use pagedb::record::{SlottedError, slotted};
use pagedb::{PAGE_SIZE, PagedFileManager, ReplacementPolicy};

/// Records near the page size would never fit; reject them early
const MAX_RECORD_LEN: usize = 32760;

struct Options {
    data: String,
    out: String,
    buffers: usize,
    policy: ReplacementPolicy,
    delete_step: u64,
    metrics: String,
    static_lens: Vec<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            data: String::new(),
            out: "student.slotted".to_string(),
            buffers: 50,
            policy: ReplacementPolicy::Lru,
            delete_step: 7,
            metrics: "space_metrics.csv".to_string(),
            static_lens: vec![128, 256, 512, 768],
        }
    }
}

#[derive(Serialize)]
struct SpaceRow {
    layout: &'static str,
    max_record_length: String,
    records: u64,
    pages: u64,
    space_bytes: u64,
    payload_bytes: u64,
    utilization: f64,
}

/// Insert state: records append to the most recently filled page
struct Store {
    handle: FileHandle,
    last_page: Option<PageId>,
    page_count: u64,
}

fn usage(prog: &str) {
    eprintln!("Usage: {} --data <file> [options]", prog);
    eprintln!("Options:");
    eprintln!("  --out <file>            Output file (default student.slotted)");
    eprintln!("  --buffers <n>           Buffer pool size (default 50)");
    eprintln!("  --policy <lru|mru>      Replacement policy (default lru)");
    eprintln!("  --delete-step <n>       Delete every n-th record (default 7, 0 to skip)");
    eprintln!("  --metrics <path>        CSV output for utilization table");
    eprintln!("  --static-lens <list>    Comma separated max lengths for static layout");
    eprintln!("  --no-delete             Skip deletion phase");
}

fn parse_static_lens(arg: &str) -> Result<Vec<usize>, String> {
    arg.split(',')
        .map(|token| match token.trim().parse::<usize>() {
            Ok(len) if len > 0 => Ok(len),
            _ => Err(format!("invalid static length: {}", token)),
        })
        .collect()
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
            "--out" => opts.out = value(args, &mut i, "--out")?,
            "--buffers" => {
                opts.buffers = value(args, &mut i, "--buffers")?
                    .parse()
                    .map_err(|_| "invalid --buffers value".to_string())?
            }
            "--policy" => opts.policy = value(args, &mut i, "--policy")?.parse()?,
            "--delete-step" => {
                opts.delete_step = value(args, &mut i, "--delete-step")?
                    .parse()
                    .map_err(|_| "invalid --delete-step value".to_string())?
            }
            "--metrics" => opts.metrics = value(args, &mut i, "--metrics")?,
            "--static-lens" => {
                opts.static_lens = parse_static_lens(&value(args, &mut i, "--static-lens")?)?
            }
            "--no-delete" => opts.delete_step = 0,
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

/// Pack one record, moving to a fresh page when the current one is full
fn insert_record(
    mgr: &mut PagedFileManager,
    store: &mut Store,
    data: &[u8],
) -> Result<(), Box<dyn Error>> {
    if let Some(page_id) = store.last_page {
        let buf = mgr.get_this_page(store.handle, page_id)?;
        match slotted::insert(buf, data) {
            Ok(_) => {
                mgr.unfix_page(store.handle, page_id, true)?;
                return Ok(());
            }
            Err(SlottedError::NoSpace) => {
                mgr.unfix_page(store.handle, page_id, false)?;
            }
            Err(e) => {
                mgr.unfix_page(store.handle, page_id, false)?;
                return Err(e.into());
            }
        }
    }

    // Page full (or first record): start a fresh page. A bounded record
    // must fit an empty page, so a second failure is fatal.
    let (page_id, buf) = mgr.alloc_page(store.handle)?;
    slotted::init(buf);
    match slotted::insert(buf, data) {
        Ok(_) => {
            mgr.unfix_page(store.handle, page_id, true)?;
            store.last_page = Some(page_id);
            store.page_count += 1;
            Ok(())
        }
        Err(e) => {
            mgr.unfix_page(store.handle, page_id, false)?;
            Err(e.into())
        }
    }
}

/// Delete every `step`-th live record in scan order across all pages
fn delete_every(
    mgr: &mut PagedFileManager,
    handle: FileHandle,
    step: u64,
) -> Result<u64, Box<dyn Error>> {
    let mut deleted = 0u64;
    let mut counter = 0u64;

    let mut scan = mgr.scan(handle);
    while let Some((_, buf)) = scan.next()? {
        let mut cursor = slotted::INVALID_SLOT;
        let mut dirty = false;
        loop {
            match slotted::next_record(buf, &mut cursor) {
                Ok(_) => {
                    counter += 1;
                    if counter % step == 0 {
                        slotted::delete(buf, cursor)?;
                        dirty = true;
                        deleted += 1;
                    }
                }
                Err(SlottedError::Empty) => break,
                Err(e) => return Err(e.into()),
            }
        }
        scan.unfix_current(dirty)?;
    }
    Ok(deleted)
}

/// Count live records across all pages
fn scan_count(mgr: &mut PagedFileManager, handle: FileHandle) -> Result<u64, Box<dyn Error>> {
    let mut count = 0u64;

    let mut scan = mgr.scan(handle);
    while let Some((_, buf)) = scan.next()? {
        let mut cursor = slotted::INVALID_SLOT;
        while slotted::next_record(buf, &mut cursor).is_ok() {
            count += 1;
        }
    }
    Ok(count)
}

/// Total pages and live payload bytes
fn compute_usage(
    mgr: &mut PagedFileManager,
    handle: FileHandle,
) -> Result<(u64, u64), Box<dyn Error>> {
    let mut pages = 0u64;
    let mut payload = 0u64;

    let mut scan = mgr.scan(handle);
    while let Some((_, buf)) = scan.next()? {
        pages += 1;
        payload += slotted::used_bytes(buf) as u64;
    }
    Ok((pages, payload))
}

fn write_metrics(
    opts: &Options,
    active_records: u64,
    payload_bytes: u64,
    slotted_pages: u64,
) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_path(&opts.metrics)?;

    if slotted_pages > 0 {
        let space_bytes = slotted_pages * PAGE_SIZE as u64;
        writer.serialize(SpaceRow {
            layout: "slotted",
            max_record_length: "variable".to_string(),
            records: active_records,
            pages: slotted_pages,
            space_bytes,
            payload_bytes,
            utilization: payload_bytes as f64 / space_bytes as f64,
        })?;
    }

    for &max_len in &opts.static_lens {
        if max_len == 0 || max_len > PAGE_SIZE {
            continue;
        }
        let slots_per_page = (PAGE_SIZE / max_len) as u64;
        if slots_per_page == 0 {
            continue;
        }
        let pages_needed = active_records.div_ceil(slots_per_page);
        let space_bytes = pages_needed * PAGE_SIZE as u64;
        let utilization = if space_bytes > 0 {
            payload_bytes as f64 / space_bytes as f64
        } else {
            0.0
        };
        writer.serialize(SpaceRow {
            layout: "static",
            max_record_length: max_len.to_string(),
            records: active_records,
            pages: pages_needed,
            space_bytes,
            payload_bytes,
            utilization,
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn run(opts: &Options) -> Result<(), Box<dyn Error>> {
    let mut mgr = PagedFileManager::with_capacity(opts.buffers);
    mgr.set_default_policy(opts.policy)?;

    let _ = mgr.destroy_file(&opts.out);
    mgr.create_file(&opts.out)?;
    let handle = mgr.open_file_with_policy(&opts.out, opts.policy)?;

    let mut store = Store {
        handle,
        last_page: None,
        page_count: 0,
    };

    let mut total_records = 0u64;
    let mut total_bytes = 0u64;
    let reader = BufReader::new(File::open(&opts.data)?);
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || !line.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        if line.len() >= MAX_RECORD_LEN {
            return Err(format!("Record too long ({} bytes)", line.len()).into());
        }
        insert_record(&mut mgr, &mut store, line.as_bytes())?;
        total_records += 1;
        total_bytes += line.len() as u64;
    }

    if opts.delete_step > 0 {
        let deleted = delete_every(&mut mgr, handle, opts.delete_step)?;
        println!("Deleted {} records using step {}", deleted, opts.delete_step);
    }

    let active_records = scan_count(&mut mgr, handle)?;
    let (slotted_pages, payload_bytes) = compute_usage(&mut mgr, handle)?;

    write_metrics(opts, active_records, payload_bytes, slotted_pages)?;

    println!(
        "Loaded {} records ({} bytes) into {} pages",
        total_records, total_bytes, store.page_count
    );
    println!("Active records after deletion: {}", active_records);
    println!(
        "Slotted payload bytes: {}, pages: {}",
        payload_bytes, slotted_pages
    );

    mgr.close_file(handle)?;
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
        eprintln!("record_store: {}", e);
        process::exit(1);
    }
}
