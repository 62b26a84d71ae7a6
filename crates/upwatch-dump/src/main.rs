use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use clap::Parser;
use serde::Serialize;

use upwatch_core::aggregate::{DaySummary, aggregate, summarize};
use upwatch_core::storage::{LogRecord, LogStore, ProbeResult};
use upwatch_core::timezone::ZoneResolver;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "upwatch-dump", about = "Inspect or seed an upwatch log directory")]
struct Cli {
    /// Log directory
    path: Option<PathBuf>,

    /// Zone used for partition names and day grouping
    #[arg(long, default_value = "UTC")]
    timezone: String,

    /// Number of most recent partitions summarized
    #[arg(long, default_value_t = 7)]
    days: usize,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Write one synthetic day of probes for this local date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    seed: Option<NaiveDate>,

    /// Spacing of seeded probes in seconds
    #[arg(long, default_value_t = 30)]
    interval_secs: u32,
}

fn main() {
    let cli = Cli::parse();
    let path = cli.path.clone().unwrap_or_else(|| PathBuf::from("."));

    let zone = ZoneResolver::resolve_or_utc(&cli.timezone);
    if let Some(e) = zone.fallback() {
        eprintln!("Warning: {e}; using UTC");
    }

    if let Some(date) = cli.seed {
        seed_directory(&path, zone, date, cli.interval_secs);
    } else if path.is_dir() {
        dump_directory(&path, zone, &cli);
    } else {
        eprintln!("Not a directory: {}", path.display());
        std::process::exit(1);
    }
}

// ── Formatting helpers ───────────────────────────────────────────────────────

fn human_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn fmt_ts(ts: DateTime<Utc>, zone: &ZoneResolver) -> String {
    ts.with_timezone(&zone.tz())
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

// ── JSON output types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DirectoryJson {
    path: String,
    timezone: String,
    total_size: u64,
    partitions: Vec<PartitionJson>,
    days: Vec<DaySummary>,
}

#[derive(Serialize)]
struct PartitionJson {
    name: String,
    size: u64,
    records: usize,
    first: Option<String>,
    last: Option<String>,
    /// Parse or read error, when the partition is unreadable.
    corrupt: Option<String>,
}

// ── dump_directory ───────────────────────────────────────────────────────────

fn build_report(store: &LogStore, days: usize) -> DirectoryJson {
    let zone = store.zone();
    let names = store.list_partitions().unwrap_or_else(|e| {
        eprintln!("Error reading directory {}: {e}", store.base_path().display());
        std::process::exit(1);
    });

    let mut partitions = Vec::with_capacity(names.len());
    let mut loaded = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let size = fs::metadata(store.partition_path(name))
            .map(|m| m.len())
            .unwrap_or(0);
        match store.load_partition(name) {
            Ok(partition) => {
                let first = partition.records.iter().map(|r| r.recorded_at).min();
                let last = partition.records.iter().map(|r| r.recorded_at).max();
                partitions.push(PartitionJson {
                    name: name.clone(),
                    size,
                    records: partition.records.len(),
                    first: first.map(|t| fmt_ts(t, zone)),
                    last: last.map(|t| fmt_ts(t, zone)),
                    corrupt: None,
                });
                if i < days {
                    loaded.push(partition);
                }
            }
            Err(e) => partitions.push(PartitionJson {
                name: name.clone(),
                size,
                records: 0,
                first: None,
                last: None,
                corrupt: Some(e.reason),
            }),
        }
    }

    let view = aggregate(&loaded, zone);
    DirectoryJson {
        path: store.base_path().display().to_string(),
        timezone: zone.name().to_string(),
        total_size: partitions.iter().map(|p| p.size).sum(),
        partitions,
        days: summarize(&view, zone),
    }
}

fn dump_directory(path: &Path, zone: ZoneResolver, cli: &Cli) {
    let store = LogStore::open_read_only(path, zone).unwrap_or_else(|e| {
        eprintln!("Error opening {}: {e}", path.display());
        std::process::exit(1);
    });
    let report = build_report(&store, cli.days);

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Directory: {}", report.path);
    println!("Timezone:  {}", report.timezone);
    println!(
        "Partitions: {} ({})",
        report.partitions.len(),
        human_bytes(report.total_size)
    );
    println!();

    for p in &report.partitions {
        match &p.corrupt {
            Some(reason) => println!(
                "  {}.json  {:>10}  CORRUPT: {}",
                p.name,
                human_bytes(p.size),
                reason
            ),
            None => println!(
                "  {}.json  {:>10}  {:>6} records  {} .. {}",
                p.name,
                human_bytes(p.size),
                p.records,
                p.first.as_deref().unwrap_or("-"),
                p.last.as_deref().unwrap_or("-")
            ),
        }
    }

    if report.days.is_empty() {
        return;
    }
    println!();
    println!("Days ({}):", report.timezone);
    for day in &report.days {
        println!(
            "  {}  {:>6} scans  {:>7.2}% up  avg {:>7.1} ms  {:?}",
            day.date, day.total, day.uptime_percent, day.avg_response_ms, day.level
        );
    }
}

// ── seed ─────────────────────────────────────────────────────────────────────

/// First instant of `date` in `zone`. Midnight can fall into a DST gap, in
/// which case the first valid hour is used.
fn local_midnight(date: NaiveDate, zone: &ZoneResolver) -> Option<DateTime<Utc>> {
    (0..24).find_map(|hour| {
        let naive = date.and_hms_opt(hour, 0, 0)?;
        zone.tz()
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    })
}

/// Successful probes every `interval_secs` from local midnight of `date` to
/// the next local midnight. Latencies cycle through 4..=70 ms.
fn seed_records(
    date: NaiveDate,
    zone: &ZoneResolver,
    interval_secs: u32,
) -> Result<Vec<LogRecord>, String> {
    if interval_secs == 0 {
        return Err("interval must be non-zero".to_string());
    }
    let start = local_midnight(date, zone).ok_or_else(|| format!("no local midnight for {date}"))?;
    let end = date
        .checked_add_days(Days::new(1))
        .and_then(|next| local_midnight(next, zone))
        .ok_or_else(|| format!("no local midnight after {date}"))?;

    let step = chrono::Duration::seconds(interval_secs as i64);
    let mut records = Vec::new();
    let mut t = start;
    let mut i: u64 = 0;
    while t < end {
        let latency_ms = 4 + (i * 37 + 11) % 67;
        records.push(LogRecord::new(
            t,
            zone.name(),
            ProbeResult {
                instant: t,
                success: true,
                latency_ms,
                status_code: Some(200),
            },
        ));
        t += step;
        i += 1;
    }
    Ok(records)
}

fn seed_directory(path: &Path, zone: ZoneResolver, date: NaiveDate, interval_secs: u32) {
    let records = seed_records(date, &zone, interval_secs).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let Some(first) = records.first().map(|r| r.recorded_at) else {
        eprintln!("Nothing to seed for {date}");
        std::process::exit(1);
    };

    let store = LogStore::open(path, zone).unwrap_or_else(|e| {
        eprintln!("Error opening {}: {e}", path.display());
        std::process::exit(1);
    });
    let count = records.len();
    match store.append_batch(records, first) {
        Ok(partition) => println!(
            "Seeded {count} records into {}",
            store.partition_path(&partition).display()
        ),
        Err(e) => {
            eprintln!("Error writing partition: {e}");
            std::process::exit(1);
        }
    }
}
