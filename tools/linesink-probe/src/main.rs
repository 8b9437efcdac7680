// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! linesink-probe - ingestion throughput probe
//!
//! Streams synthetic rows at a line-protocol endpoint and reports
//! rows/second and bytes/second. Useful for sizing auto-flush thresholds
//! and spotting network bottlenecks before deploying a producer.

use std::time::Instant;

use clap::Parser;
use linesink::{Sender, TimestampNanos};
use log::info;

/// Ingestion throughput probe
#[derive(Parser, Debug)]
#[command(name = "linesink-probe")]
#[command(version)]
#[command(about = "Measure line-protocol ingestion throughput")]
struct Args {
    /// Configuration string, e.g. "tcp::addr=localhost:9009;"
    #[arg(short, long)]
    conf: String,

    /// Target table name
    #[arg(short, long, default_value = "probe")]
    table: String,

    /// Total number of rows to send
    #[arg(short = 'n', long, default_value = "100000")]
    rows: u64,

    /// Rows per explicit flush (0 = rely on auto-flush)
    #[arg(short, long, default_value = "1000")]
    batch: u64,

    /// Number of extra float columns per row
    #[arg(short = 'w', long, default_value = "3")]
    width: u32,

    /// Quiet mode - only print the final summary
    #[arg(long)]
    quiet: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("probe failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> linesink::Result<()> {
    let mut sender = Sender::from_conf(&args.conf)?;
    info!("connected, sending {} rows to {:?}", args.rows, args.table);

    let start = Instant::now();
    let mut bytes_sent: u64 = 0;
    let mut last_report = Instant::now();

    for i in 0..args.rows {
        {
            let mut row = sender.row(&args.table)?;
            row.symbol("probe_id", "linesink-probe")?;
            row.field("seq", i as i64)?;
            for col in 0..args.width {
                // Cheap deterministic variation so batches do not compress
                // to identical lines server-side.
                let value = ((i as f64) * 0.7 + f64::from(col)) % 1000.0;
                row.field(&format!("v{}", col), value)?;
            }
            row.at(TimestampNanos::now()?)?;
        }

        if args.batch > 0 && (i + 1) % args.batch == 0 {
            bytes_sent += sender.pending_bytes() as u64;
            sender.flush()?;
            if !args.quiet && last_report.elapsed().as_secs() >= 1 {
                let elapsed = start.elapsed().as_secs_f64();
                println!(
                    "  {} rows in {:.1}s ({:.0} rows/s)",
                    i + 1,
                    elapsed,
                    (i + 1) as f64 / elapsed
                );
                last_report = Instant::now();
            }
        }
    }
    bytes_sent += sender.pending_bytes() as u64;
    sender.flush()?;
    let elapsed = start.elapsed().as_secs_f64();
    sender.close();

    println!(
        "sent {} rows ({:.2} MiB) in {:.2}s: {:.0} rows/s, {:.2} MiB/s",
        args.rows,
        bytes_sent as f64 / (1024.0 * 1024.0),
        elapsed,
        args.rows as f64 / elapsed,
        bytes_sent as f64 / (1024.0 * 1024.0) / elapsed
    );
    Ok(())
}
