// SPDX-License-Identifier: Apache-2.0

//! The `minos` command line: a teaching operating-system simulator.
//!
//! Three façades over the workspace crates: a bounded-queue transform
//! pipeline, a sector-addressed file system driven against a disk image,
//! and an MLFQ scheduler simulation.

mod error;

use crate::error::Error;
use clap::{Parser, Subcommand};
use minos_fs::{FileSystem, ImageDisk};
use minos_pipeline::{DefaultTransform, PipelineConfig};
use minos_sched::sim::{Burst, Simulation, WorkloadSpec};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minos", version, about = "Teaching OS simulator: scheduler, file system, pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the transform pipeline: n items from input to output.
    Pipeline {
        /// Number of items to process.
        n: u64,
        /// Input file, one `key value [opcode]` item per line.
        input: PathBuf,
        /// Output file, one `key value` line per item.
        output: PathBuf,
        /// YAML file overriding the default pipeline configuration.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Operate on a file-system disk image.
    Fs {
        /// Path of the disk image.
        #[arg(long)]
        image: PathBuf,
        #[command(subcommand)]
        op: FsOp,
    },
    /// Run a scheduler workload simulation.
    Sched {
        /// Number of generated workload threads.
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Tick budget for the run.
        #[arg(long, default_value_t = 100_000)]
        max_ticks: u64,
        /// Print the full event trace, not just the summary.
        #[arg(long)]
        trace: bool,
    },
}

#[derive(Subcommand)]
enum FsOp {
    /// Create and format a fresh disk image.
    Format,
    /// Create a file of the given size in bytes.
    Create {
        /// Absolute path inside the image.
        path: String,
        /// File size in bytes, fixed at creation.
        size: u32,
    },
    /// Create an empty directory.
    Mkdir {
        /// Absolute path inside the image.
        path: String,
    },
    /// List a directory.
    Ls {
        /// Directory to list.
        #[arg(default_value = "/")]
        path: String,
        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Remove a file or empty directory.
    Rm {
        /// Absolute path inside the image.
        path: String,
    },
    /// Copy a host file into the image.
    Put {
        /// Host file to copy from.
        host: PathBuf,
        /// Destination path inside the image.
        path: String,
    },
    /// Print a file's contents.
    Cat {
        /// Absolute path inside the image.
        path: String,
    },
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    dispatch(cli).map_err(miette::Report::new)
}

fn dispatch(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Command::Pipeline {
            n,
            input,
            output,
            config,
        } => run_pipeline(n, input, output, config),
        Command::Fs { image, op } => run_fs(image, op),
        Command::Sched {
            threads,
            max_ticks,
            trace,
        } => run_sched(threads, max_ticks, trace),
    }
}

fn run_pipeline(
    n: u64,
    input: PathBuf,
    output: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<(), Error> {
    let config = match config_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            serde_yaml::from_str::<PipelineConfig>(&text).map_err(|e| Error::Config {
                path,
                details: e.to_string(),
            })?
        }
        None => PipelineConfig::default(),
    };
    info!(n, "starting pipeline run");
    let report = minos_pipeline::run(n, input, output, &config, Arc::new(DefaultTransform))?;
    println!(
        "processed {} items ({} consumers spawned, {} cancelled)",
        report.items_written, report.consumers_spawned, report.consumers_cancelled
    );
    Ok(())
}

fn run_fs(image: PathBuf, op: FsOp) -> Result<(), Error> {
    if let FsOp::Format = op {
        let disk = ImageDisk::create(&image)?;
        let _ = FileSystem::format(disk)?;
        println!("formatted {}", image.display());
        return Ok(());
    }

    let disk = ImageDisk::open(&image)?;
    let mut fs = FileSystem::mount(disk)?;
    match op {
        FsOp::Format => unreachable!("handled above"),
        FsOp::Create { path, size } => {
            fs.create(&path, size)?;
            println!("created {path} ({size} bytes)");
        }
        FsOp::Mkdir { path } => {
            fs.create_dir(&path)?;
            println!("created directory {path}");
        }
        FsOp::Ls { path, recursive } => {
            for entry in fs.list(&path, recursive)? {
                let indent = "  ".repeat(entry.depth);
                let suffix = if entry.is_file { "" } else { "/" };
                println!("{indent}{}{suffix}", entry.name);
            }
        }
        FsOp::Rm { path } => {
            fs.remove(&path)?;
            println!("removed {path}");
        }
        FsOp::Put { host, path } => {
            let data = std::fs::read(&host)?;
            fs.create(&path, data.len() as u32)?;
            let id = fs.open_id(&path)?;
            let written = fs.write_id(id, &data)?;
            fs.close_id(id)?;
            println!("copied {} bytes into {path}", written);
        }
        FsOp::Cat { path } => {
            let file = fs.open(&path)?;
            let id = fs.open_id(&path)?;
            let mut data = vec![0u8; file.length() as usize];
            let read = fs.read_id(id, &mut data)?;
            fs.close_id(id)?;
            std::io::stdout().write_all(&data[..read])?;
        }
    }
    Ok(())
}

/// Generates a deterministic mixed workload: every level is populated and
/// the staggered arrivals exercise preemption and aging.
fn demo_workloads(threads: usize) -> Vec<WorkloadSpec> {
    let priorities = [120, 70, 40, 100, 55, 10];
    (0..threads)
        .map(|i| {
            let priority = priorities[i % priorities.len()];
            WorkloadSpec {
                name: format!("job-{i}"),
                priority,
                weight: 0.5,
                arrival: 1 + (i as u64) * 50,
                bursts: vec![
                    Burst {
                        run: 60 + (i as u64 % 3) * 20,
                        block: 40,
                    },
                    Burst {
                        run: 80,
                        block: 30,
                    },
                    Burst { run: 50, block: 0 },
                ],
            }
        })
        .collect()
}

fn run_sched(threads: usize, max_ticks: u64, trace: bool) -> Result<(), Error> {
    let sim = Simulation::new(demo_workloads(threads))?;
    let report = sim.run(max_ticks);

    if trace {
        for entry in &report.trace {
            println!(
                "[{:>7}] thread {} {}",
                entry.tick,
                entry.thread,
                entry.event.label()
            );
        }
    }
    for (tid, name, tick) in &report.finished {
        println!("thread {tid} ({name}) finished at tick {tick}");
    }
    if !report.complete {
        println!("stopped at tick {} with unfinished threads", report.ticks);
    }
    Ok(())
}
