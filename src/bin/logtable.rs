//! logtable operator CLI
//!
//! Inspects and checks a partition directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use logtable::chunk::ChunkReader;
use logtable::{ArtifactIndex, TableReader};
use tracing_subscriber::{fmt, EnvFilter};

/// logtable
#[derive(Parser, Debug)]
#[command(name = "logtable")]
#[command(about = "Inspect and check logtable partitions")]
#[command(version)]
struct Args {
    /// Partition data directory
    #[arg(short, long, default_value = "./logtable_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check every PRESENT artifact against the files on disk
    Fsck {
        /// Artifact index name (<data_dir>/<index>.afx)
        index: String,

        /// Also verify file checksums
        #[arg(long)]
        checksums: bool,

        /// Mark artifacts with missing files as MISSING
        #[arg(long)]
        repair: bool,
    },

    /// List the artifacts of an index
    Artifacts {
        /// Artifact index name
        index: String,
    },

    /// Print the head generation of a partition
    Head {
        /// Table name
        table: String,

        /// Replica id
        replica: String,
    },

    /// Print the header and records of a chunk file
    DumpChunk {
        /// Path to the chunk file
        path: PathBuf,

        /// Print at most this many records
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,logtable=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> logtable::Result<()> {
    match &args.command {
        Commands::Fsck {
            index,
            checksums,
            repair,
        } => {
            let afx = ArtifactIndex::new(&args.data_dir, index, !*repair);
            let report = afx.run_consistency_check(*checksums, *repair)?;
            println!(
                "fsck ok: {} files checked, {} artifacts repaired",
                report.files_checked,
                report.repaired.len()
            );
        }

        Commands::Artifacts { index } => {
            let afx = ArtifactIndex::new(&args.data_dir, index, true);
            for a in afx.list_artifacts()? {
                println!("{}\t{}\t{} bytes", a.name, a.status, a.total_size());
                for (key, value) in &a.attributes {
                    println!("    {}={}", key, value);
                }
                for f in &a.files {
                    println!("    file {} size={} checksum={:016x}", f.filename, f.size, f.checksum);
                }
            }
        }

        Commands::Head { table, replica } => {
            let reader = TableReader::open(&args.data_dir, table, replica)?;
            let snapshot = reader.get_snapshot()?;
            println!(
                "generation {} (last log {}, {} records)",
                snapshot.generation,
                snapshot.last_log_seq,
                snapshot.num_records()
            );
            for c in &snapshot.chunks {
                println!(
                    "  {}/{}\t[{}, {})\t{} bytes",
                    c.replica_id,
                    c.chunk_id,
                    c.start_sequence,
                    c.end_sequence(),
                    c.size
                );
            }
        }

        Commands::DumpChunk { path, limit } => {
            let mut reader = ChunkReader::open(path)?;
            let header = reader.header().clone();
            println!(
                "version={} flags={:#x} body_size={} verified={} finalized={}",
                header.version,
                header.flags,
                header.body_size,
                reader.verify(),
                reader.is_finalized()
            );
            if let Ok(tag) = reader.tag() {
                println!(
                    "replica={} chunk={} start={} records={}",
                    tag.replica_id, tag.chunk_id, tag.start_sequence, tag.num_records
                );
            }
            println!("body checksum ok: {}", reader.verify_body()?);

            for record in reader.iter()?.take(*limit) {
                let record = record?;
                println!("  {:016x}\t{} bytes", record.id, record.payload.len());
            }
        }
    }

    Ok(())
}
