//! AVM command-line interface.
//!
//! Commands:
//! - `avm run <chunk>... --entry <module>:<name>` - Load chunks and run an entry point
//! - `avm inspect <chunk>` - Print a chunk's header and prototype tree
//!
//! `RUST_LOG` selects what gets logged (default `warn`).

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "avm")]
#[command(about = "Actor virtual machine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load chunks in order and run an exported function as the first process
    Run {
        /// Chunk files; later chunks may import from earlier ones
        #[arg(required = true)]
        chunks: Vec<PathBuf>,

        /// Entry point as <module>:<name>
        #[arg(long)]
        entry: String,

        /// Pid bits used for the slot index
        #[arg(long, default_value_t = avm_vm::config::DEFAULT_IDX_BITS)]
        idx_bits: u8,

        /// Pid bits used for the slot generation
        #[arg(long, default_value_t = avm_vm::config::DEFAULT_GEN_BITS)]
        gen_bits: u8,

        /// Heap limit per process, in bytes
        #[arg(long, default_value_t = avm_vm::config::DEFAULT_MAX_HEAP)]
        max_heap: usize,

        /// String arguments passed to the entry function
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Print a chunk's header and prototype tree
    Inspect {
        /// Chunk file
        chunk: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            chunks,
            entry,
            idx_bits,
            gen_bits,
            max_heap,
            args,
        } => commands::run::run(commands::run::RunOptions {
            chunks,
            entry,
            idx_bits,
            gen_bits,
            max_heap,
            args,
        }),
        Commands::Inspect { chunk } => commands::inspect::inspect(&chunk),
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}
