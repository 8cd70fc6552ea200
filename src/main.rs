//! # picluster tools CLI (`pct`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pct info <FILE>` | Print the header of a dataset file |
//! | `pct sweeps` | List configured generator sweeps |
//! | `pct sweep <NAME>` | Run a sweep (`all` runs every sweep) |
//! | `pct flags <FILE>` | Resolve editor compile flags for a source or header |
//!
//! ## Examples
//!
//! ```bash
//! # Inspect a dataset and verify its payload size
//! pct info data/cluster_data_2f_10c_16mb.bin --check
//!
//! # Show what the features sweep would run
//! pct sweep features --dry-run
//!
//! # Flags for a header, as JSON for an editor plugin
//! pct flags src/matrix.hpp --cwd ~/picluster --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use picluster_tools::{config, flags, header, sweep};

/// picluster tools: dataset inspection, generator sweeps, and editor
/// compile flags.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, built-in defaults are used.
#[derive(Parser)]
#[command(name = "pct", version)]
struct Cli {
    /// Path to configuration file (TOML). Ignored if it does not exist.
    #[arg(long, global = true, default_value = "./pct.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display information about a binary format dataset file.
    Info {
        /// Dataset file.
        file: PathBuf,

        /// Fail if the payload size does not match the header.
        #[arg(long)]
        check: bool,

        /// Also print the first N points.
        #[arg(long, value_name = "N")]
        points: Option<u64>,
    },

    /// List configured generator sweeps.
    Sweeps,

    /// Run a generator sweep.
    ///
    /// Invokes the generator once per sweep value, writing one dataset per
    /// run into the output directory. A failing run is reported and the
    /// sweep continues.
    Sweep {
        /// Sweep name from the config, or `all`.
        name: String,

        /// Print the generator command lines without running them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve compiler flags for a file, for editor completion engines.
    Flags {
        /// Source or header file, relative to `--cwd`.
        file: PathBuf,

        /// Project working directory. Defaults to the current directory.
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Print `{filename, flags, do_cache}` as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("picluster_tools=warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Info {
            file,
            check,
            points,
        } => {
            let args = header::InfoArgs {
                file,
                check,
                points,
            };
            header::run_info(&args, &mut std::io::stdout().lock())?;
        }
        Commands::Sweeps => {
            sweep::list_sweeps(&cfg)?;
        }
        Commands::Sweep { name, dry_run } => {
            sweep::run_sweep_cmd(&cfg, &name, dry_run)?;
        }
        Commands::Flags { file, cwd, json } => {
            let here = std::env::current_dir()?;
            let cwd = match cwd {
                Some(dir) => here.join(dir),
                None => here,
            };
            flags::run_flags(&cfg.flags, &cwd, &file, json, &mut std::io::stdout().lock())?;
        }
    }

    Ok(())
}
