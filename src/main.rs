use clap::{Parser, Subcommand};
use mapdrop::{config, naming, output, scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "mapdrop")]
#[command(about = "Ingest uploaded die images into the map archive")]
#[command(long_about = "\
Ingest uploaded die images into the map archive

Watches an upload directory, validates file names, hands each upload to the
map converter and wiki publisher, and records who contributed what.

Upload structure:

  upload/
  ├── intel_8086_alice_top.jpg     # <vendor>_<chipid>_<user>_<flavor>.<ext>
  ├── intel-8086-alice-top.jpg     # hyphens also accepted when no underscores
  ├── batch.tar                    # archive of valid names, expanded in place
  └── alice/                       # per-user directory
      └── intel_8086_top.jpg       # user may be omitted inside their directory

Published layout:

  <map_dir>/intel/8086/
  ├── .manifest                    # provenance of every artifact
  ├── single/intel_8086_alice_top.jpg
  └── alice_top/                   # generated map

Run 'mapdrop gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (defaults and MAPDROP_* environment otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the upload directory and ingest new files
    Run {
        /// Sweep once and exit, failing on any iteration error
        #[arg(long)]
        once: bool,
        /// Development mode: never trigger the reindexer
        #[arg(long)]
        dev: bool,
    },
    /// Validate upload file names without touching anything
    Check {
        /// Treat names as if found in this user's directory
        #[arg(long)]
        user: Option<String>,
        /// File names to check
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run { once, dev } => {
            let mut config = config::load_config(cli.config.as_deref())?;
            config.dev |= dev;
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            ctrlc::set_handler(move || {
                info!("received stop signal, finishing current iteration");
                flag.store(true, Ordering::SeqCst);
            })?;
            let report = scheduler::run_service(&config, once, &shutdown)?;
            output::print_iteration_report(&report);
        }
        Command::Check { user, names } => {
            let results: Vec<_> = names
                .iter()
                .map(|name| (name.clone(), naming::parse_basename(name, user.as_deref())))
                .collect();
            output::print_check_results(&results);
            if results.iter().any(|(_, r)| r.is_err()) {
                std::process::exit(1);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mapdrop={level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
