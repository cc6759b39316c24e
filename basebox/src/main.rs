//! Build and package a Vagrant base box.
//!
//! `basebox provision` brings up a VM from the configured template and runs
//! the idempotent action catalog against it; `basebox package` snapshots the
//! result into `<name>.box`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use basebox::catalog::default_actions;
use basebox::error::is_remote_failure;
use basebox::exit_codes;
use basebox::io::cache::{CurlFetcher, FileCache};
use basebox::io::config::{DEFAULT_CONFIG_FILE, ProvisionConfig, load_config, render_config};
use basebox::io::prompt::{DefaultPrompter, InquirePrompter, Prompter};
use basebox::io::vagrant::Vagrant;
use basebox::logging;
use basebox::package::run_package;
use basebox::provision::run_provision;

#[derive(Parser)]
#[command(name = "basebox", version, about = "Provision and package a Vagrant base box")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the VM and run every provisioning action against it.
    Provision {
        /// Config file (missing file = defaults).
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Answer every prompt with its default instead of asking.
        #[arg(long)]
        non_interactive: bool,
    },
    /// Package the provisioned VM into `<name>.box`.
    Package {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            if is_remote_failure(&err) {
                exit_codes::REMOTE_FAILED
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Provision {
            config,
            non_interactive,
        } => cmd_provision(&config, non_interactive),
        Command::Package { config } => cmd_package(&config),
        Command::Config { config } => cmd_config(&config),
    }
}

fn load(path: &Path) -> Result<ProvisionConfig> {
    load_config(path)?.resolved()
}

fn cmd_provision(config_path: &Path, non_interactive: bool) -> Result<()> {
    let cfg = load(config_path)?;
    let vm = Vagrant::new(cfg.work_dir(), &cfg);
    let cache = FileCache::new(
        cfg.cache_dir()?,
        CurlFetcher {
            timeout: cfg.command_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
        },
    );
    let prompter: Box<dyn Prompter> = if non_interactive {
        Box::new(DefaultPrompter)
    } else {
        Box::new(InquirePrompter)
    };
    let actions = default_actions(&cfg);

    let outcome = run_provision(&cfg, &vm, prompter.as_ref(), &cache, &actions)?;
    let installed = outcome.report.failed();
    if installed.is_empty() {
        println!("{}: already provisioned", cfg.name);
    } else {
        println!("{}: installed {}", cfg.name, installed.join(", "));
    }
    Ok(())
}

fn cmd_package(config_path: &Path) -> Result<()> {
    let cfg = load(config_path)?;
    let vagrant = Vagrant::new(cfg.work_dir(), &cfg);
    let box_path = run_package(&cfg, &vagrant)?;
    println!("{}", box_path.display());
    Ok(())
}

fn cmd_config(config_path: &Path) -> Result<()> {
    let cfg = load(config_path)?;
    print!("{}", render_config(&cfg)?);
    Ok(())
}
