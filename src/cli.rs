use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use eo_custody::audit::load_jsonl;
use eo_custody::config::PipelineConfig;
use eo_custody::console::{Console, Reply};
use eo_custody::ids::format_report;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "eo-custody",
    version,
    about = "Secure chain-of-custody pipeline for Earth Observation data products"
)]
pub struct Cli {
    /// Configuration file. Defaults to the platform config directory.
    #[arg(long, global = true, env = "EO_CUSTODY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only show warnings and errors on the terminal
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive operator console (the default)
    Console,
    /// Scripted end-to-end run in a throwaway directory
    Demo {
        /// Keep the demo directory instead of deleting it afterwards
        #[arg(long)]
        keep: bool,
    },
    /// Run intrusion detection over the persisted audit trail
    Audit {
        /// Audit file to analyse. Defaults to the configured one.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Wipe simulated storage and the custody ledger
    Reset {
        /// Identity performing the reset; needs the delete permission
        #[arg(short, long)]
        identity: String,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn config_path(cli_path: Option<&Path>) -> Result<PathBuf> {
    match cli_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(PipelineConfig::default_path()?),
    }
}

pub fn run_command(command: Commands, config: Option<&Path>) -> Result<()> {
    let path = config_path(config)?;

    match command {
        Commands::Console => handle_console(&path),
        Commands::Demo { keep } => handle_demo(&path, keep),
        Commands::Audit { file } => handle_audit(&path, file),
        Commands::Reset { identity } => handle_reset(&path, &identity),
        Commands::InitConfig { force } => handle_init_config(&path, force),
    }
}

fn handle_console(path: &Path) -> Result<()> {
    let config = PipelineConfig::load_from(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let pipeline = config.open().context("Failed to open pipeline")?;
    let mut console = Console::new(pipeline, config.intrusion_detector());

    let stdin = std::io::stdin();
    console
        .run(stdin.lock(), std::io::stdout())
        .context("Console I/O failed")
}

const DEMO_SCRIPT: &[&str] = &[
    // Happy path
    "login emanuele_admin",
    "scan",
    "ingest",
    "process",
    "archive",
    "verify",
    // Quality gate
    "scan --faulty",
    "ingest",
    "process",
    // Blocked actors
    "login charlie_user",
    "list",
    "hack",
    "login eve_hacker",
    // Corruption and recovery
    "login emanuele_admin",
    "list",
];

fn handle_demo(path: &Path, keep: bool) -> Result<()> {
    let base = PipelineConfig::load_from(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let dir = tempfile::Builder::new()
        .prefix("eo-custody-demo-")
        .tempdir()
        .context("Failed to create demo directory")?;

    let config = PipelineConfig {
        base_dir: dir.path().to_path_buf(),
        ..base
    };
    let mut console = Console::new(config.open()?, config.intrusion_detector());

    println!("Demo storage: {}\n", dir.path().display());

    let mut run = |line: &str| {
        println!("> {line}");
        let reply = console.execute(line);
        println!("{}\n", reply.text());
        reply
    };

    for &line in DEMO_SCRIPT {
        run(line);
    }

    let first = console_first_product(&mut run)?;
    for line in [
        format!("select {first}"),
        "hack".to_owned(),
        "verify".to_owned(),
        "recover".to_owned(),
        "verify".to_owned(),
        "status".to_owned(),
        "audit".to_owned(),
        "logout".to_owned(),
    ] {
        run(&line);
    }

    if keep {
        let kept = dir.keep();
        println!("Demo directory kept at {}", kept.display());
    }
    Ok(())
}

/// The product the happy path archived; the demo corrupts and recovers it.
fn console_first_product(run: &mut impl FnMut(&str) -> Reply) -> Result<String> {
    let listing = run("list");
    listing
        .text()
        .lines()
        .find(|line| line.contains("ARCHIVED"))
        .and_then(|line| line.split_whitespace().find(|word| word.starts_with("S2_L0_")))
        .map(str::to_owned)
        .context("Demo did not archive a product")
}

fn handle_audit(path: &Path, file: Option<PathBuf>) -> Result<()> {
    let config = PipelineConfig::load_from(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let audit_file = file
        .or_else(|| config.audit_path())
        .context("No audit file configured; pass --file")?;

    let entries = load_jsonl(&audit_file)
        .with_context(|| format!("Failed to read audit trail {}", audit_file.display()))?;
    let incidents = config.intrusion_detector().analyze(&entries);

    println!("{} audit entries in {}", entries.len(), audit_file.display());
    print!("{}", format_report(&incidents));
    Ok(())
}

fn handle_reset(path: &Path, identity: &str) -> Result<()> {
    let config = PipelineConfig::load_from(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let pipeline = config.open()?;

    let session = pipeline.access().login(identity)?;
    pipeline.reset(&session)?;

    println!("Simulated storage under {} wiped", config.base_dir.display());
    Ok(())
}

fn handle_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; use --force to overwrite",
            path.display()
        );
    }

    PipelineConfig::default().save_to(path)?;
    println!("Default configuration written to {}", path.display());
    Ok(())
}
