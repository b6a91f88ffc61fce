use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use labmirror::config::{CloneMethod, LoggingConfig};
use labmirror::discovery::PathFilter;
use labmirror::sync::ensure_output_directory;
use labmirror::{
    Config, GitCli, GitLabClient, Inventory, InventoryBuilder, MirrorError, MirrorReport,
    SyncEngine,
};

#[derive(Parser, Debug)]
#[command(name = "labmirror")]
#[command(about = "Mirror every repository of one or more GitLab groups to local disk")]
#[command(version)]
struct Cli {
    /// Group ids to mirror, including all nested sub-groups
    group_ids: Vec<u64>,

    /// Verbose mode, all output enabled
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode, only warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Directory to save the mirrors in (created if missing)
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Also mirror projects owned by the current account
    #[arg(short, long)]
    personal: bool,

    /// Print a report after the run
    #[arg(short, long)]
    report: bool,

    /// Discover and list repositories without cloning or pulling
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GitLab instance URL
    #[arg(long)]
    gitlab_url: Option<String>,

    /// Clone over HTTPS instead of SSH
    #[arg(long)]
    https: bool,
}

impl Cli {
    /// Reject flag combinations before anything touches the network or disk
    fn validate(&self) -> Result<(), MirrorError> {
        if self.verbose && self.quiet {
            return Err(MirrorError::ConflictingVerbosity);
        }
        Ok(())
    }

    /// Fold command line overrides into the loaded configuration
    fn apply(&self, config: &mut Config) {
        if let Some(directory) = &self.directory {
            config.mirror.output_directory = directory.to_string_lossy().into_owned();
        }
        if let Some(url) = &self.gitlab_url {
            config.gitlab.url = url.clone();
        }
        if self.https {
            config.mirror.clone_method = CloneMethod::Https;
        }
        if self.personal {
            config.mirror.include_personal = true;
        }

        let mut groups = self.group_ids.clone();
        for id in &config.mirror.groups {
            if !groups.contains(id) {
                groups.push(*id);
            }
        }
        config.mirror.groups = groups;
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        let code = match e.downcast_ref::<MirrorError>() {
            Some(mirror_error) => mirror_error.exit_code(),
            None => 1,
        };
        eprintln!("error: {:#}", e);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    cli.validate()?;

    let mut config = load_config(cli.config.as_deref()).map_err(MirrorError::Config)?;
    cli.apply(&mut config);

    if config.mirror.groups.is_empty() && !config.mirror.include_personal {
        return Err(MirrorError::NothingToDo.into());
    }

    init_logging(&cli, &config.logging)?;
    info!("Starting labmirror v{}", env!("CARGO_PKG_VERSION"));

    let target_root = config.output_directory();
    if !cli.dry_run {
        ensure_output_directory(&target_root)?;
    }

    let filter = PathFilter::new(&config.mirror.exclude_patterns).map_err(MirrorError::Config)?;
    let client = GitLabClient::new(&config.gitlab, config.mirror.clone_method)?;

    let inventory = InventoryBuilder::new(&client, config.mirror.path_separator.clone())
        .with_filter(filter)
        .discover(&config.mirror.groups, config.mirror.include_personal)
        .await?;

    if cli.dry_run {
        print_inventory(&inventory, cli.report);
        return Ok(());
    }

    let engine = SyncEngine::new(Arc::new(GitCli::new(&config.git)), target_root);
    info!("Writing mirrors below {}", engine.target_root().display());
    let report = engine.run(&inventory).await;

    if cli.report {
        print_report(&report);
    }

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

/// Initialize logging based on verbosity flags and configuration
fn init_logging(cli: &Cli, logging: &LoggingConfig) -> Result<()> {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(logging.color).with_writer(std::io::stderr))
        .with(filter)
        .try_init()?;

    Ok(())
}

fn print_inventory(inventory: &Inventory, with_totals: bool) {
    for repo in inventory {
        println!("{} <- {}", repo.relative_path, repo.remote_address);
    }

    if with_totals {
        println!(
            "Dry run. Found {} projects in {} groups ({} subgroups), {} duplicates skipped, {} excluded.",
            inventory.len(),
            inventory.group_count,
            inventory.subgroup_count,
            inventory.duplicate_count,
            inventory.excluded_count
        );
    }
}

fn print_report(report: &MirrorReport) {
    println!("{}", report);
    println!("Duration: {:.2}s", report.duration.as_secs_f64());

    if !report.failures.is_empty() {
        println!("Failed projects:");
        for (path, reason) in &report.failures {
            println!("  {}: {}", path, reason);
        }
    }
}
