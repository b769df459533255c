use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use docspace_core::{DocspaceConfig, Reaper, SweepReport, WorkspaceManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn build_cli() -> Command {
    Command::new("docspace")
        .version(docspace_core::VERSION)
        .about("Isolated per-request document workspaces")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file (DOCSPACE_* variables override it)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(Command::new("run").about("Run the reaper until interrupted"))
        .subcommand(
            Command::new("sweep")
                .about("Run one sweep pass over the workspace root")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Create a workspace and print its path")
                .arg(
                    Arg::new("owner")
                        .long("owner")
                        .help("Owner tag embedded in the directory name"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Exit 0 if the path lies inside the workspace root")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<DocspaceConfig> {
    let path = matches.get_one::<PathBuf>("config");
    DocspaceConfig::load(path.map(PathBuf::as_path)).context("failed to load configuration")
}

fn open(config: DocspaceConfig) -> Result<Arc<WorkspaceManager>> {
    let manager = WorkspaceManager::new(config).context("failed to open workspace root")?;
    Ok(Arc::new(manager))
}

async fn run(config: DocspaceConfig) -> Result<()> {
    let manager = open(config)?;
    let handle = Reaper::new(Arc::clone(&manager)).spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("interrupt received, stopping reaper");

    let summary = handle.shutdown().await;
    println!("Reaper Summary:");
    println!("  Passes: {}", summary.passes);
    println!("  Expired: {}", summary.expired);
    println!("  Orphans Removed: {}", summary.orphans_removed);
    println!("  Warnings: {}", summary.warnings);
    Ok(())
}

fn sweep(config: DocspaceConfig) -> Result<SweepReport> {
    let manager = open(config)?;
    Ok(Reaper::new(manager).sweep())
}

fn print_report(report: &SweepReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Sweep Report ({})", report.started_at.to_rfc3339());
    println!("  Removed: {}", report.removed());
    for reclaimed in &report.orphans_removed {
        println!(
            "    {} (owner: {}, age: {}s)",
            reclaimed.path.display(),
            reclaimed.owner.as_deref().unwrap_or("-"),
            reclaimed.age_secs
        );
    }
    println!("  Warnings: {}", report.warnings.len());
    for warning in &report.warnings {
        println!("    {}: {}", warning.path.display(), warning.reason);
    }
    Ok(())
}

fn create(config: DocspaceConfig, owner: Option<&str>) -> Result<PathBuf> {
    let manager = open(config)?;
    let path = manager
        .create_workspace(owner)
        .context("failed to create workspace")?;
    Ok(path)
}

fn validate(config: DocspaceConfig, path: &Path) -> Result<bool> {
    let manager = open(config)?;
    Ok(manager.validate_workspace_path(path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("log-json"));
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("run", _)) => run(config).await?,
        Some(("sweep", args)) => {
            let report = tokio::task::spawn_blocking(move || sweep(config)).await??;
            print_report(&report, args.get_flag("json"))?;
            std::process::exit(if report.warnings.is_empty() { 0 } else { 1 });
        }
        Some(("create", args)) => {
            let owner = args.get_one::<String>("owner").map(String::as_str);
            println!("{}", create(config, owner)?.display());
        }
        Some(("validate", args)) => {
            let path = args
                .get_one::<PathBuf>("path")
                .context("missing path argument")?;
            std::process::exit(if validate(config, path)? { 0 } else { 1 });
        }
        _ => {}
    }
    Ok(())
}
