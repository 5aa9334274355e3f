use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    skillsync_engine::{EngineConfig, SkillEngine},
    skillsync_ops::{CompletionSignal, OperationCompleted, ProcessTerminal},
    skillsync_scanner::ScanIssue,
    std::sync::Arc,
    tokio::sync::broadcast,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "skillsync", about = "Reconcile installed agent skills with their sources")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Project root to scan and watch (defaults to the current directory).
    #[arg(long, global = true, env = "SKILLSYNC_PROJECT")]
    project: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan skill directories and list everything installed (default).
    Scan,
    /// Show per-directory diagnostics.
    Status,
    /// Check tracked skills for remote updates.
    Updates,
    /// Install a skill and wait for completion.
    Install {
        /// Source repository in owner/repo form.
        source: String,
        /// Skill folder name inside the repository.
        name: String,
        /// Install into the global scope.
        #[arg(short, long)]
        global: bool,
        /// Install into the project scope.
        #[arg(long, conflicts_with = "global")]
        local: bool,
    },
    /// Uninstall a skill and wait for completion.
    Uninstall {
        /// Installed skill name.
        name: String,
        /// Remove from the global scope.
        #[arg(short, long)]
        global: bool,
        /// Remove from the project scope.
        #[arg(long, conflicts_with = "global")]
        local: bool,
    },
    /// Apply every available update as one batch.
    Update,
    /// Show remote detail for one installed skill.
    Detail {
        /// Installed skill name.
        name: String,
    },
    /// Watch skill directories and report changes until interrupted.
    Watch,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout is reserved for command output.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Map the two scope flags onto an optional override for the engine.
fn scope_override(global: bool, local: bool) -> Option<bool> {
    match (global, local) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let project_root = match cli.project.clone() {
        Some(root) => root,
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };
    let config = EngineConfig::discover(Some(&project_root));
    let paths = config.paths(Some(&project_root))?;
    let engine = SkillEngine::new(paths, config);

    info!(version = env!("CARGO_PKG_VERSION"), "skillsync starting");

    match cli.command.unwrap_or(Commands::Scan) {
        Commands::Scan => scan(&engine, cli.json),
        Commands::Status => status(&engine, cli.json),
        Commands::Updates => updates(&engine, cli.json).await,
        Commands::Install {
            source,
            name,
            global,
            local,
        } => {
            install(
                &engine,
                &project_root,
                &source,
                &name,
                scope_override(global, local),
            )
            .await
        },
        Commands::Uninstall {
            name,
            global,
            local,
        } => {
            uninstall(
                &engine,
                &project_root,
                &name,
                scope_override(global, local),
            )
            .await
        },
        Commands::Update => update(&engine, &project_root).await,
        Commands::Detail { name } => detail(&engine, &name, cli.json).await,
        Commands::Watch => watch(&engine).await,
    }
}

fn scan(engine: &Arc<SkillEngine>, json: bool) -> anyhow::Result<()> {
    let result = engine.rescan();
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    if result.is_empty() {
        println!("No skills installed.");
        return Ok(());
    }
    for skill in result.iter() {
        let state = if skill.is_custom {
            "custom"
        } else if skill.is_tracked() {
            "tracked"
        } else {
            "untracked"
        };
        println!(
            "  {} [{}] ({state}) {}",
            skill.name, skill.scope, skill.description
        );
    }
    Ok(())
}

fn status(engine: &Arc<SkillEngine>, json: bool) -> anyhow::Result<()> {
    let report = engine.diagnose();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for dir in &report.directories {
        let state = if dir.exists {
            format!("{} skill(s)", dir.skill_count)
        } else {
            "missing".to_string()
        };
        println!("  {} [{}] {state}", dir.path.display(), dir.scope);
    }
    for issue in &report.issues {
        let note = match issue {
            ScanIssue::NoSkillDirectories => "no skill directories exist yet",
            ScanIssue::NoProjectOpen => "no project root detected",
        };
        println!("  note: {note}");
    }
    Ok(())
}

async fn updates(engine: &Arc<SkillEngine>, json: bool) -> anyhow::Result<()> {
    engine.rescan();
    let response = engine.check_updates().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    if response.updates.is_empty() {
        println!("All skills are up to date.");
        return Ok(());
    }
    for update in &response.updates {
        let short = update.new_hash.get(..7).unwrap_or(&update.new_hash);
        println!("  {} ({}) -> {short}", update.name, update.source);
    }
    Ok(())
}

async fn install(
    engine: &Arc<SkillEngine>,
    project_root: &Path,
    source: &str,
    name: &str,
    global: Option<bool>,
) -> anyhow::Result<()> {
    engine.start().await?;
    let terminal = ProcessTerminal::with_cwd(
        engine.tracker().exit_channel(),
        project_root.to_path_buf(),
    );
    let mut completions = engine.tracker().completions();

    println!("Installing '{name}' from {source}...");
    let id = engine.install(&terminal, name, source, global).await?;
    wait_for_completion(id, &mut completions).await?;
    engine.stop().await;
    Ok(())
}

async fn uninstall(
    engine: &Arc<SkillEngine>,
    project_root: &Path,
    name: &str,
    global: Option<bool>,
) -> anyhow::Result<()> {
    engine.start().await?;
    let terminal = ProcessTerminal::with_cwd(
        engine.tracker().exit_channel(),
        project_root.to_path_buf(),
    );
    let mut completions = engine.tracker().completions();

    println!("Uninstalling '{name}'...");
    let id = engine.uninstall(&terminal, name, global).await?;
    wait_for_completion(id, &mut completions).await?;
    engine.stop().await;
    Ok(())
}

async fn update(engine: &Arc<SkillEngine>, project_root: &Path) -> anyhow::Result<()> {
    engine.start().await?;
    let response = engine.check_updates().await?;
    if response.updates.is_empty() {
        println!("All skills are up to date.");
        engine.stop().await;
        return Ok(());
    }

    let terminal = ProcessTerminal::with_cwd(
        engine.tracker().exit_channel(),
        project_root.to_path_buf(),
    );
    let mut completions = engine.tracker().completions();

    println!("Updating {} skill(s)...", response.updates.len());
    if let Some(id) = engine.update_all(&terminal).await? {
        wait_for_completion(id, &mut completions).await?;
    }
    engine.stop().await;
    Ok(())
}

async fn detail(engine: &Arc<SkillEngine>, name: &str, json: bool) -> anyhow::Result<()> {
    engine.rescan();
    match engine.skill_detail(name).await? {
        Some(detail) if json => println!("{}", serde_json::to_string_pretty(&detail)?),
        Some(detail) => {
            println!("Name:        {}", detail.manifest.name);
            println!("Source:      {}", detail.source);
            if !detail.manifest.description.is_empty() {
                println!("Description: {}", detail.manifest.description);
            }
            if !detail.body.is_empty() {
                println!("\n{}", detail.body);
            }
        },
        None => println!("No remote detail available for '{name}'."),
    }
    Ok(())
}

async fn watch(engine: &Arc<SkillEngine>) -> anyhow::Result<()> {
    engine.start().await?;
    let mut changes = engine.subscribe_changes();
    println!("Watching skill directories (ctrl-c to stop).");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = changes.recv() => match event {
                Ok(event) => {
                    let mut names: Vec<_> = event.names.into_iter().collect();
                    names.sort();
                    println!("Changed: {}", names.join(", "));
                },
                Err(broadcast::error::RecvError::Lagged(_)) => {},
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    engine.stop().await;
    Ok(())
}

async fn wait_for_completion(
    id: u64,
    completions: &mut broadcast::Receiver<OperationCompleted>,
) -> anyhow::Result<()> {
    loop {
        match completions.recv().await {
            Ok(done) if done.operation_id == id => {
                match done.signal {
                    CompletionSignal::TimedOut => {
                        println!("No completion signal yet; the command may still be running.");
                    },
                    _ => println!("Done."),
                }
                if let Some(warning) = done.warning {
                    println!("Warning: {warning}");
                }
                return Ok(());
            },
            Ok(_) => {},
            Err(broadcast::error::RecvError::Lagged(_)) => {},
            Err(broadcast::error::RecvError::Closed) => {
                anyhow::bail!("completion channel closed before the operation finished")
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn scope_flags_map_to_overrides() {
        assert_eq!(scope_override(true, false), Some(true));
        assert_eq!(scope_override(false, true), Some(false));
        assert_eq!(scope_override(false, false), None);
    }

    #[test]
    fn cli_parses_install_flags() {
        let cli = Cli::parse_from(["skillsync", "install", "owner/repo", "demo", "-g"]);
        match cli.command {
            Some(Commands::Install {
                source,
                name,
                global,
                local,
            }) => {
                assert_eq!(source, "owner/repo");
                assert_eq!(name, "demo");
                assert!(global);
                assert!(!local);
            },
            _ => panic!("expected install command"),
        }
    }
}
