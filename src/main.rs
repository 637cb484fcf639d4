use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pgbulk_cli::cli::{Cli, Commands, DumpFormat, ServerCommands};
use pgbulk_cli::core::catalog;
use pgbulk_cli::core::invoker::{self, BackupFormat};
use pgbulk_cli::core::jobs::{self, JobEvent, JobId, JobRequest, JobRunner};
use pgbulk_cli::core::{PgTools, ServerDescriptor, ServerStore};
use pgbulk_cli::utils::{first_line, mask_sensitive};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = server_store(cli.servers_file)?;

    match cli.command {
        Commands::Servers { command } => handle_servers(&store, command),
        Commands::Databases { server } => handle_databases(&store, server).await,
        Commands::Backup {
            server,
            databases,
            all,
            output,
            format,
            dump_jobs,
            jobs,
        } => handle_backup(&store, server, databases, all, output, format, dump_jobs, jobs).await,
        Commands::Restore {
            server,
            files,
            target,
            create_target,
            jobs,
        } => handle_restore(&store, server, files, target, create_target, jobs).await,
    }
}

fn server_store(path: Option<PathBuf>) -> Result<ServerStore> {
    let path = match path {
        Some(path) => path,
        None => ServerStore::default_path()
            .context("could not determine the user config directory")?,
    };
    Ok(ServerStore::new(path))
}

fn load_server(store: &ServerStore, name: &str) -> Result<ServerDescriptor> {
    let servers = store.load()?;
    servers.into_iter().find(|s| s.name == name).ok_or_else(|| {
        anyhow!(
            "server '{}' is not configured (see 'pgbulk-cli servers list')",
            name
        )
    })
}

fn handle_servers(store: &ServerStore, command: ServerCommands) -> Result<()> {
    match command {
        ServerCommands::List => {
            let servers = store.load()?;
            if servers.is_empty() {
                println!("No servers configured. Add one with 'pgbulk-cli servers add'.");
                return Ok(());
            }

            println!("{:<16} {:<28} {:<12} {}", "Name", "Address", "User", "Password");
            println!("{}", "-".repeat(68));
            for server in &servers {
                println!(
                    "{:<16} {:<28} {:<12} {}",
                    server.name,
                    format!("{}:{}", server.host, server.port),
                    server.user,
                    mask_sensitive(&server.password, 2)
                );
            }
        }
        ServerCommands::Add {
            name,
            host,
            port,
            user,
            password,
        } => {
            let mut servers = store.load()?;
            let descriptor = ServerDescriptor {
                name: name.clone(),
                host,
                port,
                user,
                password,
            };

            let replaced = match servers.iter().position(|s| s.name == name) {
                Some(index) => {
                    servers[index] = descriptor;
                    true
                }
                None => {
                    servers.push(descriptor);
                    false
                }
            };
            store.save(&servers)?;
            println!(
                "Server '{}' {}",
                name,
                if replaced { "updated" } else { "added" }
            );
        }
        ServerCommands::Remove { name } => {
            let mut servers = store.load()?;
            let before = servers.len();
            servers.retain(|s| s.name != name);
            if servers.len() == before {
                bail!("server '{}' is not configured", name);
            }
            store.save(&servers)?;
            println!("Server '{}' removed", name);
        }
    }
    Ok(())
}

async fn handle_databases(store: &ServerStore, name: String) -> Result<()> {
    let server = load_server(store, &name)?;
    let databases = catalog::list_databases(&server).await?;

    println!("Databases on {} ({})\n", server.name, server.address());
    for database in &databases {
        println!("  {}", database);
    }
    println!("\n{} database(s)", databases.len());

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_backup(
    store: &ServerStore,
    server: String,
    databases: Vec<String>,
    all: bool,
    output: PathBuf,
    format: DumpFormat,
    dump_jobs: usize,
    jobs: usize,
) -> Result<()> {
    let server = load_server(store, &server)?;

    let databases = if all {
        catalog::list_databases(&server).await?
    } else {
        databases
    };
    if databases.is_empty() {
        bail!("no databases selected; use --db or --all");
    }

    fs::create_dir_all(&output)
        .with_context(|| format!("failed to create output folder {}", output.display()))?;

    let format = match format {
        DumpFormat::Custom => BackupFormat::Custom,
        DumpFormat::Dir => BackupFormat::Directory { jobs: dump_jobs },
    };

    let requests = jobs::plan_backup(&server, &databases, &output, format);
    println!(
        "Backing up {} database(s) from {} into {}",
        requests.len(),
        server.name,
        output.display()
    );

    run_batch("Backup", requests, jobs).await
}

async fn handle_restore(
    store: &ServerStore,
    server: String,
    files: Vec<PathBuf>,
    target: Option<String>,
    create_target: bool,
    jobs: usize,
) -> Result<()> {
    let server = load_server(store, &server)?;

    if create_target {
        if let Some(target) = target.as_deref() {
            invoker::create_database(&server, target).await?;
            println!("Created database '{}' on {}", target, server.name);
        }
    }

    let targets: Vec<String> = target.into_iter().collect();
    if files.len() > 1 && !targets.is_empty() {
        println!("Note: --target applies only to single-file restores; restoring every file in auto-create mode");
    }

    let requests = jobs::plan_restore(&server, &files, &targets);
    println!("Restoring {} file(s) onto {}", requests.len(), server.name);

    run_batch("Restore", requests, jobs).await
}

/// Submit a batch, render its events, and print the single combined
/// summary. Ctrl-C cancels every remaining job and waits for each one to
/// reach a terminal state.
async fn run_batch(verb: &str, requests: Vec<JobRequest>, pool_size: usize) -> Result<()> {
    let total = requests.len();
    let started = Instant::now();

    let (runner, mut events) = JobRunner::new(pool_size, Arc::new(PgTools));

    let mut labels: HashMap<JobId, String> = HashMap::with_capacity(total);
    for request in requests {
        let label = request.label();
        let id = runner.submit(request);
        labels.insert(id, label);
    }

    let bar = ProgressBar::new(total as u64);
    bar.set_style(ProgressStyle::with_template("{prefix} [{bar:30}] {pos}/{len}")?.progress_chars("=> "));
    bar.set_prefix(verb.to_string());

    let mut failures: Vec<(String, String)> = Vec::new();
    let mut cancelled = 0usize;
    let mut finished = 0usize;
    let mut interrupted = false;

    while finished < total {
        let event = if interrupted {
            events.recv().await
        } else {
            tokio::select! {
                event = events.recv() => event,
                _ = tokio::signal::ctrl_c() => {
                    bar.println("Interrupt received, cancelling remaining jobs...");
                    runner.cancel_all();
                    interrupted = true;
                    continue;
                }
            }
        };
        let Some(event) = event else { break };

        let label = labels.get(&event.id()).cloned().unwrap_or_default();
        match event {
            JobEvent::Progress { .. } => {}
            JobEvent::Succeeded { .. } => {
                finished += 1;
                bar.inc(1);
                bar.println(format!("  {} {}", "done".green(), label));
            }
            JobEvent::Failed { message, .. } => {
                finished += 1;
                bar.inc(1);
                bar.println(format!("  {} {}: {}", "failed".red(), label, first_line(&message)));
                failures.push((label, message));
            }
            JobEvent::Cancelled { .. } => {
                finished += 1;
                cancelled += 1;
                bar.inc(1);
                bar.println(format!("  {} {}", "cancelled".yellow(), label));
            }
        }
    }
    bar.finish_and_clear();

    let elapsed = humantime::format_duration(Duration::from_secs(started.elapsed().as_secs()));
    let succeeded = total - failures.len() - cancelled;

    if failures.is_empty() && cancelled == 0 {
        println!(
            "{} completed: all {} job(s) succeeded in {}",
            verb,
            total,
            elapsed
        );
    } else {
        println!(
            "{} finished in {}: {} succeeded, {} failed, {} cancelled",
            verb,
            elapsed,
            succeeded,
            failures.len(),
            cancelled
        );
        for (label, message) in &failures {
            println!("  {}: {}", label, first_line(message));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} {} job(s) failed",
            failures.len(),
            total,
            verb.to_lowercase()
        ))
    }
}
