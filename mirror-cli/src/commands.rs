use crate::args::{Cli, Commands, ConfigCommand, TaskCommand};
use anyhow::{bail, Context, Result};
use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore};
use bridge_traits::http::HttpClient;
use bridge_traits::storage::SettingsStore;
use core_runtime::logging::redact_if_sensitive;
use core_runtime::{ConfigRepository, MirrorConfiguration, RuntimePaths};
use core_scheduler::{
    normalize_schedule, CommandTemplate, FileJobList, Interval, JobList, NewTasks, SystemCrontab,
    TaskManager, TaskRepository, TaskUpdate,
};
use core_sync::{
    AlistProviderFactory, FileSnapshotCache, MirrorService, ReportStore, SyncError, SyncRunOutcome,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info_span, warn, Instrument};

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let paths = cli
        .home
        .clone()
        .map(RuntimePaths::new)
        .unwrap_or_else(RuntimePaths::from_env);
    let settings = open_settings(&paths).await?;

    match cli.command {
        Commands::Sync { config_id, task_id } => {
            let service = build_service(&paths, settings)?;
            cancel_on_interrupt(&service);
            let span = info_span!("run", operation = "sync", %config_id, task_id = task_id.as_deref().unwrap_or("manual"));

            match service.run_sync(&config_id).instrument(span).await {
                Ok(outcome) => {
                    println!("{}", sync_summary(&config_id, &outcome));
                    if outcome.sync.deleted_pointers > 0 || outcome.sync.deleted_dirs > 0 {
                        println!(
                            "Removed {} stale pointers and {} directories",
                            outcome.sync.deleted_pointers, outcome.sync.deleted_dirs
                        );
                    }
                    if !outcome.crawl.failed_paths.is_empty() {
                        println!("Directories that could not be listed:");
                        for path in &outcome.crawl.failed_paths {
                            println!("  {}", path);
                        }
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Ok(exit_for(e)),
            }
        }

        Commands::Validate {
            config_id,
            mode,
            task_id,
        } => {
            let service = build_service(&paths, settings)?;
            cancel_on_interrupt(&service);
            let span = info_span!("run", operation = %mode, %config_id, task_id = task_id.as_deref().unwrap_or("manual"));

            match service.run_validate(&config_id, mode).instrument(span).await {
                Ok(outcome) => {
                    println!(
                        "{} scan of configuration {}: {} checked, {} invalid",
                        outcome.mode,
                        config_id,
                        outcome.checked,
                        outcome.report.len()
                    );
                    if outcome.unverified > 0 {
                        println!("{} pointers could not be verified", outcome.unverified);
                    }
                    println!("Report written to {}", outcome.report_path.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Ok(exit_for(e)),
            }
        }

        Commands::Cleanup { config_id } => {
            let service = build_service(&paths, settings)?;
            let stats = service.cleanup(&config_id).await?;
            println!(
                "Deleted {} pointers ({} already gone, {} refused, {} failed), removed {} empty directories",
                stats.deleted, stats.missing, stats.refused, stats.failed, stats.dirs_removed
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::RewriteDomain {
            config_id,
            old_domain,
            new_domain,
        } => {
            let service = build_service(&paths, settings)?;
            let stats = service
                .rewrite_domain(&config_id, &old_domain, &new_domain)
                .await?;
            println!(
                "Rewrote {} pointers ({} unchanged, {} failed)",
                stats.rewritten, stats.untouched, stats.failed
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config { command } => {
            run_config(ConfigRepository::new(settings), command).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Task { command } => {
            let job_list: Arc<dyn JobList> = match &cli.job_file {
                Some(path) => Arc::new(FileJobList::new(path.clone())),
                None => Arc::new(SystemCrontab::new()),
            };
            let manager = TaskManager::new(
                TaskRepository::new(settings),
                job_list,
                command_template(cli.home.as_deref()),
            );
            run_task(&manager, command).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn open_settings(paths: &RuntimePaths) -> Result<Arc<dyn SettingsStore>> {
    let store = SqliteSettingsStore::new(paths.settings_db())
        .await
        .with_context(|| format!("Failed to open settings in {}", paths.home().display()))?;
    Ok(Arc::new(store))
}

fn build_service(paths: &RuntimePaths, settings: Arc<dyn SettingsStore>) -> Result<MirrorService> {
    let http: Arc<dyn HttpClient> =
        Arc::new(ReqwestHttpClient::new().context("Failed to create HTTP client")?);
    Ok(MirrorService::new(
        ConfigRepository::new(settings),
        Arc::new(AlistProviderFactory::new(Arc::clone(&http))),
        http,
        Arc::new(FileSnapshotCache::new(paths.cache_dir())),
        ReportStore::new(paths.report_dir()),
    ))
}

fn sync_summary(config_id: &str, outcome: &SyncRunOutcome) -> String {
    let sync = &outcome.sync;
    format!(
        "Synced configuration {}: {} files listed, {} pointers created, {} skipped, {} failed, \
         {} sidecars downloaded, {} download failures, {} present",
        config_id,
        outcome.crawl.files,
        sync.created,
        sync.skipped,
        sync.failed,
        sync.downloaded,
        sync.download_failed,
        sync.pointers_present
    )
}

/// Ctrl-C cancels the run. Nothing is deleted and no report is written
/// after the interrupt, and the command exits with the cancellation error.
fn cancel_on_interrupt(service: &MirrorService) {
    let token = service.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the run");
            token.cancel();
        }
    });
}

/// Only configuration and authorization failures fail the process. Anything
/// else was already logged and leaves the schedule running.
fn exit_for(error: SyncError) -> ExitCode {
    error!(error = %error, fatal = error.is_fatal(), "Run failed");
    eprintln!("Error: {}", error);
    if error.is_fatal() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Scheduled commands call this binary back, pinned to the same state directory.
fn command_template(home: Option<&Path>) -> CommandTemplate {
    let template = match std::env::current_exe() {
        Ok(exe) => CommandTemplate::new(exe.display().to_string()),
        Err(e) => {
            warn!(error = %e, "Cannot resolve own executable, scheduling by name");
            CommandTemplate::default()
        }
    };
    match home {
        Some(home) => template.with_home(home.display().to_string()),
        None => template,
    }
}

async fn run_config(repository: ConfigRepository, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::List => {
            let mut ids = repository.list_ids().await?;
            ids.sort();
            for id in ids {
                match repository.get(&id).await {
                    Ok(Some(config)) => println!("{}\t{}\t{}", id, config.name, config.root_path),
                    Ok(None) => {}
                    Err(e) => println!("{}\t(unreadable: {})", id, e),
                }
            }
        }
        ConfigCommand::Show { config_id } => {
            let mut config = repository.load(&config_id).await?;
            config.token = redact_if_sensitive("token", &config.token);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::Import { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let configs = parse_configurations(&raw)?;
            for config in &configs {
                repository
                    .save(config)
                    .await
                    .with_context(|| format!("Rejected configuration {}", config.id))?;
            }
            println!("Imported {} configuration(s)", configs.len());
        }
        ConfigCommand::Delete { config_id } => {
            repository.delete(&config_id).await?;
            println!("Deleted configuration {}", config_id);
        }
    }
    Ok(())
}

/// Accepts a single configuration object or an array of them
pub fn parse_configurations(raw: &str) -> Result<Vec<MirrorConfiguration>> {
    let value: serde_json::Value = serde_json::from_str(raw).context("Invalid JSON")?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        _ => bail!("Expected a configuration object or an array of them"),
    };
    items
        .into_iter()
        .map(|item| -> Result<MirrorConfiguration> {
            let mut config: MirrorConfiguration = serde_json::from_value(item)?;
            config.classification = config.classification.normalized();
            config.download_interval = config.download_interval.ordered();
            config.validate()?;
            Ok(config)
        })
        .collect()
}

/// An explicit schedule wins over an interval shorthand
pub fn resolve_schedule(schedule: Option<String>, every: Option<Interval>) -> Result<Option<String>> {
    match (schedule, every) {
        (Some(schedule), _) => Ok(Some(normalize_schedule(&schedule)?)),
        (None, Some(interval)) => Ok(Some(interval.to_schedule()?)),
        (None, None) => Ok(None),
    }
}

async fn run_task(manager: &TaskManager, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::List => {
            let tasks = manager.list().await?;
            if tasks.is_empty() {
                println!("No scheduled tasks");
            }
            for task in tasks {
                let state = if task.enabled { "enabled" } else { "disabled" };
                println!(
                    "{}\t{}\t{}\t{}\t{} ({})\t{}",
                    task.task_id,
                    state,
                    task.config_id,
                    task.operation,
                    task.schedule,
                    Interval::from_schedule(&task.schedule).describe(),
                    task.task_name
                );
            }
        }
        TaskCommand::Add {
            name,
            schedule,
            every,
            config_ids,
            operation,
            disabled,
        } => {
            let schedule = resolve_schedule(schedule, every)?.context("A schedule is required")?;
            let ids = manager
                .add(NewTasks {
                    task_name: name,
                    schedule,
                    config_ids,
                    operation,
                    enabled: !disabled,
                })
                .await?;
            for id in ids {
                println!("{}", id);
            }
        }
        TaskCommand::Update {
            task_ids,
            name,
            schedule,
            every,
            config_ids,
            operation,
            enable,
            disable,
        } => {
            let enabled = match (enable, disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let changes = TaskUpdate {
                task_name: name,
                schedule: resolve_schedule(schedule, every)?,
                config_ids: (!config_ids.is_empty()).then_some(config_ids),
                operation,
                enabled,
            };
            manager.update(&task_ids, changes).await?;
            println!("Updated {} task(s)", task_ids.len());
        }
        TaskCommand::Delete { task_ids } => {
            let removed = manager.delete(&task_ids).await?;
            println!("Deleted {} task(s)", removed);
        }
        TaskCommand::Enable { task_ids } => {
            manager.set_enabled(&task_ids, true).await?;
            println!("Enabled {} task(s)", task_ids.len());
        }
        TaskCommand::Disable { task_ids } => {
            manager.set_enabled(&task_ids, false).await?;
            println!("Disabled {} task(s)", task_ids.len());
        }
        TaskCommand::Import => {
            let imported = manager.import_legacy().await?;
            manager.install().await?;
            println!("Imported {} task(s)", imported);
        }
        TaskCommand::Run { task_id } => {
            let pid = manager.run_now(&task_id).await?;
            println!("Started task {} (pid {})", task_id, pid);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "id": "1",
        "site_url": "https://media.example.com",
        "token": "secret-token",
        "root_path": "/movies",
        "target_directory": "/mnt/strm/movies"
    }"#;

    #[test]
    fn test_parse_single_configuration() {
        let configs = parse_configurations(CONFIG).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].root_path, "/movies");
        assert_eq!(configs[0].pointer_extension, "strm");
    }

    #[test]
    fn test_parse_configuration_array() {
        let raw = format!("[{}, {}]", CONFIG, CONFIG.replace("\"1\"", "\"2\""));
        let ids: Vec<String> = parse_configurations(&raw)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_parse_rejects_scalars() {
        assert!(parse_configurations("42").is_err());
        assert!(parse_configurations("not json").is_err());
    }

    #[test]
    fn test_sync_summary_reports_failures() {
        let outcome = SyncRunOutcome {
            crawl: core_sync::CrawlStats {
                files: 12,
                ..Default::default()
            },
            sync: core_sync::SyncStats {
                created: 3,
                skipped: 5,
                failed: 1,
                downloaded: 4,
                download_failed: 2,
                pointers_present: 8,
                ..Default::default()
            },
        };

        let summary = sync_summary("9", &outcome);
        assert!(summary.contains("3 pointers created"), "{}", summary);
        assert!(summary.contains("5 skipped"));
        assert!(summary.contains("1 failed"));
        assert!(summary.contains("4 sidecars downloaded"));
        assert!(summary.contains("2 download failures"));
        assert!(summary.contains("8 present"));
    }

    #[test]
    fn test_schedule_beats_interval() {
        let resolved = resolve_schedule(Some("0  3 * * *".to_string()), Some(Interval::Hours(2)));
        assert_eq!(resolved.unwrap().as_deref(), Some("0 3 * * *"));
        assert_eq!(
            resolve_schedule(None, Some(Interval::Days(2))).unwrap().as_deref(),
            Some("0 0 */2 * *")
        );
        assert!(resolve_schedule(None, None).unwrap().is_none());
        assert!(resolve_schedule(None, Some(Interval::Hours(30))).is_err());
    }

    #[test]
    fn test_command_template_carries_home() {
        let template = command_template(Some(Path::new("/srv/mirror state")));
        let rendered = template.render(&core_scheduler::TaskDescriptor::new(
            "t1",
            "n",
            "1",
            core_scheduler::OperationKind::Sync,
            "0 * * * *",
        ));
        assert!(rendered.contains("--home \"/srv/mirror state\""), "{}", rendered);
    }
}
