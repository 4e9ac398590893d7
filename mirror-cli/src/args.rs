use clap::{Parser, Subcommand};
use core_runtime::{LogFormat, LogLevel};
use core_scheduler::{Interval, OperationKind};
use core_sync::ScanMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "strm-mirror")]
#[command(about = "Mirror a remote media tree as .strm pointer files", long_about = None)]
#[command(version)]
pub struct Cli {
    /// State directory holding settings, snapshot cache and reports
    #[arg(long, env = "STRM_MIRROR_HOME", global = true)]
    pub home: Option<PathBuf>,

    #[arg(long, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Keep scheduled tasks in this file instead of the user's crontab
    #[arg(long, global = true)]
    pub job_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Crawl the remote tree and update the local mirror")]
    Sync {
        config_id: String,

        /// Id of the scheduled task that started this run
        #[arg(long)]
        task_id: Option<String>,
    },

    #[command(about = "Find invalid pointer files and write the report")]
    Validate {
        config_id: String,

        #[arg(default_value = "fast")]
        mode: ScanMode,

        #[arg(long)]
        task_id: Option<String>,
    },

    #[command(about = "Delete the pointer files listed in the last report")]
    Cleanup { config_id: String },

    #[command(about = "Replace a host prefix inside every pointer file")]
    RewriteDomain {
        config_id: String,
        old_domain: String,
        new_domain: String,
    },

    #[command(about = "Manage mirror configurations")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    #[command(about = "Manage scheduled tasks")]
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    #[command(about = "List stored configuration ids")]
    List,

    #[command(about = "Print a configuration as JSON (token redacted)")]
    Show { config_id: String },

    #[command(about = "Store configurations from a JSON file (one object or an array)")]
    Import { file: PathBuf },

    #[command(about = "Remove a configuration")]
    Delete { config_id: String },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    #[command(about = "List scheduled tasks")]
    List,

    #[command(about = "Schedule a task for one or more configurations")]
    Add {
        #[arg(long)]
        name: String,

        /// Five-field schedule, e.g. "0 3 * * *"
        #[arg(long, conflicts_with = "every", required_unless_present = "every")]
        schedule: Option<String>,

        /// Interval shorthand: minutes:N, hours:N, days:N, weekly:D, monthly:N
        #[arg(long)]
        every: Option<Interval>,

        #[arg(long = "config", required = true)]
        config_ids: Vec<String>,

        /// sync, fast or slow
        #[arg(long)]
        operation: OperationKind,

        #[arg(long)]
        disabled: bool,
    },

    #[command(about = "Change scheduled tasks")]
    Update {
        #[arg(required = true)]
        task_ids: Vec<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, conflicts_with = "every")]
        schedule: Option<String>,

        #[arg(long)]
        every: Option<Interval>,

        /// New configuration per task, in the order the ids were given
        #[arg(long = "config")]
        config_ids: Vec<String>,

        #[arg(long)]
        operation: Option<OperationKind>,

        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        #[arg(long)]
        disable: bool,
    },

    #[command(about = "Remove scheduled tasks")]
    Delete {
        #[arg(required = true)]
        task_ids: Vec<String>,
    },

    #[command(about = "Enable scheduled tasks")]
    Enable {
        #[arg(required = true)]
        task_ids: Vec<String>,
    },

    #[command(about = "Disable scheduled tasks")]
    Disable {
        #[arg(required = true)]
        task_ids: Vec<String>,
    },

    #[command(about = "Adopt tasks found in the job list and rewrite it")]
    Import,

    #[command(about = "Start a task now without waiting for its schedule")]
    Run { task_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_validate_defaults_to_fast() {
        let cli = Cli::try_parse_from(["strm-mirror", "validate", "3"]).unwrap();
        match cli.command {
            Commands::Validate { config_id, mode, task_id } => {
                assert_eq!(config_id, "3");
                assert_eq!(mode, ScanMode::Fast);
                assert!(task_id.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_scheduled_invocation_parses() {
        let cli = Cli::try_parse_from([
            "strm-mirror",
            "--home",
            "/srv/state",
            "validate",
            "1",
            "slow",
            "--task-id",
            "abc",
        ])
        .unwrap();
        assert_eq!(cli.home, Some(PathBuf::from("/srv/state")));
        assert!(matches!(
            cli.command,
            Commands::Validate { mode: ScanMode::Slow, task_id: Some(_), .. }
        ));
    }

    #[test]
    fn test_task_add_needs_a_schedule() {
        let missing = Cli::try_parse_from([
            "strm-mirror", "task", "add", "--name", "x", "--config", "1", "--operation", "sync",
        ]);
        assert!(missing.is_err());

        let cli = Cli::try_parse_from([
            "strm-mirror", "task", "add", "--name", "x", "--config", "1", "--config", "2",
            "--operation", "fast", "--every", "hours:6",
        ])
        .unwrap();
        match cli.command {
            Commands::Task {
                command: TaskCommand::Add { config_ids, every, operation, .. },
            } => {
                assert_eq!(config_ids, vec!["1", "2"]);
                assert_eq!(every, Some(Interval::Hours(6)));
                assert_eq!(operation, OperationKind::ValidateFast);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
