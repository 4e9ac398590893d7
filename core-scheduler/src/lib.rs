//! # Task Scheduler Module
//!
//! Schedules mirror runs as lines of a cron-style job list.
//!
//! ## Components
//!
//! - **Codec** (`codec`): `TaskDescriptor` ⇄ job-list line, plus whole-text
//!   list/add/update/delete
//! - **Schedule** (`schedule`): five-field schedules and friendly intervals
//! - **Job List** (`job_list`): system crontab, plain file and in-memory backends
//! - **Store** (`store`): structured task records in the settings store
//! - **Manager** (`manager`): task operations keeping store and job list in step

pub mod codec;
pub mod error;
pub mod job_list;
pub mod manager;
pub mod schedule;
pub mod store;

pub use codec::{decode, encode, CommandTemplate, OperationKind, TaskDescriptor};
pub use error::{Result, SchedulerError};
pub use job_list::{FileJobList, JobList, MemoryJobList, SystemCrontab};
pub use manager::{NewTasks, TaskManager, TaskUpdate};
pub use schedule::{normalize_schedule, Interval};
pub use store::TaskRepository;
