//! Backends holding the job-list text. Every mutation reads the whole text
//! and replaces it in one write.

use crate::error::{Result, SchedulerError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait JobList: Send + Sync {
    /// Current text; an absent list reads as empty
    async fn read(&self) -> Result<String>;

    /// Replace the whole text
    async fn write(&self, text: &str) -> Result<()>;
}

/// The invoking user's crontab, through the `crontab` program
pub struct SystemCrontab {
    program: String,
}

impl SystemCrontab {
    pub fn new() -> Self {
        Self::with_program("crontab")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemCrontab {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobList for SystemCrontab {
    async fn read(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("-l")
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            return String::from_utf8(output.stdout)
                .map_err(|e| SchedulerError::JobList(format!("crontab is not UTF-8: {}", e)));
        }

        // `crontab -l` fails when the user has no crontab yet
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_ascii_lowercase().contains("no crontab") {
            debug!("No crontab installed yet");
            return Ok(String::new());
        }
        Err(SchedulerError::JobList(format!(
            "{} -l exited with {}: {}",
            self.program,
            output.status,
            stderr.trim()
        )))
    }

    async fn write(&self, text: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SchedulerError::JobList(format!(
                "{} - exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(bytes = text.len(), "Installed crontab");
        Ok(())
    }
}

/// A plain file, replaced atomically
pub struct FileJobList {
    path: PathBuf,
}

impl FileJobList {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl JobList for FileJobList {
    async fn read(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = self.path.with_file_name(format!(".{}.tmp", file_name));
        tokio::fs::write(&temp, text).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(path = ?self.path, "Wrote job list");
        Ok(())
    }
}

/// In-process job list for tests and dry runs
#[derive(Default)]
pub struct MemoryJobList {
    text: Mutex<String>,
}

impl MemoryJobList {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
        }
    }
}

#[async_trait]
impl JobList for MemoryJobList {
    async fn read(&self) -> Result<String> {
        Ok(self.text.lock().await.clone())
    }

    async fn write(&self, text: &str) -> Result<()> {
        *self.text.lock().await = text.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_job_list_round_trip() {
        let dir = TempDir::new().unwrap();
        let list = FileJobList::new(dir.path().join("state/jobs.crontab"));

        assert_eq!(list.read().await.unwrap(), "");
        list.write("0 0 * * * true\n").await.unwrap();
        assert_eq!(list.read().await.unwrap(), "0 0 * * * true\n");
        assert!(!dir.path().join("state/.jobs.crontab.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_crontab_program_is_an_error() {
        let list = SystemCrontab::with_program("/nonexistent/crontab-binary");
        assert!(list.read().await.is_err());
    }
}
