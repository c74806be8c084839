//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use savesaver_core::{
    Backup, FailedRestore, PathSpec, SkippedFile, SkippedPattern, Source, VerifyReport,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `data` parameter must be a serializable struct that includes
    /// `success: bool` and `result_code: u8` fields.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the error chain.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `add-source` command.
#[derive(Debug, Serialize)]
pub struct AddSourceOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub replaced: bool,
    pub aliases: Vec<String>,
    pub subsections: Vec<String>,
}

/// One row of `list-sources`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<BTreeMap<String, PathSpec>>,
}

impl SourceInfo {
    pub fn new(source: &Source, aliases: bool, paths: bool) -> Self {
        Self {
            name: source.name.clone(),
            aliases: aliases.then(|| source.aliases.iter().cloned().collect()),
            paths: paths.then(|| source.paths.clone()),
        }
    }
}

/// Output for `list-sources` command.
#[derive(Debug, Serialize)]
pub struct ListSourcesOutput {
    pub success: bool,
    pub result_code: u8,
    pub sources: Vec<SourceInfo>,
}

/// One source handled by `remove-source`.
#[derive(Debug, Clone, Serialize)]
pub struct RemovedSource {
    pub name: String,
    pub removed_aliases: Vec<String>,
    pub backups_deleted: usize,
    pub bytes_freed: u64,
}

/// Output for `remove-source` command.
#[derive(Debug, Serialize)]
pub struct RemoveSourceOutput {
    pub success: bool,
    pub result_code: u8,
    pub alias_only: bool,
    pub removed: Vec<RemovedSource>,
}

/// Output for `backup` command.
#[derive(Debug, Serialize)]
pub struct BackupOutput {
    pub success: bool,
    pub result_code: u8,
    pub uid: String,
    pub source: String,
    pub subpath: String,
    pub date: String,
    pub message: String,
    pub algorithm: String,
    pub files: usize,
    pub objects: usize,
    pub skipped: Vec<SkippedFile>,
    pub skipped_patterns: Vec<SkippedPattern>,
}

/// One row of `list-backups`.
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub uid: String,
    pub date: String,
    pub message: String,
    pub subpath: String,
    pub files: usize,
}

impl From<&Backup> for BackupInfo {
    fn from(backup: &Backup) -> Self {
        Self {
            uid: backup.uid.clone(),
            date: backup.date.to_rfc3339(),
            message: backup.message.clone(),
            subpath: backup.subpath.clone(),
            files: backup.file_count(),
        }
    }
}

/// Output for `list-backups` command.
#[derive(Debug, Serialize)]
pub struct ListBackupsOutput {
    pub success: bool,
    pub result_code: u8,
    pub source: String,
    pub backups: Vec<BackupInfo>,
}

/// Output for `restore` command.
#[derive(Debug, Serialize)]
pub struct RestoreOutput {
    pub success: bool,
    pub result_code: u8,
    pub uid: String,
    pub restored: usize,
    pub failed: Vec<FailedRestore>,
}

/// Output for `delete-backup` command.
#[derive(Debug, Serialize)]
pub struct DeleteBackupOutput {
    pub success: bool,
    pub result_code: u8,
    pub uid: String,
    pub bytes_freed: u64,
}

/// Output for `gc` command.
#[derive(Debug, Serialize)]
pub struct GcOutput {
    pub success: bool,
    pub result_code: u8,
    pub dry_run: bool,
    pub directories_deleted: usize,
    pub bytes_freed: u64,
    pub directories_recent: usize,
}

/// Output for `verify` command.
#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub success: bool,
    pub result_code: u8,
    pub uid: String,
    #[serde(flatten)]
    pub report: VerifyReport,
}

/// Output for `config` command.
#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    pub success: bool,
    pub result_code: u8,
    pub data_dir: String,
    pub config_file: String,
    pub config_file_exists: bool,
    pub sources_file: String,
    pub backups_file: String,
    pub backups_dir: String,
    pub algorithm: String,
    pub workers: usize,
}
