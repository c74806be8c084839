mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logging::LogConfig;
use output::{
    AddSourceOutput, BackupInfo, BackupOutput, ConfigOutput, DeleteBackupOutput, GcOutput,
    ListBackupsOutput, ListSourcesOutput, OutputWriter, RemoveSourceOutput, RemovedSource,
    RestoreOutput, SourceInfo, VerifyOutput,
};
use savesaver_core::{
    Backup, BackupEngine, BackupOptions, Config, ContentStore, DEFAULT_GC_GRACE, DEFAULT_SUBPATH,
    Error, GcOptions, Manifest, PathSpec, RestoreEngine, RestoreOptions, SchemaValidator, Source,
    SourceFilter, WorkerPool, anchor_pattern, check_pattern,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming the data directory.
const DATA_DIR_ENV: &str = "SAVESAVER_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "./save-saver-data";

/// Save Saver - back up and restore save data and configuration files
#[derive(Parser)]
#[command(name = "save-saver")]
#[command(about = "Back up and restore save data and configuration files", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory (defaults to SAVESAVER_DATA_DIR env var or ./save-saver-data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the data directory's config.toml
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Read and write the Sources document at this path
    #[arg(long, global = true)]
    sources_file: Option<PathBuf>,

    /// Read and write the Backups document at this path
    #[arg(long, global = true)]
    backups_file: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a source, or replace one with --force
    AddSource {
        /// Name of the source
        name: String,

        /// Another name the source answers to (repeatable)
        #[arg(short = 'A', long = "alias")]
        aliases: Vec<String>,

        /// Glob for the "data" subsection (repeatable)
        #[arg(short = 'D', long)]
        data: Vec<String>,

        /// Glob for the "saves" subsection (repeatable)
        #[arg(short = 'S', long)]
        saves: Vec<String>,

        /// Glob for the "config" subsection (repeatable)
        #[arg(short = 'C', long)]
        config: Vec<String>,

        /// Glob excluded from every subsection (repeatable)
        #[arg(short = 'x', long)]
        exclude: Vec<String>,

        /// Replace an existing source with the same name
        #[arg(short, long)]
        force: bool,
    },

    /// List sources
    ListSources {
        /// Include aliases
        #[arg(short = 'a', long)]
        aliases: bool,

        /// Include subsections and their patterns
        #[arg(short, long)]
        paths: bool,

        /// Only list names matching this regex (repeatable, all must match)
        #[arg(short, long = "include-regex")]
        include: Vec<String>,

        /// Skip names matching this regex (repeatable)
        #[arg(short = 'x', long = "exclude-regex")]
        exclude: Vec<String>,

        /// Reverse the listing order
        #[arg(short = 'I', long)]
        invert: bool,
    },

    /// Remove sources
    RemoveSource {
        /// Source names or aliases
        #[arg(required = true)]
        sources: Vec<String>,

        /// Only strip aliases, keeping the sources
        #[arg(short, long, conflicts_with = "with_backups")]
        alias_only: bool,

        /// Also delete every backup of the source
        #[arg(short = 'b', long)]
        with_backups: bool,
    },

    /// Back up one subsection of a source
    Backup {
        /// Source name or alias
        source: String,

        /// Subsection to back up
        #[arg(default_value = DEFAULT_SUBPATH)]
        subpath: String,

        /// Message stored with the backup
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// List the backups of a source, newest first
    ListBackups {
        /// Source name or alias
        source: String,

        /// Only this subsection
        subpath: Option<String>,

        /// Oldest first
        #[arg(short, long)]
        oldest: bool,

        /// How many backups to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },

    /// Restore a backup
    Restore {
        /// Backup uid
        uid: String,

        /// Restore under this directory instead of the original locations
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Delete a backup and its stored files
    DeleteBackup {
        /// Backup uid
        uid: String,
    },

    /// Delete backup directories that no backup record refers to
    Gc {
        /// Dry run - show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,

        /// Keep unrecorded directories modified within this many seconds,
        /// as they may belong to a backup that is still running
        #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_GC_GRACE.as_secs())]
        grace: u64,
    },

    /// Re-hash the stored files of a backup
    Verify {
        /// Backup uid
        uid: String,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(LogConfig {
        json: cli.log_json,
        verbose: cli.verbose,
    });
    let output = OutputWriter::new(cli.json);

    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.write_error(&err, 1);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    // Determine data dir: CLI arg > SAVESAVER_DATA_DIR env var > ./save-saver-data default
    let data_dir = cli
        .data_dir
        .or_else(|| std::env::var(DATA_DIR_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let mut config = match &cli.config_file {
        Some(path) => Config::load_file(&data_dir, path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load(&data_dir)
            .with_context(|| format!("Failed to load config from {}", data_dir.display()))?,
    };
    if let Some(path) = cli.sources_file {
        config.sources_file = Some(absolute(&path)?);
    }
    if let Some(path) = cli.backups_file {
        config.backups_file = Some(absolute(&path)?);
    }

    match cli.command {
        Commands::AddSource {
            name,
            aliases,
            data,
            saves,
            config: config_globs,
            exclude,
            force,
        } => {
            let subsections = [("data", data), ("saves", saves), ("config", config_globs)];
            cmd_add_source(&config, output, name, aliases, subsections, exclude, force)
        }
        Commands::ListSources {
            aliases,
            paths,
            include,
            exclude,
            invert,
        } => cmd_list_sources(
            &config,
            output,
            SourceFilter { include, exclude },
            invert,
            aliases,
            paths,
        ),
        Commands::RemoveSource {
            sources,
            alias_only,
            with_backups,
        } => cmd_remove_source(&config, output, &sources, alias_only, with_backups),
        Commands::Backup {
            source,
            subpath,
            message,
        } => cmd_backup(&config, output, &source, subpath, message),
        Commands::ListBackups {
            source,
            subpath,
            oldest,
            count,
        } => cmd_list_backups(&config, output, &source, subpath.as_deref(), oldest, count),
        Commands::Restore { uid, dest } => cmd_restore(&config, output, &uid, dest),
        Commands::DeleteBackup { uid } => cmd_delete_backup(&config, output, &uid),
        Commands::Gc { dry_run, grace } => {
            let options = GcOptions {
                dry_run,
                grace: Duration::from_secs(grace),
            };
            cmd_gc(&config, output, &options)
        }
        Commands::Verify { uid } => cmd_verify(&config, output, &uid),
        Commands::Config => cmd_config(&config, output),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path: {}", path.display()))
}

/// Anchor a relative glob at the current directory so the source means the
/// same files wherever the backup later runs from.
fn absolute_pattern(pattern: &str, cwd: &Path) -> String {
    let normalized = pattern.replace('\\', "/");
    if Path::new(&normalized).is_absolute() {
        normalized
    } else {
        anchor_pattern(&normalized, cwd)
    }
}

fn open_manifest(config: &Config) -> Result<Manifest> {
    let sources_file = config.sources_file();
    Manifest::open(&sources_file, config.backups_file(), Arc::new(SchemaValidator))
        .with_context(|| format!("Failed to load manifest from {}", sources_file.display()))
}

fn open_store(config: &Config) -> Result<ContentStore> {
    let root = config.backups_dir();
    ContentStore::init(&root)
        .with_context(|| format!("Failed to open backup store at {}", root.display()))
}

fn open_pool(config: &Config) -> Result<WorkerPool> {
    WorkerPool::new(config.workers()).context("Failed to start worker pool")
}

fn find_backup(manifest: &Manifest, uid: &str) -> Result<Backup> {
    let backups = manifest.backups();
    let backup = backups
        .find(uid)
        .with_context(|| format!("Failed to find backup {}", uid))?;
    Ok(backup.clone())
}

fn cmd_add_source(
    config: &Config,
    output: &OutputWriter,
    name: String,
    aliases: Vec<String>,
    subsections: [(&str, Vec<String>); 3],
    exclude: Vec<String>,
    force: bool,
) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let exclude: Vec<String> = exclude.iter().map(|p| absolute_pattern(p, &cwd)).collect();

    let mut source = Source::new(&name);
    for alias in aliases {
        source = source.with_alias(alias);
    }
    for (subsection, globs) in subsections {
        if globs.is_empty() {
            continue;
        }
        let spec = PathSpec {
            include: globs.iter().map(|p| absolute_pattern(p, &cwd)).collect(),
            exclude: exclude.clone(),
        };
        source = source.with_subsection(subsection, spec);
    }
    if source.paths.is_empty() {
        anyhow::bail!("At least one of --data, --saves or --config is required");
    }
    for spec in source.paths.values() {
        for pattern in spec.include.iter().chain(&spec.exclude) {
            check_pattern(pattern).with_context(|| format!("Invalid glob: {}", pattern))?;
        }
    }

    let manifest = open_manifest(config)?;
    let replaced = manifest
        .update_sources(|registry| {
            if !force && registry.iter().any(|s| s.name == source.name) {
                return Err(Error::invalid_value(format!(
                    "source {:?} already exists (use --force to replace it)",
                    source.name
                )));
            }
            registry.upsert(source.clone(), manifest.validator())
        })
        .with_context(|| format!("Failed to add source: {}", name))?;

    let data = AddSourceOutput {
        success: true,
        result_code: 0,
        name: source.name.clone(),
        replaced: replaced.is_some(),
        aliases: source.aliases.iter().cloned().collect(),
        subsections: source.paths.keys().cloned().collect(),
    };
    output.write(&data, || {
        let verb = if data.replaced { "Replaced" } else { "Added" };
        format!(
            "{} source {} ({})\n",
            verb,
            data.name,
            data.subsections.join(", ")
        )
    })
}

fn cmd_list_sources(
    config: &Config,
    output: &OutputWriter,
    filter: SourceFilter,
    invert: bool,
    aliases: bool,
    paths: bool,
) -> Result<()> {
    let manifest = open_manifest(config)?;
    let registry = manifest.sources();
    let names = registry
        .list(&filter, invert)
        .context("Failed to list sources")?;

    let mut sources = Vec::with_capacity(names.len());
    for name in names {
        let source = registry.get(name)?;
        sources.push(SourceInfo::new(source, aliases, paths));
    }

    let data = ListSourcesOutput {
        success: true,
        result_code: 0,
        sources,
    };
    output.write(&data, || {
        if data.sources.is_empty() {
            return "No sources (use 'save-saver add-source' to create one)\n".to_string();
        }
        let mut text = String::new();
        for info in &data.sources {
            text.push_str(&info.name);
            if let Some(aliases) = info.aliases.as_ref().filter(|a| !a.is_empty()) {
                text.push_str(&format!(" ({})", aliases.join(", ")));
            }
            text.push('\n');
            for (subsection, spec) in info.paths.iter().flatten() {
                text.push_str(&format!("  {}:\n", subsection));
                for pattern in &spec.include {
                    text.push_str(&format!("    + {}\n", pattern));
                }
                for pattern in &spec.exclude {
                    text.push_str(&format!("    - {}\n", pattern));
                }
            }
        }
        text
    })
}

fn cmd_remove_source(
    config: &Config,
    output: &OutputWriter,
    identifiers: &[String],
    alias_only: bool,
    with_backups: bool,
) -> Result<()> {
    let manifest = open_manifest(config)?;
    let mut removed = Vec::new();

    for identifier in identifiers {
        if alias_only {
            let (name, removed_aliases) = manifest
                .update_sources(|registry| {
                    let name = registry.get(identifier)?.name.clone();
                    Ok((name, registry.remove_aliases(identifier)?))
                })
                .with_context(|| format!("Failed to remove aliases of {}", identifier))?;
            removed.push(RemovedSource {
                name,
                removed_aliases,
                backups_deleted: 0,
                bytes_freed: 0,
            });
            continue;
        }

        let source = manifest
            .update_sources(|registry| registry.remove(identifier))
            .with_context(|| format!("Failed to remove source: {}", identifier))?;

        let mut entry = RemovedSource {
            name: source.name.clone(),
            removed_aliases: source.aliases.iter().cloned().collect(),
            backups_deleted: 0,
            bytes_freed: 0,
        };
        if with_backups {
            let store = open_store(config)?;
            let backups = manifest
                .update_backups(|index| Ok(index.remove_source(&source.name)))
                .with_context(|| format!("Failed to remove backups of {}", source.name))?;
            for backup in &backups {
                entry.bytes_freed += store
                    .remove_backup_dir(&backup.source, &backup.subpath, &backup.uid)
                    .with_context(|| format!("Failed to delete backup {}", backup.uid))?;
            }
            entry.backups_deleted = backups.len();
        }
        removed.push(entry);
    }

    let data = RemoveSourceOutput {
        success: true,
        result_code: 0,
        alias_only,
        removed,
    };
    output.write(&data, || {
        let mut text = String::new();
        for entry in &data.removed {
            if data.alias_only {
                text.push_str(&format!(
                    "Removed {} aliases from {}\n",
                    entry.removed_aliases.len(),
                    entry.name
                ));
            } else {
                text.push_str(&format!("Removed source: {}\n", entry.name));
                if entry.backups_deleted > 0 {
                    text.push_str(&format!(
                        "Deleted {} backups ({} bytes)\n",
                        entry.backups_deleted, entry.bytes_freed
                    ));
                }
            }
        }
        text
    })
}

fn cmd_backup(
    config: &Config,
    output: &OutputWriter,
    identifier: &str,
    subpath: String,
    message: String,
) -> Result<()> {
    let manifest = open_manifest(config)?;
    let engine = BackupEngine::new(open_store(config)?, open_pool(config)?)
        .with_hasher(config.hasher());

    // Snapshot so the registry stays writable while files are copied
    let registry = manifest.sources().clone();
    let options = BackupOptions {
        subpath,
        message,
        ..BackupOptions::default()
    };
    let report = engine
        .create_backup(&registry, identifier, &options)
        .with_context(|| format!("Failed to back up {}/{}", identifier, options.subpath))?;

    manifest
        .update_backups(|index| {
            index.insert(report.backup.clone());
            Ok(())
        })
        .context("Failed to record backup")?;

    let backup = &report.backup;
    let data = BackupOutput {
        success: true,
        result_code: 0,
        uid: backup.uid.clone(),
        source: backup.source.clone(),
        subpath: backup.subpath.clone(),
        date: backup.date.to_rfc3339(),
        message: backup.message.clone(),
        algorithm: backup.algorithm.to_string(),
        files: backup.file_count(),
        objects: backup.files.len(),
        skipped: report.skipped.clone(),
        skipped_patterns: report.skipped_patterns.clone(),
    };
    output.write(&data, || {
        let mut text = format!(
            "Backed up {} files ({} unique) from {}/{}\nBackup: {}\n",
            data.files, data.objects, data.source, data.subpath, data.uid
        );
        for skipped in &data.skipped {
            text.push_str(&format!(
                "Skipped {}: {}\n",
                skipped.path.display(),
                skipped.reason
            ));
        }
        for pattern in &data.skipped_patterns {
            text.push_str(&format!(
                "Skipped pattern {}: {}\n",
                pattern.pattern, pattern.reason
            ));
        }
        text
    })
}

fn cmd_list_backups(
    config: &Config,
    output: &OutputWriter,
    identifier: &str,
    subpath: Option<&str>,
    oldest: bool,
    count: usize,
) -> Result<()> {
    let manifest = open_manifest(config)?;

    // Records outlive their source, so fall back to the literal name
    let name = match manifest.sources().get(identifier) {
        Ok(source) => source.name.clone(),
        Err(_) => identifier.to_string(),
    };
    let backups: Vec<BackupInfo> = manifest
        .backups()
        .list(&name, subpath, oldest, Some(count))
        .into_iter()
        .map(BackupInfo::from)
        .collect();

    let data = ListBackupsOutput {
        success: true,
        result_code: 0,
        source: name,
        backups,
    };
    output.write(&data, || {
        if data.backups.is_empty() {
            return format!("No backups of {}\n", data.source);
        }
        let mut text = String::new();
        for backup in &data.backups {
            text.push_str(&format!(
                "{}  {}  {}  {} files",
                backup.uid, backup.date, backup.subpath, backup.files
            ));
            if !backup.message.is_empty() {
                text.push_str(&format!("  {}", backup.message));
            }
            text.push('\n');
        }
        text
    })
}

fn cmd_restore(
    config: &Config,
    output: &OutputWriter,
    uid: &str,
    dest: Option<PathBuf>,
) -> Result<()> {
    let manifest = open_manifest(config)?;
    let backup = find_backup(&manifest, uid)?;
    let dest_root = dest.as_deref().map(absolute).transpose()?;

    let engine = RestoreEngine::new(open_store(config)?, open_pool(config)?);
    let options = RestoreOptions {
        dest_root,
        ..RestoreOptions::default()
    };
    let report = engine
        .restore(&backup, &options)
        .with_context(|| format!("Failed to restore backup {}", uid))?;

    let complete = report.is_complete();
    let data = RestoreOutput {
        success: complete,
        result_code: if complete { 0 } else { 1 },
        uid: backup.uid.clone(),
        restored: report.restored,
        failed: report.failed,
    };
    output.write(&data, || {
        let mut text = format!("Restored {} files from {}\n", data.restored, data.uid);
        for failed in &data.failed {
            match &failed.destination {
                Some(dest) => text.push_str(&format!(
                    "Failed {} -> {}: {}\n",
                    failed.key,
                    dest.display(),
                    failed.reason
                )),
                None => text.push_str(&format!("Failed {}: {}\n", failed.key, failed.reason)),
            }
        }
        text
    })?;

    if !complete {
        anyhow::bail!("{} entries of backup {} were not restored", data.failed.len(), uid);
    }
    Ok(())
}

fn cmd_delete_backup(config: &Config, output: &OutputWriter, uid: &str) -> Result<()> {
    let manifest = open_manifest(config)?;
    let store = open_store(config)?;

    let backup = manifest
        .update_backups(|index| index.remove(uid))
        .with_context(|| format!("Failed to delete backup {}", uid))?;
    let bytes_freed = store
        .remove_backup_dir(&backup.source, &backup.subpath, &backup.uid)
        .with_context(|| format!("Failed to delete stored files of backup {}", uid))?;

    let data = DeleteBackupOutput {
        success: true,
        result_code: 0,
        uid: backup.uid,
        bytes_freed,
    };
    output.write(&data, || {
        format!("Deleted backup {} ({} bytes freed)\n", data.uid, data.bytes_freed)
    })
}

fn cmd_gc(config: &Config, output: &OutputWriter, options: &GcOptions) -> Result<()> {
    let manifest = open_manifest(config)?;
    let store = open_store(config)?;

    let stats = store
        .gc(&manifest.backups(), options)
        .context("Failed to run garbage collection")?;

    let data = GcOutput {
        success: true,
        result_code: 0,
        dry_run: options.dry_run,
        directories_deleted: stats.directories_deleted,
        bytes_freed: stats.bytes_freed,
        directories_recent: stats.directories_recent,
    };
    output.write(&data, || {
        let mut text = if data.dry_run {
            format!(
                "Dry run - nothing deleted\nWould delete {} backup directories\nWould free {} bytes\n",
                data.directories_deleted, data.bytes_freed
            )
        } else {
            format!(
                "Deleted {} backup directories\nFreed {} bytes\n",
                data.directories_deleted, data.bytes_freed
            )
        };
        if data.directories_recent > 0 {
            text.push_str(&format!(
                "Kept {} recently modified directories (possibly running backups)\n",
                data.directories_recent
            ));
        }
        text
    })
}

fn cmd_verify(config: &Config, output: &OutputWriter, uid: &str) -> Result<()> {
    let manifest = open_manifest(config)?;
    let backup = find_backup(&manifest, uid)?;

    let engine = BackupEngine::new(open_store(config)?, open_pool(config)?);
    let report = engine
        .verify(&backup)
        .with_context(|| format!("Failed to verify backup {}", uid))?;

    let ok = report.is_ok();
    let data = VerifyOutput {
        success: ok,
        result_code: if ok { 0 } else { 1 },
        uid: backup.uid.clone(),
        report,
    };
    output.write(&data, || {
        let mut text = format!("Checked {} stored files of {}\n", data.report.checked, data.uid);
        for key in &data.report.missing {
            text.push_str(&format!("Missing: {}\n", key));
        }
        for key in &data.report.corrupted {
            text.push_str(&format!("Corrupted: {}\n", key));
        }
        text
    })?;

    if !ok {
        anyhow::bail!("Backup {} failed verification", uid);
    }
    Ok(())
}

fn cmd_config(config: &Config, output: &OutputWriter) -> Result<()> {
    let config_file = config.config_file();
    let data = ConfigOutput {
        success: true,
        result_code: 0,
        data_dir: config.data_dir.display().to_string(),
        config_file_exists: config_file.is_file(),
        config_file: config_file.display().to_string(),
        sources_file: config.sources_file().display().to_string(),
        backups_file: config.backups_file().display().to_string(),
        backups_dir: config.backups_dir().display().to_string(),
        algorithm: config.algorithm.to_string(),
        workers: config.workers(),
    };
    output.write(&data, || {
        format!(
            "Data directory: {}\nConfig file: {}{}\nSources file: {}\nBackups file: {}\nBackups directory: {}\nAlgorithm: {}\nWorkers: {}\n",
            data.data_dir,
            data.config_file,
            if data.config_file_exists { "" } else { " (not present)" },
            data.sources_file,
            data.backups_file,
            data.backups_dir,
            data.algorithm,
            data.workers
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn absolute_pattern_anchors_relative_globs() {
        let cwd = Path::new("/home/user/games");
        assert_eq!(absolute_pattern("save/*.dat", cwd), "/home/user/games/save/*.dat");
        assert_eq!(absolute_pattern("./save/*", cwd), "/home/user/games/save/*");
        assert_eq!(absolute_pattern("/abs/**", cwd), "/abs/**");
    }

    #[test]
    fn absolute_pattern_escapes_cwd() {
        let cwd = Path::new("/home/user/Games [GOTY]");
        let pattern = absolute_pattern("save/*.dat", cwd);
        assert_eq!(pattern, "/home/user/Games [[]GOTY[]]/save/*.dat");
        assert!(check_pattern(&pattern).is_ok());

        let pattern = absolute_pattern("*.dat", Path::new("/saves {old"));
        assert!(check_pattern(&pattern).is_ok());
    }

    #[test]
    fn backup_defaults_to_data_subsection() {
        let cli = Cli::try_parse_from(["save-saver", "backup", "game1"]).unwrap();
        match cli.command {
            Commands::Backup {
                source,
                subpath,
                message,
            } => {
                assert_eq!(source, "game1");
                assert_eq!(subpath, "data");
                assert!(message.is_empty());
            }
            _ => panic!("expected backup command"),
        }
    }

    #[test]
    fn gc_grace_defaults_to_an_hour() {
        let cli = Cli::try_parse_from(["save-saver", "gc"]).unwrap();
        assert!(matches!(cli.command, Commands::Gc { dry_run: false, grace: 3600 }));

        let cli = Cli::try_parse_from(["save-saver", "gc", "--grace", "0", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Commands::Gc { dry_run: true, grace: 0 }));
    }

    #[test]
    fn config_file_is_global() {
        let cli = Cli::try_parse_from(["save-saver", "config", "--config-file", "/etc/ss.toml"])
            .unwrap();
        assert_eq!(cli.config_file, Some(PathBuf::from("/etc/ss.toml")));
    }

    #[test]
    fn remove_source_flags_conflict() {
        let result = Cli::try_parse_from([
            "save-saver",
            "remove-source",
            "game1",
            "--alias-only",
            "--with-backups",
        ]);
        assert!(result.is_err());
    }
}
