//! End-to-end backup and restore through the public API.

use savesaver_core::{
    BackupEngine, BackupOptions, Config, ContentStore, Error, FileEntry, GcOptions, Manifest,
    PathSpec, ResolveOptions, RestoreEngine, RestoreOptions, SchemaValidator, Source, WorkerPool,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Setup {
    _temp_dir: TempDir,
    games: std::path::PathBuf,
    config: Config,
    manifest: Manifest,
    backups: BackupEngine,
    restores: RestoreEngine,
}

fn setup() -> Setup {
    let temp_dir = TempDir::new().unwrap();
    let games = temp_dir.path().join("games");
    fs::create_dir_all(games.join("save")).unwrap();

    let config = Config::load(temp_dir.path().join("data")).unwrap();
    let manifest = Manifest::open(
        config.sources_file(),
        config.backups_file(),
        Arc::new(SchemaValidator),
    )
    .unwrap();
    let store = ContentStore::init(config.backups_dir()).unwrap();
    let pool = WorkerPool::new(4).unwrap();

    Setup {
        games,
        config,
        manifest,
        backups: BackupEngine::new(store.clone(), pool.clone()),
        restores: RestoreEngine::new(store, pool),
        _temp_dir: temp_dir,
    }
}

fn options(cwd: &Path) -> BackupOptions {
    BackupOptions {
        message: "before boss fight".into(),
        resolve: ResolveOptions {
            cwd: Some(cwd.to_path_buf()),
            ..ResolveOptions::default()
        },
        ..BackupOptions::default()
    }
}

fn add_game1(setup: &Setup) {
    setup
        .manifest
        .update_sources(|registry| {
            registry.upsert(
                Source::new("game1")
                    .with_alias("g1")
                    .with_subsection("data", PathSpec::include("save/*.dat")),
                &SchemaValidator,
            )
        })
        .unwrap();
}

#[test]
fn test_identical_saves_restore_to_fresh_directory() {
    let setup = setup();
    add_game1(&setup);
    fs::write(setup.games.join("save/1.dat"), b"X").unwrap();
    fs::write(setup.games.join("save/2.dat"), b"X").unwrap();

    let registry = setup.manifest.sources().clone();
    let report = setup
        .backups
        .create_backup(&registry, "game1", &options(&setup.games))
        .unwrap();
    let backup = report.backup;
    setup
        .manifest
        .update_backups(|index| {
            index.insert(backup.clone());
            Ok(())
        })
        .unwrap();

    // One key, both paths
    assert_eq!(backup.files.len(), 1);
    let entry = backup.files.values().next().unwrap();
    assert!(matches!(entry, FileEntry::Multiple(paths) if paths.len() == 2));

    let fresh = setup.games.join("fresh");
    let restored = setup
        .restores
        .restore(
            &backup,
            &RestoreOptions {
                dest_root: Some(fresh.clone()),
                ..RestoreOptions::default()
            },
        )
        .unwrap();
    assert_eq!(restored.restored, 2);

    let mut restored_files = Vec::new();
    for original in entry.paths() {
        let relative: std::path::PathBuf = original
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect();
        restored_files.push(fs::read(fresh.join(relative)).unwrap());
    }
    assert_eq!(restored_files, vec![b"X".to_vec(), b"X".to_vec()]);
}

#[test]
fn test_restore_in_place_after_change() {
    let setup = setup();
    add_game1(&setup);
    let save = setup.games.join("save/slot.dat");
    fs::write(&save, b"level 3").unwrap();

    let registry = setup.manifest.sources().clone();
    let backup = setup
        .backups
        .create_backup(&registry, "g1", &options(&setup.games))
        .unwrap()
        .backup;

    fs::write(&save, b"level 1, corrupted").unwrap();
    let report = setup
        .restores
        .restore(&backup, &RestoreOptions::default())
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(fs::read(&save).unwrap(), b"level 3");
}

#[test]
fn test_rebackup_is_idempotent() {
    let setup = setup();
    add_game1(&setup);
    fs::write(setup.games.join("save/a.dat"), b"alpha").unwrap();
    fs::write(setup.games.join("save/b.dat"), b"beta").unwrap();

    let registry = setup.manifest.sources().clone();
    let first = setup
        .backups
        .create_backup(&registry, "game1", &options(&setup.games))
        .unwrap()
        .backup;
    let second = setup
        .backups
        .create_backup(&registry, "game1", &options(&setup.games))
        .unwrap()
        .backup;

    assert_ne!(first.uid, second.uid);
    assert_eq!(first.files, second.files);
    for backup in [&first, &second] {
        assert!(setup.backups.verify(backup).unwrap().is_ok());
    }
}

#[test]
fn test_manifest_survives_reopen_and_gc() {
    let setup = setup();
    add_game1(&setup);
    fs::write(setup.games.join("save/a.dat"), b"alpha").unwrap();

    let registry = setup.manifest.sources().clone();
    let kept = setup
        .backups
        .create_backup(&registry, "game1", &options(&setup.games))
        .unwrap()
        .backup;
    // Never recorded, as after a crash between store and save
    let orphan = setup
        .backups
        .create_backup(&registry, "game1", &options(&setup.games))
        .unwrap()
        .backup;
    setup
        .manifest
        .update_backups(|index| {
            index.insert(kept.clone());
            Ok(())
        })
        .unwrap();

    let reopened = Manifest::open(
        setup.config.sources_file(),
        setup.config.backups_file(),
        Arc::new(SchemaValidator),
    )
    .unwrap();
    assert_eq!(reopened.sources().get("g1").unwrap().name, "game1");
    assert_eq!(reopened.backups().find(&kept.uid).unwrap(), &kept);

    let store = setup.backups.store();
    let options = GcOptions {
        grace: Duration::ZERO,
        ..GcOptions::default()
    };
    let stats = store.gc(&reopened.backups(), &options).unwrap();
    assert_eq!(stats.directories_deleted, 1);
    assert!(!store.backup_dir("game1", "data", &orphan.uid).unwrap().exists());
    assert!(setup.backups.verify(&kept).unwrap().is_ok());
}

#[test]
fn test_missing_source_and_subsection() {
    let setup = setup();
    add_game1(&setup);
    let registry = setup.manifest.sources().clone();

    let err = setup
        .backups
        .create_backup(&registry, "missing", &options(&setup.games))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue { .. }));

    let mut opts = options(&setup.games);
    opts.subpath = "config".into();
    let err = setup
        .backups
        .create_backup(&registry, "game1", &opts)
        .unwrap_err();
    assert!(err.is_not_found());
}
