// ABOUTME: End-to-end smoke test for the full intray storage lifecycle.
// ABOUTME: Covers flat-file use, switching to SQLite with auto-migration, dual writing, audits and rollback.

use intray_core::{ListFilter, NewNotification, NotificationState};
use intray_store::{
    Backend, Effects, ErrorKind, Health, NotificationStore, StorageConfig, open_backend,
    open_dual_writer, rollback_migration,
};

#[test]
fn smoke_test_full_lifecycle() {
    // 1. Start on the flat file
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = StorageConfig::in_dir(dir.path());
    assert_eq!(config.backend, Backend::Tsv);
    let tsv = open_backend(&config, Effects::none()).unwrap();

    // 2. Add, read, dismiss
    let first = tsv
        .add(
            NewNotification::new("build failed\tsee log", "error")
                .with_location("$0", "@1", "%2")
                .with_pane_created("1712345678"),
        )
        .unwrap();
    let second = tsv.add(NewNotification::new("tests passed", "info")).unwrap();
    let third = tsv
        .add(NewNotification::new("old news", "warning").with_timestamp("2020-01-01T00:00:00Z"))
        .unwrap();
    assert_eq!((first, second, third), (1, 2, 3));

    tsv.mark_read(first).unwrap();
    tsv.dismiss(third).unwrap();
    assert_eq!(tsv.dismiss(third).unwrap_err().kind(), ErrorKind::AlreadyDismissed);
    assert_eq!(tsv.active_count().unwrap(), 2);

    let line = tsv.get_line("1").unwrap();
    assert!(line.contains("build failed\\tsee log"));
    let flat_snapshot = tsv.list_tsv(&ListFilter::all()).unwrap();
    drop(tsv);

    // 3. Switch to SQLite: the flat file is migrated on first open
    config.backend = Backend::Sqlite;
    let sqlite = open_backend(&config, Effects::none()).unwrap();
    assert!(config.sqlite_path().exists());
    assert_eq!(sqlite.list_tsv(&ListFilter::all()).unwrap(), flat_snapshot);

    // 4. Cleanup removes the old dismissed row; ids keep increasing
    let outcome = sqlite.cleanup_old_notifications(30, false).unwrap();
    assert_eq!(outcome.deleted, 1);
    let fourth = sqlite.add(NewNotification::new("after migration", "critical")).unwrap();
    assert_eq!(fourth, 4);
    drop(sqlite);

    // 5. Roll back: the flat file returns to its pre-migration contents
    rollback_migration(&config.tsv_path(), &config.sqlite_path(), None).unwrap();
    assert!(!config.sqlite_path().exists());
    config.backend = Backend::Tsv;
    let tsv = open_backend(&config, Effects::none()).unwrap();
    assert_eq!(tsv.list_tsv(&ListFilter::all()).unwrap(), flat_snapshot);
    drop(tsv);

    // 6. Dual mode: the writer imports the flat file into the fresh database
    config.backend = Backend::Dual;
    let dual = open_dual_writer(&config, Effects::none()).unwrap();
    assert_eq!(dual.health(), Health::Healthy);

    let fifth = dual.add(NewNotification::new("dual write", "info")).unwrap();
    assert_eq!(fifth, 4);
    dual.dismiss_all().unwrap();
    let dismissed = dual
        .list(&ListFilter::parse("dismissed", "", "", "", "", "", "", "").unwrap())
        .unwrap();
    assert_eq!(dismissed.len(), 4);
    assert!(dismissed.iter().all(|n| n.state == NotificationState::Dismissed));

    let report = dual.verify_consistency(25).unwrap();
    assert!(report.consistent, "report: {:?}", report);
    report.ensure_consistent().unwrap();
}
