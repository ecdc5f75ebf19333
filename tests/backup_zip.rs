#[path = "../src/backup.rs"]
mod backup;

use rusqlite::Connection;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn seed_gradebook_db(path: &std::path::Path, counts: &[(&str, usize)]) {
    let conn = Connection::open(path).expect("open sqlite");
    conn.execute_batch(
        "CREATE TABLE records(
            collection TEXT NOT NULL,
            position INTEGER NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY(collection, position)
        )",
    )
    .expect("create records table");
    for (collection, n) in counts {
        for i in 0..*n {
            conn.execute(
                "INSERT INTO records(collection, position, body) VALUES(?, ?, '{}')",
                (collection, i as i64),
            )
            .expect("insert record");
        }
    }
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("gradebook-backup-src");
    let workspace2 = temp_dir("gradebook-backup-dst");
    let out_dir = temp_dir("gradebook-backup-out");

    let db_src = workspace.join("gradebook.sqlite3");
    seed_gradebook_db(&db_src, &[("students", 3), ("exams", 1)]);
    let bytes = std::fs::read(&db_src).expect("read source db");

    let bundle_path = out_dir.join("workspace.gbbackup.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.sha256.len(), 64);
    assert_eq!(export.record_counts.get("students"), Some(&3));
    assert_eq!(export.record_counts.get("results"), Some(&0));

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.sha256));
    archive
        .by_name("db/gradebook.sqlite3")
        .expect("database entry in bundle");
    let mut meta = String::new();
    archive
        .by_name("meta/workspace.json")
        .expect("workspace meta entry")
        .read_to_string(&mut meta)
        .expect("read workspace meta");
    let meta: serde_json::Value = serde_json::from_str(&meta).expect("parse workspace meta");
    assert_eq!(meta["recordCounts"]["students"].as_u64(), Some(3));
    assert_eq!(meta["recordCounts"]["exams"].as_u64(), Some(1));
    assert_eq!(meta["recordCounts"]["teachers"].as_u64(), Some(0));

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);
    assert_eq!(import.record_counts, export.record_counts);

    let restored = std::fs::read(workspace2.join("gradebook.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundle_is_rejected_and_existing_db_kept() {
    let out_dir = temp_dir("gradebook-backup-tampered");
    let workspace = temp_dir("gradebook-backup-tampered-dst");
    let existing = b"existing-db";
    std::fs::write(workspace.join("gradebook.sqlite3"), existing).expect("write existing db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = FileOptions::default();
        zip.start_file("manifest.json", opts).expect("start manifest");
        let manifest = serde_json::json!({
            "format": backup::BUNDLE_FORMAT_V1,
            "appVersion": "0.1.0",
            "exportedAt": "2026-01-05T08:00:00Z",
            "sha256": "0".repeat(64),
        });
        zip.write_all(manifest.to_string().as_bytes())
            .expect("write manifest");
        zip.start_file("db/gradebook.sqlite3", opts).expect("start db");
        zip.write_all(b"other-bytes").expect("write db");
        zip.finish().expect("finish zip");
    }

    let e = backup::import_workspace_bundle(&bundle_path, &workspace).expect_err("checksum");
    assert!(e.to_string().contains("checksum mismatch"));
    let kept = std::fs::read(workspace.join("gradebook.sqlite3")).expect("read kept db");
    assert_eq!(kept, existing);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn non_zip_input_is_rejected() {
    let out_dir = temp_dir("gradebook-backup-notzip");
    let workspace = temp_dir("gradebook-backup-notzip-dst");
    let bogus = out_dir.join("plain.sqlite3");
    std::fs::write(&bogus, b"not a zip").expect("write bogus file");

    assert!(backup::import_workspace_bundle(&bogus, &workspace).is_err());
    assert!(!workspace.join("gradebook.sqlite3").exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn export_refuses_a_file_that_is_not_a_gradebook() {
    let workspace = temp_dir("gradebook-backup-foreign");
    let out_dir = temp_dir("gradebook-backup-foreign-out");
    std::fs::write(workspace.join("gradebook.sqlite3"), b"plain text").expect("write file");

    let bundle_path = out_dir.join("foreign.zip");
    assert!(backup::export_workspace_bundle(&workspace, &bundle_path).is_err());
    assert!(!bundle_path.exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}
