use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/gradebook.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
const DB_FILE_NAME: &str = "gradebook.sqlite3";
const COLLECTIONS: [&str; 4] = ["students", "teachers", "exams", "results"];
pub const BUNDLE_FORMAT_V1: &str = "gradebook-workspace-v1";

/// Stored records per collection. Every known collection is present, with
/// zero for one that was never written.
pub type RecordCounts = BTreeMap<String, u64>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    app_version: String,
    exported_at: DateTime<Utc>,
    sha256: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceMeta {
    source_workspace: String,
    record_counts: RecordCounts,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub sha256: String,
    pub record_counts: RecordCounts,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub exported_at: DateTime<Utc>,
    pub record_counts: RecordCounts,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

// Opening read-only also proves the file is a gradebook database before it
// gets bundled.
fn record_counts(db_path: &Path) -> anyhow::Result<RecordCounts> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("cannot open {}", db_path.display()))?;
    let mut stmt = conn
        .prepare("SELECT collection, COUNT(*) FROM records GROUP BY collection")
        .context("not a gradebook database")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;

    let mut counts: RecordCounts = COLLECTIONS.iter().map(|c| (c.to_string(), 0)).collect();
    for row in rows {
        let (collection, n) = row?;
        counts.insert(collection, u64::try_from(n)?);
    }
    Ok(counts)
}

fn write_json_entry<W, T>(zip: &mut ZipWriter<W>, name: &str, value: &T) -> anyhow::Result<()>
where
    W: Write + std::io::Seek,
    T: Serialize,
{
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, opts)
        .with_context(|| format!("cannot start {name}"))?;
    let text =
        serde_json::to_string_pretty(value).with_context(|| format!("cannot encode {name}"))?;
    zip.write_all(text.as_bytes())
        .with_context(|| format!("cannot write {name}"))
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    archive
        .by_name(name)
        .with_context(|| format!("bundle has no {name}"))?
        .read_to_end(&mut bytes)
        .with_context(|| format!("cannot read {name}"))?;
    Ok(bytes)
}

/// Writes the workspace database into a zip bundle at `out_path`.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("no gradebook database in {}", workspace_path.display());
    }
    let counts = record_counts(&db_path)?;
    let db_bytes =
        std::fs::read(&db_path).with_context(|| format!("cannot read {}", db_path.display()))?;
    let checksum = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let out_file =
        File::create(out_path).with_context(|| format!("cannot create {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);

    write_json_entry(
        &mut zip,
        MANIFEST_ENTRY,
        &Manifest {
            format: BUNDLE_FORMAT_V1.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            sha256: checksum.clone(),
        },
    )?;

    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(DB_ENTRY, opts)
        .with_context(|| format!("cannot start {DB_ENTRY}"))?;
    zip.write_all(&db_bytes)
        .with_context(|| format!("cannot write {DB_ENTRY}"))?;

    write_json_entry(
        &mut zip,
        META_WORKSPACE_ENTRY,
        &WorkspaceMeta {
            source_workspace: workspace_path.to_string_lossy().to_string(),
            record_counts: counts.clone(),
        },
    )?;
    zip.finish().context("cannot finish zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
        sha256: checksum,
        record_counts: counts,
    })
}

/// Restores a bundle into `workspace_path`, replacing its database.
///
/// The database entry must match the manifest checksum; a mismatch leaves the
/// existing database untouched.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let in_file =
        File::open(in_path).with_context(|| format!("cannot open {}", in_path.display()))?;
    let mut archive = ZipArchive::new(in_file).context("not a zip bundle")?;

    let manifest: Manifest = serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)
        .with_context(|| format!("{MANIFEST_ENTRY} is malformed"))?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", manifest.format);
    }

    let db_bytes = read_entry(&mut archive, DB_ENTRY)?;
    let expected = manifest.sha256.to_ascii_lowercase();
    let actual = sha256_hex(&db_bytes);
    if actual != expected {
        return Err(anyhow!(
            "database checksum mismatch: expected {}, got {}",
            expected,
            actual
        ));
    }

    let meta_bytes = read_entry(&mut archive, META_WORKSPACE_ENTRY)?;
    let meta: WorkspaceMeta = serde_json::from_slice(&meta_bytes)
        .with_context(|| format!("{META_WORKSPACE_ENTRY} is malformed"))?;

    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("cannot create {}", workspace_path.display()))?;
    let dst = workspace_path.join(DB_FILE_NAME);
    let staging = workspace_path.join(format!("{DB_FILE_NAME}.importing"));
    let _ = std::fs::remove_file(&staging);
    {
        let mut out = File::create(&staging)
            .with_context(|| format!("cannot create {}", staging.display()))?;
        out.write_all(&db_bytes)
            .and_then(|_| out.flush())
            .with_context(|| format!("cannot write {}", staging.display()))?;
    }
    std::fs::rename(&staging, &dst)
        .with_context(|| format!("cannot replace {}", dst.display()))?;

    Ok(ImportSummary {
        bundle_format_detected: manifest.format,
        exported_at: manifest.exported_at,
        record_counts: meta.record_counts,
    })
}
