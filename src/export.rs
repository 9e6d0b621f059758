//! CSV export of records and ZIP bulk download of stored images.
//!
//! Both exports are built fully in memory (a studio's history is a few
//! thousand rows and a few hundred photos) and either written to a file
//! from the CLI or returned as a response body by the server.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

use crate::blobs::BlobStore;
use crate::models::CustomerRecord;
use crate::store;

const CSV_HEADER: &str = "id,business_id,customer_name,phone,email,program,work_date,status,notes,customer_image,work_image,created_at,updated_at";

/// Render all records as CSV, newest first.
pub async fn records_csv(pool: &SqlitePool) -> Result<String> {
    let records = store::list(pool).await?;

    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for record in &records {
        out.push_str(&record_csv_row(record));
        out.push('\n');
    }
    Ok(out)
}

fn record_csv_row(r: &CustomerRecord) -> String {
    let fields = [
        r.id.to_string(),
        r.business_id.clone(),
        r.customer_name.clone(),
        r.phone.clone().unwrap_or_default(),
        r.email.clone().unwrap_or_default(),
        r.program.as_str().to_string(),
        r.work_date.clone(),
        r.status.as_str().to_string(),
        r.notes.clone().unwrap_or_default(),
        r.customer_image.clone().unwrap_or_default(),
        r.work_image.clone().unwrap_or_default(),
        format_ts(r.created_at),
        format_ts(r.updated_at),
    ];
    fields
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Quote a field when it contains a comma, quote, or newline (RFC 4180).
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// CLI entry: write the CSV to a file, or stdout when no path is given.
pub async fn run_export_csv(pool: &SqlitePool, output: Option<&Path>) -> Result<()> {
    let csv = records_csv(pool).await?;
    let rows = csv.lines().count().saturating_sub(1);

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &csv)?;
            eprintln!("Exported {} records to {}", rows, path.display());
        }
        None => {
            print!("{}", csv);
        }
    }
    Ok(())
}

/// Build a ZIP archive of every stored image.
pub fn images_zip(blobs: &BlobStore) -> Result<Vec<u8>> {
    let names = blobs.list()?;

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for name in &names {
        let bytes = blobs
            .load(name)
            .with_context(|| format!("failed to read image for archive: {}", name))?;
        zip.start_file(name.clone(), options)?;
        zip.write_all(&bytes)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// CLI entry: write the image archive to a file.
pub fn run_export_images(blobs: &BlobStore, output: &Path) -> Result<()> {
    let count = blobs.list()?.len();
    let archive = images_zip(blobs)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &archive)?;
    eprintln!("Exported {} images to {}", count, output.display());
    Ok(())
}
