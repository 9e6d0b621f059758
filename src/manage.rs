//! CLI entry points for the management flow: record creation, listing,
//! lookup, text search, status changes, photo attachment, and the
//! "find similar artwork" search.
//!
//! Each function connects, runs one operation through the store, prints a
//! human-readable result, and closes the pool.

use anyhow::{bail, Result};
use std::path::Path;

use crate::blobs::BlobStore;
use crate::config::Config;
use crate::db;
use crate::models::{CustomerRecord, JobStatus, MatchType, NewRecord, ProgramType};
use crate::similarity::{self, Candidate};
use crate::store;

pub async fn run_add(
    config: &Config,
    name: &str,
    program: &str,
    work_date: &str,
    phone: Option<String>,
    email: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let program = ProgramType::parse(program).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown program: '{}'. Use wheel, handbuilding, paint_your_own, or glaze.",
            program
        )
    })?;

    let pool = db::connect(config).await?;
    let record = store::create(
        &pool,
        &NewRecord {
            customer_name: name.to_string(),
            phone,
            email,
            program,
            work_date: work_date.to_string(),
            notes,
        },
    )
    .await?;
    pool.close().await;

    println!("created record {} ({})", record.id, record.business_id);
    Ok(())
}

pub async fn run_list(config: &Config, status: Option<String>, limit: Option<usize>) -> Result<()> {
    let status = status
        .as_deref()
        .map(|s| {
            JobStatus::parse(s).ok_or_else(|| anyhow::anyhow!("Unknown status: '{}'.", s))
        })
        .transpose()?;

    let pool = db::connect(config).await?;
    let mut records = store::list(&pool).await?;
    pool.close().await;

    if let Some(status) = status {
        records.retain(|r| r.status == status);
    }
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }
    for record in &records {
        print_record_line(record);
    }
    Ok(())
}

pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let record = store::get(&pool, id).await?;
    pool.close().await;

    let Some(record) = record else {
        bail!("record not found: {}", id);
    };

    println!("--- Record ---");
    println!("id:           {}", record.id);
    println!("business_id:  {}", record.business_id);
    println!("customer:     {}", record.customer_name);
    if let Some(ref phone) = record.phone {
        println!("phone:        {}", phone);
    }
    if let Some(ref email) = record.email {
        println!("email:        {}", email);
    }
    println!("program:      {}", record.program.as_str());
    println!("work_date:    {}", record.work_date);
    println!("status:       {}", record.status.as_str());
    if let Some(ref notes) = record.notes {
        println!("notes:        {}", notes);
    }
    if let Some(ref image) = record.customer_image {
        println!("intake photo: {}", image);
    }
    if let Some(ref image) = record.work_image {
        println!("work photo:   {}", image);
    }
    Ok(())
}

pub async fn run_search(config: &Config, query: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let records = store::search(&pool, query).await?;
    pool.close().await;

    if records.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for record in &records {
        print_record_line(record);
    }
    Ok(())
}

pub async fn run_status(config: &Config, id: i64, status: &str) -> Result<()> {
    let status = JobStatus::parse(status).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown status: '{}'. Use received, in_progress, fired, ready, or picked_up.",
            status
        )
    })?;

    let pool = db::connect(config).await?;
    let record = store::update_status(&pool, id, status).await?;
    pool.close().await;

    let Some(record) = record else {
        bail!("record not found: {}", id);
    };
    println!(
        "record {} ({}) -> {}",
        record.id,
        record.business_id,
        record.status.as_str()
    );
    Ok(())
}

pub async fn run_attach(config: &Config, id: i64, role: &str, path: &Path) -> Result<()> {
    let role = MatchType::parse(role)
        .ok_or_else(|| anyhow::anyhow!("Unknown image role: '{}'. Use customer or work.", role))?;

    let bytes = std::fs::read(path)?;
    let blobs = BlobStore::new(config.images.dir.clone());
    let stored_name = blobs.save(&bytes, role)?;

    let pool = db::connect(config).await?;
    let previous = store::set_image(&pool, id, role, &stored_name).await?;

    // Stored names are content hashes shared between records, so neither
    // cleanup path may touch a file another record still references.
    let Some(previous) = previous else {
        if !store::image_referenced(&pool, &stored_name, id).await? {
            blobs.delete_quiet(&stored_name);
        }
        pool.close().await;
        bail!("record not found: {}", id);
    };
    if let Some(old) = previous {
        if old != stored_name && !store::image_referenced(&pool, &old, id).await? {
            blobs.delete_quiet(&old);
        }
    }
    pool.close().await;

    println!("attached {} image {} to record {}", role.as_str(), stored_name, id);
    Ok(())
}

pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let orphaned = store::delete(&pool, id).await?;
    pool.close().await;

    let Some(orphaned) = orphaned else {
        bail!("record not found: {}", id);
    };

    let blobs = BlobStore::new(config.images.dir.clone());
    for name in &orphaned {
        blobs.delete_quiet(name);
    }
    println!("deleted record {}", id);
    Ok(())
}

/// Similarity search from the command line: score the query photo against
/// every stored image of recent records and print the ranked matches.
pub async fn run_similar(
    config: &Config,
    path: &Path,
    threshold: Option<f64>,
    top: Option<usize>,
) -> Result<()> {
    let query_bytes = std::fs::read(path)?;

    let mut similarity_config = config.similarity.clone();
    if let Some(threshold) = threshold {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("--threshold must be in [0.0, 1.0]");
        }
        similarity_config.min_score = threshold;
    }
    if let Some(top) = top {
        similarity_config.top_k = top;
    }

    let pool = db::connect(config).await?;
    let records = store::recent_with_images(&pool, similarity_config.window_months).await?;
    pool.close().await;

    let blobs = BlobStore::new(config.images.dir.clone());
    let mut candidates = Vec::new();
    for record in &records {
        let slots = [
            (MatchType::Customer, record.customer_image.as_ref()),
            (MatchType::Work, record.work_image.as_ref()),
        ];
        for (match_type, name) in slots {
            let Some(name) = name else { continue };
            match blobs.load(name) {
                Ok(bytes) => candidates.push(Candidate {
                    record_id: record.id,
                    business_id: record.business_id.clone(),
                    customer_name: record.customer_name.clone(),
                    match_type,
                    image: name.clone(),
                    bytes,
                }),
                Err(e) => eprintln!("warning: skipping candidate image: {}", e),
            }
        }
    }

    let matches = similarity::search(&query_bytes, candidates, &similarity_config);

    if matches.is_empty() {
        println!("No matches found.");
        return Ok(());
    }
    for (i, m) in matches.iter().enumerate() {
        println!(
            "{}. [{:.0}%] {} {} / {} ({} image {})",
            i + 1,
            m.score * 100.0,
            m.label(),
            m.business_id,
            m.customer_name,
            m.match_type.as_str(),
            m.image
        );
    }
    Ok(())
}

fn print_record_line(record: &CustomerRecord) {
    println!(
        "{:>4}  {}  {:<12} {:<12} {}",
        record.id,
        record.business_id,
        record.status.as_str(),
        record.program.as_str(),
        record.customer_name
    );
}
