//! Record store: CRUD, paginated filtering, and text search over customer
//! records.
//!
//! Every operation takes an injected [`SqlitePool`] handle — opened once at
//! process start and closed at shutdown — rather than a module-level
//! connection singleton. Used by both the `kiln` CLI commands and the HTTP
//! handlers.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use thiserror::Error;

use crate::models::{
    CustomerRecord, JobStatus, NewRecord, ProgramType, RecordFilter, RecordPage, RecordPatch,
};

/// Input rejected by store validation. A distinct type so the HTTP layer
/// can map it to a 400 without inspecting message text.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct InvalidInput(pub String);

fn invalid(msg: impl Into<String>) -> anyhow::Error {
    InvalidInput(msg.into()).into()
}

/// Create a record, generating its immutable business id from the work date
/// and program-type code.
pub async fn create(pool: &SqlitePool, new: &NewRecord) -> Result<CustomerRecord> {
    if new.customer_name.trim().is_empty() {
        return Err(invalid("customer_name must not be empty"));
    }
    let date = NaiveDate::parse_from_str(&new.work_date, "%Y-%m-%d").map_err(|_| {
        invalid(format!(
            "invalid work_date '{}', expected YYYY-MM-DD",
            new.work_date
        ))
    })?;

    let business_id = next_business_id(pool, date, new.program).await?;
    let now = chrono::Utc::now().timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO records
            (business_id, customer_name, phone, email, program, work_date, status, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&business_id)
    .bind(new.customer_name.trim())
    .bind(&new.phone)
    .bind(&new.email)
    .bind(new.program.as_str())
    .bind(&new.work_date)
    .bind(JobStatus::Received.as_str())
    .bind(&new.notes)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    get(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("record vanished after insert: {}", id))
}

/// Generate the next business id for a (work date, program) pair:
/// `YYMMDD-<CODE>-NNN` with a per-day-per-program sequence.
///
/// The sequence continues from the highest existing suffix, so deleting a
/// record never causes an id to be reissued. The suffix widens past 999.
async fn next_business_id(
    pool: &SqlitePool,
    date: NaiveDate,
    program: ProgramType,
) -> Result<String> {
    let prefix = format!("{}-{}-", date.format("%y%m%d"), program.code());

    let existing: Vec<String> =
        sqlx::query_scalar("SELECT business_id FROM records WHERE business_id LIKE ?")
            .bind(format!("{}%", prefix))
            .fetch_all(pool)
            .await?;

    let seq = next_sequence(existing.iter().map(String::as_str));
    Ok(format!("{}{:03}", prefix, seq))
}

/// Numeric max over the `-NNN` suffixes plus one. Comparing as numbers
/// matters once a day's sequence passes 999: "1000" sorts below "999"
/// lexicographically but must still yield 1001 next.
fn next_sequence<'a>(ids: impl Iterator<Item = &'a str>) -> u32 {
    ids.filter_map(|id| id.rsplit('-').next()?.parse::<u32>().ok())
        .max()
        .map_or(1, |n| n + 1)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<CustomerRecord>> {
    let row = sqlx::query("SELECT * FROM records WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| record_from_row(&r)).transpose()
}

/// All records, newest first.
pub async fn list(pool: &SqlitePool) -> Result<Vec<CustomerRecord>> {
    let rows = sqlx::query("SELECT * FROM records ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(record_from_row).collect()
}

/// Paginated, filtered listing. `page` is 1-based; out-of-range pages
/// return an empty record list with correct totals.
pub async fn list_paginated(
    pool: &SqlitePool,
    page: i64,
    page_size: i64,
    filter: &RecordFilter,
) -> Result<RecordPage> {
    if page < 1 {
        return Err(invalid("page must be >= 1"));
    }
    if !(1..=200).contains(&page_size) {
        return Err(invalid("page_size must be in [1, 200]"));
    }

    let mut count_qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM records WHERE 1=1");
    push_filter(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM records WHERE 1=1");
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY work_date DESC, id DESC LIMIT ");
    qb.push_bind(page_size);
    qb.push(" OFFSET ");
    qb.push_bind((page - 1) * page_size);

    let rows = qb.build().fetch_all(pool).await?;
    let records: Vec<CustomerRecord> = rows.iter().map(record_from_row).collect::<Result<_>>()?;

    let total_pages = if total == 0 {
        0
    } else {
        (total + page_size - 1) / page_size
    };

    Ok(RecordPage {
        records,
        total,
        page,
        page_size,
        total_pages,
    })
}

fn push_filter(qb: &mut QueryBuilder<Sqlite>, filter: &RecordFilter) {
    if let Some(ref from) = filter.date_from {
        qb.push(" AND work_date >= ");
        qb.push_bind(from.clone());
    }
    if let Some(ref to) = filter.date_to {
        qb.push(" AND work_date <= ");
        qb.push_bind(to.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(program) = filter.program {
        qb.push(" AND program = ");
        qb.push_bind(program.as_str());
    }
    if let Some(ref query) = filter.query {
        let pattern = format!("%{}%", query);
        qb.push(" AND (customer_name LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR phone LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR email LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR business_id LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR notes LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

/// Free-text search over name, phone, email, business id, and notes.
pub async fn search(pool: &SqlitePool, text: &str) -> Result<Vec<CustomerRecord>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let pattern = format!("%{}%", text);
    let rows = sqlx::query(
        r#"
        SELECT * FROM records
        WHERE customer_name LIKE ? OR phone LIKE ? OR email LIKE ?
           OR business_id LIKE ? OR notes LIKE ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Apply a partial update. Returns `None` if the record does not exist.
/// The business id is never touched.
pub async fn update(
    pool: &SqlitePool,
    id: i64,
    patch: &RecordPatch,
) -> Result<Option<CustomerRecord>> {
    let Some(current) = get(pool, id).await? else {
        return Ok(None);
    };

    if let Some(ref date) = patch.work_date {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| invalid(format!("invalid work_date '{}', expected YYYY-MM-DD", date)))?;
    }
    if let Some(ref name) = patch.customer_name {
        if name.trim().is_empty() {
            return Err(invalid("customer_name must not be empty"));
        }
    }

    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        UPDATE records SET
            customer_name = ?,
            phone = ?,
            email = ?,
            program = ?,
            work_date = ?,
            notes = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(
        patch
            .customer_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&current.customer_name),
    )
    .bind(patch.phone.as_ref().or(current.phone.as_ref()))
    .bind(patch.email.as_ref().or(current.email.as_ref()))
    .bind(patch.program.unwrap_or(current.program).as_str())
    .bind(patch.work_date.as_ref().unwrap_or(&current.work_date))
    .bind(patch.notes.as_ref().or(current.notes.as_ref()))
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    get(pool, id).await
}

/// Move a record to a new workflow status. Returns `None` if not found.
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    status: JobStatus,
) -> Result<Option<CustomerRecord>> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query("UPDATE records SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get(pool, id).await
}

/// Store the given image name in one of the record's image slots,
/// returning the previous name (so the caller can delete the old file).
pub async fn set_image(
    pool: &SqlitePool,
    id: i64,
    match_type: crate::models::MatchType,
    stored_name: &str,
) -> Result<Option<Option<String>>> {
    let Some(current) = get(pool, id).await? else {
        return Ok(None);
    };

    let (column, previous) = match match_type {
        crate::models::MatchType::Customer => ("customer_image", current.customer_image),
        crate::models::MatchType::Work => ("work_image", current.work_image),
    };

    let now = chrono::Utc::now().timestamp();
    let sql = format!("UPDATE records SET {} = ?, updated_at = ? WHERE id = ?", column);
    sqlx::query(&sql)
        .bind(stored_name)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(Some(previous))
}

/// True when any record other than `exclude_id` references the stored name
/// in either image slot. Content-hash names are shared between records that
/// attach the same photo, so a file may only be removed from disk when this
/// returns `false`.
pub async fn image_referenced(pool: &SqlitePool, name: &str, exclude_id: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM records WHERE id != ? AND (customer_image = ? OR work_image = ?)",
    )
    .bind(exclude_id)
    .bind(name)
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Delete a record. Returns the stored image names no surviving record
/// references (safe for the caller to remove from disk), or `None` if the
/// record did not exist.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<Option<Vec<String>>> {
    let Some(record) = get(pool, id).await? else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM records WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    let mut orphaned = Vec::new();
    for name in [record.customer_image, record.work_image]
        .into_iter()
        .flatten()
    {
        if !image_referenced(pool, &name, id).await? {
            orphaned.push(name);
        }
    }
    Ok(Some(orphaned))
}

/// Records created within the last `months` months that carry at least one
/// stored image — the similarity-search candidate window.
pub async fn recent_with_images(pool: &SqlitePool, months: u32) -> Result<Vec<CustomerRecord>> {
    // Calendar precision does not matter for a fuzzy recency window
    let cutoff = chrono::Utc::now().timestamp() - i64::from(months) * 30 * 24 * 3600;

    let rows = sqlx::query(
        r#"
        SELECT * FROM records
        WHERE created_at >= ?
          AND (customer_image IS NOT NULL OR work_image IS NOT NULL)
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

fn record_from_row(row: &SqliteRow) -> Result<CustomerRecord> {
    let program_str: String = row.get("program");
    let program = ProgramType::parse(&program_str)
        .ok_or_else(|| anyhow::anyhow!("unknown program in database: {}", program_str))?;

    let status_str: String = row.get("status");
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown status in database: {}", status_str))?;

    Ok(CustomerRecord {
        id: row.get("id"),
        business_id: row.get("business_id"),
        customer_name: row.get("customer_name"),
        phone: row.get("phone"),
        email: row.get("email"),
        program,
        work_date: row.get("work_date"),
        status,
        notes: row.get("notes"),
        customer_image: row.get("customer_image"),
        work_image: row.get("work_image"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sequence_empty_starts_at_one() {
        assert_eq!(next_sequence(std::iter::empty::<&str>()), 1);
    }

    #[test]
    fn test_next_sequence_continues_from_max() {
        let ids = ["240612-W-001", "240612-W-007", "240612-W-003"];
        assert_eq!(next_sequence(ids.into_iter()), 8);
    }

    #[test]
    fn test_next_sequence_past_thousand_is_numeric() {
        // "1000" sorts below "999" as text; the max must be numeric
        let ids = ["240612-W-998", "240612-W-999", "240612-W-1000"];
        assert_eq!(next_sequence(ids.into_iter()), 1001);
    }

    #[test]
    fn test_next_sequence_ignores_unparsable_suffix() {
        let ids = ["240612-W-abc", "240612-W-002"];
        assert_eq!(next_sequence(ids.into_iter()), 3);
    }

    #[test]
    fn test_invalid_input_downcasts() {
        let err = invalid("page must be >= 1");
        assert!(err.downcast_ref::<InvalidInput>().is_some());
        assert_eq!(err.to_string(), "page must be >= 1");
    }
}
