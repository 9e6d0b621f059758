//! Core data models used throughout Kilnlog.
//!
//! These types represent the customer records, job workflow states, and
//! similarity-search results that flow through the store and API layers.

use serde::{Deserialize, Serialize};

/// A customer record as stored in SQLite.
///
/// `id` is the surrogate numeric identity; `business_id` is the
/// human-readable identifier generated at creation time from the work date
/// and program-type code (immutable thereafter).
#[derive(Debug, Clone, Serialize)]
pub struct CustomerRecord {
    pub id: i64,
    pub business_id: String,
    pub customer_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub program: ProgramType,
    /// Work date as `YYYY-MM-DD`.
    pub work_date: String,
    pub status: JobStatus,
    pub notes: Option<String>,
    /// Stored name of the intake-form photo, if any.
    pub customer_image: Option<String>,
    /// Stored name of the finished-artwork photo, if any.
    pub work_image: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields supplied when creating a record. Everything else is generated.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecord {
    pub customer_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub program: ProgramType,
    /// Work date as `YYYY-MM-DD`.
    pub work_date: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update. `None` fields are left unchanged; the business id and
/// image names are never updatable through this path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPatch {
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub program: Option<ProgramType>,
    pub work_date: Option<String>,
    pub notes: Option<String>,
}

/// Studio program the piece was made in. The single-letter code is part of
/// the business id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramType {
    Wheel,
    Handbuilding,
    PaintYourOwn,
    Glaze,
}

impl ProgramType {
    pub fn code(&self) -> char {
        match self {
            ProgramType::Wheel => 'W',
            ProgramType::Handbuilding => 'H',
            ProgramType::PaintYourOwn => 'P',
            ProgramType::Glaze => 'G',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramType::Wheel => "wheel",
            ProgramType::Handbuilding => "handbuilding",
            ProgramType::PaintYourOwn => "paint_your_own",
            ProgramType::Glaze => "glaze",
        }
    }

    pub fn parse(s: &str) -> Option<ProgramType> {
        match s {
            "wheel" => Some(ProgramType::Wheel),
            "handbuilding" => Some(ProgramType::Handbuilding),
            "paint_your_own" => Some(ProgramType::PaintYourOwn),
            "glaze" => Some(ProgramType::Glaze),
            _ => None,
        }
    }
}

/// Job workflow state. The set is fixed; transitions are not restricted
/// (pieces occasionally move backward for re-firing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Received,
    InProgress,
    Fired,
    Ready,
    PickedUp,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::InProgress => "in_progress",
            JobStatus::Fired => "fired",
            JobStatus::Ready => "ready",
            JobStatus::PickedUp => "picked_up",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "received" => Some(JobStatus::Received),
            "in_progress" => Some(JobStatus::InProgress),
            "fired" => Some(JobStatus::Fired),
            "ready" => Some(JobStatus::Ready),
            "picked_up" => Some(JobStatus::PickedUp),
            _ => None,
        }
    }
}

/// Which stored image a similarity candidate matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// The intake-form photo.
    Customer,
    /// The finished-artwork photo.
    Work,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Customer => "customer",
            MatchType::Work => "work",
        }
    }

    pub fn parse(s: &str) -> Option<MatchType> {
        match s {
            "customer" => Some(MatchType::Customer),
            "work" => Some(MatchType::Work),
            _ => None,
        }
    }
}

/// Filter applied by the paginated listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    /// Inclusive lower bound on work date (`YYYY-MM-DD`).
    pub date_from: Option<String>,
    /// Inclusive upper bound on work date (`YYYY-MM-DD`).
    pub date_to: Option<String>,
    pub status: Option<JobStatus>,
    pub program: Option<ProgramType>,
    /// Free-text match over name, phone, email, business id, and notes.
    pub query: Option<String>,
}

/// One page of records with paging metadata.
#[derive(Debug, Clone, Serialize)]
pub struct RecordPage {
    pub records: Vec<CustomerRecord>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// A ranked similarity-search match.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityMatch {
    pub record_id: i64,
    pub business_id: String,
    pub customer_name: String,
    pub match_type: MatchType,
    /// Stored name of the matched candidate image.
    pub image: String,
    /// Normalized similarity in `[0, 1]`.
    pub score: f64,
}

impl SimilarityMatch {
    /// Qualitative label at fixed score bands.
    pub fn label(&self) -> &'static str {
        if self.score >= 0.85 {
            "Excellent Match"
        } else if self.score >= 0.70 {
            "Good Match"
        } else if self.score >= 0.55 {
            "Fair Match"
        } else {
            "Possible Match"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in [
            JobStatus::Received,
            JobStatus::InProgress,
            JobStatus::Fired,
            JobStatus::Ready,
            JobStatus::PickedUp,
        ] {
            assert_eq!(JobStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(JobStatus::parse("bisqued"), None);
    }

    #[test]
    fn test_program_codes_unique() {
        let codes: Vec<char> = [
            ProgramType::Wheel,
            ProgramType::Handbuilding,
            ProgramType::PaintYourOwn,
            ProgramType::Glaze,
        ]
        .iter()
        .map(|p| p.code())
        .collect();
        let mut dedup = codes.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(codes.len(), dedup.len());
    }

    #[test]
    fn test_match_labels() {
        let mut m = SimilarityMatch {
            record_id: 1,
            business_id: "240101-W-001".into(),
            customer_name: "a".into(),
            match_type: MatchType::Work,
            image: "x.png".into(),
            score: 0.9,
        };
        assert_eq!(m.label(), "Excellent Match");
        m.score = 0.72;
        assert_eq!(m.label(), "Good Match");
        m.score = 0.6;
        assert_eq!(m.label(), "Fair Match");
        m.score = 0.1;
        assert_eq!(m.label(), "Possible Match");
    }
}
