use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;
use crate::error::TrackerError;

/// Pipeline stages, in the order they are offered to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    #[default]
    Applied,
    PhoneScreen,
    FirstInterview,
    SecondInterview,
    FinalInterview,
    TechnicalAssessment,
    OfferReceived,
    Rejected,
    Withdrawn,
}

/// Coarse classification used by the summary counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBucket {
    InProgress,
    Offer,
    ClosedNegative,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Applied,
        Stage::PhoneScreen,
        Stage::FirstInterview,
        Stage::SecondInterview,
        Stage::FinalInterview,
        Stage::TechnicalAssessment,
        Stage::OfferReceived,
        Stage::Rejected,
        Stage::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Applied => "Applied",
            Stage::PhoneScreen => "Phone Screen",
            Stage::FirstInterview => "First Interview",
            Stage::SecondInterview => "Second Interview",
            Stage::FinalInterview => "Final Interview",
            Stage::TechnicalAssessment => "Technical Assessment",
            Stage::OfferReceived => "Offer Received",
            Stage::Rejected => "Rejected",
            Stage::Withdrawn => "Withdrawn",
        }
    }

    /// Exact match against the display names.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|stage| stage.as_str() == s)
    }

    /// Case-insensitive match that also accepts kebab/snake spellings ("phone-screen").
    pub fn parse_loose(s: &str) -> Option<Self> {
        let wanted = s.trim().replace(['-', '_'], " ").to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str().to_lowercase() == wanted)
    }

    pub fn bucket(&self) -> StageBucket {
        match self {
            Stage::OfferReceived => StageBucket::Offer,
            Stage::Rejected | Stage::Withdrawn => StageBucket::ClosedNegative,
            _ => StageBucket::InProgress,
        }
    }

    /// Following stage in the enumeration, wrapping back to `Applied`.
    pub fn next(&self) -> Stage {
        let idx = Self::ALL.iter().position(|s| s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buckets a raw stage string. Unrecognized stages count as in progress.
pub fn bucket_of(stage: &str) -> StageBucket {
    Stage::parse(stage)
        .map(|s| s.bucket())
        .unwrap_or(StageBucket::InProgress)
}

/// A tracked job application.
///
/// `stage` is kept as the raw string so values outside [`Stage::ALL`] that
/// arrive through an import survive untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FlatRecord", into = "FlatRecord")]
pub struct ApplicationRecord {
    pub id: i64,
    pub job_title: String,
    pub company: String,
    pub applied_date: String,
    pub stage: String,
    pub offer_details: String,
    pub resume: Option<Attachment>,
    pub job_description: Option<Attachment>,
}

impl ApplicationRecord {
    pub fn known_stage(&self) -> Option<Stage> {
        Stage::parse(&self.stage)
    }

    pub fn attachment(&self, kind: DocumentKind) -> Option<&Attachment> {
        match kind {
            DocumentKind::Resume => self.resume.as_ref(),
            DocumentKind::JobDescription => self.job_description.as_ref(),
        }
    }

    pub fn attachment_count(&self) -> usize {
        self.resume.is_some() as usize + self.job_description.is_some() as usize
    }
}

/// Which of the two attachment slots on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Resume,
    JobDescription,
}

impl DocumentKind {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "Resume",
            DocumentKind::JobDescription => "Job Description",
        }
    }
}

/// Flat on-disk shape shared by the durable slot and legacy backups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRecord {
    pub id: i64,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub applied_date: String,
    #[serde(default = "default_stage")]
    pub stage: String,
    #[serde(default)]
    pub offer_details: String,
    #[serde(default)]
    pub resume_file: Option<String>,
    #[serde(default)]
    pub resume_file_name: String,
    #[serde(default)]
    pub job_description_file: Option<String>,
    #[serde(default)]
    pub job_description_file_name: String,
}

fn default_stage() -> String {
    Stage::Applied.as_str().to_string()
}

impl From<FlatRecord> for ApplicationRecord {
    fn from(flat: FlatRecord) -> Self {
        Self {
            id: flat.id,
            job_title: flat.job_title,
            company: flat.company,
            applied_date: flat.applied_date,
            stage: flat.stage,
            offer_details: flat.offer_details,
            resume: Attachment::from_parts(flat.resume_file_name, flat.resume_file),
            job_description: Attachment::from_parts(
                flat.job_description_file_name,
                flat.job_description_file,
            ),
        }
    }
}

impl From<ApplicationRecord> for FlatRecord {
    fn from(record: ApplicationRecord) -> Self {
        let (resume_file_name, resume_file) = Attachment::into_parts(record.resume);
        let (job_description_file_name, job_description_file) =
            Attachment::into_parts(record.job_description);
        Self {
            id: record.id,
            job_title: record.job_title,
            company: record.company,
            applied_date: record.applied_date,
            stage: record.stage,
            offer_details: record.offer_details,
            resume_file,
            resume_file_name,
            job_description_file,
            job_description_file_name,
        }
    }
}

/// Everything on a record except its id; the input to create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationDraft {
    pub job_title: String,
    pub company: String,
    pub applied_date: String,
    pub stage: String,
    pub offer_details: String,
    pub resume: Option<Attachment>,
    pub job_description: Option<Attachment>,
}

impl Default for ApplicationDraft {
    fn default() -> Self {
        Self {
            job_title: String::new(),
            company: String::new(),
            applied_date: String::new(),
            stage: default_stage(),
            offer_details: String::new(),
            resume: None,
            job_description: None,
        }
    }
}

impl ApplicationDraft {
    pub fn new(job_title: &str, company: &str, applied_date: &str) -> Self {
        Self {
            job_title: job_title.to_string(),
            company: company.to_string(),
            applied_date: applied_date.to_string(),
            ..Default::default()
        }
    }

    pub fn from_record(record: &ApplicationRecord) -> Self {
        Self {
            job_title: record.job_title.clone(),
            company: record.company.clone(),
            applied_date: record.applied_date.clone(),
            stage: record.stage.clone(),
            offer_details: record.offer_details.clone(),
            resume: record.resume.clone(),
            job_description: record.job_description.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        let missing: Vec<&str> = [
            ("job title", &self.job_title),
            ("company", &self.company),
            ("applied date", &self.applied_date),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(TrackerError::Validation(format!(
                "Please fill in all required fields (missing {})",
                missing.join(", ")
            )));
        }

        if NaiveDate::parse_from_str(self.applied_date.trim(), "%Y-%m-%d").is_err() {
            return Err(TrackerError::Validation(format!(
                "applied date '{}' is not a YYYY-MM-DD date",
                self.applied_date
            )));
        }

        Ok(())
    }

    pub(crate) fn into_record(self, id: i64) -> ApplicationRecord {
        ApplicationRecord {
            id,
            job_title: self.job_title,
            company: self.company,
            applied_date: self.applied_date,
            stage: self.stage,
            offer_details: self.offer_details,
            resume: self.resume,
            job_description: self.job_description,
        }
    }
}

/// Dashboard counts over a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub in_progress: usize,
    pub offers: usize,
    pub rejected: usize,
    pub withdrawn: usize,
}

impl Summary {
    pub fn of(records: &[ApplicationRecord]) -> Self {
        let mut summary = Summary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match bucket_of(&record.stage) {
                StageBucket::InProgress => summary.in_progress += 1,
                StageBucket::Offer => summary.offers += 1,
                StageBucket::ClosedNegative => {
                    if record.known_stage() == Some(Stage::Rejected) {
                        summary.rejected += 1;
                    } else {
                        summary.withdrawn += 1;
                    }
                }
            }
        }
        summary
    }
}
