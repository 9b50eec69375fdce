//! Backup export and import.
//!
//! Two document generations exist. Generation 2 carries attachments nested
//! under `files`; generation 1 (legacy) is a bare `jobs` list in the flat
//! record shape. The generation is detected from the document's shape, never
//! from `metadata.version`.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attachment::Attachment;
use crate::db::DurableSlot;
use crate::error::TrackerError;
use crate::models::{ApplicationRecord, Stage};
use crate::store::{assign_unique_ids, RecordStore, MAX_ID};

pub const BACKUP_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub metadata: BackupMetadata,
    pub applications: Vec<BackupApplication>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub export_date: String,
    pub version: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupApplication {
    pub id: i64,
    pub job_title: String,
    pub company: String,
    pub applied_date: String,
    pub stage: String,
    pub offer_details: String,
    pub files: BackupFiles,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFiles {
    pub resume: Option<BackupFile>,
    pub job_description: Option<BackupFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupFile {
    pub name: String,
    pub data: String,
}

impl From<&Attachment> for BackupFile {
    fn from(attachment: &Attachment) -> Self {
        Self {
            name: attachment.file_name.clone(),
            data: attachment.encoded_content.clone(),
        }
    }
}

impl From<&ApplicationRecord> for BackupApplication {
    fn from(record: &ApplicationRecord) -> Self {
        Self {
            id: record.id,
            job_title: record.job_title.clone(),
            company: record.company.clone(),
            applied_date: record.applied_date.clone(),
            stage: record.stage.clone(),
            offer_details: record.offer_details.clone(),
            files: BackupFiles {
                resume: record.resume.as_ref().map(BackupFile::from),
                job_description: record.job_description.as_ref().map(BackupFile::from),
            },
        }
    }
}

impl BackupDocument {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Snapshots the whole collection into a generation 2 document.
pub fn export_backup(records: &[ApplicationRecord], now: DateTime<Utc>) -> BackupDocument {
    BackupDocument {
        metadata: BackupMetadata {
            export_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            version: BACKUP_VERSION.to_string(),
            file_count: records.iter().map(|r| r.attachment_count()).sum(),
        },
        applications: records.iter().map(BackupApplication::from).collect(),
    }
}

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("job-tracker-backup-{}.json", date.format("%Y-%m-%d"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// `applications` with nested `files`.
    Current,
    /// `jobs`, no embedded files.
    Legacy,
}

/// A parsed document waiting for the user's go-ahead.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBackup {
    pub generation: Generation,
    pub records: Vec<ApplicationRecord>,
    /// Entries that were not objects and could not be read at all.
    pub skipped: usize,
    /// Entries whose id was missing or clashed and got a fresh one.
    pub reassigned_ids: usize,
}

impl DecodedBackup {
    pub fn file_count(&self) -> usize {
        self.records.iter().map(|r| r.attachment_count()).sum()
    }

    pub fn confirmation_prompt(&self) -> String {
        match self.generation {
            Generation::Current => format!(
                "This will import {} job applications and replace your current data. Are you sure you want to continue?",
                self.records.len()
            ),
            Generation::Legacy => match self.file_count() {
                0 => format!(
                    "This will import {} job applications (legacy format - files not included) and replace your current data. Are you sure you want to continue?",
                    self.records.len()
                ),
                files => format!(
                    "This will import {} job applications (legacy format, {} embedded files) and replace your current data. Are you sure you want to continue?",
                    self.records.len(),
                    files
                ),
            },
        }
    }
}

/// Parses and normalizes a backup document without touching any store.
pub fn decode_backup(raw: &str) -> Result<DecodedBackup, TrackerError> {
    let doc: Value = serde_json::from_str(raw).map_err(|e| TrackerError::Parse(e.to_string()))?;

    let (generation, entries) = match (
        doc.get("applications").and_then(Value::as_array),
        doc.get("jobs").and_then(Value::as_array),
    ) {
        (Some(applications), _) => (Generation::Current, applications),
        (None, Some(jobs)) => (Generation::Legacy, jobs),
        (None, None) => return Err(TrackerError::invalid_backup()),
    };

    let mut skipped = 0;
    let mut decoded = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let Some(fields) = entry.as_object() else {
            log::warn!("Skipping backup entry {}: not an object", idx);
            skipped += 1;
            continue;
        };
        decoded.push(match generation {
            Generation::Current => decode_current(fields),
            Generation::Legacy => decode_legacy(fields),
        });
    }

    let reassigned_ids = assign_unique_ids(&mut decoded);
    if reassigned_ids > 0 {
        log::warn!("Assigned fresh ids to {} backup entries", reassigned_ids);
    }

    Ok(DecodedBackup {
        generation,
        records: decoded.into_iter().map(|(_, record)| record).collect(),
        skipped,
        reassigned_ids,
    })
}

fn decode_current(fields: &Map<String, Value>) -> (Option<i64>, ApplicationRecord) {
    let files = fields.get("files");
    let (id, mut record) = decode_scalars(fields);
    record.resume = nested_file(files, "resume");
    record.job_description = nested_file(files, "jobDescription");
    (id, record)
}

/// Legacy entries are taken as-is, flat attachment fields included.
fn decode_legacy(fields: &Map<String, Value>) -> (Option<i64>, ApplicationRecord) {
    let (id, mut record) = decode_scalars(fields);
    record.resume = Attachment::from_parts(
        string_field(fields, "resumeFileName"),
        fields.get("resumeFile").and_then(Value::as_str).map(str::to_string),
    );
    record.job_description = Attachment::from_parts(
        string_field(fields, "jobDescriptionFileName"),
        fields
            .get("jobDescriptionFile")
            .and_then(Value::as_str)
            .map(str::to_string),
    );
    (id, record)
}

fn decode_scalars(fields: &Map<String, Value>) -> (Option<i64>, ApplicationRecord) {
    let stage = match fields.get("stage").and_then(Value::as_str) {
        Some(stage) => stage.to_string(),
        None => Stage::default().as_str().to_string(),
    };
    let record = ApplicationRecord {
        id: 0,
        job_title: string_field(fields, "jobTitle"),
        company: string_field(fields, "company"),
        applied_date: string_field(fields, "appliedDate"),
        stage,
        offer_details: string_field(fields, "offerDetails"),
        resume: None,
        job_description: None,
    };
    (fields.get("id").and_then(lenient_id), record)
}

fn string_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Ids outside `1..=MAX_ID` are treated as missing so they get re-keyed.
fn lenient_id(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_ID as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (1..=MAX_ID).contains(&id).then_some(id)
}

fn nested_file(files: Option<&Value>, key: &str) -> Option<Attachment> {
    let file = files?.get(key)?;
    let data = file.get("data").and_then(Value::as_str).map(str::to_string);
    let name = file
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Attachment::from_parts(name, data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub generation: Generation,
    pub records: usize,
    pub files: usize,
}

impl ImportReport {
    pub fn message(&self) -> String {
        match self.generation {
            Generation::Current => format!(
                "Successfully imported {} job applications with {} files!",
                self.records, self.files
            ),
            Generation::Legacy if self.files == 0 => format!(
                "Successfully imported {} job applications! Note: This was a legacy backup without embedded files.",
                self.records
            ),
            Generation::Legacy => format!(
                "Successfully imported {} job applications with {} files! Note: This was a legacy backup.",
                self.records, self.files
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The user declined; nothing changed.
    Cancelled,
    Imported(ImportReport),
}

/// Decodes `raw`, asks `confirm` with a generation-specific prompt, and on a
/// yes replaces the store's entire collection. A decode failure or a no leaves
/// the store untouched.
pub fn import_backup<S: DurableSlot>(
    store: &mut RecordStore<S>,
    raw: &str,
    confirm: impl FnOnce(&str) -> bool,
) -> Result<ImportOutcome, TrackerError> {
    let decoded = decode_backup(raw)?;

    if !confirm(&decoded.confirmation_prompt()) {
        log::info!("Import cancelled");
        return Ok(ImportOutcome::Cancelled);
    }

    let report = ImportReport {
        generation: decoded.generation,
        records: decoded.records.len(),
        files: decoded.file_count(),
    };
    log::info!(
        "Importing {} applications ({:?} format, {} files, {} skipped, {} re-keyed)",
        report.records,
        report.generation,
        report.files,
        decoded.skipped,
        decoded.reassigned_ids
    );
    store.replace_all(decoded.records);
    Ok(ImportOutcome::Imported(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::ApplicationDraft;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample_records() -> Vec<ApplicationRecord> {
        let mut first = ApplicationDraft::new("Backend Engineer", "Acme", "2024-01-15");
        first.resume = Some(Attachment::encode("cv.pdf", b"%PDF-1.7 binary \x00\xff"));
        first.job_description = Some(Attachment::encode("jd.txt", b"Write Rust."));
        first.offer_details = "$150k, remote".to_string();

        let mut second = ApplicationDraft::new("SRE", "Globex", "2024-02-01");
        second.stage = "Ghosted".to_string();

        let mut third = ApplicationDraft::new("Platform Lead", "Initech", "2024-03-10");
        third.stage = Stage::OfferReceived.as_str().to_string();
        third.resume = Some(Attachment::encode("", b"nameless"));

        vec![
            first.into_record(1_700_000_000_001),
            second.into_record(1_700_000_000_002),
            third.into_record(1_700_000_000_003),
        ]
    }

    fn seeded_store(db: &Database) -> RecordStore<&Database> {
        let mut store = RecordStore::load(db);
        store.replace_all(sample_records());
        store
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_export_shape() {
        let doc = export_backup(&sample_records(), at(1_700_000_000));
        assert_eq!(doc.metadata.version, "2.0");
        assert_eq!(doc.metadata.file_count, 3);
        assert_eq!(doc.metadata.export_date, "2023-11-14T22:13:20.000Z");

        let value: Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        let first = &value["applications"][0];
        assert_eq!(first["jobTitle"], "Backend Engineer");
        assert_eq!(first["files"]["resume"]["name"], "cv.pdf");
        assert!(first.get("resumeFile").is_none());
        assert!(first.get("resumeFileName").is_none());
        assert_eq!(value["applications"][1]["files"]["resume"], Value::Null);
        assert_eq!(value["applications"][1]["files"]["jobDescription"], Value::Null);
    }

    #[test]
    fn test_round_trip() {
        let records = sample_records();
        let json = export_backup(&records, Utc::now()).to_json().unwrap();

        let db = Database::open_in_memory().unwrap();
        let mut store = RecordStore::load(&db);
        let outcome = import_backup(&mut store, &json, |_| true).unwrap();

        assert_eq!(store.records(), records.as_slice());
        assert_eq!(
            outcome,
            ImportOutcome::Imported(ImportReport {
                generation: Generation::Current,
                records: 3,
                files: 3,
            })
        );
        assert_eq!(
            store.records()[0].resume.as_ref().unwrap().decode().unwrap(),
            b"%PDF-1.7 binary \x00\xff"
        );
    }

    #[test]
    fn test_export_is_deterministic_except_date() {
        let records = sample_records();
        let a = export_backup(&records, at(1_700_000_000));
        let b = export_backup(&records, at(1_800_000_000));
        assert_ne!(a.metadata.export_date, b.metadata.export_date);
        assert_eq!(a.applications, b.applications);
        assert_eq!(a.metadata.version, b.metadata.version);
        assert_eq!(a.metadata.file_count, b.metadata.file_count);
    }

    #[test]
    fn test_backup_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();
        assert_eq!(backup_file_name(date), "job-tracker-backup-2024-05-07.json");
    }

    #[test]
    fn test_legacy_import() {
        let db = Database::open_in_memory().unwrap();
        let mut store = seeded_store(&db);
        let raw = r#"{"jobs":[{"jobTitle":"A","company":"B","appliedDate":"2024-01-01","stage":"Applied"}]}"#;

        let mut prompt = String::new();
        let outcome = import_backup(&mut store, raw, |p| {
            prompt = p.to_string();
            true
        })
        .unwrap();

        assert!(prompt.contains("legacy format - files not included"));
        let ImportOutcome::Imported(report) = outcome else {
            panic!("expected import");
        };
        assert_eq!(report.generation, Generation::Legacy);
        assert!(report.message().contains("legacy backup without embedded files"));

        assert_eq!(store.records().len(), 1);
        let record = &store.records()[0];
        assert_eq!(record.job_title, "A");
        assert!(record.resume.is_none());
        assert!(record.job_description.is_none());
        assert!(record.id > 0);
    }

    #[test]
    fn test_malformed_import_leaves_store_untouched() {
        let db = Database::open_in_memory().unwrap();
        let mut store = seeded_store(&db);

        let err = import_backup(&mut store, r#"{"foo":1}"#, |_| true).unwrap_err();
        assert!(matches!(err, TrackerError::Parse(_)));
        assert_eq!(err.to_string(), "Invalid backup file format");
        assert_eq!(store.records(), sample_records().as_slice());

        let err = import_backup(&mut store, "{ nope", |_| true).unwrap_err();
        assert!(matches!(err, TrackerError::Parse(_)));
        assert_eq!(store.records().len(), 3);
    }

    #[test]
    fn test_non_object_document_is_rejected() {
        assert!(matches!(decode_backup("[1, 2, 3]"), Err(TrackerError::Parse(_))));
        assert!(matches!(
            decode_backup(r#"{"applications": {"not": "a list"}}"#),
            Err(TrackerError::Parse(_))
        ));
    }

    #[test]
    fn test_declined_import_changes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let mut store = seeded_store(&db);
        let raw = r#"{"applications":[]}"#;
        let outcome = import_backup(&mut store, raw, |_| false).unwrap();
        assert_eq!(outcome, ImportOutcome::Cancelled);
        assert_eq!(store.records().len(), 3);
    }

    #[test]
    fn test_current_import_unpacks_files() {
        let raw = r#"{
            "metadata": {"exportDate": "2024-01-01T00:00:00.000Z", "version": "2.0", "fileCount": 1},
            "applications": [{
                "id": 1,
                "jobTitle": "A",
                "company": "B",
                "appliedDate": "2024-01-01",
                "stage": "Applied",
                "offerDetails": "",
                "files": {
                    "resume": {"name": "r.pdf", "data": "data:application/pdf;base64,AAA="},
                    "jobDescription": null
                }
            }]
        }"#;
        let decoded = decode_backup(raw).unwrap();
        assert_eq!(decoded.generation, Generation::Current);
        let record = &decoded.records[0];
        let (resume_file_name, resume_file) = Attachment::into_parts(record.resume.clone());
        assert_eq!(resume_file_name, "r.pdf");
        assert_eq!(resume_file.as_deref(), Some("data:application/pdf;base64,AAA="));
        assert!(record.job_description.is_none());
        assert_eq!(decoded.file_count(), 1);
        assert!(decoded.confirmation_prompt().starts_with("This will import 1 job applications and"));
    }

    #[test]
    fn test_current_shape_wins_over_legacy() {
        let raw = r#"{"applications":[], "jobs":[{"jobTitle":"x"}]}"#;
        assert_eq!(decode_backup(raw).unwrap().generation, Generation::Current);
        // Detection ignores the version tag.
        let raw = r#"{"metadata":{"version":"2.0"}, "jobs":[]}"#;
        assert_eq!(decode_backup(raw).unwrap().generation, Generation::Legacy);
    }

    #[test]
    fn test_lenient_entries() {
        let raw = r#"{"applications":[
            "garbage",
            {"id": "12", "jobTitle": 5, "stage": "Ghosted", "files": {"resume": {"data": "data:text/plain;base64,aGk="}}},
            {"jobTitle": "No id"},
            {"id": 12, "jobTitle": "Dup id", "files": {"jobDescription": {"name": "jd.txt", "data": ""}}}
        ]}"#;
        let decoded = decode_backup(raw).unwrap();
        assert_eq!(decoded.skipped, 1);
        assert_eq!(decoded.reassigned_ids, 2);
        assert_eq!(decoded.records.len(), 3);

        let first = &decoded.records[0];
        assert_eq!(first.id, 12);
        assert_eq!(first.job_title, "");
        assert_eq!(first.stage, "Ghosted");
        assert_eq!(first.resume.as_ref().unwrap().file_name, "");

        let second = &decoded.records[1];
        assert_eq!(second.stage, "Applied");
        assert_ne!(second.id, 12);

        let third = &decoded.records[2];
        assert_ne!(third.id, 12);
        assert_ne!(third.id, second.id);
        assert!(third.job_description.is_none());
    }

    #[test]
    fn test_legacy_keeps_flat_files_if_present() {
        let raw = r#"{"jobs":[{"id": 3, "jobTitle":"A","resumeFile":"data:text/plain;base64,aGk=","resumeFileName":"cv.txt"}]}"#;
        let decoded = decode_backup(raw).unwrap();
        assert_eq!(decoded.records[0].id, 3);
        assert_eq!(decoded.records[0].resume.as_ref().unwrap().file_name, "cv.txt");
    }

    #[test]
    fn test_legacy_with_flat_files_reports_them() {
        let db = Database::open_in_memory().unwrap();
        let mut store = seeded_store(&db);
        let raw = r#"{"jobs":[{"id": 3, "jobTitle":"A","resumeFile":"data:text/plain;base64,aGk=","resumeFileName":"cv.txt"}]}"#;

        let mut prompt = String::new();
        let outcome = import_backup(&mut store, raw, |p| {
            prompt = p.to_string();
            true
        })
        .unwrap();

        assert!(!prompt.contains("files not included"));
        assert!(prompt.contains("legacy format, 1 embedded files"));
        let ImportOutcome::Imported(report) = outcome else {
            panic!("expected import");
        };
        assert_eq!(report.files, 1);
        assert_eq!(
            report.message(),
            "Successfully imported 1 job applications with 1 files! Note: This was a legacy backup."
        );
        assert_eq!(store.records()[0].resume.as_ref().unwrap().decode().unwrap(), b"hi");
    }

    #[test]
    fn test_out_of_range_ids_are_rekeyed() {
        let raw = r#"{"applications":[
            {"id": 9223372036854775807, "jobTitle": "Max"},
            {"jobTitle": "No id"},
            {"id": -4, "jobTitle": "Negative"},
            {"id": "99999999999999999999", "jobTitle": "Huge string"}
        ]}"#;
        let decoded = decode_backup(raw).unwrap();
        assert_eq!(decoded.records.len(), 4);
        assert_eq!(decoded.reassigned_ids, 4);
        let ids: std::collections::HashSet<i64> = decoded.records.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| (1..=MAX_ID).contains(id)));
    }

    #[test]
    fn test_import_float_id_beyond_range() {
        let db = Database::open_in_memory().unwrap();
        let mut store = seeded_store(&db);
        let raw = r#"{"jobs":[{"id": 1e20, "jobTitle":"A","company":"B","appliedDate":"2024-01-01"}]}"#;

        let outcome = import_backup(&mut store, raw, |_| true).unwrap();
        assert!(matches!(outcome, ImportOutcome::Imported(_)));
        assert_eq!(store.records().len(), 1);
        let id = store.records()[0].id;
        assert!((1..=MAX_ID).contains(&id));

        let next = store.create(ApplicationDraft::new("B", "C", "2024-01-02")).unwrap();
        assert_ne!(next, id);
    }

    #[test]
    fn test_import_persists_replacement() {
        let db = Database::open_in_memory().unwrap();
        let mut store = seeded_store(&db);
        let raw = r#"{"jobs":[{"id": 7, "jobTitle":"A","company":"B","appliedDate":"2024-01-01"}]}"#;
        import_backup(&mut store, raw, |_| true).unwrap();

        let reloaded = RecordStore::load(&db);
        assert_eq!(reloaded.records().len(), 1);
        assert_eq!(reloaded.records()[0].id, 7);
    }
}
