mod attachment;
mod backup;
mod db;
mod error;
mod models;
mod settings;
mod store;
mod tui;

use anyhow::{anyhow, Context, Result};
use attachment::{read_attachment, write_attachment, AttachmentView};
use backup::{backup_file_name, export_backup, import_backup, ImportOutcome};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use db::Database;
use error::TrackerError;
use models::{ApplicationDraft, ApplicationRecord, DocumentKind, Stage};
use settings::DisplayMode;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use store::RecordStore;

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Personal job application tracker with portable backups")]
struct Cli {
    /// Database file (defaults to the per-user data directory)
    #[arg(long, global = true, env = "JOBTRACK_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an application
    Add {
        /// Job title
        title: String,

        /// Company name
        company: String,

        /// Date applied (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Pipeline stage
        #[arg(short, long, value_parser = parse_stage, default_value = "Applied")]
        stage: Stage,

        /// Salary, benefits, start date, etc.
        #[arg(short, long)]
        offer: Option<String>,

        /// Resume file to embed
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Job description file to embed
        #[arg(long)]
        job_description: Option<PathBuf>,
    },

    /// Edit an application; omitted fields keep their current value
    Edit {
        /// Application ID
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        company: Option<String>,

        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(short, long, value_parser = parse_stage)]
        stage: Option<Stage>,

        #[arg(short, long)]
        offer: Option<String>,

        #[arg(long, conflicts_with = "clear_resume")]
        resume: Option<PathBuf>,

        #[arg(long, conflicts_with = "clear_job_description")]
        job_description: Option<PathBuf>,

        /// Drop the embedded resume
        #[arg(long)]
        clear_resume: bool,

        /// Drop the embedded job description
        #[arg(long)]
        clear_job_description: bool,
    },

    /// Remove an application
    Remove {
        /// Application ID
        id: i64,
    },

    /// List applications
    List {
        /// Only show this stage (e.g. "phone-screen")
        #[arg(short, long, value_parser = parse_stage)]
        stage: Option<Stage>,
    },

    /// Show application details
    Show {
        /// Application ID
        id: i64,
    },

    /// Show pipeline counts
    Summary,

    /// List the pipeline stages
    Stages,

    /// View or save an embedded document
    View {
        /// Application ID
        id: i64,

        /// Which document
        #[arg(value_enum)]
        document: DocumentArg,

        /// Write the document here instead of the default location
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export every application, documents included, to a backup file
    Export {
        /// Output path (defaults to job-tracker-backup-<date>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace all applications with the contents of a backup file
    Import {
        /// Backup file
        file: PathBuf,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Set the display theme
    Theme {
        #[arg(value_enum)]
        mode: ThemeArg,
    },

    /// Browse applications interactively
    Browse,
}

#[derive(Clone, Copy, ValueEnum)]
enum DocumentArg {
    Resume,
    JobDescription,
}

impl From<DocumentArg> for DocumentKind {
    fn from(arg: DocumentArg) -> Self {
        match arg {
            DocumentArg::Resume => DocumentKind::Resume,
            DocumentArg::JobDescription => DocumentKind::JobDescription,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Dark,
    Light,
    Toggle,
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    Stage::parse_loose(s).ok_or_else(|| {
        let names: Vec<&str> = Stage::ALL.iter().map(|s| s.as_str()).collect();
        format!("unknown stage '{}'. Available: {}", s, names.join(", "))
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let db = Database::open(cli.db.as_deref())?;
    log::info!("Using database at {}", db.path().display());
    let mut store = RecordStore::load(&db);

    match cli.command {
        Commands::Add {
            title,
            company,
            date,
            stage,
            offer,
            resume,
            job_description,
        } => {
            let applied = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let mut draft = ApplicationDraft::new(&title, &company, &applied.format("%Y-%m-%d").to_string());
            draft.stage = stage.as_str().to_string();
            draft.offer_details = offer.unwrap_or_default();
            draft.resume = read_optional(resume.as_deref()).await?;
            draft.job_description = read_optional(job_description.as_deref()).await?;

            let id = store.create(draft)?;
            println!("Added application #{}", id);
        }

        Commands::Edit {
            id,
            title,
            company,
            date,
            stage,
            offer,
            resume,
            job_description,
            clear_resume,
            clear_job_description,
        } => {
            let Some(existing) = store.get(id) else {
                println!("Application #{} not found.", id);
                return Ok(());
            };
            let mut draft = ApplicationDraft::from_record(existing);
            if let Some(title) = title {
                draft.job_title = title;
            }
            if let Some(company) = company {
                draft.company = company;
            }
            if let Some(date) = date {
                draft.applied_date = date.format("%Y-%m-%d").to_string();
            }
            if let Some(stage) = stage {
                draft.stage = stage.as_str().to_string();
            }
            if let Some(offer) = offer {
                draft.offer_details = offer;
            }
            if clear_resume {
                draft.resume = None;
            } else if let Some(path) = resume {
                draft.resume = Some(read_attachment(&path).await?);
            }
            if clear_job_description {
                draft.job_description = None;
            } else if let Some(path) = job_description {
                draft.job_description = Some(read_attachment(&path).await?);
            }

            match store.update(id, draft) {
                Ok(()) => println!("Updated application #{}", id),
                Err(TrackerError::NotFound(id)) => {
                    log::warn!("Application #{} vanished before update", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Remove { id } => {
            if store.delete(id) {
                println!("Removed application #{}", id);
            } else {
                println!("Application #{} not found.", id);
            }
        }

        Commands::List { stage } => {
            let records: Vec<&ApplicationRecord> = store
                .records()
                .iter()
                .filter(|r| stage.is_none_or(|s| r.stage == s.as_str()))
                .collect();
            if records.is_empty() {
                println!("No applications found.");
            } else {
                println!(
                    "{:<15} {:<22} {:<28} {:<20} {:<11} {:>5}",
                    "ID", "STAGE", "TITLE", "COMPANY", "APPLIED", "FILES"
                );
                println!("{}", "-".repeat(106));
                for record in records {
                    println!(
                        "{:<15} {:<22} {:<28} {:<20} {:<11} {:>5}",
                        record.id,
                        truncate(&record.stage, 20),
                        truncate(&record.job_title, 26),
                        truncate(&record.company, 18),
                        truncate(&record.applied_date, 11),
                        record.attachment_count()
                    );
                }
            }
        }

        Commands::Show { id } => match store.get(id) {
            Some(record) => print_record(record),
            None => println!("Application #{} not found.", id),
        },

        Commands::Summary => {
            let summary = store.summary();
            println!("Total Applications: {}", summary.total);
            println!("In Progress:        {}", summary.in_progress);
            println!("Offers:             {}", summary.offers);
            println!("Rejected:           {}", summary.rejected);
            println!("Withdrawn:          {}", summary.withdrawn);
        }

        Commands::Stages => {
            for stage in Stage::ALL {
                println!("{}", stage);
            }
        }

        Commands::View {
            id,
            document,
            output,
        } => {
            let record = store
                .get(id)
                .ok_or_else(|| anyhow!("Application #{} not found", id))?;
            let kind = DocumentKind::from(document);
            let attachment = record
                .attachment(kind)
                .ok_or_else(|| anyhow!("Application #{} has no {}", id, kind.label().to_lowercase()))?;

            match (output.is_none(), attachment.view()?) {
                (true, AttachmentView::Text(text)) => {
                    println!("--- {} ---\n{}", attachment.file_name, text);
                }
                _ => {
                    let path = output.unwrap_or_else(|| default_document_path(record, kind, &attachment.file_name));
                    let written = write_attachment(attachment, &path).await?;
                    println!("Saved {} ({} bytes) to {}", attachment.file_name, written, path.display());
                }
            }
        }

        Commands::Export { output } => {
            let now = chrono::Utc::now();
            let document = export_backup(store.records(), now);
            let path = output.unwrap_or_else(|| {
                PathBuf::from(backup_file_name(now.with_timezone(&chrono::Local).date_naive()))
            });
            tokio::fs::write(&path, document.to_json()?)
                .await
                .with_context(|| format!("Failed to write backup to {}", path.display()))?;
            println!("Backup exported successfully! File: {}", path.display());
            println!("Included {} files.", document.metadata.file_count);
        }

        Commands::Import { file, yes } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read backup file: {}", file.display()))?;
            let outcome = import_backup(&mut store, &raw, |prompt| yes || confirm(prompt))
                .map_err(|e| anyhow!("Error reading backup file: {}", e))?;
            match outcome {
                ImportOutcome::Imported(report) => println!("{}", report.message()),
                ImportOutcome::Cancelled => println!("Import cancelled."),
            }
        }

        Commands::Theme { mode } => {
            let current = DisplayMode::load(&db);
            let wanted = match mode {
                ThemeArg::Dark => DisplayMode::Dark,
                ThemeArg::Light => DisplayMode::Light,
                ThemeArg::Toggle => current.toggled(),
            };
            wanted.save(&db);
            println!("Theme: {}", wanted.as_str());
        }

        Commands::Browse => {
            tui::run_browse(&mut store)?;
        }
    }

    Ok(())
}

async fn read_optional(path: Option<&Path>) -> Result<Option<attachment::Attachment>> {
    match path {
        Some(p) => Ok(Some(read_attachment(p).await?)),
        None => Ok(None),
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_record(record: &ApplicationRecord) {
    println!("Application #{}", record.id);
    println!("Title: {}", record.job_title);
    println!("Company: {}", record.company);
    println!("Applied: {}", record.applied_date);
    match record.known_stage() {
        Some(stage) => println!("Stage: {}", stage),
        None => println!("Stage: {} (unrecognized)", record.stage),
    }
    for kind in [DocumentKind::Resume, DocumentKind::JobDescription] {
        if let Some(attachment) = record.attachment(kind) {
            println!(
                "{}: {} [{}]",
                kind.label(),
                attachment.file_name,
                attachment.media_type().unwrap_or("unknown")
            );
        }
    }
    if !record.offer_details.is_empty() {
        println!("\n--- Offer Details ---\n{}", record.offer_details);
    }
}

fn default_document_path(record: &ApplicationRecord, kind: DocumentKind, file_name: &str) -> PathBuf {
    let name = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| {
            let slug = kind.label().to_lowercase().replace(' ', "-");
            format!("{}-{}.bin", record.id, slug)
        });
    PathBuf::from(name)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
