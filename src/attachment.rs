//! Attachments embedded inline in a record as `data:` URLs.
//!
//! The media type tag rides along with the payload so a viewer can tell a PDF
//! from plain text from anything else without looking at the file name.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use std::path::Path;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    /// `data:<media-type>;base64,<payload>`
    pub encoded_content: String,
}

/// Three-way split a viewer dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Pdf,
    Text,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentView {
    /// Raw PDF bytes, for a paginated renderer.
    Pdf(Vec<u8>),
    Text(String),
    /// Not previewable; offer the bytes as a download.
    Download(Vec<u8>),
}

impl Attachment {
    pub fn encode(file_name: &str, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.to_string(),
            encoded_content: format!(
                "data:{};base64,{}",
                media_type_for(file_name),
                B64.encode(bytes)
            ),
        }
    }

    /// Builds an attachment from the flat `(fileName, file)` pair. Missing or
    /// empty content means there is no attachment.
    pub fn from_parts(file_name: String, encoded_content: Option<String>) -> Option<Self> {
        match encoded_content {
            Some(content) if !content.is_empty() => Some(Self {
                file_name,
                encoded_content: content,
            }),
            _ => None,
        }
    }

    pub fn into_parts(attachment: Option<Self>) -> (String, Option<String>) {
        match attachment {
            Some(a) => (a.file_name, Some(a.encoded_content)),
            None => (String::new(), None),
        }
    }

    pub fn media_type(&self) -> Option<&str> {
        let (header, _) = split_data_url(&self.encoded_content)?;
        let media_type = header.split(';').next().unwrap_or_default();
        if media_type.is_empty() {
            // RFC 2397 default
            Some("text/plain")
        } else {
            Some(media_type)
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        if self.encoded_content.starts_with("data:application/pdf") {
            AttachmentKind::Pdf
        } else if self.encoded_content.starts_with("data:text/") {
            AttachmentKind::Text
        } else {
            AttachmentKind::Other
        }
    }

    /// Recovers the original file bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let (header, payload) = split_data_url(&self.encoded_content)
            .ok_or_else(|| anyhow!("'{}' is not a data URL", self.file_name))?;

        if header.split(';').any(|param| param == "base64") {
            B64.decode(payload.trim())
                .with_context(|| format!("Invalid base64 payload in '{}'", self.file_name))
        } else {
            Ok(payload.as_bytes().to_vec())
        }
    }

    pub fn view(&self) -> Result<AttachmentView> {
        let bytes = self.decode()?;
        Ok(match self.kind() {
            AttachmentKind::Pdf => AttachmentView::Pdf(bytes),
            AttachmentKind::Text => AttachmentView::Text(String::from_utf8_lossy(&bytes).into_owned()),
            AttachmentKind::Other => AttachmentView::Download(bytes),
        })
    }

    /// Approximate decoded size, without decoding.
    pub fn approx_size(&self) -> usize {
        match split_data_url(&self.encoded_content) {
            Some((header, payload)) if header.ends_with(";base64") => {
                let padding = payload.chars().rev().take_while(|c| *c == '=').count();
                (payload.len() / 4 * 3).saturating_sub(padding)
            }
            Some((_, payload)) => payload.len(),
            None => 0,
        }
    }
}

fn split_data_url(content: &str) -> Option<(&str, &str)> {
    content.strip_prefix("data:")?.split_once(',')
}

pub fn media_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "rtf" => "application/rtf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => FALLBACK_MEDIA_TYPE,
    }
}

/// Reads a file from disk and embeds it.
pub async fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read attachment: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Attachment::encode(&file_name, &bytes))
}

/// Writes the decoded bytes unchanged, whatever the media type. Returns the
/// number of bytes written.
pub async fn write_attachment(attachment: &Attachment, path: &Path) -> Result<usize> {
    let bytes = attachment.decode()?;
    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(bytes.len())
}
