use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(pub String);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        ProjectId(s.to_string())
    }
}

impl From<&str> for SectionId {
    fn from(s: &str) -> Self {
        SectionId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DocumentType {
    #[serde(rename = "word")]
    Document,
    #[serde(rename = "powerpoint")]
    Presentation,
}

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

impl DocumentType {
    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Document => "word",
            DocumentType::Presentation => "powerpoint",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentType::Document => "docx",
            DocumentType::Presentation => "pptx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentType::Document => DOCX_CONTENT_TYPE,
            DocumentType::Presentation => PPTX_CONTENT_TYPE,
        }
    }

    /// What a section is called for this type of document.
    pub fn section_noun(&self) -> &'static str {
        match self {
            DocumentType::Document => "Section",
            DocumentType::Presentation => "Slide",
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case(DOCX_CONTENT_TYPE) {
            Some(DocumentType::Document)
        } else if essence.eq_ignore_ascii_case(PPTX_CONTENT_TYPE) {
            Some(DocumentType::Presentation)
        } else {
            None
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "word" | "document" | "docx" => Ok(DocumentType::Document),
            "powerpoint" | "presentation" | "pptx" | "slides" => Ok(DocumentType::Presentation),
            other => Err(Error::validation(format!(
                "unknown document type '{other}' (expected word or powerpoint)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub project_id: ProjectId,
    pub title: String,
    pub order_index: i32,
    #[serde(default)]
    pub content: Option<String>,
}

impl Section {
    /// Null and empty content both mean "not generated yet".
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub topic: String,
    pub document_type: DocumentType,
    #[serde(default, rename = "ppt_template")]
    pub presentation_template: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Project {
    pub fn section(&self, id: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| &s.id == id)
    }

    pub fn section_mut(&mut self, id: &SectionId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| &s.id == id)
    }

    /// Puts sections in `order_index` order; ties keep their received order.
    pub fn sort_sections(&mut self) {
        self.sections.sort_by_key(|s| s.order_index);
    }

    /// Titles of the sections that still have no content, in order.
    pub fn empty_sections(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| !s.has_content())
            .map(|s| s.title.as_str())
            .collect()
    }
}

/// Dashboard listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub title: String,
    pub topic: String,
    pub document_type: DocumentType,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub section_id: SectionId,
    #[serde(default)]
    pub is_liked: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Partial feedback write: `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackUpdate {
    pub is_liked: Option<bool>,
    pub comment: Option<String>,
}

impl FeedbackUpdate {
    pub fn liked(is_liked: bool) -> Self {
        Self {
            is_liked: Some(is_liked),
            comment: None,
        }
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            is_liked: None,
            comment: Some(comment.into()),
        }
    }
}

impl Feedback {
    /// Blank record for a section that has no feedback yet.
    pub fn new(section_id: SectionId) -> Self {
        Self {
            section_id,
            is_liked: None,
            comment: None,
        }
    }

    pub fn apply(&mut self, update: &FeedbackUpdate) {
        if let Some(liked) = update.is_liked {
            self.is_liked = Some(liked);
        }
        if let Some(comment) = &update.comment {
            self.comment = Some(comment.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefinementRecord {
    pub section_id: SectionId,
    pub prompt: String,
    #[serde(rename = "result")]
    pub result_content: String,
    pub created_at: DateTime<Utc>,
}

impl RefinementRecord {
    pub fn new(section_id: SectionId, prompt: &str, result_content: &str) -> Self {
        Self {
            section_id,
            prompt: prompt.to_string(),
            result_content: result_content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A proposed section from the content service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Consistent read of a project, its sections (sorted by `order_index`) and their feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub project: Project,
    pub feedback: Vec<Feedback>,
}

/// Bytes returned by the export endpoint.
#[derive(Debug, Clone)]
pub struct ExportPayload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// A finished export, ready to be written to disk.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    Draft,
    Generating,
    Ready,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Generating => "generating",
            ProjectStatus::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    Empty,
    Generating,
    Generated,
    Refining,
}

impl SectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionState::Empty => "empty",
            SectionState::Generating => "generating",
            SectionState::Generated => "generated",
            SectionState::Refining => "refining",
        }
    }
}

/// Remote call currently running for a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InFlight {
    Generating,
    Refining,
}

/// Ready iff every section has content; a running bulk generation shows as Generating.
pub fn derive_project_status(sections: &[Section], generating: bool) -> ProjectStatus {
    if generating {
        ProjectStatus::Generating
    } else if is_exportable(sections) {
        ProjectStatus::Ready
    } else {
        ProjectStatus::Draft
    }
}

pub fn derive_section_state(section: &Section, in_flight: Option<InFlight>) -> SectionState {
    match in_flight {
        Some(InFlight::Generating) => SectionState::Generating,
        Some(InFlight::Refining) => SectionState::Refining,
        None if section.has_content() => SectionState::Generated,
        None => SectionState::Empty,
    }
}

pub fn is_exportable(sections: &[Section]) -> bool {
    !sections.is_empty() && sections.iter().all(Section::has_content)
}

static UNSAFE_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).expect("valid file name regex"));

/// `<title>.<docx|pptx>`, with characters that are invalid in file names replaced.
pub fn export_file_name(title: &str, document_type: DocumentType) -> String {
    let cleaned = UNSAFE_FILE_CHARS.replace_all(title.trim(), "_");
    let stem = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{}.{}", stem, document_type.extension())
}

/// Trimmed, non-blank text or a validation error naming `field`.
pub fn require_text<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{field} must not be blank")));
    }
    Ok(trimmed)
}

/// User input collected before a project exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDraft {
    pub title: String,
    pub topic: String,
    pub document_type: DocumentType,
    pub presentation_template: Option<String>,
    pub section_titles: Vec<String>,
}

impl ProjectDraft {
    pub fn new(title: &str, topic: &str, document_type: DocumentType) -> Self {
        Self {
            title: title.to_string(),
            topic: topic.to_string(),
            document_type,
            presentation_template: None,
            section_titles: Vec::new(),
        }
    }

    /// Replaces every section title with the outline's titles; never merges.
    pub fn apply_outline(&mut self, outline: &[OutlineItem]) {
        self.section_titles = outline.iter().map(|item| item.title.clone()).collect();
    }

    pub fn validate(&self) -> Result<()> {
        require_text("project title", &self.title)?;
        require_text("topic", &self.topic)?;
        if self.section_titles.is_empty() {
            return Err(Error::validation("a project needs at least one section"));
        }
        for (idx, title) in self.section_titles.iter().enumerate() {
            if title.trim().is_empty() {
                return Err(Error::validation(format!(
                    "{} {} has a blank title",
                    self.document_type.section_noun(),
                    idx + 1
                )));
            }
        }
        Ok(())
    }

    /// Template only travels with presentations.
    pub fn template(&self) -> Option<&str> {
        match self.document_type {
            DocumentType::Presentation => self
                .presentation_template
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty()),
            DocumentType::Document => None,
        }
    }
}
