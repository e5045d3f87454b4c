//! Per-project session: the section state machine and the operations that drive it.
//!
//! A session is created when a project is opened and dropped when the user moves
//! on; every keyed map below (in-flight markers, prompt drafts, feedback) lives
//! and dies with it.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, instrument, warn};

use crate::content::ContentService;
use crate::error::{Error, Result};
use crate::http::RequestKey;
use crate::model::{
    derive_project_status, derive_section_state, export_file_name, is_exportable, require_text,
    DocumentType, ExportedDocument, Feedback, FeedbackUpdate, InFlight, Project, ProjectId,
    ProjectSnapshot, ProjectStatus, RefinementRecord, Section, SectionId, SectionState,
};
use crate::retry::RetryPolicy;
use crate::store::ProjectStore;

/// Operations that hold the whole project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkOp {
    GenerateAll,
    Export,
}

impl BulkOp {
    fn describe(&self) -> &'static str {
        match self {
            BulkOp::GenerateAll => "content generation",
            BulkOp::Export => "an export",
        }
    }
}

struct SessionState {
    project: Project,
    feedback: HashMap<SectionId, Feedback>,
    in_flight: HashMap<SectionId, InFlight>,
    prompts: HashMap<SectionId, String>,
    bulk: Option<BulkOp>,
}

impl SessionState {
    fn new(snapshot: ProjectSnapshot) -> Self {
        let mut project = snapshot.project;
        project.sort_sections();
        Self {
            feedback: index_feedback(snapshot.feedback),
            project,
            in_flight: HashMap::new(),
            prompts: HashMap::new(),
            bulk: None,
        }
    }

    /// Persisted truth supersedes whatever was held in memory.
    fn replace_snapshot(&mut self, snapshot: ProjectSnapshot) {
        self.project = snapshot.project;
        self.project.sort_sections();
        self.feedback = index_feedback(snapshot.feedback);
        let project = &self.project;
        self.prompts.retain(|id, _| project.section(id).is_some());
    }

    fn section(&self, id: &SectionId) -> Result<&Section> {
        self.project
            .section(id)
            .ok_or_else(|| Error::validation(format!("unknown section {id}")))
    }

    fn set_content(&mut self, id: &SectionId, content: String) {
        if let Some(section) = self.project.section_mut(id) {
            section.content = Some(content);
        }
    }
}

fn index_feedback(feedback: Vec<Feedback>) -> HashMap<SectionId, Feedback> {
    feedback
        .into_iter()
        .map(|fb| (fb.section_id.clone(), fb))
        .collect()
}

/// Releases the project-wide busy flag.
struct BulkGuard<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for BulkGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.bulk = None;
        state.in_flight.retain(|_, f| *f != InFlight::Generating);
    }
}

/// Releases the per-section refinement marker.
struct RefineGuard<'a> {
    state: &'a Mutex<SessionState>,
    section_id: SectionId,
}

impl Drop for RefineGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .remove(&self.section_id);
    }
}

/// What a bulk generation run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Sections that received content, in the order they were generated.
    pub generated: Vec<SectionId>,
}

pub struct ProjectSession {
    project_id: ProjectId,
    content: Arc<dyn ContentService>,
    store: Arc<dyn ProjectStore>,
    retry: RetryPolicy,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for ProjectSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectSession")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl ProjectSession {
    pub fn new(
        snapshot: ProjectSnapshot,
        content: Arc<dyn ContentService>,
        store: Arc<dyn ProjectStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            project_id: snapshot.project.id.clone(),
            content,
            store,
            retry,
            state: Mutex::new(SessionState::new(snapshot)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Copy of the project as last loaded or written.
    pub fn project(&self) -> Project {
        self.lock().project.clone()
    }

    pub fn sections(&self) -> Vec<Section> {
        self.lock().project.sections.clone()
    }

    pub fn status(&self) -> ProjectStatus {
        let state = self.lock();
        derive_project_status(
            &state.project.sections,
            state.bulk == Some(BulkOp::GenerateAll),
        )
    }

    pub fn section_state(&self, id: &SectionId) -> Option<SectionState> {
        let state = self.lock();
        let section = state.project.section(id)?;
        Some(derive_section_state(section, state.in_flight.get(id).copied()))
    }

    pub fn feedback(&self, id: &SectionId) -> Option<Feedback> {
        self.lock().feedback.get(id).cloned()
    }

    pub fn can_export(&self) -> bool {
        let state = self.lock();
        state.bulk.is_none() && is_exportable(&state.project.sections)
    }

    pub fn set_refinement_prompt(&self, id: &SectionId, prompt: &str) {
        self.lock().prompts.insert(id.clone(), prompt.to_string());
    }

    pub fn refinement_prompt(&self, id: &SectionId) -> Option<String> {
        self.lock().prompts.get(id).cloned()
    }

    /// Re-reads the project from the persistence service. Safe to call at any time.
    #[instrument(skip_all, fields(project = %self.project_id))]
    pub async fn reload(&self) -> Result<()> {
        let store = self.store.as_ref();
        let project_id = &self.project_id;
        let snapshot = self
            .retry
            .run("load project", move || store.get_project(project_id))
            .await?;
        self.lock().replace_snapshot(snapshot);
        Ok(())
    }

    /// Local state already mirrors every successful write, so a failed refresh only warns.
    async fn refresh(&self) {
        if let Err(err) = self.reload().await {
            warn!(?err, project = %self.project_id, "reload after write failed; keeping local state");
        }
    }

    fn begin_bulk(&self, op: BulkOp) -> Result<BulkGuard<'_>> {
        let mut state = self.lock();
        if let Some(running) = state.bulk {
            return Err(Error::Busy(format!(
                "{} is already running for this project",
                running.describe()
            )));
        }
        if !state.in_flight.is_empty() {
            return Err(Error::Busy(format!(
                "cannot start {} while a section is being refined",
                op.describe()
            )));
        }
        state.bulk = Some(op);
        Ok(BulkGuard { state: &self.state })
    }

    fn begin_refine(&self, id: &SectionId) -> Result<(RefineGuard<'_>, Section, DocumentType)> {
        let mut state = self.lock();
        if let Some(running) = state.bulk {
            return Err(Error::Busy(format!(
                "cannot refine while {} is running",
                running.describe()
            )));
        }
        let section = state.section(id)?.clone();
        if !section.has_content() {
            return Err(Error::validation(format!(
                "\"{}\" has no content to refine yet; generate it first",
                section.title
            )));
        }
        if state.in_flight.contains_key(id) {
            return Err(Error::Busy(format!(
                "\"{}\" is already being refined",
                section.title
            )));
        }
        state.in_flight.insert(id.clone(), InFlight::Refining);
        let document_type = state.project.document_type;
        Ok((
            RefineGuard {
                state: &self.state,
                section_id: id.clone(),
            },
            section,
            document_type,
        ))
    }

    /// Generates every empty section, one at a time in `order_index` order.
    ///
    /// Stops at the first failing section. Sections finished before it keep their
    /// new content; the failing one and everything after it stay empty.
    #[instrument(skip_all, fields(project = %self.project_id))]
    pub async fn generate_all(&self) -> Result<GenerationReport> {
        let _guard = self.begin_bulk(BulkOp::GenerateAll)?;
        let (topic, document_type, pending) = {
            let state = self.lock();
            let pending: Vec<Section> = state
                .project
                .sections
                .iter()
                .filter(|s| !s.has_content())
                .cloned()
                .collect();
            (state.project.topic.clone(), state.project.document_type, pending)
        };

        let mut report = GenerationReport::default();
        if pending.is_empty() {
            info!("every section already has content");
            return Ok(report);
        }

        for section in pending {
            self.lock()
                .in_flight
                .insert(section.id.clone(), InFlight::Generating);
            let outcome = self.generate_one(&section, &topic, document_type).await;
            self.lock().in_flight.remove(&section.id);
            match outcome {
                Ok(content) => {
                    self.lock().set_content(&section.id, content);
                    info!(section = %section.title, "section generated");
                    report.generated.push(section.id);
                }
                Err(err) => {
                    warn!(?err, section = %section.title, "generation stopped");
                    return Err(err.in_section(section.title));
                }
            }
        }

        self.refresh().await;
        Ok(report)
    }

    async fn generate_one(
        &self,
        section: &Section,
        topic: &str,
        document_type: DocumentType,
    ) -> Result<String> {
        let content_service = self.content.as_ref();
        let title = section.title.as_str();
        let generated = self
            .retry
            .run("generate section", move || {
                content_service.generate_section(title, topic, document_type)
            })
            .await?;

        let store = self.store.as_ref();
        let section_id = &section.id;
        let text = generated.as_str();
        let key = RequestKey::new();
        self.retry
            .run("save section", move || {
                store.update_section_content(section_id, text, key)
            })
            .await?;
        Ok(generated)
    }

    /// Rewrites one section according to `instruction` and returns the new content.
    ///
    /// On any failure the section keeps its previous content.
    #[instrument(skip_all, fields(project = %self.project_id, section = %section_id))]
    pub async fn refine_section(&self, section_id: &SectionId, instruction: &str) -> Result<String> {
        let instruction = require_text("refinement instruction", instruction)?;
        let (_guard, section, document_type) = self.begin_refine(section_id)?;
        let current = section.content.as_deref().unwrap_or_default();

        let content_service = self.content.as_ref();
        let refined = self
            .retry
            .run("refine section", move || {
                content_service.refine_content(current, instruction, document_type)
            })
            .await
            .map_err(|err| err.in_section(&section.title))?;

        let store = self.store.as_ref();
        let text = refined.as_str();
        let key = RequestKey::new();
        self.retry
            .run("save refinement", move || {
                store.update_section_content(section_id, text, key)
            })
            .await
            .map_err(|err| err.in_section(&section.title))?;
        self.lock().set_content(section_id, refined.clone());

        let record = RefinementRecord::new(section_id.clone(), instruction, &refined);
        if let Err(err) = self
            .store
            .append_refinement_record(&record, RequestKey::new())
            .await
        {
            warn!(?err, section = %section.title, "failed to record refinement");
        }

        info!(section = %section.title, "section refined");
        self.refresh().await;
        Ok(refined)
    }

    /// Refines using the stored prompt draft; the draft is cleared only on success.
    pub async fn refine_with_draft(&self, section_id: &SectionId) -> Result<String> {
        let prompt = self.refinement_prompt(section_id).unwrap_or_default();
        let refined = self.refine_section(section_id, &prompt).await?;
        let mut state = self.lock();
        // A draft edited while the call was running is kept.
        if state.prompts.get(section_id) == Some(&prompt) {
            state.prompts.remove(section_id);
        }
        Ok(refined)
    }

    pub async fn set_liked(&self, section_id: &SectionId, is_liked: bool) -> Result<()> {
        self.record_feedback(section_id, FeedbackUpdate::liked(is_liked))
            .await
    }

    pub async fn set_comment(&self, section_id: &SectionId, comment: &str) -> Result<()> {
        self.record_feedback(section_id, FeedbackUpdate::comment(comment))
            .await
    }

    /// Upserts one field of the section's feedback. Independent of content state.
    #[instrument(skip_all, fields(project = %self.project_id, section = %section_id))]
    pub async fn record_feedback(&self, section_id: &SectionId, update: FeedbackUpdate) -> Result<()> {
        self.lock().section(section_id)?;

        let store = self.store.as_ref();
        let update_ref = &update;
        let key = RequestKey::new();
        self.retry
            .run("save feedback", move || {
                store.upsert_feedback(section_id, update_ref, key)
            })
            .await?;

        self.lock()
            .feedback
            .entry(section_id.clone())
            .or_insert_with(|| Feedback::new(section_id.clone()))
            .apply(&update);
        Ok(())
    }

    /// Downloads the rendered file. Refused locally while any section is empty.
    #[instrument(skip_all, fields(project = %self.project_id))]
    pub async fn export(&self) -> Result<ExportedDocument> {
        let _guard = self.begin_bulk(BulkOp::Export)?;
        let (title, document_type, missing) = {
            let state = self.lock();
            let missing: Vec<String> = state
                .project
                .empty_sections()
                .into_iter()
                .map(str::to_string)
                .collect();
            let missing = if state.project.sections.is_empty() {
                vec!["(no sections)".to_string()]
            } else {
                missing
            };
            (state.project.title.clone(), state.project.document_type, missing)
        };
        if !missing.is_empty() {
            return Err(Error::Export(format!(
                "generate content for every section first; still empty: {}",
                missing.join(", ")
            )));
        }

        let store = self.store.as_ref();
        let project_id = &self.project_id;
        let payload = self
            .retry
            .run("export", move || store.export_document(project_id))
            .await
            .map_err(Error::into_export)?;

        if let Some(received) = payload
            .content_type
            .as_deref()
            .and_then(DocumentType::from_content_type)
        {
            if received != document_type {
                return Err(Error::Export(format!(
                    "expected a {} file but the service sent a {} file",
                    document_type.extension(),
                    received.extension()
                )));
            }
        }
        if payload.bytes.is_empty() {
            return Err(Error::Export("the service returned an empty file".into()));
        }

        let file_name = export_file_name(&title, document_type);
        info!(file = %file_name, size = payload.bytes.len(), "project exported");
        Ok(ExportedDocument {
            file_name,
            content_type: document_type.content_type(),
            bytes: payload.bytes,
        })
    }
}
