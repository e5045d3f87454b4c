#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use docsmith::content::ContentService;
use docsmith::error::{Error, Result};
use docsmith::http::RequestKey;
use docsmith::model::{
    DocumentType, ExportPayload, Feedback, FeedbackUpdate, OutlineItem, Project, ProjectId,
    ProjectSnapshot, ProjectSummary, RefinementRecord, Section, SectionId,
};
use docsmith::retry::RetryPolicy;
use docsmith::store::{NewProject, ProjectStore};
use docsmith::workflow::Workflow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentCall {
    Outline { topic: String },
    Section { title: String },
    Refine { current: String, instruction: String },
}

/// Content service fake. Sections fail when their title is listed in `fail_titles`;
/// refinements pop scripted responses first and otherwise append " (refined)".
#[derive(Clone, Default)]
pub struct RecordingContent {
    calls: Arc<Mutex<Vec<ContentCall>>>,
    fail_titles: Arc<Mutex<HashSet<String>>>,
    outline: Arc<Mutex<Vec<OutlineItem>>>,
    refine_responses: Arc<Mutex<VecDeque<Result<String>>>>,
    section_responses: Arc<Mutex<VecDeque<Result<String>>>>,
    /// When set, refining content equal to the key waits: it signals the first
    /// `Notify` on entry, then waits on the second.
    gates: Arc<Mutex<HashMap<String, (Arc<Notify>, Arc<Notify>)>>>,
    /// Same as `gates`, keyed by the title of the section being generated.
    section_gates: Arc<Mutex<HashMap<String, (Arc<Notify>, Arc<Notify>)>>>,
}

impl RecordingContent {
    pub async fn fail_on(&self, title: &str) {
        self.fail_titles.lock().await.insert(title.to_string());
    }

    pub async fn set_outline(&self, titles: &[&str]) {
        *self.outline.lock().await = titles
            .iter()
            .map(|t| OutlineItem {
                title: t.to_string(),
                description: String::new(),
            })
            .collect();
    }

    pub async fn push_refine(&self, response: Result<String>) {
        self.refine_responses.lock().await.push_back(response);
    }

    pub async fn push_section(&self, response: Result<String>) {
        self.section_responses.lock().await.push_back(response);
    }

    pub async fn gate(&self, content: &str) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.gates
            .lock()
            .await
            .insert(content.to_string(), (entered.clone(), release.clone()));
        (entered, release)
    }

    pub async fn gate_section(&self, title: &str) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.section_gates
            .lock()
            .await
            .insert(title.to_string(), (entered.clone(), release.clone()));
        (entered, release)
    }

    pub async fn calls(&self) -> Vec<ContentCall> {
        self.calls.lock().await.clone()
    }

    pub async fn section_titles(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                ContentCall::Section { title } => Some(title.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ContentService for RecordingContent {
    async fn generate_outline(
        &self,
        topic: &str,
        _document_type: DocumentType,
    ) -> Result<Vec<OutlineItem>> {
        self.calls.lock().await.push(ContentCall::Outline {
            topic: topic.to_string(),
        });
        Ok(self.outline.lock().await.clone())
    }

    async fn generate_section(
        &self,
        title: &str,
        topic: &str,
        _document_type: DocumentType,
    ) -> Result<String> {
        self.calls.lock().await.push(ContentCall::Section {
            title: title.to_string(),
        });
        let gate = self.section_gates.lock().await.get(title).cloned();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }
        if self.fail_titles.lock().await.contains(title) {
            return Err(Error::generation(Some(500), "upstream model unavailable"));
        }
        if let Some(response) = self.section_responses.lock().await.pop_front() {
            return response;
        }
        Ok(format!("{title} about {topic}"))
    }

    async fn refine_content(
        &self,
        current_content: &str,
        instruction: &str,
        _document_type: DocumentType,
    ) -> Result<String> {
        self.calls.lock().await.push(ContentCall::Refine {
            current: current_content.to_string(),
            instruction: instruction.to_string(),
        });
        let gate = self.gates.lock().await.get(current_content).cloned();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }
        if let Some(response) = self.refine_responses.lock().await.pop_front() {
            return response;
        }
        Ok(format!("{current_content} (refined)"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateProject(String),
    AddSections(Vec<String>),
    GetProject,
    ListProjects,
    UpdateSection(SectionId, String),
    Feedback(SectionId, FeedbackUpdate),
    Refinement(SectionId),
    Export,
}

#[derive(Default)]
struct StoreState {
    projects: HashMap<ProjectId, Project>,
    feedback: HashMap<SectionId, Feedback>,
    refinements: Vec<RefinementRecord>,
    calls: Vec<StoreCall>,
    keys: Vec<RequestKey>,
    fail_updates: HashSet<SectionId>,
    fail_refinement_records: bool,
    fail_add_sections: bool,
    update_failures: VecDeque<Error>,
    export_response: Option<Result<ExportPayload>>,
    next_id: u32,
}

/// In-memory persistence fake with upsert semantics matching the real service.
#[derive(Clone, Default)]
pub struct RecordingStore {
    state: Arc<Mutex<StoreState>>,
}

impl RecordingStore {
    /// Seeds a project whose sections are named by `titles`, all empty.
    pub async fn seed(&self, title: &str, document_type: DocumentType, titles: &[&str]) -> ProjectId {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = ProjectId(format!("p{}", state.next_id));
        let sections = titles
            .iter()
            .enumerate()
            .map(|(idx, t)| Section {
                id: SectionId(format!("{}-s{}", id, idx)),
                project_id: id.clone(),
                title: t.to_string(),
                order_index: idx as i32,
                content: Some(String::new()),
            })
            .collect();
        state.projects.insert(
            id.clone(),
            Project {
                id: id.clone(),
                title: title.to_string(),
                topic: "Rust in production".to_string(),
                document_type,
                presentation_template: None,
                sections,
            },
        );
        id
    }

    pub async fn set_content(&self, section_id: &SectionId, content: &str) {
        let mut state = self.state.lock().await;
        for project in state.projects.values_mut() {
            if let Some(section) = project.section_mut(section_id) {
                section.content = Some(content.to_string());
            }
        }
    }

    pub async fn fail_update_for(&self, section_id: &SectionId) {
        self.state.lock().await.fail_updates.insert(section_id.clone());
    }

    pub async fn push_update_failure(&self, err: Error) {
        self.state.lock().await.update_failures.push_back(err);
    }

    pub async fn fail_refinement_records(&self) {
        self.state.lock().await.fail_refinement_records = true;
    }

    pub async fn fail_add_sections(&self) {
        self.state.lock().await.fail_add_sections = true;
    }

    pub async fn set_export(&self, response: Result<ExportPayload>) {
        self.state.lock().await.export_response = Some(response);
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn keys(&self) -> Vec<RequestKey> {
        self.state.lock().await.keys.clone()
    }

    pub async fn refinements(&self) -> Vec<RefinementRecord> {
        self.state.lock().await.refinements.clone()
    }

    pub async fn stored_feedback(&self, section_id: &SectionId) -> Option<Feedback> {
        self.state.lock().await.feedback.get(section_id).cloned()
    }

    pub async fn stored_content(&self, section_id: &SectionId) -> Option<String> {
        let state = self.state.lock().await;
        state
            .projects
            .values()
            .find_map(|p| p.section(section_id))
            .and_then(|s| s.content.clone())
    }

    pub async fn project_count(&self) -> usize {
        self.state.lock().await.projects.len()
    }

    pub async fn export_calls(&self) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|c| matches!(c, StoreCall::Export))
            .count()
    }
}

#[async_trait]
impl ProjectStore for RecordingStore {
    async fn create_project(&self, new: NewProject<'_>, key: RequestKey) -> Result<Project> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::CreateProject(new.title.to_string()));
        state.keys.push(key);
        state.next_id += 1;
        let project = Project {
            id: ProjectId(format!("p{}", state.next_id)),
            title: new.title.to_string(),
            topic: new.topic.to_string(),
            document_type: new.document_type,
            presentation_template: new.template_id.map(str::to_string),
            sections: Vec::new(),
        };
        state.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn add_sections(
        &self,
        project_id: &ProjectId,
        titles: &[String],
        key: RequestKey,
    ) -> Result<Vec<Section>> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::AddSections(titles.to_vec()));
        state.keys.push(key);
        if state.fail_add_sections {
            return Err(Error::remote(Some(400), "Failed to add sections"));
        }
        let project = state
            .projects
            .get_mut(project_id)
            .ok_or_else(|| Error::remote(Some(404), "Project not found"))?;
        project.sections = titles
            .iter()
            .enumerate()
            .map(|(idx, t)| Section {
                id: SectionId(format!("{}-s{}", project_id, idx)),
                project_id: project_id.clone(),
                title: t.clone(),
                order_index: idx as i32,
                content: Some(String::new()),
            })
            .collect();
        Ok(project.sections.clone())
    }

    async fn get_project(&self, id: &ProjectId) -> Result<ProjectSnapshot> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::GetProject);
        let mut project = state
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| Error::remote(Some(404), "Project not found"))?;
        project.sections.sort_by_key(|s| s.order_index);
        let feedback = project
            .sections
            .iter()
            .filter_map(|s| state.feedback.get(&s.id).cloned())
            .collect();
        Ok(ProjectSnapshot { project, feedback })
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::ListProjects);
        let mut projects: Vec<ProjectSummary> = state
            .projects
            .values()
            .map(|p| ProjectSummary {
                id: p.id.clone(),
                title: p.title.clone(),
                topic: p.topic.clone(),
                document_type: p.document_type,
                updated_at: None,
            })
            .collect();
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(projects)
    }

    async fn update_section_content(
        &self,
        section_id: &SectionId,
        content: &str,
        key: RequestKey,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(StoreCall::UpdateSection(section_id.clone(), content.to_string()));
        state.keys.push(key);
        if let Some(err) = state.update_failures.pop_front() {
            return Err(err);
        }
        if state.fail_updates.contains(section_id) {
            return Err(Error::remote(Some(500), "Failed to update section"));
        }
        for project in state.projects.values_mut() {
            if let Some(section) = project.section_mut(section_id) {
                section.content = Some(content.to_string());
                return Ok(());
            }
        }
        Err(Error::remote(Some(404), "Section not found"))
    }

    async fn upsert_feedback(
        &self,
        section_id: &SectionId,
        update: &FeedbackUpdate,
        key: RequestKey,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(StoreCall::Feedback(section_id.clone(), update.clone()));
        state.keys.push(key);
        state
            .feedback
            .entry(section_id.clone())
            .or_insert_with(|| Feedback::new(section_id.clone()))
            .apply(update);
        Ok(())
    }

    async fn append_refinement_record(
        &self,
        record: &RefinementRecord,
        key: RequestKey,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::Refinement(record.section_id.clone()));
        state.keys.push(key);
        if state.fail_refinement_records {
            return Err(Error::remote(Some(500), "Failed to save refinement"));
        }
        state.refinements.push(record.clone());
        Ok(())
    }

    async fn export_document(&self, _project_id: &ProjectId) -> Result<ExportPayload> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::Export);
        match state.export_response.take() {
            Some(response) => response,
            None => Ok(ExportPayload {
                bytes: b"PK\x03\x04fake".to_vec(),
                content_type: None,
            }),
        }
    }
}

pub fn workflow(content: &RecordingContent, store: &RecordingStore) -> Workflow {
    Workflow::new(
        Arc::new(content.clone()),
        Arc::new(store.clone()),
        RetryPolicy::none(),
    )
}

pub fn retrying_workflow(
    content: &RecordingContent,
    store: &RecordingStore,
    attempts: u32,
) -> Workflow {
    Workflow::new(
        Arc::new(content.clone()),
        Arc::new(store.clone()),
        RetryPolicy::new(attempts, std::time::Duration::ZERO, std::time::Duration::ZERO),
    )
}
