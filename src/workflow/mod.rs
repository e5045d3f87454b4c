//! Project generation workflow: everything before a project is open
//! (outline suggestion, creation, listing) and the entry point into a
//! [`ProjectSession`].
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::content::ContentService;
use crate::error::Result;
use crate::http::RequestKey;
use crate::model::{
    require_text, DocumentType, OutlineItem, ProjectDraft, ProjectId, ProjectSummary,
};
use crate::retry::RetryPolicy;
use crate::store::{NewProject, ProjectStore};

pub mod session;

pub use session::{GenerationReport, ProjectSession};

#[derive(Clone)]
pub struct Workflow {
    content: Arc<dyn ContentService>,
    store: Arc<dyn ProjectStore>,
    retry: RetryPolicy,
}

impl Workflow {
    pub fn new(
        content: Arc<dyn ContentService>,
        store: Arc<dyn ProjectStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            content,
            store,
            retry,
        }
    }

    /// Proposed section titles for `topic`. Feed them to [`ProjectDraft::apply_outline`].
    #[instrument(skip_all, fields(document_type = %document_type))]
    pub async fn suggest_outline(
        &self,
        topic: &str,
        document_type: DocumentType,
    ) -> Result<Vec<OutlineItem>> {
        let topic = require_text("topic", topic)?;
        let content = self.content.as_ref();
        let outline = self
            .retry
            .run("generate outline", move || {
                content.generate_outline(topic, document_type)
            })
            .await?;
        info!(sections = outline.len(), "outline suggested");
        Ok(outline)
    }

    /// Creates the project and its empty sections, then opens it.
    #[instrument(skip_all)]
    pub async fn create_project(&self, draft: &ProjectDraft) -> Result<ProjectSession> {
        draft.validate()?;
        let store = self.store.as_ref();
        let new = NewProject {
            title: draft.title.trim(),
            topic: draft.topic.trim(),
            document_type: draft.document_type,
            template_id: draft.template(),
        };

        let key = RequestKey::new();
        let project = self
            .retry
            .run("create project", move || store.create_project(new, key))
            .await?;
        info!(project = %project.id, "project created");

        let project_id = &project.id;
        let titles: Vec<String> = draft
            .section_titles
            .iter()
            .map(|t| t.trim().to_string())
            .collect();
        let titles = titles.as_slice();
        let key = RequestKey::new();
        if let Err(err) = self
            .retry
            .run("add sections", move || {
                store.add_sections(project_id, titles, key)
            })
            .await
        {
            warn!(?err, project = %project.id, "project created without sections");
            return Err(err);
        }

        self.open_project(&project.id).await
    }

    /// Loads a project and starts a session for it.
    #[instrument(skip_all, fields(project = %id))]
    pub async fn open_project(&self, id: &ProjectId) -> Result<ProjectSession> {
        let store = self.store.as_ref();
        let snapshot = self
            .retry
            .run("load project", move || store.get_project(id))
            .await?;
        Ok(ProjectSession::new(
            snapshot,
            self.content.clone(),
            self.store.clone(),
            self.retry.clone(),
        ))
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let store = self.store.as_ref();
        self.retry
            .run("list projects", move || store.list_projects())
            .await
    }
}
