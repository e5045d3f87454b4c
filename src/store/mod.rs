//! Client for the persistence service: projects, sections, feedback,
//! refinement records and export.
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::http::{HttpApi, RequestKey};
use crate::model::{
    DocumentType, ExportPayload, FeedbackUpdate, Project, ProjectId, ProjectSnapshot, ProjectSummary,
    RefinementRecord, Section, SectionId,
};

pub mod model;

use model::{
    AddSectionsRequest, AddSectionsResponse, CreateProjectRequest, ExportRequest,
    FeedbackRequest, NewSection, ProjectEnvelope, ProjectList, ProjectWithFeedback,
    UpdateSectionRequest,
};

/// Fields needed to create a project row.
#[derive(Debug, Clone, Copy)]
pub struct NewProject<'a> {
    pub title: &'a str,
    pub topic: &'a str,
    pub document_type: DocumentType,
    pub template_id: Option<&'a str>,
}

/// Writes take a [`RequestKey`] so a retried call can be recognised by the service.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, new: NewProject<'_>, key: RequestKey) -> Result<Project>;

    async fn add_sections(
        &self,
        project_id: &ProjectId,
        titles: &[String],
        key: RequestKey,
    ) -> Result<Vec<Section>>;

    async fn get_project(&self, id: &ProjectId) -> Result<ProjectSnapshot>;

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>>;

    async fn update_section_content(
        &self,
        section_id: &SectionId,
        content: &str,
        key: RequestKey,
    ) -> Result<()>;

    async fn upsert_feedback(
        &self,
        section_id: &SectionId,
        update: &FeedbackUpdate,
        key: RequestKey,
    ) -> Result<()>;

    async fn append_refinement_record(
        &self,
        record: &RefinementRecord,
        key: RequestKey,
    ) -> Result<()>;

    async fn export_document(&self, project_id: &ProjectId) -> Result<ExportPayload>;
}

#[derive(Debug, Clone)]
pub struct StoreClient {
    api: HttpApi,
}

impl StoreClient {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }

    async fn post_ok<B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        key: RequestKey,
    ) -> Result<()> {
        let request = self.api.build_post(path, body, Some(key))?;
        self.api.send(request).await?;
        Ok(())
    }
}

/// Builds the section rows for a new project: empty content, contiguous `order_index`.
pub fn new_section_rows<'a>(project_id: &'a ProjectId, titles: &'a [String]) -> Vec<NewSection<'a>> {
    titles
        .iter()
        .enumerate()
        .map(|(idx, title)| NewSection {
            project_id,
            title: title.trim(),
            content: "",
            order_index: idx as i32,
        })
        .collect()
}

/// Joins on the service side don't guarantee section order.
fn into_snapshot(res: ProjectWithFeedback) -> ProjectSnapshot {
    let mut project = res.project;
    project.sort_sections();
    ProjectSnapshot {
        project,
        feedback: res.feedback,
    }
}

#[async_trait]
impl ProjectStore for StoreClient {
    #[instrument(skip_all)]
    async fn create_project(&self, new: NewProject<'_>, key: RequestKey) -> Result<Project> {
        let body = CreateProjectRequest {
            title: new.title,
            document_type: new.document_type,
            topic: new.topic,
            template_id: new.template_id,
        };
        let request = self.api.build_post("projects/create", &body, Some(key))?;
        let res: ProjectEnvelope = self.api.send_json(request).await?;
        debug!(project = %res.project.id, "project created");
        Ok(res.project)
    }

    #[instrument(skip_all, fields(project = %project_id, count = titles.len()))]
    async fn add_sections(
        &self,
        project_id: &ProjectId,
        titles: &[String],
        key: RequestKey,
    ) -> Result<Vec<Section>> {
        let body = AddSectionsRequest {
            sections: new_section_rows(project_id, titles),
        };
        let request = self.api.build_post("sections/add", &body, Some(key))?;
        let mut res: AddSectionsResponse = self.api.send_json(request).await?;
        res.sections.sort_by_key(|s| s.order_index);
        Ok(res.sections)
    }

    #[instrument(skip_all, fields(project = %id))]
    async fn get_project(&self, id: &ProjectId) -> Result<ProjectSnapshot> {
        let request = self.api.build_get_item("projects", id.0.as_str())?;
        let res: ProjectWithFeedback = self.api.send_json(request).await?;
        Ok(into_snapshot(res))
    }

    #[instrument(skip_all)]
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let request = self.api.build_get("projects")?;
        let mut res: ProjectList = self.api.send_json(request).await?;
        res.projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(res.projects)
    }

    #[instrument(skip_all, fields(section = %section_id))]
    async fn update_section_content(
        &self,
        section_id: &SectionId,
        content: &str,
        key: RequestKey,
    ) -> Result<()> {
        self.post_ok(
            "sections/update",
            &UpdateSectionRequest {
                section_id,
                content,
            },
            key,
        )
        .await
    }

    #[instrument(skip_all, fields(section = %section_id))]
    async fn upsert_feedback(
        &self,
        section_id: &SectionId,
        update: &FeedbackUpdate,
        key: RequestKey,
    ) -> Result<()> {
        self.post_ok(
            "feedback",
            &FeedbackRequest {
                section_id,
                is_liked: update.is_liked,
                comment: update.comment.as_deref(),
            },
            key,
        )
        .await
    }

    #[instrument(skip_all, fields(section = %record.section_id))]
    async fn append_refinement_record(
        &self,
        record: &RefinementRecord,
        key: RequestKey,
    ) -> Result<()> {
        self.post_ok("refinements/create", record, key).await
    }

    #[instrument(skip_all, fields(project = %project_id))]
    async fn export_document(&self, project_id: &ProjectId) -> Result<ExportPayload> {
        let request = self
            .api
            .build_post("export-document", &ExportRequest { project_id }, None)?;
        let (bytes, content_type) = self.api.send_bytes(request).await?;
        debug!(size = bytes.len(), "export received");
        Ok(ExportPayload {
            bytes,
            content_type,
        })
    }
}
