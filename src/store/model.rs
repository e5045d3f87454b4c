//! Request and response bodies of the persistence service.
use serde::{Deserialize, Serialize};

use crate::model::{DocumentType, Feedback, Project, ProjectId, ProjectSummary, Section, SectionId};

#[derive(Serialize, Debug)]
pub struct CreateProjectRequest<'a> {
    pub title: &'a str,
    pub document_type: DocumentType,
    pub topic: &'a str,
    #[serde(rename = "ppt_template", skip_serializing_if = "Option::is_none")]
    pub template_id: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
pub struct ProjectEnvelope {
    pub project: Project,
}

#[derive(Deserialize, Debug)]
pub struct ProjectWithFeedback {
    pub project: Project,
    #[serde(default)]
    pub feedback: Vec<Feedback>,
}

#[derive(Deserialize, Debug)]
pub struct ProjectList {
    #[serde(default)]
    pub projects: Vec<ProjectSummary>,
}

#[derive(Serialize, Debug)]
pub struct NewSection<'a> {
    pub project_id: &'a ProjectId,
    pub title: &'a str,
    pub content: &'a str,
    pub order_index: i32,
}

#[derive(Serialize, Debug)]
pub struct AddSectionsRequest<'a> {
    pub sections: Vec<NewSection<'a>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AddSectionsResponse {
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Serialize, Debug)]
pub struct UpdateSectionRequest<'a> {
    pub section_id: &'a SectionId,
    pub content: &'a str,
}

/// Omitted fields are not serialized so the stored values stay as they are.
#[derive(Serialize, Debug)]
pub struct FeedbackRequest<'a> {
    pub section_id: &'a SectionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<&'a str>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest<'a> {
    pub project_id: &'a ProjectId,
}
