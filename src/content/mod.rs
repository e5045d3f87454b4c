//! Client for the AI content service: outlines, section drafts and refinements.
//!
//! Stateless and retry-free; the workflow decides when to call again.
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::http::HttpApi;
use crate::model::{require_text, DocumentType, OutlineItem};

pub mod model;

use model::{
    ContentResponse, GenerateContentRequest, OutlineRequest, OutlineResponse,
    RefineContentRequest,
};

#[async_trait]
pub trait ContentService: Send + Sync {
    async fn generate_outline(
        &self,
        topic: &str,
        document_type: DocumentType,
    ) -> Result<Vec<OutlineItem>>;

    async fn generate_section(
        &self,
        title: &str,
        topic: &str,
        document_type: DocumentType,
    ) -> Result<String>;

    async fn refine_content(
        &self,
        current_content: &str,
        instruction: &str,
        document_type: DocumentType,
    ) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ContentClient {
    api: HttpApi,
}

impl ContentClient {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }

    async fn post_for_content<B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String> {
        let request = self.api.build_post(path, body, None)?;
        let res: ContentResponse = self
            .api
            .send_json(request)
            .await
            .map_err(Error::into_generation)?;
        non_empty_content(res.content)
    }
}

fn non_empty_content(content: Option<String>) -> Result<String> {
    content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::generation(None, "the service returned no content"))
}

/// Keeps items with a title, trimmed; fails when nothing usable is left.
pub fn clean_outline(items: Vec<OutlineItem>) -> Result<Vec<OutlineItem>> {
    let cleaned: Vec<OutlineItem> = items
        .into_iter()
        .filter_map(|item| {
            let title = item.title.trim();
            (!title.is_empty()).then(|| OutlineItem {
                title: title.to_string(),
                description: item.description.trim().to_string(),
            })
        })
        .collect();
    if cleaned.is_empty() {
        return Err(Error::generation(None, "the outline came back empty"));
    }
    Ok(cleaned)
}

#[async_trait]
impl ContentService for ContentClient {
    #[instrument(skip_all, fields(document_type = %document_type))]
    async fn generate_outline(
        &self,
        topic: &str,
        document_type: DocumentType,
    ) -> Result<Vec<OutlineItem>> {
        let topic = require_text("topic", topic)?;
        let request = self.api.build_post(
            "generate-outline",
            &OutlineRequest {
                topic,
                document_type,
            },
            None,
        )?;
        let res: OutlineResponse = self
            .api
            .send_json(request)
            .await
            .map_err(Error::into_generation)?;
        debug!(items = res.outline.len(), "outline received");
        clean_outline(res.outline)
    }

    #[instrument(skip_all, fields(section = %title))]
    async fn generate_section(
        &self,
        title: &str,
        topic: &str,
        document_type: DocumentType,
    ) -> Result<String> {
        let title = require_text("section title", title)?;
        let topic = require_text("topic", topic)?;
        self.post_for_content(
            "generate-content",
            &GenerateContentRequest {
                section_title: title,
                topic,
                document_type,
            },
        )
        .await
    }

    #[instrument(skip_all)]
    async fn refine_content(
        &self,
        current_content: &str,
        instruction: &str,
        document_type: DocumentType,
    ) -> Result<String> {
        let instruction = require_text("refinement instruction", instruction)?;
        self.post_for_content(
            "refine-content",
            &RefineContentRequest {
                current_content,
                instruction,
                document_type,
            },
        )
        .await
    }
}
