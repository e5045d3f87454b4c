//! Request and response bodies of the content service.
use serde::{Deserialize, Serialize};

use crate::model::{DocumentType, OutlineItem};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OutlineRequest<'a> {
    pub topic: &'a str,
    pub document_type: DocumentType,
}

#[derive(Deserialize, Debug)]
pub struct OutlineResponse {
    #[serde(default)]
    pub outline: Vec<OutlineItem>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    pub section_title: &'a str,
    pub topic: &'a str,
    pub document_type: DocumentType,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RefineContentRequest<'a> {
    pub current_content: &'a str,
    #[serde(rename = "prompt")]
    pub instruction: &'a str,
    pub document_type: DocumentType,
}

#[derive(Deserialize, Debug)]
pub struct ContentResponse {
    pub content: Option<String>,
}
