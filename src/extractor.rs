//! External answer-extractor contract
//!
//! The engine never parses free text itself; an extractor proposes
//! structured field values for a message given the field catalog context
//! and the dossier so far. Rule-based and model-backed implementations
//! both fit behind this trait.

use crate::types::{DocumentDefinition, Extraction};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// What an extractor gets to work with for one message.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionContext {
    pub doc_type: String,
    pub fields: Vec<FieldBrief>,
    pub dossier: BTreeMap<String, String>,
}

/// Minimal field description handed to the extractor.
#[derive(Debug, Clone, Serialize)]
pub struct FieldBrief {
    pub id: String,
    pub label: String,
    pub description: String,
    pub required: bool,
}

impl ExtractionContext {
    pub fn for_definition(
        definition: &DocumentDefinition,
        dossier: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            doc_type: definition.id.clone(),
            fields: definition
                .all_fields()
                .map(|f| FieldBrief {
                    id: f.id.clone(),
                    label: f.label.clone(),
                    description: f.description.clone(),
                    required: f.required,
                })
                .collect(),
            dossier: dossier.clone(),
        }
    }
}

/// Trait for pluggable answer extractors.
#[async_trait]
pub trait AnswerExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Propose field values for one message. Empty output is valid and
    /// means "no new information".
    async fn extract(&self, ctx: &ExtractionContext, message: &str) -> Result<Extraction>;
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    context: &'a ExtractionContext,
    message: &'a str,
}

/// HTTP-backed extractor calling an external extraction service.
pub struct HttpExtractor {
    service_url: String,
    client: reqwest::Client,
}

impl HttpExtractor {
    pub fn new(service_url: String) -> Self {
        Self {
            service_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AnswerExtractor for HttpExtractor {
    fn name(&self) -> &'static str {
        "http_extractor"
    }

    async fn extract(&self, ctx: &ExtractionContext, message: &str) -> Result<Extraction> {
        let url = format!("{}/extract", self.service_url);
        let response = self
            .client
            .post(&url)
            .json(&ExtractRequest { context: ctx, message })
            .send()
            .await
            .context("Failed to call extraction service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Extraction service error ({}): {}", status, body);
        }

        let extraction: Extraction = response
            .json()
            .await
            .context("Failed to parse extraction service response")?;

        tracing::debug!(
            "Extractor proposed {} answers for doc type {}",
            extraction.answers.len(),
            ctx.doc_type
        );

        Ok(extraction)
    }
}

/// Extractor that never proposes anything. Useful when a deployment
/// relies purely on question-directed raw answers.
pub struct NullExtractor;

#[async_trait]
impl AnswerExtractor for NullExtractor {
    fn name(&self) -> &'static str {
        "null_extractor"
    }

    async fn extract(&self, _ctx: &ExtractionContext, _message: &str) -> Result<Extraction> {
        Ok(Extraction::default())
    }
}

/// Scripted extractor for tests: pops one queued extraction per call,
/// returning empty once the script runs out.
pub struct MockExtractor {
    script: std::sync::Mutex<std::collections::VecDeque<Result<Extraction, String>>>,
}

impl MockExtractor {
    pub fn new(responses: Vec<Extraction>) -> Self {
        Self {
            script: std::sync::Mutex::new(responses.into_iter().map(Ok).collect()),
        }
    }

    /// Queue a failure for the next call.
    pub fn failing_once(message: &str) -> Self {
        let mut script = std::collections::VecDeque::new();
        script.push_back(Err(message.to_string()));
        Self {
            script: std::sync::Mutex::new(script),
        }
    }
}

#[async_trait]
impl AnswerExtractor for MockExtractor {
    fn name(&self) -> &'static str {
        "mock_extractor"
    }

    async fn extract(&self, _ctx: &ExtractionContext, _message: &str) -> Result<Extraction> {
        let next = self.script.lock().expect("script lock").pop_front();
        match next {
            Some(Ok(extraction)) => Ok(extraction),
            Some(Err(message)) => anyhow::bail!("{}", message),
            None => Ok(Extraction::default()),
        }
    }
}
