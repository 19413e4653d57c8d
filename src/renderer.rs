//! External renderer contract and the artifact trigger
//!
//! Rendering a dossier into formatted text is delegated entirely to an
//! external renderer. The trigger's only job is assembling the
//! renderer's input from session state and mapping a failure to
//! [`EngineError::Render`] so the caller can retry a still-ready session.

use crate::error::{EngineError, EngineResult};
use crate::types::{ArtifactRef, Citation, DocSessionState, DocumentDefinition};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Everything the renderer needs for one document.
#[derive(Debug, Clone, Serialize)]
pub struct RenderInput {
    pub title: String,
    pub fields: BTreeMap<String, String>,
    pub citations: Vec<Citation>,
    /// Required fields still unresolved at render time. The drafting
    /// layer must note these as assumptions rather than omit them.
    pub missing_required: Vec<String>,
    pub assumed_fields: Vec<String>,
}

/// Trait for pluggable document renderers.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(&self, template_ref: &str, input: &RenderInput) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    template_ref: &'a str,
    input: &'a RenderInput,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    text: String,
}

/// HTTP-backed renderer calling an external template service.
pub struct HttpRenderer {
    service_url: String,
    client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new(service_url: String) -> Self {
        Self {
            service_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DocumentRenderer for HttpRenderer {
    fn name(&self) -> &'static str {
        "http_renderer"
    }

    async fn render(&self, template_ref: &str, input: &RenderInput) -> Result<String> {
        let url = format!("{}/render", self.service_url);
        let response = self
            .client
            .post(&url)
            .json(&RenderRequest { template_ref, input })
            .send()
            .await
            .context("Failed to call render service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Render service error ({}): {}", status, body);
        }

        let rendered: RenderResponse = response
            .json()
            .await
            .context("Failed to parse render service response")?;

        Ok(rendered.text)
    }
}

/// Deterministic plain-text renderer for tests and local runs.
pub struct MockRenderer {
    fail: bool,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentRenderer for MockRenderer {
    fn name(&self) -> &'static str {
        "mock_renderer"
    }

    async fn render(&self, template_ref: &str, input: &RenderInput) -> Result<String> {
        if self.fail {
            anyhow::bail!("mock renderer configured to fail");
        }
        let mut out = format!("# {}\n(template: {})\n", input.title, template_ref);
        for (field, value) in &input.fields {
            out.push_str(&format!("\n## {}\n{}\n", field, value));
        }
        if !input.missing_required.is_empty() {
            out.push_str(&format!(
                "\n## Unresolved\n{}\n",
                input.missing_required.join(", ")
            ));
        }
        Ok(out)
    }
}

/// Hand the dossier to the renderer and package the result. Render
/// failures surface as [`EngineError::Render`]; the caller decides
/// whether to retry.
pub async fn trigger_artifact(
    renderer: &dyn DocumentRenderer,
    definition: &DocumentDefinition,
    state: &DocSessionState,
    missing_required: Vec<String>,
) -> EngineResult<ArtifactRef> {
    let title = if state.title.trim().is_empty() {
        definition.name.clone()
    } else {
        state.title.clone()
    };

    let input = RenderInput {
        title: title.clone(),
        fields: state.dossier.clone(),
        citations: state.citations.clone(),
        missing_required: missing_required.clone(),
        assumed_fields: state.assumed_fields.clone(),
    };

    let text = renderer
        .render(&definition.template_ref, &input)
        .await
        .map_err(|e| EngineError::Render(format!("{:#}", e)))?;

    info!(
        "Artifact rendered for doc type {} ({} chars, {} unresolved fields)",
        definition.id,
        text.len(),
        missing_required.len()
    );

    Ok(ArtifactRef {
        doc_type: definition.id.clone(),
        title,
        text,
        assumed_fields: state.assumed_fields.clone(),
        missing_required,
    })
}
