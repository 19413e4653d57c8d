//! codraft HTTP server binary

use codraft::server::{run_server, AppState};
use codraft::{
    Catalog, HttpExtractor, HttpRenderer, MockRenderer, NullExtractor, SessionEngine,
};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    println!("codraft - Guided Document Assembly Engine");
    println!("  Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    // Catalog: explicit path or the built-in default. Load failure here
    // is fatal by design; a malformed catalog must not serve traffic.
    let catalog_path = std::env::var("CODRAFT_CATALOG_PATH").ok();
    let catalog = Catalog::shared(catalog_path.as_deref().map(Path::new))?;
    println!("  Catalog: {} doc types", catalog.len());

    let extractor: Arc<dyn codraft::AnswerExtractor> =
        match std::env::var("EXTRACTOR_API_URL").ok() {
            Some(url) => {
                println!("  Extractor service: {}", url);
                Arc::new(HttpExtractor::new(url))
            }
            None => {
                eprintln!("  Warning: EXTRACTOR_API_URL unset; running without extraction.");
                eprintln!("           Answers are only captured via question-directed replies.");
                Arc::new(NullExtractor)
            }
        };

    let renderer: Arc<dyn codraft::DocumentRenderer> =
        match std::env::var("RENDERER_API_URL").ok() {
            Some(url) => {
                println!("  Renderer service: {}", url);
                Arc::new(HttpRenderer::new(url))
            }
            None => {
                eprintln!("  Warning: RENDERER_API_URL unset; using plain-text renderer.");
                Arc::new(MockRenderer::new())
            }
        };

    let engine = SessionEngine::new(catalog, extractor, renderer);

    let port: u16 = std::env::var("CODRAFT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    run_server(AppState::new(engine), port).await
}
