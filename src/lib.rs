//! codraft - Guided Document Assembly Engine
//!
//! Co-authors structured documents through multi-turn conversation:
//! - Schema-driven catalog of document types
//! - Prioritized question planning + blueprint-based clarification
//! - Composite confidence scoring that gates drafting
//! - Idempotent per-turn answer merging with assumption injection
//! - External extractor/renderer collaborators behind trait seams

pub mod blueprint;
pub mod catalog;
pub mod error;
pub mod extractor;
pub mod planner;
pub mod renderer;
pub mod scoring;
pub mod server;
pub mod session;
pub mod types;

pub use catalog::Catalog;
pub use error::{EngineError, EngineResult};
pub use extractor::{AnswerExtractor, HttpExtractor, MockExtractor, NullExtractor};
pub use renderer::{DocumentRenderer, HttpRenderer, MockRenderer};
pub use session::{SessionEngine, SharedSessionEngine};
pub use types::*;

#[cfg(test)]
mod tests;
