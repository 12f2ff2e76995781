//! Knowledge-base synchronization and retrieval engine for long-form
//! fiction writing.
//!
//! This crate provides:
//! - A dual-backend persistence layer (local JSON files or a remote REST
//!   service with transparent local fallback)
//! - A knowledge store pairing chapter text with categorized entries
//! - Context retrieval for generation requests, manual or provider-driven
//! - Evolution reconciliation: structured knowledge deltas mined from
//!   freshly written chapters, reviewed and committed in one pass
//! - Consistency auditing of generated text against the knowledge base
//!
//! # Quick Start
//!
//! ```ignore
//! use inkweave_core::{Drafter, KnowledgeStore, Storage, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Storage::open(StorageConfig::local("./data"));
//!     let mut store =
//!         KnowledgeStore::create(storage, "星落之城", "废土幻想", "科幻").await?;
//!
//!     let chapter = store.add_chapter("第 1 章").await?;
//!     store.set_chapter_content(chapter, "城墙在黄昏中陷落……")?;
//!     store.flush().await?;
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod consistency;
pub mod drafting;
pub mod evolution;
pub mod knowledge;
pub mod provider;
pub mod retrieval;
pub mod stats;
pub mod storage;
pub mod templates;
pub mod testing;
pub mod work;

// Primary public API
pub use consistency::ConsistencyAuditor;
pub use drafting::Drafter;
pub use evolution::{
    apply_suggestions, classify, default_selection, EntityKind, EvolutionAnalyzer,
    EvolutionSuggestion, SuggestionKind,
};
pub use knowledge::{KnowledgeError, KnowledgeStore};
pub use provider::{ProviderError, TextProvider};
pub use retrieval::{manual_references, references_for_ids, ContextSelector, ReferencePack};
pub use storage::{Storage, StorageConfig, StorageMode, StoreError};
pub use work::{Chapter, KnowledgeCategory, KnowledgeEntry, Work, WorkId};
