//! Batch tagging of book records with a chat completion model.
//!
//! Books come from a text file, a JSON file or the `BOOK` table. They are sent
//! to the model in fixed-size batches and the tags it returns are written to
//! `BOOK_TAG`.

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use models::book::{Book, BookTagMap, Tag};
pub use models::storage::{Backend, MemoryBackend, MySqlBackend, StorageBackend, StorageError};
pub use services::enrichment::{EnrichmentClient, EnrichmentError, EnrichmentSettings};
pub use services::parsing::{parse_tags, ParseError, ParseWarning, ParsedTags, ResponseParser};
pub use services::pipeline::{PipelineError, RunSummary, TaggingPipeline};
pub use services::sources::{BookSource, JsonArraySource, StoreSource, TextPairSource};
