use crate::models::book::{Book, Tag};
use crate::models::storage::{Backend, StorageError};
use crate::services::batching::{BatchWindow, BatchWindows};
use crate::services::enrichment::{EnrichmentClient, EnrichmentError};
use crate::services::parsing::{ParseError, ParseWarning, ParsedTags, ResponseParser};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("enrichment failed for books {bottom}..{top}: {source}")]
    Enrichment {
        bottom: usize,
        top: usize,
        #[source]
        source: EnrichmentError,
    },
    #[error("could not parse tags for books {bottom}..{top}: {source}")]
    Parsing {
        bottom: usize,
        top: usize,
        #[source]
        source: ParseError,
    },
    #[error("could not store tags for books {bottom}..{top}: {source}")]
    Persistence {
        bottom: usize,
        top: usize,
        #[source]
        source: StorageError,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub books: usize,
    pub batches: usize,
    pub tagged_books: usize,
    pub tag_rows: usize,
    pub warnings: usize,
}

pub struct TaggingPipeline {
    client: Arc<EnrichmentClient>,
    backend: Backend,
    batch_size: NonZeroUsize,
    vocabulary: Option<Vec<Tag>>,
    parser: ResponseParser,
}

/// Drops titles the model made up; only books from the batch may be tagged.
fn retain_batch_titles(batch: &[Book], parsed: &mut ParsedTags) {
    let titles: HashSet<&str> = batch.iter().map(|book| book.title.as_str()).collect();
    let unknown: Vec<String> = parsed
        .tags
        .keys()
        .filter(|title| !titles.contains(title.as_str()))
        .cloned()
        .collect();

    for title in unknown {
        parsed.tags.remove(&title);
        warn!("Ignoring tags for {:?}, it was not part of the batch", title);
        parsed.warnings.push(ParseWarning::UnknownTitle { title });
    }
}

impl TaggingPipeline {
    pub fn new(client: Arc<EnrichmentClient>, backend: Backend, batch_size: NonZeroUsize) -> Self {
        Self {
            client,
            backend,
            batch_size,
            vocabulary: None,
            parser: ResponseParser::new(),
        }
    }

    /// Switches to the vocabulary-constrained prompt and id resolution.
    pub fn with_vocabulary(mut self, tags: Vec<Tag>) -> Self {
        self.parser = ResponseParser::with_vocabulary(&tags);
        self.vocabulary = Some(tags);
        self
    }

    async fn process_batch(&self, batch: &[Book], window: BatchWindow) -> Result<ParsedTags, PipelineError> {
        let BatchWindow { bottom, top } = window;

        let answer = self
            .client
            .enrich(batch, self.vocabulary.as_deref())
            .await
            .map_err(|source| PipelineError::Enrichment { bottom, top, source })?;

        let mut parsed = self
            .parser
            .parse(&answer)
            .map_err(|source| PipelineError::Parsing { bottom, top, source })?;
        retain_batch_titles(batch, &mut parsed);

        self.backend
            .insert_book_tags(&parsed.tags)
            .await
            .map_err(|source| PipelineError::Persistence { bottom, top, source })?;

        Ok(parsed)
    }

    /// Tags `books` one window at a time. The first failing window ends the run.
    pub async fn run(&self, books: &[Book]) -> Result<RunSummary, PipelineError> {
        let windows = BatchWindows::new(books.len(), self.batch_size);
        let mut summary = RunSummary {
            books: books.len(),
            ..RunSummary::default()
        };

        info!("Tagging {} books in {} batches", books.len(), windows.len());

        for (index, window) in windows.enumerate() {
            let batch = &books[window.range()];
            info!(
                batch = index + 1,
                bottom = window.bottom,
                top = window.top,
                "Processing batch"
            );

            let parsed = self.process_batch(batch, window).await?;

            let untagged = window.len().saturating_sub(parsed.tags.len());
            if untagged > 0 {
                debug!("{} books in batch {} received no tags", untagged, index + 1);
            }

            summary.batches += 1;
            summary.tagged_books += parsed.tags.len();
            summary.tag_rows += parsed.tags.values().map(Vec::len).sum::<usize>();
            summary.warnings += parsed.warnings.len();
        }

        info!(
            "Tagged {} of {} books ({} tags, {} warnings)",
            summary.tagged_books, summary.books, summary.tag_rows, summary.warnings
        );
        Ok(summary)
    }
}
