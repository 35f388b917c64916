use crate::models::book::Book;
use crate::models::storage::Backend;
use crate::utils::file::{read_books_from_json, read_books_from_text, SourceError};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

#[async_trait]
pub trait BookSource {
    async fn load(&self) -> Result<Vec<Book>, SourceError>;
}

/// Alternating title and author lines.
pub struct TextPairSource {
    path: PathBuf,
}

impl TextPairSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BookSource for TextPairSource {
    async fn load(&self) -> Result<Vec<Book>, SourceError> {
        let books = read_books_from_text(&self.path).await?;
        info!("Loaded {} books from {}", books.len(), self.path.display());
        Ok(books)
    }
}

pub struct JsonArraySource {
    path: PathBuf,
}

impl JsonArraySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BookSource for JsonArraySource {
    async fn load(&self) -> Result<Vec<Book>, SourceError> {
        let books = read_books_from_json(&self.path).await?;
        info!("Loaded {} books from {}", books.len(), self.path.display());
        Ok(books)
    }
}

/// Books in the store that have not been tagged yet.
pub struct StoreSource {
    backend: Backend,
}

impl StoreSource {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl BookSource for StoreSource {
    async fn load(&self) -> Result<Vec<Book>, SourceError> {
        let books = self.backend.untagged_books().await?;
        info!("Found {} books without tags in the store", books.len());
        Ok(books)
    }
}
