use crate::models::book::{Book, Tag};
use crate::models::storage::StorageError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store query failed: {0}")]
    Store(#[from] StorageError),
}

fn validate_path(path: &Path) -> Result<(), SourceError> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(SourceError::Validation("empty file path".to_string()));
    }
    Ok(())
}

async fn read_file(path: &Path) -> Result<String, SourceError> {
    validate_path(path)?;
    tokio::fs::read_to_string(path).await.map_err(|source| {
        error!("Failed to read {}: {}", path.display(), source);
        SourceError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Pairs up alternating title and author lines. Blank lines are skipped and a
/// trailing title without an author is dropped.
pub fn parse_book_pairs(content: &str) -> Vec<Book> {
    let mut books = Vec::new();
    let mut pending_title: Option<&str> = None;

    for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match pending_title.take() {
            None => pending_title = Some(line),
            Some(title) => books.push(Book::new(title, line)),
        }
    }

    if let Some(title) = pending_title {
        debug!("Dropping title without author: {}", title);
    }
    books
}

pub fn parse_tag_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

async fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SourceError> {
    let content = read_file(path).await?;
    serde_json::from_str(&content).map_err(|source| {
        error!("Failed to decode {} as a JSON array", path.display());
        SourceError::Decode {
            path: path.to_path_buf(),
            source,
        }
    })
}

pub async fn read_books_from_text(path: &Path) -> Result<Vec<Book>, SourceError> {
    let content = read_file(path).await?;
    Ok(parse_book_pairs(&content))
}

pub async fn read_books_from_json(path: &Path) -> Result<Vec<Book>, SourceError> {
    read_json_array(path).await
}

pub async fn read_tags_from_json(path: &Path) -> Result<Vec<Tag>, SourceError> {
    read_json_array(path).await
}

pub async fn read_tags_from_text(path: &Path) -> Result<Vec<String>, SourceError> {
    let content = read_file(path).await?;
    Ok(parse_tag_lines(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn dangling_title_is_dropped() {
        let books = parse_book_pairs("Dune\nFrank Herbert\nTitle Only");
        assert_eq!(books, vec![Book::new("Dune", "Frank Herbert")]);
    }

    #[test]
    fn blank_lines_do_not_break_pairing() {
        let books = parse_book_pairs("\n  Dune  \n\nFrank Herbert\n\n\nEmma\n \nJane Austen\n");
        assert_eq!(
            books,
            vec![Book::new("Dune", "Frank Herbert"), Book::new("Emma", "Jane Austen")]
        );
    }

    #[test]
    fn tag_lines_skip_blanks() {
        assert_eq!(parse_tag_lines("fiction\n\n history \n"), vec!["fiction", "history"]);
    }

    #[tokio::test]
    async fn empty_path_is_a_validation_error() {
        let err = read_books_from_text(Path::new("  ")).await.unwrap_err();
        assert!(matches!(err, SourceError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = read_books_from_text(Path::new("/nonexistent/books.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[tokio::test]
    async fn reads_text_pairs_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Dune\nFrank Herbert\nTitle Only\n").unwrap();

        let books = read_books_from_text(file.path()).await.unwrap();
        assert_eq!(books, vec![Book::new("Dune", "Frank Herbert")]);
    }

    #[tokio::test]
    async fn reads_json_books() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": 7, "title": "Dune", "author": "Frank Herbert"}}, {{"title": "Emma", "author": "Jane Austen"}}]"#
        )
        .unwrap();

        let books = read_books_from_json(file.path()).await.unwrap();
        assert_eq!(
            books,
            vec![Book::with_id(7, "Dune", "Frank Herbert"), Book::new("Emma", "Jane Austen")]
        );
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{\"title\": \"Dune\"}}").unwrap();

        let err = read_books_from_json(file.path()).await.unwrap_err();
        assert!(matches!(err, SourceError::Decode { .. }));
    }

    #[tokio::test]
    async fn reads_tag_vocabulary() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id": 1, "tag": "fiction"}}, {{"id": 2, "name": "history"}}]"#).unwrap();

        let tags = read_tags_from_json(file.path()).await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[1].name, "history");
    }
}
