use crate::models::book::{Book, BookTagMap};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub type Backend = Arc<dyn StorageBackend + Send + Sync>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to insert {row}: {source}")]
    Row {
        row: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("connection error: {0}")]
    Connection(String),
}

#[async_trait]
pub trait StorageBackend {
    async fn test_connection(&self) -> Result<(), StorageError>;
    /// Books whose title has no row in `BOOK_TAG` yet.
    async fn untagged_books(&self) -> Result<Vec<Book>, StorageError>;
    async fn insert_books(&self, books: &[Book]) -> Result<(), StorageError>;
    async fn insert_tags(&self, tags: &[String]) -> Result<(), StorageError>;
    async fn insert_book_tags(&self, book_tags: &BookTagMap) -> Result<(), StorageError>;
}

/// Untagged books, for `BOOK` tables that carry an `ID` column and for
/// older ones that only have `TITLE` and `AUTHOR`.
fn untagged_books_query(has_book_id: bool) -> &'static str {
    if has_book_id {
        r#"
        SELECT b.ID, b.TITLE, b.AUTHOR FROM BOOK b
        WHERE NOT EXISTS (SELECT 1 FROM BOOK_TAG bt WHERE bt.BOOK = b.TITLE)
        ORDER BY b.ID
        "#
    } else {
        r#"
        SELECT b.TITLE, b.AUTHOR FROM BOOK b
        WHERE NOT EXISTS (SELECT 1 FROM BOOK_TAG bt WHERE bt.BOOK = b.TITLE)
        "#
    }
}

pub struct MySqlBackend {
    pool: MySqlPool,
    has_book_id: bool,
}

impl MySqlBackend {
    /// Connects with a single pooled connection and creates the tables if needed.
    /// Connecting and the first ping share the `CONNECT_TIMEOUT` deadline.
    pub async fn new(options: MySqlConnectOptions) -> Result<Self, StorageError> {
        let connect = async {
            let pool = MySqlPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(CONNECT_TIMEOUT)
                .connect_with(options)
                .await?;
            let backend = Self {
                pool,
                has_book_id: true,
            };
            backend.test_connection().await?;
            Ok::<_, StorageError>(backend)
        };

        let mut backend = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| {
                StorageError::Connection(format!(
                    "no response from database within {:?}",
                    CONNECT_TIMEOUT
                ))
            })??;

        backend.create_schema().await?;
        backend.has_book_id = backend.book_has_id_column().await?;
        if !backend.has_book_id {
            warn!("BOOK has no ID column, untagged books will be read without ids");
        }
        Ok(backend)
    }

    async fn book_has_id_column(&self) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = 'BOOK' AND COLUMN_NAME = 'ID'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn create_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS BOOK (
                ID BIGINT AUTO_INCREMENT PRIMARY KEY,
                TITLE VARCHAR(512) NOT NULL,
                AUTHOR VARCHAR(512) NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS TAG (
                ID BIGINT AUTO_INCREMENT PRIMARY KEY,
                TAG VARCHAR(255) NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS BOOK_TAG (
                BOOK VARCHAR(512) NOT NULL,
                TAG VARCHAR(255) NOT NULL,
                INDEX IDX_BOOK_TAG_BOOK (BOOK)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MySqlBackend {
    async fn test_connection(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn untagged_books(&self) -> Result<Vec<Book>, StorageError> {
        let rows = sqlx::query(untagged_books_query(self.has_book_id))
            .fetch_all(&self.pool)
            .await?;

        let mut books = Vec::with_capacity(rows.len());
        for row in rows {
            let id = if self.has_book_id {
                Some(row.try_get::<i64, _>("ID")?)
            } else {
                None
            };
            books.push(Book {
                id,
                title: row.try_get("TITLE")?,
                author: row.try_get("AUTHOR")?,
            });
        }
        debug!("{} books without tags", books.len());
        Ok(books)
    }

    async fn insert_books(&self, books: &[Book]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for book in books {
            sqlx::query("INSERT INTO BOOK (AUTHOR, TITLE) VALUES (?, ?)")
                .bind(&book.author)
                .bind(&book.title)
                .execute(&mut *tx)
                .await
                .map_err(|source| StorageError::Row {
                    row: format!("book {:?} by {:?}", book.title, book.author),
                    source,
                })?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_tags(&self, tags: &[String]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for tag in tags {
            sqlx::query("INSERT INTO TAG (TAG) VALUES (?)")
                .bind(tag)
                .execute(&mut *tx)
                .await
                .map_err(|source| StorageError::Row {
                    row: format!("tag {:?}", tag),
                    source,
                })?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_book_tags(&self, book_tags: &BookTagMap) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for (book, tags) in book_tags {
            for tag in tags {
                sqlx::query("INSERT INTO BOOK_TAG (BOOK, TAG) VALUES (?, ?)")
                    .bind(book)
                    .bind(tag)
                    .execute(&mut *tx)
                    .await
                    .map_err(|source| StorageError::Row {
                        row: format!("book tag {:?} - {:?}", book, tag),
                        source,
                    })?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryTables {
    books: Vec<Book>,
    tags: Vec<String>,
    book_tags: Vec<(String, String)>,
}

/// Keeps rows in process memory. Backs `--dry-run` and the pipeline tests.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<MemoryTables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn books(&self) -> Vec<Book> {
        self.tables.lock().await.books.clone()
    }

    pub async fn tags(&self) -> Vec<String> {
        self.tables.lock().await.tags.clone()
    }

    pub async fn book_tags(&self) -> Vec<(String, String)> {
        self.tables.lock().await.book_tags.clone()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn test_connection(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn untagged_books(&self) -> Result<Vec<Book>, StorageError> {
        let tables = self.tables.lock().await;
        let books = tables
            .books
            .iter()
            .filter(|book| !tables.book_tags.iter().any(|(title, _)| *title == book.title))
            .cloned()
            .collect();
        Ok(books)
    }

    async fn insert_books(&self, books: &[Book]) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        for book in books {
            let id = tables.books.len() as i64 + 1;
            tables.books.push(Book {
                id: Some(id),
                title: book.title.clone(),
                author: book.author.clone(),
            });
        }
        Ok(())
    }

    async fn insert_tags(&self, tags: &[String]) -> Result<(), StorageError> {
        self.tables.lock().await.tags.extend(tags.iter().cloned());
        Ok(())
    }

    async fn insert_book_tags(&self, book_tags: &BookTagMap) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        for (book, tags) in book_tags {
            for tag in tags {
                tables.book_tags.push((book.clone(), tag.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_query_only_reads_id_when_the_column_exists() {
        assert!(untagged_books_query(true).contains("b.ID"));
        let legacy = untagged_books_query(false);
        assert!(!legacy.contains("ID,") && !legacy.contains("ORDER BY"));
        assert!(legacy.contains("NOT EXISTS"));
    }

    async fn mysql_backend() -> Option<MySqlBackend> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let options: MySqlConnectOptions = url.parse().expect("valid DATABASE_URL");
        Some(MySqlBackend::new(options).await.expect("database reachable"))
    }

    fn unique_title(prefix: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{} {}", prefix, nanos)
    }

    async fn count_titles(backend: &MySqlBackend, title: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM BOOK WHERE TITLE = ?")
            .bind(title)
            .fetch_one(&backend.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn failed_row_rolls_back_the_whole_insert() {
        let Some(backend) = mysql_backend().await else {
            return;
        };
        let title = unique_title("Dune");
        let too_long = "x".repeat(2048);

        let err = backend
            .insert_books(&[Book::new(title.as_str(), "Frank Herbert"), Book::new(too_long.as_str(), "Nobody")])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Row { .. }));
        assert_eq!(count_titles(&backend, &title).await, 0);
    }

    #[tokio::test]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn inserted_books_are_read_back_until_tagged() {
        let Some(backend) = mysql_backend().await else {
            return;
        };
        let title = unique_title("Emma");
        backend.insert_books(&[Book::new(title.as_str(), "Jane Austen")]).await.unwrap();
        assert!(backend.untagged_books().await.unwrap().iter().any(|book| book.title == title));

        let mut tags = BookTagMap::new();
        tags.insert(title.clone(), vec!["romance".to_string()]);
        backend.insert_book_tags(&tags).await.unwrap();
        assert!(!backend.untagged_books().await.unwrap().iter().any(|book| book.title == title));
    }

    #[tokio::test]
    async fn memory_backend_assigns_ids_in_insert_order() {
        let backend = MemoryBackend::new();
        backend
            .insert_books(&[Book::new("Dune", "Frank Herbert"), Book::new("Emma", "Jane Austen")])
            .await
            .unwrap();

        let books = backend.books().await;
        assert_eq!(books[0].id, Some(1));
        assert_eq!(books[1].id, Some(2));
    }

    #[tokio::test]
    async fn tags_keep_insert_order() {
        let backend = MemoryBackend::new();
        backend
            .insert_tags(&["fiction".to_string(), "history".to_string()])
            .await
            .unwrap();
        assert_eq!(backend.tags().await, vec!["fiction", "history"]);
    }

    #[tokio::test]
    async fn untagged_books_excludes_titles_with_tags() {
        let backend = MemoryBackend::new();
        backend
            .insert_books(&[Book::new("Dune", "Frank Herbert"), Book::new("Emma", "Jane Austen")])
            .await
            .unwrap();

        let mut tags = BookTagMap::new();
        tags.insert("Dune".to_string(), vec!["sci-fi".to_string()]);
        backend.insert_book_tags(&tags).await.unwrap();

        let untagged = backend.untagged_books().await.unwrap();
        assert_eq!(untagged.len(), 1);
        assert_eq!(untagged[0].title, "Emma");
    }

    #[tokio::test]
    async fn book_tags_are_written_key_then_tag_order() {
        let backend = MemoryBackend::new();
        let mut tags = BookTagMap::new();
        tags.insert("Emma".to_string(), vec!["romance".to_string()]);
        tags.insert("Dune".to_string(), vec!["sci-fi".to_string(), "fiction".to_string()]);
        backend.insert_book_tags(&tags).await.unwrap();

        let rows = backend.book_tags().await;
        assert_eq!(
            rows,
            vec![
                ("Dune".to_string(), "sci-fi".to_string()),
                ("Dune".to_string(), "fiction".to_string()),
                ("Emma".to_string(), "romance".to_string()),
            ]
        );
    }
}
