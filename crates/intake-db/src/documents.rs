//! PostgreSQL document store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use intake_core::{
    DocumentStore, DocumentSummary, Entity, Error, NewChunk, NewDocument, Result,
};

/// Document store backed by the `documents`, `document_chunks` and
/// `document_entities` tables.
///
/// Each insert method commits on its own. A failure in `insert_chunks` leaves
/// the document row in place.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Number of chunk rows stored for a document.
    pub async fn chunk_count(&self, document_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE document_id = $1")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    /// Entities stored for a document, in insertion order.
    pub async fn entities_for(&self, document_id: Uuid) -> Result<Vec<Entity>> {
        let rows = sqlx::query(
            "SELECT name, entity_type, description FROM document_entities
             WHERE document_id = $1 ORDER BY id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| {
                Ok(Entity {
                    name: row.try_get("name")?,
                    entity_type: row.try_get("entity_type")?,
                    description: row.try_get("description")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::Database)
    }
}

fn to_i64(value: usize, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::InvalidInput(format!("{} out of range: {}", field, value)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self), fields(subsystem = "db", component = "documents", op = "find_by_fingerprint"))]
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DocumentSummary>> {
        let row = sqlx::query(
            "SELECT id, file_hash, filename, mime_type, file_size, char_count, created_at
             FROM documents WHERE file_hash = $1",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let file_size: i64 = row.try_get("file_size").map_err(Error::Database)?;
        let char_count: i64 = row.try_get("char_count").map_err(Error::Database)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(Error::Database)?;

        Ok(Some(DocumentSummary {
            id: row.try_get("id").map_err(Error::Database)?,
            fingerprint: row.try_get("file_hash").map_err(Error::Database)?,
            filename: row.try_get("filename").map_err(Error::Database)?,
            mime_type: row.try_get("mime_type").map_err(Error::Database)?,
            file_size: file_size.max(0) as u64,
            char_count: char_count.max(0) as usize,
            created_at,
        }))
    }

    #[instrument(skip(self, doc), fields(subsystem = "db", component = "documents", op = "insert_document", fingerprint = %doc.fingerprint))]
    async fn insert_document(&self, doc: NewDocument) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let file_size = i64::try_from(doc.file_size)
            .map_err(|_| Error::InvalidInput(format!("file_size out of range: {}", doc.file_size)))?;
        let char_count = to_i64(doc.char_count(), "char_count")?;

        let inserted = sqlx::query(
            "INSERT INTO documents (id, file_hash, filename, mime_type, file_size, text_content, char_count, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(&doc.fingerprint)
        .bind(&doc.filename)
        .bind(&doc.mime_type)
        .bind(file_size)
        .bind(&doc.text)
        .bind(char_count)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {
                debug!(document_id = %id, "Inserted document");
                Ok(id)
            }
            Err(e) if is_unique_violation(&e) => Err(Error::DuplicateFingerprint(doc.fingerprint)),
            Err(e) => Err(Error::Database(e)),
        }
    }

    #[instrument(skip(self, chunks), fields(subsystem = "db", component = "documents", op = "insert_chunks", chunk_count = chunks.len()))]
    async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let count = chunks.len();

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO document_chunks (id, document_id, chunk_index, chunk_text, start_char, end_char, token_count, embedding)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(Uuid::now_v7())
            .bind(document_id)
            .bind(chunk.chunk_index as i32)
            .bind(&chunk.text)
            .bind(to_i64(chunk.start_offset, "start_offset")?)
            .bind(to_i64(chunk.end_offset, "end_offset")?)
            .bind(chunk.token_count as i32)
            .bind(&chunk.embedding)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(count)
    }

    #[instrument(skip(self, entities), fields(subsystem = "db", component = "documents", op = "insert_entities", entity_count = entities.len()))]
    async fn insert_entities(&self, document_id: Uuid, entities: Vec<Entity>) -> Result<usize> {
        if entities.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let count = entities.len();

        for entity in entities {
            sqlx::query(
                "INSERT INTO document_entities (id, document_id, name, entity_type, description)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::now_v7())
            .bind(document_id)
            .bind(&entity.name)
            .bind(&entity.entity_type)
            .bind(&entity.description)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(count)
    }
}
