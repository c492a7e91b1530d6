//! SQLite-backed chunk store using the `sqlite-vec` extension for cosine
//! distance, with the index-record table kept in the same database file.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use super::{ChunkRecord, IndexRecord, IndexRecordStore, VectorStore};
use crate::types::RagError;
use async_trait::async_trait;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    prev_content TEXT,
    next_content TEXT,
    metadata TEXT NOT NULL,
    embedding TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_namespace ON chunks(namespace);
CREATE TABLE IF NOT EXISTS index_records (
    fingerprint TEXT PRIMARY KEY,
    indexed INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL,
    version INTEGER NOT NULL
);";

/// Vector + index-record store over a single SQLite database.
#[derive(Clone)]
pub struct SqliteChunkStore {
    conn: Connection,
}

impl SqliteChunkStore {
    /// Opens (and migrates) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        Self::migrate(conn).await
    }

    /// In-memory database for tests and ephemeral runs.
    pub async fn open_in_memory() -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        Self::migrate(conn).await
    }

    async fn migrate(conn: Connection) -> Result<Self, RagError> {
        conn.call(|conn| {
            // Fails fast if the sqlite-vec extension did not load.
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            conn.execute_batch(SCHEMA)
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))?;
        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), RagError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *const c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(RagError::Storage)
    }
}

#[async_trait]
impl VectorStore for SqliteChunkStore {
    async fn upsert_chunks(
        &self,
        namespace: &str,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }
        // Serialize up front so the connection closure stays infallible
        // outside of rusqlite itself.
        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let Some(embedding) = chunk.embedding.as_ref() else {
                return Err(RagError::Storage(format!(
                    "chunk {} has no embedding",
                    chunk.id
                )));
            };
            let embedding_json = serde_json::to_string(embedding)
                .map_err(|err| RagError::Storage(err.to_string()))?;
            rows.push((
                chunk.id,
                namespace.to_string(),
                chunk.chunk_index as i64,
                chunk.content,
                chunk.prev_content,
                chunk.next_content,
                chunk.metadata.to_string(),
                embedding_json,
            ));
        }
        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                {
                    let mut stmt = tx
                        .prepare(
                            "INSERT OR REPLACE INTO chunks \
                             (id, namespace, chunk_index, content, prev_content, next_content, metadata, embedding) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    for row in rows {
                        stmt.execute(row).map_err(tokio_rusqlite::Error::Rusqlite)?;
                    }
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn search(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError> {
        let namespace = namespace.to_string();
        let embedding_json =
            serde_json::to_string(embedding).map_err(|err| RagError::Storage(err.to_string()))?;
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, namespace, chunk_index, content, prev_content, next_content, metadata, \
                         vec_distance_cosine(vec_f32(embedding), vec_f32(?1)) AS distance \
                         FROM chunks WHERE namespace = ?2 \
                         ORDER BY distance ASC \
                         LIMIT ?3",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map(
                        (embedding_json, namespace, top_k as i64),
                        |row| {
                            let record = ChunkRecord {
                                id: row.get(0)?,
                                namespace: row.get(1)?,
                                chunk_index: row.get::<_, i64>(2)? as usize,
                                content: row.get(3)?,
                                prev_content: row.get(4)?,
                                next_content: row.get(5)?,
                                metadata: row
                                    .get::<_, String>(6)
                                    .map(|s| serde_json::from_str(&s).unwrap_or_default())
                                    .unwrap_or_default(),
                                embedding: None,
                            };
                            let distance: f32 = row.get(7)?;
                            Ok((record, distance))
                        },
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut results = Vec::new();
                for row in rows {
                    results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn count(&self, namespace: &str) -> Result<usize, RagError> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM chunks WHERE namespace = ?1",
                        [&namespace],
                        |row| row.get(0),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}

#[async_trait]
impl IndexRecordStore for SqliteChunkStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<IndexRecord>, RagError> {
        let fingerprint = fingerprint.to_string();
        self.conn
            .call(move |conn| {
                let record = conn
                    .query_row(
                        "SELECT fingerprint, indexed, chunk_count, version \
                         FROM index_records WHERE fingerprint = ?1",
                        [&fingerprint],
                        |row| {
                            Ok(IndexRecord {
                                fingerprint: row.get(0)?,
                                indexed: row.get::<_, i64>(1)? != 0,
                                chunk_count: row.get::<_, i64>(2)? as usize,
                                version: row.get::<_, i64>(3)? as u32,
                            })
                        },
                    )
                    .optional()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(record)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn put(&self, record: IndexRecord) -> Result<(), RagError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO index_records (fingerprint, indexed, chunk_count, version) \
                     VALUES (?1, ?2, ?3, ?4)",
                    (
                        record.fingerprint,
                        record.indexed as i64,
                        record.chunk_count as i64,
                        record.version as i64,
                    ),
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}
