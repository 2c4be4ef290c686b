//! SQLite-backed conversation store.
//!
//! `rusqlite` is synchronous, so every call runs on the blocking pool with
//! the connection behind a mutex.

use super::{ConversationStore, ConversationSummary, Role, Turn};
use chrono::{DateTime, SecondsFormat, Utc};
use docent_core::{AppError, AppResult};
use docent_knowledge::RetrievalResult;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Durable conversation history in a single SQLite file.
#[derive(Clone)]
pub struct SqliteConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Conversation(format!("Failed to create conversation directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| {
            AppError::Conversation(format!("Failed to open conversation database: {}", e))
        })?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AppError::Conversation(format!("Failed to open conversation database: {}", e))
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            -- created_at is fixed-width RFC 3339 so it sorts as text
            CREATE TABLE IF NOT EXISTS turns (
                conversation_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                retrieval TEXT,
                PRIMARY KEY (conversation_id, seq)
            );
            "#,
        )
        .map_err(|e| AppError::Conversation(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                AppError::Conversation("Conversation database lock poisoned".to_string())
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| AppError::Conversation(format!("Conversation task failed: {}", e)))?
    }
}

fn db_error(context: &str) -> impl Fn(rusqlite::Error) -> AppError + '_ {
    move |e| AppError::Conversation(format!("{}: {}", context, e))
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Conversation(format!("Invalid timestamp {}: {}", raw, e)))
}

/// Raw row as stored.
struct TurnRow {
    role: String,
    text: String,
    created_at: String,
    retrieval: Option<String>,
}

impl TurnRow {
    fn into_turn(self) -> AppResult<Turn> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| AppError::Conversation(format!("Unknown role: {}", self.role)))?;
        let retrieval = match self.retrieval {
            Some(json) => Some(serde_json::from_str::<RetrievalResult>(&json)?),
            None => None,
        };

        Ok(Turn {
            role,
            text: self.text,
            timestamp: parse_timestamp(&self.created_at)?,
            retrieval,
        })
    }
}

#[async_trait::async_trait]
impl ConversationStore for SqliteConversationStore {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, conversation_id: &str, turns: Vec<Turn>) -> AppResult<()> {
        let conversation_id = conversation_id.to_string();
        let rows = turns
            .into_iter()
            .map(|turn| {
                let retrieval = turn
                    .retrieval
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                Ok((turn, retrieval))
            })
            .collect::<AppResult<Vec<_>>>()?;

        self.with_conn(move |conn| {
            let tx = conn
                .transaction()
                .map_err(db_error("Failed to begin transaction"))?;

            let last: Option<i64> = tx
                .query_row(
                    "SELECT MAX(seq) FROM turns WHERE conversation_id = ?1",
                    params![conversation_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_error("Failed to read sequence"))?
                .flatten();
            let mut seq = last.map_or(0, |s| s + 1);

            for (turn, retrieval) in &rows {
                tx.execute(
                    "INSERT INTO turns (conversation_id, seq, role, text, created_at, retrieval)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        conversation_id,
                        seq,
                        turn.role.as_str(),
                        turn.text,
                        turn.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                        retrieval,
                    ],
                )
                .map_err(db_error("Failed to insert turn"))?;
                seq += 1;
            }

            tx.commit().map_err(db_error("Failed to commit turns"))
        })
        .await
    }

    async fn turns(&self, conversation_id: &str) -> AppResult<Vec<Turn>> {
        let conversation_id = conversation_id.to_string();
        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT role, text, created_at, retrieval FROM turns
                         WHERE conversation_id = ?1 ORDER BY seq",
                    )
                    .map_err(db_error("Failed to prepare query"))?;

                let rows = stmt
                    .query_map(params![conversation_id], |row| {
                        Ok(TurnRow {
                            role: row.get(0)?,
                            text: row.get(1)?,
                            created_at: row.get(2)?,
                            retrieval: row.get(3)?,
                        })
                    })
                    .map_err(db_error("Failed to query turns"))?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_error("Failed to read turn"))?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(TurnRow::into_turn).collect()
    }

    async fn turn_count(&self, conversation_id: &str) -> AppResult<usize> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM turns WHERE conversation_id = ?1",
                    params![conversation_id],
                    |row| row.get(0),
                )
                .map_err(db_error("Failed to count turns"))?;
            Ok(count as usize)
        })
        .await
    }

    async fn list(&self) -> AppResult<Vec<ConversationSummary>> {
        let rows = self
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT conversation_id, COUNT(*), MAX(created_at) FROM turns
                         GROUP BY conversation_id
                         ORDER BY MAX(created_at) DESC, conversation_id",
                    )
                    .map_err(db_error("Failed to prepare query"))?;

                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })
                    .map_err(db_error("Failed to list conversations"))?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_error("Failed to read conversation"))?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, count, last)| {
                Ok(ConversationSummary {
                    id,
                    turn_count: count as usize,
                    last_activity: parse_timestamp(&last)?,
                })
            })
            .collect()
    }
}
