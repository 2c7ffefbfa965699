use async_trait::async_trait;
use chatrelay_common::{
    Conversation, ConversationId, Error, MediaRef, MediaState, Message, MessageId, Result, Role,
    UserId,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::repository::ChatRepository;

const DEFAULT_TITLE: &str = "New Chat";

/// SQLite-backed conversation, message and media storage.
pub struct ChatStore {
    conn: Mutex<Connection>,
}

impl ChatStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening chat store at {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_user
            ON conversations(user_id, updated_at);

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS conversation_media (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            media_id TEXT NOT NULL,
            name TEXT NOT NULL,
            state TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    )
    .map_err(|e| Error::Database(format!("migration failed: {e}")))
}

/// Fixed-width RFC 3339 so lexicographic order matches chronological order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let created_raw: String = row.get(3)?;
    let updated_raw: String = row.get(4)?;
    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        title: row.get(2)?,
        created_at: parse_timestamp(&created_raw),
        updated_at: parse_timestamp(&updated_raw),
    })
}

#[async_trait]
impl ChatRepository for ChatStore {
    async fn find_conversation(&self, id: &ConversationId, owner: &UserId) -> Result<bool> {
        let conn = self.conn.lock().await;
        let found: Option<String> = conn
            .query_row(
                "SELECT id FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![id.as_str(), owner.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to look up conversation: {e}")))?;
        Ok(found.is_some())
    }

    async fn insert_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageId> {
        let message_id = MessageId::new();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message_id.as_str(),
                conversation_id.as_str(),
                role.as_str(),
                content,
                format_timestamp(timestamp)
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert message: {e}")))?;
        debug!(
            "stored {} message {} in {}",
            role.as_str(),
            message_id,
            conversation_id
        );
        Ok(message_id)
    }

    async fn touch_conversation(
        &self,
        conversation_id: &ConversationId,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![format_timestamp(timestamp), conversation_id.as_str()],
        )
        .map_err(|e| Error::Database(format!("failed to update conversation timestamp: {e}")))?;
        Ok(())
    }

    async fn set_title(&self, conversation_id: &ConversationId, title: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE conversations SET title = ?1 WHERE id = ?2",
            params![title, conversation_id.as_str()],
        )
        .map_err(|e| Error::Database(format!("failed to set conversation title: {e}")))?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, conversation_id, role, content, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare message query: {e}")))?;

        let rows = stmt
            .query_map(params![conversation_id.as_str()], |row| {
                let role_raw: String = row.get(2)?;
                let created_raw: String = row.get(4)?;
                Ok((
                    MessageId(row.get(0)?),
                    ConversationId(row.get(1)?),
                    role_raw,
                    row.get::<_, String>(3)?,
                    parse_timestamp(&created_raw),
                ))
            })
            .map_err(|e| Error::Database(format!("failed to load messages: {e}")))?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, conversation_id, role_raw, content, created_at) =
                row.map_err(|e| Error::Database(format!("failed to read message row: {e}")))?;
            let role = Role::parse(&role_raw)
                .ok_or_else(|| Error::Database(format!("unknown message role '{role_raw}'")))?;
            messages.push(Message {
                id,
                conversation_id,
                role,
                content,
                created_at,
            });
        }
        Ok(messages)
    }

    async fn list_media_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<MediaRef>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT media_id, name, state
                 FROM conversation_media
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare media query: {e}")))?;

        let rows = stmt
            .query_map(params![conversation_id.as_str()], |row| {
                let state_raw: String = row.get(2)?;
                Ok(MediaRef {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    state: MediaState::from_status(&state_raw),
                })
            })
            .map_err(|e| Error::Database(format!("failed to load media: {e}")))?;

        let mut media = Vec::new();
        for row in rows {
            media.push(row.map_err(|e| Error::Database(format!("failed to read media row: {e}")))?);
        }
        Ok(media)
    }

    async fn create_conversation(
        &self,
        owner: &UserId,
        title: Option<&str>,
    ) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            user_id: owner.clone(),
            title: title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id.as_str(),
                owner.as_str(),
                conversation.title,
                format_timestamp(now),
                format_timestamp(now)
            ],
        )
        .map_err(|e| Error::Database(format!("failed to create conversation: {e}")))?;
        Ok(conversation)
    }

    async fn list_conversations(&self, owner: &UserId) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, title, created_at, updated_at
                 FROM conversations
                 WHERE user_id = ?1
                 ORDER BY updated_at DESC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare conversation query: {e}")))?;

        let rows = stmt
            .query_map(params![owner.as_str()], conversation_from_row)
            .map_err(|e| Error::Database(format!("failed to load conversations: {e}")))?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(
                row.map_err(|e| Error::Database(format!("failed to read conversation row: {e}")))?,
            );
        }
        Ok(conversations)
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
        owner: &UserId,
    ) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, user_id, title, created_at, updated_at
             FROM conversations
             WHERE id = ?1 AND user_id = ?2",
            params![id.as_str(), owner.as_str()],
            conversation_from_row,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load conversation: {e}")))
    }

    async fn delete_conversation(&self, id: &ConversationId, owner: &UserId) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute(
                "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![id.as_str(), owner.as_str()],
            )
            .map_err(|e| Error::Database(format!("failed to delete conversation: {e}")))?;
        Ok(rows > 0)
    }

    async fn add_media(&self, conversation_id: &ConversationId, media: &MediaRef) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO conversation_media (id, conversation_id, media_id, name, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                conversation_id.as_str(),
                media.id,
                media.name,
                media.state.as_str(),
                format_timestamp(Utc::now())
            ],
        )
        .map_err(|e| Error::Database(format!("failed to record media: {e}")))?;
        Ok(())
    }
}
