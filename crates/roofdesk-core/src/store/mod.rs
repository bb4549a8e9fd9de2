//! Local persistence layer.
//!
//! [`MailStore`] owns the relational mirror of the remote mailbox: users,
//! folders, messages and recipients. It enforces the uniqueness invariants
//! itself: one message per (protocol id, user) and one folder per
//! (protocol folder id, user).

mod model;

pub use model::{
    FolderId, FolderRecord, MessageId, MessageListItem, MessageRecord, ReadFlagPolicy, Recipient,
    RecipientKind, StoredMessage, UserId,
};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::config::UserProvisioning;
use crate::mailbox::{Importance, WellKnownFolder};
use crate::{Error, Result};

const MESSAGE_COLUMNS: &str = "id, folder_id, protocol_id, subject, sender_address, sender_name, \
     body, received_at, is_read, has_attachments, importance, internet_message_id, size, \
     last_synced_at";

/// Repository for the mailbox mirror.
#[derive(Debug, Clone)]
pub struct MailStore {
    pool: SqlitePool,
}

impl MailStore {
    /// Open a store at the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        // A single connection that never expires, or the database vanishes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                protocol_folder_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                last_synced_at TEXT,
                last_sync_count INTEGER NOT NULL DEFAULT 0,
                UNIQUE(protocol_folder_id, user_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                folder_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
                protocol_id TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                sender_address TEXT NOT NULL DEFAULT '',
                sender_name TEXT NOT NULL DEFAULT '',
                body TEXT,
                received_at TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                importance TEXT NOT NULL DEFAULT 'normal',
                internet_message_id TEXT,
                size INTEGER,
                last_synced_at TEXT NOT NULL,
                UNIQUE(protocol_id, user_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS recipients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                address TEXT NOT NULL,
                name TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_folder
            ON messages(user_id, folder_id, received_at DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_recipients_message
            ON recipients(message_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========== Users ==========

    /// Get the id of a user, creating the row if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_or_create_user(&self, email: &str) -> Result<UserId> {
        let email = normalize_email(email);
        let row = sqlx::query(
            r"
            INSERT INTO users (email, created_at) VALUES (?, ?)
            ON CONFLICT(email) DO UPDATE SET email = excluded.email
            RETURNING id
            ",
        )
        .bind(&email)
        .bind(timestamp(Utc::now()))
        .fetch_one(&self.pool)
        .await?;

        Ok(UserId(row.get("id")))
    }

    /// Find an existing user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_user(&self, email: &str) -> Result<Option<UserId>> {
        let row = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| UserId(r.get("id"))))
    }

    /// Resolve a user according to the provisioning policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserNotProvisioned`] if the policy is
    /// [`UserProvisioning::External`] and the user does not exist.
    pub async fn resolve_user(&self, email: &str, policy: UserProvisioning) -> Result<UserId> {
        match policy {
            UserProvisioning::AutoCreate => self.get_or_create_user(email).await,
            UserProvisioning::External => self
                .find_user(email)
                .await?
                .ok_or_else(|| Error::UserNotProvisioned(normalize_email(email))),
        }
    }

    // ========== Folders ==========

    /// Get the id of a folder, creating the row if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_or_create_folder(
        &self,
        protocol_folder_id: &str,
        user_id: UserId,
    ) -> Result<FolderId> {
        let row = sqlx::query(
            r"
            INSERT INTO folders (user_id, protocol_folder_id, display_name)
            VALUES (?, ?, ?)
            ON CONFLICT(protocol_folder_id, user_id) DO UPDATE SET
                protocol_folder_id = excluded.protocol_folder_id
            RETURNING id
            ",
        )
        .bind(user_id.0)
        .bind(protocol_folder_id)
        .bind(WellKnownFolder::display_name_for(protocol_folder_id))
        .fetch_one(&self.pool)
        .await?;

        Ok(FolderId(row.get("id")))
    }

    /// Get a folder row by protocol id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn folder(
        &self,
        protocol_folder_id: &str,
        user_id: UserId,
    ) -> Result<Option<FolderRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, protocol_folder_id, display_name, last_synced_at, last_sync_count
            FROM folders
            WHERE protocol_folder_id = ? AND user_id = ?
            ",
        )
        .bind(protocol_folder_id)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| FolderRecord {
            id: FolderId(row.get("id")),
            protocol_folder_id: row.get("protocol_folder_id"),
            display_name: row.get("display_name"),
            last_synced_at: parse_optional_timestamp(row.get("last_synced_at")),
            last_sync_count: row.get("last_sync_count"),
        }))
    }

    /// Record the outcome of a folder sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn record_folder_sync(
        &self,
        folder_id: FolderId,
        synced_at: DateTime<Utc>,
        count: usize,
    ) -> Result<()> {
        sqlx::query("UPDATE folders SET last_synced_at = ?, last_sync_count = ? WHERE id = ?")
            .bind(timestamp(synced_at))
            .bind(i64::try_from(count).unwrap_or(i64::MAX))
            .bind(folder_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ========== Messages ==========

    /// Insert or update a message and replace its recipients atomically.
    ///
    /// A record without a recipient set leaves the stored recipients alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails; nothing is written in
    /// that case.
    pub async fn upsert_message(
        &self,
        record: &MessageRecord,
        user_id: UserId,
        folder_id: FolderId,
        read_policy: ReadFlagPolicy,
    ) -> Result<MessageId> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r"
            INSERT INTO messages
                (user_id, folder_id, protocol_id, subject, sender_address, sender_name, body,
                 received_at, is_read, has_attachments, importance, internet_message_id, size,
                 last_synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(protocol_id, user_id) DO UPDATE SET
                folder_id = excluded.folder_id,
                subject = excluded.subject,
                sender_address = CASE WHEN ? AND messages.sender_address <> ''
                    THEN messages.sender_address ELSE excluded.sender_address END,
                sender_name = CASE WHEN ? AND messages.sender_address <> ''
                    THEN messages.sender_name ELSE excluded.sender_name END,
                body = COALESCE(excluded.body, messages.body),
                received_at = COALESCE(excluded.received_at, messages.received_at),
                is_read = CASE WHEN ? AND messages.is_read = 1
                    THEN 1 ELSE excluded.is_read END,
                has_attachments = excluded.has_attachments,
                importance = excluded.importance,
                internet_message_id = COALESCE(excluded.internet_message_id,
                    messages.internet_message_id),
                size = COALESCE(excluded.size, messages.size),
                last_synced_at = excluded.last_synced_at
            RETURNING id
            ",
        )
        .bind(user_id.0)
        .bind(folder_id.0)
        .bind(&record.protocol_id)
        .bind(&record.subject)
        .bind(&record.sender_address)
        .bind(&record.sender_name)
        .bind(&record.body)
        .bind(record.received_at.map(timestamp))
        .bind(record.is_read)
        .bind(record.has_attachments)
        .bind(record.importance.as_str())
        .bind(&record.internet_message_id)
        .bind(record.size)
        .bind(timestamp(Utc::now()))
        .bind(record.sender_is_placeholder)
        .bind(record.sender_is_placeholder)
        .bind(read_policy == ReadFlagPolicy::PreserveLocal)
        .fetch_one(&mut *tx)
        .await?;

        let message_id = MessageId(row.get("id"));

        if let Some(recipients) = &record.recipients {
            sqlx::query("DELETE FROM recipients WHERE message_id = ?")
                .bind(message_id.0)
                .execute(&mut *tx)
                .await?;

            for recipient in recipients {
                sqlx::query(
                    "INSERT INTO recipients (message_id, kind, address, name) VALUES (?, ?, ?, ?)",
                )
                .bind(message_id.0)
                .bind(recipient.kind.as_str())
                .bind(&recipient.address)
                .bind(&recipient.name)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(message_id)
    }

    /// Get a page of messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_messages(
        &self,
        user_id: UserId,
        folder_id: FolderId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageListItem>> {
        let rows = sqlx::query(
            r"
            SELECT id, protocol_id, subject, sender_address, sender_name, received_at,
                   is_read, has_attachments, importance
            FROM messages
            WHERE user_id = ? AND folder_id = ?
            ORDER BY received_at DESC, id DESC
            LIMIT ? OFFSET ?
            ",
        )
        .bind(user_id.0)
        .bind(folder_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MessageListItem {
                id: MessageId(row.get("id")),
                protocol_id: row.get("protocol_id"),
                subject: row.get("subject"),
                sender_address: row.get("sender_address"),
                sender_name: row.get("sender_name"),
                received_at: parse_optional_timestamp(row.get("received_at")),
                is_read: row.get("is_read"),
                has_attachments: row.get("has_attachments"),
                importance: Importance::parse(row.get("importance")),
            })
            .collect())
    }

    /// Count messages in a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_message_count(&self, user_id: UserId, folder_id: FolderId) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM messages WHERE user_id = ? AND folder_id = ?",
        )
        .bind(user_id.0)
        .bind(folder_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("count"))
    }

    /// Get a message with its recipients by protocol id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the message does not exist.
    pub async fn get_message_by_id(
        &self,
        protocol_id: &str,
        user_id: UserId,
    ) -> Result<StoredMessage> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE protocol_id = ? AND user_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(protocol_id)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {protocol_id}")))?;

        self.hydrate(&row).await
    }

    /// Find a message by local id, exact protocol id, or the protocol id
    /// prefix before the first `/`, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_message(&self, key: &str, user_id: UserId) -> Result<Option<StoredMessage>> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(None);
        }

        if let Ok(local_id) = key.parse::<i64>() {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ? AND user_id = ?");
            if let Some(row) = sqlx::query(&sql)
                .bind(local_id)
                .bind(user_id.0)
                .fetch_optional(&self.pool)
                .await?
            {
                return self.hydrate(&row).await.map(Some);
            }
        }

        match self.get_message_by_id(key, user_id).await {
            Ok(message) => return Ok(Some(message)),
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let prefix = key.split('/').next().unwrap_or(key);
        if prefix.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            r"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE user_id = ? AND substr(protocol_id, 1, length(?)) = ?
            ORDER BY received_at DESC, id DESC
            LIMIT 1
            "
        );
        let row = sqlx::query(&sql)
            .bind(user_id.0)
            .bind(prefix)
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.hydrate(&row).await.map(Some),
            None => Ok(None),
        }
    }

    /// Mark a message read. Returns true if the flag changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the message does not exist.
    pub async fn mark_read(&self, protocol_id: &str, user_id: UserId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1 WHERE protocol_id = ? AND user_id = ? AND is_read = 0",
        )
        .bind(protocol_id)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM messages WHERE protocol_id = ? AND user_id = ?")
            .bind(protocol_id)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Ok(false),
            None => Err(Error::NotFound(format!("message {protocol_id}"))),
        }
    }

    /// Protocol ids of messages whose sender is empty or the placeholder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn messages_missing_sender(
        &self,
        user_id: UserId,
        placeholder_address: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r"
            SELECT protocol_id FROM messages
            WHERE user_id = ? AND (sender_address = '' OR sender_address = ? COLLATE NOCASE)
            ORDER BY received_at DESC, id DESC
            LIMIT ?
            ",
        )
        .bind(user_id.0)
        .bind(placeholder_address)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("protocol_id")).collect())
    }

    /// Overwrite the sender of a message. Returns true if a row changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn update_sender(
        &self,
        protocol_id: &str,
        user_id: UserId,
        address: &str,
        name: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE messages SET sender_address = ?, sender_name = ?
            WHERE protocol_id = ? AND user_id = ?
            ",
        )
        .bind(address)
        .bind(name)
        .bind(protocol_id)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<StoredMessage> {
        let id = MessageId(row.get("id"));
        let recipients = sqlx::query(
            "SELECT kind, address, name FROM recipients WHERE message_id = ? ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .filter_map(|r| {
            Some(Recipient {
                kind: RecipientKind::parse(r.get("kind"))?,
                address: r.get("address"),
                name: r.get("name"),
            })
        })
        .collect();

        Ok(StoredMessage {
            id,
            folder_id: FolderId(row.get("folder_id")),
            protocol_id: row.get("protocol_id"),
            subject: row.get("subject"),
            sender_address: row.get("sender_address"),
            sender_name: row.get("sender_name"),
            body: row.get("body"),
            received_at: parse_optional_timestamp(row.get("received_at")),
            is_read: row.get("is_read"),
            has_attachments: row.get("has_attachments"),
            importance: Importance::parse(row.get("importance")),
            internet_message_id: row.get("internet_message_id"),
            size: row.get("size"),
            last_synced_at: parse_optional_timestamp(row.get("last_synced_at"))
                .unwrap_or_default(),
            recipients,
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Fixed-width UTC text so that lexical order matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_optional_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(protocol_id: &str, minute: u32) -> MessageRecord {
        MessageRecord {
            protocol_id: protocol_id.to_string(),
            subject: format!("Subject {protocol_id}"),
            sender_address: "jane@example.com".into(),
            sender_name: "Jane".into(),
            sender_is_placeholder: false,
            body: Some("<p>body</p>".into()),
            received_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()),
            is_read: false,
            has_attachments: false,
            importance: Importance::Normal,
            internet_message_id: None,
            size: Some(1024),
            recipients: Some(vec![Recipient {
                kind: RecipientKind::To,
                address: "office@example.com".into(),
                name: None,
            }]),
        }
    }

    async fn setup() -> (MailStore, UserId, FolderId) {
        let store = MailStore::in_memory().await.unwrap();
        let user = store.get_or_create_user("Owner@Example.com").await.unwrap();
        let folder = store.get_or_create_folder("INBOX", user).await.unwrap();
        (store, user, folder)
    }

    #[tokio::test]
    async fn test_user_creation_is_idempotent() {
        let store = MailStore::in_memory().await.unwrap();
        let a = store.get_or_create_user("owner@example.com").await.unwrap();
        let b = store.get_or_create_user(" OWNER@example.com ").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.find_user("owner@example.com").await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn test_resolve_user_external_policy() {
        let store = MailStore::in_memory().await.unwrap();
        let result = store
            .resolve_user("ghost@example.com", UserProvisioning::External)
            .await;
        assert!(matches!(result, Err(Error::UserNotProvisioned(_))));

        let created = store
            .resolve_user("ghost@example.com", UserProvisioning::AutoCreate)
            .await
            .unwrap();
        let found = store
            .resolve_user("ghost@example.com", UserProvisioning::External)
            .await
            .unwrap();
        assert_eq!(created, found);
    }

    #[tokio::test]
    async fn test_folder_unique_per_user() {
        let (store, user, folder) = setup().await;
        assert_eq!(store.get_or_create_folder("INBOX", user).await.unwrap(), folder);

        let other = store.get_or_create_user("other@example.com").await.unwrap();
        let other_folder = store.get_or_create_folder("INBOX", other).await.unwrap();
        assert_ne!(other_folder, folder);

        let record = store.folder("INBOX", user).await.unwrap().unwrap();
        assert_eq!(record.display_name, "Inbox");
        assert!(record.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_record_folder_sync() {
        let (store, user, folder) = setup().await;
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        store.record_folder_sync(folder, at, 7).await.unwrap();

        let record = store.folder("INBOX", user).await.unwrap().unwrap();
        assert_eq!(record.last_synced_at, Some(at));
        assert_eq!(record.last_sync_count, 7);
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let (store, user, folder) = setup().await;
        let first = store
            .upsert_message(&record("p1", 0), user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();

        let mut changed = record("p1", 0);
        changed.subject = "Updated".into();
        let second = store
            .upsert_message(&changed, user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.get_message_count(user, folder).await.unwrap(), 1);
        let stored = store.get_message_by_id("p1", user).await.unwrap();
        assert_eq!(stored.subject, "Updated");
    }

    #[tokio::test]
    async fn test_recipients_replaced() {
        let (store, user, folder) = setup().await;
        let mut many = record("p1", 0);
        many.recipients = Some(
            ["a", "b", "c"]
                .iter()
                .map(|n| Recipient {
                    kind: RecipientKind::To,
                    address: format!("{n}@example.com"),
                    name: None,
                })
                .collect(),
        );
        store
            .upsert_message(&many, user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();
        store
            .upsert_message(&record("p1", 0), user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();

        let stored = store.get_message_by_id("p1", user).await.unwrap();
        assert_eq!(stored.recipients.len(), 1);
        assert_eq!(stored.recipients[0].address, "office@example.com");
    }

    #[tokio::test]
    async fn test_summary_only_update_keeps_recipients() {
        let (store, user, folder) = setup().await;
        store
            .upsert_message(&record("p1", 0), user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();

        let mut summary_only = record("p1", 0);
        summary_only.body = None;
        summary_only.recipients = None;
        store
            .upsert_message(&summary_only, user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();

        let stored = store.get_message_by_id("p1", user).await.unwrap();
        assert_eq!(stored.recipients.len(), 1);
        assert_eq!(stored.recipients[0].address, "office@example.com");
        assert_eq!(stored.body.as_deref(), Some("<p>body</p>"));
    }

    #[tokio::test]
    async fn test_read_flag_policy() {
        let (store, user, folder) = setup().await;
        store
            .upsert_message(&record("p1", 0), user, folder, ReadFlagPolicy::PreserveLocal)
            .await
            .unwrap();
        assert!(store.mark_read("p1", user).await.unwrap());

        store
            .upsert_message(&record("p1", 0), user, folder, ReadFlagPolicy::PreserveLocal)
            .await
            .unwrap();
        assert!(store.get_message_by_id("p1", user).await.unwrap().is_read);

        store
            .upsert_message(&record("p1", 0), user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();
        assert!(!store.get_message_by_id("p1", user).await.unwrap().is_read);
    }

    #[tokio::test]
    async fn test_placeholder_does_not_clobber_real_sender() {
        let (store, user, folder) = setup().await;
        store
            .upsert_message(&record("p1", 0), user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();

        let mut degraded = record("p1", 0);
        degraded.sender_address = "no-sender@mailbox.local".into();
        degraded.sender_name = "Unknown Sender".into();
        degraded.sender_is_placeholder = true;
        degraded.body = None;
        store
            .upsert_message(&degraded, user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();

        let stored = store.get_message_by_id("p1", user).await.unwrap();
        assert_eq!(stored.sender_address, "jane@example.com");
        assert_eq!(stored.body.as_deref(), Some("<p>body</p>"));
    }

    #[tokio::test]
    async fn test_get_messages_ordering_and_paging() {
        let (store, user, folder) = setup().await;
        for (id, minute) in [("old", 1), ("new", 30), ("mid", 15)] {
            store
                .upsert_message(&record(id, minute), user, folder, ReadFlagPolicy::Overwrite)
                .await
                .unwrap();
        }

        let page = store.get_messages(user, folder, 2, 0).await.unwrap();
        let ids: Vec<_> = page.iter().map(|m| m.protocol_id.as_str()).collect();
        assert_eq!(ids, ["new", "mid"]);

        let page = store.get_messages(user, folder, 2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].protocol_id, "old");
    }

    #[tokio::test]
    async fn test_get_message_by_id_not_found() {
        let (store, user, _) = setup().await;
        assert!(matches!(
            store.get_message_by_id("missing", user).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.mark_read("missing", user).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_message_flexible() {
        let (store, user, folder) = setup().await;
        let id = store
            .upsert_message(&record("AAMkAD=", 0), user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();

        let by_local = store.find_message(&id.to_string(), user).await.unwrap().unwrap();
        assert_eq!(by_local.protocol_id, "AAMkAD=");

        let by_exact = store.find_message("AAMkAD=", user).await.unwrap().unwrap();
        assert_eq!(by_exact.id, id);

        let by_prefix = store.find_message("AAMk/extra/path", user).await.unwrap().unwrap();
        assert_eq!(by_prefix.id, id);

        assert!(store.find_message("zzz", user).await.unwrap().is_none());
        assert!(store.find_message("", user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_read_idempotent() {
        let (store, user, folder) = setup().await;
        store
            .upsert_message(&record("p1", 0), user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();
        assert!(store.mark_read("p1", user).await.unwrap());
        assert!(!store.mark_read("p1", user).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_sender_and_update() {
        let (store, user, folder) = setup().await;
        let mut unknown = record("p1", 0);
        unknown.sender_address = "No-Sender@mailbox.local".into();
        store
            .upsert_message(&unknown, user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();
        store
            .upsert_message(&record("p2", 1), user, folder, ReadFlagPolicy::Overwrite)
            .await
            .unwrap();

        let missing = store
            .messages_missing_sender(user, "no-sender@mailbox.local", 10)
            .await
            .unwrap();
        assert_eq!(missing, vec!["p1".to_string()]);

        assert!(
            store
                .update_sender("p1", user, "fixed@example.com", "Fixed")
                .await
                .unwrap()
        );
        assert!(
            store
                .messages_missing_sender(user, "no-sender@mailbox.local", 10)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
