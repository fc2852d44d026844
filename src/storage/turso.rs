use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database, Row, Value};
use std::{path::Path, sync::Arc};

use crate::service::entitlement::{
    EntitlementState, EntitlementWrite, StoreCorrelation, Subscription, User, UserLookup,
};

use super::{EntitlementStore, StorageError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT UNIQUE,
    premium_until INTEGER
);
CREATE TABLE IF NOT EXISTS subscriptions (
    user_id INTEGER PRIMARY KEY REFERENCES users(id),
    status TEXT NOT NULL,
    store TEXT NOT NULL,
    product_id TEXT,
    current_period_start INTEGER,
    current_period_end INTEGER,
    apple_original_transaction_id TEXT,
    google_purchase_token TEXT,
    updated_at INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS subscriptions_apple_original_transaction_id
    ON subscriptions (apple_original_transaction_id);
CREATE UNIQUE INDEX IF NOT EXISTS subscriptions_google_purchase_token
    ON subscriptions (google_purchase_token);
CREATE TABLE IF NOT EXISTS processed_events (
    event_key TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    processed_at INTEGER NOT NULL
);
";

const SUBSCRIPTION_COLUMNS: &str = "user_id, status, store, product_id, current_period_start, current_period_end, \
     apple_original_transaction_id, google_purchase_token";

#[derive(Clone)]
pub struct TursoStore {
    inner: Arc<Database>,
}

impl TursoStore {
    pub async fn new_remote(url: &str, token: &str) -> Result<Self, StorageError> {
        info!("Initializing TursoStore...");
        let db = Builder::new_remote(url.to_string(), token.to_string()).build().await?;
        info!("TursoStore initialized");
        Ok(Self { inner: Arc::new(db) })
    }

    pub async fn new_local(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Builder::new_local(path.as_ref()).build().await?;
        Ok(Self { inner: Arc::new(db) })
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA).await?;
        info!("TursoStore schema is up to date");
        Ok(())
    }

    fn get_connection(&self) -> Result<Connection, StorageError> {
        Ok(self.inner.connect()?)
    }

    async fn load_user(&self, conn: &Connection, user_id: i64) -> Result<Option<User>, StorageError> {
        let mut rows = conn
            .query(
                "SELECT id, email, premium_until FROM users WHERE id = ?1 LIMIT 1",
                [user_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl EntitlementStore for TursoStore {
    async fn find_user(&self, lookup: &UserLookup) -> Result<Option<User>, StorageError> {
        let conn = self.get_connection()?;
        match lookup {
            UserLookup::Id(id) => self.load_user(&conn, *id).await,
            UserLookup::Email(email) => {
                let mut rows = conn
                    .query(
                        "SELECT id, email, premium_until FROM users WHERE email = ?1 LIMIT 1",
                        [email.as_str()],
                    )
                    .await?;

                match rows.next().await? {
                    Some(row) => Ok(Some(user_from_row(&row)?)),
                    None => Ok(None),
                }
            }
        }
    }

    async fn read_entitlement(&self, user_id: i64) -> Result<EntitlementState, StorageError> {
        let conn = self.get_connection()?;
        let user = self
            .load_user(&conn, user_id)
            .await?
            .ok_or_else(|| StorageError::Other(format!("Unknown user {}", user_id)))?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM subscriptions WHERE user_id = ?1 LIMIT 1",
                    SUBSCRIPTION_COLUMNS
                ),
                [user_id],
            )
            .await?;

        let subscription = match rows.next().await? {
            Some(row) => Some(subscription_from_row(&row)?),
            None => None,
        };

        Ok(EntitlementState {
            premium_until: user.premium_until,
            subscription,
        })
    }

    async fn write_entitlement(&self, user_id: i64, write: &EntitlementWrite) -> Result<(), StorageError> {
        let conn = self.get_connection()?;
        let tx = conn.transaction().await?;
        let now = Utc::now().timestamp_millis();

        let updated = tx
            .execute(
                "UPDATE users SET premium_until = ?1 WHERE id = ?2",
                vec![millis_value(write.premium_until), Value::Integer(user_id)],
            )
            .await?;
        if updated != 1 {
            return Err(StorageError::Other(format!("Unknown user {}", user_id)));
        }

        if let Some(sub) = &write.subscription {
            tx.execute(
                &format!(
                    "INSERT INTO subscriptions ({}, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                     ON CONFLICT(user_id) DO UPDATE SET \
                     status = excluded.status, \
                     store = excluded.store, \
                     product_id = excluded.product_id, \
                     current_period_start = excluded.current_period_start, \
                     current_period_end = excluded.current_period_end, \
                     apple_original_transaction_id = excluded.apple_original_transaction_id, \
                     google_purchase_token = excluded.google_purchase_token, \
                     updated_at = excluded.updated_at",
                    SUBSCRIPTION_COLUMNS
                ),
                vec![
                    Value::Integer(user_id),
                    Value::Text(sub.status.to_string()),
                    Value::Text(sub.store.to_string()),
                    text_value(sub.product_id.as_deref()),
                    millis_value(sub.current_period_start),
                    millis_value(sub.current_period_end),
                    text_value(sub.apple_original_transaction_id.as_deref()),
                    text_value(sub.google_purchase_token.as_deref()),
                    Value::Integer(now),
                ],
            )
            .await?;
        }

        if let Some(event_key) = &write.event_key {
            tx.execute(
                "INSERT INTO processed_events (event_key, user_id, processed_at) VALUES (?1, ?2, ?3)",
                vec![
                    Value::Text(event_key.clone()),
                    Value::Integer(user_id),
                    Value::Integer(now),
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn event_owner(&self, event_key: &str) -> Result<Option<i64>, StorageError> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT user_id FROM processed_events WHERE event_key = ?1 LIMIT 1",
                [event_key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(column_i64(&row, 0, "processed_events")?)),
            None => Ok(None),
        }
    }

    async fn correlation_owner(&self, correlation: &StoreCorrelation) -> Result<Option<i64>, StorageError> {
        let (column, value) = match correlation {
            StoreCorrelation::AppleOriginalTransaction(id) => ("apple_original_transaction_id", id),
            StoreCorrelation::GooglePurchaseToken(token) => ("google_purchase_token", token),
        };

        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                &format!("SELECT user_id FROM subscriptions WHERE {} = ?1 LIMIT 1", column),
                [value.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(column_i64(&row, 0, "subscriptions")?)),
            None => Ok(None),
        }
    }

    async fn insert_user(&self, email: Option<&str>) -> Result<User, StorageError> {
        let conn = self.get_connection()?;
        conn.execute("INSERT INTO users (email) VALUES (?1)", vec![text_value(email)])
            .await?;

        Ok(User {
            id: conn.last_insert_rowid(),
            email: email.map(str::to_string),
            premium_until: None,
        })
    }
}

fn millis_value(at: Option<DateTime<Utc>>) -> Value {
    match at {
        Some(at) => Value::Integer(at.timestamp_millis()),
        None => Value::Null,
    }
}

fn text_value(text: Option<&str>) -> Value {
    match text {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    }
}

fn column_i64(row: &Row, idx: i32, table: &'static str) -> Result<i64, StorageError> {
    match row.get_value(idx)? {
        Value::Integer(v) => Ok(v),
        other => Err(StorageError::CorruptRow {
            table,
            reason: format!("column {} is not an integer: {:?}", idx, other),
        }),
    }
}

fn column_opt_text(row: &Row, idx: i32, table: &'static str) -> Result<Option<String>, StorageError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(v) => Ok(Some(v)),
        other => Err(StorageError::CorruptRow {
            table,
            reason: format!("column {} is not text: {:?}", idx, other),
        }),
    }
}

fn column_text(row: &Row, idx: i32, table: &'static str) -> Result<String, StorageError> {
    column_opt_text(row, idx, table)?.ok_or_else(|| StorageError::CorruptRow {
        table,
        reason: format!("column {} is null", idx),
    })
}

fn column_opt_time(row: &Row, idx: i32, table: &'static str) -> Result<Option<DateTime<Utc>>, StorageError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(ms) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| StorageError::CorruptRow {
                table,
                reason: format!("column {} holds an out of range timestamp: {}", idx, ms),
            }),
        other => Err(StorageError::CorruptRow {
            table,
            reason: format!("column {} is not a timestamp: {:?}", idx, other),
        }),
    }
}

fn user_from_row(row: &Row) -> Result<User, StorageError> {
    Ok(User {
        id: column_i64(row, 0, "users")?,
        email: column_opt_text(row, 1, "users")?,
        premium_until: column_opt_time(row, 2, "users")?,
    })
}

fn subscription_from_row(row: &Row) -> Result<Subscription, StorageError> {
    let corrupt = |reason: String| StorageError::CorruptRow {
        table: "subscriptions",
        reason,
    };

    Ok(Subscription {
        user_id: column_i64(row, 0, "subscriptions")?,
        status: column_text(row, 1, "subscriptions")?.parse().map_err(corrupt)?,
        store: column_text(row, 2, "subscriptions")?.parse().map_err(corrupt)?,
        product_id: column_opt_text(row, 3, "subscriptions")?,
        current_period_start: column_opt_time(row, 4, "subscriptions")?,
        current_period_end: column_opt_time(row, 5, "subscriptions")?,
        apple_original_transaction_id: column_opt_text(row, 6, "subscriptions")?,
        google_purchase_token: column_opt_text(row, 7, "subscriptions")?,
    })
}
