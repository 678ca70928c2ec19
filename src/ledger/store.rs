//! Ledger persistence.
//!
//! [`LedgerStore`] is the synchronous storage seam behind
//! [`UsageLedger`](crate::ledger::UsageLedger). The SQLite implementation keeps
//! one JSON document per user plus an append-only history table, and applies
//! each update (document increments and history row) in a single transaction.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::config::ExistencePolicy;
use crate::db::Database;
use crate::ledger::document::{apply_increments, new_document, Increment};
use crate::ledger::{HistoryRecord, LedgerError};

/// Everything one billed call changes, applied atomically.
#[derive(Debug, Clone)]
pub struct LedgerUpdate {
    pub user_id: String,
    pub increments: Vec<Increment>,
    pub record: HistoryRecord,
}

/// Raw stored ledger: the document as persisted plus its history rows.
#[derive(Debug, Clone)]
pub struct StoredLedger {
    pub document: Value,
    pub history: Vec<HistoryRecord>,
    pub created_at: String,
    pub updated_at: String,
}

pub trait LedgerStore: Send + Sync {
    fn exists(&self, user_id: &str) -> Result<bool, LedgerError>;

    /// Create an empty ledger. Fails with [`LedgerError::UserExists`] when one
    /// is already present.
    fn create(&self, user_id: &str) -> Result<(), LedgerError>;

    /// Apply `update` atomically and return the document after the update.
    fn apply(&self, update: &LedgerUpdate, policy: ExistencePolicy) -> Result<Value, LedgerError>;

    fn load(&self, user_id: &str) -> Result<Option<StoredLedger>, LedgerError>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteLedgerStore {
    db: Database,
}

impl SqliteLedgerStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn exists(&self, user_id: &str) -> Result<bool, LedgerError> {
        let found = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM ledgers WHERE user_id = ?1",
                params![user_id],
                |_| Ok(()),
            )
            .optional()
        })?;
        Ok(found.is_some())
    }

    fn create(&self, user_id: &str) -> Result<(), LedgerError> {
        let document = serde_json::to_string(&new_document(user_id))?;
        let inserted = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ledgers (user_id, document) VALUES (?1, ?2) \
                 ON CONFLICT(user_id) DO NOTHING",
                params![user_id, document],
            )
        })?;
        if inserted == 0 {
            return Err(LedgerError::UserExists(user_id.to_string()));
        }
        Ok(())
    }

    fn apply(&self, update: &LedgerUpdate, policy: ExistencePolicy) -> Result<Value, LedgerError> {
        self.db
            .with_conn(|conn| {
                let tx = conn.unchecked_transaction()?;

                let stored: Option<String> = tx
                    .prepare_cached("SELECT document FROM ledgers WHERE user_id = ?1")?
                    .query_row(params![update.user_id], |row| row.get(0))
                    .optional()?;

                let mut document = match stored {
                    Some(raw) => match serde_json::from_str::<Value>(&raw) {
                        Ok(doc) => doc,
                        Err(e) => return Ok(Err(LedgerError::from(e))),
                    },
                    None if policy == ExistencePolicy::Upsert => new_document(&update.user_id),
                    None => return Ok(Err(LedgerError::UserNotFound(update.user_id.clone()))),
                };

                if let Err(e) = apply_increments(&mut document, &update.increments) {
                    return Ok(Err(e));
                }
                let serialized = match serde_json::to_string(&document) {
                    Ok(s) => s,
                    Err(e) => return Ok(Err(LedgerError::from(e))),
                };

                tx.prepare_cached(
                    "INSERT INTO ledgers (user_id, document) VALUES (?1, ?2) \
                     ON CONFLICT(user_id) DO UPDATE SET document = excluded.document, \
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                )?
                .execute(params![update.user_id, serialized])?;

                let r = &update.record;
                tx.prepare_cached(
                    "INSERT INTO ledger_history (user_id, provider, model, input_tokens, \
                     output_tokens, input_cost, output_cost, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?
                .execute(params![
                    update.user_id,
                    r.provider,
                    r.model,
                    r.input_tokens as i64,
                    r.output_tokens as i64,
                    r.input_cost,
                    r.output_cost,
                    r.timestamp.to_rfc3339(),
                ])?;

                tx.commit()?;
                Ok(Ok(document))
            })?
    }

    fn load(&self, user_id: &str) -> Result<Option<StoredLedger>, LedgerError> {
        // Document and history come from one read transaction so the totals
        // always agree with the history rows.
        let snapshot = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let row = tx
                .prepare_cached("SELECT document, created_at, updated_at FROM ledgers WHERE user_id = ?1")?
                .query_row(params![user_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                })
                .optional()?;
            let Some(row) = row else {
                return Ok(None);
            };

            let mut stmt = tx.prepare_cached(
                "SELECT provider, model, input_tokens, output_tokens, input_cost, output_cost, created_at \
                 FROM ledger_history WHERE user_id = ?1 ORDER BY seq",
            )?;
            let history = stmt
                .query_map(params![user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);
            tx.commit()?;
            Ok(Some((row, history)))
        })?;

        let Some(((raw, created_at, updated_at), rows)) = snapshot else {
            return Ok(None);
        };

        let history = rows
            .into_iter()
            .map(|(provider, model, input_tokens, output_tokens, input_cost, output_cost, created)| {
                let timestamp = chrono::DateTime::parse_from_rfc3339(&created)
                    .map_err(|e| LedgerError::Persistence(format!("bad history timestamp {created:?}: {e}")))?
                    .with_timezone(&chrono::Utc);
                Ok(HistoryRecord {
                    provider,
                    model,
                    input_tokens: input_tokens.max(0) as u64,
                    output_tokens: output_tokens.max(0) as u64,
                    input_cost,
                    output_cost,
                    timestamp,
                })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;

        Ok(Some(StoredLedger {
            document: serde_json::from_str(&raw)?,
            history,
            created_at,
            updated_at,
        }))
    }
}
