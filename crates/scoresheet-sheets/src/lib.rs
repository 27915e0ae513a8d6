//! Match sheet repository: the whole collection lives under one key of a
//! `KeyValueStore` (the encrypted adapter in production) as a JSON array,
//! newest sheet first.

pub mod migrate;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use rand::Rng;
use scoresheet_core::{
    sheets::{iso_millis, MatchData, MatchSheet},
    storage::KeyValueStore,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::migrate::migrate_match_data;

/// Store key holding the serialized collection.
pub const SHEETS_KEY: &str = "@fsgt_match_sheets";

const ID_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 7;

/// Record as found on disk; `data` may be in any earlier schema.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSheet {
    id: String,
    #[serde(with = "iso_millis")]
    created_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    data: Value,
}

/// In-memory view of the persisted collection.
///
/// Every mutation rewrites the full collection, so callers must not overlap
/// saves or deletes on the same collection. `&mut self` enforces this for a
/// single owner; separate repositories over the same store would clobber
/// each other's writes.
pub struct MatchSheetRepository<S: KeyValueStore> {
    store: Arc<S>,
    sheets: Vec<MatchSheet>,
    loaded: bool,
}

impl<S: KeyValueStore> MatchSheetRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            sheets: Vec::new(),
            loaded: false,
        }
    }

    /// All sheets, most recently created first.
    pub fn sheets(&self) -> &[MatchSheet] {
        &self.sheets
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Reads the collection from the store, migrating every payload.
    ///
    /// Unreadable (undecryptable) data or a value that is not a JSON array
    /// resets the collection to empty, while a malformed record is dropped on
    /// its own. Only store and vault failures are returned as errors, in which
    /// case the in-memory state is left as it was.
    #[instrument(skip(self))]
    pub async fn load_sheets(&mut self) -> Result<()> {
        let raw = match self.store.get_item(SHEETS_KEY).await {
            Ok(raw) => raw,
            Err(err) if err.is_unreadable() => {
                warn!(error = %err, "stored match sheets unreadable, starting empty");
                None
            }
            Err(err) => return Err(err).context("failed to read match sheets"),
        };

        self.sheets = raw.as_deref().map(parse_collection).unwrap_or_default();
        self.loaded = true;
        debug!(count = self.sheets.len(), "loaded match sheets");
        Ok(())
    }

    /// Creates or updates a sheet and persists the collection.
    ///
    /// An `id` that matches an existing sheet updates it in place; otherwise
    /// a new sheet is prepended, keeping the given id or generating one.
    #[instrument(skip(self, data))]
    pub async fn save_sheet(&mut self, id: Option<&str>, data: MatchData) -> Result<MatchSheet> {
        let id = id.filter(|id| !id.is_empty());
        let now = now_millis();
        let mut next = self.sheets.clone();

        let sheet = match id.and_then(|id| next.iter().position(|s| s.id == id)) {
            Some(index) => {
                let existing = &mut next[index];
                existing.data = data;
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let sheet = MatchSheet {
                    id: id.map(str::to_string).unwrap_or_else(generate_sheet_id),
                    created_at: now,
                    updated_at: now,
                    data,
                };
                next.insert(0, sheet.clone());
                sheet
            }
        };

        self.persist(&next).await?;
        self.sheets = next;
        debug!(id = %sheet.id, "saved match sheet");
        Ok(sheet)
    }

    /// Removes a sheet and persists the collection. Returns `false` (and
    /// writes nothing) when no sheet has that id.
    #[instrument(skip(self))]
    pub async fn delete_sheet(&mut self, id: &str) -> Result<bool> {
        if !self.sheets.iter().any(|s| s.id == id) {
            return Ok(false);
        }

        let next: Vec<MatchSheet> = self
            .sheets
            .iter()
            .filter(|s| s.id != id)
            .cloned()
            .collect();
        self.persist(&next).await?;
        self.sheets = next;
        debug!(id, "deleted match sheet");
        Ok(true)
    }

    /// In-memory lookup; never touches the store.
    pub fn get_sheet(&self, id: &str) -> Option<&MatchSheet> {
        self.sheets.iter().find(|s| s.id == id)
    }

    async fn persist(&self, sheets: &[MatchSheet]) -> Result<()> {
        let json = serde_json::to_string(sheets)?;
        self.store
            .set_item(SHEETS_KEY, &json)
            .await
            .context("failed to write match sheets")
    }
}

fn parse_collection(raw: &str) -> Vec<MatchSheet> {
    let records: Vec<Value> = match serde_json::from_str(raw) {
        Ok(records) => records,
        Err(err) => {
            warn!(error = %err, "corrupted match sheets data, resetting");
            return Vec::new();
        }
    };

    records.into_iter().filter_map(parse_record).collect()
}

/// One record of the collection; a bad record is dropped without touching
/// its neighbours.
fn parse_record(record: Value) -> Option<MatchSheet> {
    let label = record
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<no id>")
        .to_string();
    let StoredSheet {
        id,
        created_at,
        updated_at,
        data,
    } = match serde_json::from_value(record) {
        Ok(stored) => stored,
        Err(err) => {
            warn!(id = %label, error = %err, "dropping malformed match sheet record");
            return None;
        }
    };

    match migrate_match_data(data) {
        Ok(data) => Some(MatchSheet {
            id,
            created_at,
            updated_at,
            data,
        }),
        Err(err) => {
            warn!(%id, error = %err, "dropping match sheet with unreadable payload");
            None
        }
    }
}

fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// `fm_<unix millis>_<7 base36 chars>`.
pub fn generate_sheet_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_SUFFIX_ALPHABET[rng.gen_range(0..ID_SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("fm_{}_{suffix}", Utc::now().timestamp_millis())
}
