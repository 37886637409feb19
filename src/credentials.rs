//! Candidate decryption secrets: lookup by fund house and row-scoped staging.
//!
//! Secrets travel from the credential sheet into three temporary cells of a
//! row, are read by the row processor, and are cleared once the row is
//! extracted. Staging is write-once: a row whose secret cells are already
//! occupied cannot be re-staged until the processor clears them.

use crate::store::{RowStore, Sheet};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Number of secret slots per row.
pub const SECRET_SLOTS: usize = 3;

/// Up to three candidate passwords, in trial order.
///
/// `Debug` never prints the values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CandidateSecrets {
    slots: [String; SECRET_SLOTS],
}

impl CandidateSecrets {
    pub fn new(slots: [String; SECRET_SLOTS]) -> Self {
        Self {
            slots: slots.map(|s| s.trim().to_string()),
        }
    }

    /// Raw slots, empties included.
    pub fn slots(&self) -> &[String; SECRET_SLOTS] {
        &self.slots
    }

    /// Non-empty entries, order preserved.
    pub fn non_empty(&self) -> Vec<&str> {
        self.slots
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(String::is_empty)
    }
}

impl fmt::Debug for CandidateSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape: Vec<&str> = self
            .slots
            .iter()
            .map(|s| if s.is_empty() { "<empty>" } else { "<redacted>" })
            .collect();
        f.debug_tuple("CandidateSecrets").field(&shape).finish()
    }
}

/// One fund house's entry in the credential sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundHouseCredentials {
    pub id: String,
    pub fund_house: String,
    /// Term the mail search matches against message subjects.
    pub search_term: String,
    pub secrets: CandidateSecrets,
}

/// Credential sheet columns (1-indexed).
const COL_FH_ID: usize = 1;
const COL_FH_NAME: usize = 2;
const COL_SEARCH_TERM: usize = 17;
const COL_PASSWORDS: [usize; SECRET_SLOTS] = [18, 19, 20];

/// Fund-house id → credentials.
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    entries: HashMap<String, FundHouseCredentials>,
}

impl CredentialTable {
    /// Build the table from a credential sheet (header on row 1).
    ///
    /// When an id appears twice the first row wins.
    pub fn from_sheet(sheet: &Sheet) -> Self {
        let mut entries = HashMap::new();
        for row in 2..=sheet.max_row() {
            let Some(id) = sheet.cell(row, COL_FH_ID).as_text() else {
                continue;
            };
            let id = id.trim().to_string();
            if entries.contains_key(&id) {
                warn!("Duplicate fund-house id '{}' on credential row {}", id, row);
                continue;
            }
            let text = |col: usize| sheet.cell(row, col).as_text().unwrap_or_default();
            let entry = FundHouseCredentials {
                id: id.clone(),
                fund_house: text(COL_FH_NAME),
                search_term: text(COL_SEARCH_TERM).trim().trim_matches('"').to_string(),
                secrets: CandidateSecrets::new(COL_PASSWORDS.map(text)),
            };
            entries.insert(id, entry);
        }
        debug!("Loaded {} credential entries", entries.len());
        Self { entries }
    }

    pub fn lookup(&self, fund_house_id: &str) -> Option<&FundHouseCredentials> {
        self.entries.get(fund_house_id.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StagingError {
    /// The row still holds secrets from an earlier staging.
    #[error("Row {row} already has staged secrets")]
    AlreadyStaged { row: usize },
}

/// Write `secrets` into a row's temporary cells.
///
/// Fails if any of the row's secret cells is occupied; only the row
/// processor's clear makes a row stageable again.
pub fn stage_secrets(
    store: &mut RowStore,
    row_number: usize,
    secrets: &CandidateSecrets,
) -> Result<(), StagingError> {
    if !store.record(row_number).secrets.is_empty() {
        return Err(StagingError::AlreadyStaged { row: row_number });
    }
    store.write_secrets(row_number, secrets);
    Ok(())
}
