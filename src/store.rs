//! Persistent row store: a JSON workbook of sheets addressed like a spreadsheet.
//!
//! The file holds a list of named sheets, each a list of ragged rows of
//! cells. Row 1 is a header; rows and columns are 1-indexed so the column
//! numbers used throughout the crate read the same as the spreadsheet the
//! workflow was designed around.
//!
//! ## Durability
//!
//! [`RowStore::persist`] writes to a temp file in the store's directory and
//! renames it over the original, so a crash mid-write leaves either the old
//! or the new file, never a truncated one. Writes that do not change a cell's
//! value do not dirty the store; a run that changes nothing never rewrites
//! the file.

use crate::credentials::CandidateSecrets;
use crate::error::{PipelineError, ERROR_MARKER_PREFIX};
use crate::fields::{ExtractedFields, NULL_SENTINEL};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ── Column layout ────────────────────────────────────────────────────────

/// Row identifier column.
pub const COL_ID: usize = 1;
/// Relative (or absolute) document path column.
pub const COL_FILE_PATH: usize = 2;
/// First status column; doubles as the error-marker cell.
pub const COL_STATUS_FIRST: usize = 3;
/// Last status column.
pub const COL_STATUS_LAST: usize = 14;
/// Staged candidate-secret columns.
pub const COL_SECRETS: [usize; 3] = [16, 17, 18];

/// Header row written when a store is created from scratch.
pub const CN_DATABASE_HEADER: [&str; 18] = [
    "ID",
    "File Path",
    "Is it a CN?",
    "Operation Type",
    "Is it a Multiseries?",
    "Currency",
    "Gross Amount",
    "Net Amount",
    "Units",
    "Equalization",
    "Fees",
    "NAV price",
    "NAV date",
    "Settlement Date",
    "",
    "Password 1",
    "Password 2",
    "Password 3",
];

// ── Cells ────────────────────────────────────────────────────────────────

/// A single cell. Serialises to a bare JSON scalar (`null` when empty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl CellValue {
    /// `true` for a missing cell or an empty / whitespace-only string.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_null_sentinel(&self) -> bool {
        matches!(self, CellValue::Text(s) if s == NULL_SENTINEL)
    }

    /// The cell as text, or `None` when empty.
    pub fn as_text(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.to_string())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<u64> for CellValue {
    fn from(n: u64) -> Self {
        CellValue::Number(n.into())
    }
}

// ── Sheets & workbook ────────────────────────────────────────────────────

/// A named grid of ragged rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Number of rows including the header.
    pub fn max_row(&self) -> usize {
        self.rows.len()
    }

    /// Read a cell (1-indexed). Out-of-range reads return [`CellValue::Empty`].
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        if row == 0 || col == 0 {
            return &EMPTY;
        }
        self.rows
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .unwrap_or(&EMPTY)
    }

    /// Write a cell (1-indexed), padding rows and columns as needed.
    ///
    /// Returns `true` when the stored value actually changed.
    pub fn set_cell(&mut self, row: usize, col: usize, value: CellValue) -> bool {
        if row == 0 || col == 0 {
            return false;
        }
        if self.cell(row, col) == &value {
            return false;
        }
        if self.rows.len() < row {
            self.rows.resize_with(row, Vec::new);
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < col {
            cells.resize_with(col, CellValue::default);
        }
        cells[col - 1] = value;
        true
    }
}

/// The whole store file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }
}

// ── Typed row view ───────────────────────────────────────────────────────

/// Where a row stands in the workflow, derived from its cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    /// Not yet processed (or partially written by hand).
    Pending,
    /// All twelve status fields are populated.
    Completed,
    /// The error-marker cell holds a diagnostic.
    Failed { marker: String },
}

/// One unit of work read from the row store.
#[derive(Debug, Clone)]
pub struct RowRecord {
    /// 1-indexed sheet row.
    pub row_number: usize,
    pub id: Option<u64>,
    pub file_path: Option<String>,
    pub secrets: CandidateSecrets,
    pub status: RowStatus,
}

// ── Row store ────────────────────────────────────────────────────────────

/// A workbook file opened on one row sheet.
#[derive(Debug)]
pub struct RowStore {
    path: PathBuf,
    /// Index of the row sheet; sheets are only ever added or replaced in place.
    sheet_index: usize,
    workbook: Workbook,
    dirty: bool,
}

impl RowStore {
    /// Load the workbook at `path` and bind to `sheet_name`.
    pub fn open(path: impl AsRef<Path>, sheet_name: &str) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(PipelineError::StoreNotFound { path });
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| PipelineError::StoreCorrupt {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        let workbook: Workbook =
            serde_json::from_str(&raw).map_err(|e| PipelineError::StoreCorrupt {
                path: path.clone(),
                detail: e.to_string(),
            })?;

        let Some(sheet_index) = workbook.sheets.iter().position(|s| s.name == sheet_name) else {
            return Err(PipelineError::SheetMissing {
                path,
                name: sheet_name.to_string(),
            });
        };

        debug!("Opened store {} on sheet '{}'", path.display(), sheet_name);
        Ok(Self {
            path,
            sheet_index,
            workbook,
            dirty: false,
        })
    }

    /// Create a new store file holding an empty row sheet with the standard header.
    pub fn create(path: impl AsRef<Path>, sheet_name: &str) -> Result<Self, PipelineError> {
        let mut sheet = Sheet::new(sheet_name);
        sheet
            .rows
            .push(CN_DATABASE_HEADER.iter().map(|h| CellValue::from(*h)).collect());
        let mut store = Self {
            path: path.as_ref().to_path_buf(),
            sheet_index: 0,
            workbook: Workbook {
                sheets: vec![sheet],
            },
            dirty: true,
        };
        store.persist()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory relative document paths resolve against.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Resolve a row's `file_path` cell to a location on disk.
    pub fn resolve_path(&self, file_path: &str) -> PathBuf {
        let p = Path::new(file_path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir().join(p)
        }
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// Add a sheet (or replace one with the same name).
    pub fn put_sheet(&mut self, sheet: Sheet) {
        match self.workbook.sheet_mut(&sheet.name) {
            Some(existing) if *existing == sheet => return,
            Some(existing) => *existing = sheet,
            None => self.workbook.sheets.push(sheet),
        }
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn rows(&self) -> &Sheet {
        &self.workbook.sheets[self.sheet_index]
    }

    fn set(&mut self, row: usize, col: usize, value: CellValue) {
        if self.workbook.sheets[self.sheet_index].set_cell(row, col, value) {
            self.dirty = true;
        }
    }

    /// Read a single cell of the row sheet.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows().cell(row, col)
    }

    /// Typed view of one sheet row.
    pub fn record(&self, row_number: usize) -> RowRecord {
        let sheet = self.rows();
        let id = parse_id(sheet.cell(row_number, COL_ID));
        let file_path = sheet.cell(row_number, COL_FILE_PATH).as_text();
        let secrets = CandidateSecrets::new(
            COL_SECRETS.map(|c| sheet.cell(row_number, c).as_text().unwrap_or_default()),
        );

        let marker_cell = sheet.cell(row_number, COL_STATUS_FIRST);
        let status = match marker_cell {
            CellValue::Text(s) if s.starts_with(ERROR_MARKER_PREFIX) => {
                RowStatus::Failed { marker: s.clone() }
            }
            _ if (COL_STATUS_FIRST..=COL_STATUS_LAST)
                .all(|c| !sheet.cell(row_number, c).is_empty()) =>
            {
                RowStatus::Completed
            }
            _ => RowStatus::Pending,
        };

        RowRecord {
            row_number,
            id,
            file_path,
            secrets,
            status,
        }
    }

    /// All data rows (header excluded), ordered by ascending id.
    ///
    /// Rows without a parseable id keep their sheet order after the others.
    pub fn records(&self) -> Vec<RowRecord> {
        let mut records: Vec<RowRecord> =
            (2..=self.rows().max_row()).map(|r| self.record(r)).collect();
        records.sort_by_key(|r| (r.id.is_none(), r.id, r.row_number));
        records
    }

    /// Highest id currently in the sheet.
    pub fn max_id(&self) -> u64 {
        (2..=self.rows().max_row())
            .filter_map(|r| parse_id(self.rows().cell(r, COL_ID)))
            .max()
            .unwrap_or(0)
    }

    /// Append a new row with the next id and a file path.
    ///
    /// Secrets are staged separately through
    /// [`stage_secrets`](crate::credentials::stage_secrets).
    /// Returns `(id, row_number)`.
    pub fn append_row(&mut self, file_path: &str) -> (u64, usize) {
        let id = self.max_id() + 1;
        let row_number = self.rows().max_row() + 1;
        self.set(row_number, COL_ID, CellValue::from(id));
        self.set(row_number, COL_FILE_PATH, CellValue::from(file_path));
        debug!("Appended row {} (id {}) for {}", row_number, id, file_path);
        (id, row_number)
    }

    /// Write the twelve extracted fields and clear the staged secrets.
    ///
    /// Both writes land in memory together; the next [`persist`](Self::persist)
    /// makes them durable together.
    pub fn complete_row(&mut self, row_number: usize, fields: &ExtractedFields) {
        for (col, value) in fields.cells() {
            self.set(row_number, col, value.clone());
        }
        self.clear_secrets(row_number);
    }

    /// Record a failure. Status columns after the marker are emptied so a
    /// row never carries both a marker and extracted values.
    pub fn mark_error(&mut self, row_number: usize, marker: &str) {
        self.set(row_number, COL_STATUS_FIRST, CellValue::from(marker));
        for col in (COL_STATUS_FIRST + 1)..=COL_STATUS_LAST {
            self.set(row_number, col, CellValue::Empty);
        }
    }

    /// Empty the three staged-secret cells.
    pub fn clear_secrets(&mut self, row_number: usize) {
        for col in COL_SECRETS {
            self.set(row_number, col, CellValue::Empty);
        }
    }

    /// Write the three staged-secret cells (empties included).
    pub(crate) fn write_secrets(&mut self, row_number: usize, secrets: &CandidateSecrets) {
        for (col, secret) in COL_SECRETS.iter().zip(secrets.slots()) {
            let value = if secret.is_empty() {
                CellValue::Empty
            } else {
                CellValue::from(secret.as_str())
            };
            self.set(row_number, *col, value);
        }
    }

    /// Atomically write the workbook back to disk if anything changed.
    pub fn persist(&mut self) -> Result<(), PipelineError> {
        if !self.dirty {
            return Ok(());
        }

        let persist_err = |source: std::io::Error| PipelineError::PersistFailed {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(&self.workbook)
            .map_err(|e| PipelineError::Internal(format!("store serialisation: {e}")))?;

        let dir = self.base_dir();
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
        tmp.write_all(&json).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(&self.path)
            .map_err(|e| persist_err(e.error))?;

        self.dirty = false;
        info!("Store saved: {}", self.path.display());
        Ok(())
    }
}

fn parse_id(cell: &CellValue) -> Option<u64> {
    match cell {
        CellValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        CellValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}
