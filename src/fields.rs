//! The fixed Confirmation Note field schema and its mapping onto store columns.
//!
//! The schema is closed: twelve fields, always written together. A field the
//! model could not find is written as [`NULL_SENTINEL`] rather than left
//! empty, so a successfully processed row is always fully populated and can
//! be told apart from a row that was never processed.

use crate::store::CellValue;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Cell text written for a schema field whose value is `null` or absent.
pub const NULL_SENTINEL: &str = "null";

/// Raw key → value reply from a field extractor.
pub type FieldMap = BTreeMap<String, Value>;

/// One field of the Confirmation Note schema, in store-column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CnField {
    IsCn,
    OperationType,
    IsMultiseries,
    Currency,
    GrossAmount,
    NetAmount,
    Units,
    Equalization,
    Fees,
    NavPrice,
    NavDate,
    SettlementDate,
}

impl CnField {
    /// Every field, in column order.
    pub const ALL: [CnField; 12] = [
        CnField::IsCn,
        CnField::OperationType,
        CnField::IsMultiseries,
        CnField::Currency,
        CnField::GrossAmount,
        CnField::NetAmount,
        CnField::Units,
        CnField::Equalization,
        CnField::Fees,
        CnField::NavPrice,
        CnField::NavDate,
        CnField::SettlementDate,
    ];

    /// JSON key the extractor is asked to produce.
    pub fn key(self) -> &'static str {
        match self {
            CnField::IsCn => "is_cn",
            CnField::OperationType => "operation_type",
            CnField::IsMultiseries => "is_multiseries",
            CnField::Currency => "currency",
            CnField::GrossAmount => "gross_amount",
            CnField::NetAmount => "net_amount",
            CnField::Units => "units",
            CnField::Equalization => "equalization",
            CnField::Fees => "fees",
            CnField::NavPrice => "nav_price",
            CnField::NavDate => "nav_date",
            CnField::SettlementDate => "settlement_date",
        }
    }

    /// 1-indexed store column (3..=14).
    pub fn column(self) -> usize {
        // ALL is in column order starting at column 3.
        3 + CnField::ALL
            .iter()
            .position(|f| *f == self)
            .unwrap_or_default()
    }

    /// Parse a JSON key back into a field.
    pub fn from_key(key: &str) -> Option<CnField> {
        CnField::ALL.into_iter().find(|f| f.key() == key)
    }

    /// The schema as a list of JSON keys.
    pub fn schema() -> Vec<&'static str> {
        CnField::ALL.iter().map(|f| f.key()).collect()
    }
}

impl fmt::Display for CnField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A complete set of extracted values, one per schema field.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFields {
    values: [CellValue; 12],
}

impl ExtractedFields {
    /// Project an extractor reply onto the schema.
    ///
    /// Strings, numbers and booleans are kept verbatim; `null`, missing keys
    /// and blank strings become [`NULL_SENTINEL`]; nested arrays or objects
    /// are stored as their JSON text. Keys outside the schema are ignored.
    ///
    /// Every written cell is non-empty, so a completed row always reads back
    /// as [`RowStatus::Completed`](crate::store::RowStatus::Completed).
    pub fn from_map(map: &FieldMap) -> Self {
        let values = CnField::ALL.map(|field| match map.get(field.key()) {
            None | Some(Value::Null) => CellValue::Text(NULL_SENTINEL.to_string()),
            Some(Value::Bool(b)) => CellValue::Bool(*b),
            Some(Value::Number(n)) => CellValue::Number(n.clone()),
            Some(Value::String(s)) if s.trim().is_empty() => {
                CellValue::Text(NULL_SENTINEL.to_string())
            }
            Some(Value::String(s)) => CellValue::Text(s.clone()),
            Some(other) => CellValue::Text(other.to_string()),
        });
        Self { values }
    }

    pub fn get(&self, field: CnField) -> &CellValue {
        &self.values[field.column() - 3]
    }

    /// `(column, value)` pairs in column order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, &CellValue)> {
        CnField::ALL
            .iter()
            .zip(self.values.iter())
            .map(|(f, v)| (f.column(), v))
    }

    /// Number of fields the extractor actually found.
    pub fn found_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_null_sentinel()).count()
    }
}
