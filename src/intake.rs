//! Intake: turn attachment requests into pending rows.
//!
//! The store carries three sheets besides the row sheet:
//!
//! | Sheet        | Used for                                                  |
//! |--------------|-----------------------------------------------------------|
//! | `OPC`        | one request per row; fund-house id in column 5            |
//! | `TIPS`       | credentials per fund house (see [`CredentialTable`])      |
//! | `Parameters` | confirmation sender in `D2`, `DOWNLOAD_FOLDER` key/value  |
//!
//! For each request the fund house's search term and sender go to an
//! [`AttachmentSource`], which saves matching attachments under the download
//! folder and reports their store-relative paths. Each path becomes a new row
//! with the fund house's passwords staged. How the source finds mail is not
//! this crate's concern.

use crate::credentials::{stage_secrets, CredentialTable};
use crate::error::PipelineError;
use crate::store::RowStore;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

pub const REQUEST_SHEET: &str = "OPC";
pub const CREDENTIAL_SHEET: &str = "TIPS";
pub const PARAMETER_SHEET: &str = "Parameters";

/// Download folder used when `Parameters` has no `DOWNLOAD_FOLDER` row.
pub const DEFAULT_DOWNLOAD_FOLDER: &str = "downloads";

const COL_REQUEST_FH: usize = 5;

/// What to look for and where to save it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentQuery {
    /// Sender address the message must come from.
    pub sender: String,
    /// Text the message subject must contain.
    pub search_term: String,
    pub fund_house_id: String,
    /// Folder for saved attachments, relative to the store directory.
    pub download_folder: String,
    /// The same folder as an absolute path; created before the first query.
    pub download_dir: PathBuf,
}

/// Finds and saves document attachments.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// Save every matching PDF attachment and return its path relative to
    /// the store directory (`<download_folder>/<file name>`).
    async fn find_attachments(&self, query: &AttachmentQuery) -> Result<Vec<String>, String>;
}

/// Counters for one intake pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    /// Requests with a fund-house id.
    pub requests: usize,
    /// Requests skipped for lack of credentials or search term.
    pub skipped: usize,
    /// Requests whose source call failed.
    pub source_failures: usize,
    /// New rows appended to the row sheet.
    pub rows_added: usize,
}

/// Append one pending row per attachment found for each request.
///
/// The store is persisted once at the end.
///
/// # Errors
/// - [`PipelineError::SheetMissing`] when `OPC`, `TIPS` or `Parameters` is absent
/// - [`PipelineError::ParameterMissing`] when `Parameters!D2` is empty
pub async fn run_intake(
    store: &mut RowStore,
    source: &dyn AttachmentSource,
) -> Result<IntakeSummary, PipelineError> {
    let workbook = store.workbook();
    let sheet = |name: &str| {
        workbook
            .sheet(name)
            .ok_or_else(|| PipelineError::SheetMissing {
                path: store.path().to_path_buf(),
                name: name.to_string(),
            })
    };
    let requests_sheet = sheet(REQUEST_SHEET)?;
    let params = sheet(PARAMETER_SHEET)?;
    let credentials = CredentialTable::from_sheet(sheet(CREDENTIAL_SHEET)?);

    let sender = params
        .cell(2, 4)
        .as_text()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| PipelineError::ParameterMissing {
            sheet: PARAMETER_SHEET.to_string(),
            name: "D2 (confirmation sender)".to_string(),
        })?;

    let download_folder = (1..=params.max_row())
        .find(|&r| params.cell(r, 1).as_text().as_deref() == Some("DOWNLOAD_FOLDER"))
        .and_then(|r| params.cell(r, 2).as_text())
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_FOLDER.to_string());

    let fund_house_ids: Vec<String> = (2..=requests_sheet.max_row())
        .filter_map(|r| requests_sheet.cell(r, COL_REQUEST_FH).as_text())
        .map(|id| id.trim().to_string())
        .collect();

    let download_dir = store.resolve_path(&download_folder);
    std::fs::create_dir_all(&download_dir).map_err(|e| {
        PipelineError::Internal(format!(
            "cannot create download folder {}: {e}",
            download_dir.display()
        ))
    })?;

    info!(
        "Intake: {} requests, sender {}, download folder {}",
        fund_house_ids.len(),
        sender,
        download_folder
    );

    let mut summary = IntakeSummary {
        requests: fund_house_ids.len(),
        ..Default::default()
    };

    for fh_id in fund_house_ids {
        let Some(creds) = credentials
            .lookup(&fh_id)
            .filter(|c| !c.search_term.is_empty())
        else {
            warn!("No credential entry with a search term for fund house {}", fh_id);
            summary.skipped += 1;
            continue;
        };

        let query = AttachmentQuery {
            sender: sender.clone(),
            search_term: creds.search_term.clone(),
            fund_house_id: fh_id.clone(),
            download_folder: download_folder.clone(),
            download_dir: download_dir.clone(),
        };

        let paths = match source.find_attachments(&query).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Attachment search failed for fund house {}: {}", fh_id, e);
                summary.source_failures += 1;
                continue;
            }
        };

        for path in paths {
            let (id, row) = store.append_row(&path);
            if let Err(e) = stage_secrets(store, row, &creds.secrets) {
                warn!("Row {}: {}", row, e);
            }
            summary.rows_added += 1;
            info!(
                "Logged {} ({}) as row {} (id {})",
                path, creds.fund_house, row, id
            );
        }
    }

    store.persist()?;
    Ok(summary)
}
