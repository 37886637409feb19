//! Row-processor integration tests.
//!
//! Every test drives the real `RowProcessor` over a JSON store in a temp
//! directory. The document engine, text recogniser and field extractor are
//! in-process fakes, so neither pdfium nor a model server is needed.

use async_trait::async_trait;
use cn_extract::store::CN_DATABASE_HEADER;
use cn_extract::{
    CellValue, Document, DocumentEngine, ExtractionError, FieldExtractor, FieldMap, OpenError,
    PageImage, PipelineConfig, ProgressCallback, RowProcessor, RowProgressCallback, RowStatus,
    RowStore, TextRecognizer,
};
use image::DynamicImage;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────

/// A PDF the fake engine knows about.
#[derive(Clone)]
struct FakePdf {
    /// `None` = unencrypted.
    password: Option<&'static str>,
    pages: usize,
}

/// Opens `FakePdf`s by file name and logs every open attempt.
struct FakeEngine {
    docs: HashMap<String, FakePdf>,
    attempts: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

struct FakeDocument {
    pages: usize,
}

impl Document for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    /// Page `i` renders `(i + 1) × 1` px, so the recogniser can tell pages apart.
    fn render_page(&self, index: usize, _scale: f32) -> Result<DynamicImage, String> {
        Ok(DynamicImage::new_rgb8(index as u32 + 1, 1))
    }
}

impl DocumentEngine for FakeEngine {
    fn open<'a>(
        &'a self,
        path: &Path,
        password: Option<&'a str>,
    ) -> Result<Box<dyn Document + 'a>, OpenError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.attempts
            .lock()
            .unwrap()
            .push((name.clone(), password.map(str::to_string)));

        let pdf = self
            .docs
            .get(&name)
            .ok_or_else(|| OpenError::Unreadable(format!("unknown document {name}")))?;
        match (pdf.password, password) {
            (None, _) => Ok(Box::new(FakeDocument { pages: pdf.pages })),
            (Some(want), Some(got)) if want == got => {
                Ok(Box::new(FakeDocument { pages: pdf.pages }))
            }
            _ => Err(OpenError::PasswordRejected),
        }
    }
}

/// Reads page `n` as the text "page n".
struct PageEcho;

#[async_trait]
impl TextRecognizer for PageEcho {
    async fn recognize_page(&self, page: &PageImage) -> Result<String, ExtractionError> {
        Ok(format!("page {}", page.width))
    }
}

/// Returns a fixed reply and records the text it was given.
struct ScriptedExtractor {
    reply: Result<FieldMap, ExtractionError>,
    seen: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

#[async_trait]
impl FieldExtractor for ScriptedExtractor {
    async fn extract(&self, text: &str, schema: &[&str]) -> Result<FieldMap, ExtractionError> {
        assert_eq!(schema.len(), 12);
        self.seen.lock().unwrap().push(text.to_string());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.reply.clone()
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

fn full_reply() -> FieldMap {
    serde_json::from_value(json!({
        "is_cn": "Yes",
        "operation_type": "Subscription",
        "is_multiseries": false,
        "currency": "USD",
        "gross_amount": 10000.0,
        "net_amount": 9950.25,
        "units": 81.4432,
        "equalization": 0,
        "fees": 49.75,
        "nav_price": 122.17,
        "nav_date": "2024-03-28",
        "settlement_date": "2024-04-02"
    }))
    .unwrap()
}

/// One CN Database row with id, path and three secret slots.
fn row(id: Value, path: &str, secrets: [&str; 3]) -> Value {
    let mut cells = vec![Value::Null; 18];
    cells[0] = id;
    cells[1] = if path.is_empty() {
        Value::Null
    } else {
        json!(path)
    };
    for (i, s) in secrets.iter().enumerate() {
        if !s.is_empty() {
            cells[15 + i] = json!(s);
        }
    }
    Value::Array(cells)
}

struct Harness {
    dir: TempDir,
    docs: HashMap<String, FakePdf>,
    attempts: Arc<Mutex<Vec<(String, Option<String>)>>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    /// A store holding `rows` under the standard header, plus `%PDF` stubs for `docs`.
    fn new(rows: Vec<Value>, docs: &[(&str, FakePdf)]) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("cn_extract=debug")
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let mut all = vec![json!(CN_DATABASE_HEADER)];
        all.extend(rows);
        let book = json!({ "sheets": [ { "name": "CN Database", "rows": all } ] });
        std::fs::write(
            dir.path().join("book.json"),
            serde_json::to_vec_pretty(&book).unwrap(),
        )
        .unwrap();

        for (name, _) in docs {
            std::fs::write(dir.path().join(name), b"%PDF-1.7\n%fake\n").unwrap();
        }

        Self {
            dir,
            docs: docs
                .iter()
                .map(|(n, p)| (n.to_string(), p.clone()))
                .collect(),
            attempts: Arc::default(),
            seen: Arc::default(),
        }
    }

    fn store_path(&self) -> PathBuf {
        self.dir.path().join("book.json")
    }

    fn open(&self) -> RowStore {
        RowStore::open(self.store_path(), "CN Database").unwrap()
    }

    fn processor(
        &self,
        reply: Result<FieldMap, ExtractionError>,
        config: PipelineConfig,
    ) -> RowProcessor {
        self.processor_with_delay(reply, config, None)
    }

    fn processor_with_delay(
        &self,
        reply: Result<FieldMap, ExtractionError>,
        config: PipelineConfig,
        delay: Option<Duration>,
    ) -> RowProcessor {
        let engine = FakeEngine {
            docs: self.docs.clone(),
            attempts: Arc::clone(&self.attempts),
        };
        let extractor = ScriptedExtractor {
            reply,
            seen: Arc::clone(&self.seen),
            delay,
        };
        RowProcessor::new(
            Box::new(engine),
            Arc::new(PageEcho),
            Arc::new(extractor),
            config,
        )
    }

    fn secrets_on_disk(&self, row: usize) -> Vec<CellValue> {
        let store = self.open();
        [16, 17, 18]
            .iter()
            .map(|&c| store.cell(row, c).clone())
            .collect()
    }
}

fn encrypted(password: &'static str, pages: usize) -> FakePdf {
    FakePdf {
        password: Some(password),
        pages,
    }
}

fn plain(pages: usize) -> FakePdf {
    FakePdf {
        password: None,
        pages,
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_candidate_unlocks_and_secrets_are_cleared() {
    let h = Harness::new(
        vec![row(json!(1), "inv1.pdf", ["", "secretB", ""])],
        &[("inv1.pdf", encrypted("secretB", 2))],
    );
    let mut store = h.open();
    let summary = h
        .processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.is_success());

    let attempts = h.attempts.lock().unwrap().clone();
    assert_eq!(
        attempts,
        vec![
            ("inv1.pdf".to_string(), None),
            ("inv1.pdf".to_string(), Some("secretB".to_string())),
        ]
    );

    let on_disk = h.open();
    let rec = on_disk.record(2);
    assert_eq!(rec.status, RowStatus::Completed);
    assert_eq!(on_disk.cell(2, 3), &CellValue::from("Yes"));
    assert_eq!(on_disk.cell(2, 5), &CellValue::Bool(false));
    assert_eq!(on_disk.cell(2, 6), &CellValue::from("USD"));
    assert_eq!(on_disk.cell(2, 14), &CellValue::from("2024-04-02"));
    assert!(h.secrets_on_disk(2).iter().all(CellValue::is_empty));
}

#[tokio::test]
async fn missing_file_marks_row_and_keeps_secrets() {
    let h = Harness::new(vec![row(json!(1), "missing.pdf", ["s1", "", "s3"])], &[]);
    let mut store = h.open();
    let summary = h
        .processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed, 1);
    assert!(!summary.is_success());

    let on_disk = h.open();
    let marker = on_disk.cell(2, 3).to_string();
    assert!(marker.starts_with("ERROR: "), "got: {marker}");
    assert!(marker.contains("not found"), "got: {marker}");
    assert!(marker.ends_with("missing.pdf"), "got: {marker}");
    assert!((4..=14).all(|c| on_disk.cell(2, c).is_empty()));
    assert_eq!(
        h.secrets_on_disk(2),
        vec![CellValue::from("s1"), CellValue::Empty, CellValue::from("s3")]
    );
    assert!(h.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn null_field_is_written_as_sentinel() {
    let h = Harness::new(
        vec![row(json!(1), "plain.pdf", ["", "", ""])],
        &[("plain.pdf", plain(1))],
    );
    let mut reply = full_reply();
    reply.insert("currency".into(), Value::Null);
    reply.remove("fees");

    let mut store = h.open();
    h.processor(Ok(reply), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    let on_disk = h.open();
    assert_eq!(on_disk.cell(2, 6), &CellValue::from("null"));
    assert_eq!(on_disk.cell(2, 11), &CellValue::from("null"));
    assert_eq!(on_disk.cell(2, 4), &CellValue::from("Subscription"));
    assert_eq!(on_disk.cell(2, 8).to_string(), "9950.25");
    assert_eq!(on_disk.record(2).status, RowStatus::Completed);
}

#[tokio::test]
async fn empty_file_path_is_skipped_and_not_counted() {
    let h = Harness::new(
        vec![
            row(json!(1), "", ["s1", "", ""]),
            row(json!(2), "   ", ["", "", ""]),
            row(json!(3), "a.pdf", ["", "", ""]),
        ],
        &[("a.pdf", plain(1))],
    );
    let mut store = h.open();
    let summary = h
        .processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(summary.total_rows, 3);
    assert_eq!(summary.skipped_empty, 2);
    assert_eq!(summary.processed, 1);

    let on_disk = h.open();
    assert!((3..=14).all(|c| on_disk.cell(2, c).is_empty()));
    assert_eq!(on_disk.cell(2, 16), &CellValue::from("s1"));
}

#[tokio::test]
async fn wrong_secrets_mark_password_protected() {
    let h = Harness::new(
        vec![row(json!(1), "locked.pdf", ["w1", "w2", "w3"])],
        &[("locked.pdf", encrypted("right", 1))],
    );
    let mut store = h.open();
    let summary = h
        .processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(h.attempts.lock().unwrap().len(), 4);

    let on_disk = h.open();
    assert_eq!(on_disk.cell(2, 3), &CellValue::from("ERROR: Password protected"));
    assert_eq!(
        h.secrets_on_disk(2),
        vec![
            CellValue::from("w1"),
            CellValue::from("w2"),
            CellValue::from("w3")
        ]
    );
}

#[tokio::test]
async fn pages_reach_extractor_in_order() {
    let h = Harness::new(
        vec![row(json!(1), "three.pdf", ["", "", ""])],
        &[("three.pdf", plain(3))],
    );
    let mut store = h.open();
    h.processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(
        *h.seen.lock().unwrap(),
        vec!["page 1\npage 2\npage 3".to_string()]
    );
}

#[tokio::test]
async fn zero_page_document_still_reaches_extractor() {
    let h = Harness::new(
        vec![row(json!(1), "empty.pdf", ["", "", ""])],
        &[("empty.pdf", plain(0))],
    );
    let mut store = h.open();
    let summary = h
        .processor(Ok(FieldMap::new()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(*h.seen.lock().unwrap(), vec![String::new()]);
    let on_disk = h.open();
    assert!((3..=14).all(|c| on_disk.cell(2, c) == &CellValue::from("null")));
}

#[tokio::test]
async fn rows_run_in_ascending_id_order() {
    let h = Harness::new(
        vec![
            row(json!(3), "c.pdf", ["", "", ""]),
            row(json!(1), "a.pdf", ["", "", ""]),
            row(json!(2), "b.pdf", ["", "", ""]),
        ],
        &[("a.pdf", plain(1)), ("b.pdf", plain(1)), ("c.pdf", plain(1))],
    );
    let mut store = h.open();
    h.processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    let order: Vec<String> = h
        .attempts
        .lock()
        .unwrap()
        .iter()
        .map(|(name, _)| name.clone())
        .collect();
    assert_eq!(order, vec!["a.pdf", "b.pdf", "c.pdf"]);
}

#[tokio::test]
async fn second_run_over_terminal_rows_changes_nothing() {
    let h = Harness::new(
        vec![
            row(json!(1), "ok.pdf", ["pw", "", ""]),
            row(json!(2), "gone.pdf", ["x", "", ""]),
        ],
        &[("ok.pdf", encrypted("pw", 1))],
    );

    let mut store = h.open();
    let first = h
        .processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();
    assert_eq!((first.processed, first.failed), (1, 1));
    let after_first = std::fs::read(h.store_path()).unwrap();
    let modified = std::fs::metadata(h.store_path()).unwrap().modified().unwrap();

    // A different reply would show up if the completed row were re-extracted.
    let mut other = full_reply();
    other.insert("currency".into(), json!("EUR"));

    let mut store = h.open();
    let second = h
        .processor(Ok(other), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped_completed, 1);
    assert_eq!(second.failed, 1);
    assert!(!store.is_dirty());
    assert_eq!(std::fs::read(h.store_path()).unwrap(), after_first);
    assert_eq!(
        std::fs::metadata(h.store_path()).unwrap().modified().unwrap(),
        modified
    );
    assert_eq!(h.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reprocess_reextracts_completed_rows() {
    let h = Harness::new(
        vec![row(json!(1), "ok.pdf", ["", "", ""])],
        &[("ok.pdf", plain(1))],
    );
    let mut store = h.open();
    h.processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    let mut other = full_reply();
    other.insert("currency".into(), json!("EUR"));
    let config = PipelineConfig::builder()
        .reprocess_completed(true)
        .build()
        .unwrap();

    let mut store = h.open();
    let summary = h.processor(Ok(other), config).run(&mut store).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(h.open().cell(2, 6), &CellValue::from("EUR"));
}

#[tokio::test]
async fn failed_reprocess_keeps_earlier_fields() {
    let h = Harness::new(
        vec![row(json!(1), "locked.pdf", ["pw", "", ""])],
        &[("locked.pdf", encrypted("pw", 1))],
    );
    let mut store = h.open();
    let first = h
        .processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();
    assert_eq!(first.processed, 1);
    assert!(h.secrets_on_disk(2).iter().all(CellValue::is_empty));
    let after_first = std::fs::read(h.store_path()).unwrap();

    // Secrets are gone, so the encrypted document can no longer be opened.
    let mut other = full_reply();
    other.insert("currency".into(), json!("EUR"));
    let config = PipelineConfig::builder()
        .reprocess_completed(true)
        .build()
        .unwrap();
    let mut store = h.open();
    let second = h.processor(Ok(other), config).run(&mut store).await.unwrap();

    assert_eq!(second.processed, 0);
    assert_eq!(second.failed, 1);
    assert!(!store.is_dirty());
    assert_eq!(std::fs::read(h.store_path()).unwrap(), after_first);

    let on_disk = h.open();
    assert_eq!(on_disk.record(2).status, RowStatus::Completed);
    assert_eq!(on_disk.cell(2, 3), &CellValue::from("Yes"));
    assert_eq!(on_disk.cell(2, 6), &CellValue::from("USD"));
    assert_eq!(on_disk.cell(2, 14), &CellValue::from("2024-04-02"));
    assert_eq!(h.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn blank_values_keep_row_completed_across_runs() {
    let h = Harness::new(
        vec![row(json!(1), "locked.pdf", ["pw", "", ""])],
        &[("locked.pdf", encrypted("pw", 1))],
    );
    let mut reply = full_reply();
    reply.insert("fees".into(), json!(" "));
    reply.insert("nav_date".into(), json!(""));

    let mut store = h.open();
    let first = h
        .processor(Ok(reply.clone()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();
    assert_eq!(first.processed, 1);

    let on_disk = h.open();
    assert_eq!(on_disk.record(2).status, RowStatus::Completed);
    assert_eq!(on_disk.cell(2, 11), &CellValue::from("null"));
    assert_eq!(on_disk.cell(2, 13), &CellValue::from("null"));
    let after_first = std::fs::read(h.store_path()).unwrap();

    let mut store = h.open();
    let second = h
        .processor(Ok(reply), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(second.skipped_completed, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(std::fs::read(h.store_path()).unwrap(), after_first);
    let on_disk = h.open();
    assert_eq!(on_disk.cell(2, 3), &CellValue::from("Yes"));
    assert_eq!(on_disk.cell(2, 6), &CellValue::from("USD"));
}

#[tokio::test]
async fn failed_row_is_retried_and_recovers() {
    let h = Harness::new(
        vec![row(json!(1), "late.pdf", ["", "", ""])],
        &[("late.pdf", plain(1))],
    );
    // First pass: the document has not been fetched yet.
    std::fs::remove_file(h.dir.path().join("late.pdf")).unwrap();
    let mut store = h.open();
    h.processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();
    assert!(matches!(h.open().record(2).status, RowStatus::Failed { .. }));

    std::fs::write(h.dir.path().join("late.pdf"), b"%PDF-1.4\n").unwrap();
    let mut store = h.open();
    let summary = h
        .processor(Ok(full_reply()), PipelineConfig::default())
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    let on_disk = h.open();
    assert_eq!(on_disk.record(2).status, RowStatus::Completed);
    assert_eq!(on_disk.cell(2, 3), &CellValue::from("Yes"));
}

#[tokio::test]
async fn extraction_failure_is_isolated_to_its_row() {
    let h = Harness::new(
        vec![
            row(json!(1), "a.pdf", ["pa", "", ""]),
            row(json!(2), "b.pdf", ["", "", ""]),
        ],
        &[("a.pdf", encrypted("pa", 1)), ("b.pdf", plain(1))],
    );
    let mut store = h.open();
    let summary = h
        .processor(
            Err(ExtractionError::UnparseableResponse("no json".into())),
            PipelineConfig::default(),
        )
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(summary.failed, 2);
    let on_disk = h.open();
    let marker = on_disk.cell(2, 3).to_string();
    assert!(marker.starts_with("ERROR: Could not parse"), "got: {marker}");
    // Secrets are only cleared on success.
    assert_eq!(on_disk.cell(2, 16), &CellValue::from("pa"));
    assert!(matches!(on_disk.record(3).status, RowStatus::Failed { .. }));
}

#[tokio::test(start_paused = true)]
async fn slow_extractor_times_out() {
    let h = Harness::new(
        vec![row(json!(1), "slow.pdf", ["", "", ""])],
        &[("slow.pdf", plain(1))],
    );
    let config = PipelineConfig::builder()
        .capability_timeout_secs(5)
        .build()
        .unwrap();
    let mut store = h.open();
    let summary = h
        .processor_with_delay(Ok(full_reply()), config, Some(Duration::from_secs(600)))
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(
        h.open().cell(2, 3),
        &CellValue::from("ERROR: Field extraction timed out after 5s")
    );
}

/// Reads row 2's currency from disk whenever it is asked to extract.
struct DiskProbe {
    store_path: PathBuf,
    observed: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl FieldExtractor for DiskProbe {
    async fn extract(&self, _text: &str, _schema: &[&str]) -> Result<FieldMap, ExtractionError> {
        let raw = std::fs::read_to_string(&self.store_path).unwrap();
        let book: Value = serde_json::from_str(&raw).unwrap();
        let cell = book["sheets"][0]["rows"][1]
            .get(5)
            .cloned()
            .unwrap_or(Value::Null);
        self.observed.lock().unwrap().push(cell);
        Ok(full_reply())
    }
}

async fn observe_with(persist_every: usize) -> Vec<Value> {
    let h = Harness::new(
        vec![
            row(json!(1), "a.pdf", ["", "", ""]),
            row(json!(2), "b.pdf", ["", "", ""]),
        ],
        &[("a.pdf", plain(1)), ("b.pdf", plain(1))],
    );
    let observed = Arc::new(Mutex::new(Vec::new()));
    let probe = DiskProbe {
        store_path: h.store_path(),
        observed: Arc::clone(&observed),
    };
    let engine = FakeEngine {
        docs: h.docs.clone(),
        attempts: Arc::clone(&h.attempts),
    };
    let config = PipelineConfig::builder()
        .persist_every(persist_every)
        .build()
        .unwrap();
    let processor = RowProcessor::new(Box::new(engine), Arc::new(PageEcho), Arc::new(probe), config);

    let mut store = h.open();
    processor.run(&mut store).await.unwrap();
    assert_eq!(h.open().cell(3, 6), &CellValue::from("USD"));

    let result = observed.lock().unwrap().clone();
    result
}

#[tokio::test]
async fn persist_every_row_bounds_loss() {
    let seen = observe_with(1).await;
    // While row 3 is extracted, row 2's result is already on disk.
    assert_eq!(seen, vec![Value::Null, json!("USD")]);
}

#[tokio::test]
async fn persist_at_end_only() {
    let seen = observe_with(0).await;
    assert_eq!(seen, vec![Value::Null, Value::Null]);
}

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    errored: AtomicUsize,
    skipped: AtomicUsize,
    stages: Mutex<Vec<String>>,
    totals: Mutex<Option<(usize, usize)>>,
}

impl RowProgressCallback for Counting {
    fn on_row_start(&self, _row_id: Option<u64>, _file_name: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_row_stage(&self, _row_id: Option<u64>, stage: &str) {
        self.stages.lock().unwrap().push(stage.to_string());
    }
    fn on_row_complete(&self, _row_id: Option<u64>, fields_found: usize) {
        assert_eq!(fields_found, 12);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_row_error(&self, _row_id: Option<u64>, marker: &str) {
        assert!(marker.starts_with("ERROR: "));
        self.errored.fetch_add(1, Ordering::SeqCst);
    }
    fn on_row_skipped(&self, _row_id: Option<u64>, _reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }
    fn on_run_complete(&self, processed: usize, failed: usize) {
        *self.totals.lock().unwrap() = Some((processed, failed));
    }
}

#[tokio::test]
async fn progress_events_follow_rows() {
    let h = Harness::new(
        vec![
            row(json!(1), "a.pdf", ["", "", ""]),
            row(json!(2), "missing.pdf", ["", "", ""]),
            row(json!(3), "", ["", "", ""]),
        ],
        &[("a.pdf", plain(1))],
    );
    let counting = Arc::new(Counting::default());
    let config = PipelineConfig::builder()
        .progress_callback(Arc::clone(&counting) as ProgressCallback)
        .build()
        .unwrap();

    let mut store = h.open();
    h.processor(Ok(full_reply()), config)
        .run(&mut store)
        .await
        .unwrap();

    assert_eq!(counting.started.load(Ordering::SeqCst), 2);
    assert_eq!(counting.completed.load(Ordering::SeqCst), 1);
    assert_eq!(counting.errored.load(Ordering::SeqCst), 1);
    assert_eq!(counting.skipped.load(Ordering::SeqCst), 1);
    assert_eq!(*counting.totals.lock().unwrap(), Some((1, 1)));
    assert_eq!(
        *counting.stages.lock().unwrap(),
        vec!["decrypting", "recognising text", "extracting fields"]
    );
}
