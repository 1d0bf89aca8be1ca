//! Column jobs: run one column's prompt over every row through a provider.
//!
//! A job walks the rows in document order. Before each row it re-reads the
//! column (by id) from the shared spreadsheet: a cleared `is_processing` flag
//! or a deleted column ends the job as `Cancelled`. A call already in flight
//! always completes and its result is written. Results go through
//! `Spreadsheet::update_cell`, so each written cell is one undo step.
//!
//! Rows are followed by `RowId`, not position. Rows deleted while the job
//! runs shift the grid under it; the result of a call lands in the row the
//! input came from, or is dropped when that row is gone.
//!
//! `BatchProcessor::abort` is the hard stop: it drops whatever the job is
//! awaiting (rate limiter, provider call, delay) and ends it as `Cancelled`.
//!
//! The spreadsheet lock is never held across an await point.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use promptgrid_config::settings::{Settings, StatusChannel};
use promptgrid_engine::{ColumnId, Document, DocumentError, RowId, SharedSpreadsheet};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::provider::{GenerationConfig, ProviderPort, SYSTEM_ROLE};
use crate::rate_limit::RateLimiter;

/// Guidance shown when a column is run without a prompt
pub const MISSING_PROMPT_MESSAGE: &str = "Please enter a prompt in the column header first.";

/// Shown when a job aborts on an unexpected failure
pub const JOB_FAILED_MESSAGE: &str = "An error occurred during processing. Please try again.";

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("column \"{0}\" has no prompt")]
    MissingPrompt(String),
    #[error("column \"{0}\" is already processing")]
    AlreadyRunning(String),
    #[error("job task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Failed,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Cancelled => "cancelled",
            JobOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub provider_calls: usize,
    pub rows_written: usize,
    pub rate_limit_waits: u32,
}

impl JobReport {
    fn new() -> Self {
        Self {
            outcome: JobOutcome::Completed,
            provider_calls: 0,
            rows_written: 0,
            rate_limit_waits: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOptions {
    pub generation: GenerationConfig,
    pub system_role: String,
    /// Pause after each processed row
    pub processing_delay: Duration,
    pub status_channel: StatusChannel,
}

impl JobOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            generation: GenerationConfig::from_settings(settings),
            system_role: SYSTEM_ROLE.to_string(),
            processing_delay: Duration::from_millis(settings.processing_delay_ms),
            status_channel: settings.status_channel,
        }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// What the loop saw when it looked at the next row
enum NextRow {
    /// Row id, its index when read, and the input text
    Input(RowId, usize, String),
    Skip,
    Done,
    Cancelled,
}

/// Position of a job in the grid
#[derive(Default)]
struct Cursor {
    /// Last row looked at, with the index it had then
    last: Option<(RowId, usize)>,
    seen: HashSet<RowId>,
}

impl Cursor {
    /// Index of the next row to look at, or `None` past the end
    fn advance(&mut self, doc: &Document) -> Option<(RowId, usize)> {
        let mut index = match &self.last {
            None => 0,
            Some((id, hint)) => doc.locate_row(id, *hint).map_or(0, |i| i + 1),
        };
        while let Some(id) = doc.row_id(index) {
            if !self.seen.contains(id) {
                self.seen.insert(id.clone());
                self.last = Some((id.clone(), index));
                return Some((id.clone(), index));
            }
            index += 1;
        }
        None
    }
}

#[derive(Clone)]
pub struct BatchProcessor {
    sheet: SharedSpreadsheet,
    provider: Arc<dyn ProviderPort>,
    limiter: Arc<RateLimiter>,
    options: JobOptions,
    /// Shared by every clone; once set, jobs stop without finishing their call
    abort: Arc<watch::Sender<bool>>,
}

impl BatchProcessor {
    pub fn new(
        sheet: SharedSpreadsheet,
        provider: Arc<dyn ProviderPort>,
        limiter: Arc<RateLimiter>,
        options: JobOptions,
    ) -> Self {
        Self {
            sheet,
            provider,
            limiter,
            options,
            abort: Arc::new(watch::channel(false).0),
        }
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn sheet(&self) -> &SharedSpreadsheet {
        &self.sheet
    }

    /// Run a column job to completion on the current task
    pub async fn run_column(&self, col: usize) -> Result<JobReport, JobError> {
        let (id, prompt) = self.start(col)?;
        log::info!(
            "Column job started on column {} with {}",
            col,
            self.provider.name()
        );

        let mut report = JobReport::new();
        let outcome = self.process_rows(&id, &prompt, &mut report).await;
        report.outcome = outcome;

        self.sheet.lock().set_processing(&id, false);
        log::info!(
            "Column job {}: {} call(s), {} cell(s) written, {} rate-limit wait(s)",
            report.outcome.as_str(),
            report.provider_calls,
            report.rows_written,
            report.rate_limit_waits
        );
        Ok(report)
    }

    /// Stop every job of this processor now. A call in flight is dropped and
    /// its row keeps its old value; rows already written stay written.
    pub fn abort(&self) {
        self.abort.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.abort.borrow()
    }

    async fn aborted(&self) {
        let mut rx = self.abort.subscribe();
        let closed = rx.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// `None` when the job was aborted first
    async fn unless_aborted<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            out = fut => Some(out),
            _ = self.aborted() => None,
        }
    }

    /// Run a column job as a background task
    pub fn spawn_column(&self, col: usize) -> JoinHandle<Result<JobReport, JobError>> {
        let processor = self.clone();
        tokio::spawn(async move { processor.run_column(col).await })
    }

    /// Check preconditions and enter `Running`
    fn start(&self, col: usize) -> Result<(ColumnId, String), JobError> {
        let mut sheet = self.sheet.lock();
        let cols = sheet.column_count();
        let column = sheet
            .document()
            .column(col)
            .ok_or(DocumentError::ColumnOutOfRange { col, cols })?;
        let id = column.id.clone();
        let name = column.name.clone();

        if column.is_processing {
            return Err(JobError::AlreadyRunning(name));
        }

        if !column.has_prompt() {
            drop(sheet);
            self.report_status(&id, MISSING_PROMPT_MESSAGE);
            return Err(JobError::MissingPrompt(name));
        }

        let prompt = column.prompt.clone();
        sheet.set_column_status(&id, None);
        sheet.set_processing(&id, true);
        Ok((id, prompt))
    }

    async fn process_rows(&self, id: &ColumnId, prompt: &str, report: &mut JobReport) -> JobOutcome {
        let mut cursor = Cursor::default();
        loop {
            let (row_id, row_index, input) = match self.next_row(id, &mut cursor) {
                NextRow::Input(row_id, index, input) => (row_id, index, input),
                NextRow::Skip => continue,
                NextRow::Done => return JobOutcome::Completed,
                NextRow::Cancelled => {
                    log::info!("Column job cancelled after {} cell(s)", report.rows_written);
                    return JobOutcome::Cancelled;
                }
            };

            let Some(acquired) = self.unless_aborted(self.limiter.acquire()).await else {
                return JobOutcome::Cancelled;
            };
            match acquired {
                Ok(waits) => report.rate_limit_waits += waits,
                Err(e) => {
                    self.fail(id, &e.to_string());
                    return JobOutcome::Failed;
                }
            }

            report.provider_calls += 1;
            let call = self
                .provider
                .generate(&self.options.system_role, prompt, &input, &self.options.generation);
            let Some(result) = self.unless_aborted(call).await else {
                log::info!("Column job aborted during the call for row {}", row_index);
                return JobOutcome::Cancelled;
            };
            let text = match result {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("{} failed on row {}: {}", self.provider.name(), row_index, e);
                    e.user_message()
                }
            };

            // Write back to wherever the column and the row are now
            let written = {
                let mut sheet = self.sheet.lock();
                let Some(col) = sheet.column_index(id) else {
                    return JobOutcome::Cancelled;
                };
                match sheet.document().locate_row(&row_id, row_index) {
                    Some(row) => sheet.update_cell(row, col, &text).map(|_| true),
                    None => Ok(false),
                }
            };
            match written {
                Ok(true) => report.rows_written += 1,
                Ok(false) => log::debug!("Row {} was deleted during its call; result dropped", row_index),
                Err(e) => {
                    self.fail(id, &format!("write-back to row {} failed: {}", row_index, e));
                    return JobOutcome::Failed;
                }
            }

            if !self.options.processing_delay.is_zero()
                && self
                    .unless_aborted(tokio::time::sleep(self.options.processing_delay))
                    .await
                    .is_none()
            {
                return JobOutcome::Cancelled;
            }
        }
    }

    fn next_row(&self, id: &ColumnId, cursor: &mut Cursor) -> NextRow {
        let sheet = self.sheet.lock();
        if self.is_aborted() || !sheet.is_processing(id) {
            return NextRow::Cancelled;
        }
        let Some(col) = sheet.column_index(id) else {
            return NextRow::Cancelled;
        };
        let doc = sheet.document();
        let Some((row_id, row)) = cursor.advance(doc) else {
            return NextRow::Done;
        };
        let value = doc.value(row, col);
        if value.trim().is_empty() {
            NextRow::Skip
        } else {
            NextRow::Input(row_id, row, value.to_string())
        }
    }

    /// Unexpected failure: log the detail, surface the generic message
    fn fail(&self, id: &ColumnId, detail: &str) {
        log::error!("Column job aborted: {}", detail);
        self.report_status(id, JOB_FAILED_MESSAGE);
    }

    fn report_status(&self, id: &ColumnId, message: &str) {
        let mut sheet = self.sheet.lock();
        match self.options.status_channel {
            StatusChannel::ColumnStatus => {
                sheet.set_column_status(id, Some(message.to_string()));
            }
            StatusChannel::FirstCell => {
                if let Some(col) = sheet.column_index(id) {
                    if let Err(e) = sheet.update_cell(0, col, message) {
                        log::error!("Could not write status to first cell: {}", e);
                    }
                }
            }
        }
    }
}

/// Ask a running column job to stop at the next row boundary. Returns false
/// if the column was not processing.
pub fn request_cancel(sheet: &SharedSpreadsheet, col: usize) -> bool {
    let mut sheet = sheet.lock();
    let Some(id) = sheet.document().column(col).map(|c| c.id.clone()) else {
        return false;
    };
    if !sheet.is_processing(&id) {
        return false;
    }
    sheet.set_processing(&id, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use promptgrid_engine::{Document, Spreadsheet, Table};

    use crate::provider::ProviderError;

    /// Echoes `out:<input>` and records every input it saw
    #[derive(Default)]
    struct Recorder {
        inputs: Mutex<Vec<String>>,
        fail_with: Option<ProviderError>,
    }

    #[async_trait]
    impl ProviderPort for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn generate(
            &self,
            _system_role: &str,
            _prompt: &str,
            input: &str,
            _config: &GenerationConfig,
        ) -> Result<String, ProviderError> {
            self.inputs.lock().push(input.to_string());
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(format!("out:{}", input)),
            }
        }
    }

    fn sheet_with(values: &[&str], prompt: &str) -> SharedSpreadsheet {
        let table = Table::new(
            vec!["Text".into()],
            values.iter().map(|v| vec![v.to_string()]).collect(),
        );
        let mut sheet = Spreadsheet::new(Document::from_table(&table).unwrap());
        sheet.set_prompt(0, prompt).unwrap();
        sheet.into_shared()
    }

    fn options(delay_ms: u64) -> JobOptions {
        JobOptions {
            processing_delay: Duration::from_millis(delay_ms),
            ..JobOptions::default()
        }
    }

    fn processor(
        sheet: &SharedSpreadsheet,
        provider: &Arc<Recorder>,
        limit: u32,
        options: JobOptions,
    ) -> BatchProcessor {
        BatchProcessor::new(
            sheet.clone(),
            provider.clone(),
            Arc::new(RateLimiter::per_minute(limit)),
            options,
        )
    }

    fn values(sheet: &SharedSpreadsheet) -> Vec<String> {
        values_of(&sheet.lock())
    }

    fn values_of(sheet: &Spreadsheet) -> Vec<String> {
        (0..sheet.row_count())
            .map(|r| sheet.document().value(r, 0).to_string())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_empty_cells() {
        let sheet = sheet_with(&["", "x", "  "], "Upper");
        let provider = Arc::new(Recorder::default());

        let report = processor(&sheet, &provider, 60, options(0))
            .run_column(0)
            .await
            .unwrap();

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.provider_calls, 1);
        assert_eq!(*provider.inputs.lock(), vec!["x".to_string()]);
        assert_eq!(values(&sheet), vec!["", "out:x", "  "]);
        assert!(!sheet.lock().columns()[0].is_processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_written_cell_is_undoable() {
        let sheet = sheet_with(&["a", "b"], "p");
        let provider = Arc::new(Recorder::default());
        processor(&sheet, &provider, 60, options(0)).run_column(0).await.unwrap();

        let mut s = sheet.lock();
        assert!(s.undo());
        assert_eq!(s.document().value(0, 0), "out:a");
        assert_eq!(s.document().value(1, 0), "b");
        assert!(s.undo());
        assert_eq!(s.document().value(0, 0), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_first_row() {
        let sheet = sheet_with(&["a", "b", "c"], "p");
        let provider = Arc::new(Recorder::default());
        let job = processor(&sheet, &provider, 60, options(1000)).spawn_column(0);

        // Row 0 is written, the job is in its inter-row delay
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(request_cancel(&sheet, 0));

        let report = job.await.unwrap().unwrap();
        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert_eq!(report.provider_calls, 1);
        assert_eq!(report.rows_written, 1);
        assert_eq!(values(&sheet), vec!["out:a", "b", "c"]);
        assert!(!request_cancel(&sheet, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_delay_between_rows() {
        let sheet = sheet_with(&["a", "b", "c"], "p");
        let provider = Arc::new(Recorder::default());
        let start = tokio::time::Instant::now();

        processor(&sheet, &provider, 60, options(1000)).run_column(0).await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_are_counted() {
        let sheet = sheet_with(&["a", "b", "c"], "p");
        let provider = Arc::new(Recorder::default());
        let start = tokio::time::Instant::now();

        let report = processor(&sheet, &provider, 2, options(0))
            .run_column(0)
            .await
            .unwrap();

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.provider_calls, 3);
        assert_eq!(report.rate_limit_waits, 1);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_written_into_cell() {
        let sheet = sheet_with(&["a", "b"], "p");
        let provider = Arc::new(Recorder {
            fail_with: Some(ProviderError::QuotaExceeded),
            ..Recorder::default()
        });

        let report = processor(&sheet, &provider, 60, options(0))
            .run_column(0)
            .await
            .unwrap();

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.provider_calls, 2);
        let message = ProviderError::QuotaExceeded.user_message();
        assert_eq!(values(&sheet), vec![message.clone(), message]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_prompt_uses_status_channel() {
        let sheet = sheet_with(&["a"], "   ");
        let provider = Arc::new(Recorder::default());

        let err = processor(&sheet, &provider, 60, options(0))
            .run_column(0)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::MissingPrompt(_)));

        let s = sheet.lock();
        assert_eq!(s.columns()[0].last_error.as_deref(), Some(MISSING_PROMPT_MESSAGE));
        assert!(!s.columns()[0].is_processing);
        assert_eq!(s.document().value(0, 0), "a");
        assert!(provider.inputs.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_prompt_first_cell_channel() {
        let sheet = sheet_with(&["a"], "");
        let provider = Arc::new(Recorder::default());
        let opts = JobOptions {
            status_channel: StatusChannel::FirstCell,
            ..options(0)
        };

        processor(&sheet, &provider, 60, opts).run_column(0).await.unwrap_err();

        assert_eq!(values(&sheet), vec![MISSING_PROMPT_MESSAGE.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_running() {
        let sheet = sheet_with(&["a"], "p");
        let id = sheet.lock().columns()[0].id.clone();
        sheet.lock().set_processing(&id, true);
        let provider = Arc::new(Recorder::default());

        let err = processor(&sheet, &provider, 60, options(0))
            .run_column(0)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::AlreadyRunning(_)));
        assert!(sheet.lock().is_processing(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_column() {
        let sheet = sheet_with(&["a"], "p");
        let provider = Arc::new(Recorder::default());
        let err = processor(&sheet, &provider, 60, options(0))
            .run_column(3)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Document(DocumentError::ColumnOutOfRange { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_column_cancels_job() {
        let table = Table::new(
            vec!["A".into(), "B".into()],
            vec![vec!["a".into(), "1".into()], vec!["b".into(), "2".into()]],
        );
        let mut s = Spreadsheet::from_table(&table).unwrap();
        s.set_prompt(0, "p").unwrap();
        let sheet = s.into_shared();
        let provider = Arc::new(Recorder::default());
        let job = processor(&sheet, &provider, 60, options(1000)).spawn_column(0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        sheet.lock().delete_column(0).unwrap();

        let report = job.await.unwrap().unwrap();
        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert_eq!(report.provider_calls, 1);
    }

    /// Deletes a row while the call for `trigger` is in flight
    struct RowDropper {
        sheet: SharedSpreadsheet,
        trigger: &'static str,
        /// Row to delete; `None` deletes the last row
        row: Option<usize>,
        inputs: Mutex<Vec<String>>,
    }

    impl RowDropper {
        fn new(sheet: &SharedSpreadsheet, trigger: &'static str, row: Option<usize>) -> Self {
            Self {
                sheet: sheet.clone(),
                trigger,
                row,
                inputs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProviderPort for RowDropper {
        fn name(&self) -> &str {
            "row-dropper"
        }

        async fn generate(
            &self,
            _system_role: &str,
            _prompt: &str,
            input: &str,
            _config: &GenerationConfig,
        ) -> Result<String, ProviderError> {
            self.inputs.lock().push(input.to_string());
            if input == self.trigger {
                let mut sheet = self.sheet.lock();
                let row = self.row.unwrap_or(sheet.row_count() - 1);
                sheet.delete_row(row).unwrap();
            }
            Ok(format!("out:{}", input))
        }
    }

    fn dropper_job(sheet: &SharedSpreadsheet, provider: &Arc<RowDropper>) -> BatchProcessor {
        BatchProcessor::new(
            sheet.clone(),
            provider.clone(),
            Arc::new(RateLimiter::per_minute(60)),
            options(0),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_for_deleted_row_is_dropped() {
        let sheet = sheet_with(&["a", "b"], "p");
        let id = sheet.lock().columns()[0].id.clone();
        // "b" is the last row: it deletes itself mid-call
        let provider = Arc::new(RowDropper::new(&sheet, "b", None));

        let report = dropper_job(&sheet, &provider).run_column(0).await.unwrap();

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.provider_calls, 2);
        assert_eq!(report.rows_written, 1);
        let s = sheet.lock();
        assert!(s.columns()[0].last_error.is_none());
        assert!(!s.is_processing(&id));
        assert_eq!(values_of(&s), vec!["out:a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_row_deleted_above_in_flight_call() {
        let sheet = sheet_with(&["a", "b", "c", "d"], "p");
        // While "b" is being generated, row 0 ("out:a") goes away
        let provider = Arc::new(RowDropper::new(&sheet, "b", Some(0)));

        let report = dropper_job(&sheet, &provider).run_column(0).await.unwrap();

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.provider_calls, 4);
        assert_eq!(report.rows_written, 4);
        assert_eq!(*provider.inputs.lock(), vec!["a", "b", "c", "d"]);
        assert_eq!(values(&sheet), vec!["out:b", "out:c", "out:d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_row_deleted_resumes_at_next_row() {
        let sheet = sheet_with(&["a", "b", "c"], "p");
        let provider = Arc::new(RowDropper::new(&sheet, "b", Some(1)));

        let report = dropper_job(&sheet, &provider).run_column(0).await.unwrap();

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.provider_calls, 3);
        assert_eq!(report.rows_written, 2);
        assert_eq!(values(&sheet), vec!["out:a", "out:c"]);
    }

    /// Stops its own column from inside the call, like a user pressing stop
    /// while a request is in flight
    struct StopsMidCall {
        sheet: SharedSpreadsheet,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ProviderPort for StopsMidCall {
        fn name(&self) -> &str {
            "stops-mid-call"
        }

        async fn generate(
            &self,
            _system_role: &str,
            _prompt: &str,
            input: &str,
            _config: &GenerationConfig,
        ) -> Result<String, ProviderError> {
            *self.calls.lock() += 1;
            assert!(request_cancel(&self.sheet, 0));
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(format!("out:{}", input))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_call_keeps_its_result() {
        let sheet = sheet_with(&["a", "b", "c"], "p");
        let provider = Arc::new(StopsMidCall {
            sheet: sheet.clone(),
            calls: Mutex::new(0),
        });
        let job = BatchProcessor::new(
            sheet.clone(),
            provider.clone(),
            Arc::new(RateLimiter::per_minute(60)),
            options(0),
        );

        let report = job.run_column(0).await.unwrap();

        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert_eq!(report.provider_calls, 1);
        assert_eq!(report.rows_written, 1);
        assert_eq!(*provider.calls.lock(), 1);
        assert_eq!(values(&sheet), vec!["out:a", "b", "c"]);
        assert!(!sheet.lock().columns()[0].is_processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_row_deleted_between_rows_shortens_job() {
        let sheet = sheet_with(&["a", "b"], "p");
        let provider = Arc::new(Recorder::default());
        let job = processor(&sheet, &provider, 60, options(1000)).spawn_column(0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        sheet.lock().delete_row(1).unwrap();

        let report = job.await.unwrap().unwrap();
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.rows_written, 1);
        assert!(sheet.lock().columns()[0].last_error.is_none());
    }

    /// Answers after a minute
    struct Slow;

    #[async_trait]
    impl ProviderPort for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(
            &self,
            _system_role: &str,
            _prompt: &str,
            input: &str,
            _config: &GenerationConfig,
        ) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(format!("out:{}", input))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_drops_call_in_flight() {
        let sheet = sheet_with(&["a", "b"], "p");
        let processor = BatchProcessor::new(
            sheet.clone(),
            Arc::new(Slow),
            Arc::new(RateLimiter::per_minute(60)),
            options(0),
        );
        let start = tokio::time::Instant::now();
        let job = processor.spawn_column(0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        processor.abort();
        let report = job.await.unwrap().unwrap();

        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert_eq!(report.provider_calls, 1);
        assert_eq!(report.rows_written, 0);
        assert_eq!(values(&sheet), vec!["a", "b"]);
        assert!(!sheet.lock().columns()[0].is_processing);

        // Later jobs from the same processor stop before any call
        let again = processor.run_column(0).await.unwrap();
        assert_eq!(again.outcome, JobOutcome::Cancelled);
        assert_eq!(again.provider_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_jobs_share_the_limiter() {
        let table = Table::new(
            vec!["A".into(), "B".into()],
            vec![vec!["a".into(), "1".into()], vec!["b".into(), "2".into()]],
        );
        let mut s = Spreadsheet::from_table(&table).unwrap();
        s.set_prompt(0, "p").unwrap();
        s.set_prompt(1, "q").unwrap();
        let sheet = s.into_shared();
        let provider = Arc::new(Recorder::default());
        let limiter = Arc::new(RateLimiter::per_minute(2));

        let first = BatchProcessor::new(sheet.clone(), provider.clone(), limiter.clone(), options(0));
        let second = BatchProcessor::new(sheet.clone(), provider.clone(), limiter.clone(), options(0));

        let (a, b) = tokio::join!(first.run_column(0), second.run_column(1));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.provider_calls + b.provider_calls, 4);
        assert!(a.rate_limit_waits + b.rate_limit_waits >= 1);

        let s = sheet.lock();
        assert_eq!(s.document().value(1, 0), "out:b");
        assert_eq!(s.document().value(1, 1), "out:2");
        // Four writes, four commits on one linear history
        assert_eq!(s.history().len(), 1 + 2 + 4);
    }
}
