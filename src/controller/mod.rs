// src/controller/mod.rs
//!
//! The main side of a compile session.
//!
//! The controller owns the editable source, the uploaded style resources, the
//! log panel and the rendered output. It dispatches one compile job at a time
//! to the background worker and applies the worker's events, trusting only
//! events whose id matches the job it is waiting for.
//!
//! A superseded job is never interrupted. `cancel` only stops listening to
//! it; its engine run completes in the worker and its events are dropped.

mod log_panel;
mod output;
mod styles;
mod view;

pub use log_panel::{DEFAULT_LOG_LIMIT, LogPanel, RUN_MARKER};
pub use output::{OutputRef, OutputRegistry};
pub use styles::{
    FALLBACK_STYLE_NAME, StyleRegistry, StyleResource, StyleUpload, format_kib,
    sanitize_file_name, unique_safe_name,
};
pub use view::{EMPTY_STYLE_LIST, StyleListView, StyleRow};

use crate::config::SessionConfig;
use crate::error::QuireError;
use crate::protocol::{CompileRequest, JobId, WorkerEvent, WorkerRequest};
use crate::runner::{JobPhase, JobRunner, WorkerHandle, spawn_worker};
use log::{debug, info, trace, warn};
use std::path::Path;
use std::sync::Arc;

/// The document a new session starts with.
pub const DEFAULT_SOURCE: &str = include_str!("sample.tex");

pub struct Controller {
    worker: WorkerHandle,
    build_id: Option<String>,
    source: String,
    styles: StyleRegistry,
    style_view: StyleListView,
    log: LogPanel,
    outputs: OutputRegistry,
    active_output: Option<OutputRef>,
    status: String,
    meta: String,
    last_job: JobId,
    current: Option<JobId>,
    running: bool,
}

impl Controller {
    /// Spawns the worker for `config` on the current tokio runtime.
    pub fn start(config: SessionConfig) -> Self {
        info!("[CONTROLLER] Starting session with {:?}", config);
        let runner = JobRunner::new(Arc::new(config.loader()));
        let styles = StyleRegistry::new();
        Self {
            worker: spawn_worker(runner),
            build_id: config.build_id,
            source: config.initial_source,
            style_view: StyleListView::from_registry(&styles),
            styles,
            log: LogPanel::new(config.log_limit),
            outputs: OutputRegistry::new(),
            active_output: None,
            status: JobPhase::Idle.status_text().to_string(),
            meta: String::new(),
            last_job: 0,
            current: None,
            running: false,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, text: impl Into<String>) {
        self.source = text.into();
    }

    /// Replaces the source with the content of a file.
    ///
    /// A read failure is logged, sets the status to `error` and is returned.
    pub async fn load_source_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), QuireError> {
        let path = path.as_ref();
        match read_text(path).await {
            Ok((text, _)) => {
                self.source = text;
                self.log.push(format!("Loaded {}", display_name(path)));
                self.set_status(JobPhase::Idle.status_text());
                Ok(())
            }
            Err(e) => {
                self.report_error(&e);
                Err(e)
            }
        }
    }

    /// Reads a batch of style files and adds them.
    ///
    /// Every file is read before any name is assigned; one failed read
    /// rejects the whole batch.
    pub async fn add_style_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize, QuireError> {
        let mut uploads = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            match read_text(path).await {
                Ok((content, size)) => uploads.push(StyleUpload {
                    name: display_name(path),
                    content,
                    size,
                }),
                Err(e) => {
                    self.report_error(&e);
                    return Err(e);
                }
            }
        }
        Ok(self.add_styles(uploads))
    }

    /// Adds already-read uploads. Returns the number of uploads taken.
    pub fn add_styles(&mut self, uploads: Vec<StyleUpload>) -> usize {
        if uploads.is_empty() {
            return 0;
        }
        let added = self.styles.add_batch(uploads);
        self.refresh_styles();
        self.log.push(format!("Added {} style file(s)", added));
        self.set_status(JobPhase::Idle.status_text());
        added
    }

    pub fn remove_style(&mut self, original_name: &str) -> bool {
        let removed = self.styles.remove(original_name).is_some();
        if removed {
            debug!("[CONTROLLER] Removed style {}", original_name);
            self.refresh_styles();
        }
        removed
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    pub fn style_view(&self) -> &StyleListView {
        &self.style_view
    }

    /// Dispatches the current source and styles as a new job.
    ///
    /// Does nothing and returns `None` while a job is in flight.
    pub fn run_compile(&mut self) -> Option<JobId> {
        if self.running {
            debug!("[CONTROLLER] Compile requested while job {:?} runs", self.current);
            return None;
        }
        self.running = true;
        self.set_status(JobPhase::Loading.status_text());
        self.log.clear();
        self.log.push(RUN_MARKER);

        self.last_job += 1;
        let id = self.last_job;
        self.current = Some(id);

        let request = WorkerRequest::Compile(CompileRequest {
            id,
            source: self.source.clone(),
            styles: self.styles.to_entries(),
            build_id: self.build_id.clone(),
        });
        info!("[CONTROLLER] Dispatching job {} with {} style(s)", id, self.styles.len());
        if let Err(e) = self.worker.post(request) {
            self.report_error(&e);
            self.running = false;
            return None;
        }
        Some(id)
    }

    /// Stops waiting for the job in flight. Its remaining events are ignored.
    pub fn cancel(&mut self) -> Option<JobId> {
        if !self.running {
            return None;
        }
        let cancelled = self.current.take();
        self.running = false;
        self.set_status(JobPhase::Idle.status_text());
        info!("[CONTROLLER] Cancelled job {:?}", cancelled);
        cancelled
    }

    /// Applies one worker event. Returns false if the event was stale.
    pub fn handle_event(&mut self, event: WorkerEvent) -> bool {
        if self.current != Some(event.id()) {
            trace!(
                "[CONTROLLER] Ignoring event of job {} (current {:?})",
                event.id(),
                self.current
            );
            return false;
        }

        match event {
            WorkerEvent::Log { text, .. } => self.log.push(text),
            WorkerEvent::Status { text, .. } => self.set_status(text),
            WorkerEvent::Output { pdf, size, id } => {
                if let Some(previous) = self.active_output.take() {
                    self.outputs.revoke(&previous);
                }
                self.active_output = Some(self.outputs.create(pdf));
                self.meta = format!("PDF size: {}", format_kib(size as u64));
                self.set_status(JobPhase::Done.status_text());
                self.running = false;
                info!("[CONTROLLER] Job {} done ({} bytes)", id, size);
            }
            WorkerEvent::Error { message, id } => {
                self.log.push(format!("ERROR: {}", message));
                self.set_status(JobPhase::Failed.status_text());
                self.running = false;
                warn!("[CONTROLLER] Job {} failed: {}", id, message);
            }
        }
        true
    }

    /// Receives and applies one event. Returns false once the worker is gone.
    pub async fn next_event(&mut self) -> bool {
        match self.worker.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => {
                self.worker_failed();
                false
            }
        }
    }

    /// Applies events until no job is in flight.
    pub async fn wait_idle(&mut self) {
        while self.running {
            if !self.next_event().await {
                break;
            }
        }
    }

    fn worker_failed(&mut self) {
        if self.running {
            self.report_error(&QuireError::WorkerClosed);
            self.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Id of the job whose events are being applied, if any.
    pub fn current_job(&self) -> Option<JobId> {
        self.current
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Summary of the latest output, e.g. `PDF size: 12.3 KB`.
    pub fn meta(&self) -> &str {
        &self.meta
    }

    pub fn log(&self) -> &LogPanel {
        &self.log
    }

    pub fn active_output(&self) -> Option<&OutputRef> {
        self.active_output.as_ref()
    }

    pub fn output_bytes(&self) -> Option<Arc<Vec<u8>>> {
        self.active_output
            .as_ref()
            .and_then(|reference| self.outputs.resolve(reference))
    }

    pub fn outputs(&self) -> &OutputRegistry {
        &self.outputs
    }

    /// Writes the active output to `path`. Returns the number of bytes written.
    pub async fn save_output<P: AsRef<Path>>(&self, path: P) -> Result<usize, QuireError> {
        let bytes = self.output_bytes().ok_or(QuireError::NoOutput)?;
        tokio::fs::write(path.as_ref(), bytes.as_slice()).await?;
        info!("[CONTROLLER] Saved {} bytes to {}", bytes.len(), path.as_ref().display());
        Ok(bytes.len())
    }

    /// Stops the worker after its current job.
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
    }

    fn set_status(&mut self, text: impl Into<String>) {
        self.status = text.into();
        debug!("[CONTROLLER] Status: {}", self.status);
    }

    fn refresh_styles(&mut self) {
        self.style_view = StyleListView::from_registry(&self.styles);
    }

    fn report_error(&mut self, err: &QuireError) {
        self.log.push(format!("ERROR: {}", err));
        self.set_status(JobPhase::Failed.status_text());
    }
}

/// Reads a file as text, replacing invalid UTF-8. Also returns the size in
/// bytes.
async fn read_text(path: &Path) -> Result<(String, u64), QuireError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| QuireError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let size = bytes.len() as u64;
    Ok((String::from_utf8_lossy(&bytes).into_owned(), size))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
