// src/runner.rs
//!
//! The worker side of a compile session.
//!
//! A single background task owns a `JobRunner` and processes compile
//! requests one at a time, in arrival order:
//!
//! ```text
//! Controller -> requests -> Worker task -> events -> Controller
//!                               |
//!                 loader (factory + format, joined)
//!                 stage -> call_main (blocking) -> harvest
//! ```
//!
//! Every event echoes the job id. Each job ends with exactly one `result`
//! or `error` event.

use crate::error::QuireError;
use crate::loader::EngineLoader;
use crate::protocol::{CompileRequest, JobId, WorkerEvent, WorkerRequest};
use crate::stage;
use log::{debug, info, trace, warn};
use quire_traits::{EngineOptions, OutputHook};
use std::sync::Arc;
use tokio::task::{self, JoinHandle};

/// Sender half of the event channel. Must be unbounded: the engine's output
/// hooks publish synchronously with `try_send`.
pub type EventSender = async_channel::Sender<WorkerEvent>;

pub type EventReceiver = async_channel::Receiver<WorkerEvent>;

/// The lifecycle of one job as seen by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Loading,
    Compiling,
    Done,
    Failed,
}

impl JobPhase {
    /// The status line shown for this phase.
    pub fn status_text(self) -> &'static str {
        match self {
            JobPhase::Idle => "ready",
            JobPhase::Loading => "loading...",
            JobPhase::Compiling => "compiling...",
            JobPhase::Done => "done",
            JobPhase::Failed => "error",
        }
    }
}

fn emit(events: &EventSender, event: WorkerEvent) {
    if events.try_send(event).is_err() {
        trace!("[WORKER] Event dropped, receiver is gone");
    }
}

/// Drives one compile request from loading to harvested output.
#[derive(Debug, Clone)]
pub struct JobRunner {
    loader: Arc<EngineLoader>,
}

impl JobRunner {
    pub fn new(loader: Arc<EngineLoader>) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &Arc<EngineLoader> {
        &self.loader
    }

    /// Runs `request` to its terminal event and returns the final phase.
    ///
    /// Failures never escape: they are reported once as an `error` event.
    pub async fn run(&self, request: CompileRequest, events: &EventSender) -> JobPhase {
        let id = request.id;
        match self.compile(request, events).await {
            Ok(pdf) => {
                info!("[WORKER] Job {} produced {} bytes", id, pdf.len());
                emit(events, WorkerEvent::output(id, pdf));
                JobPhase::Done
            }
            Err(e) => {
                warn!("[WORKER] Job {} failed: {}", id, e);
                emit(events, WorkerEvent::error(id, e.to_string()));
                JobPhase::Failed
            }
        }
    }

    async fn compile(
        &self,
        request: CompileRequest,
        events: &EventSender,
    ) -> Result<Vec<u8>, QuireError> {
        let CompileRequest {
            id,
            source,
            styles,
            build_id,
        } = request;

        emit(events, WorkerEvent::status(id, JobPhase::Loading.status_text()));
        let build = build_id.as_deref();
        let (factory, format) = tokio::try_join!(
            self.loader.engine_factory(build),
            self.loader.format_blob(build)
        )?;
        debug!(
            "[WORKER] Job {} has engine {} and a {} byte format",
            id,
            factory.name(),
            format.len()
        );

        let options = engine_options(id, events);
        let events = events.clone();
        task::spawn_blocking(move || -> Result<Vec<u8>, QuireError> {
            let mut engine = factory.instantiate(options)?;
            stage::prepare(&mut *engine)?;
            let written = stage::write_inputs(engine.fs_mut(), &format, &styles, &source)?;
            debug!("[WORKER] Job {} staged {} style file(s)", id, written);

            emit(&events, WorkerEvent::status(id, JobPhase::Compiling.status_text()));
            let code = engine.call_main(&stage::engine_arguments())?;
            debug!("[WORKER] Job {} engine returned {}", id, code);

            stage::harvest_output(engine.fs())
        })
        .await?
    }
}

/// Options for a fresh engine instance of job `id`. Both output streams
/// become `log` events of the job.
fn engine_options(id: JobId, events: &EventSender) -> EngineOptions {
    let sender = events.clone();
    let hook: OutputHook = Arc::new(move |line: &str| {
        trace!("[ENGINE-{}] {}", id, line);
        emit(&sender, WorkerEvent::log(id, line));
    });
    EngineOptions {
        this_program: stage::PROGRAM_PATH.to_string(),
        env: stage::env_overrides(),
        print: Arc::clone(&hook),
        print_err: hook,
        no_initial_run: true,
    }
}

/// Controller-side handle to the background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    requests: async_channel::Sender<WorkerRequest>,
    events: EventReceiver,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Queues a request. Fails only when the worker has stopped.
    pub fn post(&self, request: WorkerRequest) -> Result<(), QuireError> {
        self.requests
            .try_send(request)
            .map_err(|_| QuireError::WorkerClosed)
    }

    /// Next event, or `None` once the worker has stopped and every event
    /// it sent has been received.
    pub async fn recv(&self) -> Option<WorkerEvent> {
        self.events.recv().await.ok()
    }

    pub fn events(&self) -> &EventReceiver {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops accepting requests and waits for the current job to finish.
    pub async fn shutdown(self) {
        self.requests.close();
        if let Err(e) = self.task.await {
            warn!("[WORKER] Worker task ended abnormally: {}", e);
        }
    }

    /// Stops the worker without waiting for it.
    pub fn abort(&self) {
        self.requests.close();
        self.task.abort();
    }
}

/// Spawns the persistent worker task on the current tokio runtime.
pub fn spawn_worker(runner: JobRunner) -> WorkerHandle {
    let (request_tx, request_rx) = async_channel::unbounded::<WorkerRequest>();
    let (event_tx, event_rx) = async_channel::unbounded::<WorkerEvent>();

    let task = tokio::spawn(async move {
        info!("[WORKER] Started");
        while let Ok(request) = request_rx.recv().await {
            match request {
                WorkerRequest::Compile(compile) => {
                    let id = compile.id;
                    debug!("[WORKER] Received compile job {}", id);
                    let phase = runner.run(compile, &event_tx).await;
                    debug!("[WORKER] Job {} finished as {:?}", id, phase);
                }
            }
        }
        info!("[WORKER] Request channel closed, stopping");
    });

    WorkerHandle {
        requests: request_tx,
        events: event_rx,
        task,
    }
}
