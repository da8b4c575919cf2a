//
// rpc.rs
//
// Host-facing handle: typed requests to a worker task over a mailbox
//
// Requests are delivered in send order. Edits are composed in the mailbox
// loop itself so their order is preserved; queries run as separate tasks so a
// query waiting for readiness never blocks the edits behind it.
//

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::adapters::{CompletionEnvelope, Diagnostic, HoverInfo};
use crate::config::WorkerConfig;
use crate::env::Services;
use crate::error::WorkerError;
use crate::patch::ChangeSet;
use crate::state::{StateUpdate, WorkerState};
use crate::worker::{CodeWorker, InitRequest};

type StateListener = Box<dyn Fn(&WorkerState, &StateUpdate) + Send + Sync>;

enum Request {
    UpdateFile {
        changes: ChangeSet,
        done: Option<oneshot::Sender<Result<(), WorkerError>>>,
    },
    Completions {
        offset: usize,
        reply: oneshot::Sender<Option<CompletionEnvelope>>,
    },
    Diagnostics {
        reply: oneshot::Sender<Vec<Diagnostic>>,
    },
    Hover {
        offset: usize,
        reply: oneshot::Sender<Option<HoverInfo>>,
    },
    ModuleNames {
        reply: oneshot::Sender<Vec<String>>,
    },
    UpdateNodeTypes {
        reply: oneshot::Sender<()>,
    },
    AddListener {
        listener: StateListener,
    },
}

/// Handle to a running worker. Cloning yields another handle to the same
/// worker; once it is terminated every handle reports [`WorkerError::Closed`].
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<WorkerState>,
    shutdown: CancellationToken,
    task: Arc<JoinHandle<()>>,
}

/// Initialise a worker and start serving requests.
///
/// Resolves once the worker is ready. Never fails: setup problems only
/// degrade the answers.
pub async fn spawn_worker(request: InitRequest, services: Services, config: WorkerConfig) -> WorkerHandle {
    let worker = CodeWorker::init(request, services, config).await;
    let (tx, rx) = mpsc::unbounded_channel();
    let state = worker.subscribe();
    let shutdown = worker.shutdown_token();

    let task = tokio::spawn(serve(worker, rx, shutdown.clone()));

    WorkerHandle {
        tx,
        state,
        shutdown,
        task: Arc::new(task),
    }
}

async fn serve(worker: CodeWorker, mut rx: mpsc::UnboundedReceiver<Request>, shutdown: CancellationToken) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => dispatch(&worker, request, &mut in_flight),
                None => break,
            },
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    log::trace!("Worker mailbox closed");
    worker.shutdown();
}

fn dispatch(worker: &CodeWorker, request: Request, in_flight: &mut JoinSet<()>) {
    match request {
        Request::UpdateFile { changes, done } => match worker.update_file(changes) {
            Ok(flushed) => {
                in_flight.spawn(async move {
                    flushed.await;
                    if let Some(done) = done {
                        let _ = done.send(Ok(()));
                    }
                });
            }
            Err(e) => {
                log::warn!("Rejected edit: {}", e);
                if let Some(done) = done {
                    let _ = done.send(Err(e));
                }
            }
        },
        Request::Completions { offset, reply } => {
            let worker = worker.clone();
            in_flight.spawn(async move {
                let _ = reply.send(worker.get_completions_at_pos(offset).await);
            });
        }
        Request::Diagnostics { reply } => {
            let worker = worker.clone();
            in_flight.spawn(async move {
                let _ = reply.send(worker.get_diagnostics().await);
            });
        }
        Request::Hover { offset, reply } => {
            let worker = worker.clone();
            in_flight.spawn(async move {
                let _ = reply.send(worker.get_hover_tooltip(offset).await);
            });
        }
        Request::ModuleNames { reply } => {
            let worker = worker.clone();
            in_flight.spawn(async move {
                let _ = reply.send(worker.get_module_names().await);
            });
        }
        Request::UpdateNodeTypes { reply } => {
            let worker = worker.clone();
            in_flight.spawn(async move {
                worker.update_node_types().await;
                let _ = reply.send(());
            });
        }
        Request::AddListener { listener } => worker.add_state_listener(listener),
    }
}

impl WorkerHandle {
    fn send(&self, request: Request) -> Result<(), WorkerError> {
        self.tx.send(request).map_err(|_| WorkerError::Closed)
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| WorkerError::Closed)
    }

    /// Queue an edit without waiting for it to be applied
    pub fn update_file(&self, changes: ChangeSet) -> Result<(), WorkerError> {
        self.send(Request::UpdateFile { changes, done: None })
    }

    /// Queue an edit in the host wire format
    pub fn update_file_json(&self, changes: serde_json::Value) -> Result<(), WorkerError> {
        self.update_file(ChangeSet::try_from(changes)?)
    }

    /// Queue an edit and wait until it has been flushed
    pub async fn update_file_and_wait(&self, changes: ChangeSet) -> Result<(), WorkerError> {
        self.ask(|reply| Request::UpdateFile {
            changes,
            done: Some(reply),
        })
        .await?
    }

    pub async fn get_completions_at_pos(&self, offset: usize) -> Result<Option<CompletionEnvelope>, WorkerError> {
        self.ask(|reply| Request::Completions { offset, reply }).await
    }

    pub async fn get_diagnostics(&self) -> Result<Vec<Diagnostic>, WorkerError> {
        self.ask(|reply| Request::Diagnostics { reply }).await
    }

    pub async fn get_hover_tooltip(&self, offset: usize) -> Result<Option<HoverInfo>, WorkerError> {
        self.ask(|reply| Request::Hover { offset, reply }).await
    }

    pub async fn get_module_names(&self) -> Result<Vec<String>, WorkerError> {
        self.ask(|reply| Request::ModuleNames { reply }).await
    }

    /// Re-synthesize every loaded node declaration
    pub async fn update_node_types(&self) -> Result<(), WorkerError> {
        self.ask(|reply| Request::UpdateNodeTypes { reply }).await
    }

    /// Hand a callback to the worker, run after every state change
    pub fn add_state_listener<F>(&self, listener: F) -> Result<(), WorkerError>
    where
        F: Fn(&WorkerState, &StateUpdate) + Send + Sync + 'static,
    {
        self.send(Request::AddListener {
            listener: Box::new(listener),
        })
    }

    /// Latest worker state
    pub fn state(&self) -> WorkerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stop the worker. Cancelling the buffer's token drops pending flushes;
    /// every outstanding or later request resolves to [`WorkerError::Closed`].
    pub fn terminate(&self) {
        self.shutdown.cancel();
        self.task.abort();
        log::info!("Worker terminated");
    }
}
