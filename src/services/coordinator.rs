use crate::config::UploadConfig;
use crate::models::{ContentDescriptor, RawFile};
use crate::services::registry::DocumentRegistry;
use crate::services::session::{SessionError, SessionState, UploadSession};
use crate::services::transfer::{TransferEngine, TransferEvent};
use crate::utils::validation::{self, ValidationRules};
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Upload coordinator is not running")]
    CoordinatorStopped,

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

enum Command {
    Submit {
        file: RawFile,
        bytes: Bytes,
        reply: oneshot::Sender<Result<UploadSession, PipelineError>>,
    },
    Transfer {
        session_id: Uuid,
        event: TransferEvent,
    },
    ClearStatus {
        session_id: Uuid,
    },
}

struct Attempt {
    session: UploadSession,
    file: RawFile,
    storage_path: Option<String>,
}

/// UI-facing side of the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::UnboundedSender<Command>,
    session: watch::Receiver<Option<UploadSession>>,
    documents: watch::Receiver<Arc<[ContentDescriptor]>>,
}

impl CoordinatorHandle {
    /// Starts a new upload attempt, superseding the current session.
    ///
    /// Returns once validation is done: the session is then either
    /// `Transferring` or `Failed`.
    pub async fn submit(&self, file: RawFile, bytes: Bytes) -> Result<UploadSession, PipelineError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit { file, bytes, reply })
            .map_err(|_| PipelineError::CoordinatorStopped)?;
        response
            .await
            .map_err(|_| PipelineError::CoordinatorStopped)?
    }

    /// The session currently on display, if any upload was submitted.
    pub fn session(&self) -> Option<UploadSession> {
        self.session.borrow().clone()
    }

    pub fn documents(&self) -> Arc<[ContentDescriptor]> {
        self.documents.borrow().clone()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<UploadSession>> {
        self.session.clone()
    }

    pub fn subscribe_documents(&self) -> watch::Receiver<Arc<[ContentDescriptor]>> {
        self.documents.clone()
    }
}

/// Single writer for sessions and the document registry.
///
/// UI commands and transfer events arrive on one queue and are applied in
/// order; readers only ever see published snapshots.
pub struct UploadCoordinator {
    engine: TransferEngine,
    rules: ValidationRules,
    status_clear: Duration,
    registry: DocumentRegistry,
    attempts: HashMap<Uuid, Attempt>,
    current: Option<Uuid>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    session_tx: watch::Sender<Option<UploadSession>>,
    documents_tx: watch::Sender<Arc<[ContentDescriptor]>>,
    shutdown: watch::Receiver<bool>,
}

impl UploadCoordinator {
    pub fn new(
        engine: TransferEngine,
        config: &UploadConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, CoordinatorHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = watch::channel(None);
        let registry = DocumentRegistry::new();
        let (documents_tx, documents_rx) = watch::channel(registry.snapshot());

        let handle = CoordinatorHandle {
            commands: commands_tx.clone(),
            session: session_rx,
            documents: documents_rx,
        };

        let coordinator = Self {
            engine,
            rules: ValidationRules::from_config(config),
            status_clear: Duration::from_secs(config.status_clear_secs),
            registry,
            attempts: HashMap::new(),
            current: None,
            commands_tx,
            commands_rx,
            session_tx,
            documents_tx,
            shutdown,
        };

        (coordinator, handle)
    }

    pub async fn run(mut self) {
        info!("📚 Upload coordinator started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    info!("🛑 Upload coordinator shutting down");
                    break;
                }
                command = self.commands_rx.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => break,
                    }
                }
            }
        }

        let in_flight = self
            .attempts
            .values()
            .filter(|a| !a.session.state.is_terminal())
            .count();
        if in_flight > 0 {
            warn!("{} transfer(s) still in flight at shutdown", in_flight);
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Submit { file, bytes, reply } => {
                let session = self.submit(file, bytes);
                let _ = reply.send(session);
            }
            Command::Transfer { session_id, event } => self.on_transfer_event(session_id, event),
            Command::ClearStatus { session_id } => {
                if self.current == Some(session_id) {
                    if let Some(attempt) = self.attempts.get_mut(&session_id) {
                        attempt.session.clear_status();
                        self.publish_session();
                    }
                }
            }
        }
    }

    fn submit(&mut self, mut file: RawFile, bytes: Bytes) -> Result<UploadSession, PipelineError> {
        if file.byte_size != bytes.len() as u64 {
            warn!(
                "Declared size {} of '{}' differs from payload size {}, using payload size",
                file.byte_size,
                file.name,
                bytes.len()
            );
            file.byte_size = bytes.len() as u64;
        }

        let mut session = UploadSession::new();
        session.submit(&file.name)?;
        let result = validation::validate(&file, &self.rules);
        session.apply_validation(result, &self.rules)?;

        let session_id = session.id;
        let mut attempt = Attempt {
            session,
            file: file.clone(),
            storage_path: None,
        };

        if result.is_accepted() {
            let mut handle = self.engine.begin_transfer(file, bytes);
            attempt.storage_path = Some(handle.storage_path().to_string());

            // Events go through the queue, so they are applied after the insert below
            let commands = self.commands_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = handle.next_event().await {
                    if commands
                        .send(Command::Transfer { session_id, event })
                        .is_err()
                    {
                        break;
                    }
                }
            });
        } else {
            info!(
                "🚫 Rejected '{}': {}",
                attempt.file.name,
                attempt.session.status_message.as_deref().unwrap_or_default()
            );
        }

        let snapshot = attempt.session.clone();
        self.supersede(session_id);
        self.attempts.insert(session_id, attempt);
        self.publish_session();
        Ok(snapshot)
    }

    /// Makes `session_id` the displayed session and forgets the previous one
    /// unless its transfer is still running.
    fn supersede(&mut self, session_id: Uuid) {
        if let Some(previous) = self.current.replace(session_id) {
            let finished = self
                .attempts
                .get(&previous)
                .map(|a| a.session.state.is_terminal())
                .unwrap_or(false);
            if finished {
                self.attempts.remove(&previous);
            }
        }
    }

    fn on_transfer_event(&mut self, session_id: Uuid, event: TransferEvent) {
        let Some(attempt) = self.attempts.get_mut(&session_id) else {
            debug!("Dropping event for unknown session {}", session_id);
            return;
        };

        if let Err(e) = attempt.session.apply_event(&event) {
            warn!("Session {}: {}", session_id, e);
            return;
        }

        if let TransferEvent::Succeeded { locator } = &event {
            let descriptor = ContentDescriptor {
                display_name: attempt.file.name.clone(),
                byte_size: attempt.file.byte_size,
                locator: locator.clone(),
                storage_path: attempt.storage_path.clone().unwrap_or_default(),
                completed_at: Utc::now(),
            };
            info!(
                "📄 Registered '{}' ({} MB) at {}",
                descriptor.display_name,
                descriptor.size_mib(),
                descriptor.storage_path
            );
            self.registry.append(descriptor);
            self.documents_tx.send_replace(self.registry.snapshot());
        }

        let is_current = self.current == Some(session_id);
        let state = attempt.session.state;

        if is_current {
            self.publish_session();
            if state == SessionState::Succeeded {
                self.schedule_status_clear(session_id);
            }
        } else if state.is_terminal() {
            self.attempts.remove(&session_id);
        }
    }

    fn schedule_status_clear(&self, session_id: Uuid) {
        let commands = self.commands_tx.clone();
        let delay = self.status_clear;
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = commands.send(Command::ClearStatus { session_id });
        });
    }

    fn publish_session(&self) {
        let snapshot = self
            .current
            .and_then(|id| self.attempts.get(&id))
            .map(|a| a.session.clone());
        self.session_tx.send_replace(snapshot);
    }
}
