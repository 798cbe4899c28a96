//! IntakeManager — the per-submitter conversation state machine.
//!
//! Owns the session table. Each event is dispatched on `(state, event)`;
//! pairs that are not part of the flow are ignored. `/start` and `/cancel`
//! apply in every state.
//!
//! A session is only written back after the side effects of its step have
//! been attempted, and a failed step writes nothing, so a storage failure
//! leaves the session exactly as it was.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::channels::{ChatId, DocumentUpload, Gateway, IncomingEvent, IntakeEvent, Submitter};
use crate::error::{ChannelError, Error, StorageError, ValidationError};

use super::naming::generate_name;
use super::prompts;
use super::relay::{RelayNotifier, Submission};
use super::state::{Session, SessionState};
use super::store::FileStore;
use super::validate::{validate_file_name, validate_file_size, validate_phone};

/// Source of "now" for stored file names.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What handling one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A fresh session was opened.
    Started,
    /// The session moved to the given state.
    Advanced(SessionState),
    /// The document was stored and the session removed.
    Completed {
        stored_path: PathBuf,
        /// Whether the reviewer received it.
        relayed: bool,
    },
    /// The document failed validation; the session is unchanged.
    Rejected(ValidationError),
    /// Fetching or writing the document failed; the session is unchanged.
    StorageFailed,
    /// The session was discarded on request.
    Cancelled,
    /// The event had no effect.
    Ignored,
}

/// Coordinates sessions, validation, storage and the reviewer relay.
pub struct IntakeManager {
    gateway: Arc<dyn Gateway>,
    store: FileStore,
    relay: RelayNotifier,
    sessions: RwLock<HashMap<ChatId, Session>>,
    clock: Clock,
}

impl IntakeManager {
    pub fn new(gateway: Arc<dyn Gateway>, store: FileStore, reviewer: ChatId) -> Self {
        let relay = RelayNotifier::new(Arc::clone(&gateway), reviewer);
        Self {
            gateway,
            store,
            relay,
            sessions: RwLock::new(HashMap::new()),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the clock used for stored file names.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Snapshot of a submitter's session.
    pub async fn session(&self, chat_id: &ChatId) -> Option<Session> {
        self.sessions.read().await.get(chat_id).cloned()
    }

    /// Number of open sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Handle one event for one submitter.
    ///
    /// Callers must not run two events of the same submitter concurrently.
    pub async fn handle(&self, incoming: IncomingEvent) -> Outcome {
        let IncomingEvent { submitter, event } = incoming;
        let chat_id = &submitter.chat_id;

        match event {
            IntakeEvent::Start => self.start(&submitter).await,
            IntakeEvent::Cancel => self.cancel(chat_id).await,
            event => {
                let Some(session) = self.session(chat_id).await else {
                    tracing::debug!(
                        submitter = %chat_id,
                        event = event.label(),
                        "Ignoring event without a session"
                    );
                    return Outcome::Ignored;
                };

                match (session.state(), event) {
                    (SessionState::AwaitingName, IntakeEvent::Text { text }) => {
                        self.on_name(chat_id, session, text).await
                    }
                    (SessionState::AwaitingPhone, IntakeEvent::Contact { phone }) => {
                        self.on_phone(chat_id, session, phone).await
                    }
                    (SessionState::AwaitingFile, IntakeEvent::Document(document)) => {
                        self.on_document(chat_id, session, document).await
                    }
                    (state, event) => {
                        tracing::debug!(
                            submitter = %chat_id,
                            %state,
                            event = event.label(),
                            "Ignoring event not valid in current state"
                        );
                        Outcome::Ignored
                    }
                }
            }
        }
    }

    /// Discard any session and open a fresh one.
    async fn start(&self, submitter: &Submitter) -> Outcome {
        let chat_id = &submitter.chat_id;
        if let Some(previous) = self.sessions.write().await.remove(chat_id) {
            tracing::info!(
                submitter = %chat_id,
                previous_state = %previous.state(),
                "Restarting intake, previous session discarded"
            );
        }

        let welcome = prompts::welcome(submitter.first_name.as_deref());
        report(chat_id, "welcome", self.gateway.remove_keyboard(chat_id, &welcome).await);
        report(
            chat_id,
            "name prompt",
            self.gateway.send_text(chat_id, prompts::ASK_NAME).await,
        );

        self.commit(chat_id, Session::new()).await;
        tracing::info!(submitter = %chat_id, "Intake started");
        Outcome::Started
    }

    async fn cancel(&self, chat_id: &ChatId) -> Outcome {
        if self.session(chat_id).await.is_none() {
            tracing::debug!(submitter = %chat_id, "Cancel without a session");
            return Outcome::Ignored;
        }

        report(
            chat_id,
            "cancel acknowledgement",
            self.gateway.remove_keyboard(chat_id, prompts::CANCELLED).await,
        );
        self.sessions.write().await.remove(chat_id);
        tracing::info!(submitter = %chat_id, "Intake cancelled");
        Outcome::Cancelled
    }

    async fn on_name(&self, chat_id: &ChatId, mut session: Session, text: String) -> Outcome {
        if text.trim().is_empty() {
            return Outcome::Ignored;
        }

        let prompt = prompts::ask_phone(&text);
        let next = match session.record_name(text) {
            Ok(next) => next,
            Err(e) => return self.refuse(chat_id, &e),
        };

        report(
            chat_id,
            "phone prompt",
            self.gateway
                .send_contact_request(chat_id, &prompt, prompts::CONTACT_BUTTON)
                .await,
        );

        self.commit(chat_id, session).await;
        tracing::info!(submitter = %chat_id, state = %next, "Name recorded");
        Outcome::Advanced(next)
    }

    async fn on_phone(&self, chat_id: &ChatId, mut session: Session, phone: String) -> Outcome {
        if !validate_phone(&phone) {
            tracing::debug!(submitter = %chat_id, "Ignoring contact without a usable phone");
            return Outcome::Ignored;
        }

        let confirmation = prompts::phone_received(&phone);
        let next = match session.record_phone(phone) {
            Ok(next) => next,
            Err(e) => return self.refuse(chat_id, &e),
        };

        report(
            chat_id,
            "phone confirmation",
            self.gateway.remove_keyboard(chat_id, &confirmation).await,
        );

        self.commit(chat_id, session).await;
        tracing::info!(submitter = %chat_id, state = %next, "Phone recorded");
        Outcome::Advanced(next)
    }

    async fn on_document(
        &self,
        chat_id: &ChatId,
        mut session: Session,
        document: DocumentUpload,
    ) -> Outcome {
        if let Err(e) =
            validate_file_name(&document.file_name).and(validate_file_size(document.size_bytes))
        {
            return self.reject(chat_id, &document, e).await;
        }

        let (Some(name), Some(phone)) = (
            session.name().map(str::to_string),
            session.phone().map(str::to_string),
        ) else {
            return self.refuse(chat_id, "document accepted without name and phone");
        };

        let stored_name = generate_name((self.clock)(), &name, &document.file_name);

        // Phase one: durable storage. Any failure leaves the session untouched.
        let stored_path = match self.store_document(&document, &stored_name).await {
            Ok(path) => path,
            Err(Error::Validation(e)) => return self.reject(chat_id, &document, e).await,
            Err(e) => {
                tracing::warn!(
                    submitter = %chat_id,
                    file = %document.file_name,
                    error = %e,
                    "Storing document failed"
                );
                report(
                    chat_id,
                    "storage retry",
                    self.gateway.send_text(chat_id, prompts::STORAGE_RETRY).await,
                );
                return Outcome::StorageFailed;
            }
        };

        tracing::info!(
            submitter = %chat_id,
            file = %document.file_name,
            stored_as = %stored_name,
            "Document stored"
        );
        report(
            chat_id,
            "file accepted",
            self.gateway
                .send_text(chat_id, &prompts::file_accepted(&document.file_name))
                .await,
        );

        // Phase two: best-effort relay. Never undoes phase one.
        let submission = Submission {
            original_file_name: document.file_name,
            stored_name,
            stored_path: stored_path.clone(),
            submitter_name: name,
            submitter_phone: phone,
            file_id: document.file_id,
        };
        let relayed = match self.relay.forward(&submission).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    submitter = %chat_id,
                    stored_path = %submission.stored_path.display(),
                    error = %e,
                    "Relay to reviewer failed; submission is stored but the reviewer was not notified"
                );
                false
            }
        };

        report(
            chat_id,
            "restart hint",
            self.gateway.send_text(chat_id, prompts::RESTART_HINT).await,
        );

        if let Err(e) = session.close() {
            tracing::warn!(submitter = %chat_id, error = %e, "Closing session out of order");
        }
        self.sessions.write().await.remove(chat_id);
        tracing::info!(submitter = %chat_id, relayed, "Intake completed");

        Outcome::Completed {
            stored_path,
            relayed,
        }
    }

    /// Fetch the bytes, re-check their real size, and write them.
    async fn store_document(
        &self,
        document: &DocumentUpload,
        stored_name: &str,
    ) -> Result<PathBuf, Error> {
        let bytes = self
            .gateway
            .fetch_document(&document.file_id)
            .await
            .map_err(StorageError::from)?;
        validate_file_size(bytes.len() as u64)?;
        Ok(self.store.save(&bytes, stored_name).await?)
    }

    async fn reject(
        &self,
        chat_id: &ChatId,
        document: &DocumentUpload,
        error: ValidationError,
    ) -> Outcome {
        tracing::info!(
            submitter = %chat_id,
            file = %document.file_name,
            reason = %error,
            "Document rejected"
        );
        let message = match error {
            ValidationError::UnsupportedExtension { .. } => prompts::REJECT_EXTENSION.to_string(),
            ValidationError::TooLarge { .. } => prompts::reject_size(),
        };
        report(
            chat_id,
            "rejection",
            self.gateway.send_text(chat_id, &message).await,
        );
        Outcome::Rejected(error)
    }

    fn refuse(&self, chat_id: &ChatId, reason: &str) -> Outcome {
        tracing::warn!(submitter = %chat_id, reason, "Refusing out-of-order step");
        Outcome::Ignored
    }

    async fn commit(&self, chat_id: &ChatId, session: Session) {
        self.sessions.write().await.insert(chat_id.clone(), session);
    }
}

/// Outbound message failures are logged and otherwise ignored.
fn report(chat_id: &ChatId, what: &str, result: Result<(), ChannelError>) {
    if let Err(e) = result {
        tracing::warn!(submitter = %chat_id, kind = what, error = %e, "Failed to send message");
    }
}
