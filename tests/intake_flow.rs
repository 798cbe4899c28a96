//! End-to-end tests for the intake conversation.
//!
//! A recording gateway stands in for Telegram; documents are written to a
//! temporary uploads directory.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use thesis_intake::channels::{
    ChatId, DocumentUpload, Gateway, IncomingEvent, IntakeEvent, Submitter,
};
use thesis_intake::dispatch::Dispatcher;
use thesis_intake::error::{ChannelError, ValidationError};
use thesis_intake::intake::{FileStore, IntakeManager, Outcome, SessionState};

/// Maximum time any async wait is allowed before the test is considered hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const REVIEWER: &str = "5407162492";

/// Everything the bot sent, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Text { to: String, text: String },
    ContactRequest { to: String, text: String },
    RemoveKeyboard { to: String, text: String },
    Forward { to: String, file_id: String, caption: String },
}

/// In-memory gateway that records calls and serves document bytes.
#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<Sent>>,
    documents: Mutex<HashMap<String, Vec<u8>>>,
    fail_fetch: AtomicBool,
    fail_forward: AtomicBool,
}

impl RecordingGateway {
    fn with_document(self, file_id: &str, bytes: Vec<u8>) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(file_id.to_string(), bytes);
        self
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn forwards(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Forward { .. }))
            .collect()
    }

    fn texts_to(&self, chat: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { to, text }
                | Sent::ContactRequest { to, text }
                | Sent::RemoveKeyboard { to, text }
                    if to == chat =>
                {
                    Some(text)
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn send_text(&self, to: &ChatId, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::Text {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_contact_request(
        &self,
        to: &ChatId,
        text: &str,
        _button_label: &str,
    ) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::ContactRequest {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn remove_keyboard(&self, to: &ChatId, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::RemoveKeyboard {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn fetch_document(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ChannelError::DownloadFailed {
                name: "recording".into(),
                file_id: file_id.to_string(),
                reason: "simulated outage".into(),
            });
        }
        self.documents
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| ChannelError::DownloadFailed {
                name: "recording".into(),
                file_id: file_id.to_string(),
                reason: "unknown file".into(),
            })
    }

    async fn forward_document(
        &self,
        to: &ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ChannelError> {
        if self.fail_forward.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "reviewer unreachable".into(),
            });
        }
        self.sent.lock().unwrap().push(Sent::Forward {
            to: to.to_string(),
            file_id: file_id.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }
}

struct Harness {
    gateway: Arc<RecordingGateway>,
    manager: Arc<IntakeManager>,
    uploads: std::path::PathBuf,
    _tmp: tempfile::TempDir,
}

/// Manager with a clock fixed at 2024-01-15 12:00:00 (UTC+5).
async fn harness(gateway: RecordingGateway) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let uploads = tmp.path().join("uploads");
    let store = FileStore::new(uploads.clone());
    store.ensure_dir().await.unwrap();

    let gateway = Arc::new(gateway);
    let fixed = Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap();
    let manager = IntakeManager::new(gateway.clone(), store, ChatId::from(REVIEWER))
        .with_clock(Arc::new(move || fixed));

    Harness {
        gateway,
        manager: Arc::new(manager),
        uploads,
        _tmp: tmp,
    }
}

fn from(chat: &str, event: IntakeEvent) -> IncomingEvent {
    IncomingEvent::new(Submitter::new(chat).with_first_name("Aziz"), event)
}

fn text(t: &str) -> IntakeEvent {
    IntakeEvent::Text { text: t.into() }
}

fn contact(p: &str) -> IntakeEvent {
    IntakeEvent::Contact { phone: p.into() }
}

fn document(name: &str, size: u64, file_id: &str) -> IntakeEvent {
    IntakeEvent::Document(DocumentUpload {
        file_name: name.into(),
        size_bytes: size,
        file_id: file_id.into(),
    })
}

fn uploaded_files(h: &Harness) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(&h.uploads)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Drive a submitter up to AwaitingFile.
async fn reach_awaiting_file(h: &Harness, chat: &str, name: &str, phone: &str) {
    assert_eq!(h.manager.handle(from(chat, IntakeEvent::Start)).await, Outcome::Started);
    assert_eq!(
        h.manager.handle(from(chat, text(name))).await,
        Outcome::Advanced(SessionState::AwaitingPhone)
    );
    assert_eq!(
        h.manager.handle(from(chat, contact(phone))).await,
        Outcome::Advanced(SessionState::AwaitingFile)
    );
}

// ── Happy path ─────────────────────────────────────────────────────────

#[tokio::test]
async fn full_flow_stores_and_relays() {
    let h = harness(RecordingGateway::default().with_document("doc-1", vec![7u8; 500 * 1024])).await;
    reach_awaiting_file(&h, "100", "Aziz Karimov", "+998901234567").await;

    let outcome = h
        .manager
        .handle(from("100", document("thesis.docx", 500 * 1024, "doc-1")))
        .await;

    let expected_path = h.uploads.join("20240115_120000_Aziz_Karimov.docx");
    assert_eq!(
        outcome,
        Outcome::Completed {
            stored_path: expected_path.clone(),
            relayed: true
        }
    );
    assert_eq!(std::fs::read(&expected_path).unwrap().len(), 500 * 1024);
    assert_eq!(uploaded_files(&h), vec!["20240115_120000_Aziz_Karimov.docx"]);

    // Session is gone.
    assert!(h.manager.session(&ChatId::from("100")).await.is_none());

    // Reviewer got the original document reference with the details.
    let forwards = h.gateway.forwards();
    assert_eq!(forwards.len(), 1);
    let Sent::Forward { to, file_id, caption } = &forwards[0] else {
        unreachable!()
    };
    assert_eq!(to, REVIEWER);
    assert_eq!(file_id, "doc-1");
    assert!(caption.contains("thesis.docx"));
    assert!(caption.contains("Aziz Karimov"));
    assert!(caption.contains("+998901234567"));
}

#[tokio::test]
async fn conversation_messages_follow_the_steps() {
    let h = harness(RecordingGateway::default().with_document("d", b"pdf".to_vec())).await;
    reach_awaiting_file(&h, "100", "Aziz Karimov", "+998901234567").await;
    h.manager
        .handle(from("100", document("thesis.pdf", 3, "d")))
        .await;

    let sent = h.gateway.sent();
    assert!(matches!(&sent[0], Sent::RemoveKeyboard { text, .. } if text.contains("Assalomu alaykum, Aziz")));
    assert!(matches!(&sent[1], Sent::Text { text, .. } if text.contains("ismingizni")));
    assert!(matches!(&sent[2], Sent::ContactRequest { text, .. } if text.contains("Rahmat, Aziz Karimov")));
    assert!(matches!(&sent[3], Sent::RemoveKeyboard { text, .. } if text.contains("+998901234567")));
    assert!(matches!(&sent[4], Sent::Text { text, .. } if text.contains("Fayl qabul qilindi: thesis.pdf")));
    assert!(matches!(&sent[5], Sent::Forward { .. }));
    assert!(matches!(&sent[6], Sent::Text { text, .. } if text.contains("/start")));
    assert_eq!(sent.len(), 7);
}

// ── Rejections ─────────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_extension_keeps_awaiting_file() {
    let h = harness(RecordingGateway::default().with_document("exe", vec![0u8; 10])).await;
    reach_awaiting_file(&h, "100", "Aziz Karimov", "+998901234567").await;

    let outcome = h
        .manager
        .handle(from("100", document("thesis.exe", 10, "exe")))
        .await;

    assert_eq!(
        outcome,
        Outcome::Rejected(ValidationError::UnsupportedExtension {
            file_name: "thesis.exe".into()
        })
    );
    let session = h.manager.session(&ChatId::from("100")).await.unwrap();
    assert_eq!(session.state(), SessionState::AwaitingFile);
    assert!(uploaded_files(&h).is_empty());
    assert!(h.gateway.forwards().is_empty());
    assert!(
        h.gateway
            .texts_to("100")
            .last()
            .unwrap()
            .contains(".doc, .docx yoki .pdf")
    );
}

#[tokio::test]
async fn actual_size_is_checked_after_download() {
    // Declared small, delivered at the ceiling.
    let h = harness(
        RecordingGateway::default().with_document("big", vec![0u8; 10 * 1024 * 1024]),
    )
    .await;
    reach_awaiting_file(&h, "100", "Aziz", "+998901234567").await;

    let outcome = h
        .manager
        .handle(from("100", document("thesis.pdf", 1, "big")))
        .await;

    assert!(matches!(
        outcome,
        Outcome::Rejected(ValidationError::TooLarge { .. })
    ));
    assert!(uploaded_files(&h).is_empty());
}

#[tokio::test]
async fn retry_after_rejection_succeeds() {
    let h = harness(RecordingGateway::default().with_document("ok", b"doc".to_vec())).await;
    reach_awaiting_file(&h, "100", "Aziz Karimov", "+998901234567").await;

    h.manager
        .handle(from("100", document("thesis.txt", 3, "ok")))
        .await;
    let outcome = h
        .manager
        .handle(from("100", document("thesis.doc", 3, "ok")))
        .await;

    assert!(matches!(outcome, Outcome::Completed { relayed: true, .. }));
    assert_eq!(uploaded_files(&h), vec!["20240115_120000_Aziz_Karimov.doc"]);
}

// ── Storage and relay failures ─────────────────────────────────────────

#[tokio::test]
async fn storage_failure_leaves_session_untouched() {
    let h = harness(RecordingGateway::default().with_document("d", b"doc".to_vec())).await;
    reach_awaiting_file(&h, "100", "Aziz Karimov", "+998901234567").await;
    let before = h.manager.session(&ChatId::from("100")).await.unwrap();

    // Uploads dir disappears underneath the bot.
    std::fs::remove_dir_all(&h.uploads).unwrap();
    let outcome = h
        .manager
        .handle(from("100", document("thesis.pdf", 3, "d")))
        .await;

    assert_eq!(outcome, Outcome::StorageFailed);
    assert_eq!(h.manager.session(&ChatId::from("100")).await.unwrap(), before);
    assert!(h.gateway.forwards().is_empty());
    assert!(h.gateway.texts_to("100").last().unwrap().contains("qaytadan"));

    // Operator restores the directory; the resend goes through.
    std::fs::create_dir_all(&h.uploads).unwrap();
    let outcome = h
        .manager
        .handle(from("100", document("thesis.pdf", 3, "d")))
        .await;
    assert!(matches!(outcome, Outcome::Completed { relayed: true, .. }));
    assert_eq!(uploaded_files(&h), vec!["20240115_120000_Aziz_Karimov.pdf"]);
}

#[tokio::test]
async fn download_failure_is_a_storage_failure() {
    let gateway = RecordingGateway::default().with_document("d", b"doc".to_vec());
    gateway.fail_fetch.store(true, Ordering::SeqCst);
    let h = harness(gateway).await;
    reach_awaiting_file(&h, "100", "Aziz", "+998901234567").await;

    let outcome = h
        .manager
        .handle(from("100", document("thesis.pdf", 3, "d")))
        .await;

    assert_eq!(outcome, Outcome::StorageFailed);
    assert_eq!(
        h.manager.session(&ChatId::from("100")).await.unwrap().state(),
        SessionState::AwaitingFile
    );
    assert!(uploaded_files(&h).is_empty());
}

#[tokio::test]
async fn relay_failure_keeps_stored_file_and_closes_session() {
    let gateway = RecordingGateway::default().with_document("d", b"doc".to_vec());
    gateway.fail_forward.store(true, Ordering::SeqCst);
    let h = harness(gateway).await;
    reach_awaiting_file(&h, "100", "Aziz Karimov", "+998901234567").await;

    let outcome = h
        .manager
        .handle(from("100", document("thesis.pdf", 3, "d")))
        .await;

    assert!(matches!(outcome, Outcome::Completed { relayed: false, .. }));
    assert_eq!(uploaded_files(&h), vec!["20240115_120000_Aziz_Karimov.pdf"]);
    assert!(h.manager.session(&ChatId::from("100")).await.is_none());
    // The submitter is not told about the relay failure.
    let texts = h.gateway.texts_to("100");
    assert!(texts.iter().any(|t| t.contains("Fayl qabul qilindi")));
    assert!(texts.last().unwrap().contains("/start"));
}

// ── Reset and cancel ───────────────────────────────────────────────────

#[tokio::test]
async fn start_resets_from_any_state() {
    let h = harness(RecordingGateway::default()).await;
    let chat = ChatId::from("100");

    reach_awaiting_file(&h, "100", "Aziz Karimov", "+998901234567").await;
    assert_eq!(h.manager.handle(from("100", IntakeEvent::Start)).await, Outcome::Started);

    let session = h.manager.session(&chat).await.unwrap();
    assert_eq!(session.state(), SessionState::AwaitingName);
    assert_eq!(session.name(), None);
    assert_eq!(session.phone(), None);
    assert_eq!(h.manager.session_count().await, 1);

    // Mid-way through as well.
    h.manager.handle(from("100", text("Other Name"))).await;
    h.manager.handle(from("100", IntakeEvent::Start)).await;
    assert_eq!(h.manager.session(&chat).await.unwrap().name(), None);
}

#[tokio::test]
async fn cancel_discards_session_and_removes_keyboard() {
    let h = harness(RecordingGateway::default()).await;
    h.manager.handle(from("100", IntakeEvent::Start)).await;
    h.manager.handle(from("100", text("Aziz"))).await;

    assert_eq!(
        h.manager.handle(from("100", IntakeEvent::Cancel)).await,
        Outcome::Cancelled
    );
    assert!(h.manager.session(&ChatId::from("100")).await.is_none());
    assert!(matches!(
        h.gateway.sent().last().unwrap(),
        Sent::RemoveKeyboard { text, .. } if text.contains("bekor qilindi")
    ));

    // Later input is ignored until /start.
    assert_eq!(
        h.manager.handle(from("100", contact("+998901234567"))).await,
        Outcome::Ignored
    );
}

#[tokio::test]
async fn document_is_never_accepted_before_name_and_phone() {
    let h = harness(RecordingGateway::default().with_document("d", b"doc".to_vec())).await;
    h.manager.handle(from("100", IntakeEvent::Start)).await;
    assert_eq!(
        h.manager
            .handle(from("100", document("thesis.pdf", 3, "d")))
            .await,
        Outcome::Ignored
    );
    h.manager.handle(from("100", text("Aziz"))).await;
    assert_eq!(
        h.manager
            .handle(from("100", document("thesis.pdf", 3, "d")))
            .await,
        Outcome::Ignored
    );
    assert!(uploaded_files(&h).is_empty());
}

// ── Multiple submitters ────────────────────────────────────────────────

#[tokio::test]
async fn same_second_different_submitters_get_distinct_files() {
    let h = harness(RecordingGateway::default().with_document("d", b"doc".to_vec())).await;
    reach_awaiting_file(&h, "100", "Aziz Karimov", "+998901234567").await;
    reach_awaiting_file(&h, "200", "Dilnoza Rahimova", "+998907654321").await;

    h.manager
        .handle(from("100", document("thesis.pdf", 3, "d")))
        .await;
    h.manager
        .handle(from("200", document("thesis.pdf", 3, "d")))
        .await;

    assert_eq!(
        uploaded_files(&h),
        vec![
            "20240115_120000_Aziz_Karimov.pdf",
            "20240115_120000_Dilnoza_Rahimova.pdf"
        ]
    );
    assert_eq!(h.gateway.forwards().len(), 2);
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn dispatcher_runs_submitters_independently_and_in_order() {
    let h = harness(RecordingGateway::default().with_document("d", b"doc".to_vec())).await;
    let mut dispatcher = Dispatcher::new(Arc::clone(&h.manager), Duration::from_secs(60));

    let flows = [
        ("100", "Aziz Karimov", "+998901234567"),
        ("200", "Dilnoza Rahimova", "+998907654321"),
    ];
    // Interleave the two conversations.
    for step in 0..4 {
        for (chat, name, phone) in flows {
            let event = match step {
                0 => IntakeEvent::Start,
                1 => text(name),
                2 => contact(phone),
                _ => document("thesis.docx", 3, "d"),
            };
            dispatcher.dispatch(from(chat, event));
        }
    }
    assert_eq!(dispatcher.active_workers(), 2);

    let manager = Arc::clone(&h.manager);
    let gateway = Arc::clone(&h.gateway);
    wait_until(|| {
        let manager = Arc::clone(&manager);
        let gateway = Arc::clone(&gateway);
        async move { manager.session_count().await == 0 && gateway.forwards().len() == 2 }
    })
    .await;

    assert_eq!(
        uploaded_files(&h),
        vec![
            "20240115_120000_Aziz_Karimov.docx",
            "20240115_120000_Dilnoza_Rahimova.docx"
        ]
    );
}

#[tokio::test]
async fn idle_worker_is_respawned_on_next_event() {
    let h = harness(RecordingGateway::default()).await;
    let mut dispatcher = Dispatcher::new(Arc::clone(&h.manager), Duration::from_millis(20));
    let chat = ChatId::from("100");

    dispatcher.dispatch(from("100", IntakeEvent::Start));
    let manager = Arc::clone(&h.manager);
    let c = chat.clone();
    wait_until(|| {
        let manager = Arc::clone(&manager);
        let c = c.clone();
        async move { manager.session(&c).await.is_some() }
    })
    .await;

    // Let the worker go idle and exit; the session itself survives.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(dispatcher.active_workers(), 0);

    dispatcher.dispatch(from("100", text("Aziz Karimov")));
    let c = chat.clone();
    wait_until(|| {
        let manager = Arc::clone(&manager);
        let c = c.clone();
        async move {
            manager
                .session(&c)
                .await
                .is_some_and(|s| s.state() == SessionState::AwaitingPhone)
        }
    })
    .await;
}
