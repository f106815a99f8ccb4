use super::*;
use crate::config::{ServerConfig, TransportConfig};
use crate::error::{IngestError, PersistenceError, StorageError};
use crate::events::{EventBus, SlingshotEvent};
use crate::persistence::{MemoryMessageStore, MessageRecord, MessageStore, NewMessage};
use crate::protocol::{ClientMessage, MessageSubmission, ServerMessage, ShotSubmission};
use crate::storage::tests::FailingStore;
use crate::storage::{ImageStore, LocalDiskStore, StorageChain};
use crate::transport::TransportSession;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const SELFIE: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUg==";

fn shot(name: &str, message: &str) -> ShotSubmission {
    ShotSubmission {
        name: Some(name.to_string()),
        message: Some(message.to_string()),
        selfie: Some(SELFIE.to_string()),
        force: Some(6.0),
        timestamp: Some(1_000),
    }
}

struct Fixture {
    _dir: TempDir,
    upload_dir: std::path::PathBuf,
    hub: Arc<IngestionHub>,
    store: Arc<MemoryMessageStore>,
    bus: EventBus,
}

fn fixture_with(stores: impl FnOnce(&std::path::Path) -> Vec<Arc<dyn ImageStore>>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let upload_dir = dir.path().join("uploads");
    let bus = EventBus::new(32);
    let chain = StorageChain::new(stores(&upload_dir)).with_event_bus(bus.clone());
    let store = Arc::new(MemoryMessageStore::new());
    let hub = Arc::new(IngestionHub::new(
        Arc::new(chain),
        store.clone() as Arc<dyn MessageStore>,
        bus.clone(),
    ));

    Fixture {
        _dir: dir,
        upload_dir,
        hub,
        store,
        bus,
    }
}

fn fixture() -> Fixture {
    fixture_with(|root| vec![Arc::new(LocalDiskStore::new(root, None)) as Arc<dyn ImageStore>])
}

fn state(fixture: &Fixture) -> HubState {
    HubState {
        hub: Arc::clone(&fixture.hub),
        max_message_bytes: 1_000_000,
        shutdown: CancellationToken::new(),
    }
}

/// Record store whose writes always fail
struct FailingMessageStore {
    inserts: AtomicUsize,
}

#[async_trait::async_trait]
impl MessageStore for FailingMessageStore {
    async fn insert(&self, _new: NewMessage) -> Result<MessageRecord, PersistenceError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Err(PersistenceError::Unavailable {
            details: "disk full".to_string(),
        })
    }

    async fn get(&self, id: &str) -> Result<MessageRecord, PersistenceError> {
        Err(PersistenceError::NotFound { id: id.to_string() })
    }

    async fn list(&self, _limit: Option<usize>) -> Result<Vec<MessageRecord>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn delete(&self, id: &str) -> Result<MessageRecord, PersistenceError> {
        Err(PersistenceError::NotFound { id: id.to_string() })
    }

    async fn count(&self) -> Result<usize, PersistenceError> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_shot_is_stored_persisted_and_broadcast() {
    let fx = fixture();
    let mut events = fx.bus.subscribe();

    let ack = fx.hub.handle_shot(shot("Ana", "Hello")).await.unwrap();

    let record = fx.store.get(&ack.message_id).await.unwrap();
    assert_eq!(record.user_name, "Ana");
    assert!(record.image_url.starts_with("/uploads/"));
    assert!(fx.upload_dir.join(&record.image_key).exists());

    match events.recv().await.unwrap() {
        SlingshotEvent::ShotDisplayed(display) => {
            assert_eq!(display.id, ack.message_id);
            assert_eq!(display.force, 6.0);
            assert_eq!(display.timestamp, 1_000);
            assert_eq!(display.image_url, record.image_url);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(fx.hub.stats().shots_ingested, 1);
}

#[tokio::test]
async fn test_shot_defaults_and_clamps_force() {
    let fx = fixture();
    let mut events = fx.bus.subscribe();

    let mut submission = shot("Ana", "Hi");
    submission.force = None;
    submission.timestamp = None;
    fx.hub.handle_shot(submission).await.unwrap();

    let mut strong = shot("Ben", "Hey");
    strong.force = Some(42.0);
    fx.hub.handle_shot(strong).await.unwrap();

    let forces: Vec<(f64, u64)> = (0..2)
        .map(|_| match events.try_recv().unwrap() {
            SlingshotEvent::ShotDisplayed(display) => (display.force, display.timestamp),
            other => panic!("unexpected event: {:?}", other),
        })
        .collect();

    assert_eq!(forces[0].0, DEFAULT_FORCE);
    assert!(forces[0].1 > 0);
    assert_eq!(forces[1].0, 10.0);
}

#[tokio::test]
async fn test_missing_field_is_rejected_without_side_effects() {
    let fx = fixture();
    let mut events = fx.bus.subscribe();

    let mut submission = shot("Ana", "");
    submission.selfie = None;
    let err = fx.hub.handle_shot(submission).await.unwrap_err();

    assert!(matches!(err, IngestError::Validation { .. }));
    assert_eq!(err.user_message(), "Missing required fields: message, selfie");
    assert_eq!(fx.store.count().await.unwrap(), 0);
    assert!(events.try_recv().is_err());
    assert!(!fx.upload_dir.exists() || std::fs::read_dir(&fx.upload_dir).unwrap().count() == 0);
    assert_eq!(fx.hub.stats().submissions_rejected, 1);
}

#[tokio::test]
async fn test_missing_field_replies_to_sender_only() {
    let fx = fixture();
    let state = state(&fx);
    let mut events = fx.bus.subscribe();

    let frame = serde_json::json!({
        "event": "shotFired",
        "data": { "name": "Ana", "selfie": SELFIE }
    })
    .to_string();

    let reply = connection::handle_text(&state, &frame).await.unwrap();
    assert_eq!(
        reply,
        ServerMessage::error("Missing required fields: message")
    );
    assert!(events.try_recv().is_err());
    assert_eq!(fx.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_undecodable_image_is_a_validation_error() {
    let fx = fixture();
    let mut submission = shot("Ana", "Hi");
    submission.selfie = Some("data:image/png;base64,%%%".to_string());

    let err = fx.hub.handle_shot(submission).await.unwrap_err();
    assert!(matches!(err, IngestError::Validation { .. }));
    assert_eq!(fx.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_object_outage_falls_back_to_local_disk() {
    let failing = Arc::new(FailingStore::new());
    let object = Arc::clone(&failing);
    let fx = fixture_with(move |root| {
        vec![
            object as Arc<dyn ImageStore>,
            Arc::new(LocalDiskStore::new(root, None)) as Arc<dyn ImageStore>,
        ]
    });
    let mut events = fx.bus.subscribe();

    let ack = fx.hub.handle_shot(shot("Ana", "Hello")).await.unwrap();

    let record = fx.store.get(&ack.message_id).await.unwrap();
    assert!(fx.upload_dir.join(&record.image_key).exists());
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hub.stats().storage_fallbacks, 1);

    let mut saw_fallback = false;
    let mut saw_shot = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SlingshotEvent::StorageFallback { from, to, .. } => {
                assert_eq!(from, "object");
                assert_eq!(to, "local");
                saw_fallback = true;
            }
            SlingshotEvent::ShotDisplayed(display) => {
                assert_eq!(display.id, ack.message_id);
                saw_shot = true;
            }
            _ => {}
        }
    }
    assert!(saw_fallback && saw_shot);
}

#[tokio::test]
async fn test_every_backend_failing_is_a_storage_error() {
    let fx = fixture_with(|_| vec![Arc::new(FailingStore::new()) as Arc<dyn ImageStore>]);
    let mut events = fx.bus.subscribe();

    let err = fx.hub.handle_shot(shot("Ana", "Hello")).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Storage(StorageError::AllBackendsFailed { .. })
    ));
    assert_eq!(err.user_message(), "Failed to store image");
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_persistence_failure_discards_image() {
    let dir = TempDir::new().unwrap();
    let upload_dir = dir.path().join("uploads");
    let bus = EventBus::new(16);
    let records = Arc::new(FailingMessageStore {
        inserts: AtomicUsize::new(0),
    });
    let hub = IngestionHub::new(
        Arc::new(StorageChain::new(vec![
            Arc::new(LocalDiskStore::new(&upload_dir, None)) as Arc<dyn ImageStore>
        ])),
        records.clone() as Arc<dyn MessageStore>,
        bus.clone(),
    );
    let mut events = bus.subscribe();

    let err = hub.handle_shot(shot("Ana", "Hello")).await.unwrap_err();

    assert!(matches!(err, IngestError::Persistence(_)));
    assert_eq!(err.user_message(), "Failed to save message");
    assert_eq!(records.inserts.load(Ordering::SeqCst), 1);
    assert!(events.try_recv().is_err());
    assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_legacy_message_flow() {
    let fx = fixture();
    let state = state(&fx);
    let mut events = fx.bus.subscribe();

    let submission = MessageSubmission {
        image: Some(SELFIE.to_string()),
        user_name: Some("Ana".to_string()),
        message: Some("Hello".to_string()),
    };
    let frame = ClientMessage::SendMessage(submission).to_text().unwrap();

    let reply = connection::handle_text(&state, &frame).await.unwrap();
    let ServerMessage::MessageSent(ack) = reply else {
        panic!("unexpected reply: {:?}", reply);
    };
    assert!(ack.success);

    match events.recv().await.unwrap() {
        SlingshotEvent::MessageReceived(view) => {
            assert_eq!(view.id, ack.message_id);
            assert_eq!(view.user_name, "Ana");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let missing = ClientMessage::SendMessage(MessageSubmission::default())
        .to_text()
        .unwrap();
    let reply = connection::handle_text(&state, &missing).await.unwrap();
    assert_eq!(
        reply,
        ServerMessage::error("Missing required fields: image, userName, message")
    );
}

#[tokio::test]
async fn test_get_messages_returns_newest_first() {
    let fx = fixture();
    let state = state(&fx);

    for name in ["Ana", "Ben", "Cy"] {
        fx.hub.handle_shot(shot(name, "Hi")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let frame = ClientMessage::GetMessages.to_text().unwrap();
    let reply = connection::handle_text(&state, &frame).await.unwrap();
    let ServerMessage::AllMessages(list) = reply else {
        panic!("unexpected reply: {:?}", reply);
    };
    let names: Vec<&str> = list.messages.iter().map(|m| m.user_name.as_str()).collect();
    assert_eq!(names, vec!["Cy", "Ben", "Ana"]);
}

#[tokio::test]
async fn test_malformed_and_unknown_frames() {
    let fx = fixture();
    let state = state(&fx);

    let reply = connection::handle_text(&state, "not json").await.unwrap();
    assert_eq!(reply, ServerMessage::error("Invalid payload"));

    let unknown = r#"{"event":"wave","data":{}}"#;
    assert!(connection::handle_text(&state, unknown).await.is_none());
    assert_eq!(fx.hub.stats().submissions_rejected, 1);
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn server(fx: &Fixture) -> HubServer {
    HubServerBuilder::new()
        .config(ServerConfig::default())
        .hub(Arc::clone(&fx.hub))
        .upload_dir(&fx.upload_dir)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_rest_list_get_and_delete() {
    let fx = fixture();
    let ack = fx.hub.handle_shot(shot("Ana", "Hello")).await.unwrap();
    let router = server(&fx).router();

    let response = router
        .clone()
        .oneshot(Request::get("/api/messages").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"][0]["id"], ack.message_id.as_str());
    assert_eq!(body["data"][0]["userName"], "Ana");

    let uri = format!("/api/messages/{}", ack.message_id);
    let response = router
        .clone()
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"], "Message deleted");
    assert_eq!(fx.store.count().await.unwrap(), 0);

    let response = router
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Message not found");
}

#[tokio::test]
async fn test_health_reports_stats() {
    let fx = fixture();
    fx.hub.handle_shot(shot("Ana", "Hello")).await.unwrap();

    let response = server(&fx)
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "Server is running");
    assert_eq!(body["stats"]["shots_ingested"], 1);
}

#[tokio::test]
async fn test_builder_requires_hub() {
    assert!(HubServerBuilder::new()
        .config(ServerConfig::default())
        .upload_dir("/tmp")
        .build()
        .is_err());
}

async fn next_frame(
    events: &mut tokio::sync::broadcast::Receiver<ServerMessage>,
    want: impl Fn(&ServerMessage) -> bool,
) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frame = events.recv().await.unwrap();
            if want(&frame) {
                return frame;
            }
        }
    })
    .await
    .expect("frame should arrive")
}

#[tokio::test]
async fn test_sender_shot_reaches_display_over_websocket() {
    let fx = fixture();
    let shutdown = CancellationToken::new();
    let config = ServerConfig {
        ip: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = HubServerBuilder::new()
        .config(config)
        .hub(Arc::clone(&fx.hub))
        .upload_dir(&fx.upload_dir)
        .shutdown(shutdown.clone())
        .build()
        .unwrap();
    let (addr, handle) = server.spawn().await.unwrap();

    let transport = TransportConfig {
        url: format!("ws://{}/ws", addr),
        reconnect_delay_ms: 50,
        max_reconnect_attempts: 3,
        connect_timeout_ms: 2_000,
    };
    let display = TransportSession::connect(&transport);
    let sender = TransportSession::connect(&transport);
    let mut display_events = display.events();
    let mut sender_events = sender.events();
    display.wait_connected().await.unwrap();
    sender.wait_connected().await.unwrap();

    // Server side subscribes once the upgrade completes
    tokio::time::timeout(Duration::from_secs(5), async {
        while fx.bus.subscriber_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    sender
        .send(&ClientMessage::ShotFired(shot("Ana", "Hello")))
        .await
        .unwrap();

    let ack = next_frame(&mut sender_events, |f| matches!(f, ServerMessage::ShotSuccess(_))).await;
    let shown = next_frame(&mut display_events, |f| matches!(f, ServerMessage::DisplayShot(_))).await;

    let (ServerMessage::ShotSuccess(ack), ServerMessage::DisplayShot(shown)) = (ack, shown) else {
        unreachable!();
    };
    assert_eq!(ack.message_id, shown.id);
    assert_eq!(shown.user_name, "Ana");

    // The stored image is served under /uploads
    let key = shown.image_url.trim_start_matches("/uploads/");
    let response = server_get(addr, &format!("/uploads/{}", key)).await;
    assert!(response.starts_with("HTTP/1.1 200"));

    sender.close().await;
    display.close().await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

/// Minimal HTTP/1.1 GET returning the raw response head
async fn server_get(addr: std::net::SocketAddr, path: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).to_string()
}
