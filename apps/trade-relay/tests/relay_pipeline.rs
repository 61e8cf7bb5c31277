//! Relay Pipeline Integration Tests
//!
//! Runs the full relay against a scripted local websocket upstream and a
//! recording broker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use trade_relay::application::ports::{
    BrokerPublisher, NoopTelemetry, PublishError, RelayTelemetry,
};
use trade_relay::application::services::SubscribeError;
use trade_relay::{
    BackpressurePolicy, BinanceCodec, DecodePolicy, DispatchConfig, HealthSnapshot,
    PublishDispatcher, PublishRecord, RelayError, RelayHealth, RestartConfig, SessionSettings,
    SessionSupervisor, SubscriptionManager, SubscriptionSet, TickRelay, TopicTemplate,
    WsConnector,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker that records everything except records for `trades-ethusdt`.
#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<PublishRecord>>,
}

#[async_trait]
impl BrokerPublisher for RecordingPublisher {
    async fn publish(&self, records: &[PublishRecord]) -> Result<(), PublishError> {
        if let Some(rejected) = records.iter().find(|r| r.topic == "trades-ethusdt") {
            return Err(PublishError::AttemptsExhausted {
                topic: rejected.topic.clone(),
                attempts: 3,
                last_error: "broker unavailable".to_string(),
            });
        }
        self.published.lock().extend_from_slice(records);
        Ok(())
    }
}

impl RecordingPublisher {
    fn keys(&self) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .map(|r| r.key_str().into_owned())
            .collect()
    }
}

fn text(frame: &str) -> Message {
    Message::Text(frame.into())
}

/// Accept one connection, read the subscribe request, send `replies`, then
/// collect everything the client sends until it closes.
async fn scripted_session(listener: &TcpListener, replies: Vec<Message>) -> Vec<Message> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();

    let mut received = vec![ws.next().await.unwrap().unwrap()];
    for reply in replies {
        let _ = ws.send(reply).await;
    }

    while let Some(Ok(message)) = ws.next().await {
        let is_close = matches!(message, Message::Close(_));
        received.push(message);
        if is_close {
            break;
        }
    }
    received
}

struct Relay {
    supervisor: SessionSupervisor<WsConnector>,
    health: Arc<RelayHealth>,
    publisher: Arc<RecordingPublisher>,
}

fn build_relay(url: String, restart: RestartConfig) -> Relay {
    let health = Arc::new(RelayHealth::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let telemetry: Arc<dyn RelayTelemetry> = Arc::new(NoopTelemetry);

    let dispatcher = Arc::new(PublishDispatcher::start(
        &DispatchConfig {
            workers: 1,
            queue_capacity: 100,
            backpressure: BackpressurePolicy::Block,
        },
        Arc::clone(&publisher) as Arc<dyn BrokerPublisher>,
        Arc::clone(&telemetry),
        Arc::clone(&health),
    ));
    let relay = Arc::new(TickRelay::new(
        Arc::new(BinanceCodec::new()),
        Arc::clone(&dispatcher),
        TopicTemplate::default(),
        DecodePolicy::Skip,
        Arc::clone(&health),
        Arc::clone(&telemetry),
    ));
    let manager = SubscriptionManager::new(
        WsConnector::new(),
        SessionSettings {
            url,
            ..SessionSettings::default()
        },
        SubscriptionSet::new(["btcusdt", "ethusdt"]).unwrap(),
        relay,
        Arc::clone(&health),
        telemetry,
    );

    Relay {
        supervisor: SessionSupervisor::new(manager, restart, dispatcher, Duration::from_secs(2)),
        health,
        publisher,
    }
}

async fn wait_for(health: &RelayHealth, done: impl Fn(&HealthSnapshot) -> bool) {
    timeout(TEST_TIMEOUT, async {
        while !done(&health.snapshot()) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("relay did not reach the expected state");
}

fn control_request(message: &Message) -> Value {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected control request, got {other:?}"),
    }
}

#[tokio::test]
async fn relays_ticks_and_unsubscribes_on_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let upstream = tokio::spawn(async move {
        scripted_session(
            &listener,
            vec![
                text(r#"{"result":null,"id":1}"#),
                Message::Ping(b"hb".to_vec().into()),
                text(r#"{"e":"aggTrade","s":"BTCUSDT","p":"61234.50","q":"0.015","T":1}"#),
                text(r#"{"e":"aggTrade","s":"ETHUSDT","p":"3000.1","q":"5","T":2}"#),
                text("not json"),
                text(r#"{"stream":"btcusdt@aggTrade","data":{"s":"BTCUSDT","p":"61235","q":"1","T":3}}"#),
            ],
        )
        .await
    });

    let Relay {
        mut supervisor,
        health,
        publisher,
    } = build_relay(url, RestartConfig::disabled());
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { supervisor.run(cancel).await }
    });

    wait_for(&health, |s| {
        s.ticks_published == 2 && s.publish_failures == 1 && s.decode_failures == 1
    })
    .await;
    cancel.cancel();

    timeout(TEST_TIMEOUT, run).await.unwrap().unwrap().unwrap();
    let received = timeout(TEST_TIMEOUT, upstream).await.unwrap().unwrap();

    assert_eq!(publisher.keys(), vec!["BTCUSDT-1", "BTCUSDT-3"]);

    let snapshot = health.snapshot();
    assert_eq!(snapshot.probes_answered, 1);
    assert_eq!(snapshot.ticks_decoded, 3);
    assert_eq!(snapshot.state.as_str(), "closed");

    assert_eq!(received.len(), 4, "{received:?}");

    let subscribe = control_request(&received[0]);
    assert_eq!(subscribe["method"], "SUBSCRIBE");
    assert_eq!(subscribe["id"], 1);
    assert_eq!(
        subscribe["params"],
        serde_json::json!(["btcusdt@aggTrade", "ethusdt@aggTrade"])
    );

    assert!(
        matches!(&received[1], Message::Pong(payload) if payload.as_ref() == b"hb"),
        "ping must be answered before anything else: {:?}",
        received[1]
    );

    let unsubscribe = control_request(&received[2]);
    assert_eq!(unsubscribe["method"], "UNSUBSCRIBE");
    assert_eq!(unsubscribe["id"], 2);

    assert!(matches!(received[3], Message::Close(_)));
}

#[tokio::test]
async fn rejected_subscription_ends_relay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let upstream = tokio::spawn(async move {
        scripted_session(
            &listener,
            vec![text(
                r#"{"error":{"code":-1121,"msg":"Invalid symbol."},"id":1}"#,
            )],
        )
        .await
    });

    let Relay {
        mut supervisor,
        health,
        ..
    } = build_relay(url, RestartConfig::disabled());

    let err = timeout(TEST_TIMEOUT, supervisor.run(CancellationToken::new()))
        .await
        .unwrap()
        .unwrap_err();

    assert!(
        matches!(
            err,
            RelayError::Subscribe(SubscribeError::Rejected { code: -1121, .. })
        ),
        "{err:?}"
    );
    assert_eq!(health.snapshot().ticks_published, 0);

    let received = timeout(TEST_TIMEOUT, upstream).await.unwrap().unwrap();
    assert!(matches!(received.last(), Some(Message::Close(_))));
}

#[tokio::test]
async fn dropped_session_is_restarted_on_a_new_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let upstream = tokio::spawn(async move {
        // First session: acknowledge, then drop the TCP connection.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ = ws.next().await;
        let _ = ws.send(text(r#"{"result":null,"id":1}"#)).await;
        drop(ws);

        scripted_session(
            &listener,
            vec![
                text(r#"{"result":null,"id":1}"#),
                text(r#"{"s":"BTCUSDT","p":"1","q":"1","T":7}"#),
            ],
        )
        .await
    });

    let restart = RestartConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RestartConfig::default()
    };
    let Relay {
        mut supervisor,
        health,
        publisher,
    } = build_relay(url, restart);
    let handle = supervisor.handle();
    let run = tokio::spawn(async move { supervisor.run(CancellationToken::new()).await });

    wait_for(&health, |s| s.ticks_published == 1).await;
    handle.shutdown();

    timeout(TEST_TIMEOUT, run).await.unwrap().unwrap().unwrap();
    timeout(TEST_TIMEOUT, upstream).await.unwrap().unwrap();

    assert_eq!(health.snapshot().sessions_started, 2);
    assert_eq!(publisher.keys(), vec!["BTCUSDT-7"]);
}
