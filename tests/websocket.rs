mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use classsight_lib::models::Origin;
use classsight_lib::pipeline::Pipeline;
use classsight_lib::server::AppState;
use classsight_lib::settings::AppConfig;
use classsight_lib::stream::{ServerMessage, SessionRegistry};

use common::{kinds, pipeline, png_frame, serve, FakeModel, FakeRecognizer};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(shared: Arc<Pipeline>) -> (SocketAddr, SessionRegistry) {
    let registry = SessionRegistry::new();
    let state = AppState::new(shared, registry.clone(), Arc::new(AppConfig::default()));
    (serve(state).await, registry)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws/stream")).await.unwrap();
    client
}

async fn send_frame(client: &mut Client, shade: u8) {
    let frame = png_frame(64, 32, shade);
    client.send(Message::Binary(frame.to_vec())).await.unwrap();
}

async fn next_message(client: &mut Client) -> ServerMessage {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("message within timeout")
            .expect("socket open")
            .expect("readable frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn until_terminal(client: &mut Client) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    loop {
        let message = next_message(client).await;
        let done = message.is_terminal();
        messages.push(message);
        if done {
            return messages;
        }
    }
}

async fn wait_for_sessions(registry: &SessionRegistry, expected: usize) {
    timeout(Duration::from_secs(5), async {
        while registry.active_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {expected} active session(s)"));
}

#[tokio::test]
async fn frames_stream_every_stage_then_hit_the_cache() {
    let recognizer = FakeRecognizer::new(&[("E = mc²", 0.95)]);
    let model = FakeModel::answering("Mass and energy are equivalent.");
    let (addr, _registry) = start(pipeline(recognizer.clone(), model, true)).await;
    let mut client = connect(addr).await;

    send_frame(&mut client, 1).await;
    let first = until_terminal(&mut client).await;
    assert_eq!(
        kinds(&first),
        vec!["status", "recognition-result", "explanation-result", "complete"]
    );

    send_frame(&mut client, 1).await;
    let again = until_terminal(&mut client).await;
    assert_eq!(kinds(&again), vec!["status", "complete"]);
    match &again[1] {
        ServerMessage::Complete(payload) => {
            assert_eq!(payload.origin, Origin::Cache);
            assert_eq!(payload.result.recognition.combined_text, "E = mc²");
        }
        other => panic!("expected complete, got {}", other.kind()),
    }
    assert_eq!(recognizer.calls(), 1);
}

#[tokio::test]
async fn text_and_garbage_messages_are_rejected() {
    let recognizer = FakeRecognizer::new(&[("ok", 0.9)]);
    let (addr, _registry) = start(pipeline(recognizer, FakeModel::answering("x"), true)).await;
    let mut client = connect(addr).await;

    client.send(Message::Text("hello".into())).await.unwrap();
    assert_eq!(kinds(&until_terminal(&mut client).await), vec!["error"]);

    client
        .send(Message::Binary(b"definitely not an image".to_vec()))
        .await
        .unwrap();
    assert_eq!(kinds(&until_terminal(&mut client).await), vec!["error"]);

    send_frame(&mut client, 2).await;
    let messages = until_terminal(&mut client).await;
    assert_eq!(messages.last().map(ServerMessage::kind), Some("complete"));
}

#[tokio::test]
async fn bursts_are_queued_rather_than_dropped() {
    let recognizer = FakeRecognizer::slow(&[("slide", 0.9)], Duration::from_millis(40));
    let (addr, _registry) = start(pipeline(recognizer.clone(), FakeModel::answering("x"), true)).await;
    let mut client = connect(addr).await;

    const BURST: u8 = 8;
    for shade in 0..BURST {
        send_frame(&mut client, 10 + shade).await;
    }

    let mut terminals = Vec::new();
    while terminals.len() < BURST as usize {
        let message = next_message(&mut client).await;
        if message.is_terminal() {
            terminals.push(message.kind());
        }
    }
    assert!(terminals.iter().all(|kind| *kind == "complete"), "{terminals:?}");
    assert_eq!(recognizer.calls(), BURST as usize);
}

#[tokio::test]
async fn disconnect_releases_the_session() {
    let recognizer = FakeRecognizer::new(&[("bye", 0.9)]);
    let (addr, registry) = start(pipeline(recognizer, FakeModel::answering("x"), true)).await;

    let mut client = connect(addr).await;
    wait_for_sessions(&registry, 1).await;

    send_frame(&mut client, 3).await;
    until_terminal(&mut client).await;

    client.close(None).await.unwrap();
    wait_for_sessions(&registry, 0).await;

    let health: serde_json::Value = reqwest::get(format!("http://{addr}/api/ocr/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["active_sessions"], 0);
}
