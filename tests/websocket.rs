// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

use std::future::IntoFuture;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use sitewatch::core::Event;
use sitewatch::{server, AppState, Config, Engine};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("receive failed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_for_clients(state: &AppState, expected: usize) {
    for _ in 0..200 {
        if state.broadcast.connected_clients() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} clients, have {}",
        expected,
        state.broadcast.connected_clients()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn dashboard_receives_ack_pong_and_events() {
    let dir = tempdir().unwrap();
    let config = Config::default().with_data_dir(dir.path());
    let mut engine = Engine::new(config).unwrap().with_sensors(false, false);
    engine.start().unwrap();
    let state = engine.app_state();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(
        axum::serve(listener, server::app(state.clone()))
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .into_future(),
    );

    let (mut client, _) = connect_async(format!("ws://{}/ws/dashboard", addr))
        .await
        .unwrap();

    let ack = next_json(&mut client).await;
    assert_eq!(ack["type"], "connection");
    assert_eq!(ack["status"], "connected");
    assert!(ack["timestamp"].is_string());
    wait_for_clients(&state, 1).await;

    assert!(engine.sender().try_push(Event::noise_level(101.0, 85.0)));
    let event = next_json(&mut client).await;
    assert_eq!(event["source"], "audio");
    assert_eq!(event["type"], "noise_level");
    assert_eq!(event["alert"], true);

    client.send(Message::Text("ping".into())).await.unwrap();
    let pong = next_json(&mut client).await;
    assert_eq!(pong["type"], "pong");

    client.close(None).await.unwrap();
    wait_for_clients(&state, 0).await;

    let _ = stop_tx.send(());
    server.await.unwrap().unwrap();
    engine.shutdown().await.unwrap();

    let recent = engine.logger().get_recent(1).unwrap();
    assert_eq!(recent[0].event_type, "noise_level");
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_closes_connected_dashboards() {
    let dir = tempdir().unwrap();
    let config = Config::default().with_data_dir(dir.path());
    let mut engine = Engine::new(config).unwrap().with_sensors(false, false);
    engine.start().unwrap();
    let state = engine.app_state();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(axum::serve(listener, server::app(state.clone())).into_future());

    let (mut client, _) = connect_async(format!("ws://{}/ws/dashboard", addr))
        .await
        .unwrap();
    assert_eq!(next_json(&mut client).await["type"], "connection");
    wait_for_clients(&state, 1).await;

    engine.shutdown().await.unwrap();
    assert_eq!(state.broadcast.connected_clients(), 0);

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = client.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => continue,
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);

    server.abort();
}
