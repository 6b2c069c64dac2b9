use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::common::{TestApp, routes};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(app: &TestApp, token: &str) -> Socket {
    let url = format!(
        "ws://{}{}?token={token}",
        app.addr,
        routes::GENERATIONS_LIVE
    );
    let (socket, _) = connect_async(url).await.expect("WebSocket handshake failed");
    socket
}

/// Next feed snapshot pushed on the socket.
async fn next_snapshot(socket: &mut Socket) -> Vec<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("No live feed frame within 5s")
            .expect("Live feed closed")
            .expect("Live feed error");
        if let Message::Text(text) = frame {
            let feed: Value = serde_json::from_str(&text).unwrap();
            return feed.as_array().unwrap().clone();
        }
    }
}

mod live_feed {
    use super::*;

    #[tokio::test]
    async fn sends_the_feed_on_connect() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let id = app.create_generation(&token, "meadow").await;

        let mut socket = connect(&app, &token).await;
        let feed = next_snapshot(&mut socket).await;

        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn pushes_the_job_until_it_completes() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let mut socket = connect(&app, &token).await;
        assert!(next_snapshot(&mut socket).await.is_empty());

        let id = app.create_generation(&token, "meadow").await;

        loop {
            let feed = next_snapshot(&mut socket).await;
            assert_eq!(feed.len(), 1);
            assert_eq!(feed[0]["id"], id.as_str());
            if feed[0]["status"] == "Completed" {
                assert!(feed[0]["result_image_url"].is_string());
                break;
            }
            assert_eq!(feed[0]["status"], "Processing");
        }
    }

    #[tokio::test]
    async fn other_owners_changes_are_not_pushed() {
        let app = TestApp::spawn().await;
        let alice = app.token_for("alice");
        let bob = app.token_for("bob");
        let mut socket = connect(&app, &alice).await;
        assert!(next_snapshot(&mut socket).await.is_empty());

        app.create_generation(&bob, "bob's").await;
        let alices = app.create_generation(&alice, "alice's").await;

        let feed = next_snapshot(&mut socket).await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0]["id"], alices.as_str());
    }

    #[tokio::test]
    async fn handshake_without_token_is_rejected() {
        let app = TestApp::spawn().await;
        let url = format!("ws://{}{}", app.addr, routes::GENERATIONS_LIVE);

        match connect_async(url).await {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 401);
            }
            Err(e) => panic!("unexpected handshake error: {e}"),
            Ok(_) => panic!("handshake without token must fail"),
        }
    }
}
