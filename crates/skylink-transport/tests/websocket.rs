//! Integration tests for the WebSocket client transport.
//!
//! These tests spin up a real `tokio-tungstenite` server on a random
//! port and point the transport at it, so the handshake, frame delivery
//! and close codes are exercised over an actual socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use skylink_transport::{
        CloseCode, EventSink, Transport, TransportEvent, WebSocketTransport,
    };
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on an OS-assigned port and returns it with its URL.
    async fn bind_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}"))
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    }

    /// An event sink that forwards into a channel the test can await.
    fn channel_sink() -> (EventSink, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(move |ev| {
            let _ = tx.send(ev);
        });
        (sink, rx)
    }

    async fn next_event(
        rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event should arrive in time")
            .expect("sink should stay alive")
    }

    #[tokio::test]
    async fn test_websocket_open_send_and_receive() {
        let (listener, url) = bind_server().await;
        let transport = WebSocketTransport::current().expect("inside runtime");
        let (sink, mut events) = channel_sink();

        let conn = transport.open(&url, sink).expect("open should start");
        let mut server = accept(&listener).await;

        assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

        // Client → server.
        conn.send(r#"{"type":"ping"}"#).expect("send should queue");
        let msg = server.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"type":"ping"}"#);

        // Server → client, text and binary both surface as frames.
        server
            .send(Message::text(r#"{"type":"pong"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Frame(r#"{"type":"pong"}"#.into())
        );

        server
            .send(Message::Binary(b"{\"type\":\"risk_alert\"}".to_vec().into()))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Frame(r#"{"type":"risk_alert"}"#.into())
        );
    }

    #[tokio::test]
    async fn test_websocket_peer_close_reports_code() {
        let (listener, url) = bind_server().await;
        let transport = WebSocketTransport::current().unwrap();
        let (sink, mut events) = channel_sink();

        let _conn = transport.open(&url, sink).unwrap();
        let mut server = accept(&listener).await;
        assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

        server
            .send(Message::Close(Some(CloseFrame {
                code: WsCloseCode::Away,
                reason: "restarting".to_string().into(),
            })))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Closed {
                code: CloseCode::GOING_AWAY,
                reason: "restarting".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_websocket_client_close_sends_close_frame() {
        let (listener, url) = bind_server().await;
        let transport = WebSocketTransport::current().unwrap();
        let (sink, mut events) = channel_sink();

        let conn = transport.open(&url, sink).unwrap();
        let mut server = accept(&listener).await;
        assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

        conn.close(CloseCode::NORMAL, "bye");

        let msg = server.next().await.unwrap().unwrap();
        match msg {
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 1000);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("expected close frame, got {other:?}"),
        }

        // Sends after close are rejected once the task has exited.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(conn.send("late").is_err());
    }

    #[tokio::test]
    async fn test_websocket_refused_connection_reports_error() {
        // Bind then drop to get a port nobody is listening on.
        let (listener, url) = bind_server().await;
        drop(listener);

        let transport = WebSocketTransport::current().unwrap();
        let (sink, mut events) = channel_sink();
        let _conn = transport.open(&url, sink).expect("open only starts");

        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_websocket_silent_server_times_out_handshake() {
        let (listener, url) = bind_server().await;
        // Accept TCP and then say nothing.
        let held = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("should accept");
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let transport = WebSocketTransport::current()
            .unwrap()
            .with_handshake_timeout(Duration::from_millis(200));
        let (sink, mut events) = channel_sink();
        let _conn = transport.open(&url, sink).expect("open only starts");

        match next_event(&mut events).await {
            TransportEvent::Error(message) => {
                assert!(message.contains("handshake timed out"), "{message}");
            }
            other => panic!("expected handshake error, got {other:?}"),
        }
        held.abort();
    }

    #[tokio::test]
    async fn test_websocket_client_close_completes_handshake() {
        let (listener, url) = bind_server().await;
        let transport = WebSocketTransport::current().unwrap();
        let (sink, mut events) = channel_sink();

        let conn = transport.open(&url, sink).unwrap();
        let mut server = accept(&listener).await;
        assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

        conn.close(CloseCode::NORMAL, "bye");
        assert!(matches!(
            server.next().await,
            Some(Ok(Message::Close(Some(_))))
        ));

        // Reading on flushes our close reply; the client then finishes the
        // handshake and the server sees a clean end of stream.
        let after = tokio::time::timeout(Duration::from_secs(5), server.next())
            .await
            .expect("client should finish closing");
        assert!(after.is_none(), "expected clean close, got {after:?}");
    }

    #[test]
    fn test_websocket_current_without_runtime_fails() {
        assert!(WebSocketTransport::current().is_err());
    }
}
