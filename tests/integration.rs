//! Integration tests for neboloop-comms.
//!
//! These drive a real `Client` against an in-process mock gateway speaking
//! the binary frame protocol over WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use neboloop_comms::codec::JsonCodec;
use neboloop_comms::protocol::messages::{
    AckPayload, AuthFailPayload, AuthOkPayload, ConnectPayload, JoinPayload, SendMessagePayload,
};
use neboloop_comms::protocol::{decode_frame, encode_frame, MAX_PAYLOAD_SIZE};
use neboloop_comms::{
    ChannelMessage, Client, ClientBuilder, CommsError, ConnState, Config, ConversationId,
    Credential, Frame, FrameType, TaskSubmission,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type Ws = WebSocketStream<TcpStream>;

const STEP: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn gateway() -> (TcpListener, Config) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Config::new(
        format!("http://{addr}/ws"),
        "bot-1",
        Credential::Token("secret".into()),
    );
    (listener, config)
}

fn builder(config: Config) -> ClientBuilder {
    Client::builder(config)
        .heartbeat_interval(Duration::ZERO)
        .reconnect_backoff(Duration::from_millis(10), Duration::from_millis(50))
}

async fn accept(listener: &TcpListener) -> Ws {
    let (tcp, _) = tokio::time::timeout(STEP, listener.accept())
        .await
        .expect("client never dialed")
        .unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

async fn recv_frame(ws: &mut Ws) -> Frame {
    loop {
        let message = tokio::time::timeout(STEP, ws.next())
            .await
            .expect("no frame from client")
            .expect("client hung up")
            .unwrap();
        if let Message::Binary(data) = message {
            return decode_frame(&data).unwrap();
        }
    }
}

async fn send_frame(ws: &mut Ws, frame: &Frame) {
    ws.send(Message::Binary(encode_frame(frame).unwrap().into()))
        .await
        .unwrap();
}

fn json_frame<T: serde::Serialize>(
    frame_type: FrameType,
    conversation_id: ConversationId,
    seq: u64,
    payload: &T,
) -> Frame {
    Frame::new(frame_type, conversation_id, seq, JsonCodec::encode(payload).unwrap())
}

/// Accept a dial, check CONNECT, reply AUTH_OK.
async fn accept_authed(listener: &TcpListener, session_id: &str) -> Ws {
    let mut ws = accept(listener).await;
    let connect = recv_frame(&mut ws).await;
    assert_eq!(connect.frame_type, FrameType::Connect);

    let ok = AuthOkPayload {
        ok: true,
        bot_id: Some("bot-1".into()),
        session_id: session_id.into(),
    };
    send_frame(&mut ws, &json_frame(FrameType::AuthOk, ConversationId::nil(), 0, &ok)).await;
    ws
}

fn channel_delivery(conversation_id: ConversationId, seq: u64, text: &str) -> Frame {
    let envelope = serde_json::json!({
        "sender_id": "user-9",
        "content_type": "channel",
        "content": {"channel_type": "telegram", "text": text},
    });
    json_frame(FrameType::MessageDelivery, conversation_id, seq, &envelope)
}

async fn wait_for_state(client: &Client, state: ConnState) {
    let deadline = tokio::time::Instant::now() + STEP;
    while client.state() != state {
        assert!(
            tokio::time::Instant::now() < deadline,
            "client stuck in {:?}, wanted {state:?}",
            client.state()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_auth_ok_connects() {
    init_tracing();
    let (listener, config) = gateway().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let connect = recv_frame(&mut ws).await;
        let payload: ConnectPayload = JsonCodec::decode(connect.payload()).unwrap();
        let ok = AuthOkPayload {
            ok: true,
            bot_id: None,
            session_id: "sess-1".into(),
        };
        send_frame(&mut ws, &json_frame(FrameType::AuthOk, ConversationId::nil(), 0, &ok)).await;
        (payload, ws)
    });

    let client = builder(config.with_device_id("dev-1")).connect().await.unwrap();
    let (connect, _ws) = server.await.unwrap();

    assert!(client.is_connected());
    assert_eq!(client.state(), ConnState::Connected);
    assert_eq!(client.session_id().as_deref(), Some("sess-1"));
    assert_eq!(connect.bot_id, "bot-1");
    assert_eq!(connect.credential, "secret");
    assert_eq!(connect.device_id.as_deref(), Some("dev-1"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_auth_fail_is_returned() {
    init_tracing();
    let (listener, config) = gateway().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        recv_frame(&mut ws).await;
        let fail = AuthFailPayload {
            reason: "invalid token".into(),
            code: "AUTH_INVALID".into(),
        };
        send_frame(&mut ws, &json_frame(FrameType::AuthFail, ConversationId::nil(), 0, &fail)).await;
        tokio::time::timeout(Duration::from_millis(300), listener.accept())
            .await
            .is_err()
    });

    match builder(config).connect().await {
        Err(CommsError::Auth { reason, code }) => {
            assert_eq!(reason, "invalid token");
            assert_eq!(code, "AUTH_INVALID");
        }
        other => panic!("expected auth error, got {other:?}"),
    }
    assert!(server.await.unwrap(), "client redialed after AUTH_FAIL");
}

#[tokio::test]
async fn test_unexpected_auth_reply() {
    init_tracing();
    let (listener, config) = gateway().await;

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        recv_frame(&mut ws).await;
        let presence = serde_json::json!({"status": "online"});
        send_frame(&mut ws, &json_frame(FrameType::Presence, ConversationId::nil(), 0, &presence)).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let err = builder(config).connect().await.unwrap_err();
    assert!(matches!(err, CommsError::Protocol(_)), "got {err:?}");
}

#[tokio::test]
async fn test_auth_ok_without_session_is_refused() {
    init_tracing();
    let (listener, config) = gateway().await;

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        recv_frame(&mut ws).await;
        let not_ok = serde_json::json!({"ok": false});
        send_frame(&mut ws, &json_frame(FrameType::AuthOk, ConversationId::nil(), 0, &not_ok)).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let err = builder(config).connect().await.unwrap_err();
    assert!(matches!(err, CommsError::Protocol(_)), "got {err:?}");
}

#[tokio::test]
async fn test_connect_timeout() {
    init_tracing();
    let (listener, config) = gateway().await;

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        recv_frame(&mut ws).await;
        // Never reply.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let err = builder(config)
        .connect_timeout(Duration::from_millis(200))
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err, CommsError::ConnectTimeout), "got {err:?}");
}

#[tokio::test]
async fn test_channel_delivery_is_routed_and_acked_once() {
    init_tracing();
    let (listener, config) = gateway().await;
    let conv = ConversationId::new_v4();
    let delivery = channel_delivery(conv, 5, "hi");
    let message_id = delivery.message_id;

    let server = tokio::spawn(async move {
        let mut ws = accept_authed(&listener, "s-1").await;
        send_frame(&mut ws, &delivery).await;

        let ack = recv_frame(&mut ws).await;
        let extra = tokio::time::timeout(Duration::from_millis(300), recv_frame(&mut ws)).await;
        (ack, extra.is_err(), ws)
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder(config)
        .on_channel_message(move |msg: ChannelMessage, _client| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg);
                Ok(())
            }
        })
        .connect()
        .await
        .unwrap();

    let msg = tokio::time::timeout(STEP, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.channel_type, "telegram");
    assert_eq!(msg.text, "hi");
    assert_eq!(msg.meta.conversation_id, conv);
    assert_eq!(msg.meta.message_id, message_id);
    assert_eq!(msg.meta.sender_id, "user-9");
    assert_eq!(msg.meta.seq, 5);

    let (ack, no_second_ack, _ws) = server.await.unwrap();
    assert_eq!(ack.frame_type, FrameType::Ack);
    assert_eq!(ack.conversation_id, conv);
    assert_eq!(ack.seq, 5);
    let payload: AckPayload = JsonCodec::decode(ack.payload()).unwrap();
    assert_eq!(payload.acked_seq, 5);
    assert_eq!(payload.conversation_id, Some(conv.to_hex()));
    assert!(no_second_ack, "expected exactly one ACK");

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_unrouted_delivery_is_still_acked() {
    init_tracing();
    let (listener, config) = gateway().await;
    let conv = ConversationId::new_v4();

    let server = tokio::spawn(async move {
        let mut ws = accept_authed(&listener, "s-1").await;
        let envelope = serde_json::json!({
            "sender_id": "x",
            "content_type": "weather_report",
            "content": {"temp": 21},
        });
        send_frame(&mut ws, &json_frame(FrameType::MessageDelivery, conv, 11, &envelope)).await;
        let ack = recv_frame(&mut ws).await;
        (ack, ws)
    });

    let client = builder(config).connect().await.unwrap();
    let (ack, _ws) = server.await.unwrap();

    assert_eq!(ack.frame_type, FrameType::Ack);
    assert_eq!(ack.seq, 11);
    assert_eq!(client.last_acked(&conv), Some(11));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_rejoins_with_last_acks() {
    init_tracing();
    let (listener, config) = gateway().await;
    let conv_a = ConversationId::new_v4();
    let conv_b = ConversationId::new_v4();

    let server = tokio::spawn(async move {
        let mut ws = accept_authed(&listener, "s-1").await;
        for (conv, seq) in [(conv_a, 1), (conv_b, 7), (conv_a, 2), (conv_a, 3)] {
            send_frame(&mut ws, &channel_delivery(conv, seq, "x")).await;
            let ack = recv_frame(&mut ws).await;
            assert_eq!(ack.seq, seq);
        }
        // Sever the transport.
        drop(ws);

        let mut ws = accept_authed(&listener, "s-2").await;
        let join = recv_frame(&mut ws).await;
        let extra = tokio::time::timeout(Duration::from_millis(300), recv_frame(&mut ws)).await;
        (join, extra.is_err(), ws)
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder(config)
        .on_reconnect(move |client| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(client.session_id());
                Ok(())
            }
        })
        .connect()
        .await
        .unwrap();

    let (join, no_second_join, _ws) = server.await.unwrap();
    assert_eq!(join.frame_type, FrameType::JoinConversation);
    assert!(join.conversation_id.is_nil());
    let payload: JoinPayload = JsonCodec::decode(join.payload()).unwrap();
    assert_eq!(payload.last_acked_seqs.len(), 2);
    assert_eq!(payload.last_acked_seqs.get(&conv_a.to_hex()), Some(&3));
    assert_eq!(payload.last_acked_seqs.get(&conv_b.to_hex()), Some(&7));
    assert!(no_second_join, "expected exactly one JOIN");

    let session = tokio::time::timeout(STEP, rx.recv()).await.unwrap().unwrap();
    assert_eq!(session.as_deref(), Some("s-2"));
    assert!(client.is_connected());
    assert_eq!(client.last_acked(&conv_a), Some(3));
    assert_eq!(client.last_acked(&conv_b), Some(7));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_auth_fail_on_reconnect_stops_retrying() {
    init_tracing();
    let (listener, config) = gateway().await;

    let client = {
        let server = tokio::spawn(async move {
            let ws = accept_authed(&listener, "s-1").await;
            (listener, ws)
        });
        let client = builder(config).connect().await.unwrap();
        let (listener, ws) = server.await.unwrap();
        drop(ws);

        let mut ws = accept(&listener).await;
        recv_frame(&mut ws).await;
        let fail = AuthFailPayload {
            reason: "revoked".into(),
            code: "AUTH_REVOKED".into(),
        };
        send_frame(&mut ws, &json_frame(FrameType::AuthFail, ConversationId::nil(), 0, &fail)).await;

        wait_for_state(&client, ConnState::AuthDead).await;
        let redial = tokio::time::timeout(Duration::from_millis(500), listener.accept()).await;
        assert!(redial.is_err(), "client redialed after AUTH_FAIL");
        client
    };

    assert!(!client.is_connected());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_close_during_backoff_stops_reconnecting() {
    init_tracing();
    let (listener, config) = gateway().await;

    let server = tokio::spawn(async move {
        let ws = accept_authed(&listener, "s-1").await;
        (listener, ws)
    });
    let client = builder(config)
        .reconnect_backoff(Duration::from_millis(400), Duration::from_millis(400))
        .connect()
        .await
        .unwrap();
    let (listener, ws) = server.await.unwrap();

    drop(ws);
    wait_for_state(&client, ConnState::Disconnected).await;
    client.close().await.unwrap();

    let redial = tokio::time::timeout(Duration::from_millis(800), listener.accept()).await;
    assert!(redial.is_err(), "client redialed after close");
    assert_eq!(client.state(), ConnState::Closed);
}

#[tokio::test]
async fn test_heartbeat_survives_reconnect() {
    init_tracing();
    let (listener, config) = gateway().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_authed(&listener, "s-1").await;
        let before = recv_frame(&mut ws).await;
        drop(ws);

        // Nothing was delivered, so the first frame after re-auth is the heartbeat.
        let mut ws = accept_authed(&listener, "s-2").await;
        let after = recv_frame(&mut ws).await;
        (before, after, ws)
    });

    let client = builder(config)
        .heartbeat_interval(Duration::from_millis(150))
        .connect()
        .await
        .unwrap();

    let (before, after, _ws) = server.await.unwrap();
    for frame in [&before, &after] {
        assert_eq!(frame.frame_type, FrameType::Presence);
        assert!(frame.conversation_id.is_nil());
        let status: serde_json::Value = JsonCodec::decode(frame.payload()).unwrap();
        assert_eq!(status, serde_json::json!({"status": "online"}));
    }
    assert_eq!(client.session_id().as_deref(), Some("s-2"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_sends_use_one_sequence() {
    init_tracing();
    let (listener, config) = gateway().await;
    let conv = ConversationId::new_v4();

    let server = tokio::spawn(async move {
        let mut ws = accept_authed(&listener, "s-1").await;
        let first = recv_frame(&mut ws).await;
        let second = recv_frame(&mut ws).await;
        let leave = recv_frame(&mut ws).await;
        (first, second, leave, ws)
    });

    let client = builder(config).connect().await.unwrap();
    let task = TaskSubmission {
        task_id: "t-1".into(),
        input: "summarize".into(),
        correlation_id: Some("corr-1".into()),
        ..TaskSubmission::default()
    };
    assert_eq!(client.submit_task(conv, &task).await.unwrap(), 1);
    let other = ConversationId::new_v4();
    assert_eq!(
        client
            .send_message(other, "note", &serde_json::json!({"k": "v"}), Some("logs"))
            .await
            .unwrap(),
        2
    );
    client.leave(conv).await.unwrap();

    let (first, second, leave, _ws) = server.await.unwrap();

    assert_eq!(first.frame_type, FrameType::SendMessage);
    assert_eq!(first.conversation_id, conv);
    assert_eq!(first.seq, 1);
    let envelope: SendMessagePayload = JsonCodec::decode(first.payload()).unwrap();
    assert_eq!(envelope.content_type, "task");
    assert_eq!(envelope.correlation_id.as_deref(), Some("corr-1"));
    assert!(envelope.stream.is_none());
    let content: TaskSubmission = serde_json::from_str(envelope.content.get()).unwrap();
    assert_eq!(content.task_id, "t-1");
    assert_eq!(content.input, "summarize");

    assert_eq!(second.seq, 2);
    assert_eq!(second.conversation_id, other);
    let envelope: SendMessagePayload = JsonCodec::decode(second.payload()).unwrap();
    assert_eq!(envelope.content_type, "note");
    assert_eq!(envelope.stream.as_deref(), Some("logs"));

    assert_eq!(leave.frame_type, FrameType::LeaveConversation);
    assert_eq!(leave.conversation_id, conv);
    assert!(leave.payload().is_empty());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_large_delivery_is_decompressed() {
    init_tracing();
    let (listener, config) = gateway().await;
    let conv = ConversationId::new_v4();
    let text = "all work and no play ".repeat(200);
    let delivery = channel_delivery(conv, 1, &text);

    let server = tokio::spawn(async move {
        let mut ws = accept_authed(&listener, "s-1").await;
        send_frame(&mut ws, &delivery).await;
        recv_frame(&mut ws).await;
        ws
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder(config)
        .on_channel_message(move |msg: ChannelMessage, _client| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg.text);
                Ok(())
            }
        })
        .connect()
        .await
        .unwrap();

    let received = tokio::time::timeout(STEP, rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, text);

    let _ws = server.await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent() {
    init_tracing();
    let (listener, config) = gateway().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_authed(&listener, "s-1").await;
        // The socket ends once the client closes.
        loop {
            match tokio::time::timeout(STEP, ws.next()).await.unwrap() {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
        tokio::time::timeout(Duration::from_millis(300), listener.accept())
            .await
            .is_err()
    });

    let client = builder(config).connect().await.unwrap();
    let clone = client.clone();

    client.close().await.unwrap();
    clone.close().await.unwrap();

    assert_eq!(client.state(), ConnState::Closed);
    assert!(!client.is_connected());
    let err = client.set_presence("online").await.unwrap_err();
    assert!(matches!(err, CommsError::Closed));

    let no_redial = server.await.unwrap();
    assert!(no_redial, "client redialed after close");
}

#[test]
fn test_oversized_payload_is_rejected() {
    let frame = Frame::new(
        FrameType::SendMessage,
        ConversationId::new_v4(),
        1,
        vec![b'a'; 40_000],
    );
    match encode_frame(&frame) {
        Err(CommsError::PayloadTooLarge { size, max }) => {
            assert_eq!(size, 40_000);
            assert_eq!(max, MAX_PAYLOAD_SIZE);
        }
        other => panic!("expected PayloadTooLarge, got {other:?}"),
    }
}

#[test]
fn test_backoff_delay_bounds() {
    let base = Duration::from_millis(100);
    let cap = Duration::from_secs(10);
    for attempt in 1..=12 {
        let ceiling = neboloop_comms::backoff_ceiling(attempt, base, cap);
        for _ in 0..50 {
            let delay = neboloop_comms::backoff_delay(attempt, base, cap);
            assert!(delay >= ceiling.mul_f64(0.75) && delay <= ceiling);
        }
    }
}
