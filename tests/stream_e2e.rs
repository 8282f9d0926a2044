// End-to-end test against a real HTTP server-sent-events endpoint.
//
// A minimal SSE server is stood up on a loopback TCP listener; the client
// connects over real HTTP through its production transport, so the whole
// path (request headers, auth, status handling, chunked body parsing,
// dispatch, history ticks) is exercised without mocks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use horizon_stream::{
    ClientEvent, ConnectionState, HttpStreamTransport, MetricsStreamClient, StreamClientConfig,
    StreamError, StreamTransport,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serve one SSE response on the listener: checks the bearer token, answers
/// 200 with `text/event-stream`, writes the given frames, then holds the
/// connection open until the client goes away.
async fn serve_sse_once(listener: TcpListener, token: &'static str, frames: Vec<String>) {
    let (mut socket, _) = listener.accept().await.expect("accept");

    let mut buf = vec![0u8; 4096];
    let n = socket.read(&mut buf).await.expect("read request");
    let head = String::from_utf8_lossy(&buf[..n]).to_lowercase();

    if !head.contains(&format!("bearer {}", token)) {
        socket
            .write_all(b"HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .expect("write 401");
        return;
    }

    socket
        .write_all(
            b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
        )
        .await
        .expect("write response head");

    for frame in frames {
        socket.write_all(frame.as_bytes()).await.expect("write frame");
        socket.flush().await.expect("flush");
    }

    // Keep the stream open; exit when the client hangs up.
    let mut drain = [0u8; 64];
    loop {
        match socket.read(&mut drain).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn streams_metrics_over_real_http() {
    init_logs();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let frames = vec![
        "event: init\ndata: [{\"agentId\":1,\"online\":true,\"cpuUsage\":12.5},\
         {\"agentId\":2,\"online\":true,\"cpuUsage\":37.0}]\n\n"
            .to_string(),
        "event: heartbeat\ndata: ping\n\n".to_string(),
        "event: metrics\ndata: {\"agentId\":1,\"online\":true,\"cpuUsage\":99.0,\
         \"networkRxRate\":2048.0}\n\n"
            .to_string(),
    ];
    let server = tokio::spawn(serve_sse_once(listener, "test-token", frames));

    let config = StreamClientConfig {
        base_url: format!("http://{}/api", addr),
        access_token: Some("test-token".to_string()),
        history_interval: Duration::from_millis(100),
        ..Default::default()
    };
    let client = MetricsStreamClient::new(config);

    let events: Arc<Mutex<Vec<ClientEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    client.set_event_callback(move |event| sink.lock().push(event));

    client.connect(None);

    // Latest values land as soon as frames are dispatched.
    wait_until(|| matches!(client.latest(1), Some(m) if m.cpu_usage == Some(99.0))).await;
    assert_eq!(client.latest(2).unwrap().cpu_usage, Some(37.0));
    assert_eq!(client.state(), ConnectionState::Connected);

    // History needs at least one commit tick.
    wait_until(|| !client.history(1).is_empty()).await;
    let point = &client.history(1)[0];
    assert_eq!(point.cpu_usage, Some(99.0));
    assert_eq!(point.network_rx_rate, Some(2048.0));

    let stats = client.stats();
    assert_eq!(stats.frames_received, 3);
    assert_eq!(stats.samples_received, 3);
    assert_eq!(stats.dropped_frames, 0);
    assert!(stats.points_committed >= 2); // agents 1 and 2

    let saw_connected = events.lock().iter().any(|e| {
        matches!(
            e,
            ClientEvent::StateChanged {
                state: ConnectionState::Connected
            }
        )
    });
    assert!(saw_connected);

    client.dispose();
    wait_until(|| client.state() == ConnectionState::Disconnected).await;
    server.abort();
}

#[tokio::test]
async fn rejected_handshake_surfaces_http_status() {
    init_logs();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(serve_sse_once(listener, "test-token", Vec::new()));

    // Wrong token: the server answers 401 before any body.
    let transport = HttpStreamTransport::new(
        format!("http://{}/api", addr),
        Some("wrong-token".to_string()),
    );
    let err = transport.open(None).await.expect_err("must be rejected");
    assert!(matches!(err, StreamError::Connect { status: 401 }));

    server.abort();
}
