use futures_util::{SinkExt, StreamExt};
use lab_transport::{TelemetryConfig, TelemetryResourcer, WsConnector, STREAM_PATH};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message;

const ANGLE: &str = "/sensors/encoder/angle";
const DUTY: &str = "/propeller/pwm/duty";

/// A one-shot device: pushes one angle sample, then reports every text
/// message it receives.
fn spawn_device() -> (u16, mpsc::Receiver<String>) {
    let (port_tx, port_rx) = mpsc::channel();
    let (seen_tx, seen_rx) = mpsc::channel();
    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            port_tx.send(listener.local_addr().unwrap().port()).unwrap();
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"angle":"0x0000"}"#.into()))
                .await
                .unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        let _ = seen_tx.send(text.to_string());
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });
    });
    (port_rx.recv().unwrap(), seen_rx)
}

#[test]
fn ws_stream_caches_samples_and_forwards_writes() {
    let (port, seen) = spawn_device();
    let res = TelemetryResourcer::new(
        WsConnector::new("127.0.0.1", port, STREAM_PATH),
        TelemetryConfig::with_timeout(Duration::from_millis(500)),
    )
    .unwrap();
    res.route(ANGLE, "angle").unwrap();
    res.route(DUTY, "duty").unwrap();

    res.wait_connected(Duration::from_secs(2)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut sample = None;
    while sample.is_none() && Instant::now() < deadline {
        sample = res.get(ANGLE).unwrap();
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(sample, Some(0));

    res.post(DUTY, 0x1E61).unwrap();
    let got = seen.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(got, r#"{"duty":"0x1E61"}"#);

    res.close();
    assert!(!res.is_connected());
}
