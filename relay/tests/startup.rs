//! End-to-end tests of the startup race between piped input and the SMTP
//! listener.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use mailrelay::{run, Config, DeliveryError, Destination, Message, RunMode};

/// Forwards every delivered message to the test.
struct Capture {
    seen: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl Destination for Capture {
    fn name(&self) -> &str {
        "capture"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let _ = self.seen.send(message.clone());
        Ok(())
    }
}

fn capture() -> (Vec<Box<dyn Destination>>, mpsc::UnboundedReceiver<Message>) {
    let (seen, rx) = mpsc::unbounded_channel();
    (vec![Box::new(Capture { seen })], rx)
}

fn free_port() -> u16 {
    let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

async fn connect(port: u16) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("listener did not come up on port {port}");
}

async fn exchange(stream: &mut BufReader<TcpStream>, line: &str) -> String {
    stream
        .get_mut()
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .unwrap();
    let mut reply = String::new();
    stream.read_line(&mut reply).await.unwrap();
    reply.trim_end().to_string()
}

#[tokio::test]
async fn test_piped_message_is_delivered_without_listener() {
    let (destinations, mut seen) = capture();
    let port = free_port();
    let config = Config {
        tcp_port: port,
        ..Default::default()
    };
    let input = "From: root (Cron Daemon)\nTo: user\nSubject: Cron <user@desktop> df -h\n\nFilesystem  Size  Used\n/dev/sda1   100G   42G\n";

    let mode = run(config, destinations, input.as_bytes(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(mode, RunMode::Batch);
    let message = seen.recv().await.unwrap();
    assert_eq!(message.from, "root (Cron Daemon)");
    assert_eq!(message.subject, "Cron <user@desktop> df -h");
    assert_eq!(message.body, "Filesystem  Size  Used\n/dev/sda1   100G   42G");
    assert!(seen.try_recv().is_err());

    // The SMTP port was never taken.
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    std::net::TcpListener::bind(("127.0.0.1", port)).expect("batch run bound the SMTP port");
}

#[tokio::test]
async fn test_idle_input_starts_listener() {
    let (destinations, mut seen) = capture();
    let port = free_port();
    let config = Config {
        tcp_port: port,
        stdin_timeout_ms: 50,
        ..Default::default()
    };
    // Writer half held open so the batch read can only time out.
    let (_writer, input) = tokio::io::duplex(64);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let relay = tokio::spawn(run(config, destinations, input, async {
        stop_rx.await.ok();
    }));

    let mut stream = BufReader::new(connect(port).await);
    let mut greeting = String::new();
    stream.read_line(&mut greeting).await.unwrap();
    assert!(greeting.starts_with("220 "));

    assert_eq!(exchange(&mut stream, "EHLO localhost").await, "250 OK welcome");
    assert_eq!(exchange(&mut stream, "MAIL FROM:<cron@localhost>").await, "250 OK (mail from)");
    assert_eq!(exchange(&mut stream, "RCPT TO:<user@localhost>").await, "250 OK (rcpt to)");
    assert_eq!(exchange(&mut stream, "DATA").await, "354 OK (data)");
    stream
        .get_mut()
        .write_all(b"Subject: nightly backup\r\n\r\nbackup finished\r\n")
        .await
        .unwrap();
    assert_eq!(exchange(&mut stream, ".").await, "250 OK body");
    assert_eq!(exchange(&mut stream, "QUIT").await, "221 OK quit");

    let message = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.from, "<cron@localhost>");
    assert_eq!(message.to, "<user@localhost>");
    assert_eq!(message.subject, "nightly backup");
    assert_eq!(message.body, "backup finished");

    stop_tx.send(()).unwrap();
    assert_eq!(relay.await.unwrap().unwrap(), RunMode::Listener);
}

#[tokio::test]
async fn test_empty_input_starts_listener() {
    let (destinations, mut seen) = capture();
    let port = free_port();
    let config = Config {
        tcp_port: port,
        ..Default::default()
    };
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let relay = tokio::spawn(run(config, destinations, &b"Subject: nothing\n\n"[..], async {
        stop_rx.await.ok();
    }));

    drop(connect(port).await);
    stop_tx.send(()).unwrap();

    assert_eq!(relay.await.unwrap().unwrap(), RunMode::Listener);
    assert!(seen.try_recv().is_err());
}
