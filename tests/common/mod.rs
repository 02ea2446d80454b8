/// Common utilities for integration tests
use std::net::TcpListener;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::time::timeout;

use ss_coordinator::tlv::{self, Frame};

/// Find an available port
pub fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Bind a loopback listener on a fresh port, returning it with its address
pub async fn bind_listener() -> (TokioTcpListener, String) {
    let listener = TokioTcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener
        .local_addr()
        .expect("Failed to get local addr")
        .to_string();
    (listener, addr)
}

/// Create a simple echo server for testing
pub async fn start_echo_server(port: u16) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let listener = TokioTcpListener::bind(format!("127.0.0.1:{}", port))
            .await
            .expect("Failed to bind echo server");

        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) => break,
                                Ok(n) => {
                                    if socket.write_all(&buf[..n]).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    })
}

/// Read one TLV frame off a test socket, bounded by a timeout
pub async fn read_frame_timed(conn: &mut TcpStream, limit: Duration) -> Frame {
    timeout(limit, tlv::read_frame(conn))
        .await
        .expect("Timed out waiting for frame")
        .expect("Failed to read frame")
}

/// Write one TLV frame to a test socket
pub async fn write_frame(conn: &mut TcpStream, typ: u16, value: &[u8]) {
    tlv::write_frame(conn, &Frame::new(typ, value.to_vec()))
        .await
        .expect("Failed to write frame");
}
