//! WebSocket-backed channel to a privileged context.
//!
//! Used when the privileged context is reachable over a socket (a native
//! host, a development harness) rather than an in-process port.
//!
//! # Connection Flow
//!
//! 1. Connect to the WebSocket URL (with timeout)
//! 2. Spawn a pump task copying text frames between socket and [`Port`]
//! 3. Hand the page end of the port to a [`Bridge`](super::Bridge)
//! 4. Socket close or error drops the port, failing pending requests

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

use super::port::Port;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for establishing the socket.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Public API
// ============================================================================

/// Connects to `url` with the default timeout.
///
/// # Errors
///
/// See [`connect_with_timeout`].
pub async fn connect(url: &str) -> Result<Port> {
    connect_with_timeout(url, DEFAULT_CONNECT_TIMEOUT).await
}

/// Connects to `url` and returns the page end of a pumped [`Port`].
///
/// # Errors
///
/// - [`Error::Config`] if `url` is not a `ws://` or `wss://` URL
/// - [`Error::ConnectionTimeout`] if the handshake does not finish in time
/// - [`Error::WebSocket`] if the handshake fails
pub async fn connect_with_timeout(url: &str, connect_timeout: Duration) -> Result<Port> {
    let parsed = Url::parse(url).map_err(|e| Error::config(format!("invalid url {url}: {e}")))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(Error::config(format!(
            "expected ws:// or wss:// url, got {}",
            parsed.scheme()
        )));
    }

    let (ws_stream, _) = timeout(connect_timeout, connect_async(parsed.as_str()))
        .await
        .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

    info!(url = %parsed, "WebSocket connected");

    let (page, mut pump) = Port::pair();
    let (mut ws_write, mut ws_read) = ws_stream.split();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if pump.send(text.as_str().to_owned()).is_err() {
                                debug!("Bridge dropped, closing socket");
                                break;
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                frame = pump.recv() => {
                    match frame {
                        Some(text) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(error = %e, "Failed to write frame");
                                break;
                            }
                        }
                        None => {
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("WebSocket pump terminated");
    });

    Ok(page)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestEnvelope;
    use crate::transport::Bridge;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn test_rejects_non_websocket_url() {
        let err = connect("https://example.com").await.expect_err("scheme");
        assert!(matches!(err, Error::Config { .. }));

        let err = connect("not a url").await.expect_err("parse");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_bridge_over_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        // Minimal privileged context answering every request with its method name
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let request: Value = serde_json::from_str(&text).expect("json");
                let reply = json!({
                    "id": request["id"],
                    "type": "success",
                    "result": request["data"]["method"],
                });
                ws.send(Message::Text(reply.to_string().into()))
                    .await
                    .expect("send");
            }
        });

        let port = connect(&format!("ws://{addr}")).await.expect("connect");
        let bridge = Bridge::new(port);
        bridge.connect();

        let result = bridge
            .request(RequestEnvelope::new("eth_chainId"))
            .await
            .expect("result");
        assert_eq!(result, json!("eth_chainId"));
    }
}
