//! Websocket change-feed client.
//!
//! One socket per subscription. The join is confirmed before
//! [`ChangeFeed::subscribe`] returns; afterwards a background task forwards
//! change frames, sends heartbeats and leaves the channel when the
//! [`Subscription`] is released. There is no reconnection: when the socket
//! drops the subscription's event stream ends.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::protocol::{self, Frame, Incoming};
use super::{ChangeEvent, ChangeFeed, ChangeSubscription, EVENT_BUFFER, RealtimeError, Subscription};
use crate::config::BackendConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reference used for the channel join.
const JOIN_REF: &str = "1";

/// How long to wait for the server to acknowledge a join.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the backend's realtime websocket.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<RealtimeClientInner>,
    access_token: Option<SecretString>,
}

struct RealtimeClientInner {
    socket_url: Url,
    heartbeat: Duration,
}

impl RealtimeClient {
    /// Create a client for the project at `config.url`, sending a heartbeat
    /// every `heartbeat`.
    ///
    /// # Errors
    ///
    /// Returns error if the websocket endpoint cannot be derived from the URL.
    pub fn new(config: &BackendConfig, heartbeat: Duration) -> Result<Self, RealtimeError> {
        Ok(Self {
            inner: Arc::new(RealtimeClientInner {
                socket_url: socket_url(&config.url, config.anon_key.expose_secret())?,
                heartbeat,
            }),
            access_token: None,
        })
    }

    /// A client joining channels with `token`, so row-level security applies
    /// to the delivered changes.
    #[must_use]
    pub fn with_access_token(&self, token: &SecretString) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            access_token: Some(token.clone()),
        }
    }
}

impl ChangeFeed for RealtimeClient {
    #[instrument(skip_all, fields(channel = %subscription.channel, table = %subscription.table))]
    async fn subscribe(
        &self,
        subscription: ChangeSubscription,
    ) -> Result<Subscription, RealtimeError> {
        let (mut socket, _) = connect_async(self.inner.socket_url.as_str()).await?;

        let token = self.access_token.as_ref().map(|t| t.expose_secret());
        let join = protocol::join(&subscription, token, JOIN_REF);
        send_frame(&mut socket, &join).await?;

        tokio::time::timeout(JOIN_TIMEOUT, await_join(&mut socket, &join.topic))
            .await
            .map_err(|_| RealtimeError::Timeout)??;

        info!("Realtime subscription confirmed");

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            socket,
            join.topic,
            self.inner.heartbeat,
            events_tx,
            close_rx,
        ));

        Ok(Subscription::new(events_rx, close_tx, task))
    }
}

/// `{url}/realtime/v1/websocket?apikey=..&vsn=1.0.0` with a websocket scheme.
fn socket_url(base: &Url, anon_key: &str) -> Result<Url, RealtimeError> {
    let scheme = match base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => other,
    };
    let base = Url::parse(&format!("{scheme}{}", &base[url::Position::AfterScheme..]))?;

    let mut url = base.join("realtime/v1/websocket")?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", protocol::VSN);
    Ok(url)
}

async fn send_frame(socket: &mut Socket, frame: &Frame) -> Result<(), RealtimeError> {
    let text = serde_json::to_string(frame)?;
    socket.send(Message::Text(text.into())).await?;
    Ok(())
}

/// Wait for the reply to our join.
async fn await_join(socket: &mut Socket, topic: &str) -> Result<(), RealtimeError> {
    while let Some(message) = socket.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => return Err(RealtimeError::Closed),
            _ => continue,
        };

        match protocol::parse(text.as_str())? {
            Incoming::Reply {
                topic: reply_topic,
                reference,
                ok,
                reason,
            } if reply_topic == topic && reference.as_deref() == Some(JOIN_REF) => {
                return if ok {
                    Ok(())
                } else {
                    Err(RealtimeError::Rejected(
                        reason.unwrap_or_else(|| "unknown reason".to_string()),
                    ))
                };
            }
            Incoming::ChannelError { topic: t } if t == topic => {
                return Err(RealtimeError::Rejected("channel error".to_string()));
            }
            _ => {}
        }
    }

    Err(RealtimeError::Closed)
}

/// Forward changes until the subscription is released or the socket ends.
async fn run(
    mut socket: Socket,
    topic: String,
    heartbeat: Duration,
    events: mpsc::Sender<ChangeEvent>,
    mut close: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = &mut close => {
                let leave = protocol::leave(&topic, &next_ref.to_string());
                if let Err(e) = send_frame(&mut socket, &leave).await {
                    debug!(error = %e, "Failed to send channel leave");
                }
                let _ = socket.close(None).await;
                debug!(%topic, "Realtime subscription released");
                break;
            }
            _ = ticker.tick() => {
                let frame = protocol::heartbeat(&next_ref.to_string());
                next_ref += 1;
                if let Err(e) = send_frame(&mut socket, &frame).await {
                    warn!(error = %e, "Realtime heartbeat failed; ending subscription");
                    break;
                }
            }
            message = socket.next() => match message {
                Some(Ok(Message::Text(text))) => match protocol::parse(text.as_str()) {
                    Ok(Incoming::Change { topic: t, event }) if t == topic => {
                        if events.send(event).await.is_err() {
                            // Receiver gone; the close signal follows.
                            debug!("Change event receiver dropped");
                        }
                    }
                    Ok(Incoming::ChannelError { topic: t } | Incoming::ChannelClosed { topic: t })
                        if t == topic =>
                    {
                        warn!(%topic, "Realtime channel closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Unreadable realtime frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    warn!(%topic, "Realtime socket closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime socket error");
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_https() {
        let base = Url::parse("https://project.backend.example/").unwrap();
        let url = socket_url(&base, "anon").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://project.backend.example/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn test_socket_url_http_with_port() {
        let base = Url::parse("http://127.0.0.1:54321/").unwrap();
        let url = socket_url(&base, "anon").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }
}
