//! Socket Mode listener and Web API client.
//!
//! [`SlackBot`] holds a Socket Mode session open, acknowledges each
//! envelope before acting on it, and hands slash commands to the installed
//! [`SlashCommandHandler`]. The same value is the Web API client used to
//! post messages and open direct-message channels.
//!
//! Envelopes are processed one at a time in arrival order. On shutdown the
//! receive loop stops, and acknowledgments already queued for the socket are
//! flushed before the connection closes.
//!
//! # Example
//!
//! ```rust,ignore
//! use planebot_slack::{SlackBot, SlackConfig};
//!
//! async fn listen() -> planebot_slack::SlackResult<()> {
//!     let bot = SlackBot::new(SlackConfig::from_env()?)?;
//!     // returns after bot.shutdown()
//!     bot.start().await
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::commands::{
    DelayedResponse, SlashCommandHandler, SlashCommandPayload, send_delayed_response,
};
use crate::config::SlackConfig;
use crate::error::{SlackApiError, SlackError, SlackResult};
use crate::events::{
    ENVELOPE_DISCONNECT, ENVELOPE_EVENTS_API, ENVELOPE_HELLO, ENVELOPE_INTERACTIVE,
    ENVELOPE_SLASH_COMMANDS, EventPayload, SocketModeAck, SocketModeEnvelope,
};
use crate::messages::SlackMessageContent;

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Used when a 429 carries no usable Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Timing knobs for [`SlackBot`].
#[derive(Debug, Clone)]
pub struct BotOptions {
    /// Per-request timeout on the Web API client.
    pub api_timeout: Duration,
    /// Pause before opening a new session after a failed one.
    pub reconnect_delay: Duration,
    /// Interval between client pings on an open session.
    pub ping_interval: Duration,
    /// Upper bound on draining queued acks when a session closes.
    pub flush_timeout: Duration,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            api_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

/// How one Socket Mode session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// What the receive loop does after one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Continue,
    Reconnect,
}

/// The planebot Slack client.
pub struct SlackBot {
    config: SlackConfig,
    client: reqwest::Client,
    options: BotOptions,
    /// Filled in by auth.test.
    bot_user_id: Arc<RwLock<Option<String>>>,
    /// Flips to `true` once; never reset.
    shutdown_tx: watch::Sender<bool>,
    command_handler: Arc<RwLock<Option<Arc<dyn SlashCommandHandler>>>>,
}

impl SlackBot {
    pub fn new(config: SlackConfig) -> SlackResult<Self> {
        Self::with_options(config, BotOptions::default())
    }

    /// Build a client with non-default timing. Fails on invalid tokens.
    pub fn with_options(config: SlackConfig, options: BotOptions) -> SlackResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(options.api_timeout)
            .build()
            .map_err(|e| SlackError::Internal(format!("building HTTP client: {}", e)))?;

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            client,
            options,
            bot_user_id: Arc::new(RwLock::new(None)),
            shutdown_tx,
            command_handler: Arc::new(RwLock::new(None)),
        })
    }

    /// Install the handler that answers slash commands. Replaces any
    /// previous one.
    pub async fn set_command_handler<H: SlashCommandHandler + 'static>(&self, handler: H) {
        *self.command_handler.write().await = Some(Arc::new(handler));
    }

    /// User id reported by auth.test, once known.
    pub async fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.read().await.clone()
    }

    /// Check credentials, then run the Socket Mode listener until shutdown.
    pub async fn start(&self) -> SlackResult<()> {
        info!("Starting Slack listener");
        self.test_auth().await?;
        self.run_socket_mode().await
    }

    /// Ask the listener to stop. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.is_shutting_down() {
            return;
        }
        info!("Stopping Slack listener");
        self.shutdown_tx.send_replace(true);
    }

    /// Whether shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Check the bot token with auth.test and remember the bot's user id.
    /// Any rejection is reported as [`SlackError::Auth`].
    pub async fn test_auth(&self) -> SlackResult<()> {
        let response: serde_json::Value =
            self.api_call("auth.test", &serde_json::json!({})).await?;

        if !is_ok(&response) {
            let code = SlackApiError::from_response("auth.test", &response).code;
            return Err(SlackError::Auth(format!("auth.test rejected the token: {}", code)));
        }

        let user_id = response
            .get("user_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if let Some(id) = &user_id {
            info!(bot_user = %id, "Slack token accepted");
        }
        *self.bot_user_id.write().await = user_id;

        Ok(())
    }

    /// Open sessions back to back until shutdown or an auth failure.
    async fn run_socket_mode(&self) -> SlackResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                info!("Socket Mode listener stopped");
                return Ok(());
            }

            let session = match self.get_socket_mode_url().await {
                Ok(ws_url) => {
                    debug!("Opening Socket Mode session");
                    self.connect_and_run(&ws_url, &mut shutdown_rx).await
                }
                Err(e) => Err(e),
            };

            match session {
                Ok(SessionEnd::Shutdown) => {
                    info!("Socket Mode listener stopped");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect) => {
                    info!("Socket Mode session ended, opening a new one");
                }
                Err(e @ SlackError::Auth(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "Socket Mode session failed: {} (retrying in {:?})",
                        e, self.options.reconnect_delay
                    );

                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.options.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    /// Ask apps.connections.open (with the app token) for a session URL.
    async fn get_socket_mode_url(&self) -> SlackResult<String> {
        let json: serde_json::Value = self
            .client
            .post(self.config.method_url("apps.connections.open"))
            .bearer_auth(self.config.app_token())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await?
            .json()
            .await?;
        check_ok("apps.connections.open", &json)?;

        string_field(&json, &["url"], "apps.connections.open")
    }

    /// One session: reader in this task, writer and pinger spawned.
    async fn connect_and_run(
        &self,
        ws_url: &str,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SlackResult<SessionEnd> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (mut write, read) = ws_stream.split();

        // acks, pongs and pings share one writer
        let (msg_tx, mut msg_rx) = mpsc::channel::<WsMessage>(100);

        // Drains until every sender is dropped, then closes the socket.
        let write_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    warn!("Socket Mode write failed: {}", e);
                    return;
                }
            }
            let _ = write.send(WsMessage::Close(None)).await;
            let _ = write.close().await;
        });

        let ping_tx = msg_tx.clone();
        let period = self.options.ping_interval;
        let ping_task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                if ping_tx.send(WsMessage::Ping(vec![])).await.is_err() {
                    return;
                }
            }
        });

        let result = self.process_messages(read, &msg_tx, shutdown_rx).await;

        ping_task.abort();
        let _ = ping_task.await;
        drop(msg_tx);

        match tokio::time::timeout(self.options.flush_timeout, write_task).await {
            Ok(_) => debug!("Socket Mode writer flushed"),
            Err(_) => warn!(
                "Socket Mode writer did not flush within {:?}",
                self.options.flush_timeout
            ),
        }

        result
    }

    /// Read frames until shutdown, a server close or a read error.
    async fn process_messages(
        &self,
        mut read: SplitStream<WsConnection>,
        msg_tx: &mpsc::Sender<WsMessage>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SlackResult<SessionEnd> {
        loop {
            if *shutdown_rx.borrow() {
                return Ok(SessionEnd::Shutdown);
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Shutdown requested, leaving session");
                        return Ok(SessionEnd::Shutdown);
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if self.handle_socket_message(&text, msg_tx).await == FrameOutcome::Reconnect {
                                return Ok(SessionEnd::Reconnect);
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = msg_tx.send(WsMessage::Pong(data)).await;
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("Slack closed the Socket Mode connection");
                            return Ok(SessionEnd::Reconnect);
                        }
                        Some(Err(e)) => {
                            return Err(SlackError::WebSocket(e.to_string()));
                        }
                        None => {
                            return Ok(SessionEnd::Reconnect);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_socket_message(
        &self,
        text: &str,
        msg_tx: &mpsc::Sender<WsMessage>,
    ) -> FrameOutcome {
        let envelope: SocketModeEnvelope = match serde_json::from_str(text) {
            Ok(env) => env,
            Err(e) => {
                warn!("Ignoring undecodable Socket Mode frame: {}", e);
                return FrameOutcome::Continue;
            }
        };
        debug!(kind = %envelope.envelope_type, "Socket Mode envelope");

        // ack goes out before any handling
        if let Some(envelope_id) = envelope
            .needs_ack()
            .then_some(envelope.envelope_id.as_deref())
            .flatten()
        {
            match serde_json::to_string(&SocketModeAck::new(envelope_id)) {
                Ok(ack) => {
                    if msg_tx.send(WsMessage::Text(ack)).await.is_err() {
                        warn!("Socket writer closed before ack of {}", envelope_id);
                    }
                }
                Err(e) => error!("Failed to encode ack for {}: {}", envelope_id, e),
            }
        }

        match envelope.envelope_type.as_str() {
            ENVELOPE_SLASH_COMMANDS => {
                if let Some(payload) = envelope.payload {
                    self.handle_slash_command_payload(payload).await;
                }
            }
            ENVELOPE_EVENTS_API => {
                if let Some(payload) = envelope.payload {
                    handle_event_payload(payload);
                }
            }
            ENVELOPE_INTERACTIVE => {
                debug!("Interactive payload acknowledged, nothing to do");
            }
            ENVELOPE_HELLO => {
                info!("Socket Mode session open");
            }
            ENVELOPE_DISCONNECT => {
                info!(
                    "Slack requested a reconnect ({})",
                    envelope.reason.as_deref().unwrap_or("no reason")
                );
                return FrameOutcome::Reconnect;
            }
            other => {
                debug!("Skipping envelope of type {}", other);
            }
        }

        FrameOutcome::Continue
    }

    /// Route a slash command to the handler and reply ephemerally.
    async fn handle_slash_command_payload(&self, payload: serde_json::Value) {
        let command: SlashCommandPayload = match serde_json::from_value(payload) {
            Ok(p) => p,
            Err(e) => {
                warn!("Ignoring malformed slash command: {}", e);
                return;
            }
        };

        info!(command = %command.command, user = %command.user_id, "Slash command");

        let handler = self.command_handler.read().await.clone();
        let reply = match handler {
            Some(handler) => handler.handle_command(&command).await,
            None => format!("No handler is configured for {}", command.command),
        };

        if let Err(e) = self.respond_ephemeral(&command, &reply).await {
            error!("Could not deliver reply to {}: {}", command.command, e);
        }
    }

    /// Reply to a slash command so only the invoker sees it.
    pub async fn respond_ephemeral(
        &self,
        command: &SlashCommandPayload,
        text: &str,
    ) -> SlackResult<()> {
        if command.response_url.is_empty() {
            return self
                .post_ephemeral(&command.channel_id, &command.user_id, text)
                .await;
        }

        send_delayed_response(
            &self.client,
            &command.response_url,
            &DelayedResponse::ephemeral(text),
        )
        .await
    }

    /// chat.postMessage. Returns the `ts` of the new message.
    pub async fn send_message(
        &self,
        channel: &str,
        content: SlackMessageContent,
    ) -> SlackResult<String> {
        let mut payload = serde_json::to_value(&content)?;
        payload["channel"] = serde_json::json!(channel);

        let response: serde_json::Value = self.api_call("chat.postMessage", &payload).await?;
        check_ok("chat.postMessage", &response)?;

        string_field(&response, &["ts"], "chat.postMessage")
    }

    /// Post a message only `user` can see in `channel`.
    pub async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> SlackResult<()> {
        let payload = serde_json::json!({
            "channel": channel,
            "user": user,
            "text": text,
        });

        let response: serde_json::Value = self.api_call("chat.postEphemeral", &payload).await?;
        check_ok("chat.postEphemeral", &response)
    }

    /// Open (or resolve) the direct-message channel with one user.
    pub async fn open_direct_channel(&self, user_id: &str) -> SlackResult<String> {
        let payload = serde_json::json!({ "users": user_id });

        let response: serde_json::Value = self.api_call("conversations.open", &payload).await?;
        check_ok("conversations.open", &response)?;

        string_field(&response, &["channel", "id"], "conversations.open")
    }

    /// POST a JSON body to a Web API method with the bot token.
    ///
    /// HTTP 429 becomes [`SlackError::RateLimited`]; the `ok` flag of the
    /// answer is left to the caller.
    async fn api_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> SlackResult<T> {
        let response = self
            .client
            .post(self.config.method_url(method))
            .bearer_auth(self.config.bot_token())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(SlackError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("{} returned {}: {}", method, status, body)));
        }

        Ok(response.json().await?)
    }
}

/// Events API callbacks are acknowledged and logged only.
fn handle_event_payload(payload: serde_json::Value) {
    match serde_json::from_value::<EventPayload>(payload) {
        Ok(event) => info!(
            "Received {} event from {}",
            event.event_type(),
            event.user().unwrap_or("unknown user")
        ),
        Err(e) => warn!("Failed to parse events_api payload: {}", e),
    }
}

fn is_ok(response: &serde_json::Value) -> bool {
    response.get("ok").and_then(|v| v.as_bool()) == Some(true)
}

fn check_ok(method: &str, response: &serde_json::Value) -> SlackResult<()> {
    if is_ok(response) {
        Ok(())
    } else {
        Err(SlackApiError::from_response(method, response).into())
    }
}

/// String at `path` inside a Web API answer.
fn string_field(response: &serde_json::Value, path: &[&str], method: &str) -> SlackResult<String> {
    path.iter()
        .try_fold(response, |value, key| value.get(key))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| SlackError::Api(format!("{} answer has no {}", method, path.join("."))))
}
