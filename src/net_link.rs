//! WebSocket transport to the call backend.
//!
//! `NetLink` owns the socket and runs as its own task: outbound commands
//! arrive over an mpsc channel, inbound traffic and lifecycle changes are
//! reported as `NetEvent`s, and the connection state is published through
//! a watch channel. One connection per call session; there is no
//! reconnection and no automatic retry of anything.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::error::StreamError;

/// Lifecycle of the call channel. Frames are transmitted only in `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug)]
pub enum NetEvent {
    Text(String),
    Binary(Vec<u8>),
    Connected,
    Disconnected,
}

#[derive(Debug)]
pub enum NetCommand {
    SendText(String),
    SendBinary(Bytes),
    Close,
}

/// Endpoint for a call: `{ws_url}/ws/call/{call_id}`.
pub fn endpoint_url(ws_url: &str, call_id: &str) -> String {
    format!("{}/ws/call/{}", ws_url.trim_end_matches('/'), call_id)
}

pub struct NetLink {
    url: String,
    tx: mpsc::Sender<NetEvent>,
    rx_cmd: mpsc::Receiver<NetCommand>,
    state_tx: watch::Sender<ConnectionState>,
}

impl NetLink {
    pub fn new(
        url: String,
        tx: mpsc::Sender<NetEvent>,
        rx_cmd: mpsc::Receiver<NetCommand>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            url,
            tx,
            rx_cmd,
            state_tx,
        }
    }

    /// Run the connection to completion. A transport error ends the task;
    /// the session learns about it through the `Disconnected` event and
    /// the `Closed` state.
    pub async fn run(mut self) {
        let _ = self.state_tx.send(ConnectionState::Connecting);
        if let Err(e) = self.connect_and_loop().await {
            log::error!("Channel error on {}: {}", self.url, e);
        }
        let _ = self.state_tx.send(ConnectionState::Closed);
        let _ = self.tx.send(NetEvent::Disconnected).await;
    }

    async fn connect_and_loop(&mut self) -> anyhow::Result<()> {
        // Validate before dialing so a malformed base URL fails loudly
        let url = Url::parse(&self.url)?;

        log::info!("Connecting to {}...", url);
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        log::info!("Connected to {}", self.url);

        let (mut write, mut read) = ws_stream.split();

        let _ = self.state_tx.send(ConnectionState::Open);
        self.tx.send(NetEvent::Connected).await?;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.tx.send(NetEvent::Text(text.to_string())).await?;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.tx.send(NetEvent::Binary(data.to_vec())).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Server closed connection: {:?}", frame);
                            anyhow::bail!("connection closed by server");
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => anyhow::bail!("connection closed"),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    match cmd {
                        Some(NetCommand::SendText(text)) => {
                            write.send(Message::Text(text.into())).await?;
                        }
                        Some(NetCommand::SendBinary(data)) => {
                            write.send(Message::Binary(data)).await?;
                        }
                        // Command sender dropped counts as a close request
                        Some(NetCommand::Close) | None => {
                            let _ = self.state_tx.send(ConnectionState::Closing);
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

// ======================== Controller-facing seam ========================

/// Outbound half of the call channel as the controller sees it.
#[async_trait]
pub trait OutboundChannel: Clone + Send + Sync + 'static {
    fn state(&self) -> ConnectionState;
    async fn send_binary(&self, payload: Bytes) -> Result<(), StreamError>;
    async fn send_text(&self, text: String) -> Result<(), StreamError>;
    async fn close(&self);
}

/// Opens the channel for a call id. `connect` resolves only once the
/// channel reports `Open` (or fails); there is no open timeout, matching
/// the source pipeline.
#[async_trait]
pub trait ChannelFactory {
    type Channel: OutboundChannel;

    async fn connect(
        &self,
        call_id: &str,
    ) -> Result<(Self::Channel, mpsc::Receiver<NetEvent>), StreamError>;
}

/// Cloneable handle to a running `NetLink` task.
#[derive(Clone)]
pub struct WsChannel {
    cmd_tx: mpsc::Sender<NetCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

#[async_trait]
impl OutboundChannel for WsChannel {
    fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    async fn send_binary(&self, payload: Bytes) -> Result<(), StreamError> {
        self.cmd_tx
            .send(NetCommand::SendBinary(payload))
            .await
            .map_err(|_| StreamError::Connection("channel task is gone".into()))
    }

    async fn send_text(&self, text: String) -> Result<(), StreamError> {
        self.cmd_tx
            .send(NetCommand::SendText(text))
            .await
            .map_err(|_| StreamError::Connection("channel task is gone".into()))
    }

    async fn close(&self) {
        let _ = self.cmd_tx.send(NetCommand::Close).await;
    }
}

pub struct WsChannelFactory {
    ws_url: String,
    buffer: usize,
}

impl WsChannelFactory {
    pub fn new(ws_url: impl Into<String>, buffer: usize) -> Self {
        Self {
            ws_url: ws_url.into(),
            buffer,
        }
    }
}

#[async_trait]
impl ChannelFactory for WsChannelFactory {
    type Channel = WsChannel;

    async fn connect(
        &self,
        call_id: &str,
    ) -> Result<(WsChannel, mpsc::Receiver<NetEvent>), StreamError> {
        let url = endpoint_url(&self.ws_url, call_id);

        let (event_tx, mut event_rx) = mpsc::channel(self.buffer);
        let (cmd_tx, cmd_rx) = mpsc::channel(self.buffer);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let link = NetLink::new(url.clone(), event_tx, cmd_rx, state_tx);
        tokio::spawn(link.run());

        match event_rx.recv().await {
            Some(NetEvent::Connected) => Ok((WsChannel { cmd_tx, state_rx }, event_rx)),
            _ => Err(StreamError::Connection(format!(
                "failed to open channel at {}",
                url
            ))),
        }
    }
}
