//! Stdio Transport
//!
//! Talks to the privileged helper over its stdin/stdout using one JSON
//! frame per line:
//!
//! ```text
//! -> {"type":"request","id":7,"channel":"scan.pause","payload":{"sessionId":"s1"}}
//! <- {"type":"reply","id":7,"payload":{"success":true}}
//! <- {"type":"event","channel":"scan.progress","args":[{...}]}
//! ```
//!
//! A single reader task owns stdout, so events on a channel reach listeners
//! in the order the helper wrote them. Replies are matched to their call by id.

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::listeners::{ListenerId, ListenerTable};
use super::{BoundaryTransport, RawHandler};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};

/// One line on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Request {
        id: u64,
        channel: String,
        #[serde(default)]
        payload: Value,
    },
    Reply {
        id: u64,
        #[serde(default)]
        payload: Value,
    },
    Event {
        channel: String,
        #[serde(default)]
        args: Vec<Value>,
    },
}

type PendingReplies = DashMap<u64, oneshot::Sender<BridgeResult<Value>>>;

/// Transport over a helper process' standard streams
pub struct StdioTransport {
    /// Outgoing lines, drained by the writer task
    outgoing: mpsc::UnboundedSender<String>,
    /// Calls awaiting their reply (request id -> reply slot)
    pending: Arc<PendingReplies>,
    listeners: Arc<ListenerTable>,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    timeout: Duration,
    child: Mutex<Option<Child>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the helper configured in `config` and connect to it
    pub fn spawn(config: &BridgeConfig) -> BridgeResult<Self> {
        let helper = config
            .helper_path
            .as_ref()
            .ok_or_else(|| BridgeError::Config("helper_path is not set".into()))?;

        info!("Starting host helper {}", helper.display());

        let mut child = Command::new(helper)
            .args(&config.helper_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Transport("helper stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Transport("helper stdout unavailable".into()))?;

        let transport = Self::from_pipes(stdin, stdout, config.request_timeout());
        *transport.child.lock() = Some(child);
        Ok(transport)
    }

    /// Connect over an arbitrary pipe pair (the helper's stdin and stdout)
    pub fn from_pipes<W, R>(writer: W, reader: R, timeout: Duration) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let pending: Arc<PendingReplies> = Arc::new(DashMap::new());
        let listeners = Arc::new(ListenerTable::new());
        let closed = Arc::new(AtomicBool::new(false));

        let writer_task = tokio::spawn(write_loop(writer, outgoing_rx, closed.clone()));
        let reader_task = tokio::spawn(read_loop(
            reader,
            pending.clone(),
            listeners.clone(),
            closed.clone(),
        ));

        Self {
            outgoing,
            pending,
            listeners,
            next_id: AtomicU64::new(1),
            closed,
            timeout,
            child: Mutex::new(None),
            tasks: Mutex::new(vec![writer_task, reader_task]),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of calls still waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Stop the helper and fail anything still in flight
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        fail_pending(&self.pending, "Host helper connection closed");

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop host helper: {}", e);
            }
        }
    }
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<String>, closed: Arc<AtomicBool>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(mut line) = outgoing.recv().await {
        line.push('\n');
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            error!("Writing to host helper failed: {}", e);
            closed.store(true, Ordering::SeqCst);
            break;
        }
    }
}

async fn read_loop<R>(
    reader: R,
    pending: Arc<PendingReplies>,
    listeners: Arc<ListenerTable>,
    closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Frame>(&line) {
                    Ok(frame) => handle_frame(frame, &pending, &listeners),
                    Err(e) => warn!("Skipping malformed frame from host helper: {}", e),
                }
            }
            Ok(None) => {
                info!("Host helper closed its output");
                break;
            }
            Err(e) => {
                error!("Reading from host helper failed: {}", e);
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    fail_pending(&pending, "Host helper exited");
}

fn handle_frame(frame: Frame, pending: &PendingReplies, listeners: &ListenerTable) {
    match frame {
        Frame::Reply { id, payload } => match pending.remove(&id) {
            Some((_, slot)) => {
                let _ = slot.send(Ok(payload));
            }
            None => warn!("Reply for unknown request id {}", id),
        },
        Frame::Event { channel, args } => {
            let delivered = listeners.dispatch(&channel, &args);
            debug!("Event {} delivered to {} listener(s)", channel, delivered);
        }
        Frame::Request { channel, .. } => {
            warn!("Ignoring request on {} sent by host helper", channel);
        }
    }
}

fn fail_pending(pending: &PendingReplies, message: &str) {
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, slot)) = pending.remove(&id) {
            let _ = slot.send(Err(BridgeError::Transport(message.to_string())));
        }
    }
}

#[async_trait]
impl BoundaryTransport for StdioTransport {
    async fn invoke(&self, channel: &str, payload: Value) -> BridgeResult<Value> {
        if self.is_closed() {
            return Err(BridgeError::Transport("Host helper is not running".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        // The reader may have failed every pending call between the check above and the insert
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(BridgeError::Transport("Host helper is not running".into()));
        }

        let frame = Frame::Request {
            id,
            channel: channel.to_string(),
            payload,
        };
        let line = serde_json::to_string(&frame)?;

        debug!("-> {} (id: {})", channel, id);
        if self.outgoing.send(line).is_err() {
            self.pending.remove(&id);
            return Err(BridgeError::Transport("Host helper connection closed".into()));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::Transport("Reply channel dropped".into())),
            Err(_) => {
                self.pending.remove(&id);
                Err(BridgeError::Transport(format!(
                    "{} timed out after {}ms",
                    channel,
                    self.timeout.as_millis()
                )))
            }
        }
    }

    fn listen(&self, channel: &str, handler: RawHandler) -> ListenerId {
        self.listeners.add(channel, handler)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn transport_type(&self) -> &'static str {
        "stdio"
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending.len())
            .field("listeners", &self.listeners.total())
            .field("timeout", &self.timeout)
            .finish()
    }
}
