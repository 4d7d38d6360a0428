use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info, warn};

use msgcode_core::error::{Result, RuntimeError};
use msgcode_protocol::linecodec::{LineCodec, RpcRequest, RpcResponse};

use crate::types::{Ack, Message, TransportStatus};

const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CEILING_MS: u64 = 60_000;
const JITTER_FRACTION: f64 = 0.2;
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives the messaging binary as a long-lived child process. The only
/// module allowed to invoke the transport binary; everything else talks to
/// it through `list`/`send`/`mark`.
pub struct TransportAdapter {
    binary_path: PathBuf,
    inner: Mutex<Option<ChildHandle>>,
}

struct ChildHandle {
    child: Child,
    writer: FramedWrite<ChildStdin, LineCodec>,
    reader: FramedRead<ChildStdout, LineCodec>,
}

impl TransportAdapter {
    /// Resolve the transport binary path from `MSGCODE_TRANSPORT_PATH`,
    /// falling back to `IMSG_PATH` for backward compatibility, then to an
    /// explicit default passed by the caller.
    pub fn new(default_path: impl Into<PathBuf>) -> Self {
        let binary_path = std::env::var("MSGCODE_TRANSPORT_PATH")
            .or_else(|_| std::env::var("IMSG_PATH"))
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_path.into());
        Self {
            binary_path,
            inner: Mutex::new(None),
        }
    }

    pub fn status(&self) -> TransportStatus {
        match self.inner.try_lock() {
            Ok(guard) if guard.is_some() => TransportStatus::Connected,
            Ok(_) => TransportStatus::Disconnected,
            Err(_) => TransportStatus::Connecting,
        }
    }

    async fn ensure_spawned(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(self.spawn_with_backoff().await?);
        Ok(())
    }

    async fn spawn_with_backoff(&self) -> Result<ChildHandle> {
        let mut delay_ms = BACKOFF_BASE_MS;
        loop {
            match self.spawn_once() {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_after_ms = delay_ms,
                        "transport spawn failed, retrying with backoff"
                    );
                    sleep(Duration::from_millis(delay_ms + jitter_ms(delay_ms))).await;
                    delay_ms = (delay_ms * 2).min(BACKOFF_CEILING_MS);
                }
            }
        }
    }

    fn spawn_once(&self) -> Result<ChildHandle> {
        let mut child = Command::new(&self.binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::TransportUnavailable {
                message: format!("spawn {}: {e}", self.binary_path.display()),
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RuntimeError::TransportUnavailable {
                message: "child has no stdin".to_string(),
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::TransportUnavailable {
                message: "child has no stdout".to_string(),
            })?;

        info!(path = %self.binary_path.display(), pid = child.id(), "transport process spawned");

        Ok(ChildHandle {
            child,
            writer: FramedWrite::new(stdin, LineCodec::default()),
            reader: FramedRead::new(stdout, LineCodec::default()),
        })
    }

    async fn call(&self, op: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        self.ensure_spawned().await?;
        let request = RpcRequest::new(op, args);
        let line = request.to_line()?;

        let mut guard = self.inner.lock().await;
        let handle = guard.as_mut().expect("ensure_spawned just populated this");

        if handle.writer.send(line).await.is_err() {
            *guard = None;
            return Err(RuntimeError::TransportUnavailable {
                message: "write to transport failed".to_string(),
            });
        }

        let response = tokio::time::timeout(CALL_TIMEOUT, handle.reader.next()).await;
        match response {
            Ok(Some(Ok(reply_line))) => {
                let reply = RpcResponse::from_line(&reply_line)?;
                if reply.ok {
                    Ok(reply.data.unwrap_or(serde_json::Value::Null))
                } else {
                    let error = reply.error.unwrap_or(msgcode_protocol::linecodec::RpcErrorShape {
                        code: "TRANSPORT_UNAVAILABLE".to_string(),
                        message: "transport returned no error detail".to_string(),
                    });
                    Err(RuntimeError::ProviderError {
                        message: format!("{}: {}", error.code, error.message),
                    })
                }
            }
            Ok(Some(Err(e))) => {
                *guard = None;
                Err(RuntimeError::TransportUnavailable {
                    message: e.to_string(),
                })
            }
            Ok(None) => {
                *guard = None;
                Err(RuntimeError::TransportUnavailable {
                    message: "transport closed its stdout".to_string(),
                })
            }
            Err(_) => Err(RuntimeError::TransportTimeout),
        }
    }

    /// List messages newer than `since` (an opaque transport rowid/rowid-like
    /// cursor supplied as milliseconds-since-epoch or rowid, per the binary's
    /// own convention).
    pub async fn list(&self, since: i64) -> Result<Vec<Message>> {
        let data = self
            .call("list", serde_json::json!({ "since": since }))
            .await?;
        let messages: Vec<Message> =
            serde_json::from_value(data).map_err(RuntimeError::Serialization)?;
        Ok(messages
            .into_iter()
            .map(|mut m| {
                m.chat_id = crate::normalize::normalize_chat_id(&m.chat_id);
                m.sender_id = crate::normalize::normalize_sender_identity(&m.sender_id);
                m
            })
            .collect())
    }

    pub async fn send(&self, chat_id: &str, payload: crate::types::OutboundPayload) -> Result<Ack> {
        let data = self
            .call(
                "send",
                serde_json::json!({ "chatId": chat_id, "payload": payload }),
            )
            .await?;
        serde_json::from_value(data).map_err(RuntimeError::Serialization)
    }

    pub async fn mark(&self, chat_id: &str, rowid: i64) -> Result<()> {
        self.call("mark", serde_json::json!({ "chatId": chat_id, "rowid": rowid }))
            .await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut handle) = guard.take() {
            let _ = handle.child.kill().await;
        }
    }
}

fn jitter_ms(base_ms: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u64;
    let max_jitter = ((base_ms as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        0
    } else {
        nanos % max_jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_binary_path_from_env_fallback() {
        std::env::remove_var("MSGCODE_TRANSPORT_PATH");
        std::env::set_var("IMSG_PATH", "/usr/local/bin/imsg");
        let adapter = TransportAdapter::new("/default/path");
        assert_eq!(adapter.binary_path, PathBuf::from("/usr/local/bin/imsg"));
        std::env::remove_var("IMSG_PATH");
    }

    #[test]
    fn jitter_stays_within_fraction() {
        for _ in 0..20 {
            let j = jitter_ms(1000);
            assert!(j < 250);
        }
    }
}
