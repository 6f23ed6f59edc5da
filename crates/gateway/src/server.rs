//! Transport Listeners
//!
//! Accepts TCP clients and serves the serial port, running one protocol
//! session per connection. Live sessions are tracked in a [`SessionTable`]
//! for the `PS` maintenance command.

use crate::config::SerialSettings;
use crate::error::GatewayError;
use elm_protocol::{Session, SessionContext, StreamTransport};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

/// Delay before reopening a serial port that failed to open
const SERIAL_RETRY: Duration = Duration::from_secs(1);

/// One live session
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub id: u64,
    pub label: String,
    pub started: Instant,
}

#[derive(Default)]
struct TableInner {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<u64, SessionEntry>>,
}

impl TableInner {
    fn entries(&self) -> MutexGuard<'_, BTreeMap<u64, SessionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of connected sessions
#[derive(Clone, Default)]
pub struct SessionTable {
    inner: Arc<TableInner>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session until the returned guard is dropped
    pub fn register(&self, label: impl Into<String>) -> SessionGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = SessionEntry {
            id,
            label: label.into(),
            started: Instant::now(),
        };
        let live = {
            let mut entries = self.inner.entries();
            entries.insert(id, entry);
            entries.len()
        };
        metrics::gauge!("elm_sessions_active").set(live as f64);
        SessionGuard {
            table: self.clone(),
            id,
        }
    }

    /// Snapshot ordered by session id
    pub fn list(&self) -> Vec<SessionEntry> {
        self.inner.entries().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        let live = {
            let mut entries = self.inner.entries();
            entries.remove(&id);
            entries.len()
        };
        metrics::gauge!("elm_sessions_active").set(live as f64);
    }
}

/// Removes its session from the table on drop
pub struct SessionGuard {
    table: SessionTable,
    id: u64,
}

impl SessionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

/// Bind the TCP listener
pub async fn bind_tcp(addr: &str) -> Result<TcpListener, GatewayError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening for clients on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept clients until shutdown; each gets its own session task
pub async fn serve_tcp(
    listener: TcpListener,
    ctx: Arc<SessionContext>,
    table: SessionTable,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), GatewayError> {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer = %peer, "set_nodelay failed: {}", e);
                }

                let label = format!("tcp:{}", peer);
                let guard = table.register(label.clone());
                metrics::counter!("elm_sessions_total", "transport" => "tcp").increment(1);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let transport = Box::new(StreamTransport::new(label.clone(), stream));
                    if let Err(e) = Session::new(ctx).run(transport).await {
                        warn!(session = %label, "Session failed: {}", e);
                    }
                    drop(guard);
                });
            }
        }
    }

    info!("TCP listener stopped");
    Ok(())
}

/// Serve the serial port, reopening it after every session
pub async fn run_serial(
    settings: SerialSettings,
    ctx: Arc<SessionContext>,
    table: SessionTable,
    mut shutdown: watch::Receiver<bool>,
) {
    let label = format!("serial:{}", settings.device);
    info!(
        "Serving {} at {} baud",
        settings.device, settings.baud_rate
    );

    while !*shutdown.borrow() {
        let port = match tokio_serial::new(&settings.device, settings.baud_rate)
            .open_native_async()
        {
            Ok(port) => port,
            Err(e) => {
                error!(session = %label, "Failed to open serial port: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(SERIAL_RETRY) => continue,
                    _ = shutdown.changed() => break,
                }
            }
        };

        let _guard = table.register(label.clone());
        metrics::counter!("elm_sessions_total", "transport" => "serial").increment(1);
        let transport = Box::new(StreamTransport::new(label.clone(), port));

        tokio::select! {
            result = Session::new(Arc::clone(&ctx)).run(transport) => {
                if let Err(e) = result {
                    warn!(session = %label, "Session failed: {}", e);
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("Serial transport stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_bus::{MonotonicClock, Simulator, SimulatorConfig, SubscriptionRegistry};
    use elm_protocol::{ident, NullControl};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn context() -> Arc<SessionContext> {
        let registry = SubscriptionRegistry::new();
        let clock = MonotonicClock::new();
        let simulator = Simulator::new(SimulatorConfig::default(), registry.clone(), clock);
        Arc::new(SessionContext::new(registry, simulator, Arc::new(NullControl)))
    }

    async fn read_until(stream: &mut TcpStream, suffix: &str) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let text = String::from_utf8_lossy(&out).to_string();
            if text.ends_with(suffix) {
                return text;
            }
            let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
                .await
                .expect("read timed out")
                .unwrap();
            assert!(n > 0, "connection closed, got {text:?}");
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_session_table() {
        let table = SessionTable::new();
        let first = table.register("tcp:a");
        let second = table.register("tcp:b");
        assert_eq!(table.len(), 2);
        assert_ne!(first.id(), second.id());

        let labels: Vec<_> = table.list().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["tcp:a", "tcp:b"]);

        drop(first);
        assert_eq!(table.len(), 1);
        drop(second);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_tcp_session_round_trip() {
        let listener = bind_tcp("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let table = SessionTable::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve_tcp(listener, context(), table.clone(), shutdown_rx));

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert_eq!(read_until(&mut client, ">").await, ">");
        assert_eq!(table.len(), 1);
        assert!(table.list()[0].label.starts_with("tcp:127.0.0.1:"));

        client.write_all(b"ATI\r").await.unwrap();
        let out = read_until(&mut client, ">").await;
        assert_eq!(out, format!("ATI\r\n\r\n{}\r\n>", ident::ELM_VERSION));

        client.write_all(&[0x04]).await.unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        while !table.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        shutdown_tx.send_replace(true);
        server.await.unwrap().unwrap();
    }
}
