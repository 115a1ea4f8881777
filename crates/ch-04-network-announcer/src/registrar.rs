//! # Discovery Registrar Port
//!
//! Where discovery records go. Calls are synchronous: they run on the bus
//! dispatch thread and must return promptly, so adapters that talk to the
//! network keep their I/O on a runtime task.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use host_telemetry::metrics::ANNOUNCEMENTS_SENT;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::record::{Announcement, DiscoveryRecord};

/// Multicast group the UDP announcer sends to.
pub const DEFAULT_GROUP: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(239, 255, 42, 99), 45454));

/// Gap between repeated hello datagrams.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on waiting for an announcement task to send its goodbye.
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors from registering or withdrawing a record.
#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("announcement socket error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot encode announcement: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("registrar rejected {instance}: {reason}")]
    Rejected { instance: String, reason: String },
}

/// Outbound port for publishing a discovery record.
pub trait DiscoveryRegistrar: Send + Sync {
    /// Advertise `record`, replacing any earlier record for the same
    /// instance.
    fn register(&self, record: &DiscoveryRecord) -> Result<(), AnnounceError>;

    /// Withdraw the record for `instance`. Returns `false` when nothing was
    /// registered under that name.
    fn deregister(&self, instance: &str) -> Result<bool, AnnounceError>;
}

// ============================================================================
// InMemoryRegistrar
// ============================================================================

/// Keeps records in memory. Used in tests and when announcing is disabled
/// but the host still wants to know what would have been advertised.
#[derive(Debug, Default)]
pub struct InMemoryRegistrar {
    records: Mutex<BTreeMap<String, DiscoveryRecord>>,
    registrations: Mutex<u64>,
}

impl InMemoryRegistrar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn record(&self, instance: &str) -> Option<DiscoveryRecord> {
        self.records.lock().get(instance).cloned()
    }

    #[must_use]
    pub fn is_registered(&self, instance: &str) -> bool {
        self.records.lock().contains_key(instance)
    }

    /// Total `register` calls so far.
    #[must_use]
    pub fn registrations(&self) -> u64 {
        *self.registrations.lock()
    }
}

impl DiscoveryRegistrar for InMemoryRegistrar {
    fn register(&self, record: &DiscoveryRecord) -> Result<(), AnnounceError> {
        self.records
            .lock()
            .insert(record.instance.clone(), record.clone());
        *self.registrations.lock() += 1;
        Ok(())
    }

    fn deregister(&self, instance: &str) -> Result<bool, AnnounceError> {
        Ok(self.records.lock().remove(instance).is_some())
    }
}

// ============================================================================
// UdpAnnouncer
// ============================================================================

struct ActiveAnnouncement {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Repeats a JSON hello datagram to a multicast group while registered and
/// sends a goodbye when withdrawn.
pub struct UdpAnnouncer {
    runtime: Handle,
    target: SocketAddr,
    interval: Duration,
    active: Mutex<HashMap<String, ActiveAnnouncement>>,
}

impl UdpAnnouncer {
    /// Announce to [`DEFAULT_GROUP`] every [`DEFAULT_INTERVAL`].
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self::with_target(runtime, DEFAULT_GROUP, DEFAULT_INTERVAL)
    }

    #[must_use]
    pub fn with_target(runtime: Handle, target: SocketAddr, interval: Duration) -> Self {
        Self {
            runtime,
            target,
            interval,
            active: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    fn open_socket(&self) -> Result<UdpSocket, AnnounceError> {
        let local: SocketAddr = match self.target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = std::net::UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        let _runtime = self.runtime.enter();
        let socket = UdpSocket::from_std(socket)?;
        if self.target.ip().is_multicast() {
            if let SocketAddr::V4(_) = self.target {
                // Stay on the local link.
                socket.set_multicast_ttl_v4(1)?;
            }
        }
        Ok(socket)
    }

    fn stop(&self, active: ActiveAnnouncement) {
        let _ = active.shutdown.send(true);
        // Inside a runtime we cannot block; the task still sends its goodbye.
        if Handle::try_current().is_err() {
            let finished = self
                .runtime
                .block_on(async { tokio::time::timeout(GOODBYE_TIMEOUT, active.task).await });
            if finished.is_err() {
                warn!(target = %self.target, "Announcement task did not stop in time");
            }
        }
    }
}

impl DiscoveryRegistrar for UdpAnnouncer {
    fn register(&self, record: &DiscoveryRecord) -> Result<(), AnnounceError> {
        let hello = Announcement::Hello {
            record: record.clone(),
        }
        .to_bytes()?;
        let goodbye = Announcement::Goodbye {
            instance: record.instance.clone(),
        }
        .to_bytes()?;
        let socket = self.open_socket()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = self.runtime.spawn(announce(
            socket,
            self.target,
            self.interval,
            hello,
            goodbye,
            shutdown_rx,
        ));

        let previous = self.active.lock().insert(
            record.instance.clone(),
            ActiveAnnouncement { shutdown, task },
        );
        if let Some(previous) = previous {
            self.stop(previous);
        }
        info!(
            instance = %record.instance,
            port = record.port,
            target = %self.target,
            "Announcing on local network"
        );
        Ok(())
    }

    fn deregister(&self, instance: &str) -> Result<bool, AnnounceError> {
        let Some(active) = self.active.lock().remove(instance) else {
            return Ok(false);
        };
        self.stop(active);
        info!(instance = %instance, "Announcement withdrawn");
        Ok(true)
    }
}

impl Drop for UdpAnnouncer {
    fn drop(&mut self) {
        for (_, active) in self.active.lock().drain() {
            let _ = active.shutdown.send(true);
        }
    }
}

async fn announce(
    socket: UdpSocket,
    target: SocketAddr,
    interval: Duration,
    hello: Vec<u8>,
    goodbye: Vec<u8>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => match socket.send_to(&hello, target).await {
                Ok(_) => ANNOUNCEMENTS_SENT.inc(),
                Err(e) => warn!(%target, error = %e, "Announcement not sent"),
            }
        }
    }
    if let Err(e) = socket.send_to(&goodbye, target).await {
        debug!(%target, error = %e, "Goodbye not sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;

    fn receive(socket: &std::net::UdpSocket) -> Announcement {
        let mut buf = [0u8; 2048];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        Announcement::from_bytes(&buf[..len]).unwrap()
    }

    #[test]
    fn test_in_memory_register_replaces_and_deregisters() {
        let registrar = InMemoryRegistrar::new();
        registrar
            .register(&DiscoveryRecord::new("host", 8000))
            .unwrap();
        registrar
            .register(&DiscoveryRecord::new("host", 8001))
            .unwrap();

        assert_eq!(registrar.record("host").unwrap().port, 8001);
        assert_eq!(registrar.registrations(), 2);
        assert!(registrar.deregister("host").unwrap());
        assert!(!registrar.deregister("host").unwrap());
        assert!(!registrar.is_registered("host"));
    }

    #[test]
    fn test_udp_announcer_sends_hello_then_goodbye() {
        let runtime = Runtime::new().unwrap();
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let announcer = UdpAnnouncer::with_target(
            runtime.handle().clone(),
            receiver.local_addr().unwrap(),
            Duration::from_millis(50),
        );

        announcer
            .register(&DiscoveryRecord::new("host", 8123))
            .unwrap();
        match receive(&receiver) {
            Announcement::Hello { record } => assert_eq!(record.port, 8123),
            other => panic!("expected hello, got {other:?}"),
        }

        assert!(announcer.deregister("host").unwrap());
        // Hellos sent before the withdrawal may still be queued.
        let goodbye = (0..100)
            .map(|_| receive(&receiver))
            .find(|a| matches!(a, Announcement::Goodbye { .. }));
        assert_eq!(
            goodbye,
            Some(Announcement::Goodbye {
                instance: "host".into()
            })
        );
    }

    #[test]
    fn test_udp_deregister_unknown_instance_is_false() {
        let runtime = Runtime::new().unwrap();
        let announcer = UdpAnnouncer::new(runtime.handle().clone());
        assert!(!announcer.deregister("nobody").unwrap());
        assert_eq!(announcer.target(), DEFAULT_GROUP);
    }
}
