//! # Listener Task
//!
//! Bind, report, accept until told to stop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ch_02_process_bus::CommandSender;
use parking_lot::Mutex;
use shared_types::{ServiceDescriptor, ServiceRole};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::handler::ConnectionHandler;

/// A spawned accept loop. Dropping it signals the loop to stop without
/// waiting for it.
pub struct RunningListener {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RunningListener {
    /// Spawn the bind-and-accept task for `addr` on `runtime`.
    pub fn spawn(
        runtime: &Handle,
        role: ServiceRole,
        addr: SocketAddr,
        handler: Arc<dyn ConnectionHandler>,
        descriptor: Arc<Mutex<ServiceDescriptor>>,
        commands: CommandSender,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = runtime.spawn(serve(
            role,
            addr,
            handler,
            descriptor,
            commands,
            shutdown_rx,
        ));
        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Signal the accept loop and wait up to `timeout` for it to release
    /// the socket. Returns `false` when the wait timed out.
    pub fn stop(mut self, runtime: &Handle, timeout: Duration) -> bool {
        let _ = self.shutdown.send(true);
        let Some(task) = self.task.take() else {
            return true;
        };
        runtime
            .block_on(async { tokio::time::timeout(timeout, task).await })
            .is_ok()
    }
}

impl Drop for RunningListener {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn serve(
    role: ServiceRole,
    addr: SocketAddr,
    handler: Arc<dyn ConnectionHandler>,
    descriptor: Arc<Mutex<ServiceDescriptor>>,
    commands: CommandSender,
    mut shutdown: watch::Receiver<bool>,
) {
    let bound = match TcpListener::bind(addr).await {
        Ok(listener) => listener.local_addr().map(|local| (listener, local)),
        Err(e) => Err(e),
    };
    let (listener, local) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            error!(role = %role, %addr, error = %e, "Bind failed");
            let _ = commands.listener_failed(role, addr, e);
            return;
        }
    };

    descriptor.lock().mark_bound(local.port());
    info!(role = %role, addr = %local, "Content server listening");
    if commands.listener_bound(role, local).is_err() {
        debug!(role = %role, "Bus gone before bind was reported");
        return;
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(stream, peer).await {
                            debug!(%peer, error = %e, "Connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(role = %role, error = %e, "Accept failed"),
            }
        }
    }
    info!(role = %role, addr = %local, "Content server stopped");
}
