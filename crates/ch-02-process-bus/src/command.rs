//! # Command Queue
//!
//! Everything that can change the bus goes through this queue and is applied
//! by the dispatch thread in FIFO order.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use shared_types::{BusError, BusEvent, BusFailure, LifecycleState, ServiceRole};
use tokio::sync::{mpsc, oneshot};

/// Reply to a blocking command: the state once it has been applied.
pub(crate) type Reply = oneshot::Sender<Result<LifecycleState, BusError>>;

#[derive(Debug)]
pub(crate) enum Command {
    Transition(LifecycleState),
    Exit,
    ListenerBound {
        role: ServiceRole,
        addr: SocketAddr,
    },
    ListenerFailed {
        role: ServiceRole,
        addr: SocketAddr,
        reason: String,
    },
    Fail(BusFailure),
    /// Give up on startup if the bus is still STARTING.
    StartupTimeout(Duration),
    Publish {
        channel: String,
        event: BusEvent,
    },
}

#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) command: Command,
    pub(crate) reply: Option<Reply>,
}

/// Cloneable, non-blocking handle onto a bus's command queue.
///
/// Holding one does not keep the bus alive. Sends fail with
/// [`BusError::DispatcherGone`] once the dispatcher has stopped.
#[derive(Clone)]
pub struct CommandSender {
    bus: String,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl CommandSender {
    pub(crate) fn new(bus: String, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { bus, tx }
    }

    pub(crate) fn send(&self, command: Command, reply: Option<Reply>) -> Result<(), BusError> {
        self.tx
            .send(Envelope { command, reply })
            .map_err(|_| BusError::DispatcherGone)
    }

    /// Name of the bus this sender feeds.
    #[must_use]
    pub fn bus_name(&self) -> &str {
        &self.bus
    }

    /// Queue a transition request. Illegal requests are logged by the
    /// dispatcher and otherwise ignored.
    pub fn request(&self, to: LifecycleState) -> Result<(), BusError> {
        self.send(Command::Transition(to), None)
    }

    /// Queue a full shutdown, see [`ProcessBus::exit`](crate::ProcessBus::exit).
    pub fn exit(&self) -> Result<(), BusError> {
        self.send(Command::Exit, None)
    }

    /// Report that a listener bound `addr`.
    pub fn listener_bound(&self, role: ServiceRole, addr: SocketAddr) -> Result<(), BusError> {
        self.send(Command::ListenerBound { role, addr }, None)
    }

    /// Report that a listener could not bind `addr`. Promotes the bus to
    /// ERROR when it happens during startup.
    pub fn listener_failed(
        &self,
        role: ServiceRole,
        addr: SocketAddr,
        reason: impl fmt::Display,
    ) -> Result<(), BusError> {
        self.send(
            Command::ListenerFailed {
                role,
                addr,
                reason: reason.to_string(),
            },
            None,
        )
    }

    /// Report an unrecoverable failure. Moves the bus to ERROR.
    pub fn fail(&self, failure: BusFailure) -> Result<(), BusError> {
        self.send(Command::Fail(failure), None)
    }

    /// Publish `event` on `channel` from the dispatch thread.
    pub fn publish(&self, channel: impl Into<String>, event: BusEvent) -> Result<(), BusError> {
        self.send(
            Command::Publish {
                channel: channel.into(),
                event,
            },
            None,
        )
    }
}

impl fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSender")
            .field("bus", &self.bus)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
