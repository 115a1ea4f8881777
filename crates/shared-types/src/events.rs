//! # Bus Events
//!
//! The payload type carried on every bus channel. State channels are named
//! after [`LifecycleState::as_str`]; custom channels are listed in
//! [`channels`].

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::entities::{LifecycleState, ServiceRole, ServingPayload};
use crate::errors::BusFailure;

/// Names of the non-state channels.
pub mod channels {
    /// A listener finished binding. Payload: [`BusEvent::ListenerBound`](super::BusEvent::ListenerBound).
    pub const LISTENER_BOUND: &str = "LISTENER_BOUND";
    /// A listener failed to bind. Payload: [`BusEvent::ListenerFailed`](super::BusEvent::ListenerFailed).
    pub const LISTENER_FAILED: &str = "LISTENER_FAILED";
    /// The discovery record went out on the local network.
    pub const ANNOUNCED: &str = "ANNOUNCED";
}

/// Payload published on a bus channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    /// Published on every state channel except SERVING and ERROR.
    Entered {
        from: LifecycleState,
        to: LifecycleState,
    },
    /// Published on SERVING once every listener has bound.
    Serving(ServingPayload),
    /// Published on ERROR with the failures that caused it.
    Failed { failures: Vec<BusFailure> },
    ListenerBound {
        role: ServiceRole,
        addr: SocketAddr,
    },
    ListenerFailed {
        role: ServiceRole,
        addr: SocketAddr,
        reason: String,
    },
    /// Free-form plugin event.
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

impl BusEvent {
    /// The SERVING payload, when this is a SERVING event.
    #[must_use]
    pub fn serving(&self) -> Option<ServingPayload> {
        match self {
            BusEvent::Serving(payload) => Some(*payload),
            _ => None,
        }
    }

    /// Target state of a state event. SERVING and ERROR events have no
    /// `from`, so only the target is reported.
    #[must_use]
    pub fn entered(&self) -> Option<LifecycleState> {
        match self {
            BusEvent::Entered { to, .. } => Some(*to),
            BusEvent::Serving(_) => Some(LifecycleState::Serving),
            BusEvent::Failed { .. } => Some(LifecycleState::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serving_accessor() {
        let event = BusEvent::Serving(ServingPayload {
            port: 9000,
            zip_port: None,
        });
        assert_eq!(event.serving().map(|p| p.port), Some(9000));
        assert_eq!(event.entered(), Some(LifecycleState::Serving));

        let entered = BusEvent::Entered {
            from: LifecycleState::Idle,
            to: LifecycleState::Starting,
        };
        assert!(entered.serving().is_none());
        assert_eq!(entered.entered(), Some(LifecycleState::Starting));
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = BusEvent::Entered {
            from: LifecycleState::Serving,
            to: LifecycleState::Stopping,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "entered");
        assert_eq!(json["to"], "STOPPING");
    }

    #[test]
    fn test_custom_event_round_trips_data() {
        let event = BusEvent::Custom {
            name: "announced".into(),
            data: serde_json::json!({ "port": 8080 }),
        };
        let text = serde_json::to_string(&event).unwrap();
        let back: BusEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
