//! Routing of server-pushed events to the registered handler.
//!
//! The transport's push hook only enqueues; a dedicated `rom-events` thread
//! drains the queue and calls the handler. A handler is therefore free to
//! issue blocking calls on the same client without stalling the transport
//! reader that has to deliver their replies.
//!
//! The router does not demultiplex by subscription. Every well-formed event
//! goes to the single registered handler.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::decoder::scalar_as_string;
use crate::encoder::{ONEVENT_DATA, ONEVENT_METHOD, ONEVENT_OBJECT, ONEVENT_SUBSCRIPTION, ONEVENT_TYPE};
use crate::error::RomError;
use crate::transport::PushMessage;
use crate::types::{ObjectRef, RomEvent, SubscriptionId};

/// Receiver of every event pushed on a client's connection.
///
/// Called on the client's event thread, never on the thread that subscribed.
pub trait RomEventHandler: Send + Sync {
    fn on_event(&self, event: RomEvent);
}

impl<F> RomEventHandler for F
where
    F: Fn(RomEvent) + Send + Sync,
{
    fn on_event(&self, event: RomEvent) {
        self(event)
    }
}

/// Holds the single handler slot and forwards parsed events to it.
#[derive(Clone, Default)]
pub struct EventRouter {
    handler: Arc<RwLock<Option<Arc<dyn RomEventHandler>>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler`, replacing any previous one.
    pub fn set_handler(&self, handler: Arc<dyn RomEventHandler>) {
        let mut slot = self
            .handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            debug!("Replacing ROM event handler");
        }
        *slot = Some(handler);
    }

    pub fn clear_handler(&self) {
        *self
            .handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Route one push message. Methods other than `onEvent` are dropped.
    pub fn route_message(&self, message: PushMessage) -> Result<(), RomError> {
        if message.method != ONEVENT_METHOD {
            debug!("Unhandled server push method: {}", message.method);
            return Ok(());
        }
        self.route(&message.params)
    }

    /// Parse an `onEvent` params object and forward it, undecoded.
    ///
    /// Fails without forwarding if any required field is missing.
    pub fn route(&self, params: &Value) -> Result<(), RomError> {
        let event = parse_event(params)?;

        // Clone out of the slot so a handler may replace itself.
        let handler = self
            .handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        match handler {
            Some(handler) => {
                debug!(
                    "Routing {} event from {} ({})",
                    event.event_type, event.object, event.subscription
                );
                handler.on_event(event);
            }
            None => debug!("No ROM event handler; dropping {} event", event.event_type),
        }
        Ok(())
    }
}

/// Extract `(object, subscription, type, data)` from an `onEvent` payload.
pub fn parse_event(params: &Value) -> Result<RomEvent, RomError> {
    let object = required_string(params, ONEVENT_OBJECT)?;
    let subscription = required_string(params, ONEVENT_SUBSCRIPTION)?;
    let event_type = required_string(params, ONEVENT_TYPE)?;
    let data = params
        .get(ONEVENT_DATA)
        .cloned()
        .ok_or_else(|| missing(ONEVENT_DATA, params))?;

    Ok(RomEvent {
        object: ObjectRef::new(object),
        subscription: SubscriptionId::new(subscription),
        event_type,
        data,
    })
}

fn required_string(params: &Value, field: &str) -> Result<String, RomError> {
    let value = params
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| missing(field, params))?;
    scalar_as_string(value).map_err(|_| {
        RomError::Protocol(format!(
            "Event field '{}' must be a scalar, got {}",
            field, value
        ))
    })
}

fn missing(field: &str, params: &Value) -> RomError {
    RomError::Protocol(format!("Event is missing required field '{}': {}", field, params))
}

/// Queue between the transport's push hook and the routing thread.
pub(crate) struct EventPump {
    sender: Arc<std::sync::Mutex<Option<Sender<PushMessage>>>>,
    handle: Option<JoinHandle<()>>,
}

impl EventPump {
    pub(crate) fn spawn(router: EventRouter) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<PushMessage>();

        let handle = thread::Builder::new()
            .name("rom-events".into())
            .spawn(move || {
                for message in rx {
                    let routed =
                        panic::catch_unwind(AssertUnwindSafe(|| router.route_message(message)));
                    match routed {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("Dropping server push: {}", e),
                        Err(_) => error!("ROM event handler panicked"),
                    }
                }
                debug!("ROM event thread exiting");
            })?;

        Ok(Self {
            sender: Arc::new(std::sync::Mutex::new(Some(tx))),
            handle: Some(handle),
        })
    }

    /// Push hook to register with the transport. Only enqueues.
    pub(crate) fn push_handler(&self) -> crate::transport::PushHandler {
        let sender = Arc::clone(&self.sender);
        Arc::new(move |message: PushMessage| {
            let guard = sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match guard.as_ref() {
                Some(tx) => {
                    if tx.send(message).is_err() {
                        warn!("ROM event thread is gone; dropping server push");
                    }
                }
                None => debug!("Client destroyed; dropping server push"),
            }
        })
    }

    /// Stop accepting pushes and wait for queued events to drain.
    ///
    /// Does not wait when called from the event thread itself.
    pub(crate) fn shutdown(&mut self) {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("ROM event thread panicked during shutdown");
            }
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}
