//! The client facade: create, invoke, subscribe to and release remote objects.
//!
//! Every operation comes in three flavours sharing one encode/decode core:
//! a blocking call returning `Result`, a `_with` call completing a
//! [`Continuation`], and an `_async` call returning a future.
//!
//! # Threading
//!
//! The client owns no I/O threads. Continuations run on the transport's
//! completion thread. Event handlers run on the client's `rom-events`
//! thread and may call back into the client, including blocking calls.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::decoder::{extract_subscription_id, scalar_as_string};
use crate::dispatcher::{continuation_pair, Continuation, Dispatcher};
use crate::encoder::Operation;
use crate::error::{DecodeError, RomError, TransportError};
use crate::events::{EventPump, EventRouter, RomEventHandler};
use crate::transport::{SocketTransport, Transport};
use crate::types::{ObjectRef, Params, ResultType, Subscription};

/// Client for objects living in a remote process.
///
/// # Example
///
/// ```ignore
/// use rom_client::{ClientConfig, ResultType, RomClient};
///
/// let client = RomClient::connect(&ClientConfig::from_env())?;
/// let pipeline = client.create("MediaPipeline", None)?;
/// let uri = client.invoke(&pipeline, "getName", None, ResultType::string())?;
/// client.release(&pipeline)?;
/// client.destroy()?;
/// ```
pub struct RomClient {
    dispatcher: Dispatcher,
    router: EventRouter,
    pump: Mutex<EventPump>,
    destroyed: AtomicBool,
}

impl RomClient {
    /// Build a client that exclusively owns `transport`.
    pub fn new<T: Transport + 'static>(transport: T) -> Result<Self, RomError> {
        Self::with_transport(Arc::new(transport))
    }

    /// Build a client over a shared transport handle.
    ///
    /// The client still treats the connection as its own: `destroy()` closes it.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Result<Self, RomError> {
        let router = EventRouter::new();
        let pump = EventPump::spawn(router.clone()).map_err(TransportError::Io)?;
        transport.set_push_handler(pump.push_handler());

        Ok(Self {
            dispatcher: Dispatcher::new(transport),
            router,
            pump: Mutex::new(pump),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Connect over a Unix socket.
    pub fn connect(config: &ClientConfig) -> Result<Self, RomError> {
        Self::new(SocketTransport::connect(config)?)
    }

    fn live(&self) -> Result<(), RomError> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(RomError::Destroyed)
        } else {
            Ok(())
        }
    }

    // ==================== create ====================

    /// Create a remote object of `class_name` and return its reference.
    pub fn create(&self, class_name: &str, params: Option<Params>) -> Result<ObjectRef, RomError> {
        self.live()?;
        self.dispatcher
            .call_map(&create_op(class_name, params), object_ref_from_reply)
    }

    pub fn create_with(
        &self,
        class_name: &str,
        params: Option<Params>,
        cont: Continuation<ObjectRef>,
    ) {
        if let Err(e) = self.live() {
            return cont.on_error(e);
        }
        self.dispatcher
            .call_map_with(&create_op(class_name, params), object_ref_from_reply, cont);
    }

    pub fn create_async(
        &self,
        class_name: &str,
        params: Option<Params>,
    ) -> impl Future<Output = Result<ObjectRef, RomError>> + Send + 'static {
        let (cont, fut) = continuation_pair();
        self.create_with(class_name, params, cont);
        fut
    }

    // ==================== invoke ====================

    /// Invoke `operation` on `object`, decoding the reply as `returns`.
    ///
    /// Returns `None` for `Void` and for an empty reply.
    pub fn invoke(
        &self,
        object: &ObjectRef,
        operation: &str,
        params: Option<Params>,
        returns: ResultType,
    ) -> Result<Option<Value>, RomError> {
        self.live()?;
        self.dispatcher
            .call(&invoke_op(object, operation, params, returns))
    }

    /// Like [`invoke`](Self::invoke), then deserialize into `T`.
    pub fn invoke_as<T: DeserializeOwned>(
        &self,
        object: &ObjectRef,
        operation: &str,
        params: Option<Params>,
        returns: ResultType,
    ) -> Result<Option<T>, RomError> {
        self.invoke(object, operation, params, returns)?
            .map(|value| serde_json::from_value(value).map_err(DecodeError::from))
            .transpose()
            .map_err(RomError::from)
    }

    pub fn invoke_with(
        &self,
        object: &ObjectRef,
        operation: &str,
        params: Option<Params>,
        returns: ResultType,
        cont: Continuation<Option<Value>>,
    ) {
        if let Err(e) = self.live() {
            return cont.on_error(e);
        }
        self.dispatcher
            .call_with(&invoke_op(object, operation, params, returns), cont);
    }

    pub fn invoke_async(
        &self,
        object: &ObjectRef,
        operation: &str,
        params: Option<Params>,
        returns: ResultType,
    ) -> impl Future<Output = Result<Option<Value>, RomError>> + Send + 'static {
        let (cont, fut) = continuation_pair();
        self.invoke_with(object, operation, params, returns, cont);
        fut
    }

    // ==================== release ====================

    /// Release `object` on the remote side. Any reply payload is ignored.
    pub fn release(&self, object: &ObjectRef) -> Result<(), RomError> {
        self.live()?;
        self.dispatcher.call_map(&release_op(object), |_| Ok(()))
    }

    pub fn release_with(&self, object: &ObjectRef, cont: Continuation<()>) {
        if let Err(e) = self.live() {
            return cont.on_error(e);
        }
        self.dispatcher
            .call_map_with(&release_op(object), |_| Ok(()), cont);
    }

    pub fn release_async(
        &self,
        object: &ObjectRef,
    ) -> impl Future<Output = Result<(), RomError>> + Send + 'static {
        let (cont, fut) = continuation_pair();
        self.release_with(object, cont);
        fut
    }

    // ==================== subscribe ====================

    /// Subscribe to `event_type` on `object`.
    ///
    /// Events arrive at the handler installed with
    /// [`set_event_handler`](Self::set_event_handler).
    pub fn subscribe(&self, object: &ObjectRef, event_type: &str) -> Result<Subscription, RomError> {
        self.live()?;
        self.dispatcher.call_map(
            &subscribe_op(object, event_type),
            subscription_from_reply(object, event_type),
        )
    }

    pub fn subscribe_with(
        &self,
        object: &ObjectRef,
        event_type: &str,
        cont: Continuation<Subscription>,
    ) {
        if let Err(e) = self.live() {
            return cont.on_error(e);
        }
        self.dispatcher.call_map_with(
            &subscribe_op(object, event_type),
            subscription_from_reply(object, event_type),
            cont,
        );
    }

    pub fn subscribe_async(
        &self,
        object: &ObjectRef,
        event_type: &str,
    ) -> impl Future<Output = Result<Subscription, RomError>> + Send + 'static {
        let (cont, fut) = continuation_pair();
        self.subscribe_with(object, event_type, cont);
        fut
    }

    // ==================== events & lifecycle ====================

    /// Install the single event handler, replacing any previous one.
    pub fn set_event_handler<H: RomEventHandler + 'static>(&self, handler: H) {
        self.router.set_handler(Arc::new(handler));
    }

    /// Remove the event handler. Later events are dropped.
    pub fn clear_event_handler(&self) {
        self.router.clear_handler();
    }

    /// Close the underlying connection.
    ///
    /// Only the first call does anything; later calls return `Ok(())`. A
    /// failing close is reported as [`RomError::Close`].
    pub fn destroy(&self) -> Result<(), RomError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("ROM client already destroyed");
            return Ok(());
        }

        info!("Destroying ROM client");
        let closed = self.dispatcher.transport().close();

        self.pump
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .shutdown();

        closed.map_err(|e| {
            warn!("Failed to close ROM transport: {}", e);
            RomError::Close(e)
        })
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for RomClient {
    fn drop(&mut self) {
        if !self.is_destroyed() {
            debug!("ROM client dropped without destroy(); closing connection");
            if let Err(e) = self.destroy() {
                warn!("Error destroying ROM client on drop: {}", e);
            }
        }
    }
}

fn create_op(class_name: &str, params: Option<Params>) -> Operation {
    Operation::Create {
        class_name: class_name.to_string(),
        params,
    }
}

fn invoke_op(
    object: &ObjectRef,
    operation: &str,
    params: Option<Params>,
    returns: ResultType,
) -> Operation {
    Operation::Invoke {
        object: object.clone(),
        operation: operation.to_string(),
        params,
        returns,
    }
}

fn release_op(object: &ObjectRef) -> Operation {
    Operation::Release {
        object: object.clone(),
    }
}

fn subscribe_op(object: &ObjectRef, event_type: &str) -> Operation {
    Operation::Subscribe {
        object: object.clone(),
        event_type: event_type.to_string(),
    }
}

fn object_ref_from_reply(decoded: Option<Value>) -> Result<ObjectRef, RomError> {
    let value = decoded.ok_or(DecodeError::MissingResult { operation: "create" })?;
    Ok(ObjectRef::new(scalar_as_string(&value)?))
}

fn subscription_from_reply(
    object: &ObjectRef,
    event_type: &str,
) -> impl FnOnce(Option<Value>) -> Result<Subscription, RomError> + Send + 'static {
    let object = object.clone();
    let event_type = event_type.to_string();
    move |decoded| {
        let id = extract_subscription_id(decoded.as_ref())?;
        Ok(Subscription {
            id,
            object,
            event_type,
        })
    }
}
