//! ROM Client Library
//!
//! Client-side protocol layer for a Remote Object Model server: create
//! objects in a remote process, invoke operations on them, subscribe to
//! their events and release them.
//!
//! - `client` - the [`RomClient`] facade (blocking, continuation and async calls)
//! - `encoder` / `decoder` - wire shapes for requests and replies
//! - `dispatcher` - encode, send, decode; shared by all calling conventions
//! - `events` - routing of server-pushed `onEvent` messages
//! - `transport` - the transport boundary plus socket and mock implementations
//!
//! # Example
//!
//! ```ignore
//! use rom_client::{ClientConfig, ResultType, RomClient, RomEvent};
//!
//! let client = RomClient::connect(&ClientConfig::from_env())?;
//! client.set_event_handler(|event: RomEvent| println!("{}: {}", event.event_type, event.data));
//!
//! let player = client.create("PlayerEndpoint", None)?;
//! client.subscribe(&player, "EndOfStream")?;
//! client.invoke(&player, "play", None, ResultType::Void)?;
//! ```

pub mod client;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use client::RomClient;
pub use config::{default_socket_path, ClientConfig};
pub use decoder::{decode, decode_as, extract_subscription_id};
pub use dispatcher::{Continuation, Dispatcher};
pub use encoder::{encode, Operation, WireRequest};
pub use error::{DecodeError, RomError, TransportError};
pub use events::{parse_event, EventRouter, RomEventHandler};
pub use transport::{MockTransport, PushMessage, SocketTransport, Transport};
pub use types::{
    ObjectRef, Params, PrimitiveKind, ResultType, RomEvent, Subscription, SubscriptionId,
};
