//! End-to-end tests: `RomClient` over a real `SocketTransport`.
//!
//! The server side is a scripted fake running on the other end of a
//! `UnixStream::pair()`. It answers each JSON-RPC request with whatever the
//! test's responder returns and can push `onEvent` messages at any time.
//!
//! # Running
//!
//! ```bash
//! cargo test --test client_integration -- --nocapture
//! ```

use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use rom_client::transport::{read_message, write_message};
use rom_client::{
    Continuation, DecodeError, ObjectRef, ResultType, RomClient, RomError, RomEvent,
    SocketTransport, TransportError,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// What the fake server sends back for one request.
enum Reply {
    Result(Value),
    /// A response carrying neither `result` nor `error`.
    Empty,
    Error(i64, &'static str),
}

type Responder = Box<dyn Fn(&str, &Value) -> Reply + Send>;

struct FakeServer {
    writer: Arc<Mutex<UnixStream>>,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    acks: Arc<Mutex<Vec<Value>>>,
    handle: Option<JoinHandle<()>>,
    next_push_id: u64,
}

impl FakeServer {
    fn spawn(stream: UnixStream, responder: Responder) -> Self {
        let writer = Arc::new(Mutex::new(stream.try_clone().expect("clone server stream")));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let acks = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let writer = Arc::clone(&writer);
            let requests = Arc::clone(&requests);
            let acks = Arc::clone(&acks);
            thread::spawn(move || {
                let mut reader = BufReader::new(stream);
                while let Ok(Some(body)) = read_message(&mut reader) {
                    let message: Value = serde_json::from_str(&body).expect("valid JSON from client");
                    let Some(method) = message["method"].as_str() else {
                        acks.lock().unwrap().push(message["id"].clone());
                        continue;
                    };
                    requests
                        .lock()
                        .unwrap()
                        .push((method.to_string(), message["params"].clone()));

                    let id = message["id"].clone();
                    let response = match responder(method, &message["params"]) {
                        Reply::Result(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                        Reply::Empty => json!({"jsonrpc": "2.0", "id": id}),
                        Reply::Error(code, text) => json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {"code": code, "message": text}
                        }),
                    };
                    let mut w = writer.lock().unwrap();
                    if write_message(&mut *w, &response.to_string()).is_err() {
                        break;
                    }
                }
            })
        };

        Self {
            writer,
            requests,
            acks,
            handle: Some(handle),
            next_push_id: 9000,
        }
    }

    /// Push an `onEvent` request to the client.
    fn push_event(&mut self, params: Value) {
        self.next_push_id += 1;
        let message = json!({
            "jsonrpc": "2.0",
            "id": self.next_push_id,
            "method": "onEvent",
            "params": params,
        });
        let mut w = self.writer.lock().unwrap();
        write_message(&mut *w, &message.to_string()).expect("push event");
    }

    fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    /// Wait until the client hangs up.
    fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("fake server thread panicked");
        }
    }
}

fn connect(responder: impl Fn(&str, &Value) -> Reply + Send + 'static) -> (RomClient, FakeServer) {
    let (client_end, server_end) = UnixStream::pair().expect("socket pair");
    let server = FakeServer::spawn(server_end, Box::new(responder));
    let transport = SocketTransport::from_stream(client_end, TEST_TIMEOUT).expect("transport");
    let client = RomClient::new(transport).expect("client");
    (client, server)
}

fn event_channel(client: &RomClient) -> Receiver<RomEvent> {
    let (tx, rx) = mpsc::channel();
    client.set_event_handler(move |event: RomEvent| {
        let _ = tx.send(event);
    });
    rx
}

#[test]
fn test_create_and_void_invoke_with_empty_payload() {
    let (client, server) = connect(|method, _| match method {
        "create" => Reply::Result(json!({"value": "MediaPipeline-1"})),
        _ => Reply::Empty,
    });

    let pipeline = client
        .create("MediaPipeline", json!({"latency": 10}).as_object().cloned())
        .unwrap();
    assert_eq!(pipeline, ObjectRef::new("MediaPipeline-1"));

    let result = client
        .invoke(&pipeline, "play", Some(Default::default()), ResultType::Void)
        .unwrap();
    assert_eq!(result, None);

    client.release(&pipeline).unwrap();
    client.destroy().unwrap();

    assert_eq!(
        server.requests(),
        vec![
            (
                "create".to_string(),
                json!({"type": "MediaPipeline", "constructorParams": {"latency": 10}})
            ),
            (
                "invoke".to_string(),
                json!({"object": "MediaPipeline-1", "operation": "play", "operationParams": {}})
            ),
            ("release".to_string(), json!({"object": "MediaPipeline-1"})),
        ]
    );
    server.join();
}

#[test]
fn test_invoke_decodes_bare_and_enveloped_scalars() {
    let (client, _server) = connect(|_, params| match params["operation"].as_str() {
        Some("getUri") => Reply::Result(json!("file:///tmp/a.webm")),
        Some("getVolume") => Reply::Result(json!({"value": 0.5})),
        Some("getTags") => Reply::Result(json!({"value": ["a", "b"]})),
        Some("getStats") => Reply::Result(json!({"packets": 3})),
        _ => Reply::Result(json!([1, 2])),
    });
    let obj = ObjectRef::new("p1");

    let uri = client.invoke(&obj, "getUri", None, ResultType::string()).unwrap();
    assert_eq!(uri, Some(json!("file:///tmp/a.webm")));

    let volume = client.invoke(&obj, "getVolume", None, ResultType::float()).unwrap();
    assert_eq!(volume, Some(json!(0.5)));

    let tags: Option<Vec<String>> = client
        .invoke_as(&obj, "getTags", None, ResultType::list_of(ResultType::string()))
        .unwrap();
    assert_eq!(tags, Some(vec!["a".to_string(), "b".to_string()]));

    let stats = client.invoke(&obj, "getStats", None, ResultType::Object).unwrap();
    assert_eq!(stats, Some(json!({"packets": 3})));

    let err = client
        .invoke(&obj, "getCount", None, ResultType::integer())
        .unwrap_err();
    assert!(matches!(err, RomError::Decode(DecodeError::ArrayToScalar { .. })));
}

#[test]
fn test_subscribe_accepts_both_reply_shapes() {
    let (client, _server) = connect(|_, params| match params["type"].as_str() {
        Some("EndOfStream") => Reply::Result(json!("sub-1")),
        Some("Error") => Reply::Result(json!({"value": "sub-2"})),
        _ => Reply::Result(json!({"a": 1, "b": 2})),
    });
    let obj = ObjectRef::new("player-1");

    let first = client.subscribe(&obj, "EndOfStream").unwrap();
    assert_eq!(first.id.as_str(), "sub-1");
    assert_eq!(first.object, obj);
    assert_eq!(first.event_type, "EndOfStream");

    let second = client.subscribe(&obj, "Error").unwrap();
    assert_eq!(second.id.as_str(), "sub-2");

    let err = client.subscribe(&obj, "Other").unwrap_err();
    assert!(matches!(err, RomError::Decode(DecodeError::BadSubscription { .. })));
    assert!(err.to_string().contains("should have one property"));
}

#[test]
fn test_pushed_event_reaches_handler_and_is_acknowledged() {
    let (client, mut server) = connect(|_, _| Reply::Result(json!("sub-1")));
    let events = event_channel(&client);

    client.subscribe(&ObjectRef::new("player-1"), "EndOfStream").unwrap();
    server.push_event(json!({
        "object": "player-1",
        "subscription": "sub-1",
        "type": "EndOfStream",
        "data": {"source": "player-1", "timestamp": "1700000000"}
    }));

    let event = events.recv_timeout(TEST_TIMEOUT).expect("event");
    assert_eq!(
        event,
        RomEvent {
            object: ObjectRef::new("player-1"),
            subscription: "sub-1".into(),
            event_type: "EndOfStream".to_string(),
            data: json!({"source": "player-1", "timestamp": "1700000000"}),
        }
    );

    // The ack is written by the transport reader, independently of routing.
    let mut acks = Vec::new();
    for _ in 0..50 {
        acks = server.acks.lock().unwrap().clone();
        if !acks.is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(acks, vec![json!(9001)]);
}

#[test]
fn test_malformed_event_is_not_forwarded() {
    let (client, mut server) = connect(|_, _| Reply::Empty);
    let events = event_channel(&client);

    server.push_event(json!({"object": "o1", "type": "Ready", "data": {}}));
    server.push_event(json!({"object": "o1", "subscription": "s1", "type": "Ready", "data": null}));

    let event = events.recv_timeout(TEST_TIMEOUT).expect("event");
    assert_eq!(event.subscription.as_str(), "s1");
    assert_eq!(event.data, Value::Null);
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_handler_can_make_blocking_calls() {
    let (client, mut server) = connect(|method, _| match method {
        "invoke" => Reply::Result(json!({"value": "PLAYING"})),
        _ => Reply::Empty,
    });
    let client = Arc::new(client);

    let (tx, rx) = mpsc::channel();
    let weak: Weak<RomClient> = Arc::downgrade(&client);
    client.set_event_handler(move |event: RomEvent| {
        let Some(client) = weak.upgrade() else {
            return;
        };
        let state = client.invoke(
            &event.object,
            "getState",
            None,
            ResultType::enumeration("MediaState"),
        );
        let _ = tx.send(state.map_err(|e| e.to_string()));
    });

    server.push_event(json!({"object": "p1", "subscription": "s1", "type": "StateChanged", "data": {}}));

    let state = rx.recv_timeout(TEST_TIMEOUT).expect("handler finished");
    assert_eq!(state, Ok(Some(json!("PLAYING"))));
}

#[test]
fn test_server_error_is_a_transport_error() {
    let (client, _server) = connect(|_, _| Reply::Error(40101, "Object not found"));

    let err = client.release(&ObjectRef::new("gone")).unwrap_err();
    match err {
        RomError::Transport(TransportError::Server { code, message, .. }) => {
            assert_eq!(code, 40101);
            assert_eq!(message, "Object not found");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_continuation_runs_off_caller_thread() {
    let (client, _server) = connect(|_, _| Reply::Result(json!("p7")));
    let caller = thread::current().id();
    let (tx, rx) = mpsc::channel();

    client.create_with(
        "MediaPipeline",
        None,
        Continuation::from_fn(move |result| {
            let _ = tx.send((thread::current().id(), result.map_err(|e| e.to_string())));
        }),
    );

    let (thread_id, result) = rx.recv_timeout(TEST_TIMEOUT).expect("continuation");
    assert_ne!(thread_id, caller);
    assert_eq!(result, Ok(ObjectRef::new("p7")));
}

#[test]
fn test_client_survives_panicking_continuation() {
    let (client, _server) = connect(|method, _| match method {
        "create" => Reply::Result(json!("p1")),
        _ => Reply::Result(json!({"value": "PLAYING"})),
    });
    let obj = ObjectRef::new("p1");

    client.create_with(
        "MediaPipeline",
        None,
        Continuation::from_fn(|_| panic!("continuation failure")),
    );

    let (tx, rx) = mpsc::channel();
    client.invoke_with(
        &obj,
        "getState",
        None,
        ResultType::enumeration("MediaState"),
        Continuation::from_fn(move |result| {
            let _ = tx.send(result.map_err(|e| e.to_string()));
        }),
    );
    let state = rx.recv_timeout(TEST_TIMEOUT).expect("continuation");
    assert_eq!(state, Ok(Some(json!("PLAYING"))));

    let state = client
        .invoke(&obj, "getState", None, ResultType::enumeration("MediaState"))
        .unwrap();
    assert_eq!(state, Some(json!("PLAYING")));
}

#[test]
fn test_destroy_is_idempotent_and_disconnects() {
    let (client, server) = connect(|_, _| Reply::Empty);

    client.destroy().unwrap();
    client.destroy().unwrap();
    assert!(client.is_destroyed());

    let err = client.create("MediaPipeline", None).unwrap_err();
    assert!(matches!(err, RomError::Destroyed));

    // The server thread sees EOF once the socket is shut down.
    server.join();
}

#[test]
fn test_peer_hangup_fails_later_requests() {
    let (client_end, server_end) = UnixStream::pair().unwrap();
    let client = RomClient::new(SocketTransport::from_stream(client_end, TEST_TIMEOUT).unwrap()).unwrap();
    drop(server_end);

    // The reader notices EOF asynchronously; wait for it.
    let mut observed = false;
    for _ in 0..50 {
        if let Err(RomError::Transport(TransportError::Disconnected)) =
            client.release(&ObjectRef::new("o1"))
        {
            observed = true;
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(observed, "client never observed the hangup");
}

#[tokio::test]
async fn test_async_entry_points_match_blocking_ones() {
    let (client, _server) = connect(|method, params| match method {
        "create" => Reply::Result(json!("p1")),
        "subscribe" => Reply::Result(json!({"value": "s1"})),
        "invoke" => match params["operation"].as_str() {
            Some("getName") => Reply::Result(json!({"value": "pipeline"})),
            _ => Reply::Result(json!(true)),
        },
        _ => Reply::Empty,
    });

    let obj = client.create_async("MediaPipeline", None).await.unwrap();
    assert_eq!(obj, client.create("MediaPipeline", None).unwrap());

    for (operation, returns) in [
        ("getName", ResultType::string()),
        ("isReady", ResultType::boolean()),
        ("getName", ResultType::integer()),
    ] {
        let blocking = client.invoke(&obj, operation, None, returns.clone());
        let future = client.invoke_async(&obj, operation, None, returns).await;
        match (blocking, future) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(a), Err(b)) => assert_eq!(a.kind(), b.kind()),
            (a, b) => panic!("diverged for {}: {:?} vs {:?}", operation, a, b),
        }
    }

    let sub = client.subscribe_async(&obj, "Error").await.unwrap();
    assert_eq!(sub.id.as_str(), "s1");
    client.release_async(&obj).await.unwrap();
}
