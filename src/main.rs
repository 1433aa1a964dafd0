//! romctl - command-line client for a ROM server.
//!
//! Creates, invokes, releases and watches remote objects over the server's
//! Unix socket. Results are printed as JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rom_client::config::{DEFAULT_TIMEOUT_SECS, SOCKET_ENV, TIMEOUT_ENV};
use rom_client::{
    default_socket_path, ClientConfig, ObjectRef, Params, PrimitiveKind, ResultType, RomClient,
    RomEvent, SocketTransport,
};

#[derive(Parser, Debug)]
#[command(name = "romctl", version, about = "Remote Object Model client")]
struct Cli {
    /// Path to the server socket
    #[arg(long, env = SOCKET_ENV)]
    socket: Option<PathBuf>,

    /// Seconds to wait for each reply
    #[arg(long, env = TIMEOUT_ENV, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a remote object and print its reference
    Create {
        /// Remote class name
        #[arg(value_name = "TYPE")]
        class_name: String,

        /// Constructor parameters as a JSON object
        #[arg(short = 'p', long)]
        params: Option<String>,
    },

    /// Invoke an operation on a remote object
    Invoke {
        object: String,
        operation: String,

        /// Operation parameters as a JSON object
        #[arg(short = 'p', long)]
        params: Option<String>,

        /// Expected result: void, string, integer, float, boolean, object,
        /// enum:<NAME> or list:<KIND>
        #[arg(short = 'r', long, default_value = "void", value_parser = parse_result_type)]
        returns: ResultType,
    },

    /// Release a remote object
    Release { object: String },

    /// Subscribe to an event and print each occurrence as a JSON line
    Watch {
        object: String,
        #[arg(value_name = "EVENT")]
        event_type: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rom_client=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig {
        socket_path: cli.socket.unwrap_or_else(default_socket_path),
        request_timeout: Duration::from_secs(cli.timeout),
    };

    let transport = Arc::new(
        SocketTransport::connect(&config)
            .with_context(|| format!("Failed to connect to {}", config.socket_path.display()))?,
    );
    let client = RomClient::with_transport(transport.clone())?;

    let outcome = run(&client, &transport, cli.command);
    client.destroy()?;
    outcome
}

fn run(client: &RomClient, transport: &SocketTransport, command: Command) -> Result<()> {
    match command {
        Command::Create { class_name, params } => {
            let object = client.create(&class_name, parse_params(params.as_deref())?)?;
            println!("{}", object);
        }
        Command::Invoke {
            object,
            operation,
            params,
            returns,
        } => {
            let result = client.invoke(
                &ObjectRef::new(object),
                &operation,
                parse_params(params.as_deref())?,
                returns,
            )?;
            if let Some(value) = result {
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
        Command::Release { object } => {
            client.release(&ObjectRef::new(object))?;
        }
        Command::Watch { object, event_type } => {
            let (tx, rx) = mpsc::channel::<RomEvent>();
            client.set_event_handler(move |event: RomEvent| {
                let _ = tx.send(event);
            });

            let subscription = client.subscribe(&ObjectRef::new(object), &event_type)?;
            info!(
                "Watching {} on {} (subscription {})",
                subscription.event_type, subscription.object, subscription.id
            );

            loop {
                match rx.recv_timeout(Duration::from_millis(500)) {
                    Ok(event) => println!("{}", serde_json::to_string(&event)?),
                    Err(RecvTimeoutError::Timeout) if transport.is_connected() => {}
                    Err(_) => break,
                }
            }
            info!("Connection closed");
        }
    }
    Ok(())
}

/// Parse an optional JSON object argument.
fn parse_params(raw: Option<&str>) -> Result<Option<Params>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw).context("Invalid JSON parameters")? {
        Value::Object(map) => Ok(Some(map)),
        other => bail!("Parameters must be a JSON object, got {}", other),
    }
}

fn parse_result_type(raw: &str) -> Result<ResultType, String> {
    let raw = raw.trim();
    if let Some(element) = raw.strip_prefix("list:") {
        return parse_result_type(element).map(ResultType::list_of);
    }
    if let Some(name) = raw.strip_prefix("enum:") {
        return Ok(ResultType::enumeration(name));
    }
    match raw.to_ascii_lowercase().as_str() {
        "void" => Ok(ResultType::Void),
        "string" => Ok(ResultType::Primitive(PrimitiveKind::String)),
        "integer" | "int" => Ok(ResultType::Primitive(PrimitiveKind::Integer)),
        "float" | "double" => Ok(ResultType::Primitive(PrimitiveKind::Float)),
        "boolean" | "bool" => Ok(ResultType::Primitive(PrimitiveKind::Boolean)),
        "object" => Ok(ResultType::Object),
        other => Err(format!("unknown result type '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_type() {
        assert_eq!(parse_result_type("void").unwrap(), ResultType::Void);
        assert_eq!(parse_result_type("Integer").unwrap(), ResultType::integer());
        assert_eq!(
            parse_result_type("list:string").unwrap(),
            ResultType::list_of(ResultType::string())
        );
        assert_eq!(
            parse_result_type("list:list:bool").unwrap(),
            ResultType::list_of(ResultType::list_of(ResultType::boolean()))
        );
        assert_eq!(
            parse_result_type("enum:MediaState").unwrap(),
            ResultType::enumeration("MediaState")
        );
        assert!(parse_result_type("tuple").is_err());
    }

    #[test]
    fn test_parse_params() {
        assert!(parse_params(None).unwrap().is_none());
        let params = parse_params(Some(r#"{"uri": "file:///a.webm"}"#)).unwrap().unwrap();
        assert_eq!(params["uri"], "file:///a.webm");
        assert!(parse_params(Some("[1, 2]")).is_err());
        assert!(parse_params(Some("{not json")).is_err());
    }

    #[test]
    fn test_cli_parses_invoke() {
        let cli = Cli::try_parse_from([
            "romctl",
            "--socket",
            "/tmp/kms.sock",
            "invoke",
            "p1",
            "getChildren",
            "--returns",
            "list:string",
        ])
        .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/kms.sock")));
        match cli.command {
            Command::Invoke {
                object, returns, ..
            } => {
                assert_eq!(object, "p1");
                assert_eq!(returns, ResultType::list_of(ResultType::string()));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
