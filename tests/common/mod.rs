//! Shared helpers: tracing setup and a scriptable fake application peer.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{Context, bail};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing_subscriber::EnvFilter;

use uni_automator::{
    Connection, DevtoolsDescriptor, Environment, Program, ProgramOptions, Puppet, Target,
    TargetDescriptor,
};

/// Client side of a runtime connection, as the application sees it.
pub type Peer = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Installs a test subscriber once; filter with `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Returns a port that was free a moment ago.
pub async fn free_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

/// Dials the runtime listener, retrying until it is up.
pub async fn dial(port: u16) -> anyhow::Result<Peer> {
    let url = format!("ws://127.0.0.1:{port}");
    for _ in 0..100 {
        if let Ok((peer, _)) = connect_async(url.as_str()).await {
            return Ok(peer);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("runtime listener on {port} never came up")
}

/// Creates a puppet for `platform` over `target`.
pub fn puppet_with(platform: &str, target: impl Target, cwd: &Path) -> Puppet {
    Puppet::new(platform, Arc::new(target), Environment::with_cwd(cwd))
}

/// Creates a puppet with a plain target.
pub fn puppet(platform: &str) -> Puppet {
    puppet_with(
        platform,
        TargetDescriptor::new(DevtoolsDescriptor::new("test-devtools")),
        Path::new("."),
    )
}

/// Runs the runtime listener and a dialing peer side by side.
pub async fn connect_runtime(puppet: &Puppet) -> anyhow::Result<(Connection, Peer)> {
    let port = free_port().await?;
    let (connection, peer) = tokio::join!(
        Connection::create_runtime_connection(port, puppet, Duration::from_secs(5)),
        dial(port),
    );
    Ok((connection?, peer?))
}

/// Reads the next request frame.
pub async fn next_request(peer: &mut Peer) -> anyhow::Result<Value> {
    loop {
        let frame = peer.next().await.context("peer stream ended")??;
        if let Message::Text(text) = frame {
            return Ok(serde_json::from_str(text.as_str())?);
        }
    }
}

/// Sends a raw JSON frame.
pub async fn send_json(peer: &mut Peer, body: Value) -> anyhow::Result<()> {
    peer.send(Message::Text(body.to_string().into())).await?;
    Ok(())
}

/// Replies with a result.
pub async fn reply(peer: &mut Peer, request: &Value, result: Value) -> anyhow::Result<()> {
    send_json(peer, json!({ "id": request["id"], "result": result })).await
}

/// A request the fake application received.
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub method: String,
    pub params: Value,
}

/// Answers every request with `handler(method, params)`; `Err` becomes a
/// remote error. The task ends when the socket closes and returns what it
/// received.
pub fn serve<F>(mut peer: Peer, handler: F) -> JoinHandle<Vec<Received>>
where
    F: Fn(&str, &Value) -> Result<Value, String> + Send + 'static,
{
    tokio::spawn(async move {
        let mut received = Vec::new();
        while let Ok(request) = next_request(&mut peer).await {
            let method = request["method"].as_str().unwrap_or_default().to_string();
            let params = request["params"].clone();
            let body = match handler(&method, &params) {
                Ok(result) => json!({ "id": request["id"], "result": result }),
                Err(message) => json!({ "id": request["id"], "error": { "message": message } }),
            };
            received.push(Received { method, params });
            if send_json(&mut peer, body).await.is_err() {
                break;
            }
        }
        received
    })
}

/// Connects a program to a fake application driven by `handler`.
pub async fn program_with<F>(
    puppet: Puppet,
    handler: F,
) -> anyhow::Result<(Program, JoinHandle<Vec<Received>>)>
where
    F: Fn(&str, &Value) -> Result<Value, String> + Send + 'static,
{
    let (_, peer) = connect_runtime(&puppet).await?;
    let app = serve(peer, handler);
    Ok((Program::new(puppet, ProgramOptions::default()), app))
}
