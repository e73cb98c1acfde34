//! Line-delimited JSON tool socket: one request per line, one response
//! line back. A connection may send any number of requests.

use std::time::Duration;

use cadlink_host::bridge::ExecutionBridge;
use cadlink_host::command;
use cadlink_host::config::ServerSettings;
use cadlink_host::context::HostContext;
use shared::ToolResponse;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Per-connection socket limits
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub idle_timeout: Duration,
    pub max_request_bytes: usize,
}

impl From<&ServerSettings> for Limits {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            idle_timeout: settings.client_timeout(),
            max_request_bytes: settings.max_request_bytes,
        }
    }
}

/// One read from the client
#[derive(Debug, PartialEq)]
enum Incoming {
    Line(String),
    TooLong,
    Closed,
}

pub async fn serve(listener: TcpListener, bridge: ExecutionBridge<HostContext>, limits: Limits) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!("Client connected: {peer}");
                let bridge = bridge.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, bridge, limits).await {
                        tracing::warn!("Client {peer} error: {e}");
                    }
                    tracing::debug!("Client disconnected: {peer}");
                });
            }
            Err(e) => tracing::error!("Accept failed: {e}"),
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    bridge: ExecutionBridge<HostContext>,
    limits: Limits,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let incoming = match tokio::time::timeout(
            limits.idle_timeout,
            read_request(&mut reader, limits.max_request_bytes),
        )
        .await
        {
            Ok(read) => read?,
            Err(_) => {
                tracing::debug!("Client idle for {:?}, closing", limits.idle_timeout);
                return Ok(());
            }
        };

        let response = match incoming {
            Incoming::Closed => return Ok(()),
            Incoming::TooLong => {
                let response = ToolResponse::err(format!(
                    "Request exceeds {} bytes",
                    limits.max_request_bytes
                ));
                write_response(&mut writer, &response).await?;
                return Ok(());
            }
            Incoming::Line(line) if line.trim().is_empty() => continue,
            Incoming::Line(line) => match command::parse_request(&line) {
                Ok(request) => {
                    let bridge = bridge.clone();
                    tokio::task::spawn_blocking(move || command::dispatch(&bridge, request))
                        .await
                        .unwrap_or_else(|e| ToolResponse::err(format!("Tool task failed: {e}")))
                }
                Err(response) => response,
            },
        };
        write_response(&mut writer, &response).await?;
    }
}

/// Read one newline-terminated request of at most `max_bytes` bytes.
///
/// A final line without a newline still counts as a request.
async fn read_request<R>(reader: &mut R, max_bytes: usize) -> std::io::Result<Incoming>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = reader
        .take(max_bytes as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(Incoming::Closed);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > max_bytes {
        return Ok(Incoming::TooLong);
    }
    Ok(Incoming::Line(String::from_utf8_lossy(&buf).into_owned()))
}

async fn write_response<W>(writer: &mut W, response: &ToolResponse) -> anyhow::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut out = serde_json::to_vec(response)?;
    out.push(b'\n');
    writer.write_all(&out).await?;
    Ok(())
}
