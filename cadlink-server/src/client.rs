//! 回环客户端：发送一条命令并读取到连接关闭为止。

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use cadlink_engine::args::Args;
use cadlink_engine::command::{CommandRequest, CommandResponse};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to command server at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// 发送一条命令；整个往返受 `timeout` 限制。
pub async fn send_command(
    addr: SocketAddr,
    command: &str,
    args: Args,
    timeout: Duration,
) -> Result<CommandResponse, ClientError> {
    let request = CommandRequest::new(command, args);
    tokio::time::timeout(timeout, round_trip(addr, &request))
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}

async fn round_trip(
    addr: SocketAddr,
    request: &CommandRequest,
) -> Result<CommandResponse, ClientError> {
    let payload = serde_json::to_vec(request)?;
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect { addr, source })?;
    stream.write_all(&payload).await?;
    stream.shutdown().await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    debug!(%addr, command = %request.name, bytes = reply.len(), "收到响应");
    Ok(serde_json::from_slice(&reply)?)
}
