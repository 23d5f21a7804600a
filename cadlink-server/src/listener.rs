//! 回环 TCP 监听器。
//!
//! 协议：每个连接读取一个数据块，解码为一条 JSON 请求，回写一条 JSON 响应后关闭。
//! 没有长度前缀，也不拼接跨数据块的请求。

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use cadlink_engine::command::{CommandDispatcher, CommandRequest, CommandResponse};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::executor::{ExecutionError, ExecutionSerializer};

/// accept 出错后的退避时间，避免文件句柄耗尽时空转。
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// 0 表示由系统分配端口。
    pub port: u16,
    pub read_buffer_bytes: usize,
}

impl ServerOptions {
    pub const DEFAULT_PORT: u16 = 8964;
    pub const DEFAULT_READ_BUFFER: usize = 8192;

    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: Self::DEFAULT_PORT,
            read_buffer_bytes: Self::DEFAULT_READ_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SocketAddr),
    AlreadyRunning(SocketAddr),
}

impl StartOutcome {
    pub fn addr(self) -> SocketAddr {
        match self {
            StartOutcome::Started(addr) | StartOutcome::AlreadyRunning(addr) => addr,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind command server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// 连接任务共享的只读环境。
struct ConnectionContext {
    dispatcher: Arc<CommandDispatcher>,
    executor: ExecutionSerializer,
    read_buffer_bytes: usize,
}

struct RunningListener {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

/// `start`/`stop` 持有生命周期锁完成整个迁移；状态单独发布，迁移途中也可读取。
pub struct CommandServer {
    options: ServerOptions,
    dispatcher: Arc<CommandDispatcher>,
    executor: ExecutionSerializer,
    lifecycle: Mutex<Option<RunningListener>>,
    state: watch::Sender<ListenerState>,
}

impl CommandServer {
    pub fn new(
        options: ServerOptions,
        dispatcher: Arc<CommandDispatcher>,
        executor: ExecutionSerializer,
    ) -> Self {
        Self {
            options,
            dispatcher,
            executor,
            lifecycle: Mutex::new(None),
            state: watch::Sender::new(ListenerState::Stopped),
        }
    }

    #[inline]
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// 绑定回环地址并开始接受连接。已在运行时直接返回当前地址。
    pub async fn start(&self) -> Result<StartOutcome, ServerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Some(running) = lifecycle.as_ref() {
            debug!(addr = %running.addr, "命令服务已在运行");
            return Ok(StartOutcome::AlreadyRunning(running.addr));
        }

        self.state.send_replace(ListenerState::Starting);
        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, self.options.port));
        let (listener, addr) = match bind(requested).await {
            Ok(bound) => bound,
            Err(source) => {
                error!(addr = %requested, error = %source, "命令服务绑定端口失败");
                self.state.send_replace(ListenerState::Stopped);
                return Err(ServerError::Bind {
                    addr: requested,
                    source,
                });
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let context = Arc::new(ConnectionContext {
            dispatcher: Arc::clone(&self.dispatcher),
            executor: self.executor.clone(),
            read_buffer_bytes: self.options.read_buffer_bytes,
        });
        let accept_task = tokio::spawn(accept_loop(listener, context, shutdown_rx));

        *lifecycle = Some(RunningListener {
            addr,
            shutdown,
            accept_task,
        });
        self.state.send_replace(ListenerState::Running);
        info!(%addr, "命令服务已启动");
        Ok(StartOutcome::Started(addr))
    }

    /// 停止接受连接并关闭监听套接字；未运行时返回 `false`。
    ///
    /// 正在变更上下文上执行的工作不会被中断，只是结果不再送达。
    pub async fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return false;
        };

        self.state.send_replace(ListenerState::Stopping);
        running.shutdown.send_replace(true);
        if let Err(err) = running.accept_task.await {
            warn!(error = %err, "accept 任务异常结束");
        }
        self.state.send_replace(ListenerState::Stopped);
        info!(addr = %running.addr, "命令服务已停止");
        true
    }

    /// 当前状态，不等待进行中的 `start`/`stop`。
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// 订阅状态迁移。
    pub fn state_changes(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle
            .lock()
            .await
            .as_ref()
            .map(|running| running.addr)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }
}

async fn bind(addr: SocketAddr) -> io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let context = Arc::clone(&context);
                    let shutdown = shutdown.clone();
                    tokio::spawn(handle_connection(stream, peer, context, shutdown));
                }
                Err(err) => {
                    warn!(error = %err, "接受连接失败");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    debug!("accept 循环退出，释放监听套接字");
}

/// 停止信号到达或发送端被丢弃时返回。
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    context: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer = vec![0u8; context.read_buffer_bytes];
    let read = tokio::select! {
        _ = wait_for_shutdown(&mut shutdown) => {
            debug!(%peer, "服务停止，放弃等待请求");
            return;
        }
        read = stream.read(&mut buffer) => read,
    };
    let len = match read {
        Ok(0) => {
            debug!(%peer, "连接未发送数据即关闭");
            return;
        }
        Ok(len) => len,
        Err(err) => {
            warn!(%peer, error = %err, "读取请求失败");
            return;
        }
    };

    let request: CommandRequest = match serde_json::from_slice(&buffer[..len]) {
        Ok(request) => request,
        Err(err) => {
            warn!(%peer, bytes = len, error = %err, "请求不是合法的 JSON，丢弃连接");
            return;
        }
    };
    let command = request.name.clone();
    debug!(%peer, %command, "收到命令请求");

    let executed = tokio::select! {
        _ = wait_for_shutdown(&mut shutdown) => {
            debug!(%peer, %command, "服务停止，放弃等待执行结果");
            return;
        }
        executed = execute(&context, request) => executed,
    };
    let response = executed.unwrap_or_else(|err| {
        warn!(%peer, %command, error = %err, "命令无法在变更上下文上执行");
        CommandResponse::err(err.to_string())
    });

    let payload = match serde_json::to_vec(&response) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(%peer, error = %err, "编码响应失败");
            return;
        }
    };
    if let Err(err) = write_response(&mut stream, &payload).await {
        warn!(%peer, error = %err, "写回响应失败");
    }
}

async fn execute(
    context: &ConnectionContext,
    request: CommandRequest,
) -> Result<CommandResponse, ExecutionError> {
    let dispatcher = Arc::clone(&context.dispatcher);
    context
        .executor
        .submit(move |document| dispatcher.dispatch(&request, document))
        .await
}

async fn write_response(stream: &mut TcpStream, payload: &[u8]) -> io::Result<()> {
    stream.write_all(payload).await?;
    stream.shutdown().await
}
