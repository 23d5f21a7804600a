//! 执行串行化：把任意网络任务中的工作投递到唯一的变更上下文上执行。
//!
//! [`ExecutionSerializer`] 是可克隆的投递端；[`MutationLoop`] 在宿主线程上逐个
//! 取出工作执行。工作只会看到宿主当前打开的图纸，图纸永远不离开该线程。

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use cadlink_engine::gateway::{DocumentHost, DrawingDocument};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

type Job = Box<dyn FnOnce(&mut dyn DocumentHost) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("mutation context is not initialized")]
    ContextUnavailable,
    #[error("no active document found")]
    NoActiveDocument,
    #[error("work item panicked on the mutation context and was abandoned")]
    WorkAbandoned,
}

/// 建立一对投递端与消费循环。
pub fn mutation_context() -> (ExecutionSerializer, MutationLoop) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        ExecutionSerializer {
            sender: Some(sender),
        },
        MutationLoop { receiver },
    )
}

#[derive(Debug, Clone)]
pub struct ExecutionSerializer {
    sender: Option<mpsc::UnboundedSender<Job>>,
}

impl ExecutionSerializer {
    /// 没有变更上下文的投递端，所有提交立即失败。
    pub fn unavailable() -> Self {
        Self { sender: None }
    }

    pub fn is_available(&self) -> bool {
        self.sender
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    /// 投递一项工作并等待其在变更上下文上完成。
    ///
    /// 调用方放弃等待时工作仍会执行，结果被丢弃。
    pub async fn submit<F, T>(&self, work: F) -> Result<T, ExecutionError>
    where
        F: FnOnce(&mut dyn DrawingDocument) -> T + Send + 'static,
        T: Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or(ExecutionError::ContextUnavailable)?;
        let (reply, result) = oneshot::channel();

        let job: Job = Box::new(move |host: &mut dyn DocumentHost| {
            let outcome = match host.active_document() {
                None => Err(ExecutionError::NoActiveDocument),
                Some(document) => panic::catch_unwind(AssertUnwindSafe(|| work(document)))
                    .map_err(|_| {
                        error!("变更上下文中的工作发生 panic，已放弃");
                        ExecutionError::WorkAbandoned
                    }),
            };
            if reply.send(outcome).is_err() {
                debug!("调用方已离开，丢弃执行结果");
            }
        });

        sender
            .send(job)
            .map_err(|_| ExecutionError::ContextUnavailable)?;
        result
            .await
            .map_err(|_| ExecutionError::ContextUnavailable)?
    }
}

/// 变更上下文的消费端。所有投递端被丢弃后循环结束。
#[derive(Debug)]
pub struct MutationLoop {
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl MutationLoop {
    /// 在当前线程上按投递顺序逐个执行工作。不能在异步运行时内部调用。
    pub fn run(mut self, host: &mut dyn DocumentHost) {
        info!("变更上下文开始运行");
        let mut processed: u64 = 0;
        while let Some(job) = self.receiver.blocking_recv() {
            job(&mut *host);
            processed += 1;
        }
        info!(processed, "变更上下文已退出");
    }

    /// 在新建的具名线程上构造宿主并运行循环，宿主本身无需 `Send`。
    pub fn spawn<H, F>(self, name: impl Into<String>, factory: F) -> io::Result<JoinHandle<()>>
    where
        H: DocumentHost,
        F: FnOnce() -> H + Send + 'static,
    {
        thread::Builder::new().name(name.into()).spawn(move || {
            let mut host = factory();
            self.run(&mut host);
        })
    }
}
