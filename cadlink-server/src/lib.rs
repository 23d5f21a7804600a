//! 回环命令服务：监听、执行串行化与客户端。
//!
//! 网络任务运行在 tokio 上，所有图纸访问都经由 [`executor::ExecutionSerializer`]
//! 投递到唯一的变更上下文线程。

pub mod client;
pub mod executor;
pub mod listener;

pub use client::{ClientError, send_command};
pub use executor::{ExecutionError, ExecutionSerializer, MutationLoop, mutation_context};
pub use listener::{CommandServer, ListenerState, ServerError, ServerOptions, StartOutcome};
