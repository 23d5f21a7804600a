use std::collections::HashMap;

use cadlink_core::overlap::DEFAULT_TOLERANCE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::args::{Args, null_as_empty};
use crate::errors::CommandError;
use crate::gateway::{DrawingDocument, MutationScope};
use crate::handlers;

/// 默认端点吸附距离（图纸单位）。
pub const DEFAULT_CONNECT_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "Command")]
    pub name: String,
    #[serde(rename = "Args", default, deserialize_with = "null_as_empty")]
    pub args: Args,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, args: Args) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "Message")]
    pub message: String,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// 未知命令是可回复的信息，而不是失败。
    pub fn unknown_command(name: &str) -> Self {
        Self::ok(format!("Unknown command: {name}"))
    }
}

/// 几何命令使用的容差。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometrySettings {
    pub tolerance: f64,
    pub connect_tolerance: f64,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            connect_tolerance: DEFAULT_CONNECT_TOLERANCE,
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        args: &Args,
        context: &mut CommandContext<'_>,
    ) -> Result<String, CommandError>;
}

/// 单条命令的执行环境：唯一的写作用域与几何设置。
pub struct CommandContext<'a> {
    pub scope: &'a mut dyn MutationScope,
    pub settings: GeometrySettings,
}

/// 命令名到处理器的静态映射。本身不持有图纸状态，可在线程间共享。
pub struct CommandDispatcher {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
    settings: GeometrySettings,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::with_settings(GeometrySettings::default())
    }

    pub fn with_settings(settings: GeometrySettings) -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
            settings,
        };
        handlers::register_builtin(&mut dispatcher);
        dispatcher
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    #[inline]
    pub fn settings(&self) -> GeometrySettings {
        self.settings
    }

    /// 按名称排序的可用命令列表。
    pub fn available_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// 在一个写作用域内执行命令：成功提交，失败回滚并把错误转为回复消息。
    pub fn dispatch(
        &self,
        request: &CommandRequest,
        document: &mut dyn DrawingDocument,
    ) -> CommandResponse {
        let Some(handler) = self.handlers.get(request.name.as_str()) else {
            info!(command = %request.name, "收到未知命令");
            return CommandResponse::unknown_command(&request.name);
        };

        match self.execute(handler.as_ref(), &request.args, document) {
            Ok(message) => {
                debug!(command = %request.name, document = document.name(), "命令执行成功");
                CommandResponse::ok(message)
            }
            Err(err) => {
                warn!(command = %request.name, error = %err, "命令执行失败，事务已回滚");
                CommandResponse::err(err.to_string())
            }
        }
    }

    fn execute(
        &self,
        handler: &dyn CommandHandler,
        args: &Args,
        document: &mut dyn DrawingDocument,
    ) -> Result<String, CommandError> {
        let mut scope = document.open_scope()?;
        let message = {
            let mut context = CommandContext {
                scope: scope.as_mut(),
                settings: self.settings,
            };
            handler.execute(args, &mut context)?
        };
        scope.commit()?;
        Ok(message)
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
