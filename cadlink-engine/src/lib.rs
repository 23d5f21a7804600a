pub mod args;
pub mod command;
pub mod gateway;
mod handlers;
pub mod memory;

pub mod errors {
    use cadlink_core::overlap::GeometryError;
    use thiserror::Error;

    use crate::gateway::GatewayError;

    /// 单条命令的失败原因，`Display` 文本即回复给客户端的消息。
    #[derive(Debug, Error)]
    pub enum CommandError {
        #[error("missing required argument '{key}'")]
        MissingArgument { key: String },
        #[error("argument '{key}' must be {expected}")]
        InvalidArgument { key: String, expected: &'static str },
        #[error("{0}")]
        InvalidGeometry(String),
        #[error(transparent)]
        Geometry(#[from] GeometryError),
        #[error(transparent)]
        Gateway(#[from] GatewayError),
        #[error("failed to encode report: {0}")]
        Report(#[from] serde_json::Error),
    }

    impl CommandError {
        pub fn missing(key: &str) -> Self {
            CommandError::MissingArgument {
                key: key.to_string(),
            }
        }

        pub fn invalid(key: &str, expected: &'static str) -> Self {
            CommandError::InvalidArgument {
                key: key.to_string(),
                expected,
            }
        }
    }
}
