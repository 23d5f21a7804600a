use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 配置文件路径的环境变量。
pub const CONFIG_ENV_VAR: &str = "CADLINK_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub geometry: GeometryConfig,
}

impl AppConfig {
    /// 从显式路径加载配置，并做取值校验。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `CADLINK_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 端口 0 合法（由系统分配）；缓冲区与容差必须为正。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.read_buffer_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "server.read_buffer_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (key, value) in [
            ("geometry.tolerance", self.geometry.tolerance),
            ("geometry.connect_tolerance", self.geometry.connect_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("must be a positive finite number, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 回环监听参数。
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    #[serde(default = "ServerConfig::default_read_buffer")]
    pub read_buffer_bytes: usize,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 8964;
    pub const DEFAULT_READ_BUFFER: usize = 8192;

    fn default_port() -> u16 {
        Self::DEFAULT_PORT
    }

    fn default_read_buffer() -> usize {
        Self::DEFAULT_READ_BUFFER
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Self::DEFAULT_PORT,
            read_buffer_bytes: Self::DEFAULT_READ_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GeometryConfig {
    #[serde(default = "GeometryConfig::default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "GeometryConfig::default_connect_tolerance")]
    pub connect_tolerance: f64,
}

impl GeometryConfig {
    fn default_tolerance() -> f64 {
        1e-9
    }

    fn default_connect_tolerance() -> f64 {
        1.0
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::default_tolerance(),
            connect_tolerance: Self::default_connect_tolerance(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置项 {key} 无效: {reason}")]
    Invalid { key: &'static str, reason: String },
}
