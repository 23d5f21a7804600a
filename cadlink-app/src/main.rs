use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cadlink_config::{AppConfig, ConfigError};
use cadlink_core::document::Document;
use cadlink_engine::args::Args;
use cadlink_engine::command::{CommandDispatcher, GeometrySettings};
use cadlink_engine::memory::{MemoryDocument, MemoryHost};
use cadlink_server::{CommandServer, ServerOptions, mutation_context, send_command};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const MUTATION_THREAD: &str = "cadlink-mutation";

#[derive(Debug, Parser)]
#[command(name = "cadlink-app", version, about = "CAD 图纸的回环命令服务")]
struct Cli {
    /// 配置文件路径；缺省时读取 CADLINK_CONFIG 或 ./config/default.toml。
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 启动无头宿主与命令服务，Ctrl-C 退出。
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// 预置一组带重叠与断缝的示例图元。
        #[arg(long)]
        demo: bool,
    },
    /// 向运行中的服务发送一条命令并打印响应。
    Send {
        command: String,
        /// JSON 对象形式的参数，例如 '{"name":"A-WALL","color":1}'。
        #[arg(value_name = "ARGS_JSON")]
        args: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, config_error) = load_configuration(cli.config);
    init_logging(&config);
    if let Some(err) = &config_error {
        report_configuration_error(err);
    }

    let outcome = match cli.command {
        Commands::Serve { port, demo } => serve(&config, port, demo).await,
        Commands::Send {
            command,
            args,
            port,
            timeout_secs,
        } => send(&config, &command, args.as_deref(), port, timeout_secs).await,
    };
    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: &AppConfig, port: Option<u16>, demo: bool) -> Result<ExitCode> {
    let (executor, mutation_loop) = mutation_context();
    let mutation_thread = mutation_loop
        .spawn(MUTATION_THREAD, move || {
            let mut document = Document::new();
            if demo {
                document.populate_demo();
            }
            MemoryHost::new(MemoryDocument::with_document("untitled.dwg", document))
        })
        .context("无法启动变更上下文线程")?;

    let dispatcher = CommandDispatcher::with_settings(geometry_settings(config));
    let commands = dispatcher.available_commands();
    let server = CommandServer::new(
        server_options(config, port),
        Arc::new(dispatcher),
        executor,
    );

    let addr = match server.start().await {
        Ok(outcome) => outcome.addr(),
        Err(err) => {
            error!(error = %err, "命令服务启动失败");
            return Err(err.into());
        }
    };
    info!(%addr, demo, ?commands, "等待客户端连接，按 Ctrl-C 退出");

    tokio::signal::ctrl_c()
        .await
        .context("无法监听 Ctrl-C 信号")?;
    info!("收到退出信号");
    server.stop().await;
    drop(server);

    tokio::task::spawn_blocking(move || mutation_thread.join())
        .await
        .context("等待变更上下文线程失败")?
        .map_err(|_| anyhow!("变更上下文线程异常退出"))?;
    Ok(ExitCode::SUCCESS)
}

fn geometry_settings(config: &AppConfig) -> GeometrySettings {
    GeometrySettings {
        tolerance: config.geometry.tolerance,
        connect_tolerance: config.geometry.connect_tolerance,
    }
}

fn server_options(config: &AppConfig, port: Option<u16>) -> ServerOptions {
    ServerOptions {
        port: port.unwrap_or(config.server.port),
        read_buffer_bytes: config.server.read_buffer_bytes,
    }
}

async fn send(
    config: &AppConfig,
    command: &str,
    args: Option<&str>,
    port: Option<u16>,
    timeout_secs: u64,
) -> Result<ExitCode> {
    let args: Args = match args {
        Some(raw) => serde_json::from_str(raw).context("ARGS_JSON 必须是 JSON 对象")?,
        None => Args::new(),
    };
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port.unwrap_or(config.server.port)));
    let response = send_command(addr, command, args, Duration::from_secs(timeout_secs)).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// 加载失败时回落到内建默认值；错误留给日志初始化之后再报告。
fn load_configuration(override_path: Option<PathBuf>) -> (AppConfig, Option<ConfigError>) {
    let loaded = match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(cfg) => (cfg, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn report_configuration_error(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载配置失败，使用内建默认值");
        }
        ConfigError::Context { .. } | ConfigError::Invalid { .. } => {
            warn!(error = %err, "加载配置失败，使用内建默认值");
        }
    }
}

/// 日志写到 stderr，stdout 只留给命令响应。
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_library_defaults() {
        let config = AppConfig::default();
        assert_eq!(server_options(&config, None), ServerOptions::default());
        assert_eq!(geometry_settings(&config), GeometrySettings::default());
    }

    #[test]
    fn port_flag_overrides_config() {
        let config = AppConfig::default();
        let options = server_options(&config, Some(0));
        assert_eq!(options.port, 0);
        assert_eq!(options.read_buffer_bytes, config.server.read_buffer_bytes);
    }
}
