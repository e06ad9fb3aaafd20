//! challenger 主程序
//!
//! 可验证凭证出示 challenge 服务的运维工具：签发、验证 challenge，检查配置文件

mod cli;
mod config;
mod error;
mod observability;

use anyhow::Context;
use challenge::{ChallengeService, TenantId};
use clap::Parser;
use config::ChallengerConfig;
use observability::init_observability;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{error, info};

// stdout 只输出命令结果，启动信息写到 stderr
macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

/// `verify` 拒绝 challenge 时的退出码，与运行错误的 1 区分
const EXIT_CHALLENGE_REJECTED: u8 = 2;

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test { config_file } => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)?;
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(ApplicationLauncher::run_command(&config_path, command))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        // If the provided path is not the default "config.toml", check if it exists
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.clone());
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        let fallback_paths = vec![
            // 1. Current working directory
            PathBuf::from("config.toml"),
            // 2. System config directory
            PathBuf::from("/etc/challenger/config.toml"),
        ];

        bootstrap_info!("Searching for config file in default locations...");

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            } else {
                bootstrap_info!("Config not found at: {:?}", path);
            }
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: challenger --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();

        match ChallengerConfig::from_file(config_path) {
            Ok(config) => {
                info!("✅ 配置文件解析成功: {:?}", config_path);

                match config.validate() {
                    Ok(()) => {
                        info!("✅ 配置验证通过");
                    }
                    Err(errors) => {
                        error!("❌ 配置验证发现问题:");
                        for (i, err) in errors.iter().enumerate() {
                            if err.starts_with("Warning:") {
                                info!("  {}. ⚠️  {}", i + 1, err);
                            } else {
                                error!("  {}. ❌ {}", i + 1, err);
                            }
                        }
                        let has_errors = errors.iter().any(|e| !e.starts_with("Warning:"));
                        if has_errors {
                            return Err(Error::service_validation("配置验证失败".to_string()));
                        }
                    }
                }

                info!("✅ 完整配置验证通过");
                Ok(())
            }
            Err(e) => {
                error!("❌ 配置文件解析失败: {}", e);
                Err(Error::service_validation(format!("配置解析失败: {e}")))
            }
        }
    }

    /// 加载并验证配置
    fn load_config(config_path: &Path) -> Result<ChallengerConfig> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);

        let config = ChallengerConfig::from_file(config_path).map_err(|e| {
            bootstrap_error!("❌ 配置加载失败: {}", e);
            Error::custom(format!("配置加载失败: {e}"))
        })?;

        if let Err(errors) = config.validate() {
            let mut has_critical_errors = false;
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    bootstrap_info!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                    has_critical_errors = true;
                }
            }
            if has_critical_errors {
                return Err(Error::custom("配置验证失败，请修复上述错误".to_string()));
            }
        }

        Ok(config)
    }

    /// 执行 issue / verify 命令
    async fn run_command(config_path: &Path, command: Commands) -> Result<ExitCode> {
        let config = Self::load_config(config_path)?;

        // 只有持久化 SQLite 存储需要数据目录
        if config.challenge.uses_sqlite() && !config.sqlite_path.exists() {
            std::fs::create_dir_all(&config.sqlite_path).with_context(|| {
                format!(
                    "Failed to create SQLite data directory: {}",
                    config.sqlite_path.display()
                )
            })?;
        }

        let _observability_guard = init_observability(&config)?;

        let service = ChallengeService::from_config(&config.challenge, &config.sqlite_path).await?;
        info!(
            "Challenge service ready: instance={}, backend={}",
            config.name,
            service.backend_name()
        );

        let result = Self::execute(&service, command).await;
        service.close().await;
        result
    }

    async fn execute(service: &ChallengeService, command: Commands) -> Result<ExitCode> {
        match command {
            Commands::Issue { tenant } => {
                let token = service.issue(&tenant).await?;
                println!("{token}");
                Ok(ExitCode::SUCCESS)
            }
            Commands::Verify { tenant, token } => Self::verify(service, &tenant, &token).await,
            Commands::Test { .. } => Err(Error::custom("test command does not need the service")),
        }
    }

    async fn verify(service: &ChallengeService, tenant: &TenantId, token: &str) -> Result<ExitCode> {
        let outcome = service.verify(tenant, token.trim()).await?;
        println!("{}", serde_json::to_string(&outcome)?);

        if outcome.verified {
            Ok(ExitCode::SUCCESS)
        } else {
            info!(
                "Challenge rejected for tenant {}: {}",
                tenant,
                outcome.message().unwrap_or_default()
            );
            Ok(ExitCode::from(EXIT_CHALLENGE_REJECTED))
        }
    }
}
