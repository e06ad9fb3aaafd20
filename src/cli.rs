//! 命令行界面定义
//!
//! 定义了主程序的命令行参数和选项
use challenge::TenantId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "challenger")]
#[command(version)]
#[command(about = "Issue and verify anti-replay challenges for verifiable presentations")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    /// Configuration file path (defaults to searching standard locations)
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub(crate) config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Issue a new challenge and print it
    Issue {
        /// Verifier instance the challenge is issued for
        #[arg(short, long)]
        tenant: TenantId,
    },

    /// Verify a challenge and print the outcome as JSON (exit code 2 when rejected, 1 on errors)
    Verify {
        /// Verifier instance the challenge was issued for
        #[arg(short, long)]
        tenant: TenantId,

        /// Challenge token
        #[arg(index = 1)]
        token: String,
    },

    /// Test configuration file
    Test {
        /// Configuration file path (optional, defaults to config.toml)
        #[arg(index = 1)]
        config_file: Option<PathBuf>,
    },
}
