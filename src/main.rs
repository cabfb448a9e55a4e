//! tcm 命令行入口：加载 .env、初始化日志、解析参数并分派子命令。

use clap::Parser;
use tcm::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    tcm::observability::init(cli.verbose);
    cli::run(cli).await
}
