//! Parley - 对话练习 TUI
//!
//! 入口：初始化日志（写入 logs/parley.log，避免污染全屏界面）、加载配置与场景目录，运行 TUI 主循环。

use std::sync::Mutex;

use anyhow::Context;
use parley::{core::create_conversation_builder, ui::run_app};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::fs::create_dir_all("logs").context("Failed to create logs directory")?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("logs/parley.log")
        .context("Failed to open logs/parley.log")?;

    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(Mutex::new(log_file)).with_ansi(false))
        .init();

    let builder = create_conversation_builder(None).context("Failed to load scenarios")?;

    run_app(&builder).await.context("App run failed")?;

    builder.persist().context("Failed to save conversation snapshots")?;
    Ok(())
}
