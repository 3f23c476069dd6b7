//! Parley 行模式客户端
//!
//! 启动: cargo run --bin parley-cli -- [scenario-id]
//! 每行输入作为一轮发送；`/restart` 重新开始，`/quit` 退出。日志写到 stderr。

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parley::core::{create_conversation_builder, ConversationView, Role, SessionStatus};

fn print_new_turns(view: &ConversationView, printed: &mut usize, partner: &str) {
    if view.history.len() < *printed {
        *printed = 0;
    }
    for turn in &view.history[*printed..] {
        match turn.role {
            Role::User => println!("you> {}", turn.content),
            Role::Agent => println!("{}> {}", partner, turn.content),
        }
    }
    *printed = view.history.len();
}

fn print_status(view: &ConversationView) {
    if view.conversation_complete {
        match &view.completion_reason {
            Some(reason) => println!("-- conversation complete: {} (/restart to begin again)", reason),
            None => println!("-- conversation complete (/restart to begin again)"),
        }
    } else if view.session_status == SessionStatus::Failed {
        println!("-- could not reach your partner (/restart to try again)");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let builder = create_conversation_builder(None).context("Failed to load scenarios")?;
    let template = match std::env::args().nth(1) {
        Some(id) => builder
            .catalog()
            .get(&id)
            .with_context(|| format!("Unknown scenario {}", id))?,
        None => builder.initial_template().context("Scenario catalog is empty")?,
    };
    let partner = template.persona.name.clone();
    println!("== {} ({})", template.label, template.description);

    let handle = builder.attach(template);
    let settled = |v: &ConversationView| {
        !v.loading && v.session_status != SessionStatus::Establishing
    };

    let mut printed = 0usize;
    let view = handle.wait_until(settled).await?;
    print_new_turns(&view, &mut printed, &partner);
    print_status(&view);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/restart" => {
                handle.restart()?;
                handle.wait_until(|v| v.history.is_empty()).await?;
                printed = 0;
                println!("-- restarted");
            }
            _ => {
                let view = handle.view();
                if !view.input_enabled() {
                    print_status(&view);
                    continue;
                }
                handle.submit(input)?;
                // 先等用户轮次进入历史，再等回复
                handle.wait_until(|v| v.history.len() > printed).await?;
            }
        }
        let view = handle.wait_until(settled).await?;
        print_new_turns(&view, &mut printed, &partner);
        print_status(&view);
    }

    handle.shutdown().await;
    builder.persist().context("Failed to save conversation snapshots")?;
    Ok(())
}
