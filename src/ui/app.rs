//! TUI 应用主循环
//!
//! 进入全屏/原始模式，读取当前对话句柄的视图状态与键盘事件，将用户输入与快捷键转为
//! submit / restart / 切换场景，每帧用 draw 渲染 ConversationView 与输入缓冲。

use std::io::{self, Stdout};

use crossterm::event::KeyCode;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::core::ConversationBuilder;
use crate::ui::event::{AppEvent, EventHandler, UiAction};
use crate::ui::render::draw;

/// 运行 TUI：启用原始模式与全屏，循环 poll 事件 + 渲染，退出时恢复终端并解绑对话
pub async fn run_app(builder: &ConversationBuilder) -> anyhow::Result<()> {
    let templates = builder.catalog().templates();
    let Some(initial) = builder.initial_template() else {
        anyhow::bail!("scenario catalog is empty");
    };
    let mut index = builder.catalog().position(&initial.id).unwrap_or(0);
    let mut handle = builder.attach(&templates[index]);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let event_handler = EventHandler::default();
    let mut input_buffer = String::new();
    let mut conversation_scroll = usize::MAX;
    let mut last_render_key = (0usize, false);

    loop {
        let view = handle.view();

        // 新消息或输入提示出现时滚到底部
        let render_key = (view.history.len(), view.loading);
        if render_key != last_render_key {
            last_render_key = render_key;
            conversation_scroll = usize::MAX;
        }

        if let Ok(Some(ev)) = event_handler.poll() {
            match ev {
                AppEvent::Action(UiAction::Quit) => break,
                AppEvent::Action(UiAction::Restart) => {
                    input_buffer.clear();
                    if let Err(e) = handle.restart() {
                        tracing::warn!("Restart failed: {}", e);
                    }
                }
                AppEvent::Action(UiAction::NextScenario) => {
                    // 解绑当前对话（快照保留），绑定下一个模板；切回时恢复
                    handle.shutdown().await;
                    index = (index + 1) % templates.len();
                    handle = builder.attach(&templates[index]);
                    input_buffer.clear();
                    conversation_scroll = usize::MAX;
                }
                AppEvent::Key(key) => match key.code {
                    KeyCode::Enter => {
                        if view.input_enabled() {
                            let input = input_buffer.trim().to_string();
                            if !input.is_empty() {
                                input_buffer.clear();
                                if let Err(e) = handle.submit(&input) {
                                    tracing::warn!("Submit failed: {}", e);
                                }
                            }
                        }
                    }
                    KeyCode::Backspace => {
                        input_buffer.pop();
                    }
                    KeyCode::Char(c) => {
                        if !view.conversation_complete {
                            input_buffer.push(c);
                        }
                    }
                    KeyCode::Up => {
                        conversation_scroll = conversation_scroll.saturating_sub(1);
                    }
                    KeyCode::Down => {
                        conversation_scroll = conversation_scroll.saturating_add(1);
                    }
                    KeyCode::PageUp => {
                        conversation_scroll = conversation_scroll.saturating_sub(10);
                    }
                    KeyCode::PageDown => {
                        conversation_scroll = conversation_scroll.saturating_add(10);
                    }
                    KeyCode::Home => {
                        conversation_scroll = 0;
                    }
                    KeyCode::End => {
                        conversation_scroll = usize::MAX;
                    }
                    _ => {}
                },
            }
        }

        let view = handle.view();
        let template = &templates[index];
        let mut scroll_info = (0usize, 0usize);
        terminal.draw(|f| {
            draw(
                f,
                &view,
                template,
                &input_buffer,
                conversation_scroll,
                &mut scroll_info,
            );
        })?;
        let (total_lines, viewport_height) = scroll_info;
        let max_scroll = total_lines.saturating_sub(viewport_height);
        conversation_scroll = conversation_scroll.min(max_scroll);

        tokio::task::yield_now().await;
    }

    restore_terminal(&mut terminal)?;
    handle.shutdown().await;
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}
