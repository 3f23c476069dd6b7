//! 事件处理
//!
//! 轮询 crossterm 键盘事件，将 Ctrl+R/Tab/Esc/Ctrl+Q/Ctrl+C 转为 UiAction（Restart/NextScenario/Quit），
//! 其余按键交给 run_app 拼 input_buffer，Enter 时提交。

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// 快捷键对应的界面动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Restart,
    NextScenario,
    Quit,
}

/// 应用事件：来自快捷键的 UiAction 或原始 KeyEvent
#[derive(Debug, Clone)]
pub enum AppEvent {
    Action(UiAction),
    Key(KeyEvent),
}

/// 事件处理器：poll 时读键盘并返回 AppEvent
pub struct EventHandler {
    tick: Duration,
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl EventHandler {
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }

    pub fn poll(&self) -> anyhow::Result<Option<AppEvent>> {
        if event::poll(self.tick)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(Some(map_key(key)));
                }
            }
        }
        Ok(None)
    }
}

fn map_key(key: KeyEvent) -> AppEvent {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('r') if ctrl => AppEvent::Action(UiAction::Restart),
        KeyCode::Char('q') | KeyCode::Char('c') if ctrl => AppEvent::Action(UiAction::Quit),
        KeyCode::Esc => AppEvent::Action(UiAction::Quit),
        KeyCode::Tab => AppEvent::Action(UiAction::NextScenario),
        _ => AppEvent::Key(key),
    }
}
