//! 界面渲染
//!
//! 根据 ConversationView 与 input_buffer 绘制：标题栏显示场景与会话状态，
//! 主体为对话历史（按角色着色、按宽度换行），底部为输入框与快捷键提示。

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};

use crate::core::{ConversationView, Role, SessionStatus};
use crate::scenario::ScenarioTemplate;

/// 将内容按宽度换行，支持 UTF-8（按字符数，避免在 UTF-8 中间截断）
fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let mut line = String::new();
        for ch in para.chars() {
            if line.chars().count() >= width {
                lines.push(std::mem::take(&mut line));
            }
            line.push(ch);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn status_label(view: &ConversationView) -> &'static str {
    if view.conversation_complete {
        return "Complete";
    }
    match view.session_status {
        SessionStatus::Uninitialized => "Not connected",
        SessionStatus::Establishing => "Connecting…",
        SessionStatus::Ready if view.loading => "Waiting for reply…",
        SessionStatus::Ready => "Ready",
        SessionStatus::Failed => "Connection failed",
    }
}

/// 输入框标题：结束原因与失败提示优先
fn input_prompt(view: &ConversationView) -> String {
    if view.conversation_complete {
        match &view.completion_reason {
            Some(reason) => format!(" Conversation complete: {} ", reason.chars().take(48).collect::<String>()),
            None => " Conversation complete ".to_string(),
        }
    } else if view.session_status == SessionStatus::Failed {
        " Could not reach your partner ".to_string()
    } else if !view.input_enabled() {
        format!(" {} ", status_label(view))
    } else {
        " Message ".to_string()
    }
}

fn hint(view: &ConversationView) -> &'static str {
    if view.restart_available {
        " Ctrl+R restart │ Tab next scenario │ Ctrl+Q quit "
    } else {
        " Enter send │ ↑↓ PgUp/PgDn scroll │ Ctrl+R restart │ Tab next scenario │ Ctrl+Q quit "
    }
}

/// 绘制一帧：上方对话区（标题 + 历史 + 滚动条），下方输入区；将 (总行数, 可视高度) 写入 out 供外部 clamp 滚动
pub fn draw(
    f: &mut Frame,
    view: &ConversationView,
    template: &ScenarioTemplate,
    input_buffer: &str,
    conversation_scroll: usize,
    out: &mut (usize, usize),
) {
    let input_height = 5u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(input_height)])
        .split(f.area());

    let conv_area = chunks[0];
    let content_width = conv_area.width.saturating_sub(2).saturating_sub(1) as usize; // 边框 + 滚动条

    let title = format!(" Parley │ {} │ {} ", template.label, status_label(view));
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let partner = template.persona.name.as_str();
    let prefix_width = partner.chars().count().max(3) + 1;
    let mut text_lines: Vec<Line> = Vec::new();

    if view.history.is_empty() && !template.description.is_empty() {
        for line in wrap_text(&template.description, content_width.max(40)) {
            text_lines.push(Line::from(Span::styled(line, Style::default().fg(Color::DarkGray))));
        }
    }

    for (idx, turn) in view.history.iter().enumerate() {
        if idx > 0 {
            text_lines.push(Line::from(Span::raw("")));
        }
        let (name, color) = match turn.role {
            Role::User => ("You", Color::Cyan),
            Role::Agent => (partner, Color::Green),
        };
        let wrapped = wrap_text(&turn.content, content_width.saturating_sub(prefix_width).max(20));
        for (i, line) in wrapped.into_iter().enumerate() {
            let pref = if i == 0 {
                format!("{:<width$}", name, width = prefix_width)
            } else {
                " ".repeat(prefix_width)
            };
            text_lines.push(Line::from(vec![
                Span::styled(pref, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(line),
            ]));
        }
    }

    if view.loading {
        text_lines.push(Line::from(Span::raw("")));
        text_lines.push(Line::from(Span::styled(
            format!("{} is typing…", partner),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let content_height = conv_area.height.saturating_sub(2) as usize; // 边框
    let total_lines = text_lines.len();
    let max_scroll = total_lines.saturating_sub(content_height);
    let scroll_offset = conversation_scroll.min(max_scroll);

    let inner = block.inner(conv_area);
    let paragraph = Paragraph::new(Text::from(text_lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll_offset as u16, 0));
    f.render_widget(paragraph, conv_area);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .position(scroll_offset)
            .viewport_content_length(content_height);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_symbol("█")
            .track_symbol(Some("░"));
        f.render_stateful_widget(scrollbar, inner, &mut scrollbar_state);
    }

    let border_color = if view.session_status == SessionStatus::Failed {
        Color::Red
    } else if view.conversation_complete {
        Color::Magenta
    } else {
        Color::Blue
    };

    let input_block = Block::default()
        .title(input_prompt(view))
        .title_bottom(Line::from(Span::styled(hint(view), Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let input = Paragraph::new(input_buffer)
        .block(input_block)
        .wrap(Wrap { trim: false })
        .style(if view.input_enabled() {
            Style::default()
        } else {
            Style::default().fg(Color::DarkGray)
        });

    f.render_widget(input, chunks[1]);

    out.0 = total_lines;
    out.1 = content_height;
}
