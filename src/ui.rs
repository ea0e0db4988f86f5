use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode};
use crate::conversation::{Message, Payload, Phase, Sender};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    // Chat panel on the left, result panel on the right
    let [chat_panel, result_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
            .areas(body_area);
    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(chat_panel);

    // Store areas for mouse hit-testing
    app.chat_area = Some(chat_area);
    app.result_area = Some(result_area);

    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_result(app, frame, result_area);

    render_footer(app, frame, footer_area);

    if app.show_settings {
        render_settings(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(
            " 바이브코딩 아이디어 챗 ",
            Style::default().fg(Color::Yellow).bold(),
        ),
        Span::styled(
            format!("[{}] ", phase_label(app.conversation.phase())),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Init => "시작",
        Phase::AskIdea => "질문 1/5",
        Phase::AskFeature => "질문 2/5",
        Phase::AskVibe => "질문 3/5",
        Phase::AskAudience => "질문 4/5",
        Phase::AskGoal => "질문 5/5",
        Phase::ConfirmGenerate => "확인",
        Phase::Generating => "생성 중",
        Phase::PostChat => "자유 대화",
    }
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Gemini: {} ", app.gemini.model()));

    let mut lines: Vec<Line> = Vec::new();
    for message in app.conversation.transcript() {
        push_message_lines(&mut lines, message);
    }

    // Typing indicator while a call is in flight; suppressed during
    // generation, where the result panel shows its own progress text
    if app.conversation.busy() && app.conversation.phase() != Phase::Generating {
        lines.push(bot_label());
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("입력 중{dots}"),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let inner_width = area.width.saturating_sub(2).max(1);
    let inner_height = area.height.saturating_sub(2);
    let total_lines = wrapped_line_count(&lines, inner_width);
    let max_scroll = total_lines.saturating_sub(inner_height);
    if app.chat_autoscroll {
        app.chat_scroll = max_scroll;
    } else {
        app.chat_scroll = app.chat_scroll.min(max_scroll);
    }

    let transcript = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(transcript, area);
}

fn user_label() -> Line<'static> {
    Line::from(Span::styled(
        "You:",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))
}

fn bot_label() -> Line<'static> {
    Line::from(Span::styled(
        "Bot:",
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    ))
}

fn push_message_lines(lines: &mut Vec<Line<'static>>, message: &Message) {
    match (&message.sender, &message.payload) {
        (Sender::User, payload) => {
            lines.push(user_label());
            for line in payload_text(payload).lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        (Sender::Bot, Payload::Text(text)) => {
            lines.push(bot_label());
            for line in text.lines() {
                lines.push(parse_markdown_line(line));
            }
        }
        (Sender::Bot, Payload::Question(card)) => {
            lines.push(bot_label());
            for line in card.question.lines() {
                lines.push(Line::from(Span::styled(
                    line.to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                )));
            }
            lines.push(Line::from(Span::styled(
                card.examples_header.clone(),
                Style::default().fg(Color::Gray),
            )));
            for example in &card.examples {
                lines.push(Line::from(Span::styled(
                    format!("• {example}"),
                    Style::default().fg(Color::Gray),
                )));
            }
            if !card.suggestion.is_empty() {
                lines.push(Line::from(Span::styled(
                    "💡 이렇게 답해보세요:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(format!("\"{}\"", card.suggestion)));
            }
        }
    }
    lines.push(Line::default());
}

fn payload_text(payload: &Payload) -> &str {
    match payload {
        Payload::Text(text) => text,
        Payload::Question(card) => &card.question,
    }
}

/// Estimate how many terminal rows the lines occupy after wrapping, so the
/// transcript can stay pinned to its newest message.
fn wrapped_line_count(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let mut total = 0u16;
    for line in lines {
        let line_width = line.width();
        total += if line_width == 0 {
            1
        } else {
            ((line_width.saturating_sub(1) / width) + 1) as u16
        };
    }
    total
}

/// Convert `**bold**` markers in a continuation reply into styled spans.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut bold = false;
    for (i, segment) in text.split("**").enumerate() {
        if i > 0 {
            bold = !bold;
        }
        if segment.is_empty() {
            continue;
        }
        if bold {
            spans.push(Span::styled(
                segment.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::raw(segment.to_string()));
        }
    }
    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let busy = app.conversation.busy();
    let border_color = if app.input_mode == InputMode::Editing && !busy {
        Color::Yellow
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" 메시지 ");

    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if app.cursor >= inner_width {
        app.cursor - inner_width + 1
    } else {
        0
    };

    let input = if app.input.is_empty() {
        let placeholder = if busy {
            "봇이 응답을 생성중입니다..."
        } else {
            "메시지를 입력하세요..."
        };
        Paragraph::new(placeholder)
            .style(Style::default().fg(Color::DarkGray))
            .block(block)
    } else {
        let visible: String = app
            .input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible)
            .style(Style::default().fg(Color::Cyan))
            .block(block)
    };

    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing && !app.show_settings {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_result(app: &mut App, frame: &mut Frame, area: Rect) {
    let generating = app.conversation.busy() && app.conversation.phase() == Phase::Generating;
    let result = app.conversation.builder_result();

    let title = if app.copied_ticks > 0 {
        " 최종 결과 · 복사 완료! "
    } else if result.is_empty() {
        " 최종 결과 "
    } else {
        " 최종 결과 (c: 복사) "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title);

    if generating {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        let progress = Paragraph::new(format!("\n결과를 생성 중입니다{dots}\n잠시만 기다려주세요."))
            .style(Style::default().fg(Color::Gray))
            .wrap(Wrap { trim: true })
            .block(block);
        frame.render_widget(progress, area);
        return;
    }

    if result.is_empty() {
        let placeholder = Paragraph::new(
            "\n최종 결과 패널\n\n왼쪽 채팅창에서 대화를 완료하면\n여기에 10가지 빌더 요청사항이 표시됩니다.",
        )
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true })
        .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let mut parts = result.lines().filter(|line| !line.trim().is_empty());
    let header = parts.next().unwrap_or("생성된 요청 목록");

    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(
            header.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "아래 요청사항을 복사하여 바이브코딩 빌더에 사용해보세요.",
            Style::default().fg(Color::Gray),
        )),
        Line::default(),
    ];
    for item in parts {
        lines.push(Line::from(vec![
            Span::styled("• ", Style::default().fg(Color::Yellow)),
            Span::raw(strip_item_number(item).to_string()),
        ]));
        lines.push(Line::default());
    }

    let inner_width = area.width.saturating_sub(2).max(1);
    let inner_height = area.height.saturating_sub(2);
    let max_scroll = wrapped_line_count(&lines, inner_width).saturating_sub(inner_height);
    app.result_scroll = app.result_scroll.min(max_scroll);

    let panel = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.result_scroll, 0));
    frame.render_widget(panel, area);
}

/// Drop a leading "3. " style numeral; the model numbers the list itself.
fn strip_item_number(line: &str) -> &str {
    let trimmed = line.trim_start();
    let rest = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() < trimmed.len() {
        if let Some(after) = rest.strip_prefix('.') {
            return after.trim_start();
        }
    }
    trimmed
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = if app.show_settings {
        vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" 저장 ", label_style),
            Span::styled(" Ctrl+D ", key_style),
            Span::styled(" 삭제 ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" 닫기 ", label_style),
        ]
    } else {
        match app.input_mode {
            InputMode::Editing => vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" 전송 ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" 메뉴 ", label_style),
                Span::styled(" Ctrl+R ", key_style),
                Span::styled(" 재시작 ", label_style),
            ],
            InputMode::Normal => vec![
                Span::styled(" i ", key_style),
                Span::styled(" 입력 ", label_style),
                Span::styled(" j/k ", key_style),
                Span::styled(" 대화 ", label_style),
                Span::styled(" J/K ", key_style),
                Span::styled(" 결과 ", label_style),
                Span::styled(" c ", key_style),
                Span::styled(" 복사 ", label_style),
                Span::styled(" r ", key_style),
                Span::styled(" 재시작 ", label_style),
                Span::styled(" s ", key_style),
                Span::styled(" 설정 ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" 종료 ", label_style),
            ],
        }
    };

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn render_settings(app: &App, frame: &mut Frame, area: Rect) {
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 8;
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" 설정 · Gemini API Key ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("API Key는 현재 세션에만 저장됩니다.")
        .style(Style::default().fg(Color::Gray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    // Mask the key, keeping the last four characters visible
    let char_count = app.settings_input.chars().count();
    let display_text = if char_count == 0 {
        String::new()
    } else if char_count <= 4 {
        "*".repeat(char_count)
    } else {
        let last_four: String = app.settings_input.chars().skip(char_count - 4).collect();
        format!("{}...{}", "*".repeat((char_count - 4).min(20)), last_four)
    };

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let input = Paragraph::new(display_text).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = app.settings_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let status = if app.keys.get().is_some() {
        "세션 키 사용 중".to_string()
    } else if app.keys.resolve().is_some() {
        format!("{} 환경 변수 사용 중", crate::config::API_KEY_ENV)
    } else {
        "키가 설정되지 않았습니다".to_string()
    };
    let status = Paragraph::new(status).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_item_number_removes_leading_numerals() {
        assert_eq!(strip_item_number("1. 앱을 만들어줘"), "앱을 만들어줘");
        assert_eq!(strip_item_number("10.  두 자리도"), "두 자리도");
        assert_eq!(strip_item_number("  3. 들여쓰기"), "들여쓰기");
        assert_eq!(strip_item_number("번호 없음"), "번호 없음");
        assert_eq!(strip_item_number("2023년 출시"), "2023년 출시");
    }

    #[test]
    fn markdown_bold_runs_become_styled_spans() {
        let line = parse_markdown_line("핵심은 **기록**입니다");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "기록");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));

        let plain = parse_markdown_line("강조 없음");
        assert_eq!(plain.spans.len(), 1);
    }

    #[test]
    fn wrapped_line_count_accounts_for_width() {
        let lines = vec![Line::from("abcdefghij"), Line::default()];
        assert_eq!(wrapped_line_count(&lines, 5), 3);
        assert_eq!(wrapped_line_count(&lines, 20), 2);
    }
}
