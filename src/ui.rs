use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, InputMode, Screen};
use crate::conversation::{Role, Subject};

/// Style `**bold**` runs in assistant text; everything else is raw.
fn styled_line(text: &str) -> Line<'static> {
    let segments: Vec<&str> = text.split("**").collect();
    if segments.len() == 1 {
        return Line::from(text.to_string());
    }

    let balanced = segments.len() % 2 == 1;
    let mut spans: Vec<Span<'static>> = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        if i % 2 == 0 {
            if !segment.is_empty() {
                spans.push(Span::raw(segment.to_string()));
            }
        } else if balanced || i + 1 < segments.len() {
            spans.push(Span::styled(
                segment.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else {
            // Unclosed marker, keep it literal
            spans.push(Span::raw(format!("**{}", segment)));
        }
    }
    Line::from(spans)
}

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

    match app.screen {
        Screen::SubjectSelect => render_subject_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let subject_indicator = match app.subject {
        Some(subject) => format!(" [{}]", subject.display_name()),
        None => String::new(),
    };

    let title = Line::from(vec![
        Span::styled(" tutor ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(subject_indicator, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::SubjectSelect => " SUBJECT ",
        Screen::Chat => " CHAT ",
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match (app.screen, app.input_mode) {
        (Screen::SubjectSelect, _) => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" choose ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" start ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (Screen::Chat, InputMode::Normal) => vec![
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new chat ", label_style),
            Span::styled(" s ", key_style),
            Span::styled(" subject ", label_style),
            Span::styled(" M ", key_style),
            Span::styled(" model ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (Screen::Chat, InputMode::Editing) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" /image <path> [caption] ", key_style),
            Span::styled(" attach ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" keys ", label_style),
        ],
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_subject_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_width = 44.min(area.width.saturating_sub(4));
    let popup_height = 9.min(area.height.saturating_sub(2));
    let popup_x = (area.width.saturating_sub(popup_width)) / 2 + area.x;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2 + area.y;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Let's get started! ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let [prompt_area, list_area, tip_area] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(2),
        Constraint::Min(0),
    ])
    .areas(inner);

    let prompt = Paragraph::new("What subject are you working on today?")
        .style(Style::default().fg(Color::White));
    frame.render_widget(prompt, prompt_area);

    let items: Vec<ListItem> = Subject::all()
        .iter()
        .map(|s| ListItem::new(format!(" {} ", s.display_name())))
        .collect();

    let list = List::new(items)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.subject_state);

    let tip = Paragraph::new("Think first, then ask — I'll guide you step by step.")
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: true });
    frame.render_widget(tip, tip_area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", app.model));

    let inner = chat_block.inner(area);
    app.chat_height = inner.height;
    app.chat_width = inner.width;

    let transcript = app.conversation.transcript();
    let chat_text = if transcript.is_empty() && !app.loading {
        Text::from(Span::styled(
            "Type your question here...",
            Style::default().fg(Color::Gray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in transcript {
            match msg.role {
                Role::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.display_text().lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                    if msg.has_image() {
                        lines.push(Line::from(Span::styled(
                            "[image attached]",
                            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
                        )));
                    }
                    lines.push(Line::default());
                }
                Role::Assistant => {
                    lines.push(Line::from(Span::styled(
                        "Tutor:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.display_text().lines() {
                        lines.push(styled_line(line));
                    }
                    lines.push(Line::default());
                }
                // The system instruction never renders; transcript() excludes it
                Role::System => {}
            }
        }

        if app.loading {
            lines.push(Line::from(Span::styled(
                "Tutor:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &mut App, frame: &mut Frame, area: Rect) {
    let input_border_color = if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Ask ");

    // Horizontal scroll keeps the cursor visible in a one-line input.
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if app.input_mode == InputMode::Editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_width = 36.min(area.width.saturating_sub(4));
    let popup_height = (app.available_models.len() as u16 + 2).min(area.height.saturating_sub(4));
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Model (gpt-4o for images) ");

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|m| ListItem::new(format!(" {} ", m)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn plain_text_stays_plain() {
        let line = styled_line("no markup here");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line_text(&line), "no markup here");
    }

    #[test]
    fn bold_runs_are_styled() {
        let line = styled_line("try **counting** up");
        assert_eq!(line_text(&line), "try counting up");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn unclosed_marker_stays_literal() {
        let line = styled_line("a **b");
        assert_eq!(line_text(&line), "a **b");
    }
}
