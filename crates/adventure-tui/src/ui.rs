use adventure_core::{Availability, ChatRole};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Word-wrap a styled line to `width` columns.
///
/// Greedy fill like a word processor; a word longer than a whole row is
/// split across rows. An empty line stays one empty row.
pub(crate) fn wrap_line(line: Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 {
        return vec![line];
    }

    let mut words: Vec<Vec<(char, Style)>> = Vec::new();
    let mut word = Vec::new();
    for span in &line.spans {
        for c in span.content.chars() {
            if c.is_whitespace() {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            } else {
                word.push((c, span.style));
            }
        }
    }
    if !word.is_empty() {
        words.push(word);
    }

    let mut rows: Vec<Vec<(char, Style)>> = Vec::new();
    let mut row: Vec<(char, Style)> = Vec::new();
    for word in &words {
        for piece in word.chunks(width) {
            if row.is_empty() {
                row.extend_from_slice(piece);
            } else if row.len() + 1 + piece.len() <= width {
                row.push((' ', Style::default()));
                row.extend_from_slice(piece);
            } else {
                rows.push(std::mem::replace(&mut row, piece.to_vec()));
            }
        }
    }
    if !row.is_empty() || rows.is_empty() {
        rows.push(row);
    }

    rows.into_iter().map(styled_row).collect()
}

/// Group runs of equally styled characters back into spans
fn styled_row(row: Vec<(char, Style)>) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut text = String::new();
    let mut style = Style::default();
    for (c, char_style) in row {
        if char_style != style && !text.is_empty() {
            spans.push(Span::styled(std::mem::take(&mut text), style));
        }
        style = char_style;
        text.push(c);
    }
    if !text.is_empty() {
        spans.push(Span::styled(text, style));
    }
    Line::from(spans)
}

/// The transcript as screen rows, wrapped to `width`
pub(crate) fn transcript_lines(app: &App, width: usize) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut push = |line: Line<'static>| lines.extend(wrap_line(line, width));

    for msg in app.session.transcript().messages() {
        match msg.role {
            ChatRole::User => {
                push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                push(Line::from(msg.content.clone()));
                push(Line::default());
            }
            ChatRole::Assistant => {
                push(Line::from(Span::styled(
                    "Narrator:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    push(parse_markdown_line(line));
                }
                push(Line::default());
            }
            ChatRole::System => {}
        }
    }

    if app.session.awaiting_first_chunk() {
        push(Line::from(Span::styled(
            "Narrator:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
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

    if let Availability::Missing { .. } = app.session.availability() {
        render_install_prompt(app, frame, body_area);
    } else if app.session.is_started() {
        render_game_screen(app, frame, body_area);
    } else {
        render_start_screen(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);

    if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Text Adventure ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" {}: {} ", app.client.provider(), app.selected_model),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    if let Some(notification) = &app.notification {
        let line = Line::from(vec![
            Span::styled(" ! ", Style::default().bg(Color::Red).fg(Color::White).bold()),
            Span::styled(
                format!(" {} ", notification.message),
                Style::default().fg(Color::Red),
            ),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INPUT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match (app.session.is_started(), app.input_mode) {
        (false, _) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" start ", label_style),
            Span::styled(" m ", key_style),
            Span::styled(" model ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (true, InputMode::Editing) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" PgUp/PgDn ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" normal ", label_style),
        ],
        (true, InputMode::Normal) => vec![
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new game ", label_style),
            Span::styled(" m ", key_style),
            Span::styled(" model ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    spans.extend(hints);
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_start_screen(app: &App, frame: &mut Frame, area: Rect) {
    let status = match app.session.availability() {
        Availability::Unknown => Span::styled(
            "Looking for a model provider...",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ),
        Availability::Available { provider, detail } => Span::styled(
            format!("Connected to {} at {}", provider.display_name(), detail),
            Style::default().fg(Color::Green),
        ),
        Availability::Missing { .. } => Span::raw(""),
    };

    // Dim the start key until a provider has answered
    let enter_color = if app.session.availability().is_available() {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let text = Text::from(vec![
        Line::default(),
        Line::from(Span::styled(
            "A text adventure narrated by a language model",
            Style::default().fg(Color::Cyan).bold(),
        )),
        Line::default(),
        Line::from(status),
        Line::default(),
        Line::from(vec![
            Span::raw("Press "),
            Span::styled("Enter", Style::default().fg(enter_color).bold()),
            Span::raw(" to start the game"),
        ]),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let paragraph = Paragraph::new(text)
        .block(block)
        .alignment(ratatui::layout::Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

/// Stays up for the whole session; detection only runs at startup
fn render_install_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let Availability::Missing { provider, reason } = app.session.availability() else {
        return;
    };

    let text = Text::from(vec![
        Line::default(),
        Line::from(Span::styled(
            format!("{} is not available", provider.display_name()),
            Style::default().fg(Color::Red).bold(),
        )),
        Line::from(Span::styled(reason.clone(), Style::default().fg(Color::DarkGray))),
        Line::default(),
        Line::from(provider.install_hint()),
        Line::default(),
        Line::from("Restart this program once the provider is running."),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Model provider required ");
    let paragraph = Paragraph::new(text)
        .block(block)
        .alignment(ratatui::layout::Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_game_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    let resized = app.chat_height != chat_area.height.saturating_sub(2)
        || app.chat_width != chat_area.width.saturating_sub(2);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);
    if resized && app.follow_output {
        app.scroll_to_bottom();
    }

    let lines = transcript_lines(app, app.chat_width as usize);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Adventure ");
    // Already wrapped, so the scroll offset matches `App::transcript_line_count`
    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_input(app, frame, input_area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let (border_color, title) = if app.session.is_loading() {
        (Color::DarkGray, " The narrator is speaking... ")
    } else if editing {
        (Color::Yellow, " What do you do? ")
    } else {
        (Color::DarkGray, " What do you do? (i to type) ")
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Keep the cursor visible with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 40.min(area.width.saturating_sub(4));
    let popup_height = (app.available_models.len() as u16 + 2).min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if model == &app.selected_model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
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
