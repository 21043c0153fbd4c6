use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use wonderai_core::{ChatMessage, ChatRole, MapWidget};

use crate::app::{App, Connectivity};
use crate::markdown::render_markdown;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let banner_height = u16::from(app.session.store().error().is_some());

    // Main layout: header, error banner, chat, input, footer
    let [header_area, banner_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(banner_height),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    if banner_height > 0 {
        render_banner(app, frame, banner_area);
    }
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (indicator, color) = match app.connectivity() {
        Connectivity::Online => ("● online", Color::Green),
        Connectivity::Offline => ("● offline", Color::Red),
        Connectivity::Reconnecting => ("◌ reconnecting", Color::Yellow),
    };

    let title = Line::from(vec![
        Span::styled(" WonderAI ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("#{} ", app.conversation_id),
            Style::default().fg(Color::White),
        ),
        Span::styled(indicator, Style::default().fg(color).bold()),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_banner(app: &App, frame: &mut Frame, area: Rect) {
    let Some(error) = app.session.store().error() else {
        return;
    };
    let banner = Paragraph::new(Line::from(vec![
        Span::styled(" ✖ ", Style::default().bold()),
        Span::raw(error.to_string()),
        Span::styled("  (Esc to dismiss)", Style::default().add_modifier(Modifier::DIM)),
    ]))
    .style(Style::default().bg(Color::Red).fg(Color::White));
    frame.render_widget(banner, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", app.identity.id()));

    let view = app.session.store().merged_view();
    let lines: Vec<Line<'static>> = if view.is_empty() {
        vec![Line::from(Span::styled(
            "Say hello to WonderAI...",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        view.iter()
            .flat_map(|msg| message_lines(msg, app.animation_frame))
            .collect()
    };

    let total = wrapped_height(&lines, inner_width);
    app.max_scroll = total.saturating_sub(app.chat_height);
    app.scroll = if app.follow {
        app.max_scroll
    } else {
        app.scroll.min(app.max_scroll)
    };

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    frame.render_widget(chat, area);
}

/// Display lines for one message, followed by a blank separator.
fn message_lines(msg: &ChatMessage, animation_frame: u8) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    match msg.role {
        ChatRole::User => {
            let mut label = vec![Span::styled(
                "You:",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )];
            if msg.is_optimistic {
                label.push(Span::styled(" sending", Style::default().fg(Color::DarkGray)));
            }
            lines.push(Line::from(label));

            let style = if msg.is_optimistic {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            lines.extend(
                msg.text
                    .lines()
                    .map(|l| Line::from(Span::styled(l.to_string(), style))),
            );
        }
        ChatRole::Assistant => {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));

            if msg.is_streaming && msg.text.is_empty() {
                // Animated ellipsis: cycles through ".", "..", "..."
                let dots = ".".repeat(animation_frame as usize + 1);
                lines.push(Line::from(Span::styled(
                    format!("Thinking{dots}"),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            } else {
                lines.extend(render_markdown(&msg.text));
                if msg.is_streaming && animation_frame % 2 == 0 {
                    let cursor = Span::styled("▌", Style::default().fg(Color::Yellow));
                    // Only the "AI:" label so far: the cursor gets its own row.
                    if lines.len() > 1 {
                        if let Some(last) = lines.last_mut() {
                            last.spans.push(cursor);
                        }
                    } else {
                        lines.push(Line::from(cursor));
                    }
                }
            }
        }
    }

    for url in &msg.images {
        lines.push(Line::from(vec![
            Span::styled("🖼  ", Style::default().fg(Color::Magenta)),
            Span::styled(url.clone(), Style::default().fg(Color::Magenta).underlined()),
        ]));
    }
    if let Some(map) = &msg.map {
        lines.push(Line::from(Span::styled(
            map_summary(map),
            Style::default().fg(Color::Green),
        )));
    }

    lines.push(Line::default());
    lines
}

fn map_summary(map: &MapWidget) -> String {
    let mut summary = format!(
        "📍 map at {:.4}, {:.4} (zoom {}, {} marker{})",
        map.center.latitude,
        map.center.longitude,
        map.zoom,
        map.markers.len(),
        if map.markers.len() == 1 { "" } else { "s" }
    );
    if let Some(url) = &map.map_url {
        summary.push(' ');
        summary.push_str(url);
    }
    summary
}

/// Rows the lines occupy once wrapped to `width`
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = usize::from(width.max(1));
    let rows: usize = lines
        .iter()
        .map(|line| line.width().div_ceil(width).max(1))
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (title, border) = if app.is_streaming() {
        (" Streaming (Esc to cancel) ", Color::DarkGray)
    } else {
        (" Message (Enter to send) ", Color::Yellow)
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title);

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width > 0 && app.cursor >= inner_width {
        app.cursor - inner_width + 1
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

    let cursor_x = (app.cursor - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let esc_label = if app.is_streaming() {
        " cancel "
    } else {
        " dismiss "
    };
    let mut hints = vec![
        Span::styled(" Enter ", key_style),
        Span::styled(" send ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(esc_label, label_style),
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" ^N ", key_style),
        Span::styled(" new id ", label_style),
        Span::styled(" ^C ", key_style),
        Span::styled(" quit ", label_style),
    ];
    if let Some(notice) = &app.notice {
        hints.push(Span::styled(
            format!("  {notice}"),
            Style::default().fg(Color::Green),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}
