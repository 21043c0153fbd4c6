use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use regex::Regex;
use std::sync::OnceLock;

/// A run of assistant text: either prose or a fenced code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Prose(String),
    Code {
        language: Option<String>,
        code: String,
        /// False while the closing fence has not streamed in yet.
        closed: bool,
    },
}

fn fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"^\s*```\s*([A-Za-z0-9_+#.-]*)\s*$").expect("fence pattern is valid")
    })
}

/// Split text into prose and ``` fenced code blocks.
///
/// An unterminated fence runs to the end of the text, so a reply that is
/// still streaming renders its code block as it arrives.
pub fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut code: Option<(Option<String>, Vec<&str>)> = None;

    for line in text.lines() {
        // Some("") for a bare fence, Some(tag) for a tagged one.
        let fence_tag = fence()
            .captures(line)
            .map(|caps| caps.get(1).map_or("", |m| m.as_str()));

        match code.as_mut() {
            None => match fence_tag {
                Some(tag) => {
                    if !prose.is_empty() {
                        blocks.push(Block::Prose(prose.join("\n")));
                        prose.clear();
                    }
                    let language = (!tag.is_empty()).then(|| tag.to_string());
                    code = Some((language, Vec::new()));
                }
                None => prose.push(line),
            },
            Some((_, lines)) => {
                if fence_tag == Some("") {
                    if let Some((language, lines)) = code.take() {
                        blocks.push(Block::Code {
                            language,
                            code: lines.join("\n"),
                            closed: true,
                        });
                    }
                } else {
                    lines.push(line);
                }
            }
        }
    }

    if let Some((language, lines)) = code {
        blocks.push(Block::Code {
            language,
            code: lines.join("\n"),
            closed: false,
        });
    } else if !prose.is_empty() {
        blocks.push(Block::Prose(prose.join("\n")));
    }
    blocks
}

/// Parse a line of prose, styling **bold** and `inline code` spans
pub fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current = String::new();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut bold = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'*') {
                        chars.next();
                        closed = true;
                        break;
                    }
                    bold.push(c);
                }
                if closed && !bold.is_empty() {
                    if !current.is_empty() {
                        spans.push(Span::raw(std::mem::take(&mut current)));
                    }
                    spans.push(Span::styled(
                        bold,
                        Style::default().add_modifier(Modifier::BOLD),
                    ));
                } else {
                    // No closing **, treat as literal
                    current.push_str("**");
                    current.push_str(&bold);
                }
            }
            '`' => {
                let mut code = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '`' {
                        closed = true;
                        break;
                    }
                    code.push(c);
                }
                if closed && !code.is_empty() {
                    if !current.is_empty() {
                        spans.push(Span::raw(std::mem::take(&mut current)));
                    }
                    spans.push(Span::styled(code, code_style()));
                } else {
                    current.push('`');
                    current.push_str(&code);
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        spans.push(Span::raw(current));
    }
    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn code_style() -> Style {
    Style::default().fg(Color::Green)
}

/// Render assistant text into display lines.
pub fn render_markdown(text: &str) -> Vec<Line<'static>> {
    let gutter = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();

    for block in split_blocks(text) {
        match block {
            Block::Prose(prose) => lines.extend(prose.lines().map(parse_markdown_line)),
            Block::Code { language, code, .. } => {
                let label = language.unwrap_or_else(|| "code".to_string());
                lines.push(Line::from(Span::styled(format!("┌─ {label}"), gutter)));
                for line in code.lines() {
                    lines.push(Line::from(vec![
                        Span::styled("│ ", gutter),
                        Span::styled(line.to_string(), code_style()),
                    ]));
                }
                lines.push(Line::from(Span::styled("└─", gutter)));
            }
        }
    }
    lines
}
