use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};

const COLOR_HEADING: Color = Color::Rgb(249, 226, 175);
const COLOR_CODE: Color = Color::Rgb(137, 220, 235);
const COLOR_QUOTE: Color = Color::Rgb(166, 227, 161);
const COLOR_MARKER: Color = Color::Rgb(250, 179, 135);
const COLOR_LINK: Color = Color::Rgb(137, 180, 250);

/// Turns an answer buffer into styled terminal text. Stateless: every call
/// renders the whole input, so a half-streamed answer (open code fence,
/// dangling emphasis) simply renders as far as it goes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, input: &str) -> Text<'static> {
        let mut opts = Options::empty();
        opts.insert(Options::ENABLE_STRIKETHROUGH);
        opts.insert(Options::ENABLE_TABLES);
        opts.insert(Options::ENABLE_TASKLISTS);

        let mut writer = Writer::default();
        for event in Parser::new_ext(input, opts) {
            writer.event(event);
        }
        writer.finish()
    }
}

#[derive(Default)]
struct Writer {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    prefix: Vec<Span<'static>>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    heading: Option<HeadingLevel>,
    emphasis: usize,
    strong: usize,
    strike: usize,
    in_code_block: bool,
    link: Option<String>,
}

impl Writer {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    self.code_text(&text);
                } else {
                    let style = self.inline_style();
                    self.push(Span::styled(text.into_string(), style));
                }
            }
            Event::Code(code) => {
                self.push(Span::styled(
                    format!("`{code}`"),
                    Style::default().fg(COLOR_CODE),
                ));
            }
            Event::SoftBreak => self.push(Span::raw(" ")),
            Event::HardBreak => self.break_line(),
            Event::Rule => {
                self.break_line();
                self.lines.push(Line::from(Span::styled(
                    "─".repeat(24),
                    Style::default().fg(Color::DarkGray),
                )));
                self.blank();
            }
            Event::TaskListMarker(done) => {
                self.push(Span::raw(if done { "[x] " } else { "[ ] " }));
            }
            Event::FootnoteReference(name) => self.push(Span::raw(format!("[{name}]"))),
            Event::Html(html) | Event::InlineHtml(html) => {
                self.push(Span::raw(html.into_string()));
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.break_line(),
            Tag::Heading { level, .. } => {
                self.break_line();
                self.heading = Some(level);
            }
            Tag::BlockQuote => {
                self.break_line();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.break_line();
                self.in_code_block = true;
                let fence = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => format!("```{lang}"),
                    _ => "```".to_string(),
                };
                self.lines.push(Line::from(Span::styled(
                    fence,
                    Style::default().fg(Color::DarkGray),
                )));
            }
            Tag::List(start) => {
                self.break_line();
                self.lists.push(start);
            }
            Tag::Item => {
                self.break_line();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(index)) => {
                        let marker = format!("{index}. ");
                        *index += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.spans.push(Span::raw("  ".repeat(depth)));
                self.spans
                    .push(Span::styled(marker, Style::default().fg(COLOR_MARKER)));
            }
            Tag::Emphasis => self.emphasis += 1,
            Tag::Strong => self.strong += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.into_string()),
            Tag::Image { dest_url, .. } => {
                self.push(Span::raw(format!("[image: {dest_url}]")));
            }
            Tag::TableCell => self.push(Span::raw("| ")),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.break_line();
                self.blank();
            }
            TagEnd::Heading(_) => {
                self.break_line();
                self.heading = None;
                self.blank();
            }
            TagEnd::BlockQuote => {
                self.break_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.lines.push(Line::from(Span::styled(
                    "```",
                    Style::default().fg(Color::DarkGray),
                )));
                self.blank();
            }
            TagEnd::List(_) => {
                self.break_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.break_line(),
            TagEnd::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            TagEnd::Strong => self.strong = self.strong.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => {
                if let Some(url) = self.link.take() {
                    self.push(Span::styled(
                        format!(" <{url}>"),
                        Style::default().fg(COLOR_LINK),
                    ));
                }
            }
            TagEnd::TableRow | TagEnd::TableHead => self.break_line(),
            _ => {}
        }
    }

    fn inline_style(&self) -> Style {
        let mut style = Style::default();
        if let Some(level) = self.heading {
            style = style.fg(COLOR_HEADING).add_modifier(Modifier::BOLD);
            if level == HeadingLevel::H1 {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
        }
        if self.quote_depth > 0 {
            style = style.fg(COLOR_QUOTE);
        }
        if self.emphasis > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.strong > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.strike > 0 {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        if self.link.is_some() {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        style
    }

    fn code_text(&mut self, text: &str) {
        for line in text.lines() {
            self.lines.push(Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(COLOR_CODE),
            )));
        }
    }

    fn push(&mut self, span: Span<'static>) {
        if self.spans.is_empty() && self.quote_depth > 0 {
            self.prefix = vec![Span::styled(
                format!("{} ", ">".repeat(self.quote_depth)),
                Style::default().fg(COLOR_QUOTE),
            )];
        }
        self.spans.push(span);
    }

    fn break_line(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = std::mem::take(&mut self.prefix);
        spans.append(&mut self.spans);
        self.lines.push(Line::from(spans));
    }

    fn blank(&mut self) {
        if !matches!(self.lines.last(), Some(line) if line.spans.is_empty()) && !self.lines.is_empty() {
            self.lines.push(Line::default());
        }
    }

    fn finish(mut self) -> Text<'static> {
        self.break_line();
        while matches!(self.lines.last(), Some(line) if line.spans.is_empty()) {
            self.lines.pop();
        }
        Text::from(self.lines)
    }
}

/// Flattens rendered text back to plain strings, one per line.
pub fn plain_lines(text: &Text<'_>) -> Vec<String> {
    text.lines
        .iter()
        .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
        .collect()
}
