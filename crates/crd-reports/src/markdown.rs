//! Preview renderer for article markdown.
//!
//! Handles a fixed subset, one line at a time: ATX headers, `-`/`*`/`+` and numbered
//! lists, horizontal rules, paragraphs, `**bold**`, `*italic*` and `` `code` ``.
//! Input is HTML-escaped before any markup is produced, so the output is safe to embed.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap());
static UNORDERED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-*+]\s+(.+)$").unwrap());
static ORDERED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+[.)]\s+(.+)$").unwrap());
static RULE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:-{3,}|\*{3,}|_{3,})\s*$").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\s][^*]*?)\*").unwrap());
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Unordered => "ul",
            Self::Ordered => "ol",
        }
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn inline(text: &str) -> String {
    let text = CODE_RE.replace_all(text, "<code>$1</code>");
    let text = BOLD_RE.replace_all(&text, "<strong>$1</strong>");
    ITALIC_RE.replace_all(&text, "<em>$1</em>").into_owned()
}

#[derive(Default)]
struct Renderer {
    out: Vec<String>,
    paragraph: Vec<String>,
    list: Option<ListKind>,
}

impl Renderer {
    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let joined = self.paragraph.join(" ");
            self.out.push(format!("<p>{}</p>", inline(&joined)));
            self.paragraph.clear();
        }
    }

    fn close_list(&mut self) {
        if let Some(kind) = self.list.take() {
            self.out.push(format!("</{}>", kind.tag()));
        }
    }

    fn close_blocks(&mut self) {
        self.flush_paragraph();
        self.close_list();
    }

    fn list_item(&mut self, kind: ListKind, text: &str) {
        self.flush_paragraph();
        if self.list != Some(kind) {
            self.close_list();
            self.out.push(format!("<{}>", kind.tag()));
            self.list = Some(kind);
        }
        self.out.push(format!("<li>{}</li>", inline(text)));
    }

    fn line(&mut self, raw: &str) {
        let line = escape_html(raw.trim_end());
        if line.trim().is_empty() {
            self.close_blocks();
        } else if let Some(caps) = HEADING_RE.captures(&line) {
            self.close_blocks();
            let level = caps[1].len();
            self.out
                .push(format!("<h{level}>{}</h{level}>", inline(&caps[2])));
        } else if RULE_RE.is_match(&line) {
            self.close_blocks();
            self.out.push("<hr>".to_string());
        } else if let Some(caps) = UNORDERED_RE.captures(&line) {
            self.list_item(ListKind::Unordered, &caps[1]);
        } else if let Some(caps) = ORDERED_RE.captures(&line) {
            self.list_item(ListKind::Ordered, &caps[1]);
        } else {
            self.close_list();
            self.paragraph.push(line.trim().to_string());
        }
    }

    fn finish(mut self) -> String {
        self.close_blocks();
        self.out.join("\n")
    }
}

pub fn render_preview(markdown: &str) -> String {
    let mut renderer = Renderer::default();
    for raw in markdown.lines() {
        renderer.line(raw);
    }
    renderer.finish()
}

/// Whitespace-separated word count, used when the agent did not store one.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}
