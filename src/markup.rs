//! Markup – a small HTML-subset tree shared by the manuscript decoder, the
//! two renderers' output markup and the built-in layout engine.
//!
//! The parser is a hand-written recursive descent over the controlled subset
//! word-processor exports and our own writers produce: headings, paragraphs,
//! containers, inline formatting, `class` and `style` attributes.

use std::collections::HashMap;
use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// The tag name of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Html,
    Head,
    Title,
    Meta,
    Body,
    Header,
    Section,
    Article,
    Div,
    Blockquote,
    P,
    /// `h1`–`h6`.
    Heading(u8),
    Ul,
    Ol,
    Li,
    Span,
    Strong,
    B,
    Em,
    I,
    U,
    A,
    Br,
    Hr,
    Img,
    Script,
    Style,
    /// Anything else. Its children are still visited.
    Unknown(String),
}

impl Tag {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "head" => Tag::Head,
            "title" => Tag::Title,
            "meta" => Tag::Meta,
            "body" => Tag::Body,
            "header" => Tag::Header,
            "section" => Tag::Section,
            "article" => Tag::Article,
            "div" => Tag::Div,
            "blockquote" => Tag::Blockquote,
            "p" => Tag::P,
            "h1" => Tag::Heading(1),
            "h2" => Tag::Heading(2),
            "h3" => Tag::Heading(3),
            "h4" => Tag::Heading(4),
            "h5" => Tag::Heading(5),
            "h6" => Tag::Heading(6),
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "span" => Tag::Span,
            "strong" => Tag::Strong,
            "b" => Tag::B,
            "em" => Tag::Em,
            "i" => Tag::I,
            "u" => Tag::U,
            "a" => Tag::A,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "img" => Tag::Img,
            "script" => Tag::Script,
            "style" => Tag::Style,
            other => Tag::Unknown(other.to_string()),
        }
    }

    /// Elements that never have children or a closing tag.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Meta | Tag::Br | Tag::Hr | Tag::Img)
    }

    /// Elements whose content is raw text rather than markup.
    pub fn is_raw_text(&self) -> bool {
        matches!(self, Tag::Script | Tag::Style)
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Tag::Span | Tag::Strong | Tag::B | Tag::Em | Tag::I | Tag::U | Tag::A | Tag::Br
        )
    }

    /// Elements that hold a single run of text in the flow.
    pub fn is_text_block(&self) -> bool {
        matches!(self, Tag::P | Tag::Heading(_) | Tag::Li)
    }
}

/// A node in the markup tree.
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone)]
pub struct Element {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attributes.get("style").map(|s| s.as_str())
    }

    /// Concatenated text of all descendants with whitespace collapsed.
    pub fn text_content(&self) -> String {
        let mut raw = String::new();
        collect_text(&self.children, &mut raw);
        collapse_whitespace(&raw)
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if e.tag == Tag::Br => out.push(' '),
            Node::Element(e) if e.tag.is_raw_text() => {}
            Node::Element(e) => collect_text(&e.children, out),
        }
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
/// Non-breaking spaces are kept.
pub fn collapse_whitespace(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() && c != '\u{00A0}')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Parser – simple recursive descent over HTML
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of nodes.
pub fn parse_html(html: &str) -> Vec<Node> {
    let mut parser = Parser::new(html);
    parser.parse_nodes()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Names of the elements currently being parsed, outermost first.
    open: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            open: Vec::new(),
        }
    }

    fn parse_nodes(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        loop {
            self.skip_whitespace_preserve();
            if self.eof() {
                break;
            }
            if self.starts_with("</") {
                // Closing an open element (ours or an ancestor's) ends this
                // run of children; any other closing tag is stray.
                if self.open.iter().any(|name| self.closing_tag_is(name)) {
                    break;
                }
                self.skip_closing_tag();
                continue;
            }
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<Node> {
        if self.starts_with("<!--") {
            self.skip_comment();
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            // Doctype / processing instruction
            self.skip_until(">");
            return None;
        }
        if self.starts_with("<") && self.peek_is_tag_start() {
            Some(self.parse_element())
        } else {
            Some(self.parse_text())
        }
    }

    fn parse_text(&mut self) -> Node {
        let start = self.pos;
        // Always consume at least one char so a lone '<' cannot stall us.
        self.advance(1);
        while !self.eof() && !self.starts_with("<") {
            self.advance(1);
        }
        Node::Text(decode_entities(&self.input[start..self.pos]))
    }

    fn parse_element(&mut self) -> Node {
        // Consume '<'
        self.advance(1);
        let tag_name = self.parse_name();
        let tag = Tag::parse(&tag_name);
        let mut elem = Element::new(tag.clone());

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let (key, value) = self.parse_attribute();
            if key.is_empty() {
                // Garbage inside the tag; skip one char and keep going.
                self.advance(1);
                continue;
            }
            elem.attributes.insert(key.to_ascii_lowercase(), value);
        }

        if self.starts_with("/>") {
            self.advance(2);
            return Node::Element(elem);
        }
        if self.starts_with(">") {
            self.advance(1);
        }
        if tag.is_void() {
            return Node::Element(elem);
        }
        if tag.is_raw_text() {
            let close = format!("</{}", tag_name);
            let start = self.pos;
            while !self.eof() && !self.starts_with_ci(&close) {
                self.advance(1);
            }
            elem.children
                .push(Node::Text(self.input[start..self.pos].to_string()));
        } else {
            self.open.push(tag_name.clone());
            elem.children = self.parse_nodes();
            self.open.pop();
        }

        if self.closing_tag_is(&tag_name) {
            self.skip_closing_tag();
        }
        Node::Element(elem)
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance(1);
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.advance(1); // skip '='
        self.skip_whitespace();
        let value = self.parse_attr_value();
        (key, value)
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                self.advance(1);
                let start = self.pos;
                while !self.eof() && !self.starts_with(quote) {
                    self.advance(1);
                }
                let val = self.input[start..self.pos].to_string();
                if !self.eof() {
                    self.advance(1);
                }
                return decode_entities(&val);
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' || c == '/' {
                break;
            }
            self.advance(1);
        }
        decode_entities(&self.input[start..self.pos])
    }

    fn closing_tag_is(&self, name: &str) -> bool {
        let rest = &self.input[self.pos..];
        let Some(after) = rest.strip_prefix("</") else {
            return false;
        };
        after.len() >= name.len()
            && after.is_char_boundary(name.len())
            && after[..name.len()].eq_ignore_ascii_case(name)
            && after[name.len()..]
                .chars()
                .next()
                .map_or(true, |c| c == '>' || c.is_whitespace())
    }

    fn skip_closing_tag(&mut self) {
        self.skip_until(">");
    }

    fn skip_until(&mut self, terminator: &str) {
        while !self.eof() && !self.starts_with(terminator) {
            self.advance(1);
        }
        if !self.eof() {
            self.advance(terminator.chars().count());
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
    }

    fn skip_whitespace_preserve(&mut self) {
        // Skip runs of pure whitespace between elements.
        let saved = self.pos;
        self.skip_whitespace();
        // If we reached a tag or EOF, keep the skip. Otherwise revert.
        if !self.eof() && !self.starts_with("<") {
            self.pos = saved;
        }
    }

    fn skip_comment(&mut self) {
        self.advance(4); // skip <!--
        self.skip_until("-->");
    }

    fn peek_is_tag_start(&self) -> bool {
        self.input[self.pos..]
            .chars()
            .nth(1)
            .is_some_and(|c| c.is_ascii_alphabetic())
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn starts_with_ci(&self, s: &str) -> bool {
        let rest = &self.input[self.pos..];
        rest.len() >= s.len()
            && rest.is_char_boundary(s.len())
            && rest[..s.len()].eq_ignore_ascii_case(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn advance(&mut self, n: usize) {
        // Advance by `n` characters (not bytes).
        for _ in 0..n {
            if let Some(c) = self.input[self.pos..].chars().next() {
                self.pos += c.len_utf8();
            }
        }
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &rest[1..semi];
            decode_entity(entity).map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(num) = entity.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Convenience helpers
// ---------------------------------------------------------------------------

/// Find the `<body>` element and return its children, or return all nodes if
/// no `<body>` is present.
pub fn body_children(nodes: &[Node]) -> Vec<Node> {
    find_element(nodes, &Tag::Body)
        .map(|body| body.children.clone())
        .unwrap_or_else(|| nodes.to_vec())
}

/// Depth-first search for the first element with `tag`.
pub fn find_element<'a>(nodes: &'a [Node], tag: &Tag) -> Option<&'a Element> {
    for node in nodes {
        if let Node::Element(e) = node {
            if &e.tag == tag {
                return Some(e);
            }
            if let Some(found) = find_element(&e.children, tag) {
                return Some(found);
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Escape text for use in element content or a double-quoted attribute.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\u{00A0}' => out.push_str("&#160;"),
            c => out.push(c),
        }
    }
    out
}

/// Incremental writer for the styled markup both renderers emit.
#[derive(Debug, Default)]
pub struct MarkupWriter {
    out: String,
    depth: usize,
}

impl MarkupWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<!DOCTYPE html>` plus the opening `html`/`head`/`title` section.
    pub fn document_start(&mut self, title: &str, extra_head: &[&str]) {
        self.out.push_str("<!DOCTYPE html>\n");
        self.open("html", &[("xmlns", "http://www.w3.org/1999/xhtml")]);
        self.open("head", &[]);
        self.line("<meta charset=\"utf-8\"/>");
        self.line(&format!("<title>{}</title>", escape(title)));
        for line in extra_head {
            self.line(line);
        }
        self.close("head");
        self.open("body", &[]);
    }

    pub fn document_end(&mut self) {
        self.close("body");
        self.close("html");
    }

    pub fn open(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        let line = format!("<{tag}{}>", render_attrs(attrs));
        self.line(&line);
        self.depth += 1;
    }

    pub fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(&format!("</{tag}>"));
    }

    /// A complete element holding escaped text.
    pub fn text_element(&mut self, tag: &str, attrs: &[(&str, &str)], text: &str) {
        let line = format!("<{tag}{}>{}</{tag}>", render_attrs(attrs), escape(text));
        self.line(&line);
    }

    fn line(&mut self, s: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub fn finish(self) -> String {
        self.out
    }
}

fn render_attrs(attrs: &[(&str, &str)]) -> String {
    let mut s = String::new();
    for (k, v) in attrs {
        let _ = write!(s, " {k}=\"{}\"", escape(v));
    }
    s
}
