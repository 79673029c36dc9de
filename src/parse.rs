//! Parse Module for Zenith Compiler
//!
//! Turns `.zen` source into template nodes plus hoisted script/style blocks.
//! A single normalization pass rewrites the source into plain HTML that
//! html5ever can parse without losing information:
//!
//! - `{expr}` in content becomes `<template data-zen-expr="n">`, in tags `__ZENITH_EXPR_n__`
//! - component tags become `<zen-component data-zen-orig-name="Name">` (html5ever lowercases names)
//! - every open tag gets `data-zen-loc="line:column"` pointing into the original source
//! - self-closing non-void tags are expanded so following siblings are not swallowed
//! - hoisted `<script>` and `<style>` blocks are cut out verbatim

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tokenizer::{
    BufferQueue, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tendril::StrTendril;
use tracing::{debug, trace};

use crate::lexer::{find_matching, is_void_element};
use crate::validate::{
    AttributeIR, AttributeValue, CompilerError, ComponentNode, DoctypeNode, ElementNode,
    ExpressionIR, ExpressionNode, ExpressionRegistry, ScriptIR, SourceLocation, StyleIR,
    TemplateNode, TextNode, ERR_PARSE,
};

const COMPONENT_TAG: &str = "zen-component";
const ORIG_NAME_ATTR: &str = "data-zen-orig-name";
const LOC_ATTR: &str = "data-zen-loc";
const EXPR_ATTR: &str = "data-zen-expr";

lazy_static! {
    /// Placeholder left in attribute values for `{expr}`
    static ref EXPR_PLACEHOLDER_RE: Regex = Regex::new(r"__ZENITH_EXPR_(\d+)__").unwrap();

    /// Content placeholder that survives as literal text inside RCDATA elements (title, textarea)
    static ref TEXT_PLACEHOLDER_RE: Regex =
        Regex::new(r#"<template data-zen-expr="(\d+)"></template>"#).unwrap();

    /// Attribute regex for parsing script attributes
    static ref ATTR_REGEX: Regex =
        Regex::new(r#"(?i)([a-z0-9:_-]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^>\s]+)))?"#).unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFile {
    pub nodes: Vec<TemplateNode>,
    pub script: Option<ScriptIR>,
    pub styles: Vec<StyleIR>,
}

/// Check if a tag name represents a component (uppercase first letter, or a compound `A.B`)
pub fn is_component_tag(tag_name: &str) -> bool {
    tag_name
        .chars()
        .next()
        .map(|c| c.is_uppercase())
        .unwrap_or(false)
        || tag_name.contains('.')
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct PendingExpression {
    code: String,
    location: SourceLocation,
}

struct Normalized {
    html: String,
    expressions: Vec<PendingExpression>,
    scripts: Vec<ScriptIR>,
    styles: Vec<StyleIR>,
}

struct Normalizer<'a> {
    src: &'a str,
    file: &'a str,
    pos: usize,
    loc: SourceLocation,
    out: String,
    expressions: Vec<PendingExpression>,
    scripts: Vec<ScriptIR>,
    styles: Vec<StyleIR>,
}

fn is_tag_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b':' | b'_')
}

impl<'a> Normalizer<'a> {
    fn new(src: &'a str, file: &'a str) -> Self {
        Normalizer {
            src,
            file,
            pos: 0,
            loc: SourceLocation::default(),
            out: String::with_capacity(src.len() + src.len() / 4),
            expressions: Vec::new(),
            scripts: Vec::new(),
            styles: Vec::new(),
        }
    }

    fn error(&self, message: &str, at: SourceLocation) -> CompilerError {
        CompilerError::at(ERR_PARSE, message, self.file, &at)
    }

    fn byte(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn skip_to(&mut self, target: usize) {
        self.loc = self.loc.advance(&self.src[self.pos..target]);
        self.pos = target;
    }

    fn copy_to(&mut self, target: usize) {
        self.out.push_str(&self.src[self.pos..target]);
        self.skip_to(target);
    }

    fn run(mut self) -> Result<Normalized, CompilerError> {
        let src = self.src;
        while self.pos < src.len() {
            let rest = &src[self.pos..];
            if rest.starts_with("<!--") {
                let end = rest.find("-->").map(|i| self.pos + i + 3).unwrap_or(self.src.len());
                self.copy_to(end);
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest.find('>').map(|i| self.pos + i + 1).unwrap_or(self.src.len());
                self.copy_to(end);
            } else if rest.starts_with("</") {
                self.close_tag();
            } else if rest.starts_with('<') && self.byte(1).is_some_and(|b| b.is_ascii_alphabetic()) {
                self.open_tag()?;
            } else if rest.starts_with('{') {
                let start = self.loc;
                if let Some(index) = self.capture_expression()? {
                    self.out.push_str(&format!("<template {}=\"{}\"></template>", EXPR_ATTR, index));
                } else {
                    trace!(line = start.line, "dropped empty expression");
                }
            } else {
                let first = rest.chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                let next = rest[first..]
                    .find(|c| c == '<' || c == '{')
                    .map(|i| self.pos + first + i)
                    .unwrap_or(src.len());
                self.copy_to(next);
            }
        }

        Ok(Normalized {
            html: self.out,
            expressions: self.expressions,
            scripts: self.scripts,
            styles: self.styles,
        })
    }

    /// Consume `{ ... }` at the cursor. Returns the placeholder index, or
    /// `None` for an empty or comment-only expression.
    fn capture_expression(&mut self) -> Result<Option<usize>, CompilerError> {
        let open_loc = self.loc;
        let close = find_matching(self.src, self.pos)
            .ok_or_else(|| self.error("Unterminated expression: missing closing '}'.", open_loc))?;
        let raw = &self.src[self.pos + 1..close];
        let lead = raw.len() - raw.trim_start().len();
        let location = open_loc.advance("{").advance(&raw[..lead]);
        let code = raw.trim().to_string();
        self.skip_to(close + 1);

        if code.is_empty() || (code.starts_with("/*") && code.ends_with("*/")) {
            return Ok(None);
        }
        self.expressions.push(PendingExpression { code, location });
        Ok(Some(self.expressions.len() - 1))
    }

    fn close_tag(&mut self) {
        let name_start = self.pos + 2;
        let mut name_end = name_start;
        while self.src.as_bytes().get(name_end).is_some_and(|b| is_tag_name_byte(*b)) {
            name_end += 1;
        }
        let end = self.src[self.pos..]
            .find('>')
            .map(|i| self.pos + i + 1)
            .unwrap_or(self.src.len());
        let name = &self.src[name_start..name_end];
        if is_component_tag(name) {
            self.out.push_str("</");
            self.out.push_str(COMPONENT_TAG);
            self.out.push('>');
            self.skip_to(end);
        } else {
            self.copy_to(end);
        }
    }

    fn open_tag(&mut self) -> Result<(), CompilerError> {
        let src = self.src;
        let tag_loc = self.loc;
        let name_start = self.pos + 1;
        let mut name_end = name_start;
        while src.as_bytes().get(name_end).is_some_and(|b| is_tag_name_byte(*b)) {
            name_end += 1;
        }
        let name = &src[name_start..name_end];
        let lower = name.to_ascii_lowercase();
        if lower == "script" || lower == "style" {
            return self.raw_block(name_end, &lower, tag_loc);
        }

        let component = is_component_tag(name);
        let close_name = if component { COMPONENT_TAG.to_string() } else { name.to_string() };
        if component {
            self.out
                .push_str(&format!("<{} {}=\"{}\"", COMPONENT_TAG, ORIG_NAME_ATTR, name));
        } else {
            self.out.push('<');
            self.out.push_str(name);
        }
        self.out
            .push_str(&format!(" {}=\"{}:{}\"", LOC_ATTR, tag_loc.line, tag_loc.column));
        self.skip_to(name_end);

        loop {
            match self.byte(0) {
                None => {
                    return Err(self.error(&format!("Unterminated <{}> tag.", name), tag_loc));
                }
                Some(q @ (b'"' | b'\'')) => self.quoted_value(q, tag_loc)?,
                Some(b'{') => {
                    let index = self.capture_expression()?;
                    match index {
                        Some(i) => self.out.push_str(&format!("\"__ZENITH_EXPR_{}__\"", i)),
                        None => self.out.push_str("\"\""),
                    }
                }
                Some(b'/') if self.byte(1) == Some(b'>') => {
                    let end = self.pos + 2;
                    self.skip_to(end);
                    if !component && is_void_element(&lower) {
                        self.out.push('>');
                    } else {
                        self.out.push_str(&format!("></{}>", close_name));
                    }
                    return Ok(());
                }
                Some(b'>') => {
                    let end = self.pos + 1;
                    self.copy_to(end);
                    return Ok(());
                }
                Some(_) => {
                    let ch_len = src[self.pos..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                    let end = self.pos + ch_len;
                    self.copy_to(end);
                }
            }
        }
    }

    /// Copy a quoted attribute value, replacing embedded `{expr}` with placeholders.
    fn quoted_value(&mut self, quote: u8, tag_loc: SourceLocation) -> Result<(), CompilerError> {
        let end = self.pos + 1;
        self.copy_to(end);
        loop {
            let rest = &self.src[self.pos..];
            let next = rest
                .find(|c| c == quote as char || c == '{')
                .ok_or_else(|| self.error("Unterminated attribute value.", tag_loc))?;
            let at = self.pos + next;
            self.copy_to(at);
            if self.byte(0) == Some(quote) {
                self.copy_to(at + 1);
                return Ok(());
            }
            if let Some(i) = self.capture_expression()? {
                self.out.push_str(&format!("__ZENITH_EXPR_{}__", i));
            }
        }
    }

    /// `<script>` / `<style>`: hoist, or keep inline for external and `is:inline` scripts.
    fn raw_block(&mut self, name_end: usize, lower: &str, tag_loc: SourceLocation) -> Result<(), CompilerError> {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut i = name_end;
        let mut quote: Option<u8> = None;
        while i < bytes.len() {
            match (quote, bytes[i]) {
                (Some(q), b) if b == q => quote = None,
                (None, b'"' | b'\'') => quote = Some(bytes[i]),
                (None, b'>') => break,
                _ => {}
            }
            i += 1;
        }
        if i >= bytes.len() {
            return Err(self.error(&format!("Unterminated <{}> tag.", lower), tag_loc));
        }
        let gt = i;
        let attr_text = src[name_end..gt].trim_end_matches('/');
        let attributes = parse_attribute_string(attr_text);
        let inline = lower == "script"
            && (attributes.contains_key("src") || attributes.contains_key("is:inline"));

        if bytes[gt - 1] == b'/' {
            if inline {
                self.out.push_str(&src[self.pos..gt - 1]);
                self.out.push_str("></script>");
            }
            self.skip_to(gt + 1);
            return Ok(());
        }

        let closing = format!("</{}", lower);
        let close_start = src[gt + 1..]
            .to_ascii_lowercase()
            .find(&closing)
            .map(|j| gt + 1 + j)
            .ok_or_else(|| self.error(&format!("Unclosed <{}> block.", lower), tag_loc))?;
        let close_end = src[close_start..]
            .find('>')
            .map(|j| close_start + j + 1)
            .unwrap_or(src.len());
        let content = src[gt + 1..close_start].to_string();

        if inline {
            self.copy_to(close_end);
            return Ok(());
        }
        if lower == "script" {
            self.scripts.push(ScriptIR { raw: content, attributes });
        } else {
            self.styles.push(StyleIR { raw: content });
        }
        self.skip_to(close_end);
        Ok(())
    }
}

fn parse_attribute_string(attr_text: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for caps in ATTR_REGEX.captures_iter(attr_text) {
        if let Some(name) = caps.get(1) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "true".to_string());
            attributes.insert(name.as_str().to_string(), value);
        }
    }
    attributes
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE CONVERSION
// ═══════════════════════════════════════════════════════════════════════════════

struct Converter<'a> {
    expressions: &'a [PendingExpression],
    registry: &'a mut ExpressionRegistry,
}

impl<'a> Converter<'a> {
    fn expression_node(&mut self, index: usize) -> Option<TemplateNode> {
        let pending = self.expressions.get(index)?;
        let id = self.registry.register("expr", &pending.code, pending.location, None);
        Some(TemplateNode::Expression(ExpressionNode {
            id,
            code: pending.code.clone(),
            location: pending.location,
            loop_context: None,
        }))
    }

    fn attribute_value(&mut self, raw: &str, fallback: SourceLocation) -> (AttributeValue, SourceLocation) {
        let found: Vec<(std::ops::Range<usize>, Option<PendingExpression>)> = EXPR_PLACEHOLDER_RE
            .captures_iter(raw)
            .filter_map(|caps| {
                let m = caps.get(0)?;
                let pending = caps
                    .get(1)
                    .and_then(|i| i.as_str().parse::<usize>().ok())
                    .and_then(|i| self.expressions.get(i))
                    .cloned();
                Some((m.range(), pending))
            })
            .collect();
        if found.is_empty() {
            return (AttributeValue::Static(raw.to_string()), fallback);
        }

        let (code, location) = match found.as_slice() {
            [(range, Some(p))] if range.start == 0 && range.end == raw.len() => {
                (p.code.clone(), p.location)
            }
            _ => {
                // Mixed literal text and expressions: one template literal.
                let mut code = String::from("`");
                let mut location = None;
                let mut last = 0;
                for (range, pending) in &found {
                    code.push_str(&escape_template_text(&raw[last..range.start]));
                    if let Some(p) = pending {
                        location.get_or_insert(p.location);
                        code.push_str("${");
                        code.push_str(&p.code);
                        code.push('}');
                    }
                    last = range.end;
                }
                code.push_str(&escape_template_text(&raw[last..]));
                code.push('`');
                (code, location.unwrap_or(fallback))
            }
        };

        let id = self.registry.register("expr", &code, location, None);
        (
            AttributeValue::Dynamic(ExpressionIR {
                id,
                code,
                location,
                loop_context: None,
            }),
            location,
        )
    }

    fn text_nodes(&mut self, text: &str, location: SourceLocation) -> Vec<TemplateNode> {
        let mut nodes = Vec::new();
        let mut last = 0;
        for caps in TEXT_PLACEHOLDER_RE.captures_iter(text) {
            let Some(m) = caps.get(0) else { continue };
            push_text(&mut nodes, &text[last..m.start()], location);
            if let Some(index) = caps.get(1).and_then(|i| i.as_str().parse().ok()) {
                nodes.extend(self.expression_node(index));
            }
            last = m.end();
        }
        push_text(&mut nodes, &text[last..], location);
        nodes
    }

    fn convert(&mut self, handle: &Handle, parent_loc: SourceLocation) -> Vec<TemplateNode> {
        match &handle.data {
            NodeData::Document => self.convert_children(handle, parent_loc),

            NodeData::Doctype {
                name,
                public_id,
                system_id,
            } => vec![TemplateNode::Doctype(DoctypeNode {
                name: name.to_string(),
                public_id: public_id.to_string(),
                system_id: system_id.to_string(),
                location: SourceLocation::default(),
            })],

            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                self.text_nodes(&text, parent_loc)
            }

            NodeData::Element {
                name,
                attrs,
                template_contents,
                ..
            } => {
                let mut tag_name = name.local.to_string();
                let attributes = attrs.borrow();
                let mut location = parent_loc;

                for attr in attributes.iter() {
                    match &*attr.name.local {
                        ORIG_NAME_ATTR => tag_name = attr.value.to_string(),
                        LOC_ATTR => {
                            if let Some(loc) = parse_loc(&attr.value) {
                                location = loc;
                            }
                        }
                        _ => {}
                    }
                }

                if tag_name == "template" {
                    if let Some(expr) = attributes.iter().find(|a| &*a.name.local == EXPR_ATTR) {
                        let index = expr.value.parse().ok();
                        return index
                            .and_then(|i| self.expression_node(i))
                            .into_iter()
                            .collect();
                    }
                }

                let mut parsed_attrs = Vec::new();
                for attr in attributes.iter() {
                    let local = &*attr.name.local;
                    if local == ORIG_NAME_ATTR || local == LOC_ATTR {
                        continue;
                    }
                    let attr_name = match &attr.name.prefix {
                        Some(prefix) => format!("{}:{}", prefix, local),
                        None => local.to_string(),
                    };
                    let (value, attr_loc) = self.attribute_value(&attr.value, location);
                    parsed_attrs.push(AttributeIR {
                        name: attr_name,
                        value,
                        location: attr_loc,
                        loop_context: None,
                    });
                }
                drop(attributes);

                let children = match template_contents.borrow().as_ref() {
                    Some(contents) => self.convert_children(contents, location),
                    None => self.convert_children(handle, location),
                };

                if is_component_tag(&tag_name) {
                    vec![TemplateNode::Component(ComponentNode {
                        name: tag_name,
                        attributes: parsed_attrs,
                        children,
                        location,
                        loop_context: None,
                    })]
                } else {
                    vec![TemplateNode::Element(ElementNode {
                        tag: tag_name,
                        attributes: parsed_attrs,
                        children,
                        location,
                        loop_context: None,
                    })]
                }
            }

            NodeData::Comment { .. } => vec![],
            NodeData::ProcessingInstruction { .. } => vec![],
        }
    }

    fn convert_children(&mut self, handle: &Handle, location: SourceLocation) -> Vec<TemplateNode> {
        let children = handle.children.borrow();
        let mut nodes = Vec::new();
        for child in children.iter() {
            nodes.extend(self.convert(child, location));
        }
        nodes
    }

    /// Unless the source is a full document, flatten the html/head/body
    /// wrappers html5ever always creates.
    fn collect_body_content(&mut self, handle: &Handle, nodes: &mut Vec<TemplateNode>) {
        for child in handle.children.borrow().iter() {
            match &child.data {
                NodeData::Element { name, .. } => {
                    let tag = name.local.to_string();
                    if tag == "html" || tag == "head" || tag == "body" {
                        self.collect_body_content(child, nodes);
                    } else {
                        nodes.extend(self.convert(child, SourceLocation::default()));
                    }
                }
                NodeData::Text { .. } => nodes.extend(self.convert(child, SourceLocation::default())),
                _ => {}
            }
        }
    }
}

fn push_text(nodes: &mut Vec<TemplateNode>, text: &str, location: SourceLocation) {
    // Formatting whitespace (contains a newline) is dropped; a lone space between inline content is kept.
    if text.is_empty() || (text.trim().is_empty() && text.contains('\n')) {
        return;
    }
    nodes.push(TemplateNode::Text(TextNode {
        value: text.to_string(),
        location,
        loop_context: None,
    }));
}

fn parse_loc(value: &str) -> Option<SourceLocation> {
    let (line, column) = value.split_once(':')?;
    Some(SourceLocation::new(line.parse().ok()?, column.parse().ok()?))
}

fn escape_template_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`").replace("${", "\\${")
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHARACTER REFERENCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects decoded text and attribute values from the html5ever tokenizer.
#[derive(Default)]
struct CharRefSink {
    text: String,
    attrs: Vec<String>,
}

impl TokenSink for CharRefSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::CharacterTokens(t) => self.text.push_str(&t),
            Token::TagToken(tag) => self
                .attrs
                .extend(tag.attrs.into_iter().map(|a| a.value.to_string())),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

fn run_tokenizer(input: &str) -> CharRefSink {
    let mut tokenizer = Tokenizer::new(CharRefSink::default(), TokenizerOpts::default());
    let mut queue = BufferQueue::default();
    queue.push_back(StrTendril::from_slice(input));
    let _ = tokenizer.feed(&mut queue);
    tokenizer.end();
    tokenizer.sink
}

/// Decode `&amp;`-style references in text found inside expression markup,
/// so it matches text html5ever already decoded at the top level.
pub(crate) fn decode_character_references(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    run_tokenizer(text).text
}

/// Same as [`decode_character_references`] with attribute-value rules.
pub(crate) fn decode_attribute_value(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    let input = format!("<x v=\"{}\">", value.replace('"', "&quot;"));
    run_tokenizer(&input)
        .attrs
        .into_iter()
        .next()
        .unwrap_or_else(|| value.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN PARSING FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a `.zen` source file. Every expression is registered in `registry`.
pub fn parse_file(
    source: &str,
    file_path: &str,
    registry: &mut ExpressionRegistry,
) -> Result<ParsedFile, CompilerError> {
    let normalized = Normalizer::new(source, file_path).run()?;

    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut normalized.html.as_bytes())
        .map_err(|e| {
            CompilerError::new(
                ERR_PARSE,
                &format!("Failed to parse HTML: {}", e),
                file_path,
                1,
                1,
            )
        })?;

    let has_html_in_src = source.to_ascii_lowercase().contains("<html");
    let mut converter = Converter {
        expressions: &normalized.expressions,
        registry,
    };
    let mut nodes = Vec::new();
    if has_html_in_src {
        nodes = converter.convert_children(&dom.document, SourceLocation::default());
    } else {
        converter.collect_body_content(&dom.document, &mut nodes);
    }
    nodes.retain(|n| !n.is_whitespace_text());

    debug!(
        file = file_path,
        nodes = nodes.len(),
        expressions = normalized.expressions.len(),
        scripts = normalized.scripts.len(),
        styles = normalized.styles.len(),
        "parsed template"
    );

    Ok(ParsedFile {
        nodes,
        script: merge_scripts(normalized.scripts),
        styles: normalized.styles,
    })
}

fn merge_scripts(scripts: Vec<ScriptIR>) -> Option<ScriptIR> {
    let mut raws = Vec::new();
    let mut attributes = HashMap::new();
    for script in scripts {
        if script.raw.trim().is_empty() {
            continue;
        }
        raws.push(script.raw);
        attributes.extend(script.attributes);
    }
    if raws.is_empty() {
        return None;
    }
    Some(ScriptIR {
        raw: raws.join("\n\n"),
        attributes,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(src: &str) -> Normalized {
        Normalizer::new(src, "test.zen").run().unwrap()
    }

    #[test]
    fn test_decode_character_references() {
        assert_eq!(decode_character_references("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_character_references("&lt;b&gt; &copy;"), "<b> \u{a9}");
        assert_eq!(decode_character_references("plain"), "plain");
        assert_eq!(decode_attribute_value("a &amp; b"), "a & b");
        assert_eq!(decode_attribute_value("say \"hi\" &quot;"), "say \"hi\" \"");
    }

    #[test]
    fn test_is_component_tag() {
        assert!(is_component_tag("Button"));
        assert!(is_component_tag("HeroSection"));
        assert!(is_component_tag("Card.Header"));
        assert!(!is_component_tag("div"));
        assert!(!is_component_tag("span"));
    }

    #[test]
    fn test_normalize_expressions() {
        let n = normalize("<div>{count}</div>");
        assert!(n.html.contains("<template data-zen-expr=\"0\"></template>"));
        assert_eq!(n.expressions.len(), 1);
        assert_eq!(n.expressions[0].code, "count");
        assert_eq!(n.expressions[0].location, SourceLocation::new(1, 7));
    }

    #[test]
    fn test_normalize_attribute_expression() {
        let n = normalize("<a href={url} class=\"btn {kind}\">x</a>");
        assert!(n.html.contains("href=\"__ZENITH_EXPR_0__\""));
        assert!(n.html.contains("class=\"btn __ZENITH_EXPR_1__\""));
    }

    #[test]
    fn test_convert_self_closing() {
        let n = normalize("<Button /><slot name=\"a\"/><br/>");
        assert!(n.html.contains("<zen-component data-zen-orig-name=\"Button\" data-zen-loc=\"1:1\" ></zen-component>"));
        assert!(n.html.contains("></slot>"));
        assert!(n.html.ends_with("data-zen-loc=\"1:27\">"));
    }

    #[test]
    fn test_braces_in_strings_do_not_close() {
        let n = normalize("<p>{'string with } brace'}</p>");
        assert_eq!(n.expressions[0].code, "'string with } brace'");
    }

    #[test]
    fn test_unterminated_expression_is_parse_error() {
        let err = Normalizer::new("<p>\n  {count</p>", "bad.zen").run().err().unwrap();
        assert_eq!(err.code, ERR_PARSE);
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn test_unclosed_script_is_parse_error() {
        let err = Normalizer::new("<script>let a = 1;", "bad.zen").run().err().unwrap();
        assert_eq!(err.code, ERR_PARSE);
    }

    #[test]
    fn test_parse_script_preserves_text() {
        let src = "<script setup lang=\"ts\">\n  const x = 1;\n</script>\n<div></div>";
        let mut registry = ExpressionRegistry::new();
        let parsed = parse_file(src, "test.zen", &mut registry).unwrap();
        let script = parsed.script.unwrap();
        assert_eq!(script.raw, "\n  const x = 1;\n");
        assert_eq!(script.attributes.get("setup"), Some(&"true".to_string()));
        assert_eq!(script.attributes.get("lang"), Some(&"ts".to_string()));
        assert_eq!(parsed.nodes.len(), 1);
    }

    #[test]
    fn test_external_script_stays_inline() {
        let n = normalize("<script src=\"/a.js\"></script><script>let b;</script>");
        assert!(n.html.contains("<script src=\"/a.js\"></script>"));
        assert_eq!(n.scripts.len(), 1);
        assert_eq!(n.scripts[0].raw, "let b;");
    }

    #[test]
    fn test_styles_hoisted_verbatim() {
        let n = normalize("<style>\n.a { color: red; }\n</style><p>x</p>");
        assert_eq!(n.styles[0].raw, "\n.a { color: red; }\n");
        assert!(!n.html.contains("color"));
    }
}
