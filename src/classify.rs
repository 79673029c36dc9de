//! Expression classification.
//!
//! Decides which DOM shape an expression can produce: a primitive value, a
//! ternary between markup branches, a `&&`-guarded fragment, a `.map` loop,
//! or a bare inline fragment. Everything is decided from top-level tokens of
//! [`crate::lexer`], never from raw substring search.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{BindingPattern, Expression, Statement};
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::lexer::{contains_markup, find_matching, scan, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionOutputType {
    Primitive,
    Conditional,
    Optional,
    Loop,
    Fragment,
    Unknown,
}

/// A slice of the classified code. `offset` is the byte offset of `text`
/// inside the original expression, used to place sub-expressions in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopShape {
    pub source: Segment,
    pub item_var: String,
    pub index_var: Option<String>,
    pub variables: Vec<String>,
    pub body: Segment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionShape {
    Primitive,
    Conditional {
        condition: Segment,
        consequent: Segment,
        alternate: Segment,
    },
    Optional {
        condition: Segment,
        fragment: Segment,
    },
    Loop(LoopShape),
    Fragment(Segment),
    Unknown,
}

impl ExpressionShape {
    pub fn kind(&self) -> ExpressionOutputType {
        match self {
            ExpressionShape::Primitive => ExpressionOutputType::Primitive,
            ExpressionShape::Conditional { .. } => ExpressionOutputType::Conditional,
            ExpressionShape::Optional { .. } => ExpressionOutputType::Optional,
            ExpressionShape::Loop(_) => ExpressionOutputType::Loop,
            ExpressionShape::Fragment(_) => ExpressionOutputType::Fragment,
            ExpressionShape::Unknown => ExpressionOutputType::Unknown,
        }
    }
}

/// Flat, serializable view of a classification for external tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionClassification {
    #[serde(rename = "type")]
    pub expr_type: ExpressionOutputType,
    pub condition: Option<String>,
    pub consequent: Option<String>,
    pub alternate: Option<String>,
    pub optional_condition: Option<String>,
    pub optional_fragment: Option<String>,
    pub loop_source: Option<String>,
    pub loop_item_var: Option<String>,
    pub loop_index_var: Option<String>,
    pub loop_variables: Vec<String>,
    pub loop_body: Option<String>,
    pub fragment_code: Option<String>,
}

impl Default for ExpressionOutputType {
    fn default() -> Self {
        ExpressionOutputType::Primitive
    }
}

impl From<ExpressionShape> for ExpressionClassification {
    fn from(shape: ExpressionShape) -> Self {
        let mut class = ExpressionClassification {
            expr_type: shape.kind(),
            ..Default::default()
        };
        match shape {
            ExpressionShape::Conditional {
                condition,
                consequent,
                alternate,
            } => {
                class.condition = Some(condition.text);
                class.consequent = Some(consequent.text);
                class.alternate = Some(alternate.text);
            }
            ExpressionShape::Optional { condition, fragment } => {
                class.optional_condition = Some(condition.text);
                class.optional_fragment = Some(fragment.text);
            }
            ExpressionShape::Loop(lp) => {
                class.loop_source = Some(lp.source.text);
                class.loop_item_var = Some(lp.item_var);
                class.loop_index_var = lp.index_var;
                class.loop_variables = lp.variables;
                class.loop_body = Some(lp.body.text);
            }
            ExpressionShape::Fragment(markup) => class.fragment_code = Some(markup.text),
            ExpressionShape::Primitive | ExpressionShape::Unknown => {}
        }
        class
    }
}

pub fn classify_expression(code: &str) -> ExpressionClassification {
    analyze_expression(code).into()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHAPE ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

fn segment(code: &str, start: usize, end: usize) -> Segment {
    let raw = &code[start..end];
    let lead = raw.len() - raw.trim_start().len();
    Segment {
        text: raw.trim().to_string(),
        offset: start + lead,
    }
}

/// Byte range of `code` with whitespace and fully wrapping parentheses removed.
pub(crate) fn unwrap_parens(code: &str) -> (usize, usize) {
    let mut start = code.len() - code.trim_start().len();
    let mut end = code.trim_end().len();
    while start < end && code.as_bytes()[start] == b'(' {
        match find_matching(&code[..end], start) {
            Some(close) if close == end - 1 => {
                let inner = &code[start + 1..close];
                start = start + 1 + (inner.len() - inner.trim_start().len());
                end = start + inner.trim().len();
            }
            _ => break,
        }
    }
    (start, end)
}

fn is_low_precedence(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::AndAnd
            | TokenKind::OrOr
            | TokenKind::Nullish
            | TokenKind::Question
            | TokenKind::Colon
            | TokenKind::Comma
            | TokenKind::Arrow
    )
}

pub fn analyze_expression(code: &str) -> ExpressionShape {
    let (start, end) = unwrap_parens(code);
    if start >= end {
        return ExpressionShape::Primitive;
    }
    let inner = &code[start..end];
    let tokens = scan(inner);
    if !tokens.iter().any(|t| t.kind == TokenKind::Markup) {
        return ExpressionShape::Primitive;
    }
    let top: Vec<Token> = tokens.into_iter().filter(|t| t.depth == 0).collect();

    let shift = |mut s: Segment| {
        s.offset += start;
        s
    };

    if let Some(lp) = find_loop(inner, &top) {
        return ExpressionShape::Loop(LoopShape {
            source: shift(lp.source),
            body: shift(lp.body),
            ..lp
        });
    }

    if let Some((condition, consequent, alternate)) = find_ternary(inner, &top) {
        if contains_markup(&consequent.text) || contains_markup(&alternate.text) {
            return ExpressionShape::Conditional {
                condition: shift(condition),
                consequent: shift(consequent),
                alternate: shift(alternate),
            };
        }
    }

    if let Some((condition, fragment)) = find_logical_and(inner, &top) {
        return ExpressionShape::Optional {
            condition: shift(condition),
            fragment: shift(fragment),
        };
    }

    if let [only] = top.as_slice() {
        if only.kind == TokenKind::Markup && only.start == 0 && only.end == inner.len() {
            return ExpressionShape::Fragment(shift(segment(inner, 0, inner.len())));
        }
    }

    ExpressionShape::Unknown
}

fn find_loop(code: &str, top: &[Token]) -> Option<LoopShape> {
    for (idx, tok) in top.iter().enumerate() {
        if tok.kind != TokenKind::MapCall {
            continue;
        }
        if top[..idx].iter().any(|t| is_low_precedence(t.kind)) {
            return None;
        }
        let open = tok.end + code[tok.end..].find('(')?;
        let close = find_matching(code, open)?;
        if close != code.len() - 1 {
            continue;
        }
        if let Some(shape) = parse_map_callback(code, open + 1, close, segment(code, 0, tok.start)) {
            return Some(shape);
        }
    }
    None
}

lazy_static! {
    static ref BLOCK_RETURN_RE: Regex = Regex::new(r"^\{\s*return\s+([\s\S]*?);?\s*\}$").unwrap();
}

/// Parse `params => body` between `args_start..args_end` of `code`.
fn parse_map_callback(code: &str, args_start: usize, args_end: usize, source: Segment) -> Option<LoopShape> {
    let args = &code[args_start..args_end];
    let arg_tokens: Vec<Token> = scan(args).into_iter().filter(|t| t.depth == 0).collect();
    let arrow = arg_tokens.iter().find(|t| t.kind == TokenKind::Arrow)?;
    if arg_tokens
        .iter()
        .any(|t| t.kind == TokenKind::Comma && t.start > arrow.start)
    {
        return None;
    }

    let params = args[..arrow.start].trim();
    let params = params
        .strip_prefix('(')
        .and_then(|p| p.strip_suffix(')'))
        .unwrap_or(params);
    let (param_texts, variables) = loop_parameters(params)?;
    let item_var = param_texts.first()?.clone();
    let index_var = param_texts.get(1).cloned();

    let mut body = segment(code, args_start + arrow.end, args_end);
    if body.text.starts_with('{') {
        let caps = BLOCK_RETURN_RE.captures(&body.text)?;
        let ret = caps.get(1)?;
        body = Segment {
            text: ret.as_str().trim().to_string(),
            offset: body.offset + ret.start(),
        };
    }
    if !contains_markup(&body.text) {
        return None;
    }

    Some(LoopShape {
        source,
        item_var,
        index_var,
        variables,
        body,
    })
}

/// Parameter source texts and every name they bind.
pub fn loop_parameters(params: &str) -> Option<(Vec<String>, Vec<String>)> {
    let wrapped = format!("({}) => 0", params);
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true);
    let ret = Parser::new(&allocator, &wrapped, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }

    let Some(Statement::ExpressionStatement(stmt)) = ret.program.body.first() else {
        return None;
    };
    let Expression::ArrowFunctionExpression(arrow) = &stmt.expression else {
        return None;
    };

    let mut texts = Vec::new();
    let mut names = Vec::new();
    for param in &arrow.params.items {
        texts.push(wrapped[param.span.start as usize..param.span.end as usize].to_string());
        collect_binding_pattern(&param.pattern, &mut names);
    }
    if texts.is_empty() {
        return None;
    }
    Some((texts, names))
}

pub(crate) fn collect_binding_pattern(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => {
            let name = id.name.to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_pattern(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_pattern(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_binding_pattern(elem, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_pattern(&rest.argument, names);
            }
        }
        _ => {}
    }
}

/// First top-level `?` and the `:` that pairs with it.
fn find_ternary(code: &str, top: &[Token]) -> Option<(Segment, Segment, Segment)> {
    let q_idx = top.iter().position(|t| t.kind == TokenKind::Question)?;
    if top[..q_idx]
        .iter()
        .any(|t| matches!(t.kind, TokenKind::Comma | TokenKind::Arrow))
    {
        return None;
    }
    let question = top[q_idx];
    let mut nesting = 0usize;
    let colon = top[q_idx + 1..].iter().find(|t| match t.kind {
        TokenKind::Question => {
            nesting += 1;
            false
        }
        TokenKind::Colon if nesting == 0 => true,
        TokenKind::Colon => {
            nesting -= 1;
            false
        }
        _ => false,
    })?;
    Some((
        segment(code, 0, question.start),
        segment(code, question.end, colon.start),
        segment(code, colon.end, code.len()),
    ))
}

/// `a && b && <x/>` as one guard: condition `a && b`, fragment `<x/>`.
fn find_logical_and(code: &str, top: &[Token]) -> Option<(Segment, Segment)> {
    if top.iter().any(|t| {
        matches!(
            t.kind,
            TokenKind::OrOr | TokenKind::Nullish | TokenKind::Question | TokenKind::Comma | TokenKind::Arrow
        )
    }) {
        return None;
    }
    let and = top.iter().rev().find(|t| t.kind == TokenKind::AndAnd)?;
    let condition = segment(code, 0, and.start);
    let fragment = segment(code, and.end, code.len());
    if contains_markup(&fragment.text) && !contains_markup(&condition.text) {
        Some((condition, fragment))
    } else {
        None
    }
}
