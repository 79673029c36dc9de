//! Fragment lowering.
//!
//! Replaces every expression node whose output contains markup with a typed
//! fragment node. Markup branches are re-parsed as JSX into template nodes so
//! the emitter can enumerate them statically.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use crate::classify::{analyze_expression, unwrap_parens, ExpressionShape, LoopShape, Segment};
use crate::lexer::{contains_markup, find_matching, is_void_element, scan_markup};
use crate::parse::{decode_attribute_value, decode_character_references, is_component_tag};
use crate::validate::{
    AttributeIR, AttributeValue, CompilerError, ComponentNode, ConditionalFragmentNode,
    ElementNode, ExpressionIR, ExpressionNode, ExpressionRegistry, LoopContext, LoopFragmentNode,
    OptionalFragmentNode, SourceLocation, TemplateNode, TextNode, ERR_PARSE,
    INV_NON_ENUMERABLE_JSX,
};

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERING CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct LoweringContext<'a> {
    pub registry: &'a mut ExpressionRegistry,
    pub file_path: &'a str,
}

impl<'a> LoweringContext<'a> {
    pub fn new(registry: &'a mut ExpressionRegistry, file_path: &'a str) -> Self {
        LoweringContext { registry, file_path }
    }

    fn error(&self, code: &str, message: &str, location: &SourceLocation) -> CompilerError {
        CompilerError::at(code, message, self.file_path, location)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAGMENT LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

pub fn lower_fragments(
    nodes: Vec<TemplateNode>,
    ctx: &mut LoweringContext,
) -> Result<Vec<TemplateNode>, CompilerError> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        out.extend(lower_node(node, ctx)?);
    }
    Ok(out)
}

fn lower_node(
    node: TemplateNode,
    ctx: &mut LoweringContext,
) -> Result<Vec<TemplateNode>, CompilerError> {
    let lowered = match node {
        TemplateNode::Expression(expr_node) => return lower_expression_node(expr_node, ctx),
        TemplateNode::Element(mut elem) => {
            check_attributes(&elem.attributes, ctx)?;
            elem.children = lower_fragments(elem.children, ctx)?;
            TemplateNode::Element(elem)
        }
        TemplateNode::Component(mut comp) => {
            check_attributes(&comp.attributes, ctx)?;
            comp.children = lower_fragments(comp.children, ctx)?;
            TemplateNode::Component(comp)
        }
        TemplateNode::ConditionalFragment(mut cond) => {
            cond.consequent = lower_fragments(cond.consequent, ctx)?;
            cond.alternate = lower_fragments(cond.alternate, ctx)?;
            TemplateNode::ConditionalFragment(cond)
        }
        TemplateNode::OptionalFragment(mut opt) => {
            opt.fragment = lower_fragments(opt.fragment, ctx)?;
            TemplateNode::OptionalFragment(opt)
        }
        TemplateNode::LoopFragment(mut lp) => {
            lp.body = lower_fragments(lp.body, ctx)?;
            TemplateNode::LoopFragment(lp)
        }
        other => other,
    };
    Ok(vec![lowered])
}

/// Attribute values are emitted as strings; markup there has no DOM shape.
fn check_attributes(attributes: &[AttributeIR], ctx: &LoweringContext) -> Result<(), CompilerError> {
    for attr in attributes {
        if let AttributeValue::Dynamic(expr) = &attr.value {
            if contains_markup(&expr.code) {
                return Err(ctx
                    .error(
                        INV_NON_ENUMERABLE_JSX,
                        &format!("Attribute '{}' evaluates to markup.", attr.name),
                        &attr.location,
                    )
                    .with_context(expr.code.clone())
                    .with_hint("Pass markup as children instead of as an attribute value."));
            }
        }
    }
    Ok(())
}

fn lower_expression_node(
    node: ExpressionNode,
    ctx: &mut LoweringContext,
) -> Result<Vec<TemplateNode>, CompilerError> {
    let shape = analyze_expression(&node.code);
    let lowered = match shape {
        ExpressionShape::Primitive => return Ok(vec![TemplateNode::Expression(node)]),
        ExpressionShape::Unknown => {
            return Err(ctx
                .error(
                    INV_NON_ENUMERABLE_JSX,
                    "Expression mixes markup with logic that cannot be enumerated at compile time.",
                    &node.location,
                )
                .with_context(node.code.clone())
                .with_hint("Use a ternary, `cond && <markup>`, or `items.map(item => <markup>)`."));
        }
        ExpressionShape::Fragment(markup) => {
            let loc = offset_location(&node, &markup);
            parse_jsx_to_nodes(&markup.text, loc, node.loop_context.clone(), ctx)?
        }
        ExpressionShape::Conditional {
            condition,
            consequent,
            alternate,
        } => vec![lower_conditional_expression(&node, condition, consequent, alternate, ctx)?],
        ExpressionShape::Optional { condition, fragment } => {
            vec![lower_optional_expression(&node, condition, fragment, ctx)?]
        }
        ExpressionShape::Loop(shape) => vec![lower_loop_expression(&node, shape, ctx)?],
    };
    ctx.registry.remove(&node.id);
    trace!(id = %node.id, count = lowered.len(), "lowered expression");
    Ok(lowered)
}

fn offset_location(node: &ExpressionNode, segment: &Segment) -> SourceLocation {
    match node.code.get(..segment.offset) {
        Some(prefix) => node.location.advance(prefix),
        None => node.location,
    }
}

fn lower_conditional_expression(
    node: &ExpressionNode,
    condition: Segment,
    consequent: Segment,
    alternate: Segment,
    ctx: &mut LoweringContext,
) -> Result<TemplateNode, CompilerError> {
    let id = ctx.registry.register(
        "cond",
        &condition.text,
        offset_location(node, &condition),
        node.loop_context.clone(),
    );
    let consequent_nodes = parse_jsx_to_nodes(
        &consequent.text,
        offset_location(node, &consequent),
        node.loop_context.clone(),
        ctx,
    )?;
    let alternate_nodes = parse_jsx_to_nodes(
        &alternate.text,
        offset_location(node, &alternate),
        node.loop_context.clone(),
        ctx,
    )?;
    Ok(TemplateNode::ConditionalFragment(ConditionalFragmentNode {
        id,
        condition: condition.text,
        consequent: consequent_nodes,
        alternate: alternate_nodes,
        location: node.location,
        loop_context: node.loop_context.clone(),
    }))
}

fn lower_optional_expression(
    node: &ExpressionNode,
    condition: Segment,
    fragment: Segment,
    ctx: &mut LoweringContext,
) -> Result<TemplateNode, CompilerError> {
    let id = ctx.registry.register(
        "opt",
        &condition.text,
        offset_location(node, &condition),
        node.loop_context.clone(),
    );
    let fragment_nodes = parse_jsx_to_nodes(
        &fragment.text,
        offset_location(node, &fragment),
        node.loop_context.clone(),
        ctx,
    )?;
    Ok(TemplateNode::OptionalFragment(OptionalFragmentNode {
        id,
        condition: condition.text,
        fragment: fragment_nodes,
        location: node.location,
        loop_context: node.loop_context.clone(),
    }))
}

fn lower_loop_expression(
    node: &ExpressionNode,
    shape: LoopShape,
    ctx: &mut LoweringContext,
) -> Result<TemplateNode, CompilerError> {
    let id = ctx.registry.register(
        "loop",
        &shape.source.text,
        offset_location(node, &shape.source),
        node.loop_context.clone(),
    );

    let mut vars = node
        .loop_context
        .as_ref()
        .map(|c| c.variables.clone())
        .unwrap_or_default();
    for v in &shape.variables {
        if !vars.contains(v) {
            vars.push(v.clone());
        }
    }
    let body_ctx = Some(LoopContext {
        variables: vars,
        map_source: Some(id.clone()),
    });
    let body = parse_jsx_to_nodes(
        &shape.body.text,
        offset_location(node, &shape.body),
        body_ctx,
        ctx,
    )?;

    Ok(TemplateNode::LoopFragment(LoopFragmentNode {
        id,
        source: shape.source.text,
        item_var: shape.item_var,
        index_var: shape.index_var,
        variables: shape.variables,
        body,
        location: node.location,
        loop_context: node.loop_context.clone(),
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSX BRANCH PARSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Branch values that render nothing.
fn is_empty_branch(code: &str) -> bool {
    matches!(code, "" | "null" | "undefined" | "false" | "''" | "\"\"" | "``")
}

/// Turn one branch of a fragment into nodes. Markup is parsed as JSX; any
/// other value is re-classified as an expression of its own and lowered.
fn parse_jsx_to_nodes(
    code: &str,
    loc: SourceLocation,
    lctx: Option<LoopContext>,
    ctx: &mut LoweringContext,
) -> Result<Vec<TemplateNode>, CompilerError> {
    let (start, end) = unwrap_parens(code);
    let inner = code.get(start..end).unwrap_or("");
    let loc = loc.advance(&code[..start.min(code.len())]);

    if is_empty_branch(inner) {
        return Ok(vec![]);
    }

    if inner.starts_with('<') {
        let nodes = JsxParser::new(inner, loc, lctx, ctx).parse_children(0, inner.len())?;
        return lower_fragments(nodes, ctx);
    }

    let id = ctx.registry.register("expr", inner, loc, lctx.clone());
    lower_expression_node(
        ExpressionNode {
            id,
            code: inner.to_string(),
            location: loc,
            loop_context: lctx,
        },
        ctx,
    )
}

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"^<([a-zA-Z][a-zA-Z0-9.:_-]*)").unwrap();
    static ref ATTR_RE: Regex = Regex::new(r"^([a-zA-Z_@:][a-zA-Z0-9_.:-]*)").unwrap();
}

struct JsxParser<'s, 'c, 'a> {
    src: &'s str,
    base: SourceLocation,
    lctx: Option<LoopContext>,
    ctx: &'c mut LoweringContext<'a>,
}

impl<'s, 'c, 'a> JsxParser<'s, 'c, 'a> {
    fn new(
        src: &'s str,
        base: SourceLocation,
        lctx: Option<LoopContext>,
        ctx: &'c mut LoweringContext<'a>,
    ) -> Self {
        JsxParser { src, base, lctx, ctx }
    }

    fn loc(&self, offset: usize) -> SourceLocation {
        self.base.advance(&self.src[..offset])
    }

    fn parse_children(&mut self, start: usize, end: usize) -> Result<Vec<TemplateNode>, CompilerError> {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut nodes = Vec::new();
        let mut i = start;
        let mut text_start = start;

        while i < end {
            match bytes[i] {
                b'<' if bytes
                    .get(i + 1)
                    .is_some_and(|c| c.is_ascii_alphabetic() || *c == b'>') =>
                {
                    self.push_text(&mut nodes, text_start, i);
                    let el_end = scan_markup(&src[..end], i).ok_or_else(|| {
                        self.ctx
                            .error(ERR_PARSE, "Unterminated JSX element.", &self.loc(i))
                            .with_context(src[i..end].to_string())
                    })?;
                    nodes.extend(self.parse_jsx_element_with_end(i, el_end)?);
                    i = el_end;
                    text_start = i;
                }
                b'{' => {
                    self.push_text(&mut nodes, text_start, i);
                    let close = find_matching(&src[..end], i).ok_or_else(|| {
                        self.ctx
                            .error(ERR_PARSE, "Unterminated '{' in JSX children.", &self.loc(i))
                    })?;
                    let raw = &src[i + 1..close];
                    let code = raw.trim();
                    if !code.is_empty() && !is_comment_only(code) {
                        let lead = raw.len() - raw.trim_start().len();
                        let loc = self.loc(i + 1 + lead);
                        let id = self.ctx.registry.register("expr", code, loc, self.lctx.clone());
                        nodes.push(TemplateNode::Expression(ExpressionNode {
                            id,
                            code: code.to_string(),
                            location: loc,
                            loop_context: self.lctx.clone(),
                        }));
                    }
                    i = close + 1;
                    text_start = i;
                }
                _ => i += 1,
            }
        }
        self.push_text(&mut nodes, text_start, end);
        Ok(nodes)
    }

    /// JSX whitespace: text spanning lines is trimmed, blank lines vanish.
    fn push_text(&self, nodes: &mut Vec<TemplateNode>, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let raw = &self.src[start..end];
        let value = if raw.contains('\n') { raw.trim() } else { raw };
        if value.is_empty() {
            return;
        }
        let lead = raw.find(value).unwrap_or(0);
        nodes.push(TemplateNode::Text(TextNode {
            value: decode_character_references(value),
            location: self.loc(start + lead),
            loop_context: self.lctx.clone(),
        }));
    }

    fn parse_jsx_element_with_end(
        &mut self,
        start: usize,
        end: usize,
    ) -> Result<Vec<TemplateNode>, CompilerError> {
        let src = self.src;
        let bytes = src.as_bytes();

        // <>...</>
        if bytes.get(start + 1) == Some(&b'>') {
            let close = src[..end].rfind("</").unwrap_or(end);
            return self.parse_children(start + 2, close.max(start + 2));
        }

        let location = self.loc(start);
        let caps = TAG_RE
            .captures(&src[start..end])
            .ok_or_else(|| self.ctx.error(ERR_PARSE, "Invalid JSX tag.", &location))?;
        let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
        let mut i = start + caps.get(0).map(|m| m.end()).unwrap_or(1);

        let mut attributes = Vec::new();
        let mut self_closing = false;
        loop {
            while i < end && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= end {
                break;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' if bytes.get(i + 1) == Some(&b'>') => {
                    i += 2;
                    self_closing = true;
                    break;
                }
                b'{' => {
                    // spread attributes have no static name to bind
                    i = find_matching(&src[..end], i).map(|c| c + 1).unwrap_or(end);
                }
                _ => {
                    let attr_start = i;
                    let Some(m) = ATTR_RE.find(&src[i..end]) else {
                        i += src[i..].chars().next().map_or(1, char::len_utf8);
                        continue;
                    };
                    let name = jsx_attribute_name(m.as_str());
                    i += m.end();
                    let attr_loc = self.loc(attr_start);

                    let mut j = i;
                    while j < end && bytes[j].is_ascii_whitespace() {
                        j += 1;
                    }
                    let value = if bytes.get(j) == Some(&b'=') {
                        j += 1;
                        while j < end && bytes[j].is_ascii_whitespace() {
                            j += 1;
                        }
                        match bytes.get(j) {
                            Some(&q) if q == b'"' || q == b'\'' => {
                                let close = src[j + 1..end]
                                    .find(q as char)
                                    .map(|p| j + 1 + p)
                                    .unwrap_or(end);
                                i = (close + 1).min(end);
                                AttributeValue::Static(decode_attribute_value(&src[j + 1..close]))
                            }
                            Some(b'{') => {
                                let close = find_matching(&src[..end], j).ok_or_else(|| {
                                    self.ctx.error(
                                        ERR_PARSE,
                                        &format!("Unterminated value for attribute '{}'.", name),
                                        &attr_loc,
                                    )
                                })?;
                                i = close + 1;
                                let raw = &src[j + 1..close];
                                let code = raw.trim();
                                let lead = raw.len() - raw.trim_start().len();
                                let expr_loc = self.loc(j + 1 + lead);
                                let id = self.ctx.registry.register(
                                    "expr",
                                    code,
                                    expr_loc,
                                    self.lctx.clone(),
                                );
                                AttributeValue::Dynamic(ExpressionIR {
                                    id,
                                    code: code.to_string(),
                                    location: expr_loc,
                                    loop_context: self.lctx.clone(),
                                })
                            }
                            Some(b'>') | None => {
                                i = j;
                                AttributeValue::Static(String::new())
                            }
                            // unquoted HTML-style value
                            Some(_) => {
                                let mut stop = src[j..end]
                                    .find(|c: char| c.is_whitespace() || c == '>')
                                    .map_or(end, |p| j + p);
                                if src[j..stop].ends_with('/') && bytes.get(stop) == Some(&b'>') {
                                    stop -= 1;
                                }
                                i = stop;
                                AttributeValue::Static(decode_attribute_value(&src[j..stop]))
                            }
                        }
                    } else {
                        AttributeValue::Static(String::new())
                    };

                    attributes.push(AttributeIR {
                        name,
                        value,
                        location: attr_loc,
                        loop_context: self.lctx.clone(),
                    });
                }
            }
        }

        let children = if self_closing || is_void_element(&tag) {
            vec![]
        } else {
            let close = src[..end].rfind("</").unwrap_or(end);
            self.parse_children(i.min(close), close)?
        };

        let node = if is_component_tag(&tag) {
            TemplateNode::Component(ComponentNode {
                name: tag,
                attributes,
                children,
                location,
                loop_context: self.lctx.clone(),
            })
        } else {
            TemplateNode::Element(ElementNode {
                tag,
                attributes,
                children,
                location,
                loop_context: self.lctx.clone(),
            })
        };
        Ok(vec![node])
    }
}

fn is_comment_only(code: &str) -> bool {
    code.starts_with("/*") && code.ends_with("*/") && !code[2..code.len() - 2].contains("*/")
}

/// JSX spellings of DOM attributes.
fn jsx_attribute_name(name: &str) -> String {
    match name {
        "className" => "class".to_string(),
        "htmlFor" => "for".to_string(),
        n if n.len() > 2 && n.starts_with("on") && n.as_bytes()[2].is_ascii_uppercase() => {
            n.to_ascii_lowercase()
        }
        n => n.to_string(),
    }
}
