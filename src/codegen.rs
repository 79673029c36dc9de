//! Codegen module for Zenith compiler
//!
//! Emits static markup plus the binding list the browser runtime hydrates.
//! Every dynamic site is written as a hydration marker attribute; nothing in
//! the output needs to be evaluated to know its DOM shape.

use serde::{Deserialize, Serialize};

use crate::lexer::is_void_element;
use crate::validate::{
    AttributeIR, AttributeValue, ElementNode, LoopContext, SourceLocation, TemplateNode,
};

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    Text,
    Attribute,
    Loop,
    Conditional,
    Optional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopMetadata {
    pub item_var: String,
    pub index_var: Option<String>,
    pub variables: Vec<String>,
    /// Markup of one instantiated body, as written inside the loop anchor.
    pub body_html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub id: String,
    pub kind: BindingKind,
    /// Attribute name for `attribute` bindings.
    pub target: Option<String>,
    pub expression: String,
    /// Location in the compiled page. Bindings from a component's own
    /// template sit at that component's usage.
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
    pub loop_meta: Option<LoopMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitOutput {
    pub html: String,
    pub bindings: Vec<Binding>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMITTER
// ═══════════════════════════════════════════════════════════════════════════════

const CONTENTS_STYLE: &str = "display: contents;";
const HIDDEN_STYLE: &str = "display: none;";

/// Walk the final tree once and produce markup plus bindings sorted by source location.
pub fn emit(nodes: &[TemplateNode]) -> EmitOutput {
    let mut emitter = Emitter::default();
    emitter.emit_nodes(nodes);
    let mut bindings = emitter.bindings;
    bindings.sort_by_key(|b| (b.location.line, b.location.column));
    EmitOutput {
        html: emitter.html,
        bindings,
    }
}

#[derive(Default)]
struct Emitter {
    html: String,
    bindings: Vec<Binding>,
}

impl Emitter {
    fn emit_nodes(&mut self, nodes: &[TemplateNode]) {
        for node in nodes {
            self.emit_node(node);
        }
    }

    fn emit_node(&mut self, node: &TemplateNode) {
        match node {
            TemplateNode::Doctype(d) => {
                let name = if d.name.is_empty() { "html" } else { &d.name };
                self.html.push_str(&format!("<!DOCTYPE {}>", name));
            }
            TemplateNode::Text(t) => self.html.push_str(&escape_html(&t.value)),
            TemplateNode::Element(e) => self.emit_element(e),
            TemplateNode::Expression(e) => {
                self.html.push_str(&format!(
                    "<span data-zen-text=\"{}\" style=\"{}\"></span>",
                    escape_attr(&e.id),
                    CONTENTS_STYLE
                ));
                self.bindings.push(Binding {
                    id: e.id.clone(),
                    kind: BindingKind::Text,
                    target: None,
                    expression: e.code.clone(),
                    location: e.location,
                    loop_context: e.loop_context.clone(),
                    loop_meta: None,
                });
            }
            TemplateNode::ConditionalFragment(cf) => {
                let id = escape_attr(&cf.id);
                self.html.push_str(&format!(
                    "<div data-zen-cond=\"{}\" data-zen-branch=\"true\" style=\"{}\">",
                    id, CONTENTS_STYLE
                ));
                self.emit_nodes(&cf.consequent);
                self.html.push_str(&format!(
                    "</div><div data-zen-cond=\"{}\" data-zen-branch=\"false\" style=\"{}\">",
                    id, HIDDEN_STYLE
                ));
                self.emit_nodes(&cf.alternate);
                self.html.push_str("</div>");
                self.bindings.push(Binding {
                    id: cf.id.clone(),
                    kind: BindingKind::Conditional,
                    target: None,
                    expression: cf.condition.clone(),
                    location: cf.location,
                    loop_context: cf.loop_context.clone(),
                    loop_meta: None,
                });
            }
            TemplateNode::OptionalFragment(of) => {
                self.html.push_str(&format!(
                    "<div data-zen-opt=\"{}\" style=\"{}\">",
                    escape_attr(&of.id),
                    CONTENTS_STYLE
                ));
                self.emit_nodes(&of.fragment);
                self.html.push_str("</div>");
                self.bindings.push(Binding {
                    id: of.id.clone(),
                    kind: BindingKind::Optional,
                    target: None,
                    expression: of.condition.clone(),
                    location: of.location,
                    loop_context: of.loop_context.clone(),
                    loop_meta: None,
                });
            }
            TemplateNode::LoopFragment(lf) => {
                self.html.push_str(&format!(
                    "<template data-zen-loop=\"{}\" data-zen-item=\"{}\"",
                    escape_attr(&lf.id),
                    escape_attr(&lf.item_var)
                ));
                if let Some(index) = &lf.index_var {
                    self.html
                        .push_str(&format!(" data-zen-index=\"{}\"", escape_attr(index)));
                }
                self.html.push('>');
                let body_start = self.html.len();
                self.emit_nodes(&lf.body);
                let body_html = self.html[body_start..].to_string();
                self.html.push_str("</template>");
                self.bindings.push(Binding {
                    id: lf.id.clone(),
                    kind: BindingKind::Loop,
                    target: None,
                    expression: lf.source.clone(),
                    location: lf.location,
                    loop_context: lf.loop_context.clone(),
                    loop_meta: Some(LoopMetadata {
                        item_var: lf.item_var.clone(),
                        index_var: lf.index_var.clone(),
                        variables: lf.variables.clone(),
                        body_html,
                    }),
                });
            }
            // Resolution replaces every component before emission.
            TemplateNode::Component(_) => {}
        }
    }

    fn emit_element(&mut self, el: &ElementNode) {
        self.html.push('<');
        self.html.push_str(&el.tag);
        for attr in &el.attributes {
            self.emit_attribute(attr);
        }
        self.html.push('>');

        if is_void_element(&el.tag) {
            return;
        }

        if is_raw_text_element(&el.tag) {
            for child in &el.children {
                if let TemplateNode::Text(t) = child {
                    self.html.push_str(&t.value);
                } else {
                    self.emit_node(child);
                }
            }
        } else {
            self.emit_nodes(&el.children);
        }

        self.html.push_str("</");
        self.html.push_str(&el.tag);
        self.html.push('>');
    }

    fn emit_attribute(&mut self, attr: &AttributeIR) {
        let event = event_name(&attr.name);
        match (&attr.value, event) {
            (AttributeValue::Static(value), Some(event)) => {
                self.html.push_str(&format!(
                    " data-zen-{}=\"{}\"",
                    event,
                    escape_attr(value.trim())
                ));
            }
            (AttributeValue::Static(value), None) => {
                if value.is_empty() {
                    self.html.push_str(&format!(" {}", attr.name));
                } else {
                    self.html
                        .push_str(&format!(" {}=\"{}\"", attr.name, escape_attr(value)));
                }
            }
            // A bare handler name is wired like a static one
            (AttributeValue::Dynamic(expr), Some(event)) if is_identifier(&expr.code) => {
                self.html.push_str(&format!(
                    " data-zen-{}=\"{}\"",
                    event,
                    escape_attr(&expr.code)
                ));
            }
            (AttributeValue::Dynamic(expr), event) => {
                let target = match event {
                    Some(event) => format!("on{}", event),
                    None => attr.name.clone(),
                };
                self.html.push_str(&format!(
                    " data-zen-attr-{}=\"{}\"",
                    target,
                    escape_attr(&expr.id)
                ));
                self.bindings.push(Binding {
                    id: expr.id.clone(),
                    kind: BindingKind::Attribute,
                    target: Some(target),
                    expression: expr.code.clone(),
                    location: expr.location,
                    loop_context: expr.loop_context.clone(),
                    loop_meta: None,
                });
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// `onclick` and `on:click` name the `click` event.
fn event_name(attr: &str) -> Option<String> {
    let rest = attr.strip_prefix("on:").or_else(|| attr.strip_prefix("on"))?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(rest.to_ascii_lowercase())
}

fn is_identifier(code: &str) -> bool {
    let mut chars = code.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn is_raw_text_element(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
