#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::classify::{classify_expression, ExpressionOutputType};

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const INV_LOOP_CONTEXT_LOST: &str = "INV001";
pub const INV_ATTRIBUTE_NOT_FORWARDED: &str = "INV002";
pub const INV_UNRESOLVED_COMPONENT: &str = "INV003";
pub const INV_TEMPLATE_TAG: &str = "INV005";
pub const INV_SLOT_ATTRIBUTE: &str = "INV006";
pub const INV_ORPHAN_COMPOUND: &str = "INV007";
pub const INV_NON_ENUMERABLE_JSX: &str = "INV008";
pub const INV_UNREGISTERED_EXPRESSION: &str = "INV009";
pub const ERR_PARSE: &str = "Z-ERR-PARSE";
pub const ERR_UNDEFINED_COMPONENT: &str = "Z-ERR-UNDEFINED-COMPONENT";
pub const ERR_UNKNOWN_SLOT: &str = "Z-ERR-UNKNOWN-SLOT";
pub const ERR_RECURSIVE_COMPONENT: &str = "Z-ERR-RECURSIVE-COMPONENT";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        INV_LOOP_CONTEXT_LOST => "Slot content retains its original reactive scope.",
        INV_ATTRIBUTE_NOT_FORWARDED => {
            "Attributes passed to components are forwarded to the semantic root element."
        }
        INV_UNRESOLVED_COMPONENT => "All components are resolved at compile time.",
        INV_TEMPLATE_TAG => "Named slots use compound component pattern, not <template> tags.",
        INV_SLOT_ATTRIBUTE => {
            "Named slots use compound component pattern, not slot=\"\" attributes."
        }
        INV_ORPHAN_COMPOUND => {
            "Compound slot markers must be direct children of their parent component."
        }
        INV_NON_ENUMERABLE_JSX => "JSX expressions must have statically enumerable output.",
        INV_UNREGISTERED_EXPRESSION => {
            "All bindings must reference an ID that exists in the registry."
        }
        ERR_PARSE => "Templates are well-formed before any analysis runs.",
        ERR_UNDEFINED_COMPONENT => "Every component usage refers to a discovered definition.",
        ERR_UNKNOWN_SLOT => "Compound slot markers target a slot the component declares.",
        ERR_RECURSIVE_COMPONENT => "Component inlining always terminates.",
        _ => "Unknown invariant.",
    }
}

/// Which phase of the pipeline rejected the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Parse,
    Lowering,
    Resolution,
    Invariant,
}

impl ErrorKind {
    fn for_code(code: &str) -> Self {
        match code {
            ERR_PARSE => ErrorKind::Parse,
            INV_NON_ENUMERABLE_JSX => ErrorKind::Lowering,
            ERR_UNDEFINED_COMPONENT
            | ERR_UNKNOWN_SLOT
            | ERR_RECURSIVE_COMPONENT
            | INV_ORPHAN_COMPOUND
            | INV_ATTRIBUTE_NOT_FORWARDED => ErrorKind::Resolution,
            _ => ErrorKind::Invariant,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{file}:{line}:{column}: [{code}] {message}")]
pub struct CompilerError {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self::with_details(code, message, file, line, column, None, vec![])
    }

    pub fn at(code: &str, message: &str, file: &str, location: &SourceLocation) -> Self {
        Self::new(code, message, file, location.line, location.column)
    }

    pub fn with_details(
        code: &str,
        message: &str,
        file: &str,
        line: u32,
        column: u32,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        CompilerError {
            code: code.to_string(),
            kind: ErrorKind::for_code(code),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line,
            column,
            context,
            hints,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IR TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// 1-based position in the source file. Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl Default for SourceLocation {
    fn default() -> Self {
        SourceLocation { line: 1, column: 1 }
    }
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        SourceLocation { line, column }
    }

    /// Location reached after reading `text` starting here.
    pub fn advance(&self, text: &str) -> SourceLocation {
        let mut loc = *self;
        for ch in text.chars() {
            if ch == '\n' {
                loc.line += 1;
                loc.column = 1;
            } else {
                loc.column += 1;
            }
        }
        loc
    }
}

/// Reactive scope introduced by enclosing loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopContext {
    pub variables: Vec<String>,
    pub map_source: Option<String>,
}

impl LoopContext {
    pub fn contains_all(&self, names: &[String]) -> bool {
        names.iter().all(|n| self.variables.contains(n))
    }

    /// Widen `existing` with every variable of `parent`. Never drops a name.
    pub fn merge(existing: &Option<LoopContext>, parent: &Option<LoopContext>) -> Option<LoopContext> {
        match (existing, parent) {
            (None, None) => None,
            (None, Some(p)) => Some(p.clone()),
            (Some(e), None) => Some(e.clone()),
            (Some(e), Some(p)) => {
                let mut vars = e.variables.clone();
                for v in &p.variables {
                    if !vars.contains(v) {
                        vars.push(v.clone());
                    }
                }
                Some(LoopContext {
                    variables: vars,
                    map_source: e.map_source.clone().or_else(|| p.map_source.clone()),
                })
            }
        }
    }
}

pub fn scope_variables(ctx: &Option<LoopContext>) -> &[String] {
    ctx.as_ref().map(|c| c.variables.as_slice()).unwrap_or(&[])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionIR {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

/// Per-compile table of every expression id referenced by the tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionRegistry {
    pub expressions: Vec<ExpressionIR>,
    #[serde(skip)]
    next: u32,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ExpressionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `code` under a fresh `<prefix>_<n>` id.
    pub fn register(
        &mut self,
        prefix: &str,
        code: &str,
        location: SourceLocation,
        loop_context: Option<LoopContext>,
    ) -> String {
        let id = format!("{}_{}", prefix, self.next);
        self.next += 1;
        self.index.insert(id.clone(), self.expressions.len());
        self.expressions.push(ExpressionIR {
            id: id.clone(),
            code: code.to_string(),
            location,
            loop_context,
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<&ExpressionIR> {
        self.index.get(id).map(|&i| &self.expressions[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn update_code(&mut self, id: &str, code: &str) {
        if let Some(&i) = self.index.get(id) {
            self.expressions[i].code = code.to_string();
        }
    }

    /// Drop an id that lowering replaced with a typed fragment id.
    pub fn remove(&mut self, id: &str) {
        if let Some(i) = self.index.remove(id) {
            self.expressions.remove(i);
            for (pos, expr) in self.expressions.iter().enumerate().skip(i) {
                self.index.insert(expr.id.clone(), pos);
            }
        }
    }

    pub fn update_location(&mut self, id: &str, location: SourceLocation) {
        if let Some(&i) = self.index.get(id) {
            self.expressions[i].location = location;
        }
    }

    pub fn update_scope(&mut self, id: &str, loop_context: &Option<LoopContext>) {
        if let Some(&i) = self.index.get(id) {
            self.expressions[i].loop_context = loop_context.clone();
        }
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
    Expression(ExpressionNode),
    Component(ComponentNode),
    ConditionalFragment(ConditionalFragmentNode),
    OptionalFragment(OptionalFragmentNode),
    LoopFragment(LoopFragmentNode),
    Doctype(DoctypeNode),
}

impl TemplateNode {
    pub fn location(&self) -> SourceLocation {
        match self {
            TemplateNode::Element(n) => n.location,
            TemplateNode::Text(n) => n.location,
            TemplateNode::Expression(n) => n.location,
            TemplateNode::Component(n) => n.location,
            TemplateNode::ConditionalFragment(n) => n.location,
            TemplateNode::OptionalFragment(n) => n.location,
            TemplateNode::LoopFragment(n) => n.location,
            TemplateNode::Doctype(n) => n.location,
        }
    }

    pub fn loop_context(&self) -> Option<&LoopContext> {
        match self {
            TemplateNode::Element(n) => n.loop_context.as_ref(),
            TemplateNode::Text(n) => n.loop_context.as_ref(),
            TemplateNode::Expression(n) => n.loop_context.as_ref(),
            TemplateNode::Component(n) => n.loop_context.as_ref(),
            TemplateNode::ConditionalFragment(n) => n.loop_context.as_ref(),
            TemplateNode::OptionalFragment(n) => n.loop_context.as_ref(),
            TemplateNode::LoopFragment(n) => n.loop_context.as_ref(),
            TemplateNode::Doctype(_) => None,
        }
    }

    /// Every child list, in document order.
    pub fn child_lists(&self) -> Vec<&Vec<TemplateNode>> {
        match self {
            TemplateNode::Element(n) => vec![&n.children],
            TemplateNode::Component(n) => vec![&n.children],
            TemplateNode::ConditionalFragment(n) => vec![&n.consequent, &n.alternate],
            TemplateNode::OptionalFragment(n) => vec![&n.fragment],
            TemplateNode::LoopFragment(n) => vec![&n.body],
            _ => vec![],
        }
    }

    pub fn is_whitespace_text(&self) -> bool {
        matches!(self, TemplateNode::Text(t) if t.value.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<AttributeIR>,
    pub children: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

impl ElementNode {
    pub fn attribute(&self, name: &str) -> Option<&AttributeIR> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn static_attribute(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(|a| match &a.value {
            AttributeValue::Static(s) => Some(s.as_str()),
            AttributeValue::Dynamic(_) => None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub value: String,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionNode {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentNode {
    pub name: String,
    pub attributes: Vec<AttributeIR>,
    pub children: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalFragmentNode {
    pub id: String,
    pub condition: String,
    pub consequent: Vec<TemplateNode>,
    pub alternate: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalFragmentNode {
    pub id: String,
    pub condition: String,
    pub fragment: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopFragmentNode {
    pub id: String,
    pub source: String,
    pub item_var: String,
    pub index_var: Option<String>,
    /// Every name bound by the callback parameters (destructuring included).
    pub variables: Vec<String>,
    pub body: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    /// Scope at the loop's definition site, not including its own variables.
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctypeNode {
    pub name: String,
    pub public_id: String,
    pub system_id: String,
    #[serde(default)]
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Static(String),
    Dynamic(ExpressionIR),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeIR {
    pub name: String,
    pub value: AttributeValue,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptIR {
    pub raw: String,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleIR {
    pub raw: String,
}

/// Variables each slot-projected expression id must still see after resolution.
pub type ScopeExpectations = HashMap<String, Vec<String>>;

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Walk the resolved, lowered tree and reject the first invariant violation.
pub fn validate_tree(
    nodes: &[TemplateNode],
    registry: &ExpressionRegistry,
    expectations: &ScopeExpectations,
    file: &str,
) -> Result<(), CompilerError> {
    let mut ids = HashSet::new();
    for node in nodes {
        check_node(node, &[], registry, expectations, &mut ids, file)?;
    }
    Ok(())
}

fn check_node(
    node: &TemplateNode,
    required: &[String],
    registry: &ExpressionRegistry,
    expectations: &ScopeExpectations,
    ids: &mut HashSet<String>,
    file: &str,
) -> Result<(), CompilerError> {
    if let TemplateNode::Component(c) = node {
        return Err(CompilerError::at(
            INV_UNRESOLVED_COMPONENT,
            &format!("Unresolved component: <{}>.", c.name),
            file,
            &c.location,
        ));
    }

    if !matches!(node, TemplateNode::Doctype(_)) {
        check_scope(node.loop_context(), required, &node.location(), file)?;
    }

    match node {
        TemplateNode::Element(e) => {
            check_element_syntax(e, file)?;
            for attr in &e.attributes {
                if let AttributeValue::Dynamic(expr) = &attr.value {
                    check_registered(&expr.id, &attr.location, registry, ids, file)?;
                    check_scope(expr.loop_context.as_ref(), required, &attr.location, file)?;
                    check_expectation(&expr.id, expr.loop_context.as_ref(), expectations, &attr.location, file)?;
                }
            }
        }
        TemplateNode::Expression(e) => {
            check_registered(&e.id, &e.location, registry, ids, file)?;
            check_expectation(&e.id, e.loop_context.as_ref(), expectations, &e.location, file)?;
            check_enumerable(&e.code, &e.location, file)?;
        }
        TemplateNode::ConditionalFragment(cf) => {
            check_registered(&cf.id, &cf.location, registry, ids, file)?;
            check_expectation(&cf.id, cf.loop_context.as_ref(), expectations, &cf.location, file)?;
        }
        TemplateNode::OptionalFragment(of) => {
            check_registered(&of.id, &of.location, registry, ids, file)?;
            check_expectation(&of.id, of.loop_context.as_ref(), expectations, &of.location, file)?;
        }
        TemplateNode::LoopFragment(lf) => {
            check_registered(&lf.id, &lf.location, registry, ids, file)?;
            check_expectation(&lf.id, lf.loop_context.as_ref(), expectations, &lf.location, file)?;
            let mut inner = required.to_vec();
            for v in &lf.variables {
                if !inner.contains(v) {
                    inner.push(v.clone());
                }
            }
            for child in &lf.body {
                check_node(child, &inner, registry, expectations, ids, file)?;
            }
            return Ok(());
        }
        _ => {}
    }

    for list in node.child_lists() {
        for child in list {
            check_node(child, required, registry, expectations, ids, file)?;
        }
    }
    Ok(())
}

fn check_scope(
    scope: Option<&LoopContext>,
    required: &[String],
    location: &SourceLocation,
    file: &str,
) -> Result<(), CompilerError> {
    if required.is_empty() {
        return Ok(());
    }
    let available = scope.map(|s| s.variables.as_slice()).unwrap_or(&[]);
    if let Some(missing) = required.iter().find(|v| !available.contains(v)) {
        return Err(CompilerError::at(
            INV_LOOP_CONTEXT_LOST,
            &format!("Loop variable '{}' is not in scope for this node.", missing),
            file,
            location,
        )
        .with_hint("This is a compiler bug: reactive scope was narrowed during slot projection."));
    }
    Ok(())
}

fn check_expectation(
    id: &str,
    scope: Option<&LoopContext>,
    expectations: &ScopeExpectations,
    location: &SourceLocation,
    file: &str,
) -> Result<(), CompilerError> {
    match expectations.get(id) {
        Some(expected) => check_scope(scope, expected, location, file),
        None => Ok(()),
    }
}

fn check_registered(
    id: &str,
    location: &SourceLocation,
    registry: &ExpressionRegistry,
    ids: &mut HashSet<String>,
    file: &str,
) -> Result<(), CompilerError> {
    if !registry.contains(id) {
        return Err(CompilerError::at(
            INV_UNREGISTERED_EXPRESSION,
            &format!("Expression '{}' is not in the expression registry.", id),
            file,
            location,
        ));
    }
    if !ids.insert(id.to_string()) {
        return Err(CompilerError::at(
            INV_UNREGISTERED_EXPRESSION,
            &format!("Expression '{}' is bound more than once.", id),
            file,
            location,
        )
        .with_hint("Each component instance must receive its own expression ids."));
    }
    Ok(())
}

fn check_enumerable(code: &str, location: &SourceLocation, file: &str) -> Result<(), CompilerError> {
    let class = classify_expression(code);
    if class.expr_type != ExpressionOutputType::Primitive {
        return Err(CompilerError::at(
            INV_NON_ENUMERABLE_JSX,
            &format!(
                "Expression classified as {:?} survived fragment lowering.",
                class.expr_type
            ),
            file,
            location,
        )
        .with_context(code));
    }
    Ok(())
}

fn check_element_syntax(e: &ElementNode, file: &str) -> Result<(), CompilerError> {
    if let Some(attr) = e.attribute("slot") {
        return Err(CompilerError::with_details(
            INV_SLOT_ATTRIBUTE,
            "slot=\"\" attributes are forbidden.",
            file,
            attr.location.line,
            attr.location.column,
            Some(format!("<{} slot>", e.tag)),
            vec!["Use a compound component such as <Card.Header> to target a named slot.".to_string()],
        ));
    }
    if e.tag == "template" {
        let targets_slot = e.attributes.iter().any(|a| {
            a.name == "name" || a.name.starts_with('#') || a.name.starts_with("v-slot")
        });
        if targets_slot {
            return Err(CompilerError::with_details(
                INV_TEMPLATE_TAG,
                "<template> tags cannot target slots.",
                file,
                e.location.line,
                e.location.column,
                Some("<template>".to_string()),
                vec!["Named slots should use the compound component pattern.".to_string()],
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_loc() -> SourceLocation {
        SourceLocation { line: 1, column: 1 }
    }

    fn scoped(vars: &[&str]) -> Option<LoopContext> {
        Some(LoopContext {
            variables: vars.iter().map(|v| v.to_string()).collect(),
            map_source: None,
        })
    }

    fn expr_node(registry: &mut ExpressionRegistry, code: &str, lctx: Option<LoopContext>) -> TemplateNode {
        let id = registry.register("expr", code, mock_loc(), lctx.clone());
        TemplateNode::Expression(ExpressionNode {
            id,
            code: code.to_string(),
            location: mock_loc(),
            loop_context: lctx,
        })
    }

    #[test]
    fn test_error_display_and_kind() {
        let err = CompilerError::new(ERR_UNDEFINED_COMPONENT, "Undefined component <Foo>.", "a.zen", 3, 7);
        assert_eq!(err.kind, ErrorKind::Resolution);
        assert_eq!(err.to_string(), "a.zen:3:7: [Z-ERR-UNDEFINED-COMPONENT] Undefined component <Foo>.");
        assert!(!err.guarantee.is_empty());

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "RESOLUTION");
    }

    #[test]
    fn test_location_advance() {
        let loc = SourceLocation::new(2, 5).advance("ab\ncd");
        assert_eq!(loc, SourceLocation::new(3, 3));
    }

    #[test]
    fn test_merge_loop_context_widens() {
        let merged = LoopContext::merge(&scoped(&["item"]), &scoped(&["row", "item"])).unwrap();
        assert_eq!(merged.variables, vec!["item", "row"]);
        assert!(LoopContext::merge(&None, &None).is_none());
    }

    #[test]
    fn test_registry_ids_are_sequential() {
        let mut registry = ExpressionRegistry::new();
        assert_eq!(registry.register("expr", "a", mock_loc(), None), "expr_0");
        assert_eq!(registry.register("cond", "b", mock_loc(), None), "cond_1");
        assert!(registry.contains("cond_1"));
        registry.update_code("cond_1", "c");
        assert_eq!(registry.get("cond_1").unwrap().code, "c");
    }

    #[test]
    fn test_unresolved_component_rejected() {
        let nodes = vec![TemplateNode::Component(ComponentNode {
            name: "Card".to_string(),
            attributes: vec![],
            children: vec![],
            location: mock_loc(),
            loop_context: None,
        })];
        let err = validate_tree(&nodes, &ExpressionRegistry::new(), &HashMap::new(), "t.zen").unwrap_err();
        assert_eq!(err.code, INV_UNRESOLVED_COMPONENT);
    }

    #[test]
    fn test_scope_loss_inside_loop_body() {
        let mut registry = ExpressionRegistry::new();
        let body = vec![expr_node(&mut registry, "title", None)];
        let id = registry.register("loop", "items", mock_loc(), None);
        let nodes = vec![TemplateNode::LoopFragment(LoopFragmentNode {
            id,
            source: "items".to_string(),
            item_var: "item".to_string(),
            index_var: None,
            variables: vec!["item".to_string()],
            body,
            location: mock_loc(),
            loop_context: None,
        })];
        let err = validate_tree(&nodes, &registry, &HashMap::new(), "t.zen").unwrap_err();
        assert_eq!(err.code, INV_LOOP_CONTEXT_LOST);
    }

    #[test]
    fn test_scope_expectation_checked() {
        let mut registry = ExpressionRegistry::new();
        let node = expr_node(&mut registry, "row.name", scoped(&["item"]));
        let mut expectations = HashMap::new();
        expectations.insert("expr_0".to_string(), vec!["row".to_string()]);
        let err = validate_tree(&[node.clone()], &registry, &expectations, "t.zen").unwrap_err();
        assert_eq!(err.code, INV_LOOP_CONTEXT_LOST);

        expectations.insert("expr_0".to_string(), vec!["item".to_string()]);
        assert!(validate_tree(&[node], &registry, &expectations, "t.zen").is_ok());
    }

    #[test]
    fn test_unregistered_expression_rejected() {
        let nodes = vec![TemplateNode::Expression(ExpressionNode {
            id: "expr_99".to_string(),
            code: "count".to_string(),
            location: mock_loc(),
            loop_context: None,
        })];
        let err = validate_tree(&nodes, &ExpressionRegistry::new(), &HashMap::new(), "t.zen").unwrap_err();
        assert_eq!(err.code, INV_UNREGISTERED_EXPRESSION);
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let mut registry = ExpressionRegistry::new();
        let node = expr_node(&mut registry, "count", None);
        let err = validate_tree(&[node.clone(), node], &registry, &HashMap::new(), "t.zen").unwrap_err();
        assert_eq!(err.code, INV_UNREGISTERED_EXPRESSION);
    }

    #[test]
    fn test_slot_attribute_rejected() {
        let nodes = vec![TemplateNode::Element(ElementNode {
            tag: "div".to_string(),
            attributes: vec![AttributeIR {
                name: "slot".to_string(),
                value: AttributeValue::Static("header".to_string()),
                location: mock_loc(),
                loop_context: None,
            }],
            children: vec![],
            location: mock_loc(),
            loop_context: None,
        })];
        let err = validate_tree(&nodes, &ExpressionRegistry::new(), &HashMap::new(), "t.zen").unwrap_err();
        assert_eq!(err.code, INV_SLOT_ATTRIBUTE);
    }

    #[test]
    fn test_slot_template_rejected() {
        let nodes = vec![TemplateNode::Element(ElementNode {
            tag: "template".to_string(),
            attributes: vec![AttributeIR {
                name: "#header".to_string(),
                value: AttributeValue::Static(String::new()),
                location: mock_loc(),
                loop_context: None,
            }],
            children: vec![],
            location: mock_loc(),
            loop_context: None,
        })];
        let err = validate_tree(&nodes, &ExpressionRegistry::new(), &HashMap::new(), "t.zen").unwrap_err();
        assert_eq!(err.code, INV_TEMPLATE_TAG);
    }

    #[test]
    fn test_unlowered_markup_expression_rejected() {
        let mut registry = ExpressionRegistry::new();
        let node = expr_node(&mut registry, "ok ? <b>y</b> : <i>n</i>", None);
        let err = validate_tree(&[node], &registry, &HashMap::new(), "t.zen").unwrap_err();
        assert_eq!(err.code, INV_NON_ENUMERABLE_JSX);
    }
}
