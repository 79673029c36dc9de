//! Component & slot resolution.
//!
//! Inlines every component usage with an independent copy of its definition,
//! projects slot content (keeping the scope it was written in), substitutes
//! declared props and forwards the remaining attributes to the semantic root.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    AssignmentTarget, ChainElement, Expression, ObjectPropertyKind, PropertyKey,
    SimpleAssignmentTarget, Statement,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::classify::collect_binding_pattern;
use crate::discovery::{ComponentMap, ComponentMetadata};
use crate::transform::{lower_fragments, LoweringContext};
use crate::validate::{
    scope_variables, AttributeIR, AttributeValue, CompilerError, ComponentNode, ExpressionIR,
    ExpressionRegistry, LoopContext, ScopeExpectations, ScriptIR, SourceLocation, StyleIR,
    TemplateNode, ERR_RECURSIVE_COMPONENT, ERR_UNDEFINED_COMPONENT, ERR_UNKNOWN_SLOT,
    INV_ATTRIBUTE_NOT_FORWARDED, INV_ORPHAN_COMPOUND,
};

pub const DEFAULT_SLOT: &str = "default";
const COMPONENT_ATTR: &str = "data-zen-component";

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLUTION OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScript {
    pub component: String,
    pub script: ScriptIR,
}

/// Resolved tree plus everything collected from the components it used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub nodes: Vec<TemplateNode>,
    /// Distinct component names in first-use order.
    pub used_components: Vec<String>,
    pub styles: Vec<StyleIR>,
    pub scripts: Vec<ComponentScript>,
    pub scope_expectations: ScopeExpectations,
}

struct SlotContent {
    nodes: Vec<TemplateNode>,
    inserted: bool,
}

struct ResolvedSlots {
    default: SlotContent,
    named: HashMap<String, SlotContent>,
    usage_scope: Option<LoopContext>,
}

struct Resolver<'a> {
    components: &'a ComponentMap,
    registry: &'a mut ExpressionRegistry,
    file_path: &'a str,
    stack: Vec<String>,
    out: Resolution,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

pub fn resolve_components(
    nodes: Vec<TemplateNode>,
    components: &ComponentMap,
    registry: &mut ExpressionRegistry,
    file_path: &str,
) -> Result<Resolution, CompilerError> {
    let mut resolver = Resolver {
        components,
        registry,
        file_path,
        stack: Vec::new(),
        out: Resolution::default(),
    };
    let resolved = resolver.resolve_nodes(nodes)?;
    let mut out = resolver.out;
    out.nodes = resolved;
    debug!(used = ?out.used_components, "resolved components");
    Ok(out)
}

impl<'a> Resolver<'a> {
    fn resolve_nodes(&mut self, nodes: Vec<TemplateNode>) -> Result<Vec<TemplateNode>, CompilerError> {
        let mut resolved = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                TemplateNode::Component(comp) => {
                    resolved.extend(self.resolve_component_node(comp)?);
                }
                TemplateNode::Element(mut elem) => {
                    elem.children = self.resolve_nodes(elem.children)?;
                    resolved.push(TemplateNode::Element(elem));
                }
                TemplateNode::ConditionalFragment(mut cf) => {
                    cf.consequent = self.resolve_nodes(cf.consequent)?;
                    cf.alternate = self.resolve_nodes(cf.alternate)?;
                    resolved.push(TemplateNode::ConditionalFragment(cf));
                }
                TemplateNode::OptionalFragment(mut of) => {
                    of.fragment = self.resolve_nodes(of.fragment)?;
                    resolved.push(TemplateNode::OptionalFragment(of));
                }
                TemplateNode::LoopFragment(mut lf) => {
                    lf.body = self.resolve_nodes(lf.body)?;
                    resolved.push(TemplateNode::LoopFragment(lf));
                }
                other => resolved.push(other),
            }
        }
        Ok(resolved)
    }

    fn lookup(&self, name: &str) -> Option<&'a ComponentMetadata> {
        let components = self.components;
        components.get(name).or_else(|| {
            components
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(name))
                .min_by(|a, b| a.0.cmp(b.0))
                .map(|(_, v)| v)
        })
    }

    fn resolve_component_node(
        &mut self,
        node: ComponentNode,
    ) -> Result<Vec<TemplateNode>, CompilerError> {
        if let Some((parent, _)) = node.name.split_once('.') {
            return Err(CompilerError::at(
                INV_ORPHAN_COMPOUND,
                &format!(
                    "<{}> can only be used as a direct child of <{}>.",
                    node.name, parent
                ),
                self.file_path,
                &node.location,
            ));
        }

        let Some(comp) = self.lookup(&node.name) else {
            return Err(CompilerError::at(
                ERR_UNDEFINED_COMPONENT,
                &format!("Component <{}> is not defined.", node.name),
                self.file_path,
                &node.location,
            )
            .with_hint(format!("Create {}.zen in the components directory.", node.name)));
        };
        let name = comp.name.clone();

        if self.stack.contains(&name) {
            let mut chain = self.stack.clone();
            chain.push(name.clone());
            return Err(CompilerError::at(
                ERR_RECURSIVE_COMPONENT,
                &format!("Component <{}> includes itself.", name),
                self.file_path,
                &node.location,
            )
            .with_context(chain.join(" -> ")));
        }

        if !self.out.used_components.contains(&name) {
            self.out.used_components.push(name.clone());
            self.out.styles.extend(comp.styles.iter().cloned());
            if let Some(script) = &comp.script {
                self.out.scripts.push(ComponentScript {
                    component: name.clone(),
                    script: script.clone(),
                });
            }
        }

        let ComponentNode {
            attributes,
            children,
            location,
            loop_context: usage_scope,
            ..
        } = node;

        // 1. Partition children and resolve slot content in the page's context
        let mut slots = self.extract_slots(&name, comp, children, &usage_scope)?;
        slots.default.nodes = self.resolve_nodes(std::mem::take(&mut slots.default.nodes))?;
        let mut slot_names: Vec<String> = slots.named.keys().cloned().collect();
        slot_names.sort();
        for slot in slot_names {
            if let Some(content) = slots.named.get_mut(&slot) {
                content.nodes = self.resolve_nodes(std::mem::take(&mut content.nodes))?;
            }
        }

        // 2. Independent copy of the definition
        let mut template = comp.nodes.clone();
        rekey_nodes(&mut template, self.registry, &mut HashMap::new());
        let mut template = {
            let mut ctx = LoweringContext::new(self.registry, &comp.path);
            lower_fragments(template, &mut ctx)?
        };

        // 3. Props
        let (props, forwarded) = split_props(comp, attributes);
        let mut values = HashMap::new();
        for prop in &comp.props {
            let value = props
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(prop))
                .map(|a| match &a.value {
                    AttributeValue::Static(s) => {
                        serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
                    }
                    AttributeValue::Dynamic(expr) => format!("({})", expr.code),
                })
                .unwrap_or_else(|| "undefined".to_string());
            values.insert(prop.clone(), value);
        }
        for attr in &props {
            if let AttributeValue::Dynamic(expr) = &attr.value {
                self.registry.remove(&expr.id);
            }
        }
        substitute_in_nodes(&mut template, &values, self.registry);
        // Locations inside the definition belong to another file
        relocate_nodes(&mut template, location, self.registry);

        // 4. Slots
        let mut template = self.resolve_slots(template, &mut slots)?;
        self.discard_unplaced(&slots);

        // 5. Attributes onto the semantic root
        self.forward_attributes(&mut template, forwarded, comp, &location)?;

        // 6. Usage scope flows into the whole instance
        rebind_nodes(&mut template, &usage_scope, self.registry);

        trace!(component = %name, "inlined component");
        self.stack.push(name);
        let resolved = self.resolve_nodes(template);
        self.stack.pop();
        resolved
    }

    fn extract_slots(
        &mut self,
        parent_name: &str,
        comp: &ComponentMetadata,
        children: Vec<TemplateNode>,
        usage_scope: &Option<LoopContext>,
    ) -> Result<ResolvedSlots, CompilerError> {
        let mut default = Vec::new();
        let mut named: HashMap<String, SlotContent> = HashMap::new();

        for mut child in children {
            if let TemplateNode::Component(marker) = &mut child {
                if let Some(slot_name) = parse_compound_name(&marker.name, parent_name) {
                    if !comp.slots.contains(&slot_name) {
                        return Err(CompilerError::at(
                            ERR_UNKNOWN_SLOT,
                            &format!(
                                "<{}> targets slot '{}' which <{}> does not declare.",
                                marker.name, slot_name, parent_name
                            ),
                            self.file_path,
                            &marker.location,
                        )
                        .with_hint(format!("Declared slots: {}", comp.slots.join(", "))));
                    }
                    let mut content = std::mem::take(&mut marker.children);
                    rebind_nodes(&mut content, usage_scope, self.registry);
                    named
                        .entry(slot_name)
                        .or_insert_with(|| SlotContent {
                            nodes: Vec::new(),
                            inserted: false,
                        })
                        .nodes
                        .extend(content);
                    continue;
                }
            }
            rebind_node(&mut child, usage_scope, self.registry);
            default.push(child);
        }

        Ok(ResolvedSlots {
            default: SlotContent {
                nodes: default,
                inserted: false,
            },
            named,
            usage_scope: usage_scope.clone(),
        })
    }

    fn resolve_slots(
        &mut self,
        nodes: Vec<TemplateNode>,
        slots: &mut ResolvedSlots,
    ) -> Result<Vec<TemplateNode>, CompilerError> {
        let mut resolved = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                TemplateNode::Element(elem) if elem.tag == "slot" => {
                    let name = elem
                        .static_attribute("name")
                        .map(|n| n.to_lowercase())
                        .filter(|n| n != DEFAULT_SLOT);
                    let content = match &name {
                        Some(n) => slots.named.get_mut(n),
                        None => Some(&mut slots.default),
                    };
                    match content {
                        Some(content) if !content.nodes.is_empty() => {
                            let mut inserted = content.nodes.clone();
                            if content.inserted {
                                rekey_nodes(&mut inserted, self.registry, &mut HashMap::new());
                            }
                            content.inserted = true;
                            self.expect_scope(&inserted, &slots.usage_scope);
                            // slot placed inside a template loop sees that loop too
                            rebind_nodes(&mut inserted, &elem.loop_context, self.registry);
                            resolved.extend(inserted);
                        }
                        _ => {
                            let fallback = self.resolve_slots(elem.children, slots)?;
                            resolved.extend(fallback);
                        }
                    }
                }
                TemplateNode::Element(mut elem) => {
                    elem.children = self.resolve_slots(elem.children, slots)?;
                    resolved.push(TemplateNode::Element(elem));
                }
                TemplateNode::Component(mut comp) => {
                    comp.children = self.resolve_slots(comp.children, slots)?;
                    resolved.push(TemplateNode::Component(comp));
                }
                TemplateNode::ConditionalFragment(mut cf) => {
                    cf.consequent = self.resolve_slots(cf.consequent, slots)?;
                    cf.alternate = self.resolve_slots(cf.alternate, slots)?;
                    resolved.push(TemplateNode::ConditionalFragment(cf));
                }
                TemplateNode::OptionalFragment(mut of) => {
                    of.fragment = self.resolve_slots(of.fragment, slots)?;
                    resolved.push(TemplateNode::OptionalFragment(of));
                }
                TemplateNode::LoopFragment(mut lf) => {
                    lf.body = self.resolve_slots(lf.body, slots)?;
                    resolved.push(TemplateNode::LoopFragment(lf));
                }
                other => resolved.push(other),
            }
        }
        Ok(resolved)
    }

    /// Content for a slot the template never places is dropped with its ids.
    fn discard_unplaced(&mut self, slots: &ResolvedSlots) {
        let mut ids = Vec::new();
        for content in std::iter::once(&slots.default).chain(slots.named.values()) {
            if !content.inserted {
                for_each_id(&content.nodes, &mut |id| ids.push(id.to_string()));
            }
        }
        for id in ids {
            self.registry.remove(&id);
        }
    }

    /// Record that every id in projected content must keep the usage-site scope.
    fn expect_scope(&mut self, nodes: &[TemplateNode], scope: &Option<LoopContext>) {
        let vars = scope_variables(scope);
        if vars.is_empty() {
            return;
        }
        for_each_id(nodes, &mut |id| {
            self.out
                .scope_expectations
                .insert(id.to_string(), vars.to_vec());
        });
    }

    fn forward_attributes(
        &mut self,
        template: &mut [TemplateNode],
        forwarded: Vec<AttributeIR>,
        comp: &ComponentMetadata,
        usage_location: &SourceLocation,
    ) -> Result<(), CompilerError> {
        // A root that is itself a component usage passes the attributes on to
        // its own root when it is resolved.
        let root = template.iter_mut().find_map(|n| match n {
            TemplateNode::Element(e) => Some((&mut e.attributes, e.location, e.loop_context.clone())),
            TemplateNode::Component(c) => Some((&mut c.attributes, c.location, c.loop_context.clone())),
            _ => None,
        });
        let Some((attributes, root_location, root_scope)) = root else {
            if let Some(attr) = forwarded.first() {
                return Err(CompilerError::at(
                    INV_ATTRIBUTE_NOT_FORWARDED,
                    &format!(
                        "Attribute '{}' passed to <{}> has no root element to land on.",
                        attr.name, comp.name
                    ),
                    self.file_path,
                    usage_location,
                )
                .with_hint("Wrap the component template in a single element."));
            }
            return Ok(());
        };

        for attr in forwarded {
            if attr.name == "class" {
                if let Some(existing) = attributes.iter().position(|a| a.name == "class") {
                    let merged = self.merge_class(&attributes[existing], attr);
                    attributes[existing] = merged;
                    continue;
                }
            }
            match attributes.iter().position(|a| a.name == attr.name) {
                Some(existing) => {
                    if let AttributeValue::Dynamic(old) = &attributes[existing].value {
                        self.registry.remove(&old.id);
                    }
                    attributes[existing] = attr;
                }
                None => attributes.push(attr),
            }
        }

        if comp.has_script() && !attributes.iter().any(|a| a.name == COMPONENT_ATTR) {
            attributes.push(AttributeIR {
                name: COMPONENT_ATTR.to_string(),
                value: AttributeValue::Static(comp.name.clone()),
                location: root_location,
                loop_context: root_scope,
            });
        }
        Ok(())
    }

    fn merge_class(&mut self, existing: &AttributeIR, incoming: AttributeIR) -> AttributeIR {
        match (&existing.value, &incoming.value) {
            (AttributeValue::Static(a), AttributeValue::Static(b)) => AttributeIR {
                value: AttributeValue::Static(format!("{} {}", a, b).trim().to_string()),
                ..incoming
            },
            (a, b) => {
                let part = |v: &AttributeValue| match v {
                    AttributeValue::Static(s) => {
                        serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
                    }
                    AttributeValue::Dynamic(e) => format!("({})", e.code),
                };
                let code = format!("[{}, {}].filter(Boolean).join(\" \")", part(a), part(b));
                for v in [a, b] {
                    if let AttributeValue::Dynamic(e) = v {
                        self.registry.remove(&e.id);
                    }
                }
                let scope = LoopContext::merge(&existing.loop_context, &incoming.loop_context);
                let id = self
                    .registry
                    .register("expr", &code, incoming.location, scope.clone());
                AttributeIR {
                    name: "class".to_string(),
                    value: AttributeValue::Dynamic(ExpressionIR {
                        id,
                        code,
                        location: incoming.location,
                        loop_context: scope.clone(),
                    }),
                    location: incoming.location,
                    loop_context: scope,
                }
            }
        }
    }
}

/// `Card.Header` under `Card` names the `header` slot.
fn parse_compound_name(component_name: &str, parent_name: &str) -> Option<String> {
    let rest = component_name.strip_prefix(parent_name)?.strip_prefix('.')?;
    Some(rest.to_lowercase())
}

/// Declared props are consumed; everything else is forwarded.
fn split_props(
    comp: &ComponentMetadata,
    attributes: Vec<AttributeIR>,
) -> (Vec<AttributeIR>, Vec<AttributeIR>) {
    attributes
        .into_iter()
        .partition(|a| comp.props.iter().any(|p| p.eq_ignore_ascii_case(&a.name)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE REWRITES
// ═══════════════════════════════════════════════════════════════════════════════

/// Visit every expression id in `nodes`, in document order.
pub fn for_each_id(nodes: &[TemplateNode], f: &mut impl FnMut(&str)) {
    for node in nodes {
        match node {
            TemplateNode::Expression(e) => f(&e.id),
            TemplateNode::Element(e) => attribute_ids(&e.attributes, f),
            TemplateNode::Component(c) => attribute_ids(&c.attributes, f),
            TemplateNode::ConditionalFragment(cf) => f(&cf.id),
            TemplateNode::OptionalFragment(of) => f(&of.id),
            TemplateNode::LoopFragment(lf) => f(&lf.id),
            _ => {}
        }
        for list in node.child_lists() {
            for_each_id(list, f);
        }
    }
}

fn attribute_ids(attributes: &[AttributeIR], f: &mut impl FnMut(&str)) {
    for attr in attributes {
        if let AttributeValue::Dynamic(expr) = &attr.value {
            f(&expr.id);
        }
    }
}

fn id_prefix(id: &str) -> &str {
    id.rsplit_once('_').map(|(p, _)| p).unwrap_or("expr")
}

fn remap_scope(scope: &mut Option<LoopContext>, renamed: &HashMap<String, String>) {
    if let Some(ctx) = scope {
        if let Some(new) = ctx.map_source.as_ref().and_then(|s| renamed.get(s)) {
            ctx.map_source = Some(new.clone());
        }
    }
}

/// Give every id in `nodes` a fresh registry entry so copies never share ids.
pub fn rekey_nodes(
    nodes: &mut [TemplateNode],
    registry: &mut ExpressionRegistry,
    renamed: &mut HashMap<String, String>,
) {
    for node in nodes {
        match node {
            TemplateNode::Element(e) => {
                remap_scope(&mut e.loop_context, renamed);
                rekey_attributes(&mut e.attributes, registry, renamed);
                rekey_nodes(&mut e.children, registry, renamed);
            }
            TemplateNode::Component(c) => {
                remap_scope(&mut c.loop_context, renamed);
                rekey_attributes(&mut c.attributes, registry, renamed);
                rekey_nodes(&mut c.children, registry, renamed);
            }
            TemplateNode::Text(t) => remap_scope(&mut t.loop_context, renamed),
            TemplateNode::Expression(e) => {
                remap_scope(&mut e.loop_context, renamed);
                let id = registry.register(id_prefix(&e.id), &e.code, e.location, e.loop_context.clone());
                renamed.insert(std::mem::replace(&mut e.id, id.clone()), id);
            }
            TemplateNode::ConditionalFragment(cf) => {
                remap_scope(&mut cf.loop_context, renamed);
                let id = registry.register(id_prefix(&cf.id), &cf.condition, cf.location, cf.loop_context.clone());
                renamed.insert(std::mem::replace(&mut cf.id, id.clone()), id);
                rekey_nodes(&mut cf.consequent, registry, renamed);
                rekey_nodes(&mut cf.alternate, registry, renamed);
            }
            TemplateNode::OptionalFragment(of) => {
                remap_scope(&mut of.loop_context, renamed);
                let id = registry.register(id_prefix(&of.id), &of.condition, of.location, of.loop_context.clone());
                renamed.insert(std::mem::replace(&mut of.id, id.clone()), id);
                rekey_nodes(&mut of.fragment, registry, renamed);
            }
            TemplateNode::LoopFragment(lf) => {
                remap_scope(&mut lf.loop_context, renamed);
                let id = registry.register(id_prefix(&lf.id), &lf.source, lf.location, lf.loop_context.clone());
                renamed.insert(std::mem::replace(&mut lf.id, id.clone()), id);
                rekey_nodes(&mut lf.body, registry, renamed);
            }
            TemplateNode::Doctype(_) => {}
        }
    }
}

fn rekey_attributes(
    attributes: &mut [AttributeIR],
    registry: &mut ExpressionRegistry,
    renamed: &mut HashMap<String, String>,
) {
    for attr in attributes {
        remap_scope(&mut attr.loop_context, renamed);
        if let AttributeValue::Dynamic(expr) = &mut attr.value {
            remap_scope(&mut expr.loop_context, renamed);
            let id = registry.register(
                id_prefix(&expr.id),
                &expr.code,
                expr.location,
                expr.loop_context.clone(),
            );
            renamed.insert(std::mem::replace(&mut expr.id, id.clone()), id);
        }
    }
}

/// Move every node and id in `nodes` to `location`.
pub fn relocate_nodes(
    nodes: &mut [TemplateNode],
    location: SourceLocation,
    registry: &mut ExpressionRegistry,
) {
    for node in nodes {
        match node {
            TemplateNode::Element(e) => {
                e.location = location;
                relocate_attributes(&mut e.attributes, location, registry);
            }
            TemplateNode::Component(c) => {
                c.location = location;
                relocate_attributes(&mut c.attributes, location, registry);
            }
            TemplateNode::Text(t) => t.location = location,
            TemplateNode::Expression(e) => {
                e.location = location;
                registry.update_location(&e.id, location);
            }
            TemplateNode::ConditionalFragment(cf) => {
                cf.location = location;
                registry.update_location(&cf.id, location);
            }
            TemplateNode::OptionalFragment(of) => {
                of.location = location;
                registry.update_location(&of.id, location);
            }
            TemplateNode::LoopFragment(lf) => {
                lf.location = location;
                registry.update_location(&lf.id, location);
            }
            TemplateNode::Doctype(d) => d.location = location,
        }
        match node {
            TemplateNode::Element(e) => relocate_nodes(&mut e.children, location, registry),
            TemplateNode::Component(c) => relocate_nodes(&mut c.children, location, registry),
            TemplateNode::ConditionalFragment(cf) => {
                relocate_nodes(&mut cf.consequent, location, registry);
                relocate_nodes(&mut cf.alternate, location, registry);
            }
            TemplateNode::OptionalFragment(of) => relocate_nodes(&mut of.fragment, location, registry),
            TemplateNode::LoopFragment(lf) => relocate_nodes(&mut lf.body, location, registry),
            _ => {}
        }
    }
}

fn relocate_attributes(
    attributes: &mut [AttributeIR],
    location: SourceLocation,
    registry: &mut ExpressionRegistry,
) {
    for attr in attributes {
        attr.location = location;
        if let AttributeValue::Dynamic(expr) = &mut attr.value {
            expr.location = location;
            registry.update_location(&expr.id, location);
        }
    }
}

pub fn rebind_nodes(
    nodes: &mut [TemplateNode],
    scope: &Option<LoopContext>,
    registry: &mut ExpressionRegistry,
) {
    for node in nodes {
        rebind_node(node, scope, registry);
    }
}

/// Widen the reactive scope of `node` and everything under it with `scope`.
pub fn rebind_node(
    node: &mut TemplateNode,
    scope: &Option<LoopContext>,
    registry: &mut ExpressionRegistry,
) {
    if scope.is_none() {
        return;
    }
    match node {
        TemplateNode::Element(e) => {
            e.loop_context = LoopContext::merge(&e.loop_context, scope);
            rebind_attributes(&mut e.attributes, scope, registry);
            rebind_nodes(&mut e.children, scope, registry);
        }
        TemplateNode::Component(c) => {
            c.loop_context = LoopContext::merge(&c.loop_context, scope);
            rebind_attributes(&mut c.attributes, scope, registry);
            rebind_nodes(&mut c.children, scope, registry);
        }
        TemplateNode::Text(t) => {
            t.loop_context = LoopContext::merge(&t.loop_context, scope);
        }
        TemplateNode::Expression(e) => {
            e.loop_context = LoopContext::merge(&e.loop_context, scope);
            registry.update_scope(&e.id, &e.loop_context);
        }
        TemplateNode::ConditionalFragment(cf) => {
            cf.loop_context = LoopContext::merge(&cf.loop_context, scope);
            registry.update_scope(&cf.id, &cf.loop_context);
            rebind_nodes(&mut cf.consequent, scope, registry);
            rebind_nodes(&mut cf.alternate, scope, registry);
        }
        TemplateNode::OptionalFragment(of) => {
            of.loop_context = LoopContext::merge(&of.loop_context, scope);
            registry.update_scope(&of.id, &of.loop_context);
            rebind_nodes(&mut of.fragment, scope, registry);
        }
        TemplateNode::LoopFragment(lf) => {
            lf.loop_context = LoopContext::merge(&lf.loop_context, scope);
            registry.update_scope(&lf.id, &lf.loop_context);
            rebind_nodes(&mut lf.body, scope, registry);
        }
        TemplateNode::Doctype(_) => {}
    }
}

fn rebind_attributes(
    attributes: &mut [AttributeIR],
    scope: &Option<LoopContext>,
    registry: &mut ExpressionRegistry,
) {
    for attr in attributes {
        attr.loop_context = LoopContext::merge(&attr.loop_context, scope);
        if let AttributeValue::Dynamic(expr) = &mut attr.value {
            expr.loop_context = LoopContext::merge(&expr.loop_context, scope);
            registry.update_scope(&expr.id, &expr.loop_context);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROP SUBSTITUTION
// ═══════════════════════════════════════════════════════════════════════════════

fn substitute_in_nodes(
    nodes: &mut [TemplateNode],
    values: &HashMap<String, String>,
    registry: &mut ExpressionRegistry,
) {
    if values.is_empty() {
        return;
    }
    for node in nodes {
        match node {
            TemplateNode::Element(e) => {
                substitute_in_attributes(&mut e.attributes, values, registry);
                substitute_in_nodes(&mut e.children, values, registry);
            }
            TemplateNode::Component(c) => {
                substitute_in_attributes(&mut c.attributes, values, registry);
                substitute_in_nodes(&mut c.children, values, registry);
            }
            TemplateNode::Expression(e) => {
                e.code = substitute_props(&e.code, values, scope_variables(&e.loop_context));
                registry.update_code(&e.id, &e.code);
            }
            TemplateNode::ConditionalFragment(cf) => {
                cf.condition =
                    substitute_props(&cf.condition, values, scope_variables(&cf.loop_context));
                registry.update_code(&cf.id, &cf.condition);
                substitute_in_nodes(&mut cf.consequent, values, registry);
                substitute_in_nodes(&mut cf.alternate, values, registry);
            }
            TemplateNode::OptionalFragment(of) => {
                of.condition =
                    substitute_props(&of.condition, values, scope_variables(&of.loop_context));
                registry.update_code(&of.id, &of.condition);
                substitute_in_nodes(&mut of.fragment, values, registry);
            }
            TemplateNode::LoopFragment(lf) => {
                lf.source = substitute_props(&lf.source, values, scope_variables(&lf.loop_context));
                registry.update_code(&lf.id, &lf.source);
                substitute_in_nodes(&mut lf.body, values, registry);
            }
            _ => {}
        }
    }
}

fn substitute_in_attributes(
    attributes: &mut [AttributeIR],
    values: &HashMap<String, String>,
    registry: &mut ExpressionRegistry,
) {
    for attr in attributes {
        if let AttributeValue::Dynamic(expr) = &mut attr.value {
            expr.code = substitute_props(&expr.code, values, scope_variables(&expr.loop_context));
            registry.update_code(&expr.id, &expr.code);
        }
    }
}

/// Replace references to prop names in `code` with their usage-site values.
/// Names in `shadowed` (loop variables) and names bound by nested arrow
/// parameters are left alone, as are member properties and object keys.
pub fn substitute_props(code: &str, values: &HashMap<String, String>, shadowed: &[String]) -> String {
    if values.is_empty() {
        return code.to_string();
    }

    let wrapped = format!("({})", code);
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true);
    let ret = Parser::new(&allocator, &wrapped, source_type).parse();
    if !ret.errors.is_empty() {
        return code.to_string();
    }
    let Some(Statement::ExpressionStatement(stmt)) = ret.program.body.first() else {
        return code.to_string();
    };

    let mut walker = PropReplacer {
        values,
        replacements: Vec::new(),
    };
    walker.collect_replacements_expr(&stmt.expression, shadowed);
    if walker.replacements.is_empty() {
        return code.to_string();
    }

    // Sort reverse to apply safely
    let mut replacements = walker.replacements;
    replacements.sort_by(|a, b| b.0.cmp(&a.0));
    let mut result = wrapped.clone();
    for (start, end, replacement) in replacements {
        result.replace_range((start as usize)..(end as usize), &replacement);
    }
    result[1..result.len() - 1].to_string()
}

struct PropReplacer<'m> {
    values: &'m HashMap<String, String>,
    replacements: Vec<(u32, u32, String)>,
}

impl<'m> PropReplacer<'m> {
    fn lookup(&self, name: &str, shadowed: &[String]) -> Option<String> {
        if shadowed.iter().any(|s| s == name) {
            return None;
        }
        self.values.get(name).cloned()
    }

    fn collect_replacements_stmt(&mut self, stmt: &Statement, shadowed: &mut Vec<String>) {
        match stmt {
            Statement::VariableDeclaration(var) => {
                for decl in &var.declarations {
                    collect_binding_pattern(&decl.id, shadowed);
                    if let Some(init) = &decl.init {
                        self.collect_replacements_expr(init, shadowed);
                    }
                }
            }
            Statement::ExpressionStatement(expr_stmt) => {
                self.collect_replacements_expr(&expr_stmt.expression, shadowed);
            }
            Statement::BlockStatement(blk) => {
                let mut inner = shadowed.clone();
                for s in &blk.body {
                    self.collect_replacements_stmt(s, &mut inner);
                }
            }
            Statement::IfStatement(if_stmt) => {
                self.collect_replacements_expr(&if_stmt.test, shadowed);
                self.collect_replacements_stmt(&if_stmt.consequent, shadowed);
                if let Some(alt) = &if_stmt.alternate {
                    self.collect_replacements_stmt(alt, shadowed);
                }
            }
            Statement::ReturnStatement(ret) => {
                if let Some(arg) = &ret.argument {
                    self.collect_replacements_expr(arg, shadowed);
                }
            }
            _ => {}
        }
    }

    fn collect_replacements_expr(&mut self, expr: &Expression, shadowed: &[String]) {
        match expr {
            Expression::Identifier(id) => {
                if let Some(value) = self.lookup(id.name.as_str(), shadowed) {
                    self.replacements.push((id.span.start, id.span.end, value));
                }
            }
            Expression::BinaryExpression(bin) => {
                self.collect_replacements_expr(&bin.left, shadowed);
                self.collect_replacements_expr(&bin.right, shadowed);
            }
            Expression::LogicalExpression(logical) => {
                self.collect_replacements_expr(&logical.left, shadowed);
                self.collect_replacements_expr(&logical.right, shadowed);
            }
            Expression::ConditionalExpression(cond) => {
                self.collect_replacements_expr(&cond.test, shadowed);
                self.collect_replacements_expr(&cond.consequent, shadowed);
                self.collect_replacements_expr(&cond.alternate, shadowed);
            }
            Expression::UnaryExpression(unary) => {
                self.collect_replacements_expr(&unary.argument, shadowed);
            }
            Expression::UpdateExpression(update) => match &update.argument {
                SimpleAssignmentTarget::StaticMemberExpression(st) => {
                    self.collect_replacements_expr(&st.object, shadowed);
                }
                SimpleAssignmentTarget::ComputedMemberExpression(comp) => {
                    self.collect_replacements_expr(&comp.object, shadowed);
                    self.collect_replacements_expr(&comp.expression, shadowed);
                }
                _ => {}
            },
            // Props are read-only; only the right side and member objects are rewritten
            Expression::AssignmentExpression(assign) => {
                match &assign.left {
                    AssignmentTarget::StaticMemberExpression(st) => {
                        self.collect_replacements_expr(&st.object, shadowed);
                    }
                    AssignmentTarget::ComputedMemberExpression(comp) => {
                        self.collect_replacements_expr(&comp.object, shadowed);
                        self.collect_replacements_expr(&comp.expression, shadowed);
                    }
                    _ => {}
                }
                self.collect_replacements_expr(&assign.right, shadowed);
            }
            Expression::ParenthesizedExpression(paren) => {
                self.collect_replacements_expr(&paren.expression, shadowed);
            }
            Expression::SequenceExpression(seq) => {
                for e in &seq.expressions {
                    self.collect_replacements_expr(e, shadowed);
                }
            }
            Expression::TemplateLiteral(tpl) => {
                for e in &tpl.expressions {
                    self.collect_replacements_expr(e, shadowed);
                }
            }
            Expression::TaggedTemplateExpression(tagged) => {
                self.collect_replacements_expr(&tagged.tag, shadowed);
                for e in &tagged.quasi.expressions {
                    self.collect_replacements_expr(e, shadowed);
                }
            }
            Expression::AwaitExpression(await_expr) => {
                self.collect_replacements_expr(&await_expr.argument, shadowed);
            }
            Expression::CallExpression(call) => {
                self.collect_replacements_expr(&call.callee, shadowed);
                for arg in &call.arguments {
                    if let Some(e) = arg.as_expression() {
                        self.collect_replacements_expr(e, shadowed);
                    }
                }
            }
            Expression::NewExpression(new_expr) => {
                self.collect_replacements_expr(&new_expr.callee, shadowed);
                for arg in &new_expr.arguments {
                    if let Some(e) = arg.as_expression() {
                        self.collect_replacements_expr(e, shadowed);
                    }
                }
            }
            Expression::ChainExpression(chain) => match &chain.expression {
                ChainElement::CallExpression(call) => {
                    self.collect_replacements_expr(&call.callee, shadowed);
                    for arg in &call.arguments {
                        if let Some(e) = arg.as_expression() {
                            self.collect_replacements_expr(e, shadowed);
                        }
                    }
                }
                ChainElement::StaticMemberExpression(st) => {
                    self.collect_replacements_expr(&st.object, shadowed);
                }
                ChainElement::ComputedMemberExpression(comp) => {
                    self.collect_replacements_expr(&comp.object, shadowed);
                    self.collect_replacements_expr(&comp.expression, shadowed);
                }
                _ => {}
            },
            Expression::ComputedMemberExpression(comp) => {
                self.collect_replacements_expr(&comp.object, shadowed);
                self.collect_replacements_expr(&comp.expression, shadowed);
            }
            Expression::StaticMemberExpression(st) => {
                if let Expression::Identifier(obj_id) = &st.object {
                    if obj_id.name == "props" && !shadowed.iter().any(|s| s == "props") {
                        if let Some(value) = self.values.get(st.property.name.as_str()) {
                            self.replacements.push((st.span.start, st.span.end, value.clone()));
                            return;
                        }
                    }
                }
                self.collect_replacements_expr(&st.object, shadowed);
            }
            Expression::ObjectExpression(obj) => {
                for prop in &obj.properties {
                    match prop {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            if p.shorthand {
                                if let PropertyKey::StaticIdentifier(id) = &p.key {
                                    if let Some(value) = self.lookup(id.name.as_str(), shadowed) {
                                        let replacement = format!("{}: {}", id.name, value);
                                        self.replacements.push((p.span.start, p.span.end, replacement));
                                    }
                                }
                            } else {
                                self.collect_replacements_expr(&p.value, shadowed);
                                if p.computed {
                                    if let Some(e) = p.key.as_expression() {
                                        self.collect_replacements_expr(e, shadowed);
                                    }
                                }
                            }
                        }
                        ObjectPropertyKind::SpreadProperty(s) => {
                            self.collect_replacements_expr(&s.argument, shadowed);
                        }
                    }
                }
            }
            Expression::ArrayExpression(arr) => {
                for elem in &arr.elements {
                    if let Some(e) = elem.as_expression() {
                        self.collect_replacements_expr(e, shadowed);
                    }
                }
            }
            Expression::ArrowFunctionExpression(func) => {
                let mut inner = shadowed.to_vec();
                for param in &func.params.items {
                    collect_binding_pattern(&param.pattern, &mut inner);
                }
                for s in &func.body.statements {
                    self.collect_replacements_stmt(s, &mut inner);
                }
            }
            _ => {}
        }
    }
}
