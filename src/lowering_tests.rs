#[cfg(test)]
mod tests {
    use crate::parse::parse_file;
    use crate::transform::{lower_fragments, LoweringContext};
    use crate::validate::{
        CompilerError, ExpressionRegistry, SourceLocation, TemplateNode, INV_NON_ENUMERABLE_JSX,
    };

    fn lower_source(src: &str) -> (Result<Vec<TemplateNode>, CompilerError>, ExpressionRegistry) {
        let mut registry = ExpressionRegistry::new();
        let parsed = parse_file(src, "test.zen", &mut registry).unwrap();
        let result = {
            let mut ctx = LoweringContext::new(&mut registry, "test.zen");
            lower_fragments(parsed.nodes, &mut ctx)
        };
        (result, registry)
    }

    fn first_child(node: &TemplateNode) -> &TemplateNode {
        match node {
            TemplateNode::Element(e) => &e.children[0],
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional_lowering() {
        let (res, _) = lower_source("<div>{isActive ? <div>Active</div> : <span>Inactive</span>}</div>");
        let nodes = res.unwrap();
        let json = serde_json::to_value(&nodes).unwrap();

        let cond = &json[0]["children"][0];
        assert_eq!(cond["type"], "conditional-fragment");
        assert_eq!(cond["condition"], "isActive");
        assert_eq!(cond["consequent"][0]["type"], "element");
        assert_eq!(cond["consequent"][0]["tag"], "div");
        assert_eq!(cond["alternate"][0]["tag"], "span");
        assert_eq!(cond["alternate"][0]["children"][0]["type"], "text");
    }

    #[test]
    fn test_loop_lowering_json() {
        let (res, _) = lower_source("<ul>{items.map((item, index) => <li>{item.name}</li>)}</ul>");
        let json = serde_json::to_value(&res.unwrap()).unwrap();

        let lp = &json[0]["children"][0];
        assert_eq!(lp["type"], "loop-fragment");
        assert_eq!(lp["source"], "items");
        assert_eq!(lp["itemVar"], "item");
        assert_eq!(lp["indexVar"], "index");
        assert_eq!(lp["body"][0]["tag"], "li");
        assert_eq!(lp["body"][0]["children"][0]["type"], "expression");
        assert_eq!(lp["body"][0]["loopContext"]["variables"][1], "index");
    }

    #[test]
    fn test_optional_lowering_json() {
        let (res, _) = lower_source("<nav>{user && <a href=\"/me\">Me</a>}</nav>");
        let json = serde_json::to_value(&res.unwrap()).unwrap();
        let opt = &json[0]["children"][0];
        assert_eq!(opt["type"], "optional-fragment");
        assert_eq!(opt["condition"], "user");
        assert_eq!(opt["fragment"][0]["attributes"][0]["value"], "/me");
    }

    #[test]
    fn test_loop_body_location_tracks_source() {
        let (res, _) = lower_source("<ul>\n  {items.map(item => <li>{item}</li>)}\n</ul>");
        let nodes = res.unwrap();
        let TemplateNode::LoopFragment(lp) = first_child(&nodes[0]) else {
            panic!("expected loop");
        };
        assert_eq!(lp.location, SourceLocation::new(2, 4));
        let TemplateNode::Element(li) = &lp.body[0] else {
            panic!("expected li");
        };
        assert_eq!(li.location, SourceLocation::new(2, 22));
    }

    #[test]
    fn test_nested_ternary_lowered_recursively() {
        let (res, _) = lower_source("<p>{a ? b ? <i>1</i> : <b>2</b> : <u>3</u>}</p>");
        let nodes = res.unwrap();
        let TemplateNode::ConditionalFragment(outer) = first_child(&nodes[0]) else {
            panic!("expected conditional");
        };
        let TemplateNode::ConditionalFragment(inner) = &outer.consequent[0] else {
            panic!("expected nested conditional, got {:?}", outer.consequent);
        };
        assert_eq!(inner.condition, "b");
        assert_ne!(inner.id, outer.id);
    }

    #[test]
    fn test_conditional_inside_loop_inherits_scope() {
        let (res, registry) =
            lower_source("<ul>{todos.map(todo => <li>{todo.done ? <s>{todo.text}</s> : <span>{todo.text}</span>}</li>)}</ul>");
        let nodes = res.unwrap();
        let TemplateNode::LoopFragment(lp) = first_child(&nodes[0]) else {
            panic!("expected loop");
        };
        let TemplateNode::ConditionalFragment(cf) = first_child(&lp.body[0]) else {
            panic!("expected conditional in loop body");
        };
        let scope = cf.loop_context.as_ref().unwrap();
        assert_eq!(scope.variables, vec!["todo".to_string()]);
        assert_eq!(
            registry.get(&cf.id).unwrap().loop_context.as_ref().unwrap().variables,
            vec!["todo".to_string()]
        );
        let TemplateNode::Expression(text) = first_child(&cf.alternate[0]) else {
            panic!("expected expression");
        };
        assert!(text.loop_context.as_ref().unwrap().contains_all(&["todo".to_string()]));
    }

    #[test]
    fn test_lowered_ids_replace_source_ids() {
        let (res, registry) = lower_source("<div>{ok ? <b>y</b> : null}{count}</div>");
        let nodes = res.unwrap();
        let TemplateNode::Element(div) = &nodes[0] else {
            panic!("expected div");
        };
        let ids: Vec<&str> = div
            .children
            .iter()
            .map(|c| match c {
                TemplateNode::ConditionalFragment(cf) => cf.id.as_str(),
                TemplateNode::Expression(e) => e.id.as_str(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(registry.len(), 2);
        assert!(ids.iter().all(|id| registry.contains(id)));
    }

    #[test]
    fn test_unquoted_non_ascii_attribute_in_branch() {
        let (res, _) = lower_source("<div>{ok ? <p title=h\u{e9}llo>x</p> : null}</div>");
        let json = serde_json::to_value(&res.unwrap()).unwrap();
        let p = &json[0]["children"][0]["consequent"][0];
        assert_eq!(p["tag"], "p");
        assert_eq!(p["attributes"][0]["name"], "title");
        assert_eq!(p["attributes"][0]["value"], "h\u{e9}llo");
        assert_eq!(p["children"][0]["value"], "x");
    }

    #[test]
    fn test_unquoted_value_before_self_closing() {
        let (res, _) = lower_source("<div>{ok && <img alt=caf\u{e9}/>}</div>");
        let json = serde_json::to_value(&res.unwrap()).unwrap();
        let img = &json[0]["children"][0]["fragment"][0];
        assert_eq!(img["tag"], "img");
        assert_eq!(img["attributes"][0]["value"], "caf\u{e9}");
    }

    #[test]
    fn test_branch_text_and_attributes_decoded() {
        let (res, _) = lower_source("<div>{ok ? <p title=\"a &amp; b\">Tom &amp; Jerry</p> : null}</div>");
        let json = serde_json::to_value(&res.unwrap()).unwrap();
        let p = &json[0]["children"][0]["consequent"][0];
        assert_eq!(p["attributes"][0]["value"], "a & b");
        assert_eq!(p["children"][0]["value"], "Tom & Jerry");
    }

    #[test]
    fn test_static_tree_untouched() {
        let (res, registry) = lower_source("<section><h2>Title</h2><p>Body</p></section>");
        let json = serde_json::to_value(&res.unwrap()).unwrap();
        assert_eq!(json[0]["children"].as_array().unwrap().len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_non_enumerable_reports_source_location() {
        let (res, _) = lower_source("<div>\n  <p>{items.length > 0 || <i>none</i>}</p>\n</div>");
        let err = res.unwrap_err();
        assert_eq!(err.code, INV_NON_ENUMERABLE_JSX);
        assert_eq!((err.line, err.column), (2, 7));
        assert_eq!(err.file, "test.zen");
        assert!(!err.hints.is_empty());
    }
}
