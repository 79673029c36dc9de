#[cfg(test)]
mod tests {
    use crate::*;

    fn mock_loc() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    fn scope(vars: &[&str]) -> Option<LoopContext> {
        Some(LoopContext {
            variables: vars.iter().map(|v| v.to_string()).collect(),
            map_source: None,
        })
    }

    #[test]
    fn test_registry_remove_keeps_lookup_valid() {
        let mut registry = ExpressionRegistry::new();
        let a = registry.register("expr", "a", mock_loc(), None);
        let b = registry.register("expr", "b", mock_loc(), None);
        let c = registry.register("expr", "c", mock_loc(), None);

        registry.remove(&b);
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(&b));
        assert_eq!(registry.get(&a).unwrap().code, "a");
        assert_eq!(registry.get(&c).unwrap().code, "c");

        // Ids are never reused after removal.
        let d = registry.register("cond", "d", mock_loc(), None);
        assert_eq!(d, "cond_3");
    }

    #[test]
    fn test_registry_updates() {
        let mut registry = ExpressionRegistry::new();
        let id = registry.register("expr", "label", mock_loc(), None);
        registry.update_code(&id, "(\"Save\")");
        registry.update_scope(&id, &scope(&["item"]));
        let expr = registry.get(&id).unwrap();
        assert_eq!(expr.code, "(\"Save\")");
        assert_eq!(scope_variables(&expr.loop_context), ["item".to_string()]);

        // Unknown ids are ignored.
        registry.update_code("expr_99", "x");
        registry.remove("expr_99");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_serializes_expressions_only() {
        let mut registry = ExpressionRegistry::new();
        registry.register("expr", "count", SourceLocation::new(2, 4), scope(&["row"]));
        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(json["expressions"][0]["id"], "expr_0");
        assert_eq!(json["expressions"][0]["location"]["line"], 2);
        assert_eq!(json["expressions"][0]["loopContext"]["variables"][0], "row");
        assert!(json.get("next").is_none());
    }

    #[test]
    fn test_comparison_is_not_markup() {
        let class = classify_expression("count < limit ? \"low\" : \"high\"");
        assert_eq!(class.expr_type, ExpressionOutputType::Primitive);
    }

    #[test]
    fn test_optional_chained_map() {
        let class = classify_expression("list?.map(entry => <li>{entry}</li>)");
        assert_eq!(class.expr_type, ExpressionOutputType::Loop);
        assert_eq!(class.loop_source.as_deref(), Some("list"));
        assert_eq!(class.loop_item_var.as_deref(), Some("entry"));
    }

    #[test]
    fn test_nullish_with_markup_is_unknown() {
        let class = classify_expression("title ?? <em>Untitled</em>");
        assert_eq!(class.expr_type, ExpressionOutputType::Unknown);
    }

    #[test]
    fn test_shape_offsets_point_into_source() {
        let code = "(  flag && <b>on</b> )";
        match analyze_expression(code) {
            ExpressionShape::Optional { condition, fragment } => {
                assert_eq!(&code[condition.offset..condition.offset + 4], "flag");
                assert_eq!(&code[fragment.offset..fragment.offset + 3], "<b>");
            }
            other => panic!("expected optional, got {:?}", other),
        }
    }

    #[test]
    fn test_error_serialization() {
        let err = CompilerError::at(INV_NON_ENUMERABLE_JSX, "bad", "page.zen", &SourceLocation::new(4, 2))
            .with_context("a || <b/>")
            .with_hint("Use a ternary");
        assert_eq!(err.kind, ErrorKind::Lowering);
        assert_eq!(err.to_string(), "page.zen:4:2: [INV008] bad");

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "LOWERING");
        assert_eq!(json["context"], "a || <b/>");
        assert_eq!(json["hints"][0], "Use a ternary");
        assert!(!json["guarantee"].as_str().unwrap().is_empty());
    }
}
