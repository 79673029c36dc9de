#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::codegen::BindingKind;
    use crate::compile::{compile_with_components, CompileResult};
    use crate::component::resolve_components;
    use crate::discovery::{ComponentMap, ComponentMetadata};
    use crate::parse::parse_file;
    use crate::transform::{lower_fragments, LoweringContext};
    use crate::validate::{ErrorKind, ExpressionRegistry, INV_NON_ENUMERABLE_JSX};

    const PAGE: &str = r#"<script>state items = []</script>
<Layout title="Todos">
  <Layout.Header><h1>{heading}</h1></Layout.Header>
  <ul>
    {items.map((item, i) => <li class={item.done ? "done" : ""}>{i}: {item.text}</li>)}
  </ul>
  {loading ? <Spinner /> : <p>Ready</p>}
  {error && <p class="error">{error}</p>}
</Layout>"#;

    fn components() -> ComponentMap {
        [
            (
                "Layout",
                "<script>prop title</script><main><header><slot name=\"header\" /></header><h2>{title}</h2><slot /></main>",
            ),
            ("Spinner", "<div class=\"spinner\"></div>"),
        ]
        .iter()
        .map(|(name, src)| {
            let meta = ComponentMetadata::from_source(name, &format!("{}.zen", name), src).unwrap();
            (name.to_string(), meta)
        })
        .collect()
    }

    fn compile_page() -> CompileResult {
        compile_with_components(PAGE, "todos.zen", &components()).unwrap()
    }

    #[test]
    fn test_output_is_deterministic() {
        let first = serde_json::to_string(&compile_page()).unwrap();
        for _ in 0..5 {
            assert_eq!(serde_json::to_string(&compile_page()).unwrap(), first);
        }
    }

    #[test]
    fn test_no_component_or_slot_nodes_survive() {
        let map = components();
        let mut registry = ExpressionRegistry::new();
        let parsed = parse_file(PAGE, "todos.zen", &mut registry).unwrap();
        let lowered = {
            let mut ctx = LoweringContext::new(&mut registry, "todos.zen");
            lower_fragments(parsed.nodes, &mut ctx).unwrap()
        };
        let resolution = resolve_components(lowered, &map, &mut registry, "todos.zen").unwrap();
        let json = serde_json::to_string(&resolution.nodes).unwrap();
        assert!(!json.contains("\"type\":\"component\""));
        assert!(!json.contains("\"tag\":\"slot\""));
        assert_eq!(
            resolution.used_components,
            vec!["Layout".to_string(), "Spinner".to_string()]
        );
    }

    #[test]
    fn test_bindings_registered_and_unique() {
        let result = compile_page();
        let registered: HashSet<&str> = result.expressions.iter().map(|e| e.id.as_str()).collect();
        let mut seen = HashSet::new();
        for binding in &result.bindings {
            assert!(registered.contains(binding.id.as_str()), "unregistered {}", binding.id);
            assert!(seen.insert(binding.id.as_str()), "duplicate {}", binding.id);
        }
    }

    #[test]
    fn test_bindings_sorted_by_location() {
        let result = compile_page();
        let locations: Vec<_> = result
            .bindings
            .iter()
            .map(|b| (b.location.line, b.location.column))
            .collect();
        let mut sorted = locations.clone();
        sorted.sort();
        assert_eq!(locations, sorted);
    }

    #[test]
    fn test_conditional_emits_both_branches() {
        let result = compile_with_components(
            "<div>{ok ? <span>Yes</span> : <span>No</span>}</div>",
            "page.zen",
            &ComponentMap::new(),
        )
        .unwrap();
        assert!(result.html.contains("<span>Yes</span>"));
        assert!(result.html.contains("<span>No</span>"));
        assert_eq!(result.html.matches("display: none;").count(), 1);
        let conditionals: Vec<_> = result
            .bindings
            .iter()
            .filter(|b| b.kind == BindingKind::Conditional)
            .collect();
        assert_eq!(conditionals.len(), 1);
        assert_eq!(conditionals[0].expression, "ok");
    }

    #[test]
    fn test_loop_metadata() {
        let result = compile_page();
        let lp = result
            .bindings
            .iter()
            .find(|b| b.kind == BindingKind::Loop)
            .unwrap();
        assert_eq!(lp.expression, "items");
        let meta = lp.loop_meta.as_ref().unwrap();
        assert_eq!(meta.item_var, "item");
        assert_eq!(meta.index_var.as_deref(), Some("i"));
        assert!(meta.body_html.starts_with("<li"));

        let class = result
            .bindings
            .iter()
            .find(|b| b.kind == BindingKind::Attribute && b.target.as_deref() == Some("class"))
            .unwrap();
        assert!(class.loop_context.as_ref().unwrap().variables.contains(&"item".to_string()));
    }

    #[test]
    fn test_prop_and_slot_projection() {
        let result = compile_page();
        assert!(result
            .html
            .starts_with("<main data-zen-component=\"Layout\"><header><h1>"));
        assert!(result.bindings.iter().any(|b| b.expression == "\"Todos\""));
        assert!(result.bindings.iter().any(|b| b.expression == "heading"));
        assert!(result.html.contains("<div class=\"spinner\"></div>"));
    }

    #[test]
    fn test_mixed_ternary_is_conditional() {
        let result = compile_with_components(
            "<p>{user ? <b>{user.name}</b> : \"Guest\"}</p>",
            "page.zen",
            &ComponentMap::new(),
        )
        .unwrap();
        assert!(result.bindings.iter().any(|b| b.kind == BindingKind::Conditional));
        assert!(result
            .bindings
            .iter()
            .any(|b| b.kind == BindingKind::Text && b.expression == "\"Guest\""));
    }

    #[test]
    fn test_branch_entities_render_like_top_level() {
        let result = compile_with_components(
            "<div>{ok ? <p title=\"a &amp; b\">Tom &amp; Jerry</p> : null}</div><p title=\"a &amp; b\">Tom &amp; Jerry</p>",
            "page.zen",
            &ComponentMap::new(),
        )
        .unwrap();
        assert_eq!(
            result.html.matches("<p title=\"a &amp; b\">Tom &amp; Jerry</p>").count(),
            2,
            "{}",
            result.html
        );
        assert!(!result.html.contains("&amp;amp;"));
    }

    #[test]
    fn test_non_enumerable_markup_fails_compile() {
        let err = compile_with_components(
            "<div>{a || <b>x</b>}</div>",
            "page.zen",
            &ComponentMap::new(),
        )
        .unwrap_err();
        assert_eq!(err.code, INV_NON_ENUMERABLE_JSX);
        assert_eq!(err.kind, ErrorKind::Lowering);
        assert_eq!(err.file, "page.zen");
    }
}
