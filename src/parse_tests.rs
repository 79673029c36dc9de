#[cfg(test)]
mod tests {
    use crate::parse::parse_file;
    use crate::validate::{
        AttributeValue, ExpressionRegistry, SourceLocation, TemplateNode, ERR_PARSE,
    };

    fn parse(src: &str) -> (Vec<TemplateNode>, ExpressionRegistry) {
        let mut registry = ExpressionRegistry::new();
        let parsed = parse_file(src, "test.zen", &mut registry).unwrap();
        (parsed.nodes, registry)
    }

    #[test]
    fn test_multi_script_extraction() {
        let html = r#"
            <script setup>
                const x = 1;
            </script>
            <div></div>
            <script>
                console.log(x);
            </script>
        "#;
        let mut registry = ExpressionRegistry::new();
        let parsed = parse_file(html, "test.zen", &mut registry).unwrap();
        let script = parsed.script.unwrap();
        assert!(script.raw.contains("const x = 1;"));
        assert!(script.raw.contains("console.log(x);"));
        // Ensure we didn't capture the div
        assert!(!script.raw.contains("<div></div>"));
        assert_eq!(parsed.nodes.len(), 1);
    }

    #[test]
    fn test_ignore_inline_script() {
        let html = r#"<script is:inline>console.log('inline');</script><script setup>const a = 1;</script>"#;
        let mut registry = ExpressionRegistry::new();
        let parsed = parse_file(html, "test.zen", &mut registry).unwrap();
        let script = parsed.script.unwrap();
        assert!(script.raw.contains("const a = 1;"));
        assert!(!script.raw.contains("inline"));
        assert!(matches!(&parsed.nodes[0], TemplateNode::Element(e) if e.tag == "script"));
    }

    #[test]
    fn test_element_and_expression_locations() {
        let (nodes, registry) = parse("<main>\n  <h1 class=\"t\">{title}</h1>\n</main>");
        let TemplateNode::Element(main) = &nodes[0] else {
            panic!("expected main");
        };
        assert_eq!(main.location, SourceLocation::new(1, 1));
        let TemplateNode::Element(h1) = &main.children[0] else {
            panic!("expected h1, got {:?}", main.children);
        };
        assert_eq!(h1.location, SourceLocation::new(2, 3));
        let TemplateNode::Expression(title) = &h1.children[0] else {
            panic!("expected expression");
        };
        assert_eq!(title.location, SourceLocation::new(2, 18));
        assert_eq!(registry.get(&title.id).unwrap().code, "title");
    }

    #[test]
    fn test_mixed_attribute_becomes_template_literal() {
        let (nodes, _) = parse("<div class=\"card {variant} `x`\"></div>");
        let TemplateNode::Element(div) = &nodes[0] else {
            panic!("expected div");
        };
        let AttributeValue::Dynamic(expr) = &div.attribute("class").unwrap().value else {
            panic!("expected dynamic class");
        };
        assert_eq!(expr.code, "`card ${variant} \\`x\\``");
    }

    #[test]
    fn test_whole_attribute_expression() {
        let (nodes, registry) = parse("<img src={user.avatar} alt=\"\">");
        let TemplateNode::Element(img) = &nodes[0] else {
            panic!("expected img");
        };
        let AttributeValue::Dynamic(expr) = &img.attribute("src").unwrap().value else {
            panic!("expected dynamic src");
        };
        assert_eq!(expr.code, "user.avatar");
        assert_eq!(expr.location, SourceLocation::new(1, 11));
        assert!(registry.contains(&expr.id));
        assert_eq!(img.static_attribute("alt"), Some(""));
    }

    #[test]
    fn test_component_names_keep_case() {
        let (nodes, _) = parse("<Table><Table.Row>x</Table.Row></Table><Input />");
        let TemplateNode::Component(table) = &nodes[0] else {
            panic!("expected Table component, got {:?}", nodes[0]);
        };
        assert_eq!(table.name, "Table");
        assert!(matches!(&table.children[0], TemplateNode::Component(c) if c.name == "Table.Row"));
        assert!(matches!(&nodes[1], TemplateNode::Component(c) if c.name == "Input"));
    }

    #[test]
    fn test_self_closing_slot_does_not_swallow_siblings() {
        let (nodes, _) = parse("<div><slot name=\"header\" /><p>body</p></div>");
        let TemplateNode::Element(div) = &nodes[0] else {
            panic!("expected div");
        };
        assert_eq!(div.children.len(), 2);
        assert!(matches!(&div.children[0], TemplateNode::Element(e) if e.tag == "slot" && e.children.is_empty()));
    }

    #[test]
    fn test_expression_in_table_context() {
        let (nodes, _) = parse("<table><tbody><tr>{rows}</tr></tbody></table>");
        let TemplateNode::Element(table) = &nodes[0] else {
            panic!("expected table");
        };
        let TemplateNode::Element(tbody) = &table.children[0] else {
            panic!("expected tbody");
        };
        let TemplateNode::Element(tr) = &tbody.children[0] else {
            panic!("expected tr");
        };
        assert!(matches!(&tr.children[0], TemplateNode::Expression(e) if e.code == "rows"));
    }

    #[test]
    fn test_full_document_keeps_doctype() {
        let (nodes, _) =
            parse("<!DOCTYPE html>\n<html lang=\"en\"><head><title>T</title></head><body><p>x</p></body></html>");
        assert!(matches!(&nodes[0], TemplateNode::Doctype(d) if d.name == "html"));
        assert!(matches!(&nodes[1], TemplateNode::Element(e) if e.tag == "html"));
    }

    #[test]
    fn test_formatting_whitespace_dropped() {
        let (nodes, _) = parse("<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>");
        let TemplateNode::Element(ul) = &nodes[0] else {
            panic!("expected ul");
        };
        assert_eq!(ul.children.len(), 2);
    }

    #[test]
    fn test_inline_space_kept() {
        let (nodes, _) = parse("<p>{first} {last}</p>");
        let TemplateNode::Element(p) = &nodes[0] else {
            panic!("expected p");
        };
        assert_eq!(p.children.len(), 3);
        assert!(matches!(&p.children[1], TemplateNode::Text(t) if t.value == " "));
    }

    #[test]
    fn test_empty_and_comment_expressions_dropped() {
        let (nodes, registry) = parse("<p>{}{/* note */}x</p>");
        let TemplateNode::Element(p) = &nodes[0] else {
            panic!("expected p");
        };
        assert_eq!(p.children.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unterminated_attribute_expression() {
        let mut registry = ExpressionRegistry::new();
        let err = parse_file("<a href={url>x</a>", "bad.zen", &mut registry).unwrap_err();
        assert_eq!(err.code, ERR_PARSE);
        assert_eq!(err.file, "bad.zen");
    }

    #[test]
    fn test_markup_inside_expression_is_one_expression() {
        let (nodes, _) = parse("<ul>{items.map(i => <li class=\"x\">{i}</li>)}</ul>");
        let TemplateNode::Element(ul) = &nodes[0] else {
            panic!("expected ul");
        };
        assert_eq!(ul.children.len(), 1);
        assert!(
            matches!(&ul.children[0], TemplateNode::Expression(e) if e.code == "items.map(i => <li class=\"x\">{i}</li>)")
        );
    }
}
