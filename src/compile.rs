//! Compiler entry points.
//!
//! parse -> lower -> resolve -> validate -> emit, strictly sequential for one
//! file. Batch compiles run files in parallel against one shared, read-only
//! component snapshot.

#[cfg(feature = "napi")]
use napi_derive::napi;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, debug_span};

use crate::codegen::{emit, Binding};
use crate::component::resolve_components;
use crate::discovery::{discover_components, ComponentMap};
use crate::parse::parse_file;
use crate::transform::{lower_fragments, LoweringContext};
use crate::validate::{validate_tree, CompilerError, ExpressionIR, ExpressionRegistry, StyleIR};

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS / RESULT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    /// Directory scanned for component definitions for this compile.
    pub components_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub html: String,
    pub bindings: Vec<Binding>,
    pub styles: Vec<StyleIR>,
    pub script: Option<String>,
    pub expressions: Vec<ExpressionIR>,
    pub used_components: Vec<String>,
    pub errors: Vec<CompilerError>,
}

impl CompileResult {
    pub fn failed(error: CompilerError) -> Self {
        CompileResult {
            errors: vec![error],
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl From<Result<CompileResult, CompilerError>> for CompileResult {
    fn from(result: Result<CompileResult, CompilerError>) -> Self {
        result.unwrap_or_else(CompileResult::failed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile one page, discovering components from `options.components_dir`.
pub fn compile(
    source: &str,
    file_path: &str,
    options: &CompileOptions,
) -> Result<CompileResult, CompilerError> {
    let components = match &options.components_dir {
        Some(dir) => discover_components(Path::new(dir)),
        None => ComponentMap::new(),
    };
    compile_with_components(source, file_path, &components)
}

/// Compile one page against an existing component snapshot.
pub fn compile_with_components(
    source: &str,
    file_path: &str,
    components: &ComponentMap,
) -> Result<CompileResult, CompilerError> {
    let span = debug_span!("compile", file = file_path);
    let _enter = span.enter();

    let mut registry = ExpressionRegistry::new();

    let parsed = parse_file(source, file_path, &mut registry)?;
    debug!(nodes = parsed.nodes.len(), expressions = registry.len(), "parsed");

    let lowered = {
        let mut ctx = LoweringContext::new(&mut registry, file_path);
        lower_fragments(parsed.nodes, &mut ctx)?
    };
    debug!(nodes = lowered.len(), "lowered fragments");

    let resolution = resolve_components(lowered, components, &mut registry, file_path)?;

    validate_tree(
        &resolution.nodes,
        &registry,
        &resolution.scope_expectations,
        file_path,
    )?;

    let output = emit(&resolution.nodes);
    debug!(
        bytes = output.html.len(),
        bindings = output.bindings.len(),
        "emitted"
    );

    let mut styles = parsed.styles;
    styles.extend(resolution.styles);

    let mut scripts: Vec<String> = parsed.script.into_iter().map(|s| s.raw).collect();
    scripts.extend(resolution.scripts.into_iter().map(|s| s.script.raw));
    let script = if scripts.is_empty() {
        None
    } else {
        Some(scripts.join("\n\n"))
    };

    Ok(CompileResult {
        html: output.html,
        bindings: output.bindings,
        styles,
        script,
        expressions: registry.expressions,
        used_components: resolution.used_components,
        errors: vec![],
    })
}

/// Compile many pages in parallel. Results keep the input order.
pub fn compile_batch(pages: &[(String, String)], components: &ComponentMap) -> Vec<CompileResult> {
    pages
        .par_iter()
        .map(|(path, source)| compile_with_components(source, path, components).into())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn compile_native(
    source: String,
    file_path: String,
    options_json: Option<String>,
) -> napi::Result<String> {
    let options: CompileOptions = match options_json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| napi::Error::from_reason(format!("Options parse error: {}", e)))?,
        None => CompileOptions::default(),
    };
    let result: CompileResult = compile(&source, &file_path, &options).into();
    serde_json::to_string(&result)
        .map_err(|e| napi::Error::from_reason(format!("Serialize error: {}", e)))
}

#[cfg(feature = "napi")]
#[napi]
pub fn classify_expression_native(code: String) -> napi::Result<String> {
    let class = crate::classify::classify_expression(&code);
    serde_json::to_string(&class)
        .map_err(|e| napi::Error::from_reason(format!("Serialize error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ComponentMetadata;

    fn components(defs: &[(&str, &str)]) -> ComponentMap {
        defs.iter()
            .map(|(name, src)| {
                let meta =
                    ComponentMetadata::from_source(name, &format!("{}.zen", name), src).unwrap();
                (name.to_string(), meta)
            })
            .collect()
    }

    #[test]
    fn test_compile_static_page() {
        let result = compile("<h1>Hello</h1>", "index.zen", &CompileOptions::default()).unwrap();
        assert_eq!(result.html, "<h1>Hello</h1>");
        assert!(result.bindings.is_empty());
        assert!(result.is_ok());
    }

    #[test]
    fn test_scripts_and_styles_merged() {
        let map = components(&[(
            "Counter",
            "<script>state count = 0</script><style>.c{}</style><button class=\"c\">{count}</button>",
        )]);
        let src = "<script>const page = 1</script><style>h1{}</style><Counter /><Counter />";
        let result = compile_with_components(src, "index.zen", &map).unwrap();
        assert_eq!(result.styles.len(), 2);
        let script = result.script.unwrap();
        assert!(script.contains("const page = 1"));
        assert_eq!(script.matches("state count = 0").count(), 1);
        assert_eq!(result.used_components, vec!["Counter".to_string()]);
    }

    #[test]
    fn test_error_folds_into_result() {
        let map = ComponentMap::new();
        let result: CompileResult = compile_with_components("<Nope />", "index.zen", &map).into();
        assert!(!result.is_ok());
        assert!(result.html.is_empty());
        assert_eq!(result.errors[0].code, crate::validate::ERR_UNDEFINED_COMPONENT);
    }

    #[test]
    fn test_compile_batch_keeps_order() {
        let map = components(&[("Tag", "<em><slot /></em>")]);
        let pages = vec![
            ("a.zen".to_string(), "<Tag>a</Tag>".to_string()),
            ("b.zen".to_string(), "<Missing />".to_string()),
            ("c.zen".to_string(), "<p>{c}</p>".to_string()),
        ];
        let results = compile_batch(&pages, &map);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].html, "<em>a</em>");
        assert!(!results[1].is_ok());
        assert!(results[2].html.contains("data-zen-text"));
    }
}
