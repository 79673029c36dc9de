//! Discovery Module for Zenith Compiler
//!
//! Recursively scans a directory for `.zen` component definitions and parses
//! each one into [`ComponentMetadata`]. The resulting [`ComponentMap`] is an
//! immutable snapshot shared by every compile that uses it.

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::component::DEFAULT_SLOT;
use crate::parse::parse_file;
use crate::validate::{
    CompilerError, ExpressionRegistry, ScriptIR, StyleIR, TemplateNode, ERR_PARSE,
};

lazy_static! {
    /// `prop title` declarations inside a component script
    static ref PROP_DECL_RE: Regex = Regex::new(r"\bprop\s+([A-Za-z_$][\w$]*)").unwrap();
    /// Named slots written inside expression markup, e.g. in a `.map` body
    static ref SLOT_IN_CODE_RE: Regex =
        Regex::new(r#"<slot\b[^>]*?\bname\s*=\s*["']([^"']+)["']"#).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetadata {
    pub name: String,
    pub path: String,
    /// Parsed, unlowered template. Copied for every usage, never mutated.
    pub nodes: Vec<TemplateNode>,
    /// Lowercased slot names, `default` always included.
    pub slots: Vec<String>,
    pub props: Vec<String>,
    pub styles: Vec<StyleIR>,
    pub script: Option<ScriptIR>,
}

impl ComponentMetadata {
    pub fn from_source(name: &str, path: &str, source: &str) -> Result<Self, CompilerError> {
        let mut registry = ExpressionRegistry::new();
        let parsed = parse_file(source, path, &mut registry)?;

        let mut slots = vec![DEFAULT_SLOT.to_string()];
        collect_slot_names(&parsed.nodes, &mut slots);

        let props = parsed
            .script
            .as_ref()
            .map(extract_props)
            .unwrap_or_default();

        Ok(ComponentMetadata {
            name: name.to_string(),
            path: path.to_string(),
            nodes: parsed.nodes,
            slots,
            props,
            styles: parsed.styles,
            script: parsed.script,
        })
    }

    pub fn has_script(&self) -> bool {
        self.script.is_some()
    }
}

pub type ComponentMap = HashMap<String, ComponentMetadata>;

fn collect_slot_names(nodes: &[TemplateNode], slots: &mut Vec<String>) {
    fn add(name: &str, slots: &mut Vec<String>) {
        let name = name.to_lowercase();
        if !slots.contains(&name) {
            slots.push(name);
        }
    }
    for node in nodes {
        match node {
            TemplateNode::Element(e) if e.tag == "slot" => {
                if let Some(name) = e.static_attribute("name") {
                    add(name, slots);
                }
            }
            TemplateNode::Expression(e) => {
                for cap in SLOT_IN_CODE_RE.captures_iter(&e.code) {
                    add(&cap[1], slots);
                }
            }
            _ => {}
        }
        for list in node.child_lists() {
            collect_slot_names(list, slots);
        }
    }
}

/// Props from `<script props="a, b">` and `prop name` declarations.
fn extract_props(script: &ScriptIR) -> Vec<String> {
    let mut props: Vec<String> = script
        .attributes
        .get("props")
        .map(|p| {
            p.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    for cap in PROP_DECL_RE.captures_iter(&script.raw) {
        let name = cap[1].to_string();
        if !props.contains(&name) {
            props.push(name);
        }
    }
    props
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Discover all components under `base_dir`. Files that fail to parse are
/// logged and skipped; a later usage then reports the component as undefined.
pub fn discover_components(base_dir: &Path) -> ComponentMap {
    if !base_dir.exists() {
        debug!(dir = %base_dir.display(), "components directory does not exist");
        return ComponentMap::new();
    }

    let files = find_zen_files(base_dir);
    let parsed: Vec<(PathBuf, Result<ComponentMetadata, CompilerError>)> = files
        .into_par_iter()
        .map(|path| {
            let result = parse_component_file(&path);
            (path, result)
        })
        .collect();

    let mut components = ComponentMap::new();
    for (path, result) in parsed {
        match result {
            Ok(metadata) => {
                components.insert(metadata.name.clone(), metadata);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse component");
            }
        }
    }
    debug!(count = components.len(), "discovered components");
    components
}

/// Recursively find all .zen files in a directory, sorted for stable output
pub fn find_zen_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "zen"))
        .collect();
    files.sort();
    files
}

/// Component name is the file stem: `components/ui/Card.zen` defines `Card`.
pub fn component_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// Parse a component file and extract metadata
pub fn parse_component_file(file_path: &Path) -> Result<ComponentMetadata, CompilerError> {
    let path_str = file_path.to_string_lossy().to_string();
    let source = fs::read_to_string(file_path).map_err(|e| {
        CompilerError::new(ERR_PARSE, &format!("Failed to read file: {}", e), &path_str, 1, 1)
    })?;
    let name = component_name(file_path)
        .ok_or_else(|| CompilerError::new(ERR_PARSE, "Invalid filename", &path_str, 1, 1))?;
    ComponentMetadata::from_source(&name, &path_str, &source)
}
