//! # Zenith Template Compiler
//!
//! Compiles `.zen` templates into static markup plus a binding list that the
//! browser runtime hydrates without interpreting any expression into DOM.
//!
//! ## Pipeline
//!
//! 1. **parse**: source -> template nodes, hoisted `<script>`/`<style>`, expression registry
//! 2. **transform**: every expression that yields markup becomes a conditional,
//!    optional or loop fragment (or an inline fragment) whose DOM shapes are all known
//! 3. **component**: component usages are inlined; slot content keeps the reactive
//!    scope it was written in
//! 4. **validate**: structural invariants are checked; any violation fails the compile
//! 5. **codegen**: markup with hydration markers plus bindings sorted by source location
//!
//! ## Invariants
//!
//! - Output is deterministic: ids come from a counter owned by each compile.
//! - Reactive scope only ever widens during slot projection.
//! - Every component usage gets an independent copy of the definition tree.
//! - Markup-producing expressions are statically enumerable or the compile fails.

mod cache;
mod classify;
mod codegen;
mod compile;
mod component;
mod discovery;
mod lexer;
mod parse;
mod transform;
mod validate;

#[cfg(test)]
mod expression_tests;
#[cfg(test)]
mod lowering_tests;
#[cfg(test)]
mod parse_tests;
#[cfg(test)]
mod safety_tests;

pub use cache::{ComponentCache, RefreshStats};
pub use classify::{
    analyze_expression, classify_expression, ExpressionClassification, ExpressionOutputType,
    ExpressionShape,
};
pub use codegen::{emit, Binding, BindingKind, EmitOutput, LoopMetadata};
pub use compile::{compile, compile_batch, compile_with_components, CompileOptions, CompileResult};
pub use component::{resolve_components, ComponentScript, Resolution};
pub use discovery::{discover_components, parse_component_file, ComponentMap, ComponentMetadata};
pub use lexer::{Token, TokenKind};
pub use parse::{parse_file, ParsedFile};
pub use transform::{lower_fragments, LoweringContext};
pub use validate::*;

#[cfg(feature = "napi")]
pub use compile::{classify_expression_native, compile_native};
