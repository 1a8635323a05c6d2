//! Shader source composition
//!
//! Programs are assembled from reusable WGSL fragments with two textual passes:
//!
//! - `#include <name>` (or `#include "name"`) splices a registered fragment in
//!   place of the directive, wherever it sits on its line. Each fragment is inserted at most once per
//!   composition; an include that refers back to a fragment still being
//!   expanded is a cycle and fails, as does an include of an unknown fragment.
//! - `#ifdef NAME` / `#ifndef NAME` / `#else` / `#endif` keep or drop lines
//!   depending on the variant defines of the program being built.
//!
//! ```
//! use cge_renderer::shader::ShaderLibrary;
//!
//! let library = ShaderLibrary::empty().with_fragment("pi", "const PI: f32 = 3.14159;\n");
//! let source = library.compose("#include <pi>\nfn half_pi() -> f32 { return PI * 0.5; }\n")?;
//! assert!(source.starts_with("const PI"));
//! # Ok::<(), cge_renderer::shader::ComposeError>(())
//! ```

pub mod library;

use crate::resources::Semantic;
use bitflags::bitflags;
use std::collections::HashSet;
use thiserror::Error;

pub use library::ShaderLibrary;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("Include not found: <{name}> (from {chain})")]
    MissingFragment { name: String, chain: String },
    #[error("Include cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("Malformed directive on line {line}: {text}")]
    Malformed { line: usize, text: String },
    #[error("Unbalanced conditional: {0}")]
    UnbalancedConditional(String),
    #[error("Unsupported conditional on line {line}: {text}")]
    UnsupportedConditional { line: usize, text: String },
    #[error("Unknown technique: {0}")]
    UnknownTechnique(String),
    #[error("Technique '{0}' has no deferred variant")]
    MissingDeferred(String),
}

bitflags! {
    /// Compile-time switches selecting among preprocessed versions of a technique
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct VariantFlags: u32 {
        const ALPHA_TEST = 1 << 0;
        const DEFERRED = 1 << 1;
        const SKINNING = 1 << 2;
        const SHADOW_MAP = 1 << 3;
    }
}

impl Default for VariantFlags {
    fn default() -> Self {
        Self::NONE
    }
}

impl VariantFlags {
    pub const NONE: Self = Self::empty();

    /// Preprocessor defines for the set flags, named after the flags themselves
    pub fn defines(&self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

/// A vertex/fragment source pair before composition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub vert: String,
    pub frag: String,
}

impl ProgramSource {
    pub fn new(vert: impl Into<String>, frag: impl Into<String>) -> Self {
        Self {
            vert: vert.into(),
            frag: frag.into(),
        }
    }
}

/// A named shading approach
#[derive(Debug, Clone)]
pub struct Technique {
    pub name: String,
    pub forward: ProgramSource,
    /// Used when the program is built with `DEFERRED`
    pub deferred: Option<ProgramSource>,
    /// Material texture slots, bound in order after the material uniform
    pub texture_slots: Vec<String>,
    /// Vertex semantics the vertex stage reads
    pub inputs: Vec<Semantic>,
}

impl Technique {
    pub fn new(name: &str, forward: ProgramSource) -> Self {
        Self {
            name: name.to_string(),
            forward,
            deferred: None,
            texture_slots: Vec::new(),
            inputs: Vec::new(),
        }
    }

    pub fn with_deferred(mut self, deferred: ProgramSource) -> Self {
        self.deferred = Some(deferred);
        self
    }

    pub fn with_texture_slots(mut self, slots: &[&str]) -> Self {
        self.texture_slots = slots.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_inputs(mut self, inputs: &[Semantic]) -> Self {
        self.inputs = inputs.to_vec();
        self
    }

    /// Inputs read by the program built with `variants`
    pub fn required_inputs(&self, variants: VariantFlags) -> Vec<Semantic> {
        let mut inputs = self.inputs.clone();
        let mut require = |semantic| {
            if !inputs.contains(&semantic) {
                inputs.push(semantic);
            }
        };
        if variants.contains(VariantFlags::ALPHA_TEST) {
            require(Semantic::Texcoord0);
        }
        if variants.contains(VariantFlags::SKINNING) {
            require(Semantic::SkinIndex);
            require(Semantic::SkinWeight);
        }
        inputs
    }
}

/// Cache key of a built program
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramKey {
    pub technique: String,
    pub variants: VariantFlags,
}

impl ProgramKey {
    pub fn new(technique: &str, variants: VariantFlags) -> Self {
        Self {
            technique: technique.to_string(),
            variants,
        }
    }
}

/// Final vertex and fragment sources of one program key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedProgram {
    pub key: ProgramKey,
    pub vertex: String,
    pub fragment: String,
}

/// Parse a directive at the start of `text`, returning the fragment name and
/// whatever follows the closing delimiter.
fn parse_include_directive(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("#include")?.trim_start();
    let close = match rest.chars().next()? {
        '<' => '>',
        '"' => '"',
        _ => return None,
    };
    let inner = &rest[1..];
    let end = inner.find(close)?;
    Some((&inner[..end], &inner[end + 1..]))
}

/// Recursive include expansion shared by [`ShaderLibrary::compose`]
pub(crate) struct IncludeResolver<'a, F: Fn(&str) -> Option<&'a str>> {
    lookup: F,
    /// Fragments currently being expanded, outermost first
    stack: Vec<String>,
    included: HashSet<String>,
}

impl<'a, F: Fn(&str) -> Option<&'a str>> IncludeResolver<'a, F> {
    pub(crate) fn new(lookup: F) -> Self {
        Self {
            lookup,
            stack: Vec::new(),
            included: HashSet::new(),
        }
    }

    pub(crate) fn resolve(&mut self, source: &str, out: &mut String) -> Result<(), ComposeError> {
        for (number, line) in source.split_inclusive('\n').enumerate() {
            let Some(at) = line.find("#include") else {
                out.push_str(line);
                continue;
            };
            let (before, directive) = line.split_at(at);
            let (name, after) = parse_include_directive(directive).ok_or_else(|| ComposeError::Malformed {
                line: number + 1,
                text: line.trim().to_string(),
            })?;

            if self.stack.iter().any(|s| s == name) {
                let mut chain = self.stack.clone();
                chain.push(name.to_string());
                return Err(ComposeError::Cycle(chain));
            }

            if !before.trim().is_empty() {
                out.push_str(before);
            }
            if !self.included.contains(name) {
                let fragment = (self.lookup)(name).ok_or_else(|| ComposeError::MissingFragment {
                    name: name.to_string(),
                    chain: if self.stack.is_empty() {
                        "source".to_string()
                    } else {
                        self.stack.join(" -> ")
                    },
                })?;

                self.included.insert(name.to_string());
                self.stack.push(name.to_string());
                self.resolve(fragment, out)?;
                self.stack.pop();
            }

            if !after.trim().is_empty() {
                out.push_str(after);
            } else if line.ends_with('\n') && !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
        }
        Ok(())
    }
}

enum Branch {
    /// Lines in this branch are emitted
    Active,
    /// This branch is skipped, the `#else` branch is live
    Inactive,
    /// The enclosing block is skipped; every branch stays dead
    Dead,
}

/// Evaluate `#ifdef` / `#ifndef` / `#else` / `#endif` against `defines`
pub fn preprocess(source: &str, defines: &[&str]) -> Result<String, ComposeError> {
    let mut out = String::with_capacity(source.len());
    // (branch, seen_else)
    let mut stack: Vec<(Branch, bool)> = Vec::new();
    let emitting = |stack: &[(Branch, bool)]| stack.iter().all(|(b, _)| matches!(b, Branch::Active));

    for (number, line) in source.split_inclusive('\n').enumerate() {
        let trimmed = line.trim();
        let mut words = trimmed.split_whitespace();
        let directive = words.next().unwrap_or("");

        match directive {
            "#ifdef" | "#ifndef" => {
                let name = words.next().ok_or_else(|| ComposeError::Malformed {
                    line: number + 1,
                    text: trimmed.to_string(),
                })?;
                let branch = if !emitting(&stack) {
                    Branch::Dead
                } else if defines.contains(&name) == (directive == "#ifdef") {
                    Branch::Active
                } else {
                    Branch::Inactive
                };
                stack.push((branch, false));
            }
            "#else" => {
                let (branch, seen_else) = stack
                    .last_mut()
                    .ok_or_else(|| ComposeError::UnbalancedConditional(format!("#else on line {}", number + 1)))?;
                if *seen_else {
                    return Err(ComposeError::UnbalancedConditional(format!(
                        "second #else on line {}",
                        number + 1
                    )));
                }
                *seen_else = true;
                *branch = match branch {
                    Branch::Active => Branch::Inactive,
                    Branch::Inactive => Branch::Active,
                    Branch::Dead => Branch::Dead,
                };
            }
            "#endif" => {
                stack
                    .pop()
                    .ok_or_else(|| ComposeError::UnbalancedConditional(format!("#endif on line {}", number + 1)))?;
            }
            "#if" | "#elif" | "#define" | "#undef" => {
                return Err(ComposeError::UnsupportedConditional {
                    line: number + 1,
                    text: trimmed.to_string(),
                });
            }
            _ => {
                if emitting(&stack) {
                    out.push_str(line);
                }
            }
        }
    }

    if !stack.is_empty() {
        return Err(ComposeError::UnbalancedConditional(format!(
            "{} unterminated block(s)",
            stack.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_include_directive() {
        assert_eq!(parse_include_directive("#include <common>"), Some(("common", "")));
        assert_eq!(parse_include_directive(r#"#include "lib/math""#), Some(("lib/math", "")));
        assert_eq!(parse_include_directive("#include <a> // tail\n"), Some(("a", " // tail\n")));
        assert_eq!(parse_include_directive("#include common"), None);
        assert_eq!(parse_include_directive("// comment"), None);
    }

    #[test]
    fn test_preprocess_branches() {
        let source = "a\n#ifdef X\nb\n#else\nc\n#endif\nd\n";
        assert_eq!(preprocess(source, &["X"]).unwrap(), "a\nb\nd\n");
        assert_eq!(preprocess(source, &[]).unwrap(), "a\nc\nd\n");
    }

    #[test]
    fn test_preprocess_nested_dead_blocks() {
        let source = "#ifdef A\n#ifndef B\nx\n#else\ny\n#endif\n#endif\nz";
        assert_eq!(preprocess(source, &["B"]).unwrap(), "z");
        assert_eq!(preprocess(source, &["A"]).unwrap(), "x\nz");
        assert_eq!(preprocess(source, &["A", "B"]).unwrap(), "y\nz");
    }

    #[test]
    fn test_preprocess_unbalanced() {
        assert!(matches!(
            preprocess("#ifdef A\nx\n", &[]),
            Err(ComposeError::UnbalancedConditional(_))
        ));
        assert!(matches!(
            preprocess("x\n#endif\n", &[]),
            Err(ComposeError::UnbalancedConditional(_))
        ));
        assert!(matches!(
            preprocess("#if A == 1\n#endif\n", &[]),
            Err(ComposeError::UnsupportedConditional { line: 1, .. })
        ));
    }

    #[test]
    fn test_variant_defines() {
        let flags = VariantFlags::ALPHA_TEST | VariantFlags::SHADOW_MAP;
        assert_eq!(flags.defines(), vec!["ALPHA_TEST", "SHADOW_MAP"]);
        assert!(VariantFlags::NONE.defines().is_empty());
        assert_eq!(flags.difference(VariantFlags::ALPHA_TEST), VariantFlags::SHADOW_MAP);
    }

    #[test]
    fn test_required_inputs_follow_variants() {
        let technique = Technique::new("t", ProgramSource::new("", "")).with_inputs(&[Semantic::Position]);
        assert_eq!(technique.required_inputs(VariantFlags::NONE), vec![Semantic::Position]);
        assert_eq!(
            technique.required_inputs(VariantFlags::ALPHA_TEST | VariantFlags::SKINNING),
            vec![
                Semantic::Position,
                Semantic::Texcoord0,
                Semantic::SkinIndex,
                Semantic::SkinWeight
            ]
        );
    }
}
