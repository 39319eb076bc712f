//! Phenotype rendering.
//!
//! The framework tree is walked in preorder and every node contributes its
//! text. Macro templates use `{name}` placeholders, `{{` and `}}` escape
//! braces. Placeholders resolve against, in increasing priority: the
//! default extra parameters, caller overrides, the extras of every element
//! on the path from the root, the node's own parameters and `_node`.

use crate::engines::generation::genome::{Genome, NodeKind};
use crate::engines::generation::grammar::Grammar;
use crate::error::{EvoError, Result};
use crate::types::{NodeId, NODE_ZERO};
use std::collections::BTreeMap;

pub const DEFAULT_EXTRA_PARAMETERS: [(&str, &str); 8] = [
    ("_comment", ";"),
    ("_label", "{_node}:\n"),
    ("_text_before_macro", ""),
    ("_text_after_macro", "\n"),
    ("_text_before_frame", ""),
    ("_text_after_frame", ""),
    ("_text_before_node", ""),
    ("_text_after_node", ""),
];

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Caller-supplied extra parameters, e.g. a different `_comment`.
    pub overrides: BTreeMap<String, String>,
    /// Renumber nodes in preorder before rendering, so that labels do not
    /// depend on the ids handed out during the run.
    pub canonical: bool,
    /// Append the path and element name of every node as a comment.
    pub node_info: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            canonical: true,
            node_info: false,
        }
    }
}

impl RenderOptions {
    pub fn with_override(mut self, key: &str, value: &str) -> Self {
        self.overrides.insert(key.to_string(), value.to_string());
        self
    }
}

pub fn render(genome: &Genome, grammar: &Grammar, options: &RenderOptions) -> Result<String> {
    let canonical;
    let genome = if options.canonical {
        canonical = genome.canonical();
        &canonical
    } else {
        genome
    };

    let mut bag: BTreeMap<String, String> = DEFAULT_EXTRA_PARAMETERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    bag.extend(options.overrides.clone());

    let mut out = String::new();
    render_node(genome, grammar, NODE_ZERO, &bag, Vec::new(), options, &mut out)?;
    Ok(out)
}

fn render_node(
    genome: &Genome,
    grammar: &Grammar,
    node: NodeId,
    inherited: &BTreeMap<String, String>,
    mut path: Vec<NodeId>,
    options: &RenderOptions,
    out: &mut String,
) -> Result<()> {
    let data = genome
        .node(node)
        .ok_or_else(|| EvoError::Render(format!("{} is not in the genome", node)))?;
    path.push(node);

    let mut scope = inherited.clone();
    if let Some(extra) = grammar.extra(data.element) {
        scope.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let mut bag = scope.clone();
    for name in data.parameters.keys() {
        if let Some(value) = genome.parameter_value(node, name) {
            bag.insert(name.clone(), value.to_string());
        }
    }
    bag.insert("_node".to_string(), node.to_string());

    out.push_str(&format_template(lookup(&bag, "_text_before_node"), &bag)?);
    if genome.in_degree(node) > 1 {
        out.push_str(&format_template(lookup(&bag, "_label"), &bag)?);
    }
    match data.kind {
        NodeKind::Macro => {
            out.push_str(&format_template(lookup(&bag, "_text_before_macro"), &bag)?);
            let text = grammar
                .macro_def(data.element)
                .map(|m| m.text.as_str())
                .unwrap_or_default();
            out.push_str(&format_template(text, &bag)?);
            if options.node_info {
                out.push_str(&node_info(genome, grammar, &path, &bag));
            }
            out.push_str(&format_template(lookup(&bag, "_text_after_macro"), &bag)?);
        }
        NodeKind::Frame => {
            out.push_str(&format_template(lookup(&bag, "_text_before_frame"), &bag)?);
            if options.node_info {
                out.push_str(&node_info(genome, grammar, &path, &bag));
                out.push_str(&format_template(lookup(&bag, "_text_after_macro"), &bag)?);
            }
            out.push_str(&format_template(lookup(&bag, "_text_after_frame"), &bag)?);
        }
    }
    out.push_str(&format_template(lookup(&bag, "_text_after_node"), &bag)?);

    for child in genome.successors(node) {
        render_node(genome, grammar, child, &scope, path.clone(), options, out)?;
    }
    Ok(())
}

fn lookup<'a>(bag: &'a BTreeMap<String, String>, key: &str) -> &'a str {
    bag.get(key).map(String::as_str).unwrap_or_default()
}

fn node_info(genome: &Genome, grammar: &Grammar, path: &[NodeId], bag: &BTreeMap<String, String>) -> String {
    let pathname: Vec<String> = path.iter().skip(1).map(|n| n.to_string()).collect();
    let name = path
        .last()
        .and_then(|n| genome.element_of(*n))
        .map_or("?", |e| grammar.name(e));
    format!("  {} {} -> {}", lookup(bag, "_comment"), pathname.join("."), name)
}

/// Substitute `{key}` placeholders from `bag`.
pub fn format_template(template: &str, bag: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(k) => key.push(k),
                        None => {
                            return Err(EvoError::Render(format!(
                                "unterminated placeholder in '{}'",
                                template
                            )))
                        }
                    }
                }
                let value = bag
                    .get(key.trim())
                    .ok_or_else(|| EvoError::Render(format!("unknown key '{}' in '{}'", key, template)))?;
                out.push_str(value);
            }
            '}' => {
                return Err(EvoError::Render(format!("single '}}' in '{}'", template)));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Phenotype without the header line and blank lines, each line trimmed.
pub fn strip_phenotype(phenotype: &str) -> String {
    phenotype
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
