//! Grammar elements and the builder that validates them.
//!
//! A grammar is an arena of syntactic elements addressed by [`ElementId`].
//! Macros are text templates with named parameters; frames describe how to
//! expand into child elements. Element `0` is always the header macro that
//! sits on `NODE_ZERO` of every genome.

use crate::engines::generation::node_view::NodeView;
use crate::engines::generation::parameter::ParameterSpec;
use crate::error::{EvoError, Result};
use crate::random::Randy;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub usize);

/// The header macro placed on `NODE_ZERO`.
pub const MACRO_ZERO: ElementId = ElementId(0);
pub const MACRO_ZERO_NAME: &str = "MacroZero";
const MACRO_ZERO_TEXT: &str = "{_comment} generated by grammarevo";

/// User-supplied predicate every node of an element must satisfy.
pub type NodeCheck = Arc<dyn Fn(&NodeView<'_>) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub text: String,
    /// Sorted by name.
    pub parameters: Vec<(String, Arc<ParameterSpec>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// Fixed ordered successors.
    Sequence(Vec<ElementId>),
    /// Exactly one successor out of the alternatives.
    Alternative(Vec<ElementId>),
    /// Between `size.start` and `size.end - 1` macros drawn from `pool`;
    /// the pool repeats elements according to their weight.
    MacroBunch { pool: Vec<ElementId>, size: Range<usize> },
}

#[derive(Debug, Clone)]
pub struct FrameDef {
    pub name: String,
    pub kind: FrameKind,
}

#[derive(Debug, Clone)]
pub enum SElement {
    Macro(MacroDef),
    Frame(FrameDef),
}

impl SElement {
    pub fn name(&self) -> &str {
        match self {
            SElement::Macro(m) => &m.name,
            SElement::Frame(f) => &f.name,
        }
    }
}

struct Entry {
    element: SElement,
    extra: BTreeMap<String, String>,
    max_instances: Option<usize>,
    checks: Vec<NodeCheck>,
}

pub struct Grammar {
    entries: Vec<Entry>,
    by_name: HashMap<String, ElementId>,
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("elements", &self.entries.iter().map(|e| e.element.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Grammar {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn element(&self, id: ElementId) -> Option<&SElement> {
        self.entries.get(id.0).map(|e| &e.element)
    }

    pub fn name(&self, id: ElementId) -> &str {
        self.element(id).map_or("?", SElement::name)
    }

    pub fn id_of(&self, name: &str) -> Option<ElementId> {
        self.by_name.get(name).copied()
    }

    pub fn is_macro(&self, id: ElementId) -> bool {
        matches!(self.element(id), Some(SElement::Macro(_)))
    }

    pub fn macro_def(&self, id: ElementId) -> Option<&MacroDef> {
        match self.element(id) {
            Some(SElement::Macro(m)) => Some(m),
            _ => None,
        }
    }

    pub fn frame_def(&self, id: ElementId) -> Option<&FrameDef> {
        match self.element(id) {
            Some(SElement::Frame(f)) => Some(f),
            _ => None,
        }
    }

    /// Bunch size range, if `id` is a macro bunch.
    pub fn bunch_size(&self, id: ElementId) -> Option<Range<usize>> {
        match self.frame_def(id).map(|f| &f.kind) {
            Some(FrameKind::MacroBunch { size, .. }) => Some(size.clone()),
            _ => None,
        }
    }

    pub fn bunch_pool(&self, id: ElementId) -> Option<&[ElementId]> {
        match self.frame_def(id).map(|f| &f.kind) {
            Some(FrameKind::MacroBunch { pool, .. }) => Some(pool),
            _ => None,
        }
    }

    pub fn extra(&self, id: ElementId) -> Option<&BTreeMap<String, String>> {
        self.entries.get(id.0).map(|e| &e.extra)
    }

    pub fn ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        (0..self.entries.len()).map(ElementId)
    }

    /// Children to instantiate for one expansion of frame `id`.
    pub fn successors(&self, id: ElementId, rng: &mut Randy) -> Vec<ElementId> {
        match self.frame_def(id).map(|f| &f.kind) {
            Some(FrameKind::Sequence(children)) => children.clone(),
            Some(FrameKind::Alternative(alternatives)) => {
                rng.choice(alternatives).copied().into_iter().collect()
            }
            Some(FrameKind::MacroBunch { pool, size }) => {
                let count = rng.random_int(size.start as i64, size.end as i64, None, 1.0) as usize;
                (0..count).filter_map(|_| rng.choice(pool).copied()).collect()
            }
            None => Vec::new(),
        }
    }

    /// Content hash of the element, used as a building block of node signatures.
    pub fn signature(&self, id: ElementId) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.name(id).hash(&mut hasher);
        hasher.finish()
    }

    /// Run the built-in and user checks of the element of `view`.
    pub fn check_node(&self, view: &NodeView<'_>) -> bool {
        let Some(element) = view.element() else {
            return false;
        };
        let Some(entry) = self.entries.get(element.0) else {
            return false;
        };

        let successors = view.successors();
        let child_elements: Vec<ElementId> = successors
            .iter()
            .filter_map(|n| view.genome().element_of(*n))
            .collect();

        let structural = match &entry.element {
            SElement::Macro(_) => successors.is_empty(),
            SElement::Frame(frame) => match &frame.kind {
                FrameKind::Sequence(children) => child_elements == *children,
                FrameKind::Alternative(alternatives) => {
                    child_elements.len() == 1 && alternatives.contains(&child_elements[0])
                }
                FrameKind::MacroBunch { pool, size } => {
                    size.contains(&child_elements.len()) && child_elements.iter().all(|e| pool.contains(e))
                }
            },
        };
        if !structural {
            return false;
        }

        if let Some(max) = entry.max_instances {
            if view.genome().count_instances(element) > max {
                return false;
            }
        }

        entry.checks.iter().all(|check| check(view))
    }
}

/// One symbol of a BNF production.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Symbol {
    Element(ElementId),
    /// Recursive reference to the production being defined.
    SelfRef,
}

/// Incrementally defines a [`Grammar`]; all problems surface in [`GrammarBuilder::build`].
pub struct GrammarBuilder {
    entries: Vec<Option<Entry>>,
    names: Vec<String>,
    by_name: HashMap<String, ElementId>,
    errors: Vec<String>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            entries: Vec::new(),
            names: Vec::new(),
            by_name: HashMap::new(),
            errors: Vec::new(),
        };
        builder.push(
            MACRO_ZERO_NAME,
            Some(SElement::Macro(MacroDef {
                name: MACRO_ZERO_NAME.to_string(),
                text: MACRO_ZERO_TEXT.to_string(),
                parameters: Vec::new(),
            })),
        );
        builder
    }

    pub fn add_macro<I, S>(&mut self, name: &str, text: &str, parameters: I) -> ElementId
    where
        I: IntoIterator<Item = (S, ParameterSpec)>,
        S: Into<String>,
    {
        let mut parameters: Vec<(String, Arc<ParameterSpec>)> = parameters
            .into_iter()
            .map(|(n, spec)| (n.into(), Arc::new(spec)))
            .collect();
        parameters.sort_by(|a, b| a.0.cmp(&b.0));
        for pair in parameters.windows(2) {
            if pair[0].0 == pair[1].0 {
                self.errors
                    .push(format!("macro '{}': duplicate parameter '{}'", name, pair[0].0));
            }
        }
        for (parameter, _) in &parameters {
            if parameter.starts_with('_') {
                self.errors.push(format!(
                    "macro '{}': parameter names starting with '_' are reserved ('{}')",
                    name, parameter
                ));
            }
        }
        self.push(
            name,
            Some(SElement::Macro(MacroDef {
                name: name.to_string(),
                text: text.to_string(),
                parameters,
            })),
        )
    }

    pub fn add_sequence(&mut self, name: &str, children: &[ElementId]) -> ElementId {
        self.add_frame(name, FrameKind::Sequence(children.to_vec()))
    }

    pub fn add_alternative(&mut self, name: &str, alternatives: &[ElementId]) -> ElementId {
        self.add_frame(name, FrameKind::Alternative(alternatives.to_vec()))
    }

    /// Bunch of `size.start..size.end` macros drawn uniformly from `pool`.
    pub fn add_bunch(&mut self, name: &str, pool: &[ElementId], size: Range<usize>) -> ElementId {
        self.add_frame(
            name,
            FrameKind::MacroBunch {
                pool: pool.to_vec(),
                size,
            },
        )
    }

    /// Bunch whose pool entries are repeated according to their weight.
    pub fn add_weighted_bunch(&mut self, name: &str, pool: &[(ElementId, usize)], size: Range<usize>) -> ElementId {
        if pool.iter().any(|(_, w)| *w == 0) {
            self.errors
                .push(format!("bunch '{}': weights must be positive", name));
        }
        let expanded: Vec<ElementId> = pool
            .iter()
            .flat_map(|(id, weight)| std::iter::repeat(*id).take(*weight))
            .collect();
        self.add_bunch(name, &expanded, size)
    }

    pub fn add_frame(&mut self, name: &str, kind: FrameKind) -> ElementId {
        self.push(
            name,
            Some(SElement::Frame(FrameDef {
                name: name.to_string(),
                kind,
            })),
        )
    }

    /// Reserve an id for a frame defined later, enabling recursive grammars.
    pub fn declare_frame(&mut self, name: &str) -> ElementId {
        self.push(name, None)
    }

    pub fn define_frame(&mut self, id: ElementId, kind: FrameKind) {
        match self.entries.get_mut(id.0) {
            Some(slot @ None) => {
                *slot = Some(Entry::new(SElement::Frame(FrameDef {
                    name: self.names[id.0].clone(),
                    kind,
                })))
            }
            Some(Some(_)) => self
                .errors
                .push(format!("element '{}' is already defined", self.names[id.0])),
            None => self.errors.push(format!("unknown element id {}", id.0)),
        }
    }

    /// Alternative of productions; `Symbol::SelfRef` recurses into the
    /// production itself. Single-element productions are used directly,
    /// longer ones become sequences named `name#i`.
    pub fn add_bnf(&mut self, name: &str, productions: &[Vec<Symbol>]) -> ElementId {
        let id = self.declare_frame(name);
        let mut alternatives = Vec::with_capacity(productions.len());
        for (i, production) in productions.iter().enumerate() {
            let resolved: Vec<ElementId> = production
                .iter()
                .map(|s| match s {
                    Symbol::Element(e) => *e,
                    Symbol::SelfRef => id,
                })
                .collect();
            match resolved.as_slice() {
                [single] if *single != id => alternatives.push(*single),
                _ => alternatives.push(self.add_sequence(&format!("{}#{}", name, i), &resolved)),
            }
        }
        self.define_frame(id, FrameKind::Alternative(alternatives));
        id
    }

    pub fn set_max_instances(&mut self, id: ElementId, max: usize) {
        if let Some(entry) = self.entry_mut(id) {
            entry.max_instances = Some(max);
        }
    }

    /// Element-level extra parameter, available to templates of the element
    /// and of everything below it.
    pub fn set_extra(&mut self, id: ElementId, key: &str, value: &str) {
        if let Some(entry) = self.entry_mut(id) {
            entry.extra.insert(key.to_string(), value.to_string());
        }
    }

    pub fn add_check(&mut self, id: ElementId, check: NodeCheck) {
        if let Some(entry) = self.entry_mut(id) {
            entry.checks.push(check);
        }
    }

    pub fn build(self) -> Result<Grammar> {
        let mut errors = self.errors;
        let count = self.entries.len();

        let mut entries = Vec::with_capacity(count);
        for (i, entry) in self.entries.into_iter().enumerate() {
            match entry {
                Some(entry) => entries.push(entry),
                None => errors.push(format!("frame '{}' declared but never defined", self.names[i])),
            }
        }
        if !errors.is_empty() {
            return Err(EvoError::Grammar(errors.join("; ")));
        }

        let is_frame = |name: &str| {
            self.by_name
                .get(name)
                .and_then(|id| entries.get(id.0))
                .map_or(false, |e: &Entry| matches!(e.element, SElement::Frame(_)))
        };
        let is_macro = |id: &ElementId| {
            entries
                .get(id.0)
                .map_or(false, |e: &Entry| matches!(e.element, SElement::Macro(_)))
        };
        let valid_child = |id: &ElementId| id.0 < count && *id != MACRO_ZERO;

        for entry in &entries {
            match &entry.element {
                SElement::Macro(m) => {
                    for (name, spec) in &m.parameters {
                        if let Err(EvoError::Grammar(msg)) = spec.validate(name, &is_frame) {
                            errors.push(format!("macro '{}': {}", m.name, msg));
                        }
                    }
                }
                SElement::Frame(f) => match &f.kind {
                    FrameKind::Sequence(children) => {
                        if !children.iter().all(valid_child) {
                            errors.push(format!("sequence '{}': invalid child", f.name));
                        }
                    }
                    FrameKind::Alternative(alternatives) => {
                        if alternatives.is_empty() {
                            errors.push(format!("alternative '{}': no alternatives", f.name));
                        } else if !alternatives.iter().all(valid_child) {
                            errors.push(format!("alternative '{}': invalid alternative", f.name));
                        }
                    }
                    FrameKind::MacroBunch { pool, size } => {
                        if pool.is_empty() {
                            errors.push(format!("bunch '{}': empty pool", f.name));
                        } else if !pool.iter().all(|id| valid_child(id) && is_macro(id)) {
                            errors.push(format!("bunch '{}': the pool may only contain macros", f.name));
                        }
                        if size.start >= size.end {
                            errors.push(format!(
                                "bunch '{}': empty size range {}..{}",
                                f.name, size.start, size.end
                            ));
                        }
                    }
                },
            }
        }

        if !errors.is_empty() {
            return Err(EvoError::Grammar(errors.join("; ")));
        }

        Ok(Grammar {
            entries,
            by_name: self.by_name,
        })
    }

    fn push(&mut self, name: &str, element: Option<SElement>) -> ElementId {
        let id = ElementId(self.entries.len());
        if name.is_empty() {
            self.errors.push("elements need a non-empty name".to_string());
        } else if self.by_name.insert(name.to_string(), id).is_some() {
            self.errors.push(format!("duplicate element name '{}'", name));
        }
        self.names.push(name.to_string());
        self.entries.push(element.map(Entry::new));
        id
    }

    fn entry_mut(&mut self, id: ElementId) -> Option<&mut Entry> {
        match self.entries.get_mut(id.0) {
            Some(Some(entry)) => Some(entry),
            _ => {
                self.errors
                    .push(format!("element {} must be defined before being configured", id.0));
                None
            }
        }
    }
}

impl Entry {
    fn new(element: SElement) -> Self {
        Self {
            element,
            extra: BTreeMap::new(),
            max_instances: None,
            checks: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_params() -> Vec<(&'static str, ParameterSpec)> {
        Vec::new()
    }

    #[test]
    fn test_macro_zero_is_first() {
        let grammar = GrammarBuilder::new().build().unwrap();
        assert_eq!(grammar.name(MACRO_ZERO), MACRO_ZERO_NAME);
        assert!(grammar.is_macro(MACRO_ZERO));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut builder = GrammarBuilder::new();
        builder.add_macro("inc", "inc", no_params());
        builder.add_macro("inc", "inc again", no_params());
        assert!(matches!(builder.build(), Err(EvoError::Grammar(_))));
    }

    #[test]
    fn test_empty_alternative_is_rejected() {
        let mut builder = GrammarBuilder::new();
        builder.add_alternative("nothing", &[]);
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_invalid_parameter_range_is_rejected() {
        let mut builder = GrammarBuilder::new();
        builder.add_macro("bad", "{x}", [("x", ParameterSpec::integer(10, 0))]);
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_bunch_pool_must_hold_macros() {
        let mut builder = GrammarBuilder::new();
        let m = builder.add_macro("m", "m", no_params());
        let seq = builder.add_sequence("seq", &[m]);
        builder.add_bunch("bunch", &[seq], 1..3);
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_undefined_declaration_is_rejected() {
        let mut builder = GrammarBuilder::new();
        builder.declare_frame("later");
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_bunch_successor_count_in_range() {
        let mut builder = GrammarBuilder::new();
        let a = builder.add_macro("a", "a", no_params());
        let b = builder.add_macro("b", "b", no_params());
        let bunch = builder.add_weighted_bunch("bunch", &[(a, 3), (b, 1)], 2..5);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(42);
        for _ in 0..100 {
            let successors = grammar.successors(bunch, &mut rng);
            assert!((2..5).contains(&successors.len()));
            assert!(successors.iter().all(|s| *s == a || *s == b));
        }
    }

    #[test]
    fn test_bnf_self_reference() {
        let mut builder = GrammarBuilder::new();
        let x = builder.add_macro("x", "x", no_params());
        let list = builder.add_bnf("list", &[vec![Symbol::Element(x)], vec![Symbol::Element(x), Symbol::SelfRef]]);
        let grammar = builder.build().unwrap();

        match &grammar.frame_def(list).unwrap().kind {
            FrameKind::Alternative(alternatives) => {
                assert_eq!(alternatives.len(), 2);
                assert_eq!(alternatives[0], x);
                assert_eq!(
                    grammar.frame_def(alternatives[1]).unwrap().kind,
                    FrameKind::Sequence(vec![x, list])
                );
            }
            other => panic!("unexpected frame kind {:?}", other),
        }
    }
}
