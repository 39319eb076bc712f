//! Parameters: the evolvable knobs living on macro nodes.
//!
//! Value parameters (integer, float, choice, array, counter, shared) store
//! their value on the node or, for shared ones, in the genome. Structural
//! parameters (local and global references) store nothing on the node: their
//! value is the target of the `LINK` edge keyed by the parameter's key.
//!
//! [`mutate_parameter`] is the only state-changing operation and works on the
//! genome, because structural parameters need to see (and may extend) the
//! whole graph.

use crate::engines::generation::genome::Genome;
use crate::engines::generation::grammar::{ElementId, Grammar};
use crate::engines::generation::unroll::unroll_into;
use crate::error::{EvoError, OperatorAbort, OperatorResult, Result};
use crate::random::Randy;
use crate::types::{Ids, NodeId, ParamKey, Value, NODE_ZERO};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Attempts made by [`mutate_until_changed`] before giving up.
pub const MAX_MUTATION_ATTEMPTS: usize = 100;

static NEXT_SHARED: AtomicU64 = AtomicU64::new(1);

/// Identity of a shared parameter; every instance created from the same
/// [`ParameterSpec::shared`] value carries the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SharedId(pub u64);

/// Whether a global reference may create a new target frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CreativeZeal {
    Never,
    /// Create a new target with this probability, and always when none exists.
    Probability(f64),
    /// Add this many "new target" slots to the candidates.
    Quota(u32),
}

#[derive(Debug, Clone)]
pub enum ParameterSpec {
    /// Integer in the half-open range `[min, max)`.
    Integer { min: i64, max: i64 },
    /// Float in the half-open range `[min, max)`.
    Float { min: f64, max: f64 },
    Choice(Vec<String>),
    /// Fixed-length string over an alphabet.
    Array { symbols: Vec<char>, length: usize },
    /// Monotonic counter shared by every instance; each mutation takes the next value.
    Counter(Arc<AtomicU64>),
    Shared { id: SharedId, inner: Arc<ParameterSpec> },
    /// Reference to a sibling under the same parent.
    LocalReference { backward: bool, self_loop: bool, forward: bool },
    /// Reference to a macro under any instance of the frame named `target`.
    GlobalReference { target: String, first_macro: bool, creative_zeal: CreativeZeal },
}

impl ParameterSpec {
    pub fn integer(min: i64, max: i64) -> Self {
        ParameterSpec::Integer { min, max }
    }

    pub fn float(min: f64, max: f64) -> Self {
        ParameterSpec::Float { min, max }
    }

    pub fn choice<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParameterSpec::Choice(alternatives.into_iter().map(Into::into).collect())
    }

    pub fn array(symbols: &str, length: usize) -> Self {
        ParameterSpec::Array {
            symbols: symbols.chars().collect(),
            length,
        }
    }

    pub fn counter(start: u64) -> Self {
        ParameterSpec::Counter(Arc::new(AtomicU64::new(start)))
    }

    /// Wrap a value parameter so that all its instances in a genome share one value.
    pub fn shared(inner: ParameterSpec) -> Self {
        ParameterSpec::Shared {
            id: SharedId(NEXT_SHARED.fetch_add(1, Ordering::Relaxed)),
            inner: Arc::new(inner),
        }
    }

    pub fn local_reference(backward: bool, self_loop: bool, forward: bool) -> Self {
        ParameterSpec::LocalReference {
            backward,
            self_loop,
            forward,
        }
    }

    pub fn global_reference(target: &str, first_macro: bool, creative_zeal: CreativeZeal) -> Self {
        ParameterSpec::GlobalReference {
            target: target.to_string(),
            first_macro,
            creative_zeal,
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ParameterSpec::LocalReference { .. } | ParameterSpec::GlobalReference { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ParameterSpec::Integer { .. } => "integer",
            ParameterSpec::Float { .. } => "float",
            ParameterSpec::Choice(_) => "choice",
            ParameterSpec::Array { .. } => "array",
            ParameterSpec::Counter(_) => "counter",
            ParameterSpec::Shared { .. } => "shared",
            ParameterSpec::LocalReference { .. } => "local_reference",
            ParameterSpec::GlobalReference { .. } => "global_reference",
        }
    }

    /// Reject malformed definitions; `frame_exists` resolves global targets.
    pub fn validate(&self, name: &str, frame_exists: &dyn Fn(&str) -> bool) -> Result<()> {
        let fail = |msg: String| Err(EvoError::Grammar(format!("parameter '{}': {}", name, msg)));
        match self {
            ParameterSpec::Integer { min, max } if min >= max => {
                fail(format!("empty integer range [{}, {})", min, max))
            }
            ParameterSpec::Float { min, max } if !(min < max) || !min.is_finite() || !max.is_finite() => {
                fail(format!("invalid float range [{}, {})", min, max))
            }
            ParameterSpec::Choice(alternatives) if alternatives.is_empty() => {
                fail("no alternatives".to_string())
            }
            ParameterSpec::Array { symbols, length } if symbols.is_empty() || *length == 0 => {
                fail("arrays need a non-empty alphabet and a positive length".to_string())
            }
            ParameterSpec::Shared { inner, .. } => match inner.as_ref() {
                ParameterSpec::Shared { .. } | ParameterSpec::Counter(_) => {
                    fail("only plain value parameters can be shared".to_string())
                }
                spec if spec.is_structural() => fail("structural parameters cannot be shared".to_string()),
                spec => spec.validate(name, frame_exists),
            },
            ParameterSpec::LocalReference {
                backward: false,
                self_loop: false,
                forward: false,
            } => fail("a local reference must allow at least one direction".to_string()),
            ParameterSpec::GlobalReference { target, .. } if !frame_exists(target) => {
                fail(format!("unknown target frame '{}'", target))
            }
            ParameterSpec::GlobalReference {
                creative_zeal: CreativeZeal::Probability(p),
                ..
            } if !(0.0..=1.0).contains(p) => fail(format!("creative zeal probability {} outside [0, 1]", p)),
            _ => Ok(()),
        }
    }

    /// Draw a value for a plain value parameter; `None` for the other kinds.
    pub fn draw(&self, current: Option<&Value>, strength: f64, rng: &mut Randy) -> Option<Value> {
        match self {
            ParameterSpec::Integer { min, max } => {
                let loc = current.and_then(Value::as_integer);
                Some(Value::Integer(rng.random_int(*min, *max, loc, strength)))
            }
            ParameterSpec::Float { min, max } => {
                let loc = current.and_then(Value::as_float);
                Some(Value::Float(rng.random_float(*min, *max, loc, strength)))
            }
            ParameterSpec::Choice(alternatives) => {
                let loc = current
                    .and_then(Value::as_text)
                    .and_then(|text| alternatives.iter().position(|a| a == text));
                rng.sigma_choice(alternatives, loc, strength)
                    .map(|choice| Value::Text(choice.clone()))
            }
            ParameterSpec::Array { symbols, length } => {
                let fresh = |rng: &mut Randy| rng.choice(symbols).copied().unwrap_or_default();
                let text = match current.and_then(Value::as_text) {
                    Some(old) if strength < 1.0 && old.chars().count() == *length => old
                        .chars()
                        .map(|c| if rng.boolean(strength) { fresh(rng) } else { c })
                        .collect(),
                    _ => (0..*length).map(|_| fresh(rng)).collect(),
                };
                Some(Value::Text(text))
            }
            _ => None,
        }
    }
}

/// One parameter slot on a node.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub key: ParamKey,
    pub spec: Arc<ParameterSpec>,
    /// Value of plain parameters; always `None` for shared and structural ones.
    pub value: Option<Value>,
}

impl Parameter {
    pub fn new(spec: Arc<ParameterSpec>) -> Self {
        Self {
            key: Ids::key(),
            spec,
            value: None,
        }
    }

    pub fn is_structural(&self) -> bool {
        self.spec.is_structural()
    }

    pub fn shared_id(&self) -> Option<SharedId> {
        match self.spec.as_ref() {
            ParameterSpec::Shared { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Mutate the parameter `name` of `node` with the given strength.
///
/// Strength `0` is a no-op. Structural parameters abort when no legal target
/// exists; in that case the genome is left as it was.
pub fn mutate_parameter(
    genome: &mut Genome,
    grammar: &Grammar,
    node: NodeId,
    name: &str,
    strength: f64,
    rng: &mut Randy,
) -> OperatorResult<()> {
    if strength <= 0.0 {
        return Ok(());
    }
    let parameter = genome
        .node(node)
        .and_then(|data| data.parameters.get(name))
        .cloned()
        .ok_or(OperatorAbort::NoCandidates)?;

    match parameter.spec.as_ref() {
        ParameterSpec::Counter(next) => {
            let value = next.fetch_add(1, Ordering::Relaxed) as i64;
            genome.set_parameter_value(node, name, Value::Integer(value));
            Ok(())
        }
        ParameterSpec::Shared { id, inner } => {
            let current = genome.shared_value(*id).cloned();
            let owner = genome.shared_owner(*id);
            if current.is_some() && owner != Some(parameter.key) {
                return Ok(());
            }
            if let Some(value) = inner.draw(current.as_ref(), strength, rng) {
                genome.set_shared_value(*id, value);
            }
            Ok(())
        }
        ParameterSpec::LocalReference {
            backward,
            self_loop,
            forward,
        } => mutate_local_reference(
            genome,
            node,
            name,
            parameter.key,
            (*backward, *self_loop, *forward),
            strength,
            rng,
        ),
        ParameterSpec::GlobalReference {
            target,
            first_macro,
            creative_zeal,
        } => {
            let target = grammar
                .id_of(target)
                .ok_or_else(|| OperatorAbort::NoTarget(format!("{}: unknown frame {}", name, target)))?;
            mutate_global_reference(
                genome,
                grammar,
                node,
                name,
                parameter.key,
                GlobalTarget {
                    frame: target,
                    first_macro: *first_macro,
                    creative_zeal: *creative_zeal,
                },
                strength,
                rng,
            )
        }
        spec => {
            let value = spec
                .draw(parameter.value.as_ref(), strength, rng)
                .ok_or(OperatorAbort::NoCandidates)?;
            genome.set_parameter_value(node, name, value);
            Ok(())
        }
    }
}

/// Mutate repeatedly until the observable value changes.
///
/// Returns `Ok(false)` (and warns) if the value never changed, e.g. for a
/// range with a single element or a reference with a single legal target.
pub fn mutate_until_changed(
    genome: &mut Genome,
    grammar: &Grammar,
    node: NodeId,
    name: &str,
    strength: f64,
    rng: &mut Randy,
) -> OperatorResult<bool> {
    if strength <= 0.0 {
        return Ok(false);
    }
    let before = genome.parameter_value(node, name);
    for _ in 0..MAX_MUTATION_ATTEMPTS {
        mutate_parameter(genome, grammar, node, name, strength, rng)?;
        if genome.parameter_value(node, name) != before {
            return Ok(true);
        }
    }
    warn!(
        "Parameter '{}' on {} did not change after {} mutations",
        name, node, MAX_MUTATION_ATTEMPTS
    );
    Ok(false)
}

fn mutate_local_reference(
    genome: &mut Genome,
    node: NodeId,
    name: &str,
    key: ParamKey,
    (backward, self_loop, forward): (bool, bool, bool),
    strength: f64,
    rng: &mut Randy,
) -> OperatorResult<()> {
    let siblings = genome.siblings(node);
    let position = siblings
        .iter()
        .position(|s| *s == node)
        .ok_or_else(|| OperatorAbort::NoTarget(format!("{}: {} is detached", name, node)))?;
    let candidates: Vec<NodeId> = siblings
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            (backward && *i < position) || (self_loop && *i == position) || (forward && *i > position)
        })
        .map(|(_, s)| *s)
        .collect();

    let current = genome.link_target(key);
    let loc = current.and_then(|c| candidates.iter().position(|n| *n == c));
    let target = if strength >= 1.0 || loc.is_none() {
        rng.choice(&candidates)
    } else {
        rng.sigma_choice(&candidates, loc, strength)
    }
    .copied()
    .ok_or_else(|| OperatorAbort::NoTarget(name.to_string()))?;

    genome.set_link(node, key, target);
    Ok(())
}

struct GlobalTarget {
    frame: ElementId,
    first_macro: bool,
    creative_zeal: CreativeZeal,
}

/// Macros reachable under every instance of `frame`, in preorder.
pub(crate) fn global_candidates(genome: &Genome, grammar: &Grammar, frame: ElementId, first_macro: bool) -> Vec<NodeId> {
    let mut candidates = Vec::new();
    for instance in genome.dfs_preorder() {
        if genome.element_of(instance) != Some(frame) {
            continue;
        }
        let macros = genome
            .subtree(instance)
            .into_iter()
            .filter(|n| *n != instance && genome.element_of(*n).map_or(false, |e| grammar.is_macro(e)));
        if first_macro {
            candidates.extend(macros.take(1));
        } else {
            candidates.extend(macros);
        }
    }
    candidates
}

#[allow(clippy::too_many_arguments)]
fn mutate_global_reference(
    genome: &mut Genome,
    grammar: &Grammar,
    node: NodeId,
    name: &str,
    key: ParamKey,
    target: GlobalTarget,
    strength: f64,
    rng: &mut Randy,
) -> OperatorResult<()> {
    let candidates = global_candidates(genome, grammar, target.frame, target.first_macro);

    // `None` stands for "instantiate a new target frame"
    let mut slots: Vec<Option<NodeId>> = candidates.iter().copied().map(Some).collect();
    match target.creative_zeal {
        CreativeZeal::Never => {}
        _ if slots.is_empty() => slots = vec![None],
        CreativeZeal::Quota(n) => slots.extend((0..n).map(|_| None)),
        CreativeZeal::Probability(p) => {
            if rng.boolean(p) {
                slots = vec![None];
            }
        }
    }

    let current = genome.link_target(key);
    let loc = current.and_then(|c| slots.iter().position(|s| *s == Some(c)));
    let picked = if strength >= 1.0 || loc.is_none() {
        rng.choice(&slots)
    } else {
        rng.sigma_choice(&slots, loc, strength)
    }
    .copied()
    .ok_or_else(|| OperatorAbort::NoTarget(name.to_string()))?;

    let chosen = match picked {
        Some(chosen) => chosen,
        None => {
            let created = unroll_into(genome, grammar, target.frame, NODE_ZERO, None, rng)?;
            debug!("Global reference '{}' on {} created {}", name, node, created);
            // second and last try
            let candidates = global_candidates(genome, grammar, target.frame, target.first_macro);
            *rng.choice(&candidates)
                .ok_or_else(|| OperatorAbort::NoTarget(name.to_string()))?
        }
    };

    genome.set_link(node, key, chosen);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::grammar::GrammarBuilder;
    use crate::engines::generation::individual::Individual;

    fn validator(names: &[&str]) -> impl Fn(&str) -> bool {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        move |n: &str| names.iter().any(|m| m == n)
    }

    #[test]
    fn test_validation_rejects_bad_ranges() {
        let exists = validator(&[]);
        assert!(ParameterSpec::integer(5, 5).validate("x", &exists).is_err());
        assert!(ParameterSpec::float(1.0, 0.0).validate("x", &exists).is_err());
        assert!(ParameterSpec::choice(Vec::<String>::new()).validate("x", &exists).is_err());
        assert!(ParameterSpec::array("", 3).validate("x", &exists).is_err());
        assert!(ParameterSpec::local_reference(false, false, false)
            .validate("x", &exists)
            .is_err());
        assert!(ParameterSpec::global_reference("missing", false, CreativeZeal::Never)
            .validate("x", &exists)
            .is_err());
        assert!(ParameterSpec::integer(0, 10).validate("x", &exists).is_ok());
    }

    #[test]
    fn test_draw_integer_in_range() {
        let mut rng = Randy::new(42);
        let spec = ParameterSpec::integer(-3, 4);
        let mut value = spec.draw(None, 1.0, &mut rng);
        for _ in 0..200 {
            let v = value.as_ref().and_then(Value::as_integer).unwrap();
            assert!((-3..4).contains(&v));
            value = spec.draw(value.as_ref(), 0.5, &mut rng);
        }
    }

    #[test]
    fn test_draw_array_keeps_length_and_alphabet() {
        let mut rng = Randy::new(7);
        let spec = ParameterSpec::array("01", 16);
        let first = spec.draw(None, 1.0, &mut rng).unwrap();
        let second = spec.draw(Some(&first), 0.1, &mut rng).unwrap();
        for value in [first, second] {
            let text = value.as_text().unwrap().to_string();
            assert_eq!(text.len(), 16);
            assert!(text.chars().all(|c| c == '0' || c == '1'));
        }
    }

    #[test]
    fn test_choice_strength_zero_keeps_value() {
        let mut rng = Randy::new(7);
        let spec = ParameterSpec::choice(["add", "sub", "mul"]);
        let current = Value::Text("sub".to_string());
        assert_eq!(spec.draw(Some(&current), 0.0, &mut rng), Some(current));
    }

    #[test]
    fn test_counter_increments() {
        let mut builder = GrammarBuilder::new();
        let tick = builder.add_macro("tick", "t{n}", [("n", ParameterSpec::counter(10))]);
        let top = builder.add_sequence("top", &[tick, tick]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(1);
        let individual = Individual::random(&grammar, top, &mut rng).unwrap();
        let mut values: Vec<i64> = individual
            .genome
            .parameter_slots()
            .iter()
            .filter_map(|(n, name)| individual.genome.parameter_value(*n, name))
            .filter_map(|v| v.as_integer())
            .collect();
        values.sort();
        assert_eq!(values, vec![10, 11]);
    }

    #[test]
    fn test_shared_parameter_has_one_value_per_genome() {
        let knob = ParameterSpec::shared(ParameterSpec::integer(0, 1_000_000));
        let mut builder = GrammarBuilder::new();
        let a = builder.add_macro("a", "a {k}", [("k", knob.clone())]);
        let b = builder.add_macro("b", "b {k}", [("k", knob)]);
        let top = builder.add_sequence("top", &[a, b, a]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(3);
        let mut individual = Individual::random(&grammar, top, &mut rng).unwrap();
        let slots = individual.genome.parameter_slots();
        let values: Vec<Value> = slots
            .iter()
            .filter_map(|(n, name)| individual.genome.parameter_value(*n, name))
            .collect();
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|v| *v == values[0]));

        // only the owner (first created instance) actually changes the value
        let (last_node, last_name) = slots.last().cloned().unwrap();
        let before = individual.genome.parameter_value(last_node, &last_name);
        mutate_parameter(&mut individual.genome, &grammar, last_node, &last_name, 1.0, &mut rng).unwrap();
        assert_eq!(individual.genome.parameter_value(last_node, &last_name), before);

        let (first_node, first_name) = slots[0].clone();
        assert!(mutate_until_changed(&mut individual.genome, &grammar, first_node, &first_name, 1.0, &mut rng).unwrap());
        let after = individual.genome.parameter_value(last_node, &last_name);
        assert_ne!(after, before);
    }

    #[test]
    fn test_local_reference_targets_sibling() {
        let mut builder = GrammarBuilder::new();
        let jump = builder.add_macro("jump", "jmp {to}", [("to", ParameterSpec::local_reference(false, false, true))]);
        let nop = builder.add_macro("nop", "nop", Vec::<(&str, ParameterSpec)>::new());
        let top = builder.add_sequence("top", &[jump, nop, nop]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(9);
        let individual = Individual::random(&grammar, top, &mut rng).unwrap();
        let genome = &individual.genome;
        let root = genome.successors(NODE_ZERO)[0];
        let children = genome.successors(root);
        let target = genome.parameter_value(children[0], "to").and_then(|v| v.as_node()).unwrap();
        assert!(target == children[1] || target == children[2]);
    }

    #[test]
    fn test_local_reference_without_candidates_aborts() {
        let mut builder = GrammarBuilder::new();
        let jump = builder.add_macro("jump", "jmp {to}", [("to", ParameterSpec::local_reference(true, false, false))]);
        let top = builder.add_sequence("top", &[jump]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(9);
        assert!(Individual::random(&grammar, top, &mut rng).is_err());
    }

    #[test]
    fn test_global_reference_creates_target_with_zeal() {
        let mut builder = GrammarBuilder::new();
        let ret = builder.add_macro("ret", "ret", Vec::<(&str, ParameterSpec)>::new());
        let sub = builder.add_sequence("sub", &[ret]);
        let call = builder.add_macro(
            "call",
            "call {target}",
            [("target", ParameterSpec::global_reference("sub", true, CreativeZeal::Quota(1)))],
        );
        let main = builder.add_sequence("main", &[call]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(5);
        let individual = Individual::random(&grammar, main, &mut rng).unwrap();
        let genome = &individual.genome;
        assert!(genome.check_structure().is_ok());
        // main + call + sub + ret, plus NODE_ZERO
        assert_eq!(genome.node_count(), 5);
        let call_node = genome.successors(genome.successors(NODE_ZERO)[0])[0];
        let target = genome.parameter_value(call_node, "target").and_then(|v| v.as_node()).unwrap();
        assert_eq!(genome.element_of(target), Some(ret));
    }

    #[test]
    fn test_global_reference_without_zeal_aborts() {
        let mut builder = GrammarBuilder::new();
        let ret = builder.add_macro("ret", "ret", Vec::<(&str, ParameterSpec)>::new());
        let _sub = builder.add_sequence("sub", &[ret]);
        let call = builder.add_macro(
            "call",
            "call {target}",
            [("target", ParameterSpec::global_reference("sub", false, CreativeZeal::Never))],
        );
        let main = builder.add_sequence("main", &[call]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(5);
        assert!(Individual::random(&grammar, main, &mut rng).is_err());
    }
}
