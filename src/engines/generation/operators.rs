//! Built-in genetic operators.
//!
//! Operators work on clones of their parents and report expected failures
//! as [`OperatorAbort`]; pruning, validation and bookkeeping are done by the
//! registry wrapper.

use crate::engines::generation::genome::Genome;
use crate::engines::generation::grammar::{ElementId, Grammar};
use crate::engines::generation::individual::Individual;
use crate::engines::generation::node_view::NodeView;
use crate::engines::generation::parameter::{mutate_parameter, mutate_until_changed, ParameterSpec};
use crate::engines::generation::registry::OperatorContext;
use crate::engines::generation::unroll::unroll_into;
use crate::error::{OperatorAbort, OperatorResult};
use crate::random::Randy;
use crate::types::{NodeId, Value, NODE_ZERO};
use log::debug;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Tournament selection: the fittest of `size` uniformly drawn individuals.
///
/// Individuals without a fitness never beat evaluated ones.
pub fn tournament_selection<'a>(
    individuals: &'a [Individual],
    size: usize,
    rng: &mut Randy,
) -> Option<&'a Individual> {
    let mut best: Option<&Individual> = None;
    for _ in 0..size.max(1) {
        let candidate = rng.choice(individuals)?;
        best = match best {
            Some(current) if !beats(candidate, current) => Some(current),
            _ => Some(candidate),
        };
    }
    best
}

fn beats(candidate: &Individual, current: &Individual) -> bool {
    match (candidate.fitness(), current.fitness()) {
        (Some(c), Some(b)) => c.is_fitter(b),
        (Some(_), None) => true,
        _ => false,
    }
}

// Initializers

pub fn random_individual(
    _parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
) -> OperatorResult<Vec<Individual>> {
    Ok(vec![Individual::random(ctx.grammar, ctx.top_frame, rng)?])
}

// Mutations

/// Parameter slots whose mutation can change the genome: shared parameters
/// are reachable only through their owner.
fn mutable_slots(genome: &Genome) -> Vec<(NodeId, String)> {
    genome
        .parameter_slots()
        .into_iter()
        .filter(|(node, name)| {
            let Some(parameter) = genome.node(*node).and_then(|d| d.parameters.get(name)) else {
                return false;
            };
            match parameter.shared_id() {
                Some(id) => genome.shared_owner(id) == Some(parameter.key),
                None => true,
            }
        })
        .collect()
}

/// Mutate one random parameter of the offspring.
pub fn single_parameter_mutation(
    parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
) -> OperatorResult<Vec<Individual>> {
    let parent = parents.first().ok_or(OperatorAbort::NoCandidates)?;
    let mut offspring = parent.clone_for_offspring();
    let slots = mutable_slots(&offspring.genome);
    let (node, name) = rng.choice(&slots).cloned().ok_or(OperatorAbort::NoCandidates)?;

    if !mutate_until_changed(&mut offspring.genome, ctx.grammar, node, &name, ctx.strength, rng)? {
        return Err(OperatorAbort::RangeExhausted(name));
    }
    Ok(vec![offspring])
}

fn array_slots(genome: &Genome) -> Vec<(NodeId, String, Vec<char>)> {
    genome
        .parameter_slots()
        .into_iter()
        .filter_map(|(node, name)| {
            let parameter = genome.node(node)?.parameters.get(&name)?;
            match parameter.spec.as_ref() {
                ParameterSpec::Array { symbols, .. } => Some((node, name, symbols.clone())),
                _ => None,
            }
        })
        .collect()
}

/// Redraw a few positions of one array parameter; the number of positions
/// grows with the strength.
pub fn single_element_array_parameter_mutation(
    parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
) -> OperatorResult<Vec<Individual>> {
    let parent = parents.first().ok_or(OperatorAbort::NoCandidates)?;
    let mut offspring = parent.clone_for_offspring();
    let slots = array_slots(&offspring.genome);
    let (node, name, symbols) = rng.choice(&slots).cloned().ok_or(OperatorAbort::NoCandidates)?;

    let mut value: Vec<char> = offspring
        .genome
        .parameter_value(node, &name)
        .and_then(|v| v.as_text().map(|t| t.chars().collect()))
        .ok_or_else(|| OperatorAbort::NoTarget(name.clone()))?;
    if value.is_empty() {
        return Err(OperatorAbort::RangeExhausted(name));
    }

    let positions = ((value.len() as f64 * 0.05 * ctx.strength).ceil() as usize).max(1);
    for _ in 0..positions {
        let i = rng.random_int(0, value.len() as i64, None, 1.0) as usize;
        if let Some(symbol) = rng.choice(&symbols) {
            value[i] = *symbol;
        }
    }
    offspring
        .genome
        .set_parameter_value(node, &name, Value::Text(value.into_iter().collect()));
    Ok(vec![offspring])
}

/// Insert one random pool macro at a random position of a bunch that can grow.
pub fn add_macro_to_bunch(
    parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
) -> OperatorResult<Vec<Individual>> {
    let parent = parents.first().ok_or(OperatorAbort::NoCandidates)?;
    let mut offspring = parent.clone_for_offspring();
    let genome = &offspring.genome;

    let candidates: Vec<NodeId> = genome
        .dfs_preorder()
        .into_iter()
        .filter(|n| {
            genome
                .element_of(*n)
                .and_then(|e| ctx.grammar.bunch_size(e))
                .map_or(false, |size| genome.framework_out_degree(*n) + 1 < size.end)
        })
        .collect();
    let bunch = *rng.choice(&candidates).ok_or(OperatorAbort::NoCandidates)?;
    let element = genome.element_of(bunch).ok_or(OperatorAbort::NoCandidates)?;
    let pool = ctx.grammar.bunch_pool(element).ok_or(OperatorAbort::NoCandidates)?;
    let new_macro = *rng.choice(pool).ok_or(OperatorAbort::NoCandidates)?;
    let len = genome.framework_out_degree(bunch);
    let position = rng.random_int(0, len as i64 + 1, None, 1.0) as usize;

    unroll_into(&mut offspring.genome, ctx.grammar, new_macro, bunch, Some(position), rng)?;
    Ok(vec![offspring])
}

/// Remove one macro that nothing links to from a bunch that can shrink.
///
/// Macros are ranked by how common their element is in the bunch; lower
/// strengths restrict the choice to the rarest ones.
pub fn remove_macro_from_bunch(
    parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
) -> OperatorResult<Vec<Individual>> {
    let parent = parents.first().ok_or(OperatorAbort::NoCandidates)?;
    let mut offspring = parent.clone_for_offspring();
    let genome = &offspring.genome;

    let bunches: Vec<NodeId> = genome
        .dfs_preorder()
        .into_iter()
        .filter(|n| {
            genome
                .element_of(*n)
                .and_then(|e| ctx.grammar.bunch_size(e))
                .map_or(false, |size| genome.framework_out_degree(*n) > size.start)
        })
        .collect();
    let bunch = *rng.choice(&bunches).ok_or(OperatorAbort::NoCandidates)?;

    let mut candidates: Vec<(NodeId, ElementId)> = genome
        .successors(bunch)
        .into_iter()
        .filter(|n| genome.in_degree(*n) == 1)
        .filter_map(|n| genome.element_of(n).map(|e| (n, e)))
        .filter(|(_, e)| ctx.grammar.is_macro(*e))
        .collect();
    if candidates.is_empty() {
        return Err(OperatorAbort::NoCandidates);
    }
    let mut frequency: HashMap<ElementId, usize> = HashMap::new();
    for (_, element) in &candidates {
        *frequency.entry(*element).or_default() += 1;
    }
    candidates.sort_by_key(|(_, e)| Reverse(frequency[e]));

    let start = ((candidates.len() as f64 * (1.0 - ctx.strength)).floor() as usize).min(candidates.len() - 1);
    let (victim, _) = *rng.choice(&candidates[start..]).ok_or(OperatorAbort::NoCandidates)?;
    offspring.genome.remove_subtree(victim);
    Ok(vec![offspring])
}

// Crossovers

/// Nodes of each element in preorder, `NODE_ZERO` excluded.
fn element_loci(genome: &Genome, keep: impl Fn(&Genome, NodeId) -> bool) -> BTreeMap<ElementId, Vec<NodeId>> {
    let mut loci: BTreeMap<ElementId, Vec<NodeId>> = BTreeMap::new();
    for node in genome.dfs_preorder() {
        if node == NODE_ZERO || !keep(genome, node) {
            continue;
        }
        if let Some(element) = genome.element_of(node) {
            loci.entry(element).or_default().push(node);
        }
    }
    loci
}

/// Replace the subtree rooted at `target` in `genome` with a copy of the
/// subtree rooted at `donor_root` in `donor`.
///
/// Structural parameters left without a target, either inside the copy or
/// pointing into the removed subtree from outside, are re-targeted.
pub fn splice_subtree(
    genome: &mut Genome,
    grammar: &Grammar,
    target: NodeId,
    donor: &Genome,
    donor_root: NodeId,
    rng: &mut Randy,
) -> OperatorResult<NodeId> {
    let parent = genome.predecessor(target).ok_or(OperatorAbort::NoCandidates)?;

    let removed = genome.subtree(target);
    let mut orphans: Vec<(NodeId, String)> = Vec::new();
    for node in &removed {
        for (source, key) in genome.links_into(*node) {
            if removed.contains(&source) {
                continue;
            }
            let name = genome.node(source).and_then(|d| {
                d.parameters
                    .iter()
                    .find(|(_, p)| p.key == key)
                    .map(|(name, _)| name.clone())
            });
            if let Some(name) = name {
                orphans.push((source, name));
            }
        }
    }

    let copy = genome
        .copy_subtree_from(donor, donor_root)
        .map_err(|e| OperatorAbort::InvalidOffspring(e.to_string()))?;
    genome
        .replace_child(parent, target, copy.root)
        .map_err(|e| OperatorAbort::InvalidOffspring(e.to_string()))?;
    genome.remove_subtree(target);

    for (node, name) in copy.dangling.into_iter().chain(orphans) {
        if genome.contains(node) {
            mutate_parameter(genome, grammar, node, &name, 1.0, rng)?;
        }
    }
    Ok(copy.root)
}

fn swap_crossover(
    parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
    keep: impl Fn(&Genome, NodeId) -> bool + Copy,
) -> OperatorResult<Vec<Individual>> {
    let (first, second) = match parents {
        [first, second, ..] => (*first, *second),
        _ => return Err(OperatorAbort::NoCandidates),
    };
    let mut offspring = first.clone_for_offspring();

    let mine = element_loci(&offspring.genome, keep);
    let theirs = element_loci(&second.genome, keep);
    let shared: Vec<ElementId> = mine.keys().filter(|e| theirs.contains_key(e)).copied().collect();
    let element = *rng.choice(&shared).ok_or(OperatorAbort::NoCandidates)?;

    let target = *mine.get(&element).and_then(|n| rng.choice(n)).ok_or(OperatorAbort::NoCandidates)?;
    let donor_root = *theirs
        .get(&element)
        .and_then(|n| rng.choice(n))
        .ok_or(OperatorAbort::NoCandidates)?;

    debug!(
        "Swapping {} ({}) with {} of {}",
        target,
        ctx.grammar.name(element),
        donor_root,
        second.id
    );
    splice_subtree(&mut offspring.genome, ctx.grammar, target, &second.genome, donor_root, rng)?;
    Ok(vec![offspring])
}

/// Replace a random subtree of the first parent with a subtree of the same
/// element taken from the second parent.
pub fn node_swap_crossover(
    parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
) -> OperatorResult<Vec<Individual>> {
    swap_crossover(parents, ctx, rng, |_, _| true)
}

/// Node swap restricted to nodes that are the target of some link.
pub fn linked_node_crossover(
    parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
) -> OperatorResult<Vec<Individual>> {
    swap_crossover(parents, ctx, rng, |genome, node| !genome.links_into(node).is_empty())
}

/// Node swap restricted to single macros.
pub fn leaf_crossover(
    parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
) -> OperatorResult<Vec<Individual>> {
    let grammar = ctx.grammar;
    swap_crossover(parents, ctx, rng, move |genome, node| {
        genome.element_of(node).map_or(false, |e| grammar.is_macro(e))
    })
}

/// Element names from the root down to `node`, then the parameter name.
fn classpath(genome: &Genome, grammar: &Grammar, node: NodeId, name: &str) -> String {
    let view = NodeView::new(genome, grammar, node);
    let path: Vec<&str> = view
        .path()
        .into_iter()
        .skip(1)
        .map(|n| view.view(n).name())
        .collect();
    format!("{}.{}", path.join("/"), name)
}

fn arrays_by_classpath(genome: &Genome, grammar: &Grammar) -> BTreeMap<String, Vec<(NodeId, String)>> {
    let mut groups: BTreeMap<String, Vec<(NodeId, String)>> = BTreeMap::new();
    for (node, name, _) in array_slots(genome) {
        groups
            .entry(classpath(genome, grammar, node, &name))
            .or_default()
            .push((node, name));
    }
    groups
}

/// Uniform crossover between two array parameters found at the same place
/// of the two parents.
pub fn array_parameter_uniform_crossover(
    parents: &[&Individual],
    ctx: &OperatorContext<'_>,
    rng: &mut Randy,
) -> OperatorResult<Vec<Individual>> {
    let (first, second) = match parents {
        [first, second, ..] => (*first, *second),
        _ => return Err(OperatorAbort::NoCandidates),
    };
    let mut offspring = first.clone_for_offspring();

    let mine = arrays_by_classpath(&offspring.genome, ctx.grammar);
    let theirs = arrays_by_classpath(&second.genome, ctx.grammar);
    let common: Vec<&String> = mine.keys().filter(|k| theirs.contains_key(*k)).collect();
    let classpath = *rng.choice(&common).ok_or(OperatorAbort::NoCandidates)?;

    let (node, name) = mine
        .get(classpath)
        .and_then(|slots| rng.choice(slots))
        .cloned()
        .ok_or(OperatorAbort::NoCandidates)?;
    let (donor_node, donor_name) = theirs
        .get(classpath)
        .and_then(|slots| rng.choice(slots))
        .cloned()
        .ok_or(OperatorAbort::NoCandidates)?;

    let text = |genome: &Genome, node: NodeId, name: &str| {
        genome
            .parameter_value(node, name)
            .and_then(|v| v.as_text().map(|t| t.chars().collect::<Vec<char>>()))
    };
    let own = text(&offspring.genome, node, &name).ok_or_else(|| OperatorAbort::NoTarget(name.clone()))?;
    let other = text(&second.genome, donor_node, &donor_name)
        .ok_or_else(|| OperatorAbort::NoTarget(donor_name.clone()))?;
    if own.len() != other.len() {
        return Err(OperatorAbort::RangeExhausted(format!("{} length mismatch", classpath)));
    }

    let mixed: String = own
        .iter()
        .zip(&other)
        .map(|(a, b)| if rng.boolean(0.5) { *a } else { *b })
        .collect();
    offspring.genome.set_parameter_value(node, &name, Value::Text(mixed));
    Ok(vec![offspring])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::fitness::Fitness;
    use crate::engines::generation::grammar::GrammarBuilder;
    use crate::engines::generation::parameter::CreativeZeal;

    fn no_params() -> Vec<(&'static str, ParameterSpec)> {
        Vec::new()
    }

    fn ctx(grammar: &Grammar, top: ElementId) -> OperatorContext<'_> {
        OperatorContext {
            grammar,
            top_frame: top,
            strength: 1.0,
        }
    }

    fn bunch_grammar() -> (Grammar, ElementId, ElementId) {
        let mut builder = GrammarBuilder::new();
        let a = builder.add_macro("a", "a {x}", [("x", ParameterSpec::integer(0, 100))]);
        let b = builder.add_macro("b", "b", no_params());
        let body = builder.add_bunch("body", &[a, b], 1..8);
        let top = builder.add_sequence("top", &[body]);
        (builder.build().unwrap(), top, body)
    }

    #[test]
    fn test_tournament_prefers_fitter() {
        let (grammar, top, _) = bunch_grammar();
        let mut rng = Randy::new(42);
        let mut individuals: Vec<Individual> = (0..4)
            .map(|_| Individual::random(&grammar, top, &mut rng).unwrap())
            .collect();
        for (i, individual) in individuals.iter_mut().enumerate() {
            individual.set_fitness(Fitness::Integer(i as i64)).unwrap();
        }
        let winner = tournament_selection(&individuals, 50, &mut rng).unwrap();
        assert_eq!(winner.fitness(), Some(&Fitness::Integer(3)));
        assert!(tournament_selection(&[], 2, &mut rng).is_none());
    }

    #[test]
    fn test_single_parameter_mutation_changes_value() {
        let mut builder = GrammarBuilder::new();
        let m = builder.add_macro("m", "{v}", [("v", ParameterSpec::integer(0, 100))]);
        let top = builder.add_sequence("top", &[m]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(42);
        let parent = Individual::random(&grammar, top, &mut rng).unwrap();
        let slot = parent.genome.parameter_slots()[0].clone();
        let before = parent.genome.parameter_value(slot.0, &slot.1);

        let offspring = single_parameter_mutation(&[&parent], &ctx(&grammar, top), &mut rng).unwrap();
        assert_eq!(offspring.len(), 1);
        assert_ne!(offspring[0].genome.parameter_value(slot.0, &slot.1), before);
        assert_eq!(parent.genome.parameter_value(slot.0, &slot.1), before);
    }

    #[test]
    fn test_mutation_without_parameters_aborts() {
        let mut builder = GrammarBuilder::new();
        let m = builder.add_macro("m", "m", no_params());
        let top = builder.add_sequence("top", &[m]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(42);
        let parent = Individual::random(&grammar, top, &mut rng).unwrap();
        assert_eq!(
            single_parameter_mutation(&[&parent], &ctx(&grammar, top), &mut rng),
            Err(OperatorAbort::NoCandidates)
        );
    }

    #[test]
    fn test_array_mutation_keeps_alphabet() {
        let mut builder = GrammarBuilder::new();
        let word = builder.add_macro("word", "{bits}", [("bits", ParameterSpec::array("01", 40))]);
        let top = builder.add_sequence("top", &[word]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(3);
        let parent = Individual::random(&grammar, top, &mut rng).unwrap();
        let offspring =
            single_element_array_parameter_mutation(&[&parent], &ctx(&grammar, top), &mut rng).unwrap();
        let (node, name) = offspring[0].genome.parameter_slots()[0].clone();
        let text = offspring[0].genome.parameter_value(node, &name).unwrap();
        let text = text.as_text().unwrap();
        assert_eq!(text.len(), 40);
        assert!(text.chars().all(|c| c == '0' || c == '1'));
    }

    #[test]
    fn test_bunch_resize_respects_bounds() {
        let (grammar, top, body) = bunch_grammar();
        let mut rng = Randy::new(11);
        let context = ctx(&grammar, top);
        let mut current = Individual::random(&grammar, top, &mut rng).unwrap();

        for round in 0..40 {
            let result = if round % 3 == 0 {
                remove_macro_from_bunch(&[&current], &context, &mut rng)
            } else {
                add_macro_to_bunch(&[&current], &context, &mut rng)
            };
            if let Ok(mut offspring) = result {
                let next = offspring.remove(0);
                assert!(next.is_valid(&grammar), "{:?}", next.validate(&grammar));
                current = next;
            }
            let bunch_node = current
                .genome
                .dfs_preorder()
                .into_iter()
                .find(|n| current.genome.element_of(*n) == Some(body))
                .unwrap();
            assert!((1..8).contains(&current.genome.framework_out_degree(bunch_node)));
        }
    }

    #[test]
    fn test_full_bunch_cannot_grow() {
        let mut builder = GrammarBuilder::new();
        let a = builder.add_macro("a", "a", no_params());
        let body = builder.add_bunch("body", &[a], 3..4);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(1);
        let parent = Individual::random(&grammar, body, &mut rng).unwrap();
        let context = ctx(&grammar, body);
        assert!(add_macro_to_bunch(&[&parent], &context, &mut rng).is_err());
        assert!(remove_macro_from_bunch(&[&parent], &context, &mut rng).is_err());
    }

    #[test]
    fn test_node_swap_keeps_tree() {
        let (grammar, top, _) = bunch_grammar();
        let mut rng = Randy::new(8);
        let context = ctx(&grammar, top);
        for _ in 0..20 {
            let first = Individual::random(&grammar, top, &mut rng).unwrap();
            let second = Individual::random(&grammar, top, &mut rng).unwrap();
            let offspring = node_swap_crossover(&[&first, &second], &context, &mut rng).unwrap();
            assert!(offspring[0].is_valid(&grammar));
        }
    }

    #[test]
    fn test_splice_rewires_external_links() {
        let mut builder = GrammarBuilder::new();
        let ret = builder.add_macro("ret", "ret", no_params());
        builder.add_sequence("sub", &[ret]);
        let call = builder.add_macro(
            "call",
            "call {target}",
            [("target", ParameterSpec::global_reference("sub", true, CreativeZeal::Never))],
        );
        let sub_ref = builder.add_macro(
            "entry",
            "entry {target}",
            [("target", ParameterSpec::global_reference("sub", true, CreativeZeal::Quota(1)))],
        );
        let main = builder.add_sequence("main", &[sub_ref, call]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(21);
        let context = ctx(&grammar, main);
        for _ in 0..10 {
            let first = Individual::random(&grammar, main, &mut rng).unwrap();
            let second = Individual::random(&grammar, main, &mut rng).unwrap();
            if let Ok(offspring) = linked_node_crossover(&[&first, &second], &context, &mut rng) {
                let mut child = offspring.into_iter().next().unwrap();
                child.genome.discard_useless_components();
                assert!(child.is_valid(&grammar), "{:?}", child.validate(&grammar));
            }
        }
    }

    #[test]
    fn test_array_crossover_mixes_parents() {
        let mut builder = GrammarBuilder::new();
        let word = builder.add_macro("word", "{bits}", [("bits", ParameterSpec::array("01", 64))]);
        let top = builder.add_sequence("top", &[word]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(4);
        let first = Individual::random(&grammar, top, &mut rng).unwrap();
        let second = Individual::random(&grammar, top, &mut rng).unwrap();
        let offspring =
            array_parameter_uniform_crossover(&[&first, &second], &ctx(&grammar, top), &mut rng).unwrap();

        let value = |individual: &Individual| {
            let (node, name) = individual.genome.parameter_slots()[0].clone();
            individual.genome.parameter_value(node, &name).unwrap().as_text().unwrap().to_string()
        };
        let (a, b, child) = (value(&first), value(&second), value(&offspring[0]));
        for ((x, y), z) in a.chars().zip(b.chars()).zip(child.chars()) {
            assert!(z == x || z == y);
        }
    }
}
