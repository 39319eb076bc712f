//! Pareto utilities for multi-objective fitness
//! Non-dominated sorting over any dominance relation

use crate::engines::evaluation::Fitness;

/// Check if objective vector A dominates objective vector B
/// A dominates B if A is no worse than B in all objectives and strictly better in at least one
pub fn dominates(a_objectives: &[Fitness], b_objectives: &[Fitness]) -> bool {
    if a_objectives.len() != b_objectives.len() {
        return false;
    }

    let mut at_least_one_better = false;

    for (a_val, b_val) in a_objectives.iter().zip(b_objectives) {
        if b_val.is_dominant(a_val) {
            return false;
        }
        if a_val.is_dominant(b_val) {
            at_least_one_better = true;
        }
    }

    at_least_one_better
}

/// Non-dominated sorting (NSGA-II bookkeeping)
/// Returns indices grouped by front (0 = best); equivalent to repeatedly
/// extracting the members not dominated by any remaining one.
/// Members caught in a dominance cycle end up together in a last front.
pub fn fast_non_dominated_sort(fitnesses: &[&Fitness]) -> Vec<Vec<usize>> {
    let n = fitnesses.len();

    // domination_count: how many members dominate i
    // dominated_solutions: members that i dominates
    let mut domination_count = vec![0usize; n];
    let mut dominated_solutions: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut assigned = vec![false; n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();

    for i in 0..n {
        for j in 0..n {
            if i != j && fitnesses[i].is_dominant(fitnesses[j]) {
                dominated_solutions[i].push(j);
                domination_count[j] += 1;
            }
        }
    }

    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
    while !current.is_empty() {
        let mut next_front = Vec::new();
        for &i in &current {
            assigned[i] = true;
        }
        for &i in &current {
            for &j in &dominated_solutions[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 && !assigned[j] {
                    next_front.push(j);
                }
            }
        }
        next_front.sort_unstable();
        next_front.dedup();
        fronts.push(std::mem::replace(&mut current, next_front));
    }

    let leftovers: Vec<usize> = (0..n).filter(|&i| !assigned[i]).collect();
    if !leftovers.is_empty() {
        fronts.push(leftovers);
    }

    fronts
}
