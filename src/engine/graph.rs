//! Step dependency graph ordering.

use std::collections::HashMap;

use crate::error::GraphError;
use crate::steps::Step;

/// Order steps so every step follows its dependencies (Kahn's algorithm).
///
/// Among steps that are ready at the same time, the one declared first runs
/// first, so the result is stable for a given input order.  Returns indices
/// into `steps`.
///
/// # Errors
///
/// - [`GraphError::DuplicateStep`] if two steps share an id
/// - [`GraphError::UnknownDependency`] if a dependency names no step
/// - [`GraphError::CycleDetected`] naming the steps on one cycle
pub fn topological_order(steps: &[&dyn Step]) -> Result<Vec<usize>, GraphError> {
    let mut id_to_idx: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        if id_to_idx.insert(step.id(), i).is_some() {
            return Err(GraphError::DuplicateStep(step.id().to_string()));
        }
    }

    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(steps.len());
    for step in steps {
        let mut resolved = Vec::with_capacity(step.depends_on().len());
        for dep in step.depends_on() {
            let &idx = id_to_idx
                .get(dep.as_str())
                .ok_or_else(|| GraphError::UnknownDependency {
                    step: step.id().to_string(),
                    dependency: dep.clone(),
                })?;
            if !resolved.contains(&idx) {
                resolved.push(idx);
            }
        }
        deps.push(resolved);
    }

    let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut reverse_deps: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step_deps) in deps.iter().enumerate() {
        for &dep in step_deps {
            if let Some(rd) = reverse_deps.get_mut(dep) {
                rd.push(i);
            }
        }
    }

    // `ready` is kept sorted by declaration index; the smallest runs next.
    let mut ready: Vec<usize> = in_degree
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| if d == 0 { Some(i) } else { None })
        .collect();
    let mut order = Vec::with_capacity(steps.len());

    while !ready.is_empty() {
        let idx = ready.remove(0);
        order.push(idx);
        if let Some(dependents) = reverse_deps.get(idx) {
            for &dependent in dependents {
                if let Some(count) = in_degree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        let pos = ready.partition_point(|&r| r < dependent);
                        ready.insert(pos, dependent);
                    }
                }
            }
        }
    }

    if order.len() == steps.len() {
        Ok(order)
    } else {
        Err(GraphError::CycleDetected(find_cycle(steps, &deps, &in_degree)))
    }
}

/// Walk unresolved dependencies from a blocked step until a step repeats.
fn find_cycle(steps: &[&dyn Step], deps: &[Vec<usize>], in_degree: &[usize]) -> Vec<String> {
    let blocked = |i: usize| in_degree.get(i).is_some_and(|&d| d > 0);
    let Some(start) = (0..steps.len()).find(|&i| blocked(i)) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = vec![start];
    let mut current = start;
    loop {
        // Every blocked step has at least one blocked dependency.
        let Some(&next) = deps
            .get(current)
            .and_then(|d| d.iter().find(|&&n| blocked(n)))
        else {
            return Vec::new();
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            return path
                .get(pos..)
                .unwrap_or_default()
                .iter()
                .filter_map(|&i| steps.get(i).map(|s| s.id().to_string()))
                .collect();
        }
        path.push(next);
        current = next;
    }
}
