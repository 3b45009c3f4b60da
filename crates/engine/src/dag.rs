//! Step ordering and cycle detection.

use crate::error::EngineError;
use crate::model::Step;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

/// Build a topologically ordered step list for execution.
///
/// Dependency references are validated at parse time; this detects cycles
/// and produces a stable order that respects declaration order among ready
/// steps.
pub fn order_steps<'a>(steps: &[&'a Step]) -> Result<Vec<&'a Step>, EngineError> {
    let mut lookup: IndexMap<&str, &Step> = IndexMap::new();
    for &step in steps {
        lookup.insert(step.name.as_str(), step);
    }

    let mut in_degrees: HashMap<&str, usize> = lookup.keys().map(|name| (*name, 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for (name, step) in &lookup {
        let mut seen = HashSet::new();
        for dependency in &step.depends_on {
            // Hook-only dependencies are outside the plan; ignore them here.
            if !lookup.contains_key(dependency.as_str()) || !seen.insert(dependency.as_str()) {
                continue;
            }
            *in_degrees.get_mut(name).expect("in-degree entry exists") += 1;
            adjacency.entry(dependency.as_str()).or_default().push(name);
        }
    }

    let mut queue: VecDeque<&str> = lookup
        .keys()
        .filter(|name| in_degrees.get(**name).copied().unwrap_or(0) == 0)
        .copied()
        .collect();

    let mut ordered = Vec::with_capacity(lookup.len());
    while let Some(name) = queue.pop_front() {
        ordered.push(name);
        if let Some(children) = adjacency.get(name) {
            for child in children {
                let degree = in_degrees.get_mut(child).expect("dependent step exists in degrees");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if ordered.len() != lookup.len() {
        let mut remaining: Vec<&str> = in_degrees
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(name, _)| name)
            .collect();
        remaining.sort_unstable();
        return Err(EngineError::cycle(remaining.join(", ")));
    }

    Ok(ordered.into_iter().map(|name| lookup[name]).collect())
}
