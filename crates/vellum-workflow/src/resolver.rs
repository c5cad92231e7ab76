//! Dependency resolution over a workflow's declaration list.
//!
//! Pure function of the workflow: nothing executes, nothing is mutated.
//! The resulting order is the lexicographically-smallest topological sort
//! by declaration index, so independent steps keep declaration order and
//! re-resolving an unchanged workflow yields the identical order.

use std::collections::HashMap;

use vellum_core::error::{Result, VellumError};
use vellum_core::types::Workflow;

/// Produce a total execution order (indices into the declaration list)
/// such that every step appears after all of its dependencies.
///
/// Fails with `MissingDependency` when a declared dependency name does not
/// resolve to a step, and with `Cycle` when the dependency relation is not
/// a DAG. Missing names are reported before cycles.
pub fn resolve(workflow: &Workflow) -> Result<Vec<usize>> {
    let index_by_name: HashMap<&str, usize> = workflow
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| (step.name.as_str(), i))
        .collect();

    for step in &workflow.steps {
        for dep in &step.dependencies {
            if !index_by_name.contains_key(dep.as_str()) {
                return Err(VellumError::MissingDependency {
                    step: step.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let count = workflow.steps.len();
    let mut emitted = vec![false; count];
    let mut order = Vec::with_capacity(count);

    // Pick the lowest-index ready step each round. Workflows are small
    // declaration lists, so the quadratic scan stays cheap and keeps the
    // declaration-order tie-break obvious.
    while order.len() < count {
        let ready = (0..count).find(|&i| {
            !emitted[i]
                && workflow.steps[i]
                    .dependencies
                    .iter()
                    .all(|dep| emitted[index_by_name[dep.as_str()]])
        });

        match ready {
            Some(i) => {
                emitted[i] = true;
                order.push(i);
            }
            None => {
                let remaining = workflow
                    .steps
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !emitted[*i])
                    .map(|(_, step)| step.name.clone())
                    .collect();
                return Err(VellumError::Cycle { remaining });
            }
        }
    }

    Ok(order)
}
