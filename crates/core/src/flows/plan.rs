use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::domain::workflow::WorkflowStep;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowGraphError {
    #[error("workflow has no steps")]
    Empty,
    #[error("duplicate step id `{0}`")]
    DuplicateStep(String),
    #[error("step `{step}` depends on unknown step `{dependency}`")]
    UnknownDependency { step: String, dependency: String },
    #[error("step `{0}` depends on itself")]
    SelfDependency(String),
    #[error("dependency cycle between steps {steps:?}")]
    Cycle { steps: Vec<String> },
}

/// Validated execution order for a workflow's steps.
///
/// Order is topological; among steps that are ready at the same time the one declared
/// first runs first, so an already-ordered chain keeps its declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionPlan {
    order: Vec<usize>,
}

impl ExecutionPlan {
    pub fn build(steps: &[WorkflowStep]) -> Result<Self, WorkflowGraphError> {
        if steps.is_empty() {
            return Err(WorkflowGraphError::Empty);
        }

        let mut index = HashMap::with_capacity(steps.len());
        for (position, step) in steps.iter().enumerate() {
            if index.insert(step.id.0.as_str(), position).is_some() {
                return Err(WorkflowGraphError::DuplicateStep(step.id.0.clone()));
            }
        }

        let mut in_degree = vec![0_usize; steps.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
        for (position, step) in steps.iter().enumerate() {
            let mut seen = BTreeSet::new();
            for dependency in &step.dependencies {
                if dependency == &step.id {
                    return Err(WorkflowGraphError::SelfDependency(step.id.0.clone()));
                }
                let Some(&upstream) = index.get(dependency.0.as_str()) else {
                    return Err(WorkflowGraphError::UnknownDependency {
                        step: step.id.0.clone(),
                        dependency: dependency.0.clone(),
                    });
                };
                if seen.insert(upstream) {
                    in_degree[position] += 1;
                    dependents[upstream].push(position);
                }
            }
        }

        let mut ready: BTreeSet<usize> =
            in_degree.iter().enumerate().filter(|(_, d)| **d == 0).map(|(i, _)| i).collect();
        let mut order = Vec::with_capacity(steps.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < steps.len() {
            let steps = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| steps[i].id.0.clone())
                .collect();
            return Err(WorkflowGraphError::Cycle { steps });
        }

        Ok(Self { order })
    }

    /// Step positions (indices into the declaration list) in execution order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
