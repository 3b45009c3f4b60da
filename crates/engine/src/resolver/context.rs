//! Evaluation context shared by all three resolution modes.

use crate::model::Workflow;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Everything an expression or template can reference during a run.
#[derive(Debug, Default, Clone)]
pub struct EvalContext {
    /// Resolved workflow variables, defaults included.
    pub variables: Map<String, Value>,
    /// Resolved locals.
    pub locals: Map<String, Value>,
    /// Outputs of completed steps, keyed by step name.
    pub steps: HashMap<String, Map<String, Value>>,
    /// Workflow metadata: name, description, version.
    pub workflow: Map<String, Value>,
    /// Present inside loop iterations.
    pub loop_binding: Option<LoopBinding>,
}

/// Per-iteration bindings for loop bodies.
#[derive(Debug, Clone)]
pub struct LoopBinding {
    /// Author-chosen binding name for the current element.
    pub variable: String,
    pub element: Value,
    pub index: usize,
    pub count: usize,
}

impl LoopBinding {
    /// The `loop` object exposed to expressions: index, count, first, last.
    pub fn as_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("index".into(), Value::from(self.index));
        map.insert("count".into(), Value::from(self.count));
        map.insert("first".into(), Value::Bool(self.index == 0));
        map.insert("last".into(), Value::Bool(self.index + 1 == self.count));
        Value::Object(map)
    }
}

impl EvalContext {
    /// Context seeded with workflow metadata only.
    pub fn for_workflow(workflow: &Workflow) -> Self {
        let mut meta = Map::new();
        meta.insert("name".into(), Value::String(workflow.name.clone()));
        if let Some(description) = &workflow.description {
            meta.insert("description".into(), Value::String(description.clone()));
        }
        if let Some(version) = &workflow.version {
            meta.insert("version".into(), Value::String(version.clone()));
        }
        Self {
            workflow: meta,
            ..Self::default()
        }
    }

    /// Record a completed step's outputs for later references.
    pub fn insert_step_outputs(&mut self, step: &str, outputs: &HashMap<String, Value>) {
        let map: Map<String, Value> = outputs.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
        self.steps.insert(step.to_string(), map);
    }

    /// Child context for one loop iteration. The element is also visible as
    /// a variable under the loop's binding name.
    pub fn with_loop(&self, variable: &str, element: Value, index: usize, count: usize) -> Self {
        let mut child = self.clone();
        child.variables.insert(variable.to_string(), element.clone());
        child.loop_binding = Some(LoopBinding {
            variable: variable.to_string(),
            element,
            index,
            count,
        });
        child
    }

    /// The `step` root object: step name → { outputs: {...} }.
    pub fn steps_as_value(&self) -> Value {
        let mut all = Map::new();
        for (name, outputs) in &self.steps {
            let mut wrapper = Map::new();
            wrapper.insert("outputs".into(), Value::Object(outputs.clone()));
            all.insert(name.clone(), Value::Object(wrapper));
        }
        Value::Object(all)
    }
}
