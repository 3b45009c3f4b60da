//! Parsed workflow model.
//!
//! Produced by the HCL parser and immutable afterwards. Variable defaults
//! stay as unevaluated expression handles; the engine evaluates them against
//! a minimal context when the run's variables are merged.

use hcl::Expression;
use indexmap::IndexMap;
use std::time::Duration;

/// A declarative workflow. Identity is `name`.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub variables: Vec<Variable>,
    /// Raw local values; resolved by fixed point together with defaults.
    pub locals: IndexMap<String, String>,
    pub steps: Vec<Step>,
    pub parallel_groups: Vec<ParallelGroup>,
    /// Step names run after a fully successful execution.
    pub on_success: Vec<String>,
    /// Step names run after a failed (not cancelled) execution.
    pub on_failure: Vec<String>,
    pub templates: IndexMap<String, StepTemplate>,
    pub metadata: IndexMap<String, String>,
    pub outputs: IndexMap<String, OutputDecl>,
    pub dependencies: Vec<WorkflowDependency>,
    pub triggers: Vec<WorkflowTrigger>,
    /// Parsed for forward compatibility; carries no engine semantics.
    pub extends: Vec<String>,
    /// Parsed for forward compatibility; carries no engine semantics.
    pub imports: Vec<String>,
}

impl Workflow {
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Steps that participate in the normal plan, i.e. everything not
    /// reserved for an on_success/on_failure hook phase.
    pub fn plan_steps(&self) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|step| !self.on_success.contains(&step.name) && !self.on_failure.contains(&step.name))
            .collect()
    }

    /// Name of the parallel group a step belongs to, if any.
    pub fn parallel_group_of(&self, step_name: &str) -> Option<&ParallelGroup> {
        self.parallel_groups
            .iter()
            .find(|group| group.steps.iter().any(|member| member == step_name))
    }
}

/// A declared workflow variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    /// Opaque type expression, e.g. `string` or `list(string)`.
    pub type_expr: Option<String>,
    /// Lazy default; may contain templates referencing other variables.
    pub default: Option<Expression>,
    pub description: Option<String>,
    pub required: bool,
    /// Redacted in persisted state and logs.
    pub sensitive: bool,
    pub validation: Option<VariableValidation>,
}

#[derive(Debug, Clone)]
pub struct VariableValidation {
    pub condition: String,
    pub error_message: String,
}

/// One unit of work: a named action on a named plugin.
#[derive(Debug, Clone, Default)]
pub struct Step {
    pub name: String,
    pub plugin: String,
    pub action: String,
    /// Workflow-level template this step was expanded from.
    pub template_ref: Option<String>,
    /// Templated string parameters; typed values are inferred after
    /// substitution.
    pub params: IndexMap<String, String>,
    pub condition: Option<String>,
    pub loop_spec: Option<LoopSpec>,
    pub retry: Option<RetryPolicy>,
    pub timeout: Option<Duration>,
    pub continue_on: ContinueOn,
    /// Exported aliases: alias name → plugin output key.
    pub outputs: IndexMap<String, String>,
    pub depends_on: Vec<String>,
    pub subworkflow: Option<String>,
}

/// Loop specification for a step.
#[derive(Debug, Clone)]
pub struct LoopSpec {
    /// Expression producing the sequence to iterate.
    pub over: String,
    /// Binding name for the current element.
    pub variable: String,
    pub parallel: bool,
    pub max_workers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_secs(0),
            backoff: Backoff::Fixed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    Linear,
    Exponential,
    #[default]
    Fixed,
}

impl Backoff {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "linear" => Some(Self::Linear),
            "exponential" => Some(Self::Exponential),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

/// Whether the execution proceeds past a persistently failed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinueOn {
    pub error: bool,
    pub failure: bool,
}

impl ContinueOn {
    pub fn proceeds(self) -> bool {
        self.error || self.failure
    }
}

/// Workflow-level output declaration.
#[derive(Debug, Clone)]
pub struct OutputDecl {
    /// Templated value expression.
    pub value: String,
    pub description: Option<String>,
}

/// Reusable step shape referenced by `template`.
#[derive(Debug, Clone, Default)]
pub struct StepTemplate {
    pub plugin: String,
    pub action: String,
    pub params: IndexMap<String, String>,
}

/// Steps without dependency chains between them that may run concurrently.
#[derive(Debug, Clone)]
pub struct ParallelGroup {
    pub name: String,
    pub steps: Vec<String>,
}

/// A workflow that must complete before this one begins.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDependency {
    pub workflow_file: String,
    /// Variable overrides passed to the dependency.
    pub variables: IndexMap<String, String>,
    /// Output keys copied into the parent's variables afterwards.
    pub import_vars: Vec<String>,
    pub import_all: bool,
    pub required: bool,
}

/// A workflow fired after this one reaches a terminal status.
#[derive(Debug, Clone, Default)]
pub struct WorkflowTrigger {
    pub workflow_file: String,
    /// Variable overrides passed to the trigger.
    pub variables: IndexMap<String, String>,
    /// Parent outputs/variables exported by name.
    pub export_vars: Vec<String>,
    pub export_all: bool,
    pub on_success: bool,
    pub on_failure: bool,
}

impl WorkflowTrigger {
    /// Neither flag set means the trigger fires only on success.
    pub fn fires_for(&self, succeeded: bool) -> bool {
        if !self.on_success && !self.on_failure {
            return succeeded;
        }
        (succeeded && self.on_success) || (!succeeded && self.on_failure)
    }
}
