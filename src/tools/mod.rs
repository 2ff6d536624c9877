//! Tool router: registry lookup, validation and engine dispatch.
//!
//! Each operation's planner validates the raw JSON arguments and turns them
//! into a [`Plan`]: a local answer, one engine invocation, or a batch of
//! invocations for the [`batch`](crate::batch) executor. The router runs the
//! plan and returns the raw [`Outcome`]; [`Outcome::into_tool_result`]
//! renders it for MCP.

pub mod predict;
pub mod registry;
pub mod schema;
pub mod score;
pub mod utility;

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::batch;
use crate::engine::{Engine, EngineInvocation, EngineResult};
use crate::error::{GatewayError, GatewayResult};
use crate::genome::validate::{self, Violations};
use crate::genome::{DEFAULT_ORGANISM, DEFAULT_WORKERS};
use crate::server::{ContentItem, ToolCallResult, ToolDefinition};

pub use registry::{Arity, Operation, ToolRegistry};

/// Settings applied when a call leaves them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub organism: String,
    pub workers: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            organism: DEFAULT_ORGANISM.to_owned(),
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Post-processing for fan-out operations that answer with one payload.
pub type Gather = Box<dyn FnOnce(Vec<EngineResult>) -> EngineResult + Send>;

/// What a validated call will do.
pub enum Plan {
    /// Answer computed in-process; no engine involved.
    Local(serde_json::Value),
    /// One engine invocation.
    Single(EngineInvocation),
    /// Independent invocations, one result per item.
    Batch {
        invocations: Vec<EngineInvocation>,
        workers: usize,
    },
    /// Independent invocations folded into one payload.
    Gather {
        invocations: Vec<EngineInvocation>,
        workers: usize,
        gather: Gather,
    },
}

/// Raw result of a dispatched call, before rendering.
#[derive(Debug)]
pub enum Outcome {
    Single(serde_json::Value),
    Batch(Vec<EngineResult>),
}

impl Outcome {
    /// Render as an MCP tool result.
    ///
    /// Batch outcomes keep each item's success or error at its input index;
    /// the call as a whole is flagged as an error only if no item succeeded.
    pub fn into_tool_result(self) -> ToolCallResult {
        match self {
            Self::Single(payload) => success_result(payload),
            Self::Batch(results) => {
                let count = results.len();
                let items: Vec<serde_json::Value> = results
                    .into_iter()
                    .enumerate()
                    .map(|(index, result)| match result {
                        Ok(payload) => serde_json::json!({
                            "index": index,
                            "success": true,
                            "result": payload,
                        }),
                        Err(e) => serde_json::json!({
                            "index": index,
                            "success": false,
                            "error": e.to_json(),
                        }),
                    })
                    .collect();
                let succeeded = items.iter().filter(|i| i["success"] == true).count();
                let mut result = success_result(serde_json::json!({
                    "count": count,
                    "succeeded": succeeded,
                    "failed": count - succeeded,
                    "results": items,
                }));
                result.is_error = succeeded == 0;
                result
            }
        }
    }
}

fn success_result(payload: serde_json::Value) -> ToolCallResult {
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    ToolCallResult {
        content: vec![ContentItem {
            content_type: "text".to_owned(),
            text,
        }],
        structured_content: payload.is_object().then_some(payload),
        is_error: false,
    }
}

/// Render a failed call as an MCP tool result.
pub fn error_result(error: &GatewayError) -> ToolCallResult {
    ToolCallResult {
        content: vec![ContentItem {
            content_type: "text".to_owned(),
            text: format!("Error [{}]: {error}", error.kind()),
        }],
        structured_content: Some(error.to_json()),
        is_error: true,
    }
}

/// Organism / output-track / ontology options shared by prediction calls.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPredictionOptions {
    #[serde(default)]
    pub organism: Option<String>,
    #[serde(default)]
    pub output_types: Option<Vec<String>>,
    #[serde(default)]
    pub ontology_terms: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct PredictionOptions {
    pub organism: String,
    pub output_types: Vec<String>,
    pub ontology_terms: Vec<String>,
}

impl RawPredictionOptions {
    pub fn validate(&self, v: &mut Violations, defaults: &Defaults) -> PredictionOptions {
        PredictionOptions {
            organism: validate::organism(
                v,
                "organism",
                self.organism.as_deref(),
                &defaults.organism,
            ),
            output_types: validate::output_types(v, "outputTypes", self.output_types.as_deref()),
            ontology_terms: validate::ontology_terms(
                v,
                "ontologyTerms",
                self.ontology_terms.as_deref(),
            ),
        }
    }
}

impl PredictionOptions {
    /// Append the engine flags for these options.
    pub fn apply(&self, invocation: EngineInvocation) -> EngineInvocation {
        invocation
            .arg("organism", &self.organism)
            .list_arg("output-types", &self.output_types)
            .list_arg("ontology-terms", &self.ontology_terms)
    }
}

/// Pass `results` through unless every one of them failed, in which case the
/// first failure is the answer.
pub fn require_any_success(results: Vec<EngineResult>) -> GatewayResult<Vec<EngineResult>> {
    if results.is_empty() || results.iter().any(Result::is_ok) {
        return Ok(results);
    }
    match results.into_iter().find_map(Result::err) {
        Some(first) => Err(first),
        None => Ok(Vec::new()),
    }
}

/// Dispatches MCP tool calls through the registry to the engine.
pub struct ToolRouter {
    registry: ToolRegistry,
    engine: Arc<dyn Engine>,
    defaults: Defaults,
}

impl ToolRouter {
    pub fn new(engine: Arc<dyn Engine>, defaults: Defaults) -> Self {
        Self {
            registry: ToolRegistry::new(),
            engine,
            defaults,
        }
    }

    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// List all operations with their JSON Schema definitions.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.registry.operations().map(Operation::definition).collect()
    }

    /// Validate and run one operation, returning its raw outcome.
    ///
    /// # Errors
    ///
    /// `UnknownOperation` for unregistered names, `Validation` before any
    /// engine contact, or the engine error of a single-arity call.
    pub fn dispatch(&self, name: &str, arguments: serde_json::Value) -> GatewayResult<Outcome> {
        let operation = self
            .registry
            .get(name)
            .ok_or_else(|| GatewayError::UnknownOperation {
                name: name.to_owned(),
            })?;

        debug!(tool = name, arity = ?operation.arity, "dispatching tool call");
        let plan = (operation.plan)(arguments, &self.defaults)?;
        self.run(plan)
    }

    fn run(&self, plan: Plan) -> GatewayResult<Outcome> {
        match plan {
            Plan::Local(payload) => Ok(Outcome::Single(payload)),
            Plan::Single(invocation) => self.engine.invoke(&invocation).map(Outcome::Single),
            Plan::Batch {
                invocations,
                workers,
            } => self.fan_out(&invocations, workers).map(Outcome::Batch),
            Plan::Gather {
                invocations,
                workers,
                gather,
            } => {
                let results = self.fan_out(&invocations, workers)?;
                gather(results).map(Outcome::Single)
            }
        }
    }

    fn fan_out(
        &self,
        invocations: &[EngineInvocation],
        workers: usize,
    ) -> GatewayResult<Vec<EngineResult>> {
        batch::execute(invocations, workers, |_, invocation| {
            self.engine.invoke(invocation)
        })
    }

    /// Dispatch and render for MCP. Failures become `isError` results.
    pub fn call_tool(&self, name: &str, arguments: serde_json::Value) -> ToolCallResult {
        match self.dispatch(name, arguments) {
            Ok(outcome) => outcome.into_tool_result(),
            Err(e) => {
                warn!(tool = name, kind = %e.kind(), error = %e, "tool call failed");
                error_result(&e)
            }
        }
    }
}
