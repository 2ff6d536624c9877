//! Static operation catalogue.

use std::collections::HashMap;

use super::{predict, score, utility, Defaults, Plan};
use crate::error::GatewayResult;
use crate::server::ToolDefinition;

/// How an operation reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Computed in-process.
    Local,
    /// One engine invocation per call.
    Single,
    /// One engine invocation per item, through the batch executor.
    Batch,
}

/// Validates raw arguments and decides what a call will do.
pub type Planner = fn(serde_json::Value, &Defaults) -> GatewayResult<Plan>;

/// One named capability.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub name: &'static str,
    pub description: &'static str,
    pub arity: Arity,
    pub input_schema: fn() -> serde_json::Value,
    pub plan: Planner,
}

impl Operation {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_owned(),
            description: self.description.to_owned(),
            input_schema: (self.input_schema)(),
        }
    }
}

/// Read-only name → operation mapping, built once at startup.
#[derive(Debug)]
pub struct ToolRegistry {
    operations: Vec<Operation>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let operations: Vec<Operation> = [predict::OPERATIONS, score::OPERATIONS, utility::OPERATIONS]
            .concat();
        let index = operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.name, i))
            .collect();
        Self { operations, index }
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.index.get(name).map(|&i| &self.operations[i])
    }

    /// Operations in catalogue order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
