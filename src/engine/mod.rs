//! Engine bridge: forwards validated calls to the external prediction engine.
//!
//! An [`EngineInvocation`] is a single forwarded call with two parts:
//!
//! - argv: the engine-side operation name plus a flattened `--flag value`
//!   list of small scalars. Short lists travel as JSON text.
//! - stdin: one JSON object holding the bulky arguments (DNA sequences),
//!   `{}` when there are none. A single argv element is capped by the OS at
//!   128 KiB, well below the longest accepted sequence.
//!
//! The engine answers with one JSON envelope on stdout:
//!
//! ```text
//! {"success": true,  "result": <payload>, ...}
//! {"success": false, "error": "<message>", ...}
//! ```
//!
//! [`parse_envelope`] classifies that output; [`ProcessEngine`] runs one
//! engine process per invocation.

pub mod process;

use serde::{Deserialize, Deserializer};

use crate::error::{GatewayError, GatewayResult};

pub use process::{Credential, EngineCommand, ProcessEngine, CREDENTIAL_ENV};

/// Outcome of one engine invocation: the envelope payload or a classified error.
pub type EngineResult = GatewayResult<serde_json::Value>;

/// Bytes of unparseable output quoted back in a protocol error.
const OUTPUT_EXCERPT_BYTES: usize = 256;

/// Something that can execute an [`EngineInvocation`].
///
/// Implementations must be callable from several batch workers at once and
/// must not share per-call state between invocations.
pub trait Engine: Send + Sync {
    fn invoke(&self, invocation: &EngineInvocation) -> EngineResult;
}

/// One forwarded call. Built per call and dropped once its result is consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    operation: String,
    args: Vec<(String, String)>,
    input: serde_json::Map<String, serde_json::Value>,
}

impl EngineInvocation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: Vec::new(),
            input: serde_json::Map::new(),
        }
    }

    /// Put `key` into the stdin document. Used for values of unbounded size.
    #[must_use]
    pub fn input(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.input.insert(key.to_owned(), value.into());
        self
    }

    /// Append `--flag value`.
    #[must_use]
    pub fn arg(mut self, flag: &str, value: impl ToString) -> Self {
        self.args.push((flag.to_owned(), value.to_string()));
        self
    }

    /// Append `--flag <json>` for a structured value.
    #[must_use]
    pub fn json_arg(self, flag: &str, value: &serde_json::Value) -> Self {
        self.arg(flag, value)
    }

    /// Append `--flag ["a","b"]`, or nothing when `values` is empty.
    #[must_use]
    pub fn list_arg(self, flag: &str, values: &[String]) -> Self {
        if values.is_empty() {
            self
        } else {
            self.json_arg(flag, &serde_json::json!(values))
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Value of the first `flag` argument, if present.
    pub fn value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(f, _)| f == flag)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key` in the stdin document, if present.
    pub fn input_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.input.get(key)
    }

    pub fn inputs(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.input
    }

    /// The stdin document as bytes.
    pub fn stdin_document(&self) -> Vec<u8> {
        serde_json::to_vec(&self.input).unwrap_or_else(|_| b"{}".to_vec())
    }

    /// Command-line form: `<operation> --flag value ...`.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + self.args.len() * 2);
        argv.push(self.operation.clone());
        for (flag, value) in &self.args {
            argv.push(format!("--{flag}"));
            argv.push(value.clone());
        }
        argv
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    /// `Some(Null)` for an explicit `"result": null`, `None` when absent.
    #[serde(default, deserialize_with = "present")]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// Classify the complete standard output of a cleanly exited engine.
///
/// The whole buffer must be exactly one JSON document; pretty-printed output
/// spanning many lines is fine, trailing text is not.
pub fn parse_envelope(operation: &str, stdout: &[u8]) -> EngineResult {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Err(GatewayError::Protocol {
            operation: operation.to_owned(),
            reason: "engine produced no output".to_owned(),
        });
    }

    let envelope: Envelope = serde_json::from_slice(stdout).map_err(|e| {
        GatewayError::Protocol {
            operation: operation.to_owned(),
            reason: format!("{e}; output began with: {}", excerpt(stdout)),
        }
    })?;

    if !envelope.success {
        let message = match envelope.error {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => "engine reported failure without a message".to_owned(),
        };
        return Err(GatewayError::Engine {
            operation: operation.to_owned(),
            message,
        });
    }

    Ok(envelope
        .result
        .unwrap_or(serde_json::Value::Object(envelope.rest)))
}

fn excerpt(output: &[u8]) -> String {
    let end = output.len().min(OUTPUT_EXCERPT_BYTES);
    let mut text = String::from_utf8_lossy(&output[..end]).trim().to_owned();
    if output.len() > OUTPUT_EXCERPT_BYTES {
        text.push_str("...");
    }
    text
}
