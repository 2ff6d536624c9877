//! MCP server over stdio: transport, JSON-RPC 2.0, newline-delimited.
//!
//! Implements the Model Context Protocol (2025-06-18) over stdin/stdout.
//! Each line on stdin is one JSON-RPC request; each response is written as
//! one line on stdout. Logging goes to stderr so stdout stays protocol-only.
//!
//! Protocol flow:
//! 1. Client sends `initialize` → server responds with capabilities
//! 2. Client sends `notifications/initialized`
//! 3. Client sends `tools/list` → server returns the operation catalogue
//! 4. Client sends `tools/call` → server validates, runs the engine, returns result
//! 5. Client closes stdin → server exits

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::tools::ToolRouter;

/// Maximum size of a single JSON-RPC line (64 MiB). Sequence batches are large.
const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "genome-gateway";

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// MCP protocol types
// ---------------------------------------------------------------------------

/// MCP server info returned in initialize response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    name: String,
    version: String,
}

/// MCP server capabilities.
#[derive(Debug, Serialize)]
struct ServerCapabilities {
    tools: ToolsCapability,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolsCapability {
    list_changed: bool,
}

/// MCP initialize result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
}

/// MCP tool definition for tools/list.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// MCP tools/list result.
#[derive(Debug, Serialize)]
struct ToolsListResult {
    tools: Vec<ToolDefinition>,
}

/// MCP tools/call params.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// MCP content item in tools/call response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// MCP tools/call result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

// ---------------------------------------------------------------------------
// Server main loop
// ---------------------------------------------------------------------------

/// Run the MCP server on stdin/stdout until stdin closes.
///
/// # Errors
///
/// Returns an error if stdin/stdout I/O fails fatally.
pub fn run_mcp_server(config: GatewayConfig) -> Result<()> {
    info!(
        engine = %config.engine.program.display(),
        timeout_secs = config.timeout.map(|t| t.as_secs()),
        workers = config.defaults.workers,
        organism = config.defaults.organism,
        "genome-gateway MCP server starting"
    );

    let router = ToolRouter::new(Arc::new(config.engine()), config.defaults.clone());
    let stdin = std::io::stdin();
    let reader = std::io::BufReader::new(stdin.lock());
    let stdout = std::io::stdout().lock();
    serve(&router, reader, stdout)?;

    info!("genome-gateway MCP server stopped");
    Ok(())
}

/// Serve JSON-RPC requests from `reader`, writing responses to `out`.
///
/// Returns when `reader` reaches EOF. A malformed or oversized line is
/// answered with a parse error and the loop continues.
///
/// # Errors
///
/// Returns an error if reading or writing fails.
pub fn serve(router: &ToolRouter, mut reader: impl BufRead, mut out: impl Write) -> Result<()> {
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match read_line_limited(&mut reader, &mut line_buf, MAX_LINE_BYTES)
            .context("failed to read from stdin")?
        {
            LineRead::Eof => {
                info!("stdin closed, shutting down");
                return Ok(());
            }
            LineRead::TooLong => {
                warn!(max_bytes = MAX_LINE_BYTES, "request line too long, discarded");
                let resp = error_response(
                    None,
                    -32700,
                    &format!("parse error: line exceeds maximum size ({MAX_LINE_BYTES} bytes)"),
                );
                write_response(&mut out, &resp)?;
                continue;
            }
            LineRead::Line => {}
        }

        if line_buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        debug!(bytes = line_buf.len(), "received request");

        let request: JsonRpcRequest = match serde_json::from_slice(&line_buf) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "invalid JSON-RPC request");
                let resp = error_response(None, -32700, &format!("parse error: {e}"));
                write_response(&mut out, &resp)?;
                continue;
            }
        };

        // JSON-RPC 2.0: "jsonrpc" MUST be exactly "2.0".
        if request.jsonrpc != "2.0" {
            warn!(
                version = request.jsonrpc,
                "invalid JSON-RPC version (expected \"2.0\")"
            );
            let resp = error_response(
                request.id.clone(),
                -32600,
                &format!("invalid request: jsonrpc version must be \"2.0\", got \"{}\"", request.jsonrpc),
            );
            write_response(&mut out, &resp)?;
            continue;
        }

        // Notifications (no id) never receive a response.
        let is_notification = request.id.is_none();
        let response = dispatch(router, &request);

        if is_notification {
            debug!(method = request.method, "notification handled (no response)");
            continue;
        }

        if let Some(resp) = response {
            write_response(&mut out, &resp)?;
        }
    }
}

/// Dispatch a JSON-RPC request to the appropriate handler.
fn dispatch(router: &ToolRouter, req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => Some(handle_initialize(req)),
        "notifications/initialized" => {
            info!("client initialized");
            None
        }
        "tools/list" => Some(handle_tools_list(router, req)),
        "tools/call" => Some(handle_tools_call(router, req)),
        "ping" => Some(handle_ping(req)),
        _ => {
            warn!(method = req.method, "unknown method");
            Some(error_response(
                req.id.clone(),
                -32601,
                &format!("method not found: {}", req.method),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn handle_initialize(req: &JsonRpcRequest) -> JsonRpcResponse {
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_owned(),
        capabilities: ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        },
        server_info: ServerInfo {
            name: SERVER_NAME.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        },
    };

    success_response(req.id.clone(), &result)
}

fn handle_tools_list(router: &ToolRouter, req: &JsonRpcRequest) -> JsonRpcResponse {
    let tools = router.list_tools();
    let result = ToolsListResult { tools };
    success_response(req.id.clone(), &result)
}

fn handle_tools_call(router: &ToolRouter, req: &JsonRpcRequest) -> JsonRpcResponse {
    let params: ToolCallParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            return error_response(
                req.id.clone(),
                -32602,
                &format!("invalid tools/call params: {e}"),
            );
        }
    };

    let started = Instant::now();
    let result = router.call_tool(&params.name, params.arguments);
    info!(
        tool = params.name,
        is_error = result.is_error,
        elapsed_ms = started.elapsed().as_millis(),
        "tool call finished"
    );
    success_response(req.id.clone(), &result)
}

fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
    success_response(req.id.clone(), &serde_json::json!({}))
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn success_response(id: Option<serde_json::Value>, result: &impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(v) => JsonRpcResponse {
            jsonrpc: "2.0".to_owned(),
            id,
            result: Some(v),
            error: None,
        },
        Err(e) => {
            error!(error = %e, "failed to serialize success response");
            JsonRpcResponse {
                jsonrpc: "2.0".to_owned(),
                id,
                result: None,
                error: Some(JsonRpcError {
                    code: -32603,
                    message: format!("internal error: failed to serialize result: {e}"),
                    data: None,
                }),
            }
        }
    }
}

fn error_response(id: Option<serde_json::Value>, code: i64, message: &str) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_owned(),
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.to_owned(),
            data: None,
        }),
    }
}

/// Write a JSON-RPC response as a single line.
fn write_response(out: &mut impl Write, resp: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(resp).context("failed to serialize response")?;
    debug!(bytes = json.len(), "sending response");
    out.write_all(json.as_bytes())
        .context("failed to write to stdout")?;
    out.write_all(b"\n")
        .context("failed to write newline to stdout")?;
    out.flush().context("failed to flush stdout")?;
    Ok(())
}

/// Outcome of reading one request line.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// A complete line (or the final unterminated one) is in the buffer.
    Line,
    /// The line exceeded the limit; it was consumed and discarded.
    TooLong,
    Eof,
}

/// Read a line from `reader` into `buf`, stopping at newline or `max_bytes`.
///
/// Bytes are collected raw; UTF-8 is checked by the JSON parser so a
/// multi-byte character split across buffer fills is not an error.
fn read_line_limited(
    reader: &mut impl BufRead,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<LineRead> {
    loop {
        let available = reader.fill_buf().context("stdin fill_buf failed")?;
        if available.is_empty() {
            return Ok(if buf.is_empty() { LineRead::Eof } else { LineRead::Line });
        }
        let (consumed, found_newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        if buf.len() + consumed > max_bytes {
            reader.consume(consumed);
            if !found_newline {
                discard_rest_of_line(reader)?;
            }
            buf.clear();
            return Ok(LineRead::TooLong);
        }
        buf.extend_from_slice(&available[..consumed]);
        reader.consume(consumed);
        if found_newline {
            return Ok(LineRead::Line);
        }
    }
}

fn discard_rest_of_line(reader: &mut impl BufRead) -> Result<()> {
    loop {
        let rest = reader.fill_buf().context("stdin fill_buf failed")?;
        if rest.is_empty() {
            return Ok(());
        }
        if let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let eat = rest.len();
        reader.consume(eat);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_read_line_limited() {
        let mut reader = Cursor::new(b"{\"a\":1}\nnext".to_vec());
        let mut buf = Vec::new();
        assert_eq!(read_line_limited(&mut reader, &mut buf, 64).expect("read"), LineRead::Line);
        assert_eq!(buf, b"{\"a\":1}\n");

        buf.clear();
        assert_eq!(read_line_limited(&mut reader, &mut buf, 64).expect("read"), LineRead::Line);
        assert_eq!(buf, b"next");

        buf.clear();
        assert_eq!(read_line_limited(&mut reader, &mut buf, 64).expect("read"), LineRead::Eof);
    }

    #[test]
    fn test_oversized_line_is_skipped() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nok\n");
        let mut reader = std::io::BufReader::with_capacity(16, Cursor::new(input));
        let mut buf = Vec::new();
        assert_eq!(read_line_limited(&mut reader, &mut buf, 32).expect("read"), LineRead::TooLong);
        assert!(buf.is_empty());
        assert_eq!(read_line_limited(&mut reader, &mut buf, 32).expect("read"), LineRead::Line);
        assert_eq!(buf, b"ok\n");
    }

    #[test]
    fn test_tool_call_result_serialization() {
        let result = ToolCallResult {
            content: vec![ContentItem {
                content_type: "text".to_owned(),
                text: "{}".to_owned(),
            }],
            structured_content: Some(serde_json::json!({"count": 0})),
            is_error: false,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["structuredContent"]["count"], 0);
        assert!(json.get("isError").is_none());
    }
}
