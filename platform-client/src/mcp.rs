//! Browser session over the Playwright MCP server.
//!
//! The server is spawned as a child process and spoken to with line-delimited
//! JSON-RPC 2.0 on its stdio.

use engage_core::{BrowserConfig, BrowserError, BrowserSession, CoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub method: String,
    /// Absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn call(method: &str, id: u64, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            id: Some(id),
            params,
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            id: None,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<McpRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

type Pending = Arc<StdMutex<HashMap<u64, oneshot::Sender<McpResponse>>>>;

/// JSON-RPC connection over any byte stream pair.
pub struct McpConnection {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Pending,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl McpConnection {
    /// Must be called inside a tokio runtime; the reader runs as a task.
    pub fn from_streams<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: Pending = Arc::new(StdMutex::new(HashMap::new()));
        let reader = tokio::spawn(read_responses(reader, pending.clone()));

        Self {
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader,
        }
    }

    async fn write_message(&self, message: &McpRequest) -> Result<(), BrowserError> {
        let mut line = serde_json::to_string(message).map_err(|e| BrowserError::Transport {
            details: format!("Failed to serialize request: {}", e),
        })?;
        line.push('\n');
        debug!(method = %message.method, "Sending to MCP server");

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BrowserError::Transport {
                details: format!("Failed to write to MCP server: {}", e),
            })?;
        writer.flush().await.map_err(|e| BrowserError::Transport {
            details: format!("Failed to flush MCP server input: {}", e),
        })
    }

    fn forget(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, BrowserError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);

        if let Err(e) = self
            .write_message(&McpRequest::call(method, id, params))
            .await
        {
            self.forget(id);
            return Err(e);
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(BrowserError::Transport {
                    details: "MCP server closed the connection".to_string(),
                })
            }
            Err(_) => {
                self.forget(id);
                warn!(method = %method, "MCP request timed out after {:?}", self.request_timeout);
                return Err(BrowserError::RequestTimeout);
            }
        };

        if let Some(error) = response.error {
            return Err(BrowserError::Session {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), BrowserError> {
        self.write_message(&McpRequest::notification(method, params))
            .await
    }

    /// `initialize` handshake followed by `notifications/initialized`.
    pub async fn initialize(&self) -> Result<Value, BrowserError> {
        let result = self
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "engagerunner",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
            )
            .await?;
        self.notify("notifications/initialized", None).await?;
        Ok(result)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, BrowserError> {
        let result = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;

        let parsed: ToolCallResult =
            serde_json::from_value(result).map_err(|e| BrowserError::Transport {
                details: format!("Unexpected tools/call result: {}", e),
            })?;

        if parsed.is_error {
            return Err(BrowserError::ToolFailed {
                tool: name.to_string(),
                message: parsed.text(),
            });
        }
        Ok(parsed)
    }
}

impl Drop for McpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_responses<R: AsyncRead + Unpin>(reader: R, pending: Pending) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<McpResponse>(line) {
                    Ok(response) if response.result.is_some() || response.error.is_some() => {
                        let Some(id) = response.id else {
                            debug!("Ignoring MCP response without id");
                            continue;
                        };
                        let sender = pending
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .remove(&id);
                        match sender {
                            Some(sender) => {
                                let _ = sender.send(response);
                            }
                            None => debug!(id, "Ignoring MCP response for unknown request"),
                        }
                    }
                    Ok(_) => debug!("Ignoring MCP server message"),
                    Err(e) => debug!(error = %e, "Ignoring non JSON-RPC output from MCP server"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "MCP server read error");
                break;
            }
        }
    }

    // Dropping the senders fails every request still waiting.
    pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
    debug!("MCP reader exited");
}

/// Calls `source` with `arg` inside a zero-argument function, which is the
/// shape `browser_evaluate` accepts.
pub fn wrap_function(source: &str, arg: &Value) -> String {
    let source = source.trim().trim_end_matches(';');
    format!("() => ({})({})", source, arg)
}

/// Reads the JSON value out of a `browser_evaluate` response. Newer servers
/// put it under a `### Result` heading; older ones return it bare. Anything
/// that is not JSON comes back as a string.
pub fn parse_evaluate_output(text: &str) -> Value {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return value;
    }

    match result_section(trimmed) {
        Some(section) => {
            serde_json::from_str(section).unwrap_or_else(|_| Value::String(section.to_string()))
        }
        None => Value::String(trimmed.to_string()),
    }
}

fn result_section(text: &str) -> Option<&str> {
    const HEADING: &str = "### Result";
    let start = text.find(HEADING)? + HEADING.len();
    let rest = &text[start..];
    let end = rest.find("\n###").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Server name from an `initialize` result.
fn server_name(initialize_result: &Value) -> &str {
    initialize_result
        .pointer("/serverInfo/name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown")
}

/// A browser tab driven through `@playwright/mcp`, attached to an existing
/// Chrome over CDP. The server process is killed when the session drops.
pub struct PlaywrightSession {
    connection: McpConnection,
    _child: Option<Child>,
}

impl PlaywrightSession {
    pub async fn launch(config: &BrowserConfig, cdp_endpoint: &str) -> Result<Self, BrowserError> {
        info!(
            command = %config.mcp_command,
            args = ?config.mcp_args,
            endpoint = %cdp_endpoint,
            "Starting Playwright MCP server"
        );

        let mut cmd = Command::new(&config.mcp_command);
        cmd.args(&config.mcp_args)
            .arg("--cdp-endpoint")
            .arg(cdp_endpoint);
        if config.headless {
            cmd.arg("--headless");
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| BrowserError::LaunchFailed {
            command: config.mcp_command.clone(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| BrowserError::Transport {
            details: "Failed to get MCP server stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| BrowserError::Transport {
            details: "Failed to get MCP server stdout".to_string(),
        })?;

        let connection =
            McpConnection::from_streams(stdout, stdin, Duration::from_secs(config.timeout_secs));
        let server = connection.initialize().await?;
        let server_name = server_name(&server);
        info!(server = %server_name, "Playwright MCP session ready");

        Ok(Self {
            connection,
            _child: Some(child),
        })
    }

    /// Session over an already initialized connection.
    pub fn from_connection(connection: McpConnection) -> Self {
        Self {
            connection,
            _child: None,
        }
    }
}

impl BrowserSession for PlaywrightSession {
    async fn navigate(&self, url: &str) -> Result<(), CoreError> {
        debug!(url = %url, "Navigating");
        self.connection
            .call_tool("browser_navigate", json!({ "url": url }))
            .await?;
        Ok(())
    }

    async fn evaluate(&self, function_source: &str, arg: Value) -> Result<Value, CoreError> {
        let function = wrap_function(function_source, &arg);
        let result = self
            .connection
            .call_tool("browser_evaluate", json!({ "function": function }))
            .await?;
        Ok(parse_evaluate_output(&result.text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    fn reply(id: &Value, result: Value) -> Option<Value> {
        Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }

    fn text_result(text: &str) -> Value {
        json!({ "content": [{ "type": "text", "text": text }] })
    }

    fn fake_playwright(message: &Value) -> Option<Value> {
        let id = message.get("id")?;
        match message["method"].as_str()? {
            "initialize" => reply(
                id,
                json!({ "protocolVersion": PROTOCOL_VERSION, "serverInfo": { "name": "fake" } }),
            ),
            "tools/call" => match message["params"]["name"].as_str()? {
                "browser_navigate" => reply(id, text_result("### Ran Playwright code\nawait page.goto()")),
                "browser_evaluate" => {
                    let function = message["params"]["arguments"]["function"].clone();
                    reply(
                        id,
                        text_result(&format!(
                            "### Result\n{}\n\n### Ran Playwright code\nawait page.evaluate()",
                            function
                        )),
                    )
                }
                "failing_tool" => reply(
                    id,
                    json!({ "content": [{ "type": "text", "text": "boom" }], "isError": true }),
                ),
                "silent_tool" => None,
                _ => Some(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32602, "message": "unknown tool" }
                })),
            },
            _ => None,
        }
    }

    fn spawn_server(stream: DuplexStream) {
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(stream);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let message: Value = serde_json::from_str(&line).unwrap();
                if let Some(answer) = fake_playwright(&message) {
                    let out = format!("{}\n", answer);
                    write.write_all(out.as_bytes()).await.unwrap();
                }
            }
        });
    }

    async fn connect(timeout: Duration) -> McpConnection {
        let (client, server) = tokio::io::duplex(64 * 1024);
        spawn_server(server);
        let (read, write) = tokio::io::split(client);
        let connection = McpConnection::from_streams(read, write, timeout);
        connection.initialize().await.unwrap();
        connection
    }

    #[tokio::test]
    async fn test_handshake_and_navigate() {
        let session = PlaywrightSession::from_connection(connect(Duration::from_secs(5)).await);
        session.navigate("https://v.test/1").await.unwrap();
    }

    #[tokio::test]
    async fn test_evaluate_wraps_argument() {
        let session = PlaywrightSession::from_connection(connect(Duration::from_secs(5)).await);

        let value = session
            .evaluate("(args) => args.position;", json!({ "position": 3 }))
            .await
            .unwrap();

        // The fake server echoes the function it was asked to run.
        assert_eq!(
            value,
            Value::String(r#"() => ((args) => args.position)({"position":3})"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_tool_error_and_rpc_error() {
        let connection = connect(Duration::from_secs(5)).await;

        match connection.call_tool("failing_tool", json!({})).await {
            Err(BrowserError::ToolFailed { tool, message }) => {
                assert_eq!(tool, "failing_tool");
                assert_eq!(message, "boom");
            }
            other => panic!("expected ToolFailed, got {:?}", other.map(|r| r.text())),
        }

        match connection.call_tool("no_such_tool", json!({})).await {
            Err(BrowserError::Session { code, .. }) => assert_eq!(code, -32602),
            other => panic!("expected Session error, got {:?}", other.map(|r| r.text())),
        }
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let connection = connect(Duration::from_millis(50)).await;
        assert!(matches!(
            connection.call_tool("silent_tool", json!({})).await,
            Err(BrowserError::RequestTimeout)
        ));
    }

    #[tokio::test]
    async fn test_closed_server_fails_pending_requests() {
        let (client, server) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(client);
        let connection = McpConnection::from_streams(read, write, Duration::from_secs(5));

        // Read the request, then hang up without answering.
        tokio::spawn(async move {
            let (read, _write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            let _ = lines.next_line().await;
        });

        assert!(matches!(
            connection.request("initialize", None).await,
            Err(BrowserError::Transport { .. })
        ));
    }

    #[test]
    fn test_parse_evaluate_output() {
        assert_eq!(parse_evaluate_output("[1, 2]"), json!([1, 2]));
        assert_eq!(
            parse_evaluate_output("### Result\n[{\"url\":\"https://v.test\"}]\n\n### Ran Playwright code\n```js\n```"),
            json!([{ "url": "https://v.test" }])
        );
        assert_eq!(parse_evaluate_output("### Result\ntrue"), json!(true));
        assert_eq!(parse_evaluate_output("not json"), json!("not json"));
    }

    #[test]
    fn test_server_name_from_initialize_result() {
        assert_eq!(
            server_name(&json!({ "serverInfo": { "name": "Playwright", "version": "0.0.32" } })),
            "Playwright"
        );
        assert_eq!(server_name(&json!({ "capabilities": {} })), "unknown");
        assert_eq!(server_name(&json!({ "serverInfo": { "name": 7 } })), "unknown");
    }

    #[test]
    fn test_notification_has_no_id() {
        let encoded =
            serde_json::to_value(McpRequest::notification("notifications/initialized", None))
                .unwrap();
        assert_eq!(encoded, json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }));
    }
}
