//! Tool caller: connect to an MCP server, discover tools, invoke them.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::framing::{Frame, LineReader};
use crate::protocol::{
    CallResult, CallToolParams, CallToolResult, GetPromptParams, GetPromptResult,
    InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListPromptsResult,
    ListToolsResult, Prompt, RequestId, Tool,
};

/// Default timeout for one request/response exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum size of a single response line (1MB).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Configuration for an MCP server started as a child process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

struct Connection {
    reader: LineReader<Box<dyn AsyncBufRead + Send + Unpin>>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl Connection {
    async fn send(&mut self, message: &JsonRpcRequest) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<JsonRpcResponse> {
        let line = match self.reader.next_frame().await? {
            Frame::Line(line) => line,
            Frame::TooLarge(size) => {
                return Err(Error::OutputTooLarge {
                    size,
                    max: MAX_OUTPUT_SIZE,
                });
            }
            Frame::Eof => return Err(Error::ServerExited),
        };

        serde_json::from_slice(&line)
            .map_err(|e| Error::InvalidResponse(format!("undecodable message: {e}")))
    }
}

/// A connected, initialized MCP client.
///
/// Dropping the client closes the connection (and kills a spawned server
/// process), so the connection is released on every exit path.
pub struct Client {
    name: String,
    process: Option<Mutex<Child>>,
    conn: Mutex<Connection>,
    next_id: AtomicI64,
    timeout: Duration,
    server_info: Option<InitializeResult>,
}

impl Client {
    /// Spawn a server process and talk to it over its stdio.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {e}", config.command)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("failed to capture stdin".to_string()))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("failed to capture stdout".to_string()))?;

        let mut client = Self::new(config.name, BufReader::new(stdout), stdin, Some(process));
        client.initialize().await?;
        Ok(client)
    }

    /// Connect to a server listening on a TCP address.
    pub async fn connect_tcp(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let name = stream.peer_addr()?.to_string();
        let (read, write) = stream.into_split();

        let mut client = Self::new(name, BufReader::new(read), write, None);
        client.initialize().await?;
        Ok(client)
    }

    /// Connect over an arbitrary byte stream (e.g. an in-process duplex pipe).
    pub async fn connect<R, W>(name: impl Into<String>, reader: R, writer: W) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut client = Self::new(name.into(), BufReader::new(reader), writer, None);
        client.initialize().await?;
        Ok(client)
    }

    fn new<R, W>(name: String, reader: R, writer: W, process: Option<Child>) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            name,
            process: process.map(Mutex::new),
            conn: Mutex::new(Connection {
                reader: LineReader::new(Box::new(reader), MAX_OUTPUT_SIZE),
                writer: Box::new(writer),
            }),
            next_id: AtomicI64::new(1),
            timeout: DEFAULT_TIMEOUT,
            server_info: None,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the connection name (server name or peer address).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server info from the initialize handshake.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    async fn initialize(&mut self) -> Result<()> {
        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;

        self.notify("notifications/initialized").await?;

        tracing::debug!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "connected to MCP server"
        );
        self.server_info = Some(result);
        Ok(())
    }

    /// List the tools the server exposes, in server order.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result: ListToolsResult = self.request("tools/list", None::<()>).await?;
        Ok(result.tools)
    }

    /// Names of the available tools, in server order.
    pub async fn discover(&self) -> Result<Vec<String>> {
        let tools = self.list_tools().await?;
        Ok(tools.into_iter().map(|t| t.name).collect())
    }

    /// Call a tool and return the raw protocol result.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request("tools/call", Some(params)).await
    }

    /// Call a tool and unwrap its text into a [`CallResult`].
    ///
    /// A result that does not carry text is reported as
    /// [`Error::MalformedResponse`].
    pub async fn invoke(&self, name: &str, arguments: Option<Value>) -> Result<CallResult> {
        let result = self.call_tool(name, arguments).await?;
        CallResult::try_from(result)
    }

    /// List the prompt templates the server offers.
    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        let result: ListPromptsResult = self.request("prompts/list", None::<()>).await?;
        Ok(result.prompts)
    }

    /// Render a prompt template on the server.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.request("prompts/get", Some(params)).await
    }

    /// Liveness check.
    pub async fn ping(&self) -> Result<()> {
        let _: Value = self.request("ping", None::<()>).await?;
        Ok(())
    }

    /// Close the connection and stop a spawned server.
    pub async fn shutdown(self) -> Result<()> {
        {
            let mut conn = self.conn.lock().await;
            let _ = conn.writer.shutdown().await;
        }

        if let Some(process) = &self.process {
            let _ = process.lock().await.kill().await;
        }

        Ok(())
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let response = timeout(self.timeout, self.exchange(&request, &id))
            .await
            .map_err(|_| Error::Timeout)??;

        let result_value = response.into_result()?;
        serde_json::from_value(result_value)
            .map_err(|e| Error::MalformedResponse(format!("{method}: {e}")))
    }

    /// Send `request` and read until the response carrying `id`.
    ///
    /// Replies to earlier requests that timed out are dropped here, so a late
    /// answer never poisons the next exchange.
    async fn exchange(&self, request: &JsonRpcRequest, id: &RequestId) -> Result<JsonRpcResponse> {
        let mut conn = self.conn.lock().await;
        conn.send(request).await?;

        loop {
            let response = conn.read_response().await?;
            match &response.id {
                Some(got) if got == id => return Ok(response),
                Some(got) if is_stale(got, id) => {
                    tracing::warn!(id = ?got, "discarding late response");
                }
                Some(got) => {
                    return Err(Error::InvalidResponse(format!(
                        "response ID mismatch: expected {id:?}, got {got:?}"
                    )));
                }
                None => {
                    if let Some(error) = response.error {
                        // The server could not read our request at all.
                        return Err(error.into());
                    }
                    // Otherwise a server-initiated notification.
                }
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let notification = JsonRpcRequest::notification(method);
        let mut conn = self.conn.lock().await;
        conn.send(&notification).await
    }
}

/// Ids are issued in increasing order, so a smaller one belongs to an
/// exchange that was already abandoned.
fn is_stale(got: &RequestId, awaited: &RequestId) -> bool {
    matches!((got, awaited), (RequestId::Number(got), RequestId::Number(awaited)) if got < awaited)
}
