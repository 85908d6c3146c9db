//! MCP server side: answer JSON-RPC requests from a [`ToolService`].
//!
//! Messages are newline-delimited JSON, the same framing MCP uses over stdio.
//! The same loop serves stdio, TCP connections and in-process pipes.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::error::Result;
use crate::framing::{Frame, LineReader};
use crate::protocol::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListPromptsResult,
    ListToolsResult, PROTOCOL_VERSION, Prompt, PromptsCapability, RequestId, ServerCapabilities,
    ServerInfo, Tool, ToolsCapability,
};

/// Largest request line the server will read (1MB).
pub const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// The tool surface a server exposes.
///
/// Implementations must be safe to share between connections.
pub trait ToolService: Send + Sync + 'static {
    /// Name and version announced during initialization.
    fn server_info(&self) -> ServerInfo;

    /// Free-form usage hints for the client.
    fn instructions(&self) -> Option<String> {
        None
    }

    /// Tool descriptors, in the order they should be listed.
    fn list_tools(&self) -> Vec<Tool>;

    /// Execute a tool call. Failures are reported inside the result.
    fn call_tool(&self, params: CallToolParams) -> impl Future<Output = CallToolResult> + Send;

    /// Prompt templates. The `prompts` capability is announced only when
    /// this is non-empty.
    fn list_prompts(&self) -> Vec<Prompt> {
        Vec::new()
    }

    /// Render a prompt template with the given arguments.
    fn get_prompt(
        &self,
        params: GetPromptParams,
    ) -> std::result::Result<GetPromptResult, JsonRpcError> {
        Err(JsonRpcError::invalid_params(format!("unknown prompt: {}", params.name)))
    }
}

/// Serve one connection until the peer closes it.
pub async fn serve<S, R, W>(service: Arc<S>, reader: R, mut writer: W) -> Result<()>
where
    S: ToolService,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = LineReader::new(BufReader::new(reader), MAX_REQUEST_SIZE);

    loop {
        let response = match lines.next_frame().await? {
            Frame::Eof => break,
            Frame::TooLarge(size) => {
                tracing::warn!(size, "request line too large");
                Some(JsonRpcResponse::failure(
                    None,
                    JsonRpcError::parse_error(format!(
                        "message of {size} bytes exceeds {MAX_REQUEST_SIZE}"
                    )),
                ))
            }
            Frame::Line(bytes) => match std::str::from_utf8(&bytes) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => handle_line(service.as_ref(), line).await,
                Err(e) => {
                    tracing::warn!("request is not UTF-8: {}", e);
                    Some(JsonRpcResponse::failure(
                        None,
                        JsonRpcError::parse_error(format!("invalid UTF-8: {e}")),
                    ))
                }
            },
        };

        let Some(response) = response else {
            continue;
        };

        let json = serde_json::to_string(&response)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Serve on the process's stdin/stdout.
pub async fn serve_stdio<S: ToolService>(service: Arc<S>) -> Result<()> {
    tracing::info!(server = %service.server_info().name, "serving MCP on stdio");
    serve(service, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Bind a TCP listener and serve every accepted connection.
pub async fn serve_tcp<S: ToolService>(service: Arc<S>, addr: impl ToSocketAddrs) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(service, listener).await
}

/// Serve every connection accepted on `listener`, each on its own task.
pub async fn serve_listener<S: ToolService>(service: Arc<S>, listener: TcpListener) -> Result<()> {
    tracing::info!(
        server = %service.server_info().name,
        addr = %listener.local_addr()?,
        "MCP server listening"
    );

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        tracing::info!("Accepted connection from: {}", peer_addr);

        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let (read, write) = stream.into_split();
            match serve(service, read, write).await {
                Ok(()) => tracing::info!("Connection closed for {}", peer_addr),
                Err(e) => tracing::error!("Connection error for {}: {}", peer_addr, e),
            }
        });
    }
}

async fn handle_line<S: ToolService>(service: &S, line: &str) -> Option<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("unparsable message: {}", e);
            return Some(JsonRpcResponse::failure(
                None,
                JsonRpcError::parse_error(e.to_string()),
            ));
        }
    };

    let Some(id) = request.id else {
        tracing::debug!(method = %request.method, "notification");
        return None;
    };

    let outcome = dispatch(service, &request.method, request.params).await;
    Some(respond(id, outcome))
}

async fn dispatch<S: ToolService>(
    service: &S,
    method: &str,
    params: Option<Value>,
) -> std::result::Result<Value, JsonRpcError> {
    match method {
        "initialize" => {
            let requested = params
                .and_then(|p| serde_json::from_value::<InitializeParams>(p).ok())
                .map(|p| {
                    tracing::info!(client = %p.client_info.name, "client initializing");
                    p.protocol_version
                });

            encode(InitializeResult {
                protocol_version: requested.unwrap_or_else(|| PROTOCOL_VERSION.to_string()),
                capabilities: ServerCapabilities {
                    tools: Some(ToolsCapability::default()),
                    prompts: (!service.list_prompts().is_empty())
                        .then(PromptsCapability::default),
                },
                server_info: service.server_info(),
                instructions: service.instructions(),
            })
        }
        "ping" => Ok(Value::Object(Default::default())),
        "tools/list" => encode(ListToolsResult {
            tools: service.list_tools(),
        }),
        "tools/call" => {
            let params: CallToolParams = decode_params(method, params)?;
            encode(service.call_tool(params).await)
        }
        "prompts/list" => encode(ListPromptsResult {
            prompts: service.list_prompts(),
        }),
        "prompts/get" => {
            let params: GetPromptParams = decode_params(method, params)?;
            encode(service.get_prompt(params)?)
        }
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

fn decode_params<T: serde::de::DeserializeOwned>(
    method: &str,
    params: Option<Value>,
) -> std::result::Result<T, JsonRpcError> {
    let params =
        params.ok_or_else(|| JsonRpcError::invalid_params(format!("missing {method} params")))?;
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn encode(value: impl serde::Serialize) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

fn respond(id: RequestId, outcome: std::result::Result<Value, JsonRpcError>) -> JsonRpcResponse {
    match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(Some(id), error),
    }
}
