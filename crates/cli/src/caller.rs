//! The `call` flows: scripted sessions against a connected server.
//!
//! Output goes to any writer so the flows can run against a buffer.

use std::io::Write;

use mcp::{CallResult, Client};
use serde_json::json;

use crate::error::Result;

fn write_result(out: &mut impl Write, label: &str, result: &CallResult) -> Result<()> {
    match result {
        CallResult::Success { text } => writeln!(out, "{label}: {text}")?,
        CallResult::Failure { message } => writeln!(out, "{label}: error: {message}")?,
    }
    Ok(())
}

/// Run the five calculator steps; a failing step does not stop the rest.
pub async fn call_calculator(client: &Client, out: &mut impl Write) -> Result<()> {
    let steps = [
        ("ADDITION", "add", "+", 5),
        ("SUBTRACTION", "subtract", "-", 5),
        ("MULTIPLICATION", "multiply", "*", 5),
        ("DIVISION", "divide", "/", 5),
        ("DIVISION BY ZERO", "divide", "/", 0),
    ];

    for (title, operation, symbol, number2) in steps {
        writeln!(out, "\nTesting {title}:")?;
        let arguments = json!({"number1": 10, "number2": number2, "operation": operation});
        let label = format!("Calculate(10 {symbol} {number2})");

        match client.invoke(tools::calculator::TOOL_NAME, Some(arguments)).await {
            Ok(result) => write_result(out, &label, &result)?,
            Err(e) => writeln!(out, "Error during {}: {e}", title.to_lowercase())?,
        }
    }
    Ok(())
}

pub async fn call_ping(client: &Client, out: &mut impl Write) -> Result<()> {
    let result = client.invoke(tools::ping::TOOL_NAME, None).await?;
    write_result(out, "Ping tool response", &result)
}

/// Discover the server's tools and ask the first one `question`.
///
/// A failed discovery is reported and ends the flow without a call.
pub async fn call_ask(client: &Client, question: &str, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Successfully connected to the MCP server.")?;

    let names = match client.discover().await {
        Ok(names) => names,
        Err(e) => {
            writeln!(out, "Could not list tools: {e}")?;
            return Ok(());
        }
    };
    writeln!(out, "Available tools: {names:?}")?;

    let Some(tool) = names.first() else {
        writeln!(out, "Server exposes no tools.")?;
        return Ok(());
    };

    writeln!(out, "\nAsking question: '{question}'")?;
    match client
        .invoke(tool, Some(json!({ "user_question": question })))
        .await
    {
        Ok(result) => {
            writeln!(out, "\n--- Gemini's Answer ---")?;
            writeln!(out, "{result}")?;
            writeln!(out, "----------------------")?;
        }
        Err(e) => writeln!(out, "An error occurred while calling the tool: {e}")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use mcp::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex, split};

    type Reply = std::result::Result<Value, JsonRpcError>;

    /// A server that answers by method and records every method it receives.
    async fn scripted(
        answer: impl Fn(&JsonRpcRequest) -> Reply + Send + 'static,
    ) -> (Client, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (client_side, server_side) = duplex(64 * 1024);

        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            let (read, mut write) = split(server_side);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();
                log.lock().unwrap().push(request.method.clone());
                let Some(id) = request.id.clone() else { continue };

                let response = match request.method.as_str() {
                    "initialize" => JsonRpcResponse::success(
                        id,
                        json!({
                            "protocolVersion": "2024-11-05",
                            "capabilities": {"tools": {}},
                            "serverInfo": {"name": "scripted", "version": "0.0.1"}
                        }),
                    ),
                    _ => match answer(&request) {
                        Ok(result) => JsonRpcResponse::success(id, result),
                        Err(error) => JsonRpcResponse::failure(Some(id), error),
                    },
                };
                let json = serde_json::to_string(&response).unwrap();
                write.write_all(json.as_bytes()).await.unwrap();
                write.write_all(b"\n").await.unwrap();
            }
        });

        let (read, write) = split(client_side);
        let client = Client::connect("scripted", read, write).await.unwrap();
        (client, seen)
    }

    fn text(text: &str, is_error: bool) -> Value {
        json!({"content": [{"type": "text", "text": text}], "isError": is_error})
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn failed_discovery_makes_no_call() {
        let (client, seen) = scripted(|request| match request.method.as_str() {
            "tools/list" => Err(JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, "catalog down")),
            _ => Ok(text("should not be reached", false)),
        })
        .await;

        let mut out = Vec::new();
        call_ask(&client, "What is cheapest?", &mut out).await.unwrap();

        let out = output(out);
        assert!(out.contains("Could not list tools: "));
        assert!(out.contains("catalog down"));
        assert!(!out.contains("Asking question"));
        assert!(!seen.lock().unwrap().iter().any(|m| m == "tools/call"));
    }

    #[tokio::test]
    async fn ask_calls_the_first_tool() {
        let tool = tools::catalog::TOOL_NAME;
        let (client, seen) = scripted(move |request| match request.method.as_str() {
            "tools/list" => Ok(json!({"tools": [
                {"name": tool, "inputSchema": {"type": "object"}},
                {"name": "ping", "inputSchema": {"type": "object"}}
            ]})),
            "tools/call" => {
                let params = request.params.as_ref().unwrap();
                assert_eq!(params["name"], tool);
                assert_eq!(params["arguments"]["user_question"], "What is cheapest?");
                Ok(text("The pen.", false))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        })
        .await;

        let mut out = Vec::new();
        call_ask(&client, "What is cheapest?", &mut out).await.unwrap();

        let out = output(out);
        assert!(out.contains(&format!("Available tools: [{tool:?}, \"ping\"]")));
        assert!(out.contains("--- Gemini's Answer ---\nThe pen.\n"));
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["initialize", "notifications/initialized", "tools/list", "tools/call"]
        );
    }

    #[tokio::test]
    async fn calculator_continues_past_a_failed_step() {
        let (client, seen) = scripted(|request| {
            let params = request.params.as_ref().unwrap();
            let operation = params["arguments"]["operation"].as_str().unwrap_or_default();
            match (operation, params["arguments"]["number2"].as_i64()) {
                ("subtract", _) => Err(JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, "boom")),
                ("divide", Some(0)) => Ok(text("Cannot divide by zero", true)),
                _ => Ok(text("ok", false)),
            }
        })
        .await;

        let mut out = Vec::new();
        call_calculator(&client, &mut out).await.unwrap();

        let out = output(out);
        assert!(out.contains("Calculate(10 + 5): ok"));
        assert!(out.contains("Error during subtraction: "));
        assert!(out.contains("Calculate(10 * 5): ok"));
        assert!(out.contains("Calculate(10 / 0): error: Cannot divide by zero"));
        let calls = seen.lock().unwrap().iter().filter(|m| *m == "tools/call").count();
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn ping_prints_the_reply() {
        let (client, _) = scripted(|_| Ok(text("pong", false))).await;

        let mut out = Vec::new();
        call_ping(&client, &mut out).await.unwrap();
        assert_eq!(output(out), "Ping tool response: pong\n");
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unwritable_output_is_an_io_error() {
        let (client, _) = scripted(|_| Ok(text("pong", false))).await;

        let err = call_ping(&client, &mut ClosedPipe).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Io(_)));
    }
}
