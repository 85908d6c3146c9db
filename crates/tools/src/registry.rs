//! Named tools and the registry that dispatches calls to them.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mcp::{
    CallResult, CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, JsonRpcError,
    PromptArgument, PromptMessage, ServerInfo, ToolService,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::task::JoinError;

use crate::{Result, ToolError};

/// Arguments of a tool call: a JSON object.
pub type Arguments = Map<String, Value>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<CallResult>> + Send>>;

type Handler = Arc<dyn Fn(Arguments) -> HandlerFuture + Send + Sync>;

/// Arguments of a prompt: names to string values.
pub type PromptArguments = HashMap<String, String>;

type Renderer = Arc<dyn Fn(&PromptArguments) -> Result<String> + Send + Sync>;

/// A named, invocable operation.
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    handler: Handler,
}

impl Tool {
    /// Create a tool from an async handler.
    ///
    /// The input schema defaults to an unconstrained object; use
    /// [`Tool::with_input`] to derive it from the argument type.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallResult>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: json!({ "type": "object" }),
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Advertise the JSON schema of `T` as this tool's input.
    pub fn with_input<T: JsonSchema>(mut self) -> Self {
        let schema = schemars::schema_for!(T);
        if let Ok(value) = serde_json::to_value(schema) {
            self.input_schema = value;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    fn descriptor(&self) -> mcp::Tool {
        mcp::Tool {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A named prompt template rendered to a single user message.
pub struct PromptTemplate {
    name: String,
    description: String,
    arguments: Vec<PromptArgument>,
    render: Renderer,
}

impl PromptTemplate {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, render: F) -> Self
    where
        F: Fn(&PromptArguments) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: Vec::new(),
            render: Arc::new(render),
        }
    }

    /// Declare a required argument.
    pub fn with_argument(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.arguments.push(PromptArgument {
            name: name.into(),
            description: Some(description.into()),
            required: true,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fill the template. Every declared argument must be present.
    pub fn render(&self, arguments: &PromptArguments) -> Result<String> {
        if let Some(missing) = self.arguments.iter().find(|a| !arguments.contains_key(&a.name)) {
            return Err(ToolError::InvalidArgument(format!(
                "missing argument: {}",
                missing.name
            )));
        }
        (self.render)(arguments)
    }

    fn descriptor(&self) -> mcp::Prompt {
        mcp::Prompt {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            arguments: self.arguments.clone(),
        }
    }
}

impl std::fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTemplate")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// Decode call arguments into a typed request.
pub fn parse_arguments<T: DeserializeOwned>(arguments: Arguments) -> Result<T> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| ToolError::InvalidArgument(format!("invalid arguments: {e}")))
}

/// Holds tools in registration order and dispatches calls by name.
///
/// Immutable once served, so it can be shared between connections.
#[derive(Debug)]
pub struct ToolRegistry {
    name: String,
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
    prompts: Vec<PromptTemplate>,
}

impl ToolRegistry {
    /// Create an empty registry announced under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            index: HashMap::new(),
            prompts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a tool. Names are unique within a registry.
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if self.index.contains_key(tool.name()) {
            return Err(ToolError::DuplicateName(tool.name));
        }
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, tool: Tool) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    /// Add a prompt template. Names are unique among prompts.
    pub fn register_prompt(&mut self, prompt: PromptTemplate) -> Result<()> {
        if self.prompt(prompt.name()).is_some() {
            return Err(ToolError::DuplicateName(prompt.name));
        }
        self.prompts.push(prompt);
        Ok(())
    }

    /// Builder-style [`register_prompt`](Self::register_prompt).
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Result<Self> {
        self.register_prompt(prompt)?;
        Ok(self)
    }

    pub fn prompt(&self, name: &str) -> Option<&PromptTemplate> {
        self.prompts.iter().find(|p| p.name == name)
    }

    /// Render the prompt called `name`.
    pub fn render_prompt(&self, name: &str, arguments: &PromptArguments) -> Result<String> {
        let prompt = self
            .prompt(name)
            .ok_or_else(|| ToolError::UnknownPrompt(name.to_string()))?;
        tracing::info!(prompt = name, "prompt requested");
        prompt.render(arguments)
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke the tool called `name`.
    ///
    /// Handler errors and panics come back as [`CallResult::Failure`]; only an
    /// unknown name is an `Err`.
    pub async fn call(&self, name: &str, arguments: Arguments) -> Result<CallResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tracing::info!(tool = name, "tool called");

        // Own task, so a panicking handler cannot take the server down.
        let handler = Arc::clone(&tool.handler);
        let outcome = tokio::spawn(async move { handler(arguments).await }).await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(tool = name, error = %e, "tool failed");
                CallResult::failure(e.to_string())
            }
            Err(join_error) => {
                let e = ToolError::Execution(panic_message(join_error));
                tracing::error!(tool = name, error = %e, "tool panicked");
                CallResult::failure(e.to_string())
            }
        };
        Ok(result)
    }

    /// Like [`call`](Self::call), with an unknown name folded into a failure.
    pub async fn dispatch(&self, name: &str, arguments: Arguments) -> CallResult {
        match self.call(name, arguments).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = name, "{}", e);
                CallResult::failure(e.to_string())
            }
        }
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl ToolService for ToolRegistry {
    fn server_info(&self) -> ServerInfo {
        ServerInfo::new(&self.name)
    }

    fn list_tools(&self) -> Vec<mcp::Tool> {
        self.tools.iter().map(Tool::descriptor).collect()
    }

    async fn call_tool(&self, params: CallToolParams) -> CallToolResult {
        let arguments = match params.arguments {
            None | Some(Value::Null) => Arguments::new(),
            Some(Value::Object(arguments)) => arguments,
            Some(other) => {
                let e =
                    ToolError::InvalidArgument(format!("arguments must be an object, got {other}"));
                return CallResult::failure(e.to_string()).into();
            }
        };
        self.dispatch(&params.name, arguments).await.into()
    }

    fn list_prompts(&self) -> Vec<mcp::Prompt> {
        self.prompts.iter().map(PromptTemplate::descriptor).collect()
    }

    fn get_prompt(
        &self,
        params: GetPromptParams,
    ) -> std::result::Result<GetPromptResult, JsonRpcError> {
        let text = self
            .render_prompt(&params.name, &params.arguments)
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
        Ok(GetPromptResult {
            description: self.prompt(&params.name).map(|p| p.description.clone()),
            messages: vec![PromptMessage::user(text)],
        })
    }
}
