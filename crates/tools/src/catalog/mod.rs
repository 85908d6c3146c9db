//! Question answering grounded in the product catalog.
//!
//! The tool reads a handful of rows from the warehouse, renders them into a
//! short knowledge base, and asks the model to answer only from it:
//!
//! 1. fetch rows from a [`CatalogSource`]; a fetch fault stops here
//! 2. render them with [`render_context`]
//! 3. wrap context and question with [`compose_prompt`]
//! 4. send the prompt to a [`TextGenerator`] and extract the answer
//!
//! An empty table is not an error: the caller gets an informational success.

mod errors;
mod generator;
mod prompt;
mod source;

pub use errors::CollaboratorError;
pub use generator::{
    Candidate, Content, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE, GeminiGenerator,
    GeminiGeneratorBuilder, GenerationConfig, GenerationRequest, GenerationResponse,
    HarmBlockThreshold, HarmCategory, Part, SafetySetting, TextGenerator,
    default_safety_settings,
};
pub use prompt::{compose_prompt, render_context, render_item};
pub use source::{BigQueryCatalog, CATALOG_COLUMNS, CatalogItem, CatalogSource};

use std::sync::Arc;

use mcp::CallResult;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::registry::{PromptTemplate, Tool, parse_arguments};
use crate::{Result, ToolError};

pub const TOOL_NAME: &str = "answer_question_with_bigquery_context";

/// Prompt that formats caller-supplied context and a question.
pub const PROMPT_NAME: &str = "format_prompt_for_gemini";

/// Rows fetched per question.
pub const DEFAULT_ROW_LIMIT: usize = 10;

pub const NO_DATA_MESSAGE: &str = "No relevant data found in the knowledge base for this query.";
pub const NO_ANSWER_MESSAGE: &str =
    "Gemini could not provide an answer, possibly due to safety filters or an empty response.";

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(description = "A question about the catalog")]
pub struct AnswerRequest {
    #[schemars(description = "The question to answer from the knowledge base")]
    pub user_question: String,
}

/// The catalog prompt as a template, for callers that bring their own context.
///
/// Renders exactly what [`AnswerWithContext::answer`] sends to the model.
pub fn prompt_template() -> PromptTemplate {
    PromptTemplate::new(
        PROMPT_NAME,
        "Formats the prompt for Gemini using the BigQuery context and user question.",
        |args| {
            tracing::info!("Formatting prompt for Gemini.");
            Ok(compose_prompt(&args["context_data"], &args["user_question"]))
        },
    )
    .with_argument("context_data", "Knowledge base rendered from catalog rows")
    .with_argument("user_question", "The question to answer")
}

/// Cloud settings for the catalog example.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    pub project: String,
    pub location: String,
    /// Fully qualified `project.dataset.table`.
    pub table_id: String,
    pub model: String,
    pub access_token: Option<String>,
    pub row_limit: usize,
}

impl CatalogConfig {
    /// Build the warehouse and model clients described by this config.
    pub fn answerer(&self) -> AnswerWithContext<BigQueryCatalog, GeminiGenerator> {
        let source = BigQueryCatalog::new(&self.project, &self.table_id, self.access_token.clone());
        let generator = GeminiGenerator::builder(&self.project, &self.location, &self.model)
            .access_token(self.access_token.clone())
            .build();
        tracing::info!(source = %source, generator = %generator, "catalog answerer configured");
        AnswerWithContext::new(source, generator).with_row_limit(self.row_limit)
    }
}

/// Answers questions from catalog rows and a text generator.
pub struct AnswerWithContext<S, G> {
    source: S,
    generator: G,
    row_limit: usize,
}

impl<S: CatalogSource, G: TextGenerator> AnswerWithContext<S, G> {
    pub fn new(source: S, generator: G) -> Self {
        Self {
            source,
            generator,
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub async fn answer(&self, question: &str) -> Result<CallResult> {
        tracing::info!("Tool '{TOOL_NAME}' received question: '{question}'");

        let items = self.source.fetch_items(self.row_limit).await.map_err(|e| {
            ToolError::CollaboratorUnavailable(format!("Error fetching data from BigQuery: {e}"))
        })?;

        if items.is_empty() {
            tracing::warn!("No data returned from the catalog table");
            return Ok(CallResult::success(NO_DATA_MESSAGE));
        }

        let context = render_context(&items);
        tracing::info!("Formatting prompt for Gemini.");
        let request = GenerationRequest::new(compose_prompt(&context, question));

        let response = self.generator.generate(&request).await.map_err(|e| {
            ToolError::CollaboratorUnavailable(format!("Error communicating with Gemini: {e}"))
        })?;

        match response.answer() {
            Some(text) => Ok(CallResult::success(text)),
            None => {
                tracing::warn!(
                    feedback = ?response.prompt_feedback,
                    "Gemini response was empty or blocked"
                );
                Ok(CallResult::success(NO_ANSWER_MESSAGE))
            }
        }
    }

    /// Wrap into a registrable tool.
    pub fn into_tool(self) -> Tool {
        let answerer = Arc::new(self);
        Tool::new(
            TOOL_NAME,
            "Answers a user's question by fetching relevant context from a predefined \
             BigQuery table and then querying the Gemini LLM.",
            move |args| {
                let answerer = Arc::clone(&answerer);
                async move {
                    let request: AnswerRequest = parse_arguments(args)?;
                    answerer.answer(&request.user_question).await
                }
            },
        )
        .with_input::<AnswerRequest>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        rows: std::result::Result<Vec<CatalogItem>, String>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn rows(rows: Vec<CatalogItem>) -> Self {
            Self {
                rows: Ok(rows),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                rows: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CatalogSource for StubSource {
        async fn fetch_items(
            &self,
            limit: usize,
        ) -> std::result::Result<Vec<CatalogItem>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.rows {
                Ok(rows) => Ok(rows.iter().take(limit).cloned().collect()),
                Err(message) => Err(CollaboratorError::Network(message.clone())),
            }
        }
    }

    #[derive(Default)]
    struct StubGenerator {
        response: Option<GenerationResponse>,
        prompts: std::sync::Mutex<Vec<String>>,
    }

    impl StubGenerator {
        fn answering(text: &str) -> Self {
            Self {
                response: Some(GenerationResponse {
                    text: Some(text.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl TextGenerator for StubGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<GenerationResponse, CollaboratorError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            self.response
                .clone()
                .ok_or_else(|| CollaboratorError::Api("503 Service Unavailable".into()))
        }
    }

    fn item(name: &str, cost: f64) -> CatalogItem {
        CatalogItem {
            item_name: name.into(),
            category: "Office".into(),
            cost,
            description: "d".into(),
            stock_quantity: 1,
            rating: 4.5,
            supplier_id: "S".into(),
        }
    }

    #[tokio::test]
    async fn zero_rows_is_informational_success() {
        let answerer =
            AnswerWithContext::new(StubSource::rows(vec![]), StubGenerator::answering("x"));

        let result = answerer.answer("anything?").await.unwrap();
        assert!(result.is_success());
        assert!(result.as_str().contains("No relevant data found"));
        assert_eq!(answerer.generator.calls(), 0);
    }

    #[tokio::test]
    async fn fetch_fault_skips_generation() {
        let answerer = AnswerWithContext::new(
            StubSource::failing("connection refused"),
            StubGenerator::answering("x"),
        );

        let err = answerer.answer("anything?").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error fetching data from BigQuery: network: connection refused"
        );
        assert_eq!(answerer.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(answerer.generator.calls(), 0);
    }

    #[tokio::test]
    async fn prompt_is_grounded_in_fetched_rows() {
        let answerer = AnswerWithContext::new(
            StubSource::rows(vec![item("Pen", 1.25), item("Desk", 120.0)]),
            StubGenerator::answering("The pen."),
        );

        let result = answerer.answer("What is the cheapest item?").await.unwrap();
        assert_eq!(result, CallResult::success("The pen."));

        let prompts = answerer.generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- Item: Pen\n"));
        assert!(prompts[0].contains("Cost: $120.00"));
        assert!(prompts[0].contains("User's Question: What is the cheapest item?"));
    }

    #[tokio::test]
    async fn row_limit_is_passed_to_source() {
        let rows = (0..15).map(|i| item(&format!("item-{i}"), 1.0)).collect();
        let answerer =
            AnswerWithContext::new(StubSource::rows(rows), StubGenerator::answering("ok"));

        answerer.answer("q").await.unwrap();

        let prompts = answerer.generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("item-9\n"));
        assert!(!prompts[0].contains("item-10"));
    }

    #[tokio::test]
    async fn empty_model_output_is_explained() {
        let generator = StubGenerator {
            response: Some(GenerationResponse::default()),
            ..Default::default()
        };
        let answerer = AnswerWithContext::new(StubSource::rows(vec![item("Pen", 1.0)]), generator);

        let result = answerer.answer("q").await.unwrap();
        assert_eq!(result, CallResult::success(NO_ANSWER_MESSAGE));
    }

    #[tokio::test]
    async fn generation_fault_is_failure() {
        let generator = StubGenerator::default();
        let answerer = AnswerWithContext::new(StubSource::rows(vec![item("Pen", 1.0)]), generator);

        let err = answerer.answer("q").await.unwrap_err();
        assert!(matches!(err, ToolError::CollaboratorUnavailable(_)));
        assert!(err.to_string().starts_with("Error communicating with Gemini: "));
    }

    #[tokio::test]
    async fn tool_requires_question() {
        let tool =
            AnswerWithContext::new(StubSource::rows(vec![]), StubGenerator::default()).into_tool();
        let registry = crate::ToolRegistry::new("test").with(tool).unwrap();

        let result = registry
            .call(TOOL_NAME, crate::registry::Arguments::new())
            .await
            .unwrap();
        assert!(!result.is_success());
        assert!(result.as_str().contains("user_question"));
    }

    #[test]
    fn prompt_template_matches_tool_prompt() {
        let args = crate::PromptArguments::from([
            ("context_data".to_string(), "- Item: Pen\n".to_string()),
            ("user_question".to_string(), "Cheapest?".to_string()),
        ]);

        let rendered = prompt_template().render(&args).unwrap();
        assert_eq!(rendered, compose_prompt("- Item: Pen\n", "Cheapest?"));

        let mut partial = args.clone();
        partial.remove("context_data");
        let err = prompt_template().render(&partial).unwrap_err();
        assert_eq!(err, ToolError::InvalidArgument("missing argument: context_data".into()));
    }
}
