//! The ready-made registries served by the `workshop` binary.

use crate::catalog::{self, CatalogConfig};
use crate::{Result, ToolRegistry, calculator, ping};

/// `calculate` and `ping`.
pub fn calculator() -> Result<ToolRegistry> {
    ToolRegistry::new("CalculatorWorkshopAgent")
        .with(calculator::tool())?
        .with(ping::tool())
}

/// Just `ping`.
pub fn ping() -> Result<ToolRegistry> {
    ToolRegistry::new("BigQueryGeminiAssistant").with(ping::tool())
}

/// Catalog question answering backed by BigQuery and Gemini, plus the
/// prompt it uses.
pub fn catalog(config: &CatalogConfig) -> Result<ToolRegistry> {
    ToolRegistry::new("BigQueryGeminiWorkshopAgent")
        .with(config.answerer().into_tool())?
        .with_prompt(catalog::prompt_template())
}
