//! Turning catalog rows into a grounded prompt.

use super::CatalogItem;

const RULE: &str = "-----------------------------------";

/// Render one row as a labelled block closed by a rule line.
pub fn render_item(item: &CatalogItem) -> String {
    format!(
        "- Item: {}\n  Category: {}\n  Cost: ${:.2}\n  Description: {}\n  Stock: {}\n  \
         Rating: {}/5.0\n  Supplier ID: {}\n{RULE}",
        item.item_name,
        item.category,
        item.cost,
        item.description,
        item.stock_quantity,
        format_rating(item.rating),
        item.supplier_id,
    )
}

/// Whole ratings keep one decimal ("4.0"), others print as-is.
fn format_rating(rating: f64) -> String {
    if rating.fract() == 0.0 {
        format!("{rating:.1}")
    } else {
        rating.to_string()
    }
}

/// All rows, in fetch order, one block each.
pub fn render_context(items: &[CatalogItem]) -> String {
    items.iter().map(render_item).collect::<Vec<_>>().join("\n")
}

/// Insert the context and the question into the answering template.
pub fn compose_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant.
Based ONLY on the following information from our knowledge base, answer the user's question.
If the information is not present in the provided context, clearly state that the information is not available.

Context from Knowledge Base:
---
{context}
---

User's Question: {question}

Answer:
"
    )
}
