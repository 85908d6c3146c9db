//! Catalog rows from the data warehouse.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CollaboratorError;

const BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const QUERY_TIMEOUT_MS: u64 = 30_000;

/// Columns read from the catalog table, in query order.
pub const CATALOG_COLUMNS: [&str; 7] = [
    "item_name",
    "category",
    "cost",
    "description",
    "stock_quantity",
    "rating",
    "supplier_id",
];

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_name: String,
    pub category: String,
    pub cost: f64,
    pub description: String,
    pub stock_quantity: i64,
    pub rating: f64,
    pub supplier_id: String,
}

/// A tabular source of catalog rows.
pub trait CatalogSource: Send + Sync + 'static {
    /// Fetch at most `limit` rows.
    fn fetch_items(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CatalogItem>, CollaboratorError>> + Send;
}

/// Catalog table in BigQuery, read through the `jobs.query` REST endpoint.
pub struct BigQueryCatalog {
    client: reqwest::Client,
    project: String,
    table_id: String,
    access_token: Option<String>,
}

impl BigQueryCatalog {
    pub fn new(
        project: impl Into<String>,
        table_id: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            project: project.into(),
            table_id: table_id.into(),
            access_token,
        }
    }

    /// The SQL sent to the warehouse.
    pub fn query(&self, limit: usize) -> String {
        let columns = CATALOG_COLUMNS.join(",\n    ");
        let table = &self.table_id;
        format!("SELECT\n    {columns}\nFROM `{table}`\nLIMIT {limit}")
    }
}

impl std::fmt::Display for BigQueryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bigquery({})", self.table_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
    max_results: usize,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Value,
}

impl CatalogSource for BigQueryCatalog {
    async fn fetch_items(&self, limit: usize) -> Result<Vec<CatalogItem>, CollaboratorError> {
        let token = self.access_token.as_deref().ok_or_else(|| {
            CollaboratorError::Unavailable("BigQuery client has no access token".into())
        })?;

        tracing::info!("Executing BigQuery query on {}", self.table_id);

        let request = QueryRequest {
            query: self.query(limit),
            use_legacy_sql: false,
            max_results: limit,
            timeout_ms: QUERY_TIMEOUT_MS,
        };

        let url = format!("{BIGQUERY_API_URL}/projects/{}/queries", self.project);
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!("{status}: {body}")));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        decode_rows(body)
    }
}

fn decode_rows(response: QueryResponse) -> Result<Vec<CatalogItem>, CollaboratorError> {
    if !response.job_complete {
        return Err(CollaboratorError::Api(
            "query did not complete within the request timeout".into(),
        ));
    }
    if response.rows.is_empty() {
        return Ok(Vec::new());
    }

    let schema = response
        .schema
        .ok_or_else(|| CollaboratorError::InvalidResponse("rows without schema".into()))?;
    let positions: HashMap<&str, usize> = schema
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| (field.name.as_str(), i))
        .collect();

    response
        .rows
        .iter()
        .enumerate()
        .map(|(n, row)| -> Result<CatalogItem, CollaboratorError> {
            let cells = RowCells {
                row: n,
                cells: &row.f,
                positions: &positions,
            };
            Ok(CatalogItem {
                item_name: cells.text("item_name")?,
                category: cells.text("category")?,
                cost: cells.number("cost")?,
                description: cells.text("description")?,
                stock_quantity: cells.number("stock_quantity")?,
                rating: cells.number("rating")?,
                supplier_id: cells.text("supplier_id")?,
            })
        })
        .collect()
}

/// Column lookup over one row in the `f`/`v` wire shape.
struct RowCells<'a> {
    row: usize,
    cells: &'a [TableCell],
    positions: &'a HashMap<&'a str, usize>,
}

impl RowCells<'_> {
    fn raw(&self, column: &str) -> Result<&Value, CollaboratorError> {
        self.positions
            .get(column)
            .and_then(|&i| self.cells.get(i))
            .map(|cell| &cell.v)
            .ok_or_else(|| {
                let message = format!("row {}: missing column {column}", self.row);
                CollaboratorError::InvalidResponse(message)
            })
    }

    /// NULL text cells read as empty strings.
    fn text(&self, column: &str) -> Result<String, CollaboratorError> {
        match self.raw(column)? {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s.clone()),
            other => Ok(other.to_string()),
        }
    }

    /// BigQuery encodes every scalar as a string; NULL is an error here.
    fn number<T: std::str::FromStr>(&self, column: &str) -> Result<T, CollaboratorError> {
        let raw = self.raw(column)?;
        raw.as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                CollaboratorError::InvalidResponse(format!(
                    "row {}: column {column} is not a number: {raw}",
                    self.row
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> QueryResponse {
        serde_json::from_value(value).unwrap()
    }

    fn schema() -> Value {
        let fields: Vec<Value> = CATALOG_COLUMNS
            .iter()
            .map(|c| json!({"name": c, "type": "STRING"}))
            .collect();
        json!({ "fields": fields })
    }

    #[test]
    fn query_selects_catalog_columns() {
        let catalog = BigQueryCatalog::new("proj", "proj.mcp_workshop.catalog", None);
        let sql = catalog.query(10);
        assert!(sql.starts_with("SELECT\n    item_name,\n    category,"));
        assert!(sql.contains("FROM `proj.mcp_workshop.catalog`"));
        assert!(sql.ends_with("LIMIT 10"));
    }

    #[test]
    fn decodes_rows_by_column_name() {
        let body = response(json!({
            "jobComplete": true,
            "schema": schema(),
            "rows": [
                {"f": [
                    {"v": "Desk Lamp"}, {"v": "Lighting"}, {"v": "24.5"},
                    {"v": "LED lamp"}, {"v": "12"}, {"v": "4.5"}, {"v": "SUP-7"}
                ]}
            ]
        }));

        let items = decode_rows(body).unwrap();
        assert_eq!(
            items,
            vec![CatalogItem {
                item_name: "Desk Lamp".into(),
                category: "Lighting".into(),
                cost: 24.5,
                description: "LED lamp".into(),
                stock_quantity: 12,
                rating: 4.5,
                supplier_id: "SUP-7".into(),
            }]
        );
    }

    #[test]
    fn no_rows_is_empty() {
        let body = response(json!({"jobComplete": true, "schema": schema(), "totalRows": "0"}));
        assert!(decode_rows(body).unwrap().is_empty());
    }

    #[test]
    fn incomplete_job_is_an_error() {
        let body = response(json!({"jobComplete": false}));
        assert!(matches!(decode_rows(body), Err(CollaboratorError::Api(_))));
    }

    #[test]
    fn null_cost_is_an_error() {
        let body = response(json!({
            "jobComplete": true,
            "schema": schema(),
            "rows": [{"f": [
                {"v": "Lamp"}, {"v": null}, {"v": null},
                {"v": null}, {"v": "1"}, {"v": "3"}, {"v": "S"}
            ]}]
        }));
        let err = decode_rows(body).unwrap_err();
        assert!(err.to_string().contains("cost"));
    }

    #[tokio::test]
    async fn missing_token_means_unavailable() {
        let catalog = BigQueryCatalog::new("proj", "proj.ds.table", None);
        let err = catalog.fetch_items(10).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }
}
