use serde::{Deserialize, Serialize};

/// One result row, keyed by column name in the order the driver returned
/// the columns.
pub type RowMap = serde_json::Map<String, serde_json::Value>;

/// Incoming execution request.
///
/// Missing fields deserialize as empty strings and are rejected by
/// validation with a typed error rather than by the JSON decoder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionRequest {
    pub sql: String,
    #[serde(alias = "pgSchema")]
    pub namespace: String,
}

/// Result of a sandboxed statement.
///
/// Field names are kept in driver order because consumers index rows both
/// positionally and by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub rows: Vec<RowMap>,
    /// Rows returned by a query, or rows affected by a write
    pub row_count: u64,
    pub fields: Vec<String>,
    pub execution_time_ms: u64,
}

/// Stage reached by a single execution request.
///
/// Stages advance strictly in declaration order; a request that fails
/// still passes through `RolledBack` and `ConnectionReleased` once a
/// connection was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Received,
    NamespaceValidated,
    SchemaChecked,
    PolicyChecked,
    ConnectionAcquired,
    InTransaction,
    Executed,
    RolledBack,
    ConnectionReleased,
    Completed,
    Failed,
}

impl ExecutionStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStage::Completed | ExecutionStage::Failed)
    }
}

impl std::fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionStage::Received => "received",
            ExecutionStage::NamespaceValidated => "namespace_validated",
            ExecutionStage::SchemaChecked => "schema_checked",
            ExecutionStage::PolicyChecked => "policy_checked",
            ExecutionStage::ConnectionAcquired => "connection_acquired",
            ExecutionStage::InTransaction => "in_transaction",
            ExecutionStage::Executed => "executed",
            ExecutionStage::RolledBack => "rolled_back",
            ExecutionStage::ConnectionReleased => "connection_released",
            ExecutionStage::Completed => "completed",
            ExecutionStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_serializes_with_client_field_names() {
        let mut row = RowMap::new();
        row.insert("id".to_string(), json!(2));
        row.insert("salary".to_string(), json!(60000));

        let result = ExecutionResult {
            rows: vec![row],
            row_count: 1,
            fields: vec!["id".to_string(), "salary".to_string()],
            execution_time_ms: 3,
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["rowCount"], json!(1));
        assert_eq!(value["fields"], json!(["id", "salary"]));
        assert_eq!(value["executionTimeMs"], json!(3));
    }

    #[test]
    fn test_request_missing_fields_are_empty() {
        let request: ExecutionRequest = serde_json::from_value(json!({ "sql": "SELECT 1" })).unwrap();
        assert_eq!(request.sql, "SELECT 1");
        assert!(request.namespace.is_empty());

        let request: ExecutionRequest =
            serde_json::from_value(json!({ "pgSchema": "asgn_high_salary" })).unwrap();
        assert_eq!(request.namespace, "asgn_high_salary");
        assert!(request.sql.is_empty());
    }

    #[test]
    fn test_row_maps_keep_column_order() {
        let mut row = RowMap::new();
        row.insert("zeta".to_string(), json!(1));
        row.insert("alpha".to_string(), json!(2));

        let keys: Vec<&String> = row.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_stage_order() {
        assert!(ExecutionStage::Received < ExecutionStage::ConnectionAcquired);
        assert!(ExecutionStage::RolledBack < ExecutionStage::ConnectionReleased);
        assert!(ExecutionStage::Failed.is_terminal());
        assert!(!ExecutionStage::Executed.is_terminal());
    }
}
