//! Error types for TRELLIS operations

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No keyspace resolvable for {document}: set one on the document or the backend")]
    KeyspaceUnresolved { document: String },

    #[error("No execution backend configured")]
    BackendNotConfigured,

    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Type mapping errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeMappingError {
    #[error("Cannot map type {type_name} of field {field} to a schema type")]
    Unmappable { field: String, type_name: String },

    #[error("Marker {marker} cannot be applied to field {field}: {reason}")]
    InvalidMarker {
        field: String,
        marker: String,
        reason: String,
    },
}

/// Schema validation errors, raised while building a document schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Counter table {document} has non-counter columns: {offenders:?}")]
    CounterMixing {
        document: String,
        offenders: Vec<String>,
    },

    #[error("Document {document} declares no partition key")]
    MissingPartitionKey { document: String },

    #[error("Malformed {kind} key ordinals on {document}: {ordinals:?}")]
    MalformedKeyOrdinals {
        document: String,
        kind: String,
        ordinals: Vec<u32>,
    },

    #[error("Duplicate column {column} on {document}")]
    DuplicateColumn { document: String, column: String },

    #[error("Hierarchy of {document} declares more than one discriminator: {columns:?}")]
    MultipleDiscriminators {
        document: String,
        columns: Vec<String>,
    },

    #[error("Duplicate discriminator value {value} registered for {document}")]
    DuplicateDiscriminatorValue { document: String, value: String },

    #[error("Variant {document} declares no discriminator value")]
    MissingDiscriminatorValue { document: String },

    #[error("Unknown column {column} on {document}")]
    UnknownColumn { document: String, column: String },

    #[error("Column {column} on {document}: {reason}")]
    InvalidColumn {
        document: String,
        column: String,
        reason: String,
    },
}

/// Statement construction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown filter operator suffix {suffix} in {keyword}")]
    UnknownOperator { keyword: String, suffix: String },

    #[error("Column {column} is not a primary key column; {statement} requires key predicates")]
    NonKeyPredicate { statement: String, column: String },

    #[error("{statement} requires an equality predicate on partition key {column}")]
    MissingKeyPredicate { statement: String, column: String },

    #[error("Operator {operator} is not allowed on {column} in {statement}")]
    OperatorNotAllowed {
        statement: String,
        column: String,
        operator: String,
    },

    #[error("Batch mode {mode} cannot carry {reason}")]
    BatchModeMismatch { mode: String, reason: String },

    #[error("Materialized view {view} must declare IS NOT NULL for key column {column}")]
    ViewPredicateMissing { view: String, column: String },

    #[error("{statement} has nothing to write")]
    EmptyStatement { statement: String },
}

/// Single-row lookup cardinality errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("No {document} matched the query")]
    NotFound { document: String },

    #[error("Expected one {document}, query matched {count}")]
    MultipleFound { document: String, count: usize },
}

/// Migration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("Checksum drift on migration {id}: recorded {recorded}, current {current}")]
    ChecksumDrift {
        id: String,
        recorded: String,
        current: String,
    },

    #[error("Duplicate migration identifier {id}")]
    DuplicateId { id: String },

    #[error("Migration file name {name} does not start with an identifier")]
    InvalidFileName { name: String },

    #[error("Migration {id} has no downgrade")]
    MissingDowngrade { id: String },

    #[error("Migration {id} is marked irreversible")]
    Irreversible { id: String },

    #[error("Migration {id} is destructive and destructive migrations were not allowed")]
    DestructiveNotAllowed { id: String },

    #[error("Unknown migration target {id}")]
    UnknownTarget { id: String },

    #[error("Migration {id} is pending but sorts before applied migration {latest}")]
    OutOfOrder { id: String, latest: String },

    #[error("Rollback blocked at {id} after rolling back {completed:?}: {reason}")]
    RollbackBlocked {
        id: String,
        completed: Vec<String>,
        reason: String,
    },

    #[error("Failed to parse migration {name}: {reason}")]
    Parse { name: String, reason: String },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Failure reported by the execution backend, passed through unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
    pub code: Option<i32>,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "Transport error ({:#06x}): {}", code, self.message),
            None => write!(f, "Transport error: {}", self.message),
        }
    }
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

/// Master error type for all TRELLIS errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrellisError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Type mapping error: {0}")]
    TypeMapping(#[from] TypeMappingError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Value error on {column}: expected {expected}, found {found}")]
    ValueConversion {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type alias for TRELLIS operations.
pub type TrellisResult<T> = Result<T, TrellisError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display_counter_mixing() {
        let err = SchemaError::CounterMixing {
            document: "PageViews".to_string(),
            offenders: vec!["title".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("PageViews"));
        assert!(msg.contains("title"));
    }

    #[test]
    fn test_type_mapping_error_names_type() {
        let err = TypeMappingError::Unmappable {
            field: "owner".to_string(),
            type_name: "Account".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Account"));
        assert!(msg.contains("owner"));
    }

    #[test]
    fn test_transport_error_display_with_code() {
        let err = TransportError::new("unavailable").with_code(0x1000);
        let msg = format!("{}", err);
        assert!(msg.contains("unavailable"));
        assert!(msg.contains("0x1000"));

        let plain = TransportError::new("reset");
        assert_eq!(format!("{}", plain), "Transport error: reset");
    }

    #[test]
    fn test_transport_error_passes_through_unchanged() {
        let original = TransportError::new("timeout").with_code(0x1200);
        let wrapped = TrellisError::from(original.clone());
        match wrapped {
            TrellisError::Transport(inner) => assert_eq!(inner, original),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_migration_error_display_drift() {
        let err = MigrationError::ChecksumDrift {
            id: "20260101_001".to_string(),
            recorded: "aa".to_string(),
            current: "bb".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("20260101_001"));
        assert!(msg.contains("drift"));
    }

    #[test]
    fn test_trellis_error_from_variants() {
        let config = TrellisError::from(ConfigError::BackendNotConfigured);
        assert!(matches!(config, TrellisError::Config(_)));

        let lookup = TrellisError::from(LookupError::NotFound {
            document: "Review".to_string(),
        });
        assert!(matches!(lookup, TrellisError::Lookup(_)));

        let query = TrellisError::from(QueryError::EmptyStatement {
            statement: "UPDATE".to_string(),
        });
        assert!(matches!(query, TrellisError::Query(_)));

        let migration = TrellisError::from(MigrationError::DuplicateId {
            id: "1".to_string(),
        });
        assert!(matches!(migration, TrellisError::Migration(_)));
    }
}
