//! Identifier and literal escaping.
//!
//! Only identifiers (and typed DDL literals) are ever written into statement
//! text; every caller-supplied value goes through a bind marker.

use std::fmt;

use trellis_core::{
    is_simple_identifier, ConfigError, DocumentSchema, TableIdentity, TrellisResult,
};

const RESERVED: &[&str] = &[
    "add", "allow", "alter", "and", "apply", "asc", "authorize", "batch", "begin", "by",
    "columnfamily", "create", "delete", "desc", "describe", "drop", "entries", "execute", "from",
    "full", "grant", "if", "in", "index", "infinity", "insert", "into", "keyspace", "limit",
    "modify", "nan", "norecursive", "not", "null", "of", "on", "or", "order", "primary",
    "rename", "replace", "revoke", "schema", "select", "set", "table", "to", "token",
    "truncate", "unlogged", "update", "use", "using", "view", "where", "with",
];

/// Quote an identifier unless it is a plain lowercase, non-reserved name.
pub fn quote_ident(ident: &str) -> String {
    if is_simple_identifier(ident) && !RESERVED.contains(&ident) {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Single-quoted string literal, for DDL options only.
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A fully qualified table reference: `keyspace.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub keyspace: String,
    pub name: String,
}

impl TableRef {
    pub fn new(keyspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            name: name.into(),
        }
    }

    /// Resolve a table identity: its own keyspace first, then `default_keyspace`.
    pub fn resolve(
        document: &str,
        identity: &TableIdentity,
        default_keyspace: Option<&str>,
    ) -> TrellisResult<Self> {
        let keyspace = identity
            .keyspace
            .as_deref()
            .or(default_keyspace)
            .ok_or_else(|| ConfigError::KeyspaceUnresolved {
                document: document.to_string(),
            })?;
        Ok(Self::new(keyspace, identity.name.clone()))
    }

    pub fn for_schema(schema: &DocumentSchema, default_keyspace: Option<&str>) -> TrellisResult<Self> {
        Self::resolve(&schema.type_name, &schema.table, default_keyspace)
    }

    /// Sibling object (view, base table) in the same keyspace.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.keyspace.clone(), name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.keyspace), quote_ident(&self.name))
    }
}
