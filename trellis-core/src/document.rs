//! Explicit document description.
//!
//! A document type describes its fields once through [`DocumentDescriptor`];
//! the schema builder consumes only that description, never the Rust struct
//! layout.

use std::sync::Arc;

use crate::schema::{DocumentSchema, SchemaRegistry};
use crate::types::{ClusteringOrder, FieldType, Marker, Similarity, Width};
use crate::{Row, TrellisResult, Value};

/// One declared field: name, base type, markers, optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: FieldType,
    pub markers: Vec<Marker>,
    pub default: Option<Value>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            markers: Vec::new(),
            default: None,
        }
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn partition_key(self, ordinal: u32) -> Self {
        self.marker(Marker::PartitionKey { ordinal })
    }

    pub fn clustering_key(self, ordinal: u32, order: ClusteringOrder) -> Self {
        self.marker(Marker::ClusteringKey { ordinal, order })
    }

    pub fn index(self) -> Self {
        self.marker(Marker::Index { name: None })
    }

    pub fn index_named(self, name: impl Into<String>) -> Self {
        self.marker(Marker::Index {
            name: Some(name.into()),
        })
    }

    pub fn counter(self) -> Self {
        self.marker(Marker::Counter)
    }

    pub fn static_column(self) -> Self {
        self.marker(Marker::Static)
    }

    pub fn frozen(self) -> Self {
        self.marker(Marker::Frozen)
    }

    pub fn discriminator(self) -> Self {
        self.marker(Marker::Discriminator)
    }

    pub fn width(self, width: Width) -> Self {
        self.marker(Marker::Width(width))
    }

    pub fn vector(self, dimensions: u32, similarity: Similarity) -> Self {
        self.marker(Marker::Vector {
            dimensions,
            similarity,
        })
    }

    pub fn transient(self) -> Self {
        self.marker(Marker::Transient)
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn has_marker(&self, name: &str) -> bool {
        self.markers.iter().any(|m| m.name() == name)
    }

    /// Private (`_`-prefixed) and transient fields never reach the schema.
    pub fn is_skipped(&self) -> bool {
        self.name.starts_with('_') || self.markers.contains(&Marker::Transient)
    }
}

/// Materialized view definition: base table plus the required
/// `IS NOT NULL` predicate columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    pub base_table: String,
    pub not_null: Vec<String>,
}

/// Declared shape of one document type.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDescriptor {
    pub type_name: String,
    pub table: Option<String>,
    pub keyspace: Option<String>,
    pub default_ttl: Option<u32>,
    pub view: Option<ViewDefinition>,
    pub discriminator_value: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    pub parent: Option<Box<DocumentDescriptor>>,
}

impl DocumentDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table: None,
            keyspace: None,
            default_ttl: None,
            view: None,
            discriminator_value: None,
            fields: Vec::new(),
            parent: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn default_ttl(mut self, seconds: u32) -> Self {
        self.default_ttl = Some(seconds);
        self
    }

    /// Declare this document as a materialized view over `base_table`.
    pub fn view_of<I, S>(mut self, base_table: impl Into<String>, not_null: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.view = Some(ViewDefinition {
            base_table: base_table.into(),
            not_null: not_null.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Inherit every field and table setting of `parent`.
    pub fn extends(mut self, parent: DocumentDescriptor) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn discriminator_value(mut self, value: impl Into<String>) -> Self {
        self.discriminator_value = Some(value.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Descriptors from the root of the hierarchy down to `self`.
    pub fn chain(&self) -> Vec<&DocumentDescriptor> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }
}

/// A persistable document type.
///
/// Implementors describe themselves explicitly; the schema is derived from
/// [`Document::descriptor`] once per concrete type and memoized.
pub trait Document: Sized + Send + Sync + 'static {
    /// Field and table description for this exact type.
    fn descriptor() -> DocumentDescriptor;

    /// Column values of this instance, keyed by column name.
    fn to_row(&self) -> Row;

    /// Build an instance from a result row.
    fn from_row(row: &Row) -> TrellisResult<Self>;

    /// Memoized schema of this exact type.
    fn schema() -> TrellisResult<Arc<DocumentSchema>> {
        SchemaRegistry::global().schema_for::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_builder_collects_markers() {
        let field = FieldDescriptor::new("created_at", FieldType::Timestamp)
            .clustering_key(0, ClusteringOrder::Desc)
            .frozen();
        assert!(field.has_marker("clustering_key"));
        assert!(field.has_marker("frozen"));
        assert!(!field.is_skipped());
    }

    #[test]
    fn test_private_and_transient_fields_are_skipped() {
        assert!(FieldDescriptor::new("_cache", FieldType::Text).is_skipped());
        assert!(FieldDescriptor::new("scratch", FieldType::Text)
            .transient()
            .is_skipped());
    }

    #[test]
    fn test_chain_runs_root_first() {
        let root = DocumentDescriptor::new("Animal");
        let mid = DocumentDescriptor::new("Dog").extends(root);
        let leaf = DocumentDescriptor::new("Puppy").extends(mid);
        let names: Vec<&str> = leaf.chain().iter().map(|d| d.type_name.as_str()).collect();
        assert_eq!(names, vec!["Animal", "Dog", "Puppy"]);
    }
}
