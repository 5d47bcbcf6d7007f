//! Schema builder: document descriptor -> ordered column definitions.
//!
//! Schemas are built once per concrete Rust type and memoized in the
//! [`SchemaRegistry`]. A variant never reuses its parent's entry, even when
//! the two describe identical fields.

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentDescriptor, FieldDescriptor, ViewDefinition};
use crate::identity::snake_case;
use crate::types::{map_type, ClusteringOrder, Marker, Similarity};
use crate::{SchemaError, TrellisError, TrellisResult, Value};

/// Vector column settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSpec {
    pub dimensions: u32,
    pub similarity: Similarity,
}

/// One resolved column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// Canonical schema type, e.g. `frozen<list<text>>`.
    pub cql_type: String,
    pub partition_ordinal: Option<u32>,
    pub clustering: Option<(u32, ClusteringOrder)>,
    /// `Some(None)` is an index with a generated name.
    pub index: Option<Option<String>>,
    pub vector: Option<VectorSpec>,
    pub is_static: bool,
    pub is_counter: bool,
    pub is_discriminator: bool,
    pub required: bool,
    pub default: Option<Value>,
}

impl ColumnDefinition {
    pub fn is_partition_key(&self) -> bool {
        self.partition_ordinal.is_some()
    }

    pub fn is_clustering_key(&self) -> bool {
        self.clustering.is_some()
    }

    pub fn is_primary_key(&self) -> bool {
        self.is_partition_key() || self.is_clustering_key()
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }
}

/// Table identity: name, keyspace, expiry, optional view definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdentity {
    pub name: String,
    /// `None` defers to the backend's default keyspace.
    pub keyspace: Option<String>,
    pub default_ttl: Option<u32>,
    pub view: Option<ViewDefinition>,
}

/// Discriminator settings of a polymorphic document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminator {
    pub column: String,
    /// Set for concrete variants; `None` on the hierarchy base.
    pub value: Option<String>,
    /// Type that first declared the discriminator column.
    pub schema_base: String,
}

/// Ordered column definitions of one concrete type.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSchema {
    pub type_name: String,
    pub table: TableIdentity,
    pub columns: Vec<ColumnDefinition>,
    pub discriminator: Option<Discriminator>,
}

impl DocumentSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column or fail with `SchemaError::UnknownColumn`.
    pub fn require_column(&self, name: &str) -> TrellisResult<&ColumnDefinition> {
        self.column(name).ok_or_else(|| {
            SchemaError::UnknownColumn {
                document: self.type_name.clone(),
                column: name.to_string(),
            }
            .into()
        })
    }

    /// Partition key columns in ordinal order.
    pub fn partition_keys(&self) -> Vec<&ColumnDefinition> {
        let mut keys: Vec<_> = self.columns.iter().filter(|c| c.is_partition_key()).collect();
        keys.sort_by_key(|c| c.partition_ordinal);
        keys
    }

    /// Clustering columns in ordinal order.
    pub fn clustering_keys(&self) -> Vec<&ColumnDefinition> {
        let mut keys: Vec<_> = self.columns.iter().filter(|c| c.is_clustering_key()).collect();
        keys.sort_by_key(|c| c.clustering.map(|(ordinal, _)| ordinal));
        keys
    }

    pub fn primary_key(&self) -> Vec<&ColumnDefinition> {
        let mut keys = self.partition_keys();
        keys.extend(self.clustering_keys());
        keys
    }

    pub fn is_counter_table(&self) -> bool {
        self.columns.iter().any(|c| c.is_counter)
    }

    pub fn is_view(&self) -> bool {
        self.table.view.is_some()
    }

    pub fn indexed_columns(&self) -> Vec<&ColumnDefinition> {
        self.columns.iter().filter(|c| c.is_indexed()).collect()
    }
}

/// Build the schema of a descriptor, validating keys, counters, and the
/// discriminator hierarchy. Pure; no memoization.
pub fn build_schema(descriptor: &DocumentDescriptor) -> TrellisResult<DocumentSchema> {
    let chain = descriptor.chain();
    let document = descriptor.type_name.clone();

    let mut fields: Vec<&FieldDescriptor> = Vec::new();
    let mut seen = BTreeSet::new();
    let mut discriminators: Vec<(&str, &str)> = Vec::new();
    for level in &chain {
        for field in level.fields.iter().filter(|f| !f.is_skipped()) {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    document,
                    column: field.name.clone(),
                }
                .into());
            }
            if field.has_marker("discriminator") {
                discriminators.push((field.name.as_str(), level.type_name.as_str()));
            }
            fields.push(field);
        }
    }

    if discriminators.len() > 1 {
        return Err(SchemaError::MultipleDiscriminators {
            document,
            columns: discriminators.iter().map(|(c, _)| c.to_string()).collect(),
        }
        .into());
    }

    let discriminator = match discriminators.first() {
        Some(&(column, schema_base)) => {
            let is_base = schema_base == descriptor.type_name;
            if !is_base && descriptor.discriminator_value.is_none() {
                return Err(SchemaError::MissingDiscriminatorValue { document }.into());
            }
            Some(Discriminator {
                column: column.to_string(),
                value: descriptor.discriminator_value.clone(),
                schema_base: schema_base.to_string(),
            })
        }
        None => None,
    };

    let table = resolve_table(descriptor, &chain, discriminator.as_ref());

    let mut columns = fields
        .iter()
        .map(|field| build_column(&document, field))
        .collect::<TrellisResult<Vec<_>>>()?;

    // Keys first, by ordinal; everything else keeps declaration order.
    columns.sort_by_key(|c| match (c.partition_ordinal, c.clustering) {
        (Some(p), _) => (0, p),
        (None, Some((o, _))) => (1, o),
        (None, None) => (2, 0),
    });

    let schema = DocumentSchema {
        type_name: document,
        table,
        columns,
        discriminator,
    };
    validate(&schema)?;
    Ok(schema)
}

fn resolve_table(
    descriptor: &DocumentDescriptor,
    chain: &[&DocumentDescriptor],
    discriminator: Option<&Discriminator>,
) -> TableIdentity {
    // Variants of a polymorphic hierarchy live in the schema base's table.
    let owner = discriminator
        .and_then(|d| chain.iter().find(|level| level.type_name == d.schema_base))
        .copied()
        .unwrap_or(descriptor);

    let name = descriptor
        .table
        .clone()
        .or_else(|| owner.table.clone())
        .unwrap_or_else(|| snake_case(&owner.type_name));

    TableIdentity {
        name,
        keyspace: chain.iter().rev().find_map(|level| level.keyspace.clone()),
        default_ttl: chain.iter().rev().find_map(|level| level.default_ttl),
        view: descriptor.view.clone(),
    }
}

fn build_column(document: &str, field: &FieldDescriptor) -> TrellisResult<ColumnDefinition> {
    let cql_type = map_type(&field.name, &field.ty, &field.markers)?;

    let mut column = ColumnDefinition {
        name: field.name.clone(),
        cql_type,
        partition_ordinal: None,
        clustering: None,
        index: None,
        vector: None,
        is_static: false,
        is_counter: false,
        is_discriminator: false,
        required: !field.ty.is_optional() && field.default.is_none(),
        default: field.default.clone(),
    };

    for marker in &field.markers {
        match marker {
            Marker::PartitionKey { ordinal } => column.partition_ordinal = Some(*ordinal),
            Marker::ClusteringKey { ordinal, order } => column.clustering = Some((*ordinal, *order)),
            Marker::Index { name } => column.index = Some(name.clone()),
            Marker::Counter => column.is_counter = true,
            Marker::Static => column.is_static = true,
            Marker::Discriminator => column.is_discriminator = true,
            Marker::Vector {
                dimensions,
                similarity,
            } => {
                column.vector = Some(VectorSpec {
                    dimensions: *dimensions,
                    similarity: *similarity,
                })
            }
            Marker::Frozen | Marker::Width(_) | Marker::Transient => {}
        }
    }

    if column.is_primary_key() {
        column.required = true;
    }

    let invalid = |reason: &str| -> TrellisError {
        SchemaError::InvalidColumn {
            document: document.to_string(),
            column: field.name.clone(),
            reason: reason.to_string(),
        }
        .into()
    };

    if column.is_partition_key() && column.is_clustering_key() {
        return Err(invalid("cannot be both partition and clustering key"));
    }
    if column.is_primary_key() && (column.is_static || column.is_counter) {
        return Err(invalid("key columns cannot be static or counter"));
    }
    if column.is_primary_key() && field.ty.is_collection() && !field.has_marker("frozen") {
        return Err(invalid("collection key columns must be frozen"));
    }

    // Discriminator lookups and ANN ordering go through an index.
    let needs_index = column.is_discriminator || column.vector.is_some();
    if needs_index && !column.is_primary_key() && column.index.is_none() {
        column.index = Some(None);
    }

    Ok(column)
}

fn validate(schema: &DocumentSchema) -> TrellisResult<()> {
    let document = || schema.type_name.clone();

    let partition: Vec<u32> = schema
        .partition_keys()
        .iter()
        .filter_map(|c| c.partition_ordinal)
        .collect();
    if partition.is_empty() {
        return Err(SchemaError::MissingPartitionKey {
            document: document(),
        }
        .into());
    }
    check_ordinals(&schema.type_name, "partition", &partition)?;

    let clustering: Vec<u32> = schema
        .clustering_keys()
        .iter()
        .filter_map(|c| c.clustering.map(|(o, _)| o))
        .collect();
    check_ordinals(&schema.type_name, "clustering", &clustering)?;

    if schema.is_counter_table() {
        let offenders: Vec<String> = schema
            .columns
            .iter()
            .filter(|c| !c.is_primary_key() && !c.is_counter)
            .map(|c| c.name.clone())
            .collect();
        if !offenders.is_empty() {
            return Err(SchemaError::CounterMixing {
                document: document(),
                offenders,
            }
            .into());
        }
    }

    Ok(())
}

/// Ordinals must be exactly `0..n` once sorted.
fn check_ordinals(document: &str, kind: &str, sorted: &[u32]) -> TrellisResult<()> {
    let well_formed = sorted.iter().enumerate().all(|(i, o)| *o as usize == i);
    if well_formed {
        Ok(())
    } else {
        Err(SchemaError::MalformedKeyOrdinals {
            document: document.to_string(),
            kind: kind.to_string(),
            ordinals: sorted.to_vec(),
        }
        .into())
    }
}

/// Process-wide schema memo keyed by the exact Rust type.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<TypeId, Arc<DocumentSchema>>>,
}

static GLOBAL_REGISTRY: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::new);

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static SchemaRegistry {
        &GLOBAL_REGISTRY
    }

    /// Schema of `T`, built on first access. Build failures are not cached.
    pub fn schema_for<T: Document>(&self) -> TrellisResult<Arc<DocumentSchema>> {
        let key = TypeId::of::<T>();
        {
            let schemas = self.schemas.read().map_err(|_| TrellisError::LockPoisoned)?;
            if let Some(schema) = schemas.get(&key) {
                return Ok(Arc::clone(schema));
            }
        }

        let mut schemas = self.schemas.write().map_err(|_| TrellisError::LockPoisoned)?;
        if let Some(schema) = schemas.get(&key) {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(build_schema(&T::descriptor())?);
        tracing::debug!(document = %schema.type_name, table = %schema.table.name, "schema built");
        schemas.insert(key, Arc::clone(&schema));
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.schemas.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldDescriptor;
    use crate::types::FieldType;
    use crate::Row;

    fn review_descriptor() -> DocumentDescriptor {
        DocumentDescriptor::new("ProductReview")
            .keyspace("shop")
            .field(FieldDescriptor::new("rating", FieldType::Int).index())
            .field(
                FieldDescriptor::new("created_at", FieldType::Timestamp)
                    .clustering_key(0, ClusteringOrder::Desc),
            )
            .field(FieldDescriptor::new("product_id", FieldType::Uuid).partition_key(0))
            .field(FieldDescriptor::new("body", FieldType::optional(FieldType::Text)))
            .field(FieldDescriptor::new("_scratch", FieldType::Text))
    }

    #[test]
    fn test_keys_come_first_in_ordinal_order() {
        let schema = build_schema(&review_descriptor()).unwrap();
        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["product_id", "created_at", "rating", "body"]);
        assert_eq!(schema.table.name, "product_review");
        assert_eq!(schema.table.keyspace.as_deref(), Some("shop"));
    }

    #[test]
    fn test_requiredness_follows_optional_and_default() {
        let descriptor = review_descriptor()
            .field(FieldDescriptor::new("votes", FieldType::Int).default_value(0));
        let schema = build_schema(&descriptor).unwrap();
        assert!(schema.column("rating").unwrap().required);
        assert!(!schema.column("body").unwrap().required);
        assert!(!schema.column("votes").unwrap().required);
        assert!(schema.column("product_id").unwrap().required);
    }

    #[test]
    fn test_counter_mixing_lists_offenders() {
        let descriptor = DocumentDescriptor::new("PageViews")
            .field(FieldDescriptor::new("page", FieldType::Text).partition_key(0))
            .field(FieldDescriptor::new("views", FieldType::Int).counter())
            .field(FieldDescriptor::new("title", FieldType::Text));
        let err = build_schema(&descriptor).unwrap_err();
        assert_eq!(
            err,
            TrellisError::Schema(SchemaError::CounterMixing {
                document: "PageViews".to_string(),
                offenders: vec!["title".to_string()],
            })
        );
    }

    #[test]
    fn test_pure_counter_table_is_valid() {
        let descriptor = DocumentDescriptor::new("PageViews")
            .field(FieldDescriptor::new("page", FieldType::Text).partition_key(0))
            .field(FieldDescriptor::new("views", FieldType::Int).counter())
            .field(FieldDescriptor::new("clicks", FieldType::Int).counter());
        let schema = build_schema(&descriptor).unwrap();
        assert!(schema.is_counter_table());
        assert_eq!(schema.column("views").unwrap().cql_type, "counter");
    }

    #[test]
    fn test_missing_partition_key_fails() {
        let descriptor =
            DocumentDescriptor::new("Loose").field(FieldDescriptor::new("a", FieldType::Int));
        assert!(matches!(
            build_schema(&descriptor),
            Err(TrellisError::Schema(SchemaError::MissingPartitionKey { .. }))
        ));
    }

    #[test]
    fn test_gapped_ordinals_fail() {
        let descriptor = DocumentDescriptor::new("Gapped")
            .field(FieldDescriptor::new("a", FieldType::Int).partition_key(0))
            .field(FieldDescriptor::new("b", FieldType::Int).partition_key(2));
        assert!(matches!(
            build_schema(&descriptor),
            Err(TrellisError::Schema(SchemaError::MalformedKeyOrdinals { .. }))
        ));
    }

    #[test]
    fn test_duplicate_ordinals_fail() {
        let descriptor = DocumentDescriptor::new("Twice")
            .field(FieldDescriptor::new("a", FieldType::Int).partition_key(0))
            .field(FieldDescriptor::new("b", FieldType::Int).partition_key(0));
        assert!(build_schema(&descriptor).is_err());
    }

    #[test]
    fn test_unfrozen_collection_key_fails() {
        let descriptor = DocumentDescriptor::new("Bad")
            .field(FieldDescriptor::new("tags", FieldType::list(FieldType::Text)).partition_key(0));
        assert!(matches!(
            build_schema(&descriptor),
            Err(TrellisError::Schema(SchemaError::InvalidColumn { .. }))
        ));
    }

    fn animal() -> DocumentDescriptor {
        DocumentDescriptor::new("Animal")
            .keyspace("zoo")
            .field(FieldDescriptor::new("id", FieldType::Uuid).partition_key(0))
            .field(FieldDescriptor::new("kind", FieldType::Text).discriminator())
            .field(FieldDescriptor::new("name", FieldType::Text))
    }

    #[test]
    fn test_variant_uses_base_table_and_indexes_discriminator() {
        let dog = DocumentDescriptor::new("Dog")
            .extends(animal())
            .discriminator_value("dog")
            .field(FieldDescriptor::new("good_boy", FieldType::Boolean));
        let schema = build_schema(&dog).unwrap();
        assert_eq!(schema.table.name, "animal");
        assert_eq!(schema.table.keyspace.as_deref(), Some("zoo"));
        let disc = schema.discriminator.as_ref().unwrap();
        assert_eq!(disc.column, "kind");
        assert_eq!(disc.value.as_deref(), Some("dog"));
        assert_eq!(disc.schema_base, "Animal");
        assert!(schema.column("kind").unwrap().is_indexed());
        assert!(schema.column("good_boy").is_some());
    }

    #[test]
    fn test_variant_without_value_fails() {
        let cat = DocumentDescriptor::new("Cat").extends(animal());
        assert!(matches!(
            build_schema(&cat),
            Err(TrellisError::Schema(SchemaError::MissingDiscriminatorValue { .. }))
        ));
    }

    #[test]
    fn test_second_discriminator_fails() {
        let bad = DocumentDescriptor::new("Bird")
            .extends(animal())
            .discriminator_value("bird")
            .field(FieldDescriptor::new("subkind", FieldType::Text).discriminator());
        assert!(matches!(
            build_schema(&bad),
            Err(TrellisError::Schema(SchemaError::MultipleDiscriminators { .. }))
        ));
    }

    struct Left;
    struct Right;

    fn sibling_descriptor(name: &str) -> DocumentDescriptor {
        DocumentDescriptor::new(name)
            .table("shared")
            .field(FieldDescriptor::new("id", FieldType::Int).partition_key(0))
    }

    impl Document for Left {
        fn descriptor() -> DocumentDescriptor {
            sibling_descriptor("Same")
        }
        fn to_row(&self) -> Row {
            Row::new()
        }
        fn from_row(_row: &Row) -> TrellisResult<Self> {
            Ok(Left)
        }
    }

    impl Document for Right {
        fn descriptor() -> DocumentDescriptor {
            sibling_descriptor("Same")
        }
        fn to_row(&self) -> Row {
            Row::new()
        }
        fn from_row(_row: &Row) -> TrellisResult<Self> {
            Ok(Right)
        }
    }

    #[test]
    fn test_registry_memoizes_per_exact_type() {
        let registry = SchemaRegistry::new();
        let first = registry.schema_for::<Left>().unwrap();
        let again = registry.schema_for::<Left>().unwrap();
        let sibling = registry.schema_for::<Right>().unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &sibling));
        assert_eq!(*first, *sibling);
        assert_eq!(registry.len(), 2);
    }
}
