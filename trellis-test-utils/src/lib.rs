//! TRELLIS Test Utilities
//!
//! Centralized test infrastructure for the TRELLIS workspace:
//! - Fixture documents (plain, counter, polymorphic hierarchy)
//! - Proptest generators for identifiers, values, and documents
//! - A stateful ledger emulator on top of the mock backend

// Re-export the mock backend from its source crate
pub use trellis_storage::MockBackend;

// Re-export core types for convenience
pub use trellis_core::{
    Document, DocumentDescriptor, FieldDescriptor, FieldType, Predicate, Row, TransportError,
    TrellisError, TrellisResult, Value,
};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use trellis_cql::{Statement, StatementKind};

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use once_cell::sync::Lazy;
    use trellis_core::{ClusteringOrder, DiscriminatorRegistry};

    /// Review of a product: partitioned by product, newest first.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Review {
        pub product_id: String,
        pub created_at: DateTime<Utc>,
        pub rating: i32,
        pub body: Option<String>,
    }

    impl Review {
        /// Review created `second` seconds after a fixed instant.
        pub fn sample(product_id: &str, second: i64) -> Self {
            Self {
                product_id: product_id.to_string(),
                created_at: Utc
                    .timestamp_opt(1_700_000_000 + second, 0)
                    .single()
                    .unwrap_or_default(),
                rating: 4,
                body: None,
            }
        }
    }

    impl Document for Review {
        fn descriptor() -> DocumentDescriptor {
            DocumentDescriptor::new("Review")
                .table("reviews")
                .field(FieldDescriptor::new("product_id", FieldType::Text).partition_key(0))
                .field(
                    FieldDescriptor::new("created_at", FieldType::Timestamp)
                        .clustering_key(0, ClusteringOrder::Desc),
                )
                .field(FieldDescriptor::new("rating", FieldType::Int).index())
                .field(FieldDescriptor::new("body", FieldType::optional(FieldType::Text)))
        }

        fn to_row(&self) -> Row {
            Row::new()
                .with("product_id", self.product_id.clone())
                .with("created_at", self.created_at)
                .with("rating", self.rating)
                .with("body", self.body.clone())
        }

        fn from_row(row: &Row) -> TrellisResult<Self> {
            Ok(Self {
                product_id: row.get_as("product_id")?,
                created_at: row.get_as("created_at")?,
                rating: row.get_as("rating")?,
                body: row.get_as("body")?,
            })
        }
    }

    /// Counter document.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PageViews {
        pub page: String,
        pub views: i64,
    }

    impl Document for PageViews {
        fn descriptor() -> DocumentDescriptor {
            DocumentDescriptor::new("PageViews")
                .field(FieldDescriptor::new("page", FieldType::Text).partition_key(0))
                .field(FieldDescriptor::new("views", FieldType::Int).counter())
        }

        fn to_row(&self) -> Row {
            Row::new()
                .with("page", self.page.clone())
                .with("views", Value::Counter(self.views))
        }

        fn from_row(row: &Row) -> TrellisResult<Self> {
            Ok(Self {
                page: row.get_as("page")?,
                views: row.get_as("views")?,
            })
        }
    }

    pub fn pet_descriptor() -> DocumentDescriptor {
        DocumentDescriptor::new("Pet")
            .keyspace("zoo")
            .field(FieldDescriptor::new("name", FieldType::Text).partition_key(0))
            .field(FieldDescriptor::new("kind", FieldType::Text).discriminator())
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Dog {
        pub name: String,
        pub good: bool,
    }

    impl Document for Dog {
        fn descriptor() -> DocumentDescriptor {
            DocumentDescriptor::new("Dog")
                .extends(pet_descriptor())
                .discriminator_value("dog")
                .field(FieldDescriptor::new("good", FieldType::Boolean).default_value(true))
        }

        fn to_row(&self) -> Row {
            Row::new().with("name", self.name.clone()).with("good", self.good)
        }

        fn from_row(row: &Row) -> TrellisResult<Self> {
            Ok(Self {
                name: row.get_as("name")?,
                good: row.get_as("good")?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Cat {
        pub name: String,
        pub lives: i32,
    }

    impl Document for Cat {
        fn descriptor() -> DocumentDescriptor {
            DocumentDescriptor::new("Cat")
                .extends(pet_descriptor())
                .discriminator_value("cat")
                .field(FieldDescriptor::new("lives", FieldType::Int))
        }

        fn to_row(&self) -> Row {
            Row::new().with("name", self.name.clone()).with("lives", self.lives)
        }

        fn from_row(row: &Row) -> TrellisResult<Self> {
            Ok(Self {
                name: row.get_as("name")?,
                lives: row.get_as("lives")?,
            })
        }
    }

    /// Base of the hierarchy; rows of unregistered kinds load as `Other`.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Pet {
        Dog(Dog),
        Cat(Cat),
        Other { name: String, kind: Option<String> },
    }

    impl From<Dog> for Pet {
        fn from(dog: Dog) -> Self {
            Pet::Dog(dog)
        }
    }

    impl From<Cat> for Pet {
        fn from(cat: Cat) -> Self {
            Pet::Cat(cat)
        }
    }

    static PET_REGISTRY: Lazy<TrellisResult<DiscriminatorRegistry<Pet>>> = Lazy::new(|| {
        DiscriminatorRegistry::new(|row| {
            Ok(Pet::Other {
                name: row.get_as("name")?,
                kind: row.get_as("kind")?,
            })
        })?
        .register::<Dog>()?
        .register::<Cat>()
    });

    impl Document for Pet {
        fn descriptor() -> DocumentDescriptor {
            pet_descriptor()
        }

        fn to_row(&self) -> Row {
            match self {
                Pet::Dog(dog) => dog.to_row().with("kind", "dog"),
                Pet::Cat(cat) => cat.to_row().with("kind", "cat"),
                Pet::Other { name, kind } => Row::new()
                    .with("name", name.clone())
                    .with("kind", kind.clone()),
            }
        }

        fn from_row(row: &Row) -> TrellisResult<Self> {
            match &*PET_REGISTRY {
                Ok(registry) => registry.resolve(row),
                Err(e) => Err(e.clone()),
            }
        }
    }

    pub fn dog_row(name: &str) -> Row {
        Row::new()
            .with("name", name)
            .with("kind", "dog")
            .with("good", true)
    }

    pub fn cat_row(name: &str, lives: i32) -> Row {
        Row::new()
            .with("name", name)
            .with("kind", "cat")
            .with("lives", lives)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::fixtures::Review;
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    /// Plain lowercase identifier, never a reserved word.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}".prop_map(|s| format!("c_{}", s))
    }

    /// Migration identifier text: one to three digit groups.
    pub fn arb_migration_id() -> impl Strategy<Value = String> {
        prop::collection::vec(0u32..1_000_000, 1..4).prop_map(|groups| {
            groups
                .iter()
                .map(|g| g.to_string())
                .collect::<Vec<_>>()
                .join("_")
        })
    }

    /// Scalar bind value.
    pub fn arb_scalar_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i32>().prop_map(Value::Int),
            any::<i64>().prop_map(Value::BigInt),
            any::<bool>().prop_map(Value::Boolean),
            ".{0,32}".prop_map(Value::Text),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Blob),
        ]
    }

    pub fn arb_review() -> impl Strategy<Value = Review> {
        (
            "[a-z0-9]{1,12}",
            0i64..1_000_000,
            1i32..=5,
            proptest::option::of(".{0,64}"),
        )
            .prop_map(|(product_id, second, rating, body)| Review {
                product_id,
                created_at: Utc
                    .timestamp_opt(1_700_000_000 + second, 0)
                    .single()
                    .unwrap_or_default(),
                rating,
                body,
            })
    }
}

// ============================================================================
// LEDGER EMULATOR
// ============================================================================

/// Stateful stand-in for a bookkeeping table behind a [`MockBackend`].
///
/// Understands the statements the migration runner issues against the table:
/// `CREATE TABLE`, the `system_schema.tables` probe, `SELECT *`, `INSERT`,
/// and `DELETE ... WHERE id = ?`.
#[derive(Debug, Clone, Default)]
pub struct LedgerEmulator {
    table: String,
    created: Arc<AtomicBool>,
    rows: Arc<RwLock<BTreeMap<String, Row>>>,
}

fn lock_error() -> TransportError {
    TransportError::new("ledger emulator lock poisoned")
}

/// Column names of an `INSERT INTO t (a, b) VALUES (...)`.
fn insert_columns(cql: &str) -> Vec<String> {
    let start = cql.find('(').map(|i| i + 1).unwrap_or(0);
    let end = cql[start..].find(')').map(|i| start + i).unwrap_or(start);
    cql[start..end]
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

impl LedgerEmulator {
    /// Install handlers for `table` on `backend`.
    pub fn install(backend: &MockBackend, table: &str) -> Self {
        let emulator = Self {
            table: table.to_string(),
            ..Default::default()
        };

        let state = emulator.clone();
        backend.handle(table, move |statement| state.on_table(statement));

        let state = emulator.clone();
        backend.handle("system_schema.tables", move |statement| {
            let asks_for_table = statement.params.get(1).and_then(Value::as_str)
                == Some(state.table.as_str());
            if asks_for_table && state.created.load(Ordering::SeqCst) {
                Ok(vec![Row::new().with("table_name", state.table.as_str())])
            } else {
                Ok(Vec::new())
            }
        });

        emulator
    }

    fn on_table(&self, statement: &Statement) -> Result<Vec<Row>, TransportError> {
        match statement.kind {
            StatementKind::Schema if statement.cql.starts_with("CREATE TABLE") => {
                self.created.store(true, Ordering::SeqCst);
                Ok(Vec::new())
            }
            StatementKind::Select => Ok(self.rows()),
            StatementKind::Insert => {
                let row = Row::from_pairs(
                    insert_columns(&statement.cql)
                        .into_iter()
                        .zip(statement.params.iter().cloned()),
                );
                let id = row
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| TransportError::new("insert without id"))?
                    .to_string();
                self.rows.write().map_err(|_| lock_error())?.insert(id, row);
                Ok(Vec::new())
            }
            StatementKind::Delete => {
                if let Some(id) = statement.params.first().and_then(Value::as_str) {
                    self.rows.write().map_err(|_| lock_error())?.remove(id);
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    pub fn is_created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    /// Stored rows, ordered by id text.
    pub fn rows(&self) -> Vec<Row> {
        self.rows
            .read()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ids(&self) -> Vec<String> {
        self.rows
            .read()
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Overwrite a recorded checksum.
    pub fn set_checksum(&self, id: &str, checksum: &str) {
        if let Ok(mut rows) = self.rows.write() {
            if let Some(row) = rows.get_mut(id) {
                row.insert("checksum", checksum);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
