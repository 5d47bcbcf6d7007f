//! TRELLIS Core - Document Model and Schema Introspection
//!
//! Everything that can be decided without talking to a database lives here:
//! values and rows, the type mapper, document descriptors, the memoized
//! schema builder, and discriminator-based polymorphic dispatch.

pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod identity;
pub mod polymorphism;
pub mod schema;
pub mod types;
pub mod value;

pub use config::{Consistency, TrellisConfig};
pub use document::{Document, DocumentDescriptor, FieldDescriptor, ViewDefinition};
pub use error::{
    ConfigError, LookupError, MigrationError, QueryError, SchemaError, TransportError,
    TrellisError, TrellisResult, TypeMappingError,
};
pub use filter::{Operator, Predicate};
pub use identity::{compute_checksum, is_simple_identifier, snake_case, Checksum};
pub use polymorphism::{
    discriminator_filter, stamp_discriminator, Constructor, DiscriminatorRegistry,
};
pub use schema::{
    build_schema, ColumnDefinition, Discriminator, DocumentSchema, SchemaRegistry,
    TableIdentity, VectorSpec,
};
pub use types::{map_type, ClusteringOrder, FieldType, Marker, Similarity, Width};
pub use value::{FromValue, Row, Value};
