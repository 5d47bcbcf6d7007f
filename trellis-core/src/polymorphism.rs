//! Discriminator-based polymorphic dispatch.
//!
//! A hierarchy is modelled as a base type (usually an enum over its
//! variants) plus one concrete document type per variant. The registry maps
//! each variant's discriminator value to a constructor producing the base
//! type; rows with an unknown or missing value fall back to the base's own
//! constructor so rows written by newer variants still load.

use std::collections::BTreeMap;

use crate::document::Document;
use crate::schema::DocumentSchema;
use crate::{Row, SchemaError, TrellisResult, Value};

/// Builds a hierarchy member from a row.
pub type Constructor<B> = fn(&Row) -> TrellisResult<B>;

/// Discriminator value -> constructor table for base type `B`.
pub struct DiscriminatorRegistry<B> {
    document: String,
    column: String,
    variants: BTreeMap<String, Constructor<B>>,
    fallback: Constructor<B>,
}

impl<B: Document> DiscriminatorRegistry<B> {
    /// Start a registry for base `B`; `fallback` handles unrecognized rows.
    pub fn new(fallback: Constructor<B>) -> TrellisResult<Self> {
        let schema = B::schema()?;
        let column = schema
            .discriminator
            .as_ref()
            .map(|d| d.column.clone())
            .ok_or_else(|| SchemaError::InvalidColumn {
                document: schema.type_name.clone(),
                column: String::new(),
                reason: "polymorphic base declares no discriminator column".to_string(),
            })?;
        Ok(Self {
            document: schema.type_name.clone(),
            column,
            variants: BTreeMap::new(),
            fallback,
        })
    }

    /// Register concrete variant `V` under its declared discriminator value.
    pub fn register<V>(mut self) -> TrellisResult<Self>
    where
        V: Document,
        B: From<V>,
    {
        let schema = V::schema()?;
        let discriminator =
            schema
                .discriminator
                .as_ref()
                .ok_or_else(|| SchemaError::MissingDiscriminatorValue {
                    document: schema.type_name.clone(),
                })?;

        if discriminator.column != self.column {
            return Err(SchemaError::MultipleDiscriminators {
                document: schema.type_name.clone(),
                columns: vec![self.column.clone(), discriminator.column.clone()],
            }
            .into());
        }

        let value = discriminator
            .value
            .clone()
            .ok_or_else(|| SchemaError::MissingDiscriminatorValue {
                document: schema.type_name.clone(),
            })?;

        if self.variants.contains_key(&value) {
            return Err(SchemaError::DuplicateDiscriminatorValue {
                document: self.document.clone(),
                value,
            }
            .into());
        }

        let construct: Constructor<B> = |row| V::from_row(row).map(B::from);
        self.variants.insert(value, construct);
        Ok(self)
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Registered discriminator values, sorted.
    pub fn values(&self) -> Vec<&str> {
        self.variants.keys().map(String::as_str).collect()
    }

    /// Instantiate the variant named by the row's discriminator, or the
    /// fallback when the value is missing or unrecognized.
    pub fn resolve(&self, row: &Row) -> TrellisResult<B> {
        let value = row.get(&self.column).and_then(Value::as_str);
        match value.and_then(|v| self.variants.get(v)) {
            Some(construct) => construct(row),
            None => {
                if let Some(unknown) = value {
                    tracing::debug!(
                        document = %self.document,
                        discriminator = %unknown,
                        "unrecognized discriminator, using base type"
                    );
                }
                (self.fallback)(row)
            }
        }
    }
}

/// Equality constraint a query through `schema` must carry, if it is a
/// concrete variant.
pub fn discriminator_filter(schema: &DocumentSchema) -> Option<(String, Value)> {
    let discriminator = schema.discriminator.as_ref()?;
    let value = discriminator.value.as_ref()?;
    Some((discriminator.column.clone(), Value::Text(value.clone())))
}

/// Overwrite the discriminator column of a row being saved through a variant.
pub fn stamp_discriminator(schema: &DocumentSchema, row: &mut Row) {
    if let Some((column, value)) = discriminator_filter(schema) {
        row.insert(column, value);
    }
}
