//! Type mapping: declared field type + markers -> canonical schema type.
//!
//! Resolution order for one field:
//! 1. unwrap `Optional` (nullability is tracked as `required`, never in the type string)
//! 2. apply a width override to the scalar leaves
//! 3. wrap containers element-wise
//! 4. `vector` / `counter` markers replace the result
//! 5. `frozen` wraps whatever came out of 1-4
//!
//! Markers are grouped by kind before they are applied, so the order in which
//! a field declares them never changes the output.

use serde::{Deserialize, Serialize};

use crate::{TrellisResult, TypeMappingError};

/// Declared type of a document field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Int,
    Float,
    Boolean,
    Blob,
    Uuid,
    Timestamp,
    Date,
    Decimal,
    Inet,
    Time,
    Optional(Box<FieldType>),
    List(Box<FieldType>),
    Set(Box<FieldType>),
    Map(Box<FieldType>, Box<FieldType>),
    Tuple(Vec<FieldType>),
    /// A type the mapper has no schema equivalent for.
    Custom(String),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    pub fn set(inner: FieldType) -> Self {
        FieldType::Set(Box::new(inner))
    }

    pub fn map(key: FieldType, value: FieldType) -> Self {
        FieldType::Map(Box::new(key), Box::new(value))
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// Strip every `Optional` layer at the top of the type.
    pub fn unwrap_optional(&self) -> &FieldType {
        match self {
            FieldType::Optional(inner) => inner.unwrap_optional(),
            other => other,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.unwrap_optional(),
            FieldType::List(_) | FieldType::Set(_) | FieldType::Map(_, _)
        )
    }

    /// Human-readable name, used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            FieldType::Text => "Text".into(),
            FieldType::Int => "Int".into(),
            FieldType::Float => "Float".into(),
            FieldType::Boolean => "Boolean".into(),
            FieldType::Blob => "Blob".into(),
            FieldType::Uuid => "Uuid".into(),
            FieldType::Timestamp => "Timestamp".into(),
            FieldType::Date => "Date".into(),
            FieldType::Decimal => "Decimal".into(),
            FieldType::Inet => "Inet".into(),
            FieldType::Time => "Time".into(),
            FieldType::Optional(t) => format!("Optional<{}>", t.type_name()),
            FieldType::List(t) => format!("List<{}>", t.type_name()),
            FieldType::Set(t) => format!("Set<{}>", t.type_name()),
            FieldType::Map(k, v) => format!("Map<{}, {}>", k.type_name(), v.type_name()),
            FieldType::Tuple(items) => format!(
                "Tuple<{}>",
                items.iter().map(|t| t.type_name()).collect::<Vec<_>>().join(", ")
            ),
            FieldType::Custom(name) => name.clone(),
        }
    }
}

/// Width/precision override for a scalar base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Width {
    BigInt,
    SmallInt,
    TinyInt,
    VarInt,
    Double,
    Ascii,
    TimeUuid,
    TimeOfDay,
}

impl Width {
    pub fn schema_type(&self) -> &'static str {
        match self {
            Width::BigInt => "bigint",
            Width::SmallInt => "smallint",
            Width::TinyInt => "tinyint",
            Width::VarInt => "varint",
            Width::Double => "double",
            Width::Ascii => "ascii",
            Width::TimeUuid => "timeuuid",
            Width::TimeOfDay => "time",
        }
    }

    /// Base types this override may replace.
    fn accepts(&self, base: &FieldType) -> bool {
        match self {
            Width::BigInt | Width::SmallInt | Width::TinyInt | Width::VarInt => {
                matches!(base, FieldType::Int)
            }
            Width::Double => matches!(base, FieldType::Float),
            Width::Ascii => matches!(base, FieldType::Text),
            Width::TimeUuid => matches!(base, FieldType::Uuid),
            Width::TimeOfDay => matches!(base, FieldType::Time | FieldType::Int),
        }
    }
}

/// Clustering direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClusteringOrder {
    #[default]
    Asc,
    Desc,
}

impl ClusteringOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            ClusteringOrder::Asc => "ASC",
            ClusteringOrder::Desc => "DESC",
        }
    }
}

/// Similarity function of a vector column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Similarity {
    #[default]
    Cosine,
    DotProduct,
    Euclidean,
}

impl Similarity {
    pub fn option_value(&self) -> &'static str {
        match self {
            Similarity::Cosine => "cosine",
            Similarity::DotProduct => "dot_product",
            Similarity::Euclidean => "euclidean",
        }
    }
}

/// Tagged attribute on a document field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marker {
    PartitionKey { ordinal: u32 },
    ClusteringKey { ordinal: u32, order: ClusteringOrder },
    Index { name: Option<String> },
    Counter,
    Static,
    Frozen,
    Discriminator,
    Width(Width),
    Vector { dimensions: u32, similarity: Similarity },
    /// Excluded from the schema entirely.
    Transient,
}

impl Marker {
    pub fn name(&self) -> &'static str {
        match self {
            Marker::PartitionKey { .. } => "partition_key",
            Marker::ClusteringKey { .. } => "clustering_key",
            Marker::Index { .. } => "index",
            Marker::Counter => "counter",
            Marker::Static => "static",
            Marker::Frozen => "frozen",
            Marker::Discriminator => "discriminator",
            Marker::Width(_) => "width",
            Marker::Vector { .. } => "vector",
            Marker::Transient => "transient",
        }
    }
}

/// Map a declared type plus its markers to a canonical schema type string.
///
/// Pure and deterministic; `field` only feeds error messages.
pub fn map_type(field: &str, declared: &FieldType, markers: &[Marker]) -> TrellisResult<String> {
    let counter = markers.iter().any(|m| matches!(m, Marker::Counter));
    let frozen = markers.iter().any(|m| matches!(m, Marker::Frozen));

    let mut widths = markers.iter().filter_map(|m| match m {
        Marker::Width(w) => Some(*w),
        _ => None,
    });
    let width = widths.next();
    if let Some(extra) = widths.find(|w| Some(*w) != width) {
        return Err(TypeMappingError::InvalidMarker {
            field: field.to_string(),
            marker: format!("{:?}", extra),
            reason: "a field takes at most one width override".to_string(),
        }
        .into());
    }

    let vector = markers.iter().find_map(|m| match m {
        Marker::Vector { dimensions, .. } => Some(*dimensions),
        _ => None,
    });

    let base = declared.unwrap_optional();

    let resolved = if counter {
        "counter".to_string()
    } else if let Some(dimensions) = vector {
        vector_type(field, base, dimensions)?
    } else {
        resolve(field, base, width)?
    };

    Ok(if frozen {
        format!("frozen<{}>", resolved)
    } else {
        resolved
    })
}

fn vector_type(field: &str, base: &FieldType, dimensions: u32) -> TrellisResult<String> {
    let element_is_float = match base {
        FieldType::List(inner) => matches!(inner.unwrap_optional(), FieldType::Float),
        _ => false,
    };
    if !element_is_float || dimensions == 0 {
        return Err(TypeMappingError::InvalidMarker {
            field: field.to_string(),
            marker: "vector".to_string(),
            reason: format!(
                "vector needs a List<Float> field and positive dimensions, got {} with {}",
                base.type_name(),
                dimensions
            ),
        }
        .into());
    }
    Ok(format!("vector<float, {}>", dimensions))
}

fn resolve(field: &str, ty: &FieldType, width: Option<Width>) -> TrellisResult<String> {
    let ty = ty.unwrap_optional();
    match ty {
        FieldType::List(inner) => Ok(format!("list<{}>", resolve(field, inner, width)?)),
        FieldType::Set(inner) => Ok(format!("set<{}>", resolve(field, inner, width)?)),
        // Width overrides reach map values, never keys.
        FieldType::Map(key, value) => Ok(format!(
            "map<{}, {}>",
            resolve(field, key, None)?,
            resolve(field, value, width)?
        )),
        FieldType::Tuple(items) => {
            let parts = items
                .iter()
                .map(|item| resolve(field, item, width))
                .collect::<TrellisResult<Vec<_>>>()?;
            Ok(format!("tuple<{}>", parts.join(", ")))
        }
        FieldType::Custom(name) => Err(TypeMappingError::Unmappable {
            field: field.to_string(),
            type_name: name.clone(),
        }
        .into()),
        FieldType::Optional(_) => unreachable!("unwrap_optional strips every layer"),
        scalar => match width {
            Some(w) if w.accepts(scalar) => Ok(w.schema_type().to_string()),
            Some(w) => Err(TypeMappingError::InvalidMarker {
                field: field.to_string(),
                marker: format!("{:?}", w),
                reason: format!("cannot override {}", scalar.type_name()),
            }
            .into()),
            None => Ok(scalar_type(scalar).to_string()),
        },
    }
}

fn scalar_type(ty: &FieldType) -> &'static str {
    match ty {
        FieldType::Text => "text",
        FieldType::Int => "int",
        FieldType::Float => "float",
        FieldType::Boolean => "boolean",
        FieldType::Blob => "blob",
        FieldType::Uuid => "uuid",
        FieldType::Timestamp => "timestamp",
        FieldType::Date => "date",
        FieldType::Decimal => "decimal",
        FieldType::Inet => "inet",
        FieldType::Time => "time",
        _ => unreachable!("containers and custom types are resolved by the caller"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrellisError;

    fn map(ty: FieldType, markers: &[Marker]) -> String {
        map_type("f", &ty, markers).unwrap()
    }

    #[test]
    fn test_scalars_map_directly() {
        assert_eq!(map(FieldType::Text, &[]), "text");
        assert_eq!(map(FieldType::Int, &[]), "int");
        assert_eq!(map(FieldType::Float, &[]), "float");
        assert_eq!(map(FieldType::Boolean, &[]), "boolean");
        assert_eq!(map(FieldType::Blob, &[]), "blob");
        assert_eq!(map(FieldType::Uuid, &[]), "uuid");
        assert_eq!(map(FieldType::Timestamp, &[]), "timestamp");
        assert_eq!(map(FieldType::Date, &[]), "date");
        assert_eq!(map(FieldType::Decimal, &[]), "decimal");
        assert_eq!(map(FieldType::Inet, &[]), "inet");
        assert_eq!(map(FieldType::Time, &[]), "time");
    }

    #[test]
    fn test_optional_unwraps_before_mapping() {
        assert_eq!(map(FieldType::optional(FieldType::Text), &[]), "text");
        assert_eq!(
            map(FieldType::optional(FieldType::Int), &[Marker::Width(Width::BigInt)]),
            "bigint"
        );
    }

    #[test]
    fn test_containers_recurse() {
        assert_eq!(map(FieldType::list(FieldType::Int), &[]), "list<int>");
        assert_eq!(map(FieldType::set(FieldType::Text), &[]), "set<text>");
        assert_eq!(
            map(FieldType::map(FieldType::Text, FieldType::Float), &[]),
            "map<text, float>"
        );
        assert_eq!(
            map(FieldType::Tuple(vec![FieldType::Int, FieldType::Text]), &[]),
            "tuple<int, text>"
        );
        assert_eq!(
            map(FieldType::list(FieldType::optional(FieldType::Uuid)), &[]),
            "list<uuid>"
        );
    }

    #[test]
    fn test_width_applies_before_container_wrapping() {
        assert_eq!(
            map(FieldType::list(FieldType::Int), &[Marker::Width(Width::BigInt)]),
            "list<bigint>"
        );
        assert_eq!(
            map(
                FieldType::map(FieldType::Text, FieldType::Float),
                &[Marker::Width(Width::Double)]
            ),
            "map<text, double>"
        );
    }

    #[test]
    fn test_counter_forces_counter() {
        assert_eq!(map(FieldType::Int, &[Marker::Counter]), "counter");
        assert_eq!(
            map(FieldType::Int, &[Marker::Width(Width::BigInt), Marker::Counter]),
            "counter"
        );
    }

    #[test]
    fn test_frozen_is_order_independent() {
        let a = map(
            FieldType::Uuid,
            &[Marker::Frozen, Marker::Width(Width::TimeUuid)],
        );
        let b = map(
            FieldType::Uuid,
            &[Marker::Width(Width::TimeUuid), Marker::Frozen],
        );
        assert_eq!(a, "frozen<timeuuid>");
        assert_eq!(a, b);
        assert_eq!(
            map(FieldType::list(FieldType::Text), &[Marker::Frozen]),
            "frozen<list<text>>"
        );
    }

    #[test]
    fn test_vector_marker() {
        let markers = [Marker::Vector {
            dimensions: 3,
            similarity: Similarity::Cosine,
        }];
        assert_eq!(
            map(FieldType::list(FieldType::Float), &markers),
            "vector<float, 3>"
        );
        assert!(map_type("f", &FieldType::Text, &markers).is_err());
    }

    #[test]
    fn test_unmappable_names_type() {
        let err = map_type("owner", &FieldType::Custom("Account".into()), &[]).unwrap_err();
        match err {
            TrellisError::TypeMapping(TypeMappingError::Unmappable { field, type_name }) => {
                assert_eq!(field, "owner");
                assert_eq!(type_name, "Account");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_incompatible_width_rejected() {
        assert!(map_type("f", &FieldType::Text, &[Marker::Width(Width::BigInt)]).is_err());
        assert!(map_type(
            "f",
            &FieldType::Int,
            &[Marker::Width(Width::BigInt), Marker::Width(Width::SmallInt)]
        )
        .is_err());
    }
}
