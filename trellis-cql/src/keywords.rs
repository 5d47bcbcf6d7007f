//! Keyword-argument filters.
//!
//! `rating__gte = 3` becomes `rating >= ?`; a name with no `__` suffix is
//! plain equality. Against a schema, a keyword whose tail is not an operator
//! but which names a declared column (`a__b`) is equality on that column.

use trellis_core::{
    DocumentSchema, Operator, Predicate, QueryError, TrellisError, TrellisResult, Value,
};

const SEPARATOR: &str = "__";

/// Parse one keyword into a predicate.
pub fn parse_keyword(keyword: &str, value: impl Into<Value>) -> TrellisResult<Predicate> {
    let (column, operator) = match keyword.rsplit_once(SEPARATOR) {
        Some((column, suffix)) if !column.is_empty() => {
            let operator =
                Operator::from_suffix(suffix).ok_or_else(|| QueryError::UnknownOperator {
                    keyword: keyword.to_string(),
                    suffix: suffix.to_string(),
                })?;
            (column, operator)
        }
        _ => (keyword, Operator::Eq),
    };
    Ok(Predicate::new(column, operator, value))
}

/// Parse one keyword, resolving unknown suffixes against `schema` columns.
pub fn parse_keyword_in(
    schema: &DocumentSchema,
    keyword: &str,
    value: impl Into<Value>,
) -> TrellisResult<Predicate> {
    let value = value.into();
    match parse_keyword(keyword, value.clone()) {
        Err(TrellisError::Query(QueryError::UnknownOperator { .. }))
            if schema.column(keyword).is_some() =>
        {
            Ok(Predicate::eq(keyword, value))
        }
        parsed => parsed,
    }
}

/// Parse keywords against `schema`, in the order given.
pub fn parse_keywords_in<I, K, V>(schema: &DocumentSchema, keywords: I) -> TrellisResult<Vec<Predicate>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
{
    keywords
        .into_iter()
        .map(|(keyword, value)| parse_keyword_in(schema, keyword.as_ref(), value))
        .collect()
}

/// Parse keywords in the order given.
pub fn parse_keywords<I, K, V>(keywords: I) -> TrellisResult<Vec<Predicate>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
{
    keywords
        .into_iter()
        .map(|(keyword, value)| parse_keyword(keyword.as_ref(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{build_schema, DocumentDescriptor, FieldDescriptor, FieldType};

    #[test]
    fn test_plain_name_is_equality() {
        let p = parse_keyword("product_id", "p1").unwrap();
        assert_eq!(p, Predicate::eq("product_id", "p1"));
    }

    #[test]
    fn test_every_suffix() {
        let cases = [
            ("rating__gt", Operator::Gt),
            ("rating__gte", Operator::Gte),
            ("rating__lt", Operator::Lt),
            ("rating__lte", Operator::Lte),
            ("rating__in", Operator::In),
            ("rating__eq", Operator::Eq),
            ("tags__contains", Operator::Contains),
            ("attrs__contains_key", Operator::ContainsKey),
        ];
        for (keyword, operator) in cases {
            let p = parse_keyword(keyword, 1).unwrap();
            assert_eq!(p.operator, operator, "{keyword}");
            assert!(!p.column.contains("__"));
        }
    }

    #[test]
    fn test_unknown_suffix_is_rejected() {
        assert!(matches!(
            parse_keyword("rating__near", 1),
            Err(TrellisError::Query(QueryError::UnknownOperator { ref suffix, .. })) if suffix == "near"
        ));
    }

    #[test]
    fn test_inner_double_underscore_keeps_column() {
        let p = parse_keyword("a__b__gte", 1).unwrap();
        assert_eq!(p.column, "a__b");
        assert_eq!(p.operator, Operator::Gte);
    }

    #[test]
    fn test_declared_column_with_inner_separator_is_equality() {
        let schema = build_schema(
            &DocumentDescriptor::new("Metric")
                .table("metrics")
                .field(FieldDescriptor::new("id", FieldType::Text).partition_key(0))
                .field(FieldDescriptor::new("cpu__p99", FieldType::Int)),
        )
        .unwrap();

        let p = parse_keyword_in(&schema, "cpu__p99", 95).unwrap();
        assert_eq!(p, Predicate::eq("cpu__p99", 95));

        let p = parse_keyword_in(&schema, "cpu__p99__gte", 90).unwrap();
        assert_eq!(p.column, "cpu__p99");
        assert_eq!(p.operator, Operator::Gte);

        assert!(matches!(
            parse_keyword_in(&schema, "id__near", "x"),
            Err(TrellisError::Query(QueryError::UnknownOperator { .. }))
        ));

        let predicates =
            parse_keywords_in(&schema, [("id", Value::from("a")), ("cpu__p99", Value::Int(99))])
                .unwrap();
        assert_eq!(predicates[1], Predicate::eq("cpu__p99", 99));
    }

    #[test]
    fn test_parse_keywords_preserves_order() {
        let predicates =
            parse_keywords([("product_id", Value::from("p1")), ("rating__gte", Value::Int(3))])
                .unwrap();
        assert_eq!(predicates[0].column, "product_id");
        assert_eq!(predicates[1].operator, Operator::Gte);
    }
}
