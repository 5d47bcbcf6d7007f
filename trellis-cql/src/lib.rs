//! TRELLIS CQL - Statement Builder
//!
//! Pure functions from schemas and query descriptions to statement text plus
//! ordered bound parameters. Nothing here executes anything.

pub mod batch;
pub mod ddl;
pub mod dml;
pub mod ident;
pub mod keywords;
pub mod select;
pub mod statement;

pub use batch::{build_batch, BatchMode};
pub use ddl::{
    alter_table_add, create_index, create_keyspace, create_materialized_view, create_schema,
    create_table, drop_index, drop_keyspace, drop_materialized_view, drop_table, index_name,
    truncate, Replication,
};
pub use dml::{
    build_delete, build_insert, build_update, key_predicates, AssignOp, Assignment, Condition,
    DeleteOptions, InsertOptions, UpdateOptions, MAX_TTL,
};
pub use ident::{quote_ident, string_literal, TableRef};
pub use keywords::{parse_keyword, parse_keyword_in, parse_keywords, parse_keywords_in};
pub use select::{build_count, build_select, QuerySpec};
pub use statement::{Statement, StatementKind};
