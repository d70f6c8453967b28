//! Warehouse type → dimension type mapping
//!
//! Two entry points: by type name (as reported by
//! `information_schema.columns.data_type`, `pg_type.typname` or a column
//! definition) and by built-in PostgreSQL type OID (as reported in query
//! result metadata). Both are total: anything unrecognized is a `String`.

use dimlink_core::DimensionType;

/// Built-in PostgreSQL type OIDs (`pg_type.oid`)
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const BYTEA: u32 = 17;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const OID: u32 = 26;
    pub const JSON: u32 = 114;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const UNKNOWN: u32 = 705;
    pub const MONEY: u32 = 790;
    pub const BPCHAR: u32 = 1042;
    pub const VARCHAR: u32 = 1043;
    pub const DATE: u32 = 1082;
    pub const TIME: u32 = 1083;
    pub const TIMESTAMP: u32 = 1114;
    pub const TIMESTAMPTZ: u32 = 1184;
    pub const INTERVAL: u32 = 1186;
    pub const TIMETZ: u32 = 1266;
    pub const NUMERIC: u32 = 1700;
    pub const UUID: u32 = 2950;
    pub const JSONB: u32 = 3802;
    pub const NAME: u32 = 19;
    pub const TEXT_ARRAY: u32 = 1009;
    pub const VARCHAR_ARRAY: u32 = 1015;
}

/// Map a warehouse type name to a dimension type
///
/// Parameter lists are ignored (`numeric(10,2)`, `character varying(256)`),
/// as is case and surrounding whitespace.
///
/// # Supported Types
///
/// - **Number**: `smallint`, `integer`, `bigint`, the `serial` family,
///   `real`, `double precision`, `float*`, `numeric`, `decimal`, `money`, `oid`
/// - **Boolean**: `boolean`, `bool`
/// - **Date**: `date`
/// - **Timestamp**: `time`, `timetz`, `timestamp`, `timestamptz` and their
///   spelled-out `with/without time zone` forms
/// - everything else is **String**
pub fn dimension_type_for_name(type_name: &str) -> DimensionType {
    let base_type = type_name
        .split('(')
        .next()
        .unwrap_or(type_name)
        .trim()
        .to_lowercase();

    match base_type.as_str() {
        // Integer types
        "smallint" | "int2" => DimensionType::Number,
        "integer" | "int" | "int4" => DimensionType::Number,
        "bigint" | "int8" => DimensionType::Number,
        "smallserial" | "serial2" => DimensionType::Number,
        "serial" | "serial4" => DimensionType::Number,
        "bigserial" | "serial8" => DimensionType::Number,
        "oid" => DimensionType::Number,

        // Floating point types
        "real" | "float4" => DimensionType::Number,
        "double precision" | "float8" | "float" => DimensionType::Number,

        // Fixed point
        "numeric" | "decimal" | "money" => DimensionType::Number,

        // Boolean types
        "boolean" | "bool" => DimensionType::Boolean,

        // Date/Time types
        "date" => DimensionType::Date,
        "timestamp" | "timestamp without time zone" => DimensionType::Timestamp,
        "timestamptz" | "timestamp with time zone" => DimensionType::Timestamp,
        "time" | "time without time zone" => DimensionType::Timestamp,
        "timetz" | "time with time zone" => DimensionType::Timestamp,

        _ => DimensionType::String,
    }
}

/// Map a built-in PostgreSQL type OID to a dimension type
pub fn dimension_type_for_oid(type_oid: u32) -> DimensionType {
    match type_oid {
        oid::INT2 | oid::INT4 | oid::INT8 | oid::OID => DimensionType::Number,
        oid::FLOAT4 | oid::FLOAT8 | oid::NUMERIC | oid::MONEY => DimensionType::Number,
        oid::BOOL => DimensionType::Boolean,
        oid::DATE => DimensionType::Date,
        oid::TIME | oid::TIMETZ | oid::TIMESTAMP | oid::TIMESTAMPTZ => DimensionType::Timestamp,
        _ => DimensionType::String,
    }
}
