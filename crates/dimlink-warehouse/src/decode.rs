//! Result row → JSON conversion
//!
//! Extended-protocol results arrive in binary format and are decoded by type
//! OID. Only the OIDs listed by [`has_binary_decoder`] are read that way; a
//! result containing any other type is fetched over the simple query
//! protocol instead, which returns PostgreSQL's text form for every cell
//! (see [`decode_text_row`]).

use crate::types::oid;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use std::error::Error;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Row, SimpleQueryRow};
use uuid::Uuid;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Raw column bytes, accepted for any type
struct RawValue(Vec<u8>);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Self(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Whether values of this type can be decoded from binary format
pub fn has_binary_decoder(type_oid: u32) -> bool {
    matches!(
        type_oid,
        oid::BOOL
            | oid::INT2
            | oid::INT4
            | oid::INT8
            | oid::OID
            | oid::FLOAT4
            | oid::FLOAT8
            | oid::NUMERIC
            | oid::MONEY
            | oid::DATE
            | oid::TIME
            | oid::TIMETZ
            | oid::TIMESTAMP
            | oid::TIMESTAMPTZ
            | oid::INTERVAL
            | oid::JSON
            | oid::JSONB
            | oid::UUID
            | oid::BYTEA
            | oid::TEXT
            | oid::VARCHAR
            | oid::BPCHAR
            | oid::NAME
            | oid::UNKNOWN
            | oid::TEXT_ARRAY
            | oid::VARCHAR_ARRAY
    )
}

/// Convert a binary-format result row into a JSON object keyed by column name
pub fn decode_row(row: &Row) -> Result<Map<String, Value>, tokio_postgres::Error> {
    let mut object = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, idx, column.type_())?;
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}

/// Convert a text-format row, given the type OID of each column
pub fn decode_text_row(
    row: &SimpleQueryRow,
    type_oids: &[u32],
) -> Result<Map<String, Value>, tokio_postgres::Error> {
    let mut object = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let type_oid = type_oids.get(idx).copied().unwrap_or(oid::TEXT);
        let value = row
            .try_get(idx)?
            .map(|text| text_value(type_oid, text))
            .unwrap_or(Value::Null);
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}

fn decode_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match ty.oid() {
        oid::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        oid::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        oid::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        oid::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
        oid::OID => row.try_get::<_, Option<u32>>(idx)?.map(Value::from),
        oid::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .and_then(|v| float_value(f64::from(v))),
        oid::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.and_then(float_value),
        oid::JSON | oid::JSONB => row.try_get::<_, Option<Value>>(idx)?,
        oid::UUID => row
            .try_get::<_, Option<Uuid>>(idx)?
            .map(|u| Value::String(u.to_string())),
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::UNKNOWN => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::String)
        }
        oid::TEXT_ARRAY | oid::VARCHAR_ARRAY => row
            .try_get::<_, Option<Vec<Option<String>>>>(idx)?
            .map(|items| {
                Value::Array(
                    items
                        .into_iter()
                        .map(|item| item.map(Value::String).unwrap_or(Value::Null))
                        .collect(),
                )
            }),
        type_oid => row
            .try_get::<_, Option<RawValue>>(idx)?
            .map(|raw| Value::String(raw_text(type_oid, &raw.0))),
    };

    Ok(value.unwrap_or(Value::Null))
}

fn float_value(v: f64) -> Option<Value> {
    Number::from_f64(v).map(Value::Number)
}

/// Text form of a binary value decoded from its wire bytes
///
/// Anything without a decoder, or with malformed bytes, is rendered the way
/// PostgreSQL prints `bytea`: `\x` followed by hex.
fn raw_text(type_oid: u32, raw: &[u8]) -> String {
    let decoded = match type_oid {
        oid::NUMERIC => numeric_text(raw),
        oid::MONEY => money_text(raw),
        oid::DATE => date_text(raw),
        oid::TIME => time_text(raw),
        oid::TIMETZ => timetz_text(raw),
        oid::TIMESTAMP => timestamp_text(raw, false),
        oid::TIMESTAMPTZ => timestamp_text(raw, true),
        oid::INTERVAL => interval_text(raw),
        _ => None,
    };

    decoded.unwrap_or_else(|| format!("\\x{}", hex::encode(raw)))
}

/// Value of a text-format cell
///
/// Numbers, booleans and JSON keep their JSON types; `timestamptz` is
/// normalized to RFC 3339 in UTC to match the binary path. Everything else,
/// including arrays, network and geometric types, is the server's text.
pub(crate) fn text_value(type_oid: u32, text: &str) -> Value {
    let as_string = || Value::String(text.to_string());

    match type_oid {
        oid::BOOL => match text {
            "t" => Value::Bool(true),
            "f" => Value::Bool(false),
            _ => as_string(),
        },
        oid::INT2 | oid::INT4 | oid::INT8 | oid::OID => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| as_string()),
        oid::FLOAT4 | oid::FLOAT8 => match text.parse::<f64>() {
            Ok(v) => float_value(v).unwrap_or(Value::Null),
            Err(_) => as_string(),
        },
        oid::JSON | oid::JSONB => serde_json::from_str(text).unwrap_or_else(|_| as_string()),
        oid::TIMESTAMPTZ => DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .map(|ts| Value::String(ts.with_timezone(&Utc).to_rfc3339()))
            .unwrap_or_else(|_| as_string()),
        _ => as_string(),
    }
}

/// `numeric`: int16 ndigits, int16 weight, uint16 sign, uint16 dscale,
/// then ndigits base-10000 digits
pub(crate) fn numeric_text(raw: &[u8]) -> Option<String> {
    if raw.len() < 8 {
        return None;
    }
    let ndigits = usize::try_from(i16::from_be_bytes([raw[0], raw[1]])).ok()?;
    let weight = i32::from(i16::from_be_bytes([raw[2], raw[3]]));
    let sign = u16::from_be_bytes([raw[4], raw[5]]);
    let dscale = usize::from(u16::from_be_bytes([raw[6], raw[7]]));

    match sign {
        NUMERIC_NAN => return Some("NaN".to_string()),
        NUMERIC_PINF => return Some("Infinity".to_string()),
        NUMERIC_NINF => return Some("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        _ => return None,
    }
    if raw.len() != 8 + ndigits * 2 {
        return None;
    }

    let digits: Vec<i16> = raw[8..]
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let digit = |idx: i32| {
        usize::try_from(idx)
            .ok()
            .and_then(|i| digits.get(i))
            .copied()
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for idx in 1..=weight {
            text.push_str(&format!("{:04}", digit(idx)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(idx)));
            idx += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Some(text)
}

/// `money`: int64 in the smallest currency unit (two fraction digits)
pub(crate) fn money_text(raw: &[u8]) -> Option<String> {
    let cents = i64::from_be_bytes(raw.try_into().ok()?);
    Some(Decimal::new(cents, 2).to_string())
}

/// 2000-01-01 00:00:00, the origin of PostgreSQL date and timestamp values
fn pg_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2000, 1, 1)?.and_hms_opt(0, 0, 0)
}

/// `date`: int32 days since 2000-01-01; the extremes mean ±infinity
pub(crate) fn date_text(raw: &[u8]) -> Option<String> {
    let days = i32::from_be_bytes(raw.try_into().ok()?);
    match days {
        i32::MAX => Some("infinity".to_string()),
        i32::MIN => Some("-infinity".to_string()),
        _ => {
            let date = pg_epoch()?
                .date()
                .checked_add_signed(Duration::days(i64::from(days)))?;
            Some(date.format("%Y-%m-%d").to_string())
        }
    }
}

/// `timestamp` / `timestamptz`: int64 microseconds since 2000-01-01 (UTC for
/// `timestamptz`); the extremes mean ±infinity
pub(crate) fn timestamp_text(raw: &[u8], with_zone: bool) -> Option<String> {
    let micros = i64::from_be_bytes(raw.try_into().ok()?);
    match micros {
        i64::MAX => Some("infinity".to_string()),
        i64::MIN => Some("-infinity".to_string()),
        _ => {
            let ts = pg_epoch()?.checked_add_signed(Duration::microseconds(micros))?;
            if with_zone {
                Some(DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc).to_rfc3339())
            } else {
                Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
        }
    }
}

/// Microseconds since midnight as `HH:MM:SS[.f]`; `24:00:00` is valid
fn clock_text(micros: i64) -> Option<String> {
    if micros == MICROS_PER_DAY {
        return Some("24:00:00".to_string());
    }
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)?;
    Some(time.format("%H:%M:%S%.f").to_string())
}

/// `time`: int64 microseconds since midnight
pub(crate) fn time_text(raw: &[u8]) -> Option<String> {
    clock_text(i64::from_be_bytes(raw.try_into().ok()?))
}

/// `timetz`: int64 microseconds since midnight, int32 zone seconds west of UTC
pub(crate) fn timetz_text(raw: &[u8]) -> Option<String> {
    if raw.len() != 12 {
        return None;
    }
    let (time_bytes, zone_bytes) = raw.split_at(8);
    let clock = clock_text(i64::from_be_bytes(time_bytes.try_into().ok()?))?;
    let zone_west = i32::from_be_bytes(zone_bytes.try_into().ok()?);

    let offset = -zone_west;
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();
    Some(format!(
        "{}{}{:02}:{:02}",
        clock,
        sign,
        offset / 3600,
        (offset % 3600) / 60
    ))
}

/// `interval`: int64 microseconds, int32 days, int32 months
pub(crate) fn interval_text(raw: &[u8]) -> Option<String> {
    if raw.len() != 16 {
        return None;
    }
    let micros = i64::from_be_bytes(raw[0..8].try_into().ok()?);
    let days = i32::from_be_bytes(raw[8..12].try_into().ok()?);
    let months = i32::from_be_bytes(raw[12..16].try_into().ok()?);

    let mut parts = Vec::new();
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        parts.push(plural(years, "year"));
    }
    if months != 0 {
        parts.push(plural(months, "mon"));
    }
    if days != 0 {
        parts.push(plural(days, "day"));
    }
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let (secs, frac) = (total / 1_000_000, total % 1_000_000);
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        );
        if frac != 0 {
            let digits = format!("{:06}", frac);
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    Some(parts.join(" "))
}

fn plural(n: i32, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
