//! Row projection and driver error formatting

use base64::{engine::general_purpose::STANDARD as base64_engine, Engine as _};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use querybox_models::RowMap;
use serde_json::Value;
use sqlx::postgres::types::{PgHasArrayType, PgInterval, PgTimeTz};
use sqlx::postgres::{PgRow, PgTypeKind, PgValueFormat};
use sqlx::types::BigDecimal;
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo, ValueRef};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use tracing::warn;

/// Convert a PostgreSQL row into a JSON map keeping column order
pub(crate) fn row_to_map(row: &PgRow) -> RowMap {
    let mut map = RowMap::with_capacity(row.len());

    for (i, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        map.insert(column.name().to_string(), convert_column_value(row, i, type_name));
    }

    map
}

/// Convert PostgreSQL column value to JSON
fn convert_column_value(row: &PgRow, i: usize, type_name: &str) -> Value {
    match type_name {
        "INT2" => row
            .try_get::<i16, _>(i)
            .ok()
            .map(|v| Value::Number(i64::from(v).into()))
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<i32, _>(i)
            .ok()
            .map(|v| Value::Number(i64::from(v).into()))
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<i64, _>(i)
            .ok()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<f32, _>(i)
            .ok()
            .and_then(|v| serde_json::Number::from_f64(f64::from(v)).map(Value::Number))
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<f64, _>(i)
            .ok()
            .and_then(|v| serde_json::Number::from_f64(v).map(Value::Number))
            .unwrap_or(Value::Null),
        "NUMERIC" => row
            .try_get::<BigDecimal, _>(i)
            .ok()
            .map(|v| numeric_to_json(&v))
            .unwrap_or(Value::Null),
        "BOOL" => row
            .try_get::<bool, _>(i)
            .ok()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
            .try_get::<String, _>(i)
            .ok()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(i)
            .ok()
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(i)
            .ok()
            .map(|v| Value::String(v.to_rfc3339()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<NaiveDate, _>(i)
            .ok()
            .map(|v| Value::String(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        "TIME" => row
            .try_get::<NaiveTime, _>(i)
            .ok()
            .map(|v| Value::String(v.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),
        "TIMETZ" => row
            .try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(i)
            .ok()
            .map(|v| Value::String(format!("{}{}", v.time.format("%H:%M:%S%.f"), v.offset)))
            .unwrap_or(Value::Null),
        "INTERVAL" => row
            .try_get::<PgInterval, _>(i)
            .ok()
            .map(|v| Value::String(interval_to_text(&v)))
            .unwrap_or(Value::Null),
        "INET" | "CIDR" => inet_value(row, i, type_name),
        "JSON" | "JSONB" => row.try_get::<Value, _>(i).ok().unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(i)
            .ok()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(i)
            .ok()
            .map(|v| Value::String(base64_engine.encode(&v)))
            .unwrap_or(Value::Null),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            array_value::<String, _>(row, i, Value::String)
        }
        "INT2[]" => array_value::<i16, _>(row, i, |n| Value::Number(i64::from(n).into())),
        "INT4[]" => array_value::<i32, _>(row, i, |n| Value::Number(i64::from(n).into())),
        "INT8[]" => array_value::<i64, _>(row, i, |n| Value::Number(n.into())),
        "FLOAT4[]" => array_value::<f32, _>(row, i, |n| float_value(f64::from(n))),
        "FLOAT8[]" => array_value::<f64, _>(row, i, float_value),
        "NUMERIC[]" => array_value::<BigDecimal, _>(row, i, |n| numeric_to_json(&n)),
        "BOOL[]" => array_value::<bool, _>(row, i, Value::Bool),
        "UUID[]" => array_value::<uuid::Uuid, _>(row, i, |v| Value::String(v.to_string())),
        "DATE[]" => array_value::<NaiveDate, _>(row, i, |v| {
            Value::String(v.format("%Y-%m-%d").to_string())
        }),
        "TIMESTAMPTZ[]" => array_value::<DateTime<Utc>, _>(row, i, |v| Value::String(v.to_rfc3339())),
        "JSON[]" | "JSONB[]" => array_value::<Value, _>(row, i, |v| v),
        _ => fallback_value(row, i, type_name),
    }
}

/// Array column as a JSON array; NULL elements stay null
fn array_value<T, F>(row: &PgRow, i: usize, to_json: F) -> Value
where
    T: for<'a> Decode<'a, Postgres> + Type<Postgres> + PgHasArrayType,
    F: Fn(T) -> Value,
{
    row.try_get::<Vec<Option<T>>, _>(i)
        .ok()
        .map(|items| {
            Value::Array(
                items
                    .into_iter()
                    .map(|item| item.map(&to_json).unwrap_or(Value::Null))
                    .collect(),
            )
        })
        .unwrap_or(Value::Null)
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Types without a dedicated arm.
///
/// Enums and other text-like values come back as their label. Anything
/// else is rendered as a marker string so the column is never silently
/// blanked.
fn fallback_value(row: &PgRow, i: usize, type_name: &str) -> Value {
    let raw = match row.try_get_raw(i) {
        Ok(raw) => raw,
        Err(_) => return Value::Null,
    };
    if raw.is_null() {
        return Value::Null;
    }

    let is_enum = matches!(raw.type_info().kind(), PgTypeKind::Enum(_));
    if is_enum || raw.format() == PgValueFormat::Text {
        if let Ok(label) = raw.as_str() {
            return Value::String(label.to_string());
        }
    }

    if let Ok(v) = row.try_get::<String, _>(i) {
        return Value::String(v);
    }

    warn!("Unhandled PostgreSQL type '{}', returning a placeholder", type_name);
    Value::String(format!("<unsupported type {}>", type_name))
}

/// INET and CIDR from their binary wire form: family, prefix bits, is_cidr,
/// address length, then the address bytes
fn inet_value(row: &PgRow, i: usize, type_name: &str) -> Value {
    let raw = match row.try_get_raw(i) {
        Ok(raw) if !raw.is_null() => raw,
        _ => return Value::Null,
    };
    if raw.format() == PgValueFormat::Text {
        return raw
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null);
    }

    let bytes = match raw.as_bytes() {
        Ok(bytes) => bytes,
        Err(_) => return Value::Null,
    };
    match parse_inet(bytes) {
        Some(text) => Value::String(text),
        None => {
            warn!("Malformed {} value, returning a placeholder", type_name);
            Value::String(format!("<unsupported type {}>", type_name))
        }
    }
}

fn parse_inet(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 4 {
        return None;
    }
    let (header, address) = bytes.split_at(4);
    let (bits, is_cidr, len) = (header[1], header[2], header[3]);
    if address.len() != usize::from(len) {
        return None;
    }
    let (addr, full_bits) = match address.len() {
        4 => {
            let octets: [u8; 4] = address.try_into().ok()?;
            (IpAddr::V4(Ipv4Addr::from(octets)), 32)
        }
        16 => {
            let octets: [u8; 16] = address.try_into().ok()?;
            (IpAddr::V6(Ipv6Addr::from(octets)), 128)
        }
        _ => return None,
    };
    // Host addresses print without a prefix, as PostgreSQL does
    if is_cidr == 0 && bits == full_bits {
        Some(addr.to_string())
    } else {
        Some(format!("{}/{}", addr, bits))
    }
}

/// INTERVAL in PostgreSQL's default output style, e.g. `1 year 2 mons 3 days 04:05:06`
fn interval_to_text(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    let years = interval.months / 12;
    let months = interval.months % 12;
    let plural = |n: i32, unit: &str, units: &str| {
        format!("{} {}", n, if n.abs() == 1 { unit } else { units })
    };
    if years != 0 {
        parts.push(plural(years, "year", "years"));
    }
    if months != 0 {
        parts.push(plural(months, "mon", "mons"));
    }
    if interval.days != 0 {
        parts.push(plural(interval.days, "day", "days"));
    }

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let frac = total % 1_000_000;
        let mut clock = format!("{}{:02}:{:02}:{:02}", sign, secs / 3600, (secs / 60) % 60, secs % 60);
        if frac != 0 {
            let digits = format!("{:06}", frac);
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

/// NUMERIC as a JSON number when it round-trips through f64, otherwise as
/// its exact decimal text.
fn numeric_to_json(value: &BigDecimal) -> Value {
    let text = value.to_string();
    let round_trips = |f: f64| {
        f.is_finite()
            && BigDecimal::from_str(&f.to_string())
                .map(|b| &b == value)
                .unwrap_or(false)
    };
    match text.parse::<f64>() {
        Ok(f) if round_trips(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}

/// Caller-facing text for a driver error.
///
/// Database errors carry the server's own message; anything else is the
/// driver's description.
pub(crate) fn describe_sqlx_error(err: &sqlx::Error) -> String {
    match err.as_database_error() {
        Some(db_err) => match db_err.code() {
            Some(code) => format!("{} (SQLSTATE {})", db_err.message(), code),
            None => db_err.message().to_string(),
        },
        None => err.to_string(),
    }
}

/// Whether the connection is still usable after `err`.
///
/// A server-side error leaves the connection healthy (the transaction is
/// merely aborted); I/O, protocol and TLS failures do not.
pub(crate) fn connection_survives(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(_)
            | sqlx::Error::RowNotFound
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_that_fits_f64_is_a_number() {
        let value = BigDecimal::from_str("1200.5").unwrap();
        assert_eq!(numeric_to_json(&value), serde_json::json!(1200.5));
    }

    #[test]
    fn test_scaled_numeric_is_a_number() {
        let value = BigDecimal::from_str("0.10").unwrap();
        assert_eq!(numeric_to_json(&value), serde_json::json!(0.1));
    }

    #[test]
    fn test_wide_numeric_stays_exact() {
        let value = BigDecimal::from_str("12345678901234567890.123456789").unwrap();
        assert_eq!(
            numeric_to_json(&value),
            Value::String("12345678901234567890.123456789".to_string())
        );
    }

    #[test]
    fn test_interval_text() {
        let interval = PgInterval {
            months: 14,
            days: 3,
            microseconds: 4 * 3_600_000_000 + 5 * 60_000_000 + 6_500_000,
        };
        assert_eq!(interval_to_text(&interval), "1 year 2 mons 3 days 04:05:06.5");

        let day = PgInterval {
            months: 0,
            days: 1,
            microseconds: 0,
        };
        assert_eq!(interval_to_text(&day), "1 day");

        let zero = PgInterval {
            months: 0,
            days: 0,
            microseconds: 0,
        };
        assert_eq!(interval_to_text(&zero), "00:00:00");
    }

    #[test]
    fn test_inet_wire_form() {
        assert_eq!(parse_inet(&[2, 32, 0, 4, 10, 0, 0, 1]).as_deref(), Some("10.0.0.1"));
        assert_eq!(parse_inet(&[2, 8, 1, 4, 10, 0, 0, 0]).as_deref(), Some("10.0.0.0/8"));

        let mut v6 = vec![3, 128, 0, 16];
        v6.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        assert_eq!(parse_inet(&v6).as_deref(), Some("::1"));

        assert_eq!(parse_inet(&[2, 32, 0, 4, 10]), None);
    }

    #[test]
    fn test_non_database_error_text() {
        let err = sqlx::Error::PoolTimedOut;
        assert!(!describe_sqlx_error(&err).is_empty());
        assert!(!connection_survives(&err));
    }

    #[test]
    fn test_protocol_error_breaks_connection() {
        let err = sqlx::Error::Protocol("unexpected message".to_string());
        assert!(!connection_survives(&err));
    }
}
