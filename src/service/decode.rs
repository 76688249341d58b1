//! Native row decoding: every column of a driver row becomes a JSON value.

use super::Row;
use base64::Engine as _;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgRow, PgValueFormat};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

fn float(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn bytes(b: &[u8]) -> Value {
    Value::String(base64::engine::general_purpose::STANDARD.encode(b))
}

pub(crate) fn sqlite_row_to_json(row: &SqliteRow) -> Row {
    let mut map = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        let declared_bool = col.type_info().name() == "BOOLEAN";
        map.insert(col.name().to_string(), sqlite_cell(row, i, declared_bool));
    }
    map
}

/// SQLite reports each value's storage class, so the checks below go by what is
/// stored. Only the declared BOOLEAN type changes how an integer is rendered.
fn sqlite_cell(row: &SqliteRow, i: usize, declared_bool: bool) -> Value {
    match row.try_get_raw(i) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }
    if declared_bool {
        if let Ok(b) = row.try_get::<bool, _>(i) {
            return Value::Bool(b);
        }
    }
    if let Ok(n) = row.try_get::<i64, _>(i) {
        return Value::from(n);
    }
    if let Ok(n) = row.try_get::<f64, _>(i) {
        return float(n);
    }
    if let Ok(s) = row.try_get::<String, _>(i) {
        return Value::String(s);
    }
    if let Ok(b) = row.try_get::<Vec<u8>, _>(i) {
        return bytes(&b);
    }
    Value::Null
}

pub(crate) fn pg_row_to_json(row: &PgRow) -> Row {
    let mut map = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), pg_cell(row, i));
    }
    map
}

fn pg_cell(row: &PgRow, i: usize) -> Value {
    let raw = match row.try_get_raw(i) {
        Ok(raw) if !raw.is_null() => raw,
        _ => return Value::Null,
    };
    if let Ok(n) = row.try_get::<i16, _>(i) {
        return Value::from(n);
    }
    if let Ok(n) = row.try_get::<i32, _>(i) {
        return Value::from(n);
    }
    if let Ok(n) = row.try_get::<i64, _>(i) {
        return Value::from(n);
    }
    if let Ok(n) = row.try_get::<f32, _>(i) {
        return float(f64::from(n));
    }
    if let Ok(n) = row.try_get::<f64, _>(i) {
        return float(n);
    }
    if let Ok(b) = row.try_get::<bool, _>(i) {
        return Value::Bool(b);
    }
    if let Ok(u) = row.try_get::<uuid::Uuid, _>(i) {
        return Value::String(u.to_string());
    }
    if let Ok(dt) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(i) {
        return Value::String(dt.to_rfc3339());
    }
    if let Ok(dt) = row.try_get::<chrono::NaiveDateTime, _>(i) {
        return Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(d) = row.try_get::<chrono::NaiveDate, _>(i) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(t) = row.try_get::<chrono::NaiveTime, _>(i) {
        return Value::String(t.format("%H:%M:%S%.f").to_string());
    }
    if let Ok(s) = row.try_get::<String, _>(i) {
        return Value::String(s);
    }
    if let Ok(v) = row.try_get::<Value, _>(i) {
        return v;
    }
    if let Ok(b) = row.try_get::<Vec<u8>, _>(i) {
        return bytes(&b);
    }
    match raw.format() {
        PgValueFormat::Binary if raw.type_info().name() == "NUMERIC" => raw
            .as_bytes()
            .ok()
            .and_then(numeric_to_string)
            .map(Value::String)
            .unwrap_or(Value::Null),
        PgValueFormat::Text => raw
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        PgValueFormat::Binary => Value::Null,
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render PostgreSQL's binary NUMERIC as a decimal string with its declared scale.
/// Layout: ndigits, weight, sign, dscale, then ndigits base-10000 digits, all 16-bit
/// big-endian.
fn numeric_to_string(buf: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<u16> {
        let b = buf.get(i * 2..i * 2 + 2)?;
        Some(u16::from_be_bytes([b[0], b[1]]))
    };
    let ndigits = word(0)? as i16 as i32;
    let weight = word(1)? as i16 as i32;
    let sign = word(2)?;
    let dscale = word(3)? as usize;
    match sign {
        NUMERIC_NAN => return Some("NaN".into()),
        NUMERIC_PINF => return Some("Infinity".into()),
        NUMERIC_NINF => return Some("-Infinity".into()),
        _ => {}
    }
    if buf.len() < (4 + ndigits.max(0) as usize) * 2 {
        return None;
    }
    let digit = |k: i32| -> u16 {
        if k >= 0 && k < ndigits {
            word(4 + k as usize).unwrap_or(0)
        } else {
            0
        }
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for k in 1..=weight {
            out.push_str(&format!("{:04}", digit(k)));
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut k = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", digit(k)));
            k += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&sign.to_be_bytes());
        buf.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        buf
    }

    #[test]
    fn numeric_keeps_scale_and_sign() {
        assert_eq!(numeric_to_string(&numeric(0, 0, 2, &[123, 4500])).unwrap(), "123.45");
        assert_eq!(numeric_to_string(&numeric(-1, 0, 2, &[500])).unwrap(), "0.05");
        assert_eq!(numeric_to_string(&numeric(1, 0, 0, &[1])).unwrap(), "10000");
        assert_eq!(numeric_to_string(&numeric(0, NUMERIC_NEG, 1, &[1, 5000])).unwrap(), "-1.5");
        assert_eq!(numeric_to_string(&numeric(0, 0, 3, &[])).unwrap(), "0.000");
        assert_eq!(numeric_to_string(&numeric(1, 0, 4, &[12, 3456, 7800])).unwrap(), "123456.7800");
    }

    #[test]
    fn numeric_special_values() {
        assert_eq!(numeric_to_string(&numeric(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert_eq!(numeric_to_string(&numeric(0, NUMERIC_NINF, 0, &[])).unwrap(), "-Infinity");
    }

    #[test]
    fn truncated_numeric_is_rejected() {
        let mut buf = numeric(0, 0, 0, &[1, 2]);
        buf.truncate(buf.len() - 1);
        assert_eq!(numeric_to_string(&buf), None);
        assert_eq!(numeric_to_string(&[0, 1]), None);
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(float(f64::NAN), Value::Null);
        assert_eq!(float(1.5), serde_json::json!(1.5));
    }

    #[test]
    fn blobs_are_base64() {
        assert_eq!(bytes(&[1, 2]), Value::String("AQI=".into()));
    }
}
