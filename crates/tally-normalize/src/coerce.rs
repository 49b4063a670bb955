//! Safe coercion of loosely-typed JSON fields.
//!
//! Upstream providers disagree on whether amounts are numbers or strings,
//! cents or major units, and whether timestamps are epoch seconds or text.
//! Every helper here is total: malformed input becomes an explicit
//! `Invalid` / `Unparseable` outcome rather than an error or a silent zero.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tally_core::event::{DEFAULT_CURRENCY, Numeric};

/// Largest magnitude an `f64` represents every integer up to (2^53).
const MAX_EXACT_F64: f64 = 9_007_199_254_740_992.0;

/// Epoch values above this are taken to be milliseconds (year 5138 in secs).
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

// ─── Lookup ──────────────────────────────────────────────────────────────────

/// Follow `keys` through nested objects. `null` counts as absent.
pub fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
  let mut current = value;
  for key in keys {
    current = current.as_object()?.get(*key)?;
  }
  (!current.is_null()).then_some(current)
}

/// [`path`] starting from an object rather than a value.
pub fn path_in<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
  let (first, rest) = keys.split_first()?;
  path(field(obj, first)?, rest)
}

/// A top-level field of an object. `null` counts as absent.
pub fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
  obj.get(key).filter(|v| !v.is_null())
}

/// Whether an object carries a non-null `key`.
pub fn has(obj: &Map<String, Value>, key: &str) -> bool { field(obj, key).is_some() }

// ─── Numbers ─────────────────────────────────────────────────────────────────

/// A decimal read from a number or a numeric string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decimal {
  Missing,
  Value(f64),
  Invalid,
}

pub fn decimal(value: Option<&Value>) -> Decimal {
  let read = match value {
    None | Some(Value::Null) => Decimal::Missing,
    Some(Value::Number(n)) => n.as_f64().map_or(Decimal::Invalid, Decimal::Value),
    Some(Value::String(s)) => {
      let s = s.trim();
      if s.is_empty() {
        Decimal::Missing
      } else {
        s.parse::<f64>().map_or(Decimal::Invalid, Decimal::Value)
      }
    }
    Some(_) => Decimal::Invalid,
  };
  read.finite()
}

impl Decimal {
  fn finite(self) -> Self {
    match self {
      Self::Value(x) if !x.is_finite() => Self::Invalid,
      other => other,
    }
  }

  fn map_cents(self, f: impl FnOnce(f64) -> f64) -> Numeric {
    match self {
      Self::Missing => Numeric::Missing,
      Self::Invalid => Numeric::Invalid,
      Self::Value(x) => exact_round(f(x)),
    }
  }
}

/// Round to the nearest integer, refusing magnitudes an `f64` cannot hold
/// exactly.
fn exact_round(x: f64) -> Numeric {
  let rounded = x.round();
  if rounded.is_finite() && rounded.abs() <= MAX_EXACT_F64 {
    Numeric::Int(rounded as i64)
  } else {
    Numeric::Invalid
  }
}

/// An integer read literally, with no unit-scale inference. Integral floats
/// (`9900.0`) and integer strings are accepted; fractions are invalid.
pub fn integer(value: Option<&Value>) -> Numeric {
  if let Some(Value::Number(n)) = value
    && let Some(i) = n.as_i64()
  {
    return Numeric::Int(i);
  }
  if let Some(Value::String(s)) = value
    && let Ok(i) = s.trim().parse::<i64>()
  {
    return Numeric::Int(i);
  }
  match decimal(value) {
    Decimal::Missing => Numeric::Missing,
    Decimal::Value(x) if x.fract() == 0.0 => exact_round(x),
    Decimal::Value(_) | Decimal::Invalid => Numeric::Invalid,
  }
}

/// A major-unit decimal (`"49.99"`) converted to cents: `round(x × 100)`.
pub fn major_units_to_cents(value: Option<&Value>) -> Numeric {
  decimal(value).map_cents(|x| x * 100.0)
}

/// Amounts below this are read as major units; at or above it, as cents.
pub const MAJOR_UNIT_THRESHOLD: f64 = 1000.0;

/// Threshold-based unit inference: a value below [`MAJOR_UNIT_THRESHOLD`] is
/// taken as major units and scaled by 100, anything else is taken as cents.
///
/// Ambiguous near the threshold (`999` dollars reads as 99 900 cents while
/// `1000` reads as ten dollars); kept as observed from the upstream contract.
pub fn inferred_cents(value: Option<&Value>) -> Numeric {
  decimal(value).map_cents(|x| {
    if x < MAJOR_UNIT_THRESHOLD {
      x * 100.0
    } else {
      x
    }
  })
}

// ─── Time ────────────────────────────────────────────────────────────────────

/// A timestamp read from a loosely-typed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
  Absent,
  Parsed(DateTime<Utc>),
  Unparseable,
}

impl Stamp {
  /// Absent timestamps default to `arrival`; unparseable ones resolve to
  /// `None` and are left to the validator.
  pub fn resolve(self, arrival: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match self {
      Self::Absent => Some(arrival),
      Self::Parsed(at) => Some(at),
      Self::Unparseable => None,
    }
  }

  /// `self` unless absent, else `other`.
  pub fn or(self, other: Stamp) -> Stamp {
    match self {
      Self::Absent => other,
      found => found,
    }
  }
}

/// Parse epoch seconds (or milliseconds), RFC 3339, naive `YYYY-MM-DD
/// HH:MM:SS` (taken as UTC), or a bare date.
pub fn timestamp(value: Option<&Value>) -> Stamp {
  match value {
    None | Some(Value::Null) => Stamp::Absent,
    Some(Value::Number(n)) => n.as_f64().map_or(Stamp::Unparseable, epoch),
    Some(Value::String(s)) => {
      let s = s.trim();
      if s.is_empty() {
        return Stamp::Absent;
      }
      if let Ok(x) = s.parse::<f64>() {
        return epoch(x);
      }
      parse_text(s).map_or(Stamp::Unparseable, Stamp::Parsed)
    }
    Some(_) => Stamp::Unparseable,
  }
}

fn epoch(x: f64) -> Stamp {
  if !x.is_finite() || x.abs() > MAX_EXACT_F64 {
    return Stamp::Unparseable;
  }
  let millis = if x.abs() > EPOCH_MILLIS_THRESHOLD { x } else { x * 1000.0 };
  DateTime::from_timestamp_millis(millis.round() as i64)
    .map_or(Stamp::Unparseable, Stamp::Parsed)
}

fn parse_text(s: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  for fmt in [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
  ] {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

// ─── Text ────────────────────────────────────────────────────────────────────

/// An opaque reference: trimmed strings (empty is absent) or stringified
/// numbers.
pub fn string(value: Option<&Value>) -> Option<String> {
  match value? {
    Value::String(s) => {
      let s = s.trim();
      (!s.is_empty()).then(|| s.to_owned())
    }
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// A three-letter ISO 4217 style code, trimmed and uppercased. Anything
/// else is treated as absent.
pub fn currency_code(value: Option<&Value>) -> Option<String> {
  string(value)
    .filter(|s| s.len() == 3 && s.bytes().all(|b| b.is_ascii_alphabetic()))
    .map(|s| s.to_ascii_uppercase())
}

/// [`currency_code`], or [`DEFAULT_CURRENCY`].
pub fn currency(value: Option<&Value>) -> String {
  currency_code(value).unwrap_or_else(|| DEFAULT_CURRENCY.to_owned())
}

/// A lenient boolean: `true`, non-zero numbers, `"true"`, `"1"`, `"yes"`.
pub fn flag(value: Option<&Value>) -> bool {
  match value {
    Some(Value::Bool(b)) => *b,
    Some(Value::Number(n)) => n.as_f64().is_some_and(|x| x != 0.0),
    Some(Value::String(s)) => {
      matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
    }
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  #[test]
  fn integer_accepts_integral_forms_only() {
    assert_eq!(integer(Some(&json!(9900))), Numeric::Int(9900));
    assert_eq!(integer(Some(&json!(9900.0))), Numeric::Int(9900));
    assert_eq!(integer(Some(&json!(" 42 "))), Numeric::Int(42));
    assert_eq!(integer(Some(&json!(-7))), Numeric::Int(-7));
    assert_eq!(integer(Some(&json!(99.5))), Numeric::Invalid);
    assert_eq!(integer(Some(&json!("abc"))), Numeric::Invalid);
    assert_eq!(integer(Some(&json!(true))), Numeric::Invalid);
    assert_eq!(integer(Some(&json!([1]))), Numeric::Invalid);
    assert_eq!(integer(Some(&json!(1e300))), Numeric::Invalid);
    assert_eq!(integer(Some(&Value::Null)), Numeric::Missing);
    assert_eq!(integer(None), Numeric::Missing);
    assert_eq!(integer(Some(&json!(""))), Numeric::Missing);
  }

  #[test]
  fn major_units_round_to_nearest_cent() {
    assert_eq!(major_units_to_cents(Some(&json!("49.99"))), Numeric::Int(4999));
    assert_eq!(major_units_to_cents(Some(&json!(19.999))), Numeric::Int(2000));
    assert_eq!(major_units_to_cents(Some(&json!(0.1))), Numeric::Int(10));
    assert_eq!(major_units_to_cents(Some(&json!("NaN"))), Numeric::Invalid);
    assert_eq!(major_units_to_cents(Some(&json!("free"))), Numeric::Invalid);
  }

  #[test]
  fn inferred_cents_threshold() {
    assert_eq!(inferred_cents(Some(&json!("49.00"))), Numeric::Int(4900));
    assert_eq!(inferred_cents(Some(&json!(999.99))), Numeric::Int(99_999));
    assert_eq!(inferred_cents(Some(&json!(1000))), Numeric::Int(1000));
    assert_eq!(inferred_cents(Some(&json!("4900"))), Numeric::Int(4900));
    assert_eq!(inferred_cents(None), Numeric::Missing);
  }

  #[test]
  fn timestamps_in_every_supported_form() {
    let want = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let secs = want.timestamp();
    assert_eq!(timestamp(Some(&json!(secs))), Stamp::Parsed(want));
    assert_eq!(timestamp(Some(&json!(secs * 1000))), Stamp::Parsed(want));
    assert_eq!(timestamp(Some(&json!(secs.to_string()))), Stamp::Parsed(want));
    assert_eq!(
      timestamp(Some(&json!("2024-03-10T12:00:00Z"))),
      Stamp::Parsed(want)
    );
    assert_eq!(
      timestamp(Some(&json!("2024-03-10T07:00:00-05:00"))),
      Stamp::Parsed(want)
    );
    assert_eq!(
      timestamp(Some(&json!("2024-03-10 12:00:00"))),
      Stamp::Parsed(want)
    );
    assert_eq!(
      timestamp(Some(&json!("2024-03-10"))),
      Stamp::Parsed(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap())
    );
  }

  #[test]
  fn absent_and_garbage_timestamps_are_distinguished() {
    let arrival = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(timestamp(None).resolve(arrival), Some(arrival));
    assert_eq!(timestamp(Some(&json!("  "))).resolve(arrival), Some(arrival));
    assert_eq!(timestamp(Some(&json!("next tuesday"))), Stamp::Unparseable);
    assert_eq!(timestamp(Some(&json!({"at": 1}))), Stamp::Unparseable);
    assert_eq!(timestamp(Some(&json!("yesterday"))).resolve(arrival), None);
  }

  #[test]
  fn currency_defaults_and_uppercases() {
    assert_eq!(currency(Some(&json!(" eur "))), "EUR");
    assert_eq!(currency(Some(&json!(""))), "USD");
    assert_eq!(currency(None), "USD");
  }

  #[test]
  fn currency_must_be_a_three_letter_code() {
    assert_eq!(currency(Some(&json!("US DOLLARS"))), "USD");
    assert_eq!(currency(Some(&json!("gbp"))), "GBP");
    assert_eq!(currency(Some(&json!("E1R"))), "USD");
    assert_eq!(currency(Some(&json!(978))), "USD");
    assert_eq!(currency_code(Some(&json!("euro"))), None);
    assert_eq!(currency_code(Some(&json!(" jpy"))), Some("JPY".to_owned()));
  }

  #[test]
  fn path_treats_null_as_absent() {
    let v = json!({"a": {"b": null, "c": 1}});
    assert_eq!(path(&v, &["a", "c"]), Some(&json!(1)));
    assert_eq!(path(&v, &["a", "b"]), None);
    assert_eq!(path(&v, &["a", "c", "d"]), None);
  }

  #[test]
  fn flags_are_lenient() {
    assert!(flag(Some(&json!(true))));
    assert!(flag(Some(&json!(1))));
    assert!(flag(Some(&json!("Yes"))));
    assert!(!flag(Some(&json!("no"))));
    assert!(!flag(None));
  }
}
