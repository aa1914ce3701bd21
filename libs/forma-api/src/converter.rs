use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::descriptor::TypeDescriptor;
use crate::error::{ConvertError, ModelError};
use crate::model::ModelType;
use crate::value::{Value, dedup, iso_format};

/// Convert `value` to the kind described by `target`.
///
/// Routing is two-level: first on the target kind, then on the exact source
/// kind. Source-kind overrides are matched before the target's default rule.
/// Value-domain failures come back as [`ConvertError::Conversion`]; model
/// construction errors are passed through untouched.
pub fn convert(value: Value, target: &TypeDescriptor) -> Result<Value, ConvertError> {
    tracing::trace!(to = %target, from = %value.kind(), "convert");
    match target {
        TypeDescriptor::Any => Ok(value),
        TypeDescriptor::String => Ok(Value::Str(to_str(value))),
        TypeDescriptor::Integer => to_int(value).map(Value::Int),
        TypeDescriptor::Float => to_float(value).map(Value::Float),
        TypeDescriptor::Boolean => Ok(Value::Bool(to_bool(value))),
        TypeDescriptor::Timestamp => to_timestamp(value).map(Value::Timestamp),
        TypeDescriptor::OrderedSequence => elements(value, target).map(Value::List),
        TypeDescriptor::FixedSequence => elements(value, target).map(Value::Tuple),
        TypeDescriptor::Set => elements(value, target).map(|items| Value::Set(dedup(items))),
        TypeDescriptor::Model(model) => to_model(value, model.as_ref()),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scalars
// ═══════════════════════════════════════════════════════════════

fn to_str(value: Value) -> String {
    match value {
        Value::Timestamp(ts) => iso_format(&ts),
        Value::Bool(b) => String::from(if b { "yes" } else { "no" }),
        Value::Null => String::new(),
        Value::Str(s) => s,
        other => other.to_string(),
    }
}

fn to_int(value: Value) -> Result<i64, ConvertError> {
    match value {
        Value::Timestamp(ts) => Ok(epoch_seconds_truncated(&ts)),
        Value::Int(i) => Ok(i),
        Value::Bool(b) => Ok(i64::from(b)),
        Value::Float(f) => float_to_int(f),
        Value::Str(s) => s.trim().parse::<i64>().map_err(|e| {
            ConvertError::conversion(format!("invalid literal for integer {s:?}: {e}"))
        }),
        other => Err(ConvertError::unsupported(other.type_name(), TypeDescriptor::Integer)),
    }
}

fn to_float(value: Value) -> Result<f64, ConvertError> {
    match value {
        Value::Timestamp(ts) => {
            Ok(ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9)
        }
        Value::Float(f) => Ok(f),
        Value::Int(i) => Ok(i as f64),
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        Value::Str(s) => s.trim().parse::<f64>().map_err(|e| {
            ConvertError::conversion(format!("could not convert string to float {s:?}: {e}"))
        }),
        other => Err(ConvertError::unsupported(other.type_name(), TypeDescriptor::Float)),
    }
}

fn to_bool(value: Value) -> bool {
    match value {
        Value::Str(s) => s.to_lowercase() == "yes",
        other => truthy(&other),
    }
}

/// Generic truth test used when no override applies.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        // NaN compares unequal to zero, so it is truthy.
        Value::Float(f) => *f != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::Timestamp(_) | Value::Model(_) => true,
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => !items.is_empty(),
        Value::Map(mapping) => !mapping.is_empty(),
    }
}

fn float_to_int(f: f64) -> Result<i64, ConvertError> {
    if !f.is_finite() {
        return Err(ConvertError::conversion(format!("cannot convert float {f} to integer")));
    }
    let truncated = f.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(ConvertError::conversion(format!("float {f} out of integer range")));
    }
    Ok(truncated as i64)
}

// ═══════════════════════════════════════════════════════════════
//  Timestamps
// ═══════════════════════════════════════════════════════════════

fn to_timestamp(value: Value) -> Result<DateTime<FixedOffset>, ConvertError> {
    match value {
        Value::Int(secs) => from_epoch(secs, 0),
        Value::Float(f) => from_epoch_float(f),
        Value::Str(s) => parse_iso(&s),
        Value::Timestamp(ts) => Ok(ts),
        other => Err(ConvertError::unsupported(other.type_name(), TypeDescriptor::Timestamp)),
    }
}

/// Whole seconds since the epoch, truncated toward zero.
fn epoch_seconds_truncated(ts: &DateTime<FixedOffset>) -> i64 {
    // chrono floors (negative instants keep a positive sub-second part).
    let secs = ts.timestamp();
    if secs < 0 && ts.timestamp_subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Epoch instant rendered in the local time zone.
fn from_epoch(secs: i64, nanos: u32) -> Result<DateTime<FixedOffset>, ConvertError> {
    Local
        .timestamp_opt(secs, nanos)
        .single()
        .map(|ts| ts.fixed_offset())
        .ok_or_else(|| ConvertError::conversion(format!("timestamp {secs} out of range")))
}

fn from_epoch_float(f: f64) -> Result<DateTime<FixedOffset>, ConvertError> {
    if !f.is_finite() {
        return Err(ConvertError::conversion(format!("cannot convert float {f} to timestamp")));
    }
    let mut secs = f.floor();
    let mut nanos = ((f - secs) * 1e9).round();
    if nanos >= 1e9 {
        secs += 1.0;
        nanos = 0.0;
    }
    if secs < i64::MIN as f64 || secs >= i64::MAX as f64 {
        return Err(ConvertError::conversion(format!("timestamp {f} out of range")));
    }
    from_epoch(secs as i64, nanos as u32)
}

/// Layouts carrying a UTC offset, tried after RFC 3339. Each is listed with
/// the extended (`+02:00`) and basic (`+0200`) offset forms.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%d %H:%M%z",
];

/// Naive layouts, most specific first. Interpreted in the local time zone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// Parse ISO-8601 text: a date-time with an offset (`Z`, extended or basic
/// form), a naive date-time down to hour precision, or a bare date in
/// extended or basic form (local midnight).
fn parse_iso(text: &str) -> Result<DateTime<FixedOffset>, ConvertError> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts);
    }
    // `%z` has no `Z` form.
    let zoned = match text.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{rest}+00:00"),
        None => text.to_string(),
    };
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(&zoned, format) {
            return Ok(ts);
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return localize(naive, text);
        }
    }
    if let Some(naive) = parse_hour_only(text) {
        return localize(naive, text);
    }
    let mut first_err = None;
    for format in DATE_FORMATS {
        match NaiveDate::parse_from_str(text, format) {
            Ok(date) => return localize(date.and_time(NaiveTime::MIN), text),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    let reason = first_err.map(|e| e.to_string()).unwrap_or_default();
    Err(ConvertError::conversion(format!(
        "invalid isoformat string {text:?}: {reason}"
    )))
}

/// `YYYY-MM-DDTHH` (or a space separator). chrono needs minutes for a time
/// of day, so the hour is read by hand.
fn parse_hour_only(text: &str) -> Option<NaiveDateTime> {
    if text.len() != 13 || !matches!(text.as_bytes()[10], b'T' | b' ') {
        return None;
    }
    let date = NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok()?;
    let hour = text.get(11..)?;
    if !hour.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    date.and_hms_opt(hour.parse().ok()?, 0, 0)
}

/// Attach the local offset. Ambiguous wall-clock times (DST fold) take the
/// earlier instant; times inside a DST gap do not exist.
fn localize(naive: NaiveDateTime, text: &str) -> Result<DateTime<FixedOffset>, ConvertError> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.fixed_offset())
        .ok_or_else(|| {
            ConvertError::conversion(format!("{text:?} does not exist in the local time zone"))
        })
}

// ═══════════════════════════════════════════════════════════════
//  Sequences
// ═══════════════════════════════════════════════════════════════

/// Elements of an iterable source, in source order. Strings iterate their
/// characters, mappings their keys.
fn elements(value: Value, target: &TypeDescriptor) -> Result<Vec<Value>, ConvertError> {
    iterate(value).map_err(|other| ConvertError::unsupported(other.type_name(), target))
}

/// Same as [`elements`], handing a non-iterable value back to the caller.
fn iterate(value: Value) -> Result<Vec<Value>, Value> {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Map(mapping) => Ok(mapping.into_keys().map(Value::Str).collect()),
        other => Err(other),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Models
// ═══════════════════════════════════════════════════════════════

fn to_model(value: Value, model: &dyn ModelType) -> Result<Value, ConvertError> {
    match value {
        // Conversion may run several times over the same field; an instance
        // of the target model is kept as-is.
        Value::Model(object) if model.is_instance(object.as_ref()) => Ok(Value::Model(object)),
        Value::Map(mapping) => {
            tracing::debug!(model = model.name(), fields = mapping.len(), "building model from mapping");
            model.from_mapping(&mapping).map(Value::Model)
        }
        // Any other iterable source fills the fields positionally.
        other => match iterate(other) {
            Ok(items) => {
                tracing::debug!(model = model.name(), values = items.len(), "building model from sequence");
                model.from_sequence(&items).map(Value::Model)
            }
            Err(other) => Err(ModelError::UnexpectedValue {
                model: model.name().to_string(),
                got: other.type_name(),
            }
            .into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Mapping;
    use chrono::{Datelike, Timelike};
    use pretty_assertions::assert_eq;

    fn ts(text: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(text).expect("valid RFC 3339")
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn any_passes_value_through() {
        let value = Value::List(ints(&[1, 2]));
        assert_eq!(convert(value.clone(), &TypeDescriptor::Any).unwrap(), value);
    }

    // --- String ---

    #[test]
    fn string_overrides() {
        let s = |v: Value| convert(v, &TypeDescriptor::String).unwrap();
        assert_eq!(s(Value::Bool(true)), Value::from("yes"));
        assert_eq!(s(Value::Bool(false)), Value::from("no"));
        assert_eq!(s(Value::Null), Value::from(""));
        assert_eq!(
            s(Value::Timestamp(ts("2024-03-01T12:30:00+02:00"))),
            Value::from("2024-03-01T12:30:00+02:00")
        );
        assert_eq!(
            s(Value::Timestamp(ts("2024-03-01T12:30:00.250+00:00"))),
            Value::from("2024-03-01T12:30:00.250+00:00")
        );
    }

    #[test]
    fn string_default_stringifies() {
        let s = |v: Value| convert(v, &TypeDescriptor::String).unwrap();
        assert_eq!(s(Value::Int(42)), Value::from("42"));
        assert_eq!(s(Value::Float(2.5)), Value::from("2.5"));
        assert_eq!(s(Value::Float(3.0)), Value::from("3.0"));
        assert_eq!(s(Value::from("same")), Value::from("same"));
        assert_eq!(s(Value::List(ints(&[1, 2]))), Value::from("[1, 2]"));
    }

    // --- Integer ---

    #[test]
    fn integer_default_parses() {
        let i = |v: Value| convert(v, &TypeDescriptor::Integer);
        assert_eq!(i(Value::from("30")).unwrap(), Value::Int(30));
        assert_eq!(i(Value::from(" -7 ")).unwrap(), Value::Int(-7));
        assert_eq!(i(Value::Float(3.9)).unwrap(), Value::Int(3));
        assert_eq!(i(Value::Float(-3.9)).unwrap(), Value::Int(-3));
        assert_eq!(i(Value::Bool(true)).unwrap(), Value::Int(1));
    }

    #[test]
    fn integer_from_malformed_text_is_conversion_error() {
        let err = convert(Value::from("not-a-number"), &TypeDescriptor::Integer).unwrap_err();
        assert!(err.is_conversion(), "{err:?}");
        assert!(err.to_string().contains("not-a-number"));

        let err = convert(Value::from("3.5"), &TypeDescriptor::Integer).unwrap_err();
        assert!(err.is_conversion());
        let err = convert(Value::Float(f64::NAN), &TypeDescriptor::Integer).unwrap_err();
        assert!(err.is_conversion());
        let err = convert(Value::Float(1e300), &TypeDescriptor::Integer).unwrap_err();
        assert!(err.is_conversion());
    }

    #[test]
    fn integer_from_unreachable_kind_is_unsupported() {
        let err = convert(Value::Null, &TypeDescriptor::Integer).unwrap_err();
        assert_eq!(err, ConvertError::unsupported("null", "Integer"));
    }

    #[test]
    fn integer_from_timestamp_truncates() {
        let i = |v: &str| convert(Value::Timestamp(ts(v)), &TypeDescriptor::Integer).unwrap();
        assert_eq!(i("1970-01-01T00:01:40.900Z"), Value::Int(100));
        assert_eq!(i("1969-12-31T23:59:58.500Z"), Value::Int(-1));
    }

    // --- Float ---

    #[test]
    fn float_rules() {
        let f = |v: Value| convert(v, &TypeDescriptor::Float);
        assert_eq!(f(Value::from("1.25")).unwrap(), Value::Float(1.25));
        assert_eq!(f(Value::Int(4)).unwrap(), Value::Float(4.0));
        assert_eq!(
            f(Value::Timestamp(ts("1970-01-01T00:00:10.5Z"))).unwrap(),
            Value::Float(10.5)
        );
        assert!(f(Value::from("abc")).unwrap_err().is_conversion());
        assert!(matches!(
            f(Value::Map(Mapping::new())),
            Err(ConvertError::Unsupported { .. })
        ));
    }

    // --- Boolean ---

    #[test]
    fn boolean_text_matches_yes_only() {
        let b = |v: &str| convert(Value::from(v), &TypeDescriptor::Boolean).unwrap();
        assert_eq!(b("Yes"), Value::Bool(true));
        assert_eq!(b("YES"), Value::Bool(true));
        assert_eq!(b("no"), Value::Bool(false));
        assert_eq!(b("maybe"), Value::Bool(false));
        assert_eq!(b("true"), Value::Bool(false));
    }

    #[test]
    fn boolean_default_is_truthiness() {
        let b = |v: Value| convert(v, &TypeDescriptor::Boolean).unwrap();
        assert_eq!(b(Value::Null), Value::Bool(false));
        assert_eq!(b(Value::Int(0)), Value::Bool(false));
        assert_eq!(b(Value::Int(-2)), Value::Bool(true));
        assert_eq!(b(Value::Float(0.0)), Value::Bool(false));
        assert_eq!(b(Value::Float(f64::NAN)), Value::Bool(true));
        assert_eq!(b(Value::List(Vec::new())), Value::Bool(false));
        assert_eq!(b(Value::Tuple(ints(&[0]))), Value::Bool(true));
        assert_eq!(b(Value::Map(Mapping::new())), Value::Bool(false));
    }

    #[test]
    fn generic_truth_test_covers_strings() {
        // The Boolean target reads text through "yes"; the generic rule
        // treats any non-empty string as true.
        assert!(!truthy(&Value::from("")));
        assert!(truthy(&Value::from("no")));
        assert!(!to_bool(Value::from("no")));
        assert!(truthy(&Value::set([Value::Null])));
    }

    // --- Timestamp ---

    #[test]
    fn timestamp_from_epoch_keeps_the_instant() {
        let value = convert(Value::Int(42), &TypeDescriptor::Timestamp).unwrap();
        let Value::Timestamp(t) = &value else {
            panic!("expected timestamp, got {value:?}");
        };
        assert_eq!(t.timestamp(), 42);
        assert_eq!(convert(value, &TypeDescriptor::Integer).unwrap(), Value::Int(42));

        let value = convert(Value::Float(1.5), &TypeDescriptor::Timestamp).unwrap();
        assert_eq!(convert(value, &TypeDescriptor::Float).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn timestamp_parses_iso_text() {
        let t = |v: &str| match convert(Value::from(v), &TypeDescriptor::Timestamp).unwrap() {
            Value::Timestamp(t) => t,
            other => panic!("expected timestamp, got {other:?}"),
        };
        assert_eq!(t("2024-01-02T03:04:05+00:00"), ts("2024-01-02T03:04:05Z"));
        assert_eq!(t("2024-01-02 03:04:05.5+01:00"), ts("2024-01-02T02:04:05.5Z"));

        let naive = t("2024-01-02T03:04:05");
        assert_eq!((naive.hour(), naive.minute(), naive.second()), (3, 4, 5));
        let date = t("2024-06-15");
        assert_eq!((date.year(), date.month(), date.day(), date.hour()), (2024, 6, 15, 0));
    }

    #[test]
    fn timestamp_parses_reduced_and_basic_iso_forms() {
        let t = |v: &str| match convert(Value::from(v), &TypeDescriptor::Timestamp) {
            Ok(Value::Timestamp(t)) => t,
            other => panic!("{v:?}: expected timestamp, got {other:?}"),
        };

        // Offsets without seconds, in basic form, or as `Z`.
        assert_eq!(t("2024-01-02T03:04+02:00"), ts("2024-01-02T01:04:00Z"));
        assert_eq!(t("2024-01-02T03:04:05+0200"), ts("2024-01-02T01:04:05Z"));
        assert_eq!(t("2024-01-02 03:04-0130"), ts("2024-01-02T04:34:00Z"));
        assert_eq!(t("2024-01-02T03:04Z"), ts("2024-01-02T03:04:00Z"));
        assert_eq!(t("2024-01-02T03:04+02:00").offset().local_minus_utc(), 7200);

        let hour = t("2024-01-02T03");
        assert_eq!((hour.day(), hour.hour(), hour.minute()), (2, 3, 0));
        let hour = t("2024-01-02 23");
        assert_eq!(hour.hour(), 23);

        let basic = t("20240102");
        assert_eq!((basic.year(), basic.month(), basic.day(), basic.hour()), (2024, 1, 2, 0));

        let err = convert(Value::from("2024-01-02T25"), &TypeDescriptor::Timestamp).unwrap_err();
        assert!(err.is_conversion(), "{err:?}");
    }

    #[test]
    fn timestamp_from_malformed_text_is_conversion_error() {
        let err = convert(Value::from("yesterday"), &TypeDescriptor::Timestamp).unwrap_err();
        assert!(err.is_conversion(), "{err:?}");
    }

    #[test]
    fn timestamp_rejects_kinds_without_override() {
        // Bool is its own kind and does not fall into the integer override.
        let err = convert(Value::Bool(true), &TypeDescriptor::Timestamp).unwrap_err();
        assert_eq!(err.to_string(), "cannot convert `bool` to Timestamp");
        let err = convert(Value::List(Vec::new()), &TypeDescriptor::Timestamp).unwrap_err();
        assert_eq!(err, ConvertError::unsupported("list", "Timestamp"));
    }

    #[test]
    fn timestamp_identity() {
        let t = ts("2001-09-09T01:46:40.123456789+05:30");
        assert_eq!(
            convert(Value::Timestamp(t), &TypeDescriptor::Timestamp).unwrap(),
            Value::Timestamp(t)
        );
    }

    // --- Sequences ---

    #[test]
    fn ordered_sequence_preserves_order() {
        let out = convert(Value::List(ints(&[3, 1, 2])), &TypeDescriptor::OrderedSequence).unwrap();
        assert_eq!(out, Value::List(ints(&[3, 1, 2])));

        let out = convert(Value::Tuple(ints(&[3, 1])), &TypeDescriptor::OrderedSequence).unwrap();
        assert_eq!(out, Value::List(ints(&[3, 1])));
    }

    #[test]
    fn fixed_sequence_from_string_and_mapping() {
        let out = convert(Value::from("ab"), &TypeDescriptor::FixedSequence).unwrap();
        assert_eq!(out, Value::Tuple(vec![Value::from("a"), Value::from("b")]));

        let mapping: Mapping = [("k1", Value::Int(1)), ("k2", Value::Int(2))].into_iter().collect();
        let out = convert(Value::Map(mapping), &TypeDescriptor::FixedSequence).unwrap();
        assert_eq!(out, Value::Tuple(vec![Value::from("k1"), Value::from("k2")]));
    }

    #[test]
    fn set_drops_duplicates() {
        let out = convert(Value::List(ints(&[3, 1, 2, 3, 1])), &TypeDescriptor::Set).unwrap();
        let Value::Set(items) = &out else {
            panic!("expected set, got {out:?}");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(out, Value::set(ints(&[1, 2, 3])));
    }

    #[test]
    fn sequences_reject_scalars() {
        let err = convert(Value::Int(5), &TypeDescriptor::OrderedSequence).unwrap_err();
        assert_eq!(err, ConvertError::unsupported("int", "OrderedSequence"));
    }
}
