//! Primitive value generation from schema constraints.
//!
//! The schema-driven recursion (objects, arrays, allOf) lives on the test
//! step because it feeds the comparison ledger; the leaf generators here
//! are pure draws from the schema's constraint space.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Duration, Local};
use rand::Rng;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::Schema;

/// Uniform pick from a non-empty enum list.
#[must_use]
pub fn generate_enum(values: &[Value]) -> Value {
    let mut rng = rand::thread_rng();
    values[rng.gen_range(0..values.len())].clone()
}

#[must_use]
pub fn generate_bool() -> Value {
    Value::Bool(rand::thread_rng().gen_bool(0.5))
}

/// Draws a float honoring `minimum`/`maximum` and the exclusive flags
/// (which shift the bound by 0.01). With no bounds the range is [-1, 1);
/// with one bound a symmetric counterpart is synthesized.
///
/// # Errors
/// Returns `Error::Invalid` when both bounds are given but conflict.
pub fn generate_float(s: &Schema) -> Result<f64> {
    let mut realmin = 0.0;
    if let Some(m) = s.minimum {
        realmin = m;
        if s.exclusive_minimum {
            realmin += 0.01;
        }
    }
    let mut realmax = 0.0;
    if let Some(m) = s.maximum {
        realmax = m;
        if s.exclusive_maximum {
            realmax -= 0.01;
        }
    }
    if realmin >= realmax {
        match (s.minimum, s.maximum) {
            (None, None) => {
                realmin = -1.0;
                realmax = 1.0;
            }
            (Some(min), Some(max)) => {
                return Err(Error::Invalid(format!(
                    "specified min value {min} is bigger than max {max}"
                )));
            }
            (Some(_), None) => {
                realmax = realmin + realmin.abs();
                if realmax <= realmin {
                    realmax = realmin + 1.0;
                }
            }
            (None, Some(_)) => {
                realmin = realmax - realmax.abs();
                if realmin >= realmax {
                    realmin = realmax - 1.0;
                }
            }
        }
    }
    Ok(rand::thread_rng().gen_range(realmin..realmax))
}

/// Integer generation rides on [`generate_float`] with a default range of
/// [0, 10000) when unbounded; the truncated draw is bumped past a minimum
/// it landed on.
///
/// # Errors
/// Propagates conflicting-bounds errors from the float draw.
pub fn generate_int(schema: &Schema) -> Result<i64> {
    let mut s = schema.clone();
    if s.maximum.is_none() && s.minimum.is_none() {
        s.maximum = Some(10000.0);
    }
    let f = generate_float(&s)?;
    let mut i = f as i64;
    if let Some(min) = s.minimum
        && i <= min as i64
    {
        i += 1;
    }
    Ok(i)
}

/// A time within the last 30 days, for date and date-time formats.
fn random_past_time() -> chrono::DateTime<Local> {
    let secs = rand::thread_rng().gen_range(0..30 * 24 * 3600);
    Local::now() - Duration::seconds(secs)
}

/// String generation: date formats render directly; otherwise the raw text
/// comes from the schema pattern (regex-directed) or from the field-name
/// prefix plus digits, then gets encoded per the declared format.
///
/// # Errors
/// Returns `Error::Invalid` for an uncompilable pattern or a format string
/// the engine does not know.
pub fn generate_string(s: &Schema, prefix: &str) -> Result<String> {
    match s.format.as_deref() {
        Some("date-time") => return Ok(random_past_time().to_rfc3339()),
        Some("date") => return Ok(random_past_time().format("%Y-%m-%d").to_string()),
        _ => {}
    }

    let raw = match &s.pattern {
        Some(pattern) => {
            let max_repeat = (pattern.len() as u32).saturating_mul(2).max(10);
            let sampler = rand_regex::Regex::compile(pattern, max_repeat)
                .map_err(|e| Error::Invalid(format!("bad pattern {pattern}: {e}")))?;
            rand::thread_rng().sample::<String, _>(&sampler)
        }
        None => format!("{}{:05}", prefix, rand::thread_rng().gen_range(0..100_000)),
    };

    match s.format.as_deref() {
        None | Some("") | Some("password") => Ok(raw),
        Some("byte") => Ok(BASE64.encode(raw.as_bytes())),
        Some("binary") => Ok(hex::encode(raw.as_bytes())),
        Some("uri") | Some("url") => Ok(format!("https://www.google.com/search?q={raw}")),
        Some(other) => Err(Error::Invalid(format!("invalid format string: {other}"))),
    }
}

/// Stand-in contents for a `file` typed parameter.
#[must_use]
pub fn generate_file_contents() -> String {
    let mut rng = rand::thread_rng();
    (0..200)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
