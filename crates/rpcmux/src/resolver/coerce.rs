//! Argument coercion rules.
//!
//! Coercion maps a decoded argument onto the shape a parameter kind expects.
//! The strict pass admits only lossless conversions inside a type family;
//! the loose pass adds cross-family conversions (text ↔ scalars, JSON text
//! to objects, scalar to single-element list) and trailing-array packing.

use serde_json::{Number, Value};

use crate::handler::{FloatWidth, IntRange, ParamKind};

/// Which binding pass produced an argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    /// Lossless binding; first matching overload wins.
    Strict,
    /// Relaxed binding applied to the last same-named overload only.
    Loose,
}

/// Binds `args` to `params`, returning the coerced argument list.
pub(crate) fn bind(params: &[ParamKind], args: &[Value], pass: MatchPass) -> Option<Vec<Value>> {
    if params.len() == args.len()
        && let Some(bound) = bind_exact(params, args, pass)
    {
        return Some(bound);
    }
    match pass {
        MatchPass::Strict => None,
        MatchPass::Loose => pack_trailing(params, args),
    }
}

fn bind_exact(params: &[ParamKind], args: &[Value], pass: MatchPass) -> Option<Vec<Value>> {
    params
        .iter()
        .zip(args)
        .map(|(kind, value)| coerce(value, kind, pass))
        .collect()
}

/// Packs surplus trailing arguments into a final sequence parameter.
fn pack_trailing(params: &[ParamKind], args: &[Value]) -> Option<Vec<Value>> {
    let (ParamKind::Sequence(element), head) = params.split_last()? else {
        return None;
    };
    if args.len() < head.len() {
        return None;
    }
    let (head_args, tail_args) = args.split_at(head.len());
    let mut bound = bind_exact(head, head_args, MatchPass::Loose)?;
    let packed = tail_args
        .iter()
        .map(|value| coerce(value, element, MatchPass::Loose))
        .collect::<Option<Vec<_>>>()?;
    bound.push(Value::Array(packed));
    Some(bound)
}

/// Coerces a single value to `kind`.
pub(crate) fn coerce(value: &Value, kind: &ParamKind, pass: MatchPass) -> Option<Value> {
    let loose = pass == MatchPass::Loose;
    match kind {
        ParamKind::Any => Some(value.clone()),
        ParamKind::Optional(inner) => match value {
            Value::Null => Some(Value::Null),
            other => coerce(other, inner, pass),
        },
        ParamKind::Bool => coerce_bool(value, loose),
        ParamKind::Integer(range) => coerce_integer(value, *range, loose),
        ParamKind::Float(width) => coerce_float(value, *width, loose),
        ParamKind::Text => coerce_text(value, loose),
        ParamKind::Sequence(element) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce(item, element, pass))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Value::Null => None,
            scalar if loose => coerce(scalar, element, pass).map(|item| Value::Array(vec![item])),
            _ => None,
        },
        ParamKind::Mapping => match value {
            Value::Object(_) => Some(value.clone()),
            Value::String(text) if loose => parse_object(text),
            _ => None,
        },
        ParamKind::Structured(structured) => {
            let candidate = match value {
                Value::Object(_) => Some(value.clone()),
                Value::String(text) if loose => parse_object(text),
                _ => None,
            }?;
            structured.accepts(&candidate).then_some(candidate)
        }
    }
}

fn coerce_bool(value: &Value, loose: bool) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::String(text) if loose => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Number(number) if loose => match number.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_integer(value: &Value, range: IntRange, loose: bool) -> Option<Value> {
    let whole = match value {
        Value::Number(number) => number
            .as_i64()
            .map(i128::from)
            .or_else(|| number.as_u64().map(i128::from))
            .or_else(|| number.as_f64().and_then(integral_float)),
        Value::String(text) if loose => text.trim().parse::<i128>().ok(),
        _ => None,
    }?;
    if !range.contains(whole) {
        return None;
    }
    i64::try_from(whole)
        .map(Value::from)
        .or_else(|_| u64::try_from(whole).map(Value::from))
        .ok()
}

const WHOLE_LOWER: f64 = -9_223_372_036_854_775_808.0;
const WHOLE_UPPER: f64 = 18_446_744_073_709_551_616.0;

fn integral_float(float: f64) -> Option<i128> {
    let in_range = (WHOLE_LOWER..WHOLE_UPPER).contains(&float);
    (float.is_finite() && float.fract() == 0.0 && in_range).then(|| float as i128)
}

fn coerce_float(value: &Value, width: FloatWidth, loose: bool) -> Option<Value> {
    let number = match value {
        Value::Number(number) => number.clone(),
        Value::String(text) if loose => text.trim().parse::<f64>().ok().and_then(Number::from_f64)?,
        _ => return None,
    };
    let fits = match width {
        FloatWidth::Single => number.as_f64().is_some_and(|float| float.abs() <= f64::from(f32::MAX)),
        FloatWidth::Double => true,
    };
    fits.then_some(Value::Number(number))
}

fn coerce_text(value: &Value, loose: bool) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Number(number) if loose => Some(Value::String(number.to_string())),
        Value::Bool(flag) if loose => Some(Value::String(flag.to_string())),
        _ => None,
    }
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(object @ Value::Object(_)) => Some(object),
        _ => None,
    }
}
