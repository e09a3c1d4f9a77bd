//! Canonical display strings for runtime values
//!
//! Two forms: [`serialize`] is the display form (a bare string stays
//! unquoted; interpolation and `print` use it), [`literal`] is the
//! round-trippable form used for elements nested inside lists and hashes.

use super::value::Value;

/// Value → canonical display string
pub fn serialize(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => literal(other),
    }
}

/// Value → literal form: evaluating the result reproduces an equivalent
/// value with identical element and key order.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Unit => String::new(),
        Value::Int(n) => n.to_string(),
        Value::Float(n) => {
            // Keep a decimal point so the literal re-lexes as a float
            if n.fract() == 0.0 && n.is_finite() {
                format!("{:.1}", n)
            } else {
                n.to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Str(s) => quote(s),
        Value::List(items) => {
            let items = items.borrow();
            let parts: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Hash(map) => {
            let map = map.borrow();
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), literal(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Object(obj) => {
            let obj = obj.borrow();
            let parts: Vec<String> = obj
                .fields
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), literal(v)))
                .collect();
            format!("{} {{{}}}", obj.class_name, parts.join(", "))
        }
        Value::Lambda(name) => format!("<lambda {}>", name),
    }
}

/// List-from-any-value coercion, used by slice assignment
pub fn to_list(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.borrow().clone(),
        other => vec![other.clone()],
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
