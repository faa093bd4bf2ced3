//! Textual rendering of property bags.

use crate::{NvBag, NvValue};

/// Line-oriented dump in insertion order, nested bags indented two spaces
/// per level. The default output mode.
pub fn render_text(bag: &NvBag) -> String {
    let mut out = String::new();
    write_text(bag, 0, &mut out);
    out
}

fn write_text(bag: &NvBag, depth: usize, out: &mut String) {
    for (key, value) in bag.iter() {
        for _ in 0..depth {
            out.push_str("  ");
        }
        match value {
            NvValue::Bag(inner) => {
                out.push_str(key);
                out.push_str(" = (bag)\n");
                write_text(inner, depth + 1, out);
            }
            scalar => {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(&scalar_text(scalar));
                out.push('\n');
            }
        }
    }
}

/// A scalar rendered the way both the text dump and the message decoder
/// print it. Callers never pass a nested bag.
pub(crate) fn scalar_text(value: &NvValue) -> String {
    match value {
        NvValue::String(s) => s.clone(),
        NvValue::Bool(b) => b.to_string(),
        NvValue::Int64(n) => n.to_string(),
        NvValue::Uint64(n) => n.to_string(),
        NvValue::Double(d) => d.to_string(),
        NvValue::Bag(_) => "(bag)".to_string(),
    }
}

/// Single-line JSON object, keys in insertion order, nested bags as nested
/// objects. String escaping is serde_json's.
pub fn render_json(bag: &NvBag) -> String {
    let mut out = String::new();
    write_json(bag, &mut out);
    out
}

fn write_json(bag: &NvBag, out: &mut String) {
    out.push('{');
    let mut first = true;
    for (key, value) in bag.iter() {
        if !first {
            out.push_str(", ");
        }
        first = false;
        out.push_str(&json_string(key));
        out.push_str(": ");
        match value {
            NvValue::Bag(inner) => write_json(inner, out),
            scalar => out.push_str(&json_scalar(scalar)),
        }
    }
    out.push('}');
}

fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn json_scalar(value: &NvValue) -> String {
    match value {
        NvValue::String(s) => json_string(s),
        NvValue::Bool(b) => b.to_string(),
        NvValue::Int64(n) => n.to_string(),
        NvValue::Uint64(n) => n.to_string(),
        // Non-finite doubles have no JSON representation; null matches what
        // serde_json emits for them.
        NvValue::Double(d) => serde_json::Number::from_f64(*d)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "null".to_string()),
        NvValue::Bag(_) => "{}".to_string(),
    }
}
