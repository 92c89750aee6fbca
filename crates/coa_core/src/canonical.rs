//! RFC 8785 (JCS) canonical JSON.
//!
//! # Canonicalization Rules
//!
//! 1. Object members are sorted by the UTF-16 code units of their names
//! 2. No whitespace between tokens
//! 3. Numbers use the ECMAScript Number-to-String form of their IEEE-754
//!    double value
//! 4. Strings use minimal escaping
//!
//! The output is byte-identical to what a JavaScript JCS implementation
//! produces for the same logical document, which is what makes content
//! hashes portable between the two.
//!
//! # Example
//!
//! ```
//! use coa_core::canonical::canonicalize_to_string;
//! use serde_json::json;
//!
//! let canonical = canonicalize_to_string(&json!({"z": 1, "a": [true, null]})).unwrap();
//! assert_eq!(canonical, r#"{"a":[true,null],"z":1}"#);
//! ```

use crate::error::{CoreError, CoreResult};
use serde_json::{Map, Number, Value};
use std::fmt::Write as _;

/// Maximum nesting depth accepted by the canonicalizer
pub const MAX_DEPTH: usize = 128;

/// Canonicalize a JSON value to bytes.
///
/// # Errors
///
/// Returns [`CoreError::Canonicalization`] if the value nests deeper than
/// [`MAX_DEPTH`]
pub fn canonicalize(value: &Value) -> CoreResult<Vec<u8>> {
    canonicalize_to_string(value).map(String::into_bytes)
}

/// Canonicalize a JSON value to a string.
///
/// # Errors
///
/// Returns [`CoreError::Canonicalization`] if the value nests deeper than
/// [`MAX_DEPTH`]
pub fn canonicalize_to_string(value: &Value) -> CoreResult<String> {
    let mut output = String::new();
    emit_value(value, &mut output, 0)?;
    Ok(output)
}

fn emit_value(value: &Value, output: &mut String, depth: usize) -> CoreResult<()> {
    if depth > MAX_DEPTH {
        return Err(CoreError::Canonicalization {
            reason: format!("nested deeper than {} levels", MAX_DEPTH),
        });
    }

    match value {
        Value::Null => output.push_str("null"),
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, output),
        Value::String(s) => emit_string(s, output),
        Value::Array(arr) => {
            output.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                emit_value(item, output, depth + 1)?;
            }
            output.push(']');
        }
        Value::Object(obj) => emit_object(obj, output, depth)?,
    }
    Ok(())
}

/// Emit an object with members sorted by UTF-16 code units.
fn emit_object(obj: &Map<String, Value>, output: &mut String, depth: usize) -> CoreResult<()> {
    let mut members: Vec<(Vec<u16>, &String, &Value)> = obj
        .iter()
        .map(|(k, v)| (k.encode_utf16().collect(), k, v))
        .collect();
    members.sort_by(|a, b| a.0.cmp(&b.0));

    output.push('{');
    for (i, (_, key, value)) in members.into_iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        emit_string(key, output);
        output.push(':');
        emit_value(value, output, depth + 1)?;
    }
    output.push('}');
    Ok(())
}

/// Emit a string with the escapes JSON requires and nothing more.
fn emit_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{0008}' => output.push_str("\\b"),
            '\u{000C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c < '\u{0020}' => {
                let _ = write!(output, "\\u{:04x}", c as u32);
            }
            c => output.push(c),
        }
    }
    output.push('"');
}

/// Largest integer a double represents exactly (2^53).
const MAX_SAFE_INTEGER: u64 = 1 << 53;

fn emit_number(n: &Number, output: &mut String) {
    if let Some(u) = n.as_u64() {
        if u <= MAX_SAFE_INTEGER {
            let _ = write!(output, "{}", u);
            return;
        }
    } else if let Some(i) = n.as_i64() {
        if i.unsigned_abs() <= MAX_SAFE_INTEGER {
            let _ = write!(output, "{}", i);
            return;
        }
    }
    // Wider integers and all fractions go through their double value.
    let value = n.as_f64().unwrap_or(0.0);
    output.push_str(&format_es_number(value));
}

/// Format a finite double the way ECMAScript `Number.prototype.toString` does.
#[must_use]
pub fn format_es_number(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        // serde_json never yields non-finite numbers; -0 prints as 0.
        return "0".to_string();
    }
    if value < 0.0 {
        return format!("-{}", format_es_number(-value));
    }

    // `{:e}` gives the shortest round-tripping digits, e.g. "1.2345e-7".
    let sci = format!("{:e}", value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let k = digits.len() as i32;
    let n = exponent + 1;

    if k <= n && n <= 21 {
        let mut out = digits;
        out.extend(std::iter::repeat_n('0', (n - k) as usize));
        out
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{}.{}", int, frac)
    } else if -6 < n && n <= 0 {
        format!("0.{}{}", "0".repeat((-n) as usize), digits)
    } else {
        let e = n - 1;
        let sign = if e < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{}e{}{}", first, sign, e.abs())
        } else {
            format!("{}.{}e{}{}", first, rest, sign, e.abs())
        }
    }
}
