//! Turn a stored query's `?` placeholders plus a bound argument list into
//! the literal SQL the client actually executed (spec.md §4.4, "SQL
//! rewrite").

use crate::prepared::ArgSlot;
use crate::protocol::value::ArgValue;

/// Find the byte offsets of every placeholder `?` that is NOT inside a
/// quoted string/identifier or a comment (spec.md: "Implementations must
/// scan the query text as SQL, tracking single-quoted, double-quoted, and
/// backtick-quoted regions and `-- …`, `# …`, `/* … */` comments").
pub fn placeholder_offsets(query: &[u8]) -> Vec<usize> {
    #[derive(PartialEq)]
    enum State {
        Normal,
        Single,
        Double,
        Backtick,
        LineComment,
        BlockComment,
    }

    let mut state = State::Normal;
    let mut offsets = Vec::new();
    let mut i = 0;
    while i < query.len() {
        let b = query[i];
        match state {
            State::Normal => match b {
                b'\'' => state = State::Single,
                b'"' => state = State::Double,
                b'`' => state = State::Backtick,
                b'-' if query.get(i + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    i += 1;
                }
                b'#' => state = State::LineComment,
                b'/' if query.get(i + 1) == Some(&b'*') => {
                    state = State::BlockComment;
                    i += 1;
                }
                b'?' => offsets.push(i),
                _ => {}
            },
            State::Single => match b {
                b'\\' => i += 1,
                b'\'' if query.get(i + 1) == Some(&b'\'') => i += 1,
                b'\'' => state = State::Normal,
                _ => {}
            },
            State::Double => match b {
                b'\\' => i += 1,
                b'"' if query.get(i + 1) == Some(&b'"') => i += 1,
                b'"' => state = State::Normal,
                _ => {}
            },
            State::Backtick => match b {
                b'`' if query.get(i + 1) == Some(&b'`') => i += 1,
                b'`' => state = State::Normal,
                _ => {}
            },
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if b == b'*' && query.get(i + 1) == Some(&b'/') {
                    state = State::Normal;
                    i += 1;
                }
            }
        }
        i += 1;
    }
    offsets
}

/// Render one argument slot's literal form (spec.md §4.4's rendering
/// list), or `Err` with a human-readable reason when the value can't be
/// expressed as a MySQL literal (non-finite floats only, currently).
pub fn render_slot(slot: &ArgSlot) -> Result<String, String> {
    match slot {
        ArgSlot::Unset => {
            tracing::warn!("rendering unset parameter slot as NULL");
            Ok("NULL".to_string())
        }
        ArgSlot::Bound(value) => render_value(value),
        ArgSlot::Errored(reason) => Err(reason.clone()),
    }
}

fn render_value(value: &ArgValue) -> Result<String, String> {
    match value {
        ArgValue::Null => Ok("NULL".to_string()),
        ArgValue::SignedInt(v) => Ok(v.to_string()),
        ArgValue::UnsignedInt(v) => Ok(v.to_string()),
        ArgValue::Float(v) => render_float(*v as f64, v.is_finite()),
        ArgValue::Double(v) => render_float(*v, v.is_finite()),
        ArgValue::Decimal(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ArgValue::Bytes(bytes) => Ok(quote_bytes(bytes)),
        ArgValue::Date { year, month, day } => Ok(format!("'{year:04}-{month:02}-{day:02}'")),
        ArgValue::DateTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
            microsecond,
        } => Ok(render_datetime(*year, *month, *day, *hour, *minute, *second, *microsecond)),
        ArgValue::Time {
            is_negative,
            days,
            hour,
            minute,
            second,
            microsecond,
        } => Ok(render_time(*is_negative, *days, *hour, *minute, *second, *microsecond)),
    }
}

fn render_float(v: f64, finite: bool) -> Result<String, String> {
    if !finite {
        return Err(format!("non-finite float value {v}"));
    }
    Ok(format!("{v}"))
}

fn render_datetime(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8, microsecond: u32) -> String {
    if microsecond == 0 {
        format!("'{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}'")
    } else {
        format!("'{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{microsecond:06}'")
    }
}

fn render_time(is_negative: bool, days: u32, hour: u8, minute: u8, second: u8, microsecond: u32) -> String {
    let sign = if is_negative { "-" } else { "" };
    let total_hours = days as u64 * 24 + hour as u64;
    if microsecond == 0 {
        format!("'{sign}{total_hours:02}:{minute:02}:{second:02}'")
    } else {
        format!("'{sign}{total_hours:02}:{minute:02}:{second:02}.{microsecond:06}'")
    }
}

/// Quote and backslash-escape a byte string literal (spec.md: "`'…'` with
/// backslash-escaping of `'`, `\`, NUL, newline, carriage return, and
/// Ctrl-Z; UTF-8 is preserved as raw bytes"). Lossy UTF-8 is used only to
/// build a printable `String`; the escaped bytes themselves are untouched.
fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('\'');
    for &b in bytes {
        match b {
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            0x00 => out.push_str("\\0"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x1A => out.push_str("\\Z"),
            _ => out.push(b as char),
        }
    }
    out.push('\'');
    out
}

/// Substitute every non-quoted/non-comment `?` in `query` with the
/// rendered form of the corresponding argument slot, left to right
/// (spec.md §4.4, property 4 in §8: "the number of literals inserted...
/// equals the number of `?` placeholders outside strings/comments").
/// Extra slots beyond the placeholder count are ignored; a placeholder
/// with no corresponding slot is left as a bare `?` (malformed traffic,
/// not expected in practice).
pub fn rewrite_query(query: &[u8], args: &[ArgSlot]) -> String {
    let offsets = placeholder_offsets(query);
    let mut out = String::with_capacity(query.len());
    let mut last = 0;
    for (slot_idx, &offset) in offsets.iter().enumerate() {
        out.push_str(&String::from_utf8_lossy(&query[last..offset]));
        match args.get(slot_idx) {
            Some(slot) => match render_slot(slot) {
                Ok(rendered) => out.push_str(&rendered),
                Err(reason) => out.push_str(&format!("/* bind error: {reason} */")),
            },
            None => out.push('?'),
        }
        last = offset + 1;
    }
    out.push_str(&String::from_utf8_lossy(&query[last..]));
    out
}
