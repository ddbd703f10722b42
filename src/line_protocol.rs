//! Line protocol serialization
//!
//! Renders a [`Metric`] as a single text line of the form
//! `measurement[,tag=value...] field=value[,field=value...] timestamp`
//! and parses such lines back. The timestamp is always written in
//! nanoseconds since the Unix epoch.

use crate::error::LineProtocolError;
use crate::metric::{FieldValue, Fields, Metric, Tags, Timestamp};
use chrono::DateTime;
use std::fmt::Write as _;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Characters escaped with a backslash in measurement names (backslash itself
/// is always escaped)
const MEASUREMENT_SPECIALS: &[char] = &[',', ' '];

/// Characters escaped with a backslash in tag keys, tag values and field keys
const KEY_SPECIALS: &[char] = &[',', '=', ' '];

/// Render a metric as one line of line protocol, without a trailing newline
///
/// Tags with an empty key or value are omitted and non-finite float fields
/// are skipped, since neither can be represented.
///
/// # Errors
///
/// Returns `LineProtocolError::NoSerializableFields` if every field was
/// skipped and `LineProtocolError::TimestampOutOfRange` if the timestamp does
/// not fit into signed 64-bit nanoseconds.
pub fn render(metric: &Metric) -> Result<String, LineProtocolError> {
    let mut line = String::with_capacity(64);
    escape_into(&mut line, metric.name(), MEASUREMENT_SPECIALS);

    for (key, value) in metric.tags() {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        escape_into(&mut line, key, KEY_SPECIALS);
        line.push('=');
        escape_into(&mut line, value, KEY_SPECIALS);
    }

    line.push(' ');
    let mut wrote_field = false;
    for (key, value) in metric.fields() {
        if let FieldValue::Float(f) = value {
            if !f.is_finite() {
                continue;
            }
        }
        if wrote_field {
            line.push(',');
        }
        escape_into(&mut line, key, KEY_SPECIALS);
        line.push('=');
        render_value(&mut line, value);
        wrote_field = true;
    }

    if !wrote_field {
        return Err(LineProtocolError::NoSerializableFields(
            metric.name().to_string(),
        ));
    }

    let nanos = metric
        .timestamp()
        .timestamp_nanos_opt()
        .ok_or_else(|| LineProtocolError::TimestampOutOfRange(metric.name().to_string()))?;
    // Writing into a String cannot fail
    let _ = write!(line, " {}", nanos);

    Ok(line)
}

fn render_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Float(f) => {
            let _ = write!(out, "{}", f);
        }
        FieldValue::Integer(i) => {
            let _ = write!(out, "{}i", i);
        }
        FieldValue::UInteger(u) => {
            let _ = write!(out, "{}u", u);
        }
        FieldValue::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        FieldValue::String(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    c => out.push(c),
                }
            }
            out.push('"');
        }
    }
}

fn escape_into(out: &mut String, s: &str, specials: &[char]) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            c if specials.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

/// Parse one line of line protocol back into a metric
///
/// A trailing newline is ignored. Lines without a timestamp are rejected,
/// because every line this crate writes carries one.
pub fn parse(line: &str) -> Result<Metric, LineProtocolError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let mut parser = LineParser::new(line);

    let name = parser.read_escaped(MEASUREMENT_SPECIALS);
    if name.is_empty() {
        return Err(parser.error("missing measurement"));
    }

    let mut tags = Tags::new();
    while parser.eat(',') {
        let key = parser.read_escaped(KEY_SPECIALS);
        if !parser.eat('=') {
            return Err(parser.error("expected '=' after tag key"));
        }
        let value = parser.read_escaped(KEY_SPECIALS);
        tags.insert(key, value);
    }

    if !parser.eat(' ') {
        return Err(parser.error("expected space before fields"));
    }

    let mut fields = Fields::new();
    loop {
        let key = parser.read_escaped(KEY_SPECIALS);
        if key.is_empty() {
            return Err(parser.error("empty field key"));
        }
        if !parser.eat('=') {
            return Err(parser.error("expected '=' after field key"));
        }
        let value = if parser.peek() == Some('"') {
            FieldValue::String(parser.read_quoted()?)
        } else {
            let raw = parser.read_raw();
            parse_scalar(&raw).ok_or_else(|| parser.error("invalid field value"))?
        };
        fields.insert(key, value);

        if !parser.eat(',') {
            break;
        }
    }

    if !parser.eat(' ') {
        return Err(parser.error("missing timestamp"));
    }
    let rest = parser.rest();
    let nanos: i64 = rest
        .trim()
        .parse()
        .map_err(|_| parser.error("invalid timestamp"))?;
    let timestamp = timestamp_from_nanos(nanos)
        .ok_or_else(|| parser.error("timestamp out of range"))?;

    Metric::new(name, fields, tags, timestamp)
        .map_err(|e| LineProtocolError::ParseError(e.to_string()))
}

fn timestamp_from_nanos(nanos: i64) -> Option<Timestamp> {
    let secs = nanos.div_euclid(NANOS_PER_SECOND);
    let subsec = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
    DateTime::from_timestamp(secs, subsec)
}

fn parse_scalar(raw: &str) -> Option<FieldValue> {
    if let Some(int) = raw.strip_suffix('i') {
        return int.parse().ok().map(FieldValue::Integer);
    }
    if let Some(uint) = raw.strip_suffix('u') {
        return uint.parse().ok().map(FieldValue::UInteger);
    }
    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => Some(FieldValue::Boolean(true)),
        "f" | "F" | "false" | "False" | "FALSE" => Some(FieldValue::Boolean(false)),
        _ => raw.parse().ok().map(FieldValue::Float),
    }
}

struct LineParser<'a> {
    line: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> LineParser<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            line,
            chars: line.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn rest(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    fn error(&self, message: &str) -> LineProtocolError {
        LineProtocolError::ParseError(format!(
            "{} at column {} in '{}'",
            message, self.pos, self.line
        ))
    }

    /// Read until an unescaped stop character, resolving backslash escapes
    fn read_escaped(&mut self, stops: &[char]) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                let unescaped = match self.chars.get(self.pos + 1).copied() {
                    Some('\\') => Some('\\'),
                    Some('t') => Some('\t'),
                    Some('n') => Some('\n'),
                    Some('r') => Some('\r'),
                    Some('f') => Some('\x0c'),
                    Some(next) if KEY_SPECIALS.contains(&next) => Some(next),
                    _ => None,
                };
                match unescaped {
                    Some(u) => {
                        out.push(u);
                        self.pos += 2;
                    }
                    None => {
                        out.push('\\');
                        self.pos += 1;
                    }
                }
                continue;
            }
            if stops.contains(&c) {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }

    /// Read an unquoted field value up to the next ',' or ' '
    fn read_raw(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == ',' || c == ' ' {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }

    fn read_quoted(&mut self) -> Result<String, LineProtocolError> {
        // opening quote
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string field")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    match self.chars.get(self.pos + 1).copied() {
                        Some('\\') => out.push('\\'),
                        Some('"') => out.push('"'),
                        Some('n') => out.push('\n'),
                        Some('r') => out.push('\r'),
                        Some(other) => {
                            out.push('\\');
                            out.push(other);
                        }
                        None => return Err(self.error("unterminated string field")),
                    }
                    self.pos += 2;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}
