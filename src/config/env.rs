//! Environment variable references in configuration strings

use log::debug;
use toml::Value;

/// Replace `$NAME` and `${NAME}` references in `text`
///
/// Names consist of ASCII letters, digits and underscores. A variable that
/// `lookup` cannot resolve becomes the empty string. A `$` that does not start
/// a reference, or a `${` without closing brace, is kept literally. The
/// inserted values are never scanned again.
pub fn expand_env<F>(text: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) if is_name(&braced[..end]) => (&braced[..end], end + 2),
                _ => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !is_name_char(c))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if name.is_empty() || consumed == 0 {
            out.push('$');
            rest = after;
            continue;
        }

        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => debug!("Environment variable '{}' is not set", name),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

/// Expand references in every string inside `value`, recursively
///
/// Table keys and non-string scalars are left untouched.
pub fn expand_value<F>(value: &mut Value, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = expand_env(s, lookup);
            }
        }
        Value::Array(items) => {
            for item in items {
                expand_value(item, lookup);
            }
        }
        Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                expand_value(item, lookup);
            }
        }
        _ => {}
    }
}

/// Lookup backed by the process environment
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}
