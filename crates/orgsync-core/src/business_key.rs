//! Business-key path escaping.
//!
//! The catalog addresses collections by a slash-joined path of labels. A
//! label that itself contains `/` or `.` is wrapped in double quotes, and any
//! `"` inside a label is doubled before wrapping. [`split_path`] inverts
//! [`join_path`] exactly, so paths built here can be decoded from catalog
//! output and vice versa.

use crate::error::{HierarchyError, HierarchyResult};

const SEPARATOR: char = '/';
const QUOTE: char = '"';

/// Escape a single label for use as one path component.
#[must_use]
pub fn escape_component(label: &str) -> String {
    if label.contains(QUOTE) {
        let doubled = label.replace('"', "\"\"");
        return format!("\"{doubled}\"");
    }
    if label.contains(SEPARATOR) || label.contains('.') {
        return format!("\"{label}\"");
    }
    label.to_string()
}

/// Join already-unescaped labels into an escaped business-key path.
pub fn join_path<I, S>(labels: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .map(|label| escape_component(label.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

/// Append one label to an escaped parent path.
#[must_use]
pub fn append_component(parent: Option<&str>, label: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}/{}", escape_component(label)),
        _ => escape_component(label),
    }
}

/// Split an escaped path into its unescaped labels.
///
/// Slashes inside a quoted span do not separate components, and `""` inside
/// a quoted span is a literal quote. An unterminated quoted span is an error.
pub fn split_path(path: &str) -> HierarchyResult<Vec<String>> {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut at_component_start = true;
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    chars.next();
                    current.push(QUOTE);
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
            continue;
        }

        match c {
            SEPARATOR => {
                components.push(std::mem::take(&mut current));
                at_component_start = true;
                continue;
            }
            QUOTE if at_component_start => in_quotes = true,
            _ => current.push(c),
        }
        at_component_start = false;
    }

    if in_quotes {
        return Err(HierarchyError::InvalidBusinessKey {
            key: path.to_string(),
            reason: "unterminated quoted component".to_string(),
        });
    }

    components.push(current);
    Ok(components)
}

/// Unescape a single component produced by [`escape_component`].
pub fn unescape_component(component: &str) -> HierarchyResult<String> {
    let mut parts = split_path(component)?;
    if parts.len() != 1 {
        return Err(HierarchyError::InvalidBusinessKey {
            key: component.to_string(),
            reason: "unquoted separator inside a single component".to_string(),
        });
    }
    Ok(parts.remove(0))
}

/// Number of components in an escaped path. `None` and `""` have depth 0.
#[must_use]
pub fn path_depth(path: Option<&str>) -> usize {
    match path {
        None | Some("") => 0,
        Some(path) => split_path(path).map_or_else(
            |_| path.split(SEPARATOR).count(),
            |components| components.len(),
        ),
    }
}

/// Last unescaped label of a path, if any.
#[must_use]
pub fn last_label(path: &str) -> Option<String> {
    split_path(path).ok().and_then(|mut c| c.pop())
}
