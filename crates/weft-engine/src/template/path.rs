//! Reference path parsing and traversal.
//!
//! A reference body is `scope.path` where `path` is a dotted sequence of
//! parts; each part is a bare identifier optionally followed by `[N]`
//! indices, or (past the first part) pure `[N]` indices. Dots inside
//! brackets are literal.

use weft_kernel::{TemplateError, Value};

/// One dotted segment of a reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPart {
    /// Leading identifier, absent for pure-index parts.
    pub key: Option<String>,
    /// `[N]` indices applied in order after the key lookup.
    pub indices: Vec<usize>,
}

/// Split a path on `.`, honoring brackets: `.` inside `[…]` is literal.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for ch in path.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            '.' if depth == 0 => {
                segments.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    segments.push(current.trim().to_string());
    segments
}

/// Parse one segment into its identifier and index list.
pub fn parse_part(segment: &str) -> Result<PathPart, TemplateError> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Err(TemplateError::InvalidPath("empty path part".to_string()));
    }

    let key_end = segment.find('[').unwrap_or(segment.len());
    let key = segment[..key_end].trim();
    let key = if key.is_empty() {
        None
    } else {
        if key.contains(']') {
            return Err(TemplateError::InvalidPath(segment.to_string()));
        }
        Some(key.to_string())
    };

    let mut indices = Vec::new();
    let mut rest = segment[key_end..].trim();
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(TemplateError::InvalidPath(segment.to_string()));
        }
        let close = rest
            .find(']')
            .ok_or_else(|| TemplateError::InvalidPath(segment.to_string()))?;
        let body = rest[1..close].trim();
        let index: usize = body
            .parse()
            .map_err(|_| TemplateError::ArrayIndexInvalid(body.to_string()))?;
        indices.push(index);
        rest = rest[close + 1..].trim();
    }

    if key.is_none() && indices.is_empty() {
        return Err(TemplateError::InvalidPath(segment.to_string()));
    }

    Ok(PathPart { key, indices })
}

/// Apply `[N]` indices to a value, descending one sequence level per index.
fn apply_indices<'a>(
    mut value: &'a Value,
    indices: &[usize],
) -> Result<&'a Value, TemplateError> {
    for &index in indices {
        match value {
            Value::List(items) => {
                value = items.get(index).ok_or(TemplateError::ArrayOutOfBounds {
                    index,
                    len: items.len(),
                })?;
            }
            other => {
                return Err(TemplateError::TypeNotSupported(format!(
                    "cannot index into {}",
                    shape_name(other)
                )));
            }
        }
    }
    Ok(value)
}

/// Walk the remaining parts (everything after the scope root) down a value.
pub fn traverse<'a>(root: &'a Value, parts: &[PathPart]) -> Result<&'a Value, TemplateError> {
    let mut value = root;
    for part in parts {
        if let Some(key) = &part.key {
            value = match value {
                Value::Map(map) => map
                    .get(key)
                    .ok_or_else(|| TemplateError::VariableNotFound(key.clone()))?,
                other => {
                    return Err(TemplateError::TypeNotSupported(format!(
                        "cannot descend into {} by key '{}'",
                        shape_name(other),
                        key
                    )));
                }
            };
        }
        value = apply_indices(value, &part.indices)?;
    }
    Ok(value)
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::List(_) => "list",
        Value::Map(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_kernel::value::map_value;

    #[test]
    fn split_respects_brackets() {
        assert_eq!(split_path("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("users[0].name"), vec!["users[0]", "name"]);
        // A dot inside brackets is literal (no split).
        assert_eq!(split_path("a[1.5].b"), vec!["a[1.5]", "b"]);
        // Whitespace around dot boundaries is trimmed.
        assert_eq!(split_path("a . b"), vec!["a", "b"]);
    }

    #[test]
    fn parse_ident_with_indices() {
        let part = parse_part("users[0][2]").unwrap();
        assert_eq!(part.key.as_deref(), Some("users"));
        assert_eq!(part.indices, vec![0, 2]);

        let part = parse_part("name").unwrap();
        assert_eq!(part.key.as_deref(), Some("name"));
        assert!(part.indices.is_empty());
    }

    #[test]
    fn parse_pure_index_part() {
        let part = parse_part("[3]").unwrap();
        assert_eq!(part.key, None);
        assert_eq!(part.indices, vec![3]);
    }

    #[test]
    fn parse_allows_whitespace_in_brackets() {
        let part = parse_part("items[ 1 ]").unwrap();
        assert_eq!(part.indices, vec![1]);
    }

    #[test]
    fn parse_rejects_bad_segments() {
        assert!(matches!(
            parse_part(""),
            Err(TemplateError::InvalidPath(_))
        ));
        assert!(matches!(
            parse_part("a[x]"),
            Err(TemplateError::ArrayIndexInvalid(_))
        ));
        assert!(matches!(
            parse_part("a[-1]"),
            Err(TemplateError::ArrayIndexInvalid(_))
        ));
        assert!(matches!(
            parse_part("a[1"),
            Err(TemplateError::InvalidPath(_))
        ));
        assert!(matches!(
            parse_part("a]b"),
            Err(TemplateError::InvalidPath(_))
        ));
    }

    #[test]
    fn traverse_nested_maps_and_lists() {
        let value = map_value([(
            "data",
            map_value([(
                "users",
                Value::List(vec![
                    map_value([("id", Value::Int(1))]),
                    map_value([("id", Value::Int(2))]),
                ]),
            )]),
        )]);

        let parts = vec![
            parse_part("data").unwrap(),
            parse_part("users[1]").unwrap(),
            parse_part("id").unwrap(),
        ];
        assert_eq!(traverse(&value, &parts).unwrap().as_i64(), Some(2));
    }

    #[test]
    fn traverse_out_of_bounds() {
        let value = map_value([("items", Value::List(vec![Value::Int(1)]))]);
        let parts = vec![parse_part("items[5]").unwrap()];
        assert_eq!(
            traverse(&value, &parts),
            Err(TemplateError::ArrayOutOfBounds { index: 5, len: 1 })
        );
    }

    #[test]
    fn traverse_wrong_shapes() {
        let value = map_value([("n", Value::Int(1))]);
        let parts = vec![parse_part("n[0]").unwrap()];
        assert!(matches!(
            traverse(&value, &parts),
            Err(TemplateError::TypeNotSupported(_))
        ));

        let parts = vec![parse_part("n").unwrap(), parse_part("x").unwrap()];
        assert!(matches!(
            traverse(&value, &parts),
            Err(TemplateError::TypeNotSupported(_))
        ));
    }

    #[test]
    fn traverse_missing_key() {
        let value = map_value([("a", Value::Int(1))]);
        let parts = vec![parse_part("b").unwrap()];
        assert!(matches!(
            traverse(&value, &parts),
            Err(TemplateError::VariableNotFound(_))
        ));
    }
}
