//! Path template parsing and URL resolution.
//!
//! Templates use `{name}` placeholders, matched case-sensitively against the
//! names of path-bound parameters. There is no escaping and braces cannot
//! nest.

use crate::descriptor::MethodDescriptor;
use crate::metadata::BindingKind;
use crate::request::Argument;
use serde_json::Value;

/// A malformed path template.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{` without a matching `}`.
    #[error("unclosed '{{' at byte {0} of the URL path")]
    Unclosed(usize),

    /// A `{` inside a placeholder.
    #[error("nested '{{' at byte {0} of the URL path")]
    Nested(usize),

    /// A `}` outside a placeholder.
    #[error("unmatched '}}' at byte {0} of the URL path")]
    UnmatchedClose(usize),

    /// `{}` with no name.
    #[error("empty placeholder at byte {0} of the URL path")]
    Empty(usize),
}

/// Arguments that cannot be bound into a URL.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The number of arguments does not match the declared parameters.
    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount {
        /// Declared parameters.
        expected: usize,
        /// Supplied arguments.
        found: usize,
    },

    /// A path substitution value was null.
    #[error("path parameter \"{0}\" value must not be null")]
    NullPathValue(String),

    /// A pre-encoded body was supplied where a plain value was expected.
    #[error("{kind} parameter \"{name}\" cannot take a pre-encoded body")]
    EncodedValue {
        /// The parameter name.
        name: String,
        /// The parameter kind.
        kind: BindingKind,
    },

    /// The template names a placeholder with no path parameter.
    #[error("URL placeholder {{{0}}} has no matching path parameter")]
    UnboundPlaceholder(String),

    /// The template is malformed.
    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn segments(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut open: Option<usize> = None;

    for (i, c) in template.char_indices() {
        match (c, open) {
            ('{', None) => {
                if literal_start < i {
                    segments.push(Segment::Literal(&template[literal_start..i]));
                }
                open = Some(i);
            }
            ('{', Some(_)) => return Err(TemplateError::Nested(i)),
            ('}', None) => return Err(TemplateError::UnmatchedClose(i)),
            ('}', Some(start)) => {
                let name = &template[start + 1..i];
                if name.is_empty() {
                    return Err(TemplateError::Empty(start));
                }
                segments.push(Segment::Placeholder(name));
                open = None;
                literal_start = i + 1;
            }
            _ => {}
        }
    }

    if let Some(start) = open {
        return Err(TemplateError::Unclosed(start));
    }
    if literal_start < template.len() {
        segments.push(Segment::Literal(&template[literal_start..]));
    }
    Ok(segments)
}

/// Returns the placeholder names of `template`, in order of appearance.
///
/// # Errors
///
/// Returns a [`TemplateError`] for unbalanced, nested or empty braces.
///
/// # Examples
///
/// ```
/// use restbind::resolver::placeholders;
///
/// assert_eq!(placeholders("/repos/{owner}/{repo}").unwrap(), vec!["owner", "repo"]);
/// assert!(placeholders("/repos/{owner").is_err());
/// ```
pub fn placeholders(template: &str) -> Result<Vec<&str>, TemplateError> {
    Ok(segments(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Resolves the full URL of one invocation.
///
/// Literal template text is copied verbatim and each placeholder is replaced
/// by its URL-encoded argument. For verbs without a body, query-bound
/// parameters are then appended in declaration order: null values are
/// skipped and arrays contribute one pair per element. Encoded query
/// parameters are appended without further encoding.
///
/// # Errors
///
/// Returns a [`ResolveError`] if the arguments do not fit the parameters or a
/// path value is null.
pub fn resolve(
    base_url: &str,
    descriptor: &MethodDescriptor,
    args: &[Argument],
) -> Result<String, ResolveError> {
    let params = descriptor.parameters();
    if params.len() != args.len() {
        return Err(ResolveError::ArgumentCount {
            expected: params.len(),
            found: args.len(),
        });
    }

    let template = descriptor.path_template();
    let base = if template.starts_with('/') {
        base_url.trim_end_matches('/')
    } else {
        base_url
    };

    let mut url = String::with_capacity(base.len() + template.len());
    url.push_str(base);

    let mut consumed = vec![false; params.len()];
    for segment in segments(template)? {
        match segment {
            Segment::Literal(text) => url.push_str(text),
            Segment::Placeholder(name) => {
                let index = params
                    .iter()
                    .position(|p| p.kind == BindingKind::PathSubstitution && p.name == name)
                    .ok_or_else(|| ResolveError::UnboundPlaceholder(name.to_string()))?;
                let value = plain_value(name, BindingKind::PathSubstitution, &args[index])?;
                let text = path_text(value)
                    .ok_or_else(|| ResolveError::NullPathValue(name.to_string()))?;
                url.push_str(&encode_path(&text));
                consumed[index] = true;
            }
        }
    }

    if descriptor.has_body() {
        return Ok(url);
    }

    let mut separator = if url.contains('?') { '&' } else { '?' };
    for (index, param) in params.iter().enumerate() {
        let encoded = match param.kind {
            BindingKind::QueryParameter => true,
            BindingKind::Raw => false,
            _ => continue,
        };
        if consumed[index] {
            continue;
        }

        let value = plain_value(&param.name, param.kind, &args[index])?;
        for text in query_texts(value) {
            url.push(separator);
            separator = '&';
            if encoded {
                url.push_str(&encode_query(&param.name));
                url.push('=');
                url.push_str(&encode_query(&text));
            } else {
                url.push_str(&param.name);
                url.push('=');
                url.push_str(&text);
            }
        }
    }

    Ok(url)
}

fn plain_value<'a>(
    name: &str,
    kind: BindingKind,
    arg: &'a Argument,
) -> Result<&'a Value, ResolveError> {
    arg.as_value().ok_or_else(|| ResolveError::EncodedValue {
        name: name.to_string(),
        kind,
    })
}

/// The text form of a scalar value. `None` for null.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Arrays are joined with `,`; null elements are dropped.
fn path_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => value_text(other),
    }
}

/// One entry per non-null value; arrays are flattened one level.
pub(crate) fn query_texts(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        other => value_text(other).into_iter().collect(),
    }
}

fn encode_query(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

fn encode_path(text: &str) -> String {
    encode_query(text).replace('+', "%20")
}
