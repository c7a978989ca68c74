//! Template expansion for config file text.
//!
//! Config files are expanded before they are decoded. Actions are written
//! between `{{` and `}}`:
//!
//! - `{{env "VAR"}}` - value of `VAR`, empty when unset
//! - `{{env "VAR" "default"}}` - value of `VAR`, or `default` when unset or empty
//! - `{{.VAR | default "fallback"}}` - same, reading `VAR` as a field
//! - `{{coalesce .VAR1 .VAR2 "default"}}` - first non-empty argument
//! - `{{/* comment */}}` - expands to nothing
//!
//! `{{- ` and ` -}}` trim the whitespace before and after an action. A
//! pipeline passes the result of each command as the last argument of the
//! next. Anything outside this language is a syntax error: broken actions
//! never reach the decoder.
//!
//! ```
//! let out = cfgm::template::expand_with(
//!     r#"url: {{coalesce .CFGM_DOC_A .CFGM_DOC_B "z"}}"#,
//!     |_| None,
//! )
//! .unwrap();
//! assert_eq!(out, "url: z");
//! ```

use crate::env::read_var;
use crate::error::{ConfigError, Result};
use tracing::debug;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Expand `raw` against the process environment; returns it unchanged when
/// `enabled` is false.
pub fn expand(raw: &str, enabled: bool) -> Result<String> {
    if !enabled {
        return Ok(raw.to_string());
    }
    expand_with(raw, read_var)
}

/// Expand `raw`, resolving variables through `lookup`.
pub fn expand_with<F>(raw: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut consumed = 0;
    let mut referenced: Vec<String> = Vec::new();

    while let Some(start) = rest.find(OPEN) {
        let line = line_of(raw, consumed + start);
        let (text, after_open) = rest.split_at(start);
        let after_open = &after_open[OPEN.len()..];

        let trim_left = starts_with_trim_marker(after_open);
        if trim_left {
            out.push_str(text.trim_end());
        } else {
            out.push_str(text);
        }

        let Some(body_len) = find_close(after_open) else {
            return Err(ConfigError::template(
                snippet(&rest[start..]),
                line,
                "unterminated action",
            ));
        };
        let body = &after_open[..body_len];
        let action = &rest[start..start + OPEN.len() + body_len + CLOSE.len()];

        let mut inner = body;
        if trim_left {
            inner = &inner[1..];
        }
        let trim_right = ends_with_trim_marker(inner);
        if trim_right {
            inner = &inner[..inner.len() - 1];
        }

        let value = evaluate(inner, &lookup, &mut referenced)
            .map_err(|reason| ConfigError::template(action, line, reason))?;
        out.push_str(&value);

        let advance = start + OPEN.len() + body_len + CLOSE.len();
        consumed += advance;
        rest = &rest[advance..];
        if trim_right {
            let trimmed = rest.trim_start();
            consumed += rest.len() - trimmed.len();
            rest = trimmed;
        }
    }
    out.push_str(rest);

    if !referenced.is_empty() {
        referenced.sort();
        referenced.dedup();
        debug!(variables = %referenced.join(", "), "expanded config template");
    }
    Ok(out)
}

fn starts_with_trim_marker(body: &str) -> bool {
    let mut chars = body.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

fn ends_with_trim_marker(body: &str) -> bool {
    let mut chars = body.chars().rev();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// Length of the action body before its closing `}}`, skipping over string
/// literals and comments that may themselves contain `}}`.
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = body[i + 2..].find("*/")?;
                i += 2 + end + 1;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

fn snippet(text: &str) -> String {
    let line = text.lines().next().unwrap_or(text);
    match line.char_indices().nth(60) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Quoted or raw string literal.
    Str(String),
    /// `.NAME`, an environment variable.
    Field(String),
    /// Function name.
    Ident(String),
    Pipe,
}

fn evaluate<F>(
    body: &str,
    lookup: &F,
    referenced: &mut Vec<String>,
) -> std::result::Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let trimmed = body.trim();
    if let Some(comment) = trimmed.strip_prefix("/*") {
        return match comment.strip_suffix("*/") {
            Some(_) => Ok(String::new()),
            None => Err("comment must fill the whole action".to_string()),
        };
    }

    let tokens = tokenize(trimmed)?;
    if tokens.is_empty() {
        return Err("missing value for command".to_string());
    }

    let mut piped: Option<String> = None;
    for command in tokens.split(|t| *t == Token::Pipe) {
        if command.is_empty() {
            return Err("missing command in pipeline".to_string());
        }
        piped = Some(run_command(command, piped, lookup, referenced)?);
    }
    Ok(piped.unwrap_or_default())
}

fn run_command<F>(
    command: &[Token],
    piped: Option<String>,
    lookup: &F,
    referenced: &mut Vec<String>,
) -> std::result::Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let (head, args) = command
        .split_first()
        .ok_or_else(|| "missing command".to_string())?;

    let Token::Ident(function) = head else {
        if !args.is_empty() || piped.is_some() {
            return Err("can't give argument to non-function".to_string());
        }
        return argument(head, lookup, referenced);
    };

    let mut values = args
        .iter()
        .map(|arg| argument(arg, lookup, referenced))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    values.extend(piped);

    match function.as_str() {
        "env" => match values.as_slice() {
            [name] => {
                referenced.push(name.clone());
                Ok(lookup(name).unwrap_or_default())
            }
            [name, default] => {
                referenced.push(name.clone());
                Ok(lookup(name)
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| default.clone()))
            }
            _ => Err(format!(
                "wrong number of args for env: want 1 or 2, got {}",
                values.len()
            )),
        },
        "default" => match values.as_slice() {
            [fallback, value] => Ok(if value.is_empty() {
                fallback.clone()
            } else {
                value.clone()
            }),
            _ => Err(format!(
                "wrong number of args for default: want 2, got {}",
                values.len()
            )),
        },
        "coalesce" => {
            if values.is_empty() {
                return Err("wrong number of args for coalesce: want at least 1, got 0".to_string());
            }
            Ok(values.into_iter().find(|v| !v.is_empty()).unwrap_or_default())
        }
        other => Err(format!("function \"{other}\" not defined")),
    }
}

fn argument<F>(
    token: &Token,
    lookup: &F,
    referenced: &mut Vec<String>,
) -> std::result::Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    match token {
        Token::Str(s) => Ok(s.clone()),
        Token::Field(name) => {
            referenced.push(name.clone());
            Ok(lookup(name).unwrap_or_default())
        }
        Token::Ident(name) => Err(format!("function \"{name}\" can only be used as a command")),
        Token::Pipe => Err("unexpected \"|\"".to_string()),
    }
}

fn tokenize(body: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(idx, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, '"')) => value.push('"'),
                            Some((_, '\\')) => value.push('\\'),
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, 'r')) => value.push('\r'),
                            Some((_, other)) => {
                                return Err(format!("unknown escape sequence \\{other}"));
                            }
                            None => return Err("unterminated quoted string".to_string()),
                        },
                        Some((_, other)) => value.push(other),
                        None => return Err("unterminated quoted string".to_string()),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '`' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '`')) => break,
                        Some((_, other)) => value.push(other),
                        None => return Err("unterminated raw quoted string".to_string()),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '.' => {
                chars.next();
                let name = take_ident(&mut chars);
                if name.is_empty() {
                    return Err("bare \".\" is not supported, name a variable".to_string());
                }
                tokens.push(Token::Field(name));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                tokens.push(Token::Ident(take_ident(&mut chars)));
            }
            other => {
                return Err(format!("unexpected {other:?} at offset {idx}"));
            }
        }
    }
    Ok(tokens)
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}
