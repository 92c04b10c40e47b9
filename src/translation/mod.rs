//! Parameter marker scanning.
//!
//! Statements use `?` for unnamed markers and `:name` for named ones. The scanner skips quoted
//! literals, quoted identifiers, alternative-quoted literals (`q'[...]'`) and comments, and
//! ignores `::` casts and `:=` assignments.

use std::borrow::Cow;

mod parsers;
mod scanner;

use parsers::{
    is_alt_quote_end, is_block_comment_end, is_block_comment_start, is_line_comment_start,
    try_start_alt_quote,
};
use scanner::{State, scan_name};

/// One parameter marker found in SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Marker {
    start: usize,
    end: usize,
    name: Option<String>,
}

fn scan_markers(sql: &str) -> Vec<Marker> {
    let mut markers = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'q' | b'Q' => {
                    if let Some((close, open_idx)) = try_start_alt_quote(bytes, idx) {
                        state = State::AltQuoted(close);
                        idx = open_idx;
                    }
                }
                b'?' => markers.push(Marker {
                    start: idx,
                    end: idx + 1,
                    name: None,
                }),
                b':' => {
                    let is_cast = bytes.get(idx + 1) == Some(&b':')
                        || (idx > 0 && bytes[idx - 1] == b':');
                    if !is_cast && let Some((name_end, name)) = scan_name(bytes, idx + 1) {
                        markers.push(Marker {
                            start: idx,
                            end: name_end,
                            name: Some(name.to_owned()),
                        });
                        idx = name_end - 1;
                    } else if bytes.get(idx + 1) == Some(&b':') {
                        idx += 1; // skip the second colon of a cast
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    if depth == 1 {
                        state = State::Normal;
                    } else {
                        state = State::BlockComment(depth - 1);
                    }
                    idx += 1;
                }
            }
            State::AltQuoted(close) => {
                if is_alt_quote_end(bytes, idx, close) {
                    state = State::Normal;
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    markers
}

/// Parameter names in marker order; `None` for unnamed `?` markers.
///
/// A name that appears several times yields one entry per occurrence, so binding that name
/// binds every position it occupies.
#[must_use]
pub fn parse_parameter_names(sql: &str) -> Vec<Option<String>> {
    scan_markers(sql).into_iter().map(|m| m.name).collect()
}

/// Rewrite every marker as a numbered `?N` marker (1-based, in marker order), for drivers that
/// only understand positional markers.
///
/// Returns a borrowed `Cow` when the SQL has no markers.
#[must_use]
pub fn to_positional(sql: &str) -> Cow<'_, str> {
    let markers = scan_markers(sql);
    if markers.is_empty() {
        return Cow::Borrowed(sql);
    }
    let mut out = String::with_capacity(sql.len() + markers.len() * 2);
    let mut copied = 0;
    for (position, marker) in markers.iter().enumerate() {
        out.push_str(&sql[copied..marker.start]);
        out.push('?');
        out.push_str(&(position + 1).to_string());
        copied = marker.end;
    }
    out.push_str(&sql[copied..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_unnamed_markers() {
        let names = parse_parameter_names("select * from t where a = :x and b = ? and c = :x");
        assert_eq!(
            names,
            vec![Some("x".to_string()), None, Some("x".to_string())]
        );
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "select ':a', \"?\" -- :b\n/* :c ? */ from t where a = :d";
        assert_eq!(parse_parameter_names(sql), vec![Some("d".to_string())]);
    }

    #[test]
    fn skips_alternative_quoting() {
        let sql = "select q'[it's :not a marker]' from t where a = ?";
        assert_eq!(parse_parameter_names(sql), vec![None]);
    }

    #[test]
    fn ignores_casts_and_assignments() {
        let sql = "begin x := :v; select a::text from t; end;";
        assert_eq!(parse_parameter_names(sql), vec![Some("v".to_string())]);
    }

    #[test]
    fn rewrites_to_positional() {
        let sql = "insert into t(a, b, c) values(:x, ?, :x)";
        assert_eq!(to_positional(sql), "insert into t(a, b, c) values(?1, ?2, ?3)");
    }

    #[test]
    fn positional_rewrite_borrows_without_markers() {
        let sql = "select 1 from dual";
        assert!(matches!(to_positional(sql), Cow::Borrowed(_)));
    }
}
