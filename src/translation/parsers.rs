pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

/// Detect `q'<delim>` / `Q'<delim>` at `idx`, returning the closing delimiter and the offset of
/// the opening delimiter.
pub(super) fn try_start_alt_quote(bytes: &[u8], idx: usize) -> Option<(u8, usize)> {
    if !matches!(bytes.get(idx), Some(b'q' | b'Q')) || bytes.get(idx + 1) != Some(&b'\'') {
        return None;
    }
    // `q` must start a token, not end an identifier such as `seq'`
    if idx > 0 && (bytes[idx - 1].is_ascii_alphanumeric() || bytes[idx - 1] == b'_') {
        return None;
    }
    let open = *bytes.get(idx + 2)?;
    let close = match open {
        b'[' => b']',
        b'{' => b'}',
        b'(' => b')',
        b'<' => b'>',
        b' ' | b'\t' | b'\n' | b'\r' => return None,
        other => other,
    };
    Some((close, idx + 2))
}

pub(super) fn is_alt_quote_end(bytes: &[u8], idx: usize, close: u8) -> bool {
    bytes.get(idx) == Some(&close) && bytes.get(idx + 1) == Some(&b'\'')
}
