// ABOUTME: Canonical string forms used for symbol names, macro arguments,
// ABOUTME: and free text (spec.md §4.2). Grounded on `canonical.h`/`.cpp`.

use crate::cursor::{Cursor, ScanMode};

/// Canonical form of a free-text span: internal whitespace/comment runs
/// collapse to a single space, leading/trailing greyspace is dropped.
pub fn canonical_text(cxx: bool, text: &str) -> String {
    let buf = text.as_bytes();
    let mut cur = Cursor::new(cxx, buf, 0);
    cur.scan(ScanMode::Greyspace);
    if !cur.in_range() {
        return String::new();
    }

    let mut out = String::new();
    loop {
        let start = cur.position();
        cur.scan(ScanMode::Punctuation);
        if cur.position() == start {
            cur.on(1);
        }
        out.push_str(cur.text(start, cur.position()));
        if !cur.in_range() {
            break;
        }
        let mark = cur.position();
        cur.scan(ScanMode::Greyspace);
        if cur.position() != mark {
            out.push(' ');
        }
        if !cur.in_range() {
            break;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Canonical form of a macro argument: whitespace collapses to a single
/// space between non-punctuation tokens, but commas/parens are tracked so
/// that the canonicaliser can be driven to the argument-list splitter's
/// stop point (top-level `,` or the matching closing `)`).
pub fn canonical_argument(cxx: bool, text: &str) -> String {
    let buf = text.as_bytes();
    let mut cur = Cursor::new(cxx, buf, 0);
    let mut out = String::new();
    let mut paren_balance: i32 = 0;

    loop {
        cur.scan(ScanMode::CComment);
        if !cur.in_range() {
            break;
        }
        let c = cur.current_char();
        if c == b'(' {
            paren_balance += 1;
            out.push('(');
            cur.on(1);
            continue;
        }
        if c == b')' {
            paren_balance -= 1;
            if paren_balance < 0 {
                break;
            }
            out.push(')');
            cur.on(1);
            continue;
        }
        if c == b',' {
            if paren_balance <= 0 {
                break;
            }
            out.push(',');
            cur.on(1);
            continue;
        }
        if !c.is_ascii_whitespace() {
            out.push(c as char);
            cur.on(1);
            continue;
        }
        if let Some(&last) = out.as_bytes().last() {
            if !last.is_ascii_whitespace() && (last == b'#' || !last.is_ascii_punctuation()) {
                out.push(' ');
            }
        }
        cur.on(1);
    }
    out
}

/// Canonical form of a symbol name: a single C identifier, stopping at
/// the first character that isn't identifier-valid.
pub fn canonical_symbol(text: &str) -> String {
    let buf = text.as_bytes();
    let mut cur = Cursor::new(true, buf, 0);
    cur.scan(ScanMode::Continuation);
    if !cur.in_range() {
        return String::new();
    }
    if !(cur.current_char().is_ascii_alphabetic() || cur.current_char() == b'_') {
        return String::new();
    }
    let start = cur.position();
    cur.on(1);
    loop {
        cur.scan(ScanMode::Continuation);
        if cur.in_range()
            && (cur.current_char().is_ascii_alphanumeric() || cur.current_char() == b'_')
        {
            cur.on(1);
        } else {
            break;
        }
    }
    cur.text(start, cur.position()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_collapses_internal_whitespace() {
        assert_eq!(canonical_text(true, "  foo   bar  "), "foo bar");
    }

    #[test]
    fn text_collapses_comments_to_single_space() {
        assert_eq!(canonical_text(true, "foo/* c */bar"), "foo bar");
    }

    #[test]
    fn text_of_empty_greyspace_is_empty() {
        assert_eq!(canonical_text(true, "   "), "");
    }

    #[test]
    fn argument_stops_at_top_level_comma() {
        assert_eq!(canonical_argument(true, "a, b"), "a");
    }

    #[test]
    fn argument_keeps_comma_inside_parens() {
        assert_eq!(canonical_argument(true, "f(a, b), c"), "f(a, b)");
    }

    #[test]
    fn argument_collapses_whitespace_around_identifiers() {
        assert_eq!(canonical_argument(true, "a   +   b"), "a + b");
    }

    #[test]
    fn symbol_takes_leading_identifier_only() {
        assert_eq!(canonical_symbol("foo_bar(x)"), "foo_bar");
    }

    #[test]
    fn symbol_rejects_leading_digit() {
        assert_eq!(canonical_symbol("2foo"), "");
    }
}
