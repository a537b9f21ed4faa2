// ABOUTME: Cursor over a character buffer with composable lexical scan modes
// ABOUTME: (spec.md §4.1). Grounded on coan's `chewer<CharSeq>` template.

use crate::diagnostic::{Diagnostic, WARN_MISSING_TERMINATOR};

/// A scan mode tag (spec.md §4.1's fixed set). Modes compose: `scan` advances
/// while *any* listed mode still makes progress, trying them left to right
/// and repeating until a full pass makes no progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Whitespace,
    Greyspace,
    Continuation,
    CxxComment,
    CComment,
    StringLiteral,
    CharacterLiteral,
    RawStringLiteral,
    HeaderName,
    Code,
    Name,
    NumberSpace,
    Punctuation,
    Stringify,
    TokenPaste,
    LiteralSpace,
}

/// Diagnostics a scan step may want to raise, surfaced to the caller instead
/// of emitted directly so the cursor stays free of sink ownership.
#[derive(Debug, Default)]
pub struct ScanDiagnostics {
    pub pending: Vec<Diagnostic>,
}

/// A cursor over a byte buffer (ASCII/UTF-8 source text is treated byte-wise,
/// matching coan's `char`-at-a-time C-locale scanning).
pub struct Cursor<'a> {
    buf: &'a [u8],
    cur: usize,
    cxx: bool,
}

impl<'a> Cursor<'a> {
    pub fn new(cxx: bool, buf: &'a [u8], off: usize) -> Self {
        Cursor { buf, cur: off, cxx }
    }

    pub fn cxx(&self) -> bool {
        self.cxx
    }

    pub fn position(&self) -> usize {
        self.cur
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.cur)
    }

    pub fn overshoot(&self, off: usize) -> bool {
        self.cur + off >= self.buf.len()
    }

    pub fn in_range(&self) -> bool {
        self.cur < self.buf.len()
    }

    pub fn current_char(&self) -> u8 {
        self.buf[self.cur]
    }

    pub fn atoff(&self, off: isize) -> u8 {
        let idx = (self.cur as isize + off) as usize;
        self.buf[idx]
    }

    /// Safe accessor used where the index may be out of range.
    pub fn get(&self, off: isize) -> Option<u8> {
        let idx = self.cur as isize + off;
        if idx < 0 {
            return None;
        }
        self.buf.get(idx as usize).copied()
    }

    pub fn on(&mut self, n: usize) {
        self.cur += n;
    }

    pub fn back(&mut self, n: usize) {
        self.cur -= n;
    }

    pub fn set(&mut self, off: usize) {
        self.cur = off;
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.buf[start..end]
    }

    pub fn text(&self, start: usize, end: usize) -> &'a str {
        std::str::from_utf8(&self.buf[start..end]).unwrap_or("")
    }

    /// Length of a newline sequence (1 for `\n`, 2 for `\r\n`) at `off`, else 0.
    fn eol(&self, off: usize) -> usize {
        let idx = self.cur + off;
        if idx >= self.buf.len() {
            return 0;
        }
        if self.buf[idx] == b'\n' {
            1
        } else if self.buf[idx] == b'\r' && idx + 1 < self.buf.len() && self.buf[idx + 1] == b'\n'
        {
            2
        } else {
            0
        }
    }

    /// Scan in a single mode, advancing while it applies. Returns diagnostics
    /// raised while scanning.
    pub fn scan(&mut self, mode: ScanMode) -> ScanDiagnostics {
        self.scan_all(&[mode])
    }

    /// Scan repeatedly trying every mode in the list until none advance the
    /// cursor in a full pass — this is coan's `consume<Mode...>` chain.
    pub fn scan_all(&mut self, modes: &[ScanMode]) -> ScanDiagnostics {
        let mut diags = ScanDiagnostics::default();
        loop {
            let mark = self.cur;
            for m in modes {
                self.consume_one(*m, &mut diags);
            }
            if self.cur == mark {
                break;
            }
        }
        diags
    }

    fn consume_continuation(&mut self) {
        loop {
            if self.cur >= self.buf.len() || self.buf[self.cur] != b'\\' {
                break;
            }
            let nl = self.eol(1);
            if nl == 0 {
                break;
            }
            self.on(nl + 1);
        }
    }

    fn consume_one(&mut self, mode: ScanMode, diags: &mut ScanDiagnostics) {
        match mode {
            ScanMode::Continuation => self.consume_continuation(),
            ScanMode::Whitespace => {
                self.consume_continuation();
                while self.in_range() && self.current_char().is_ascii_whitespace() {
                    self.cur += 1;
                    self.consume_continuation();
                }
            }
            ScanMode::NumberSpace => {
                self.consume_continuation();
                let mark = self.cur;
                if self.in_range() && self.current_char() == b'.' {
                    self.cur += 1;
                }
                if !self.in_range() || !self.current_char().is_ascii_digit() {
                    self.cur = mark;
                    return;
                }
                self.cur += 1;
                loop {
                    self.consume_continuation();
                    if !self.in_range() {
                        break;
                    }
                    let c = self.current_char();
                    if c.is_ascii_alphanumeric() || c == b'_' || c == b'+' || c == b'-' || c == b'.'
                    {
                        self.cur += 1;
                    } else {
                        break;
                    }
                }
            }
            ScanMode::Name => {
                self.consume_continuation();
                if self.in_range()
                    && (self.current_char().is_ascii_alphabetic() || self.current_char() == b'_')
                {
                    self.cur += 1;
                    loop {
                        self.consume_continuation();
                        if self.in_range()
                            && (self.current_char().is_ascii_alphanumeric()
                                || self.current_char() == b'_')
                        {
                            self.cur += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
            ScanMode::Punctuation => {
                self.consume_continuation();
                while self.in_range() {
                    let c = self.current_char();
                    let is_punct = c.is_ascii_punctuation();
                    if is_punct && c != b'_' && c != b'\'' && c != b'"' {
                        self.cur += 1;
                        self.consume_continuation();
                    } else {
                        break;
                    }
                }
            }
            ScanMode::Stringify => {
                self.consume_continuation();
                if self.in_range() && self.current_char() == b'#' {
                    self.cur += 1;
                }
            }
            ScanMode::TokenPaste => {
                let mark = self.cur;
                self.consume_continuation();
                if self.in_range() && self.current_char() == b'#' {
                    self.cur += 1;
                    self.consume_continuation();
                    if self.in_range() && self.current_char() == b'#' {
                        self.cur += 1;
                    } else {
                        self.cur = mark;
                    }
                } else {
                    self.cur = mark;
                }
            }
            ScanMode::CxxComment => {
                self.consume_continuation();
                let mark = self.cur;
                if self.in_range() && self.current_char() == b'/' {
                    self.cur += 1;
                    self.consume_continuation();
                    if !self.in_range() || self.current_char() != b'/' {
                        self.cur = mark;
                        return;
                    }
                    self.cur += 1;
                    while self.in_range() && self.current_char() != b'\n' {
                        self.cur += 1;
                        self.consume_continuation();
                    }
                }
            }
            ScanMode::CComment => {
                self.consume_continuation();
                let mark = self.cur;
                if !self.in_range() || self.current_char() != b'/' {
                    return;
                }
                self.cur += 1;
                self.consume_continuation();
                if !self.in_range() || self.current_char() != b'*' {
                    self.cur = mark;
                    return;
                }
                self.cur += 1;
                self.consume_continuation();
                let mut closing = false;
                loop {
                    if !self.in_range() {
                        diags.pending.push(Diagnostic::new(
                            crate::diagnostic::ABEND_C_COMMENT_EOF,
                            "unexpected end of file within C-comment",
                        ));
                        return;
                    }
                    if self.current_char() == b'/' {
                        if closing {
                            self.cur += 1;
                            return;
                        }
                        closing = false;
                    } else {
                        closing = self.current_char() == b'*';
                    }
                    self.cur += 1;
                    self.consume_continuation();
                }
            }
            ScanMode::StringLiteral => {
                self.consume_continuation();
                self.consume_enclosed(b'"', b'"', diags, true);
            }
            ScanMode::HeaderName => {
                self.consume_continuation();
                let mark = self.cur;
                self.consume_enclosed(b'<', b'>', diags, true);
                if self.cur == mark {
                    self.consume_enclosed(b'"', b'"', diags, true);
                }
            }
            ScanMode::CharacterLiteral => {
                self.consume_continuation();
                if !self.in_range() || self.current_char() != b'\'' {
                    return;
                }
                let mark = self.cur;
                self.cur += 1;
                self.consume_continuation();
                let mut escape = false;
                loop {
                    if !self.in_range() {
                        // Preserve the C++ quirk: rewind rather than error.
                        self.cur = mark;
                        return;
                    }
                    let c = self.current_char();
                    if c == b'\'' {
                        if !escape {
                            self.cur += 1;
                            return;
                        }
                        escape = false;
                    } else if c == b'\\' {
                        escape = !escape;
                    } else {
                        escape = false;
                    }
                    self.cur += 1;
                    self.consume_continuation();
                }
            }
            ScanMode::RawStringLiteral => {
                self.consume_continuation();
                if !self.in_range() || self.current_char() != b'R' {
                    return;
                }
                let mark = self.cur;
                self.cur += 1;
                self.consume_continuation();
                if !self.in_range() || self.current_char() != b'"' {
                    self.cur = mark;
                    return;
                }
                self.cur += 1;
                self.consume_continuation();
                loop {
                    if !self.in_range() {
                        self.cur = mark;
                        return;
                    }
                    let c = self.current_char();
                    if !c.is_ascii_graphic() || c == b'\\' {
                        self.cur = mark;
                        return;
                    }
                    if c == b'(' {
                        break;
                    }
                    self.cur += 1;
                    self.consume_continuation();
                }
                self.cur += 1;
                self.consume_continuation();
                loop {
                    if !self.in_range() {
                        break;
                    }
                    if self.current_char() == b')' {
                        break;
                    }
                    self.cur += 1;
                    self.consume_continuation();
                }
                self.cur += 1;
                self.consume_continuation();
                loop {
                    if !self.in_range() {
                        break;
                    }
                    let c = self.current_char();
                    if !c.is_ascii_graphic() || c == b'\\' {
                        break;
                    }
                    if c == b'"' {
                        self.cur += 1;
                        return;
                    }
                    self.cur += 1;
                    self.consume_continuation();
                }
                diags.pending.push(Diagnostic::new(
                    WARN_MISSING_TERMINATOR,
                    "missing '\"' terminator after raw string literal",
                ));
            }
            ScanMode::Greyspace => {
                if !self.cxx {
                    self.consume_one(ScanMode::Whitespace, diags);
                    return;
                }
                loop {
                    if !self.in_range() {
                        break;
                    }
                    self.consume_one(ScanMode::Whitespace, diags);
                    let mark = self.cur;
                    self.consume_one(ScanMode::CxxComment, diags);
                    if self.cur != mark {
                        continue;
                    }
                    self.consume_one(ScanMode::CComment, diags);
                    if self.cur == mark {
                        break;
                    }
                }
            }
            ScanMode::LiteralSpace => {
                self.scan_all(&[
                    ScanMode::CharacterLiteral,
                    ScanMode::StringLiteral,
                    ScanMode::RawStringLiteral,
                ]);
            }
            ScanMode::Code => loop {
                if !self.in_range() {
                    break;
                }
                let mark = self.cur;
                self.consume_one(ScanMode::Greyspace, diags);
                self.consume_one(ScanMode::CharacterLiteral, diags);
                self.consume_one(ScanMode::StringLiteral, diags);
                self.consume_one(ScanMode::RawStringLiteral, diags);
                if self.cur == mark {
                    self.cur += 1;
                }
            },
        }
    }

    fn consume_enclosed(
        &mut self,
        opener: u8,
        closer: u8,
        diags: &mut ScanDiagnostics,
        report: bool,
    ) {
        if !self.in_range() || self.current_char() != opener {
            return;
        }
        let mark = self.cur;
        self.cur += 1;
        self.consume_continuation();
        let mut escape = false;
        loop {
            if !self.in_range() {
                if report {
                    diags.pending.push(
                        Diagnostic::new(
                            WARN_MISSING_TERMINATOR,
                            format!("missing '{}' terminator", closer as char),
                        ),
                    );
                }
                return;
            }
            let c = self.current_char();
            if c == closer {
                if !escape {
                    self.cur += 1;
                    return;
                }
                escape = false;
            } else if c == b'\\' {
                escape = !escape;
            } else {
                escape = false;
            }
            self.cur += 1;
            self.consume_continuation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_len(cxx: bool, mode: ScanMode, text: &str) -> usize {
        let mut c = Cursor::new(cxx, text.as_bytes(), 0);
        c.scan(mode);
        c.position()
    }

    #[test]
    fn name_mode_matches_identifier() {
        assert_eq!(scan_len(true, ScanMode::Name, "foo_bar2 rest"), 8);
    }

    #[test]
    fn name_mode_rejects_leading_digit() {
        assert_eq!(scan_len(true, ScanMode::Name, "2foo"), 0);
    }

    #[test]
    fn number_space_matches_pp_number() {
        assert_eq!(scan_len(true, ScanMode::NumberSpace, "3.14e+10f rest"), 9);
    }

    #[test]
    fn whitespace_skips_line_continuation() {
        let text = "  \\\n  x";
        assert_eq!(scan_len(true, ScanMode::Whitespace, text), 6);
    }

    #[test]
    fn greyspace_consumes_comments_in_cxx_mode() {
        let text = "/* c */ // line\nX";
        let n = scan_len(true, ScanMode::Greyspace, text);
        assert_eq!(&text[n..], "X");
    }

    #[test]
    fn greyspace_is_plain_whitespace_outside_cxx() {
        let text = "/* not a comment */";
        let n = scan_len(false, ScanMode::Greyspace, text);
        assert_eq!(n, 0);
    }

    #[test]
    fn string_literal_consumes_escapes() {
        let text = "\"a\\\"b\" rest";
        let n = scan_len(true, ScanMode::StringLiteral, text);
        assert_eq!(&text[n..], " rest");
    }

    #[test]
    fn unterminated_character_literal_rewinds() {
        let text = "'ab";
        let mut c = Cursor::new(true, text.as_bytes(), 0);
        c.scan(ScanMode::CharacterLiteral);
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn token_paste_recognised_only_as_double_hash() {
        assert_eq!(scan_len(true, ScanMode::TokenPaste, "##x"), 2);
        assert_eq!(scan_len(true, ScanMode::TokenPaste, "#x"), 0);
    }
}
