// ABOUTME: Diagnostic taxonomy and sink — this crate's structured logging layer

use std::fmt;

/// Five diagnostic severities, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Progress = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Abend = 4,
}

impl Severity {
    pub fn word(self) -> &'static str {
        match self {
            Severity::Progress => "progress",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Abend => "abend",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.word())
    }
}

/// One diagnostic cause. The externally-visible reason code is
/// `(severity << 8) | id` per spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cause {
    pub severity: Severity,
    pub id: u16,
    pub name: &'static str,
}

impl Cause {
    pub const fn reason_code(&self) -> u32 {
        ((self.severity as u32) << 8) | self.id as u32
    }
}

macro_rules! causes {
    ($($const_name:ident = $sev:ident, $id:expr, $name:expr;)*) => {
        $(pub const $const_name: Cause = Cause { severity: Severity::$sev, id: $id, name: $name };)*
    };
}

causes! {
    WARN_MISSING_TERMINATOR = Warning, 1, "missing_terminator";
    WARN_SIGN_CHANGED = Warning, 2, "sign_changed";
    WARN_ZERO_DIVIDE = Warning, 3, "zero_divide";
    WARN_SHIFT_OVERFLOW = Warning, 4, "shift_overflow";
    WARN_UNSUPPORTED_VARIADIC = Warning, 5, "unsupported_variadic";
    WARN_DIFFERING_REDEF = Warning, 6, "differing_redef";
    WARN_UNDEFING_DEFINED = Warning, 7, "undefing_defined";
    WARN_TRANSIENT_DEFINE = Warning, 8, "transient_define";
    WARN_TRANSIENT_UNDEF = Warning, 9, "transient_undef";
    WARN_WRONG_ARG_COUNT = Warning, 10, "wrong_arg_count";
    WARN_SELF_REFERENTIAL = Warning, 11, "self_referential";
    WARN_INTEGER_OVERFLOW = Warning, 12, "integer_overflow";
    WARN_CONTRADICTION = Warning, 13, "contradiction";
    WARN_UNKNOWN_DIRECTIVE = Warning, 14, "unknown_directive";
    WARN_GARBAGE_AFTER_DIRECTIVE = Warning, 15, "garbage_after_directive";
    WARN_NO_ARGUMENT = Warning, 16, "no_argument";
    WARN_INVALID_INCLUDE = Warning, 17, "invalid_include";
    WARN_NOT_A_LINE_NUMBER = Warning, 18, "not_a_line_number";
    WARN_UNCONDITIONAL_ERROR_INPUT = Warning, 19, "unconditional_error_input";
    WARN_UNCONDITIONAL_ERROR_OUTPUT = Warning, 20, "unconditional_error_output";
    INFO_RETROSPECTIVE_REDEF = Info, 1, "retrospective_redefinition";
    INFO_EXPANSION_STEP = Info, 2, "expansion_step";
    ERROR_EOF_TOO_SOON = Error, 1, "eof_too_soon";
    ERROR_ORPHAN_ELIF = Error, 2, "orphan_elif";
    ERROR_ORPHAN_ELSE = Error, 3, "orphan_else";
    ERROR_ORPHAN_ENDIF = Error, 4, "orphan_endif";
    ERROR_TOO_DEEP = Error, 5, "too_deep_nesting";
    ERROR_UNBALANCED_PAREN = Error, 6, "unbalanced_paren";
    ERROR_ORPHAN_COLON = Error, 7, "orphan_colon";
    ERROR_ORPHAN_QUESTION = Error, 8, "orphan_question";
    ERROR_TRAILING_TEXT = Error, 9, "ill_formed_trailing_text";
    ERROR_EMPTY_OPERAND = Error, 10, "empty_operand";
    ERROR_NON_TERM = Error, 11, "non_term";
    ERROR_INCOMPLETE_EXPANSION = Error, 12, "incomplete_expansion";
    ERROR_WRONG_ARG_COUNT = Error, 13, "wrong_arg_count_configured";
    ERROR_MISPLACED_TOKEN_PASTE = Error, 14, "misplaced_token_paste";
    ERROR_BAD_TOKEN_PASTE = Error, 15, "bad_token_paste";
    ERROR_STRINGIFY_NON_PARAM = Error, 16, "stringify_non_param";
    ERROR_DIRECTIVE_ERROR = Error, 17, "directive_error";
    ERROR_SOURCE_ERROR = Error, 18, "source_error";
    ERROR_IF_WITHOUT_COND = Error, 19, "if_without_cond";
    ERROR_MALFORMED_MACRO = Error, 20, "malformed_macro";
    ABEND_C_COMMENT_EOF = Abend, 1, "c_comment_eof";
    ABEND_USAGE = Abend, 2, "usage";
    ABEND_IO = Abend, 3, "io";
}

/// A single diagnostic occurrence.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub cause: Cause,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(cause: Cause, message: impl Into<String>) -> Self {
        Diagnostic {
            cause,
            file: None,
            line: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: usize) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn render(&self, program: &str) -> String {
        let mut s = String::new();
        s.push_str(program);
        if let Some(f) = &self.file {
            s.push(':');
            s.push_str(f);
        }
        if let Some(l) = self.line {
            s.push(':');
            s.push_str(&l.to_string());
        }
        s.push_str(&format!(
            ": {}: [0x{:04x}] {}",
            self.cause.severity,
            self.cause.reason_code(),
            self.message
        ));
        s
    }
}

/// Which severities are suppressed by `--gag`.
#[derive(Debug, Clone, Default)]
pub struct GagMask {
    pub progress: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
    pub abend: bool,
    pub summary: bool,
}

impl GagMask {
    pub fn gags(&self, s: Severity) -> bool {
        match s {
            Severity::Progress => self.progress,
            Severity::Info => self.info,
            Severity::Warning => self.warning,
            Severity::Error => self.error,
            Severity::Abend => self.abend,
        }
    }

    pub fn set(&mut self, name: &str) -> bool {
        match name {
            "progress" => self.progress = true,
            "info" => self.info = true,
            "warning" => self.warning = true,
            "error" => self.error = true,
            "abend" => self.abend = true,
            "summary" => self.summary = true,
            _ => return false,
        }
        true
    }
}

/// Hand-rolled exit-code bitmask (spec.md §6) — eight flags, no need for the
/// `bitflags` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitBits(pub u32);

impl ExitBits {
    pub const INFO: ExitBits = ExitBits(0x01);
    pub const WARNING: ExitBits = ExitBits(0x02);
    pub const ERROR: ExitBits = ExitBits(0x04);
    pub const ABEND: ExitBits = ExitBits(0x08);
    pub const LINE_DROPPED: ExitBits = ExitBits(0x10);
    pub const LINE_CHANGED: ExitBits = ExitBits(0x20);
    pub const ERROR_EMITTED: ExitBits = ExitBits(0x40);
    pub const UNCONDITIONAL_ERROR_LIVE: ExitBits = ExitBits(0x80);

    pub const fn empty() -> Self {
        ExitBits(0)
    }

    pub fn set(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Collects diagnostics for one process/file run and answers exit-code and
/// gag queries. Owned by the `Driver` (spec.md §5: reset per input file).
pub struct DiagnosticSink {
    program: String,
    gag: GagMask,
    emitted: Vec<Diagnostic>,
    pending: Option<Diagnostic>,
    bits: ExitBits,
}

impl DiagnosticSink {
    pub fn new(program: impl Into<String>, gag: GagMask) -> Self {
        DiagnosticSink {
            program: program.into(),
            gag,
            emitted: Vec::new(),
            pending: None,
            bits: ExitBits::empty(),
        }
    }

    /// Emit a diagnostic immediately, printing unless gagged by severity.
    pub fn emit(&mut self, diag: Diagnostic) {
        self.record_bits(diag.cause.severity);
        if !self.gag.gags(diag.cause.severity) {
            eprintln!("{}", diag.render(&self.program));
        }
        self.emitted.push(diag);
    }

    /// Defer a diagnostic pending resolution of a contradiction (spec.md §4.7).
    pub fn defer(&mut self, diag: Diagnostic) {
        self.pending = Some(diag);
    }

    /// Discard a deferred diagnostic because the contradiction resolved benignly.
    pub fn discard(&mut self) {
        self.pending = None;
    }

    /// Emit the deferred diagnostic, if any.
    pub fn flush_deferred(&mut self) {
        if let Some(diag) = self.pending.take() {
            self.emit(diag);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn note_line_dropped(&mut self) {
        self.bits.set(ExitBits::LINE_DROPPED);
    }

    pub fn note_line_changed(&mut self) {
        self.bits.set(ExitBits::LINE_CHANGED);
    }

    pub fn note_error_directive_emitted(&mut self) {
        self.bits.set(ExitBits::ERROR_EMITTED);
    }

    pub fn note_unconditional_error_live(&mut self) {
        self.bits.set(ExitBits::UNCONDITIONAL_ERROR_LIVE);
    }

    fn record_bits(&mut self, sev: Severity) {
        let bit = match sev {
            Severity::Progress => return,
            Severity::Info => ExitBits::INFO,
            Severity::Warning => ExitBits::WARNING,
            Severity::Error => ExitBits::ERROR,
            Severity::Abend => ExitBits::ABEND,
        };
        self.bits.set(bit);
    }

    pub fn exit_code(&self) -> u32 {
        self.bits.bits()
    }

    pub fn had_abend(&self) -> bool {
        self.bits.bits() & ExitBits::ABEND.bits() != 0
    }

    pub fn had_error(&self) -> bool {
        self.bits.bits() & ExitBits::ERROR.bits() != 0
    }

    pub fn emitted(&self) -> &[Diagnostic] {
        &self.emitted
    }

    /// Emit a process-exit summary unless gagged.
    pub fn summary(&self) {
        if self.gag.summary {
            return;
        }
        let errors = self
            .emitted
            .iter()
            .filter(|d| d.cause.severity == Severity::Error)
            .count();
        let warnings = self
            .emitted
            .iter()
            .filter(|d| d.cause.severity == Severity::Warning)
            .count();
        if errors > 0 || warnings > 0 {
            eprintln!(
                "{}: {} error(s), {} warning(s)",
                self.program, errors, warnings
            );
        }
    }
}
