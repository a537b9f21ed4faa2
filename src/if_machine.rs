// ABOUTME: The `#if`/`#elif`/`#else`/`#endif` nesting state machine: a stack
// ABOUTME: of per-level states transitioned by each directive's line type.
// ABOUTME: Grounded on `if_control.h`/`.cpp`'s state×linetype transition table.

use crate::diagnostic::{
    Diagnostic, ERROR_EOF_TOO_SOON, ERROR_ORPHAN_ELIF, ERROR_ORPHAN_ELSE, ERROR_ORPHAN_ENDIF,
    ERROR_TOO_DEEP,
};
use crate::expr_eval::Evaluation;

/// Minimum nesting depth guaranteed by ISO/IEC 9899:1999 5.2.4.1, reproduced
/// as the hard cap here too.
pub const MAX_DEPTH: usize = 64;

/// The ten line types `#if`-control logic dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    If,
    True,
    False,
    Elif,
    ElTrue,
    ElFalse,
    Else,
    Endif,
    Plain,
    Eof,
}

/// Classify a just-evaluated `#if`'s condition.
pub fn classify_if(eval: &Evaluation) -> LineType {
    if !eval.good() {
        LineType::If
    } else if eval.value().is_truthy() {
        LineType::True
    } else {
        LineType::False
    }
}

/// Classify a just-evaluated `#elif`'s condition.
pub fn classify_elif(eval: &Evaluation) -> LineType {
    if !eval.good() {
        LineType::Elif
    } else if eval.value().is_truthy() {
        LineType::ElTrue
    } else {
        LineType::ElFalse
    }
}

/// The ten states of one level of `#if`-nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfState {
    Outside,
    FalsePrefix,
    TruePrefix,
    PassMiddle,
    FalseMiddle,
    TrueMiddle,
    PassElse,
    FalseElse,
    TrueElse,
    FalseTrailer,
}

/// How a directive line rewrites its own keyword before being printed —
/// the device by which a later `#elif`/`#else` stands in for a dropped
/// earlier `#if`/`#else`/`#endif` once the true branch has been found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordEdit {
    AsIf,
    AsElse,
    AsEndif,
}

/// What should happen to the directive line that drove this transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Drop,
    Print,
    PrintEdited(KeywordEdit),
    Eof,
}

struct Frame {
    state: IfState,
    start_line: usize,
}

/// One file's `#if`-nesting stack. Reset per input file (spec.md §5).
#[derive(Default)]
pub struct IfMachine {
    stack: Vec<Frame>,
}

impl IfMachine {
    pub fn new() -> Self {
        IfMachine { stack: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn state(&self) -> IfState {
        self.stack.last().map(|f| f.state).unwrap_or(IfState::Outside)
    }

    pub fn if_start_line(&self) -> Option<usize> {
        self.stack.last().map(|f| f.start_line)
    }

    /// Is the current line's surrounding scope known-dead (some enclosing
    /// `#if`/`#elif` resolved false)?
    pub fn dead_line(&self) -> bool {
        matches!(
            self.state(),
            IfState::FalsePrefix | IfState::FalseMiddle | IfState::FalseElse | IfState::FalseTrailer
        )
    }

    pub fn was_unconditional_line(&self) -> bool {
        self.state() == IfState::Outside
    }

    /// Is the current line outside any `#if`, or inside one resolved true?
    pub fn is_unconditional_line(&self) -> bool {
        matches!(
            self.state(),
            IfState::Outside | IfState::TruePrefix | IfState::TrueMiddle | IfState::TrueElse
        )
    }

    /// Reset nesting to top level (start of a new input file).
    pub fn top(&mut self) {
        self.stack.clear();
    }

    fn push(&mut self, state: IfState, line_num: usize, diags: &mut Vec<Diagnostic>) {
        if self.stack.len() + 1 >= MAX_DEPTH {
            diags.push(Diagnostic::new(ERROR_TOO_DEEP, "too many levels of #if nesting"));
        }
        self.stack.push(Frame {
            state,
            start_line: line_num,
        });
    }

    fn set_state(&mut self, state: IfState) {
        if let Some(f) = self.stack.last_mut() {
            f.state = state;
        }
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    // Nested #if/true/false opened while the enclosing scope is live or
    // insoluble: track the nested branch's own condition.
    fn fpass(&mut self, line: usize, diags: &mut Vec<Diagnostic>) -> Disposition {
        self.push(IfState::PassMiddle, line, diags);
        Disposition::Print
    }
    fn ftrue(&mut self, line: usize, diags: &mut Vec<Diagnostic>) -> Disposition {
        self.push(IfState::TruePrefix, line, diags);
        Disposition::Drop
    }
    fn ffalse(&mut self, line: usize, diags: &mut Vec<Diagnostic>) -> Disposition {
        self.push(IfState::FalsePrefix, line, diags);
        Disposition::Drop
    }
    // Nested #if opened while the enclosing scope is already dead: its own
    // condition is irrelevant, just track depth to find the matching #endif.
    fn fdrop(&mut self, line: usize, diags: &mut Vec<Diagnostic>) -> Disposition {
        self.push(IfState::FalseTrailer, line, diags);
        Disposition::Drop
    }

    fn strue(&mut self) -> Disposition {
        self.set_state(IfState::TruePrefix);
        Disposition::Drop
    }
    fn sfalse(&mut self) -> Disposition {
        self.set_state(IfState::FalsePrefix);
        Disposition::Drop
    }
    fn selse(&mut self) -> Disposition {
        self.set_state(IfState::TrueElse);
        Disposition::Drop
    }
    fn pelif(&mut self) -> Disposition {
        self.set_state(IfState::PassMiddle);
        Disposition::Print
    }
    fn pelse(&mut self) -> Disposition {
        self.set_state(IfState::PassElse);
        Disposition::Print
    }
    fn pendif(&mut self) -> Disposition {
        self.pop();
        Disposition::Print
    }
    fn dfalse(&mut self) -> Disposition {
        self.set_state(IfState::FalseTrailer);
        Disposition::Drop
    }
    fn delif(&mut self) -> Disposition {
        self.set_state(IfState::FalseMiddle);
        Disposition::Drop
    }
    fn delse(&mut self) -> Disposition {
        self.set_state(IfState::FalseElse);
        Disposition::Drop
    }
    fn dendif(&mut self) -> Disposition {
        self.pop();
        Disposition::Drop
    }
    // The true branch turns out to live at or after an #elif/#else that
    // follows only insoluble/false branches: rewrite that line's keyword so
    // the output reads as though it always introduced the surviving branch.
    fn mpass(&mut self) -> Disposition {
        self.set_state(IfState::PassMiddle);
        Disposition::PrintEdited(KeywordEdit::AsIf)
    }
    fn mtrue(&mut self) -> Disposition {
        self.set_state(IfState::TrueMiddle);
        Disposition::PrintEdited(KeywordEdit::AsElse)
    }
    fn melif(&mut self) -> Disposition {
        self.set_state(IfState::FalseTrailer);
        Disposition::PrintEdited(KeywordEdit::AsEndif)
    }
    fn melse(&mut self) -> Disposition {
        self.set_state(IfState::FalseElse);
        Disposition::PrintEdited(KeywordEdit::AsEndif)
    }

    fn orphan_elif(&self, diags: &mut Vec<Diagnostic>) -> Disposition {
        diags.push(Diagnostic::new(ERROR_ORPHAN_ELIF, "orphan #elif"));
        Disposition::Print
    }
    fn orphan_else(&self, diags: &mut Vec<Diagnostic>) -> Disposition {
        diags.push(Diagnostic::new(ERROR_ORPHAN_ELSE, "orphan #else"));
        Disposition::Print
    }
    fn orphan_endif(&self, diags: &mut Vec<Diagnostic>) -> Disposition {
        diags.push(Diagnostic::new(ERROR_ORPHAN_ENDIF, "orphan #endif"));
        Disposition::Print
    }
    fn early_eof(&self, diags: &mut Vec<Diagnostic>) {
        diags.push(Diagnostic::new(ERROR_EOF_TOO_SOON, "unexpected end of file"));
    }

    /// Advance the state machine on `linetype`, occurring at `line_num`,
    /// returning what to do with the line that drove the transition.
    pub fn transition(
        &mut self,
        linetype: LineType,
        line_num: usize,
        diags: &mut Vec<Diagnostic>,
    ) -> Disposition {
        use IfState::*;
        use LineType::*;

        if linetype == Eof {
            if self.state() != Outside {
                self.early_eof(diags);
            }
            return Disposition::Eof;
        }

        match (self.state(), linetype) {
            (Outside, If) => self.fpass(line_num, diags),
            (Outside, True) => self.ftrue(line_num, diags),
            (Outside, False) => self.ffalse(line_num, diags),
            (Outside, Elif) | (Outside, ElTrue) | (Outside, ElFalse) => self.orphan_elif(diags),
            (Outside, Else) => self.orphan_else(diags),
            (Outside, Endif) => self.orphan_endif(diags),
            (Outside, Plain) => Disposition::Print,

            (FalsePrefix, If) | (FalsePrefix, True) | (FalsePrefix, False) => {
                self.fdrop(line_num, diags)
            }
            (FalsePrefix, Elif) => self.mpass(),
            (FalsePrefix, ElTrue) => self.strue(),
            (FalsePrefix, ElFalse) => self.sfalse(),
            (FalsePrefix, Else) => self.selse(),
            (FalsePrefix, Endif) => self.dendif(),
            (FalsePrefix, Plain) => Disposition::Drop,

            (TruePrefix, If) => self.fpass(line_num, diags),
            (TruePrefix, True) => self.ftrue(line_num, diags),
            (TruePrefix, False) => self.ffalse(line_num, diags),
            (TruePrefix, Elif) | (TruePrefix, ElTrue) | (TruePrefix, ElFalse) => self.dfalse(),
            (TruePrefix, Else) => self.delse(),
            (TruePrefix, Endif) => self.dendif(),
            (TruePrefix, Plain) => Disposition::Print,

            (PassMiddle, If) => self.fpass(line_num, diags),
            (PassMiddle, True) => self.ftrue(line_num, diags),
            (PassMiddle, False) => self.ffalse(line_num, diags),
            (PassMiddle, Elif) => self.pelif(),
            (PassMiddle, ElTrue) => self.mtrue(),
            (PassMiddle, ElFalse) => self.delif(),
            (PassMiddle, Else) => self.pelse(),
            (PassMiddle, Endif) => self.pendif(),
            (PassMiddle, Plain) => Disposition::Print,

            (FalseMiddle, If) | (FalseMiddle, True) | (FalseMiddle, False) => {
                self.fdrop(line_num, diags)
            }
            (FalseMiddle, Elif) => self.pelif(),
            (FalseMiddle, ElTrue) => self.mtrue(),
            (FalseMiddle, ElFalse) => self.delif(),
            (FalseMiddle, Else) => self.pelse(),
            (FalseMiddle, Endif) => self.pendif(),
            (FalseMiddle, Plain) => Disposition::Drop,

            (TrueMiddle, If) => self.fpass(line_num, diags),
            (TrueMiddle, True) => self.ftrue(line_num, diags),
            (TrueMiddle, False) => self.ffalse(line_num, diags),
            (TrueMiddle, Elif) | (TrueMiddle, ElTrue) | (TrueMiddle, ElFalse) => self.melif(),
            (TrueMiddle, Else) => self.melse(),
            (TrueMiddle, Endif) => self.pendif(),
            (TrueMiddle, Plain) => Disposition::Print,

            (PassElse, If) => self.fpass(line_num, diags),
            (PassElse, True) => self.ftrue(line_num, diags),
            (PassElse, False) => self.ffalse(line_num, diags),
            (PassElse, Elif) | (PassElse, ElTrue) | (PassElse, ElFalse) => self.orphan_elif(diags),
            (PassElse, Else) => self.orphan_else(diags),
            (PassElse, Endif) => self.pendif(),
            (PassElse, Plain) => Disposition::Print,

            (FalseElse, If) | (FalseElse, True) | (FalseElse, False) => {
                self.fdrop(line_num, diags)
            }
            (FalseElse, Elif) | (FalseElse, ElTrue) | (FalseElse, ElFalse) => {
                self.orphan_elif(diags)
            }
            (FalseElse, Else) => self.orphan_else(diags),
            (FalseElse, Endif) => self.dendif(),
            (FalseElse, Plain) => Disposition::Drop,

            (TrueElse, If) => self.fpass(line_num, diags),
            (TrueElse, True) => self.ftrue(line_num, diags),
            (TrueElse, False) => self.ffalse(line_num, diags),
            (TrueElse, Elif) | (TrueElse, ElTrue) | (TrueElse, ElFalse) => {
                self.orphan_elif(diags)
            }
            (TrueElse, Else) => self.orphan_else(diags),
            (TrueElse, Endif) => self.dendif(),
            (TrueElse, Plain) => Disposition::Print,

            (FalseTrailer, If) | (FalseTrailer, True) | (FalseTrailer, False) => {
                self.fdrop(line_num, diags)
            }
            (FalseTrailer, Elif) | (FalseTrailer, ElTrue) | (FalseTrailer, ElFalse) => {
                self.dfalse()
            }
            (FalseTrailer, Else) => self.delse(),
            (FalseTrailer, Endif) => self.dendif(),
            (FalseTrailer, Plain) => Disposition::Drop,

            (_, Eof) => unreachable!("Eof handled above"),
        }
    }
}
