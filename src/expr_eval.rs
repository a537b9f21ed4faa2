// ABOUTME: Preprocessor constant-expression evaluator: tokenizes and parses
// ABOUTME: `#if`/`#elif` expressions (after macro expansion), short-circuiting
// ABOUTME: `&&`/`||`, ternary, and `defined`. Grounded on `expression_parser.h`/`.cpp`.

use crate::cursor::{Cursor, ScanMode};
use crate::diagnostic::{
    Diagnostic, ERROR_EMPTY_OPERAND, ERROR_NON_TERM, ERROR_TRAILING_TEXT, ERROR_UNBALANCED_PAREN,
};
use crate::integer::{Integer, IntegerDiagnostics, IntegerType};
use crate::symbol::SymbolTable;

/// The outcome of evaluating an expression: a resolved or unresolved
/// (undef-typed) `Integer`, plus a simplified residual rendering of the
/// expression text — any fully-resolved sub-expression collapses to its
/// literal value, leaving only the genuinely unresolvable parts as text.
#[derive(Debug, Clone)]
pub struct Evaluation {
    value: Integer,
    text: String,
    empty: bool,
}

impl Evaluation {
    /// No expression text at all (e.g. an object-like macro's expansion
    /// that isn't itself an arithmetic expression).
    pub fn empty() -> Self {
        Evaluation {
            value: Integer::undef(),
            text: String::new(),
            empty: true,
        }
    }

    /// Expression text was present but couldn't be resolved to a value.
    pub fn insoluble() -> Self {
        Evaluation {
            value: Integer::undef(),
            text: String::new(),
            empty: false,
        }
    }

    fn resolved(value: Integer, text: String) -> Self {
        Evaluation {
            value,
            text,
            empty: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn value(&self) -> &Integer {
        &self.value
    }

    pub fn good(&self) -> bool {
        self.value.good()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Num(u64, IntegerType),
    Ident(String),
    Op(&'static str),
    Eof,
}

struct Lexer {
    toks: Vec<(Tok, String)>,
}

const MULTI_OPS: &[&str] = &[
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||",
];

impl Lexer {
    fn tokenize(text: &str, diags: &mut Vec<Diagnostic>) -> Self {
        let buf = text.as_bytes();
        let mut cur = Cursor::new(true, buf, 0);
        let mut toks = Vec::new();
        loop {
            cur.scan(ScanMode::Greyspace);
            if !cur.in_range() {
                break;
            }
            let before = cur.position();
            cur.scan(ScanMode::NumberSpace);
            if cur.position() > before {
                let raw = cur.text(before, cur.position());
                let (val, ty) = parse_number_literal(raw);
                toks.push((Tok::Num(val, ty), raw.to_string()));
                continue;
            }
            if cur.current_char() == b'\'' {
                let before = cur.position();
                cur.scan(ScanMode::CharacterLiteral);
                if cur.position() > before {
                    let raw = cur.text(before, cur.position());
                    let val = parse_char_literal(raw);
                    toks.push((Tok::Num(val as u64, IntegerType::Int), raw.to_string()));
                    continue;
                }
            }
            let before = cur.position();
            cur.scan(ScanMode::Name);
            if cur.position() > before {
                let raw = cur.text(before, cur.position());
                toks.push((Tok::Ident(raw.to_string()), raw.to_string()));
                continue;
            }
            let mut matched = false;
            for op in MULTI_OPS {
                let bytes = op.as_bytes();
                if cur.remaining() >= bytes.len() && cur.slice(cur.position(), cur.position() + bytes.len()) == bytes {
                    toks.push((Tok::Op(op), (*op).to_string()));
                    cur.on(bytes.len());
                    matched = true;
                    break;
                }
            }
            if matched {
                continue;
            }
            let c = cur.current_char();
            let single: &[&str] = &[
                "(", ")", "?", ":", ",", "|", "^", "&", "+", "-", "*", "/", "%", "!", "~", "<", ">",
            ];
            if let Some(op) = single.iter().find(|s| s.as_bytes()[0] == c) {
                toks.push((Tok::Op(op), op.to_string()));
                cur.on(1);
                continue;
            }
            diags.push(Diagnostic::new(
                ERROR_NON_TERM,
                format!("unexpected character '{}' in expression", c as char),
            ));
            cur.on(1);
        }
        toks.push((Tok::Eof, String::new()));
        Lexer { toks }
    }
}

fn parse_number_literal(raw: &str) -> (u64, IntegerType) {
    let lower = raw.to_ascii_lowercase();
    let mut digits = lower.as_str();
    let mut unsigned = false;
    let mut longness = 0;
    while let Some(c) = digits.chars().last() {
        match c {
            'u' => {
                unsigned = true;
                digits = &digits[..digits.len() - 1];
            }
            'l' => {
                longness += 1;
                digits = &digits[..digits.len() - 1];
            }
            _ => break,
        }
    }
    let val = if let Some(hex) = digits.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).unwrap_or(0)
    } else if digits.len() > 1 && digits.starts_with('0') && digits.chars().all(|c| c.is_digit(8)) {
        u64::from_str_radix(digits, 8).unwrap_or(0)
    } else {
        digits.parse::<u64>().unwrap_or(0)
    };
    let ty = match (longness, unsigned) {
        (0, false) if val <= i32::MAX as u64 => IntegerType::Int,
        (0, false) if val <= u32::MAX as u64 => IntegerType::UInt,
        (0, false) => IntegerType::Long,
        (0, true) => IntegerType::UInt,
        (1, false) => IntegerType::Long,
        (1, true) => IntegerType::ULong,
        (_, false) => IntegerType::LLong,
        (_, true) => IntegerType::ULLong,
    };
    (val, ty)
}

fn parse_char_literal(raw: &str) -> i64 {
    let inner = raw.trim_start_matches('\'').trim_end_matches('\'');
    let mut chars = inner.chars();
    match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => b'\n' as i64,
            Some('t') => b'\t' as i64,
            Some('r') => b'\r' as i64,
            Some('0') => 0,
            Some('\\') => b'\\' as i64,
            Some('\'') => b'\'' as i64,
            Some('"') => b'"' as i64,
            Some(c) => c as i64,
            None => 0,
        },
        Some(c) => c as i64,
        None => 0,
    }
}

/// Parses and evaluates `text` as a C preprocessor constant expression.
/// `text` should already have had its configured macro invocations
/// substituted (see `reference::expand_for_condition`) — a bare identifier
/// reaching this evaluator is therefore a genuinely unconfigured symbol,
/// resolved per `implicit` rather than treated as a literal value.
pub fn evaluate(
    text: &str,
    symbols: &SymbolTable,
    implicit: bool,
    diags: &mut Vec<Diagnostic>,
) -> Evaluation {
    let lex = Lexer::tokenize(text, diags);
    if matches!(lex.toks.first(), Some((Tok::Eof, _))) {
        return Evaluation::empty();
    }
    let mut p = Parser {
        toks: lex.toks,
        pos: 0,
        symbols,
        implicit,
        diags,
    };
    let eval = p.parse_comma();
    if !matches!(p.peek(), Tok::Eof) {
        p.diags.push(Diagnostic::new(
            ERROR_TRAILING_TEXT,
            "trailing text after a well-formed expression",
        ));
        return Evaluation::insoluble();
    }
    eval
}

struct Parser<'a> {
    toks: Vec<(Tok, String)>,
    pos: usize,
    symbols: &'a SymbolTable,
    implicit: bool,
    diags: &'a mut Vec<Diagnostic>,
}

macro_rules! level {
    ($name:ident, $next:ident, [$($op:literal => $method:ident),+ $(,)?]) => {
        fn $name(&mut self) -> Evaluation {
            let mut lhs = self.$next();
            loop {
                let op = match self.peek() {
                    $(Tok::Op($op) => Some($op),)+
                    _ => None,
                };
                let Some(op) = op else { break };
                self.advance();
                let rhs = self.$next();
                let mut id = IntegerDiagnostics::default();
                let value = match op {
                    $($op => lhs.value.$method(&rhs.value, &mut id),)+
                    _ => unreachable!(),
                };
                self.diags.extend(id.pending);
                lhs = combine(value, &lhs, op, &rhs);
            }
            lhs
        }
    };
}

fn combine(value: Integer, lhs: &Evaluation, op: &str, rhs: &Evaluation) -> Evaluation {
    if value.good() {
        Evaluation::resolved(value, render_literal(&value))
    } else {
        Evaluation::resolved(
            value,
            format!("{} {} {}", lhs.text, op, rhs.text),
        )
    }
}

fn render_literal(v: &Integer) -> String {
    if v.is_signed() {
        (v.raw() as i64).to_string()
    } else {
        v.raw().to_string()
    }
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos].0
    }

    fn advance(&mut self) -> (Tok, String) {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn parse_comma(&mut self) -> Evaluation {
        let mut lhs = self.parse_ternary();
        while matches!(self.peek(), Tok::Op(",")) {
            self.advance();
            let rhs = self.parse_ternary();
            lhs = Evaluation::resolved(rhs.value, format!("{}, {}", lhs.text, rhs.text));
        }
        lhs
    }

    fn parse_ternary(&mut self) -> Evaluation {
        let cond = self.parse_or();
        if !matches!(self.peek(), Tok::Op("?")) {
            return cond;
        }
        self.advance();
        let then_branch = self.parse_comma();
        if !matches!(self.peek(), Tok::Op(":")) {
            self.diags.push(Diagnostic::new(
                ERROR_EMPTY_OPERAND,
                "expected ':' to complete a ternary expression",
            ));
            return Evaluation::insoluble();
        }
        self.advance();
        let else_branch = self.parse_ternary();
        if cond.good() {
            if cond.value.is_truthy() {
                then_branch
            } else {
                else_branch
            }
        } else {
            Evaluation::insoluble()
        }
    }

    fn parse_or(&mut self) -> Evaluation {
        let mut lhs = self.parse_and();
        while matches!(self.peek(), Tok::Op("||")) {
            self.advance();
            let rhs = self.parse_and();
            lhs = short_circuit(true, lhs, rhs);
        }
        lhs
    }

    fn parse_and(&mut self) -> Evaluation {
        let mut lhs = self.parse_bitor();
        while matches!(self.peek(), Tok::Op("&&")) {
            self.advance();
            let rhs = self.parse_bitor();
            lhs = short_circuit(false, lhs, rhs);
        }
        lhs
    }

    level!(parse_bitor, parse_bitxor, ["|" => bitor]);
    level!(parse_bitxor, parse_bitand, ["^" => bitxor]);
    level!(parse_bitand, parse_eq, ["&" => bitand]);
    level!(parse_eq, parse_rel, ["==" => eq, "!=" => ne]);
    level!(parse_rel, parse_shift, ["<" => lt, ">" => gt, "<=" => le, ">=" => ge]);
    level!(parse_shift, parse_add, ["<<" => shl, ">>" => shr]);
    level!(parse_add, parse_mul, ["+" => add, "-" => sub]);
    level!(parse_mul, parse_unary, ["*" => mul, "/" => div, "%" => rem]);

    fn parse_unary(&mut self) -> Evaluation {
        match self.peek().clone() {
            Tok::Op("!") => {
                self.advance();
                let v = self.parse_unary();
                let value = v.value.not();
                if value.good() {
                    Evaluation::resolved(value, render_literal(&value))
                } else {
                    Evaluation::resolved(value, format!("!{}", v.text))
                }
            }
            Tok::Op("~") => {
                self.advance();
                let v = self.parse_unary();
                let value = v.value.bitnot();
                if value.good() {
                    Evaluation::resolved(value, render_literal(&value))
                } else {
                    Evaluation::resolved(value, format!("~{}", v.text))
                }
            }
            Tok::Op("-") => {
                self.advance();
                let v = self.parse_unary();
                let value = v.value.neg();
                if value.good() {
                    Evaluation::resolved(value, render_literal(&value))
                } else {
                    Evaluation::resolved(value, format!("-{}", v.text))
                }
            }
            Tok::Op("+") => {
                self.advance();
                self.parse_unary()
            }
            Tok::Ident(ref id) if id == "defined" => self.parse_defined(),
            _ => self.parse_primary(),
        }
    }

    fn parse_defined(&mut self) -> Evaluation {
        self.advance();
        let parenthesised = matches!(self.peek(), Tok::Op("("));
        if parenthesised {
            self.advance();
        }
        let name = match self.advance().0 {
            Tok::Ident(id) => id,
            _ => {
                self.diags.push(Diagnostic::new(
                    ERROR_EMPTY_OPERAND,
                    "'defined' requires an identifier operand",
                ));
                return Evaluation::insoluble();
            }
        };
        if parenthesised {
            if !matches!(self.peek(), Tok::Op(")")) {
                self.diags.push(Diagnostic::new(
                    ERROR_UNBALANCED_PAREN,
                    "unbalanced parenthesis after 'defined(...'",
                ));
                return Evaluation::insoluble();
            }
            self.advance();
        }
        let is_defined = self
            .symbols
            .lookup(&name)
            .map(|loc| self.symbols.get(loc).configured() && self.symbols.get(loc).defined())
            .unwrap_or(false);
        Evaluation::resolved(
            Integer::from_bool(is_defined),
            if is_defined { "1".into() } else { "0".into() },
        )
    }

    fn parse_primary(&mut self) -> Evaluation {
        match self.advance().0 {
            Tok::Num(val, ty) => {
                let v = Integer::new(ty, val);
                Evaluation::resolved(v, render_literal(&v))
            }
            Tok::Ident(_) => {
                // A configured macro would already have been substituted by
                // `reference::expand_for_condition` before this text ever
                // reached the lexer; surviving here means it's unconfigured.
                if self.implicit {
                    let v = Integer::new(IntegerType::Int, 0);
                    Evaluation::resolved(v, render_literal(&v))
                } else {
                    Evaluation::insoluble()
                }
            }
            Tok::Op("(") => {
                let inner = self.parse_comma();
                if !matches!(self.peek(), Tok::Op(")")) {
                    self.diags.push(Diagnostic::new(
                        ERROR_UNBALANCED_PAREN,
                        "unbalanced parenthesis in expression",
                    ));
                    return Evaluation::insoluble();
                }
                self.advance();
                if inner.good() {
                    inner
                } else {
                    Evaluation::resolved(inner.value, format!("({})", inner.text))
                }
            }
            _ => {
                self.diags.push(Diagnostic::new(
                    ERROR_EMPTY_OPERAND,
                    "expected an operand",
                ));
                Evaluation::insoluble()
            }
        }
    }
}

/// `is_or` selects `||` (true short-circuits) vs `&&` (false short-circuits).
fn short_circuit(is_or: bool, lhs: Evaluation, rhs: Evaluation) -> Evaluation {
    let decisive = if is_or { lhs.good() && lhs.value.is_truthy() } else { lhs.good() && !lhs.value.is_truthy() };
    if decisive {
        return Evaluation::resolved(Integer::from_bool(is_or), if is_or { "1".into() } else { "0".into() });
    }
    let rhs_decisive = if is_or { rhs.good() && rhs.value.is_truthy() } else { rhs.good() && !rhs.value.is_truthy() };
    if rhs_decisive {
        return Evaluation::resolved(Integer::from_bool(is_or), if is_or { "1".into() } else { "0".into() });
    }
    if lhs.good() && rhs.good() {
        let result = if is_or {
            lhs.value.is_truthy() || rhs.value.is_truthy()
        } else {
            lhs.value.is_truthy() && rhs.value.is_truthy()
        };
        return Evaluation::resolved(Integer::from_bool(result), if result { "1".into() } else { "0".into() });
    }
    let op = if is_or { "||" } else { "&&" };
    Evaluation::resolved(Integer::undef(), format!("{} {} {}", lhs.text, op, rhs.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Provenance;

    fn eval(text: &str) -> Evaluation {
        let symbols = SymbolTable::new();
        let mut diags = Vec::new();
        evaluate(text, &symbols, false, &mut diags)
    }

    #[test]
    fn simple_arithmetic() {
        let e = eval("1 + 2 * 3");
        assert_eq!(e.value().raw() as i64, 7);
    }

    #[test]
    fn comparison_and_logic() {
        let e = eval("1 < 2 && 3 > 2");
        assert_eq!(e.value().raw(), 1);
    }

    #[test]
    fn ternary_picks_the_live_branch() {
        let e = eval("1 ? 10 : 20");
        assert_eq!(e.value().raw() as i64, 10);
    }

    #[test]
    fn short_circuit_or_skips_undefined_identifier_penalty() {
        let e = eval("1 || (1/0)");
        assert_eq!(e.value().raw(), 1);
    }

    #[test]
    fn division_by_zero_is_insoluble() {
        let e = eval("1 / 0");
        assert!(!e.good());
    }

    #[test]
    fn defined_checks_the_symbol_table() {
        let mut symbols = SymbolTable::new();
        let loc = symbols.locate("FOO", Provenance::Global);
        symbols.define(loc, "1".to_string(), Default::default());
        let mut diags = Vec::new();
        let e = evaluate("defined(FOO)", &symbols, false, &mut diags);
        assert_eq!(e.value().raw(), 1);
        let e2 = evaluate("defined(BAR)", &symbols, false, &mut diags);
        assert_eq!(e2.value().raw(), 0);
    }

    #[test]
    fn unparenthesised_defined_is_also_accepted() {
        let mut symbols = SymbolTable::new();
        let loc = symbols.locate("FOO", Provenance::Global);
        symbols.define(loc, "1".to_string(), Default::default());
        let mut diags = Vec::new();
        let e = evaluate("defined FOO", &symbols, false, &mut diags);
        assert_eq!(e.value().raw(), 1);
    }

    #[test]
    fn unbalanced_paren_is_an_error() {
        let mut diags = Vec::new();
        let symbols = SymbolTable::new();
        let e = evaluate("(1 + 2", &symbols, false, &mut diags);
        assert!(!e.good());
        assert!(!diags.is_empty());
    }

    #[test]
    fn bare_unconfigured_identifier_is_insoluble_without_implicit() {
        let e = eval("FOO");
        assert!(!e.good());
    }

    #[test]
    fn bare_unconfigured_identifier_is_zero_under_implicit() {
        let symbols = SymbolTable::new();
        let mut diags = Vec::new();
        let e = evaluate("FOO", &symbols, true, &mut diags);
        assert_eq!(e.value().raw(), 0);
    }
}
