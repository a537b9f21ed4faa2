// ABOUTME: Directive keyword recognition and per-type evaluation: `#if`
// ABOUTME: family classification, `#define`/`#undef` symbol-table effects,
// ABOUTME: and occurrence logging for the report commands. Grounded on
// ABOUTME: `directive_type.h`, `directive.h`/`directive.cpp`.

use std::collections::BTreeMap;

use crate::canonical::{canonical_symbol, canonical_text};
use crate::contradiction::{Cause, ContradictionAction, ContradictionTracker};
use crate::cursor::{Cursor, ScanMode};
use crate::diagnostic::{
    Diagnostic, ERROR_IF_WITHOUT_COND, ERROR_MALFORMED_MACRO, WARN_INVALID_INCLUDE,
    WARN_NOT_A_LINE_NUMBER, WARN_NO_ARGUMENT, WARN_UNCONDITIONAL_ERROR_INPUT,
    WARN_UNCONDITIONAL_ERROR_OUTPUT, WARN_UNKNOWN_DIRECTIVE,
};
use crate::if_machine::{classify_elif, classify_if, IfMachine, LineType};
use crate::param_list::FormalParameterList;
use crate::reference::ReferenceCache;
use crate::symbol::{Provenance, SymbolTable};

/// Symbolic constants denoting types of directives (`directive_type.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirectiveType {
    Unknown,
    If,
    Ifdef,
    Ifndef,
    Else,
    Elif,
    Endif,
    Define,
    Undef,
    Include,
    Pragma,
    Error,
    Line,
    /// The commandline, considered as a `#define`/`#undef` for provenance
    /// purposes; never produced by parsing an input line.
    CommandLine,
}

pub fn keyword_to_type(keyword: &str) -> DirectiveType {
    match keyword {
        "if" => DirectiveType::If,
        "ifdef" => DirectiveType::Ifdef,
        "ifndef" => DirectiveType::Ifndef,
        "else" => DirectiveType::Else,
        "elif" => DirectiveType::Elif,
        "endif" => DirectiveType::Endif,
        "define" => DirectiveType::Define,
        "undef" => DirectiveType::Undef,
        "include" => DirectiveType::Include,
        "pragma" => DirectiveType::Pragma,
        "error" => DirectiveType::Error,
        "line" => DirectiveType::Line,
        _ => DirectiveType::Unknown,
    }
}

/// One distinct directive text's accumulated history: whether it has been
/// reported already (for `--once-only`/`--once-per-file`) and whether it
/// was seen on a live line, a dead one, or both (`--active`/`--inactive`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Occurrence {
    pub reported: bool,
    pub active: bool,
    pub inactive: bool,
}

/// Global lookup tables of directive occurrences, keyed by canonicalised
/// text, for the report commands (`directive<Type>::_directives_tab_`).
#[derive(Default)]
pub struct OccurrenceLog {
    tabs: BTreeMap<DirectiveType, BTreeMap<String, Occurrence>>,
}

impl OccurrenceLog {
    pub fn new() -> Self {
        OccurrenceLog::default()
    }

    /// Record an occurrence, returning whether it had already been seen.
    pub fn record(&mut self, dtype: DirectiveType, text: String, active: bool) -> bool {
        let tab = self.tabs.entry(dtype).or_default();
        let seen = tab.contains_key(&text);
        let entry = tab.entry(text).or_default();
        if active {
            entry.active = true;
        } else {
            entry.inactive = true;
        }
        seen
    }

    pub fn mark_reported(&mut self, dtype: DirectiveType, text: &str) {
        if let Some(tab) = self.tabs.get_mut(&dtype) {
            if let Some(entry) = tab.get_mut(text) {
                entry.reported = true;
            }
        }
    }

    pub fn entries(&self, dtype: DirectiveType) -> impl Iterator<Item = (&str, Occurrence)> {
        self.tabs
            .get(&dtype)
            .into_iter()
            .flat_map(|t| t.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    pub fn clear(&mut self, dtype: DirectiveType) {
        self.tabs.remove(&dtype);
    }

    pub fn clear_all(&mut self) {
        self.tabs.clear();
    }
}

/// The result of evaluating one directive line.
pub struct DirectiveOutcome {
    pub dtype: DirectiveType,
    /// Feeds `IfMachine::transition`: `Plain` for every non-conditional
    /// directive, since their own keep/drop fate tracks the ambient
    /// `#if`-state exactly like an ordinary code line.
    pub line_type: LineType,
    pub contradiction: Option<ContradictionAction>,
    /// The symbol just `#define`d, for the caller to feed into the
    /// subscription algorithm (spec.md §4.4) without re-parsing the body.
    pub defined_symbol: Option<String>,
}

fn plain(dtype: DirectiveType) -> DirectiveOutcome {
    DirectiveOutcome {
        dtype,
        line_type: LineType::Plain,
        contradiction: None,
        defined_symbol: None,
    }
}

fn first_word(body: &str) -> &str {
    body.trim().split_whitespace().next().unwrap_or("")
}

fn eval_ifdef_or_ifndef(
    dtype: DirectiveType,
    body: &str,
    symbols: &SymbolTable,
    implicit: bool,
) -> LineType {
    let id = first_word(body);
    match symbols.lookup(id) {
        Some(loc) => {
            let sym = symbols.get(loc);
            if sym.defined() {
                if dtype == DirectiveType::Ifdef {
                    LineType::True
                } else {
                    LineType::False
                }
            } else if dtype == DirectiveType::Ifndef {
                LineType::True
            } else {
                LineType::False
            }
        }
        None => {
            if implicit {
                if dtype == DirectiveType::Ifdef {
                    LineType::False
                } else {
                    LineType::True
                }
            } else {
                LineType::If
            }
        }
    }
}

/// Expand configured macro references in a `#if`/`#elif`/`#line` body, then
/// evaluate it as a constant expression (spec.md §4.6): an identifier
/// surviving expansion is genuinely unconfigured, not a dropped-to-zero
/// literal.
fn eval_condition(
    body: &str,
    symbols: &mut SymbolTable,
    cache: &mut ReferenceCache,
    max_expansion: usize,
    implicit: bool,
    diags: &mut Vec<Diagnostic>,
) -> crate::expr_eval::Evaluation {
    let mut budget = max_expansion;
    let (expanded, complete) =
        crate::reference::expand_for_condition(body, symbols, cache, &mut budget, diags);
    if complete {
        crate::expr_eval::evaluate(&expanded, symbols, implicit, diags)
    } else {
        crate::expr_eval::Evaluation::insoluble()
    }
}

/// Parse the `NAME[(params)] [definition]` body of a `#define`.
fn parse_define_body(body: &str) -> Result<(String, FormalParameterList, String), ()> {
    let mut cur = Cursor::new(true, body.as_bytes(), 0);
    cur.scan(ScanMode::Greyspace);
    let start = cur.position();
    while cur.in_range()
        && (cur.current_char().is_ascii_alphanumeric() || cur.current_char() == b'_')
    {
        cur.on(1);
    }
    let id = cur.text(start, cur.position()).to_string();
    if id.is_empty() {
        return Err(());
    }
    let params = if cur.in_range() && cur.current_char() == b'(' {
        let list = FormalParameterList::read(true, &mut cur);
        if !list.base().well_formed() {
            return Err(());
        }
        list
    } else {
        FormalParameterList::default()
    };
    cur.scan(ScanMode::Greyspace);
    let rest = cur.text(cur.position(), cur.position() + cur.remaining());
    let defn = canonical_text(true, rest);
    Ok((canonical_symbol(&id), params, defn))
}

#[allow(clippy::too_many_arguments)]
pub fn eval(
    dtype: DirectiveType,
    body: &str,
    ifm: &IfMachine,
    symbols: &mut SymbolTable,
    occurrences: &mut OccurrenceLog,
    tracker: &mut ContradictionTracker,
    cache: &mut ReferenceCache,
    max_expansion: usize,
    implicit: bool,
    no_transients: bool,
    diags: &mut Vec<Diagnostic>,
) -> DirectiveOutcome {
    let dropping = ifm.dead_line();
    match dtype {
        DirectiveType::Unknown => {
            diags.push(Diagnostic::new(WARN_UNKNOWN_DIRECTIVE, "unknown directive"));
            plain(dtype)
        }
        DirectiveType::If | DirectiveType::Elif => {
            if body.trim().is_empty() {
                diags.push(Diagnostic::new(
                    ERROR_IF_WITHOUT_COND,
                    "#if/#elif has no argument",
                ));
            }
            occurrences.record(dtype, canonical_text(true, body), !dropping);
            let ev = eval_condition(body, symbols, cache, max_expansion, implicit, diags);
            let line_type = if dtype == DirectiveType::If {
                classify_if(&ev)
            } else {
                classify_elif(&ev)
            };
            DirectiveOutcome {
                dtype,
                line_type,
                contradiction: None,
                defined_symbol: None,
            }
        }
        DirectiveType::Ifdef | DirectiveType::Ifndef => {
            occurrences.record(dtype, canonical_symbol(first_word(body)), !dropping);
            DirectiveOutcome {
                dtype,
                line_type: eval_ifdef_or_ifndef(dtype, body, symbols, implicit),
                contradiction: None,
                defined_symbol: None,
            }
        }
        DirectiveType::Else => DirectiveOutcome {
            dtype,
            line_type: LineType::Else,
            contradiction: None,
            defined_symbol: None,
        },
        DirectiveType::Endif => DirectiveOutcome {
            dtype,
            line_type: LineType::Endif,
            contradiction: None,
            defined_symbol: None,
        },
        DirectiveType::Define => {
            let mut outcome = plain(dtype);
            let Ok((id, params, defn)) = parse_define_body(body) else {
                diags.push(Diagnostic::new(
                    ERROR_MALFORMED_MACRO,
                    format!("malformed macro parameter list in \"{}\"", body.trim()),
                ));
                return outcome;
            };
            occurrences.record(
                dtype,
                if defn.is_empty() {
                    id.clone()
                } else {
                    format!("{id} {defn}")
                },
                !dropping,
            );
            if !dropping && !no_transients {
                let prior = symbols
                    .lookup(&id)
                    .map(|l| (symbols.get(l).origin(), symbols.get(l).defn().map(str::to_string)));
                if tracker.pending_symbol() == Some(id.as_str()) {
                    tracker.forget();
                }
                if let Some((Provenance::Global, Some(old))) = &prior {
                    if *old != defn {
                        outcome.contradiction =
                            Some(tracker.insert(Cause::DifferentlyRedefiningD, &id, diags));
                    }
                }
                let loc = symbols.locate(&id, Provenance::Transient);
                symbols.define(loc, defn, params);
            }
            outcome.defined_symbol = Some(id);
            outcome
        }
        DirectiveType::Undef => {
            let mut outcome = plain(dtype);
            let id = canonical_symbol(first_word(body));
            if id.is_empty() {
                return outcome;
            }
            occurrences.record(dtype, id.clone(), !dropping);
            if !dropping && !no_transients {
                if let Some(loc) = symbols.lookup(&id) {
                    let sym = symbols.get(loc);
                    if sym.origin() == Provenance::Global && sym.defined() {
                        tracker.save(Cause::UndefingD, &id);
                    }
                }
                let loc = symbols.locate(&id, Provenance::Transient);
                symbols.undef(loc);
            }
            outcome
        }
        DirectiveType::Include => {
            if body.trim().is_empty() {
                diags.push(Diagnostic::new(WARN_NO_ARGUMENT, "#include has no argument"));
            } else {
                let trimmed = body.trim();
                let valid = (trimmed.starts_with('<') && trimmed.ends_with('>'))
                    || (trimmed.starts_with('"') && trimmed.ends_with('"'));
                if !valid {
                    diags.push(Diagnostic::new(
                        WARN_INVALID_INCLUDE,
                        "#include expects <FILENAME> or \"FILENAME\"",
                    ));
                }
                occurrences.record(dtype, canonical_text(true, trimmed), !dropping);
            }
            plain(dtype)
        }
        DirectiveType::Pragma => {
            occurrences.record(dtype, canonical_text(true, body), !dropping);
            plain(dtype)
        }
        DirectiveType::Error => {
            occurrences.record(dtype, canonical_text(true, body), !dropping);
            if !dropping && ifm.is_unconditional_line() {
                if ifm.was_unconditional_line() {
                    diags.push(Diagnostic::new(
                        WARN_UNCONDITIONAL_ERROR_INPUT,
                        "an operative #error directive was input",
                    ));
                } else {
                    diags.push(Diagnostic::new(
                        WARN_UNCONDITIONAL_ERROR_OUTPUT,
                        "an operative #error directive was output",
                    ));
                }
            }
            plain(dtype)
        }
        DirectiveType::Line => {
            if body.trim().is_empty() {
                diags.push(Diagnostic::new(WARN_NO_ARGUMENT, "#line has no argument"));
            } else {
                let ev = eval_condition(body, symbols, cache, max_expansion, implicit, diags);
                if !ev.good() || (ev.value().raw() as i64) < 1 {
                    diags.push(Diagnostic::new(
                        WARN_NOT_A_LINE_NUMBER,
                        "#line expects a line-number",
                    ));
                }
                occurrences.record(dtype, canonical_text(true, body), !dropping);
            }
            plain(dtype)
        }
        DirectiveType::CommandLine => unreachable!("never produced by parsing an input line"),
    }
}

/// Outer bracket run once per directive line, after `eval`: mirrors
/// `directive_base::eval`'s `dropping()`-gated forget/flush calls so a
/// pending `#undef`-vs-`-D` contradiction gets resolved by whatever
/// directive follows it.
pub fn settle_contradiction(
    dtype: DirectiveType,
    ifm: &IfMachine,
    tracker: &mut ContradictionTracker,
    diags: &mut Vec<Diagnostic>,
) -> Option<ContradictionAction> {
    if ifm.dead_line() {
        tracker.forget();
        None
    } else if dtype != DirectiveType::Undef {
        tracker.flush(diags)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contradiction::ContradictionTracker;

    fn fresh() -> (
        SymbolTable,
        OccurrenceLog,
        ContradictionTracker,
        IfMachine,
        ReferenceCache,
    ) {
        (
            SymbolTable::new(),
            OccurrenceLog::new(),
            ContradictionTracker::new(),
            IfMachine::new(),
            ReferenceCache::new(),
        )
    }

    #[test]
    fn keyword_lookup_covers_the_conditional_family() {
        assert_eq!(keyword_to_type("ifdef"), DirectiveType::Ifdef);
        assert_eq!(keyword_to_type("bogus"), DirectiveType::Unknown);
    }

    #[test]
    fn if_true_literal_classifies_true() {
        let (mut symbols, mut occ, mut tracker, ifm, mut cache) = fresh();
        let mut diags = Vec::new();
        let out = eval(
            DirectiveType::If,
            "1",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        assert_eq!(out.line_type, LineType::True);
    }

    #[test]
    fn if_expands_a_configured_object_like_macro_before_evaluating() {
        let (mut symbols, mut occ, mut tracker, ifm, mut cache) = fresh();
        let mut diags = Vec::new();
        let loc = symbols.locate("FOO", Provenance::Global);
        symbols.define(loc, "1".to_string(), FormalParameterList::default());
        let out = eval(
            DirectiveType::If,
            "FOO",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        assert_eq!(out.line_type, LineType::True);
    }

    #[test]
    fn if_on_an_unconfigured_bare_identifier_stays_unresolved() {
        let (mut symbols, mut occ, mut tracker, ifm, mut cache) = fresh();
        let mut diags = Vec::new();
        let out = eval(
            DirectiveType::If,
            "UNKNOWN",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        assert_eq!(out.line_type, LineType::If);
    }

    #[test]
    fn ifdef_of_configured_symbol_is_true() {
        let (mut symbols, mut occ, mut tracker, ifm, mut cache) = fresh();
        let mut diags = Vec::new();
        let loc = symbols.locate("FOO", Provenance::Global);
        symbols.define(loc, "1".to_string(), FormalParameterList::default());
        let out = eval(
            DirectiveType::Ifdef,
            "FOO",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        assert_eq!(out.line_type, LineType::True);
    }

    #[test]
    fn ifdef_of_unconfigured_symbol_without_implicit_is_insoluble() {
        let (mut symbols, mut occ, mut tracker, ifm, mut cache) = fresh();
        let mut diags = Vec::new();
        let out = eval(
            DirectiveType::Ifdef,
            "BAR",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        assert_eq!(out.line_type, LineType::If);
    }

    #[test]
    fn define_then_undef_round_trips() {
        let (mut symbols, mut occ, mut tracker, ifm, mut cache) = fresh();
        let mut diags = Vec::new();
        eval(
            DirectiveType::Define,
            "FOO 1",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        let loc = symbols.lookup("FOO").unwrap();
        assert!(symbols.get(loc).defined());
        eval(
            DirectiveType::Undef,
            "FOO",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        assert!(!symbols.get(loc).defined());
    }

    #[test]
    fn redefining_a_dash_d_symbol_differently_is_flagged() {
        let (mut symbols, mut occ, mut tracker, ifm, mut cache) = fresh();
        let mut diags = Vec::new();
        let loc = symbols.locate("FOO", Provenance::Global);
        symbols.define(loc, "1".to_string(), FormalParameterList::default());
        let out = eval(
            DirectiveType::Define,
            "FOO 2",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        assert!(out.contradiction.is_some());
    }

    #[test]
    fn undef_of_dash_d_symbol_defers_then_is_forgotten_by_agreeing_define() {
        let (mut symbols, mut occ, mut tracker, ifm, mut cache) = fresh();
        let mut diags = Vec::new();
        let loc = symbols.locate("FOO", Provenance::Global);
        symbols.define(loc, "1".to_string(), FormalParameterList::default());
        eval(
            DirectiveType::Undef,
            "FOO",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        assert!(settle_contradiction(DirectiveType::Undef, &ifm, &mut tracker, &mut diags).is_none());
        eval(
            DirectiveType::Define,
            "FOO 1",
            &ifm,
            &mut symbols,
            &mut occ,
            &mut tracker,
            &mut cache,
            crate::reference::DEFAULT_MAX_EXPANSION,
            false,
            false,
            &mut diags,
        );
        assert!(settle_contradiction(DirectiveType::Define, &ifm, &mut tracker, &mut diags).is_none());
    }

    #[test]
    fn directive_inside_a_dead_branch_forgets_any_pending_contradiction() {
        let (mut symbols, mut occ, mut tracker, mut ifm, _cache) = fresh();
        let mut diags = Vec::new();
        tracker.save(Cause::UndefingD, "FOO");
        ifm.transition(LineType::False, 1, &mut diags);
        let action = settle_contradiction(DirectiveType::Define, &ifm, &mut tracker, &mut diags);
        assert!(action.is_none());
        let _ = symbols.count();
        let _ = occ.entries(DirectiveType::Define).count();
    }
}
