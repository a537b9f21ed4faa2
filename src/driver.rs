// ABOUTME: Per-file pipeline: reads lines, drives the #if state machine and
// ABOUTME: directive dispatcher, renders the live/dead partition, and
// ABOUTME: assembles the exit-code bitmask. Grounded on coan's line-by-line
// ABOUTME: driving loop (the filtered pack's `parsed_line.h` describes the
// ABOUTME: per-line state this reconstructs as plain return values) and
// ABOUTME: spec.md §4.4/§4.7/§5/§6.

use crate::canonical::canonical_symbol;
use crate::config::{CliArgs, ConflictPolicy, DiscardPolicy, GlobalDef};
use crate::contradiction::{ContradictionAction, ContradictionTracker};
use crate::cursor::{Cursor, ScanMode};
use crate::diagnostic::{Diagnostic, DiagnosticSink, ExitBits, GagMask};
use crate::directive::{self, keyword_to_type, OccurrenceLog};
use crate::if_machine::{Disposition, IfMachine, KeywordEdit, LineType};
use crate::reference::ReferenceCache;
use crate::symbol::{Locator, Provenance, SymbolTable};

/// Everything the core needs out of the commandline that isn't itself a
/// listing option (those are `commands`' concern). Built once from
/// `CliArgs` and reused across every input file.
pub struct CoreConfig {
    pub cxx: bool,
    pub implicit: bool,
    pub no_transients: bool,
    pub conflict: ConflictPolicy,
    pub discard: DiscardPolicy,
    pub line_directives: bool,
    pub keep_going: bool,
    pub max_expansion: usize,
    pub globals: Vec<GlobalDef>,
    pub explain: bool,
}

impl CoreConfig {
    pub fn from_args(args: &CliArgs) -> Result<Self, String> {
        let mut globals = Vec::new();
        for d in &args.define {
            globals.push(crate::config::parse_define_option(true, d)?);
        }
        for u in &args.undef {
            globals.push(crate::config::parse_undef_option(u)?);
        }
        let max_expansion = match &args.max_expansion {
            Some(s) => crate::config::parse_max_expansion(s)?,
            None => crate::reference::DEFAULT_MAX_EXPANSION,
        };
        Ok(CoreConfig {
            cxx: true,
            implicit: args.implicit,
            no_transients: args.no_transients,
            conflict: args.conflict,
            discard: args.discard,
            line_directives: args.line,
            keep_going: args.keep_going,
            max_expansion,
            globals,
            explain: args.explain,
        })
    }
}

/// Owns every piece of process-wide state with the lifecycle spec.md §5
/// describes: init once, reset per input file, torn down at process exit.
pub struct Driver {
    cfg: CoreConfig,
    symbols: SymbolTable,
    cache: ReferenceCache,
    ifm: IfMachine,
    tracker: ContradictionTracker,
    occurrences: OccurrenceLog,
    pub sink: DiagnosticSink,
}

/// One file's outcome: the rendered text (if this is a rewriting command)
/// and whether it differs from the input.
pub struct FileResult {
    pub rendered: String,
    pub changed: bool,
}

impl Driver {
    pub fn new(program: impl Into<String>, gag: GagMask, cfg: CoreConfig) -> Result<Self, String> {
        let mut symbols = SymbolTable::new();
        let mut diags = Vec::new();
        for g in &cfg.globals {
            crate::config::digest_global(g, &mut symbols, &mut diags);
        }
        let mut tracker = ContradictionTracker::new();
        tracker.set_policy(cfg.conflict.into());
        let mut sink = DiagnosticSink::new(program, gag);
        for d in diags {
            sink.emit(d);
        }
        Ok(Driver {
            cfg,
            symbols,
            cache: ReferenceCache::new(),
            ifm: IfMachine::new(),
            tracker,
            occurrences: OccurrenceLog::new(),
            sink,
        })
    }

    pub fn occurrences(&self) -> &OccurrenceLog {
        &self.occurrences
    }

    pub fn occurrences_mut(&mut self) -> &mut OccurrenceLog {
        &mut self.occurrences
    }

    /// Drop every recorded occurrence, for `--once-per-file` (spec.md §6):
    /// each file starts the "already reported" bookkeeping over rather than
    /// sharing it across the whole run.
    pub fn clear_occurrences(&mut self) {
        self.occurrences.clear_all();
    }

    /// Resolve a configured object-like symbol's expansion text, for the
    /// `symbols --expand` report. Function-like macros have no actual
    /// arguments to substitute in a listing context, so these return `None`
    /// and the caller falls back to the raw definition.
    pub fn expand_symbol(&mut self, loc: Locator) -> Option<String> {
        let sym = self.symbols.get(loc);
        if !sym.defined() || !sym.parameters().base().is_null() {
            return None;
        }
        let r = crate::reference::Reference::new(
            &self.symbols,
            loc,
            crate::param_list::ArgumentList::default(),
        );
        let mut budget = self.cfg.max_expansion;
        let mut diags = Vec::new();
        let entry = crate::reference::resolve(&mut self.symbols, &mut self.cache, &r, &mut budget, &mut diags)?;
        for d in diags {
            self.sink.emit(d);
        }
        Some(entry.expansion().to_string())
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// `--explain`: the configured macros a symbol's definition invokes, in
    /// subscription order, each paired with its own signature and
    /// definition (spec.md §8 scenario 4: `type_comb3`'s explanation names
    /// the step-by-step substitution into `type_comb2`).
    pub fn explain_symbol(&self, loc: Locator) -> Vec<String> {
        self.symbols
            .contributors_of(loc)
            .into_iter()
            .filter(|&c| c != loc)
            .map(|c| {
                let sym = self.symbols.get(c);
                format!("{} = {}", sym.signature(), sym.defn().unwrap_or(""))
            })
            .collect()
    }

    /// spec.md §4.4's per-file reset: unsubscribe every symbol, erase every
    /// transient symbol, subscribe every remaining (global) symbol afresh.
    fn reset_for_file(&mut self) {
        self.ifm.top();
        self.cache.clear();
        self.symbols.unsubscribe_all();
        self.symbols.erase_transients();
        let mut diags = Vec::new();
        for loc in self.symbols.all_locators() {
            subscribe_definition(&mut self.symbols, loc, &mut diags);
        }
        for d in diags {
            self.sink.emit(d);
        }
    }

    /// Process one file's full text, returning the rendered output.
    pub fn process_text(&mut self, text: &str) -> FileResult {
        self.reset_for_file();
        let mut out = String::new();
        let mut changed = false;
        let mut last_printed_line = 0usize;
        let mut pending_line_directive = false;

        let lines: Vec<&str> = text.lines().collect();
        for (idx, raw) in lines.iter().enumerate() {
            let line_num = idx + 1;
            let (disposition, contradiction) = self.dispatch_line(raw, line_num);

            match disposition {
                Disposition::Eof => break,
                Disposition::Drop => {
                    self.sink.note_line_dropped();
                    changed = true;
                    pending_line_directive = true;
                    match self.cfg.discard {
                        DiscardPolicy::Drop => {}
                        DiscardPolicy::Blank => out.push('\n'),
                        DiscardPolicy::Comment => {
                            out.push_str("/* ");
                            out.push_str(raw.trim());
                            out.push_str(" */\n");
                        }
                    }
                }
                Disposition::Print => {
                    self.maybe_emit_line_directive(
                        &mut out,
                        &mut pending_line_directive,
                        line_num,
                    );
                    let rendered = self.apply_contradiction(raw, contradiction, &mut changed);
                    out.push_str(&rendered);
                    out.push('\n');
                    last_printed_line = line_num;
                }
                Disposition::PrintEdited(edit) => {
                    self.maybe_emit_line_directive(
                        &mut out,
                        &mut pending_line_directive,
                        line_num,
                    );
                    changed = true;
                    out.push_str(&rewrite_keyword(raw, edit));
                    out.push('\n');
                    last_printed_line = line_num;
                }
            }
        }
        let _ = last_printed_line;
        FileResult {
            rendered: out,
            changed,
        }
    }

    fn maybe_emit_line_directive(
        &mut self,
        out: &mut String,
        pending: &mut bool,
        line_num: usize,
    ) {
        if *pending && self.cfg.line_directives {
            out.push_str(&format!("#line {line_num}\n"));
        }
        *pending = false;
    }

    fn apply_contradiction(
        &mut self,
        raw: &str,
        contradiction: Option<ContradictionAction>,
        changed: &mut bool,
    ) -> String {
        match contradiction {
            None => raw.to_string(),
            Some(action) => {
                *changed = true;
                self.sink.emit(action.diagnostic);
                match action.replacement {
                    Some(text) => {
                        if text.starts_with("#error") {
                            self.sink.note_error_directive_emitted();
                            if self.ifm.is_unconditional_line() {
                                self.sink.note_unconditional_error_live();
                            }
                        }
                        text
                    }
                    None => String::new(),
                }
            }
        }
    }

    fn dispatch_line(
        &mut self,
        raw: &str,
        line_num: usize,
    ) -> (Disposition, Option<ContradictionAction>) {
        let trimmed = raw.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            let rest = rest.trim_start();
            let (keyword, body) = split_keyword(rest);
            let dtype = keyword_to_type(keyword);
            let mut diags = Vec::new();
            let outcome = directive::eval(
                dtype,
                body,
                &self.ifm,
                &mut self.symbols,
                &mut self.occurrences,
                &mut self.tracker,
                &mut self.cache,
                self.cfg.max_expansion,
                self.cfg.implicit,
                self.cfg.no_transients,
                &mut diags,
            );
            if let Some(id) = &outcome.defined_symbol {
                if let Some(loc) = self.symbols.lookup(id) {
                    subscribe_definition(&mut self.symbols, loc, &mut diags);
                    if self.cfg.explain {
                        for step in self.explain_symbol(loc) {
                            diags.push(Diagnostic::new(
                                crate::diagnostic::INFO_EXPANSION_STEP,
                                format!("line {line_num}: {step}"),
                            ));
                        }
                    }
                }
            }
            let deferred = directive::settle_contradiction(
                dtype,
                &self.ifm,
                &mut self.tracker,
                &mut diags,
            );
            let contradiction = outcome.contradiction.or(deferred);
            for d in diags {
                self.sink.emit(d);
            }
            let mut diags2 = Vec::new();
            let disposition = self.ifm.transition(outcome.line_type, line_num, &mut diags2);
            for d in diags2 {
                self.sink.emit(d);
            }
            (disposition, contradiction)
        } else {
            let mut diags = Vec::new();
            let disposition = self.ifm.transition(LineType::Plain, line_num, &mut diags);
            for d in diags {
                self.sink.emit(d);
            }
            (disposition, None)
        }
    }
}

/// Split a directive's text after `#` into its keyword and the remainder.
fn split_keyword(rest: &str) -> (&str, &str) {
    let mut parts = rest.splitn(2, |c: char| c.is_whitespace());
    let keyword = parts.next().unwrap_or("");
    let body = parts.next().unwrap_or("").trim_start();
    (keyword, body)
}

/// Rewrite a line's leading `#elif`/`#else`/`#endif` keyword in place, the
/// device by which a surviving branch is made to read as though it always
/// introduced the block (spec.md §4.7's M-actions).
fn rewrite_keyword(raw: &str, edit: KeywordEdit) -> String {
    let indent_len = raw.len() - raw.trim_start().len();
    let (indent, rest) = raw.split_at(indent_len);
    let rest = rest.strip_prefix('#').unwrap_or(rest);
    let rest = rest.trim_start();
    let mut word_len = 0;
    for c in rest.chars() {
        if c.is_alphabetic() {
            word_len += c.len_utf8();
        } else {
            break;
        }
    }
    let tail = &rest[word_len..];
    let new_word = match edit {
        KeywordEdit::AsIf => "if",
        KeywordEdit::AsElse => "else",
        KeywordEdit::AsEndif => "endif",
    };
    format!("{indent}#{new_word}{tail}")
}

/// spec.md §4.4's subscription algorithm: scan a symbol's definition for
/// every identifier that isn't one of its own formal parameters, and wire
/// a dependency edge to each that resolves to another symbol, detecting
/// self-reference and pre-existing cycles as it goes.
fn subscribe_definition(symbols: &mut SymbolTable, loc: Locator, diags: &mut Vec<Diagnostic>) {
    let Some(defn) = symbols.get(loc).defn().map(str::to_string) else {
        return;
    };
    if defn.is_empty() {
        return;
    }
    let params: Vec<String> = symbols
        .get(loc)
        .parameters()
        .base()
        .iter()
        .map(str::to_string)
        .collect();

    let buf = defn.as_bytes();
    let mut cur = Cursor::new(true, buf, 0);
    let mut seen = std::collections::HashSet::new();
    while cur.in_range() {
        let start = cur.position();
        cur.scan(ScanMode::Name);
        if cur.position() == start {
            cur.on(1);
            continue;
        }
        let name = cur.text(start, cur.position());
        if params.iter().any(|p| p == name) {
            continue;
        }
        if !seen.insert(name.to_string()) {
            continue;
        }
        let id = canonical_symbol(name);
        if let Some(other) = symbols.lookup(&id) {
            subscribe_to(symbols, loc, other, diags);
        }
    }
}

fn subscribe_to(symbols: &mut SymbolTable, of: Locator, other: Locator, diags: &mut Vec<Diagnostic>) {
    if other == of {
        symbols.mark_self_referential(of);
        diags.push(Diagnostic::new(
            crate::diagnostic::WARN_SELF_REFERENTIAL,
            format!("\"{}\" refers to itself", symbols.get(of).id()),
        ));
        return;
    }
    if symbols.is_transitive_contributor(of, other) {
        symbols.mark_self_referential(of);
        symbols.mark_self_referential(other);
        diags.push(Diagnostic::new(
            crate::diagnostic::WARN_SELF_REFERENTIAL,
            format!(
                "\"{}\" and \"{}\" refer to each other",
                symbols.get(of).id(),
                symbols.get(other).id()
            ),
        ));
        return;
    }
    symbols.add_dependency(of, other);
    for contributor in symbols.contributors_of(other) {
        if contributor != of {
            subscribe_to(symbols, of, contributor, diags);
        }
    }
}

/// spec.md §6's exit-code bitmask, assembled from the sink's accumulated bits.
pub fn exit_code(sink: &DiagnosticSink) -> u32 {
    sink.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConflictPolicy;

    fn driver_with(globals: Vec<GlobalDef>) -> Driver {
        let cfg = CoreConfig {
            cxx: true,
            implicit: false,
            no_transients: false,
            conflict: ConflictPolicy::Delete,
            discard: DiscardPolicy::Drop,
            line_directives: false,
            keep_going: false,
            max_expansion: crate::reference::DEFAULT_MAX_EXPANSION,
            globals,
            explain: false,
        };
        Driver::new("ppselect", GagMask::default(), cfg).unwrap()
    }

    #[test]
    fn scenario_one_emits_the_true_branch() {
        let mut d = driver_with(vec![crate::config::parse_define_option(true, "FOO").unwrap()]);
        let result = d.process_text("#if FOO\nA\n#else\nB\n#endif\n");
        assert_eq!(result.rendered, "A\n");
    }

    #[test]
    fn scenario_nested_ternary_drops_the_body() {
        let mut d = driver_with(vec![
            crate::config::parse_define_option(true, "FOO=1").unwrap(),
            crate::config::parse_define_option(true, "BAR=0").unwrap(),
        ]);
        let result = d.process_text("#if (FOO ? (BAR ? 1 : 0) : 1)\nX\n#endif\n");
        assert_eq!(result.rendered, "");
        assert!(result.changed);
    }

    #[test]
    fn scenario_nested_ternary_keeps_the_body() {
        let mut d = driver_with(vec![
            crate::config::parse_define_option(true, "FOO=1").unwrap(),
            crate::config::parse_define_option(true, "BAR=0").unwrap(),
        ]);
        let result = d.process_text("#if (FOO ? 1 : 0)\nY\n#endif\n");
        assert_eq!(result.rendered, "Y\n");
    }

    #[test]
    fn undef_then_define_matching_a_global_d_is_silently_dropped() {
        let mut d = driver_with(vec![crate::config::parse_define_option(true, "X=1").unwrap()]);
        let result = d.process_text("#undef X\n#define X 1\n");
        assert_eq!(result.rendered, "");
        assert_eq!(d.sink.exit_code() & ExitBits::WARNING.bits(), 0);
    }

    #[test]
    fn discard_policy_comment_substitutes_a_comment() {
        let cfg = CoreConfig {
            cxx: true,
            implicit: false,
            no_transients: false,
            conflict: ConflictPolicy::Delete,
            discard: DiscardPolicy::Comment,
            line_directives: false,
            keep_going: false,
            max_expansion: crate::reference::DEFAULT_MAX_EXPANSION,
            globals: vec![crate::config::parse_define_option(true, "FOO=0").unwrap()],
            explain: false,
        };
        let mut d = Driver::new("ppselect", GagMask::default(), cfg).unwrap();
        let result = d.process_text("#if FOO\nA\n#endif\n");
        assert!(result.rendered.contains("/* A */"));
    }

    #[test]
    fn subscription_dirties_derived_symbol_on_redefine() {
        let mut d = driver_with(Vec::new());
        d.process_text("#define BASE 1\n#define DERIVED BASE\n");
        let derived = d.symbols().lookup("DERIVED").unwrap();
        let snap = d.symbols().current_snapshot();
        assert!(!d.symbols().get(derived).dirty(snap));
    }

    #[test]
    fn explain_emits_an_expansion_step_diagnostic_at_the_defining_line() {
        let cfg = CoreConfig {
            cxx: true,
            implicit: false,
            no_transients: false,
            conflict: ConflictPolicy::Delete,
            discard: DiscardPolicy::Drop,
            line_directives: false,
            keep_going: false,
            max_expansion: crate::reference::DEFAULT_MAX_EXPANSION,
            globals: Vec::new(),
            explain: true,
        };
        let mut d = Driver::new("ppselect", GagMask::default(), cfg).unwrap();
        d.process_text("#define BASE 1\n#define DERIVED BASE\n");
        let step = d
            .sink
            .emitted()
            .iter()
            .find(|diag| diag.cause == crate::diagnostic::INFO_EXPANSION_STEP && diag.message.contains("line 2"));
        assert!(step.is_some());
        assert!(step.unwrap().message.contains("BASE"));
    }
}
