// ABOUTME: Macro reference resolution: argument substitution, recursive
// ABOUTME: macro expansion, and the reference cache. Grounded on
// ABOUTME: `reference.h`/`.cpp` and `reference_cache.h`.

use std::collections::BTreeMap;

use crate::diagnostic::{
    Diagnostic, ERROR_INCOMPLETE_EXPANSION, WARN_CONTRADICTION, WARN_SELF_REFERENTIAL,
    WARN_UNSUPPORTED_VARIADIC,
};
use crate::expr_eval::Evaluation;
use crate::param_list::ArgumentList;
use crate::subst_format::Handling;
use crate::symbol::{Locator, Provenance, SymbolTable};

/// Default cutoff (bytes) on a single macro expansion, past which it's
/// reported as too large rather than resolved (spec.md §4.5's size limit).
pub const DEFAULT_MAX_EXPANSION: usize = 4196;

/// The cached outcome of resolving one reference: its expansion text, the
/// `Evaluation` of that text as a constant expression (if any), and
/// bookkeeping for `--once-only`/`--once-per-file` reporting.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    expansion: String,
    eval: Evaluation,
    reported: bool,
    complete: bool,
}

impl CacheEntry {
    pub fn expansion(&self) -> &str {
        &self.expansion
    }

    pub fn eval(&self) -> &Evaluation {
        &self.eval
    }

    pub fn reported(&self) -> bool {
        self.reported
    }

    pub fn set_reported(&mut self) {
        self.reported = true;
    }

    pub fn complete(&self) -> bool {
        self.complete
    }
}

/// Keyed by invocation text (`id` or `id(args)`), mirroring
/// `reference_cache::map`'s prefix-erase semantics on redefinition.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    map: BTreeMap<String, CacheEntry>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        ReferenceCache::default()
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.map.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.map.get_mut(key)
    }

    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        self.map.insert(key, entry);
    }

    /// Drop every cached entry for `id`: the bare symbol and every
    /// parameterised invocation `id(...)`.
    pub fn erase_symbol(&mut self, id: &str) {
        let prefix = format!("{id}(");
        self.map
            .retain(|k, _| k != id && !k.starts_with(&prefix));
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// A use of a symbol, with its actual arguments if any.
pub struct Reference {
    pub callee: Locator,
    pub args: ArgumentList,
    pub key: String,
}

impl Reference {
    pub fn new(symbols: &SymbolTable, callee: Locator, args: ArgumentList) -> Self {
        let key = format!("{}{}", symbols.get(callee).id(), args.base().text());
        Reference { callee, args, key }
    }
}

/// Validate argument count/variadic/self-referential preconditions before
/// attempting expansion, mirroring `reference::validate`. Returns `true`
/// (after recording a diagnostic) if expansion must not proceed.
fn validate(symbols: &SymbolTable, r: &Reference, diags: &mut Vec<Diagnostic>) -> bool {
    let sym = symbols.get(r.callee);
    if !r.args.base().well_formed() {
        diags.push(Diagnostic::new(
            crate::diagnostic::ERROR_WRONG_ARG_COUNT,
            format!("malformed argument list for \"{}\"", r.key),
        ));
        return true;
    }
    if sym.self_referential() {
        diags.push(Diagnostic::new(
            WARN_SELF_REFERENTIAL,
            format!("infinite regress in expansion of \"{}\"", r.key),
        ));
        return true;
    }
    if sym.variadic() {
        diags.push(Diagnostic::new(
            WARN_UNSUPPORTED_VARIADIC,
            format!(
                "sorry, variadic macro expansion is unsupported; \"{}\" will not be resolved",
                r.key
            ),
        ));
        return true;
    }
    if !sym.parameters().base().is_null() && r.args.base().size() != sym.parameters().base().size()
    {
        diags.push(Diagnostic::new(
            crate::diagnostic::ERROR_WRONG_ARG_COUNT,
            format!(
                "macro \"{}\" requires {} argument(s), {} given",
                sym.id(),
                sym.parameters().base().size(),
                r.args.base().size()
            ),
        ));
        return true;
    }
    false
}

/// Expand one reference's macro body, substituting arguments per their
/// `Handling`, then recursively expanding macro invocations found within
/// the result, bounded by `budget` bytes total (spec.md §4.5).
pub fn expand(
    symbols: &mut SymbolTable,
    cache: &mut ReferenceCache,
    r: &Reference,
    budget: &mut usize,
    diags: &mut Vec<Diagnostic>,
) -> (String, bool) {
    if validate(symbols, r, diags) {
        return (r.key.clone(), false);
    }
    let sym = symbols.get(r.callee);
    let Some(format) = sym.format() else {
        return (String::new(), true);
    };
    let buf = format.bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        if let Some((spec, _, _)) = crate::subst_format::Specifier::get_at(buf, i) {
            let idx = spec.param_index() as usize;
            let arg = r.args.base().at(idx).unwrap_or("").to_string();
            match spec.handling() {
                Handling::Arg => out.extend_from_slice(arg.as_bytes()),
                Handling::QuotedArg => {
                    out.push(b'"');
                    for c in arg.chars() {
                        if c == '"' || c == '\\' {
                            out.push(b'\\');
                        }
                        let mut tmp = [0u8; 4];
                        out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
                    }
                    out.push(b'"');
                }
                Handling::ExpandedArg => {
                    if *budget == 0 {
                        return (String::from_utf8_lossy(&out).into_owned(), false);
                    }
                    let (expanded, complete) =
                        expand_text(&arg, symbols, cache, budget, diags);
                    out.extend_from_slice(expanded.as_bytes());
                    if !complete {
                        return (String::from_utf8_lossy(&out).into_owned(), false);
                    }
                }
            }
            i += crate::subst_format::Specifier::SERIALIZED_SIZE;
            continue;
        }
        out.push(buf[i]);
        i += 1;
    }
    let text = String::from_utf8_lossy(&out).into_owned();
    if *budget < text.len() {
        diags.push(Diagnostic::new(
            ERROR_INCOMPLETE_EXPANSION,
            format!(
                "expansion of \"{}\" exceeds the maximum expansion size",
                r.key
            ),
        ));
        *budget = 0;
        return (text, false);
    }
    *budget -= text.len();
    expand_text(&text, symbols, cache, budget, diags)
}

/// Scan `text` for further macro invocations and expand them in place,
/// recursively, until no more are found or the budget is exhausted.
pub fn expand_text(
    text: &str,
    symbols: &mut SymbolTable,
    cache: &mut ReferenceCache,
    budget: &mut usize,
    diags: &mut Vec<Diagnostic>,
) -> (String, bool) {
    expand_text_impl(text, symbols, cache, budget, diags, false)
}

/// Like `expand_text`, but leaves the operand of `defined`/`defined(...)`
/// untouched: the standard treats that operand as a bare identifier, never
/// a macro invocation to substitute, so `#if`/`#elif`/`#line` bodies must
/// expand through this entry point rather than `expand_text` directly.
pub fn expand_for_condition(
    text: &str,
    symbols: &mut SymbolTable,
    cache: &mut ReferenceCache,
    budget: &mut usize,
    diags: &mut Vec<Diagnostic>,
) -> (String, bool) {
    expand_text_impl(text, symbols, cache, budget, diags, true)
}

fn expand_text_impl(
    text: &str,
    symbols: &mut SymbolTable,
    cache: &mut ReferenceCache,
    budget: &mut usize,
    diags: &mut Vec<Diagnostic>,
    protect_defined: bool,
) -> (String, bool) {
    use crate::cursor::{Cursor, ScanMode};

    let buf = text.as_bytes();
    let mut cur = Cursor::new(true, buf, 0);
    let mut out = String::new();
    let mut complete = true;

    while cur.in_range() {
        let before = cur.position();
        cur.scan(ScanMode::LiteralSpace);
        if cur.position() > before {
            out.push_str(cur.text(before, cur.position()));
            continue;
        }
        let before = cur.position();
        cur.scan(ScanMode::Name);
        if cur.position() == before {
            out.push(cur.current_char() as char);
            cur.on(1);
            continue;
        }
        let name = cur.text(before, cur.position()).to_string();

        if protect_defined && name == "defined" {
            out.push_str(&name);
            let before_gap = cur.position();
            cur.scan(ScanMode::Greyspace);
            out.push_str(cur.text(before_gap, cur.position()));
            let paren = cur.in_range() && cur.current_char() == b'(';
            if paren {
                out.push('(');
                cur.on(1);
            }
            let before_id = cur.position();
            cur.scan(ScanMode::Name);
            out.push_str(cur.text(before_id, cur.position()));
            if paren {
                let before_close = cur.position();
                cur.scan(ScanMode::Greyspace);
                out.push_str(cur.text(before_close, cur.position()));
                if cur.in_range() && cur.current_char() == b')' {
                    out.push(')');
                    cur.on(1);
                }
            }
            continue;
        }

        let Some(loc) = symbols.lookup(&name) else {
            out.push_str(&name);
            continue;
        };
        if !symbols.get(loc).configured() || !symbols.get(loc).defined() {
            out.push_str(&name);
            continue;
        }
        symbols.set_invoked(loc);

        let is_function_like = !symbols.get(loc).parameters().base().is_null();
        let saved = cur.position();
        cur.scan(ScanMode::Greyspace);
        let followed_by_paren = cur.in_range() && cur.current_char() == b'(';

        if is_function_like && !followed_by_paren {
            cur.set(saved);
            out.push_str(&name);
            continue;
        }

        let args = if is_function_like {
            ArgumentList::read(true, &mut cur)
        } else {
            cur.set(saved);
            ArgumentList::default()
        };
        let r = Reference::new(symbols, loc, args);
        match resolve(symbols, cache, &r, budget, diags) {
            Some(entry) => {
                out.push_str(entry.expansion());
                if !entry.complete() {
                    complete = false;
                }
            }
            None => {
                out.push_str(&r.key);
            }
        }
    }
    (out, complete)
}

/// Look up `r` in the cache, recomputing if absent or dirty, matching
/// `reference::lookup`'s insert-or-refresh contract.
pub fn resolve(
    symbols: &mut SymbolTable,
    cache: &mut ReferenceCache,
    r: &Reference,
    budget: &mut usize,
    diags: &mut Vec<Diagnostic>,
) -> Option<CacheEntry> {
    let dirty = cache
        .get(&r.key)
        .map(|_| symbols.get(r.callee).dirty(symbols.current_snapshot()))
        .unwrap_or(true);
    if dirty || cache.get(&r.key).is_none() {
        let (expansion, complete) = expand(symbols, cache, r, budget, diags);
        let eval = if !complete {
            Evaluation::insoluble()
        } else if expansion.is_empty() {
            Evaluation::empty()
        } else {
            // A macro's own expansion is cached on its own terms, independent
            // of whatever `--implicit` setting is in force at the `#if` that
            // happens to reference it.
            crate::expr_eval::evaluate(&expansion, symbols, false, diags)
        };
        let entry = CacheEntry {
            expansion,
            eval,
            reported: false,
            complete,
        };
        cache.insert(r.key.clone(), entry.clone());
    }
    cache.get(&r.key).cloned()
}

pub fn contradiction_warning(id: &str, what: &str) -> Diagnostic {
    Diagnostic::new(
        WARN_CONTRADICTION,
        format!("\"{id}\" {what}"),
    )
}

pub fn provenance_word(p: Provenance) -> &'static str {
    match p {
        Provenance::Unconfigured => "unconfigured",
        Provenance::Global => "global",
        Provenance::Transient => "transient",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_list::FormalParameterList;

    fn define(t: &mut SymbolTable, name: &str, params: &str, body: &str) -> Locator {
        let loc = t.locate(name, Provenance::Global);
        let mut cur = crate::cursor::Cursor::new(true, params.as_bytes(), 0);
        let plist = FormalParameterList::read(true, &mut cur);
        t.define(loc, body.to_string(), plist);
        loc
    }

    #[test]
    fn object_like_macro_expands_literally() {
        let mut t = SymbolTable::new();
        let loc = define(&mut t, "FOO", "", "1 + 2");
        let mut cache = ReferenceCache::new();
        let args = ArgumentList::default();
        let r = Reference::new(&t, loc, args);
        let mut budget = DEFAULT_MAX_EXPANSION;
        let mut diags = Vec::new();
        let entry = resolve(&mut t, &mut cache, &r, &mut budget, &mut diags).unwrap();
        assert_eq!(entry.expansion(), "1 + 2");
    }

    #[test]
    fn function_like_macro_substitutes_arguments() {
        let mut t = SymbolTable::new();
        let loc = define(&mut t, "ADD", "(a,b)", "a + b");
        let mut cache = ReferenceCache::new();
        let mut acur = crate::cursor::Cursor::new(true, b"(1,2)", 0);
        let args = ArgumentList::read(true, &mut acur);
        let r = Reference::new(&t, loc, args);
        let mut budget = DEFAULT_MAX_EXPANSION;
        let mut diags = Vec::new();
        let entry = resolve(&mut t, &mut cache, &r, &mut budget, &mut diags).unwrap();
        assert_eq!(entry.expansion(), "1 + 2");
    }

    #[test]
    fn stringify_quotes_the_literal_argument() {
        let mut t = SymbolTable::new();
        let loc = define(&mut t, "STR", "(x)", "#x");
        let mut cache = ReferenceCache::new();
        let mut acur = crate::cursor::Cursor::new(true, b"(hi)", 0);
        let args = ArgumentList::read(true, &mut acur);
        let r = Reference::new(&t, loc, args);
        let mut budget = DEFAULT_MAX_EXPANSION;
        let mut diags = Vec::new();
        let entry = resolve(&mut t, &mut cache, &r, &mut budget, &mut diags).unwrap();
        assert_eq!(entry.expansion(), "\"hi\"");
    }

    #[test]
    fn arg_count_mismatch_is_a_diagnosed_error() {
        let mut t = SymbolTable::new();
        let loc = define(&mut t, "ADD", "(a,b)", "a + b");
        let mut cache = ReferenceCache::new();
        let mut acur = crate::cursor::Cursor::new(true, b"(1)", 0);
        let args = ArgumentList::read(true, &mut acur);
        let r = Reference::new(&t, loc, args);
        let mut budget = DEFAULT_MAX_EXPANSION;
        let mut diags = Vec::new();
        resolve(&mut t, &mut cache, &r, &mut budget, &mut diags);
        assert!(!diags.is_empty());
    }

    #[test]
    fn expand_for_condition_substitutes_a_configured_object_like_macro() {
        let mut t = SymbolTable::new();
        define(&mut t, "FOO", "", "1");
        let mut cache = ReferenceCache::new();
        let mut budget = DEFAULT_MAX_EXPANSION;
        let mut diags = Vec::new();
        let (text, complete) =
            expand_for_condition("FOO + 1", &mut t, &mut cache, &mut budget, &mut diags);
        assert!(complete);
        assert_eq!(text, "1 + 1");
    }

    #[test]
    fn expand_for_condition_leaves_an_unconfigured_identifier_alone() {
        let mut t = SymbolTable::new();
        let mut cache = ReferenceCache::new();
        let mut budget = DEFAULT_MAX_EXPANSION;
        let mut diags = Vec::new();
        let (text, _) =
            expand_for_condition("BAR + 1", &mut t, &mut cache, &mut budget, &mut diags);
        assert_eq!(text, "BAR + 1");
    }

    #[test]
    fn expand_for_condition_protects_the_defined_operand_from_substitution() {
        let mut t = SymbolTable::new();
        define(&mut t, "FOO", "", "1");
        let mut cache = ReferenceCache::new();
        let mut budget = DEFAULT_MAX_EXPANSION;
        let mut diags = Vec::new();
        let (text, _) = expand_for_condition(
            "defined(FOO) && FOO",
            &mut t,
            &mut cache,
            &mut budget,
            &mut diags,
        );
        assert_eq!(text, "defined(FOO) && 1");
    }

    #[test]
    fn erase_symbol_drops_both_bare_and_parameterised_keys() {
        let mut cache = ReferenceCache::new();
        cache.insert(
            "FOO".to_string(),
            CacheEntry {
                expansion: String::new(),
                eval: Evaluation::empty(),
                reported: false,
                complete: true,
            },
        );
        cache.insert(
            "FOO(1)".to_string(),
            CacheEntry {
                expansion: String::new(),
                eval: Evaluation::empty(),
                reported: false,
                complete: true,
            },
        );
        cache.insert(
            "FOOBAR".to_string(),
            CacheEntry {
                expansion: String::new(),
                eval: Evaluation::empty(),
                reported: false,
                complete: true,
            },
        );
        cache.erase_symbol("FOO");
        assert!(cache.get("FOO").is_none());
        assert!(cache.get("FOO(1)").is_none());
        assert!(cache.get("FOOBAR").is_some());
    }
}
