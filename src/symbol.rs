// ABOUTME: Symbol table: an arena of symbols linked by a contributor/
// ABOUTME: subscriber dependency graph, with snapshot-based dirty tracking.
// ABOUTME: Grounded on `symbol.h`/`symbol.cpp`.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use crate::param_list::FormalParameterList;
use crate::subst_format::Format;

/// Where a symbol's current configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Unconfigured,
    Global,
    Transient,
}

/// The snapshot a symbol's cached expansion/evaluation was resolved under.
/// `Real(n)` pairs with the table-wide snapshot counter; the three pseudo-
/// values stand in for states that have no real snapshot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    Pristine,
    DefineInProgress,
    UndefInProgress,
    Infinite,
    Real(u64),
}

/// An index into the symbol arena. Index 0 is reserved as the null locator
/// so `Locator` can be `Option`-free, matching the original's "null
/// locator" sentinel without needing a raw pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator(NonZeroUsize);

impl Locator {
    fn index(self) -> usize {
        self.0.get()
    }
}

#[derive(Debug)]
pub struct Symbol {
    id: String,
    provenance: Provenance,
    line: usize,
    defn: Option<String>,
    params: FormalParameterList,
    format: Option<Format>,
    snapshot: Snapshot,
    deselected: bool,
    invoked: bool,
    contributors: Vec<usize>,
    subscribers: Vec<usize>,
}

impl Symbol {
    fn new(id: String) -> Self {
        Symbol {
            id,
            provenance: Provenance::Unconfigured,
            line: 0,
            defn: None,
            params: FormalParameterList::default(),
            format: None,
            snapshot: Snapshot::Pristine,
            deselected: false,
            invoked: false,
            contributors: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> Provenance {
        self.provenance
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn defn(&self) -> Option<&str> {
        self.defn.as_deref()
    }

    pub fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    pub fn defined(&self) -> bool {
        self.defn.is_some()
    }

    pub fn parameters(&self) -> &FormalParameterList {
        &self.params
    }

    pub fn which_parameter(&self, text: &str) -> Option<usize> {
        self.params.base().iter().position(|p| p == text)
    }

    pub fn variadic(&self) -> bool {
        self.params.base().variadic()
    }

    pub fn configured(&self) -> bool {
        matches!(self.provenance, Provenance::Global | Provenance::Transient)
    }

    pub fn deselected(&self) -> bool {
        self.deselected
    }

    pub fn invoked(&self) -> bool {
        self.invoked
    }

    pub fn self_referential(&self) -> bool {
        self.snapshot == Snapshot::Infinite
    }

    pub fn clean(&self) -> bool {
        !matches!(self.snapshot, Snapshot::Pristine)
    }

    pub fn in_progress(&self) -> bool {
        matches!(
            self.snapshot,
            Snapshot::DefineInProgress | Snapshot::UndefInProgress
        )
    }

    pub fn dirty(&self, current_snapshot: u64) -> bool {
        if self.self_referential() {
            return false;
        }
        match self.snapshot {
            Snapshot::Real(n) => n < current_snapshot,
            _ => true,
        }
    }

    pub fn signature(&self) -> String {
        format!("{}{}", self.id, self.params.base().text())
    }
}

/// Owns the symbol arena and the name→index table. Constructed fresh per
/// `Driver` and reset per input file (spec.md §5's lifecycle).
#[derive(Debug)]
pub struct SymbolTable {
    arena: Vec<Symbol>,
    index: HashMap<String, usize>,
    snapshot_counter: u64,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            // Index 0 is the reserved null entry; Locator is never built
            // over it.
            arena: vec![Symbol::new(String::new())],
            index: HashMap::new(),
            snapshot_counter: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = SymbolTable::new();
    }

    pub fn count(&self) -> usize {
        self.arena.len() - 1
    }

    pub fn count_with_provenance(&self, source: Provenance) -> usize {
        self.arena[1..]
            .iter()
            .filter(|s| s.provenance == source)
            .count()
    }

    pub fn lookup(&self, id: &str) -> Option<Locator> {
        self.index
            .get(id)
            .and_then(|&i| NonZeroUsize::new(i))
            .map(Locator)
    }

    /// Look up or create a symbol, matching `locator(id, provenance)`'s
    /// insert-on-demand semantics.
    pub fn locate(&mut self, id: &str, provenance: Provenance) -> Locator {
        if let Some(&i) = self.index.get(id) {
            self.arena[i].provenance = provenance;
            return Locator(NonZeroUsize::new(i).unwrap());
        }
        let mut sym = Symbol::new(id.to_string());
        sym.provenance = provenance;
        self.arena.push(sym);
        let i = self.arena.len() - 1;
        self.index.insert(id.to_string(), i);
        Locator(NonZeroUsize::new(i).unwrap())
    }

    pub fn get(&self, loc: Locator) -> &Symbol {
        &self.arena[loc.index()]
    }

    pub fn get_mut(&mut self, loc: Locator) -> &mut Symbol {
        &mut self.arena[loc.index()]
    }

    pub fn current_snapshot(&self) -> u64 {
        self.snapshot_counter
    }

    /// Record that `subscriber`'s resolved value depends on `contributor`,
    /// used to cascade dirtying when `contributor` is redefined.
    pub fn add_dependency(&mut self, subscriber: Locator, contributor: Locator) {
        let (s, c) = (subscriber.index(), contributor.index());
        if !self.arena[c].subscribers.contains(&s) {
            self.arena[c].subscribers.push(s);
        }
        if !self.arena[s].contributors.contains(&c) {
            self.arena[s].contributors.push(c);
        }
    }

    /// Define (or redefine) a symbol: set its definition/parameters, bump
    /// the table-wide snapshot, and mark the symbol plus every transitive
    /// subscriber pristine so their caches are recomputed. Detects defn
    /// cycles through itself and marks them `self_referential` instead of
    /// looping forever.
    pub fn define(&mut self, loc: Locator, defn: String, params: FormalParameterList) {
        self.snapshot_counter += 1;
        let i = loc.index();
        self.arena[i].format = if !defn.is_empty() {
            Format::build(&defn, params.base()).ok()
        } else {
            None
        };
        self.arena[i].defn = Some(defn);
        self.arena[i].params = params;
        self.arena[i].line = 0;
        self.arena[i].snapshot = Snapshot::DefineInProgress;
        self.dirty_subscribers_of(i);
        self.arena[i].snapshot = Snapshot::Real(self.snapshot_counter);
    }

    pub fn undef(&mut self, loc: Locator) {
        self.snapshot_counter += 1;
        let i = loc.index();
        self.arena[i].defn = None;
        self.arena[i].format = None;
        self.arena[i].params = FormalParameterList::default();
        self.arena[i].snapshot = Snapshot::UndefInProgress;
        self.dirty_subscribers_of(i);
        self.arena[i].snapshot = Snapshot::Real(self.snapshot_counter);
    }

    fn dirty_subscribers_of(&mut self, i: usize) {
        let mut stack = self.arena[i].subscribers.clone();
        let mut seen = std::collections::HashSet::new();
        while let Some(s) = stack.pop() {
            if s == i {
                self.arena[i].snapshot = Snapshot::Infinite;
                continue;
            }
            if !seen.insert(s) {
                continue;
            }
            self.arena[s].snapshot = Snapshot::Pristine;
            stack.extend(self.arena[s].subscribers.iter().copied());
        }
    }

    pub fn set_invoked(&mut self, loc: Locator) {
        self.arena[loc.index()].invoked = true;
    }

    pub fn set_deselected(&mut self, loc: Locator, deselected: bool) {
        self.arena[loc.index()].deselected = deselected;
    }

    pub fn set_line(&mut self, loc: Locator, line: usize) {
        self.arena[loc.index()].line = line;
    }

    /// Locators this symbol's definition currently depends on.
    pub fn contributors_of(&self, loc: Locator) -> Vec<Locator> {
        self.arena[loc.index()]
            .contributors
            .iter()
            .filter_map(|&i| NonZeroUsize::new(i).map(Locator))
            .collect()
    }

    /// Locators this symbol's subscribers; dependency inverse of `contributors_of`.
    pub fn subscribers_of(&self, loc: Locator) -> Vec<Locator> {
        self.arena[loc.index()]
            .subscribers
            .iter()
            .filter_map(|&i| NonZeroUsize::new(i).map(Locator))
            .collect()
    }

    /// Force `loc`'s snapshot to the pseudo-value that marks it as caught
    /// in a definition cycle (spec.md §4.4's self-referential detection).
    pub fn mark_self_referential(&mut self, loc: Locator) {
        self.arena[loc.index()].snapshot = Snapshot::Infinite;
    }

    /// Does `of`'s transitive contributor closure contain `candidate`?
    /// Used by the subscription algorithm to detect a would-be cycle
    /// before it's wired in (spec.md §4.4: "if `other` transitively
    /// subscribes to self").
    pub fn is_transitive_contributor(&self, candidate: Locator, of: Locator) -> bool {
        let mut stack = self.arena[of.index()].contributors.clone();
        let mut seen = std::collections::HashSet::new();
        while let Some(i) = stack.pop() {
            if i == candidate.index() {
                return true;
            }
            if !seen.insert(i) {
                continue;
            }
            stack.extend(self.arena[i].contributors.iter().copied());
        }
        false
    }

    /// Drop every dependency edge in the table, without touching the
    /// symbols themselves (spec.md §4.4's per-file "unsubscribe every
    /// symbol" step).
    pub fn unsubscribe_all(&mut self) {
        for sym in self.arena.iter_mut() {
            sym.contributors.clear();
            sym.subscribers.clear();
        }
    }

    /// Remove every transient symbol outright (spec.md §4.4's per-file
    /// "erase every transient symbol" step); global (`-D`/`-U`) symbols
    /// and their dependency edges, already cleared by `unsubscribe_all`,
    /// survive.
    pub fn erase_transients(&mut self) {
        let keep: Vec<Symbol> = self
            .arena
            .drain(..)
            .enumerate()
            .filter(|(i, sym)| *i == 0 || sym.provenance != Provenance::Transient)
            .map(|(_, sym)| sym)
            .collect();
        self.arena = keep;
        self.index.clear();
        for (i, sym) in self.arena.iter().enumerate().skip(1) {
            self.index.insert(sym.id.clone(), i);
        }
    }

    /// All non-null locators currently in the table, in arena order.
    pub fn all_locators(&self) -> Vec<Locator> {
        (1..self.arena.len())
            .filter_map(NonZeroUsize::new)
            .map(Locator)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_creates_then_reuses_same_slot() {
        let mut t = SymbolTable::new();
        let a = t.locate("FOO", Provenance::Global);
        let b = t.locate("FOO", Provenance::Transient);
        assert_eq!(a, b);
        assert_eq!(t.get(a).origin(), Provenance::Transient);
    }

    #[test]
    fn lookup_of_unknown_symbol_is_none() {
        let t = SymbolTable::new();
        assert!(t.lookup("NOPE").is_none());
    }

    #[test]
    fn freshly_located_symbol_is_pristine_and_not_clean() {
        let mut t = SymbolTable::new();
        let a = t.locate("FOO", Provenance::Global);
        assert!(!t.get(a).clean());
    }

    #[test]
    fn define_leaves_symbol_clean_with_real_snapshot() {
        let mut t = SymbolTable::new();
        let a = t.locate("FOO", Provenance::Global);
        t.define(a, "1".to_string(), FormalParameterList::default());
        assert!(t.get(a).clean());
        assert!(t.get(a).defined());
    }

    #[test]
    fn redefining_a_contributor_dirties_its_subscribers() {
        let mut t = SymbolTable::new();
        let base = t.locate("BASE", Provenance::Global);
        let derived = t.locate("DERIVED", Provenance::Global);
        t.define(base, "1".to_string(), FormalParameterList::default());
        t.define(derived, "BASE".to_string(), FormalParameterList::default());
        t.add_dependency(derived, base);
        let snap_before = t.current_snapshot();
        t.define(base, "2".to_string(), FormalParameterList::default());
        assert!(t.get(derived).dirty(t.current_snapshot()));
        assert!(snap_before < t.current_snapshot());
    }

    #[test]
    fn self_referential_definition_is_detected() {
        let mut t = SymbolTable::new();
        let a = t.locate("A", Provenance::Global);
        t.define(a, "A".to_string(), FormalParameterList::default());
        t.add_dependency(a, a);
        t.define(a, "A + 1".to_string(), FormalParameterList::default());
        assert!(t.get(a).self_referential());
    }

    #[test]
    fn undef_clears_definition() {
        let mut t = SymbolTable::new();
        let a = t.locate("FOO", Provenance::Global);
        t.define(a, "1".to_string(), FormalParameterList::default());
        t.undef(a);
        assert!(!t.get(a).defined());
    }

    #[test]
    fn count_excludes_the_reserved_null_entry() {
        let mut t = SymbolTable::new();
        assert_eq!(t.count(), 0);
        t.locate("A", Provenance::Global);
        t.locate("B", Provenance::Global);
        assert_eq!(t.count(), 2);
    }

    #[test]
    fn is_transitive_contributor_follows_the_chain() {
        let mut t = SymbolTable::new();
        let a = t.locate("A", Provenance::Global);
        let b = t.locate("B", Provenance::Global);
        let c = t.locate("C", Provenance::Global);
        t.add_dependency(b, a);
        t.add_dependency(c, b);
        assert!(t.is_transitive_contributor(a, c));
        assert!(!t.is_transitive_contributor(c, a));
    }

    #[test]
    fn erase_transients_keeps_only_global_symbols() {
        let mut t = SymbolTable::new();
        t.locate("FOO", Provenance::Global);
        t.locate("BAR", Provenance::Transient);
        t.erase_transients();
        assert!(t.lookup("FOO").is_some());
        assert!(t.lookup("BAR").is_none());
    }

    #[test]
    fn unsubscribe_all_clears_dependency_edges() {
        let mut t = SymbolTable::new();
        let a = t.locate("A", Provenance::Global);
        let b = t.locate("B", Provenance::Global);
        t.add_dependency(b, a);
        t.unsubscribe_all();
        assert!(t.contributors_of(b).is_empty());
        assert!(t.subscribers_of(a).is_empty());
    }
}
