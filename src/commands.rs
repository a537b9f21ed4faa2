// ABOUTME: Report-command formatting over the occurrence log and symbol
// ABOUTME: table: the `symbols`/`includes`/`defs`/`pragmas`/`errors`/`lines`/
// ABOUTME: `directives` listings. Grounded on `options.h`'s listing-option
// ABOUTME: accessors (`list_locate`, `list_only_once`, `list_system_includes`,
// ABOUTME: `expand_references`, `selected_symbols`, ...) and spec.md §6; the
// ABOUTME: original's own report driver (coan.cpp) isn't in the filtered
// ABOUTME: source pack, so row shape follows the option descriptions rather
// ABOUTME: than a ported file.

use crate::config::CliArgs;
use crate::directive::{DirectiveType, Occurrence, OccurrenceLog};
use crate::driver::Driver;

/// One reportable row: the directive/symbol text plus the source line
/// `--locate` asks for. Printing is `main`'s job; this module only selects
/// and formats rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub text: String,
    pub line: Option<usize>,
}

impl ReportRow {
    pub fn render(&self) -> String {
        match self.line {
            Some(n) => format!("{n}: {}", self.text),
            None => self.text.clone(),
        }
    }
}

/// The listing options that gate which rows a report command prints, lifted
/// out of `CliArgs` once rather than threading the whole struct through
/// every formatting function.
pub struct ListOptions {
    pub locate: bool,
    pub once_only: bool,
    pub once_per_file: bool,
    pub system: bool,
    pub local: bool,
    pub active: bool,
    pub inactive: bool,
    pub expand: bool,
    pub explain: bool,
    pub complement: bool,
    pub select: Option<Vec<String>>,
    pub ifs: bool,
    pub defs: bool,
    pub undefs: bool,
    pub includes: bool,
    pub lns: bool,
}

impl ListOptions {
    pub fn from_args(args: &CliArgs) -> Self {
        ListOptions {
            locate: args.locate,
            once_only: args.once_only,
            once_per_file: args.once_per_file,
            system: args.system,
            local: args.local,
            active: args.active,
            inactive: args.inactive,
            expand: args.expand,
            explain: args.explain,
            complement: args.complement,
            select: args
                .select
                .as_ref()
                .map(|s| s.split(',').map(str::to_string).collect()),
            ifs: args.ifs,
            defs: args.defs,
            undefs: args.undefs,
            includes: args.includes,
            lns: args.lns,
        }
    }

    /// `--select PAT1[,PAT2...]`: `*` is permitted only as the final
    /// character of a pattern (spec.md §6).
    fn symbol_selected(&self, id: &str) -> bool {
        match &self.select {
            None => true,
            Some(patterns) => patterns.iter().any(|p| match p.strip_suffix('*') {
                Some(prefix) => id.starts_with(prefix),
                None => id == p,
            }),
        }
    }

    /// Whether an occurrence's recorded liveness passes `--active`/
    /// `--inactive`/`--complement`. With neither flag given, every
    /// occurrence passes.
    fn passes_liveness(&self, occ: Occurrence) -> bool {
        if !self.active && !self.inactive {
            return true;
        }
        let matches = (self.active && occ.active) || (self.inactive && occ.inactive);
        if self.complement {
            !matches
        } else {
            matches
        }
    }

    /// `--once-only`: suppress rows already marked reported (across the
    /// whole run, or since the last `--once-per-file` reset).
    fn passes_once(&self, occ: Occurrence) -> bool {
        !self.once_only || !occ.reported
    }
}

/// List every directive text recorded under `dtype`, in `once-only`/
/// liveness/ordering order, marking each emitted row reported so a later
/// call (or `--once-only` on a later directive type) sees it as seen.
fn list_directive(log: &mut OccurrenceLog, opts: &ListOptions, dtype: DirectiveType) -> Vec<ReportRow> {
    let mut rows: Vec<(String, Occurrence)> = log
        .entries(dtype)
        .filter(|(_, occ)| opts.passes_liveness(*occ))
        .filter(|(_, occ)| opts.passes_once(*occ))
        .map(|(text, occ)| (text.to_string(), occ))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    for (text, _) in &rows {
        log.mark_reported(dtype, text);
    }
    rows.into_iter()
        .map(|(text, _)| ReportRow { text, line: None })
        .collect()
}

/// `includes` command: filtered further by `-s/--system`/`-l/--local`
/// (system = `<...>`, local = `"..."`; with neither set, both are listed).
pub fn list_includes(log: &mut OccurrenceLog, opts: &ListOptions) -> Vec<ReportRow> {
    list_directive(log, opts, DirectiveType::Include)
        .into_iter()
        .filter(|row| {
            let is_system = row.text.starts_with('<');
            if opts.system && !opts.local {
                is_system
            } else if opts.local && !opts.system {
                !is_system
            } else {
                true
            }
        })
        .collect()
}

/// `defs` command: `#define`s, `#undef`s, or both, per `--defs`/`--undefs`
/// (neither set lists both, matching the original's "no filter" default).
pub fn list_defs(log: &mut OccurrenceLog, opts: &ListOptions) -> Vec<ReportRow> {
    let want_defines = opts.defs || !opts.undefs;
    let want_undefs = opts.undefs || !opts.defs;
    let mut rows = Vec::new();
    if want_defines {
        rows.extend(list_directive(log, opts, DirectiveType::Define));
    }
    if want_undefs {
        rows.extend(list_directive(log, opts, DirectiveType::Undef));
    }
    rows.sort_by(|a, b| a.text.cmp(&b.text));
    rows
}

pub fn list_pragmas(log: &mut OccurrenceLog, opts: &ListOptions) -> Vec<ReportRow> {
    list_directive(log, opts, DirectiveType::Pragma)
}

pub fn list_errors(log: &mut OccurrenceLog, opts: &ListOptions) -> Vec<ReportRow> {
    list_directive(log, opts, DirectiveType::Error)
}

pub fn list_lines(log: &mut OccurrenceLog, opts: &ListOptions) -> Vec<ReportRow> {
    list_directive(log, opts, DirectiveType::Line)
}

/// `directives` command: every directive type, or the subset named by
/// `--ifs`/`--defs`/`--undefs`/`--includes`/`--lns` (none set lists all).
pub fn list_directives(log: &mut OccurrenceLog, opts: &ListOptions) -> Vec<ReportRow> {
    let any_filter = opts.ifs || opts.defs || opts.undefs || opts.includes || opts.lns;
    let wants = |flag: bool| !any_filter || flag;
    let mut rows = Vec::new();
    if wants(opts.ifs) {
        rows.extend(list_directive(log, opts, DirectiveType::If));
        rows.extend(list_directive(log, opts, DirectiveType::Ifdef));
        rows.extend(list_directive(log, opts, DirectiveType::Ifndef));
        rows.extend(list_directive(log, opts, DirectiveType::Elif));
    }
    if wants(opts.defs) {
        rows.extend(list_directive(log, opts, DirectiveType::Define));
    }
    if wants(opts.undefs) {
        rows.extend(list_directive(log, opts, DirectiveType::Undef));
    }
    if wants(opts.includes) {
        rows.extend(list_directive(log, opts, DirectiveType::Include));
    }
    if wants(opts.lns) {
        rows.extend(list_directive(log, opts, DirectiveType::Line));
    }
    rows.extend(list_directive(log, opts, DirectiveType::Pragma));
    rows.extend(list_directive(log, opts, DirectiveType::Error));
    rows.sort_by(|a, b| a.text.cmp(&b.text));
    rows
}

/// `symbols` command: every configured symbol (`-D`/`-U` globals plus any
/// in-source `#define`/`#undef` still live at the point the file ended),
/// restricted by `--select`, annotated with its expansion under
/// `-e/--expand`.
pub fn list_symbols(driver: &mut Driver, opts: &ListOptions) -> Vec<ReportRow> {
    let locators: Vec<_> = driver
        .symbols()
        .all_locators()
        .into_iter()
        .filter(|&loc| driver.symbols().get(loc).configured())
        .filter(|&loc| opts.symbol_selected(driver.symbols().get(loc).id()))
        .collect();

    let mut rows: Vec<ReportRow> = locators
        .into_iter()
        .map(|loc| {
            let sym = driver.symbols().get(loc);
            let mut text = sym.signature();
            let defn = sym.defn().map(str::to_string);
            let self_referential = sym.self_referential();
            let line = sym.line();
            if let Some(defn) = &defn {
                text.push_str(" = ");
                if opts.expand {
                    match driver.expand_symbol(loc) {
                        Some(expanded) => text.push_str(&expanded),
                        None => text.push_str(defn),
                    }
                } else {
                    text.push_str(defn);
                }
            }
            if self_referential {
                text.push_str(" [self-referential]");
            }
            if opts.explain {
                for step in driver.explain_symbol(loc) {
                    text.push_str(" => ");
                    text.push_str(&step);
                }
            }
            ReportRow {
                text,
                line: if opts.locate { Some(line) } else { None },
            }
        })
        .collect();
    rows.sort_by(|a, b| a.text.cmp(&b.text));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConflictPolicy, DiscardPolicy, GlobalDef};
    use crate::diagnostic::GagMask;
    use crate::driver::CoreConfig;

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

    fn default_opts() -> ListOptions {
        ListOptions {
            locate: false,
            once_only: false,
            once_per_file: false,
            system: false,
            local: false,
            active: false,
            inactive: false,
            expand: false,
            explain: false,
            complement: false,
            select: None,
            ifs: false,
            defs: false,
            undefs: false,
            includes: false,
            lns: false,
        }
    }

    #[test]
    fn list_symbols_reports_a_configured_global() {
        let mut d = driver_with(vec![crate::config::parse_define_option(true, "FOO=1").unwrap()]);
        d.process_text("A\n");
        let rows = list_symbols(&mut d, &default_opts());
        assert_eq!(rows.len(), 1);
        assert!(rows[0].text.contains("FOO"));
    }

    #[test]
    fn select_restricts_symbol_listing_with_trailing_wildcard() {
        let mut d = driver_with(vec![
            crate::config::parse_define_option(true, "FOO_A=1").unwrap(),
            crate::config::parse_define_option(true, "BAR=1").unwrap(),
        ]);
        d.process_text("A\n");
        let mut opts = default_opts();
        opts.select = Some(vec!["FOO_*".to_string()]);
        let rows = list_symbols(&mut d, &opts);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].text.contains("FOO_A"));
    }

    #[test]
    fn list_includes_filters_by_system_vs_local() {
        let mut d = driver_with(Vec::new());
        d.process_text("#include <a.h>\n#include \"b.h\"\n");
        let mut opts = default_opts();
        opts.system = true;
        let rows = list_includes(d.occurrences_mut(), &opts);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].text.contains("a.h"));
    }

    #[test]
    fn once_only_suppresses_an_already_reported_row() {
        let mut d = driver_with(Vec::new());
        d.process_text("#pragma once\n");
        let mut opts = default_opts();
        opts.once_only = true;
        let first = list_pragmas(d.occurrences_mut(), &opts);
        assert_eq!(first.len(), 1);
        let second = list_pragmas(d.occurrences_mut(), &opts);
        assert!(second.is_empty());
    }

    #[test]
    fn active_filter_excludes_a_directive_only_seen_dead() {
        let mut d = driver_with(vec![crate::config::parse_define_option(true, "OFF=0").unwrap()]);
        d.process_text("#if OFF\n#pragma only_if_off\n#endif\n");
        let mut opts = default_opts();
        opts.active = true;
        let rows = list_pragmas(d.occurrences_mut(), &opts);
        assert!(rows.is_empty());
    }

    #[test]
    fn explain_lists_the_nested_macro_a_definition_invokes() {
        let mut d = driver_with(Vec::new());
        d.process_text(
            "#define type_comb2(T1,T2) __typeof__(0 ? (T1)0 : (T2)0)\n\
             #define type_comb3(T1,T2,T3) type_comb2(T1, type_comb2(T2,T3))\n",
        );
        let mut opts = default_opts();
        opts.explain = true;
        let rows = list_symbols(&mut d, &opts);
        let comb3 = rows.iter().find(|r| r.text.starts_with("type_comb3")).unwrap();
        assert!(comb3.text.contains("type_comb2"));
        assert!(comb3.text.contains("__typeof__"));
        let comb2 = rows.iter().find(|r| r.text.starts_with("type_comb2")).unwrap();
        assert!(!comb2.text.contains("=>"));
    }
}
