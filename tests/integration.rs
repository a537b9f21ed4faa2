// ABOUTME: End-to-end coverage of the documented scenarios, driving the
// ABOUTME: whole pipeline through `Driver` rather than any one module.

use ppselect::config::{parse_define_option, ConflictPolicy, DiscardPolicy, GlobalDef};
use ppselect::diagnostic::GagMask;
use ppselect::driver::{CoreConfig, Driver};

fn driver_with(globals: Vec<GlobalDef>) -> Driver {
    driver_with_explain(globals, false)
}

fn driver_with_explain(globals: Vec<GlobalDef>, explain: bool) -> Driver {
    let cfg = CoreConfig {
        cxx: true,
        implicit: false,
        no_transients: false,
        conflict: ConflictPolicy::Delete,
        discard: DiscardPolicy::Drop,
        line_directives: false,
        keep_going: false,
        max_expansion: ppselect::reference::DEFAULT_MAX_EXPANSION,
        globals,
        explain,
    };
    Driver::new("ppselect", GagMask::default(), cfg).unwrap()
}

#[test]
fn scenario_one_simple_if_else_selects_the_true_branch() {
    let mut d = driver_with(vec![parse_define_option(true, "FOO").unwrap()]);
    let result = d.process_text("#if FOO\nA\n#else\nB\n#endif\n");
    assert_eq!(result.rendered, "A\n");
}

#[test]
fn scenario_two_nested_ternary_drops_the_guarded_body() {
    let mut d = driver_with(vec![
        parse_define_option(true, "FOO=1").unwrap(),
        parse_define_option(true, "BAR=0").unwrap(),
    ]);
    let result = d.process_text("#if (FOO ? (BAR ? 1 : 0) : 1)\nX\n#endif\n");
    assert_eq!(result.rendered, "");
}

#[test]
fn scenario_three_nested_ternary_retains_the_guarded_body() {
    let mut d = driver_with(vec![
        parse_define_option(true, "FOO=1").unwrap(),
        parse_define_option(true, "BAR=0").unwrap(),
    ]);
    let result = d.process_text("#if (FOO ? 1 : 0)\nY\n#endif\n");
    assert_eq!(result.rendered, "Y\n");
}

#[test]
fn scenario_four_explain_names_the_nested_macro_a_definition_invokes() {
    let mut d = driver_with(Vec::new());
    d.process_text(
        "#define type_comb2(T1,T2) __typeof__(0 ? (T1)0 : (T2)0)\n\
         #define type_comb3(T1,T2,T3) type_comb2(T1, type_comb2(T2,T3))\n",
    );
    let comb3 = d.symbols().lookup("type_comb3").unwrap();
    let steps = d.explain_symbol(comb3);
    assert_eq!(steps.len(), 1);
    assert!(steps[0].contains("type_comb2"));
    assert!(steps[0].contains("__typeof__"));

    let comb2 = d.symbols().lookup("type_comb2").unwrap();
    assert!(d.explain_symbol(comb2).is_empty());
}

#[test]
fn scenario_five_token_paste_collapses_to_one_specifier_per_operand() {
    let mut d = driver_with(vec![parse_define_option(true, "FOO").unwrap()]);
    d.process_text("#if FOO\n#define M(x) A_ ## x ## _B\n#endif\n");
    let m = d.symbols().lookup("M").unwrap();
    let sym = d.symbols().get(m);
    let defn = sym.defn().unwrap().to_string();
    let params = sym.parameters().base().clone();

    let fmt = ppselect::subst_format::Format::build(&defn, &params).unwrap();
    let legible = fmt.legible();
    // `x` is written once in the source, so it compiles to exactly one
    // specifier even though it sits between two paste operators.
    assert_eq!(legible.matches("as-is").count(), 1);
    assert_eq!(legible.matches("expanded").count(), 0);
    assert!(!legible.contains("  "));
}

#[test]
fn scenario_six_undef_then_matching_define_is_forgotten_and_both_lines_drop() {
    let mut d = driver_with(vec![parse_define_option(true, "X=1").unwrap()]);
    let result = d.process_text("#undef X\n#define X 1\n");
    assert_eq!(result.rendered, "");
    assert_eq!(
        d.sink.exit_code() & ppselect::diagnostic::ExitBits::WARNING.bits(),
        0
    );
}

#[test]
fn explain_under_source_emits_an_expansion_step_diagnostic() {
    let mut d = driver_with_explain(Vec::new(), true);
    d.process_text("#define BASE 1\n#define DERIVED BASE\n");
    let found = d.sink.emitted().iter().any(|diag| {
        diag.cause == ppselect::diagnostic::INFO_EXPANSION_STEP
            && diag.message.contains("line 2")
            && diag.message.contains("BASE")
    });
    assert!(found);
}

#[test]
fn idempotence_of_simplification_in_source_mode() {
    let text = "#define FOO 1\n#if FOO\nA\n#else\nB\n#endif\n";
    let mut first = driver_with(vec![parse_define_option(true, "FOO").unwrap()]);
    let once = first.process_text(text).rendered;

    let mut second = driver_with(vec![parse_define_option(true, "FOO").unwrap()]);
    let twice = second.process_text(&once).rendered;

    assert_eq!(once, twice);
}

#[test]
fn cache_coherence_redefining_a_base_symbol_dirties_its_dependents() {
    let mut d = driver_with(Vec::new());
    d.process_text("#define BASE 1\n#define DERIVED BASE\n");
    let derived = d.symbols().lookup("DERIVED").unwrap();
    let snap_before = d.symbols().current_snapshot();
    assert!(!d.symbols().get(derived).dirty(snap_before));

    d.process_text("#undef BASE\n#define BASE 2\n#define DERIVED BASE\n");
    let derived_again = d.symbols().lookup("DERIVED").unwrap();
    let snap_after = d.symbols().current_snapshot();
    assert!(!d.symbols().get(derived_again).dirty(snap_after));
}
