// ABOUTME: CLI entry point: argument parsing (including `-f FILE` option-file
// ABOUTME: expansion), the recursive file-system walker and extension filter,
// ABOUTME: backup/replace/spin output handling, and dispatch into the report
// ABOUTME: commands or the rewriting commands. This plumbing sits outside the
// ABOUTME: core driver (spec.md §1 scopes it out of the analysis engine
// ABOUTME: itself) but still owns the process's one `Driver` instance.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::{fs, process};

use clap::{CommandFactory, Parser};

use ppselect::commands::{self, ListOptions};
use ppselect::config::{CliArgs, Command};
use ppselect::diagnostic::{ABEND_IO, ABEND_USAGE, ExitBits, GagMask};
use ppselect::driver::{CoreConfig, Driver};
use ppselect::error::{PpError, Result as PpResult};

/// Print an I/O or usage error with the same reason code a diagnostic of
/// that cause would carry (spec.md §7), without exiting.
fn report(program: &str, err: &PpError) {
    let code = match err {
        PpError::ReadFile { .. } | PpError::WriteFile { .. } => ABEND_IO.reason_code(),
        PpError::BadOption(_) | PpError::Abend { .. } => ABEND_USAGE.reason_code(),
    };
    eprintln!("{program}: abend: [0x{code:04x}] {err}");
}

/// Report an error at the process boundary and exit with the abend bit set.
fn die(program: &str, err: PpError) -> ! {
    report(program, &err);
    process::exit(ExitBits::ABEND.bits() as i32);
}

fn main() {
    let raw_args: Vec<String> = std::env::args().collect();
    let program = PathBuf::from(&raw_args[0])
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ppselect".to_string());

    let expanded = expand_option_files(raw_args).unwrap_or_else(|e| die(&program, e));
    let args = CliArgs::parse_from(expanded);

    if matches!(args.command, Command::Help) {
        CliArgs::command().print_help().ok();
        println!();
        return;
    }
    if matches!(args.command, Command::Version) {
        println!("{program} {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(e) = validate_command_options(&args) {
        die(&program, e);
    }

    let mut gag = GagMask::default();
    for g in &args.gag {
        if !gag.set(g) {
            eprintln!("{program}: abend: [0x0402] -g: unknown severity \"{g}\"");
            process::exit(ExitBits::ABEND.bits() as i32);
        }
    }

    let cfg = match CoreConfig::from_args(&args) {
        Ok(cfg) => cfg,
        Err(msg) => {
            eprintln!("{program}: abend: [0x0402] {msg}");
            process::exit(ExitBits::ABEND.bits() as i32);
        }
    };

    if matches!(args.command, Command::Spin) && args.dir.is_none() {
        eprintln!("{program}: abend: [0x0402] spin: --dir is required");
        process::exit(ExitBits::ABEND.bits() as i32);
    }

    let mut driver = match Driver::new(program.clone(), gag, cfg) {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("{program}: abend: [0x0402] {msg}");
            process::exit(ExitBits::ABEND.bits() as i32);
        }
    };

    let inputs = collect_inputs(&args).unwrap_or_else(|e| die(&program, e));

    let opts = ListOptions::from_args(&args);
    let multiple = inputs.len() > 1;
    let stdin_only = inputs.is_empty();

    let is_listing = !matches!(args.command, Command::Source | Command::Spin);

    if stdin_only {
        let mut text = String::new();
        if let Err(source) = io::stdin().read_to_string(&mut text) {
            die(&program, PpError::ReadFile { path: PathBuf::from("<stdin>"), source });
        }
        run_one(&mut driver, &args, "<stdin>", &text, None);
        if is_listing {
            print_report(&mut driver, &args, &opts, "<stdin>", false);
        }
    } else {
        for path in &inputs {
            let text = match fs::read_to_string(path) {
                Ok(t) => t,
                Err(source) => {
                    let err = PpError::ReadFile { path: path.clone(), source };
                    report(&program, &err);
                    if args.keep_going {
                        continue;
                    }
                    driver.sink.summary();
                    process::exit(ExitBits::ABEND.bits() as i32);
                }
            };
            let label = path.display().to_string();
            run_one(&mut driver, &args, &label, &text, Some(path));
            if is_listing && args.once_per_file {
                print_report(&mut driver, &args, &opts, &label, multiple);
                driver.clear_occurrences();
            }
        }
        if is_listing && !args.once_per_file {
            print_report(&mut driver, &args, &opts, "", false);
        }
    }

    driver.sink.summary();
    process::exit(ppselect::driver::exit_code(&driver.sink) as i32);
}

/// Run one input's full round trip: process it, and for `source`/`spin`
/// write the rewritten text out immediately. Listing commands only
/// accumulate into the driver's occurrence log/symbol table here; printing
/// is the caller's job, since it may happen once per file or once overall.
fn run_one(driver: &mut Driver, args: &CliArgs, label: &str, text: &str, source_path: Option<&Path>) {
    let result = driver.process_text(text);
    if matches!(args.command, Command::Source | Command::Spin) {
        write_rewrite(args, source_path, &result.rendered, result.changed);
    }
}

/// Print the rows selected for the command currently running, against the
/// driver's accumulated occurrence log / symbol table.
fn print_report(driver: &mut Driver, args: &CliArgs, opts: &ListOptions, label: &str, multiple: bool) {
    let rows = match args.command {
        Command::Symbols => commands::list_symbols(driver, opts),
        Command::Includes => commands::list_includes(driver.occurrences_mut(), opts),
        Command::Defs => commands::list_defs(driver.occurrences_mut(), opts),
        Command::Pragmas => commands::list_pragmas(driver.occurrences_mut(), opts),
        Command::Errors => commands::list_errors(driver.occurrences_mut(), opts),
        Command::Lines => commands::list_lines(driver.occurrences_mut(), opts),
        Command::Directives => commands::list_directives(driver.occurrences_mut(), opts),
        Command::Help | Command::Version | Command::Source | Command::Spin => return,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for row in rows {
        if multiple {
            let _ = writeln!(out, "{label}:{}", row.render());
        } else {
            let _ = writeln!(out, "{}", row.render());
        }
    }
}

fn write_rewrite(args: &CliArgs, source_path: Option<&Path>, rendered: &str, changed: bool) {
    match args.command {
        Command::Source => {
            if args.replace {
                let Some(path) = source_path else {
                    print!("{rendered}");
                    return;
                };
                if changed {
                    if let Some(suffix) = &args.backup {
                        let backup = unique_backup_path(path, suffix);
                        let _ = fs::copy(path, backup);
                    }
                    if let Err(source) = fs::write(path, rendered) {
                        let err = PpError::WriteFile { path: path.to_path_buf(), source };
                        eprintln!("abend: [0x{:04x}] {err}", ABEND_IO.reason_code());
                    }
                }
            } else {
                print!("{rendered}");
            }
        }
        Command::Spin => {
            let dest_root = args.dir.as_ref().expect("validated above");
            let Some(path) = source_path else {
                print!("{rendered}");
                return;
            };
            let dest = dest_root.join(path);
            if let Some(parent) = dest.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(source) = fs::write(&dest, rendered) {
                let err = PpError::WriteFile { path: dest, source };
                eprintln!("abend: [0x{:04x}] {err}", ABEND_IO.reason_code());
            }
        }
        _ => unreachable!("write_rewrite only called for Source/Spin"),
    }
}

/// Append `--backup`'s suffix to `path`, retrying with a numeric tiebreaker
/// until an unused name is found (spec.md §5: "trying repeatedly until the
/// name is unique").
fn unique_backup_path(path: &Path, suffix: &str) -> PathBuf {
    let base = path.as_os_str().to_string_lossy().into_owned();
    let mut candidate = PathBuf::from(format!("{base}{suffix}"));
    let mut n = 1u32;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{base}{suffix}.{n}"));
        n += 1;
    }
    candidate
}

/// Disallowed listing options on a non-listing command are a usage error
/// (spec.md §6: "each command selects a fixed set of permitted options").
fn validate_command_options(args: &CliArgs) -> PpResult<()> {
    if ppselect::config::command_permits_listing_options(args.command) {
        return Ok(());
    }
    let any = args.ifs
        || args.defs
        || args.undefs
        || args.includes
        || args.lns
        || args.system
        || args.locate
        || args.once_only
        || args.once_per_file
        || args.active
        || args.inactive
        || args.local
        || args.expand
        || args.select.is_some()
        || args.explain;
    if any {
        Err(PpError::BadOption(format!(
            "{:?}: listing options are not permitted here",
            args.command
        )))
    } else {
        Ok(())
    }
}

/// Expand every `-f FILE`/`-fFILE` argument into the (whitespace-separated)
/// options it names, recursively, before handing the result to `clap`.
fn expand_option_files(args: Vec<String>) -> PpResult<Vec<String>> {
    let mut current = args;
    for _ in 0..16 {
        let mut out = Vec::new();
        let mut changed = false;
        let mut iter = current.into_iter();
        while let Some(a) = iter.next() {
            if a == "-f" {
                changed = true;
                if let Some(path) = iter.next() {
                    out.extend(read_option_file(&path)?);
                }
            } else if let Some(rest) = a.strip_prefix("-f").filter(|r| !r.is_empty()) {
                changed = true;
                out.extend(read_option_file(rest)?);
            } else {
                out.push(a);
            }
        }
        current = out;
        if !changed {
            break;
        }
    }
    Ok(current)
}

fn read_option_file(path: &str) -> PpResult<Vec<String>> {
    let contents = fs::read_to_string(path)
        .map_err(|source| PpError::ReadFile { path: PathBuf::from(path), source })?;
    Ok(contents.split_whitespace().map(str::to_string).collect())
}

/// Resolve the input file list: plain files as given, plus (under
/// `-R/--recurse`) every file under a given directory matching
/// `-F/--filter`'s extension list (no filter: every file).
fn collect_inputs(args: &CliArgs) -> PpResult<Vec<PathBuf>> {
    let exts: Option<Vec<String>> = args
        .filter
        .as_ref()
        .map(|f| f.split(',').map(|e| e.trim_start_matches('.').to_string()).collect());
    let mut files = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            if args.recurse {
                walk_dir(input, &exts, &mut files)?;
            }
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn walk_dir(dir: &Path, exts: &Option<Vec<String>>, out: &mut Vec<PathBuf>) -> PpResult<()> {
    let entries_iter = fs::read_dir(dir)
        .map_err(|source| PpError::ReadFile { path: dir.to_path_buf(), source })?;
    let mut entries: Vec<_> = entries_iter.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, exts, out)?;
        } else if matches_filter(&path, exts) {
            out.push(path);
        }
    }
    Ok(())
}

fn matches_filter(path: &Path, exts: &Option<Vec<String>>) -> bool {
    match exts {
        None => true,
        Some(list) => path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| list.iter().any(|want| want.eq_ignore_ascii_case(e)))
            .unwrap_or(false),
    }
}
