// ABOUTME: Formal parameter lists and macro-reference argument lists
// ABOUTME: (spec.md §3). Grounded on `parameter_list_base.h`,
// ABOUTME: `argument_list.h`/`.cpp`, `formal_parameter_list.h`/`.cpp`.

use crate::cursor::{Cursor, ScanMode};

/// Read and canonicalise a single macro argument, stopping at the top-level
/// `,` or `)` that ends it (mirrors `canonical<macro_argument>`, but driven
/// directly off the shared cursor so the caller's position stays in sync).
fn read_one_argument(cxx: bool, cur: &mut Cursor) -> String {
    let mut out = String::new();
    let mut paren_balance: i32 = 0;
    loop {
        cur.scan(ScanMode::CComment);
        if !cur.in_range() {
            break;
        }
        let c = cur.current_char();
        if c == b'(' {
            paren_balance += 1;
            out.push('(');
            cur.on(1);
            continue;
        }
        if c == b')' {
            if paren_balance == 0 {
                break;
            }
            paren_balance -= 1;
            out.push(')');
            cur.on(1);
            continue;
        }
        if c == b',' {
            if paren_balance <= 0 {
                break;
            }
            out.push(',');
            cur.on(1);
            continue;
        }
        if !c.is_ascii_whitespace() {
            out.push(c as char);
            cur.on(1);
            continue;
        }
        if let Some(&last) = out.as_bytes().last() {
            if !last.is_ascii_whitespace() && (last == b'#' || !last.is_ascii_punctuation()) {
                out.push(' ');
            }
        }
        cur.on(1);
    }
    let _ = cxx;
    out
}

/// Why a parameter/argument list failed to parse cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    None,
    EmptyParam,
    Unclosed,
    NonParam,
}

/// Common state shared by formal-parameter lists and argument lists: a
/// possibly-null vector of canonicalised member strings, a defect code, and
/// a variadic flag.
#[derive(Debug, Clone)]
pub struct ParameterListBase {
    params: Option<Vec<String>>,
    defect_: Option<Defect>,
    variadic_: bool,
}

impl Default for ParameterListBase {
    /// The null list: no `(...)` at all, vacuously well-formed.
    fn default() -> Self {
        ParameterListBase {
            params: None,
            defect_: Some(Defect::None),
            variadic_: false,
        }
    }
}

impl ParameterListBase {
    pub fn placeholders(n: usize) -> Self {
        let params = if n > 0 {
            Some((1..=n).map(|i| format!("${i}")).collect())
        } else {
            None
        };
        ParameterListBase {
            params,
            defect_: Some(Defect::None),
            variadic_: false,
        }
    }

    pub fn well_formed(&self) -> bool {
        matches!(self.defect_, Some(Defect::None))
    }

    pub fn defect(&self) -> Defect {
        self.defect_.unwrap_or(Defect::None)
    }

    pub fn variadic(&self) -> bool {
        self.variadic_
    }

    /// Size 0 both for the null list ("") and the empty list ("()").
    pub fn size(&self) -> usize {
        self.params.as_ref().map_or(0, |p| p.len())
    }

    /// Not even "()" was present.
    pub fn is_null(&self) -> bool {
        self.params.is_none()
    }

    pub fn at(&self, n: usize) -> Option<&str> {
        self.params.as_ref().and_then(|p| p.get(n)).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.params.iter().flatten().map(|s| s.as_str())
    }

    /// Canonical string representation: `(a,b,c)`, `()`, or `` (null).
    pub fn text(&self) -> String {
        match &self.params {
            None => String::new(),
            Some(p) => format!("({})", p.join(",")),
        }
    }
}

/// A macro's formal parameter list, e.g. from `#define F(a,b,...)`.
#[derive(Debug, Clone, Default)]
pub struct FormalParameterList {
    base: ParameterListBase,
}

impl FormalParameterList {
    pub fn placeholders(n: usize) -> Self {
        FormalParameterList {
            base: ParameterListBase::placeholders(n),
        }
    }

    pub fn base(&self) -> &ParameterListBase {
        &self.base
    }

    /// Read a formal parameter list starting at `cur`'s current position.
    /// If `cur` isn't positioned on `(`, the list is left null (no
    /// parameter list at all, as distinct from the empty list `()`).
    pub fn read(cxx: bool, cur: &mut Cursor) -> FormalParameterList {
        let mut list = FormalParameterList::default();
        if !cur.in_range() || cur.current_char() != b'(' {
            list.base.params = None;
            list.base.defect_ = Some(Defect::None);
            return list;
        }
        list.base.defect_ = Some(Defect::None);
        cur.on(1);
        cur.scan(ScanMode::Greyspace);

        let mut params = Vec::new();
        let mut param = String::new();
        loop {
            if !cur.in_range() {
                list.base.defect_ = Some(Defect::Unclosed);
                break;
            }
            cur.scan(ScanMode::Continuation);
            let start = cur.position();
            if cur.in_range() && (cur.current_char().is_ascii_alphabetic() || cur.current_char() == b'_') {
                cur.on(1);
                loop {
                    cur.scan(ScanMode::Continuation);
                    if cur.in_range()
                        && (cur.current_char().is_ascii_alphanumeric() || cur.current_char() == b'_')
                    {
                        cur.on(1);
                    } else {
                        break;
                    }
                }
            }
            param = cur.text(start, cur.position()).to_string();
            cur.scan(ScanMode::Greyspace);

            if param.is_empty() {
                if cur.in_range() && cur.current_char() == b'.' {
                    cur.on(1);
                    cur.scan(ScanMode::Continuation);
                    if !cur.in_range() || cur.current_char() != b'.' {
                        list.base.defect_ = Some(Defect::Unclosed);
                        break;
                    }
                    cur.on(1);
                    cur.scan(ScanMode::Continuation);
                    if !cur.in_range() || cur.current_char() != b'.' {
                        list.base.defect_ = Some(Defect::Unclosed);
                        break;
                    }
                    list.base.variadic_ = true;
                    param = "...".to_string();
                    cur.on(1);
                    cur.scan(ScanMode::Continuation);
                } else if cur.in_range() && cur.current_char() == b')' {
                    break;
                } else {
                    list.base.defect_ = Some(Defect::NonParam);
                }
            }

            if cur.in_range() && cur.current_char() == b',' {
                if list.base.variadic_ {
                    list.base.defect_ = Some(Defect::NonParam);
                } else {
                    let empty = param.is_empty();
                    params.push(std::mem::take(&mut param));
                    if empty {
                        list.base.defect_ = Some(Defect::EmptyParam);
                    }
                }
                cur.on(1);
                cur.scan(ScanMode::Greyspace);
            } else if cur.in_range() && cur.current_char() == b')' {
                if param.is_empty() {
                    if !params.is_empty() {
                        list.base.defect_ = Some(Defect::EmptyParam);
                    }
                } else {
                    params.push(std::mem::take(&mut param));
                }
                break;
            } else if !cur.in_range() {
                list.base.defect_ = Some(Defect::Unclosed);
                break;
            }
        }
        if !param.is_empty() {
            params.push(param);
        }
        if !cur.in_range() || cur.current_char() != b')' {
            list.base.defect_ = Some(Defect::Unclosed);
        } else {
            cur.on(1);
        }
        if !params.is_empty() {
            list.base.params = Some(params);
        }
        let _ = cxx;
        list
    }
}

/// A macro reference's actual argument list, e.g. the `(1,2)` in `F(1,2)`.
/// Each argument carries an expand-eligibility flag (spec.md's distinction
/// between literal and expanded substitution).
#[derive(Debug, Clone, Default)]
pub struct ArgumentList {
    base: ParameterListBase,
    expand_flags: Vec<bool>,
}

impl ArgumentList {
    pub fn placeholders(n: usize) -> ArgumentList {
        let base = ParameterListBase::placeholders(n);
        let expand_flags = vec![false; base.size()];
        ArgumentList { base, expand_flags }
    }

    pub fn base(&self) -> &ParameterListBase {
        &self.base
    }

    pub fn set_expandable(&mut self, n: usize, expandable: bool) -> bool {
        if n < self.expand_flags.len() {
            self.expand_flags[n] = expandable;
            true
        } else {
            false
        }
    }

    pub fn is_expandable(&self, n: usize) -> bool {
        self.expand_flags.get(n).copied().unwrap_or(false)
    }

    /// Read an actual argument list at `cur`'s current position.
    pub fn read(cxx: bool, cur: &mut Cursor) -> ArgumentList {
        let mut list = ArgumentList::default();
        if !cur.in_range() || cur.current_char() != b'(' {
            list.base.params = None;
            list.base.defect_ = Some(Defect::None);
            return list;
        }
        list.base.defect_ = Some(Defect::None);
        cur.on(1);
        cur.scan(ScanMode::Greyspace);

        let mut args = Vec::new();
        let mut arg = String::new();
        loop {
            if !cur.in_range() {
                break;
            }
            arg = read_one_argument(cxx, cur);

            if cur.in_range() && cur.current_char() == b',' {
                args.push(arg.clone());
                if arg.is_empty() {
                    list.base.defect_ = Some(Defect::EmptyParam);
                }
                arg.clear();
                cur.on(1);
            } else if cur.in_range() && cur.current_char() == b')' {
                if arg.is_empty() {
                    if !args.is_empty() {
                        list.base.defect_ = Some(Defect::EmptyParam);
                    }
                } else {
                    args.push(arg.clone());
                    arg.clear();
                }
                break;
            } else {
                break;
            }
        }
        if !arg.is_empty() {
            args.push(arg);
        }
        if !cur.in_range() || cur.current_char() != b')' {
            list.base.defect_ = Some(Defect::Unclosed);
        } else {
            cur.on(1);
        }
        if !args.is_empty() {
            list.expand_flags = vec![false; args.len()];
            list.base.params = Some(args);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formal(text: &str) -> FormalParameterList {
        let mut cur = Cursor::new(true, text.as_bytes(), 0);
        FormalParameterList::read(true, &mut cur)
    }

    fn actual(text: &str) -> ArgumentList {
        let mut cur = Cursor::new(true, text.as_bytes(), 0);
        ArgumentList::read(true, &mut cur)
    }

    #[test]
    fn formal_list_of_identifiers() {
        let l = formal("(a, b, c)");
        assert!(l.base().well_formed());
        assert_eq!(l.base().size(), 3);
        assert_eq!(l.base().at(1), Some("b"));
    }

    #[test]
    fn formal_list_absent_is_null() {
        let l = formal("x");
        assert!(l.base().is_null());
    }

    #[test]
    fn formal_list_empty_parens_is_not_null_but_zero_size() {
        let l = formal("()");
        assert!(!l.base().is_null());
        assert_eq!(l.base().size(), 0);
    }

    #[test]
    fn formal_list_variadic_trailing_ellipsis() {
        let l = formal("(a, ...)");
        assert!(l.base().variadic());
        assert_eq!(l.base().at(1), Some("..."));
    }

    #[test]
    fn formal_list_unclosed_is_a_defect() {
        let l = formal("(a, b");
        assert_eq!(l.base().defect(), Defect::Unclosed);
    }

    #[test]
    fn argument_list_splits_on_top_level_commas() {
        let l = actual("(1, f(2,3), 4)");
        assert_eq!(l.base().size(), 3);
        assert_eq!(l.base().at(1), Some("f(2, 3)"));
    }

    #[test]
    fn argument_list_expand_flags_default_false() {
        let mut l = actual("(a,b)");
        assert!(!l.is_expandable(0));
        l.set_expandable(0, true);
        assert!(l.is_expandable(0));
        assert!(!l.is_expandable(1));
    }
}
