// ABOUTME: Handles contradictions between commandline -D/-U options and
// ABOUTME: in-source #define/#undef directives, governed by a --conflict
// ABOUTME: policy. Grounded on `contradiction.h`/`contradiction.cpp`.

use crate::diagnostic::{Diagnostic, WARN_CONTRADICTION};

/// How a contradicted directive is rendered in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContradictionPolicy {
    /// Delete the contradicted directive outright.
    Delete,
    /// Replace it with a comment recording the conflict.
    Comment,
    /// Replace it with a `#error` directive.
    Error,
}

/// Why a directive appears to contradict the commandline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// An in-source `#define` differently redefines a `-D` option.
    DifferentlyRedefiningD,
    /// An in-source `#undef` contradicts a `-D` option.
    UndefingD,
    /// An in-source `#define` contradicts a `-U` option.
    DefiningU,
}

impl Cause {
    fn describe(&self, symname: &str) -> String {
        match self {
            Cause::DifferentlyRedefiningD => {
                format!("\"{symname}\" is redefined differently from its -D definition")
            }
            Cause::UndefingD => format!("\"{symname}\" is -D defined but is #undef-ed in source"),
            Cause::DefiningU => format!("\"{symname}\" is -U undefined but is #define-d in source"),
        }
    }
}

struct Pending {
    cause: Cause,
    symname: String,
}

/// What to do with a directive line that carries a confirmed contradiction.
#[derive(Debug, Clone)]
pub struct ContradictionAction {
    pub diagnostic: Diagnostic,
    /// `None` under `Delete`: drop the line with no replacement text.
    pub replacement: Option<String>,
}

/// Tracks at most one deferred contradiction (the "`#undef FOO` immediately
/// followed by a confirming `#define FOO`" idiom needs to see the next
/// directive before it knows whether there really was a conflict).
#[derive(Default)]
pub struct ContradictionTracker {
    policy_: Option<ContradictionPolicy>,
    pending: Option<Pending>,
    last_conflicted_symbol: String,
}

impl ContradictionTracker {
    pub fn new() -> Self {
        ContradictionTracker::default()
    }

    pub fn set_policy(&mut self, p: ContradictionPolicy) {
        self.policy_ = Some(p);
    }

    fn policy(&self) -> ContradictionPolicy {
        self.policy_.unwrap_or(ContradictionPolicy::Delete)
    }

    pub fn last_conflicted_symbol_id(&self) -> &str {
        &self.last_conflicted_symbol
    }

    /// The symbol named by a currently-pending (unconfirmed) contradiction,
    /// if any.
    pub fn pending_symbol(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.symname.as_str())
    }

    /// Record a potential contradiction, pending confirmation by the
    /// directive that follows.
    pub fn save(&mut self, why: Cause, symname: &str) {
        self.last_conflicted_symbol = symname.to_string();
        self.pending = Some(Pending {
            cause: why,
            symname: symname.to_string(),
        });
    }

    /// Drop any pending contradiction without diagnosing it: the input
    /// showed it to be innocuous (or the line it concerned turned out to
    /// be dead code anyway).
    pub fn forget(&mut self) {
        self.pending = None;
    }

    /// Discharge a pending contradiction, if any, returning the action to
    /// take on the directive line it concerned.
    pub fn flush(&mut self, diags: &mut Vec<Diagnostic>) -> Option<ContradictionAction> {
        let pending = self.pending.take()?;
        Some(self.insert(pending.cause, &pending.symname, diags))
    }

    /// Immediately confirm a contradiction (no deferral applicable, as for
    /// a `#define` that itself differs from its `-D` definition).
    pub fn insert(
        &mut self,
        why: Cause,
        symname: &str,
        diags: &mut Vec<Diagnostic>,
    ) -> ContradictionAction {
        self.last_conflicted_symbol = symname.to_string();
        let message = why.describe(symname);
        diags.push(Diagnostic::new(WARN_CONTRADICTION, message.clone()));
        let replacement = match self.policy() {
            ContradictionPolicy::Delete => None,
            ContradictionPolicy::Comment => Some(format!("/* {message} */")),
            ContradictionPolicy::Error => Some(format!("#error {message}")),
        };
        ContradictionAction {
            diagnostic: Diagnostic::new(WARN_CONTRADICTION, message),
            replacement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forgotten_contradiction_does_not_flush() {
        let mut t = ContradictionTracker::new();
        let mut diags = Vec::new();
        t.save(Cause::UndefingD, "FOO");
        t.forget();
        assert!(t.flush(&mut diags).is_none());
        assert!(diags.is_empty());
    }

    #[test]
    fn unforgiven_contradiction_flushes_with_delete_policy() {
        let mut t = ContradictionTracker::new();
        let mut diags = Vec::new();
        t.save(Cause::UndefingD, "FOO");
        let action = t.flush(&mut diags).expect("pending contradiction");
        assert!(action.replacement.is_none());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn comment_policy_substitutes_a_comment() {
        let mut t = ContradictionTracker::new();
        t.set_policy(ContradictionPolicy::Comment);
        let mut diags = Vec::new();
        let action = t.insert(Cause::DifferentlyRedefiningD, "FOO", &mut diags);
        assert!(action.replacement.unwrap().starts_with("/*"));
    }

    #[test]
    fn error_policy_substitutes_a_hash_error() {
        let mut t = ContradictionTracker::new();
        t.set_policy(ContradictionPolicy::Error);
        let mut diags = Vec::new();
        let action = t.insert(Cause::DefiningU, "FOO", &mut diags);
        assert!(action.replacement.unwrap().starts_with("#error"));
    }

    #[test]
    fn flush_with_nothing_pending_is_a_no_op() {
        let mut t = ContradictionTracker::new();
        let mut diags = Vec::new();
        assert!(t.flush(&mut diags).is_none());
        assert!(diags.is_empty());
    }
}
