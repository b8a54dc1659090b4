use std::path::Path;

use globset::{Glob, GlobMatcher};
use thiserror::Error;

use crate::path::TreePath;

/// What a filter pattern is tested against.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum FilterKind {
    /// basenames of regular files
    File,
    /// basenames of directories
    Directory,
    /// basenames of a directory's contents, a match rejects the
    /// containing directory (see `parent_is_indexable`)
    ParentDirectory,
}

impl FilterKind {
    const COUNT: usize = 3;

    fn idx(self) -> usize {
        self as usize
    }
}

/// How unmatched files are treated per filter kind: under `Accept` the
/// patterns act as a blacklist, under `Deny` as a whitelist.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum FilterPolicy {
    #[default]
    Accept,
    Deny,
}

/// An invalid glob handed to `add_filter`. The filter set is left
/// untouched when this is returned.
#[derive(Debug, Error)]
#[error("invalid filter glob {glob:?}")]
pub struct PatternError {
    glob: Box<str>,
    #[source]
    source: globset::Error,
}

#[derive(Debug)]
struct Pattern {
    matcher: GlobMatcher,
    kind: FilterKind,
    /// set when the raw glob was an absolute path, the pattern then
    /// matches anything at or beneath that path
    abs: Option<TreePath>,
}

/// Glob filters classified by what they target, plus the per-kind
/// default policy.
#[derive(Debug, Default)]
pub struct FilterSet {
    patterns: Vec<Pattern>,
    policies: [FilterPolicy; FilterKind::COUNT],
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: FilterKind, glob: &str) -> Result<(), PatternError> {
        let matcher = match Glob::new(glob) {
            Ok(glob) => glob.compile_matcher(),
            Err(source) => {
                return Err(PatternError {
                    glob: glob.into(),
                    source,
                })
            }
        };
        let abs = Path::new(glob).is_absolute().then(|| TreePath::new(glob));
        self.patterns.push(Pattern { matcher, kind, abs });
        Ok(())
    }

    /// Removes every filter of the given kind.
    pub fn clear(&mut self, kind: FilterKind) {
        self.patterns.retain(|pattern| pattern.kind != kind);
    }

    /// Whether any filter of `kind` matches `file`.
    pub fn matches(&self, kind: FilterKind, file: &TreePath) -> bool {
        self.patterns
            .iter()
            .filter(|pattern| pattern.kind == kind)
            .any(|pattern| match &pattern.abs {
                Some(abs) => abs.contains(file),
                None => pattern.matcher.is_match(file.basename()),
            })
    }

    /// The layered decision: a match under an `Accept` policy blocks the
    /// file, no match under a `Deny` policy blocks it too.
    pub fn filtered(&self, kind: FilterKind, file: &TreePath) -> bool {
        match self.policies[kind.idx()] {
            FilterPolicy::Accept => self.matches(kind, file),
            FilterPolicy::Deny => !self.matches(kind, file),
        }
    }

    pub fn set_policy(&mut self, kind: FilterKind, policy: FilterPolicy) {
        self.policies[kind.idx()] = policy;
    }

    pub fn policy(&self, kind: FilterKind) -> FilterPolicy {
        self.policies[kind.idx()]
    }
}
