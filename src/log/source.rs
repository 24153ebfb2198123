//! Attribution of log entries written without an explicit source.

use std::panic::Location;
use std::path::{Path, PathBuf};

/// Decides the source label of an entry that was written without one.
pub trait SourceResolver: Send + Sync {
    /// Return `None` to reject the entry.
    fn resolve(&self, caller: &'static Location<'static>) -> Option<String>;
}

/// Every entry must be tagged at the call site. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireExplicit;

impl SourceResolver for RequireExplicit {
    fn resolve(&self, _caller: &'static Location<'static>) -> Option<String> {
        None
    }
}

/// Attributes entries to the `file:line` that created them, relative to `root`.
#[derive(Debug, Clone, Default)]
pub struct CallerLocation {
    root: Option<PathBuf>,
}

impl CallerLocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip this prefix from recorded file paths.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

impl SourceResolver for CallerLocation {
    fn resolve(&self, caller: &'static Location<'static>) -> Option<String> {
        let file = Path::new(caller.file());
        let file = match &self.root {
            Some(root) => file.strip_prefix(root).unwrap_or(file),
            None => file,
        };
        Some(format!("{}:{}", file.display(), caller.line()))
    }
}
