//! Patterns excluded from file sync.

use std::path::Path;

use tracing::debug;

/// Per-project override file, read from the synced directory's root.
pub const IGNORE_FILE: &str = ".havenignore";

/// Always excluded: VCS metadata, dependency trees, build output, editor junk.
pub const DEFAULT_PATTERNS: &[&str] = &[
    ".git/",
    "node_modules/",
    ".pnpm-store/",
    "__pycache__/",
    "*.pyc",
    ".pytest_cache/",
    ".mypy_cache/",
    "dist/",
    "build/",
    ".next/",
    ".nuxt/",
    ".output/",
    "target/",
    ".gradle/",
    ".idea/",
    "*.log",
    "*.tmp",
    "*.swp",
    "*.swo",
    ".DS_Store",
    ".haven/",
];

/// Ordered, de-duplicated union of the defaults and project patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnorePatternSet {
    patterns: Vec<String>,
}

impl IgnorePatternSet {
    pub fn defaults() -> Self {
        Self::from_patterns(DEFAULT_PATTERNS.iter().map(|p| p.to_string()))
    }

    /// Defaults plus `<project_root>/.havenignore` when present.
    pub fn for_project(project_root: &Path) -> Self {
        let mut set = Self::defaults();
        let file = project_root.join(IGNORE_FILE);
        if let Ok(content) = std::fs::read_to_string(&file) {
            let extra = parse_ignore_file(&content);
            debug!(path = %file.display(), count = extra.len(), "loaded project ignore patterns");
            set.extend(extra);
        }
        set
    }

    pub fn from_patterns(patterns: impl IntoIterator<Item = String>) -> Self {
        let mut set = Self {
            patterns: Vec::new(),
        };
        set.extend(patterns);
        set
    }

    pub fn extend(&mut self, patterns: impl IntoIterator<Item = String>) {
        for p in patterns {
            if !self.patterns.contains(&p) {
                self.patterns.push(p);
            }
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// `--ignore-vcs` followed by one `--ignore <pattern>` pair per pattern.
    pub fn to_engine_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(1 + self.patterns.len() * 2);
        args.push("--ignore-vcs".to_string());
        for p in &self.patterns {
            args.push("--ignore".to_string());
            args.push(p.clone());
        }
        args
    }
}

/// Non-empty, non-comment lines, trimmed.
pub fn parse_ignore_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}
