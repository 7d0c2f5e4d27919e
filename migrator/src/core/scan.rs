//! Import-statement detection for migration candidates.

use anyhow::{Context, Result};
use regex::Regex;

/// Matches Python files that import a given library.
///
/// Built once per experiment and reused across the candidate scan. Matches
/// `import lib`, `import lib.sub`, `import lib as alias`, and
/// `from lib[.sub] import ...` at any indentation (function-local imports
/// count too).
#[derive(Debug, Clone)]
pub struct ImportScanner {
    library: String,
    re: Regex,
}

impl ImportScanner {
    pub fn new(library: &str) -> Result<ImportScanner> {
        let escaped = regex::escape(library);
        let pattern = format!(r"(?m)^\s*(?:import|from)\s+{escaped}\b");
        let re = Regex::new(&pattern)
            .with_context(|| format!("build import regex for '{library}'"))?;
        Ok(ImportScanner {
            library: library.to_string(),
            re,
        })
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    /// True if `source` imports the library anywhere.
    pub fn imports(&self, source: &str) -> bool {
        self.re.is_match(source)
    }
}
