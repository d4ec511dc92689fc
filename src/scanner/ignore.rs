//! Exact-name ignore rules
//!
//! Rules come in tiers evaluated with OR semantics: a global list configured
//! once per walk, and an optional marker file inside each directory listing
//! extra names for that directory only. Names are matched exactly; there is
//! no glob support.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Default name of the per-directory marker file
pub const DEFAULT_MARKER: &str = ".notshared";

/// Ignore configuration shared by every explorer worker
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    global: HashSet<String>,
    marker: String,
}

impl IgnoreRules {
    pub fn new<I, S>(global: I, marker: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            global: global.into_iter().map(Into::into).collect(),
            marker: marker.into(),
        }
    }

    /// Name of the per-directory marker file
    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_globally_ignored(&self, name: &str) -> bool {
        self.global.contains(name)
    }

    /// Tiers in effect for the directory at `dir`, whose entries are `names`
    ///
    /// The marker file is only read when it is among `names`.
    pub fn for_directory(&self, dir: &Path, names: &[String]) -> io::Result<IgnoreSet<'_>> {
        let mut tiers = vec![Cow::Borrowed(&self.global)];
        if !self.marker.is_empty() && names.iter().any(|n| *n == self.marker) {
            let content = fs::read_to_string(dir.join(&self.marker))?;
            tiers.push(Cow::Owned(parse_marker(&content)));
        }
        Ok(IgnoreSet { tiers })
    }
}

/// Ordered ignore tiers for one directory
#[derive(Debug)]
pub struct IgnoreSet<'a> {
    tiers: Vec<Cow<'a, HashSet<String>>>,
}

impl IgnoreSet<'_> {
    /// True if any tier lists `name`
    pub fn is_ignored(&self, name: &str) -> bool {
        self.tiers.iter().any(|tier| tier.contains(name))
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }
}

/// Parse marker file content: one name per line, `#` starts a comment line
pub fn parse_marker(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
