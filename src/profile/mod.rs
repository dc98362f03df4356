//! # Profile Module
//!
//! Scripted overrides of the semantic stage.
//!
//! This module handles:
//! - Profile identity, source text and structural validation (this file)
//! - The script engine capability and its rhai implementation ([`engine`])
//! - The runtime state machine: switch, unload, rollback ([`runtime`])

pub mod engine;
pub mod runtime;

pub use engine::{EngineState, RhaiScriptEngine, ScriptEngine, ScriptOutput};
pub use runtime::{ProfileFrame, ProfileRuntime, ProfileState, SharedProfileRuntime};

use std::path::{Path, PathBuf};

use crate::error::{ControlMapperError, Result};

/// Entry point every profile must declare unless configured otherwise.
pub const DEFAULT_ENTRY_POINT: &str = "update";

/// A user-supplied transform program plus its identity metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    name: String,
    version: String,
    author: Option<String>,
    file: Option<PathBuf>,
    source: String,
    entry_point: String,
}

impl Profile {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            author: None,
            file: None,
            source: source.into(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }

    /// Reads a profile's source text from `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read. The profile is not
    /// validated here.
    pub fn from_file(
        path: impl AsRef<Path>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Ok(Self::new(name, version, source).with_file(path))
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Structural check only; nothing is compiled or executed.
    ///
    /// # Errors
    ///
    /// Returns [`ControlMapperError::Validation`] if an identity field is
    /// blank or the source does not declare the entry point function.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ControlMapperError::Validation("profile name is empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(ControlMapperError::Validation(format!(
                "profile '{}' has an empty version",
                self.name
            )));
        }
        if self.entry_point.trim().is_empty() {
            return Err(ControlMapperError::Validation(format!(
                "profile '{}' has an empty entry point",
                self.name
            )));
        }
        if self.source.trim().is_empty() {
            return Err(ControlMapperError::Validation(format!(
                "profile '{}' has no source",
                self.name
            )));
        }
        if !declares_fn(&self.source, &self.entry_point) {
            return Err(ControlMapperError::Validation(format!(
                "profile '{}' does not declare fn {}(...)",
                self.name, self.entry_point
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// True if `source` contains `fn <name>(`, allowing whitespace between tokens.
fn declares_fn(source: &str, name: &str) -> bool {
    source.match_indices("fn").any(|(start, _)| {
        let before_ok = source[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_ident_char(c));
        if !before_ok {
            return false;
        }

        let rest = &source[start + 2..];
        let trimmed = rest.trim_start();
        if trimmed.len() == rest.len() {
            return false;
        }
        trimmed
            .strip_prefix(name)
            .map(str::trim_start)
            .is_some_and(|after| after.starts_with('('))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCRIPT: &str = "fn update(input) { () }";

    #[test]
    fn test_valid_profile() {
        let profile = Profile::new("race", "1.0", SCRIPT).with_author("someone");
        assert!(profile.is_valid());
        assert_eq!(profile.author(), Some("someone"));
        assert_eq!(profile.entry_point(), "update");
        assert_eq!(profile.to_string(), "race v1.0");
    }

    #[test]
    fn test_blank_identity_rejected() {
        assert!(!Profile::new("", "1.0", SCRIPT).is_valid());
        assert!(!Profile::new("  ", "1.0", SCRIPT).is_valid());
        assert!(!Profile::new("race", " ", SCRIPT).is_valid());
        assert!(!Profile::new("race", "1.0", "").is_valid());
    }

    #[test]
    fn test_missing_entry_point_rejected() {
        let profile = Profile::new("race", "1.0", "fn tick(input) { () }");
        match profile.validate() {
            Err(ControlMapperError::Validation(msg)) => assert!(msg.contains("fn update")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_entry_point_scan() {
        assert!(declares_fn("fn update(x) {}", "update"));
        assert!(declares_fn("let a = 1;\nfn   update (x) {}", "update"));
        assert!(!declares_fn("fn updater(x) {}", "update"));
        assert!(!declares_fn("fnupdate(x) {}", "update"));
        assert!(!declares_fn("// update(x)", "update"));
        assert!(!declares_fn("defn update(x)", "update"));
    }

    #[test]
    fn test_custom_entry_point() {
        let profile = Profile::new("race", "1.0", "fn tick(input) { () }").with_entry_point("tick");
        assert!(profile.is_valid());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCRIPT.as_bytes()).unwrap();

        let profile = Profile::from_file(file.path(), "race", "2").unwrap();
        assert_eq!(profile.source(), SCRIPT);
        assert_eq!(profile.file(), Some(file.path()));
        assert!(profile.is_valid());

        assert!(Profile::from_file("/nonexistent/profile.rhai", "x", "1").is_err());
    }
}
