use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::error::{Result, UpdateError};

static DOTTED_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(\.\d+){1,3}$").expect("static version pattern")
});

/// A parsed `major.minor[.build[.revision]]` version.
///
/// Components that were not present in the source string are `None` and order
/// before any present component, so `1.2 < 1.2.0 < 1.2.0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub build: Option<u32>,
    pub revision: Option<u32>,
}

impl ToolVersion {
    pub fn new(major: u32, minor: u32, build: Option<u32>, revision: Option<u32>) -> Self {
        Self { major, minor, build, revision }
    }
}

impl FromStr for ToolVersion {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        parse_version(s)
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{}", build)?;
            if let Some(revision) = self.revision {
                write!(f, ".{}", revision)?;
            }
        }
        Ok(())
    }
}

/// Parses a dotted numeric version with two to four components.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
/// Returns [`UpdateError::Format`] if the string doesn't match the grammar or a
/// component does not fit into 32 bits.
///
/// # Example
///
/// ```
/// use updatekit::parse_version;
///
/// let newer = parse_version("1.2.3.4").unwrap();
/// let older = parse_version("1.2.3.3").unwrap();
/// assert!(newer > older);
/// assert!(parse_version("not-a-version").is_err());
/// ```
pub fn parse_version(input: &str) -> Result<ToolVersion> {
    let trimmed = input.trim();
    if !DOTTED_VERSION.is_match(trimmed) {
        return Err(UpdateError::Format {
            input: input.to_string(),
            reason: "expected 2 to 4 dot-separated numbers".to_string(),
        });
    }
    let mut parts = Vec::with_capacity(4);
    for part in trimmed.split('.') {
        let value = part.parse::<u32>().map_err(|e| UpdateError::Format {
            input: input.to_string(),
            reason: format!("component '{}': {}", part, e),
        })?;
        parts.push(value);
    }
    Ok(ToolVersion {
        major: parts[0],
        minor: parts[1],
        build: parts.get(2).copied(),
        revision: parts.get(3).copied(),
    })
}

/// Compares two version strings.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    Ok(parse_version(a)?.cmp(&parse_version(b)?))
}

/// Whether a record describes the application core (or its updater) or an auxiliary tool.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordKind {
    Core,
    #[default]
    Tool,
}

/// Name and version string of an installed component.
///
/// The version stays a raw string; [`VersionRecord::parse_version`] parses it on every
/// call and does not cache the result.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRecord {
    pub kind: RecordKind,
    pub name: String,
    pub version: String,
}

/// Version record of an auxiliary tool (encoder, muxer, subtitle tool, ...).
pub type ToolVersionRecord = VersionRecord;
/// Version record of the core application or the updater.
pub type CoreVersionRecord = VersionRecord;

impl VersionRecord {
    pub fn tool(name: &str, version: &str) -> Self {
        Self {
            kind: RecordKind::Tool,
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    pub fn core(name: &str, version: &str) -> Self {
        Self {
            kind: RecordKind::Core,
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// Parses the stored version string.
    ///
    /// # Errors
    /// Returns [`UpdateError::Format`] if the version is not a dotted numeric version.
    pub fn parse_version(&self) -> Result<ToolVersion> {
        parse_version(&self.version)
    }

    /// A record with neither name nor version, as found in unused manifest slots.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.version.is_empty()
    }
}
