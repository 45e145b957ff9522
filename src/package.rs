use serde::{Deserialize, Serialize};

/// One distributable package in an update list.
///
/// This is a plain data holder: nothing is validated on construction, so empty
/// strings and `false` flags are perfectly legal and just propagate through
/// [`crate::list::PackageList::save`] and [`crate::list::PackageList::load`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    /// Identifier of the package (e.g. `"ffmpeg"`). Expected to be unique within a list,
    /// but this is not enforced.
    pub name: String,
    /// Local path or `http(s)` URL of the package archive.
    pub source_location: String,
    /// Directory the archive is extracted into.
    pub destination: String,
    /// Free-form version string.
    pub version: String,
    /// Write `<destination>/version` after the package was extracted.
    pub write_version: bool,
    /// Remove the top-level files of the destination before extracting.
    pub clear_directory: bool,
    /// Remove every file and subdirectory of the destination before extracting.
    pub recursive_clear_directory: bool,
}

impl PackageInfo {
    /// Creates a descriptor with all directory flags unset.
    ///
    /// # Example
    ///
    /// ```
    /// use updatekit::PackageInfo;
    ///
    /// let pkg = PackageInfo::new("ffmpeg", "http://x/ffmpeg.zip", "C:/tools/ffmpeg", "1.0")
    ///     .with_write_version(true);
    /// assert!(pkg.write_version);
    /// assert!(!pkg.clear_directory);
    /// ```
    pub fn new(name: &str, source_location: &str, destination: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            source_location: source_location.to_string(),
            destination: destination.to_string(),
            version: version.to_string(),
            ..Self::default()
        }
    }

    pub fn with_write_version(mut self, write_version: bool) -> Self {
        self.write_version = write_version;
        self
    }

    pub fn with_clear_directory(mut self, clear_directory: bool) -> Self {
        self.clear_directory = clear_directory;
        self
    }

    pub fn with_recursive_clear_directory(mut self, recursive: bool) -> Self {
        self.recursive_clear_directory = recursive;
        self
    }

    /// Whether the destination gets purged in any way before install.
    pub fn clears_destination(&self) -> bool {
        self.clear_directory || self.recursive_clear_directory
    }

    /// Whether the source points at a remote `http(s)` location.
    pub fn is_remote(&self) -> bool {
        let lower = self.source_location.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}
