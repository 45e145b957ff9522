use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::error::{Result, UpdateError};
use crate::list::PackageList;
use crate::package::PackageInfo;
use crate::util::{
    clear_directory, download_to_temp, extract_archive, version_file, write_text_file, ArchiveKind,
};

/// Knobs for [`install_packages`].
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Keep local archives after a successful install instead of deleting them.
    pub keep_archives: bool,
}

/// Progress notifications emitted while a list is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    Started { name: String, version: String },
    Cleaning { name: String, removed: usize },
    Extracted { name: String, files: usize },
    Finished { name: String },
    Failed { name: String, error: String },
}

/// Outcome of [`install_packages`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    /// Package name and error message.
    pub failed: Vec<(String, String)>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Installs every package of `list` in order.
///
/// A failing package is logged and recorded in the report, and the remaining
/// packages are still processed.
pub fn install_packages(list: &PackageList, options: &InstallOptions) -> InstallReport {
    install_packages_with(list, options, |_| {})
}

/// Same as [`install_packages`] but reports progress to `on_event`.
pub fn install_packages_with<F>(list: &PackageList, options: &InstallOptions, mut on_event: F) -> InstallReport
where
    F: FnMut(&InstallEvent),
{
    let mut report = InstallReport::default();
    for package in list {
        match install_package_with(package, options, &mut on_event) {
            Ok(()) => {
                on_event(&InstallEvent::Finished { name: package.name.clone() });
                report.installed.push(package.name.clone());
            }
            Err(err) => {
                warn!("Package {} failed: {}", package.name, err);
                on_event(&InstallEvent::Failed {
                    name: package.name.clone(),
                    error: err.to_string(),
                });
                report.failed.push((package.name.clone(), err.to_string()));
            }
        }
    }
    info!(
        "Installed {} of {} package(s)",
        report.installed.len(),
        list.len()
    );
    report
}

/// Installs a single package: prepares the destination, extracts the archive,
/// writes the version marker and removes the consumed archive.
pub fn install_package(package: &PackageInfo, options: &InstallOptions) -> Result<()> {
    install_package_with(package, options, &mut |_| {})
}

fn install_package_with<F>(package: &PackageInfo, options: &InstallOptions, on_event: &mut F) -> Result<()>
where
    F: FnMut(&InstallEvent),
{
    info!("Updating package {} version {}", package.name, package.version);
    on_event(&InstallEvent::Started {
        name: package.name.clone(),
        version: package.version.clone(),
    });

    let destination = destination_path(package)?;
    let removed = prepare_destination(package)?;
    if package.clears_destination() {
        on_event(&InstallEvent::Cleaning {
            name: package.name.clone(),
            removed,
        });
    }

    let kind = ArchiveKind::detect(&package.source_location).ok_or_else(|| {
        UpdateError::archive(&package.source_location, "unsupported archive format")
    })?;

    let files = if package.is_remote() {
        // the temp file is deleted on drop
        let temp = download_to_temp(&package.source_location)?;
        extract_archive(temp.path(), kind, &destination)?
    } else {
        let archive = Path::new(&package.source_location);
        let files = extract_archive(archive, kind, &destination)?;
        if !options.keep_archives {
            std::fs::remove_file(archive).map_err(|e| UpdateError::io(archive, e))?;
            debug!("Removed archive {}", archive.display());
        }
        files
    };
    on_event(&InstallEvent::Extracted {
        name: package.name.clone(),
        files,
    });

    if package.write_version {
        write_version_marker(package)?;
    }
    Ok(())
}

/// Creates the destination if it is missing, otherwise applies the clear policy.
///
/// `clear_directory` wins over `recursive_clear_directory` when both are set.
/// Returns the number of removed entries.
pub fn prepare_destination(package: &PackageInfo) -> Result<usize> {
    let destination = destination_path(package)?;
    if !destination.exists() {
        std::fs::create_dir_all(&destination).map_err(|e| UpdateError::io(&destination, e))?;
        debug!("Created {}", destination.display());
        return Ok(0);
    }
    if package.clear_directory {
        clear_directory(&destination, false)
    } else if package.recursive_clear_directory {
        clear_directory(&destination, true)
    } else {
        Ok(0)
    }
}

/// Writes the package version into `<destination>/version`.
pub fn write_version_marker(package: &PackageInfo) -> Result<()> {
    let destination = destination_path(package)?;
    write_text_file(&version_file(&destination), &package.version)
}

/// Reads the version marker of an installed package, if present.
pub fn read_version_marker(package: &PackageInfo) -> Result<Option<String>> {
    let path = version_file(&destination_path(package)?);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(UpdateError::io(path, e)),
    }
}

fn destination_path(package: &PackageInfo) -> Result<PathBuf> {
    if package.destination.trim().is_empty() {
        return Err(UpdateError::io(
            PathBuf::new(),
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("package {} has no destination", package.name),
            ),
        ));
    }
    Ok(PathBuf::from(&package.destination))
}
