use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::process::Command;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use updatekit::installer::{install_packages_with, InstallEvent, InstallOptions};
use updatekit::list::PackageList;
use updatekit::manifest::UpdateManifest;
use updatekit::package::PackageInfo;
use updatekit::version::compare_versions;
use updatekit::Config;
use crate::cli::{UpdateCommand, CLI};

pub fn execute(cli: CLI, config: &Config) -> Result<()> {
    let list_or_default = |list: Option<PathBuf>| list.unwrap_or_else(|| config.package_list.clone());
    let manifest_or_default = |manifest: Option<PathBuf>| manifest.unwrap_or_else(|| config.manifest.clone());
    match cli.command {
        UpdateCommand::Init { list } => {
            execute_init(&list_or_default(list))
        }
        UpdateCommand::List { list, json } => {
            execute_list(&list_or_default(list), json)
        }
        UpdateCommand::Add { name, source, destination, version, write_version, clear, recursive_clear, list } => {
            let package = PackageInfo::new(&name, &source, &destination, &version)
                .with_write_version(write_version)
                .with_clear_directory(clear)
                .with_recursive_clear_directory(recursive_clear);
            execute_add(&list_or_default(list), package)
        }
        UpdateCommand::Remove { name, list } => {
            execute_remove(&list_or_default(list), &name)
        }
        UpdateCommand::Apply { list, keep_archives, then } => {
            let options = InstallOptions {
                keep_archives: keep_archives || config.keep_archives,
            };
            execute_apply(&list_or_default(list), &options, then.as_deref())
        }
        UpdateCommand::Manifest { manifest } => {
            execute_manifest(&manifest_or_default(manifest))
        }
        UpdateCommand::Check { remote, manifest } => {
            execute_check(&remote, &manifest_or_default(manifest))
        }
        UpdateCommand::Compare { a, b } => {
            execute_compare(&a, &b)
        }
    }
}

pub fn execute_init(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    PackageList::new().save(path)?;
    println!("Created {}", path.display());
    Ok(())
}

pub fn execute_list(path: &Path, json: bool) -> Result<()> {
    let list = PackageList::load(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    if list.is_empty() {
        println!("No packages");
        return Ok(());
    }
    for package in &list {
        println!("{}: {}", package.name.bold(), package.version);
        println!("  source: {}", package.source_location);
        println!("  destination: {}", package.destination);
        let mut flags = Vec::new();
        if package.write_version {
            flags.push("write-version");
        }
        if package.clear_directory {
            flags.push("clear");
        }
        if package.recursive_clear_directory {
            flags.push("recursive-clear");
        }
        if !flags.is_empty() {
            println!("  flags: {}", flags.join(", "));
        }
    }
    Ok(())
}

pub fn execute_add(path: &Path, package: PackageInfo) -> Result<()> {
    let mut list = if path.exists() {
        PackageList::load(path)?
    } else {
        PackageList::new()
    };
    if list.find(&package.name).is_some() {
        log::warn!("{} is already listed, adding another entry", package.name);
    }
    println!("Added {}: {}", package.name, package.version);
    list.push(package);
    list.save(path)?;
    Ok(())
}

pub fn execute_remove(path: &Path, name: &str) -> Result<()> {
    let mut list = PackageList::load(path)?;
    let removed = list.remove_all(name);
    if removed == 0 {
        bail!("Package not found: {}", name);
    }
    list.save(path)?;
    println!("Removed {} entr{} of {}", removed, if removed == 1 { "y" } else { "ies" }, name);
    Ok(())
}

pub fn execute_apply(path: &Path, options: &InstallOptions, then: Option<&Path>) -> Result<()> {
    let list = PackageList::load(path)
        .with_context(|| format!("Malformed update file {}", path.display()))?;
    let total = list.len();
    let mut done = 0;
    let report = install_packages_with(&list, options, |event| match event {
        InstallEvent::Started { name, version } => {
            println!("[{}/{}] Updating package {} version {}", done + 1, total, name.bold(), version);
        }
        InstallEvent::Cleaning { removed, .. } => {
            println!("  cleaned up target folder ({} entries)", removed);
        }
        InstallEvent::Extracted { files, .. } => {
            println!("  extracted {} file(s)", files);
        }
        InstallEvent::Finished { .. } => {
            done += 1;
            println!("  {}", "done".green());
        }
        InstallEvent::Failed { error, .. } => {
            done += 1;
            println!("  {} {}", "failed:".red(), error);
        }
    });

    if let Some(program) = then {
        launch(program)?;
    }
    if !report.is_success() {
        bail!("{} of {} package(s) failed", report.failed.len(), total);
    }
    Ok(())
}

/// Starts `program` detached, with its parent directory as working directory.
fn launch(program: &Path) -> Result<()> {
    let mut command = Command::new(program);
    if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
        command.current_dir(dir);
    }
    command
        .spawn()
        .with_context(|| format!("Could not start {}", program.display()))?;
    Ok(())
}

pub fn execute_manifest(path: &Path) -> Result<()> {
    let manifest = UpdateManifest::load(path)?;
    print!("{}", manifest);
    Ok(())
}

pub fn execute_check(remote: &Path, installed: &Path) -> Result<()> {
    let remote = UpdateManifest::load(remote)?;
    let installed = if installed.exists() {
        UpdateManifest::load(installed)?
    } else {
        UpdateManifest::new()
    };
    let outdated = remote.outdated_against(&installed)?;
    if outdated.is_empty() {
        println!("Everything is up to date");
        return Ok(());
    }
    for tool in outdated {
        let current = tool
            .installed
            .map(|v| v.to_string())
            .unwrap_or_else(|| "not installed".to_string());
        println!("{}: {} -> {}", tool.slot.bold(), current, tool.available.to_string().green());
    }
    Ok(())
}

pub fn execute_compare(a: &str, b: &str) -> Result<()> {
    let symbol = match compare_versions(a, b)? {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };
    println!("{a} {symbol} {b}");
    Ok(())
}
