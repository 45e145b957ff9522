use std::path::PathBuf;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    #[command(subcommand)]
    pub(crate) command: UpdateCommand,
    /// Use this config file instead of the global one
    #[clap(long, global = true, value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,
    /// Log debug output to stderr
    #[clap(short, long, global = true)]
    pub(crate) verbose: bool,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum UpdateCommand {
    /// Writes an empty package list
    Init {
        #[clap(long)]
        list: Option<PathBuf>,
    },
    /// Prints the packages of a list in order
    List {
        #[clap(long)]
        list: Option<PathBuf>,
        /// Print the list as JSON
        #[clap(long)]
        json: bool,
    },
    /// Appends a package to the list
    Add {
        name: String,
        /// Local path or http(s) URL of the package archive
        source: String,
        destination: String,
        version: String,
        /// Write `<destination>/version` after installing
        #[clap(long)]
        write_version: bool,
        /// Remove the top-level files of the destination before installing
        #[clap(long)]
        clear: bool,
        /// Remove everything below the destination before installing
        #[clap(long)]
        recursive_clear: bool,
        #[clap(long)]
        list: Option<PathBuf>,
    },
    /// Removes every package with the given name from the list
    Remove {
        name: String,
        #[clap(long)]
        list: Option<PathBuf>,
    },
    /// Installs all packages of the list
    Apply {
        #[clap(long)]
        list: Option<PathBuf>,
        /// Do not delete local archives after installing them
        #[clap(long)]
        keep_archives: bool,
        /// Program to start once the list was applied
        #[clap(long, value_name = "PROGRAM")]
        then: Option<PathBuf>,
    },
    /// Prints the versions recorded in a manifest
    Manifest {
        #[clap(long)]
        manifest: Option<PathBuf>,
    },
    /// Lists the components that are newer in REMOTE than in the installed manifest
    Check {
        remote: PathBuf,
        #[clap(long)]
        manifest: Option<PathBuf>,
    },
    /// Compares two dotted versions
    Compare {
        a: String,
        b: String,
    },
}
