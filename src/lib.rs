//! # updatekit
//!
//! Building blocks for a small self-updater: an ordered **package list** saying which
//! archive goes where, an **update manifest** recording the core, updater and tool
//! versions of an installation, and an **installer** that applies a package list.
//!
//! The `updatekit` binary is a thin CLI over this library.
//!
//! ## Modules Overview
//! - [`package`] – The package descriptor (`PackageInfo`)
//! - [`list`] – Loading and saving package lists (XML)
//! - [`version`] – Dotted numeric versions and name/version records
//! - [`manifest`] – Loading, saving and comparing update manifests (XML)
//! - [`installer`] – Preparing destinations and extracting package archives
//! - [`util`] – Archive extraction, downloads and directory clearing
//! - [`global`] – User configuration
//! - [`error`] – The library error type

pub mod error;
pub mod package;
pub mod list;
pub mod version;
pub mod manifest;
pub mod installer;
pub mod util;
pub mod global;

pub use error::*;
pub use package::*;
pub use list::*;
pub use version::*;
pub use manifest::*;
pub use installer::*;
pub use util::*;
pub use global::config::*;
