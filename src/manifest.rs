//! The update manifest: which core, updater and tool versions a bundle ships.
//!
//! On disk this is an XML document rooted at `VideoConvertUpdateFile`, with one block
//! per component:
//!
//! ```xml
//! <VideoConvertUpdateFile>
//!   <Core>
//!     <PackageVersion>1.0.4.2</PackageVersion>
//!     <PackageName>VideoConvert</PackageName>
//!   </Core>
//!   <Updater>...</Updater>
//!   <x264>...</x264>
//! </VideoConvertUpdateFile>
//! ```

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use crate::error::{Result, UpdateError};
use crate::util::{write_text_file, xml_root_name};
use crate::version::{CoreVersionRecord, RecordKind, ToolVersion, ToolVersionRecord};

pub const MANIFEST_ROOT: &str = "VideoConvertUpdateFile";
pub const CORE_SLOT: &str = "Core";
pub const UPDATER_SLOT: &str = "Updater";

/// Tool slots every manifest carries, in the order they are written.
pub const TOOL_SLOTS: &[&str] = &[
    "AviSynthPlugins",
    "Profiles",
    "x264",
    "x264_64",
    "ffmpeg",
    "ffmpeg_64",
    "eac3to",
    "lsdvd",
    "mkvtoolnix",
    "mplayer",
    "tsmuxer",
    "mjpegtools",
    "dvdauthor",
    "mp4box",
    "hcenc",
    "oggenc",
    "oggenc_lancer",
    "lame",
    "lame_64",
    "vpxenc",
    "bdsup2sub",
];

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// Core, updater and per-tool versions of an installation or of an update bundle.
///
/// Every slot in [`TOOL_SLOTS`] is always present; slots missing from a loaded document
/// are empty records. Blocks with unknown names are kept after the known slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateManifest {
    pub core: CoreVersionRecord,
    pub updater: CoreVersionRecord,
    tools: Vec<(String, ToolVersionRecord)>,
}

/// A slot whose version in one manifest is newer than in another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedTool {
    pub slot: String,
    pub name: String,
    /// `None` when the installed version is empty or unparsable.
    pub installed: Option<ToolVersion>,
    pub available: ToolVersion,
}

impl Default for UpdateManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateManifest {
    pub fn new() -> Self {
        UpdateManifest {
            core: CoreVersionRecord::core("", ""),
            updater: CoreVersionRecord::core("", ""),
            tools: TOOL_SLOTS
                .iter()
                .map(|slot| (slot.to_string(), ToolVersionRecord::tool("", "")))
                .collect(),
        }
    }

    /// Loads a manifest from an XML file.
    ///
    /// # Errors
    /// Returns [`UpdateError::Parse`] if the file can't be read or is not well-formed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<UpdateManifest> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| UpdateError::parse(path, e))?;
        decode(&content).map_err(|msg| UpdateError::parse(path, msg))
    }

    /// Loads a manifest from a byte stream, e.g. an HTTP response body.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<UpdateManifest> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| UpdateError::parse("<stream>", e))?;
        decode(&content).map_err(|msg| UpdateError::parse("<stream>", msg))
    }

    pub fn from_xml_str(xml: &str) -> Result<UpdateManifest> {
        decode(xml).map_err(|msg| UpdateError::parse("<string>", msg))
    }

    pub fn to_xml_string(&self) -> Result<String> {
        encode(self).map_err(|msg| {
            UpdateError::io(PathBuf::from("<string>"), std::io::Error::other(msg))
        })
    }

    /// Writes the manifest to `path`, replacing any previous content.
    ///
    /// # Errors
    /// Returns [`UpdateError::Io`] if the file can't be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let xml = encode(self)
            .map_err(|msg| UpdateError::io(path, std::io::Error::other(msg)))?;
        write_text_file(path, &xml)
    }

    pub fn tool(&self, slot: &str) -> Option<&ToolVersionRecord> {
        self.tools.iter().find(|(s, _)| s == slot).map(|(_, r)| r)
    }

    pub fn tool_mut(&mut self, slot: &str) -> Option<&mut ToolVersionRecord> {
        self.tools.iter_mut().find(|(s, _)| s == slot).map(|(_, r)| r)
    }

    /// Replaces the record of a slot, appending the slot if it is not known yet.
    /// Returns the previous record.
    pub fn set_tool(&mut self, slot: &str, mut record: ToolVersionRecord) -> Option<ToolVersionRecord> {
        record.kind = RecordKind::Tool;
        match self.tool_mut(slot) {
            Some(existing) => Some(std::mem::replace(existing, record)),
            None => {
                self.tools.push((slot.to_string(), record));
                None
            }
        }
    }

    /// Tool slots and their records, known slots first.
    pub fn tools(&self) -> impl Iterator<Item = (&str, &ToolVersionRecord)> {
        self.tools.iter().map(|(s, r)| (s.as_str(), r))
    }

    /// Core, updater and tool slots, in document order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, &ToolVersionRecord)> {
        [(CORE_SLOT, &self.core), (UPDATER_SLOT, &self.updater)]
            .into_iter()
            .chain(self.tools())
    }

    /// Lists every slot whose version here is strictly newer than in `installed`.
    ///
    /// Slots with an empty version in `self` are skipped. An empty or unparsable
    /// installed version counts as outdated.
    ///
    /// # Errors
    /// Returns [`UpdateError::Format`] if a non-empty version in `self` does not parse.
    pub fn outdated_against(&self, installed: &UpdateManifest) -> Result<Vec<OutdatedTool>> {
        let mut outdated = Vec::new();
        for (slot, record) in self.slots() {
            if record.version.trim().is_empty() {
                continue;
            }
            let available = record.parse_version()?;
            let current = installed
                .slot(slot)
                .and_then(|r| r.parse_version().ok());
            let newer = match current {
                Some(current) => available > current,
                None => true,
            };
            if newer {
                outdated.push(OutdatedTool {
                    slot: slot.to_string(),
                    name: record.name.clone(),
                    installed: current,
                    available,
                });
            }
        }
        Ok(outdated)
    }

    fn slot(&self, slot: &str) -> Option<&ToolVersionRecord> {
        match slot {
            CORE_SLOT => Some(&self.core),
            UPDATER_SLOT => Some(&self.updater),
            _ => self.tool(slot),
        }
    }
}

impl fmt::Display for UpdateManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (slot, record) in self.slots() {
            if record.is_empty() {
                writeln!(f, "{slot}: -")?;
            } else {
                writeln!(f, "{slot}: {} {}", record.name, record.version)?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct WireRecord {
    #[serde(rename = "PackageVersion", default)]
    version: String,
    #[serde(rename = "PackageName", default)]
    name: String,
}

/// Blocks of the manifest root in document order.
struct WireManifest(Vec<(String, WireRecord)>);

impl Serialize for WireManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (slot, record) in &self.0 {
            map.serialize_entry(slot, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WireManifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct BlocksVisitor;

        impl<'de> Visitor<'de> for BlocksVisitor {
            type Value = WireManifest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a sequence of named version blocks")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut blocks = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    // attributes (`@xmlns:xsi`) and stray text
                    if key.starts_with('@') || key.starts_with('$') {
                        map.next_value::<IgnoredAny>()?;
                        continue;
                    }
                    let record = map.next_value::<WireRecord>()?;
                    blocks.push((key, record));
                }
                Ok(WireManifest(blocks))
            }
        }

        deserializer.deserialize_map(BlocksVisitor)
    }
}

fn decode(xml: &str) -> std::result::Result<UpdateManifest, String> {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    let root = xml_root_name(xml)?;
    if root != MANIFEST_ROOT {
        return Err(format!("unexpected root element <{root}>, expected <{MANIFEST_ROOT}>"));
    }
    let WireManifest(blocks) = quick_xml::de::from_str(xml).map_err(|e| e.to_string())?;
    let mut manifest = UpdateManifest::new();
    for (slot, wire) in blocks {
        match slot.as_str() {
            CORE_SLOT => manifest.core = CoreVersionRecord::core(&wire.name, &wire.version),
            UPDATER_SLOT => manifest.updater = CoreVersionRecord::core(&wire.name, &wire.version),
            _ => {
                manifest.set_tool(&slot, ToolVersionRecord::tool(&wire.name, &wire.version));
            }
        }
    }
    Ok(manifest)
}

fn encode(manifest: &UpdateManifest) -> std::result::Result<String, String> {
    let blocks = manifest
        .slots()
        .map(|(slot, record)| {
            (
                slot.to_string(),
                WireRecord {
                    version: record.version.clone(),
                    name: record.name.clone(),
                },
            )
        })
        .collect();
    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some(MANIFEST_ROOT))
        .map_err(|e| e.to_string())?;
    serializer.indent(' ', 2);
    WireManifest(blocks)
        .serialize(serializer)
        .map_err(|e| e.to_string())?;
    Ok(format!("{XML_DECLARATION}{body}\n"))
}
