use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use crate::error::{Result, UpdateError};
use crate::package::PackageInfo;
use crate::util::{write_text_file, xml_root_name};

/// Schema version written into the `schemaVersion` attribute of the list root.
pub const LIST_SCHEMA_VERSION: u32 = 1;

/// An ordered list of [`PackageInfo`] entries backed by an XML file.
///
/// Order is significant and survives a save/load cycle. Package names are not
/// required to be unique; lookups by name return the first match.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageList {
    pub packages: Vec<PackageInfo>,
}

const LIST_ROOT: &str = "ArrayOfPackageInfo";
const PACKAGE_ELEMENT: &str = "PackageInfo";
const SCHEMA_ATTRIBUTE: &str = "schemaVersion";

// Wire format, version 1. Element names are owned here so the in-memory record
// can evolve independently of what is on disk.
const NAME_ELEMENT: &str = "PackageName";
const LOCATION_ELEMENT: &str = "PackageLocation";
const DESTINATION_ELEMENT: &str = "Destination";
const VERSION_ELEMENT: &str = "Version";
const WRITE_VERSION_ELEMENT: &str = "WriteVersion";
const CLEAR_ELEMENT: &str = "ClearDirectory";
const RECURSIVE_CLEAR_ELEMENT: &str = "RecursiveClearDirectory";
const FIELD_ELEMENTS: [&str; 7] = [
    NAME_ELEMENT,
    LOCATION_ELEMENT,
    DESTINATION_ELEMENT,
    VERSION_ELEMENT,
    WRITE_VERSION_ELEMENT,
    CLEAR_ELEMENT,
    RECURSIVE_CLEAR_ELEMENT,
];

impl PackageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a package list from an XML file.
    ///
    /// # Errors
    /// Returns [`UpdateError::Parse`] if the file is missing, unreadable, not well-formed,
    /// lacks one of the required descriptor elements, or declares an unknown schema version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PackageList> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| UpdateError::parse(path, e))?;
        decode(&content).map_err(|msg| UpdateError::parse(path, msg))
    }

    /// Parses a package list from any buffered reader.
    pub fn from_reader<R: BufRead>(mut reader: R) -> Result<PackageList> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| UpdateError::parse("<stream>", e))?;
        decode(&content).map_err(|msg| UpdateError::parse("<stream>", msg))
    }

    /// Parses a package list from an XML string.
    pub fn from_xml_str(xml: &str) -> Result<PackageList> {
        decode(xml).map_err(|msg| UpdateError::parse("<string>", msg))
    }

    /// Serializes the list to an indented XML document.
    pub fn to_xml_string(&self) -> Result<String> {
        encode(self).map_err(|msg| {
            UpdateError::io(PathBuf::from("<string>"), std::io::Error::other(msg))
        })
    }

    /// Writes the list to `path`, creating or truncating the file.
    ///
    /// The previous content is replaced entirely. Parent directories are not created.
    ///
    /// # Errors
    /// Returns [`UpdateError::Io`] if the file can't be opened or written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let xml = encode(self)
            .map_err(|msg| UpdateError::io(path, std::io::Error::other(msg)))?;
        write_text_file(path, &xml)?;
        log::debug!("Saved {} package(s) to {}", self.packages.len(), path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackageInfo> {
        self.packages.iter()
    }

    /// Appends a package at the end of the list. Duplicated names are accepted.
    pub fn push(&mut self, package: PackageInfo) {
        self.packages.push(package);
    }

    /// Returns the first package with the given name.
    pub fn find(&self, name: &str) -> Option<&PackageInfo> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Returns the index of the first package with the given name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.packages.iter().position(|p| p.name == name)
    }

    /// Removes every package with the given name and returns how many were removed.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.packages.len();
        self.packages.retain(|p| p.name != name);
        before - self.packages.len()
    }

    /// Package names in list order, duplicates included.
    pub fn names(&self) -> Vec<&str> {
        self.packages.iter().map(|p| p.name.as_str()).collect()
    }
}

impl From<Vec<PackageInfo>> for PackageList {
    fn from(packages: Vec<PackageInfo>) -> Self {
        PackageList { packages }
    }
}

impl FromIterator<PackageInfo> for PackageList {
    fn from_iter<I: IntoIterator<Item = PackageInfo>>(iter: I) -> Self {
        PackageList {
            packages: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PackageList {
    type Item = PackageInfo;
    type IntoIter = std::vec::IntoIter<PackageInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.into_iter()
    }
}

impl<'a> IntoIterator for &'a PackageList {
    type Item = &'a PackageInfo;
    type IntoIter = std::slice::Iter<'a, PackageInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter()
    }
}

type WireResult<T> = std::result::Result<T, String>;

fn decode(xml: &str) -> WireResult<PackageList> {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    let root = xml_root_name(xml)?;
    if root != LIST_ROOT {
        return Err(format!("unexpected root element <{root}>, expected <{LIST_ROOT}>"));
    }

    // Text is read untrimmed so values with outer whitespace come back unchanged.
    let mut reader = Reader::from_str(xml);
    let mut list = PackageList::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) if e.name().as_ref() == LIST_ROOT.as_bytes() => {
                check_schema_version(&e)?;
            }
            Event::Empty(e) if e.name().as_ref() == LIST_ROOT.as_bytes() => {
                check_schema_version(&e)?;
                return Ok(list);
            }
            Event::Start(e) if e.name().as_ref() == PACKAGE_ELEMENT.as_bytes() => {
                list.push(read_package(&mut reader)?);
            }
            Event::Empty(e) if e.name().as_ref() == PACKAGE_ELEMENT.as_bytes() => {
                return Err(format!("<{PACKAGE_ELEMENT}> #{} has no fields", list.len() + 1));
            }
            Event::Start(e) => {
                reader.read_to_end(e.name()).map_err(|e| e.to_string())?;
            }
            Event::End(e) if e.name().as_ref() == LIST_ROOT.as_bytes() => return Ok(list),
            Event::Eof => return Err(format!("missing </{LIST_ROOT}>")),
            _ => {}
        }
    }
}

fn check_schema_version(root: &BytesStart<'_>) -> WireResult<()> {
    for attr in root.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref() != SCHEMA_ATTRIBUTE.as_bytes() {
            continue;
        }
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        let version: u32 = value
            .trim()
            .parse()
            .map_err(|_| format!("invalid schema version '{value}'"))?;
        if version != LIST_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema version {} (expected {})",
                version, LIST_SCHEMA_VERSION
            ));
        }
    }
    // Lists written before the attribute existed are version 1.
    Ok(())
}

#[derive(Default)]
struct PackageFields {
    name: Option<String>,
    location: Option<String>,
    destination: Option<String>,
    version: Option<String>,
    write_version: Option<bool>,
    clear_directory: Option<bool>,
    recursive_clear_directory: Option<bool>,
}

impl PackageFields {
    fn into_package(self) -> WireResult<PackageInfo> {
        Ok(PackageInfo {
            name: require(self.name, NAME_ELEMENT)?,
            source_location: require(self.location, LOCATION_ELEMENT)?,
            destination: require(self.destination, DESTINATION_ELEMENT)?,
            version: require(self.version, VERSION_ELEMENT)?,
            write_version: require(self.write_version, WRITE_VERSION_ELEMENT)?,
            clear_directory: require(self.clear_directory, CLEAR_ELEMENT)?,
            recursive_clear_directory: require(
                self.recursive_clear_directory,
                RECURSIVE_CLEAR_ELEMENT,
            )?,
        })
    }
}

fn require<T>(value: Option<T>, element: &str) -> WireResult<T> {
    value.ok_or_else(|| format!("missing field `{element}`"))
}

fn read_package(reader: &mut Reader<&[u8]>) -> WireResult<PackageInfo> {
    let mut fields = PackageFields::default();
    loop {
        let (element, text) = match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                let element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if !FIELD_ELEMENTS.contains(&element.as_str()) {
                    reader.read_to_end(e.name()).map_err(|e| e.to_string())?;
                    continue;
                }
                let text = read_text(reader, &element)?;
                (element, text)
            }
            Event::Empty(e) => {
                (String::from_utf8_lossy(e.name().as_ref()).into_owned(), String::new())
            }
            Event::End(_) => return fields.into_package(),
            Event::Eof => return Err(format!("missing </{PACKAGE_ELEMENT}>")),
            _ => continue,
        };
        match element.as_str() {
            NAME_ELEMENT => fields.name = Some(text),
            LOCATION_ELEMENT => fields.location = Some(text),
            DESTINATION_ELEMENT => fields.destination = Some(text),
            VERSION_ELEMENT => fields.version = Some(text),
            WRITE_VERSION_ELEMENT => fields.write_version = Some(parse_bool(&element, &text)?),
            CLEAR_ELEMENT => fields.clear_directory = Some(parse_bool(&element, &text)?),
            RECURSIVE_CLEAR_ELEMENT => {
                fields.recursive_clear_directory = Some(parse_bool(&element, &text)?)
            }
            _ => {}
        }
    }
}

/// Collects the text content of the element just opened, up to its end tag.
fn read_text(reader: &mut Reader<&[u8]>, element: &str) -> WireResult<String> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(|e| e.to_string())?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(_) => return Ok(text),
            Event::Start(_) | Event::Empty(_) => {
                return Err(format!("unexpected child element in <{element}>"));
            }
            Event::Eof => return Err(format!("missing </{element}>")),
            _ => {}
        }
    }
}

fn parse_bool(element: &str, text: &str) -> WireResult<bool> {
    match text.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("invalid boolean '{other}' in <{element}>")),
    }
}

/// Escapes text content. Line breaks, tabs and whitespace at either end are
/// written as character references so no reader can trim or normalize them.
fn escape_text(value: &str) -> String {
    let start = value.len() - value.trim_start().len();
    let end = value.trim_end().len();
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.char_indices() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\t' | '\n' | '\r' => out.push_str(&format!("&#{};", c as u32)),
            c if c.is_whitespace() && (i < start || i >= end) => {
                out.push_str(&format!("&#{};", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

fn encode(list: &PackageList) -> WireResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_list(&mut writer, list).map_err(|e| e.to_string())?;
    let mut xml = String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())?;
    xml.push('\n');
    Ok(xml)
}

fn write_list(writer: &mut Writer<Vec<u8>>, list: &PackageList) -> std::io::Result<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    let version = LIST_SCHEMA_VERSION.to_string();
    let root = BytesStart::new(LIST_ROOT).with_attributes([(SCHEMA_ATTRIBUTE, version.as_str())]);
    writer.write_event(Event::Start(root))?;
    for package in &list.packages {
        writer.write_event(Event::Start(BytesStart::new(PACKAGE_ELEMENT)))?;
        write_field(writer, NAME_ELEMENT, &package.name)?;
        write_field(writer, LOCATION_ELEMENT, &package.source_location)?;
        write_field(writer, DESTINATION_ELEMENT, &package.destination)?;
        write_field(writer, VERSION_ELEMENT, &package.version)?;
        write_field(writer, WRITE_VERSION_ELEMENT, bool_text(package.write_version))?;
        write_field(writer, CLEAR_ELEMENT, bool_text(package.clear_directory))?;
        write_field(writer, RECURSIVE_CLEAR_ELEMENT, bool_text(package.recursive_clear_directory))?;
        writer.write_event(Event::End(BytesEnd::new(PACKAGE_ELEMENT)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(LIST_ROOT)))
}

fn write_field(writer: &mut Writer<Vec<u8>>, element: &str, value: &str) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(element)))?;
    writer.write_event(Event::Text(BytesText::from_escaped(escape_text(value))))?;
    writer.write_event(Event::End(BytesEnd::new(element)))
}

fn bool_text(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scenario_list() -> PackageList {
        PackageList::from(vec![
            PackageInfo::new("ffmpeg", "http://x/ffmpeg.zip", "C:/tools/ffmpeg", "1.0")
                .with_write_version(true),
            PackageInfo::new("mkvtoolnix", "http://x/mkv.zip", "C:/tools/mkv", "8.2")
                .with_clear_directory(true)
                .with_recursive_clear_directory(true),
        ])
    }

    #[test]
    fn test_scenario_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("updates.xml");
        let list = scenario_list();
        list.save(&path).unwrap();

        let loaded = PackageList::load(&path).unwrap();
        assert_eq!(loaded, list);
        let ffmpeg = &loaded.packages[0];
        assert_eq!(ffmpeg.name, "ffmpeg");
        assert_eq!(ffmpeg.source_location, "http://x/ffmpeg.zip");
        assert_eq!(ffmpeg.destination, "C:/tools/ffmpeg");
        assert_eq!(ffmpeg.version, "1.0");
        assert!(ffmpeg.write_version);
        assert!(!ffmpeg.clear_directory);
        assert!(!ffmpeg.recursive_clear_directory);
        let mkv = &loaded.packages[1];
        assert_eq!(mkv.name, "mkvtoolnix");
        assert!(!mkv.write_version);
        assert!(mkv.clear_directory);
        assert!(mkv.recursive_clear_directory);
    }

    #[test]
    fn test_empty_list_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.xml");
        PackageList::new().save(&path).unwrap();
        let loaded = PackageList::load(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_order_is_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("order.xml");
        let list: PackageList = ["c", "a", "b"]
            .iter()
            .map(|n| PackageInfo::new(n, "", "", ""))
            .collect();
        list.save(&path).unwrap();
        assert_eq!(PackageList::load(&path).unwrap().names(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_empty_strings_survive() {
        let list = PackageList::from(vec![PackageInfo::default()]);
        let xml = list.to_xml_string().unwrap();
        let loaded = PackageList::from_xml_str(&xml).unwrap();
        assert_eq!(loaded, list);
    }

    #[test]
    fn test_written_document_shape() {
        let xml = scenario_list().to_xml_string().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<ArrayOfPackageInfo schemaVersion=\"1\">"));
        assert!(xml.contains("<PackageName>ffmpeg</PackageName>"));
        assert!(xml.contains("<PackageLocation>http://x/ffmpeg.zip</PackageLocation>"));
        assert!(xml.contains("<WriteVersion>true</WriteVersion>"));
        assert!(xml.contains("<RecursiveClearDirectory>true</RecursiveClearDirectory>"));
    }

    #[test]
    fn test_save_truncates_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("updates.xml");
        scenario_list().save(&path).unwrap();
        PackageList::from(vec![PackageInfo::new("lame", "", "", "3.100")])
            .save(&path)
            .unwrap();
        let loaded = PackageList::load(&path).unwrap();
        assert_eq!(loaded.names(), vec!["lame"]);
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        let xml = r#"<?xml version="1.0"?>
<ArrayOfPackageInfo>
  <PackageInfo>
    <PackageName>ffmpeg</PackageName>
    <PackageLocation>http://x/ffmpeg.zip</PackageLocation>
    <Destination>C:/tools/ffmpeg</Destination>
    <WriteVersion>true</WriteVersion>
    <ClearDirectory>false</ClearDirectory>
    <RecursiveClearDirectory>false</RecursiveClearDirectory>
  </PackageInfo>
</ArrayOfPackageInfo>"#;
        let err = PackageList::from_xml_str(xml).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_missing_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let err = PackageList::load(dir.path().join("nope.xml")).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_not_xml_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.xml");
        std::fs::write(&path, "<ArrayOfPackageInfo><PackageInfo>").unwrap();
        assert!(PackageList::load(&path).unwrap_err().is_parse());
    }

    #[test]
    fn test_wrong_root_is_parse_error() {
        let manifest = crate::manifest::UpdateManifest::new().to_xml_string().unwrap();
        let err = PackageList::from_xml_str(&manifest).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("<VideoConvertUpdateFile>"));
        assert!(PackageList::from_xml_str("<Foo/>").unwrap_err().is_parse());
        assert!(PackageList::from_xml_str("<Foo><PackageInfo/></Foo>").unwrap_err().is_parse());
    }

    #[test]
    fn test_empty_root_element_is_empty_list() {
        let list = PackageList::from_xml_str("<ArrayOfPackageInfo schemaVersion=\"1\"/>").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_outer_whitespace_survives() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("updates.xml");
        let list = PackageList::from(vec![
            PackageInfo::new("  ffmpeg ", "\thttp://x/a b.zip", "C:/Program Files/x ", " 1.0\n"),
            PackageInfo::new("a < b & c", "\r\n", " ", "2.0"),
        ]);
        list.save(&path).unwrap();
        assert_eq!(PackageList::load(&path).unwrap(), list);
    }

    #[test]
    fn test_unknown_elements_are_ignored() {
        let xml = r#"<ArrayOfPackageInfo>
  <Comment>hand edited</Comment>
  <PackageInfo>
    <PackageName>lame</PackageName>
    <PackageLocation>lame.zip</PackageLocation>
    <Destination>tools/lame</Destination>
    <Version>3.100</Version>
    <Checksum><Sha1>abc</Sha1></Checksum>
    <WriteVersion>1</WriteVersion>
    <ClearDirectory>false</ClearDirectory>
    <RecursiveClearDirectory>0</RecursiveClearDirectory>
  </PackageInfo>
</ArrayOfPackageInfo>"#;
        let list = PackageList::from_xml_str(xml).unwrap();
        assert_eq!(list.names(), vec!["lame"]);
        assert!(list.packages[0].write_version);
        assert!(!list.packages[0].recursive_clear_directory);
    }

    #[test]
    fn test_bad_boolean_is_parse_error() {
        let xml = scenario_list()
            .to_xml_string()
            .unwrap()
            .replace("<WriteVersion>true</WriteVersion>", "<WriteVersion>yes</WriteVersion>");
        let err = PackageList::from_xml_str(&xml).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("WriteVersion"));
    }

    #[test]
    fn test_unsupported_schema_version() {
        let xml = r#"<ArrayOfPackageInfo schemaVersion="2"></ArrayOfPackageInfo>"#;
        let err = PackageList::from_xml_str(xml).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("schema version 2"));
    }

    #[test]
    fn test_legacy_document_loads() {
        let xml = "\u{feff}<?xml version=\"1.0\"?>
<ArrayOfPackageInfo xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\">
  <PackageInfo>
    <PackageName>x264</PackageName>
    <PackageLocation>C:\\Temp\\x264.7z</PackageLocation>
    <Destination>C:\\Program Files\\VideoConvert\\tools\\x264</Destination>
    <Version>2389</Version>
    <WriteVersion>true</WriteVersion>
    <ClearDirectory>true</ClearDirectory>
    <RecursiveClearDirectory>false</RecursiveClearDirectory>
  </PackageInfo>
</ArrayOfPackageInfo>";
        let list = PackageList::from_xml_str(xml).unwrap();
        assert_eq!(list.len(), 1);
        let pkg = list.find("x264").unwrap();
        assert_eq!(pkg.version, "2389");
        assert_eq!(pkg.source_location, "C:\\Temp\\x264.7z");
        assert!(pkg.clear_directory);
    }

    #[test]
    fn test_from_reader() {
        let xml = scenario_list().to_xml_string().unwrap();
        let list = PackageList::from_reader(xml.as_bytes()).unwrap();
        assert_eq!(list.names(), vec!["ffmpeg", "mkvtoolnix"]);
    }

    #[test]
    fn test_save_into_missing_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let err = PackageList::new()
            .save(dir.path().join("missing").join("updates.xml"))
            .unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_duplicate_names_are_kept() {
        let mut list = PackageList::new();
        list.push(PackageInfo::new("lame", "a.zip", "", "1"));
        list.push(PackageInfo::new("lame", "b.zip", "", "2"));
        list.push(PackageInfo::new("oggenc", "c.zip", "", "1"));
        assert_eq!(list.find("lame").unwrap().version, "1");
        assert_eq!(list.position("oggenc"), Some(2));
        assert_eq!(list.remove_all("lame"), 2);
        assert_eq!(list.names(), vec!["oggenc"]);
    }
}
