use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use flate2::read::GzDecoder;
use log::debug;
use quick_xml::events::Event;
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::ZipArchive;
use crate::error::{Result, UpdateError};

/// Name of the marker file written into a destination when `write_version` is set.
pub const VERSION_FILE_NAME: &str = "version";

/// Writes `content` to `path`, creating or truncating the file.
pub fn write_text_file(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| UpdateError::io(path, e))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| UpdateError::io(path, e))
}

/// Returns the name of the first element of an XML document.
pub(crate) fn xml_root_name(xml: &str) -> std::result::Result<String, String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::Eof => return Err("document has no root element".to_string()),
            _ => {}
        }
    }
}

/// Archive formats a package may be shipped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    Tar,
    SevenZ,
}

impl ArchiveKind {
    /// Detects the format from a file name or URL, ignoring case and any query string.
    pub fn detect(name: &str) -> Option<ArchiveKind> {
        let name = name.split(['?', '#']).next().unwrap_or(name).to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else if name.ends_with(".7z") {
            Some(ArchiveKind::SevenZ)
        } else {
            None
        }
    }
}

/// Removes the contents of `dir` without removing `dir` itself.
///
/// With `recursive == false` only the files directly inside `dir` are removed and
/// subdirectories are left alone. With `recursive == true` every file and every
/// subdirectory below `dir` is removed.
///
/// Returns the number of removed entries.
pub fn clear_directory(dir: &Path, recursive: bool) -> Result<usize> {
    let mut removed = 0;
    if !recursive {
        let entries = std::fs::read_dir(dir).map_err(|e| UpdateError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| UpdateError::io(dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| UpdateError::io(&path, e))?;
            if !file_type.is_dir() {
                std::fs::remove_file(&path).map_err(|e| UpdateError::io(&path, e))?;
                removed += 1;
            }
        }
        return Ok(removed);
    }

    for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            UpdateError::io(path, e.into())
        })?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            std::fs::remove_dir(path).map_err(|e| UpdateError::io(path, e))?;
        } else {
            std::fs::remove_file(path).map_err(|e| UpdateError::io(path, e))?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// Extracts `archive` into `dest` and returns the number of files written.
///
/// Entries whose paths would escape `dest` are skipped.
pub fn extract_archive(archive: &Path, kind: ArchiveKind, dest: &Path) -> Result<usize> {
    debug!("Extracting {} ({:?}) into {}", archive.display(), kind, dest.display());
    let file = File::open(archive).map_err(|e| UpdateError::io(archive, e))?;
    match kind {
        ArchiveKind::Zip => extract_zip(file, archive, dest),
        ArchiveKind::TarGz => extract_tar(tar::Archive::new(GzDecoder::new(file)), archive, dest),
        ArchiveKind::Tar => extract_tar(tar::Archive::new(file), archive, dest),
        ArchiveKind::SevenZ => extract_7z(archive, dest),
    }
}

fn extract_zip(file: File, archive_path: &Path, dest: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(file)
        .map_err(|e| UpdateError::archive(archive_path, e))?;
    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| UpdateError::archive(archive_path, e))?;
        let relative = match entry.enclosed_name() {
            Some(path) => path,
            None => {
                debug!("Skipping entry with unsafe path: {}", entry.name());
                continue;
            }
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| UpdateError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| UpdateError::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| UpdateError::io(&target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| UpdateError::io(&target, e))?;
        files += 1;
    }
    Ok(files)
}

fn extract_tar<R: std::io::Read>(mut archive: tar::Archive<R>, archive_path: &Path, dest: &Path) -> Result<usize> {
    let mut files = 0;
    let entries = archive
        .entries()
        .map_err(|e| UpdateError::archive(archive_path, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| UpdateError::archive(archive_path, e))?;
        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| UpdateError::archive(archive_path, e))?;
        if !unpacked {
            debug!("Skipping entry outside of {}", dest.display());
        } else if is_file {
            files += 1;
        }
    }
    Ok(files)
}

fn extract_7z(archive_path: &Path, dest: &Path) -> Result<usize> {
    let mut files = 0;
    sevenz_rust::decompress_file_with_extract_fn(archive_path, dest, |entry, reader, target| {
        if !is_enclosed(&entry.name) {
            debug!("Skipping entry with unsafe path: {}", entry.name);
            std::io::copy(reader, &mut std::io::sink())?;
            return Ok(true);
        }
        let extracted = sevenz_rust::default_entry_extract_fn(entry, reader, target)?;
        if !entry.is_directory {
            files += 1;
        }
        Ok(extracted)
    })
    .map_err(|e| UpdateError::archive(archive_path, e))?;
    Ok(files)
}

// 7z entry names may use either separator.
fn is_enclosed(name: &str) -> bool {
    let name = name.replace('\\', "/");
    !name.is_empty()
        && Path::new(&name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Downloads `url` into a temporary file that is removed when dropped.
pub fn download_to_temp(url: &str) -> Result<NamedTempFile> {
    let download_err = |message: String| UpdateError::Download {
        url: url.to_string(),
        message,
    };
    debug!("Downloading {}", url);
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| download_err(e.to_string()))?;
    let mut temp = NamedTempFile::new().map_err(|e| download_err(e.to_string()))?;
    response
        .copy_to(temp.as_file_mut())
        .map_err(|e| download_err(e.to_string()))?;
    temp.as_file_mut()
        .flush()
        .map_err(|e| download_err(e.to_string()))?;
    Ok(temp)
}

/// Path of the version marker inside `destination`.
pub fn version_file(destination: &Path) -> PathBuf {
    destination.join(VERSION_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn populate(dir: &Path) {
        fs::write(dir.join("a.exe"), "a").unwrap();
        fs::write(dir.join("b.dll"), "b").unwrap();
        fs::create_dir_all(dir.join("presets").join("nested")).unwrap();
        fs::write(dir.join("presets").join("p1.txt"), "p1").unwrap();
        fs::write(dir.join("presets").join("nested").join("p2.txt"), "p2").unwrap();
    }

    #[test]
    fn test_archive_kind_detect() {
        assert_eq!(ArchiveKind::detect("ffmpeg.zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect("http://x/FFMPEG.ZIP?token=1"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect("tool.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect("tool.tgz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect("tool.tar"), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::detect("C:\\Temp\\x264.7z"), Some(ArchiveKind::SevenZ));
        assert_eq!(ArchiveKind::detect("tool.rar"), None);
    }

    #[test]
    fn test_clear_directory_top_level_only() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let removed = clear_directory(dir.path(), false).unwrap();
        assert_eq!(removed, 2);
        assert!(!dir.path().join("a.exe").exists());
        assert!(dir.path().join("presets").join("p1.txt").exists());
        assert!(dir.path().join("presets").join("nested").join("p2.txt").exists());
    }

    #[test]
    fn test_clear_directory_recursive() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let removed = clear_directory(dir.path(), true).unwrap();
        assert_eq!(removed, 6);
        assert!(dir.path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file("bin/tool.exe", options).unwrap();
        zip.write_all(b"binary").unwrap();
        zip.start_file("readme.txt", options).unwrap();
        zip.write_all(b"hello").unwrap();
        zip.finish().unwrap();

        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        let files = extract_archive(&archive, ArchiveKind::Zip, &dest).unwrap();
        assert_eq!(files, 2);
        assert_eq!(fs::read_to_string(dest.join("bin").join("tool.exe")).unwrap(), "binary");
        assert_eq!(fs::read_to_string(dest.join("readme.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_extract_tar_gz() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        let encoder = flate2::write::GzEncoder::new(
            File::create(&archive).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);
        let content = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_path("tool/run.sh").unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, &content[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        let files = extract_archive(&archive, ArchiveKind::TarGz, &dest).unwrap();
        assert_eq!(files, 1);
        assert!(dest.join("tool").join("run.sh").exists());
    }

    #[test]
    fn test_corrupt_zip_is_archive_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, "not a zip").unwrap();
        let err = extract_archive(&archive, ArchiveKind::Zip, dir.path()).unwrap_err();
        assert!(matches!(err, UpdateError::Archive { .. }));
    }

    #[test]
    fn test_extract_7z() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("x264");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("bin").join("x264.exe"), "binary").unwrap();
        fs::write(src.join("readme.txt"), "hello").unwrap();
        let archive = dir.path().join("x264.7z");
        sevenz_rust::compress_to_path(&src, &archive).unwrap();

        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        let files = extract_archive(&archive, ArchiveKind::SevenZ, &dest).unwrap();
        assert_eq!(files, 2);
        let exe = WalkDir::new(&dest)
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name() == "x264.exe")
            .unwrap();
        assert_eq!(fs::read_to_string(exe.path()).unwrap(), "binary");
    }

    #[test]
    fn test_corrupt_7z_is_archive_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("broken.7z");
        fs::write(&archive, "not a 7z archive").unwrap();
        let err = extract_archive(&archive, ArchiveKind::SevenZ, dir.path()).unwrap_err();
        assert!(matches!(err, UpdateError::Archive { .. }));
    }

    #[test]
    fn test_unsafe_entry_names() {
        assert!(is_enclosed("bin/x264.exe"));
        assert!(is_enclosed("bin\\x264.exe"));
        assert!(!is_enclosed("../evil.exe"));
        assert!(!is_enclosed("bin\\..\\..\\evil.exe"));
        assert!(!is_enclosed("/etc/passwd"));
        assert!(!is_enclosed(""));
    }

    #[test]
    fn test_xml_root_name() {
        assert_eq!(xml_root_name("<?xml version=\"1.0\"?>\n<!-- c -->\n<Foo a=\"1\"><Bar/></Foo>").unwrap(), "Foo");
        assert_eq!(xml_root_name("<Empty/>").unwrap(), "Empty");
        assert!(xml_root_name("just text").is_err());
    }

    #[test]
    fn test_write_text_file_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("version");
        write_text_file(&path, "10.0.1").unwrap();
        write_text_file(&path, "9").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "9");
    }
}
