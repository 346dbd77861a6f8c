//! Tar archive codec and the fixed filename grammar of an app archive.
//!
//! Extension set and split rule come from the archive filename grammar:
//! `NAME "-" VERSION EXT` where `EXT` is one of `.tar.gz`, `.tar.bz2`,
//! `.tar.xz`, `.tgz`, and the split point is the first hyphen followed by
//! a digit or a run of seven or more hex characters.

use crate::error::CommonError;
use bzip2::read::{BzDecoder, BzEncoder};
use bzip2::Compression as BzCompression;
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression as GzCompression;
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tar::{Archive, Builder};
use xz2::read::{XzDecoder, XzEncoder};

const KNOWN_EXTENSIONS: &[&str] = &[".tar.gz", ".tar.bz2", ".tar.xz", ".tgz"];

fn split_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-(\d|[0-9a-f]{7,})").expect("valid regex"))
}

/// Compression codec used to pack or unpack an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Gz,
    Bz2,
    Xz,
}

impl ArchiveKind {
    /// Canonical extension this kind is written with (`.tgz` is read-only alias for `Gz`).
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Gz => ".tar.gz",
            ArchiveKind::Bz2 => ".tar.bz2",
            ArchiveKind::Xz => ".tar.xz",
        }
    }

    /// Single-letter tar flag the remote `tar` invocation uses (`z`/`j`/`J`).
    pub fn tar_flag(self) -> char {
        match self {
            ArchiveKind::Gz => 'z',
            ArchiveKind::Bz2 => 'j',
            ArchiveKind::Xz => 'J',
        }
    }
}

/// Detect the archive kind from a filename's extension, if any.
pub fn detect_archive_kind(name: &str) -> Option<ArchiveKind> {
    let lower = name.to_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some(ArchiveKind::Gz)
    } else if lower.ends_with(".tar.bz2") {
        Some(ArchiveKind::Bz2)
    } else if lower.ends_with(".tar.xz") {
        Some(ArchiveKind::Xz)
    } else {
        None
    }
}

/// Split an archive filename into (name, version) per the fixed grammar.
pub fn parse_archive_name(filename: &str) -> Result<(String, String), CommonError> {
    let mut base = filename;
    for ext in KNOWN_EXTENSIONS {
        if let Some(stripped) = base.strip_suffix(ext) {
            base = stripped;
            break;
        }
    }

    let Some(m) = split_regex().find(base) else {
        return Err(CommonError::ArchiveNameUnparseable(filename.to_string()));
    };

    let name = &base[..m.start()];
    let version = &base[m.start() + 1..];

    if name.is_empty() || version.is_empty() {
        return Err(CommonError::ArchiveNameUnparseable(filename.to_string()));
    }

    Ok((name.to_string(), version.to_string()))
}

/// Build `NAME-VERSION.EXT` for the given kind. Inverse of [`parse_archive_name`]
/// for any version beginning with a digit or a >=7-hex-char run.
pub fn format_archive_name(name: &str, version: &str, kind: ArchiveKind) -> String {
    format!("{name}-{version}{}", kind.extension())
}

/// Extract an archive at `archive_path` into `dest_dir`, applying `strip_components`
/// leading path components to every entry the same way the `tar --strip-components`
/// flag would.
pub fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    strip_components: u32,
) -> Result<(), CommonError> {
    let kind = detect_archive_kind(
        archive_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default(),
    )
    .ok_or_else(|| CommonError::Archive(format!("unrecognized archive: {archive_path:?}")))?;

    fs::create_dir_all(dest_dir)?;
    let file = BufReader::new(File::open(archive_path)?);

    match kind {
        ArchiveKind::Gz => {
            let mut archive = Archive::new(GzDecoder::new(file));
            extract_entries(&mut archive, dest_dir, strip_components)
        }
        ArchiveKind::Bz2 => {
            let mut archive = Archive::new(BzDecoder::new(file));
            extract_entries(&mut archive, dest_dir, strip_components)
        }
        ArchiveKind::Xz => {
            let mut archive = Archive::new(XzDecoder::new(file));
            extract_entries(&mut archive, dest_dir, strip_components)
        }
    }
}

fn extract_entries<R: Read>(
    archive: &mut Archive<R>,
    dest_dir: &Path,
    strip_components: u32,
) -> Result<(), CommonError> {
    let strip = strip_components as usize;
    for entry in archive
        .entries()
        .map_err(|e| CommonError::Archive(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| CommonError::Archive(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| CommonError::Archive(e.to_string()))?
            .to_path_buf();
        let Some(stripped) = strip_path(&path, strip) else {
            continue;
        };
        let out_path = dest_dir.join(stripped);

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&out_path)
            .map_err(|e| CommonError::Archive(e.to_string()))?;
    }
    Ok(())
}

fn strip_path(path: &Path, strip_components: usize) -> Option<PathBuf> {
    if strip_components == 0 {
        return Some(path.to_path_buf());
    }
    let stripped: PathBuf = path.components().skip(strip_components).collect();
    if stripped.as_os_str().is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Read a single member's bytes out of an archive without extracting anything else.
/// Used to read `conf.toml` out of an archive package source.
pub fn read_member(archive_path: &Path, member_name: &str) -> Result<Option<Vec<u8>>, CommonError> {
    let kind = detect_archive_kind(
        archive_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default(),
    )
    .ok_or_else(|| CommonError::Archive(format!("unrecognized archive: {archive_path:?}")))?;

    let file = BufReader::new(File::open(archive_path)?);
    match kind {
        ArchiveKind::Gz => read_member_from(Archive::new(GzDecoder::new(file)), member_name),
        ArchiveKind::Bz2 => read_member_from(Archive::new(BzDecoder::new(file)), member_name),
        ArchiveKind::Xz => read_member_from(Archive::new(XzDecoder::new(file)), member_name),
    }
}

fn read_member_from<R: Read>(
    mut archive: Archive<R>,
    member_name: &str,
) -> Result<Option<Vec<u8>>, CommonError> {
    for entry in archive
        .entries()
        .map_err(|e| CommonError::Archive(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| CommonError::Archive(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| CommonError::Archive(e.to_string()))?
            .to_path_buf();
        let matches = path.to_str().map(|p| p == member_name || p.ends_with(&format!("/{member_name}")));
        if matches.unwrap_or(false) {
            let mut buf = Vec::new();
            entry
                .read_to_end(&mut buf)
                .map_err(|e| CommonError::Archive(e.to_string()))?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

/// Pack `src_dir`'s children (no wrapping directory) into `dest_archive`, excluding
/// any relative path matching a default-exclude name or one of `extra_excludes`.
pub fn create_archive(
    src_dir: &Path,
    dest_archive: &Path,
    kind: ArchiveKind,
    extra_excludes: &[String],
) -> Result<(), CommonError> {
    let file = File::create(dest_archive)?;
    match kind {
        ArchiveKind::Gz => {
            let encoder = GzEncoder::new(file, GzCompression::default());
            pack_entries(src_dir, encoder, extra_excludes)
        }
        ArchiveKind::Bz2 => {
            let encoder = BzEncoder::new(file, BzCompression::default());
            pack_entries(src_dir, encoder, extra_excludes)
        }
        ArchiveKind::Xz => {
            let encoder = XzEncoder::new(file, 6);
            pack_entries(src_dir, encoder, extra_excludes)
        }
    }
}

fn is_excluded(rel: &Path, extra_excludes: &[String]) -> bool {
    const DEFAULTS: &[&str] = &[".git", "__pycache__", ".env", ".DS_Store"];
    for component in rel.components() {
        let Some(s) = component.as_os_str().to_str() else {
            continue;
        };
        if DEFAULTS.contains(&s) {
            return true;
        }
        if s.ends_with(".pyc") {
            return true;
        }
        if extra_excludes.iter().any(|pattern| glob_match(pattern, s)) {
            return true;
        }
    }
    false
}

fn glob_match(pattern: &str, name: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(name))
        .unwrap_or(false)
}

fn pack_entries<W: Write>(
    src_dir: &Path,
    encoder: W,
    extra_excludes: &[String],
) -> Result<(), CommonError> {
    let mut builder = Builder::new(encoder);
    for entry in walkdir::WalkDir::new(src_dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            let rel = e.path().strip_prefix(src_dir).unwrap_or(e.path());
            !is_excluded(rel, extra_excludes)
        })
    {
        let entry = entry.map_err(|e| CommonError::Archive(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|e| CommonError::Archive(e.to_string()))?;
        if entry.file_type().is_dir() {
            builder
                .append_dir(rel, entry.path())
                .map_err(|e| CommonError::Archive(e.to_string()))?;
        } else if entry.file_type().is_file() {
            let mut f = File::open(entry.path())?;
            builder
                .append_file(rel, &mut f)
                .map_err(|e| CommonError::Archive(e.to_string()))?;
        }
    }
    builder
        .into_inner()
        .map_err(|e| CommonError::Archive(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semver_style_version() {
        let (name, version) = parse_archive_name("my-app-2.0-rc1.tar.gz").unwrap();
        assert_eq!(name, "my-app");
        assert_eq!(version, "2.0-rc1");
    }

    #[test]
    fn parses_short_hash_version() {
        let (name, version) = parse_archive_name("littlenotes-c1b87d2.tar.bz2").unwrap();
        assert_eq!(name, "littlenotes");
        assert_eq!(version, "c1b87d2");
    }

    #[test]
    fn parses_plain_digit_version() {
        let (name, version) = parse_archive_name("svc-1.0.tgz").unwrap();
        assert_eq!(name, "svc");
        assert_eq!(version, "1.0");
    }

    #[test]
    fn rejects_unversioned_name() {
        assert!(parse_archive_name("no-version.tar.gz").is_err());
    }

    #[test]
    fn round_trips_format_and_parse() {
        let formatted = format_archive_name("svc", "1.2.3", ArchiveKind::Xz);
        assert_eq!(formatted, "svc-1.2.3.tar.xz");
        let (name, version) = parse_archive_name(&formatted).unwrap();
        assert_eq!(name, "svc");
        assert_eq!(version, "1.2.3");
    }

    #[test]
    fn create_and_extract_round_trip() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("run.sh"), "#!/bin/sh\necho hi\n").unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub/file.txt"), "data").unwrap();

        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("svc-1.0.tar.gz");
        create_archive(src.path(), &archive_path, ArchiveKind::Gz, &[]).unwrap();

        let dest = tempfile::tempdir().unwrap();
        extract_archive(&archive_path, dest.path(), 0).unwrap();
        assert!(dest.path().join("run.sh").exists());
        assert!(dest.path().join("sub/file.txt").exists());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn name_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{0,12}".prop_filter("no trailing digit", |s| {
            !s.chars().last().is_some_and(|c| c.is_ascii_digit())
        })
    }

    proptest! {
        /// Any name (no trailing digit, so it can't be mistaken for the
        /// start of the version) paired with a digit-leading version
        /// round-trips through format/parse for every archive kind.
        #[test]
        fn format_then_parse_recovers_name_and_version(
            name in name_strategy(),
            major in 0u32..999,
            minor in 0u32..999,
        ) {
            let version = format!("{major}.{minor}");
            for kind in [ArchiveKind::Gz, ArchiveKind::Bz2, ArchiveKind::Xz] {
                let formatted = format_archive_name(&name, &version, kind);
                let (parsed_name, parsed_version) = parse_archive_name(&formatted).unwrap();
                prop_assert_eq!(&parsed_name, &name);
                prop_assert_eq!(&parsed_version, &version);
            }
        }
    }
}
