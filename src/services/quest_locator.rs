use crate::models::quest::QuestProperties;
use crate::models::{QuestDataSource, QuestDescriptor};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs::{self, File};
use std::io::Read;
use thiserror::Error;
use zip::read::ZipArchive;

/// Name of the manifest that marks a quest as runnable
pub const MANIFEST_FILE: &str = "quest.dat";

/// Data directory name inside a quest directory
pub const DATA_DIRECTORY: &str = "data";

/// Archive names looked up inside a quest directory, in priority order
pub const DATA_ARCHIVES: [&str; 2] = ["data.solarus", "data.solarus.zip"];

/// Errors that can occur while inspecting a quest candidate
#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("{path} is not a quest: {reason}")]
    NotAQuest { path: Utf8PathBuf, reason: String },
}

impl LocatorError {
    fn not_a_quest(path: &Utf8Path, reason: impl Into<String>) -> Self {
        LocatorError::NotAQuest {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Validates quest candidates and reads their manifest.
///
/// A candidate is either a directory or a single zip archive. Directories are
/// searched in this order, first hit wins:
///
/// 1. `<root>/quest.dat`
/// 2. `<root>/data/quest.dat`
/// 3. root entry `quest.dat` of `<root>/data.solarus`
/// 4. root entry `quest.dat` of `<root>/data.solarus.zip`
///
/// Symlinks are followed, so a linked quest behaves like the real one.
/// Validation only reads; nothing on disk is touched.
pub struct QuestLocator {
    /// `key = "value"` pairs, with `\"` escapes allowed in the value
    quoted_property: Regex,

    /// `key = [[value]]` Lua long strings
    long_property: Regex,
}

impl QuestLocator {
    /// Create a new QuestLocator with compiled manifest patterns
    pub fn new() -> Self {
        Self {
            quoted_property: Regex::new(r#"\b([A-Za-z_][A-Za-z0-9_]*)\s*=\s*"((?:[^"\\]|\\.)*)""#)
                .expect("Invalid quoted property regex"),
            long_property: Regex::new(r"(?s)\b([A-Za-z_][A-Za-z0-9_]*)\s*=\s*\[\[(.*?)\]\]")
                .expect("Invalid long property regex"),
        }
    }

    /// Check that `path` holds a runnable quest and describe it.
    pub fn validate(&self, path: &Utf8Path) -> Result<QuestDescriptor, LocatorError> {
        // fs::metadata follows symlinks
        let metadata = fs::metadata(path)
            .map_err(|e| LocatorError::not_a_quest(path, format!("cannot inspect path: {}", e)))?;

        let (manifest, source) = if metadata.is_dir() {
            self.find_in_directory(path)?
        } else {
            let manifest = read_archive_manifest(path)?
                .ok_or_else(|| LocatorError::not_a_quest(path, "archive has no quest.dat entry"))?;
            (manifest, QuestDataSource::Archive)
        };

        let properties = self.parse_manifest(&manifest);
        let descriptor = QuestDescriptor::new(path.to_path_buf(), properties, source);

        tracing::debug!(
            "Validated quest '{}' at {} ({}, format {})",
            descriptor.title(),
            path,
            source,
            descriptor.format()
        );

        Ok(descriptor)
    }

    /// Cheap yes/no variant of [`validate`](Self::validate)
    pub fn is_quest(&self, path: &Utf8Path) -> bool {
        self.validate(path).is_ok()
    }

    fn find_in_directory(
        &self,
        root: &Utf8Path,
    ) -> Result<(String, QuestDataSource), LocatorError> {
        for data_dir in [root.to_path_buf(), root.join(DATA_DIRECTORY)] {
            let manifest_path = data_dir.join(MANIFEST_FILE);
            if manifest_path.is_file() {
                let manifest = fs::read_to_string(&manifest_path).map_err(|e| {
                    LocatorError::not_a_quest(root, format!("cannot read {}: {}", manifest_path, e))
                })?;
                return Ok((manifest, QuestDataSource::DataDirectory));
            }
        }

        for archive_name in DATA_ARCHIVES {
            let archive_path = root.join(archive_name);
            if !archive_path.is_file() {
                continue;
            }
            match read_archive_manifest(&archive_path) {
                Ok(Some(manifest)) => return Ok((manifest, QuestDataSource::EmbeddedArchive)),
                Ok(None) => {
                    tracing::debug!("{} has no quest.dat entry", archive_path);
                }
                Err(e) => {
                    tracing::warn!("Ignoring unreadable quest archive: {}", e);
                }
            }
        }

        Err(LocatorError::not_a_quest(
            root,
            "no quest.dat found in the directory, its data/ folder or a data archive",
        ))
    }

    /// Extract the launcher-relevant properties from a `quest.dat` manifest.
    ///
    /// The manifest is a Lua table constructor such as
    /// `quest{ solarus_version = "1.6", title = "My Quest" }`.
    pub(crate) fn parse_manifest(&self, content: &str) -> QuestProperties {
        let mut properties = QuestProperties::default();

        let quoted = self
            .quoted_property
            .captures_iter(content)
            .map(|c| (c[1].to_string(), unescape_lua(&c[2])));
        let long = self
            .long_property
            .captures_iter(content)
            .map(|c| (c[1].to_string(), long_string_body(&c[2]).to_string()));

        for (key, value) in quoted.chain(long) {
            let slot = match key.as_str() {
                "title" => &mut properties.title,
                "author" => &mut properties.author,
                "quest_version" => &mut properties.quest_version,
                "solarus_version" => &mut properties.solarus_version,
                "short_description" => &mut properties.short_description,
                _ => continue,
            };
            if slot.is_empty() {
                *slot = value;
            }
        }

        properties
    }
}

impl Default for QuestLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the root `quest.dat` entry of a zip archive.
///
/// Returns `Ok(None)` when the archive is readable but has no manifest.
fn read_archive_manifest(archive_path: &Utf8Path) -> Result<Option<String>, LocatorError> {
    let file = File::open(archive_path)
        .map_err(|e| LocatorError::not_a_quest(archive_path, format!("cannot open: {}", e)))?;
    let mut archive = ZipArchive::new(file).map_err(|e| {
        LocatorError::not_a_quest(archive_path, format!("not a readable archive: {}", e))
    })?;

    let mut entry = match archive.by_name(MANIFEST_FILE) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(LocatorError::not_a_quest(
                archive_path,
                format!("cannot read quest.dat entry: {}", e),
            ));
        }
    };
    if entry.is_dir() {
        return Ok(None);
    }

    let mut manifest = String::new();
    entry.read_to_string(&mut manifest).map_err(|e| {
        LocatorError::not_a_quest(archive_path, format!("cannot read quest.dat entry: {}", e))
    })?;
    Ok(Some(manifest))
}

/// Lua skips a line break directly after the opening `[[`
fn long_string_body(raw: &str) -> &str {
    raw.strip_prefix("\r\n")
        .or_else(|| raw.strip_prefix('\n'))
        .unwrap_or(raw)
}

fn unescape_lua(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
