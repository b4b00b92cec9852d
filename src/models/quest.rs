use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// Where a quest's manifest was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestDataSource {
    /// A plain directory holding `quest.dat` (the candidate or its `data/`)
    DataDirectory,
    /// `data.solarus` or `data.solarus.zip` inside the quest directory
    EmbeddedArchive,
    /// The candidate path is itself the archive
    Archive,
}

impl fmt::Display for QuestDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuestDataSource::DataDirectory => "directory",
            QuestDataSource::EmbeddedArchive => "embedded archive",
            QuestDataSource::Archive => "archive",
        };
        write!(f, "{}", label)
    }
}

/// A validated, runnable quest.
///
/// Only the locator creates descriptors, so holding one means the manifest
/// was present when the path was inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestDescriptor {
    root: Utf8PathBuf,
    title: String,
    author: String,
    version: String,
    format: String,
    short_description: String,
    source: QuestDataSource,
}

impl QuestDescriptor {
    pub(crate) fn new(
        root: Utf8PathBuf,
        properties: QuestProperties,
        source: QuestDataSource,
    ) -> Self {
        let title = if properties.title.is_empty() {
            root.file_name().unwrap_or(root.as_str()).to_string()
        } else {
            properties.title
        };

        Self {
            root,
            title,
            author: properties.author,
            version: properties.quest_version,
            format: properties.solarus_version,
            short_description: properties.short_description,
            source,
        }
    }

    /// Path handed to the engine as its quest argument
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Engine format the quest was made for (e.g. "1.6")
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn short_description(&self) -> &str {
        &self.short_description
    }

    pub fn source(&self) -> QuestDataSource {
        self.source
    }
}

/// Raw values read from a `quest.dat` manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct QuestProperties {
    pub title: String,
    pub author: String,
    pub quest_version: String,
    pub solarus_version: String,
    pub short_description: String,
}
