//! Integration tests for QuestLocator
//!
//! These tests verify:
//! - Manifest lookup order across directories and archives
//! - Symlinked quests
//! - Validation leaving the quest untouched

use camino::{Utf8Path, Utf8PathBuf};
use quest_launcher::models::QuestDataSource;
use quest_launcher::services::{LocatorError, QuestLocator};
use std::fs::{self, File};
use std::io::Write;
use tempfile::TempDir;

fn utf8_dir(temp_dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap()
}

fn manifest(title: &str) -> String {
    format!("quest{{\n  solarus_version = \"1.6\",\n  title = \"{}\",\n}}\n", title)
}

fn write_zip(path: &Utf8Path, entries: &[(&str, &str)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    let options = zip::write::FileOptions::default();
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn test_root_manifest_wins_over_data_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = utf8_dir(&temp_dir);
    fs::create_dir(root.join("data")).unwrap();
    fs::write(root.join("quest.dat"), manifest("Root")).unwrap();
    fs::write(root.join("data").join("quest.dat"), manifest("Nested")).unwrap();

    let descriptor = QuestLocator::new().validate(&root).unwrap();

    assert_eq!(descriptor.title(), "Root");
    assert_eq!(descriptor.source(), QuestDataSource::DataDirectory);
}

#[test]
fn test_data_directory_wins_over_archive() {
    let temp_dir = TempDir::new().unwrap();
    let root = utf8_dir(&temp_dir);
    fs::create_dir(root.join("data")).unwrap();
    fs::write(root.join("data").join("quest.dat"), manifest("Directory")).unwrap();
    write_zip(&root.join("data.solarus"), &[("quest.dat", &manifest("Archive"))]);

    let descriptor = QuestLocator::new().validate(&root).unwrap();

    assert_eq!(descriptor.title(), "Directory");
}

#[test]
fn test_archive_order() {
    let temp_dir = TempDir::new().unwrap();
    let root = utf8_dir(&temp_dir);
    write_zip(&root.join("data.solarus"), &[("quest.dat", &manifest("First"))]);
    write_zip(&root.join("data.solarus.zip"), &[("quest.dat", &manifest("Second"))]);

    let descriptor = QuestLocator::new().validate(&root).unwrap();

    assert_eq!(descriptor.title(), "First");
    assert_eq!(descriptor.source(), QuestDataSource::EmbeddedArchive);
}

#[test]
fn test_corrupt_archive_falls_through_to_next() {
    let temp_dir = TempDir::new().unwrap();
    let root = utf8_dir(&temp_dir);
    fs::write(root.join("data.solarus"), b"definitely not a zip").unwrap();
    write_zip(&root.join("data.solarus.zip"), &[("quest.dat", &manifest("Backup"))]);

    let descriptor = QuestLocator::new().validate(&root).unwrap();

    assert_eq!(descriptor.title(), "Backup");
}

#[test]
fn test_empty_directory_is_not_a_quest() {
    let temp_dir = TempDir::new().unwrap();
    let root = utf8_dir(&temp_dir);
    let locator = QuestLocator::new();

    let err = locator.validate(&root).unwrap_err();

    assert!(matches!(err, LocatorError::NotAQuest { ref path, .. } if *path == root));
    assert!(!locator.is_quest(&root));
}

#[test]
fn test_validation_does_not_modify_quest() {
    let temp_dir = TempDir::new().unwrap();
    let root = utf8_dir(&temp_dir);
    fs::write(root.join("quest.dat"), manifest("Untouched")).unwrap();

    let before: Vec<_> = fs::read_dir(&root).unwrap().map(|e| e.unwrap().file_name()).collect();
    let content_before = fs::read_to_string(root.join("quest.dat")).unwrap();

    QuestLocator::new().validate(&root).unwrap();

    let after: Vec<_> = fs::read_dir(&root).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(before, after);
    assert_eq!(content_before, fs::read_to_string(root.join("quest.dat")).unwrap());
}

#[cfg(unix)]
#[test]
fn test_symlinked_quest_behaves_like_target() {
    let temp_dir = TempDir::new().unwrap();
    let root = utf8_dir(&temp_dir);
    let real = root.join("real-quest");
    fs::create_dir(&real).unwrap();
    fs::write(real.join("quest.dat"), manifest("Linked")).unwrap();

    let link = root.join("link-quest");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let descriptor = QuestLocator::new().validate(&link).unwrap();

    assert_eq!(descriptor.title(), "Linked");
    assert_eq!(descriptor.root(), link);
}

#[cfg(unix)]
#[test]
fn test_symlinked_archive() {
    let temp_dir = TempDir::new().unwrap();
    let root = utf8_dir(&temp_dir);
    let archive = root.join("quest.solarus");
    write_zip(&archive, &[("quest.dat", &manifest("Packed"))]);

    let link = root.join("linked.solarus");
    std::os::unix::fs::symlink(&archive, &link).unwrap();

    let descriptor = QuestLocator::new().validate(&link).unwrap();

    assert_eq!(descriptor.title(), "Packed");
    assert_eq!(descriptor.source(), QuestDataSource::Archive);
}
