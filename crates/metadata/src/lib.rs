use std::fmt;
use std::path::Path;

use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Tag;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagField {
    Title,
    SongId,
}

impl TagField {
    fn item_key(self) -> ItemKey {
        match self {
            TagField::Title => ItemKey::TrackTitle,
            TagField::SongId => ItemKey::Comment,
        }
    }
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagField::Title => f.write_str("title"),
            TagField::SongId => f.write_str("comment"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SongTags {
    pub title: Option<String>,
    pub song_id: Option<String>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub fn read_tags(path: &Path) -> Result<SongTags, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let mut tags = SongTags::default();
    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        tags.title = clean_value(tag.get_string(&ItemKey::TrackTitle));
        tags.song_id = clean_value(tag.get_string(&ItemKey::Comment));
    }
    Ok(tags)
}

pub fn read_tag(path: &Path, field: TagField) -> Result<Option<String>, MetadataError> {
    let tags = read_tags(path)?;
    Ok(match field {
        TagField::Title => tags.title,
        TagField::SongId => tags.song_id,
    })
}

pub fn write_tags(path: &Path, fields: &[(TagField, &str)]) -> Result<(), MetadataError> {
    let mut tagged_file = Probe::open(path)?.read()?;
    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag_mut(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }

    if let Some(tag) = tagged_file.tag_mut(tag_type) {
        for (field, value) in fields {
            let key = field.item_key();
            tag.remove_key(&key);
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                tag.insert_text(key, trimmed.to_string());
            }
        }
    }

    tagged_file.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

fn clean_value(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn file_without_container_is_a_tag_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("001 Not audio.mp3");
        fs::write(&path, b"plain text, no frames").unwrap();

        assert!(read_tags(&path).is_err());
        assert!(write_tags(&path, &[(TagField::Title, "Not audio")]).is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_tag(&dir.path().join("missing.flac"), TagField::SongId).unwrap_err();
        assert!(matches!(err, MetadataError::Io(_) | MetadataError::Lofty(_)));
    }

    #[test]
    fn field_labels() {
        assert_eq!(TagField::Title.to_string(), "title");
        assert_eq!(TagField::SongId.to_string(), "comment");
    }
}
