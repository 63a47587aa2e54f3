use std::fs;
use std::io;
use std::path::Path;

use metadata::{MetadataError, TagField};

pub trait FileOps {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

impl<T: FileOps + ?Sized> FileOps for &T {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        (**self).rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        (**self).copy(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        (**self).create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        (**self).remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        (**self).remove_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

pub trait TagOps {
    fn read(&self, path: &Path, field: TagField) -> Result<Option<String>, MetadataError>;
    fn write(&self, path: &Path, fields: &[(TagField, &str)]) -> Result<(), MetadataError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoftyTags;

impl TagOps for LoftyTags {
    fn read(&self, path: &Path, field: TagField) -> Result<Option<String>, MetadataError> {
        metadata::read_tag(path, field)
    }

    fn write(&self, path: &Path, fields: &[(TagField, &str)]) -> Result<(), MetadataError> {
        metadata::write_tags(path, fields)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoTags;

impl TagOps for NoTags {
    fn read(&self, _path: &Path, _field: TagField) -> Result<Option<String>, MetadataError> {
        Ok(None)
    }

    fn write(&self, _path: &Path, _fields: &[(TagField, &str)]) -> Result<(), MetadataError> {
        Ok(())
    }
}

impl<T: TagOps + ?Sized> TagOps for &T {
    fn read(&self, path: &Path, field: TagField) -> Result<Option<String>, MetadataError> {
        (**self).read(path, field)
    }

    fn write(&self, path: &Path, fields: &[(TagField, &str)]) -> Result<(), MetadataError> {
        (**self).write(path, fields)
    }
}
