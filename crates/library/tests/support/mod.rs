#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::{Order, SongId};
use library::{
    FileOps, NoTags, PlaylistStore, Reconciler, ScanOptions, StdFileOps, TagOps, Workspace,
};
use metadata::{MetadataError, TagField};
use tempfile::TempDir;

/// Tags kept in memory, keyed by file path.
#[derive(Default)]
pub struct MemoryTags {
    values: RefCell<HashMap<(PathBuf, TagField), String>>,
    refuse_writes: bool,
}

impl MemoryTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            refuse_writes: true,
            ..Self::default()
        }
    }

    pub fn get(&self, path: &Path, field: TagField) -> Option<String> {
        self.values
            .borrow()
            .get(&(path.to_path_buf(), field))
            .cloned()
    }
}

impl TagOps for MemoryTags {
    fn read(&self, path: &Path, field: TagField) -> Result<Option<String>, MetadataError> {
        Ok(self.get(path, field))
    }

    fn write(&self, path: &Path, fields: &[(TagField, &str)]) -> Result<(), MetadataError> {
        if self.refuse_writes {
            return Err(MetadataError::Io(io::Error::other("tag write refused")));
        }
        let mut values = self.values.borrow_mut();
        for (field, value) in fields {
            values.insert((path.to_path_buf(), *field), value.to_string());
        }
        Ok(())
    }
}

/// Real file operations that fail any rename or copy onto a file named
/// `fail_on` until `heal` is called.
pub struct FaultyFiles {
    fail_on: RefCell<Option<String>>,
}

impl FaultyFiles {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: RefCell::new(Some(name.to_string())),
        }
    }

    pub fn heal(&self) {
        self.fail_on.replace(None);
    }

    fn check(&self, to: &Path) -> io::Result<()> {
        let name = to.file_name().map(|n| n.to_string_lossy().to_string());
        match (self.fail_on.borrow().as_deref(), name.as_deref()) {
            (Some(bad), Some(name)) if bad == name => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "injected failure",
            )),
            _ => Ok(()),
        }
    }
}

impl FileOps for FaultyFiles {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check(to)?;
        StdFileOps.rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check(to)?;
        StdFileOps.copy(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        StdFileOps.create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        StdFileOps.remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        StdFileOps.remove_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        StdFileOps.exists(path)
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub folder: PathBuf,
    pub store: PlaylistStore,
}

impl Fixture {
    /// A folder holding `names` (already prefixed), registered in name order
    /// so the ids run `ID0000`, `ID0001`, ...
    pub fn with_songs(names: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("mix");
        fs::create_dir_all(&folder).unwrap();
        let paths: Vec<PathBuf> = names
            .iter()
            .map(|name| {
                let path = folder.join(name);
                fs::write(&path, name.as_bytes()).unwrap();
                path
            })
            .collect();

        let mut store = PlaylistStore::new(dir.path().join("playlist.json"));
        {
            let mut rec = Reconciler::new(&mut store, Workspace::new(&folder), StdFileOps, NoTags);
            let report = rec.register(&paths, &ScanOptions::default()).unwrap();
            assert_eq!(report.registered.len(), names.len());
        }
        Self { dir, folder, store }
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.folder)
    }

    pub fn reopen(&self) -> PlaylistStore {
        PlaylistStore::open(self.store.path()).unwrap()
    }

    /// File names directly in the folder, sorted.
    pub fn names(&self) -> Vec<String> {
        list(&self.folder)
    }

    pub fn disabled_names(&self) -> Vec<String> {
        list(&self.folder.join("Disabled"))
    }
}

pub fn id(value: &str) -> SongId {
    SongId::from(value)
}

pub fn order_of(store: &PlaylistStore, folder: &Path, value: &str) -> Option<Order> {
    store.orders().get(folder, &id(value))
}

/// Enabled orders of a folder, sorted.
pub fn enabled_orders(store: &PlaylistStore, folder: &Path) -> Vec<u32> {
    let mut orders: Vec<u32> = store
        .orders()
        .all_for_folder(folder)
        .into_iter()
        .filter_map(|(_, order)| order.position())
        .collect();
    orders.sort_unstable();
    orders
}

fn list(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
