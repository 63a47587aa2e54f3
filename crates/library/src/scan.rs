use std::collections::HashSet;
use std::path::{Path, PathBuf};

use common::{
    allocate_id, effective_order, file_name, format_prefixed, next_gap, title_from_base, Order,
    Song, SongId, DEFAULT_WEIGHT, MAX_ORDER,
};
use metadata::TagField;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::fsops::{FileOps, TagOps};
use crate::reconcile::TagFailure;
use crate::store::PlaylistStore;
use crate::{LibraryError, Workspace};

pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "opus", "m4a", "wav"];

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub extensions: Vec<String>,
    pub default_weight: u8,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_AUDIO_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            default_weight: DEFAULT_WEIGHT,
        }
    }
}

impl ScanOptions {
    fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let ext = ext.to_string_lossy().to_ascii_lowercase();
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanStatus {
    Registered(SongId),
    Unregistered(SongId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEntry {
    pub path: PathBuf,
    pub status: ScanStatus,
}

#[derive(Debug, Default)]
pub struct RegisterReport {
    pub registered: Vec<SongId>,
    pub skipped: Vec<PathBuf>,
    pub tag_failures: Vec<TagFailure>,
}

pub fn audio_files_in_dir(dir: &Path, options: &ScanOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.file_type().is_file() && options.accepts(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    files
}

pub fn scan_folder(
    store: &PlaylistStore,
    workspace: &Workspace,
    options: &ScanOptions,
) -> Result<Vec<ScanEntry>, LibraryError> {
    let folder = workspace.folder();
    if !folder.is_dir() {
        return Err(LibraryError::NotInFolder(folder.to_path_buf()));
    }

    let mut taken: HashSet<SongId> = store.all_ids();
    let mut entries = Vec::new();
    for path in audio_files_in_dir(folder, options) {
        let status = match store.records().find_by_path(&path) {
            Some(song) => ScanStatus::Registered(song.id.clone()),
            None => {
                let candidate = allocate_id(&taken)?;
                taken.insert(candidate.clone());
                ScanStatus::Unregistered(candidate)
            }
        };
        entries.push(ScanEntry { path, status });
    }
    info!("Scanned {:?}: {} audio files", folder, entries.len());
    Ok(entries)
}

/// A file keeps the order in its prefix when that order is free, otherwise it
/// takes the lowest free order and is renamed to match.
pub fn register_files<F, T>(
    store: &mut PlaylistStore,
    workspace: &Workspace,
    files: &F,
    tags: &T,
    paths: &[PathBuf],
    options: &ScanOptions,
) -> Result<RegisterReport, LibraryError>
where
    F: FileOps + ?Sized,
    T: TagOps + ?Sized,
{
    let folder = workspace.folder();
    let mut report = RegisterReport::default();

    // Files that already carry a prefix claim their order before unprefixed ones.
    let mut pending: Vec<&PathBuf> = paths.iter().collect();
    pending.sort_by_key(|path| {
        let order = effective_order(&file_name(path));
        (order == 0, order, (*path).clone())
    });

    for path in pending {
        if path.parent() != Some(folder) {
            return Err(LibraryError::NotInFolder(path.clone()));
        }
        if store.records().find_by_path(path).is_some() {
            report.skipped.push(path.clone());
            continue;
        }
        if !files.exists(path) {
            warn!("Skipping {:?}: file not found", path);
            report.skipped.push(path.clone());
            continue;
        }

        let used: Vec<u32> = store
            .orders()
            .all_for_folder(folder)
            .into_iter()
            .filter_map(|(_, order)| order.position())
            .collect();
        let name = file_name(path);
        let wanted = effective_order(&name);
        let order = if wanted > 0 && !used.contains(&wanted) {
            wanted
        } else {
            next_gap(used)
        };

        let id = match tagged_id(tags, path, store) {
            Some(id) => id,
            None => allocate_id(&store.all_ids())?,
        };
        if order > MAX_ORDER {
            return Err(LibraryError::OrderOutOfRange { id, order });
        }

        let base = common::base_name(&name).to_string();
        let target = folder.join(format_prefixed(order, &base));
        if &target != path {
            if files.exists(&target) {
                return Err(LibraryError::apply(
                    &id,
                    &target,
                    LibraryError::TargetExists(target.clone()),
                ));
            }
            files
                .rename(path, &target)
                .map_err(|err| LibraryError::apply(&id, &target, err.into()))?;
        }

        let title = title_from_base(&base);
        if let Err(err) = tags.write(
            &target,
            &[(TagField::SongId, id.as_str()), (TagField::Title, title.as_str())],
        ) {
            warn!("Failed to tag {:?}: {}", target, err);
            report.tag_failures.push(TagFailure {
                id: id.clone(),
                path: target.clone(),
                error: err.to_string(),
            });
        }

        let mut song = Song::new(id.clone(), target);
        song.weight = options.default_weight;
        store.records_mut().upsert(song);
        store.orders_mut().set(folder, &id, Order::Position(order));
        store.commit()?;
        info!("Registered {} at order {}", id, order);
        report.registered.push(id);
    }

    Ok(report)
}

// Files tagged by an earlier registration keep their id unless it is taken.
fn tagged_id<T: TagOps + ?Sized>(tags: &T, path: &Path, store: &PlaylistStore) -> Option<SongId> {
    match tags.read(path, TagField::SongId) {
        Ok(Some(value)) => {
            let id = SongId::from(value);
            (id.is_well_formed() && !store.all_ids().contains(&id)).then_some(id)
        }
        Ok(None) => None,
        Err(err) => {
            debug!("No id tag in {:?}: {}", path, err);
            None
        }
    }
}

pub fn unregister(store: &mut PlaylistStore, id: &SongId) -> Result<Song, LibraryError> {
    let song = store
        .remove_song(id)
        .ok_or_else(|| LibraryError::UnknownSong(id.clone()))?;
    store.commit()?;
    info!("Unregistered {} ({:?})", id, song.path);
    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsops::{NoTags, StdFileOps};
    use metadata::MetadataError;
    use std::collections::HashMap;
    use std::fs;

    struct PresetIds(HashMap<PathBuf, String>);

    impl TagOps for PresetIds {
        fn read(&self, path: &Path, field: TagField) -> Result<Option<String>, MetadataError> {
            Ok(match field {
                TagField::SongId => self.0.get(path).cloned(),
                TagField::Title => None,
            })
        }

        fn write(&self, _path: &Path, _fields: &[(TagField, &str)]) -> Result<(), MetadataError> {
            Ok(())
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        path
    }

    #[test]
    fn scan_marks_registered_and_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("mix");
        fs::create_dir_all(folder.join("Disabled")).unwrap();
        let a = touch(&folder, "001 A.mp3");
        touch(&folder, "B.flac");
        touch(&folder, "notes.txt");
        touch(&folder.join("Disabled"), "002 Old.mp3");

        let mut store = PlaylistStore::new(dir.path().join("playlist.json"));
        store
            .records_mut()
            .upsert(Song::new(SongId::from("ID0000"), a.clone()));

        let workspace = Workspace::new(&folder);
        let entries = scan_folder(&store, &workspace, &ScanOptions::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, a);
        assert_eq!(entries[0].status, ScanStatus::Registered(SongId::from("ID0000")));
        assert_eq!(
            entries[1].status,
            ScanStatus::Unregistered(SongId::from("ID0001"))
        );
    }

    #[test]
    fn register_respects_free_prefixes_and_fills_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("mix");
        fs::create_dir_all(&folder).unwrap();
        let paths = vec![
            touch(&folder, "Loose.mp3"),
            touch(&folder, "003 Third.mp3"),
            touch(&folder, "003 Clash.mp3"),
        ];

        let mut store = PlaylistStore::new(dir.path().join("playlist.json"));
        let workspace = Workspace::new(&folder);
        let report = register_files(
            &mut store,
            &workspace,
            &StdFileOps,
            &NoTags,
            &paths,
            &ScanOptions::default(),
        )
        .unwrap();
        assert_eq!(report.registered.len(), 3);

        // "003 Clash" sorts first and keeps 3; "003 Third" takes 1; "Loose" takes 2.
        assert!(folder.join("003 Clash.mp3").exists());
        assert!(folder.join("001 Third.mp3").exists());
        assert!(folder.join("002 Loose.mp3").exists());

        let mut orders: Vec<u32> = store
            .orders()
            .all_for_folder(&folder)
            .into_iter()
            .filter_map(|(_, order)| order.position())
            .collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![1, 2, 3]);

        let reopened = PlaylistStore::open(store.path()).unwrap();
        assert_eq!(reopened.records().len(), 3);
    }

    #[test]
    fn register_skips_known_files_and_unregister_forgets() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("mix");
        fs::create_dir_all(&folder).unwrap();
        let path = touch(&folder, "001 A.mp3");

        let mut store = PlaylistStore::new(dir.path().join("playlist.json"));
        let workspace = Workspace::new(&folder);
        let options = ScanOptions::default();
        register_files(&mut store, &workspace, &StdFileOps, &NoTags, &[path.clone()], &options)
            .unwrap();
        let again =
            register_files(&mut store, &workspace, &StdFileOps, &NoTags, &[path.clone()], &options)
                .unwrap();
        assert_eq!(again.skipped, vec![path.clone()]);

        let song = unregister(&mut store, &SongId::from("ID0000")).unwrap();
        assert_eq!(song.path, path);
        assert!(path.exists());
        assert!(store.records().is_empty());
        assert!(store.orders().all_for_folder(&folder).is_empty());
        assert!(matches!(
            unregister(&mut store, &SongId::from("ID0000")),
            Err(LibraryError::UnknownSong(_))
        ));
    }

    #[test]
    fn register_rejects_files_outside_the_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("mix");
        fs::create_dir_all(&folder).unwrap();
        let stray = touch(dir.path(), "001 Stray.mp3");

        let mut store = PlaylistStore::new(dir.path().join("playlist.json"));
        let result = register_files(
            &mut store,
            &Workspace::new(&folder),
            &StdFileOps,
            &NoTags,
            &[stray],
            &ScanOptions::default(),
        );
        assert!(matches!(result, Err(LibraryError::NotInFolder(_))));
    }

    #[test]
    fn register_keeps_a_free_id_from_the_comment_tag() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("mix");
        fs::create_dir_all(&folder).unwrap();
        let kept = touch(&folder, "001 Kept.mp3");
        let junk = touch(&folder, "002 Junk.mp3");
        let taken = touch(&folder, "003 Taken.mp3");

        let mut store = PlaylistStore::new(dir.path().join("playlist.json"));
        store.records_mut().upsert(Song::new(
            SongId::from("ID0007"),
            dir.path().join("elsewhere").join("001 Other.mp3"),
        ));
        let tags = PresetIds(HashMap::from([
            (kept.clone(), "ID0042".to_string()),
            (junk.clone(), "hello".to_string()),
            (taken.clone(), "ID0007".to_string()),
        ]));

        let report = register_files(
            &mut store,
            &Workspace::new(&folder),
            &StdFileOps,
            &tags,
            &[kept.clone(), junk.clone(), taken.clone()],
            &ScanOptions::default(),
        )
        .unwrap();
        assert_eq!(
            report.registered,
            vec![SongId::from("ID0042"), SongId::from("ID0000"), SongId::from("ID0001")]
        );
        assert_eq!(store.records().find_by_path(&kept).unwrap().id.as_str(), "ID0042");
        assert_eq!(store.records().find_by_path(&taken).unwrap().id.as_str(), "ID0001");
    }
}
