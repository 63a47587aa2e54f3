use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use common::{FolderOrders, Order, OrderSlot, Song, SongId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::LibraryError;

pub const DEFAULT_STORE_FILE: &str = "playlist.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    songs: Vec<Song>,
    #[serde(default)]
    orders: Vec<FolderOrders>,
}

#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    songs: Vec<Song>,
}

impl RecordStore {
    pub fn from_songs(songs: Vec<Song>) -> Self {
        let mut store = Self::default();
        for song in songs {
            if store.find(&song.id).is_some() {
                warn!("Duplicate song record {}; keeping the last one", song.id);
            }
            store.upsert(song);
        }
        store
    }

    pub fn upsert(&mut self, song: Song) -> Option<Song> {
        match self.songs.iter_mut().find(|existing| existing.id == song.id) {
            Some(existing) => Some(std::mem::replace(existing, song)),
            None => {
                self.songs.push(song);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &SongId) -> Option<Song> {
        let index = self.songs.iter().position(|song| &song.id == id)?;
        Some(self.songs.remove(index))
    }

    pub fn find(&self, id: &SongId) -> Option<&Song> {
        self.songs.iter().find(|song| &song.id == id)
    }

    pub(crate) fn find_mut(&mut self, id: &SongId) -> Option<&mut Song> {
        self.songs.iter_mut().find(|song| &song.id == id)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&Song> {
        self.songs.iter().find(|song| song.path == path)
    }

    pub fn by_folder(&self, folder: &Path) -> Vec<&Song> {
        self.songs
            .iter()
            .filter(|song| song.dir() == Some(folder))
            .collect()
    }

    pub fn ids(&self) -> HashSet<SongId> {
        self.songs.iter().map(|song| song.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Song> {
        self.songs.iter()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct OrderStore {
    folders: Vec<FolderOrders>,
}

impl OrderStore {
    pub fn from_folders(folders: Vec<FolderOrders>) -> Self {
        let mut store = Self::default();
        for folder in folders {
            for slot in folder.orders {
                store.set(&folder.folder_path, &slot.id, slot.order);
            }
            if store.folder(&folder.folder_path).is_none() {
                store.folders.push(FolderOrders::new(folder.folder_path));
            }
        }
        store
    }

    pub fn get(&self, folder: &Path, id: &SongId) -> Option<Order> {
        self.folder(folder)?
            .orders
            .iter()
            .find(|slot| &slot.id == id)
            .map(|slot| slot.order)
    }

    pub fn set(&mut self, folder: &Path, id: &SongId, order: Order) {
        let entry = match self
            .folders
            .iter()
            .position(|entry| entry.folder_path == folder)
        {
            Some(index) => &mut self.folders[index],
            None => {
                self.folders.push(FolderOrders::new(folder.to_path_buf()));
                let last = self.folders.len() - 1;
                &mut self.folders[last]
            }
        };
        match entry.orders.iter_mut().find(|slot| &slot.id == id) {
            Some(slot) => slot.order = order,
            None => entry.orders.push(OrderSlot {
                id: id.clone(),
                order,
            }),
        }
    }

    pub fn remove(&mut self, folder: &Path, id: &SongId) -> Option<Order> {
        let entry = self
            .folders
            .iter_mut()
            .find(|entry| entry.folder_path == folder)?;
        let index = entry.orders.iter().position(|slot| &slot.id == id)?;
        Some(entry.orders.remove(index).order)
    }

    pub fn remove_everywhere(&mut self, id: &SongId) -> usize {
        let mut removed = 0;
        for entry in &mut self.folders {
            let before = entry.orders.len();
            entry.orders.retain(|slot| &slot.id != id);
            removed += before - entry.orders.len();
        }
        removed
    }

    pub fn all_for_folder(&self, folder: &Path) -> Vec<(SongId, Order)> {
        self.folder(folder)
            .map(|entry| {
                entry
                    .orders
                    .iter()
                    .map(|slot| (slot.id.clone(), slot.order))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn folders(&self) -> impl Iterator<Item = &Path> {
        self.folders.iter().map(|entry| entry.folder_path.as_path())
    }

    pub fn ids(&self) -> HashSet<SongId> {
        self.folders
            .iter()
            .flat_map(|entry| entry.orders.iter().map(|slot| slot.id.clone()))
            .collect()
    }

    fn folder(&self, folder: &Path) -> Option<&FolderOrders> {
        self.folders.iter().find(|entry| entry.folder_path == folder)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inconsistency {
    OrphanOrder { folder: PathBuf, id: SongId },
    MissingOrder { id: SongId },
    PrefixMismatch { id: SongId, order: u32, name: String },
    DuplicateOrder { folder: PathBuf, order: u32 },
    NotContiguous { folder: PathBuf },
    MissingFile { id: SongId, path: PathBuf },
}

#[derive(Debug)]
pub struct PlaylistStore {
    path: PathBuf,
    records: RecordStore,
    orders: OrderStore,
}

impl PlaylistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: RecordStore::default(),
            orders: OrderStore::default(),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let path = path.into();
        if !path.exists() {
            info!("Store {:?} missing; starting empty", path);
            return Ok(Self::new(path));
        }
        let document: StoreDocument = read_json(&path)?;
        info!(
            "Loaded {} songs and {} folders from {:?}",
            document.songs.len(),
            document.orders.len(),
            path
        );
        Ok(Self {
            path,
            records: RecordStore::from_songs(document.songs),
            orders: OrderStore::from_folders(document.orders),
        })
    }

    pub fn open_with_legacy(
        path: impl Into<PathBuf>,
        songs_path: Option<&Path>,
        orders_path: Option<&Path>,
    ) -> Result<Self, LibraryError> {
        let path = path.into();
        if path.exists() {
            return Self::open(path);
        }
        let mut store = Self::new(path);
        if let Some(songs_path) = songs_path.filter(|p| p.exists()) {
            let songs: Vec<Song> = read_json(songs_path)?;
            info!("Imported {} songs from {:?}", songs.len(), songs_path);
            store.records = RecordStore::from_songs(songs);
        }
        if let Some(orders_path) = orders_path.filter(|p| p.exists()) {
            let folders: Vec<FolderOrders> = read_json(orders_path)?;
            info!("Imported {} folders from {:?}", folders.len(), orders_path);
            store.orders = OrderStore::from_folders(folders);
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut RecordStore {
        &mut self.records
    }

    pub fn orders(&self) -> &OrderStore {
        &self.orders
    }

    pub fn orders_mut(&mut self) -> &mut OrderStore {
        &mut self.orders
    }

    pub fn all_ids(&self) -> HashSet<SongId> {
        let mut ids = self.records.ids();
        ids.extend(self.orders.ids());
        ids
    }

    pub fn remove_song(&mut self, id: &SongId) -> Option<Song> {
        let removed = self.orders.remove_everywhere(id);
        debug!("Removed {} order entries for {}", removed, id);
        self.records.remove(id)
    }

    pub fn commit(&self) -> Result<(), LibraryError> {
        let document = StoreDocumentRef {
            songs: &self.records.songs,
            orders: &self.orders.folders,
        };
        write_json_atomic(&self.path, &document)?;
        debug!("Committed store to {:?}", self.path);
        Ok(())
    }

    pub fn export_legacy(&self, songs_path: &Path, orders_path: &Path) -> Result<(), LibraryError> {
        write_json_atomic(songs_path, &self.records.songs)?;
        write_json_atomic(orders_path, &self.orders.folders)?;
        Ok(())
    }

    pub fn check(&self) -> Vec<Inconsistency> {
        let mut issues = Vec::new();
        let record_ids = self.records.ids();
        let ordered_ids = self.orders.ids();

        for entry in &self.orders.folders {
            let mut seen: HashMap<u32, usize> = HashMap::new();
            for slot in &entry.orders {
                if !record_ids.contains(&slot.id) {
                    issues.push(Inconsistency::OrphanOrder {
                        folder: entry.folder_path.clone(),
                        id: slot.id.clone(),
                    });
                    continue;
                }
                if let Order::Position(order) = slot.order {
                    *seen.entry(order).or_default() += 1;
                    if let Some(song) = self.records.find(&slot.id) {
                        if song.prefix_order() != Some(order) {
                            issues.push(Inconsistency::PrefixMismatch {
                                id: slot.id.clone(),
                                order,
                                name: song.name.clone(),
                            });
                        }
                    }
                }
            }

            let mut duplicates: Vec<u32> = seen
                .iter()
                .filter(|(_, count)| **count > 1)
                .map(|(order, _)| *order)
                .collect();
            duplicates.sort_unstable();
            for order in duplicates {
                issues.push(Inconsistency::DuplicateOrder {
                    folder: entry.folder_path.clone(),
                    order,
                });
            }

            let enabled: usize = seen.values().sum();
            let contiguous = (1..=enabled as u32).all(|order| seen.get(&order) == Some(&1));
            if !contiguous {
                issues.push(Inconsistency::NotContiguous {
                    folder: entry.folder_path.clone(),
                });
            }
        }

        for song in &self.records.songs {
            if !ordered_ids.contains(&song.id) {
                issues.push(Inconsistency::MissingOrder {
                    id: song.id.clone(),
                });
            }
            if !song.path.exists() {
                issues.push(Inconsistency::MissingFile {
                    id: song.id.clone(),
                    path: song.path.clone(),
                });
            }
        }

        issues
    }

    pub fn prune_orphans(&mut self) -> usize {
        let record_ids = self.records.ids();
        let mut pruned = 0;
        for entry in &mut self.orders.folders {
            let before = entry.orders.len();
            entry.orders.retain(|slot| record_ids.contains(&slot.id));
            pruned += before - entry.orders.len();
        }
        if pruned > 0 {
            warn!("Pruned {} orphan order entries", pruned);
        }
        pruned
    }
}

#[derive(Serialize)]
struct StoreDocumentRef<'a> {
    songs: &'a [Song],
    orders: &'a [FolderOrders],
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LibraryError> {
    let file = File::open(path)?;
    let value = serde_json::from_reader(BufReader::new(file))?;
    Ok(value)
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), LibraryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = temp_path_for(path);
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
