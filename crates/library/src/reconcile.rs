use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use common::{
    allocate_id, clamp_weight, effective_order, format_prefixed, next_gap, parse_prefixed,
    title_from_base, with_order, Order, Song, SongId, MAX_ORDER,
};
use metadata::TagField;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::fsops::{FileOps, TagOps};
use crate::scan::{self, RegisterReport, ScanEntry, ScanOptions};
use crate::shuffle::balanced_shuffle;
use crate::store::PlaylistStore;
use crate::{LibraryError, Workspace};

pub const PARKING_DIR: &str = ".reorder";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PersistMode {
    #[default]
    PerSong,
    Batch,
}

#[derive(Clone, Debug, Default)]
pub struct ReconcileOptions {
    pub persist: PersistMode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyMethod {
    InPlace,
    CopyToNewDirectory(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FolderState {
    Clean,
    Staged,
    PartiallyApplied,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagedPlan {
    targets: BTreeMap<SongId, Order>,
}

impl StagedPlan {
    pub fn get(&self, id: &SongId) -> Option<Order> {
        self.targets.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SongId, Order)> {
        self.targets.iter().map(|(id, order)| (id, *order))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn sequence(&self) -> Vec<SongId> {
        let mut enabled: Vec<(u32, &SongId)> = self
            .targets
            .iter()
            .filter_map(|(id, order)| order.position().map(|position| (position, id)))
            .collect();
        enabled.sort();
        enabled.into_iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn max_position(&self) -> u32 {
        self.targets
            .values()
            .filter_map(|order| order.position())
            .max()
            .unwrap_or(0)
    }

    fn set(&mut self, id: &SongId, order: Order) {
        self.targets.insert(id.clone(), order);
    }

    fn renumber(&mut self) {
        for (index, id) in self.sequence().into_iter().enumerate() {
            self.targets.insert(id, Order::Position(index as u32 + 1));
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingChange {
    pub id: SongId,
    pub from: Order,
    pub to: Order,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagFailure {
    pub id: SongId,
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<SongId>,
    pub created: Vec<SongId>,
    pub tag_failures: Vec<TagFailure>,
}

pub struct Reconciler<'a, F, T> {
    store: &'a mut PlaylistStore,
    workspace: Workspace,
    files: F,
    tags: T,
    options: ReconcileOptions,
    staged: Option<StagedPlan>,
    partial: bool,
    // Store edits not yet committed; the next apply or edit retries the commit.
    unsaved: bool,
}

impl<'a, F, T> Reconciler<'a, F, T>
where
    F: FileOps,
    T: TagOps,
{
    pub fn new(store: &'a mut PlaylistStore, workspace: Workspace, files: F, tags: T) -> Self {
        Self {
            store,
            workspace,
            files,
            tags,
            options: ReconcileOptions::default(),
            staged: None,
            partial: false,
            unsaved: false,
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn store(&self) -> &PlaylistStore {
        self.store
    }

    pub fn state(&self) -> FolderState {
        if self.partial {
            FolderState::PartiallyApplied
        } else if self.staged.is_some() {
            FolderState::Staged
        } else {
            FolderState::Clean
        }
    }

    pub fn staged(&self) -> Option<&StagedPlan> {
        self.staged.as_ref()
    }

    pub fn reset_staged(&mut self) {
        self.staged = None;
        self.partial = false;
    }

    pub fn songs(&self) -> Vec<(Song, Order)> {
        let current = self.current_orders();
        let mut listed: Vec<(Song, Order)> = current
            .into_iter()
            .filter_map(|(id, order)| {
                self.store
                    .records()
                    .find(&id)
                    .map(|song| (song.clone(), order))
            })
            .collect();
        listed.sort_by(|(a, a_order), (b, b_order)| {
            let key = |order: &Order| match order {
                Order::Position(position) => (0u8, *position),
                Order::Disabled => (1u8, 0),
            };
            key(a_order).cmp(&key(b_order)).then_with(|| a.id.cmp(&b.id))
        });
        listed
    }

    pub fn scan(&self, options: &ScanOptions) -> Result<Vec<ScanEntry>, LibraryError> {
        scan::scan_folder(self.store, &self.workspace, options)
    }

    pub fn register(
        &mut self,
        paths: &[PathBuf],
        options: &ScanOptions,
    ) -> Result<RegisterReport, LibraryError> {
        scan::register_files(
            self.store,
            &self.workspace,
            &self.files,
            &self.tags,
            paths,
            options,
        )
    }

    pub fn unregister(&mut self, id: &SongId) -> Result<Song, LibraryError> {
        let song = scan::unregister(self.store, id)?;
        if let Some(plan) = self.staged.as_mut() {
            plan.targets.remove(id);
        }
        Ok(song)
    }

    /// Moves `selected` to consecutive positions starting at `target_position`,
    /// clamped so the block fits. Selected disabled songs are ignored.
    pub fn stage_manual_reorder(
        &mut self,
        selected: &[SongId],
        target_position: u32,
    ) -> Result<&StagedPlan, LibraryError> {
        self.stage_with(selected, |plan| {
            let sequence = plan.sequence();
            for id in selected {
                if plan.get(id) == Some(Order::Disabled) {
                    warn!("Ignoring disabled song {} in reorder", id);
                }
            }
            let chosen: Vec<&SongId> = sequence.iter().filter(|id| selected.contains(id)).collect();
            if chosen.is_empty() {
                return;
            }

            let total = sequence.len() as u32;
            let count = chosen.len() as u32;
            let start = target_position.clamp(1, total - count + 1);
            let block = start..start + count;

            for (offset, id) in chosen.iter().enumerate() {
                plan.set(id, Order::Position(start + offset as u32));
            }
            let free = (1..=total).filter(|position| !block.contains(position));
            let others = sequence.iter().filter(|id| !selected.contains(id));
            for (id, position) in others.zip(free) {
                plan.set(id, Order::Position(position));
            }
        })
    }

    pub fn stage_disable(&mut self, ids: &[SongId]) -> Result<&StagedPlan, LibraryError> {
        self.stage_with(ids, |plan| {
            for id in ids {
                plan.set(id, Order::Disabled);
            }
            plan.renumber();
        })
    }

    pub fn stage_enable(&mut self, ids: &[SongId]) -> Result<&StagedPlan, LibraryError> {
        self.stage_with(ids, |plan| {
            for id in ids {
                if plan.get(id) == Some(Order::Disabled) {
                    let next = plan.max_position() + 1;
                    plan.set(id, Order::Position(next));
                }
            }
        })
    }

    pub fn stage_compact(&mut self) -> Result<&StagedPlan, LibraryError> {
        self.stage_with(&[], StagedPlan::renumber)
    }

    pub fn stage_shuffle(&mut self) -> Result<&StagedPlan, LibraryError> {
        let mut rng = rand::rng();
        self.stage_shuffle_with(&mut rng)
    }

    pub fn stage_shuffle_with<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<&StagedPlan, LibraryError> {
        let sequence = self.effective_plan().sequence();
        let items: Vec<(SongId, String)> = sequence
            .into_iter()
            .map(|id| {
                let series = self
                    .store
                    .records()
                    .find(&id)
                    .map(|song| song.series.clone())
                    .unwrap_or_default();
                (id, series)
            })
            .collect();
        let shuffled = balanced_shuffle(items, |item| item.1.as_str(), rng);
        self.stage_with(&[], move |plan| {
            for (index, (id, _)) in shuffled.into_iter().enumerate() {
                plan.set(&id, Order::Position(index as u32 + 1));
            }
        })
    }

    pub fn pending_changes(&self) -> Vec<PendingChange> {
        let plan = self.effective_plan();
        let current = self.current_orders();
        let folder = self.workspace.folder();

        let mut changes: Vec<PendingChange> = plan
            .iter()
            .filter_map(|(id, to)| {
                let song = self.store.records().find(id)?;
                let from = current.get(id).copied().unwrap_or(Order::Position(0));
                let settled = match to {
                    Order::Disabled => {
                        from == Order::Disabled && self.workspace.is_disabled_location(&song.path)
                    }
                    Order::Position(position) => {
                        from == to
                            && song.path == folder.join(with_order(&song.name, position))
                    }
                };
                (!settled).then(|| PendingChange {
                    id: id.clone(),
                    from,
                    to,
                })
            })
            .collect();

        changes.sort_by(|a, b| {
            let key = |change: &PendingChange| match change.to {
                Order::Disabled => (0u8, 0u32),
                Order::Position(position) => (1u8, position),
            };
            key(a).cmp(&key(b)).then_with(|| a.id.cmp(&b.id))
        });
        changes
    }

    /// Commits the staged plan (or, with nothing staged, repairs names that
    /// disagree with the stored orders).
    pub fn apply(&mut self, method: ApplyMethod) -> Result<ApplyReport, LibraryError> {
        let plan = self.effective_plan();
        match method {
            ApplyMethod::InPlace => self.apply_in_place(plan),
            ApplyMethod::CopyToNewDirectory(target) => self.copy_to(plan, &target),
        }
    }

    pub fn set_series(&mut self, id: &SongId, series: &str) -> Result<(), LibraryError> {
        let song = self
            .store
            .records_mut()
            .find_mut(id)
            .ok_or_else(|| LibraryError::UnknownSong(id.clone()))?;
        song.series = series.trim().to_string();
        self.unsaved = true;
        self.flush()
    }

    pub fn set_weight(&mut self, id: &SongId, weight: i64) -> Result<u8, LibraryError> {
        let song = self
            .store
            .records_mut()
            .find_mut(id)
            .ok_or_else(|| LibraryError::UnknownSong(id.clone()))?;
        song.weight = clamp_weight(weight);
        let weight = song.weight;
        self.unsaved = true;
        self.flush()?;
        Ok(weight)
    }

    pub fn rename_base(&mut self, id: &SongId, new_base: &str) -> Result<PathBuf, LibraryError> {
        let new_base = new_base.trim();
        if new_base.is_empty()
            || new_base == "."
            || new_base == ".."
            || new_base.contains(['/', '\\'])
            || parse_prefixed(new_base).is_some()
        {
            return Err(LibraryError::InvalidName(new_base.to_string()));
        }

        let song = self.song(id)?;
        if !self.workspace.holds(&song.path) {
            return Err(LibraryError::NotInFolder(song.path));
        }
        let new_name = match song.prefix_order() {
            Some(order) => format_prefixed(order, new_base),
            None => new_base.to_string(),
        };
        let dest = song.path.with_file_name(new_name);
        if dest == song.path {
            return Ok(dest);
        }
        if self.files.exists(&dest) {
            return Err(LibraryError::TargetExists(dest));
        }
        self.files.rename(&song.path, &dest)?;
        self.relocate(id, &dest);

        let title = title_from_base(new_base);
        if let Err(err) = self.tags.write(&dest, &[(TagField::Title, title.as_str())]) {
            warn!("Failed to update title tag of {:?}: {}", dest, err);
        }
        self.flush()?;
        info!("Renamed {} to {:?}", id, dest);
        Ok(dest)
    }

    fn apply_in_place(&mut self, plan: StagedPlan) -> Result<ApplyReport, LibraryError> {
        let steps = self.pending_changes();
        let mut remaining = plan;
        remaining
            .targets
            .retain(|id, _| steps.iter().any(|step| &step.id == id));

        let mut report = ApplyReport::default();
        for step in &steps {
            self.unsaved = true;
            let result = match step.to {
                Order::Disabled => self.disable_one(&step.id, &remaining),
                Order::Position(position) => {
                    self.place_one(&step.id, position, &remaining, &mut report)
                }
            };
            let result = result.and_then(|dest| self.commit_step(&step.id, &dest));
            if let Err(err) = result {
                return Err(self.stop_batch(remaining, err));
            }
            remaining.targets.remove(&step.id);
            report.applied.push(step.id.clone());
        }

        self.finish_batch()?;
        let parking = self.workspace.folder().join(PARKING_DIR);
        if self.files.exists(&parking) {
            if let Err(err) = self.files.remove_dir(&parking) {
                debug!("Left {:?} in place: {}", parking, err);
            }
        }
        info!(
            "Applied {} changes in {:?} ({} tag failures)",
            report.applied.len(),
            self.workspace.folder(),
            report.tag_failures.len()
        );
        Ok(report)
    }

    fn copy_to(&mut self, plan: StagedPlan, target: &Path) -> Result<ApplyReport, LibraryError> {
        if target == self.workspace.folder() || target == self.workspace.disabled_path() {
            return Err(LibraryError::InvalidTarget(target.to_path_buf()));
        }
        self.files.create_dir_all(target)?;
        let sequence = plan.sequence();
        let mut remaining = plan;
        let offset = self
            .store
            .orders()
            .all_for_folder(target)
            .into_iter()
            .filter_map(|(_, order)| order.position())
            .max()
            .unwrap_or(0);

        let mut report = ApplyReport::default();
        for (index, id) in sequence.iter().enumerate() {
            let position = offset + index as u32 + 1;
            self.unsaved = true;
            let result = self
                .copy_one(id, target, position, &mut report)
                .and_then(|dest| self.commit_step(id, &dest));
            if let Err(err) = result {
                return Err(self.stop_batch(remaining, err));
            }
            remaining.targets.remove(id);
            report.applied.push(id.clone());
        }

        self.finish_batch()?;
        info!(
            "Copied {} songs from {:?} to {:?}",
            report.created.len(),
            self.workspace.folder(),
            target
        );
        Ok(report)
    }

    fn disable_one(&mut self, id: &SongId, pending: &StagedPlan) -> Result<PathBuf, LibraryError> {
        let song = self.song(id)?;
        let disabled_dir = self.workspace.disabled_path();
        let dest = disabled_dir.join(&song.name);

        if song.path != dest {
            self.files
                .create_dir_all(&disabled_dir)
                .map_err(|err| LibraryError::apply(id, &disabled_dir, err.into()))?;
            self.move_file(id, &song.path, &dest, pending)?;
            self.relocate(id, &dest);
        }
        let folder = self.workspace.folder().to_path_buf();
        self.store.orders_mut().set(&folder, id, Order::Disabled);
        debug!("Disabled {} -> {:?}", id, dest);
        Ok(dest)
    }

    fn place_one(
        &mut self,
        id: &SongId,
        position: u32,
        pending: &StagedPlan,
        report: &mut ApplyReport,
    ) -> Result<PathBuf, LibraryError> {
        let song = self.song(id)?;
        if position == 0 || position > MAX_ORDER {
            return Err(LibraryError::apply(
                id,
                &song.path,
                LibraryError::OrderOutOfRange {
                    id: id.clone(),
                    order: position,
                },
            ));
        }

        let base = song.base_name().to_string();
        let folder = self.workspace.folder().to_path_buf();
        let dest = folder.join(with_order(&song.name, position));
        if song.path != dest {
            self.move_file(id, &song.path, &dest, pending)?;
            self.relocate(id, &dest);
            let title = title_from_base(&base);
            self.write_tags(id, &dest, &[(TagField::Title, title.as_str())], report);
        }
        self.store
            .orders_mut()
            .set(&folder, id, Order::Position(position));
        debug!("Placed {} at {} ({:?})", id, position, dest);
        Ok(dest)
    }

    fn copy_one(
        &mut self,
        id: &SongId,
        target: &Path,
        position: u32,
        report: &mut ApplyReport,
    ) -> Result<PathBuf, LibraryError> {
        let song = self.song(id)?;
        if position > MAX_ORDER {
            return Err(LibraryError::apply(
                id,
                &song.path,
                LibraryError::OrderOutOfRange {
                    id: id.clone(),
                    order: position,
                },
            ));
        }

        let base = song.base_name().to_string();
        let dest = target.join(with_order(&song.name, position));
        if self.files.exists(&dest) {
            return Err(LibraryError::apply(
                id,
                &dest,
                LibraryError::TargetExists(dest.clone()),
            ));
        }
        let new_id =
            allocate_id(&self.store.all_ids()).map_err(|err| LibraryError::apply(id, &dest, err.into()))?;

        if let Err(err) = self.files.copy(&song.path, &dest) {
            if self.files.exists(&dest) {
                if let Err(cleanup) = self.files.remove_file(&dest) {
                    warn!("Failed to remove partial copy {:?}: {}", dest, cleanup);
                }
            }
            return Err(LibraryError::apply(id, &dest, err.into()));
        }

        let title = title_from_base(&base);
        self.write_tags(
            &new_id,
            &dest,
            &[(TagField::SongId, new_id.as_str()), (TagField::Title, title.as_str())],
            report,
        );

        let mut copy = Song::new(new_id.clone(), dest.clone());
        copy.series = song.series.clone();
        copy.weight = song.weight;
        self.store.records_mut().upsert(copy);
        self.store
            .orders_mut()
            .set(target, &new_id, Order::Position(position));
        debug!("Copied {} as {} -> {:?}", id, new_id, dest);
        report.created.push(new_id);
        Ok(dest)
    }

    /// Renames without overwriting. A target held by another song that is
    /// still waiting in this batch (same base name, different order) is
    /// parked first; that song's own step moves it out again.
    fn move_file(
        &mut self,
        id: &SongId,
        from: &Path,
        to: &Path,
        pending: &StagedPlan,
    ) -> Result<(), LibraryError> {
        if self.files.exists(to) {
            let occupant = self
                .store
                .records()
                .find_by_path(to)
                .map(|song| song.id.clone())
                .filter(|other| other != id && pending.get(other).is_some());
            match occupant {
                Some(other) => self.park(&other, to)?,
                None => {
                    return Err(LibraryError::apply(
                        id,
                        to,
                        LibraryError::TargetExists(to.to_path_buf()),
                    ))
                }
            }
        }
        self.files
            .rename(from, to)
            .map_err(|err| LibraryError::apply(id, to, err.into()))
    }

    fn park(&mut self, id: &SongId, path: &Path) -> Result<(), LibraryError> {
        let parking = self.workspace.folder().join(PARKING_DIR);
        let name = path.file_name().unwrap_or_default();
        let parked = parking.join(name);
        if self.files.exists(&parked) {
            return Err(LibraryError::apply(
                id,
                &parked,
                LibraryError::TargetExists(parked.clone()),
            ));
        }
        self.files
            .create_dir_all(&parking)
            .and_then(|()| self.files.rename(path, &parked))
            .map_err(|err| LibraryError::apply(id, &parked, err.into()))?;
        self.relocate(id, &parked);
        debug!("Parked {} at {:?}", id, parked);
        Ok(())
    }

    fn relocate(&mut self, id: &SongId, dest: &Path) {
        if let Some(record) = self.store.records_mut().find_mut(id) {
            record.relocate(dest.to_path_buf());
            self.unsaved = true;
        }
    }

    fn write_tags(
        &self,
        id: &SongId,
        path: &Path,
        fields: &[(TagField, &str)],
        report: &mut ApplyReport,
    ) {
        if let Err(err) = self.tags.write(path, fields) {
            warn!("Failed to write tags of {} at {:?}: {}", id, path, err);
            report.tag_failures.push(TagFailure {
                id: id.clone(),
                path: path.to_path_buf(),
                error: err.to_string(),
            });
        }
    }

    fn flush(&mut self) -> Result<(), LibraryError> {
        if self.unsaved {
            self.store.commit()?;
            self.unsaved = false;
        }
        Ok(())
    }

    fn commit_step(&mut self, id: &SongId, dest: &Path) -> Result<(), LibraryError> {
        match self.options.persist {
            PersistMode::PerSong => self
                .flush()
                .map_err(|err| LibraryError::apply(id, dest, err)),
            PersistMode::Batch => Ok(()),
        }
    }

    fn stop_batch(&mut self, remaining: StagedPlan, err: LibraryError) -> LibraryError {
        if let Err(commit_err) = self.flush() {
            warn!("Failed to commit partial batch: {}", commit_err);
        }
        warn!(
            "Stopped with {} songs left in {:?}: {}",
            remaining.len(),
            self.workspace.folder(),
            err
        );
        self.staged = Some(remaining);
        self.partial = true;
        err
    }

    fn finish_batch(&mut self) -> Result<(), LibraryError> {
        self.staged = None;
        if let Err(err) = self.flush() {
            self.partial = true;
            return Err(err);
        }
        self.partial = false;
        Ok(())
    }

    fn stage_with<E>(&mut self, ids: &[SongId], edit: E) -> Result<&StagedPlan, LibraryError>
    where
        E: FnOnce(&mut StagedPlan),
    {
        let plan = self.effective_plan();
        if let Some(unknown) = ids.iter().find(|id| plan.get(id).is_none()) {
            return Err(LibraryError::UnknownSong(unknown.clone()));
        }
        let plan = self.staged.insert(plan);
        edit(plan);
        Ok(plan)
    }

    fn effective_plan(&self) -> StagedPlan {
        let current = self.current_orders();
        let mut plan = self.staged.clone().unwrap_or_default();
        plan.targets.retain(|id, _| current.contains_key(id));
        for (id, order) in current {
            plan.targets.entry(id).or_insert(order);
        }

        // Songs with no order anywhere (legacy imports) take the free orders.
        let mut unplaced: Vec<(String, SongId)> = plan
            .targets
            .iter()
            .filter(|(_, order)| **order == Order::Position(0))
            .filter_map(|(id, _)| {
                let song = self.store.records().find(id)?;
                Some((song.name.clone(), id.clone()))
            })
            .collect();
        unplaced.sort();
        for (_, id) in unplaced {
            let next = next_gap(plan.targets.values().filter_map(|order| order.position()));
            plan.set(&id, Order::Position(next));
        }
        plan
    }

    fn current_orders(&self) -> HashMap<SongId, Order> {
        let folder = self.workspace.folder();
        let mut current = HashMap::new();
        for (id, order) in self.store.orders().all_for_folder(folder) {
            if self.store.records().find(&id).is_none() {
                warn!("Order entry {} in {:?} has no song record; ignoring", id, folder);
                continue;
            }
            current.insert(id, order);
        }
        for song in self.store.records().iter() {
            if current.contains_key(&song.id) || !self.workspace.holds(&song.path) {
                continue;
            }
            let order = if self.workspace.is_disabled_location(&song.path) {
                Order::Disabled
            } else {
                Order::Position(effective_order(&song.name))
            };
            warn!("Song {} has no order entry; treating it as {}", song.id, order);
            current.insert(song.id.clone(), order);
        }
        current
    }

    fn song(&self, id: &SongId) -> Result<Song, LibraryError> {
        self.store
            .records()
            .find(id)
            .cloned()
            .ok_or_else(|| LibraryError::UnknownSong(id.clone()))
    }
}
