pub mod fsops;
pub mod reconcile;
pub mod scan;
pub mod shuffle;
pub mod store;

use std::fmt;
use std::path::{Path, PathBuf};

use common::{IdentifierSpaceExhausted, SongId};
use metadata::MetadataError;

pub use fsops::{FileOps, LoftyTags, NoTags, StdFileOps, TagOps};
pub use reconcile::{
    ApplyMethod, ApplyReport, FolderState, PendingChange, PersistMode, ReconcileOptions,
    Reconciler, StagedPlan, TagFailure,
};
pub use scan::{RegisterReport, ScanEntry, ScanOptions, ScanStatus};
pub use store::{Inconsistency, OrderStore, PlaylistStore, RecordStore};

pub const DEFAULT_DISABLED_DIR: &str = "Disabled";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    folder: PathBuf,
    disabled_dir: String,
}

impl Workspace {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            disabled_dir: DEFAULT_DISABLED_DIR.to_string(),
        }
    }

    pub fn with_disabled_dir(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.disabled_dir = name;
        }
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn disabled_dir_name(&self) -> &str {
        &self.disabled_dir
    }

    pub fn disabled_path(&self) -> PathBuf {
        self.folder.join(&self.disabled_dir)
    }

    pub fn is_disabled_location(&self, path: &Path) -> bool {
        path.parent() == Some(self.disabled_path().as_path())
    }

    pub fn holds(&self, path: &Path) -> bool {
        path.parent() == Some(self.folder.as_path()) || self.is_disabled_location(path)
    }
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Metadata(MetadataError),
    IdentifierSpaceExhausted,
    UnknownSong(SongId),
    NotInFolder(PathBuf),
    OrderOutOfRange { id: SongId, order: u32 },
    TargetExists(PathBuf),
    InvalidName(String),
    InvalidTarget(PathBuf),
    /// First failing song of an `apply` batch. Songs before it are committed.
    Apply {
        song_id: SongId,
        path: PathBuf,
        cause: Box<LibraryError>,
    },
}

impl LibraryError {
    pub(crate) fn apply(song_id: &SongId, path: &Path, cause: LibraryError) -> Self {
        LibraryError::Apply {
            song_id: song_id.clone(),
            path: path.to_path_buf(),
            cause: Box::new(cause),
        }
    }

    pub fn song_id(&self) -> Option<&SongId> {
        match self {
            LibraryError::UnknownSong(id) => Some(id),
            LibraryError::OrderOutOfRange { id, .. } => Some(id),
            LibraryError::Apply { song_id, .. } => Some(song_id),
            _ => None,
        }
    }
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Json(err) => write!(f, "json error: {}", err),
            LibraryError::Metadata(err) => write!(f, "metadata error: {}", err),
            LibraryError::IdentifierSpaceExhausted => write!(f, "{}", IdentifierSpaceExhausted),
            LibraryError::UnknownSong(id) => write!(f, "unknown song: {}", id),
            LibraryError::NotInFolder(path) => {
                write!(f, "{:?} is not inside the managed folder", path)
            }
            LibraryError::OrderOutOfRange { id, order } => {
                write!(f, "order {} for {} does not fit a three-digit prefix", order, id)
            }
            LibraryError::TargetExists(path) => write!(f, "target already exists: {:?}", path),
            LibraryError::InvalidName(name) => write!(f, "invalid file name: {:?}", name),
            LibraryError::InvalidTarget(path) => {
                write!(f, "cannot copy a folder onto itself: {:?}", path)
            }
            LibraryError::Apply {
                song_id,
                path,
                cause,
            } => write!(f, "failed to apply {} at {:?}: {}", song_id, path, cause),
        }
    }
}

impl std::error::Error for LibraryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LibraryError::Io(err) => Some(err),
            LibraryError::Json(err) => Some(err),
            LibraryError::Metadata(err) => Some(err),
            LibraryError::Apply { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Json(err)
    }
}

impl From<MetadataError> for LibraryError {
    fn from(err: MetadataError) -> Self {
        LibraryError::Metadata(err)
    }
}

impl From<IdentifierSpaceExhausted> for LibraryError {
    fn from(_: IdentifierSpaceExhausted) -> Self {
        LibraryError::IdentifierSpaceExhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_locations() {
        let ws = Workspace::new("/music/mix");
        assert_eq!(ws.disabled_path(), PathBuf::from("/music/mix/Disabled"));
        assert!(ws.holds(Path::new("/music/mix/001 A.mp3")));
        assert!(ws.holds(Path::new("/music/mix/Disabled/002 B.mp3")));
        assert!(!ws.holds(Path::new("/music/other/001 A.mp3")));
        assert!(ws.is_disabled_location(Path::new("/music/mix/Disabled/002 B.mp3")));

        let custom = Workspace::new("/music/mix").with_disabled_dir("Off");
        assert_eq!(custom.disabled_path(), PathBuf::from("/music/mix/Off"));
        let blank = Workspace::new("/music/mix").with_disabled_dir("  ");
        assert_eq!(blank.disabled_dir_name(), DEFAULT_DISABLED_DIR);
    }

    #[test]
    fn apply_error_carries_song_context() {
        let err = LibraryError::apply(
            &SongId::from("ID0003"),
            Path::new("/music/mix/002 C.mp3"),
            LibraryError::TargetExists(PathBuf::from("/music/mix/002 C.mp3")),
        );
        assert_eq!(err.song_id(), Some(&SongId::from("ID0003")));
        assert!(err.to_string().contains("ID0003"));
    }
}
