use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod codec;
pub mod gap;
pub mod ids;

pub use codec::{
    base_name, effective_order, format_prefixed, parse_prefixed, title_from_base, with_order,
    MAX_ORDER,
};
pub use gap::{next_available, next_gap};
pub use ids::{allocate_id, IdentifierSpaceExhausted, ID_PREFIX, ID_SPACE};

pub const MIN_WEIGHT: u8 = 1;
pub const MAX_WEIGHT: u8 = 10;
pub const DEFAULT_WEIGHT: u8 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(String);

impl SongId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_well_formed(&self) -> bool {
        match self.0.strip_prefix(ID_PREFIX) {
            Some(digits) => digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit()),
            None => false,
        }
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SongId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SongId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for SongId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub series: String,
    #[serde(default = "default_weight", deserialize_with = "deserialize_weight")]
    pub weight: u8,
}

impl Song {
    pub fn new(id: SongId, path: PathBuf) -> Self {
        let name = file_name(&path);
        Self {
            id,
            name,
            path,
            series: String::new(),
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.path.parent()
    }

    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }

    pub fn prefix_order(&self) -> Option<u32> {
        parse_prefixed(&self.name).map(|(order, _)| order)
    }

    pub fn relocate(&mut self, path: PathBuf) {
        self.name = file_name(&path);
        self.path = path;
    }
}

pub fn clamp_weight(value: i64) -> u8 {
    value.clamp(i64::from(MIN_WEIGHT), i64::from(MAX_WEIGHT)) as u8
}

fn default_weight() -> u8 {
    DEFAULT_WEIGHT
}

fn deserialize_weight<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(clamp_weight(raw))
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Position of a song inside its folder, or the soft-deleted state.
///
/// Persisted as a plain integer: `-1` is disabled, `0` means the song has no
/// position yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Order {
    Position(u32),
    Disabled,
}

impl Order {
    pub const DISABLED_SENTINEL: i64 = -1;

    pub fn position(self) -> Option<u32> {
        match self {
            Order::Position(value) => Some(value),
            Order::Disabled => None,
        }
    }

    pub fn to_raw(self) -> i64 {
        match self {
            Order::Position(value) => i64::from(value),
            Order::Disabled => Self::DISABLED_SENTINEL,
        }
    }

    pub fn from_raw(raw: i64) -> Option<Self> {
        if raw < 0 {
            return Some(Order::Disabled);
        }
        u32::try_from(raw).ok().map(Order::Position)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Position(value) => write!(f, "{}", value),
            Order::Disabled => f.write_str("disabled"),
        }
    }
}

impl Serialize for Order {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.to_raw())
    }
}

impl<'de> Deserialize<'de> for Order {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Order::from_raw(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("order out of range: {}", raw)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSlot {
    pub id: SongId,
    pub order: Order,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderOrders {
    pub folder_path: PathBuf,
    #[serde(default)]
    pub orders: Vec<OrderSlot>,
}

impl FolderOrders {
    pub fn new(folder_path: PathBuf) -> Self {
        Self {
            folder_path,
            orders: Vec::new(),
        }
    }
}
