use std::collections::HashSet;
use std::fmt;

use crate::SongId;

pub const ID_PREFIX: &str = "ID";
pub const ID_SPACE: u32 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentifierSpaceExhausted;

impl fmt::Display for IdentifierSpaceExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} song ids are in use", ID_SPACE)
    }
}

impl std::error::Error for IdentifierSpaceExhausted {}

/// Returns the lowest `IDnnnn` not present in `existing`. Ids minted earlier
/// in the same batch must already be in `existing`.
pub fn allocate_id(existing: &HashSet<SongId>) -> Result<SongId, IdentifierSpaceExhausted> {
    for n in 0..ID_SPACE {
        let candidate = format!("{}{:04}", ID_PREFIX, n);
        if !existing.contains(candidate.as_str()) {
            return Ok(SongId::new(candidate));
        }
    }
    Err(IdentifierSpaceExhausted)
}
