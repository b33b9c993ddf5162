//! # Domain Types and Constants
//!
//! The shapes that flow through the aggregation pipeline:
//!
//! - [`Catalog`] - player ID to display name, resolved once per request
//! - [`ParticipantSet`] - the league members whose picks are counted
//! - [`OccurrenceRow`] - per-player pick counts for a single gameweek
//! - [`OccurrenceTable`] - rows keyed by gameweek, only for gameweeks that
//!   produced data
//! - [`PeriodOutcome`] - a row plus whether every pick fetch succeeded
//!
//! Rows and tables are backed by ordered maps so that encoding the same table
//! twice yields byte-identical output.

use crate::Error;
use std::collections::{BTreeMap, HashMap};

/// Player (catalog item) identifier.
pub type ItemId = i64;

/// League participant (entry) identifier.
pub type ParticipantId = i64;

/// League (group) identifier.
pub type GroupId = i64;

/// Gameweek number, `1..=PERIOD_MAX`.
pub type Period = u32;

/// Number of gameweeks in a season.
pub const PERIOD_MAX: Period = 38;

/// Number of league members whose picks are counted.
pub const PARTICIPANT_CAP: usize = 10;

/// Size of each streamed artifact chunk in bytes. The final chunk may be
/// shorter.
pub const CHUNK_BYTES: usize = 200;

/// Mapping from player ID to display name. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    names: HashMap<ItemId, String>,
}

impl Catalog {
    pub fn new(names: HashMap<ItemId, String>) -> Self {
        Self { names }
    }

    /// Display name for `id`, if the catalog knows it.
    pub fn name(&self, id: ItemId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(ItemId, String)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (ItemId, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The league members whose picks are counted, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantSet {
    members: Vec<ParticipantId>,
}

impl ParticipantSet {
    /// Keeps the first `cap` members. Smaller memberships are kept whole.
    pub fn truncated(mut members: Vec<ParticipantId>, cap: usize) -> Self {
        members.truncate(cap);
        Self { members }
    }

    pub fn as_slice(&self) -> &[ParticipantId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.members.iter().copied()
    }
}

/// Pick counts per player name for one gameweek.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrenceRow {
    counts: BTreeMap<String, u32>,
}

impl OccurrenceRow {
    pub fn increment(&mut self, name: &str) {
        match self.counts.get_mut(name) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(name.to_owned(), 1);
            }
        }
    }

    /// Count for `name`, zero when the player was never picked.
    pub fn count(&self, name: &str) -> u32 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for OccurrenceRow {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().map(|(name, c)| (name.into(), c)).collect(),
        }
    }
}

/// Occurrence rows keyed by gameweek.
///
/// Only gameweeks that produced a non-empty row are present; a gameweek whose
/// fetches all failed is absent rather than zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrenceTable {
    rows: BTreeMap<Period, OccurrenceRow>,
}

impl OccurrenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `row` for `period`, returning the row it replaced.
    pub fn insert(&mut self, period: Period, row: OccurrenceRow) -> Option<OccurrenceRow> {
        self.rows.insert(period, row)
    }

    pub fn get(&self, period: Period) -> Option<&OccurrenceRow> {
        self.rows.get(&period)
    }

    /// The row of the highest-numbered gameweek present.
    pub fn latest(&self) -> Option<(Period, &OccurrenceRow)> {
        self.rows.last_key_value().map(|(p, row)| (*p, row))
    }

    pub fn periods(&self) -> impl Iterator<Item = Period> + '_ {
        self.rows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Whether a gameweek's row covers every participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodStatus {
    /// Every participant's picks were fetched and counted.
    Complete,
    /// A fetch failed; only the first `fetched` participants were counted.
    Partial { fetched: usize, error: Error },
}

/// The result of aggregating one gameweek.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodOutcome {
    pub period: Period,
    pub row: OccurrenceRow,
    pub status: PeriodStatus,
}

impl PeriodOutcome {
    pub const fn is_partial(&self) -> bool {
        matches!(self.status, PeriodStatus::Partial { .. })
    }
}
