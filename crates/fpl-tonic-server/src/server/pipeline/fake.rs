//! In-memory [`DataSource`] used by the pipeline and service tests.

use crate::server::source::DataSource;
use core::time::Duration;
use fpl_tonic_core::{
    Error, Result,
    types::{GroupId, ItemId, ParticipantId, Period},
};
use portable_atomic::{AtomicUsize, Ordering};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct FakeSource {
    pub catalog: HashMap<ItemId, String>,
    pub leagues: HashMap<GroupId, Vec<ParticipantId>>,
    pub picks: HashMap<(ParticipantId, Period), Vec<ItemId>>,
    /// Pick fetches that fail with `SourceUnavailable`.
    pub failing: HashSet<(ParticipantId, Period)>,
    pub catalog_error: Option<Error>,
    pub delay: Option<Duration>,
    pub selection_calls: AtomicUsize,
}

impl FakeSource {
    /// The three-player catalog used throughout the tests.
    pub fn with_catalog() -> Self {
        Self {
            catalog: HashMap::from([
                (267, "Messi".to_string()),
                (247, "Ronaldo".to_string()),
                (454, "Salah".to_string()),
            ]),
            ..Self::default()
        }
    }

    pub fn league(mut self, group: GroupId, members: Vec<ParticipantId>) -> Self {
        self.leagues.insert(group, members);
        self
    }

    pub fn picks(mut self, participant: ParticipantId, period: Period, ids: Vec<ItemId>) -> Self {
        self.picks.insert((participant, period), ids);
        self
    }

    /// Gives every participant the same picks in every period.
    pub fn picks_everywhere(
        mut self,
        participants: &[ParticipantId],
        periods: core::ops::RangeInclusive<Period>,
        ids: &[ItemId],
    ) -> Self {
        for period in periods {
            for participant in participants {
                self.picks.insert((*participant, period), ids.to_vec());
            }
        }
        self
    }

    pub fn failing(mut self, participant: ParticipantId, period: Period) -> Self {
        self.failing.insert((participant, period));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.selection_calls.load(Ordering::SeqCst)
    }
}

#[tonic::async_trait]
impl DataSource for FakeSource {
    async fn fetch_catalog(&self) -> Result<HashMap<ItemId, String>> {
        match &self.catalog_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.catalog.clone()),
        }
    }

    async fn fetch_membership(&self, group: GroupId) -> Result<Vec<ParticipantId>> {
        self.leagues
            .get(&group)
            .cloned()
            .ok_or_else(|| Error::DecodeFailure {
                context: format!("league {group} has no standings"),
            })
    }

    async fn fetch_selections(
        &self,
        participant: ParticipantId,
        period: Period,
    ) -> Result<Vec<ItemId>> {
        self.selection_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&(participant, period)) {
            return Err(Error::SourceUnavailable {
                context: format!("entry {participant} event {period}"),
            });
        }
        self.picks
            .get(&(participant, period))
            .cloned()
            .ok_or_else(|| Error::DecodeFailure {
                context: format!("no picks for entry {participant} event {period}"),
            })
    }
}
