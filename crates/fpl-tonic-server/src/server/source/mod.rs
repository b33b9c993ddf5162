//! Remote Data Source capabilities consumed by the pipeline.
//!
//! The pipeline only ever talks to a [`DataSource`]; the production
//! implementation is [`http::FplHttpSource`]. Tests substitute in-memory fakes.

pub mod http;
mod models;

use fpl_tonic_core::{
    Result,
    types::{GroupId, ItemId, ParticipantId, Period},
};
use std::collections::HashMap;

/// Remote source of catalog, membership and pick data.
///
/// Every call either returns the decoded payload or fails with
/// [`Error::SourceUnavailable`](fpl_tonic_core::Error::SourceUnavailable) /
/// [`Error::DecodeFailure`](fpl_tonic_core::Error::DecodeFailure). No call
/// retries.
#[tonic::async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Player ID to display name for every player in the game.
    async fn fetch_catalog(&self) -> Result<HashMap<ItemId, String>>;

    /// League members in standings order.
    async fn fetch_membership(&self, group: GroupId) -> Result<Vec<ParticipantId>>;

    /// Player IDs picked by `participant` in `period`.
    async fn fetch_selections(
        &self,
        participant: ParticipantId,
        period: Period,
    ) -> Result<Vec<ItemId>>;
}
