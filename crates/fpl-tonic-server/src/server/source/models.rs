//! Response shapes of the remote endpoints. Only the fields the pipeline reads
//! are modelled; everything else in the payloads is ignored.

use fpl_tonic_core::types::{ItemId, ParticipantId};
use serde::Deserialize;

/// `bootstrap-static`
#[derive(Debug, Deserialize)]
pub(super) struct BootstrapResponse {
    pub elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Element {
    pub id: ItemId,
    pub web_name: String,
}

/// `leagues-classic-standings/{league}`
#[derive(Debug, Deserialize)]
pub(super) struct StandingsResponse {
    pub standings: Standings,
}

#[derive(Debug, Deserialize)]
pub(super) struct Standings {
    pub results: Vec<StandingsEntry>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StandingsEntry {
    pub entry: ParticipantId,
}

/// `entry/{entry}/event/{event}/picks`
#[derive(Debug, Deserialize)]
pub(super) struct PicksResponse {
    pub picks: Vec<Pick>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Pick {
    pub element: ItemId,
}
