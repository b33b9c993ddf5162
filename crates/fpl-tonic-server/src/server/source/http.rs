//! [`DataSource`] backed by the public FPL HTTP API.

use super::{
    DataSource,
    models::{BootstrapResponse, PicksResponse, StandingsResponse},
};
use core::time::Duration;
use fpl_tonic_core::{
    Error, Result,
    types::{GroupId, ItemId, ParticipantId, Period},
};
use reqwest::{Client, Url, header};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

const USER_AGENT: &str = "pg-fpl";

/// Fetches catalog, standings and picks from the FPL API over HTTP.
#[derive(Debug, Clone)]
pub struct FplHttpSource {
    client: Client,
    base: String,
}

impl FplHttpSource {
    /// Builds a source rooted at `base_url` whose every request times out
    /// after `timeout`.
    pub fn new(base_url: &Url, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base: base_url.as_str().trim_end_matches('/').to_owned(),
        })
    }

    fn catalog_url(&self) -> String {
        format!("{}/bootstrap-static", self.base)
    }

    fn membership_url(&self, group: GroupId) -> String {
        format!(
            "{}/leagues-classic-standings/{}?phase=1&le-page=1&ls-page=1",
            self.base, group
        )
    }

    fn selections_url(&self, participant: ParticipantId, period: Period) -> String {
        format!("{}/entry/{}/event/{}/picks", self.base, participant, period)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        #[cfg(feature = "tracing")]
        tracing::trace!("GET {url}");

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable {
                context: format!("request to {url} failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::SourceUnavailable {
                context: format!("request to {url} returned HTTP {status}"),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::SourceUnavailable {
                context: format!("failed to read response from {url}: {e}"),
            })?;

        decode(url, &body)
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::DecodeFailure {
        context: format!("unexpected response from {url}: {e}"),
    })
}

#[tonic::async_trait]
impl DataSource for FplHttpSource {
    async fn fetch_catalog(&self) -> Result<HashMap<ItemId, String>> {
        let response: BootstrapResponse = self.get_json(&self.catalog_url()).await?;
        Ok(response
            .elements
            .into_iter()
            .map(|e| (e.id, e.web_name))
            .collect())
    }

    async fn fetch_membership(&self, group: GroupId) -> Result<Vec<ParticipantId>> {
        let response: StandingsResponse = self.get_json(&self.membership_url(group)).await?;
        Ok(response
            .standings
            .results
            .into_iter()
            .map(|r| r.entry)
            .collect())
    }

    async fn fetch_selections(
        &self,
        participant: ParticipantId,
        period: Period,
    ) -> Result<Vec<ItemId>> {
        let response: PicksResponse = self
            .get_json(&self.selections_url(participant, period))
            .await?;
        Ok(response.picks.into_iter().map(|p| p.element).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(base: &str) -> FplHttpSource {
        FplHttpSource::new(&Url::parse(base).unwrap(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn endpoint_urls() {
        let s = source("https://fantasy.premierleague.com/drf");
        assert_eq!(
            s.catalog_url(),
            "https://fantasy.premierleague.com/drf/bootstrap-static"
        );
        assert_eq!(
            s.membership_url(313),
            "https://fantasy.premierleague.com/drf/leagues-classic-standings/313?phase=1&le-page=1&ls-page=1"
        );
        assert_eq!(
            s.selections_url(1, 1),
            "https://fantasy.premierleague.com/drf/entry/1/event/1/picks"
        );
    }

    #[test]
    fn host_only_base_does_not_double_slash() {
        let s = source("http://127.0.0.1:8080");
        assert_eq!(s.catalog_url(), "http://127.0.0.1:8080/bootstrap-static");
    }

    #[test]
    fn decodes_picks_ignoring_extra_fields() {
        let body = br#"{
            "active_chip": "",
            "automatic_subs": [],
            "entry_history": { "id": 1, "points": 99, "event": 1 },
            "picks": [
                { "element": 454, "position": 1, "is_captain": false, "multiplier": 1 },
                { "element": 267, "position": 2, "is_captain": false, "multiplier": 1 },
                { "element": 247, "position": 3, "is_captain": false, "multiplier": 1 }
            ]
        }"#;
        let picks: PicksResponse = decode("picks", body).unwrap();
        let ids: Vec<_> = picks.picks.iter().map(|p| p.element).collect();
        assert_eq!(ids, [454, 267, 247]);
    }

    #[test]
    fn decodes_catalog_elements() {
        let body = br#"{
            "phases": [],
            "elements": [
                { "id": 1, "photo": "11334.jpg", "web_name": "Cech", "team_code": 3 },
                { "id": 2, "photo": "80201.jpg", "web_name": "Leno", "team_code": 3 }
            ]
        }"#;
        let catalog: BootstrapResponse = decode("bootstrap", body).unwrap();
        assert_eq!(catalog.elements.len(), 2);
        assert_eq!(catalog.elements[1].id, 2);
        assert_eq!(catalog.elements[1].web_name, "Leno");
    }

    #[test]
    fn decodes_standings_entries() {
        let body = br#"{
            "standings": {
                "has_next": true,
                "number": 1,
                "results": [
                    { "id": 14105046, "entry_name": "A's team", "entry": 2575352 },
                    { "id": 20781604, "entry_name": "B's team", "entry": 3614956 },
                    { "id": 229597, "entry_name": "C's team", "entry": 48995 },
                    { "id": 40188, "entry_name": "D's team", "entry": 8450 }
                ]
            }
        }"#;
        let standings: StandingsResponse = decode("standings", body).unwrap();
        let entries: Vec<_> = standings.standings.results.iter().map(|r| r.entry).collect();
        assert_eq!(entries, [2575352, 3614956, 48995, 8450]);
    }

    #[test]
    fn wrong_shape_is_a_decode_failure() {
        let err = decode::<PicksResponse>("picks", br#"{"detail": "Not found."}"#).unwrap_err();
        assert!(matches!(err, Error::DecodeFailure { .. }));

        let err = decode::<PicksResponse>("picks", b"<html>502</html>").unwrap_err();
        assert!(matches!(err, Error::DecodeFailure { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_source_unavailable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let s = source("http://127.0.0.1:9");
        let err = s.fetch_catalog().await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }
}
