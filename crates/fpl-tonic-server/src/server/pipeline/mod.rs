//! The aggregation pipeline behind `GetDataForAllGameweeks`.
//!
//! ```text
//! resolve catalog -> resolve membership -> fan_out (1 task / gameweek)
//!     -> collect -> encode (CSV artifact) -> stream_artifact -> remove
//! ```
//!
//! ## Modules
//!
//! - [`catalog`] / [`membership`] - the per-request lookups, both required
//!   before any gameweek is scheduled.
//! - [`period`] - counts picks for a single gameweek.
//! - [`fanout`] / [`collector`] - concurrent fan-out and single-writer fan-in.
//! - [`encoder`] / [`emitter`] - CSV artifact and chunked delivery.

pub mod catalog;
pub mod collector;
pub mod emitter;
pub mod encoder;
pub mod fanout;
pub mod membership;
pub mod period;

#[cfg(test)]
pub(crate) mod fake;

use crate::server::{config::ServerConfig, source::DataSource};
use catalog::resolve_catalog;
use collector::collect;
use encoder::{Artifact, encode};
use fanout::fan_out;
use fpl_tonic_core::{
    Result,
    types::{Catalog, GroupId, OccurrenceTable, ParticipantSet, Period, PeriodOutcome},
};
use membership::resolve_membership;
use period::aggregate_period;
use std::{path::PathBuf, sync::Arc};

/// Everything a single request resolves up front. Built fresh per request and
/// never shared between requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub group: GroupId,
    pub catalog: Catalog,
    pub participants: ParticipantSet,
}

impl RequestContext {
    /// Resolves the catalog, then the league membership. Either failure aborts
    /// the request.
    pub async fn resolve<S: DataSource + ?Sized>(
        source: &S,
        group: GroupId,
        participant_cap: usize,
    ) -> Result<Self> {
        let catalog = resolve_catalog(source).await?;
        let participants = resolve_membership(source, group, participant_cap).await?;

        Ok(Self {
            group,
            catalog,
            participants,
        })
    }
}

/// Stateless pipeline runner shared by every request.
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn DataSource>,
    participant_cap: usize,
    period_max: Period,
    artifact_dir: PathBuf,
}

impl Pipeline {
    pub fn new(source: Arc<dyn DataSource>, config: &ServerConfig) -> Self {
        Self {
            source,
            participant_cap: config.participant_cap,
            period_max: config.period_max,
            artifact_dir: config.artifact_dir.clone(),
        }
    }

    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    pub async fn context(&self, group: GroupId) -> Result<RequestContext> {
        RequestContext::resolve(self.source.as_ref(), group, self.participant_cap).await
    }

    /// Aggregates a single gameweek for `group`.
    pub async fn gameweek(&self, group: GroupId, period: Period) -> Result<PeriodOutcome> {
        let context = self.context(group).await?;
        Ok(aggregate_period(
            self.source.as_ref(),
            &context.catalog,
            &context.participants,
            period,
        )
        .await)
    }

    /// Aggregates every gameweek `1..=period_max` for an already resolved
    /// context.
    pub async fn aggregate(&self, context: RequestContext) -> OccurrenceTable {
        let fan_out = fan_out(
            Arc::clone(&self.source),
            Arc::new(context),
            1..=self.period_max,
        );
        collect(fan_out).await
    }

    /// Runs the pipeline up to the CSV artifact for `group`.
    pub async fn build_artifact(&self, group: GroupId) -> Result<Artifact> {
        let context = self.context(group).await?;
        let table = self.aggregate(context).await;
        let today = chrono::Local::now().date_naive();
        encode(table, &self.artifact_dir, group, today).await
    }
}
