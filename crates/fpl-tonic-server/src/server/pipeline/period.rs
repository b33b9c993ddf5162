use crate::server::source::DataSource;
use fpl_tonic_core::types::{
    Catalog, OccurrenceRow, ParticipantSet, Period, PeriodOutcome, PeriodStatus,
};

/// Counts how many participants picked each player in `period`.
///
/// Participants are fetched one after another, in order. The first failed
/// fetch ends the loop: the counts gathered so far are returned with
/// [`PeriodStatus::Partial`] instead of an error, so a degraded gameweek never
/// fails the request. Picks whose ID is missing from the catalog are skipped.
pub async fn aggregate_period<S: DataSource + ?Sized>(
    source: &S,
    catalog: &Catalog,
    participants: &ParticipantSet,
    period: Period,
) -> PeriodOutcome {
    #[cfg(feature = "tracing")]
    tracing::debug!("Fetching data for gameweek {period}");

    let mut row = OccurrenceRow::default();

    for (fetched, participant) in participants.iter().enumerate() {
        let picks = match source.fetch_selections(participant, period).await {
            Ok(picks) => picks,
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Gameweek {period} stopped after {fetched} participants: {error}"
                );
                return PeriodOutcome {
                    period,
                    row,
                    status: PeriodStatus::Partial { fetched, error },
                };
            }
        };

        for id in picks {
            match catalog.name(id) {
                Some(name) => row.increment(name),
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Player {id} picked by {participant} is not in the catalog");
                }
            }
        }
    }

    PeriodOutcome {
        period,
        row,
        status: PeriodStatus::Complete,
    }
}
