use super::fanout::FanOut;
use crate::server::telemetry::{increment_periods_aggregated, increment_periods_degraded};
use fpl_tonic_core::types::OccurrenceTable;

/// Drains a running [`FanOut`] into an [`OccurrenceTable`].
///
/// This is the table's only writer. Gameweek keys are unique per fan-out, so
/// rows never collide. Returns once the merge channel is closed.
pub async fn collect(mut fan_out: FanOut) -> OccurrenceTable {
    let mut table = OccurrenceTable::new();

    while let Some(outcome) = fan_out.recv().await {
        increment_periods_aggregated();
        if outcome.is_partial() {
            increment_periods_degraded();
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Data fetched for gameweek {}{}",
            outcome.period,
            if outcome.is_partial() { " (partial)" } else { "" }
        );

        if table.insert(outcome.period, outcome.row).is_some() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Gameweek {} was merged twice", outcome.period);
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "Collected {} of {} gameweeks",
        table.len(),
        fan_out.scheduled()
    );

    table
}
