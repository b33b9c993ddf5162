//! Per-gameweek fan-out.
//!
//! One task per gameweek runs [`aggregate_period`] and forwards non-empty rows
//! through a merge channel of capacity one. A [`TaskTracker`] counts the
//! tasks; a separate closer task waits on it and then drops the last sender,
//! which is what ends the collector's receive loop. The collector must drain
//! concurrently with the producers: with a single slot, producers park on
//! `send` until it does.

use super::{RequestContext, period::aggregate_period};
use crate::server::source::DataSource;
use core::ops::RangeInclusive;
use fpl_tonic_core::types::{Period, PeriodOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::{
    sync::{CancellationToken, DropGuard},
    task::TaskTracker,
};

/// Receiving half of a running fan-out.
///
/// Dropping it cancels every gameweek task that has not finished yet.
pub struct FanOut {
    merge_rx: mpsc::Receiver<PeriodOutcome>,
    scheduled: usize,
    _cancel_on_drop: DropGuard,
}

impl FanOut {
    /// Next non-empty gameweek result, or `None` once every task finished.
    pub async fn recv(&mut self) -> Option<PeriodOutcome> {
        self.merge_rx.recv().await
    }

    /// Number of gameweek tasks that were spawned.
    pub const fn scheduled(&self) -> usize {
        self.scheduled
    }
}

/// Spawns one aggregation task per gameweek in `periods`.
///
/// Tasks are independent: a failing gameweek neither retries nor cancels its
/// siblings. Gameweeks whose row comes back empty send nothing.
pub fn fan_out<S: DataSource + ?Sized>(
    source: Arc<S>,
    context: Arc<RequestContext>,
    periods: RangeInclusive<Period>,
) -> FanOut {
    let (merge_tx, merge_rx) = mpsc::channel::<PeriodOutcome>(1);
    let tracker = TaskTracker::new();
    let cancel = CancellationToken::new();
    let mut scheduled = 0;

    for period in periods {
        let source = Arc::clone(&source);
        let context = Arc::clone(&context);
        let merge_tx = merge_tx.clone();
        let cancel = cancel.clone();
        scheduled += 1;

        tracker.spawn(async move {
            let work = async {
                let outcome = aggregate_period(
                    source.as_ref(),
                    &context.catalog,
                    &context.participants,
                    period,
                )
                .await;

                if outcome.row.is_empty() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Gameweek {period} produced no data, dropping it");
                    return;
                }

                if let Err(_e) = merge_tx.send(outcome).await {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Collector gone before gameweek {period} was merged: {_e}");
                }
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Gameweek {period} cancelled");
                }
                () = work => {}
            }
        });
    }

    tracker.close();

    // The closer owns the original sender. Every task also holds a clone, so
    // the channel closes only after the tracker has seen every task exit.
    tokio::spawn(async move {
        tracker.wait().await;
        drop(merge_tx);
    });

    FanOut {
        merge_rx,
        scheduled,
        _cancel_on_drop: cancel.drop_guard(),
    }
}
