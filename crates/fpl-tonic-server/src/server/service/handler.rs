//! gRPC service implementation for league pick occurrences.
//!
//! This module defines [`FplService`], the concrete implementation of the
//! [`Fpl`] gRPC service. Its main endpoint, `GetDataForAllGameweeks`, runs the
//! full aggregation pipeline for a league and streams the resulting CSV back
//! in fixed-size chunks.
//!
//! ## Responsibilities
//!
//! - Validate incoming requests.
//! - Run each request against a freshly resolved catalog and membership.
//! - Bound every request by the configured deadline and abort it when the
//!   client disconnects.
//! - Refuse new work and drain in-flight streams on shutdown.

use crate::server::{
    config::ServerConfig,
    pipeline::{Pipeline, catalog::resolve_catalog, emitter::stream_artifact, membership},
    source::DataSource,
    telemetry::{
        decrement_streams_inflight, increment_bytes_streamed, increment_request_errors,
        increment_requests, increment_stream_errors, increment_streams_inflight,
        record_stream_duration,
    },
};
use core::{future::Future, pin::Pin, time::Duration};
use fpl_tonic_core::{
    Error, Result,
    proto::{
        AllGameweekData, GameweekRequest, LeagueCode, NumParticipants, NumPlayers,
        NumPlayersRequest, PlayerOccurrenceData, fpl_server::Fpl,
    },
    types::{GroupId, Period},
};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{sync::mpsc, time::timeout};
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

/// gRPC service computing per-gameweek pick occurrences for a league.
///
/// Holds no per-request state: every call resolves its own catalog and
/// membership, so concurrent requests never observe each other.
#[derive(Clone)]
pub struct FplService {
    config: ServerConfig,
    pipeline: Pipeline,
    shutdown_token: CancellationToken,
    refusing: Arc<AtomicBool>,
    streams_inflight: Arc<AtomicUsize>,
}

impl FplService {
    pub fn new(config: ServerConfig, source: Arc<dyn DataSource>) -> Self {
        let pipeline = Pipeline::new(source, &config);
        Self {
            config,
            pipeline,
            shutdown_token: CancellationToken::new(),
            refusing: Arc::new(AtomicBool::new(false)),
            streams_inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Gracefully shuts the service down.
    ///
    /// - Refuses new requests.
    /// - Waits up to `shutdown_timeout` for in-flight streams to finish.
    /// - Cancels whatever is still running; their artifacts are removed as
    ///   the streams unwind.
    pub async fn shutdown(&self) -> Result<()> {
        // Phase 0: refuse new requests. In-flight streams watch the token,
        // so it is cancelled only after the drain below.
        self.refusing.store(true, Ordering::Release);

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight.load(Ordering::Acquire)
        );

        let inflight = Arc::clone(&self.streams_inflight);
        let drained = timeout(self.config.shutdown_timeout, async move {
            while inflight.load(Ordering::Acquire) > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight streams drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    self.streams_inflight.load(Ordering::Acquire)
                );
            }
        }

        self.shutdown_token.cancel();

        #[cfg(feature = "tracing")]
        tracing::info!("Service shutdown complete");

        Ok(())
    }

    fn ensure_serving(&self) -> Result<()> {
        if self.shutdown_token.is_cancelled() || self.refusing.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown);
        }
        Ok(())
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        timeout(self.config.request_timeout, fut)
            .await
            .unwrap_or(Err(Error::DeadlineExceeded))
    }

    fn validate_gameweek(&self, gameweek: i32) -> Result<Period> {
        match Period::try_from(gameweek) {
            Ok(period) if (1..=self.config.period_max).contains(&period) => Ok(period),
            _ => Err(Error::InvalidRequest {
                reason: format!(
                    "Gameweek {} must be between 1 and {}",
                    gameweek, self.config.period_max
                ),
            }),
        }
    }
}

fn validate_league(league_code: i64) -> Result<GroupId> {
    if league_code <= 0 {
        return Err(Error::InvalidRequest {
            reason: "League code must be greater than 0".to_string(),
        });
    }
    Ok(league_code)
}

/// Decrements the in-flight stream count when a stream task ends, however it
/// ends.
struct InflightGuard(Arc<AtomicUsize>);

impl InflightGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        increment_streams_inflight();
        Self(Arc::clone(counter))
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
    }
}

/// Builds the CSV artifact for `group` and streams it into `resp_tx`.
async fn build_and_stream(
    pipeline: &Pipeline,
    group: GroupId,
    chunk_bytes: usize,
    resp_tx: &mpsc::Sender<core::result::Result<AllGameweekData, Status>>,
) -> Result<usize> {
    let artifact = pipeline.build_artifact(group).await?;
    let summary = stream_artifact(artifact, chunk_bytes, resp_tx).await?;
    Ok(summary.bytes)
}

#[tonic::async_trait]
impl Fpl for FplService {
    type GetDataForAllGameweeksStream =
        Pin<Box<dyn Stream<Item = core::result::Result<AllGameweekData, Status>> + Send>>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn get_number_of_players(
        &self,
        _req: Request<NumPlayersRequest>,
    ) -> core::result::Result<Response<NumPlayers>, Status> {
        self.ensure_serving()?;
        increment_requests();

        let catalog = self
            .with_deadline(resolve_catalog(self.pipeline.source()))
            .await
            .inspect_err(|_| increment_request_errors())?;

        Ok(Response::new(NumPlayers {
            num_players: catalog.len() as i64,
        }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(league = req.get_ref().league_code)))]
    async fn get_participants_in_league(
        &self,
        req: Request<LeagueCode>,
    ) -> core::result::Result<Response<NumParticipants>, Status> {
        self.ensure_serving()?;
        let group = validate_league(req.get_ref().league_code)?;
        increment_requests();

        let size = self
            .with_deadline(membership::membership_size(self.pipeline.source(), group))
            .await
            .inspect_err(|_| increment_request_errors())?;

        Ok(Response::new(NumParticipants {
            num_participants: size as i64,
        }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(league = req.get_ref().league_code, gameweek = req.get_ref().gameweek)))]
    async fn get_data_for_gameweek(
        &self,
        req: Request<GameweekRequest>,
    ) -> core::result::Result<Response<PlayerOccurrenceData>, Status> {
        self.ensure_serving()?;
        let group = validate_league(req.get_ref().league_code)?;
        let period = self.validate_gameweek(req.get_ref().gameweek)?;
        increment_requests();

        let outcome = self
            .with_deadline(self.pipeline.gameweek(group, period))
            .await
            .inspect_err(|_| increment_request_errors())?;

        Ok(Response::new(PlayerOccurrenceData {
            player_occurrence: outcome
                .row
                .iter()
                .map(|(name, count)| (name.to_owned(), count as i32))
                .collect(),
            partial: outcome.is_partial(),
        }))
    }

    /// Streams the all-gameweek CSV for a league.
    ///
    /// The pipeline runs in a spawned task feeding a bounded response channel.
    /// The task stops when the deadline expires, the client disconnects, or
    /// the service shuts down; in every case the artifact is removed. Errors
    /// raised after the stream started are delivered as its final item.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(league = req.get_ref().league_code)))]
    async fn get_data_for_all_gameweeks(
        &self,
        req: Request<LeagueCode>,
    ) -> core::result::Result<Response<Self::GetDataForAllGameweeksStream>, Status> {
        let start = std::time::Instant::now();
        self.ensure_serving()?;
        let group = validate_league(req.get_ref().league_code).inspect_err(|_| {
            increment_stream_errors();
        })?;
        increment_requests();

        let (resp_tx, resp_rx) = mpsc::channel::<core::result::Result<AllGameweekData, Status>>(
            self.config.stream_buffer_size,
        );

        let inflight = InflightGuard::new(&self.streams_inflight);
        let pipeline = self.pipeline.clone();
        let shutdown = self.shutdown_token.clone();
        let request_timeout = self.config.request_timeout;
        let chunk_bytes = self.config.chunk_bytes;

        let fut = async move {
            let _inflight = inflight;

            let result = tokio::select! {
                () = shutdown.cancelled() => Err(Error::ServiceShutdown),
                () = resp_tx.closed() => Err(Error::RequestCancelled),
                res = timeout(
                    request_timeout,
                    build_and_stream(&pipeline, group, chunk_bytes, &resp_tx),
                ) => res.unwrap_or(Err(Error::DeadlineExceeded)),
            };

            match result {
                Ok(bytes) => {
                    increment_bytes_streamed(bytes as u64);
                    record_stream_duration(start.elapsed().as_millis() as f64);
                }
                Err(Error::RequestCancelled) => {
                    increment_stream_errors();
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Client disconnected from league {group} stream");
                }
                Err(e) => {
                    increment_stream_errors();
                    #[cfg(feature = "tracing")]
                    tracing::warn!("League {group} stream failed: {e}");

                    // Best effort: the client may already be gone.
                    if let Err(_e) = resp_tx.send(Err(e.into())).await {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Response channel failed to forward error: {}", _e);
                    }
                }
            }
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            fut.instrument(tracing::info_span!("streaming"))
        };

        tokio::spawn(fut);

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::pipeline::fake::FakeSource;
    use fpl_tonic_core::types::{CHUNK_BYTES, PARTICIPANT_CAP, PERIOD_MAX};
    use reqwest::Url;
    use tokio_stream::StreamExt;
    use tonic::Code;

    fn config(dir: &std::path::Path) -> ServerConfig {
        ServerConfig {
            server_addr: "127.0.0.1:0".to_string(),
            uds: false,
            source_base_url: Url::parse("http://127.0.0.1:9").unwrap(),
            http_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            participant_cap: PARTICIPANT_CAP,
            period_max: PERIOD_MAX,
            chunk_bytes: CHUNK_BYTES,
            artifact_dir: dir.to_path_buf(),
            stream_buffer_size: 4,
            shutdown_timeout: Duration::from_millis(200),
        }
    }

    fn season_source() -> FakeSource {
        let members: Vec<i64> = (1..=12).collect();
        FakeSource::with_catalog()
            .league(313, members.clone())
            .picks_everywhere(&members, 1..=20, &[454, 267])
            .picks_everywhere(&members[..3], 1..=20, &[454, 267, 247])
    }

    async fn drain(
        mut stream: <FplService as Fpl>::GetDataForAllGameweeksStream,
    ) -> (Vec<u8>, Vec<usize>, Option<Status>) {
        let mut data = Vec::new();
        let mut sizes = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    sizes.push(chunk.data.len());
                    data.extend_from_slice(&chunk.data);
                }
                Err(status) => return (data, sizes, Some(status)),
            }
        }
        (data, sizes, None)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn streams_the_season_csv_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(season_source());
        let service = FplService::new(config(dir.path()), source.clone());

        let stream = service
            .get_data_for_all_gameweeks(Request::new(LeagueCode { league_code: 313 }))
            .await
            .unwrap()
            .into_inner();
        let (data, sizes, status) = drain(stream).await;

        assert!(status.is_none());
        let csv = String::from_utf8(data).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Player,Gameweek 1,"));
        assert!(header.ends_with(",Gameweek 20"));
        // Only the first ten of twelve members are counted.
        let messi = format!("Messi{}", ",10".repeat(20));
        let ronaldo = format!("Ronaldo{}", ",3".repeat(20));
        let salah = format!("Salah{}", ",10".repeat(20));
        assert_eq!(lines.collect::<Vec<_>>(), [messi, ronaldo, salah]);

        let (last, full) = sizes.split_last().unwrap();
        assert!(full.iter().all(|s| *s == CHUNK_BYTES));
        assert!(*last <= CHUNK_BYTES);

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        // 20 gameweeks x 10 members succeed; 18 gameweeks stop at the first.
        assert_eq!(source.calls(), 20 * 10 + 18);
    }

    #[tokio::test]
    async fn catalog_failure_surfaces_on_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            catalog_error: Some(Error::SourceUnavailable {
                context: "bootstrap-static timed out".into(),
            }),
            ..season_source()
        };
        let service = FplService::new(config(dir.path()), Arc::new(source));

        let stream = service
            .get_data_for_all_gameweeks(Request::new(LeagueCode { league_code: 313 }))
            .await
            .unwrap()
            .into_inner();
        let (data, _, status) = drain(stream).await;

        assert!(data.is_empty());
        assert_eq!(status.unwrap().code(), Code::Unavailable);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn invalid_league_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let service = FplService::new(config(dir.path()), Arc::new(season_source()));

        let err = service
            .get_data_for_all_gameweeks(Request::new(LeagueCode { league_code: 0 }))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_hits_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let source = season_source().delayed(Duration::from_secs(60));
        let service = FplService::new(config(dir.path()), Arc::new(source));

        let stream = service
            .get_data_for_all_gameweeks(Request::new(LeagueCode { league_code: 313 }))
            .await
            .unwrap()
            .into_inner();
        let (_, _, status) = drain(stream).await;

        assert_eq!(status.unwrap().code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn single_gameweek_counts_and_partial_flag() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::with_catalog()
            .league(1, vec![1, 2, 3])
            .picks(1, 1, vec![454, 267, 247])
            .picks(2, 1, vec![267, 247])
            .failing(3, 1);
        let service = FplService::new(config(dir.path()), Arc::new(source));

        let data = service
            .get_data_for_gameweek(Request::new(GameweekRequest {
                league_code: 1,
                gameweek: 1,
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(data.partial);
        assert_eq!(data.player_occurrence.get("Messi"), Some(&2));
        assert_eq!(data.player_occurrence.get("Ronaldo"), Some(&2));
        assert_eq!(data.player_occurrence.get("Salah"), Some(&1));
    }

    #[tokio::test]
    async fn gameweek_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = FplService::new(config(dir.path()), Arc::new(season_source()));

        for gameweek in [0, -1, 39] {
            let err = service
                .get_data_for_gameweek(Request::new(GameweekRequest {
                    league_code: 313,
                    gameweek,
                }))
                .await
                .unwrap_err();
            assert_eq!(err.code(), Code::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn counts_players_and_participants() {
        let dir = tempfile::tempdir().unwrap();
        let service = FplService::new(config(dir.path()), Arc::new(season_source()));

        let players = service
            .get_number_of_players(Request::new(NumPlayersRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(players.num_players, 3);

        let participants = service
            .get_participants_in_league(Request::new(LeagueCode { league_code: 313 }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(participants.num_participants, 12);
    }

    #[tokio::test]
    async fn unary_source_failure_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            catalog_error: Some(Error::SourceUnavailable {
                context: "bootstrap-static returned HTTP 503".into(),
            }),
            ..season_source()
        };
        let service = FplService::new(config(dir.path()), Arc::new(source));

        let err = service
            .get_number_of_players(Request::new(NumPlayersRequest {}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);

        let err = service
            .get_participants_in_league(Request::new(LeagueCode { league_code: 404 }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_requests() {
        let dir = tempfile::tempdir().unwrap();
        let service = FplService::new(config(dir.path()), Arc::new(season_source()));

        service.shutdown().await.unwrap();

        let err = service
            .get_number_of_players(Request::new(NumPlayersRequest {}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }
}
