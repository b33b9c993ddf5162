use super::encoder::Artifact;
use bytes::Bytes;
use fpl_tonic_core::{Error, Result, proto::AllGameweekData};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
};
use tonic::Status;

/// What a completed stream delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub chunks: usize,
    pub bytes: usize,
}

/// Streams `artifact` to `sink` in chunks of exactly `chunk_bytes` (the last
/// one may be shorter), then removes it.
///
/// The artifact is consumed, so it is removed whether the stream completes,
/// fails to read, loses its sink, or is dropped mid-way.
///
/// # Errors
///
/// - [`Error::IoFailure`] if the artifact cannot be opened or read before EOF.
/// - [`Error::ChannelError`] if the sink is closed. Chunks already sent may or
///   may not have reached the client.
pub async fn stream_artifact(
    artifact: Artifact,
    chunk_bytes: usize,
    sink: &mpsc::Sender<std::result::Result<AllGameweekData, Status>>,
) -> Result<StreamSummary> {
    match File::open(artifact.path()).await {
        Ok(file) => stream_from(artifact, file, chunk_bytes, sink).await,
        Err(e) => {
            let err = Error::IoFailure {
                context: format!("cannot open {}: {e}", artifact.path().display()),
            };
            artifact.remove().await;
            Err(err)
        }
    }
}

/// Forwards `reader` in chunks, then removes `artifact` on every exit that
/// returns.
async fn stream_from<R: AsyncRead + Unpin>(
    artifact: Artifact,
    mut reader: R,
    chunk_bytes: usize,
    sink: &mpsc::Sender<std::result::Result<AllGameweekData, Status>>,
) -> Result<StreamSummary> {
    let result = forward_chunks(&artifact, &mut reader, chunk_bytes, sink).await;
    drop(reader);
    artifact.remove().await;
    result
}

async fn forward_chunks<R: AsyncRead + Unpin>(
    artifact: &Artifact,
    reader: &mut R,
    chunk_bytes: usize,
    sink: &mpsc::Sender<std::result::Result<AllGameweekData, Status>>,
) -> Result<StreamSummary> {
    let mut buf = vec![0_u8; chunk_bytes];
    let mut summary = StreamSummary {
        chunks: 0,
        bytes: 0,
    };

    loop {
        let n = fill_chunk(reader, &mut buf)
            .await
            .map_err(|e| Error::IoFailure {
                context: format!("cannot read {}: {e}", artifact.path().display()),
            })?;

        if n == 0 {
            break;
        }

        let chunk = AllGameweekData {
            data: Bytes::copy_from_slice(&buf[..n]),
        };
        if let Err(e) = sink.send(Ok(chunk)).await {
            return Err(Error::ChannelError {
                context: format!("Failed to forward chunk: {e}"),
            });
        }

        summary.chunks += 1;
        summary.bytes += n;

        if n < chunk_bytes {
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::info!(
        "File transfer of {} complete: {} bytes in {} chunks",
        artifact.path().display(),
        summary.bytes,
        summary.chunks
    );

    Ok(summary)
}

/// Reads until `buf` is full or EOF, returning the number of bytes read.
async fn fill_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::pipeline::encoder::encode;
    use chrono::NaiveDate;
    use fpl_tonic_core::types::{CHUNK_BYTES, OccurrenceRow, OccurrenceTable};
    use std::path::PathBuf;

    /// A table whose CSV is comfortably longer than two chunks.
    fn table() -> OccurrenceTable {
        let mut table = OccurrenceTable::new();
        for period in 1..=10 {
            let row: OccurrenceRow = (0..20)
                .map(|i| (format!("Player number {i:02}"), period))
                .collect();
            table.insert(period, row);
        }
        table
    }

    async fn artifact(dir: &tempfile::TempDir) -> (Artifact, Vec<u8>, PathBuf) {
        let date = NaiveDate::from_ymd_opt(2018, 10, 21).unwrap();
        let artifact = encode(table(), dir.path(), 313, date).await.unwrap();
        let bytes = std::fs::read(artifact.path()).unwrap();
        let path = artifact.path().to_path_buf();
        (artifact, bytes, path)
    }

    #[tokio::test]
    async fn streams_fixed_size_chunks_then_removes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (artifact, expected, path) = artifact(&dir).await;
        assert!(expected.len() > 2 * CHUNK_BYTES);

        let (tx, mut rx) = mpsc::channel(1024);
        let summary = stream_artifact(artifact, CHUNK_BYTES, &tx).await.unwrap();
        drop(tx);

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk.unwrap().data);
        }

        let (last, full) = chunks.split_last().unwrap();
        assert!(full.iter().all(|c| c.len() == CHUNK_BYTES));
        assert!(!last.is_empty() && last.len() <= CHUNK_BYTES);
        assert_eq!(chunks.concat(), expected);
        assert_eq!(summary.chunks, chunks.len());
        assert_eq!(summary.bytes, expected.len());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn closed_sink_aborts_and_still_removes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (artifact, _, path) = artifact(&dir).await;

        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = stream_artifact(artifact, CHUNK_BYTES, &tx).await.unwrap_err();
        assert!(matches!(err, Error::ChannelError { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn vanished_artifact_is_an_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (artifact, _, path) = artifact(&dir).await;
        std::fs::remove_file(&path).unwrap();

        let (tx, _rx) = mpsc::channel(1);
        let err = stream_artifact(artifact, CHUNK_BYTES, &tx).await.unwrap_err();
        assert!(matches!(err, Error::IoFailure { .. }));
    }

    /// Fails every read, like a disk that goes away after the file was
    /// opened.
    struct FailingDisk;

    impl AsyncRead for FailingDisk {
        fn poll_read(
            self: core::pin::Pin<&mut Self>,
            _cx: &mut core::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> core::task::Poll<std::io::Result<()>> {
            core::task::Poll::Ready(Err(std::io::Error::other("device went away")))
        }
    }

    #[tokio::test]
    async fn read_failure_after_open_still_removes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (artifact, _, path) = artifact(&dir).await;
        let reader = (&b"Player,Gameweek 1\n"[..]).chain(FailingDisk);

        let (tx, mut rx) = mpsc::channel(16);
        let err = stream_from(artifact, reader, 8, &tx).await.unwrap_err();
        drop(tx);

        assert!(matches!(err, Error::IoFailure { .. }));
        assert!(!path.exists());

        let mut delivered = Vec::new();
        while let Some(chunk) = rx.recv().await {
            delivered.extend_from_slice(&chunk.unwrap().data);
        }
        assert_eq!(delivered, b"Player,Gameweek ");
    }

    #[tokio::test]
    async fn abandoned_stream_removes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (artifact, _, path) = artifact(&dir).await;

        // Nobody reads: the emitter parks on the second send until dropped.
        let (tx, _rx) = mpsc::channel(1);
        let stream = stream_artifact(artifact, CHUNK_BYTES, &tx);
        let timed_out =
            tokio::time::timeout(core::time::Duration::from_millis(50), stream).await;
        assert!(timed_out.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn exact_multiple_ends_without_an_empty_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let (artifact, expected, _) = artifact(&dir).await;
        let chunk_bytes = expected.len() / 2;
        let chunk_bytes = if expected.len() % 2 == 0 {
            chunk_bytes
        } else {
            // Fall back to the whole file as a single chunk.
            expected.len()
        };

        let (tx, mut rx) = mpsc::channel(16);
        let summary = stream_artifact(artifact, chunk_bytes, &tx).await.unwrap();
        drop(tx);

        let mut sizes = Vec::new();
        while let Some(chunk) = rx.recv().await {
            sizes.push(chunk.unwrap().data.len());
        }
        assert!(sizes.iter().all(|s| *s == chunk_bytes));
        assert_eq!(summary.bytes, expected.len());
    }
}
