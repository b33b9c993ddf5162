//! CSV rendering of an [`OccurrenceTable`] into a temporary artifact.
//!
//! Layout:
//!
//! ```text
//! Player,Gameweek 1,Gameweek 2,...,Gameweek N
//! Kane,3,4,...,2
//! ```
//!
//! `N` is the number of gameweeks present in the table, and column `i` holds
//! gameweek `i` itself, read as zero when that gameweek is absent. With gaps
//! in the table the later gameweeks are therefore never written. Rows are the
//! players of the highest gameweek present only; a player missing from that
//! gameweek is not written even if picked earlier.

use chrono::NaiveDate;
use fpl_tonic_core::{
    Error, Result,
    types::{GroupId, OccurrenceTable, Period},
};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// A CSV file on disk owned by a single request.
///
/// [`Artifact::remove`] deletes the file without blocking the runtime. An
/// artifact dropped without it (a cancelled or failed request) is removed
/// synchronously in `Drop`. Removal failures are logged and never surfaced.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    removed: bool,
}

impl Artifact {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the file on the blocking pool.
    pub async fn remove(mut self) {
        self.removed = true;

        #[cfg(feature = "tracing")]
        tracing::debug!("Removing temp file {}", self.path.display());

        if let Err(_e) = tokio::fs::remove_file(&self.path).await {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Error while deleting temp file {}: {}",
                self.path.display(),
                _e
            );
        }
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Removing abandoned temp file {}", self.path.display());

        if let Err(_e) = std::fs::remove_file(&self.path) {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Error while deleting temp file {}: {}",
                self.path.display(),
                _e
            );
        }
    }
}

/// Artifact file name for `group` on `date`.
///
/// Two requests for the same league on the same day share this name.
pub fn artifact_name(group: GroupId, date: NaiveDate) -> String {
    format!("temp-{}-{}.csv", date.format("%Y-%m-%d"), group)
}

/// Writes `table` as CSV into `writer`.
pub fn write_table<W: Write>(table: &OccurrenceTable, writer: W) -> csv::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    let columns = table.len() as Period;
    let mut header = Vec::with_capacity(columns as usize + 1);
    header.push("Player".to_string());
    header.extend((1..=columns).map(|i| format!("Gameweek {i}")));
    csv.write_record(&header)?;

    if let Some((_, latest)) = table.latest() {
        let mut record = Vec::with_capacity(columns as usize + 1);

        for player in latest.names() {
            record.clear();
            record.push(player.to_string());
            record.extend(
                (1..=columns).map(|i| table.get(i).map_or(0, |row| row.count(player)).to_string()),
            );
            csv.write_record(&record)?;
        }
    }

    csv.flush()?;
    Ok(())
}

/// Renders `table` into `dir` and returns the owning [`Artifact`].
///
/// File I/O runs on the blocking pool. A partially written file is removed
/// before the error is returned.
pub async fn encode(
    table: OccurrenceTable,
    dir: &Path,
    group: GroupId,
    date: NaiveDate,
) -> Result<Artifact> {
    let path = dir.join(artifact_name(group, date));

    #[cfg(feature = "tracing")]
    tracing::info!("Writing {} gameweeks to {}", table.len(), path.display());

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::create(&path).map_err(|e| Error::EncodeFailure {
            context: format!("cannot create {}: {e}", path.display()),
        })?;
        // From here on the guard owns the file.
        let artifact = Artifact::new(path);

        write_table(&table, std::io::BufWriter::new(file)).map_err(|e| {
            Error::EncodeFailure {
                context: format!("cannot write {}: {e}", artifact.path.display()),
            }
        })?;

        Ok(artifact)
    })
    .await
    .map_err(|e| Error::EncodeFailure {
        context: format!("artifact writer panicked: {e}"),
    })?
}
