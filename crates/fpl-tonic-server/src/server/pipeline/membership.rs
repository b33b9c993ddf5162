use crate::server::source::DataSource;
use fpl_tonic_core::{
    Result,
    types::{GroupId, ParticipantSet},
};

/// Fetches the league standings and keeps the first `cap` entries.
///
/// Leagues smaller than `cap` are returned whole.
pub async fn resolve_membership<S: DataSource + ?Sized>(
    source: &S,
    group: GroupId,
    cap: usize,
) -> Result<ParticipantSet> {
    let members = source.fetch_membership(group).await?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Fetched {} participants in league {}, counting the first {}",
        members.len(),
        group,
        members.len().min(cap)
    );

    Ok(ParticipantSet::truncated(members, cap))
}

/// Number of entries in the league standings, without truncation.
pub async fn membership_size<S: DataSource + ?Sized>(source: &S, group: GroupId) -> Result<usize> {
    Ok(source.fetch_membership(group).await?.len())
}
