use crate::server::source::DataSource;
use fpl_tonic_core::{Result, types::Catalog};

/// Fetches the player catalog.
///
/// Fails with the source's error when the fetch or decode fails; nothing is
/// retried.
pub async fn resolve_catalog<S: DataSource + ?Sized>(source: &S) -> Result<Catalog> {
    let catalog = Catalog::new(source.fetch_catalog().await?);

    #[cfg(feature = "tracing")]
    tracing::info!("Fetched data of {} premier league players", catalog.len());

    Ok(catalog)
}
