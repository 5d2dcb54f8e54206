//! Asset resolution shared by the read, follow and history paths.

use thiserror::Error;

use crate::models::{AssetRef, Cryptocurrency};
use crate::store::{CryptoRepository, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("cryptocurrency not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn resolve_asset(
    repo: &dyn CryptoRepository,
    asset: &AssetRef,
) -> Result<Cryptocurrency, ServiceError> {
    repo.find_cryptocurrency(asset)?
        .ok_or_else(|| ServiceError::NotFound(asset.as_str().to_string()))
}
