//! Per-user watchlist with idempotent follow and unfollow.

use std::sync::Arc;

use tracing::info;

use crate::lookup::{resolve_asset, ServiceError};
use crate::models::{AssetRef, FollowedCryptocurrency, UserId};
use crate::store::CryptoRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Unfollowed,
    NotFollowing,
}

pub struct FollowRegistry {
    repo: Arc<dyn CryptoRepository>,
}

impl FollowRegistry {
    pub fn new(repo: Arc<dyn CryptoRepository>) -> Self {
        Self { repo }
    }

    pub fn follow(&self, user: UserId, asset: &AssetRef) -> Result<FollowOutcome, ServiceError> {
        let crypto = resolve_asset(self.repo.as_ref(), asset)?;
        let outcome = if self.repo.insert_follow(user, crypto.id)? {
            FollowOutcome::Followed
        } else {
            FollowOutcome::AlreadyFollowing
        };

        info!(
            component = "follow",
            event = "follow.follow",
            user_id = user.0,
            cryptocurrency_id = crypto.id,
            changed = outcome == FollowOutcome::Followed
        );
        Ok(outcome)
    }

    pub fn unfollow(
        &self,
        user: UserId,
        asset: &AssetRef,
    ) -> Result<UnfollowOutcome, ServiceError> {
        let crypto = resolve_asset(self.repo.as_ref(), asset)?;
        let outcome = if self.repo.delete_follow(user, crypto.id)? {
            UnfollowOutcome::Unfollowed
        } else {
            UnfollowOutcome::NotFollowing
        };

        info!(
            component = "follow",
            event = "follow.unfollow",
            user_id = user.0,
            cryptocurrency_id = crypto.id,
            changed = outcome == UnfollowOutcome::Unfollowed
        );
        Ok(outcome)
    }

    pub fn list_followed(&self, user: UserId) -> Result<Vec<FollowedCryptocurrency>, ServiceError> {
        Ok(self.repo.list_followed(user)?)
    }
}
