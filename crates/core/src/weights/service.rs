#![allow(missing_docs)]

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::{
    error::ApiError,
    models::{NewWeightSet, WeightSet, WeightSetPatch},
    session::SessionManager,
};

use super::{validate, validate_name, validate_weights};

/// CRUD access to the signed-in user's weight sets.
///
/// Every call goes through the session manager's authorized path, so a
/// stale access token is refreshed and retried once transparently.
#[derive(Debug, Clone)]
pub struct WeightSetService {
    session: Arc<SessionManager>,
}

impl WeightSetService {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// All weight sets owned by the current user.
    pub async fn list(&self) -> Result<Vec<WeightSet>, ApiError> {
        let listing: WeightSetListing = self.session.get_authorized("/user/weight-sets").await?;
        Ok(listing.weight_sets)
    }

    pub async fn get(&self, id: i64) -> Result<WeightSet, ApiError> {
        self.session
            .get_authorized(&format!("/user/weight-sets/{id}"))
            .await
    }

    /// Create a weight set after validating the draft locally.
    pub async fn create(&self, draft: &NewWeightSet) -> Result<WeightSet, ApiError> {
        validate(draft)?;
        let created: WeightSet = self
            .session
            .post_authorized("/user/weight-sets", draft)
            .await?;
        info!("created weight set {} ({})", created.name, created.id);
        Ok(created)
    }

    /// Apply a partial update, validating whichever fields it carries.
    pub async fn update(&self, id: i64, patch: &WeightSetPatch) -> Result<WeightSet, ApiError> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        if let Some(weights) = &patch.weights {
            validate_weights(weights)?;
        }
        self.session
            .put_authorized(&format!("/user/weight-sets/{id}"), patch)
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.session
            .delete_authorized(&format!("/user/weight-sets/{id}"))
            .await?;
        info!("deleted weight set {id}");
        Ok(())
    }

    /// Duplicate an existing set under a "(Copy)" name.
    pub async fn duplicate(&self, id: i64) -> Result<WeightSet, ApiError> {
        let original = self.get(id).await?;
        let draft = NewWeightSet {
            name: format!("{} (Copy)", original.name),
            description: original.description,
            weights: original.weights,
        };
        self.create(&draft).await
    }
}

#[derive(Debug, Deserialize)]
struct WeightSetListing {
    #[serde(default)]
    weight_sets: Vec<WeightSet>,
}
