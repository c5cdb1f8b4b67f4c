use std::sync::Arc;

use tracing::{info, warn};

use crate::error::StoreError;
use crate::models::{NewReview, Review, ReviewPatch};
use crate::store::{select_as, Match, RemoteStore, Table};

/// Locally held review list kept in step with the `reviews` table.
///
/// Local state changes only after the matching remote call succeeded. A
/// failed call leaves the list as it was and records the error message.
pub struct Reviews {
    store: Arc<dyn RemoteStore>,
    items: Vec<Review>,
    loading: bool,
    error: Option<String>,
}

impl Reviews {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            items: Vec::new(),
            loading: true,
            error: None,
        }
    }

    pub fn items(&self) -> &[Review] {
        &self.items
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Reviews written by `user_id`; the only ones that user may edit
    pub fn for_user<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a Review> + 'a {
        self.items
            .iter()
            .filter(move |review| review.user_id.as_deref() == Some(user_id))
    }

    fn record<T>(&mut self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(e) = &result {
            warn!("Review operation failed: {}", e);
            self.error = Some(e.to_string());
        }
        result
    }

    /// Replace the local list with every stored review
    pub async fn load(&mut self) -> Result<(), StoreError> {
        self.loading = true;
        let result = select_as::<Review>(self.store.as_ref(), Table::Reviews, "*").await;
        self.loading = false;

        let reviews = self.record(result)?;
        info!("Loaded {} reviews", reviews.len());
        self.items = reviews;
        Ok(())
    }

    /// Insert `review` and put exactly what was submitted at the front.
    ///
    /// The stored row is not read back, so the local copy has no id or
    /// timestamp until the next [`load`](Self::load).
    pub async fn add(&mut self, review: NewReview) -> Result<(), StoreError> {
        let result = match serde_json::to_value(&review) {
            Ok(row) => self.store.insert(Table::Reviews, vec![row]).await,
            Err(e) => Err(e.into()),
        };
        self.record(result)?;

        self.items.insert(0, review.into());
        Ok(())
    }

    /// Write `patch` to review `id` and merge it into the local copy
    pub async fn update(&mut self, id: i64, patch: ReviewPatch) -> Result<(), StoreError> {
        let result = match serde_json::to_value(&patch) {
            Ok(body) => self.store.update(Table::Reviews, body, &Match::id(id)).await,
            Err(e) => Err(e.into()),
        };
        self.record(result)?;

        for review in self.items.iter_mut().filter(|r| r.id == Some(id)) {
            patch.apply(review);
        }
        Ok(())
    }

    pub async fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let result = self.store.delete(Table::Reviews, &Match::id(id)).await;
        self.record(result)?;

        self.items.retain(|review| review.id != Some(id));
        Ok(())
    }
}
