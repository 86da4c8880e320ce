//! Action coordinator with per-target re-entrancy guards.

use std::collections::HashSet;
use std::sync::Arc;

use dailydone_proto::normalize::{poster_id_of, task_id_of};
use dailydone_proto::task::{Task, TaskId, TaskStatus};
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::{
    ActionEndpoints, ActionError, ActionKind, ActionOutcome, ActionTarget, ERRAND_ID_PARAM,
    MAX_RATING, USER_ID_PARAM,
};
use crate::http::{ApiClient, RequestOptions};
use crate::sync::Reconcile;

/// What the view knows about an errand it wants to complete.
///
/// Identifiers are taken from the normalized view first and from the raw
/// backend record when the view lacks them.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionTarget<'a> {
    pub view: Option<&'a Task>,
    pub raw: Option<&'a Value>,
}

impl<'a> CompletionTarget<'a> {
    #[must_use]
    pub const fn from_view(view: &'a Task) -> Self {
        Self {
            view: Some(view),
            raw: None,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: &'a Value) -> Self {
        Self {
            view: None,
            raw: Some(raw),
        }
    }

    #[must_use]
    pub const fn with_raw(mut self, raw: &'a Value) -> Self {
        self.raw = Some(raw);
        self
    }

    fn task_id(&self) -> Option<TaskId> {
        self.view
            .map(|t| t.id.clone())
            .filter(|id| !id.is_empty())
            .or_else(|| self.raw.and_then(task_id_of))
    }

    fn poster_id(&self) -> Option<String> {
        self.view
            .and_then(|t| t.poster.id.clone())
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.raw.and_then(poster_id_of))
    }
}

/// Runs errand actions against the backend.
pub struct ActionCoordinator<A: ApiClient> {
    api: Arc<A>,
    endpoints: ActionEndpoints,
    in_flight: Mutex<HashSet<ActionTarget>>,
}

/// Marks a target busy for as long as it lives.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<ActionTarget>>,
    target: ActionTarget,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.target);
    }
}

impl<A: ApiClient> ActionCoordinator<A> {
    /// A coordinator using the default endpoints.
    #[must_use]
    pub fn new(api: Arc<A>) -> Self {
        Self::with_endpoints(api, ActionEndpoints::default())
    }

    #[must_use]
    pub fn with_endpoints(api: Arc<A>, endpoints: ActionEndpoints) -> Self {
        Self {
            api,
            endpoints,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Returns `true` while an action on `target` is running.
    #[must_use]
    pub fn is_busy(&self, target: &ActionTarget) -> bool {
        self.in_flight.lock().contains(target)
    }

    /// Accepts an errand as the signed-in helper.
    ///
    /// # Errors
    ///
    /// See [`ActionError`]; nothing is sent if the id is empty or another
    /// action on the errand is running.
    pub async fn accept(&self, id: &TaskId) -> Result<ActionOutcome, ActionError> {
        self.errand_action(ActionKind::Accept, id, None, TaskStatus::Accepted)
            .await
    }

    /// Cancels an errand.
    ///
    /// # Errors
    ///
    /// See [`ActionError`].
    pub async fn cancel(&self, id: &TaskId) -> Result<ActionOutcome, ActionError> {
        self.errand_action(ActionKind::Cancel, id, None, TaskStatus::Cancelled)
            .await
    }

    /// Marks an errand completed on behalf of its poster.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MissingIdentifiers`] before sending anything
    /// if the errand id or the poster id cannot be resolved.
    pub async fn complete(&self, target: CompletionTarget<'_>) -> Result<ActionOutcome, ActionError> {
        let id = target
            .task_id()
            .ok_or(ActionError::MissingIdentifiers("errand id"))?;
        let poster = target
            .poster_id()
            .ok_or(ActionError::MissingIdentifiers("poster id"))?;
        self.errand_action(ActionKind::Complete, &id, Some(&poster), TaskStatus::Completed)
            .await
    }

    /// Rates a counterparty from 0 to 5.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidRating`] before sending anything if
    /// `value` is out of range.
    pub async fn rate(&self, counterparty_id: &str, value: i64) -> Result<ActionOutcome, ActionError> {
        if !(0..=MAX_RATING).contains(&value) {
            return Err(ActionError::InvalidRating(value));
        }
        let counterparty_id = counterparty_id.trim();
        if counterparty_id.is_empty() {
            return Err(ActionError::MissingIdentifiers("user id"));
        }

        let target = ActionTarget::Profile(counterparty_id.to_string());
        let options = RequestOptions::new(self.endpoints.rate.method)
            .with_query(USER_ID_PARAM, counterparty_id)
            .with_json(json!({ "rating": value }));
        self.send(ActionKind::Rate, target, options).await?;
        Ok(ActionOutcome {
            kind: ActionKind::Rate,
            reconcile: Reconcile::None,
        })
    }

    async fn errand_action(
        &self,
        kind: ActionKind,
        id: &TaskId,
        user_id: Option<&str>,
        status: TaskStatus,
    ) -> Result<ActionOutcome, ActionError> {
        if id.is_empty() {
            return Err(ActionError::MissingIdentifiers("errand id"));
        }
        let mut options = RequestOptions::new(self.endpoints.get(kind).method)
            .with_query(ERRAND_ID_PARAM, id.as_str());
        if let Some(user_id) = user_id {
            options = options.with_query(USER_ID_PARAM, user_id);
        }

        self.send(kind, ActionTarget::Errand(id.clone()), options)
            .await?;
        Ok(ActionOutcome {
            kind,
            reconcile: Reconcile::SetStatus(id.clone(), status),
        })
    }

    /// Claims `target`, sends the request and releases the claim on every
    /// exit path.
    async fn send(
        &self,
        kind: ActionKind,
        target: ActionTarget,
        options: RequestOptions,
    ) -> Result<(), ActionError> {
        let _guard = self.claim(target.clone())?;
        let path = &self.endpoints.get(kind).path;

        tracing::debug!(%kind, %target, path = %path, "sending action");
        match self.api.request(path, options).await {
            Ok(_) => {
                tracing::info!(%kind, %target, "action succeeded");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%kind, %target, err = %err, "action failed");
                Err(err.into())
            }
        }
    }

    fn claim(&self, target: ActionTarget) -> Result<InFlightGuard<'_>, ActionError> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains(&target) {
            tracing::debug!(%target, "action already in flight");
            return Err(ActionError::Reentrant(target));
        }
        in_flight.insert(target.clone());
        Ok(InFlightGuard {
            set: &self.in_flight,
            target,
        })
    }
}
