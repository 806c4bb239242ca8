use galley_core::{InventoryDocument, InventoryStore, Revision, SeatId, StoreError};
use galley_store::app_config::ReservationConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::models::{
    OutOfStockItem, ReservationEvent, ReservationOutcome, ReservationPhase, ReserveError,
    SelectionSet,
};
use crate::retry::RetryPolicy;

/// Commits seat selections to the shared inventory document with
/// read-modify-conditional-write.
pub struct ReservationEngine {
    store: Arc<dyn InventoryStore>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    events: broadcast::Sender<ReservationEvent>,
}

impl ReservationEngine {
    pub fn new(store: Arc<dyn InventoryStore>, policy: RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            policy,
            attempt_timeout: Duration::from_secs(10),
            events,
        }
    }

    pub fn from_config(store: Arc<dyn InventoryStore>, config: &ReservationConfig) -> Self {
        Self::new(store, RetryPolicy::from_config(config))
            .with_attempt_timeout(Duration::from_millis(config.attempt_timeout_ms))
    }

    /// Deadline for each individual fetch or write.
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReservationEvent> {
        self.events.subscribe()
    }

    /// Reserves exactly `selections` for `seat`, releasing anything else the
    /// seat held. An empty set releases everything.
    pub async fn reserve(
        &self,
        seat: &SeatId,
        selections: &SelectionSet,
    ) -> Result<ReservationOutcome, ReserveError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            trace_phase(seat, attempt, ReservationPhase::Fetching);
            let current = self.fetch().await.map_err(|e| self.fail(seat, e))?;

            trace_phase(seat, attempt, ReservationPhase::Checking);
            let unavailable = check_availability(&current, seat, selections);
            if !unavailable.is_empty() {
                trace_phase(seat, attempt, ReservationPhase::Rejected);
                info!(%seat, count = unavailable.len(), "Selections out of stock, nothing written");
                self.publish(ReservationEvent::Rejected {
                    seat_id: seat.clone(),
                    items: unavailable.clone(),
                });
                return Ok(ReservationOutcome::OutOfStock(unavailable));
            }

            let candidate = apply_selections(&current, seat, selections);

            trace_phase(seat, attempt, ReservationPhase::Writing);
            match self.write(&candidate, &current.revision).await {
                Ok(written) => {
                    trace_phase(seat, attempt, ReservationPhase::Committed);
                    let committed = match self.fetch().await {
                        Ok(doc) => doc,
                        Err(e) => {
                            // The write already landed; report what was written.
                            warn!(%seat, "Re-fetch after commit failed, using written document: {}", e);
                            written
                        }
                    };
                    info!(%seat, revision = %committed.revision, attempt, "Reservation committed");
                    self.publish(ReservationEvent::Confirmed {
                        seat_id: seat.clone(),
                        revision: committed.revision.clone(),
                        reservations: committed.reservations_for(seat),
                    });
                    return Ok(ReservationOutcome::Confirmed(committed));
                }
                Err(e) if e.is_conflict() => {
                    trace_phase(seat, attempt, ReservationPhase::Conflicted);
                    if attempt >= self.policy.max_attempts {
                        trace_phase(seat, attempt, ReservationPhase::Exhausted);
                        warn!(%seat, attempt, "Revision conflicts persisted, giving up");
                        self.publish(ReservationEvent::Failed {
                            seat_id: seat.clone(),
                            reason: format!("exhausted after {} attempts", attempt),
                        });
                        return Err(ReserveError::Exhausted { attempts: attempt });
                    }
                    let delay = self.policy.jittered_delay(attempt - 1);
                    debug!(%seat, attempt, ?delay, "Revision conflict, retrying");
                    sleep(delay).await;
                }
                Err(e) => return Err(self.fail(seat, e)),
            }
        }
    }

    async fn fetch(&self) -> Result<InventoryDocument, StoreError> {
        timeout(self.attempt_timeout, self.store.fetch())
            .await
            .map_err(|_| StoreError::Timeout(self.attempt_timeout))?
    }

    async fn write(
        &self,
        candidate: &InventoryDocument,
        revision: &Revision,
    ) -> Result<InventoryDocument, StoreError> {
        timeout(
            self.attempt_timeout,
            self.store.write_conditional(candidate, revision),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.attempt_timeout))?
    }

    fn fail(&self, seat: &SeatId, err: StoreError) -> ReserveError {
        trace_phase(seat, 0, ReservationPhase::Failed);
        warn!(%seat, "Reservation failed: {}", err);
        self.publish(ReservationEvent::Failed {
            seat_id: seat.clone(),
            reason: err.to_string(),
        });
        ReserveError::Transport(err)
    }

    fn publish(&self, event: ReservationEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

fn trace_phase(seat: &SeatId, attempt: u32, phase: ReservationPhase) {
    debug!(%seat, attempt, ?phase, "reserve");
}

/// Selections the seat cannot have. A meal the seat already holds always
/// passes; a meal missing from the document never does.
pub fn check_availability(
    document: &InventoryDocument,
    seat: &SeatId,
    selections: &SelectionSet,
) -> Vec<OutOfStockItem> {
    selections
        .iter()
        .filter_map(|(category, meal_id)| match document.meal(category, meal_id) {
            Some(meal) if meal.is_available_to(seat) => None,
            Some(meal) => Some(OutOfStockItem {
                meal_id: meal_id.clone(),
                category,
                available: meal.available(),
                name: None,
            }),
            None => Some(OutOfStockItem {
                meal_id: meal_id.clone(),
                category,
                available: 0,
                name: None,
            }),
        })
        .collect()
}

/// Candidate document: every reservation of `seat` removed, then the seat
/// added to each selected meal.
pub fn apply_selections(
    document: &InventoryDocument,
    seat: &SeatId,
    selections: &SelectionSet,
) -> InventoryDocument {
    let mut candidate = document.clone();
    candidate.release_seat(seat);

    for (category, meal_id) in selections.iter() {
        if let Some(meal) = candidate.meal_mut(category, meal_id) {
            meal.reserve(seat);
        }
    }
    candidate
}
