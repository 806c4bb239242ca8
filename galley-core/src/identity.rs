use crate::inventory::SeatId;

/// Issues the passenger's seat identifier. Must return the same id for the
/// whole session.
pub trait SeatIdProvider: Send + Sync {
    fn current_seat_id(&self) -> SeatId;
}

/// Fixed seat id, for tests and for ids issued by an outer system.
#[derive(Debug, Clone)]
pub struct StaticSeatId(pub SeatId);

impl SeatIdProvider for StaticSeatId {
    fn current_seat_id(&self) -> SeatId {
        tracing::trace!("Using static seat id {}", self.0);
        self.0.clone()
    }
}
