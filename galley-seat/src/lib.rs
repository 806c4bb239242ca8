pub mod seat_id;
pub mod state;
pub mod worker;

pub use seat_id::{FileSeatIdProvider, SeatIdError};
pub use state::SeatSession;
pub use worker::{ChangeFeedConsumer, FeedState, FeedStatus};
