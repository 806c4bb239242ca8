pub mod models;
pub mod retry;
pub mod engine;
pub mod cart;
pub mod cache;

pub use models::{OutOfStockItem, ReservationEvent, ReservationOutcome, ReserveError, SelectionSet};
pub use retry::RetryPolicy;
pub use engine::ReservationEngine;
pub use cart::{Cart, CartError, CartEvent, CartItem, CartPhase, ConfirmedOrder};
pub use cache::InventoryCache;
