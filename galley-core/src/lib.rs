pub mod inventory;
pub mod menu;
pub mod repository;
pub mod identity;

pub use galley_shared::{CabinClass, Category};
pub use inventory::{
    InventoryDocument, MealAvailability, MealCategories, MealId, MealInventory, Revision, SeatId,
};
pub use menu::{MenuDocument, MenuItem};
pub use repository::{ChangeSource, ChunkStream, InventoryStore, MenuSource, StoreError};
pub use identity::{SeatIdProvider, StaticSeatId};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid meal entry: {0}")]
    InvalidMealEntry(String),
    #[error("Invalid seat id: {0:?}")]
    InvalidSeatId(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
