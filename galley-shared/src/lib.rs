pub mod pii;
pub mod models;

pub use models::category::{CabinClass, Category, ParseCategoryError};
pub use pii::Masked;
