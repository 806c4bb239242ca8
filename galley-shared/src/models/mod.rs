pub mod category;
pub mod events;
