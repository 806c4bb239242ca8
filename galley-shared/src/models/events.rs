use crate::models::category::{CabinClass, Category};

/// Published whenever the change feed reports a meal's current state.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct InventoryChangedEvent {
    pub cabin: CabinClass,
    pub category: Category,
    pub meal_id: String,
    pub capacity: u32,
    pub active_count: u32,
    pub available: u32,
    pub timestamp: i64,
}

/// A cart selection was dropped because another seat took the last unit
/// (or the meal was removed from the document).
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct CartItemEvictedEvent {
    pub cabin: CabinClass,
    pub seat_id: String,
    pub category: Category,
    pub meal_id: String,
    pub name: String,
    pub timestamp: i64,
}

/// Order view state handed from the cart to the confirmation view.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct OrderStateChangedEvent {
    pub cabin: CabinClass,
    pub seat_id: String,
    pub is_order_confirmed: bool,
    pub is_editing: bool,
    pub timestamp: i64,
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
