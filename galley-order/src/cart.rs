use galley_core::{CabinClass, Category, InventoryDocument, MealId, Revision, SeatId};
use galley_shared::models::events::{now_ts, CartItemEvictedEvent, OrderStateChangedEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::{OutOfStockItem, ReservationOutcome, SelectionSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub meal_id: MealId,
    pub category: Category,
    pub name: String,
}

/// The order as committed to the inventory document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedOrder {
    pub seat_id: SeatId,
    pub revision: Revision,
    pub items: Vec<CartItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartPhase {
    Editing,
    /// Locked until `begin_edit`.
    Confirmed(ConfirmedOrder),
    /// Last confirmation bounced; selections are kept for adjustment.
    Rejected(Vec<OutOfStockItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CartEvent {
    Selected(CartItem),
    Deselected(CartItem),
    Evicted(CartItemEvictedEvent),
    Cleared,
    Confirmed(ConfirmedOrder),
    Rejected(Vec<OutOfStockItem>),
    OrderState(OrderStateChangedEvent),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Order is confirmed; start editing before changing it")]
    OrderLocked,
    #[error("Meal {0} is out of stock")]
    Unavailable(MealId),
}

/// A passenger's in-progress meal selection for one cabin.
pub struct Cart {
    cabin: CabinClass,
    seat_id: SeatId,
    items: Vec<CartItem>,
    phase: CartPhase,
    events: broadcast::Sender<CartEvent>,
}

impl Cart {
    pub fn new(cabin: CabinClass, seat_id: SeatId) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            cabin,
            seat_id,
            items: Vec::new(),
            phase: CartPhase::Editing,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.events.subscribe()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn phase(&self) -> &CartPhase {
        &self.phase
    }

    pub fn seat_id(&self) -> &SeatId {
        &self.seat_id
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.phase, CartPhase::Confirmed(_))
    }

    /// Adds a meal, replacing whatever was selected in its category.
    pub fn select(
        &mut self,
        meal_id: impl Into<MealId>,
        category: Category,
        name: impl Into<String>,
    ) -> Result<(), CartError> {
        if self.is_locked() {
            return Err(CartError::OrderLocked);
        }

        let item = CartItem {
            meal_id: meal_id.into(),
            category,
            name: name.into(),
        };
        if let Some(pos) = self.items.iter().position(|i| i.category == category) {
            let replaced = self.items.remove(pos);
            debug!(meal_id = %replaced.meal_id, %category, "Replacing selection");
        }
        self.items.push(item.clone());
        self.emit(CartEvent::Selected(item));
        Ok(())
    }

    /// Removes the selection with the given meal name.
    pub fn deselect(&mut self, name: &str) -> Result<Option<CartItem>, CartError> {
        if self.is_locked() {
            return Err(CartError::OrderLocked);
        }

        let removed = self
            .items
            .iter()
            .position(|i| i.name == name)
            .map(|pos| self.items.remove(pos));
        if let Some(item) = &removed {
            self.emit(CartEvent::Deselected(item.clone()));
        }
        Ok(removed)
    }

    /// Drops a selection whose meal is gone, whatever the phase. Meal ids
    /// are only unique within a category.
    pub fn evict(&mut self, category: Category, meal_id: &str) -> Option<CartItem> {
        let pos = self
            .items
            .iter()
            .position(|i| i.category == category && i.meal_id == meal_id)?;
        let item = self.items.remove(pos);
        info!(seat = %self.seat_id, %category, meal_id, "Evicting cart item taken by another seat");

        self.emit(CartEvent::Evicted(CartItemEvictedEvent {
            cabin: self.cabin,
            seat_id: self.seat_id.to_string(),
            category: item.category,
            meal_id: item.meal_id.clone(),
            name: item.name.clone(),
            timestamp: now_ts(),
        }));
        Some(item)
    }

    /// Explicit cancel: empties the cart and reopens it.
    pub fn clear(&mut self) {
        self.items.clear();
        self.phase = CartPhase::Editing;
        self.emit(CartEvent::Cleared);
        self.emit_order_state();
    }

    pub fn selections(&self) -> SelectionSet {
        self.items
            .iter()
            .map(|i| (i.meal_id.clone(), i.category))
            .collect()
    }

    /// Reopens a confirmed order, seeded with the confirmed items.
    pub fn begin_edit(&mut self) {
        if let CartPhase::Confirmed(order) = &self.phase {
            self.items = order.items.clone();
            self.phase = CartPhase::Editing;
            self.emit_order_state();
        }
    }

    /// Folds the result of a confirmation back into the cart.
    pub fn apply_outcome(&mut self, outcome: &ReservationOutcome) {
        match outcome {
            ReservationOutcome::Confirmed(doc) => {
                let order = self.confirmed_order(doc);
                self.items = order.items.clone();
                self.phase = CartPhase::Confirmed(order.clone());
                self.emit(CartEvent::Confirmed(order));
                self.emit_order_state();
            }
            ReservationOutcome::OutOfStock(unavailable) => {
                let named: Vec<OutOfStockItem> = unavailable
                    .iter()
                    .cloned()
                    .map(|mut item| {
                        if item.name.is_none() {
                            item.name = self.name_of(item.category, &item.meal_id);
                        }
                        item
                    })
                    .collect();
                self.phase = CartPhase::Rejected(named.clone());
                self.emit(CartEvent::Rejected(named));
            }
        }
    }

    /// Builds the order view from what the document says this seat holds.
    /// Names come from the cart; a meal the cart never saw is named by id.
    fn confirmed_order(&self, doc: &InventoryDocument) -> ConfirmedOrder {
        let items = doc
            .reservations_for(&self.seat_id)
            .into_iter()
            .map(|(category, meal_id)| {
                let name = self
                    .items
                    .iter()
                    .find(|i| i.meal_id == meal_id)
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| meal_id.clone());
                CartItem { meal_id, category, name }
            })
            .collect();

        ConfirmedOrder {
            seat_id: self.seat_id.clone(),
            revision: doc.revision.clone(),
            items,
        }
    }

    fn name_of(&self, category: Category, meal_id: &str) -> Option<String> {
        self.items
            .iter()
            .find(|i| i.category == category && i.meal_id == meal_id)
            .map(|i| i.name.clone())
    }

    fn emit_order_state(&self) {
        let confirmed = self.is_locked();
        self.emit(CartEvent::OrderState(OrderStateChangedEvent {
            cabin: self.cabin,
            seat_id: self.seat_id.to_string(),
            is_order_confirmed: confirmed,
            is_editing: !confirmed,
            timestamp: now_ts(),
        }));
    }

    fn emit(&self, event: CartEvent) {
        let _ = self.events.send(event);
    }
}
