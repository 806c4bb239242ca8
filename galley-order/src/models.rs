use galley_core::{Category, InventoryDocument, MealCategories, MealId, Revision, SeatId, StoreError};
use serde::{Deserialize, Serialize};

/// A seat's meal choices, at most one per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet(MealCategories<Option<MealId>>);

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the meal for a category, returning the one it replaced.
    pub fn insert(&mut self, category: Category, meal_id: impl Into<MealId>) -> Option<MealId> {
        self.0.get_mut(category).replace(meal_id.into())
    }

    pub fn remove(&mut self, category: Category) -> Option<MealId> {
        self.0.get_mut(category).take()
    }

    pub fn get(&self, category: Category) -> Option<&MealId> {
        self.0.get(category).as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &MealId)> {
        self.0.iter().filter_map(|(c, m)| m.as_ref().map(|m| (c, m)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Later pairs replace earlier ones in the same category.
impl<M: Into<MealId>> FromIterator<(M, Category)> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = (M, Category)>>(iter: I) -> Self {
        let mut set = SelectionSet::new();
        for (meal_id, category) in iter {
            set.insert(category, meal_id);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfStockItem {
    pub meal_id: MealId,
    pub category: Category,
    /// Units left when the check ran; zero for a meal missing from the document.
    pub available: u32,
    /// Display name, filled in from the cart when the outcome reaches it.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReservationOutcome {
    /// Committed; the document is the store's state after the commit.
    Confirmed(InventoryDocument),
    /// Nothing was written. The passenger has to choose again.
    OutOfStock(Vec<OutOfStockItem>),
}

#[derive(Debug, thiserror::Error)]
pub enum ReserveError {
    #[error("Inventory store unavailable: {0}")]
    Transport(#[source] StoreError),
    #[error("Gave up after {attempts} conflicting write attempts")]
    Exhausted { attempts: u32 },
}

/// Steps of a single `reserve` call, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationPhase {
    Fetching,
    Checking,
    Writing,
    Conflicted,
    Committed,
    Rejected,
    Failed,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReservationEvent {
    Confirmed {
        seat_id: SeatId,
        revision: Revision,
        reservations: Vec<(Category, MealId)>,
    },
    Rejected {
        seat_id: SeatId,
        items: Vec<OutOfStockItem>,
    },
    Failed {
        seat_id: SeatId,
        reason: String,
    },
}
