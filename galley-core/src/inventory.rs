use galley_shared::Category;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::{CoreError, CoreResult};

pub type MealId = String;

/// Opaque passenger seat identifier, stable for the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(String);

impl SeatId {
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidSeatId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store revision token (`_rev`). Opaque; only compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric prefix of an `N-hash` token, if it has one.
    pub fn generation(&self) -> Option<u64> {
        self.0.split_once('-').and_then(|(n, _)| n.parse().ok())
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One value per meal category. Replaces string-keyed lookups so an unknown
/// category can never reach the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealCategories<T> {
    #[serde(default)]
    pub breakfast: T,
    #[serde(default)]
    pub lunch: T,
    #[serde(default)]
    pub dinner: T,
    #[serde(default)]
    pub dessert: T,
    #[serde(default)]
    pub beverage: T,
    #[serde(default)]
    pub alcohol: T,
}

impl<T> MealCategories<T> {
    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::Breakfast => &self.breakfast,
            Category::Lunch => &self.lunch,
            Category::Dinner => &self.dinner,
            Category::Dessert => &self.dessert,
            Category::Beverage => &self.beverage,
            Category::Alcohol => &self.alcohol,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Breakfast => &mut self.breakfast,
            Category::Lunch => &mut self.lunch,
            Category::Dinner => &mut self.dinner,
            Category::Dessert => &mut self.dessert,
            Category::Beverage => &mut self.beverage,
            Category::Alcohol => &mut self.alcohol,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Category, &mut T)> {
        [
            (Category::Breakfast, &mut self.breakfast),
            (Category::Lunch, &mut self.lunch),
            (Category::Dinner, &mut self.dinner),
            (Category::Dessert, &mut self.dessert),
            (Category::Beverage, &mut self.beverage),
            (Category::Alcohol, &mut self.alcohol),
        ]
        .into_iter()
    }
}

/// Wire form of a meal's state, nested under its meal id:
/// `{"<mealId>": {"seatsOrdered": {...}, "startingInventory": 10}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealSlot {
    #[serde(default)]
    pub seats_ordered: BTreeMap<SeatId, Option<serde_json::Value>>,
    pub starting_inventory: u32,
    /// Fields this crate does not model, kept so a rewrite does not drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Capacity and reservations of one meal.
///
/// A reservation marker of `None` is a tombstone: the key survives so the
/// change history stays readable, but the seat no longer holds the meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, MealSlot>", into = "BTreeMap<String, MealSlot>")]
pub struct MealInventory {
    pub meal_id: MealId,
    pub capacity: u32,
    pub reservations: BTreeMap<SeatId, Option<serde_json::Value>>,
    pub extra: Map<String, Value>,
}

impl TryFrom<BTreeMap<String, MealSlot>> for MealInventory {
    type Error = CoreError;

    fn try_from(map: BTreeMap<String, MealSlot>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(CoreError::InvalidMealEntry(format!(
                "expected exactly one meal id per entry, found {}",
                map.len()
            )));
        }
        let (meal_id, slot) = map
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::InvalidMealEntry("empty entry".to_string()))?;

        Ok(Self {
            meal_id,
            capacity: slot.starting_inventory,
            reservations: slot.seats_ordered,
            extra: slot.extra,
        })
    }
}

impl From<MealInventory> for BTreeMap<String, MealSlot> {
    fn from(meal: MealInventory) -> Self {
        let slot = MealSlot {
            seats_ordered: meal.reservations,
            starting_inventory: meal.capacity,
            extra: meal.extra,
        };
        BTreeMap::from([(meal.meal_id, slot)])
    }
}

impl MealInventory {
    pub fn new(meal_id: impl Into<MealId>, capacity: u32) -> Self {
        Self {
            meal_id: meal_id.into(),
            capacity,
            reservations: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// Reservations that are present and not tombstoned.
    pub fn active_count(&self) -> u32 {
        self.reservations.values().filter(|m| m.is_some()).count() as u32
    }

    /// Remaining units, floored at zero.
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.active_count())
    }

    pub fn is_held_by(&self, seat: &SeatId) -> bool {
        matches!(self.reservations.get(seat), Some(Some(_)))
    }

    /// A seat keeps a meal it already holds even when the count says zero.
    pub fn is_available_to(&self, seat: &SeatId) -> bool {
        self.is_held_by(seat) || self.available() > 0
    }

    pub fn reserve(&mut self, seat: &SeatId) {
        self.reservations
            .insert(seat.clone(), Some(serde_json::Value::from(1)));
    }

    /// Removes the seat's key outright, tombstone included. Returns whether
    /// an active reservation was dropped.
    pub fn release(&mut self, seat: &SeatId) -> bool {
        matches!(self.reservations.remove(seat), Some(Some(_)))
    }

    pub fn availability(&self, category: Category, seat: &SeatId) -> MealAvailability {
        let held_by_seat = self.is_held_by(seat);
        let available = self.available();
        let out_of_stock = available == 0 && !held_by_seat;
        MealAvailability {
            category,
            meal_id: self.meal_id.clone(),
            capacity: self.capacity,
            active_count: self.active_count(),
            available: if out_of_stock { 0 } else { available },
            held_by_seat,
            out_of_stock,
        }
    }
}

/// Availability of one meal as seen by one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealAvailability {
    pub category: Category,
    pub meal_id: MealId,
    pub capacity: u32,
    pub active_count: u32,
    pub available: u32,
    pub held_by_seat: bool,
    pub out_of_stock: bool,
}

/// The shared, revisioned inventory document of one cabin class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub revision: Revision,
    #[serde(rename = "type", default)]
    pub doc_type: String,
    #[serde(default)]
    pub flightno: String,
    #[serde(default)]
    pub leg: String,
    #[serde(default)]
    pub aircraft: String,
    #[serde(flatten)]
    pub items: MealCategories<Vec<MealInventory>>,
    /// Everything else on the document (`channels`, `_attachments`, ...).
    /// Must come after `items` so the categories are taken first.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InventoryDocument {
    pub fn new(id: impl Into<String>, revision: Revision) -> Self {
        let id = id.into();
        Self {
            doc_type: id.clone(),
            id,
            revision,
            flightno: String::new(),
            leg: String::new(),
            aircraft: String::new(),
            items: MealCategories::default(),
            extra: Map::new(),
        }
    }

    pub fn meal(&self, category: Category, meal_id: &str) -> Option<&MealInventory> {
        self.items.get(category).iter().find(|m| m.meal_id == meal_id)
    }

    pub fn meal_mut(&mut self, category: Category, meal_id: &str) -> Option<&mut MealInventory> {
        self.items
            .get_mut(category)
            .iter_mut()
            .find(|m| m.meal_id == meal_id)
    }

    pub fn meals(&self) -> impl Iterator<Item = (Category, &MealInventory)> {
        self.items
            .iter()
            .flat_map(|(category, meals)| meals.iter().map(move |m| (category, m)))
    }

    /// Strips every reservation the seat holds, in every category.
    pub fn release_seat(&mut self, seat: &SeatId) -> usize {
        let mut released = 0;
        for (_, meals) in self.items.iter_mut() {
            for meal in meals.iter_mut() {
                if meal.release(seat) {
                    released += 1;
                }
            }
        }
        released
    }

    /// Meals the seat actively holds, in category order.
    pub fn reservations_for(&self, seat: &SeatId) -> Vec<(Category, MealId)> {
        self.meals()
            .filter(|(_, m)| m.is_held_by(seat))
            .map(|(c, m)| (c, m.meal_id.clone()))
            .collect()
    }

    /// Meals whose active count exceeds capacity.
    pub fn over_capacity(&self) -> Vec<(Category, MealId)> {
        self.meals()
            .filter(|(_, m)| m.active_count() > m.capacity)
            .map(|(c, m)| (c, m.meal_id.clone()))
            .collect()
    }
}
