use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Meal category. The set is closed: every inventory document carries
/// exactly these six lists, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Breakfast,
    Lunch,
    Dinner,
    Dessert,
    Beverage,
    Alcohol,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Breakfast,
        Category::Lunch,
        Category::Dinner,
        Category::Dessert,
        Category::Beverage,
        Category::Alcohol,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Breakfast => "breakfast",
            Category::Lunch => "lunch",
            Category::Dinner => "dinner",
            Category::Dessert => "dessert",
            Category::Beverage => "beverage",
            Category::Alcohol => "alcohol",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown meal category: {0}")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    /// Case-insensitive, so "Breakfast" from a menu document parses too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

/// Cabin class. Each class owns one inventory document in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CabinClass {
    Business,
    Economy,
}

impl CabinClass {
    /// Id of the inventory document for this cabin.
    pub fn inventory_doc_id(&self) -> &'static str {
        match self {
            CabinClass::Business => "businessinventory",
            CabinClass::Economy => "economyinventory",
        }
    }

    /// Id of the menu document (names and descriptions) for this cabin.
    pub fn menu_doc_id(&self) -> &'static str {
        match self {
            CabinClass::Business => "businessmeal",
            CabinClass::Economy => "economymeal",
        }
    }
}

impl fmt::Display for CabinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CabinClass::Business => f.write_str("business"),
            CabinClass::Economy => f.write_str("economy"),
        }
    }
}
