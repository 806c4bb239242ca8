use galley_shared::Category;
use serde::{Deserialize, Serialize};

use crate::inventory::{MealCategories, MealId, Revision};

/// One dish on a cabin menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(rename = "mealid")]
    pub meal_id: MealId,
    #[serde(rename = "meal")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "assetid", default)]
    pub asset_id: String,
}

/// The read-only menu document of a cabin (`businessmeal`, `economymeal`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default)]
    pub revision: Option<Revision>,
    #[serde(default)]
    pub flightno: String,
    #[serde(default)]
    pub leg: String,
    #[serde(default)]
    pub aircraft: String,
    #[serde(flatten)]
    pub items: MealCategories<Vec<MenuItem>>,
}

impl MenuDocument {
    pub fn item(&self, category: Category, meal_id: &str) -> Option<&MenuItem> {
        self.items.get(category).iter().find(|m| m.meal_id == meal_id)
    }

    /// Display name, falling back to the meal id for dishes not on the menu.
    pub fn display_name(&self, category: Category, meal_id: &str) -> String {
        self.item(category, meal_id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| meal_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_menu() {
        let raw = r#"{
            "_id": "economymeal",
            "_rev": "2-ff",
            "type": "economymeal",
            "flightno": "AA234",
            "breakfast": [
                {"mealid": "economymeal1", "meal": "Omelette", "description": "Eggs, chives", "assetid": "a1"}
            ],
            "dinner": [{"mealid": "economymeal7", "meal": "Short rib"}]
        }"#;
        let menu: MenuDocument = serde_json::from_str(raw).unwrap();

        assert_eq!(menu.display_name(Category::Breakfast, "economymeal1"), "Omelette");
        assert_eq!(menu.item(Category::Dinner, "economymeal7").unwrap().description, "");
        // Same id under another category is not the same dish.
        assert!(menu.item(Category::Lunch, "economymeal7").is_none());
        assert_eq!(menu.display_name(Category::Lunch, "economymeal7"), "economymeal7");
    }
}
