//! Grocery list generation from planned meals.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use anyhow::Result;
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::Database;
use crate::models::{DEFAULT_SECTION, GroceryItem, Ingredient, NewGroceryItem};

// Checked in order; the first match wins.
static SECTION_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "Produce",
            r"lettuce|tomato|onion|garlic|pepper|carrot|celery|broccoli|spinach|kale|cucumber|zucchini|squash|potato|mushroom|avocado|lemon|lime|orange|apple|banana|berry|fruit|vegetable",
        ),
        (
            "Meat",
            r"chicken|beef|pork|turkey|fish|salmon|shrimp|bacon|sausage|meat|steak|ground",
        ),
        ("Dairy", r"milk|cheese|yogurt|cream|butter|egg|sour cream"),
        ("Bakery", r"bread|bagel|roll|tortilla|bun|muffin|croissant"),
        ("Frozen", r"frozen|ice cream"),
        ("Canned", r"can |canned|beans|soup|tomato sauce|paste"),
        (
            "Pantry",
            r"rice|pasta|flour|sugar|oil|vinegar|sauce|spice|seasoning|salt|pepper|honey|syrup",
        ),
    ]
    .into_iter()
    .map(|(section, pattern)| {
        let re = Regex::new(&format!("(?i){pattern}")).expect("section pattern is valid");
        (section, re)
    })
    .collect()
});

static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").expect("number pattern is valid")
});

/// Store section for an ingredient name, or `Other`.
#[must_use]
pub fn categorize_ingredient(name: &str) -> &'static str {
    SECTION_RULES
        .iter()
        .find(|(_, re)| re.is_match(name))
        .map_or(DEFAULT_SECTION, |(section, _)| section)
}

#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Leading numeric value of a free-text quantity ("1.5 cups" → 1.5).
/// Missing, zero or unreadable quantities count as 1.
#[must_use]
pub fn parse_quantity(raw: &str) -> f64 {
    LEADING_NUMBER
        .find(raw.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|q| q.is_finite() && *q != 0.0)
        .unwrap_or(1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedIngredient {
    /// Normalized (lowercase, trimmed) ingredient name.
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

/// Sums quantities per normalized name in first-seen order, skipping blank
/// names and anything in `pantry`. The first unit seen for a name is kept.
pub fn aggregate_ingredients<'a>(
    ingredients: impl IntoIterator<Item = &'a Ingredient>,
    pantry: &HashSet<String>,
) -> Vec<AggregatedIngredient> {
    let mut order: Vec<AggregatedIngredient> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for ingredient in ingredients {
        let key = normalize_name(&ingredient.name);
        if key.is_empty() || pantry.contains(&key) {
            continue;
        }
        let quantity = parse_quantity(&ingredient.quantity);
        if let Some(&pos) = index.get(&key) {
            order[pos].quantity += quantity;
        } else {
            index.insert(key.clone(), order.len());
            order.push(AggregatedIngredient {
                name: key,
                quantity,
                unit: ingredient.unit.trim().to_string(),
            });
        }
    }
    order
}

/// "chicken breast" → "Chicken breast".
#[must_use]
pub fn display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateSummary {
    pub added: usize,
    pub items: Vec<GroceryItem>,
    /// Ingredients whose insert failed; the rest of the run still went through.
    pub failed: Vec<String>,
}

/// Adds the ingredients of every meal planned in `start..=end` to the grocery
/// list, minus pantry stock and anything already listed.
pub fn generate_grocery_list(
    db: &Database,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<GenerateSummary> {
    let plans = db.list_meal_plans(Some(start), Some(end))?;
    let pantry: HashSet<String> = db
        .list_pantry_items()?
        .iter()
        .map(|p| normalize_name(&p.name))
        .collect();
    let existing: HashSet<String> = db
        .list_grocery_items()?
        .iter()
        .map(|g| normalize_name(&g.name))
        .collect();

    let ingredients = plans
        .iter()
        .filter_map(|plan| plan.recipe.as_ref())
        .flat_map(|recipe| recipe.ingredients.iter());
    let needed = aggregate_ingredients(ingredients, &pantry);
    debug!(
        plans = plans.len(),
        candidates = needed.len(),
        "aggregated planned ingredients"
    );

    let mut items = Vec::new();
    let mut failed = Vec::new();
    for ingredient in needed {
        if existing.contains(&ingredient.name) {
            continue;
        }
        let new_item = NewGroceryItem {
            name: display_name(&ingredient.name),
            quantity: Some(ingredient.quantity),
            unit: Some(ingredient.unit).filter(|u| !u.is_empty()),
            section: categorize_ingredient(&ingredient.name).to_string(),
            store: None,
        };
        match db.create_grocery_item(&new_item) {
            Ok(item) => items.push(item),
            Err(e) => {
                warn!(ingredient = %ingredient.name, "failed to add grocery item: {e:#}");
                failed.push(ingredient.name);
            }
        }
    }

    Ok(GenerateSummary {
        added: items.len(),
        items,
        failed,
    })
}
