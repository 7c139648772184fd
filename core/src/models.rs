use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

pub const DEFAULT_SECTION: &str = "Other";

pub const ALL_DAYS: [u8; 7] = [0, 1, 2, 3, 4, 5, 6];

/// Largest point value a chore may carry (`i32::MAX`).
pub const MAX_CHORE_POINTS: i64 = 2_147_483_647;

// --- Household ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub emoji: Option<String>,
    pub points_balance: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub color: String,
    pub emoji: Option<String>,
}

// --- Chores ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chore {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub points: i64,
    pub is_claimable: bool,
    pub is_recurring: bool,
    /// Weekdays the chore occurs on, Sunday = 0.
    pub days_of_week: Vec<u8>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoreAssignment {
    pub id: i64,
    pub chore_id: i64,
    pub user_id: i64,
    pub user: User,
}

/// One day's credit for one chore by one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoreCompletion {
    pub id: i64,
    pub chore_id: i64,
    pub user_id: i64,
    pub completion_date: String,
    pub points_earned: i64,
    pub completed_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoreDetail {
    #[serde(flatten)]
    pub chore: Chore,
    pub assignments: Vec<ChoreAssignment>,
    pub completions: Vec<ChoreCompletion>,
}

impl ChoreDetail {
    #[must_use]
    pub fn assigned_user_ids(&self) -> Vec<i64> {
        self.assignments.iter().map(|a| a.user_id).collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewChore {
    pub name: String,
    pub description: Option<String>,
    pub points: i64,
    pub is_claimable: bool,
    pub is_recurring: bool,
    pub days_of_week: Vec<u8>,
    pub assigned_user_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateChore {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub points: Option<i64>,
    pub is_claimable: Option<bool>,
    pub is_recurring: Option<bool>,
    pub days_of_week: Option<Vec<u8>>,
    /// Replaces the whole assignment set when present.
    pub assigned_user_ids: Option<Vec<i64>>,
}

// --- Recipes & meal plans ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Macros {
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    pub macros: Option<Macros>,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub is_favorite: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRecipe {
    pub name: String,
    pub description: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    pub macros: Option<Macros>,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateRecipe {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub ingredients: Option<Vec<Ingredient>>,
    pub steps: Option<Vec<String>>,
    pub prep_time: Option<Option<i64>>,
    pub cook_time: Option<Option<i64>>,
    pub servings: Option<Option<i64>>,
    pub macros: Option<Option<Macros>>,
    pub source_url: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlan {
    pub id: i64,
    pub date: String,
    pub meal_type: String,
    pub recipe_id: i64,
    pub recipe: Option<Recipe>,
}

#[derive(Debug, Clone)]
pub struct NewMealPlan {
    pub date: NaiveDate,
    pub meal_type: String,
    pub recipe_id: i64,
}

// --- Grocery & pantry ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroceryItem {
    pub id: i64,
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub section: String,
    pub store: Option<String>,
    pub checked: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewGroceryItem {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub section: String,
    pub store: Option<String>,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateGroceryItem {
    pub name: Option<String>,
    pub quantity: Option<Option<f64>>,
    pub unit: Option<Option<String>>,
    pub section: Option<String>,
    pub store: Option<Option<String>>,
    pub checked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PantryItem {
    pub id: i64,
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPantryItem {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub expires_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdatePantryItem {
    pub name: Option<String>,
    pub quantity: Option<Option<f64>>,
    pub unit: Option<Option<String>>,
    pub expires_at: Option<Option<NaiveDate>>,
}

// --- Validation ---

pub fn validate_meal_type(meal: &str) -> Result<String> {
    let lower = meal.trim().to_lowercase();
    if MEAL_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        )
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        Ok(date) => Ok(date),
        Err(_) => bail!("Invalid date '{value}'. Use YYYY-MM-DD"),
    }
}

/// Sorts and de-duplicates weekday numbers, rejecting anything outside 0..=6.
pub fn normalize_days_of_week(days: &[i64]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(days.len());
    for &day in days {
        match u8::try_from(day) {
            Ok(d) if d <= 6 => out.push(d),
            _ => bail!(
                "daysOfWeek entries must be between 0 (Sunday) and 6 (Saturday), got {day}"
            ),
        }
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Returns `None` for blank input so optional text columns store NULL.
#[must_use]
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
