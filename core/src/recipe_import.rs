//! Recipe extraction from schema.org JSON-LD embedded in a web page.
//!
//! Publishers disagree on the shape of most Recipe fields, so each loosely
//! typed field gets its own untagged enum and a function that flattens it
//! into the shape stored in the database.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::{Ingredient, Macros, NewRecipe};

pub const DEFAULT_RECIPE_NAME: &str = "Imported Recipe";

static JSON_LD_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PT(?:(\d+)H)?(?:(\d+)M)?").expect("valid regex"));

static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d.]+").expect("valid regex"));

static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("No recipe data found on this page")]
    NoRecipeData,
}

// --- Field shapes ---

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ImageField {
    Url(String),
    Object { url: String },
    List(Vec<ImageField>),
    Other(Value),
}

impl ImageField {
    fn first_url(&self) -> Option<String> {
        match self {
            Self::Url(url) | Self::Object { url } => {
                Some(url.trim().to_string()).filter(|u| !u.is_empty())
            }
            Self::List(items) => items.iter().find_map(Self::first_url),
            Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum InstructionsField {
    Text(String),
    Steps(Vec<InstructionStep>),
    Other(Value),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum InstructionStep {
    Text(String),
    Section {
        #[serde(rename = "itemListElement")]
        item_list_element: Vec<InstructionStep>,
    },
    Step {
        text: Option<String>,
    },
    Other(Value),
}

impl InstructionStep {
    fn collect_into(&self, out: &mut Vec<String>) {
        match self {
            Self::Text(text) | Self::Step { text: Some(text) } => push_step(out, text),
            Self::Section { item_list_element } => {
                for step in item_list_element {
                    step.collect_into(out);
                }
            }
            Self::Step { text: None } | Self::Other(_) => {}
        }
    }
}

fn push_step(out: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        out.push(text.to_string());
    }
}

impl InstructionsField {
    fn steps(&self) -> Vec<String> {
        let mut out = Vec::new();
        match self {
            Self::Text(text) => push_step(&mut out, text),
            Self::Steps(steps) => {
                for step in steps {
                    step.collect_into(&mut out);
                }
            }
            Self::Other(_) => {}
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum YieldField {
    Number(f64),
    Text(String),
    List(Vec<YieldField>),
    Other(Value),
}

impl YieldField {
    fn servings(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.is_finite() && *n >= 1.0 => Some(n.trunc() as i64),
            Self::Text(text) => LEADING_INT
                .find(text)
                .and_then(|m| m.as_str().parse().ok()),
            Self::List(items) => items.iter().find_map(Self::servings),
            Self::Number(_) | Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Nutrition {
    #[serde(default)]
    calories: Option<Value>,
    #[serde(default)]
    protein_content: Option<Value>,
    #[serde(default)]
    carbohydrate_content: Option<Value>,
    #[serde(default)]
    fat_content: Option<Value>,
}

impl Nutrition {
    fn macros(&self) -> Macros {
        let read = |v: &Option<Value>| v.as_ref().map_or(0.0, number_from_value);
        Macros {
            calories: read(&self.calories),
            protein: read(&self.protein_content),
            carbs: read(&self.carbohydrate_content),
            fat: read(&self.fat_content),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonLdRecipe {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    recipe_ingredient: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    recipe_instructions: Option<InstructionsField>,
    #[serde(default, deserialize_with = "lenient")]
    prep_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    cook_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    recipe_yield: Option<YieldField>,
    #[serde(default, deserialize_with = "lenient")]
    nutrition: Option<Nutrition>,
    #[serde(default, deserialize_with = "lenient")]
    image: Option<ImageField>,
}

/// A field of the wrong shape is treated as absent instead of failing the
/// whole recipe.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

// --- Parsing helpers ---

/// Raw text of every JSON-LD script block, in document order.
#[must_use]
pub fn extract_json_ld_blocks(html: &str) -> Vec<&str> {
    JSON_LD_BLOCK
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .collect()
}

/// True when `@type` is `type_name` or a list containing it.
#[must_use]
pub fn is_type(value: &Value, type_name: &str) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == type_name,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(type_name)),
        _ => false,
    }
}

/// Looks in the block itself, then its `@graph`, then the block's own
/// elements when it is an array.
#[must_use]
pub fn find_recipe(block: &Value) -> Option<&Value> {
    if is_type(block, "Recipe") {
        return Some(block);
    }
    let in_graph = block
        .get("@graph")
        .and_then(Value::as_array)
        .and_then(|graph| graph.iter().find(|v| is_type(v, "Recipe")));
    in_graph.or_else(|| {
        block
            .as_array()
            .and_then(|items| items.iter().find(|v| is_type(v, "Recipe")))
    })
}

/// `PT1H30M` → 90. `None` when the text has no hour or minute component.
#[must_use]
pub fn parse_duration(value: &str) -> Option<i64> {
    let caps = DURATION.captures(value)?;
    let hours = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok());
    let minutes = caps.get(2).and_then(|m| m.as_str().parse::<i64>().ok());
    if hours.is_none() && minutes.is_none() {
        return None;
    }
    Some(hours.unwrap_or(0) * 60 + minutes.unwrap_or(0))
}

/// First numeric token in free text ("250 kcal" → 250.0), else 0.
#[must_use]
pub fn parse_first_number(value: &str) -> f64 {
    FIRST_NUMBER
        .find_iter(value)
        .find_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

fn number_from_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_first_number(s),
        _ => 0.0,
    }
}

fn ingredient_from_value(value: &Value) -> Option<Ingredient> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then(|| Ingredient {
        name: text,
        quantity: String::new(),
        unit: String::new(),
    })
}

fn first_recipe_value(html: &str) -> Option<Value> {
    extract_json_ld_blocks(html)
        .into_iter()
        .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
        .find_map(|block| find_recipe(&block).cloned())
}

/// Builds a recipe draft from the first JSON-LD Recipe object on the page.
pub fn parse_recipe_page(html: &str, source_url: &str) -> Result<NewRecipe, ImportError> {
    let value = first_recipe_value(html).ok_or(ImportError::NoRecipeData)?;
    let raw: JsonLdRecipe = serde_json::from_value(value).unwrap_or_default();

    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_RECIPE_NAME.to_string());

    Ok(NewRecipe {
        name,
        description: raw
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        ingredients: raw
            .recipe_ingredient
            .unwrap_or_default()
            .iter()
            .filter_map(ingredient_from_value)
            .collect(),
        steps: raw
            .recipe_instructions
            .map(|i| i.steps())
            .unwrap_or_default(),
        prep_time: raw.prep_time.as_deref().and_then(parse_duration),
        cook_time: raw.cook_time.as_deref().and_then(parse_duration),
        servings: raw.recipe_yield.as_ref().and_then(YieldField::servings),
        macros: raw.nutrition.as_ref().map(Nutrition::macros),
        source_url: Some(source_url.to_string()),
        image_url: raw.image.as_ref().and_then(ImageField::first_url),
    })
}
