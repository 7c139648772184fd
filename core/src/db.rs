use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::models::{
    Chore, ChoreAssignment, ChoreCompletion, ChoreDetail, GroceryItem, MealPlan, NewChore,
    NewGroceryItem, NewMealPlan, NewPantryItem, NewRecipe, NewUser, PantryItem, Recipe,
    UpdateChore, UpdateGroceryItem, UpdatePantryItem, UpdateRecipe, User,
};

const USER_COLUMNS: &str = "id, name, color, emoji, points_balance, created_at";
const CHORE_COLUMNS: &str =
    "id, name, description, points, is_claimable, is_recurring, days_of_week, created_at";
const COMPLETION_COLUMNS: &str =
    "id, chore_id, user_id, completion_date, points_earned, completed_at";
const RECIPE_COLUMNS: &str = "id, name, description, ingredients, steps, prep_time, cook_time, servings, macros, source_url, image_url, is_favorite, created_at";
const GROCERY_COLUMNS: &str = "id, name, quantity, unit, section, store, checked, created_at";
const PANTRY_COLUMNS: &str = "id, name, quantity, unit, expires_at, created_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        self.conn
            .pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL,
                    emoji TEXT,
                    points_balance INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS chores (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT,
                    points INTEGER NOT NULL DEFAULT 1,
                    is_claimable INTEGER NOT NULL DEFAULT 0,
                    is_recurring INTEGER NOT NULL DEFAULT 1,
                    days_of_week TEXT NOT NULL DEFAULT '[0,1,2,3,4,5,6]',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS chore_assignments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    chore_id INTEGER NOT NULL REFERENCES chores(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    UNIQUE (chore_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS chore_completions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    chore_id INTEGER NOT NULL REFERENCES chores(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    completion_date TEXT NOT NULL,
                    points_earned INTEGER NOT NULL,
                    completed_at TEXT NOT NULL,
                    UNIQUE (chore_id, user_id, completion_date)
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT,
                    ingredients TEXT NOT NULL DEFAULT '[]',
                    steps TEXT NOT NULL DEFAULT '[]',
                    prep_time INTEGER,
                    cook_time INTEGER,
                    servings INTEGER,
                    macros TEXT,
                    source_url TEXT,
                    image_url TEXT,
                    is_favorite INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meal_plans (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date TEXT NOT NULL,
                    meal_type TEXT NOT NULL,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    UNIQUE (date, meal_type)
                );

                CREATE TABLE IF NOT EXISTS grocery_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    quantity REAL,
                    unit TEXT,
                    section TEXT NOT NULL DEFAULT 'Other',
                    store TEXT,
                    checked INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS pantry_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    quantity REAL,
                    unit TEXT,
                    expires_at TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_assignments_chore ON chore_assignments(chore_id);
                CREATE INDEX IF NOT EXISTS idx_completions_date ON chore_completions(completion_date);
                CREATE INDEX IF NOT EXISTS idx_meal_plans_date ON meal_plans(date);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    /// Runs `body` as one unit of work. The transaction commits only when
    /// `body` returns `Ok`; an `Err` drops it, which rolls back every write.
    pub fn transaction<T, E>(
        &self,
        body: impl FnOnce(&Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let out = body(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // --- Row mappers ---

    fn user_at(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(offset)?,
            name: row.get(offset + 1)?,
            color: row.get(offset + 2)?,
            emoji: row.get(offset + 3)?,
            points_balance: row.get(offset + 4)?,
            created_at: row.get(offset + 5)?,
        })
    }

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Self::user_at(row, 0)
    }

    fn chore_from_row(row: &rusqlite::Row) -> rusqlite::Result<Chore> {
        Ok(Chore {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            points: row.get(3)?,
            is_claimable: row.get(4)?,
            is_recurring: row.get(5)?,
            days_of_week: json_column(row, 6)?,
            created_at: row.get(7)?,
        })
    }

    // Expects columns:
    // 0: a.id, 1: a.chore_id, 2: a.user_id, 3..=8: user columns
    fn assignment_from_row(row: &rusqlite::Row) -> rusqlite::Result<ChoreAssignment> {
        Ok(ChoreAssignment {
            id: row.get(0)?,
            chore_id: row.get(1)?,
            user_id: row.get(2)?,
            user: Self::user_at(row, 3)?,
        })
    }

    fn completion_from_row(row: &rusqlite::Row) -> rusqlite::Result<ChoreCompletion> {
        Ok(ChoreCompletion {
            id: row.get(0)?,
            chore_id: row.get(1)?,
            user_id: row.get(2)?,
            completion_date: row.get(3)?,
            points_earned: row.get(4)?,
            completed_at: row.get(5)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        let macros: Option<String> = row.get(8)?;
        let macros = macros
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| conversion_error(8, e))?;
        Ok(Recipe {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            ingredients: json_column(row, 3)?,
            steps: json_column(row, 4)?,
            prep_time: row.get(5)?,
            cook_time: row.get(6)?,
            servings: row.get(7)?,
            macros,
            source_url: row.get(9)?,
            image_url: row.get(10)?,
            is_favorite: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn grocery_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<GroceryItem> {
        Ok(GroceryItem {
            id: row.get(0)?,
            name: row.get(1)?,
            quantity: row.get(2)?,
            unit: row.get(3)?,
            section: row.get(4)?,
            store: row.get(5)?,
            checked: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn pantry_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<PantryItem> {
        Ok(PantryItem {
            id: row.get(0)?,
            name: row.get(1)?,
            quantity: row.get(2)?,
            unit: row.get(3)?,
            expires_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // --- Users ---

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (name, color, emoji, points_balance, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![user.name, user.color, user.emoji, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        find_user(&self.conn, id)?.context("User not found")
    }

    pub fn find_user(&self, id: i64) -> Result<Option<User>> {
        Ok(find_user(&self.conn, id)?)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id"
        ))?;
        let users = stmt
            .query_map([], Self::user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Returns the ids from `ids` that have no user row.
    pub fn missing_user_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let mut missing = Vec::new();
        for &id in ids {
            if find_user(&self.conn, id)?.is_none() && !missing.contains(&id) {
                missing.push(id);
            }
        }
        Ok(missing)
    }

    // --- Chores ---

    pub fn create_chore(&self, chore: &NewChore) -> Result<ChoreDetail> {
        let id = self.transaction(|tx| -> Result<i64> {
            let now = Local::now().to_rfc3339();
            tx.execute(
                "INSERT INTO chores (name, description, points, is_claimable, is_recurring, days_of_week, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    chore.name,
                    chore.description,
                    chore.points,
                    chore.is_claimable,
                    chore.is_recurring,
                    to_json(&chore.days_of_week)?,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            replace_assignments(tx, id, &chore.assigned_user_ids)?;
            Ok(id)
        })?;
        self.get_chore_detail(id)?
            .context("Chore not found after insert")
    }

    pub fn get_chore(&self, id: i64) -> Result<Option<Chore>> {
        Ok(find_chore(&self.conn, id)?)
    }

    /// Chore with its assignments and every completion on record.
    pub fn get_chore_detail(&self, id: i64) -> Result<Option<ChoreDetail>> {
        let Some(chore) = find_chore(&self.conn, id)? else {
            return Ok(None);
        };
        let assignments = self.get_assignments(id)?;
        let completions = self.get_completions(id, None)?;
        Ok(Some(ChoreDetail {
            chore,
            assignments,
            completions,
        }))
    }

    /// All chores, oldest first, each with the completions dated inside
    /// `start..=end`.
    pub fn list_chores_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ChoreDetail>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHORE_COLUMNS} FROM chores ORDER BY created_at, id"
        ))?;
        let chores = stmt
            .query_map([], Self::chore_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut details = Vec::with_capacity(chores.len());
        for chore in chores {
            let assignments = self.get_assignments(chore.id)?;
            let completions = self.get_completions(chore.id, Some((start, end)))?;
            details.push(ChoreDetail {
                chore,
                assignments,
                completions,
            });
        }
        Ok(details)
    }

    pub fn get_assignments(&self, chore_id: i64) -> Result<Vec<ChoreAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.chore_id, a.user_id,
                    u.id, u.name, u.color, u.emoji, u.points_balance, u.created_at
             FROM chore_assignments a
             JOIN users u ON u.id = a.user_id
             WHERE a.chore_id = ?1
             ORDER BY a.id",
        )?;
        let assignments = stmt
            .query_map(params![chore_id], Self::assignment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assignments)
    }

    pub fn get_completions(
        &self,
        chore_id: i64,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<ChoreCompletion>> {
        let (start, end) = match range {
            Some((s, e)) => (Some(format_day(s)), Some(format_day(e))),
            None => (None, None),
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM chore_completions
             WHERE chore_id = ?1
               AND (?2 IS NULL OR completion_date >= ?2)
               AND (?3 IS NULL OR completion_date <= ?3)
             ORDER BY completion_date, id"
        ))?;
        let completions = stmt
            .query_map(params![chore_id, start, end], Self::completion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(completions)
    }

    pub fn find_completion(
        &self,
        chore_id: i64,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<ChoreCompletion>> {
        Ok(find_completion(
            &self.conn,
            chore_id,
            user_id,
            &format_day(date),
        )?)
    }

    /// Applies the present fields of `update`. When `assigned_user_ids` is
    /// set the assignment rows are replaced in the same transaction.
    pub fn update_chore(&self, id: i64, update: &UpdateChore) -> Result<Option<ChoreDetail>> {
        let found = self.transaction(|tx| -> Result<bool> {
            if find_chore(tx, id)?.is_none() {
                return Ok(false);
            }
            if let Some(name) = &update.name {
                tx.execute(
                    "UPDATE chores SET name = ?1 WHERE id = ?2",
                    params![name, id],
                )?;
            }
            if let Some(description) = &update.description {
                tx.execute(
                    "UPDATE chores SET description = ?1 WHERE id = ?2",
                    params![description, id],
                )?;
            }
            if let Some(points) = update.points {
                tx.execute(
                    "UPDATE chores SET points = ?1 WHERE id = ?2",
                    params![points, id],
                )?;
            }
            if let Some(is_claimable) = update.is_claimable {
                tx.execute(
                    "UPDATE chores SET is_claimable = ?1 WHERE id = ?2",
                    params![is_claimable, id],
                )?;
            }
            if let Some(is_recurring) = update.is_recurring {
                tx.execute(
                    "UPDATE chores SET is_recurring = ?1 WHERE id = ?2",
                    params![is_recurring, id],
                )?;
            }
            if let Some(days) = &update.days_of_week {
                tx.execute(
                    "UPDATE chores SET days_of_week = ?1 WHERE id = ?2",
                    params![to_json(days)?, id],
                )?;
            }
            if let Some(user_ids) = &update.assigned_user_ids {
                replace_assignments(tx, id, user_ids)?;
            }
            Ok(true)
        })?;

        if !found {
            return Ok(None);
        }
        self.get_chore_detail(id)
    }

    pub fn delete_chore(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM chores WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let now = Local::now().to_rfc3339();
        let macros = recipe.macros.as_ref().map(to_json).transpose()?;
        self.conn.execute(
            "INSERT INTO recipes (name, description, ingredients, steps, prep_time, cook_time, servings, macros, source_url, image_url, is_favorite, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11)",
            params![
                recipe.name,
                recipe.description,
                to_json(&recipe.ingredients)?,
                to_json(&recipe.steps)?,
                recipe.prep_time,
                recipe.cook_time,
                recipe.servings,
                macros,
                recipe.source_url,
                recipe.image_url,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe(id)?
            .context("Recipe not found after insert")
    }

    pub fn get_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    /// Newest first. `search` matches name or description, case-insensitively.
    pub fn list_recipes(&self, favorites_only: bool, search: Option<&str>) -> Result<Vec<Recipe>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes
             WHERE (?1 = 0 OR is_favorite = 1)
               AND (?2 IS NULL OR name LIKE ?2 ESCAPE '\\' OR description LIKE ?2 ESCAPE '\\')
             ORDER BY created_at DESC, id DESC"
        ))?;
        let recipes = stmt
            .query_map(params![favorites_only, pattern], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    #[allow(clippy::too_many_lines)]
    pub fn update_recipe(&self, id: i64, update: &UpdateRecipe) -> Result<Option<Recipe>> {
        let found = self.transaction(|tx| -> Result<bool> {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM recipes WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(false);
            }
            if let Some(name) = &update.name {
                tx.execute(
                    "UPDATE recipes SET name = ?1 WHERE id = ?2",
                    params![name, id],
                )?;
            }
            if let Some(description) = &update.description {
                tx.execute(
                    "UPDATE recipes SET description = ?1 WHERE id = ?2",
                    params![description, id],
                )?;
            }
            if let Some(ingredients) = &update.ingredients {
                tx.execute(
                    "UPDATE recipes SET ingredients = ?1 WHERE id = ?2",
                    params![to_json(ingredients)?, id],
                )?;
            }
            if let Some(steps) = &update.steps {
                tx.execute(
                    "UPDATE recipes SET steps = ?1 WHERE id = ?2",
                    params![to_json(steps)?, id],
                )?;
            }
            if let Some(prep_time) = update.prep_time {
                tx.execute(
                    "UPDATE recipes SET prep_time = ?1 WHERE id = ?2",
                    params![prep_time, id],
                )?;
            }
            if let Some(cook_time) = update.cook_time {
                tx.execute(
                    "UPDATE recipes SET cook_time = ?1 WHERE id = ?2",
                    params![cook_time, id],
                )?;
            }
            if let Some(servings) = update.servings {
                tx.execute(
                    "UPDATE recipes SET servings = ?1 WHERE id = ?2",
                    params![servings, id],
                )?;
            }
            if let Some(macros) = &update.macros {
                let encoded = macros.as_ref().map(to_json).transpose()?;
                tx.execute(
                    "UPDATE recipes SET macros = ?1 WHERE id = ?2",
                    params![encoded, id],
                )?;
            }
            if let Some(source_url) = &update.source_url {
                tx.execute(
                    "UPDATE recipes SET source_url = ?1 WHERE id = ?2",
                    params![source_url, id],
                )?;
            }
            if let Some(image_url) = &update.image_url {
                tx.execute(
                    "UPDATE recipes SET image_url = ?1 WHERE id = ?2",
                    params![image_url, id],
                )?;
            }
            if let Some(is_favorite) = update.is_favorite {
                tx.execute(
                    "UPDATE recipes SET is_favorite = ?1 WHERE id = ?2",
                    params![is_favorite, id],
                )?;
            }
            Ok(true)
        })?;

        if !found {
            return Ok(None);
        }
        self.get_recipe(id)
    }

    pub fn delete_recipe(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Meal plans ---

    /// Inserts or replaces the recipe in the (date, meal type) slot.
    pub fn upsert_meal_plan(&self, plan: &NewMealPlan) -> Result<MealPlan> {
        let date = format_day(plan.date);
        self.conn.execute(
            "INSERT INTO meal_plans (date, meal_type, recipe_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(date, meal_type) DO UPDATE SET recipe_id = excluded.recipe_id",
            params![date, plan.meal_type, plan.recipe_id],
        )?;
        let (id, recipe_id): (i64, i64) = self.conn.query_row(
            "SELECT id, recipe_id FROM meal_plans WHERE date = ?1 AND meal_type = ?2",
            params![date, plan.meal_type],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(MealPlan {
            id,
            date,
            meal_type: plan.meal_type.clone(),
            recipe_id,
            recipe: self.get_recipe(recipe_id)?,
        })
    }

    /// Plans ordered by date then meal type; both bounds are inclusive and optional.
    pub fn list_meal_plans(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<MealPlan>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, date, meal_type, recipe_id FROM meal_plans
             WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2)
             ORDER BY date, meal_type",
        )?;
        let rows = stmt
            .query_map(
                params![start.map(format_day), end.map(format_day)],
                |row| {
                    Ok(MealPlan {
                        id: row.get(0)?,
                        date: row.get(1)?,
                        meal_type: row.get(2)?,
                        recipe_id: row.get(3)?,
                        recipe: None,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut recipes: HashMap<i64, Option<Recipe>> = HashMap::new();
        let mut plans = Vec::with_capacity(rows.len());
        for mut plan in rows {
            if !recipes.contains_key(&plan.recipe_id) {
                let recipe = self.get_recipe(plan.recipe_id)?;
                recipes.insert(plan.recipe_id, recipe);
            }
            plan.recipe = recipes.get(&plan.recipe_id).cloned().flatten();
            plans.push(plan);
        }
        Ok(plans)
    }

    pub fn delete_meal_plan(&self, date: NaiveDate, meal_type: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM meal_plans WHERE date = ?1 AND meal_type = ?2",
            params![format_day(date), meal_type],
        )?;
        Ok(rows > 0)
    }

    // --- Grocery ---

    pub fn create_grocery_item(&self, item: &NewGroceryItem) -> Result<GroceryItem> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO grocery_items (name, quantity, unit, section, store, checked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                item.name,
                item.quantity,
                item.unit,
                item.section,
                item.store,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_grocery_item(id)?
            .context("Grocery item not found after insert")
    }

    pub fn get_grocery_item(&self, id: i64) -> Result<Option<GroceryItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {GROCERY_COLUMNS} FROM grocery_items WHERE id = ?1"),
                params![id],
                Self::grocery_item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    /// Unchecked first, then by section and name.
    pub fn list_grocery_items(&self) -> Result<Vec<GroceryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {GROCERY_COLUMNS} FROM grocery_items ORDER BY checked, section, name"
        ))?;
        let items = stmt
            .query_map([], Self::grocery_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn update_grocery_item(
        &self,
        id: i64,
        update: &UpdateGroceryItem,
    ) -> Result<Option<GroceryItem>> {
        if self.get_grocery_item(id)?.is_none() {
            return Ok(None);
        }
        self.transaction(|tx| -> Result<()> {
            if let Some(name) = &update.name {
                tx.execute(
                    "UPDATE grocery_items SET name = ?1 WHERE id = ?2",
                    params![name, id],
                )?;
            }
            if let Some(quantity) = update.quantity {
                tx.execute(
                    "UPDATE grocery_items SET quantity = ?1 WHERE id = ?2",
                    params![quantity, id],
                )?;
            }
            if let Some(unit) = &update.unit {
                tx.execute(
                    "UPDATE grocery_items SET unit = ?1 WHERE id = ?2",
                    params![unit, id],
                )?;
            }
            if let Some(section) = &update.section {
                tx.execute(
                    "UPDATE grocery_items SET section = ?1 WHERE id = ?2",
                    params![section, id],
                )?;
            }
            if let Some(store) = &update.store {
                tx.execute(
                    "UPDATE grocery_items SET store = ?1 WHERE id = ?2",
                    params![store, id],
                )?;
            }
            if let Some(checked) = update.checked {
                tx.execute(
                    "UPDATE grocery_items SET checked = ?1 WHERE id = ?2",
                    params![checked, id],
                )?;
            }
            Ok(())
        })?;
        self.get_grocery_item(id)
    }

    pub fn delete_grocery_item(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM grocery_items WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Deletes checked items, or every item when `checked_only` is false.
    pub fn clear_grocery_items(&self, checked_only: bool) -> Result<usize> {
        let rows = if checked_only {
            self.conn
                .execute("DELETE FROM grocery_items WHERE checked = 1", [])?
        } else {
            self.conn.execute("DELETE FROM grocery_items", [])?
        };
        Ok(rows)
    }

    // --- Pantry ---

    pub fn create_pantry_item(&self, item: &NewPantryItem) -> Result<PantryItem> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO pantry_items (name, quantity, unit, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.name,
                item.quantity,
                item.unit,
                item.expires_at.map(format_day),
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_pantry_item(id)?
            .context("Pantry item not found after insert")
    }

    pub fn get_pantry_item(&self, id: i64) -> Result<Option<PantryItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {PANTRY_COLUMNS} FROM pantry_items WHERE id = ?1"),
                params![id],
                Self::pantry_item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    /// Soonest expiry first; items without an expiry date sort last.
    pub fn list_pantry_items(&self) -> Result<Vec<PantryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PANTRY_COLUMNS} FROM pantry_items
             ORDER BY expires_at IS NULL, expires_at, name"
        ))?;
        let items = stmt
            .query_map([], Self::pantry_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn update_pantry_item(
        &self,
        id: i64,
        update: &UpdatePantryItem,
    ) -> Result<Option<PantryItem>> {
        if self.get_pantry_item(id)?.is_none() {
            return Ok(None);
        }
        self.transaction(|tx| -> Result<()> {
            if let Some(name) = &update.name {
                tx.execute(
                    "UPDATE pantry_items SET name = ?1 WHERE id = ?2",
                    params![name, id],
                )?;
            }
            if let Some(quantity) = update.quantity {
                tx.execute(
                    "UPDATE pantry_items SET quantity = ?1 WHERE id = ?2",
                    params![quantity, id],
                )?;
            }
            if let Some(unit) = &update.unit {
                tx.execute(
                    "UPDATE pantry_items SET unit = ?1 WHERE id = ?2",
                    params![unit, id],
                )?;
            }
            if let Some(expires_at) = update.expires_at {
                tx.execute(
                    "UPDATE pantry_items SET expires_at = ?1 WHERE id = ?2",
                    params![expires_at.map(format_day), id],
                )?;
            }
            Ok(())
        })?;
        self.get_pantry_item(id)
    }

    pub fn delete_pantry_item(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM pantry_items WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Sessions ---

    pub fn create_session(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (token, created_at, expires_at) VALUES (?1, ?2, ?3)",
            params![token, format_instant(Utc::now()), format_instant(expires_at)],
        )?;
        Ok(())
    }

    pub fn session_is_active(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        let active: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE token = ?1 AND expires_at > ?2)",
            params![token, format_instant(now)],
            |row| row.get(0),
        )?;
        Ok(active)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![format_instant(now)],
        )?;
        Ok(rows)
    }
}

// --- Connection-level helpers shared with transactional callers ---

pub(crate) fn find_user(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        Database::user_from_row,
    )
    .optional()
}

pub(crate) fn find_chore(conn: &Connection, id: i64) -> rusqlite::Result<Option<Chore>> {
    conn.query_row(
        &format!("SELECT {CHORE_COLUMNS} FROM chores WHERE id = ?1"),
        params![id],
        Database::chore_from_row,
    )
    .optional()
}

pub(crate) fn assigned_user_ids(conn: &Connection, chore_id: i64) -> rusqlite::Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM chore_assignments WHERE chore_id = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map(params![chore_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Deletes every assignment of `chore_id`, then inserts one row per id.
pub(crate) fn replace_assignments(
    conn: &Connection,
    chore_id: i64,
    user_ids: &[i64],
) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM chore_assignments WHERE chore_id = ?1",
        params![chore_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO chore_assignments (chore_id, user_id) VALUES (?1, ?2)",
    )?;
    for user_id in user_ids {
        stmt.execute(params![chore_id, user_id])?;
    }
    Ok(())
}

pub(crate) fn find_completion(
    conn: &Connection,
    chore_id: i64,
    user_id: i64,
    date: &str,
) -> rusqlite::Result<Option<ChoreCompletion>> {
    conn.query_row(
        &format!(
            "SELECT {COMPLETION_COLUMNS} FROM chore_completions
             WHERE chore_id = ?1 AND user_id = ?2 AND completion_date = ?3"
        ),
        params![chore_id, user_id, date],
        Database::completion_from_row,
    )
    .optional()
}

pub(crate) fn insert_completion(
    conn: &Connection,
    chore_id: i64,
    user_id: i64,
    date: &str,
    points: i64,
) -> rusqlite::Result<ChoreCompletion> {
    let now = Local::now().to_rfc3339();
    conn.execute(
        "INSERT INTO chore_completions (chore_id, user_id, completion_date, points_earned, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![chore_id, user_id, date, points, now],
    )?;
    Ok(ChoreCompletion {
        id: conn.last_insert_rowid(),
        chore_id,
        user_id,
        completion_date: date.to_string(),
        points_earned: points,
        completed_at: now,
    })
}

pub(crate) fn delete_completion(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM chore_completions WHERE id = ?1", params![id])?;
    Ok(())
}

/// Adds `delta` to the user's balance. Returns `false` and writes nothing
/// when the result would not fit in an `i64`; SQLite would otherwise store
/// it as REAL.
pub(crate) fn adjust_points(
    conn: &Connection,
    user_id: i64,
    delta: i64,
) -> rusqlite::Result<bool> {
    let balance: Option<i64> = conn
        .query_row(
            "SELECT points_balance FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(balance) = balance else {
        return Ok(true);
    };
    let Some(next) = balance.checked_add(delta) else {
        return Ok(false);
    };
    conn.execute(
        "UPDATE users SET points_balance = ?1 WHERE id = ?2",
        params![next, user_id],
    )?;
    Ok(true)
}

// --- Encoding ---

pub(crate) fn format_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn escape_like(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("failed to encode JSON column")
}

fn conversion_error(idx: usize, err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}
