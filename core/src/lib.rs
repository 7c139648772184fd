pub mod auth;
pub mod calendar;
pub mod db;
pub mod grocery;
pub mod ledger;
pub mod models;
pub mod recipe_import;
pub mod weather;
