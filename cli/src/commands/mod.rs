mod chore;
mod grocery;
mod helpers;
mod pin;
mod user;

pub(crate) use chore::{cmd_chore_complete, cmd_chore_list, cmd_chore_undo};
pub(crate) use grocery::{cmd_grocery_generate, cmd_grocery_list};
pub(crate) use pin::{cmd_pin_hash, cmd_pin_set};
pub(crate) use user::{cmd_user_add, cmd_user_list};
