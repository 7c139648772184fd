//! Chore completion and the points ledger.
//!
//! A completion is keyed by (chore, user, date). Creating one credits the
//! chore's current point value to the user's balance; removing one debits the
//! value stored on the completion row. Both happen in a single transaction.

use chrono::NaiveDate;
use tracing::info;

use crate::db::{self, Database, format_day};
use crate::models::ChoreCompletion;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Chore not found")]
    ChoreNotFound,
    #[error("User not found")]
    UserNotFound,
    #[error("User is not assigned to this chore")]
    NotAssigned,
    #[error("Completion not found")]
    CompletionNotFound,
    #[error("Points balance out of range")]
    BalanceOutOfRange,
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// Outcome of [`complete_chore`]. `created` is false when the completion
/// already existed and nothing was written.
#[derive(Debug, Clone)]
pub struct Completed {
    pub completion: ChoreCompletion,
    pub created: bool,
}

/// Claimable chores can be completed by anyone; otherwise the user must be
/// assigned. A non-claimable chore with no assignees can't be completed.
#[must_use]
pub fn can_complete(assignments: &[i64], user_id: i64, is_claimable: bool) -> bool {
    is_claimable || assignments.contains(&user_id)
}

pub fn complete_chore(
    db: &Database,
    chore_id: i64,
    user_id: i64,
    date: NaiveDate,
) -> Result<Completed, LedgerError> {
    let day = format_day(date);
    let outcome = db.transaction(|tx| -> Result<Completed, LedgerError> {
        let chore = db::find_chore(tx, chore_id)?.ok_or(LedgerError::ChoreNotFound)?;
        let assignments = db::assigned_user_ids(tx, chore_id)?;
        if !can_complete(&assignments, user_id, chore.is_claimable) {
            return Err(LedgerError::NotAssigned);
        }
        if db::find_user(tx, user_id)?.is_none() {
            return Err(LedgerError::UserNotFound);
        }

        if let Some(existing) = db::find_completion(tx, chore_id, user_id, &day)? {
            return Ok(Completed {
                completion: existing,
                created: false,
            });
        }

        let completion = db::insert_completion(tx, chore_id, user_id, &day, chore.points)?;
        if !db::adjust_points(tx, user_id, chore.points)? {
            return Err(LedgerError::BalanceOutOfRange);
        }
        Ok(Completed {
            completion,
            created: true,
        })
    })?;

    if outcome.created {
        info!(
            chore_id,
            user_id,
            date = %day,
            points = outcome.completion.points_earned,
            "chore completed"
        );
    }
    Ok(outcome)
}

/// Removes the completion and debits its stored `points_earned`.
pub fn uncomplete_chore(
    db: &Database,
    chore_id: i64,
    user_id: i64,
    date: NaiveDate,
) -> Result<ChoreCompletion, LedgerError> {
    let day = format_day(date);
    let removed = db.transaction(|tx| -> Result<ChoreCompletion, LedgerError> {
        let completion = db::find_completion(tx, chore_id, user_id, &day)?
            .ok_or(LedgerError::CompletionNotFound)?;
        db::delete_completion(tx, completion.id)?;
        let debit = completion
            .points_earned
            .checked_neg()
            .ok_or(LedgerError::BalanceOutOfRange)?;
        if !db::adjust_points(tx, user_id, debit)? {
            return Err(LedgerError::BalanceOutOfRange);
        }
        Ok(completion)
    })?;

    info!(
        chore_id,
        user_id,
        date = %day,
        points = removed.points_earned,
        "chore completion undone"
    );
    Ok(removed)
}
