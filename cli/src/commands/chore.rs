use anyhow::{Context, Result};
use chrono::Local;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use hearth_core::calendar::week_range;
use hearth_core::db::Database;
use hearth_core::ledger;

use super::helpers::{format_days, parse_date, truncate};

pub(crate) fn cmd_chore_list(db: &Database, week: i64, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct ChoreRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Chore")]
        name: String,
        #[tabled(rename = "Pts")]
        points: i64,
        #[tabled(rename = "Days")]
        days: String,
        #[tabled(rename = "Who")]
        who: String,
        #[tabled(rename = "Done")]
        done: usize,
    }

    let (start, end) = week_range(Local::now().date_naive(), week)
        .with_context(|| format!("Week offset {week} is out of range"))?;
    let chores = db.list_chores_for_range(start, end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chores)?);
        return Ok(());
    }

    println!(
        "Week of {} to {}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    );
    if chores.is_empty() {
        println!("No chores yet.");
        return Ok(());
    }

    let rows: Vec<ChoreRow> = chores
        .iter()
        .map(|c| ChoreRow {
            id: c.chore.id,
            name: truncate(&c.chore.name, 30),
            points: c.chore.points,
            days: format_days(&c.chore.days_of_week),
            who: if c.chore.is_claimable {
                "anyone".to_string()
            } else if c.assignments.is_empty() {
                "-".to_string()
            } else {
                c.assignments
                    .iter()
                    .map(|a| a.user.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            },
            done: c.completions.len(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .with(Modify::new(Columns::single(5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_chore_complete(
    db: &Database,
    chore_id: i64,
    user_id: i64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let done = ledger::complete_chore(db, chore_id, user_id, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&done.completion)?);
    } else if done.created {
        let user = db.get_user(user_id)?;
        println!(
            "Chore {chore_id} done by {} on {} (+{} pts, balance {})",
            user.name,
            done.completion.completion_date,
            done.completion.points_earned,
            user.points_balance
        );
    } else {
        println!(
            "Chore {chore_id} was already completed on {}",
            done.completion.completion_date
        );
    }
    Ok(())
}

pub(crate) fn cmd_chore_undo(
    db: &Database,
    chore_id: i64,
    user_id: i64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let removed = ledger::uncomplete_chore(db, chore_id, user_id, date)?;

    if json {
        println!("{}", serde_json::json!({ "success": true, "removed": removed }));
    } else {
        println!(
            "Undid chore {chore_id} on {} (-{} pts)",
            removed.completion_date, removed.points_earned
        );
    }
    Ok(())
}
