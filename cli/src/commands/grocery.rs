use anyhow::{Result, bail};

use hearth_core::calendar::section_emoji;
use hearth_core::db::Database;
use hearth_core::grocery::generate_grocery_list;
use hearth_core::models::GroceryItem;

use super::helpers::{format_quantity, parse_date};

/// Items bucketed by section, sections in first-seen order.
fn group_by_section(items: &[GroceryItem]) -> Vec<(&str, Vec<&GroceryItem>)> {
    let mut groups: Vec<(&str, Vec<&GroceryItem>)> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|(s, _)| *s == item.section) {
            Some((_, bucket)) => bucket.push(item),
            None => groups.push((item.section.as_str(), vec![item])),
        }
    }
    groups
}

pub(crate) fn cmd_grocery_list(db: &Database, json: bool) -> Result<()> {
    let items = db.list_grocery_items()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Grocery list is empty.");
        return Ok(());
    }

    for (section, bucket) in group_by_section(&items) {
        println!("{} {section}", section_emoji(section));
        for item in bucket {
            let mark = if item.checked { "x" } else { " " };
            let amount = format_quantity(item.quantity, item.unit.as_deref());
            let store = item
                .store
                .as_deref()
                .map(|s| format!(" @ {s}"))
                .unwrap_or_default();
            if amount.is_empty() {
                println!("  [{mark}] {}{store}", item.name);
            } else {
                println!("  [{mark}] {} ({amount}){store}", item.name);
            }
        }
    }
    Ok(())
}

pub(crate) fn cmd_grocery_generate(
    db: &Database,
    start: String,
    end: String,
    json: bool,
) -> Result<()> {
    let start = parse_date(Some(start))?;
    let end = parse_date(Some(end))?;
    if start > end {
        bail!("Start date must not be after end date");
    }

    let summary = generate_grocery_list(db, start, end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "Added {} item(s) for {} to {}",
        summary.added,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    );
    for item in &summary.items {
        println!("  {} {}", section_emoji(&item.section), item.name);
    }
    if !summary.failed.is_empty() {
        eprintln!("Could not add: {}", summary.failed.join(", "));
    }
    Ok(())
}
