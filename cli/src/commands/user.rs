use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use hearth_core::calendar::calculate_earnings;
use hearth_core::db::Database;
use hearth_core::models::{NewUser, non_blank};

pub(crate) fn cmd_user_list(db: &Database, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct UserRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Color")]
        color: String,
        #[tabled(rename = "Points")]
        points: i64,
        #[tabled(rename = "Earned")]
        earned: String,
    }

    let users = db.list_users()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    if users.is_empty() {
        println!("No users yet. Add one with: hearthboard user add <NAME> --color <COLOR>");
        return Ok(());
    }

    let rows: Vec<UserRow> = users
        .iter()
        .map(|u| UserRow {
            id: u.id,
            name: match &u.emoji {
                Some(emoji) => format!("{emoji} {}", u.name),
                None => u.name.clone(),
            },
            color: u.color.clone(),
            points: u.points_balance,
            earned: calculate_earnings(u.points_balance),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_user_add(
    db: &Database,
    name: &str,
    color: &str,
    emoji: Option<String>,
    json: bool,
) -> Result<()> {
    let (Some(name), Some(color)) = (
        non_blank(Some(name.to_string())),
        non_blank(Some(color.to_string())),
    ) else {
        bail!("Name and color are required");
    };

    let user = db.create_user(&NewUser {
        name,
        color,
        emoji: non_blank(emoji),
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("Added {} (id {})", user.name, user.id);
    }
    Ok(())
}
