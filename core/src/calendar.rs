use chrono::{Datelike, Duration, NaiveDate};

pub const POINTS_PER_DOLLAR: i64 = 10;

/// The Sunday on or before `date`.
#[must_use]
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// Sunday through Saturday of the week containing `today`, shifted by
/// `offset` whole weeks. `None` when the shifted week leaves the
/// representable calendar.
#[must_use]
pub fn week_dates(today: NaiveDate, offset: i64) -> Option<[NaiveDate; 7]> {
    let sunday = start_of_week(today).checked_add_signed(Duration::try_weeks(offset)?)?;
    let mut days = [sunday; 7];
    for (i, day) in (0_i64..).zip(days.iter_mut()) {
        *day = sunday.checked_add_signed(Duration::days(i))?;
    }
    Some(days)
}

/// First and last day of the week `offset` weeks from `today`.
#[must_use]
pub fn week_range(today: NaiveDate, offset: i64) -> Option<(NaiveDate, NaiveDate)> {
    let days = week_dates(today, offset)?;
    Some((days[0], days[6]))
}

/// Whether a chore scheduled on `days_of_week` (Sunday = 0) falls on `date`.
#[must_use]
pub fn occurs_on(days_of_week: &[u8], date: NaiveDate) -> bool {
    let weekday = date.weekday().num_days_from_sunday() as u8;
    days_of_week.contains(&weekday)
}

#[must_use]
pub fn greeting(hour: u32) -> &'static str {
    match hour {
        0..12 => "Good Morning",
        12..17 => "Good Afternoon",
        _ => "Good Evening",
    }
}

/// Whole dollars earned from a points balance.
#[must_use]
pub fn calculate_earnings(points: i64) -> String {
    format!("${}.00", points.max(0) / POINTS_PER_DOLLAR)
}

#[must_use]
pub fn section_emoji(section: &str) -> &'static str {
    match section {
        "Produce" => "🥬",
        "Meat" => "🥩",
        "Dairy" => "🧀",
        "Bakery" => "🍞",
        "Frozen" => "🧊",
        "Canned" => "🥫",
        "Pantry" => "🫙",
        _ => "📦",
    }
}
