//! Timestamp rendering for chat list and message views.
//!
//! Every helper takes the reference `now` explicitly; its time zone decides
//! which calendar day a message falls on.

#[cfg(test)]
#[path = "format_test.rs"]
mod format_test;

use std::fmt::Display;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Day {
    Today,
    Yesterday,
    Earlier,
}

fn local<Tz: TimeZone>(ts: &DateTime<Utc>, now: &DateTime<Tz>) -> (DateTime<Tz>, Day) {
    let local = ts.with_timezone(&now.timezone());
    let today = now.date_naive();
    let day = match local.date_naive() {
        date if date == today => Day::Today,
        date if Some(date) == today.pred_opt() => Day::Yesterday,
        _ => Day::Earlier,
    };
    (local, day)
}

fn numeric_date(date: NaiveDate) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

/// Preview label: `14:05` today, `Yesterday`, else `3/7/2024`.
#[must_use]
pub fn format_message_time_short<Tz: TimeZone>(ts: &DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    match local(ts, now) {
        (local, Day::Today) => local.format("%H:%M").to_string(),
        (_, Day::Yesterday) => "Yesterday".to_owned(),
        (local, Day::Earlier) => numeric_date(local.date_naive()),
    }
}

/// Day and time for the accessible preview label, e.g.
/// `("Yesterday", "09:30")`.
#[must_use]
pub fn format_message_time_long<Tz: TimeZone>(ts: &DateTime<Utc>, now: &DateTime<Tz>) -> (String, String)
where
    Tz::Offset: Display,
{
    let (local, day) = local(ts, now);
    let time = local.format("%H:%M").to_string();
    let day = match day {
        Day::Today => "Today".to_owned(),
        Day::Yesterday => "Yesterday".to_owned(),
        Day::Earlier => numeric_date(local.date_naive()),
    };
    (day, time)
}

/// Message header timestamp. The screen-readable form spells times as
/// `Today at 3.07 PM` and older dates in full; the compact form uses
/// `3:07 PM` and `12/19/24`. Yesterday is always just `Yesterday`.
#[must_use]
pub fn datetime_format<Tz: TimeZone>(ts: &DateTime<Utc>, now: &DateTime<Tz>, screen_readable: bool) -> String
where
    Tz::Offset: Display,
{
    let (local, day) = local(ts, now);
    match (day, screen_readable) {
        (Day::Today, true) => format!("Today at {}", local.format("%-I.%M %p")),
        (Day::Today, false) => local.format("%-I:%M %p").to_string(),
        (Day::Yesterday, _) => "Yesterday".to_owned(),
        (Day::Earlier, true) => local.format("%A, %B %-d, %Y").to_string(),
        (Day::Earlier, false) => local.format("%-m/%-d/%y").to_string(),
    }
}
