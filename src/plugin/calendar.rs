use time::{Date, Month, OffsetDateTime};

use crate::plugin::prelude::*;

pub struct Calendar;

struct MonthHandler;

#[async_trait]
impl Handler for MonthHandler {
    async fn call(
        &self,
        message: &Message,
        args: &Bindings,
        _cancel: &CancelToken,
    ) -> Result<(), Error> {
        // The requirement regexes guarantee numeric values here.
        let (month, year) = match (args.get("month"), args.get("year")) {
            (Some(month), Some(year)) => (
                month.parse::<u8>().unwrap_or(0),
                year.parse::<i32>().unwrap_or(0),
            ),
            _ => {
                let today = OffsetDateTime::now_utc().date();
                (today.month() as u8, today.year())
            }
        };

        match render(month, year) {
            Some(lines) => {
                for line in lines {
                    message.say(&line);
                }
            }
            None => message.say(&format!("no such month: {month} {year}")),
        }

        Ok(())
    }
}

impl Plugin for Calendar {
    fn new() -> Calendar {
        Calendar {}
    }

    fn name() -> Name {
        Name("calendar")
    }

    fn author() -> Author {
        Author("Hermod contributors")
    }

    fn version() -> Version {
        Version("0.1")
    }

    fn register(&self, router: &Router) -> Result<(), Error> {
        router.map(
            "calendar",
            "cal :month :year",
            MapOptions::new()
                .require("month", r"^\d{1,2}$")
                .require("year", r"^\d{1,4}$"),
            Arc::new(MonthHandler),
        )?;
        router.map("calendar", "cal", MapOptions::new(), Arc::new(MonthHandler))?;

        Ok(())
    }
}

/// Renders a month as a list of output lines, or `None` when the month or
/// year is out of range.
fn render(month: u8, year: i32) -> Option<Vec<String>> {
    let month = Month::try_from(month).ok()?;
    let first = Date::from_calendar_date(year, month, 1).ok()?;
    let days = month.length(year);

    let mut lines = vec![format!("{month} {year}"), "Mo Tu We Th Fr Sa Su".to_string()];

    let mut week = vec!["  ".to_string(); first.weekday().number_days_from_monday() as usize];

    for day in 1..=days {
        week.push(format!("{day:2}"));

        if week.len() == 7 {
            lines.push(week.join(" "));
            week.clear();
        }
    }

    if !week.is_empty() {
        lines.push(week.join(" "));
    }

    Some(lines)
}
