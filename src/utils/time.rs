use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of naming a day file in whereabouts.
pub fn date_to_day_name(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Inverse of [date_to_day_name]. Files with foreign names are not day files.
pub fn day_name_to_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, DAY_FORMAT).ok()
}

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).unwrap()
}
