use std::{collections::HashMap, fmt::Display, future, sync::Arc};

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use futures::{pin_mut, stream, Stream, StreamExt};
use now::DateTimeNow;
use tracing::error;

use crate::{
    assign::rules::ProjectId,
    daemon::{
        collection::source::SignalEvent,
        storage::{
            entities::ObservationEntity,
            observation_log::{ObservationLog, ObservationLogImpl},
            rule_store::RuleStore,
        },
        OBSERVATION_DIR,
    },
    utils::{
        dir::create_application_default_path,
        percentage::{count_percentage, Percentage},
        time::next_day_start,
    },
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option allows to extract the whole day"
    )]
    treat_as_days: bool,
    #[arg(short = 'p', long = "percentage", help = "Filter projects to have at least specified percentage of observations", default_value_t = Percentage::new_opt(1.).unwrap())]
    min_percentage: Percentage,
}

const DEFAULT_REPORT_DAYS: i64 = 7;

/// Command to process `report`. Prints per project shares of attributed activity
/// between `start_date` and `end_date`.
pub async fn process_report_command(
    ReportCommand {
        start_date,
        end_date,
        date_style,
        treat_as_days,
        min_percentage,
    }: ReportCommand,
) -> Result<()> {
    let (start, end) = match parse_range(start_date, end_date, date_style, treat_as_days) {
        Ok(value) => value,
        Err(value) => return Err(value),
    };

    let application_path = create_application_default_path()?;
    let log = ObservationLogImpl::new(application_path.join(OBSERVATION_DIR))?;
    let book = RuleStore::open(&application_path)?.load()?;

    let results = observations_between(
        log,
        ExtractConfig {
            start: start.into(),
            end: end.into(),
        },
    );

    let (totals, total) = summarize(results).await?;

    let mut rows = totals.into_iter().collect::<Vec<_>>();
    rows.sort_by(|a, b| b.1.observations.cmp(&a.1.observations));

    println!(
        "{} observations between {} and {}",
        total,
        start.format("%x %H:%M:%S"),
        end.format("%x %H:%M:%S")
    );
    for (project, activity) in rows {
        let share = count_percentage(activity.observations, total);
        if share < min_percentage {
            continue;
        }
        let name = match project {
            Some(id) => Colour::Cyan.paint(book.project_name(id)).to_string(),
            None => Style::new().dimmed().paint("unassigned").to_string(),
        };
        println!(
            "{}%\t{}\t{}\t{} domains, {} events, {} repositories",
            *share as i32,
            activity.observations,
            name,
            activity.domains,
            activity.events,
            activity.repositories,
        );
    }
    Ok(())
}

/// Also provides sensible defaults for `report`: the trailing week up to now.
fn parse_range(
    start_date: Option<String>,
    end_date: Option<String>,
    date_style: DateStyle,
    treat_as_days: bool,
) -> Result<(DateTime<Local>, DateTime<Local>)> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = date_style.into();
    let mut start = match start_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate start date {e}"),
                )
                .into());
        }
        None => now - Duration::days(DEFAULT_REPORT_DAYS),
    };
    let mut end = match end_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate end date {e}"),
                )
                .into());
        }
        None => now,
    };
    if treat_as_days {
        start = start.beginning_of_day();
        end = next_day_start(end);
    }

    Ok((start, end))
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExtractConfig {
    fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// Extracts stored [ObservationEntity] values between 2 dates. To do it in an
/// efficient manner streams are used.
pub fn observations_between(
    log: impl ObservationLog,
    config: ExtractConfig,
) -> impl Stream<Item = Result<ObservationEntity>> {
    let log = Arc::new(log);

    let date_iteration = date_range(config.start.date_naive(), config.end.date_naive());

    let files = date_iteration
        .map(move |day| {
            let log = log.clone();
            async move { (day, log.read_day(day).await) }
        })
        .buffered(4);

    files
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed(),
            Err(e) => {
                error!("Failed to process file {day} {e}");
                stream::once(future::ready(Err(e))).boxed()
            }
        })
        .filter(move |v| {
            future::ready(match v {
                Ok(observation) => config.contains(observation.timestamp),
                Err(_) => true,
            })
        })
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold((start, end), |(mut current, end)| {
        future::ready({
            if current <= end {
                let last_current = current;
                current = current.succ_opt().expect("End of time should never happen");
                Some((last_current, (current, end)))
            } else {
                None
            }
        })
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProjectActivity {
    pub observations: u64,
    pub domains: u64,
    pub events: u64,
    pub repositories: u64,
}

/// Folds an observation stream into per project counters plus the grand total.
pub async fn summarize(
    results: impl Stream<Item = Result<ObservationEntity>>,
) -> Result<(HashMap<Option<ProjectId>, ProjectActivity>, u64)> {
    pin_mut!(results);

    let mut totals = HashMap::<Option<ProjectId>, ProjectActivity>::new();
    let mut total = 0u64;
    while let Some(observation) = results.next().await {
        let observation = observation?;
        total += 1;
        let entry = totals.entry(observation.project).or_default();
        entry.observations += 1;
        match observation.signal {
            SignalEvent::DomainVisit { .. } => entry.domains += 1,
            SignalEvent::CalendarEvent { .. } => entry.events += 1,
            SignalEvent::RepositoryActivity { .. } => entry.repositories += 1,
        }
    }
    Ok((totals, total))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        assign::rules::ProjectId,
        daemon::{
            collection::source::SignalEvent,
            storage::{
                entities::ObservationEntity,
                observation_log::{DayFileHandle, ObservationLog, ObservationLogImpl},
            },
        },
    };

    use super::{observations_between, summarize, ExtractConfig};

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

    fn observation(project: Option<u64>, hour: u32) -> ObservationEntity {
        ObservationEntity {
            signal: SignalEvent::DomainVisit {
                domain: "github.com".into(),
            },
            timestamp: TEST_DATE.and_hms_opt(hour, 0, 0).unwrap().and_utc(),
            project: project.map(ProjectId),
            matched_pattern: None,
        }
    }

    #[tokio::test]
    async fn test_summarize_groups_by_project() -> Result<()> {
        let results = tokio_stream::iter(vec![
            Ok(observation(Some(1), 9)),
            Ok(observation(Some(1), 10)),
            Ok(observation(None, 11)),
        ]);

        let (totals, total) = summarize(results).await?;
        assert_eq!(total, 3);
        assert_eq!(totals[&Some(ProjectId(1))].observations, 2);
        assert_eq!(totals[&Some(ProjectId(1))].domains, 2);
        assert_eq!(totals[&None].observations, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_observations_between_respects_the_range() -> Result<()> {
        let dir = tempdir()?;
        let log = ObservationLogImpl::new(dir.path().to_owned())?;

        let mut day = log.open_day(TEST_DATE).await?;
        day.append(vec![
            observation(Some(1), 8),
            observation(Some(1), 12),
            observation(Some(1), 20),
        ])
        .await?;

        let extracted = observations_between(
            log,
            ExtractConfig {
                start: Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2018, 7, 4, 15, 0, 0).unwrap(),
            },
        );
        let (_, total) = summarize(extracted).await?;
        assert_eq!(total, 1);
        Ok(())
    }
}
