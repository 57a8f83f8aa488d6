use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::utils::time::{date_to_day_name, day_name_to_date};

use super::entities::ObservationEntity;

/// Interface for abstracting storage of assigned observations. Observations land
/// in a file per UTC day to keep reads for a date range cheap.
pub trait ObservationLog {
    type DayFile: DayFileHandle;

    /// Opens or creates the day file observations for `date` get appended to.
    fn open_day(&self, date: NaiveDate) -> impl Future<Output = Result<Self::DayFile>>;

    /// Retrieves every observation stored for `date`.
    fn read_day(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<ObservationEntity>>> + Send;

    /// Replaces the whole day with `observations`. Used when rules change and the
    /// stored assignments have to be recomputed.
    fn replace_day(
        &self,
        date: NaiveDate,
        observations: Vec<ObservationEntity>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Lists every day with stored observations, oldest first.
    fn days(&self) -> impl Future<Output = Result<Vec<NaiveDate>>> + Send;
}

impl<T: Deref> ObservationLog for T
where
    T::Target: ObservationLog,
{
    type DayFile = <T::Target as ObservationLog>::DayFile;

    fn open_day(&self, date: NaiveDate) -> impl Future<Output = Result<Self::DayFile>> {
        self.deref().open_day(date)
    }

    fn read_day(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<ObservationEntity>>> + Send {
        self.deref().read_day(date)
    }

    fn replace_day(
        &self,
        date: NaiveDate,
        observations: Vec<ObservationEntity>,
    ) -> impl Future<Output = Result<()>> + Send {
        self.deref().replace_day(date, observations)
    }

    fn days(&self) -> impl Future<Output = Result<Vec<NaiveDate>>> + Send {
        self.deref().days()
    }
}

pub trait DayFileHandle {
    fn append(
        &mut self,
        observations: Vec<ObservationEntity>,
    ) -> impl Future<Output = Result<()>>;

    fn date(&self) -> NaiveDate;

    fn flush(&mut self) -> impl Future<Output = Result<()>>;
}

/// The main realization of [ObservationLog].
pub struct ObservationLogImpl {
    observation_dir: PathBuf,
}

impl ObservationLogImpl {
    pub fn new(observation_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&observation_dir)?;

        Ok(Self { observation_dir })
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.observation_dir.join(date_to_day_name(date))
    }

    async fn read_all_inner(&self, path: &Path) -> Result<Vec<ObservationEntity>> {
        async fn extract(path: &Path) -> Result<Vec<ObservationEntity>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut observations = vec![];
            while let Ok(Some(v)) = lines.next_line().await {
                match serde_json::from_str::<ObservationEntity>(&v) {
                    Ok(v) => observations.push(v),
                    Err(e) => {
                        // ignore illegal values. Might happen after shutdowns
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &v
                        )
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(observations)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }
}

impl ObservationLog for ObservationLogImpl {
    type DayFile = ObservationDayFile;

    async fn open_day(&self, date: NaiveDate) -> Result<Self::DayFile> {
        let file = File::options()
            .append(true)
            .create(true)
            .open(self.day_path(date))
            .await?;

        Ok(ObservationDayFile { file, date })
    }

    async fn read_day(&self, date: NaiveDate) -> Result<Vec<ObservationEntity>> {
        self.read_all_inner(&self.day_path(date)).await
    }

    async fn replace_day(
        &self,
        date: NaiveDate,
        observations: Vec<ObservationEntity>,
    ) -> Result<()> {
        let mut buffer = Vec::<u8>::new();
        for observation in &observations {
            serde_json::to_writer(&mut buffer, observation)?;
            buffer.push(b'\n');
        }

        // A rename makes the swap atomic, readers see either the old or the new day.
        let path = self.day_path(date);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, buffer).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn days(&self) -> Result<Vec<NaiveDate>> {
        let mut entries = tokio::fs::read_dir(&self.observation_dir).await?;
        let mut days = vec![];
        while let Some(entry) = entries.next_entry().await? {
            if let Some(date) = entry
                .file_name()
                .to_str()
                .and_then(day_name_to_date)
            {
                days.push(date);
            }
        }
        days.sort_unstable();
        Ok(days)
    }
}

pub struct ObservationDayFile {
    file: File,
    date: NaiveDate,
}

impl DayFileHandle for ObservationDayFile {
    async fn append(&mut self, observations: Vec<ObservationEntity>) -> Result<()> {
        let mut buffer = Vec::<u8>::new();
        for observation in observations {
            serde_json::to_writer(&mut buffer, &observation)?;
            buffer.push(b'\n');
        }

        // Semi-safe acquire-release for a file
        self.file.lock_exclusive()?;
        let result = async {
            self.file.write_all(&buffer).await?;
            self.file.flush().await?;
            Ok(())
        }
        .await;
        self.file.unlock_async().await?;
        result
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush().await?)
    }
}
