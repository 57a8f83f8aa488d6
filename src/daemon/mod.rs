use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use collection::{
    collector::SignalCollectionModule,
    source::{SignalSource, SpoolSource},
};
use processing::{assigner::AssigningSaver, ProcessingModule};
use storage::{
    observation_event::ObservationEvent, observation_log::ObservationLogImpl,
    rule_store::RuleStore,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::utils::clock::{Clock, SystemClock};

pub mod args;
pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;

/// Scanners flush their spools on their own schedules, polling more often than
/// this just spins on an empty file.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub const SIGNAL_DIR: &str = "signals";
pub const OBSERVATION_DIR: &str = "observations";

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let (sender, receiver) = mpsc::channel::<ObservationEvent>(10);
    let source = SpoolSource::new(dir.join(SIGNAL_DIR))?;

    let shutdown_token = CancellationToken::new();

    let collector = create_collector(
        sender,
        Box::new(source),
        &shutdown_token,
        DEFAULT_POLL_INTERVAL,
        SystemClock,
    );

    let processor = create_processor(&dir, receiver, SystemClock)?;

    let (_, collection_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        collector.run(),
        processor.run(),
    );

    if let Err(collection_result) = collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

fn create_collector(
    sender: mpsc::Sender<ObservationEvent>,
    source: Box<dyn SignalSource>,
    shutdown_token: &CancellationToken,
    poll_interval: Duration,
    clock: impl Clock,
) -> SignalCollectionModule {
    SignalCollectionModule::new(
        sender,
        source,
        shutdown_token.clone(),
        poll_interval,
        Box::new(clock),
    )
}

fn create_processor(
    dir: &Path,
    receiver: mpsc::Receiver<ObservationEvent>,
    clock: impl Clock,
) -> Result<ProcessingModule<AssigningSaver<ObservationLogImpl>>> {
    let log = ObservationLogImpl::new(dir.join(OBSERVATION_DIR))?;
    let rules = RuleStore::open(dir)?;
    let saver = AssigningSaver::new(log, rules, Box::new(clock));
    Ok(ProcessingModule::new(receiver, saver))
}
