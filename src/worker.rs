use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use std::thread;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use crate::config::EngineConfig;
use crate::data::loader::load_curves;
use crate::processing::iv::{IvObservable, IvProcessor, IvSettings};
use crate::processing::stability::StabilitySeries;

/// Messages sent from the background worker to the host.
#[derive(Debug)]
pub enum WorkerEvent<T> {
    /// Share of input files loaded so far, 0–100.
    Progress(u8),
    /// Sent exactly once, after the plot function returned.
    Finished(Result<T, String>),
}

/// Load every file, wrap each sweep in a processor and hand the assembled
/// series to `plot`.
///
/// `progress` is called once per file with the rounded share of files done;
/// the last call is always 100.
pub fn run_series_request<T>(
    paths: &[PathBuf],
    start_time: NaiveDateTime,
    config: &EngineConfig,
    mut progress: impl FnMut(u8),
    plot: impl FnOnce(&mut StabilitySeries<IvObservable>) -> Result<T>,
) -> Result<T> {
    let settings = IvSettings::from(config);
    let total = paths.len();
    let mut members = Vec::with_capacity(total);

    for (done, path) in paths.iter().enumerate() {
        let curves = load_curves(path, &config.timestamp)
            .with_context(|| format!("loading {}", path.display()))?;
        log::info!("loaded {} curve(s) from {}", curves.len(), path.display());
        members.extend(
            curves
                .into_iter()
                .map(|curve| IvProcessor::with_settings(curve, settings)),
        );
        progress(percent(done + 1, total));
    }

    let mut series = StabilitySeries::new(members, start_time);
    plot(&mut series)
}

fn percent(done: usize, total: usize) -> u8 {
    ((100 * done) as f64 / total as f64).round() as u8
}

/// Run [`run_series_request`] on a background thread.
///
/// Progress and the final result arrive on the returned channel. A request
/// cannot be cancelled once started; dropping the receiver only discards
/// its events.
pub fn spawn_series_request<T, F>(
    paths: Vec<PathBuf>,
    start_time: NaiveDateTime,
    config: EngineConfig,
    plot: F,
) -> Receiver<WorkerEvent<T>>
where
    T: Send + 'static,
    F: FnOnce(&mut StabilitySeries<IvObservable>) -> Result<T> + Send + 'static,
{
    let (tx, rx) = channel();
    thread::spawn(move || {
        let progress_tx = tx.clone();
        let result = run_series_request(
            &paths,
            start_time,
            &config,
            |pct| {
                progress_tx.send(WorkerEvent::Progress(pct)).ok();
            },
            plot,
        );
        if let Err(e) = &result {
            log::error!("series request failed: {e:#}");
        }
        tx.send(WorkerEvent::Finished(result.map_err(|e| format!("{e:#}"))))
            .ok();
    });
    rx
}
