use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;

use xlab_iv::config::{EngineConfig, TimestampFormat};
use xlab_iv::data::timestamp::{format_timestamp, parse_timestamp};
use xlab_iv::processing::{ObservableSource, CELL_PARAMETERS, ELAPSED_TIME};
use xlab_iv::worker::{spawn_series_request, WorkerEvent};

const USAGE: &str = "usage: xlab-iv <start YYYY-MM-DD[_HH_MM_SS]> <file>...";

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(start_arg) = args.next() else {
        bail!(USAGE);
    };
    let paths: Vec<PathBuf> = args.map(PathBuf::from).collect();
    if paths.is_empty() {
        bail!(USAGE);
    }

    let config = match std::env::var_os("XLAB_CONFIG") {
        Some(path) => EngineConfig::load(path.as_ref())?,
        None => EngineConfig::default(),
    };
    let start_time = parse_start(&start_arg, &config.timestamp)?;
    log::info!(
        "{} file(s), campaign start {}",
        paths.len(),
        format_timestamp(start_time)
    );

    let rx = spawn_series_request(paths, start_time, config, |series| {
        let mut wanted = vec![ELAPSED_TIME];
        wanted.extend_from_slice(CELL_PARAMETERS);
        let excluded = series.validate_observables(&wanted)?;
        for exclusion in &excluded {
            eprintln!("excluded {}: {}", exclusion.label, exclusion.reason);
        }

        let labels = series.labels().into_iter().map(str::to_string).collect::<Vec<_>>();
        let elapsed = series.get_elapsed_hours()?;
        let mut lines = Vec::with_capacity(labels.len() + 1);
        lines.push(format!("label\telapsed_hrs\t{}", CELL_PARAMETERS.join("\t")));

        let mut columns = Vec::with_capacity(CELL_PARAMETERS.len());
        for name in CELL_PARAMETERS {
            let values = series.get_data(name)?;
            let values = values
                .as_series()
                .with_context(|| format!("'{name}' is not a scalar observable"))?
                .to_vec();
            columns.push(values);
        }
        for (row, label) in labels.iter().enumerate() {
            let cells: Vec<String> = columns.iter().map(|c| format!("{:.6e}", c[row])).collect();
            lines.push(format!("{label}\t{:.3}\t{}", elapsed[row], cells.join("\t")));
        }
        Ok(lines)
    });

    for event in rx {
        match event {
            WorkerEvent::Progress(pct) => log::info!("loaded {pct}%"),
            WorkerEvent::Finished(Ok(lines)) => {
                for line in lines {
                    println!("{line}");
                }
            }
            WorkerEvent::Finished(Err(message)) => bail!(message),
        }
    }
    Ok(())
}

/// Accepts a bare date (midnight) or a full timestamp.
fn parse_start(text: &str, format: &TimestampFormat) -> Result<NaiveDateTime> {
    let midnight = TimestampFormat {
        default_time: (0, 0, 0),
        ..format.clone()
    };
    parse_timestamp(text, &midnight)
        .with_context(|| format!("'{text}' is not a start date; {USAGE}"))
}
