//! Trace files on disk.
//!
//! Every unit gets its own `tx_unit{n}.csv`: two header lines with the global parameters and the unit's
//! id ranges, a blank line, then one record per line (`0, entity, ap` for activations, `1, entity` for
//! deactivations, `2, entity, ap` for handovers). `tx_params.csv` and `metadata.json` describe the run.

use std::fs::File;
use std::io::{
    self,
    BufWriter,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};
use std::time::SystemTime;

use anyhow::Result;
use chrono::{
    DateTime,
    Utc,
};
use itertools::Itertools;
use serde_json::json;
use tracing::{
    debug,
    instrument,
};

use crate::config::TraceConfig;
use crate::sink::{
    TraceHeader,
    TraceSink,
    TxRecord,
};
use crate::stats::TraceStats;
use crate::topology::UnitId;

/// Writes each unit's stream to its own writer in the CSV layout above.
pub struct CsvSink<W: Write> {
    /// One writer per unit, indexed by unit id.
    writers: Vec<W>,
}

impl<W: Write> CsvSink<W> {
    /// Wrap one writer per unit; the count is checked against the header in `begin`.
    pub const fn new(writers: Vec<W>) -> Self {
        Self { writers }
    }

    /// Hand back the writers, e.g. to inspect in-memory output.
    pub fn into_writers(self) -> Vec<W> {
        self.writers
    }
}

impl CsvSink<BufWriter<File>> {
    /// Create `tx_unit{n}.csv` for every unit under `dir`.
    pub fn create(dir: &Path, unit_total: usize) -> io::Result<Self> {
        let writers = (0..unit_total)
            .map(|unit| File::create(dir.join(format!("tx_unit{unit}.csv"))).map(BufWriter::new))
            .collect::<io::Result<_>>()?;
        Ok(Self::new(writers))
    }
}

impl<W: Write> TraceSink for CsvSink<W> {
    fn begin(&mut self, header: &TraceHeader) -> io::Result<()> {
        if header.units.len() != self.writers.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("trace has {} units but {} writers were opened", header.units.len(), self.writers.len()),
            ));
        }

        let cfg = &header.config;
        let globals = [
            cfg.entity_total.to_string(),
            cfg.access_point_total.to_string(),
            cfg.p_handovers.to_string(),
            cfg.p_remote.to_string(),
            cfg.p_moving_fraction.to_string(),
        ]
        .iter()
        .join(", ");

        for (writer, unit) in self.writers.iter_mut().zip(&header.units) {
            writeln!(writer, "{globals}")?;
            writeln!(
                writer,
                "{}, {}, {}, {}",
                unit.entities.start,
                unit.entities.end - 1,
                unit.access_points.start,
                unit.access_points.end - 1
            )?;
            writeln!(writer)?;
        }
        Ok(())
    }

    fn append(&mut self, unit: UnitId, record: &TxRecord) -> io::Result<()> {
        let writer = &mut self.writers[unit];
        match *record {
            TxRecord::Activate { entity, access_point } | TxRecord::Handover { entity, access_point, .. } => {
                writeln!(writer, "{}, {entity}, {access_point}", record.tag())
            },
            TxRecord::Deactivate { entity } => writeln!(writer, "{}, {entity}", record.tag()),
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writers.iter_mut().try_for_each(Write::flush)
    }
}

/// Write the one-line parameter summary `tx_params.csv`.
#[instrument(skip(config))]
pub fn write_params(output_dir: &Path, config: &TraceConfig) -> Result<PathBuf> {
    let path = output_dir.join("tx_params.csv");
    let mut file = File::create(&path)?;
    writeln!(
        file,
        "{}, {}, {}, {}, {}, {}",
        config.entity_total,
        config.access_point_total,
        config.p_handovers,
        config.p_remote,
        config.p_moving_fraction,
        config.tx_total
    )?;
    Ok(path)
}

/// Create a timestamped output directory under `base_dir`.
#[instrument]
pub fn create_timestamped_output_dir(base_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(base_dir)?;

    let now: DateTime<Utc> = SystemTime::now().into();
    let timestamp = now.to_rfc3339().replace([':', '.'], "-"); // make filesystem-friendly
    let output_dir = base_dir.join(timestamp);
    std::fs::create_dir_all(&output_dir)?;

    Ok(output_dir)
}

/// Record what was run and what came out of it, so a trace can be regenerated from its seed.
#[instrument(skip(config, stats))]
pub fn write_metadata(output_dir: &Path, config: &TraceConfig, stats: &TraceStats) -> Result<PathBuf> {
    let now: DateTime<Utc> = SystemTime::now().into();
    let metadata = json!({
        "timestamp": now.to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "command_args": std::env::args().collect::<Vec<_>>(),
        "config": config,
        "stats": stats,
        "handover_ratio": stats.handover_ratio(),
        "remote_ratio": stats.remote_ratio(),
    });

    let metadata_path = output_dir.join("metadata.json");
    let mut file = File::create(&metadata_path)?;
    file.write_all(serde_json::to_string_pretty(&metadata)?.as_bytes())?;

    debug!("metadata written to: {}", metadata_path.display());
    Ok(metadata_path)
}

#[cfg(test)]
mod tests;
