//! Snapshot sinks: where keyframes go once the engine hands them over.

use anyhow::{Context, Result};
use gas_common::{OutputFormat, Snapshot};
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::species::SpeciesTable;

/// Consumer of keyframe snapshots.
pub trait SnapshotSink {
    fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<()>;

    /// Flushes anything still buffered. Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<Snapshot>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotSink for MemorySink {
    fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

/// Streams frames as CSV sections: a `!<frame>` line followed by one
/// `species,x,y,vx,vy` row per molecule.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    species_names: Vec<String>,
}

impl CsvSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, species: &SpeciesTable) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create snapshot file '{}'", path.display()))?;
        Ok(Self::new(BufWriter::new(file), species))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W, species: &SpeciesTable) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .terminator(csv::Terminator::CRLF)
            .from_writer(inner);
        let species_names = species.iter().map(|(_, s)| s.name.clone()).collect();
        Self { writer, species_names }
    }

    /// Flushes and hands back the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))
    }

    fn species_name(&self, species: u16) -> &str {
        self.species_names
            .get(species as usize)
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

impl<W: Write> SnapshotSink for CsvSink<W> {
    fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.writer.write_record([format!("!{}", snapshot.frame)])?;
        for m in &snapshot.molecules {
            let name = self.species_name(m.species).to_string();
            self.writer.serialize((name, m.x, m.y, m.vx, m.vy))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects snapshots and writes them all at once in a serde format.
pub struct BufferedSink {
    format: OutputFormat,
    path: PathBuf,
    snapshots: Vec<Snapshot>,
}

impl BufferedSink {
    pub fn new(format: OutputFormat, path: PathBuf) -> Self {
        Self { format, path, snapshots: Vec::new() }
    }
}

impl SnapshotSink for BufferedSink {
    fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create snapshot file '{}'", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        encode_snapshots(self.format, &mut writer, &self.snapshots)?;
        writer.flush()?;
        info!("{} snapshots saved to {}", self.snapshots.len(), self.path.display());
        Ok(())
    }
}

/// Serializes a snapshot list in one of the serde formats.
pub fn encode_snapshots<W: Write>(format: OutputFormat, writer: &mut W, snapshots: &[Snapshot]) -> Result<()> {
    match format {
        OutputFormat::Json => serde_json::to_writer(writer, snapshots)?,
        OutputFormat::Bincode => bincode::serialize_into(writer, snapshots)?,
        OutputFormat::MessagePack => rmp_serde::encode::write(writer, snapshots)?,
        OutputFormat::Csv => anyhow::bail!("CSV snapshots are streamed through CsvSink."),
    }
    Ok(())
}

/// File extension used for each output format.
pub fn extension(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Csv => "csv",
        OutputFormat::Json => "json",
        OutputFormat::Bincode => "bin",
        OutputFormat::MessagePack => "msgpack",
    }
}

/// Opens the file sink for `format` at `<base_filename>.<ext>`.
pub fn open_sink(format: OutputFormat, base_filename: &str, species: &SpeciesTable) -> Result<Box<dyn SnapshotSink>> {
    let path = PathBuf::from(format!("{}.{}", base_filename, extension(format)));
    debug!("Opening {:?} snapshot sink at {}", format, path.display());
    let sink: Box<dyn SnapshotSink> = match format {
        OutputFormat::Csv => Box::new(CsvSink::create(&path, species)?),
        _ => Box::new(BufferedSink::new(format, path)),
    };
    Ok(sink)
}
