//! Point-in-time copies of the counter array, and where they are persisted.
//!
//! A snapshot is encoded as (all big-endian):
//!
//! | Field | Type |
//! |-------|------|
//! | magic `"BCOV"` | 4 bytes |
//! | format version (1) | `u32` |
//! | slot count *n* | `u32` |
//! | counts | *n* × `u64` |

use error::*;
use insn::Slot;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::cmp::{max, min};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const MAGIC: &[u8; 4] = b"BCOV";
const VERSION: u32 = 1;

//----------------------------------------------------------------------------------------------------------------------
//{{{ Snapshot

/// The counts of every assigned slot at the time of a save.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Snapshot {
    counts: Vec<u64>,
}

impl Snapshot {
    /// Creates a snapshot from the counts of slots `0..counts.len()`.
    pub fn new(counts: Vec<u64>) -> Snapshot {
        Snapshot { counts }
    }

    /// The counts indexed by slot.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Number of slots covered by this snapshot.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The last slot covered by this snapshot.
    pub fn last_slot(&self) -> Option<Slot> {
        match self.counts.len() {
            0 => None,
            n => Some(Slot(n as u32 - 1)),
        }
    }

    /// The count of `slot`. Slots not covered count as zero.
    pub fn count(&self, slot: Slot) -> u64 {
        self.counts.get(usize::from(slot)).cloned().unwrap_or(0)
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Adds the counts of `other` into this snapshot.
    pub fn merge(&mut self, other: &Snapshot) {
        let len = max(self.counts.len(), other.counts.len());
        self.counts.resize(len, 0);
        for (dest, src) in self.counts.iter_mut().zip(&other.counts) {
            *dest = dest.saturating_add(*src);
        }
    }

    /// Encodes the snapshot.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<BigEndian>(VERSION)?;
        writer.write_u32::<BigEndian>(self.counts.len() as u32)?;
        for &count in &self.counts {
            writer.write_u64::<BigEndian>(count)?;
        }
        writer.flush()
    }

    /// Decodes a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BadSnapshot`] if the magic or the version is wrong, or the input is truncated.
    ///
    /// [`BadSnapshot`]: ../error/enum.ErrorKind.html#variant.BadSnapshot
    pub fn read_from<R: Read>(mut reader: R) -> Result<Snapshot> {
        fn truncated(e: io::Error) -> Error {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                ErrorKind::BadSnapshot("truncated").into()
            } else {
                e.into()
            }
        }

        let mut magic = [0; 4];
        reader.read_exact(&mut magic).map_err(truncated)?;
        ensure!(&magic == MAGIC, ErrorKind::BadSnapshot("not a snapshot"));
        let version = reader.read_u32::<BigEndian>().map_err(truncated)?;
        ensure!(version == VERSION, ErrorKind::BadSnapshot("unsupported version"));
        let len = reader.read_u32::<BigEndian>().map_err(truncated)? as usize;

        let mut counts = Vec::with_capacity(min(len, 1 << 16));
        for _ in 0..len {
            counts.push(reader.read_u64::<BigEndian>().map_err(truncated)?);
        }
        Ok(Snapshot { counts })
    }

    /// Reads a snapshot from a file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
        let file = File::open(path)?;
        Snapshot::read_from(BufReader::new(file))
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Sinks

/// A destination of saved snapshots.
pub trait ResultSink: Send {
    /// Persists one snapshot. Called with the save lock held, so never concurrently.
    fn persist(&mut self, snapshot: &Snapshot) -> Result<()>;
}

/// Writes every snapshot to a file.
#[derive(Clone, Debug)]
pub struct FileSink {
    path: PathBuf,
    merge: bool,
}

impl FileSink {
    /// Overwrites `path` with each snapshot.
    pub fn new<P: Into<PathBuf>>(path: P) -> FileSink {
        FileSink {
            path: path.into(),
            merge: false,
        }
    }

    /// Adds each snapshot to the one already stored at `path`, if any.
    pub fn merging<P: Into<PathBuf>>(path: P) -> FileSink {
        FileSink {
            path: path.into(),
            merge: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for FileSink {
    fn persist(&mut self, snapshot: &Snapshot) -> Result<()> {
        let merged;
        let snapshot = if self.merge && self.path.exists() {
            let mut previous = Snapshot::open(&self.path)
                .chain_err(|| format!("cannot read previous results from {}", self.path.display()))?;
            previous.merge(snapshot);
            merged = previous;
            &merged
        } else {
            snapshot
        };
        debug!("writing {} slots to {}", snapshot.len(), self.path.display());
        let file = File::create(&self.path)?;
        snapshot.write_to(BufWriter::new(file))?;
        Ok(())
    }
}

/// Streams every snapshot to a collecting server over a new TCP connection.
#[derive(Clone, Debug)]
pub struct TcpSink {
    address: String,
}

impl TcpSink {
    pub fn new<S: Into<String>>(address: S) -> TcpSink {
        TcpSink { address: address.into() }
    }
}

impl ResultSink for TcpSink {
    fn persist(&mut self, snapshot: &Snapshot) -> Result<()> {
        debug!("sending {} slots to {}", snapshot.len(), self.address);
        let stream = TcpStream::connect(&*self.address)?;
        snapshot.write_to(BufWriter::new(stream))?;
        Ok(())
    }
}

/// Keeps every snapshot in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    saved: Arc<Mutex<Vec<Snapshot>>>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    /// A handle to the saved snapshots, which stays usable after the sink is moved into a collector.
    pub fn handle(&self) -> Arc<Mutex<Vec<Snapshot>>> {
        self.saved.clone()
    }
}

impl ResultSink for MemorySink {
    fn persist(&mut self, snapshot: &Snapshot) -> Result<()> {
        let mut saved = match self.saved.lock() {
            Ok(saved) => saved,
            Err(poisoned) => poisoned.into_inner(),
        };
        saved.push(snapshot.clone());
        Ok(())
    }
}

//}}}
