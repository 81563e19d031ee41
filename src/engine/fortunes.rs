use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::FortuneEngine;
use crate::error::{FortuneError, Result};
use crate::lock::{ReadGuard, ReadWriteLock, WriteGuard};

/// the byte sequence that terminates every fortune in the backing file
pub const DELIMITER: &str = "\n%\n";

/// The storage a [`RecordStore`] persists its fortunes to.
///
/// Writes always go to the end of the storage. [`File`] opened in append mode is the real
/// backing; anything else is useful for exercising failures.
pub trait Backing: Read + Write + fmt::Debug + Send + Sync + 'static {
    /// forces everything written so far onto durable storage
    fn sync(&mut self) -> io::Result<()>;

    /// cuts the storage down to its first `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Backing for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Knobs for opening a [`RecordStore`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// seed for the random generator used to pick fortunes, taken from OS entropy if `None`
    pub seed: Option<u64>,
    /// upper bound on how long `read`/`write` wait for the lock, unbounded if `None`
    pub lock_timeout: Option<Duration>,
}

/// The fortune database.
///
/// It keeps every fortune in memory, in the order they were written, and mirrors them into an
/// append-only backing file where each fortune is followed by [`DELIMITER`]. All access goes
/// through a [`ReadWriteLock`], so any number of `read`s run in parallel while a `write` runs
/// alone.
///
/// `RecordStore` is a cheap handle: clones share the same database.
#[derive(Debug)]
pub struct RecordStore<B: Backing = File> {
    shared: Arc<Shared<B>>,
}

impl<B: Backing> Clone for RecordStore<B> {
    fn clone(&self) -> Self {
        RecordStore {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[derive(Debug)]
struct Shared<B: Backing> {
    // path of the backing file
    path: PathBuf,
    db: ReadWriteLock<Database<B>>,
    // picks fortunes, locked only for the duration of one pick
    rng: Mutex<StdRng>,
    lock_timeout: Option<Duration>,
}

/// the state guarded by the lock: the fortunes plus the file they are persisted to
#[derive(Debug)]
struct Database<B> {
    records: Vec<String>,
    backing: B,
    // length of the backing file in bytes, always the end of the last complete record
    len: u64,
    // a failed append left bytes past `len` that could not be cut off yet
    torn: bool,
}

impl RecordStore {
    /// Opens the store backed by the file at `path` with default [`StoreOptions`].
    pub fn open(path: impl Into<PathBuf>) -> Result<RecordStore> {
        RecordStore::open_with(path, StoreOptions::default())
    }

    /// Opens the store backed by the file at `path`, loading every fortune it holds.
    ///
    /// A missing file (and its parent directories) is created. A trailing fragment that is not
    /// terminated by [`DELIMITER`], left behind by an interrupted write, is discarded and cut
    /// from the file.
    ///
    /// # Errors
    /// returns [`FortuneError::Io`] if the backing file cannot be created, read or repaired
    pub fn open_with(path: impl Into<PathBuf>, options: StoreOptions) -> Result<RecordStore> {
        let path = path.into();
        debug!("opening fortune database at {:?}", &path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        RecordStore::with_backing(path, file, options)
    }
}

impl<B: Backing> RecordStore<B> {
    /// Loads a store from an already opened `backing`, positioned at its start. `path` only
    /// names the backing in logs and errors.
    ///
    /// Loading works the same as [`RecordStore::open_with`].
    pub fn with_backing(
        path: impl Into<PathBuf>,
        mut backing: B,
        options: StoreOptions,
    ) -> Result<RecordStore<B>> {
        let path = path.into();
        let mut contents = Vec::new();
        backing.read_to_end(&mut contents)?;
        let (records, consumed) = parse_records(&contents);

        if consumed < contents.len() {
            warn!(
                discarded_bytes = contents.len() - consumed,
                "ignoring incomplete trailing fortune in {:?}", &path
            );
            backing.truncate(consumed as u64)?;
        }
        info!(records = records.len(), "loaded fortune database from {:?}", &path);

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(RecordStore {
            shared: Arc::new(Shared {
                path,
                db: ReadWriteLock::new(Database {
                    records,
                    backing,
                    len: consumed as u64,
                    torn: false,
                }),
                rng: Mutex::new(rng),
                lock_timeout: options.lock_timeout,
            }),
        })
    }

    /// path of the backing file
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// number of fortunes currently stored
    pub fn len(&self) -> Result<usize> {
        Ok(self.shared.read_lock()?.records.len())
    }

    /// true if no fortunes are stored
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// returns a copy of all fortunes, in the order they were written
    pub fn records(&self) -> Result<Vec<String>> {
        Ok(self.shared.read_lock()?.records.clone())
    }
}

impl<B: Backing> FortuneEngine for RecordStore<B> {
    /// picks one fortune uniformly at random while holding the lock in read mode
    fn read(&self) -> Result<String> {
        let db = self.shared.read_lock()?;
        if db.records.is_empty() {
            return Err(FortuneError::EmptyStore);
        }
        let idx = self
            .shared
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..db.records.len());
        Ok(db.records[idx].clone())
    }

    /// Appends `fortune` to memory and to the backing file while holding the lock in write mode.
    /// The file is flushed and synced before the lock is released.
    ///
    /// # Errors
    /// returns [`FortuneError::InvalidArguments`] if the fortune would not load back as a single
    /// fortune, and [`FortuneError::Persistence`] if the append failed. On a failed append the
    /// fortune is removed from memory again.
    fn write(&self, fortune: String) -> Result<()> {
        check_fortune(&fortune)?;
        let entry = format!("{}{}", fortune, DELIMITER);

        let mut db = self.shared.write_lock()?;
        db.records.push(fortune);
        if let Err(source) = db.append(entry.as_bytes()) {
            db.records.pop();
            return Err(FortuneError::Persistence {
                path: self.shared.path.clone(),
                source,
            });
        }
        debug!(records = db.records.len(), bytes = db.len, "fortune written");
        Ok(())
    }
}

impl<B: Backing> Shared<B> {
    fn read_lock(&self) -> Result<ReadGuard<'_, Database<B>>> {
        match self.lock_timeout {
            Some(timeout) => self
                .db
                .try_acquire_read_for(timeout)
                .ok_or(FortuneError::LockTimeout(timeout)),
            None => Ok(self.db.acquire_read()),
        }
    }

    fn write_lock(&self) -> Result<WriteGuard<'_, Database<B>>> {
        match self.lock_timeout {
            Some(timeout) => self
                .db
                .try_acquire_write_for(timeout)
                .ok_or(FortuneError::LockTimeout(timeout)),
            None => Ok(self.db.acquire_write()),
        }
    }
}

impl<B: Backing> Database<B> {
    /// Appends `entry` to the backing file and syncs it. On failure the file is cut back to its
    /// previous length so a partial entry never precedes the next one. If that cut fails too, it
    /// is retried before the next append, and that append fails if the retry does.
    fn append(&mut self, entry: &[u8]) -> io::Result<()> {
        if self.torn {
            self.backing.truncate(self.len)?;
            self.torn = false;
            info!(bytes = self.len, "cut partial fortune from backing file");
        }

        let result = self
            .backing
            .write_all(entry)
            .and_then(|_| self.backing.flush())
            .and_then(|_| self.backing.sync());
        match result {
            Ok(()) => {
                self.len += entry.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(trunc_err) = self.backing.truncate(self.len) {
                    warn!("could not truncate backing file after failed append: {}", trunc_err);
                    self.torn = true;
                }
                Err(e)
            }
        }
    }
}

/// Splits the backing file `contents` into fortunes.
///
/// Returns the fortunes along with the number of bytes they occupy, which is the offset right
/// after the last [`DELIMITER`]. Anything past that offset is an incomplete fortune, and may end
/// in the middle of a UTF-8 sequence.
fn parse_records(contents: &[u8]) -> (Vec<String>, usize) {
    let delimiter = DELIMITER.as_bytes();
    let mut records = Vec::new();
    let mut consumed = 0;
    while let Some(end) = contents[consumed..]
        .windows(delimiter.len())
        .position(|window| window == delimiter)
    {
        let record = &contents[consumed..consumed + end];
        let index = records.len();
        records.push(String::from_utf8(record.to_vec()).unwrap_or_else(|e| {
            warn!(record = index, "fortune is not valid UTF-8: {}", e);
            String::from_utf8_lossy(record).into_owned()
        }));
        consumed += end + delimiter.len();
    }
    (records, consumed)
}

/// a fortune that contains the delimiter, or ends with its first two bytes, would be split
/// differently when the file is loaded again
fn check_fortune(fortune: &str) -> Result<()> {
    if fortune.contains(DELIMITER) || fortune.ends_with(&DELIMITER[..2]) {
        return Err(FortuneError::InvalidArguments(format!(
            "a fortune may not contain {:?} or end with {:?}",
            DELIMITER,
            &DELIMITER[..2]
        )));
    }
    Ok(())
}
