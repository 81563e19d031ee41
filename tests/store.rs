use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_utils::thread::scope;
use fortune::{Backing, FortuneEngine, FortuneError, RecordStore, StoreOptions, DELIMITER};
use tempfile::TempDir;

// writes `contents` to a fresh database file inside `dir`
fn db_file(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("fortune.db");
    fs::write(&path, contents).unwrap();
    path
}

fn file_contents(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

/// a backing file whose appends and truncations can be made to fail on demand
#[derive(Debug)]
struct FlakyDisk {
    file: File,
    fail_writes: Arc<AtomicBool>,
    fail_truncates: Arc<AtomicBool>,
}

impl Read for FlakyDisk {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FlakyDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            // half of the entry reaches the disk before it fills up
            self.file.write_all(&buf[..buf.len() / 2])?;
            return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Backing for FlakyDisk {
    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        if self.fail_truncates.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "read-only file system"));
        }
        self.file.set_len(len)
    }
}

/// opens the database at `path` on a [`FlakyDisk`], returning the switches for writes and truncations
fn flaky_store(path: &Path) -> (RecordStore<FlakyDisk>, Arc<AtomicBool>, Arc<AtomicBool>) {
    let fail_writes = Arc::new(AtomicBool::new(false));
    let fail_truncates = Arc::new(AtomicBool::new(false));
    let disk = FlakyDisk {
        file: OpenOptions::new().read(true).append(true).open(path).unwrap(),
        fail_writes: Arc::clone(&fail_writes),
        fail_truncates: Arc::clone(&fail_truncates),
    };
    let store = RecordStore::with_backing(path, disk, StoreOptions::default()).unwrap();
    (store, fail_writes, fail_truncates)
}

#[test]
fn load_read_and_write() {
    let dir = TempDir::new().unwrap();
    let path = db_file(&dir, "A\n%\nB\n%\n");
    let store = RecordStore::open(&path).unwrap();
    assert_eq!(store.records().unwrap(), vec!["A", "B"]);

    store.write("C".to_owned()).unwrap();
    assert_eq!(file_contents(&path), "A\n%\nB\n%\nC\n%\n");
    assert_eq!(store.records().unwrap(), vec!["A", "B", "C"]);

    let fortune = store.read().unwrap();
    assert!(["A", "B", "C"].contains(&fortune.as_str()));
}

#[test]
fn missing_file_is_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dbs").join("fortune.db");
    let store = RecordStore::open(&path).unwrap();

    assert!(path.exists());
    assert!(store.is_empty().unwrap());
    assert_eq!(store.path(), path.as_path());
}

#[test]
fn empty_store_until_first_write() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(db_file(&dir, "")).unwrap();

    assert!(matches!(store.read(), Err(FortuneError::EmptyStore)));

    store.write("the only fortune".to_owned()).unwrap();
    for _ in 0..20 {
        assert_eq!(store.read().unwrap(), "the only fortune");
    }
}

#[test]
fn incomplete_trailing_fortune_is_dropped() {
    let dir = TempDir::new().unwrap();
    let path = db_file(&dir, "A\n%\nhalf writ");
    let store = RecordStore::open(&path).unwrap();

    assert_eq!(store.records().unwrap(), vec!["A"]);
    // the fragment is cut off, so the next fortune starts on a clean boundary
    assert_eq!(file_contents(&path), "A\n%\n");
    store.write("B".to_owned()).unwrap();
    assert_eq!(file_contents(&path), "A\n%\nB\n%\n");
}

#[test]
fn fragment_cut_inside_a_character_is_dropped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fortune.db");
    // the write of "café" stopped between the two bytes of the 'é'
    fs::write(&path, b"A\n%\ncaf\xC3").unwrap();

    let store = RecordStore::open(&path).unwrap();
    assert_eq!(store.records().unwrap(), vec!["A"]);
    assert_eq!(fs::read(&path).unwrap(), b"A\n%\n");

    store.write("café".to_owned()).unwrap();
    assert_eq!(
        RecordStore::open(&path).unwrap().records().unwrap(),
        vec!["A", "café"]
    );
}

#[test]
fn failed_append_is_rolled_back() {
    let dir = TempDir::new().unwrap();
    let path = db_file(&dir, "A\n%\n");
    let (store, fail_writes, _) = flaky_store(&path);

    fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(
        store.write("B".to_owned()),
        Err(FortuneError::Persistence { .. })
    ));
    assert_eq!(store.records().unwrap(), vec!["A"]);
    assert_eq!(fs::metadata(&path).unwrap().len(), 4);
    assert_eq!(file_contents(&path), "A\n%\n");

    fail_writes.store(false, Ordering::SeqCst);
    store.write("C".to_owned()).unwrap();
    assert_eq!(store.records().unwrap(), vec!["A", "C"]);
    assert_eq!(
        RecordStore::open(&path).unwrap().records().unwrap(),
        vec!["A", "C"]
    );
}

#[test]
fn partial_append_is_cut_before_the_next_write() {
    let dir = TempDir::new().unwrap();
    let path = db_file(&dir, "A\n%\n");
    let (store, fail_writes, fail_truncates) = flaky_store(&path);

    // the append fails halfway and the rollback fails too
    fail_writes.store(true, Ordering::SeqCst);
    fail_truncates.store(true, Ordering::SeqCst);
    assert!(store.write("B".to_owned()).is_err());
    assert_eq!(file_contents(&path), "A\n%\nB\n");
    assert_eq!(store.records().unwrap(), vec!["A"]);

    // no write goes through while the partial fortune cannot be removed
    fail_writes.store(false, Ordering::SeqCst);
    assert!(matches!(
        store.write("C".to_owned()),
        Err(FortuneError::Persistence { .. })
    ));
    assert_eq!(file_contents(&path), "A\n%\nB\n");
    assert_eq!(store.records().unwrap(), vec!["A"]);

    fail_truncates.store(false, Ordering::SeqCst);
    store.write("D".to_owned()).unwrap();
    assert_eq!(file_contents(&path), "A\n%\nD\n%\n");
    assert_eq!(
        RecordStore::open(&path).unwrap().records().unwrap(),
        vec!["A", "D"]
    );
}

#[test]
fn file_without_any_delimiter_loads_empty() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(db_file(&dir, "no delimiter here\n")).unwrap();
    assert!(store.is_empty().unwrap());
}

#[test]
fn reload_keeps_written_fortunes_in_order() {
    let dir = TempDir::new().unwrap();
    let path = db_file(&dir, "first\n%\nsecond\n%\n");
    let written = vec![
        "one".to_owned(),
        "two\nlines".to_owned(),
        String::new(),
        "100%".to_owned(),
        "%\nstarts with a percent line".to_owned(),
    ];

    {
        let store = RecordStore::open(&path).unwrap();
        for fortune in &written {
            store.write(fortune.clone()).unwrap();
        }
    }

    let reopened = RecordStore::open(&path).unwrap();
    let mut expected = vec!["first".to_owned(), "second".to_owned()];
    expected.extend(written);
    assert_eq!(reopened.records().unwrap(), expected);
}

#[test]
fn fortunes_that_break_the_file_format_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = db_file(&dir, "A\n%\n");
    let store = RecordStore::open(&path).unwrap();

    let with_delimiter = format!("one{}two", DELIMITER);
    assert!(matches!(
        store.write(with_delimiter),
        Err(FortuneError::InvalidArguments(_))
    ));
    assert!(matches!(
        store.write("ends with\n%".to_owned()),
        Err(FortuneError::InvalidArguments(_))
    ));

    assert_eq!(store.records().unwrap(), vec!["A"]);
    assert_eq!(file_contents(&path), "A\n%\n");
}

#[test]
fn written_fortune_is_eventually_read() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(db_file(&dir, "A\n%\nB\n%\nC\n%\n")).unwrap();
    store.write("needle".to_owned()).unwrap();

    let found = (0..1000).any(|_| store.read().unwrap() == "needle");
    assert!(found, "a freshly written fortune was never picked");
}

#[test]
fn same_seed_picks_same_fortunes() {
    let dir = TempDir::new().unwrap();
    let path = db_file(&dir, "a\n%\nb\n%\nc\n%\nd\n%\ne\n%\n");
    let options = StoreOptions {
        seed: Some(7),
        ..StoreOptions::default()
    };

    let picks = |store: RecordStore| -> Vec<String> {
        (0..32).map(|_| store.read().unwrap()).collect()
    };
    let first = picks(RecordStore::open_with(&path, options.clone()).unwrap());
    let second = picks(RecordStore::open_with(&path, options).unwrap());

    assert_eq!(first, second);
    // uniform selection over five fortunes hits more than one of them
    let distinct: HashSet<_> = first.iter().collect();
    assert!(distinct.len() > 1);
}

#[test]
fn concurrent_reads_and_writes_stay_consistent() {
    const WRITERS: usize = 4;
    const WRITES: usize = 25;
    let dir = TempDir::new().unwrap();
    let path = db_file(&dir, "seed 1\n%\nseed 2\n%\n");
    let store = RecordStore::open(&path).unwrap();

    let mut possible: HashSet<String> = ["seed 1", "seed 2"].iter().map(|s| s.to_string()).collect();
    for w in 0..WRITERS {
        for i in 0..WRITES {
            possible.insert(format!("writer {} fortune {}", w, i));
        }
    }

    scope(|s| {
        for w in 0..WRITERS {
            let store = store.clone();
            s.spawn(move |_| {
                for i in 0..WRITES {
                    store.write(format!("writer {} fortune {}", w, i)).unwrap();
                }
            });
        }
        for _ in 0..4 {
            let store = store.clone();
            let possible = &possible;
            s.spawn(move |_| {
                let mut last_len = 0;
                for _ in 0..200 {
                    let fortune = store.read().unwrap();
                    assert!(possible.contains(&fortune), "read a torn fortune: {:?}", fortune);
                    let len = store.len().unwrap();
                    assert!(len >= last_len, "store shrank");
                    last_len = len;
                }
            });
        }
    })
    .unwrap();

    let total = 2 + WRITERS * WRITES;
    assert_eq!(store.len().unwrap(), total);

    // every write landed in the file exactly once, none interleaved with another
    let reloaded = RecordStore::open(&path).unwrap().records().unwrap();
    assert_eq!(reloaded.len(), total);
    assert_eq!(reloaded.iter().collect::<HashSet<_>>().len(), total);
    assert_eq!(reloaded, store.records().unwrap());
}
