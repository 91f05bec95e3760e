//! Per-database state.
//!
//! A `DB` owns one directory under `<data>/dbs/`: the live database file,
//! the applied LTX files, the advisory lock table, and the HALT lock slots.
//! All mutation of the on-disk state happens while the write lock is held.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::config::StoreOptions;
use crate::context::Context;
use crate::error::Error;
use crate::lock::{DbLocks, GuardSet};
use crate::ltx::{
    self, Decoder, Encoder, FLAG_COMPRESS_LZ4, FLAG_SNAPSHOT, Header, LtxError, page_checksum,
};
use crate::pos::{Pos, Txid};

pub const DATABASE_FILENAME: &str = "database";
const JOURNAL_FILENAME: &str = "journal";
const WAL_FILENAME: &str = "wal";

/// Authority to execute writes, granted with a TTL. Expiry is wall-clock
/// because the TTL is a contract between nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HaltLock {
    pub id: u64,
    pub expires_at: SystemTime,
}

impl HaltLock {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

// A primary-side grant holds the write-lock guards for its lifetime so
// local writes stay blocked until release or expiry.
struct GrantedHaltLock {
    lock: HaltLock,
    _guards: GuardSet,
}

struct DbState {
    pos: Pos,
    page_size: u32,
    halt_lock: Option<GrantedHaltLock>,
    remote_halt_lock: Option<HaltLock>,
}

pub struct DB {
    name: String,
    path: PathBuf,
    options: Arc<StoreOptions>,
    locks: DbLocks,
    state: Mutex<DbState>,
}

impl DB {
    /// Opens a database directory: garbage-collects orphaned temp files and
    /// recovers the position from the newest LTX file.
    pub fn open(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        options: Arc<StoreOptions>,
    ) -> Result<Arc<DB>, Error> {
        let name = name.into();
        let path = path.into();
        fs::create_dir_all(&path)?;

        let db = DB {
            name,
            path,
            options,
            locks: DbLocks::new(),
            state: Mutex::new(DbState {
                pos: Pos::default(),
                page_size: 0,
                halt_lock: None,
                remote_halt_lock: None,
            }),
        };
        db.remove_tmp_files()?;
        db.recover_pos()?;
        Ok(Arc::new(db))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database_path(&self) -> PathBuf {
        self.path.join(DATABASE_FILENAME)
    }

    pub fn ltx_path(&self, min_txid: Txid, max_txid: Txid) -> PathBuf {
        self.path.join(ltx::ltx_filename(min_txid, max_txid))
    }

    pub fn locks(&self) -> &DbLocks {
        &self.locks
    }

    pub fn pos(&self) -> Pos {
        self.state().pos
    }

    pub fn page_size(&self) -> u32 {
        self.state().page_size
    }

    fn state(&self) -> MutexGuard<'_, DbState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    // Partial temp files left by a crash are orphaned; delete them on open.
    fn remove_tmp_files(&self) -> Result<(), Error> {
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if file_name.to_string_lossy().ends_with(".tmp") {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn recover_pos(&self) -> Result<(), Error> {
        let Some((_, _, path)) = self.ltx_files()?.into_iter().max_by_key(|(_, max, _)| *max)
        else {
            return Ok(());
        };

        let decoder = Decoder::new(BufReader::new(File::open(&path)?))?;
        let header = *decoder.header();
        let trailer = decoder.verify()?;

        let mut state = self.state();
        state.pos = Pos::new(header.max_txid, trailer.post_apply_checksum);
        state.page_size = header.page_size;
        Ok(())
    }

    /// Lists applied LTX files as `(min, max, path)`, unsorted.
    pub fn ltx_files(&self) -> Result<Vec<(Txid, Txid, PathBuf)>, Error> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Some((min, max)) = ltx::parse_ltx_filename(&file_name.to_string_lossy()) {
                files.push((min, max, entry.path()));
            }
        }
        Ok(files)
    }

    /// Acquires the write-lock set used by both local and replicated writes.
    pub fn acquire_write_lock(&self, ctx: &Context) -> Result<GuardSet, Error> {
        self.acquire_write_guards(ctx, self.options.begin_timeout)
    }

    // Locks are always taken in pending, reserved, write order so
    // concurrent acquirers cannot deadlock.
    fn acquire_write_guards(&self, ctx: &Context, timeout: Duration) -> Result<GuardSet, Error> {
        let deadline = Instant::now() + timeout;
        let mut guards = Vec::with_capacity(3);
        for lock in [&self.locks.pending, &self.locks.reserved, &self.locks.write] {
            let remaining = deadline.saturating_duration_since(Instant::now());
            guards.push(lock.lock_exclusive(ctx, remaining)?);
        }
        Ok(GuardSet::new(guards))
    }

    /// Applies an LTX file that has already been persisted at `path`. The
    /// caller must hold the write lock.
    pub fn apply_ltx_no_lock(&self, ctx: &Context, path: &Path) -> Result<Pos, Error> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        // Full integrity pass before any page is written.
        let decoder = Decoder::new(BufReader::new(File::open(path)?))?;
        let header = *decoder.header();
        let trailer = decoder.verify()?;

        {
            let state = self.state();
            if !header.is_snapshot() {
                let expected = Pos::new(
                    Txid(header.min_txid.0 - 1),
                    header.pre_apply_checksum,
                );
                if state.pos != expected {
                    return Err(Error::PosMismatch {
                        db: self.name.clone(),
                        pos: state.pos,
                        expected,
                    });
                }
                if state.page_size != 0 && state.page_size != header.page_size {
                    return Err(Error::Ltx(LtxError::PageSizeInvalid {
                        page_size: header.page_size,
                    }));
                }
            }
        }

        self.apply_pages(path, &header)?;

        if self.options.strict_verify {
            let got = ltx::database_checksum(&self.database_path(), header.page_size)?;
            if got != trailer.post_apply_checksum {
                return Err(Error::ChecksumMismatch {
                    db: self.name.clone(),
                    got,
                    want: trailer.post_apply_checksum,
                });
            }
        }

        let pos = Pos::new(header.max_txid, trailer.post_apply_checksum);
        let mut state = self.state();
        state.pos = pos;
        state.page_size = header.page_size;
        Ok(pos)
    }

    fn apply_pages(&self, path: &Path, header: &Header) -> Result<(), Error> {
        let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
        let mut db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.database_path())?;

        // A snapshot replaces the whole database; pages it does not carry
        // must not survive from the previous state.
        if header.is_snapshot() {
            db_file.set_len(0)?;
        }

        let page_size = u64::from(header.page_size);
        let mut buf = Vec::new();
        while let Some(pgno) = decoder.next_page(&mut buf)? {
            db_file.seek(SeekFrom::Start(u64::from(pgno - 1) * page_size))?;
            db_file.write_all(&buf)?;
        }
        decoder.finish()?;

        db_file.set_len(u64::from(header.commit) * page_size)?;
        db_file.sync_all()?;
        Ok(())
    }

    /// Produces the next LTX file from a set of page writes and applies it.
    /// The caller must hold the write lock. `commit` is the size of the
    /// database, in pages, after the transaction.
    pub fn commit_ltx(
        &self,
        ctx: &Context,
        node_id: u64,
        pages: &BTreeMap<u32, Vec<u8>>,
        commit: u32,
    ) -> Result<Pos, Error> {
        let (pos, known_page_size) = {
            let state = self.state();
            (state.pos, state.page_size)
        };

        let page_size = match known_page_size {
            0 => pages
                .values()
                .next()
                .map(|data| data.len() as u32)
                .unwrap_or(ltx::MIN_PAGE_SIZE),
            ps => ps,
        };

        let mut flags = 0;
        if pos.is_zero() {
            flags |= FLAG_SNAPSHOT;
        }
        if self.options.compress {
            flags |= FLAG_COMPRESS_LZ4;
        }

        let header = Header {
            flags,
            page_size,
            commit,
            min_txid: Txid(pos.txid.0 + 1),
            max_txid: Txid(pos.txid.0 + 1),
            timestamp_ms: now_ms(),
            pre_apply_checksum: pos.post_apply_checksum,
            node_id,
        };
        header.validate()?;

        let post = self.next_database_checksum(&pos, page_size, pages, commit)?;

        let path = self.ltx_path(header.min_txid, header.max_txid);
        let tmp_path = tmp_path_for(&path);
        let result = write_ltx_file(&tmp_path, &header, pages, post);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
            result?;
        }
        fs::rename(&tmp_path, &path)?;
        fsync_dir(&self.path)?;

        self.apply_ltx_no_lock(ctx, &path)
    }

    // Incremental checksum: XOR out the checksums of pages being replaced
    // or truncated away, XOR in the replacements.
    fn next_database_checksum(
        &self,
        pos: &Pos,
        page_size: u32,
        pages: &BTreeMap<u32, Vec<u8>>,
        commit: u32,
    ) -> Result<u64, Error> {
        let db_path = self.database_path();
        let old_pages = match fs::metadata(&db_path) {
            Ok(meta) => meta.len() / u64::from(page_size),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
            Err(err) => return Err(err.into()),
        } as u32;

        let mut checksum = pos.post_apply_checksum;
        let mut old_page = |pgno: u32| -> Result<u64, Error> {
            let mut f = File::open(&db_path)?;
            f.seek(SeekFrom::Start(u64::from(pgno - 1) * u64::from(page_size)))?;
            let mut buf = vec![0u8; page_size as usize];
            std::io::Read::read_exact(&mut f, &mut buf)?;
            Ok(page_checksum(pgno, &buf))
        };

        for (&pgno, data) in pages {
            if pgno >= 1 && pgno <= old_pages {
                checksum ^= old_page(pgno)?;
            }
            checksum ^= page_checksum(pgno, data);
        }
        for pgno in commit + 1..=old_pages {
            if !pages.contains_key(&pgno) {
                checksum ^= old_page(pgno)?;
            }
        }
        Ok(checksum)
    }

    /// Grants the HALT lock, blocking local writes until release or expiry.
    pub fn acquire_halt_lock(&self, ctx: &Context, id: u64) -> Result<HaltLock, Error> {
        let guards = self.acquire_write_guards(ctx, self.options.halt_acquire_timeout)?;
        let lock = HaltLock {
            id,
            expires_at: SystemTime::now() + self.options.halt_lock_ttl,
        };

        let mut state = self.state();
        state.halt_lock = Some(GrantedHaltLock {
            lock,
            _guards: guards,
        });
        Ok(lock)
    }

    pub fn halt_lock(&self) -> Option<HaltLock> {
        self.state().halt_lock.as_ref().map(|granted| granted.lock)
    }

    /// Releases a granted HALT lock. A stale ID is ignored.
    pub fn release_halt_lock(&self, id: u64) {
        let mut state = self.state();
        match &state.halt_lock {
            Some(granted) if granted.lock.id == id => {
                state.halt_lock = None;
            }
            Some(granted) => {
                tracing::debug!(
                    "{}: ignoring halt lock release, id {} does not match holder {}",
                    self.name,
                    id,
                    granted.lock.id
                );
            }
            None => {}
        }
    }

    pub fn remote_halt_lock(&self) -> Option<HaltLock> {
        self.state().remote_halt_lock
    }

    /// Records a HALT lock obtained from the primary.
    pub fn set_remote_halt_lock(&self, lock: HaltLock) {
        self.state().remote_halt_lock = Some(lock);
    }

    /// Clears the remote HALT lock without contacting the primary. Used when
    /// an incoming LTX file proves the primary no longer honours it.
    pub fn unset_remote_halt_lock(&self, id: u64) {
        let mut state = self.state();
        match state.remote_halt_lock {
            Some(lock) if lock.id == id => state.remote_halt_lock = None,
            _ => {}
        }
    }

    /// Explicitly gives the HALT lock back. Release on the primary side is
    /// covered by its expiration sweep.
    pub fn release_remote_halt_lock(&self, id: u64) {
        self.unset_remote_halt_lock(id);
    }

    /// Drops any HALT lock whose TTL has elapsed. Safety net; holders are
    /// expected to release explicitly.
    pub fn enforce_halt_lock_expiration(&self) {
        let now = SystemTime::now();
        let mut state = self.state();

        if let Some(granted) = &state.halt_lock
            && granted.lock.is_expired(now)
        {
            tracing::warn!("{}: halt lock {} expired", self.name, granted.lock.id);
            state.halt_lock = None;
        }
        if let Some(lock) = state.remote_halt_lock
            && lock.is_expired(now)
        {
            tracing::warn!("{}: remote halt lock {} expired", self.name, lock.id);
            state.remote_halt_lock = None;
        }
    }

    /// Deletes LTX files last modified before `min_time`. The file holding
    /// the current position is always retained.
    pub fn enforce_retention(&self, ctx: &Context, min_time: SystemTime) -> Result<(), Error> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let pos = self.pos();

        let mut first_err = None;
        for (min_txid, max_txid, path) in self.ltx_files()? {
            if min_txid <= pos.txid && pos.txid <= max_txid {
                continue;
            }

            let result = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .and_then(|mtime| {
                    if mtime < min_time {
                        tracing::debug!(
                            "{}: removing expired ltx file {}",
                            self.name,
                            path.display()
                        );
                        fs::remove_file(&path)
                    } else {
                        Ok(())
                    }
                });
            if let Err(err) = result
                && first_err.is_none()
            {
                first_err = Some(Error::from(err).with_db(&self.name));
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Removes every LTX file except the one at `keep`. Called after a
    /// snapshot lands.
    pub fn remove_ltx_files_except(&self, keep: &Path) -> Result<(), Error> {
        let mut first_err = None;
        for (_, _, path) in self.ltx_files()? {
            if path == keep {
                continue;
            }
            if let Err(err) = fs::remove_file(&path)
                && first_err.is_none()
            {
                first_err = Some(Error::from(err));
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Forces the database file into a clean state across role transitions:
    /// a leftover journal is rolled back, a leftover WAL is checkpointed
    /// away. Synchronized on the write and recover locks.
    pub fn recover(&self, ctx: &Context) -> Result<(), Error> {
        let deadline = Instant::now() + self.options.begin_timeout;
        let _write_guards = self.acquire_write_guards(ctx, self.options.begin_timeout)?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let _recover_guard = self.locks.recover.lock_exclusive(ctx, remaining)?;

        let journal_path = self.path.join(JOURNAL_FILENAME);
        if journal_path.exists() {
            tracing::debug!("{}: rolling back journal", self.name);
            fs::remove_file(&journal_path)?;
            fsync_dir(&self.path)?;
        }

        let wal_path = self.path.join(WAL_FILENAME);
        if wal_path.exists() {
            tracing::debug!("{}: checkpointing wal", self.name);
            let wal = OpenOptions::new().write(true).open(&wal_path)?;
            wal.set_len(0)?;
            wal.sync_all()?;
        }

        Ok(())
    }
}

/// Temp-file path for an atomic install: `<path>.<rand>.tmp`.
pub(crate) fn tmp_path_for(path: &Path) -> PathBuf {
    let suffix = rand::rng().next_u32();
    PathBuf::from(format!("{}.{suffix}.tmp", path.display()))
}

pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    File::open(dir)?.sync_all()
}

fn write_ltx_file(
    path: &Path,
    header: &Header,
    pages: &BTreeMap<u32, Vec<u8>>,
    post_apply_checksum: u64,
) -> Result<(), Error> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut encoder = Encoder::new(file, *header)?;
    for (&pgno, data) in pages {
        encoder.write_page(pgno, data)?;
    }
    let file = encoder.finish(post_apply_checksum)?;
    file.sync_all()?;
    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::lock::LockState;

    fn open_db(dir: &TempDir, options: StoreOptions) -> Arc<DB> {
        DB::open("app.db", dir.path().join("app.db"), Arc::new(options)).unwrap()
    }

    fn strict_options() -> StoreOptions {
        StoreOptions {
            strict_verify: true,
            ..StoreOptions::default()
        }
    }

    fn page(fill: u8) -> Vec<u8> {
        vec![fill; 512]
    }

    #[test]
    fn open_empty_database_has_zero_pos() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir, StoreOptions::default());
        assert!(db.pos().is_zero());
    }

    #[test]
    fn commit_advances_pos_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let db = open_db(&dir, strict_options());

        let guard = db.acquire_write_lock(&ctx).unwrap();
        let pages = BTreeMap::from([(1, page(0x11)), (2, page(0x22))]);
        let pos1 = db.commit_ltx(&ctx, 7, &pages, 2).unwrap();
        assert_eq!(pos1.txid, Txid(1));

        let pages = BTreeMap::from([(2, page(0x33))]);
        let pos2 = db.commit_ltx(&ctx, 7, &pages, 2).unwrap();
        assert_eq!(pos2.txid, Txid(2));
        guard.unlock();

        drop(db);
        let reopened = open_db(&dir, strict_options());
        assert_eq!(reopened.pos(), pos2);
        assert_eq!(reopened.page_size(), 512);
    }

    #[test]
    fn identical_ltx_sequences_yield_identical_database_files() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let a = open_db(&dir_a, strict_options());
        let b = open_db(&dir_b, strict_options());

        let pages = BTreeMap::from([(1, page(0xAA)), (2, page(0xBB)), (3, page(0xCC))]);
        let pos = a.commit_ltx(&ctx, 9, &pages, 3).unwrap();

        // Replay the file A produced onto B.
        let path_a = a.ltx_path(Txid(1), Txid(1));
        let path_b = b.path().join(ltx::ltx_filename(Txid(1), Txid(1)));
        fs::copy(&path_a, &path_b).unwrap();
        let applied = b.apply_ltx_no_lock(&ctx, &path_b).unwrap();

        assert_eq!(applied, pos);
        assert_eq!(
            fs::read(a.database_path()).unwrap(),
            fs::read(b.database_path()).unwrap()
        );
    }

    #[test]
    fn apply_rejects_position_mismatch_and_leaves_pos_unchanged() {
        let dir = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let db = open_db(&dir, strict_options());

        let pages = BTreeMap::from([(1, page(0x01))]);
        let pos = db.commit_ltx(&ctx, 7, &pages, 1).unwrap();

        // A file with a bogus pre-apply checksum cannot chain onto pos.
        let header = Header {
            flags: 0,
            page_size: 512,
            commit: 1,
            min_txid: Txid(2),
            max_txid: Txid(2),
            timestamp_ms: 0,
            pre_apply_checksum: 0xDEAD_BEEF,
            node_id: 7,
        };
        let path = dir.path().join("bogus.ltx.file");
        write_ltx_file(&path, &header, &BTreeMap::from([(1, page(0x02))]), 0).unwrap();

        let err = db.apply_ltx_no_lock(&ctx, &path).unwrap_err();
        assert!(matches!(err, Error::PosMismatch { .. }));
        assert_eq!(db.pos(), pos);
    }

    #[test]
    fn snapshot_apply_replaces_any_position() {
        let dir = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let db = open_db(&dir, StoreOptions::default());

        let pages = BTreeMap::from([(1, page(0x01))]);
        db.commit_ltx(&ctx, 7, &pages, 1).unwrap();

        let header = Header {
            flags: FLAG_SNAPSHOT,
            page_size: 512,
            commit: 1,
            min_txid: Txid(1),
            max_txid: Txid(10),
            timestamp_ms: 0,
            pre_apply_checksum: 0,
            node_id: 8,
        };
        let path = db.ltx_path(Txid(1), Txid(10));
        let snapshot_pages = BTreeMap::from([(1, page(0xFF))]);
        let post = page_checksum(1, &page(0xFF));
        write_ltx_file(&path, &header, &snapshot_pages, post).unwrap();

        let pos = db.apply_ltx_no_lock(&ctx, &path).unwrap();
        assert_eq!(pos, Pos::new(Txid(10), post));

        db.remove_ltx_files_except(&path).unwrap();
        let files = db.ltx_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].2, path);
        assert!(db.database_path().exists());
    }

    #[test]
    fn compressed_commit_roundtrips() {
        let dir = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let db = open_db(
            &dir,
            StoreOptions {
                compress: true,
                strict_verify: true,
                ..StoreOptions::default()
            },
        );

        let pages = BTreeMap::from([(1, page(0x5A)), (2, page(0x5A))]);
        let pos = db.commit_ltx(&ctx, 7, &pages, 2).unwrap();
        assert_eq!(pos.txid, Txid(1));

        drop(db);
        let reopened = open_db(&dir, strict_options());
        assert_eq!(reopened.pos(), pos);
    }

    #[test]
    fn retention_keeps_file_containing_current_position() {
        let dir = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let db = open_db(&dir, StoreOptions::default());

        for fill in 1..=3u8 {
            let pages = BTreeMap::from([(1, page(fill))]);
            db.commit_ltx(&ctx, 7, &pages, 1).unwrap();
        }
        assert_eq!(db.ltx_files().unwrap().len(), 3);

        // A cutoff in the future expires everything except the current file.
        let min_time = SystemTime::now() + Duration::from_secs(10);
        db.enforce_retention(&ctx, min_time).unwrap();

        let files = db.ltx_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, db.pos().txid);
    }

    #[test]
    fn retention_with_old_cutoff_removes_nothing() {
        let dir = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let db = open_db(&dir, StoreOptions::default());

        let pages = BTreeMap::from([(1, page(0x01))]);
        db.commit_ltx(&ctx, 7, &pages, 1).unwrap();
        db.enforce_retention(&ctx, UNIX_EPOCH).unwrap();
        assert_eq!(db.ltx_files().unwrap().len(), 1);
    }

    #[test]
    fn halt_lock_blocks_writes_until_expiry() {
        let dir = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let db = open_db(
            &dir,
            StoreOptions {
                halt_lock_ttl: Duration::from_millis(10),
                begin_timeout: Duration::from_millis(50),
                ..StoreOptions::default()
            },
        );

        let halt = db.acquire_halt_lock(&ctx, 42).unwrap();
        assert_eq!(db.halt_lock(), Some(halt));
        assert_eq!(db.locks().write.state(), LockState::Exclusive);
        assert!(matches!(
            db.acquire_write_lock(&ctx),
            Err(Error::LockTimeout { .. })
        ));

        std::thread::sleep(Duration::from_millis(20));
        db.enforce_halt_lock_expiration();
        assert_eq!(db.halt_lock(), None);
        assert!(db.acquire_write_lock(&ctx).is_ok());
    }

    #[test]
    fn halt_lock_release_ignores_stale_id() {
        let dir = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let db = open_db(&dir, StoreOptions::default());

        db.acquire_halt_lock(&ctx, 1).unwrap();
        db.release_halt_lock(99);
        assert!(db.halt_lock().is_some());
        db.release_halt_lock(1);
        assert!(db.halt_lock().is_none());
    }

    #[test]
    fn remote_halt_lock_set_and_unset() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir, StoreOptions::default());

        let lock = HaltLock {
            id: 5,
            expires_at: SystemTime::now() + Duration::from_secs(30),
        };
        db.set_remote_halt_lock(lock);
        assert_eq!(db.remote_halt_lock(), Some(lock));

        db.unset_remote_halt_lock(4);
        assert_eq!(db.remote_halt_lock(), Some(lock));
        db.release_remote_halt_lock(5);
        assert_eq!(db.remote_halt_lock(), None);
    }

    #[test]
    fn recover_rolls_back_journal_and_truncates_wal() {
        let dir = TempDir::new().unwrap();
        let (ctx, _cancel) = Context::background();
        let db = open_db(&dir, StoreOptions::default());

        fs::write(db.path().join(JOURNAL_FILENAME), b"journal bytes").unwrap();
        fs::write(db.path().join(WAL_FILENAME), b"wal bytes").unwrap();

        db.recover(&ctx).unwrap();
        assert!(!db.path().join(JOURNAL_FILENAME).exists());
        assert_eq!(
            fs::metadata(db.path().join(WAL_FILENAME)).unwrap().len(),
            0
        );
    }

    #[test]
    fn open_removes_orphaned_tmp_files() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("app.db");
        fs::create_dir_all(&db_path).unwrap();
        let tmp = db_path.join("0000000000000001-0000000000000001.ltx.123.tmp");
        fs::write(&tmp, b"partial").unwrap();

        let _db = DB::open("app.db", &db_path, Arc::new(StoreOptions::default())).unwrap();
        assert!(!tmp.exists());
    }
}
