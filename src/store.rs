//! Store: node identity, the database registry, and the replication
//! monitors.
//!
//! The lease monitor alternates between primary mode (hold and renew the
//! lease) and replica mode (stream LTX files from the primary). Two further
//! monitors sweep expired HALT locks and enforce LTX retention. All
//! background work is governed by the root context, which is canceled with
//! a store-closed cause on `close`.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, Receiver, Sender};
use rand::RngCore;
use serde::Serialize;

use crate::config::StoreOptions;
use crate::context::{CancelHandle, Context, PrimaryCtx};
use crate::db::{self, DATABASE_FILENAME, DB};
use crate::error::Error;
use crate::lease::{Lease, Leaser, PrimaryInfo};
use crate::ltx::{Decoder, Header};
use crate::metrics;
use crate::pos::{Pos, PosMap, Txid, format_node_id, parse_node_id};
use crate::stream::{ChunkReader, Client, StreamFrame, read_stream_frame};
use crate::subscriber::Subscriber;

const ID_FILENAME: &str = "id";
const DBS_DIRNAME: &str = "dbs";

// Degraded renewal cadence while the leaser is unreachable.
const RENEW_RETRY_TIMEOUT: Duration = Duration::from_secs(1);

struct StoreState {
    dbs: HashMap<String, Arc<DB>>,
    subscribers: HashMap<u64, Arc<Subscriber>>,
    next_subscriber_id: u64,

    is_primary: bool,
    // `Some` only while primary; dropping the sender signals loss of
    // leadership to every PrimaryCtx derived from the paired receiver.
    primary_tx: Option<Sender<()>>,
    primary_rx: Receiver<()>,
    primary_info: Option<PrimaryInfo>,

    ready_tx: Option<Sender<()>>,
    ready_rx: Receiver<()>,

    demote_tx: Sender<()>,
    demote_rx: Receiver<()>,
}

/// A collection of replicated databases hosted by one node.
pub struct Store {
    path: PathBuf,
    options: Arc<StoreOptions>,
    candidate: bool,

    leaser: Option<Arc<dyn Leaser>>,
    client: Option<Arc<dyn Client>>,

    id: AtomicU64,
    state: Mutex<StoreState>,

    ctx: Context,
    cancel: Mutex<Option<CancelHandle>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

enum AcquireOutcome {
    Lease(Box<dyn Lease>),
    Primary(PrimaryInfo),
}

impl Store {
    pub fn new(
        path: impl Into<PathBuf>,
        leaser: Option<Arc<dyn Leaser>>,
        client: Option<Arc<dyn Client>>,
        options: StoreOptions,
        candidate: bool,
    ) -> Arc<Store> {
        let (ctx, cancel) = Context::background();

        // The primary channel starts closed: the node boots without
        // leadership.
        let (primary_tx, primary_rx) = channel::unbounded();
        drop(primary_tx);
        let (ready_tx, ready_rx) = channel::unbounded();
        let (demote_tx, demote_rx) = channel::unbounded();

        Arc::new(Store {
            path: path.into(),
            options: Arc::new(options),
            candidate,
            leaser,
            client,
            id: AtomicU64::new(0),
            state: Mutex::new(StoreState {
                dbs: HashMap::new(),
                subscribers: HashMap::new(),
                next_subscriber_id: 1,
                is_primary: false,
                primary_tx: None,
                primary_rx,
                primary_info: None,
                ready_tx: Some(ready_tx),
                ready_rx,
                demote_tx,
                demote_rx,
            }),
            ctx,
            cancel: Mutex::new(Some(cancel)),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn db_dir(&self) -> PathBuf {
        self.path.join(DBS_DIRNAME)
    }

    pub fn db_path(&self, name: &str) -> PathBuf {
        self.db_dir().join(name)
    }

    /// Unique identifier for this node. Available after `open`.
    pub fn id(&self) -> u64 {
        self.id.load(Ordering::Relaxed)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn candidate(&self) -> bool {
        self.candidate
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Initializes the store from the data directory and starts the
    /// background monitors.
    pub fn open(self: &Arc<Self>) -> Result<(), Error> {
        if self.leaser.is_none() {
            return Err(Error::LeaserRequired);
        }

        fs::create_dir_all(&self.path)?;
        self.init_id()?;
        self.open_databases()?;

        let mut handles = self.handles.lock().unwrap_or_else(|err| err.into_inner());

        let store = Arc::clone(self);
        let ctx = self.ctx.clone();
        handles.push(
            thread::Builder::new()
                .name("skiff-lease".to_string())
                .spawn(move || store.monitor_lease(&ctx))?,
        );

        if !self.options.halt_lock_monitor_interval.is_zero() {
            let store = Arc::clone(self);
            let ctx = self.ctx.clone();
            handles.push(
                thread::Builder::new()
                    .name("skiff-halt".to_string())
                    .spawn(move || store.monitor_halt_lock(&ctx))?,
            );
        }

        if !self.options.retention_monitor_interval.is_zero() {
            let store = Arc::clone(self);
            let ctx = self.ctx.clone();
            handles.push(
                thread::Builder::new()
                    .name("skiff-retention".to_string())
                    .spawn(move || store.monitor_retention(&ctx))?,
            );
        }

        Ok(())
    }

    /// Shuts the store down: cancels all background work, waits for
    /// quiescence, and best-effort releases any remotely-held HALT locks.
    /// Idempotent.
    pub fn close(&self) -> Result<(), Error> {
        {
            let mut cancel = self.cancel.lock().unwrap_or_else(|err| err.into_inner());
            if let Some(mut handle) = cancel.take() {
                handle.cancel();
            }
        }

        let handles: Vec<_> = {
            let mut handles = self.handles.lock().unwrap_or_else(|err| err.into_inner());
            handles.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }

        for database in self.dbs() {
            if let Some(lock) = database.remote_halt_lock() {
                tracing::info!("releasing halt lock on {:?} at shutdown", database.name());
                database.release_remote_halt_lock(lock.id);
            }
        }

        Ok(())
    }

    fn init_id(&self) -> Result<(), Error> {
        let path = self.path.join(ID_FILENAME);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let mut value = text.trim();
                if value.len() > 16 {
                    value = &value[..16];
                }
                self.id.store(parse_node_id(value)?, Ordering::Relaxed);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let id = rand::rng().next_u64();
                let mut file = File::create(&path)?;
                writeln!(file, "{}", format_node_id(id))?;
                file.sync_all()?;
                self.id.store(id, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn open_databases(&self) -> Result<(), Error> {
        fs::create_dir_all(self.db_dir())?;

        let mut state = self.state();
        for entry in fs::read_dir(self.db_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let database = DB::open(&name, entry.path(), Arc::clone(&self.options))
                .map_err(|err| err.with_db(&name))?;
            state.dbs.insert(name, database);
        }

        metrics::gauge(metrics::DB_COUNT, state.dbs.len() as u64);
        Ok(())
    }

    /// Looks up a database by name.
    pub fn db(&self, name: &str) -> Option<Arc<DB>> {
        self.state().dbs.get(name).cloned()
    }

    /// Snapshot of all databases at call time.
    pub fn dbs(&self) -> Vec<Arc<DB>> {
        self.state().dbs.values().cloned().collect()
    }

    /// Snapshot of every database's position.
    pub fn pos_map(&self) -> PosMap {
        let state = self.state();
        state
            .dbs
            .iter()
            .map(|(name, database)| (name.clone(), database.pos()))
            .collect()
    }

    /// Creates a new database. Fails with `Error::DatabaseExists` if one
    /// with the same name is already present.
    pub fn create_db(&self, name: &str) -> Result<Arc<DB>, Error> {
        let mut state = self.state();
        if state.dbs.contains_key(name) {
            return Err(Error::DatabaseExists);
        }

        let db_path = self.db_path(name);
        fs::create_dir_all(&db_path)?;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(db_path.join(DATABASE_FILENAME))?;

        let database = DB::open(name, db_path, Arc::clone(&self.options))?;
        state.dbs.insert(name.to_string(), Arc::clone(&database));

        Self::mark_dirty_locked(&state, name);
        metrics::gauge(metrics::DB_COUNT, state.dbs.len() as u64);
        Ok(database)
    }

    /// Returns the named database, creating it if needed. Databases are
    /// created this way when the replica stream carries an unknown name.
    pub fn create_db_if_not_exists(&self, name: &str) -> Result<Arc<DB>, Error> {
        let mut state = self.state();
        if let Some(database) = state.dbs.get(name) {
            return Ok(Arc::clone(database));
        }

        let db_path = self.db_path(name);
        fs::create_dir_all(&db_path)?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(db_path.join(DATABASE_FILENAME))?;

        let database = DB::open(name, db_path, Arc::clone(&self.options))?;
        state.dbs.insert(name.to_string(), Arc::clone(&database));

        Self::mark_dirty_locked(&state, name);
        metrics::gauge(metrics::DB_COUNT, state.dbs.len() as u64);
        Ok(database)
    }

    /// Drops a database and removes its directory.
    pub fn drop_db(&self, _ctx: &Context, name: &str) -> Result<(), Error> {
        let mut state = self.state();
        let Some(database) = state.dbs.get(name) else {
            return Err(Error::DatabaseNotFound);
        };

        fs::remove_dir_all(database.path())?;
        state.dbs.remove(name);

        Self::mark_dirty_locked(&state, name);
        metrics::gauge(metrics::DB_COUNT, state.dbs.len() as u64);
        Ok(())
    }

    /// Registers a new change subscriber.
    pub fn subscribe(&self) -> Arc<Subscriber> {
        let mut state = self.state();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;

        let sub = Arc::new(Subscriber::new(id));
        state.subscribers.insert(id, Arc::clone(&sub));
        metrics::gauge(metrics::SUBSCRIBER_COUNT, state.subscribers.len() as u64);
        sub
    }

    /// Detaches a subscriber.
    pub fn unsubscribe(&self, sub: &Subscriber) {
        let mut state = self.state();
        state.subscribers.remove(&sub.id());
        metrics::gauge(metrics::SUBSCRIBER_COUNT, state.subscribers.len() as u64);
    }

    /// Marks a database dirty on every subscriber.
    pub fn mark_dirty(&self, name: &str) {
        let state = self.state();
        Self::mark_dirty_locked(&state, name);
    }

    fn mark_dirty_locked(state: &StoreState, name: &str) {
        for sub in state.subscribers.values() {
            sub.mark_dirty(name);
        }
    }

    /// True while this node holds the primary lease.
    pub fn is_primary(&self) -> bool {
        self.state().is_primary
    }

    /// Info about the primary this node replicates from, if connected.
    pub fn primary_info(&self) -> Option<PrimaryInfo> {
        self.state().primary_info.clone()
    }

    /// Receiver that disconnects once the store has become primary or has
    /// completed its first catch-up from one.
    pub fn ready_rx(&self) -> Receiver<()> {
        self.state().ready_rx.clone()
    }

    fn mark_ready(&self) {
        let mut state = self.state();
        state.ready_tx.take();
    }

    /// Derives a context that is canceled when this node stops being
    /// primary (or when `parent` is canceled).
    pub fn primary_ctx(&self, parent: &Context) -> PrimaryCtx {
        let state = self.state();
        PrimaryCtx::new(parent.clone(), state.primary_rx.clone())
    }

    /// Instructs the store to destroy its primary lease, if held, and to
    /// wait `demote_delay` before contending again.
    pub fn demote(&self) {
        let mut state = self.state();
        let (demote_tx, demote_rx) = channel::unbounded();
        // Dropping the old sender wakes the primary monitor.
        state.demote_tx = demote_tx;
        state.demote_rx = demote_rx;
    }

    // Leadership transitions recreate the primary channel atomically with
    // the flag flip; callers must hold the state lock.
    fn set_is_primary_locked(&self, state: &mut StoreState, value: bool) {
        if state.is_primary != value {
            if value {
                let (tx, rx) = channel::unbounded();
                state.primary_tx = Some(tx);
                state.primary_rx = rx;
            } else {
                state.primary_tx = None;
            }
        }
        state.is_primary = value;
        metrics::gauge(metrics::IS_PRIMARY, u64::from(value));
    }

    // ---- lease monitor ----------------------------------------------------

    fn monitor_lease(&self, ctx: &Context) {
        let node = format_node_id(self.id());
        loop {
            if ctx.err().is_some() {
                return;
            }

            match self.acquire_lease_or_primary_info(ctx) {
                Err(Error::NoPrimary) if !self.candidate => {
                    tracing::info!(
                        "{node}: cannot find primary and ineligible to become primary, retrying"
                    );
                    ctx.sleep(self.options.reconnect_delay);
                }
                Err(err) => {
                    tracing::warn!("{node}: cannot acquire lease or find primary, retrying: {err}");
                    ctx.sleep(self.options.reconnect_delay);
                }
                Ok(AcquireOutcome::Lease(lease)) => {
                    if let Some(leaser) = &self.leaser {
                        tracing::info!(
                            "{node}: primary lease acquired, advertising as {}",
                            leaser.advertise_url()
                        );
                    }
                    if let Err(err) = self.monitor_lease_as_primary(ctx, lease) {
                        tracing::warn!("{node}: primary lease lost, retrying: {err}");
                    }
                    if let Err(err) = self.recover(ctx) {
                        tracing::warn!("{node}: state change recovery failed (primary): {err}");
                    }
                }
                Ok(AcquireOutcome::Primary(info)) => {
                    tracing::info!(
                        "{node}: existing primary found ({}), connecting as replica",
                        info.hostname
                    );
                    match self.monitor_lease_as_replica(ctx, &info) {
                        Ok(()) => tracing::info!("{node}: disconnected from primary, retrying"),
                        Err(err) => {
                            tracing::warn!(
                                "{node}: disconnected from primary with error, retrying: {err}"
                            );
                        }
                    }
                    if let Err(err) = self.recover(ctx) {
                        tracing::warn!("{node}: state change recovery failed (replica): {err}");
                    }
                    ctx.sleep(self.options.reconnect_delay);
                }
            }
        }
    }

    fn acquire_lease_or_primary_info(&self, ctx: &Context) -> Result<AcquireOutcome, Error> {
        let leaser = self.leaser.as_ref().ok_or(Error::LeaserRequired)?;

        // Prefer an existing primary.
        match leaser.primary_info(ctx) {
            Ok(info) => return Ok(AcquireOutcome::Primary(info)),
            Err(Error::NoPrimary) if !self.candidate => return Err(Error::NoPrimary),
            Err(Error::NoPrimary) => {}
            Err(err) => return Err(err),
        }

        match leaser.acquire(ctx) {
            Ok(lease) => return Ok(AcquireOutcome::Lease(lease)),
            Err(Error::PrimaryExists) => {}
            Err(err) => return Err(err),
        }

        // Lost the race to another candidate; read its info instead.
        Ok(AcquireOutcome::Primary(leaser.primary_info(ctx)?))
    }

    fn monitor_lease_as_primary(
        &self,
        ctx: &Context,
        mut lease: Box<dyn Lease>,
    ) -> Result<(), Error> {
        let demote_rx = {
            let mut state = self.state();
            self.set_is_primary_locked(&mut state, true);
            state.demote_rx.clone()
        };
        self.mark_ready();

        let mut wait_dur = lease.ttl() / 2;
        let mut demoted = false;
        let result = loop {
            crossbeam::select! {
                recv(channel::after(wait_dur)) -> _ => {
                    match lease.renew(ctx) {
                        Ok(()) => {
                            wait_dur = lease.ttl() / 2;
                        }
                        Err(Error::LeaseExpired) => break Err(Error::LeaseExpired),
                        Err(err) => {
                            // Retry aggressively while the renewal can
                            // still land inside the TTL.
                            if lease.renewed_at().elapsed() + RENEW_RETRY_TIMEOUT > lease.ttl() {
                                ctx.sleep(RENEW_RETRY_TIMEOUT);
                                break Err(Error::LeaseExpired);
                            }
                            tracing::warn!("lease renewal failed, retrying: {err}");
                            wait_dur = RENEW_RETRY_TIMEOUT;
                        }
                    }
                }
                recv(demote_rx) -> _ => {
                    tracing::info!("node manually demoted");
                    demoted = true;
                    break Ok(());
                }
                recv(ctx.done_rx()) -> _ => break Ok(()),
            }
        };

        {
            let mut state = self.state();
            self.set_is_primary_locked(&mut state, false);
        }

        tracing::info!("exiting primary, destroying lease");
        if let Err(err) = lease.close() {
            tracing::warn!("cannot remove lease: {err}");
        }
        if demoted {
            tracing::info!("waiting {:?} after demotion", self.options.demote_delay);
            ctx.sleep(self.options.demote_delay);
        }

        result
    }

    // ---- replica mode -----------------------------------------------------

    fn monitor_lease_as_replica(&self, ctx: &Context, info: &PrimaryInfo) -> Result<(), Error> {
        let Some(client) = self.client.clone() else {
            return Err(Error::ClientRequired);
        };

        self.state().primary_info = Some(info.clone());
        let result = self.replicate_from(ctx, client.as_ref(), info);
        self.state().primary_info = None;
        result
    }

    fn replicate_from(
        &self,
        ctx: &Context,
        client: &dyn Client,
        info: &PrimaryInfo,
    ) -> Result<(), Error> {
        let pos_map = self.pos_map();
        let reader = client.stream(ctx, &info.advertise_url, self.id(), &pos_map)?;
        let mut reader = BufReader::new(reader);

        loop {
            if ctx.err().is_some() {
                return Ok(());
            }

            match read_stream_frame(&mut reader)? {
                None | Some(StreamFrame::End) => return Ok(()),
                Some(StreamFrame::Ltx { name }) => {
                    let mut body = ChunkReader::new(&mut reader);
                    self.process_ltx_stream_frame(ctx, &name, &mut body)?;
                    body.drain()?;
                }
                Some(StreamFrame::Ready) => self.mark_ready(),
                Some(StreamFrame::DropDb { name }) => match self.drop_db(ctx, &name) {
                    Err(Error::DatabaseNotFound) => {
                        tracing::info!("dropped database {name:?} does not exist, skipping");
                    }
                    other => other?,
                },
            }
        }
    }

    fn process_ltx_stream_frame(
        &self,
        ctx: &Context,
        name: &str,
        src: &mut impl Read,
    ) -> Result<(), Error> {
        let database = self.create_db_if_not_exists(name)?;
        let (hdr, hdr_bytes) = Header::peek(src)?;
        tracing::debug!(
            "receiving ltx file for {name:?}: txid={}-{}",
            hdr.min_txid,
            hdr.max_txid
        );

        let guard = database.acquire_write_lock(ctx)?;

        // This node created the transaction and it round-tripped through
        // the primary: verify the copy, but do not re-apply it.
        if hdr.node_id == self.id() {
            Decoder::new(io::Cursor::new(hdr_bytes).chain(src))?.verify()?;
            guard.unlock();
            return Ok(());
        }

        // An incoming LTX file means the primary no longer honours any HALT
        // lock this replica still holds; clear it. The write lock is held,
        // so no local write is in progress.
        if let Some(halt) = database.remote_halt_lock() {
            tracing::info!(
                "{name:?}: received ltx file while holding remote halt lock, unsetting"
            );
            database.unset_remote_halt_lock(halt.id);
        }

        if !hdr.is_snapshot() {
            let expected = Pos::new(Txid(hdr.min_txid.0 - 1), hdr.pre_apply_checksum);
            let pos = database.pos();
            if pos != expected {
                return Err(Error::PosMismatch {
                    db: name.to_string(),
                    pos,
                    expected,
                });
            }
        }

        // Stream into a temp file, then atomically install it.
        let path = database.ltx_path(hdr.min_txid, hdr.max_txid);
        let tmp_path = db::tmp_path_for(&path);
        let written = (|| -> Result<u64, Error> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&hdr_bytes)?;
            let copied = io::copy(src, &mut file)?;
            file.sync_all()?;
            Ok(copied + hdr_bytes.len() as u64)
        })();
        let size = match written {
            Ok(size) => size,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(err);
            }
        };
        fs::rename(&tmp_path, &path)?;
        db::fsync_dir(database.path())?;

        if hdr.is_snapshot() {
            tracing::info!(
                "snapshot received for {name:?}, removing other ltx files: {}",
                path.display()
            );
            database.remove_ltx_files_except(&path)?;
        }

        database.apply_ltx_no_lock(ctx, &path)?;
        guard.unlock();

        metrics::db_counter(metrics::DB_LTX_COUNT, name, 1);
        metrics::db_gauge(metrics::DB_LTX_BYTES, name, size);
        self.mark_dirty(name);
        Ok(())
    }

    // ---- sweep monitors ---------------------------------------------------

    fn monitor_halt_lock(&self, ctx: &Context) {
        let ticker = channel::tick(self.options.halt_lock_monitor_interval);
        loop {
            crossbeam::select! {
                recv(ctx.done_rx()) -> _ => return,
                recv(ticker) -> _ => self.enforce_halt_lock_expiration(),
            }
        }
    }

    fn monitor_retention(&self, ctx: &Context) {
        let ticker = channel::tick(self.options.retention_monitor_interval);
        loop {
            crossbeam::select! {
                recv(ctx.done_rx()) -> _ => return,
                recv(ticker) -> _ => {
                    if let Err(err) = self.enforce_retention(ctx) {
                        tracing::warn!("retention enforcement failed: {err}");
                    }
                }
            }
        }
    }

    /// Expires any overdue HALT locks on all databases.
    pub fn enforce_halt_lock_expiration(&self) {
        for database in self.dbs() {
            database.enforce_halt_lock_expiration();
        }
    }

    /// Enforces LTX retention on all databases. The first error is
    /// retained; remaining databases are still processed.
    pub fn enforce_retention(&self, ctx: &Context) -> Result<(), Error> {
        if self.options.retention.is_zero() {
            return Ok(());
        }
        let min_time = SystemTime::now() - self.options.retention;

        let mut first_err = None;
        for database in self.dbs() {
            if let Err(err) = database.enforce_retention(ctx, min_time)
                && first_err.is_none()
            {
                first_err = Some(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Forces every database into a clean state. Called on every
    /// primary/replica role transition.
    pub fn recover(&self, ctx: &Context) -> Result<(), Error> {
        for database in self.dbs() {
            database
                .recover(ctx)
                .map_err(|err| err.with_db(database.name()))?;
        }
        Ok(())
    }

    /// Serializable snapshot of the store for introspection endpoints.
    pub fn status(&self) -> StoreStatus {
        let mut dbs = BTreeMap::new();
        for database in self.dbs() {
            let pos = database.pos();
            let locks = database.locks();
            let lock_states = [
                &locks.pending,
                &locks.shared,
                &locks.reserved,
                &locks.write,
                &locks.ckpt,
                &locks.recover,
                &locks.read0,
                &locks.read1,
                &locks.read2,
                &locks.read3,
                &locks.read4,
                &locks.dms,
            ]
            .into_iter()
            .map(|lock| (lock.name(), lock.state().as_str()))
            .collect();

            dbs.insert(
                database.name().to_string(),
                DbStatus {
                    txid: pos.txid.to_string(),
                    checksum: format!("{:016x}", pos.post_apply_checksum),
                    locks: lock_states,
                },
            );
        }

        StoreStatus {
            is_primary: self.is_primary(),
            candidate: self.candidate,
            dbs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    #[serde(rename = "isPrimary")]
    pub is_primary: bool,
    pub candidate: bool,
    pub dbs: BTreeMap<String, DbStatus>,
}

#[derive(Debug, Serialize)]
pub struct DbStatus {
    pub txid: String,
    pub checksum: String,
    pub locks: BTreeMap<&'static str, &'static str>,
}
