//! Test doubles: an in-memory lease service, scripted replication streams,
//! and an LTX producer that tracks real page checksums.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use skiff::context::Context;
use skiff::error::Error;
use skiff::lease::{Lease, Leaser, PrimaryInfo};
use skiff::ltx::{Encoder, FLAG_SNAPSHOT, Header, page_checksum};
use skiff::pos::{Pos, PosMap, Txid};
use skiff::stream::{ChunkWriter, Client, StreamFrame, write_stream_frame};

// ---- lease service ---------------------------------------------------------

pub struct LeaseHub {
    ttl: Duration,
    state: Mutex<HubState>,
}

struct HubState {
    holder: Option<Holder>,
    banned: HashSet<String>,
    next_epoch: u64,
}

struct Holder {
    epoch: u64,
    hostname: String,
    info: PrimaryInfo,
    expires_at: Instant,
    revoked: bool,
}

impl Holder {
    fn alive(&self) -> bool {
        !self.revoked && self.expires_at > Instant::now()
    }
}

impl LeaseHub {
    pub fn new(ttl: Duration) -> Arc<LeaseHub> {
        Arc::new(LeaseHub {
            ttl,
            state: Mutex::new(HubState {
                holder: None,
                banned: HashSet::new(),
                next_epoch: 1,
            }),
        })
    }

    pub fn leaser(self: &Arc<Self>, hostname: &str, advertise_url: &str) -> Arc<MemoryLeaser> {
        Arc::new(MemoryLeaser {
            hub: Arc::clone(self),
            hostname: hostname.to_string(),
            info: PrimaryInfo {
                hostname: hostname.to_string(),
                advertise_url: advertise_url.to_string(),
            },
        })
    }

    /// Revokes the current lease and fences its holder from reacquiring,
    /// so a failover has a deterministic winner.
    pub fn revoke_current(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(holder) = &mut state.holder {
            holder.revoked = true;
            let hostname = holder.hostname.clone();
            state.banned.insert(hostname);
        }
    }

    pub fn holder_hostname(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .holder
            .as_ref()
            .filter(|holder| holder.alive())
            .map(|holder| holder.hostname.clone())
    }
}

pub struct MemoryLeaser {
    hub: Arc<LeaseHub>,
    hostname: String,
    info: PrimaryInfo,
}

impl Leaser for MemoryLeaser {
    fn advertise_url(&self) -> String {
        self.info.advertise_url.clone()
    }

    fn acquire(&self, _ctx: &Context) -> Result<Box<dyn Lease>, Error> {
        let mut state = self.hub.state.lock().unwrap();
        if state.holder.as_ref().is_some_and(Holder::alive) {
            return Err(Error::PrimaryExists);
        }
        if state.banned.contains(&self.hostname) {
            return Err(Error::PrimaryExists);
        }

        let epoch = state.next_epoch;
        state.next_epoch += 1;
        state.holder = Some(Holder {
            epoch,
            hostname: self.hostname.clone(),
            info: self.info.clone(),
            expires_at: Instant::now() + self.hub.ttl,
            revoked: false,
        });

        Ok(Box::new(MemoryLease {
            hub: Arc::clone(&self.hub),
            epoch,
            ttl: self.hub.ttl,
            renewed_at: Instant::now(),
        }))
    }

    fn primary_info(&self, _ctx: &Context) -> Result<PrimaryInfo, Error> {
        let state = self.hub.state.lock().unwrap();
        match &state.holder {
            Some(holder) if holder.alive() => Ok(holder.info.clone()),
            _ => Err(Error::NoPrimary),
        }
    }
}

struct MemoryLease {
    hub: Arc<LeaseHub>,
    epoch: u64,
    ttl: Duration,
    renewed_at: Instant,
}

impl Lease for MemoryLease {
    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn renewed_at(&self) -> Instant {
        self.renewed_at
    }

    fn renew(&mut self, _ctx: &Context) -> Result<(), Error> {
        let mut state = self.hub.state.lock().unwrap();
        match &mut state.holder {
            Some(holder) if holder.epoch == self.epoch && !holder.revoked => {
                holder.expires_at = Instant::now() + self.ttl;
                self.renewed_at = Instant::now();
                Ok(())
            }
            _ => Err(Error::LeaseExpired),
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        let mut state = self.hub.state.lock().unwrap();
        if state
            .holder
            .as_ref()
            .is_some_and(|holder| holder.epoch == self.epoch)
        {
            state.holder = None;
        }
        Ok(())
    }
}

// ---- scripted replication streams ------------------------------------------

/// A client whose streams are fed by the test. Each call to `stream` pops
/// the next scripted stream; reads block until bytes arrive, the sender is
/// dropped (EOF), or the caller's context is canceled.
pub struct ScriptedClient {
    streams: Mutex<VecDeque<Receiver<Vec<u8>>>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<ScriptedClient> {
        Arc::new(ScriptedClient {
            streams: Mutex::new(VecDeque::new()),
        })
    }

    /// Queues one stream and returns the handle the test writes frames to.
    pub fn push_stream(&self) -> StreamSender {
        let (tx, rx) = channel::unbounded();
        self.streams.lock().unwrap().push_back(rx);
        StreamSender { tx }
    }
}

impl Client for ScriptedClient {
    fn stream(
        &self,
        ctx: &Context,
        _url: &str,
        _node_id: u64,
        _pos_map: &PosMap,
    ) -> Result<Box<dyn Read + Send>, Error> {
        let rx = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::NoPrimary)?;
        Ok(Box::new(PipeStream {
            rx,
            done: ctx.done_rx().clone(),
            buf: Vec::new(),
            off: 0,
        }))
    }
}

pub struct StreamSender {
    tx: Sender<Vec<u8>>,
}

impl StreamSender {
    pub fn send(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(bytes);
    }

    /// Dropping the sender ends the stream; this just names the intent.
    pub fn close(self) {}
}

struct PipeStream {
    rx: Receiver<Vec<u8>>,
    done: Receiver<()>,
    buf: Vec<u8>,
    off: usize,
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.off >= self.buf.len() {
            crossbeam::select! {
                recv(self.rx) -> msg => match msg {
                    Ok(bytes) => {
                        self.buf = bytes;
                        self.off = 0;
                    }
                    Err(_) => return Ok(0),
                },
                recv(self.done) -> _ => return Ok(0),
            }
        }

        let n = buf.len().min(self.buf.len() - self.off);
        buf[..n].copy_from_slice(&self.buf[self.off..self.off + n]);
        self.off += n;
        Ok(n)
    }
}

// ---- frame builders --------------------------------------------------------

pub fn ltx_frame(name: &str, file: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_stream_frame(
        &mut out,
        &StreamFrame::Ltx {
            name: name.to_string(),
        },
    )
    .unwrap();
    let mut chunks = ChunkWriter::new(out);
    chunks.write_all(file).unwrap();
    chunks.finish().unwrap()
}

pub fn ready_frame() -> Vec<u8> {
    let mut out = Vec::new();
    write_stream_frame(&mut out, &StreamFrame::Ready).unwrap();
    out
}

pub fn end_frame() -> Vec<u8> {
    let mut out = Vec::new();
    write_stream_frame(&mut out, &StreamFrame::End).unwrap();
    out
}

pub fn drop_db_frame(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    write_stream_frame(
        &mut out,
        &StreamFrame::DropDb {
            name: name.to_string(),
        },
    )
    .unwrap();
    out
}

// ---- LTX producer ----------------------------------------------------------

/// Simulates a primary's database so emitted LTX files carry real,
/// chainable checksums.
pub struct LtxSim {
    page_size: u32,
    pages: BTreeMap<u32, Vec<u8>>,
    pos: Pos,
}

impl LtxSim {
    pub fn new(page_size: u32) -> LtxSim {
        LtxSim {
            page_size,
            pages: BTreeMap::new(),
            pos: Pos::default(),
        }
    }

    pub fn pos(&self) -> Pos {
        self.pos
    }

    /// The raw database image the replica should converge to.
    pub fn database_image(&self) -> Vec<u8> {
        let commit = self.pages.keys().max().copied().unwrap_or(0);
        let mut image = vec![0u8; (commit as usize) * self.page_size as usize];
        for (&pgno, data) in &self.pages {
            let off = (pgno as usize - 1) * self.page_size as usize;
            image[off..off + data.len()].copy_from_slice(data);
        }
        image
    }

    fn checksum(&self) -> u64 {
        let commit = self.pages.keys().max().copied().unwrap_or(0);
        let zero = vec![0u8; self.page_size as usize];
        (1..=commit)
            .map(|pgno| page_checksum(pgno, self.pages.get(&pgno).unwrap_or(&zero)))
            .fold(0, |acc, sum| acc ^ sum)
    }

    /// Emits an LTX file covering `tx_count` transactions with the given
    /// page writes, and advances the simulated position.
    pub fn commit_range(
        &mut self,
        node_id: u64,
        writes: &[(u32, Vec<u8>)],
        tx_count: u64,
    ) -> Vec<u8> {
        let snapshot = self.pos.is_zero();
        let min_txid = Txid(self.pos.txid.0 + 1);
        let max_txid = Txid(self.pos.txid.0 + tx_count);
        let pre = self.pos.post_apply_checksum;

        for (pgno, data) in writes {
            assert_eq!(data.len(), self.page_size as usize);
            self.pages.insert(*pgno, data.clone());
        }
        let commit = self.pages.keys().max().copied().unwrap_or(0);
        let post = self.checksum();

        let header = Header {
            flags: if snapshot { FLAG_SNAPSHOT } else { 0 },
            page_size: self.page_size,
            commit,
            min_txid,
            max_txid,
            timestamp_ms: 0,
            pre_apply_checksum: if snapshot { 0 } else { pre },
            node_id,
        };

        let mut encoder = Encoder::new(Vec::new(), header).unwrap();
        if snapshot {
            // A snapshot is self-contained: every page travels.
            for (&pgno, data) in &self.pages {
                encoder.write_page(pgno, data).unwrap();
            }
        } else {
            let written: BTreeMap<u32, &Vec<u8>> = writes
                .iter()
                .map(|(pgno, _)| (*pgno, &self.pages[pgno]))
                .collect();
            for (pgno, data) in written {
                encoder.write_page(pgno, data).unwrap();
            }
        }
        let file = encoder.finish(post).unwrap();

        self.pos = Pos::new(max_txid, post);
        file
    }

    pub fn commit(&mut self, node_id: u64, writes: &[(u32, Vec<u8>)]) -> Vec<u8> {
        self.commit_range(node_id, writes, 1)
    }

    /// Emits a snapshot of the full current image covering `1..=max_txid`.
    pub fn snapshot_to(&mut self, node_id: u64, max_txid: Txid) -> Vec<u8> {
        let commit = self.pages.keys().max().copied().unwrap_or(0);
        let post = self.checksum();

        let header = Header {
            flags: FLAG_SNAPSHOT,
            page_size: self.page_size,
            commit,
            min_txid: Txid(1),
            max_txid,
            timestamp_ms: 0,
            pre_apply_checksum: 0,
            node_id,
        };

        let mut encoder = Encoder::new(Vec::new(), header).unwrap();
        for (&pgno, data) in &self.pages {
            encoder.write_page(pgno, data).unwrap();
        }
        let file = encoder.finish(post).unwrap();

        self.pos = Pos::new(max_txid, post);
        file
    }
}

// ---- misc ------------------------------------------------------------------

/// Polls `cond` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

pub fn page(fill: u8, page_size: u32) -> Vec<u8> {
    vec![fill; page_size as usize]
}
