//! The protocol engine: the state machine driving a command through PRE_ACCEPT -> (fast)
//! COMMIT or (slow) ACCEPT -> COMMIT, quorum counting, and the fallback/recovery triggers.
//!
//! `run_command` and `on_message` may be called concurrently from multiple threads; all state
//! transitions occur under a single mutex guarding both the in-flight table and the durable
//! log.  `send` and `recover` are invoked with that mutex released.  `commit` is invoked with
//! the mutex held, immediately followed by the durable log write, so the two can never be
//! interleaved by a concurrent COMMIT for the same key; the mutex is released again before any
//! subsequent broadcast.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::ballot::Ballot;
use crate::error::Error;
use crate::log::DurableLog;
use crate::table::{CommandEntry, CommandStatus, InFlightTable};
use crate::wire::{Message, MsgType};

///////////////////////////////////////////// HostCallbacks ////////////////////////////////////////

/// Host-supplied collaborators the engine calls out to.  Peers are addressed by their index
/// into the engine's peer list, not by label, so the host can resolve an index to a transport
/// endpoint however it likes.
pub trait HostCallbacks: Send + Sync {
    /// Best-effort delivery of an opaque byte buffer to each of `recipients`.
    fn send(&self, recipients: &[usize], msg: &[u8]) -> Result<(), Error>;
    /// Apply a committed mutation.  Must be idempotent per `(key, seq)`.
    fn commit(&self, cmd_type: u8, key: &[u8], data: &[u8]) -> Result<(), Error>;
    /// Fetch the latest state for `key` from `peer`, which has reported itself ahead.
    fn recover(&self, peer: usize, key: &[u8], seq: u32) -> Result<(), Error>;
}

//////////////////////////////////////////////// Inner //////////////////////////////////////////////

struct Inner {
    table: InFlightTable,
    log: DurableLog,
}

//////////////////////////////////////////////// Engine /////////////////////////////////////////////

/// The per-key egalitarian Paxos engine for a single replica.
pub struct Engine<C: HostCallbacks> {
    my_index: u8,
    peers: Vec<String>,
    local_ballot: AtomicU32,
    inner: Mutex<Inner>,
    callbacks: C,
    timeout: Option<Duration>,
}

impl<C: HostCallbacks> Engine<C> {
    /// Open (creating if absent) the durable log at `db_path` and construct an engine for
    /// replica `my_index` among `peers`.  `timeout`, if set, is not read by the engine itself;
    /// it exists so a host can record the retry cadence it intends to drive `run_command` at.
    pub fn create<P: AsRef<Path>>(
        db_path: P,
        peers: Vec<String>,
        my_index: u8,
        callbacks: C,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let log = DurableLog::open(db_path)?;
        Ok(Self {
            my_index,
            peers,
            local_ballot: AtomicU32::new(Ballot::mint(0, my_index).as_u32()),
            inner: Mutex::new(Inner {
                table: InFlightTable::new(),
                log,
            }),
            callbacks,
            timeout,
        })
    }

    /// This replica's index into its peer list.
    pub fn my_index(&self) -> u8 {
        self.my_index
    }

    /// The full peer list, including this replica.
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// The host-recorded retry cadence, if any.  Never consulted by the engine.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The engine's current view of the local ballot.
    pub fn local_ballot(&self) -> Ballot {
        Ballot::new(self.local_ballot.load(Ordering::SeqCst))
    }

    /// The host callbacks this engine was constructed with.  Exposed so test harnesses can
    /// inspect a mock transport's recorded state.
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// Quorum size: `floor(N/2)` of the full replica set, including self.
    fn quorum(&self) -> usize {
        self.peers.len() / 2
    }

    fn recipients_except_self(&self) -> Vec<usize> {
        (0..self.peers.len())
            .filter(|&i| i as u8 != self.my_index)
            .collect()
    }

    /// Fold an observed ballot into the process-wide local ballot, returning the new value.
    fn observe_ballot(&self, seen: Ballot) -> Ballot {
        loop {
            let current = Ballot::new(self.local_ballot.load(Ordering::SeqCst));
            let next = current.observe(seen, self.my_index);
            if next == current {
                return current;
            }
            if self
                .local_ballot
                .compare_exchange(current.as_u32(), next.as_u32(), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Mint a fresh ballot this replica can propose under.
    fn mint_ballot(&self) -> Ballot {
        loop {
            let current = Ballot::new(self.local_ballot.load(Ordering::SeqCst));
            let next = current.advance(self.my_index);
            if self
                .local_ballot
                .compare_exchange(current.as_u32(), next.as_u32(), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }

    fn send_to(&self, peer: usize, msg: &Message) -> Result<(), Error> {
        self.callbacks.send(&[peer], &msg.encode())
    }

    fn broadcast_except_self(&self, msg: &Message) -> Result<(), Error> {
        let recipients = self.recipients_except_self();
        if recipients.is_empty() {
            return Ok(());
        }
        self.callbacks.send(&recipients, &msg.encode())
    }

    /// Apply a committed mutation, record it durably, and broadcast COMMIT.  Shared by the
    /// PRE_ACCEPT_RESP fast path and the ACCEPT_RESP ok-quorum path.  The commit callback and
    /// the durable write happen under one held lock so a concurrent COMMIT for the same key
    /// cannot land between them.
    fn finish_commit(
        &self,
        cmd_type: u8,
        key: &[u8],
        data: &[u8],
        ballot: Ballot,
        seq: u32,
    ) -> Result<(), Error> {
        {
            let inner = self.inner.lock().unwrap();
            self.callbacks.commit(cmd_type, key, data)?;
            inner.log.record(key, ballot, seq)?;
        }
        let msg = Message {
            ballot,
            seq,
            msg_type: MsgType::Commit,
            cmd_type,
            committed: false,
            key: key.to_vec(),
            data: data.to_vec(),
        };
        self.broadcast_except_self(&msg)
    }

    /// Start agreement on a new command for `key`.  Installs a fresh in-flight entry
    /// (overwriting any existing one for the same key) and broadcasts PRE_ACCEPT.
    pub fn run_command(&self, cmd_type: u8, key: &[u8], data: &[u8]) -> Result<(), Error> {
        let (ballot, seq) = {
            let mut inner = self.inner.lock().unwrap();
            let local_seq = inner.log.max_seq(key)?;
            let entry_seq = inner.table.get(key).map(|e| e.seq).unwrap_or(0);
            let new_seq = std::cmp::max(local_seq, entry_seq);
            let ballot = self.mint_ballot();
            let entry = CommandEntry::new(cmd_type, key.to_vec(), data.to_vec(), ballot, new_seq);
            inner.table.insert_or_replace(key.to_vec(), entry);
            (ballot, new_seq)
        };
        let msg = Message {
            ballot,
            seq,
            msg_type: MsgType::PreAccept,
            cmd_type,
            committed: false,
            key: key.to_vec(),
            data: Vec::new(),
        };
        self.broadcast_except_self(&msg)
    }

    /// Feed an inbound message from the transport.
    pub fn on_message(&self, peer: usize, bytes: &[u8]) -> Result<(), Error> {
        let msg = Message::decode(bytes)?;
        match msg.msg_type {
            MsgType::PreAccept => self.handle_pre_accept(peer, &msg),
            MsgType::PreAcceptResp => self.handle_pre_accept_resp(peer, &msg),
            MsgType::Accept => self.handle_accept(peer, &msg),
            MsgType::AcceptResp => self.handle_accept_resp(peer, &msg),
            MsgType::Commit => self.handle_commit(peer, &msg),
        }
    }

    fn handle_pre_accept(&self, peer: usize, msg: &Message) -> Result<(), Error> {
        let local_ballot = self.observe_ballot(msg.ballot);
        let response = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(e) = inner.table.get(&msg.key) {
                if msg.ballot < e.ballot {
                    return Err(Error::stale_ballot(e.ballot, msg.ballot));
                }
            }
            let local_seq = inner.log.max_seq(&msg.key)?;
            let interfering = match inner.table.get_mut(&msg.key) {
                Some(e) => {
                    e.ballot = std::cmp::max(e.ballot, msg.ballot);
                    e.seq
                }
                None => 0,
            };
            let interfering = std::cmp::max(interfering, local_seq);
            let max_seq = std::cmp::max(msg.seq, interfering);
            if max_seq == msg.seq {
                match inner.table.get_mut(&msg.key) {
                    Some(e) => e.status = CommandStatus::PreAccepted,
                    None => {
                        let entry = CommandEntry::new(
                            msg.cmd_type,
                            msg.key.clone(),
                            Vec::new(),
                            msg.ballot,
                            msg.seq,
                        );
                        inner.table.insert_or_replace(msg.key.clone(), entry);
                    }
                }
            }
            let committed_flag = max_seq == local_seq;
            Message {
                ballot: local_ballot,
                seq: max_seq,
                msg_type: MsgType::PreAcceptResp,
                cmd_type: 0,
                committed: committed_flag,
                key: msg.key.clone(),
                data: Vec::new(),
            }
        };
        self.send_to(peer, &response)
    }

    fn handle_pre_accept_resp(&self, peer: usize, msg: &Message) -> Result<(), Error> {
        enum Action {
            Wait,
            FastCommit {
                cmd_type: u8,
                key: Vec<u8>,
                data: Vec<u8>,
                ballot: Ballot,
                seq: u32,
            },
            Recover {
                peer: usize,
                key: Vec<u8>,
                seq: u32,
            },
            SlowAccept {
                ballot: Ballot,
                key: Vec<u8>,
                seq: u32,
            },
        }
        let quorum = self.quorum();
        let action = {
            let mut inner = self.inner.lock().unwrap();
            let drop_message = match inner.table.get(&msg.key) {
                None => true,
                Some(e) => msg.ballot < e.ballot || e.status != CommandStatus::PreAccepted,
            };
            if drop_message {
                return Ok(());
            }
            let entry = inner.table.get_mut(&msg.key).unwrap();
            entry.record_vote(peer, msg.ballot, msg.seq, msg.committed);
            let vote_count = entry.vote_count();
            let entry_seq = entry.seq;
            let max_seq_seen = entry.max_seq_seen;
            let committed_exceeding = entry.committed_vote_exceeding(entry_seq);

            if vote_count < quorum {
                Action::Wait
            } else if entry_seq >= max_seq_seen {
                let removed = inner.table.remove(&msg.key).unwrap();
                Action::FastCommit {
                    cmd_type: removed.cmd_type,
                    key: removed.key,
                    data: removed.data,
                    ballot: removed.ballot,
                    seq: removed.seq,
                }
            } else if let Some((voter, voter_seq)) = committed_exceeding {
                inner.table.remove(&msg.key);
                Action::Recover {
                    peer: voter,
                    key: msg.key.clone(),
                    seq: voter_seq,
                }
            } else {
                let new_seq = max_seq_seen + 1;
                let ballot = Ballot::new(self.local_ballot.load(Ordering::SeqCst));
                let entry = inner.table.get_mut(&msg.key).unwrap();
                entry.seq = new_seq;
                entry.ballot = ballot;
                entry.status = CommandStatus::Accepted;
                entry.msg_kind_awaited = Some(MsgType::AcceptResp);
                entry.reset_votes();
                Action::SlowAccept {
                    ballot,
                    key: msg.key.clone(),
                    seq: new_seq,
                }
            }
        };
        match action {
            Action::Wait => Ok(()),
            Action::FastCommit {
                cmd_type,
                key,
                data,
                ballot,
                seq,
            } => self.finish_commit(cmd_type, &key, &data, ballot, seq),
            Action::Recover { peer, key, seq } => self.callbacks.recover(peer, &key, seq),
            Action::SlowAccept { ballot, key, seq } => {
                let accept = Message {
                    ballot,
                    seq,
                    msg_type: MsgType::Accept,
                    cmd_type: 0,
                    committed: false,
                    key,
                    data: Vec::new(),
                };
                self.broadcast_except_self(&accept)
            }
        }
    }

    fn handle_accept(&self, peer: usize, msg: &Message) -> Result<(), Error> {
        // This replica is acknowledging the initiator's proposal, not originating a ballot of
        // its own, so the response echoes msg.ballot rather than the local ballot counter.
        self.observe_ballot(msg.ballot);
        let response = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(e) = inner.table.get(&msg.key) {
                if msg.ballot < e.ballot {
                    return Ok(());
                }
            }
            let tell_newer = match inner.table.get(&msg.key) {
                Some(e) if msg.seq < e.seq => Some((e.ballot, e.seq)),
                _ => None,
            };
            if let Some((ballot, seq)) = tell_newer {
                Message {
                    ballot,
                    seq,
                    msg_type: MsgType::AcceptResp,
                    cmd_type: 0,
                    committed: false,
                    key: msg.key.clone(),
                    data: Vec::new(),
                }
            } else {
                match inner.table.get_mut(&msg.key) {
                    Some(e) => {
                        e.seq = msg.seq;
                        e.ballot = msg.ballot;
                        e.status = CommandStatus::Accepted;
                    }
                    None => {
                        let mut entry = CommandEntry::new(
                            msg.cmd_type,
                            msg.key.clone(),
                            Vec::new(),
                            msg.ballot,
                            msg.seq,
                        );
                        entry.status = CommandStatus::Accepted;
                        inner.table.insert_or_replace(msg.key.clone(), entry);
                    }
                }
                Message {
                    ballot: msg.ballot,
                    seq: msg.seq,
                    msg_type: MsgType::AcceptResp,
                    cmd_type: 0,
                    committed: false,
                    key: msg.key.clone(),
                    data: Vec::new(),
                }
            }
        };
        self.send_to(peer, &response)
    }

    fn handle_accept_resp(&self, peer: usize, msg: &Message) -> Result<(), Error> {
        enum Action {
            Wait,
            Commit {
                cmd_type: u8,
                key: Vec<u8>,
                data: Vec<u8>,
                ballot: Ballot,
                seq: u32,
            },
            Retry {
                ballot: Ballot,
                key: Vec<u8>,
                seq: u32,
            },
        }
        let quorum = self.quorum();
        let action = {
            let mut inner = self.inner.lock().unwrap();
            let drop_message = match inner.table.get(&msg.key) {
                None => true,
                Some(e) => e.status != CommandStatus::Accepted || msg.ballot < e.ballot,
            };
            if drop_message {
                return Ok(());
            }
            let entry = inner.table.get_mut(&msg.key).unwrap();
            entry.record_vote(peer, msg.ballot, msg.seq, msg.committed);
            let ok = entry.agreeing_votes(entry.ballot, entry.seq);
            let total = entry.vote_count();
            let entry_seq = entry.seq;
            let max_seq_seen = entry.max_seq_seen;

            if ok >= quorum {
                let removed = inner.table.remove(&msg.key).unwrap();
                Action::Commit {
                    cmd_type: removed.cmd_type,
                    key: removed.key,
                    data: removed.data,
                    ballot: removed.ballot,
                    seq: removed.seq,
                }
            } else if total >= quorum {
                let ballot = Ballot::new(self.local_ballot.load(Ordering::SeqCst));
                let entry = inner.table.get_mut(&msg.key).unwrap();
                if entry_seq <= max_seq_seen {
                    entry.seq += 1;
                }
                entry.ballot = ballot;
                entry.reset_votes();
                Action::Retry {
                    ballot,
                    key: msg.key.clone(),
                    seq: entry.seq,
                }
            } else {
                Action::Wait
            }
        };
        match action {
            Action::Wait => Ok(()),
            Action::Commit {
                cmd_type,
                key,
                data,
                ballot,
                seq,
            } => self.finish_commit(cmd_type, &key, &data, ballot, seq),
            Action::Retry { ballot, key, seq } => {
                let accept = Message {
                    ballot,
                    seq,
                    msg_type: MsgType::Accept,
                    cmd_type: 0,
                    committed: false,
                    key,
                    data: Vec::new(),
                };
                self.broadcast_except_self(&accept)
            }
        }
    }

    fn handle_commit(&self, _peer: usize, msg: &Message) -> Result<(), Error> {
        self.observe_ballot(msg.ballot);
        let mut inner = self.inner.lock().unwrap();
        if let Some(e) = inner.table.get(&msg.key) {
            if e.seq == msg.seq && e.ballot > msg.ballot {
                return Ok(());
            }
        }
        let last = inner.log.max_seq(&msg.key)?;
        if msg.seq < last {
            return Err(Error::stale_state(msg.key.clone(), last, msg.seq));
        }
        let should_remove = inner
            .table
            .get(&msg.key)
            .map(|e| e.seq == msg.seq)
            .unwrap_or(false);
        self.callbacks.commit(msg.cmd_type, &msg.key, &msg.data)?;
        inner.log.record(&msg.key, msg.ballot, msg.seq)?;
        if should_remove {
            inner.table.remove(&msg.key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingCallbacks {
        sent: StdMutex<Vec<(Vec<usize>, Vec<u8>)>>,
        committed: StdMutex<Vec<(u8, Vec<u8>, Vec<u8>)>>,
        recovered: StdMutex<Vec<(usize, Vec<u8>, u32)>>,
    }

    impl HostCallbacks for RecordingCallbacks {
        fn send(&self, recipients: &[usize], msg: &[u8]) -> Result<(), Error> {
            self.sent
                .lock()
                .unwrap()
                .push((recipients.to_vec(), msg.to_vec()));
            Ok(())
        }

        fn commit(&self, cmd_type: u8, key: &[u8], data: &[u8]) -> Result<(), Error> {
            self.committed
                .lock()
                .unwrap()
                .push((cmd_type, key.to_vec(), data.to_vec()));
            Ok(())
        }

        fn recover(&self, peer: usize, key: &[u8], seq: u32) -> Result<(), Error> {
            self.recovered.lock().unwrap().push((peer, key.to_vec(), seq));
            Ok(())
        }
    }

    fn engine(my_index: u8, num_peers: usize) -> Engine<RecordingCallbacks> {
        let peers = (0..num_peers).map(|i| format!("peer{i}")).collect();
        Engine::create(
            ":memory:",
            peers,
            my_index,
            RecordingCallbacks::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn run_command_broadcasts_pre_accept_to_all_but_self() {
        let e = engine(0, 3);
        e.run_command(1, b"k", b"v").unwrap();
        let sent = e.callbacks.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (recipients, bytes) = &sent[0];
        assert_eq!(recipients, &vec![1, 2]);
        let msg = Message::decode(bytes).unwrap();
        assert_eq!(msg.msg_type, MsgType::PreAccept);
        assert_eq!(msg.seq, 0);
        assert_eq!(msg.ballot.replica_index(), 0);
    }

    #[test]
    fn run_command_installs_in_flight_entry() {
        let e = engine(0, 3);
        e.run_command(1, b"k", b"v").unwrap();
        let inner = e.inner.lock().unwrap();
        let entry = inner.table.get(b"k").unwrap();
        assert_eq!(entry.status, CommandStatus::PreAccepted);
        assert_eq!(entry.seq, 0);
    }

    #[test]
    fn two_peer_fast_path_commits_after_one_response() {
        // Boundary behavior 8: with N=2, floor(N/2)=1, a single peer vote suffices.
        let e = engine(0, 2);
        e.run_command(7, b"k", b"v").unwrap();
        let ballot = {
            let inner = e.inner.lock().unwrap();
            inner.table.get(b"k").unwrap().ballot
        };
        let resp = Message {
            ballot,
            seq: 0,
            msg_type: MsgType::PreAcceptResp,
            cmd_type: 0,
            committed: false,
            key: b"k".to_vec(),
            data: Vec::new(),
        };
        e.on_message(1, &resp.encode()).unwrap();
        let committed = e.callbacks.committed.lock().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0], (7, b"k".to_vec(), b"v".to_vec()));
        assert!(e.inner.lock().unwrap().table.is_empty());
    }

    #[test]
    fn stale_ballot_pre_accept_is_rejected() {
        let e = engine(0, 3);
        {
            let mut inner = e.inner.lock().unwrap();
            let entry = CommandEntry::new(0, b"k".to_vec(), Vec::new(), Ballot::new(0x500), 0);
            inner.table.insert_or_replace(b"k".to_vec(), entry);
        }
        let msg = Message {
            ballot: Ballot::new(0x100),
            seq: 0,
            msg_type: MsgType::PreAccept,
            cmd_type: 0,
            committed: false,
            key: b"k".to_vec(),
            data: Vec::new(),
        };
        let err = e.on_message(1, &msg.encode());
        assert!(err.is_err());
    }

    // Scenario C — stale COMMIT rejected.
    #[test]
    fn scenario_c_stale_commit_is_rejected() {
        let e = engine(2, 3);
        let fresh = Message {
            ballot: Ballot::new(0x100),
            seq: 5,
            msg_type: MsgType::Commit,
            cmd_type: 9,
            committed: false,
            key: b"k".to_vec(),
            data: b"v5".to_vec(),
        };
        e.on_message(0, &fresh.encode()).unwrap();
        assert_eq!(e.callbacks.committed.lock().unwrap().len(), 1);

        let stale = Message {
            ballot: Ballot::new(0x100),
            seq: 3,
            msg_type: MsgType::Commit,
            cmd_type: 9,
            committed: false,
            key: b"k".to_vec(),
            data: b"v3".to_vec(),
        };
        let err = e.on_message(0, &stale.encode());
        assert!(err.is_err());
        assert_eq!(e.callbacks.committed.lock().unwrap().len(), 1);
    }

    #[test]
    fn handle_accept_installs_entry_and_echoes_message_ballot() {
        let e = engine(1, 3);
        let msg = Message {
            ballot: Ballot::new(0x205),
            seq: 3,
            msg_type: MsgType::Accept,
            cmd_type: 4,
            committed: false,
            key: b"k".to_vec(),
            data: Vec::new(),
        };
        e.on_message(0, &msg.encode()).unwrap();

        {
            let inner = e.inner.lock().unwrap();
            let entry = inner.table.get(b"k").unwrap();
            assert_eq!(entry.status, CommandStatus::Accepted);
            assert_eq!(entry.seq, 3);
            assert_eq!(entry.ballot, Ballot::new(0x205));
        }

        let sent = e.callbacks.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (recipients, bytes) = &sent[0];
        assert_eq!(recipients, &vec![0]);
        let resp = Message::decode(bytes).unwrap();
        assert_eq!(resp.msg_type, MsgType::AcceptResp);
        assert_eq!(resp.ballot, Ballot::new(0x205));
        assert_eq!(resp.seq, 3);
    }

    #[test]
    fn stale_ballot_accept_is_dropped_silently() {
        let e = engine(1, 3);
        {
            let mut inner = e.inner.lock().unwrap();
            let entry = CommandEntry::new(0, b"k".to_vec(), Vec::new(), Ballot::new(0x500), 0);
            inner.table.insert_or_replace(b"k".to_vec(), entry);
        }
        let msg = Message {
            ballot: Ballot::new(0x100),
            seq: 9,
            msg_type: MsgType::Accept,
            cmd_type: 0,
            committed: false,
            key: b"k".to_vec(),
            data: Vec::new(),
        };
        e.on_message(0, &msg.encode()).unwrap();
        assert!(e.callbacks.sent.lock().unwrap().is_empty());
        let inner = e.inner.lock().unwrap();
        let entry = inner.table.get(b"k").unwrap();
        assert_eq!(entry.ballot, Ballot::new(0x500));
        assert_eq!(entry.seq, 0);
    }

    // Scenario D — recover triggered.  With 3 replicas, quorum is floor(3/2) = 1 (the "bare
    // majority" fast-path policy documented in DESIGN.md), so a single response already
    // decides the command; here that one response reports a higher, already-committed seq.
    #[test]
    fn scenario_d_recover_triggered_on_higher_committed_peer() {
        let e = engine(0, 3);
        e.run_command(1, b"k", b"v").unwrap();
        let ballot = e.inner.lock().unwrap().table.get(b"k").unwrap().ballot;

        let resp_ahead = Message {
            ballot,
            seq: 10,
            msg_type: MsgType::PreAcceptResp,
            cmd_type: 0,
            committed: true,
            key: b"k".to_vec(),
            data: Vec::new(),
        };
        e.on_message(2, &resp_ahead.encode()).unwrap();
        let recovered = e.callbacks.recovered.lock().unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0], (2, b"k".to_vec(), 10));
        assert!(e.callbacks.committed.lock().unwrap().is_empty());
        assert!(e.inner.lock().unwrap().table.is_empty());
    }
}
