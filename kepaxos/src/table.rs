//! The process-local in-flight command table: one entry per key for whichever command is
//! currently being driven to commit.  Access is serialized by the engine's mutex; this module
//! only defines the data held under it.

use std::collections::HashMap;

use crate::ballot::Ballot;
use crate::wire::MsgType;

////////////////////////////////////////////// CommandStatus ///////////////////////////////////////

/// The status of an in-flight command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandStatus {
    None,
    PreAccepted,
    Accepted,
    Committed,
}

/////////////////////////////////////////////// Vote ///////////////////////////////////////////////

/// A single peer's response, accumulated while an entry awaits quorum.  Votes are keyed by peer
/// index in [CommandEntry], so a peer can only ever contribute its most recent vote — this
/// closes the "duplicate votes from a misbehaving transport" gap the protocol itself leaves
/// open.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vote {
    pub peer: usize,
    pub ballot: Ballot,
    pub seq: u32,
    pub committed: bool,
}

////////////////////////////////////////////// CommandEntry ////////////////////////////////////////

/// The in-flight state for a command driving toward commit on some key.
#[derive(Clone, Debug)]
pub struct CommandEntry {
    pub cmd_type: u8,
    pub status: CommandStatus,
    pub ballot: Ballot,
    pub seq: u32,
    pub key: Vec<u8>,
    pub data: Vec<u8>,
    pub votes: HashMap<usize, Vote>,
    pub max_seq_seen: u32,
    pub max_voter: Option<usize>,
    pub msg_kind_awaited: Option<MsgType>,
}

impl CommandEntry {
    /// Start a brand new entry for a locally originated command.
    pub fn new(cmd_type: u8, key: Vec<u8>, data: Vec<u8>, ballot: Ballot, seq: u32) -> Self {
        Self {
            cmd_type,
            status: CommandStatus::PreAccepted,
            ballot,
            seq,
            key,
            data,
            votes: HashMap::new(),
            max_seq_seen: 0,
            max_voter: None,
            msg_kind_awaited: Some(MsgType::PreAcceptResp),
        }
    }

    /// Record a vote from `peer`, updating the running maximum seq and its reporter.  Returns
    /// true if `peer` had not already voted (i.e. the vote count grew).
    pub fn record_vote(&mut self, peer: usize, ballot: Ballot, seq: u32, committed: bool) -> bool {
        let is_new = !self.votes.contains_key(&peer);
        self.votes.insert(
            peer,
            Vote {
                peer,
                ballot,
                seq,
                committed,
            },
        );
        if seq > self.max_seq_seen {
            self.max_seq_seen = seq;
            self.max_voter = Some(peer);
        }
        is_new
    }

    /// The highest-seq vote reporting `committed = true` at a seq exceeding `seq`, if any —
    /// the signal that a peer is already ahead of this command and recovery should run instead
    /// of committing.
    pub fn committed_vote_exceeding(&self, seq: u32) -> Option<(usize, u32)> {
        self.votes
            .values()
            .filter(|v| v.committed && v.seq > seq)
            .max_by_key(|v| v.seq)
            .map(|v| (v.peer, v.seq))
    }

    /// Reset the accumulated votes and aggregates, e.g. when entering the slow path or retrying
    /// at a higher ballot.
    pub fn reset_votes(&mut self) {
        self.votes.clear();
        self.max_seq_seen = 0;
        self.max_voter = None;
    }

    /// The number of distinct peers who have voted so far.
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// The number of votes agreeing with `(ballot, seq)` exactly.
    pub fn agreeing_votes(&self, ballot: Ballot, seq: u32) -> usize {
        self.votes
            .values()
            .filter(|v| v.ballot == ballot && v.seq == seq)
            .count()
    }
}

////////////////////////////////////////////// InFlightTable ///////////////////////////////////////

/// Process-local map from key to its current in-flight command, if any.
#[derive(Default)]
pub struct InFlightTable {
    entries: HashMap<Vec<u8>, CommandEntry>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&CommandEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut CommandEntry> {
        self.entries.get_mut(key)
    }

    /// Install `entry` for `key`, replacing and discarding any entry already present.
    pub fn insert_or_replace(&mut self, key: Vec<u8>, entry: CommandEntry) {
        self.entries.insert(key, entry);
    }

    /// Remove and return the entry for `key`, if any.
    pub fn remove(&mut self, key: &[u8]) -> Option<CommandEntry> {
        self.entries.remove(key)
    }

    /// The number of keys with an in-flight entry.  Exposed for tests asserting invariant 5 (at
    /// most one entry per key — trivially true of a `HashMap`, but useful for asserting overall
    /// table size in scenario tests).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CommandEntry {
        CommandEntry::new(0, b"k".to_vec(), b"v".to_vec(), Ballot::new(0x100), 0)
    }

    #[test]
    fn insert_get_remove() {
        let mut table = InFlightTable::new();
        assert!(table.get(b"k").is_none());
        table.insert_or_replace(b"k".to_vec(), entry());
        assert!(table.get(b"k").is_some());
        let removed = table.remove(b"k");
        assert!(removed.is_some());
        assert!(table.get(b"k").is_none());
    }

    #[test]
    fn insert_or_replace_discards_previous() {
        let mut table = InFlightTable::new();
        table.insert_or_replace(b"k".to_vec(), entry());
        let mut second = entry();
        second.seq = 7;
        table.insert_or_replace(b"k".to_vec(), second);
        assert_eq!(table.get(b"k").unwrap().seq, 7);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_vote_from_same_peer_does_not_inflate_count() {
        let mut e = entry();
        assert!(e.record_vote(1, Ballot::new(0x200), 3, false));
        assert_eq!(e.vote_count(), 1);
        assert!(!e.record_vote(1, Ballot::new(0x200), 3, false));
        assert_eq!(e.vote_count(), 1);
    }

    #[test]
    fn max_voter_tracks_highest_seq() {
        let mut e = entry();
        e.record_vote(0, Ballot::new(0x100), 2, false);
        e.record_vote(1, Ballot::new(0x100), 9, false);
        e.record_vote(2, Ballot::new(0x100), 4, false);
        assert_eq!(e.max_seq_seen, 9);
        assert_eq!(e.max_voter, Some(1));
    }

    #[test]
    fn committed_vote_exceeding_finds_recovery_signal() {
        let mut e = entry();
        e.record_vote(0, Ballot::new(0x100), 0, false);
        e.record_vote(1, Ballot::new(0x100), 10, true);
        assert_eq!(e.committed_vote_exceeding(0), Some((1, 10)));
        assert_eq!(e.committed_vote_exceeding(20), None);
    }
}
