//! Durable per-key log: a persistent mapping `key -> (ballot, seq)` backed by SQLite, mirroring
//! the schema and access pattern of the reference C implementation's `kepaxos_context`.

use std::hash::Hasher;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use siphasher::sip::SipHasher13;

use crate::ballot::Ballot;
use crate::error::Error;

// Two independent, fixed 128-bit keys.  Distinct keys keep the pair of hashes from colliding in
// lockstep on adversarial input; neither key is secret, they merely need to differ.
const KEYHASH1_K0: u64 = 0x9e3779b97f4a7c15;
const KEYHASH1_K1: u64 = 0xbf58476d1ce4e5b9;
const KEYHASH2_K0: u64 = 0x94d049bb133111eb;
const KEYHASH2_K1: u64 = 0x2545f4914f6cdd1d;

fn keyed_hash(key: &[u8], k0: u64, k1: u64) -> i64 {
    let mut hasher = SipHasher13::new_with_keys(k0, k1);
    hasher.write(key);
    hasher.finish() as i64
}

fn keyhashes(key: &[u8]) -> (i64, i64) {
    (
        keyed_hash(key, KEYHASH1_K0, KEYHASH1_K1),
        keyed_hash(key, KEYHASH2_K0, KEYHASH2_K1),
    )
}

/////////////////////////////////////////////// DurableLog /////////////////////////////////////////

/// The per-key durable log.  Only the latest `(ballot, seq)` per key is kept; history is not
/// preserved.  Callers must serialize access (the engine does so with its single mutex).
pub struct DurableLog {
    conn: Connection,
}

impl DurableLog {
    /// Open (creating if absent) the durable log at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS durable_log (
                ballot INTEGER NOT NULL,
                keyhash1 INTEGER NOT NULL,
                keyhash2 INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                PRIMARY KEY (keyhash1, keyhash2)
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Open a purely in-memory log, for tests.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::open(":memory:")
    }

    /// The largest seq previously recorded for `key`, or 0 if none.
    pub fn max_seq(&self, key: &[u8]) -> Result<u32, Error> {
        let (keyhash1, keyhash2) = keyhashes(key);
        let mut stmt = self.conn.prepare_cached(
            "SELECT seq FROM durable_log WHERE keyhash1 = ?1 AND keyhash2 = ?2",
        )?;
        let seq: Option<i64> = stmt
            .query_row(params![keyhash1, keyhash2], |row| row.get(0))
            .optional()?;
        Ok(seq.unwrap_or(0) as u32)
    }

    /// Atomically upsert `(ballot, seq)` for `key`.  Later calls overwrite earlier ones.
    pub fn record(&self, key: &[u8], ballot: Ballot, seq: u32) -> Result<(), Error> {
        let (keyhash1, keyhash2) = keyhashes(key);
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO durable_log (ballot, keyhash1, keyhash2, seq) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![ballot.as_u32(), keyhash1, keyhash2, seq as i64])?;
        Ok(())
    }
}
