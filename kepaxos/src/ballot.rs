//! Ballots are 32-bit totally ordered proposal identifiers.  The low 8 bits name the
//! originating replica; the upper 24 bits are a monotonically non-decreasing counter.  Ballots
//! compare by their raw numeric value, which is equivalent to lexicographic `(counter,
//! replica)` comparison because the counter occupies the high bits.

/// A 32-bit ballot number.  See the module documentation for the bit layout.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Ballot(u32);

impl Ballot {
    /// The smallest possible ballot.
    pub const BOTTOM: Ballot = Ballot(0);

    /// The largest possible ballot.
    pub const TOP: Ballot = Ballot(u32::MAX);

    /// Wrap a raw wire value as a ballot.
    pub fn new(raw: u32) -> Self {
        Ballot(raw)
    }

    /// The raw wire value of this ballot.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// The replica that originated this ballot.
    pub fn replica_index(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// The monotonic counter embedded in this ballot.
    pub fn counter(&self) -> u32 {
        self.0 >> 8
    }

    /// Mint a ballot from an explicit `(counter, replica)` pair.
    pub fn mint(counter: u32, replica_index: u8) -> Self {
        Ballot((counter << 8) | replica_index as u32)
    }

    /// Advance this ballot past itself for a new local proposal: bump the counter by one and
    /// re-embed `replica_index` in the low bits.  Used by `run_command` to mint a ballot under
    /// which the local replica can propose.
    pub fn advance(self, replica_index: u8) -> Self {
        Ballot::mint(self.counter() + 1, replica_index)
    }

    /// Fold an observed ballot into a local one: the local ballot becomes the larger of itself
    /// and a freshly minted ballot that advances past whatever was observed.  This is the
    /// "advance high-24, re-embed index" rule every message handler applies before touching
    /// the in-flight table, guaranteeing the local ballot never decreases and that any ballot
    /// this replica subsequently originates exceeds every ballot it has seen.
    pub fn observe(self, seen: Ballot, replica_index: u8) -> Self {
        std::cmp::max(self, seen.advance(replica_index))
    }
}
