use biometrics::Counter;
use tatl::{HeyListen, Stationary};
use zerror_core::ErrorCore;

use crate::ballot::Ballot;

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// The error type returned by every fallible operation in this crate.
///
/// Every variant carries a `core: ErrorCore` first, mirroring the convention used elsewhere in
/// this codebase for `zerror_derive::Z`-derived enums: `core()`/`core_mut()` and the `Z` trait
/// impl are generated from that field, and `Success` exists purely as the zero variant.
#[derive(zerror_derive::Z)]
pub enum Error {
    /// The non-error placeholder.
    Success { core: ErrorCore },
    /// Wire bytes could not be decoded: too short, or `klen`/`dlen` overrun the buffer.
    Decode { core: ErrorCore, reason: String },
    /// A message or command arrived under a ballot older than one already seen for its key.
    StaleBallot {
        core: ErrorCore,
        have: Ballot,
        got: Ballot,
    },
    /// A COMMIT arrived for a seq older than the last one recorded for its key.
    StaleState {
        core: ErrorCore,
        key: Vec<u8>,
        last: u32,
        got: u32,
    },
    /// The durable log failed to read or write.
    Storage { core: ErrorCore, what: String },
    /// The host's `send` callback returned failure.
    Transport { core: ErrorCore, what: String },
}

impl Default for Error {
    fn default() -> Self {
        Self::Success {
            core: ErrorCore::default(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(what: rusqlite::Error) -> Self {
        STORAGE_ERROR.click();
        Self::Storage {
            core: ErrorCore::default(),
            what: what.to_string(),
        }
    }
}

impl Error {
    /// Construct a [Error::Decode] for `reason`, clicking its counter.
    pub fn decode(reason: impl Into<String>) -> Self {
        DECODE_ERROR.click();
        Self::Decode {
            core: ErrorCore::default(),
            reason: reason.into(),
        }
    }

    /// Construct a [Error::StaleBallot], clicking its counter.
    pub fn stale_ballot(have: Ballot, got: Ballot) -> Self {
        STALE_BALLOT.click();
        Self::StaleBallot {
            core: ErrorCore::default(),
            have,
            got,
        }
    }

    /// Construct a [Error::StaleState], clicking its counter.
    pub fn stale_state(key: Vec<u8>, last: u32, got: u32) -> Self {
        STALE_STATE.click();
        Self::StaleState {
            core: ErrorCore::default(),
            key,
            last,
            got,
        }
    }

    /// Construct a [Error::Transport], clicking its counter.
    pub fn transport(what: impl Into<String>) -> Self {
        TRANSPORT_ERROR.click();
        Self::Transport {
            core: ErrorCore::default(),
            what: what.into(),
        }
    }
}

zerror::iotoz! {Error}

//////////////////////////////////////////////// monitors //////////////////////////////////////////

static DECODE_ERROR: Counter = Counter::new("kepaxos.error.decode");
static DECODE_ERROR_MONITOR: Stationary = Stationary::new("kepaxos.error.decode", &DECODE_ERROR);

static STALE_BALLOT: Counter = Counter::new("kepaxos.error.stale_ballot");
static STALE_BALLOT_MONITOR: Stationary = Stationary::new("kepaxos.error.stale_ballot", &STALE_BALLOT);

static STALE_STATE: Counter = Counter::new("kepaxos.error.stale_state");
static STALE_STATE_MONITOR: Stationary = Stationary::new("kepaxos.error.stale_state", &STALE_STATE);

static STORAGE_ERROR: Counter = Counter::new("kepaxos.error.storage");
static STORAGE_ERROR_MONITOR: Stationary = Stationary::new("kepaxos.error.storage", &STORAGE_ERROR);

static TRANSPORT_ERROR: Counter = Counter::new("kepaxos.error.transport");
static TRANSPORT_ERROR_MONITOR: Stationary =
    Stationary::new("kepaxos.error.transport", &TRANSPORT_ERROR);

/// Register this crate's monitors with `hey_listen` so that a host process can alert on
/// sustained error conditions rather than one-off clicks.
pub fn register_monitors(hey_listen: &mut HeyListen) {
    hey_listen.register_stationary(&DECODE_ERROR_MONITOR);
    hey_listen.register_stationary(&STALE_BALLOT_MONITOR);
    hey_listen.register_stationary(&STALE_STATE_MONITOR);
    hey_listen.register_stationary(&STORAGE_ERROR_MONITOR);
    hey_listen.register_stationary(&TRANSPORT_ERROR_MONITOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use biometrics::Sensor;

    #[test]
    fn default_is_success() {
        match Error::default() {
            Error::Success { .. } => {}
            _ => panic!("default should be Success"),
        }
    }

    #[test]
    fn constructors_click_counters() {
        let before = DECODE_ERROR.read();
        let _ = Error::decode("short buffer");
        assert_eq!(DECODE_ERROR.read(), before + 1);
    }
}
