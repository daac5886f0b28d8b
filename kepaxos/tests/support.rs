//! A small in-process mock transport for wiring multiple [Engine] instances together without
//! real sockets.

use std::sync::Mutex;

use kepaxos::{Engine, Error, HostCallbacks};

/// Records everything a single engine's callbacks do, keyed to that engine's own index so an
/// external driver can route its outbox to the right peers.
pub struct Recording {
    pub outbox: Mutex<Vec<(Vec<usize>, Vec<u8>)>>,
    pub committed: Mutex<Vec<(u8, Vec<u8>, Vec<u8>)>>,
    pub recovered: Mutex<Vec<(usize, Vec<u8>, u32)>>,
}

impl Recording {
    pub fn new() -> Self {
        Self {
            outbox: Mutex::new(Vec::new()),
            committed: Mutex::new(Vec::new()),
            recovered: Mutex::new(Vec::new()),
        }
    }
}

impl Default for Recording {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCallbacks for Recording {
    fn send(&self, recipients: &[usize], msg: &[u8]) -> Result<(), Error> {
        self.outbox
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

/// Build `n` engines over an in-memory log apiece, sharing a peer list of their own indices.
pub fn make_engines(n: usize) -> Vec<Engine<Recording>> {
    let peers: Vec<String> = (0..n).map(|i| format!("r{i}")).collect();
    (0..n)
        .map(|i| Engine::create(":memory:", peers.clone(), i as u8, Recording::new(), None).unwrap())
        .collect()
}

/// Drain every engine's outbox and deliver queued messages to their recipients, repeating
/// until no engine has anything left to send.  Mirrors a synchronous, fully-connected network
/// with no loss or reordering beyond whatever interleaving the caller already queued up.
pub fn drain_and_deliver(engines: &[Engine<Recording>]) {
    loop {
        let mut batch = Vec::new();
        for e in engines.iter() {
            let mut outbox = e.callbacks().outbox.lock().unwrap();
            for (recipients, bytes) in outbox.drain(..) {
                batch.push((e.my_index() as usize, recipients, bytes));
            }
        }
        if batch.is_empty() {
            break;
        }
        for (from, recipients, bytes) in batch {
            for r in recipients {
                engines[r].on_message(from, &bytes).unwrap();
            }
        }
    }
}
