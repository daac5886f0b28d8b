//! Fixed-layout binary wire codec for the five protocol message types.
//!
//! Every message shares one layout, integers in network byte order:
//!
//! ```text
//! offset  size  field
//!   0     4     ballot
//!   4     4     seq
//!   8     1     msg_type
//!   9     1     cmd_type
//!  10     1     committed
//!  11     4     klen
//!  15     klen  key bytes
//!  15+klen 4    dlen
//!  19+klen dlen data bytes
//! ```
//!
//! Only COMMIT carries a meaningful `cmd_type` and `data`; responses set `dlen = 0`.

use crate::ballot::Ballot;
use crate::error::Error;

const FIXED_PREFIX_LEN: usize = 4 + 4 + 1 + 1 + 1 + 4;

/////////////////////////////////////////////// MsgType ////////////////////////////////////////////

/// The five protocol message kinds, numbered per the wire format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MsgType {
    PreAccept = 0,
    PreAcceptResp = 1,
    Accept = 2,
    AcceptResp = 3,
    Commit = 4,
}

impl MsgType {
    fn from_byte(b: u8) -> Result<Self, Error> {
        match b {
            0 => Ok(MsgType::PreAccept),
            1 => Ok(MsgType::PreAcceptResp),
            2 => Ok(MsgType::Accept),
            3 => Ok(MsgType::AcceptResp),
            4 => Ok(MsgType::Commit),
            _ => Err(Error::decode(format!("unknown msg_type byte {b}"))),
        }
    }
}

//////////////////////////////////////////////// Message ///////////////////////////////////////////

/// A decoded (or to-be-encoded) protocol message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub ballot: Ballot,
    pub seq: u32,
    pub msg_type: MsgType,
    pub cmd_type: u8,
    pub committed: bool,
    pub key: Vec<u8>,
    pub data: Vec<u8>,
}

impl Message {
    /// The number of bytes `encode` will produce for this message.
    pub fn pack_sz(&self) -> usize {
        FIXED_PREFIX_LEN + self.key.len() + 4 + self.data.len()
    }

    /// Encode this message into its fixed-layout wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.pack_sz());
        buf.extend_from_slice(&self.ballot.as_u32().to_be_bytes());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.push(self.msg_type as u8);
        buf.push(self.cmd_type);
        buf.push(self.committed as u8);
        buf.extend_from_slice(&(self.key.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Decode a message from its fixed-layout wire form, rejecting any buffer shorter than the
    /// fixed prefix or whose `klen`/`dlen` overrun the buffer.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < FIXED_PREFIX_LEN {
            return Err(Error::decode(format!(
                "buffer of {} bytes shorter than fixed prefix of {FIXED_PREFIX_LEN} bytes",
                buf.len()
            )));
        }
        let ballot = Ballot::new(u32::from_be_bytes(buf[0..4].try_into().unwrap()));
        let seq = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        let msg_type = MsgType::from_byte(buf[8])?;
        let cmd_type = buf[9];
        let committed = buf[10] != 0;
        let klen = u32::from_be_bytes(buf[11..15].try_into().unwrap()) as usize;
        let key_start = 15;
        let key_end = key_start
            .checked_add(klen)
            .ok_or_else(|| Error::decode("klen overflowed buffer offset"))?;
        if key_end + 4 > buf.len() {
            return Err(Error::decode(format!(
                "klen {klen} overruns buffer of {} bytes",
                buf.len()
            )));
        }
        let key = buf[key_start..key_end].to_vec();
        let dlen = u32::from_be_bytes(buf[key_end..key_end + 4].try_into().unwrap()) as usize;
        let data_start = key_end + 4;
        let data_end = data_start
            .checked_add(dlen)
            .ok_or_else(|| Error::decode("dlen overflowed buffer offset"))?;
        if data_end > buf.len() {
            return Err(Error::decode(format!(
                "dlen {dlen} overruns buffer of {} bytes",
                buf.len()
            )));
        }
        let data = buf[data_start..data_end].to_vec();
        Ok(Message {
            ballot,
            seq,
            msg_type,
            cmd_type,
            committed,
            key,
            data,
        })
    }
}
