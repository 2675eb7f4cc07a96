use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::Link;
use crate::core::{Error, Result};

/// What the scripted peer does when it receives a frame
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Bytes(Vec<u8>),
    Silence,
}

#[derive(Debug, Default)]
struct PeerState {
    open: bool,
    fail_open: bool,
    opens: usize,
    closes: usize,
    rx: VecDeque<u8>,
    replies: VecDeque<Reply>,
    written: Vec<Vec<u8>>,
}

/// Handle used to script and inspect a [`ScriptedLink`] after it has been
/// handed to a transport
#[derive(Debug, Clone, Default)]
pub struct ScriptedPeer {
    state: Arc<Mutex<PeerState>>,
}

impl ScriptedPeer {
    /// Queues bytes the peer sends in answer to the next unanswered write
    pub fn reply(&self, bytes: impl AsRef<[u8]>) -> &Self {
        self.lock()
            .replies
            .push_back(Reply::Bytes(bytes.as_ref().to_vec()));
        self
    }

    /// Queues a write the peer never answers
    pub fn silence(&self) -> &Self {
        self.lock().replies.push_back(Reply::Silence);
        self
    }

    /// Puts bytes on the wire right now, unsolicited
    pub fn inject(&self, bytes: impl AsRef<[u8]>) {
        self.lock().rx.extend(bytes.as_ref().iter().copied());
    }

    /// Makes subsequent `open` calls fail
    pub fn fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    /// Frames written by the host so far, as text
    pub fn written(&self) -> Vec<String> {
        self.lock()
            .written
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Number of successful opens
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Number of closes of an open link
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Bytes still waiting to be read by the host
    pub fn pending(&self) -> usize {
        self.lock().rx.len()
    }

    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory link whose peer answers from a script
///
/// Each write consumes one queued reply. When the script runs dry the peer
/// stays silent.
#[derive(Debug, Clone)]
pub struct ScriptedLink {
    peer: ScriptedPeer,
}

impl ScriptedLink {
    /// Creates an open link and the handle that scripts its peer
    pub fn new() -> (Self, ScriptedPeer) {
        let peer = ScriptedPeer::default();
        {
            let mut state = peer.lock();
            state.open = true;
            state.opens = 1;
        }
        (ScriptedLink { peer: peer.clone() }, peer)
    }
}

impl Link for ScriptedLink {
    fn open(&mut self) -> Result<()> {
        let mut state = self.peer.lock();
        if state.fail_open {
            state.open = false;
            return Err(Error::link("scripted open failure"));
        }
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.peer.lock();
        if state.open {
            state.open = false;
            state.closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.peer.lock().open
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.peer.lock();
        if !state.open {
            return Err(Error::link("scripted link is closed"));
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.peer.lock();
        if !state.open {
            return Err(Error::link("scripted link is closed"));
        }
        state.written.push(bytes.to_vec());
        if let Some(Reply::Bytes(reply)) = state.replies.pop_front() {
            state.rx.extend(reply);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted peer".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_follow_writes() {
        let (mut link, peer) = ScriptedLink::new();
        peer.reply("A50\n").silence().reply("E");

        let mut buf = [0u8; 16];
        assert_eq!(link.read_available(&mut buf).unwrap(), 0);

        link.write_all(b"AN").unwrap();
        assert_eq!(link.read_available(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"A50\n");

        link.write_all(b"00001v").unwrap();
        assert_eq!(link.read_available(&mut buf).unwrap(), 0);

        link.write_all(b"00002v").unwrap();
        assert_eq!(link.read_available(&mut buf).unwrap(), 1);

        assert_eq!(peer.written(), vec!["AN", "00001v", "00002v"]);
    }

    #[test]
    fn test_closed_link_rejects_io() {
        let (mut link, peer) = ScriptedLink::new();
        link.close();
        link.close();
        assert_eq!(peer.closes(), 1);
        assert!(link.write_all(b"AN").is_err());

        peer.fail_open(true);
        assert!(link.open().is_err());
        peer.fail_open(false);
        link.open().unwrap();
        assert_eq!(peer.opens(), 2);
    }

    #[test]
    fn test_short_buffer_reads_in_pieces() {
        let (mut link, peer) = ScriptedLink::new();
        peer.inject("010125A");
        let mut buf = [0u8; 4];
        assert_eq!(link.read_available(&mut buf).unwrap(), 4);
        assert_eq!(link.read_available(&mut buf).unwrap(), 3);
        assert_eq!(peer.pending(), 0);
    }
}
