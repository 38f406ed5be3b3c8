//! Scripted serial port for link tests

use std::collections::VecDeque;
use std::vec::Vec;

use anneal_hal::{ReadError, UartRx, UartTx};

/// Replies are handed out in order, one per `read_line`; when the script
/// runs dry every read times out.
#[derive(Default)]
pub struct ScriptedPort {
    pub replies: VecDeque<Result<Vec<u8>, ReadError<()>>>,
    pub written: Vec<Vec<u8>>,
    pub discards: usize,
    pub fail_writes: bool,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply line (terminator excluded)
    pub fn reply(&mut self, line: &[u8]) -> &mut Self {
        self.replies.push_back(Ok(line.to_vec()));
        self
    }

    pub fn reply_err(&mut self, err: ReadError<()>) -> &mut Self {
        self.replies.push_back(Err(err));
        self
    }

    /// Written requests as text
    pub fn sent(&self) -> Vec<std::string::String> {
        self.written
            .iter()
            .map(|w| std::string::String::from_utf8_lossy(w).into_owned())
            .collect()
    }
}

impl UartTx for ScriptedPort {
    type Error = ();

    async fn write_all(&mut self, data: &[u8]) -> Result<(), ()> {
        if self.fail_writes {
            return Err(());
        }
        self.written.push(data.to_vec());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

impl UartRx for ScriptedPort {
    type Error = ();

    async fn read_line(
        &mut self,
        buf: &mut [u8],
        _terminator: u8,
        _timeout_ms: u32,
    ) -> Result<usize, ReadError<()>> {
        let line = self.replies.pop_front().unwrap_or(Err(ReadError::Timeout))?;
        if line.len() > buf.len() {
            return Err(ReadError::Overrun);
        }
        buf[..line.len()].copy_from_slice(&line);
        Ok(line.len())
    }

    fn discard_input(&mut self) -> Result<(), ()> {
        self.discards += 1;
        Ok(())
    }
}
