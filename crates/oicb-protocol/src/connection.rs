//! The socket plus its inbound reassembly state. Everything about *how*
//! bytes become packets lives in [`crate::codec`]; this type just owns the
//! `mio` stream and feeds bytes read from it into a [`codec::Decoder`].

use std::io::{self, Read, Write};

use mio::net::TcpStream;

use crate::codec::{Decoder, Message};
use crate::error::Fatal;

pub struct Connection {
    pub stream: TcpStream,
    decoder: Decoder,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream, decoder: Decoder::new() }
    }

    /// Read as many bytes as are currently available into the reassembly
    /// buffer without blocking. Returns `Ok(true)` if any bytes were read,
    /// `Ok(false)` on a clean would-block (nothing to do yet).
    pub fn fill(&mut self) -> Result<bool, Fatal> {
        let mut any = false;
        loop {
            let Some(spare) = self.decoder.spare_capacity() else {
                return Err(Fatal::MessageTooLarge { limit: crate::constants::MAX_LOGICAL_PAYLOAD });
            };
            match self.stream.read(spare) {
                Ok(0) => return Ok(any),
                Ok(n) => {
                    self.decoder.commit(n);
                    any = true;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(any),
                Err(e) => return Err(Fatal::Io(e)),
            }
        }
    }

    /// Decode every complete logical message currently buffered.
    pub fn decode_ready(&mut self) -> Result<Vec<Message>, Fatal> {
        let mut out = Vec::new();
        while let Some(msg) = self.decoder.try_decode()? {
            out.push(msg);
        }
        Ok(out)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
