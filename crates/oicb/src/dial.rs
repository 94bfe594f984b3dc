//! DNS resolution and initial TCP connect: a black-box "dial", out of scope
//! for the protocol engine itself. Returns a non-blocking
//! `mio::net::TcpStream` the event loop can register for write-readiness to
//! detect connection completion.

use std::io;
use std::net::ToSocketAddrs;

use mio::net::TcpStream;

pub fn dial(host: &str, port: u16) -> io::Result<TcpStream> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no addresses found for {host}:{port}")))?;
    TcpStream::connect(addr)
}
