//! Byte-stream transports under a connection.
//!
//! A transport is `Read + Write` in non-blocking style: `WouldBlock` means
//! no progress this tick. Connection establishment is polled separately so
//! a connection can be created before its socket is ready.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Why a transport could not be established.
#[derive(Debug)]
pub enum ConnectError {
    /// The peer name did not resolve.
    Resolve(io::Error),
    /// The connection attempt failed.
    Connect(io::Error),
}

pub trait Transport: Read + Write {
    /// `Ok(true)` once the stream is usable.
    fn poll_connect(&mut self) -> Result<bool, ConnectError> {
        Ok(true)
    }

    /// Release the stream. Further reads report end of stream.
    fn close(&mut self) {}
}

impl Transport for TcpStream {
    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// A TCP stream opened on the first `poll_connect`.
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: Duration::from_secs(10),
            stream: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }
}

impl Transport for TcpTransport {
    fn poll_connect(&mut self) -> Result<bool, ConnectError> {
        if self.stream.is_some() {
            return Ok(true);
        }
        let mut addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(ConnectError::Resolve)?;
        let addr = addrs
            .next()
            .ok_or_else(|| ConnectError::Resolve(io::Error::from(io::ErrorKind::NotFound)))?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(ConnectError::Connect)?;
        stream.set_nonblocking(true).map_err(ConnectError::Connect)?;
        stream.set_nodelay(true).map_err(ConnectError::Connect)?;
        self.stream = Some(stream);
        Ok(true)
    }

    fn close(&mut self) {
        if let Some(s) = self.stream.take() {
            let _ = s.shutdown(Shutdown::Both);
        }
    }
}

#[derive(Default)]
struct Pipe {
    data: VecDeque<u8>,
    closed: bool,
}

/// One end of an in-memory duplex stream.
pub struct LoopbackTransport {
    rx: Arc<Mutex<Pipe>>,
    tx: Arc<Mutex<Pipe>>,
    /// Largest write accepted per call; 0 means unlimited.
    chunk: usize,
}

impl LoopbackTransport {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Mutex::new(Pipe::default()));
        let b = Arc::new(Mutex::new(Pipe::default()));
        (
            Self {
                rx: a.clone(),
                tx: b.clone(),
                chunk: 0,
            },
            Self { rx: b, tx: a, chunk: 0 },
        )
    }

    /// Accept at most `chunk` bytes per write, to exercise partial I/O.
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Inject raw bytes as if the peer had sent them.
    pub fn inject(&self, data: &[u8]) {
        lock(&self.rx).data.extend(data);
    }

    /// Remove everything this end has written but the peer has not read.
    pub fn take_sent(&self) -> Vec<u8> {
        lock(&self.tx).data.drain(..).collect()
    }
}

fn lock(pipe: &Mutex<Pipe>) -> std::sync::MutexGuard<'_, Pipe> {
    pipe.lock().unwrap_or_else(|e| e.into_inner())
}

impl Read for LoopbackTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = lock(&self.rx);
        if pipe.data.is_empty() {
            return if pipe.closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(pipe.data.len());
        for (dst, src) in buf.iter_mut().zip(pipe.data.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for LoopbackTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = lock(&self.tx);
        if pipe.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let n = if self.chunk == 0 { buf.len() } else { buf.len().min(self.chunk) };
        pipe.data.extend(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    fn close(&mut self) {
        lock(&self.tx).closed = true;
        lock(&self.rx).closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_is_duplex_and_non_blocking() {
        let (mut a, mut b) = LoopbackTransport::pair();
        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf).unwrap_err().kind(), io::ErrorKind::WouldBlock);
        a.write_all(b"hello").unwrap();
        assert_eq!(b.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        b.write_all(b"hi").unwrap();
        assert_eq!(a.read(&mut buf).unwrap(), 2);
    }

    #[test]
    fn test_chunked_writes_and_close() {
        let (a, mut b) = LoopbackTransport::pair();
        let mut a = a.with_chunk(3);
        assert_eq!(a.write(b"abcdef").unwrap(), 3);
        assert_eq!(a.take_sent(), b"abc");
        a.close();
        let mut buf = [0u8; 4];
        assert_eq!(b.read(&mut buf).unwrap(), 0);
        assert!(b.write(b"x").is_err());
    }

    #[test]
    fn test_unresolvable_host() {
        let mut t = TcpTransport::new("name.invalid", 443).with_timeout(Duration::from_millis(10));
        assert!(matches!(t.poll_connect(), Err(ConnectError::Resolve(_))));
        assert!(t.read(&mut [0u8; 1]).is_err());
    }
}
