//! A complete request/response transfer over one TCP connection.
//!
//! [`ByteExchange`] connects, writes an opaque request payload,
//! half-closes, reads the response until EOF, and hands the outcome to a
//! completion closure on the host thread. It carries no protocol framing
//! of its own - the payload bytes are the caller's business - which makes
//! it both a usable building block and the reference implementation of
//! the [`Transfer`] contract.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::time::{Duration, Instant};

use mio::net::TcpStream as MioTcpStream;
use mio::Interest;

use crate::net::connect_nonblocking;
use crate::transfer::{Activation, Progress, Readiness, Transfer, TransferError};

type Callback = Box<dyn FnOnce(io::Result<Vec<u8>>) + Send>;

enum Phase {
    /// Connect may still be in progress; request bytes not fully written.
    Sending,
    /// Request written and half-closed; reading until EOF.
    Receiving,
    Finished,
}

pub struct ByteExchange {
    addr: SocketAddr,
    request: Vec<u8>,
    written: usize,
    response: Vec<u8>,
    phase: Phase,
    timeout: Option<Duration>,
    deadline_at: Option<Instant>,
    outcome: Option<io::Result<()>>,
    on_done: Option<Callback>,
}

impl ByteExchange {
    /// Exchange `request` with the server at `addr`; `on_done` receives
    /// the full response body, or the first error encountered.
    pub fn new(
        addr: SocketAddr,
        request: impl Into<Vec<u8>>,
        on_done: impl FnOnce(io::Result<Vec<u8>>) + Send + 'static,
    ) -> ByteExchange {
        ByteExchange {
            addr,
            request: request.into(),
            written: 0,
            response: Vec::new(),
            phase: Phase::Sending,
            timeout: None,
            deadline_at: None,
            outcome: None,
            on_done: Some(Box::new(on_done)),
        }
    }

    /// Overall deadline for the whole exchange, connect included.
    /// Expiry fails the exchange with `ErrorKind::TimedOut`.
    pub fn timeout(mut self, timeout: Duration) -> ByteExchange {
        self.timeout = Some(timeout);
        self
    }

    fn awaiting(&self, interest: Interest) -> Progress {
        let deadline = self
            .deadline_at
            .map(|at| at.saturating_duration_since(Instant::now()));
        Progress::Await { interest, deadline }
    }

    fn fail(&mut self, error: io::Error) -> Progress {
        self.phase = Phase::Finished;
        self.outcome = Some(Err(error));
        Progress::Done
    }
}

impl Transfer for ByteExchange {
    fn init(&mut self) -> Result<Activation, TransferError> {
        let stream = connect_nonblocking(self.addr)?;
        self.deadline_at = self.timeout.map(|d| Instant::now() + d);
        Ok(Activation {
            stream,
            interest: Interest::WRITABLE,
            deadline: self.timeout,
        })
    }

    fn advance(&mut self, stream: &mut MioTcpStream, readiness: Readiness) -> Progress {
        if matches!(self.phase, Phase::Finished) {
            return Progress::Done;
        }

        if matches!(self.phase, Phase::Sending) && readiness.writable {
            // The first writable edge after a non-blocking connect
            // reports the connect result here.
            match stream.take_error() {
                Ok(None) => {}
                Ok(Some(e)) | Err(e) => return self.fail(e),
            }

            loop {
                if self.written == self.request.len() {
                    if let Err(e) = stream.shutdown(Shutdown::Write) {
                        return self.fail(e);
                    }
                    self.phase = Phase::Receiving;
                    break;
                }
                match stream.write(&self.request[self.written..]) {
                    Ok(0) => return self.fail(io::ErrorKind::WriteZero.into()),
                    Ok(n) => self.written += n,
                    Err(ref e)
                        if e.kind() == io::ErrorKind::WouldBlock
                            || e.kind() == io::ErrorKind::NotConnected =>
                    {
                        return self.awaiting(Interest::WRITABLE);
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return self.fail(e),
                }
            }
        }

        if matches!(self.phase, Phase::Receiving) && readiness.readable {
            let mut chunk = [0u8; 4096];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => {
                        self.phase = Phase::Finished;
                        self.outcome = Some(Ok(()));
                        return Progress::Done;
                    }
                    Ok(n) => self.response.extend_from_slice(&chunk[..n]),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return self.fail(e),
                }
            }
        }

        match self.phase {
            Phase::Sending => self.awaiting(Interest::WRITABLE),
            Phase::Receiving => self.awaiting(Interest::READABLE),
            Phase::Finished => Progress::Done,
        }
    }

    fn on_deadline(&mut self, _stream: &mut MioTcpStream) -> Progress {
        self.fail(io::Error::new(
            io::ErrorKind::TimedOut,
            "exchange deadline elapsed",
        ))
    }

    fn on_completed(&mut self) {
        let outcome = match self.outcome.take() {
            Some(Ok(())) => Ok(std::mem::take(&mut self.response)),
            Some(Err(e)) => Err(e),
            None => Err(io::Error::other("exchange never ran")),
        };
        if let Some(on_done) = self.on_done.take() {
            on_done(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;

    fn mio_pair() -> (MioTcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();
        let (server, _) = listener.accept().unwrap();
        (MioTcpStream::from_std(client), server)
    }

    #[test]
    fn deadline_fails_with_timed_out() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let (tx, rx) = mpsc::channel();
        let mut exchange = ByteExchange::new(addr, b"ping".to_vec(), move |outcome| {
            tx.send(outcome).unwrap();
        })
        .timeout(Duration::from_millis(50));

        let (mut stream, _server) = mio_pair();
        assert_eq!(exchange.on_deadline(&mut stream), Progress::Done);
        exchange.on_completed();

        let outcome = rx.recv().unwrap();
        assert_eq!(outcome.unwrap_err().kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn writes_request_then_half_closes() {
        let (tx, rx) = mpsc::channel();
        let (mut stream, mut server) = mio_pair();

        let addr = server.local_addr().unwrap();
        let mut exchange = ByteExchange::new(addr, b"hello".to_vec(), move |outcome| {
            tx.send(outcome).unwrap();
        });

        // Drive the send phase directly against the connected pair.
        let progress = exchange.advance(&mut stream, Readiness::WRITABLE);
        match progress {
            Progress::Await { interest, .. } => assert_eq!(interest, Interest::READABLE),
            Progress::Done => panic!("exchange finished before the response"),
        }

        let mut request = Vec::new();
        server.read_to_end(&mut request).unwrap();
        assert_eq!(request, b"hello");

        // Respond and close; the read phase finishes the exchange.
        server.write_all(b"world").unwrap();
        drop(server);

        // Wait for the response to land in the client socket buffer.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match exchange.advance(&mut stream, Readiness::READABLE) {
                Progress::Done => break,
                Progress::Await { .. } => {
                    assert!(Instant::now() < deadline, "exchange did not finish");
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }

        exchange.on_completed();
        assert_eq!(rx.recv().unwrap().unwrap(), b"world");
    }
}
