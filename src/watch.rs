//! Per-socket poll registration state.

use std::io;
use std::net::TcpStream;

use mio::net::TcpStream as MioTcpStream;
use mio::{Interest, Registry, Token};

/// One watched socket: the stream plus its current poll registration.
///
/// Created when a transfer is admitted, updated in place as the
/// transfer's interest changes, deregistered when the transfer finishes.
/// Lives only on the reactor thread.
pub(crate) struct SocketWatch {
    stream: MioTcpStream,
    interest: Interest,
}

impl SocketWatch {
    /// Register `stream` with the poller under `token`.
    ///
    /// The stream must already be in non-blocking mode.
    pub(crate) fn register(
        registry: &Registry,
        stream: TcpStream,
        token: Token,
        interest: Interest,
    ) -> io::Result<SocketWatch> {
        let mut stream = MioTcpStream::from_std(stream);
        registry.register(&mut stream, token, interest)?;
        Ok(SocketWatch { stream, interest })
    }

    /// Change the registered interest, if it actually changed.
    pub(crate) fn update(
        &mut self,
        registry: &Registry,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        if interest != self.interest {
            registry.reregister(&mut self.stream, token, interest)?;
            self.interest = interest;
        }
        Ok(())
    }

    /// Remove the socket from the poller. The stream closes on drop.
    pub(crate) fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.stream)
    }

    pub(crate) fn stream_mut(&mut self) -> &mut MioTcpStream {
        &mut self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        client.set_nonblocking(true).unwrap();
        (client, server)
    }

    #[test]
    fn register_update_deregister() {
        let poll = mio::Poll::new().unwrap();
        let (client, _server) = connected_pair();

        let mut watch = SocketWatch::register(
            poll.registry(),
            client,
            Token(0),
            Interest::WRITABLE,
        )
        .unwrap();

        watch
            .update(poll.registry(), Token(0), Interest::READABLE)
            .unwrap();
        // Same interest again is a no-op.
        watch
            .update(poll.registry(), Token(0), Interest::READABLE)
            .unwrap();

        watch.deregister(poll.registry()).unwrap();
    }
}
