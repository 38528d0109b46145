//! Socket setup helpers for outbound transfers.

use std::io;
use std::net::{SocketAddr, TcpStream};

use socket2::{Domain, Protocol, Socket, Type};

/// Begin a non-blocking TCP connect to `addr`.
///
/// The returned stream is non-blocking with `TCP_NODELAY` set; the
/// connect is usually still in progress, which is exactly what a
/// [`Transfer::init`](crate::Transfer::init) wants - register the stream
/// for writable interest and check
/// [`take_error`](mio::net::TcpStream::take_error) on the first writable
/// event.
pub fn connect_nonblocking(addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = Socket::new(
        match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        },
        Type::STREAM,
        Some(Protocol::TCP),
    )?;

    socket.set_nonblocking(true)?;
    socket.set_nodelay(true)?;

    match socket.connect(&addr.into()) {
        Ok(()) => {}
        // In-progress is the expected outcome for a non-blocking connect.
        Err(ref e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => return Err(e),
    }

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connect_to_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect_nonblocking(addr).unwrap();
        let (_server, _) = listener.accept().unwrap();

        // Stream must be non-blocking; a read before any data arrives
        // must not hang.
        let mut buf = [0u8; 1];
        let err = io::Read::read(&mut &stream, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
