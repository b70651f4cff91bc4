/*   Copyright 2026 The dnsfuzz Authors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 *
 *  SPDX-License-Identifier: Apache-2.0
 *
 *  Sending DNS payloads over TCP, one connection per payload.
 */

use crate::Error;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/* No connection reuse: every call opens a connection, writes one framed message, maybe reads a
 * little, and drops the connection again.
 */

/// What to do after the message has been written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Close straight away.
    Ignore,
    /// Read up to this many bytes of whatever comes back (typically just the length prefix).
    Prefix(usize),
}

fn dns_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(2)
        .max_frame_length(crate::MAX_TCP_MESSAGE)
        .new_codec()
}

async fn connect(target: SocketAddr) -> Result<TcpStream, Error> {
    let sock = TcpStream::connect(target).await.map_err(Error::Connect)?;
    // Small writes should go out immediately rather than waiting to coalesce.
    sock.set_nodelay(true).map_err(Error::Connect)?;
    Ok(sock)
}

/// Connect and write one framed message, giving back the bare stream.
async fn write_framed(target: SocketAddr, payload: &[u8]) -> Result<TcpStream, Error> {
    use futures::SinkExt as _;

    let sock = connect(target).await?;
    let mut framed = Framed::new(sock, dns_codec());
    framed
        .send(bytes::Bytes::copy_from_slice(payload))
        .await
        .map_err(Error::Send)?;
    log::trace!("TCP {} ⇐ {} bytes", target, payload.len());
    // The write buffer has been flushed by send(), so nothing is lost by unwrapping.
    Ok(framed.into_inner())
}

async fn read_prefix(target: SocketAddr, sock: &mut TcpStream, n: usize) -> Result<Vec<u8>, Error> {
    use tokio::io::AsyncReadExt as _;

    let mut buf = vec![0u8; n];
    let l = sock.read(&mut buf).await.map_err(Error::Recv)?;
    buf.truncate(l);
    log::trace!("TCP {} ⇒ {} bytes", target, l);
    Ok(buf)
}

/// Open a fresh connection, write `payload` with a 2 byte big-endian length prefix, optionally
/// read a short reply, and close.  The whole exchange is bounded by `timeout`.  Running out of
/// time before the message is written is a `Timeout`; running out while waiting for the reply
/// is `NoReply`.
pub async fn send(
    target: SocketAddr,
    payload: &[u8],
    reply: Reply,
    timeout: Duration,
) -> Result<Vec<u8>, Error> {
    if payload.len() > crate::MAX_TCP_MESSAGE {
        return Err(Error::TooLarge {
            size: payload.len(),
            limit: crate::MAX_TCP_MESSAGE,
        });
    }
    let deadline = tokio::time::Instant::now() + timeout;
    let mut sock = match tokio::time::timeout_at(deadline, write_framed(target, payload)).await {
        Ok(ret) => ret?,
        Err(_) => return Err(Error::Timeout("sending over TCP")),
    };
    match reply {
        Reply::Ignore => Ok(vec![]),
        Reply::Prefix(n) => {
            match tokio::time::timeout_at(deadline, read_prefix(target, &mut sock, n)).await {
                Ok(ret) => ret,
                Err(_) => Err(Error::NoReply),
            }
        }
    }
}

/// Open a connection and close it again without sending anything.
pub async fn touch(target: SocketAddr, timeout: Duration) -> Result<(), Error> {
    match tokio::time::timeout(timeout, connect(target)).await {
        Ok(Ok(sock)) => {
            drop(sock);
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(Error::Timeout("connecting")),
    }
}
