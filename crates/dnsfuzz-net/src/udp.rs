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
 *  Sending DNS payloads as UDP datagrams.
 */

use crate::Error;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Replies are never bigger than this on the wire.
const RECV_BUFFER: usize = 65536;

/// A UDP socket connected to a single target.
///
/// Connecting means the kernel filters out datagrams from anyone else, so anything we receive
/// came from the server we are talking to.
pub struct UdpSocket {
    sock: tokio::net::UdpSocket,
    target: SocketAddr,
}

impl UdpSocket {
    pub async fn connect(target: SocketAddr) -> Result<Self, Error> {
        let sock = tokio::net::UdpSocket::bind(crate::unspecified_for(&target))
            .await
            .map_err(Error::Bind)?;
        sock.connect(target).await.map_err(Error::Connect)?;
        Ok(Self { sock, target })
    }

    /// Send one datagram.  Oversized payloads are refused before they reach the kernel.
    pub async fn send(&self, payload: &[u8], timeout: Duration) -> Result<usize, Error> {
        if payload.len() > crate::MAX_UDP_PAYLOAD {
            return Err(Error::TooLarge {
                size: payload.len(),
                limit: crate::MAX_UDP_PAYLOAD,
            });
        }
        log::trace!("UDP {} ⇐ {} bytes", self.target, payload.len());
        match tokio::time::timeout(timeout, self.sock.send(payload)).await {
            Ok(Ok(l)) => Ok(l),
            Ok(Err(io)) => Err(Error::Send(io)),
            Err(_) => Err(Error::Timeout("sending datagram")),
        }
    }

    /// Wait for the next datagram, giving up at `deadline`.
    pub async fn recv_until(&self, deadline: Instant) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; RECV_BUFFER];
        match tokio::time::timeout_at(deadline, self.sock.recv(&mut buf)).await {
            Ok(Ok(l)) => {
                log::trace!("UDP {} ⇒ {} bytes", self.target, l);
                buf.truncate(l);
                Ok(buf)
            }
            Ok(Err(io)) => Err(Error::Recv(io)),
            Err(_) => Err(Error::NoReply),
        }
    }

    /// Send a datagram and wait up to `timeout` for any reply.
    pub async fn exchange(&self, payload: &[u8], timeout: Duration) -> Result<Vec<u8>, Error> {
        let deadline = Instant::now() + timeout;
        self.send(payload, timeout).await?;
        self.recv_until(deadline).await
    }
}

/// Fire a single datagram from a fresh socket and forget about it.
pub async fn send_datagram(
    target: SocketAddr,
    payload: &[u8],
    timeout: Duration,
) -> Result<usize, Error> {
    UdpSocket::connect(target).await?.send(payload, timeout).await
}
