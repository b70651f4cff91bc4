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
 *  Concurrent senders and the counters they share.
 */

use super::Error;
use crate::dns::dnspkt;
use crate::mutate::Packet;
use bytes::Bytes;
use dnsfuzz_net::udp::{self, UdpSocket};
use dnsfuzz_net::{tcp, Transport};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sent/failed counters shared by workers.
#[derive(Debug, Default)]
pub struct Tally {
    sent: AtomicU64,
    errors: AtomicU64,
}

impl Tally {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ok(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn err(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record<T>(&self, result: &Result<T, dnsfuzz_net::Error>) {
        match result {
            Ok(_) => self.ok(),
            Err(e) if e.is_delivery_failure() => {
                log::trace!("Not delivered: {}", e);
                self.err()
            }
            Err(e) => {
                log::trace!("Delivered, no reply: {}", e);
                self.err()
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} ok, {} failed", self.sent(), self.errors())
    }
}

/// Build a name from dotted text, skipping empty labels.  Never fails, and happily builds
/// labels and names that are too long.
pub fn domain(name: &str) -> dnspkt::Domain {
    dnspkt::Domain::from(
        name.split('.')
            .filter(|l| !l.is_empty())
            .map(|l| dnspkt::Label::from(l.as_bytes().to_vec()))
            .collect::<Vec<_>>(),
    )
}

/// A fresh IN query for `name`.
pub fn query(name: &str, qtype: dnspkt::Type) -> Result<Bytes, Error> {
    crate::mutate::valid_query(&domain(name), qtype, rand::random()).map_err(Error::Encode)
}

/// Hand a packet to the network over its transport, from a fresh socket or connection.  TCP
/// reads back as far as the reply's length prefix.
pub async fn deliver(
    packet: &Packet,
    target: SocketAddr,
    timeout: Duration,
) -> Result<(), dnsfuzz_net::Error> {
    match packet.transport {
        Transport::Udp => udp::send_datagram(target, &packet.payload, timeout)
            .await
            .map(|_| ()),
        Transport::Tcp => tcp::send(target, &packet.payload, tcp::Reply::Prefix(2), timeout)
            .await
            .map(|_| ()),
    }
}

/// Send one query from a fresh socket and wait for any non-empty reply.
pub async fn query_once(
    target: SocketAddr,
    payload: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, dnsfuzz_net::Error> {
    let sock = UdpSocket::connect(target).await?;
    match sock.exchange(payload, timeout).await? {
        reply if reply.is_empty() => Err(dnsfuzz_net::Error::NoReply),
        reply => Ok(reply),
    }
}

/// Fire `payloads` from a single socket without waiting for replies, optionally pausing
/// between sends.
pub async fn udp_burst(
    target: SocketAddr,
    payloads: Vec<Bytes>,
    pacing: Option<Duration>,
    timeout: Duration,
    tally: Arc<Tally>,
) {
    let sock = match UdpSocket::connect(target).await {
        Ok(sock) => sock,
        Err(e) => {
            log::warn!("Cannot open socket to {}: {}", target, e);
            for _ in &payloads {
                tally.err();
            }
            return;
        }
    };
    for payload in payloads {
        tally.record(&sock.send(&payload, timeout).await);
        if let Some(delay) = pacing {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Wait for every worker.  The first panicking worker is reported once all have finished.
pub async fn join_all(handles: Vec<tokio::task::JoinHandle<()>>) -> Result<(), Error> {
    use futures::StreamExt as _;
    let mut pending: futures::stream::FuturesUnordered<_> = handles.into_iter().collect();
    let mut first_error = None;
    while let Some(result) = pending.next().await {
        if let Err(e) = result {
            log::warn!("Worker failed: {}", e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(Error::Worker(e)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_domain_skips_empty_labels() {
        assert_eq!(domain("host1..zone1.test.").to_string(), "host1.zone1.test");
        let long = domain(&format!("{}.zone1.test", "x".repeat(300)));
        assert_eq!(long.labels()[0].len(), 300);
    }

    #[test]
    fn test_tally() {
        let t = Tally::new();
        t.record::<()>(&Ok(()));
        t.record::<()>(&Err(dnsfuzz_net::Error::NoReply));
        t.ok();
        assert_eq!((t.sent(), t.errors()), (2, 1));
        assert_eq!(t.to_string(), "2 ok, 1 failed");
    }

    #[tokio::test]
    async fn test_join_all_reports_panics() {
        let handles = vec![
            tokio::spawn(async {}),
            tokio::spawn(async { panic!("worker blew up") }),
        ];
        assert!(matches!(join_all(handles).await, Err(Error::Worker(_))));
        assert!(join_all(vec![tokio::spawn(async {})]).await.is_ok());
    }

    #[tokio::test]
    async fn test_deliver_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            use tokio::io::AsyncReadExt as _;
            let (mut sock, _) = listener.accept().await.unwrap();
            // Prefix and a four byte short header, then hang up without answering.
            let mut msg = [0u8; 6];
            sock.read_exact(&mut msg).await.unwrap();
            msg
        });
        let packet = Packet::from_strategy(crate::mutate::Strategy::ShortHeader, 3)
            .over(Transport::Tcp);
        assert!(deliver(&packet, addr, Duration::from_secs(2)).await.is_ok());
        let msg = server.await.unwrap();
        assert_eq!(&msg[..2], &[0x00, 0x04]);
        assert_eq!(&msg[2..], &packet.payload[..]);
    }

    #[tokio::test]
    async fn test_burst_counts_sends() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tally = Tally::new();
        let payloads = vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")];
        udp_burst(
            server.local_addr().unwrap(),
            payloads,
            None,
            Duration::from_secs(1),
            tally.clone(),
        )
        .await;
        assert_eq!(tally.sent(), 2);
        let mut buf = [0u8; 16];
        let l = server.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..l], b"one");
    }
}
