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
 *  Liveness oracle: is the server still answering?
 */

use crate::dns::{dnspkt, parse};
use dnsfuzz_net::udp::UdpSocket;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// The probe made it onto the wire.
    pub sent: bool,
    pub alive: bool,
    pub elapsed: Duration,
}

/// Sends a known good query on its own socket with its own transaction id, and only counts a
/// reply carrying that id.
#[derive(Debug, Clone)]
pub struct Oracle {
    target: SocketAddr,
    question: dnspkt::Question,
    timeout: Duration,
}

impl Oracle {
    pub fn new(
        target: SocketAddr,
        domain: dnspkt::Domain,
        qtype: dnspkt::Type,
        timeout: Duration,
    ) -> Self {
        Self {
            target,
            question: dnspkt::Question {
                qdomain: domain,
                qtype,
                qclass: dnspkt::CLASS_IN,
            },
            timeout,
        }
    }

    pub fn from_config(conf: &crate::config::Config) -> Self {
        Self::new(
            conf.target,
            conf.oracle.domain.clone(),
            conf.oracle.qtype,
            conf.oracle.timeout,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn wait_for(&self, sock: &UdpSocket, qid: u16, deadline: Instant) -> bool {
        loop {
            match sock.recv_until(deadline).await {
                Ok(reply) if reply.is_empty() => {
                    log::debug!("Oracle got an empty datagram from {}", self.target);
                    return false;
                }
                Ok(reply) => match parse::reply_id(&reply) {
                    Some(id) if id == qid => return true,
                    other => {
                        log::debug!(
                            "Oracle ignoring {} byte reply with id {:?}, expected {}",
                            reply.len(),
                            other,
                            qid
                        );
                    }
                },
                Err(e) => {
                    log::debug!("Oracle receive from {} failed: {}", self.target, e);
                    return false;
                }
            }
        }
    }

    pub async fn probe(&self) -> ProbeResult {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let qid: u16 = rand::random();
        let not_sent = |start: Instant| ProbeResult {
            sent: false,
            alive: false,
            elapsed: start.elapsed(),
        };

        let query = match dnspkt::Message::query(qid, self.question.clone()).serialise() {
            Ok(q) => q,
            Err(e) => {
                log::error!("Cannot encode oracle query {}: {}", self.question, e);
                return not_sent(start);
            }
        };
        let sock = match UdpSocket::connect(self.target).await {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Oracle could not open a socket to {}: {}", self.target, e);
                return not_sent(start);
            }
        };
        if let Err(e) = sock.send(&query, self.timeout).await {
            log::warn!("Oracle could not send to {}: {}", self.target, e);
            return not_sent(start);
        }

        let alive = self.wait_for(&sock, qid, deadline).await;
        let elapsed = start.elapsed();
        log::trace!(
            "Oracle {} {} after {:?}",
            self.target,
            if alive { "alive" } else { "silent" },
            elapsed
        );
        ProbeResult {
            sent: true,
            alive,
            elapsed,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn oracle_for(target: SocketAddr, timeout: Duration) -> Oracle {
        Oracle::new(
            target,
            "host1.zone1.test".parse().unwrap(),
            dnspkt::RR_A,
            timeout,
        )
    }

    #[tokio::test]
    async fn test_silent_server_is_not_alive() {
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let oracle = oracle_for(silent.local_addr().unwrap(), Duration::from_millis(300));
        let start = Instant::now();
        let result = oracle.probe().await;
        assert!(result.sent);
        assert!(!result.alive);
        assert!(start.elapsed() < Duration::from_millis(300) + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_matching_reply_is_alive() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let oracle = oracle_for(server.local_addr().unwrap(), Duration::from_secs(2));
        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (l, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut reply = buf[..l].to_vec();
            reply[2] |= 0x80;
            server.send_to(&reply, peer).await.unwrap();
        });
        assert!(oracle.probe().await.alive);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatched_id_is_ignored() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let oracle = oracle_for(server.local_addr().unwrap(), Duration::from_millis(400));
        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (l, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut reply = buf[..l].to_vec();
            reply[0] = !reply[0];
            server.send_to(&reply, peer).await.unwrap();
        });
        assert!(!oracle.probe().await.alive);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_reply_is_not_alive() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let oracle = oracle_for(server.local_addr().unwrap(), Duration::from_secs(2));
        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&[], peer).await.unwrap();
        });
        let result = oracle.probe().await;
        assert!(!result.alive);
        assert!(result.elapsed < Duration::from_secs(2));
        responder.await.unwrap();
    }
}
