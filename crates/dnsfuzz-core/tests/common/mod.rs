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
 *  In-process stand-ins for a DNS server and its process.
 */
#![allow(dead_code)]

use dnsfuzz::config;
use dnsfuzz::harness::Harness;
use dnsfuzz::reload::{self, ReloadTrigger};
use nix::unistd::Pid;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

/// Echo the message back with QR set, which is enough for the oracle.
fn answer(query: &[u8]) -> Option<Vec<u8>> {
    if query.len() < 12 {
        return None;
    }
    let mut reply = query.to_vec();
    reply[2] |= 0x80;
    Some(reply)
}

/// A DNS server on 127.0.0.1 that answers everything over UDP and TCP, until it sees a payload
/// matching `poison`, after which it never answers again.
pub struct FakeServer {
    pub addr: SocketAddr,
    hung: Arc<AtomicBool>,
    received: Arc<AtomicUsize>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl FakeServer {
    pub async fn healthy() -> Self {
        Self::poisoned_by(|_| false).await
    }

    pub async fn poisoned_by(poison: fn(&[u8]) -> bool) -> Self {
        let udp = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = udp.local_addr().unwrap();
        let hung = Arc::new(AtomicBool::new(false));
        let received = Arc::new(AtomicUsize::new(0));
        let mut tasks = vec![];

        {
            let hung = hung.clone();
            let received = received.clone();
            tasks.push(tokio::spawn(async move {
                let mut buf = vec![0u8; 65536];
                loop {
                    let (l, peer) = match udp.recv_from(&mut buf).await {
                        Ok(x) => x,
                        Err(_) => continue,
                    };
                    received.fetch_add(1, Ordering::Relaxed);
                    if poison(&buf[..l]) {
                        hung.store(true, Ordering::SeqCst);
                    }
                    if hung.load(Ordering::SeqCst) {
                        continue;
                    }
                    if let Some(reply) = answer(&buf[..l]) {
                        let _ = udp.send_to(&reply, peer).await;
                    }
                }
            }));
        }

        // Same port number, other protocol.  If it's taken, TCP scenarios just count failures.
        if let Ok(tcp) = tokio::net::TcpListener::bind(addr).await {
            let hung = hung.clone();
            tasks.push(tokio::spawn(async move {
                while let Ok((mut sock, _)) = tcp.accept().await {
                    let hung = hung.clone();
                    tokio::spawn(async move {
                        let mut lbuf = [0u8; 2];
                        if sock.read_exact(&mut lbuf).await.is_err() {
                            return;
                        }
                        let mut msg = vec![0u8; u16::from_be_bytes(lbuf) as usize];
                        if sock.read_exact(&mut msg).await.is_err() || hung.load(Ordering::SeqCst)
                        {
                            return;
                        }
                        if let Some(reply) = answer(&msg) {
                            let _ = sock.write_all(&(reply.len() as u16).to_be_bytes()).await;
                            let _ = sock.write_all(&reply).await;
                        }
                    });
                }
            }));
        }

        Self {
            addr,
            hung,
            received,
            tasks,
        }
    }

    pub fn is_hung(&self) -> bool {
        self.hung.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> usize {
        self.received.load(Ordering::Relaxed)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        for t in &self.tasks {
            t.abort();
        }
    }
}

/// A bound socket that never answers.  Keep it alive for as long as the test needs it.
pub async fn silent_server() -> tokio::net::UdpSocket {
    tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

/// Configuration pointing at `addr`, with every delay shrunk.  Sections in `extra` replace the
/// shrunk ones.
pub fn test_config(addr: SocketAddr, extra: &str) -> config::SharedConfig {
    let defaults = [
        "oracle: {timeout: 300ms}",
        "isolation: {settle: 10ms}",
        "flood: {sweep-delay: 1ms, random-packets: 40, random-delay: 1ms, settle: 10ms}",
        "race: {query-timeout: 200ms, settle: 10ms, reload-settle: 10ms}",
    ];
    let mut yaml = format!(
        "---\ntarget: {{address: '{}', port: {}}}\n",
        addr.ip(),
        addr.port()
    );
    for line in defaults {
        let section = &line[..line.find(':').unwrap() + 1];
        if !extra.lines().any(|l| l.starts_with(section)) {
            yaml.push_str(line);
            yaml.push('\n');
        }
    }
    yaml.push_str(extra);
    yaml.push('\n');
    config::load_config_from_string(&yaml).unwrap()
}

/// Records reload requests instead of signalling anything.
pub struct RecordingTrigger {
    pid: Option<Pid>,
    fail_trigger: bool,
    locates: AtomicUsize,
    triggers: Mutex<Vec<Pid>>,
}

impl RecordingTrigger {
    pub fn new(pid: i32) -> Arc<Self> {
        Arc::new(Self {
            pid: Some(Pid::from_raw(pid)),
            fail_trigger: false,
            locates: AtomicUsize::new(0),
            triggers: Mutex::new(vec![]),
        })
    }

    /// `locate` never finds anything.
    pub fn missing() -> Arc<Self> {
        Arc::new(Self {
            pid: None,
            fail_trigger: false,
            locates: AtomicUsize::new(0),
            triggers: Mutex::new(vec![]),
        })
    }

    /// `locate` works but every `trigger` fails.
    pub fn refusing(pid: i32) -> Arc<Self> {
        Arc::new(Self {
            pid: Some(Pid::from_raw(pid)),
            fail_trigger: true,
            locates: AtomicUsize::new(0),
            triggers: Mutex::new(vec![]),
        })
    }

    pub fn locates(&self) -> usize {
        self.locates.load(Ordering::SeqCst)
    }

    pub fn triggers(&self) -> Vec<Pid> {
        self.triggers.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ReloadTrigger for RecordingTrigger {
    async fn locate(&self) -> Result<Pid, reload::Error> {
        self.locates.fetch_add(1, Ordering::SeqCst);
        self.pid
            .ok_or_else(|| reload::Error::NotFound("dnsserver.*test".into()))
    }

    fn trigger(&self, pid: Pid) -> Result<(), reload::Error> {
        self.triggers.lock().unwrap().push(pid);
        if self.fail_trigger {
            Err(reload::Error::Signal(pid, nix::errno::Errno::ESRCH))
        } else {
            Ok(())
        }
    }
}

pub fn harness(conf: config::SharedConfig, trigger: Arc<RecordingTrigger>) -> Harness {
    Harness::new(conf, trigger)
}
