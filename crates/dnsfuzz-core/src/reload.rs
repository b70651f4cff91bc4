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
 *  Asking the server under test to reload its configuration.
 */

use nix::sys::signal::Signal;
use nix::unistd::Pid;

#[derive(Debug)]
pub enum Error {
    Lookup(std::io::Error),
    LookupFailed(String),
    NotFound(String),
    Ambiguous(String, Vec<Pid>),
    Signal(Pid, nix::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Error::*;
        match self {
            Lookup(io) => write!(f, "Failed to run pgrep: {}", io),
            LookupFailed(msg) => write!(f, "pgrep failed: {}", msg),
            NotFound(pattern) => write!(f, "No process matches {:?}", pattern),
            Ambiguous(pattern, pids) => write!(
                f,
                "{} processes match {:?}: {}",
                pids.len(),
                pattern,
                pids.iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Signal(pid, e) => write!(f, "Failed to signal pid {}: {}", pid, e),
        }
    }
}

impl std::error::Error for Error {}

/// Something that can find the server process and poke it.
#[async_trait::async_trait]
pub trait ReloadTrigger: Send + Sync {
    /// Resolve the process to signal.  Called once per scenario.
    async fn locate(&self) -> Result<Pid, Error>;
    /// Deliver one reload request.  Does not wait for the reload to happen.
    fn trigger(&self, pid: Pid) -> Result<(), Error>;
}

/// Finds the server with `pgrep -f` and sends it a signal.
#[derive(Debug, Clone)]
pub struct SignalTrigger {
    pattern: String,
    signal: Signal,
}

impl SignalTrigger {
    /// `{port}` in `pattern` is replaced with `port`.
    pub fn new(pattern: &str, port: u16, signal: Signal) -> Self {
        Self {
            pattern: pattern.replace("{port}", &port.to_string()),
            signal,
        }
    }

    pub fn from_config(conf: &crate::config::Config) -> Self {
        Self::new(
            &conf.reload.process_pattern,
            conf.target.port(),
            conf.reload.signal,
        )
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Parse pgrep output, leaving out our own pid (our command line may well match the pattern).
fn parse_pids(stdout: &str, own: Pid) -> Vec<Pid> {
    stdout
        .lines()
        .filter_map(|l| l.trim().parse::<i32>().ok())
        .map(Pid::from_raw)
        .filter(|p| *p != own)
        .collect()
}

#[async_trait::async_trait]
impl ReloadTrigger for SignalTrigger {
    async fn locate(&self) -> Result<Pid, Error> {
        let output = tokio::process::Command::new("pgrep")
            .arg("-f")
            .arg(&self.pattern)
            .output()
            .await
            .map_err(Error::Lookup)?;
        // pgrep exits 1 when nothing matched.
        match output.status.code() {
            Some(0) | Some(1) => (),
            _ => {
                return Err(Error::LookupFailed(
                    String::from_utf8_lossy(&output.stderr).trim().into(),
                ))
            }
        }
        let pids = parse_pids(
            &String::from_utf8_lossy(&output.stdout),
            nix::unistd::getpid(),
        );
        match pids.as_slice() {
            [] => Err(Error::NotFound(self.pattern.clone())),
            [pid] => {
                log::debug!("{:?} is pid {}", self.pattern, pid);
                Ok(*pid)
            }
            _ => Err(Error::Ambiguous(self.pattern.clone(), pids)),
        }
    }

    fn trigger(&self, pid: Pid) -> Result<(), Error> {
        log::debug!("Sending {} to {}", self.signal, pid);
        nix::sys::signal::kill(pid, self.signal).map_err(|e| Error::Signal(pid, e))
    }
}

#[test]
fn test_pattern_substitution() {
    let t = SignalTrigger::new("dnsserver.*{port}", 15353, Signal::SIGHUP);
    assert_eq!(t.pattern(), "dnsserver.*15353");
}

#[test]
fn test_parse_pids_skips_self() {
    let me = Pid::from_raw(100);
    assert_eq!(
        parse_pids("42\n100\n  77 \nnonsense\n", me),
        vec![Pid::from_raw(42), Pid::from_raw(77)]
    );
    assert!(parse_pids("", me).is_empty());
}

#[tokio::test]
async fn test_locate_nothing() {
    let t = SignalTrigger::new(
        "no-such-process-dnsfuzz-{port}-xyzzy",
        1,
        Signal::SIGHUP,
    );
    match t.locate().await {
        Err(Error::NotFound(_)) | Err(Error::Lookup(_)) => (),
        other => panic!("Expected no match, got {:?}", other),
    }
}
