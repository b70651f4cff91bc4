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
 *  Orchestration of the test protocols.
 */

/* A Harness owns the configuration, the oracle and the reload trigger, and runs one protocol at a
 * time from a single control flow.  Concurrency only exists inside a scenario: workers are tokio
 * tasks that are always joined before the oracle is consulted, and share nothing but a Tally.
 *
 * Failures come in three flavours:
 *  - delivery failures (we couldn't send): counted, never blamed on the server.
 *  - liveness failures (the oracle got no answer): the scenario fails.
 *  - precondition failures (server down before we started, no process to signal): the whole
 *    protocol run is aborted.
 */

mod flood;
mod isolate;
mod race;
mod scenarios;
pub mod workers;

pub use isolate::State;
pub use race::RaceScenario;
pub use scenarios::AppScenario;

use crate::config::SharedConfig;
use crate::oracle::Oracle;
use crate::reload::{self, ReloadTrigger};
use crate::report::{Report, ScenarioOutcome};
use std::sync::Arc;

#[derive(Debug)]
pub enum Error {
    NotResponsive(std::net::SocketAddr),
    Locate(reload::Error),
    Reload(reload::Error),
    Send(dnsfuzz_net::Error),
    Encode(crate::dns::Error),
    Worker(tokio::task::JoinError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Error::*;
        match self {
            NotResponsive(addr) => write!(f, "Server at {} is not responding", addr),
            Locate(e) => write!(f, "Cannot find server process: {}", e),
            Reload(e) => write!(f, "Reload trigger failed: {}", e),
            Send(e) => write!(f, "{}", e),
            Encode(e) => write!(f, "Failed to build query: {}", e),
            Worker(e) => write!(f, "Worker task failed: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Errors that mean the run can't meaningfully continue.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::NotResponsive(_) | Error::Locate(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Isolation,
    Flood,
    Race,
    Scenarios,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Isolation,
        Protocol::Flood,
        Protocol::Race,
        Protocol::Scenarios,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Protocol::Isolation => "Targeted isolation",
            Protocol::Flood => "Malformed packet flood",
            Protocol::Race => "Race conditions",
            Protocol::Scenarios => "Application logic",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Protocol::Isolation => write!(f, "isolation"),
            Protocol::Flood => write!(f, "flood"),
            Protocol::Race => write!(f, "race"),
            Protocol::Scenarios => write!(f, "scenarios"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .iter()
            .find(|p| p.to_string() == s)
            .copied()
            .ok_or_else(|| format!("Unknown protocol {:?}", s))
    }
}

pub struct Harness {
    conf: SharedConfig,
    oracle: Oracle,
    trigger: Arc<dyn ReloadTrigger>,
}

impl Harness {
    pub fn new(conf: SharedConfig, trigger: Arc<dyn ReloadTrigger>) -> Self {
        Self {
            oracle: Oracle::from_config(&conf),
            conf,
            trigger,
        }
    }

    /// A harness that reloads the server by signalling it.
    pub fn with_signal_trigger(conf: SharedConfig) -> Self {
        let trigger = Arc::new(reload::SignalTrigger::from_config(&conf));
        Self::new(conf, trigger)
    }

    pub fn config(&self) -> &crate::config::Config {
        &self.conf
    }

    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    fn target(&self) -> std::net::SocketAddr {
        self.conf.target
    }

    /// A fresh seed for a packet.  Never reused, so transaction ids differ between sends.
    fn seed() -> u64 {
        rand::random()
    }

    async fn precondition(&self) -> Result<(), Error> {
        log::info!("Checking {} is responsive", self.target());
        if self.oracle.probe().await.alive {
            Ok(())
        } else {
            Err(Error::NotResponsive(self.target()))
        }
    }

    async fn locate(&self) -> Result<nix::unistd::Pid, Error> {
        self.trigger.locate().await.map_err(Error::Locate)
    }

    fn reload(&self, pid: nix::unistd::Pid) -> Result<(), Error> {
        self.trigger.trigger(pid).map_err(Error::Reload)
    }

    /// Run one protocol, recording its outcomes in `report`.  Returns an error only when the
    /// run had to be abandoned, in which case the report is marked aborted as well.
    pub async fn run(&self, protocol: Protocol, report: &mut Report) -> Result<(), Error> {
        log::info!("Starting {} against {}", protocol, self.target());
        report.begin(protocol.title());
        let ret = match protocol {
            Protocol::Isolation => isolate::run(self, report).await,
            Protocol::Flood => match self.precondition().await {
                Ok(()) => flood::run(self, report).await,
                Err(e) => Err(e),
            },
            Protocol::Race => match self.precondition().await {
                Ok(()) => race::run(self, report).await,
                Err(e) => Err(e),
            },
            Protocol::Scenarios => match self.precondition().await {
                Ok(()) => scenarios::run(self, report).await,
                Err(e) => Err(e),
            },
        };
        if let Err(e) = &ret {
            report.abort(format!("{}: {}", protocol, e));
        }
        ret
    }

    /// Run protocols in order, stopping at the first one that has to be abandoned, or once a
    /// culprit has been isolated.
    pub async fn run_all(&self, protocols: &[Protocol], report: &mut Report) -> Result<(), Error> {
        for protocol in protocols {
            self.run(*protocol, report).await?;
            if let Some(culprit) = report.culprit() {
                log::warn!(
                    "Culprit {} found, not running any further protocols",
                    culprit.strategy
                );
                break;
            }
        }
        Ok(())
    }

    /// Turn the result of a scenario body into an outcome.  A body that completed is followed
    /// by an oracle check; one that failed is recorded as failed, unless the failure means the
    /// run can't continue.
    async fn conclude(
        &self,
        report: &mut Report,
        name: &str,
        body: Result<String, Error>,
    ) -> Result<(), Error> {
        match body {
            Err(e) if e.is_precondition() => return Err(e),
            Err(e) => report.record(ScenarioOutcome::fail(name, e.to_string())),
            Ok(detail) => {
                let probe = self.oracle.probe().await;
                if probe.alive {
                    report.record(ScenarioOutcome::pass(
                        name,
                        format!("{}; server still responsive", detail),
                    ));
                } else {
                    report.record(ScenarioOutcome::fail(
                        name,
                        format!(
                            "{}; server did not answer within {:?}",
                            detail,
                            self.oracle.timeout()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_protocol_names() {
        for p in Protocol::ALL {
            assert_eq!(p.to_string().parse::<Protocol>().unwrap(), p);
        }
        assert!("bogus".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_precondition_classification() {
        let addr = "127.0.0.1:1".parse().unwrap();
        assert!(Error::NotResponsive(addr).is_precondition());
        assert!(Error::Locate(reload::Error::NotFound("x".into())).is_precondition());
        assert!(!Error::Reload(reload::Error::NotFound("x".into())).is_precondition());
        assert!(!Error::Send(dnsfuzz_net::Error::NoReply).is_precondition());
    }
}
