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
 *  Race conditions: reloads and concurrent load.
 */

use super::workers::{self, Tally};
use super::{Error, Harness};
use crate::dns::dnspkt;
use crate::report::Report;
use dnsfuzz_net::tcp;
use std::time::Duration;
use tokio::time::Instant;

const QUERY_PACING: Duration = Duration::from_millis(10);
const QUERY_RUN_TIME: Duration = Duration::from_millis(1500);
const RELOAD_AFTER: Duration = Duration::from_millis(500);
const RAPID_RELOADS: usize = 10;
const RAPID_RELOAD_INTERVAL: Duration = Duration::from_millis(50);
const TYPE_WORKER_QUERIES: usize = 100;
const TCP_STORM_WORKERS: usize = 50;
const TCP_STORM_TIMEOUT: Duration = Duration::from_secs(2);
const QUERY_RELOAD_ROUNDS: usize = 10;
const QUERY_RELOAD_PAUSE: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaceScenario {
    ReloadDuringQueries,
    RapidReloads,
    ConcurrentQueryTypes,
    TcpConnectionStorm,
    QueryDuringReload,
}

impl RaceScenario {
    pub const ALL: [RaceScenario; 5] = [
        RaceScenario::ReloadDuringQueries,
        RaceScenario::RapidReloads,
        RaceScenario::ConcurrentQueryTypes,
        RaceScenario::TcpConnectionStorm,
        RaceScenario::QueryDuringReload,
    ];

    pub fn name(&self) -> &'static str {
        use RaceScenario::*;
        match self {
            ReloadDuringQueries => "reload_during_queries",
            RapidReloads => "rapid_reloads",
            ConcurrentQueryTypes => "concurrent_query_types",
            TcpConnectionStorm => "tcp_connection_storm",
            QueryDuringReload => "query_during_reload",
        }
    }
}

fn probe_query(harness: &Harness) -> Result<bytes::Bytes, Error> {
    crate::mutate::valid_query(
        &harness.config().oracle.domain,
        harness.config().oracle.qtype,
        Harness::seed(),
    )
    .map_err(Error::Encode)
}

/// Query continuously while a reload lands in the middle.
async fn reload_during_queries(harness: &Harness) -> Result<String, Error> {
    let pid = harness.locate().await?;
    let target = harness.config().target;
    let timeout = harness.config().race.query_timeout;
    let tally = Tally::new();
    let payload = probe_query(harness)?;

    let worker = {
        let tally = tally.clone();
        let stop_at = Instant::now() + QUERY_RUN_TIME;
        tokio::spawn(async move {
            while Instant::now() < stop_at {
                tally.record(&workers::query_once(target, &payload, timeout).await);
                tokio::time::sleep(QUERY_PACING).await;
            }
        })
    };

    tokio::time::sleep(RELOAD_AFTER).await;
    let reloaded = harness.reload(pid);
    workers::join_all(vec![worker]).await?;
    reloaded?;

    tokio::time::sleep(harness.config().race.settle).await;
    Ok(format!("queries: {}", tally))
}

async fn rapid_reloads(harness: &Harness) -> Result<String, Error> {
    let pid = harness.locate().await?;
    for _ in 0..RAPID_RELOADS {
        harness.reload(pid)?;
        tokio::time::sleep(RAPID_RELOAD_INTERVAL).await;
    }
    tokio::time::sleep(harness.config().race.reload_settle).await;
    Ok(format!("{} reloads delivered", RAPID_RELOADS))
}

async fn concurrent_query_types(harness: &Harness) -> Result<String, Error> {
    let target = harness.config().target;
    let domain = &harness.config().oracle.domain;
    let tally = Tally::new();
    let mut handles = vec![];
    for qtype in [dnspkt::RR_A, dnspkt::RR_NS, dnspkt::RR_MX, dnspkt::RR_TXT] {
        let payloads = (0..TYPE_WORKER_QUERIES)
            .map(|_| crate::mutate::valid_query(domain, qtype, Harness::seed()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Error::Encode)?;
        handles.push(tokio::spawn(workers::udp_burst(
            target,
            payloads,
            None,
            harness.oracle().timeout(),
            tally.clone(),
        )));
    }
    workers::join_all(handles).await?;
    Ok(format!("4 workers: {}", tally))
}

async fn tcp_connection_storm(harness: &Harness) -> Result<String, Error> {
    let target = harness.config().target;
    let tally = Tally::new();
    let mut handles = vec![];
    for _ in 0..TCP_STORM_WORKERS {
        let payload = probe_query(harness)?;
        let tally = tally.clone();
        handles.push(tokio::spawn(async move {
            tally.record(
                &tcp::send(target, &payload, tcp::Reply::Prefix(2), TCP_STORM_TIMEOUT).await,
            );
        }));
    }
    workers::join_all(handles).await?;
    tokio::time::sleep(harness.config().race.settle).await;
    Ok(format!("{} connections: {}", TCP_STORM_WORKERS, tally))
}

/// Land a reload on top of a single in-flight query, repeatedly.
async fn query_during_reload(harness: &Harness) -> Result<String, Error> {
    let pid = harness.locate().await?;
    let target = harness.config().target;
    let timeout = harness.config().race.query_timeout;
    let tally = Tally::new();
    for _ in 0..QUERY_RELOAD_ROUNDS {
        let payload = probe_query(harness)?;
        let worker = {
            let tally = tally.clone();
            tokio::spawn(async move {
                tally.record(&workers::query_once(target, &payload, timeout).await);
            })
        };
        let reloaded = harness.reload(pid);
        workers::join_all(vec![worker]).await?;
        reloaded?;
        tokio::time::sleep(QUERY_RELOAD_PAUSE).await;
    }
    Ok(format!("{} rounds, queries: {}", QUERY_RELOAD_ROUNDS, tally))
}

async fn run_scenario(harness: &Harness, scenario: RaceScenario) -> Result<String, Error> {
    use RaceScenario::*;
    match scenario {
        ReloadDuringQueries => reload_during_queries(harness).await,
        RapidReloads => rapid_reloads(harness).await,
        ConcurrentQueryTypes => concurrent_query_types(harness).await,
        TcpConnectionStorm => tcp_connection_storm(harness).await,
        QueryDuringReload => query_during_reload(harness).await,
    }
}

pub(super) async fn run(harness: &Harness, report: &mut Report) -> Result<(), Error> {
    for scenario in RaceScenario::ALL {
        log::info!("Scenario {}", scenario.name());
        let body = run_scenario(harness, scenario).await;
        harness.conclude(report, scenario.name(), body).await?;
    }
    Ok(())
}
