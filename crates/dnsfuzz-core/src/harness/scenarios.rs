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
 *  Application logic: load shaped like real (ab)use rather than like garbage.
 */

use super::workers::{self, Tally};
use super::{Error, Harness};
use crate::dns::dnspkt;
use crate::mutate::{Packet, Strategy};
use crate::report::Report;
use bytes::Bytes;
use dnsfuzz_net::{tcp, Transport};
use std::time::Duration;

const ENUMERATION_QUERIES: usize = 1000;
const STORM_WORKERS: usize = 10;
const STORM_QUERIES: usize = 100;
const MIXED_QUERIES: usize = 50;
const MIXED_PACING: Duration = Duration::from_millis(10);
const MIXED_TCP_TIMEOUT: Duration = Duration::from_secs(1);
const RAPID_CONNECTIONS: usize = 100;
const RAPID_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const SHORT_SETTLE: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppScenario {
    SubdomainEnumerationFlood,
    QueryTypeFlood,
    ConcurrentQueryStorm,
    LongDomainNames,
    MixedTcpUdp,
    RapidConnections,
}

impl AppScenario {
    pub const ALL: [AppScenario; 6] = [
        AppScenario::SubdomainEnumerationFlood,
        AppScenario::QueryTypeFlood,
        AppScenario::ConcurrentQueryStorm,
        AppScenario::LongDomainNames,
        AppScenario::MixedTcpUdp,
        AppScenario::RapidConnections,
    ];

    pub fn name(&self) -> &'static str {
        use AppScenario::*;
        match self {
            SubdomainEnumerationFlood => "subdomain_enumeration_flood",
            QueryTypeFlood => "query_type_flood",
            ConcurrentQueryStorm => "concurrent_query_storm",
            LongDomainNames => "long_domain_names",
            MixedTcpUdp => "mixed_tcp_udp",
            RapidConnections => "rapid_connections",
        }
    }
}

/// A 63 byte label, 40 labels, and a name well past 255 bytes.
pub fn long_names() -> Vec<String> {
    vec![
        format!("{}.zone1.test", "a".repeat(63)),
        format!(
            "{}.zone1.test",
            (0..40)
                .map(|i| format!("label{}", i))
                .collect::<Vec<_>>()
                .join(".")
        ),
        format!("{}.zone1.test", vec!["x".repeat(50); 10].join(".")),
    ]
}

fn queries<I>(names: I) -> Result<Vec<Bytes>, Error>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .map(|n| workers::query(&n, dnspkt::RR_A))
        .collect()
}

/// Everything from one socket, as fast as we can, then wait and check.
async fn burst_then_settle(
    harness: &Harness,
    payloads: Vec<Bytes>,
    settle: Duration,
) -> Result<String, Error> {
    let tally = Tally::new();
    workers::udp_burst(
        harness.config().target,
        payloads,
        None,
        harness.oracle().timeout(),
        tally.clone(),
    )
    .await;
    tokio::time::sleep(settle).await;
    Ok(format!("sent {}", tally))
}

async fn subdomain_enumeration_flood(harness: &Harness) -> Result<String, Error> {
    let payloads =
        queries((0..ENUMERATION_QUERIES).map(|i| format!("nonexistent{}.zone1.test", i)))?;
    burst_then_settle(harness, payloads, harness.config().race.settle).await
}

async fn query_type_flood(harness: &Harness) -> Result<String, Error> {
    let payloads = (0..256).map(|t| Strategy::QtypeSweep.generate(t)).collect();
    burst_then_settle(harness, payloads, SHORT_SETTLE).await
}

async fn concurrent_query_storm(harness: &Harness) -> Result<String, Error> {
    let tally = Tally::new();
    let mut handles = vec![];
    for worker in 0..STORM_WORKERS {
        let payloads =
            queries((0..STORM_QUERIES).map(|i| format!("test{}-{}.zone1.test", worker, i)))?;
        handles.push(tokio::spawn(workers::udp_burst(
            harness.config().target,
            payloads,
            None,
            harness.oracle().timeout(),
            tally.clone(),
        )));
    }
    workers::join_all(handles).await?;
    tokio::time::sleep(harness.config().race.settle).await;
    Ok(format!("{} workers: {}", STORM_WORKERS, tally))
}

async fn long_domain_names(harness: &Harness) -> Result<String, Error> {
    let names = long_names();
    for n in &names {
        log::debug!("Long name of {} bytes", n.len());
    }
    burst_then_settle(harness, queries(names)?, SHORT_SETTLE).await
}

async fn mixed_tcp_udp(harness: &Harness) -> Result<String, Error> {
    let target = harness.config().target;
    let udp_tally = Tally::new();
    let tcp_tally = Tally::new();

    let udp = tokio::spawn(workers::udp_burst(
        target,
        queries((0..MIXED_QUERIES).map(|i| format!("udp{}.zone1.test", i)))?,
        Some(MIXED_PACING),
        harness.oracle().timeout(),
        udp_tally.clone(),
    ));
    let tcp = {
        let packets = (0..MIXED_QUERIES)
            .map(|i| {
                let name = workers::domain(&format!("tcp{}.zone1.test", i));
                Packet::query(&name, dnspkt::RR_A, Harness::seed()).map(|p| p.over(Transport::Tcp))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(Error::Encode)?;
        let tally = tcp_tally.clone();
        tokio::spawn(async move {
            for packet in packets {
                tally.record(&workers::deliver(&packet, target, MIXED_TCP_TIMEOUT).await);
                tokio::time::sleep(MIXED_PACING).await;
            }
        })
    };
    workers::join_all(vec![udp, tcp]).await?;
    Ok(format!("UDP {}, TCP {}", udp_tally, tcp_tally))
}

async fn rapid_connections(harness: &Harness) -> Result<String, Error> {
    let tally = Tally::default();
    for _ in 0..RAPID_CONNECTIONS {
        tally.record(&tcp::touch(harness.config().target, RAPID_CONNECT_TIMEOUT).await);
    }
    tokio::time::sleep(harness.config().race.settle).await;
    Ok(format!("connections: {}", tally))
}

async fn run_scenario(harness: &Harness, scenario: AppScenario) -> Result<String, Error> {
    use AppScenario::*;
    match scenario {
        SubdomainEnumerationFlood => subdomain_enumeration_flood(harness).await,
        QueryTypeFlood => query_type_flood(harness).await,
        ConcurrentQueryStorm => concurrent_query_storm(harness).await,
        LongDomainNames => long_domain_names(harness).await,
        MixedTcpUdp => mixed_tcp_udp(harness).await,
        RapidConnections => rapid_connections(harness).await,
    }
}

pub(super) async fn run(harness: &Harness, report: &mut Report) -> Result<(), Error> {
    for scenario in AppScenario::ALL {
        log::info!("Scenario {}", scenario.name());
        let body = run_scenario(harness, scenario).await;
        harness.conclude(report, scenario.name(), body).await?;
    }
    Ok(())
}
