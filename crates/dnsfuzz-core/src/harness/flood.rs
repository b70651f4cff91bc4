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
 *  Flood: the whole catalog once, then a random mix.
 */

use super::workers::{self, Tally};
use super::{Error, Harness};
use crate::dns::dnspkt;
use crate::mutate::{Packet, Strategy};
use crate::report::{Report, ScenarioOutcome};
use dnsfuzz_net::udp::UdpSocket;
use rand::seq::SliceRandom as _;
use rand::{Rng as _, SeedableRng as _};

/// Names mixed into the random phase.  Not all of them exist.
pub const FLOOD_DOMAINS: [&str; 5] = [
    "host1.zone1.test",
    "ns1.zone1.test",
    "invalid.zone1.test",
    "test.example.com",
    "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx.zone1.test",
];

pub const FLOOD_TYPES: [dnspkt::Type; 7] = [
    dnspkt::RR_A,
    dnspkt::RR_NS,
    dnspkt::RR_CNAME,
    dnspkt::RR_MX,
    dnspkt::RR_TXT,
    dnspkt::RR_AAAA,
    dnspkt::RR_ANY,
];

const SWEEP: &str = "catalog_sweep";
const RANDOM: &str = "random_mix";

async fn send(sock: &UdpSocket, packet: &Packet, tally: &Tally, timeout: std::time::Duration) {
    let result = sock.send(&packet.payload, timeout).await;
    if let Err(e) = &result {
        log::warn!("{} not delivered: {}", packet, e);
    } else {
        log::trace!("Sent {}", packet);
    }
    tally.record(&result);
}

/// Pick a packet for the random phase: a valid query or any catalog entry, with equal weight.
fn random_packet(rng: &mut rand::rngs::StdRng) -> Result<Packet, Error> {
    let choice = rng.gen_range(0..=Strategy::ALL.len());
    if choice == 0 {
        let name = FLOOD_DOMAINS.choose(rng).copied().unwrap_or(FLOOD_DOMAINS[0]);
        let qtype = FLOOD_TYPES.choose(rng).copied().unwrap_or(dnspkt::RR_A);
        Packet::query(&workers::domain(name), qtype, rng.gen()).map_err(Error::Encode)
    } else {
        Ok(Packet::from_strategy(Strategy::ALL[choice - 1], rng.gen()))
    }
}

pub(super) async fn run(harness: &Harness, report: &mut Report) -> Result<(), Error> {
    let conf = &harness.config().flood;
    let timeout = harness.oracle().timeout();
    let sock = UdpSocket::connect(harness.config().target)
        .await
        .map_err(Error::Send)?;

    log::info!("Phase 1: one of everything");
    let sweep = Tally::default();
    let probe_shaped = Packet::query(
        &harness.config().oracle.domain,
        harness.config().oracle.qtype,
        Harness::seed(),
    )
    .map_err(Error::Encode)?;
    send(&sock, &probe_shaped, &sweep, timeout).await;
    tokio::time::sleep(conf.sweep_delay).await;
    for strategy in Strategy::ALL {
        send(
            &sock,
            &Packet::from_strategy(strategy, Harness::seed()),
            &sweep,
            timeout,
        )
        .await;
        tokio::time::sleep(conf.sweep_delay).await;
    }

    log::info!("Phase 2: health check ({})", sweep);
    if !harness.oracle().probe().await.alive {
        report.record(ScenarioOutcome::fail(
            SWEEP,
            format!("{}; server unresponsive after catalog sweep", sweep),
        ));
        return Ok(());
    }
    report.record(ScenarioOutcome::pass(
        SWEEP,
        format!("{}; server still responsive", sweep),
    ));

    log::info!("Phase 3: {} random packets", conf.random_packets);
    let mix = Tally::default();
    let mut rng = rand::rngs::StdRng::from_entropy();
    for i in 0..conf.random_packets {
        let packet = random_packet(&mut rng)?;
        if i % 10 == 0 {
            log::info!("  packet {}/{}: {}", i, conf.random_packets, packet);
        }
        send(&sock, &packet, &mix, timeout).await;
        tokio::time::sleep(conf.random_delay).await;
    }

    log::info!("Phase 4: settle and final health check ({})", mix);
    tokio::time::sleep(conf.settle).await;
    if harness.oracle().probe().await.alive {
        report.record(ScenarioOutcome::pass(
            RANDOM,
            format!("{}; server still responsive", mix),
        ));
    } else {
        report.record(ScenarioOutcome::fail(
            RANDOM,
            format!("{}; server unresponsive after random flood", mix),
        ));
    }
    Ok(())
}
