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
 *  dnsfuzz Configuration parsing.
 */
use crate::dns::dnspkt;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use yaml_rust::yaml;
use yaml_rust::yaml::YamlLoader;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    Utf8Error(std::string::FromUtf8Error),
    YamlError(yaml_rust::scanner::ScanError),
    MissingConfig,
    MultipleConfigs,
    ConfigProcessFailed,
    InvalidConfig(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Error::*;
        match self {
            IoError(e) => write!(f, "I/O Error reading configuration file: {}", e),
            Utf8Error(e) => write!(f, "UTF8 Decoding error reading configuration file: {}", e),
            YamlError(e) => write!(f, "Yaml parse error while reading configuration: {}", e),
            MissingConfig => write!(f, "Configuration is empty/missing"),
            MultipleConfigs => write!(f, "Configuration file contains multiple configurations"),
            ConfigProcessFailed => write!(f, "Configuration process failed"),
            InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub const DEFAULT_PORT: u16 = 15353;

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub domain: dnspkt::Domain,
    pub qtype: dnspkt::Type,
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            domain: dnspkt::Domain::from(
                ["host1", "zone1", "test"]
                    .iter()
                    .map(|l| dnspkt::Label::from(l.as_bytes().to_vec()))
                    .collect::<Vec<_>>(),
            ),
            qtype: dnspkt::RR_A,
            timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationConfig {
    pub settle: Duration,
    /// Strategy names, as given.  None means the whole catalog.
    pub strategies: Option<Vec<String>>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            strategies: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FloodConfig {
    pub sweep_delay: Duration,
    pub random_packets: usize,
    pub random_delay: Duration,
    pub settle: Duration,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            sweep_delay: Duration::from_millis(50),
            random_packets: 100,
            random_delay: Duration::from_millis(20),
            settle: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RaceConfig {
    pub query_timeout: Duration,
    pub settle: Duration,
    pub reload_settle: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_millis(500),
            settle: Duration::from_millis(500),
            reload_settle: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReloadConfig {
    /// `{port}` is replaced by the target port.
    pub process_pattern: String,
    pub signal: nix::sys::signal::Signal,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            process_pattern: "dnsserver.*{port}".into(),
            signal: nix::sys::signal::Signal::SIGHUP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target: std::net::SocketAddr,
    pub oracle: OracleConfig,
    pub isolation: IsolationConfig,
    pub flood: FloodConfig,
    pub race: RaceConfig,
    pub reload: ReloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: (std::net::Ipv4Addr::LOCALHOST, DEFAULT_PORT).into(),
            oracle: Default::default(),
            isolation: Default::default(),
            flood: Default::default(),
            race: Default::default(),
            reload: Default::default(),
        }
    }
}

pub type SharedConfig = std::sync::Arc<Config>;

pub fn parse_string(name: &str, fragment: &yaml::Yaml) -> Result<Option<String>, Error> {
    match fragment {
        yaml::Yaml::Null => Ok(None),
        yaml::Yaml::String(s) => Ok(Some(s.into())),
        e => Err(Error::InvalidConfig(format!(
            "{} should be a string, not {:?}",
            name, e
        ))),
    }
}

pub fn parse_number(name: &str, fragment: &yaml::Yaml) -> Result<Option<i64>, Error> {
    match fragment {
        yaml::Yaml::Null => Ok(None),
        yaml::Yaml::Integer(i) => Ok(Some(*i)),
        e => Err(Error::InvalidConfig(format!(
            "{} should be a number, not {:?}",
            name, e
        ))),
    }
}

pub fn parse_array<T, F>(
    name: &str,
    fragment: &yaml::Yaml,
    parser: F,
) -> Result<Option<Vec<T>>, Error>
where
    F: Fn(&str, &yaml::Yaml) -> Result<Option<T>, Error>,
{
    match fragment {
        yaml::Yaml::Null => Ok(None),
        yaml::Yaml::Array(a) => {
            let mut v = Vec::with_capacity(a.len());
            for (i, item) in a.iter().enumerate() {
                if let Some(x) = parser(&format!("{}[{}]", name, i), item)? {
                    v.push(x);
                }
            }
            Ok(Some(v))
        }
        e => Err(Error::InvalidConfig(format!(
            "{} should be a list, not {:?}",
            name, e
        ))),
    }
}

fn duration_from_str(name: &str, s: &str) -> Result<Duration, Error> {
    let s = s.trim();
    let invalid = || Error::InvalidConfig(format!("{}: invalid duration {:?}", name, s));
    let (num, unit) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: f64 = num.parse().map_err(|_| invalid())?;
    let nanos_per_unit = match unit.trim() {
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        "h" => 3600e9,
        _ => return Err(invalid()),
    };
    let nanos = (value * nanos_per_unit).round();
    if !nanos.is_finite() || nanos < 0.0 || nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Durations are "500ms", "2s", "1m", "1h", or a bare number of seconds.
pub fn parse_duration(name: &str, fragment: &yaml::Yaml) -> Result<Option<Duration>, Error> {
    match fragment {
        yaml::Yaml::Null => Ok(None),
        yaml::Yaml::Integer(i) if *i >= 0 => Ok(Some(Duration::from_secs(*i as u64))),
        yaml::Yaml::Real(r) => duration_from_str(name, r).map(Some),
        yaml::Yaml::String(s) => duration_from_str(name, s).map(Some),
        e => Err(Error::InvalidConfig(format!(
            "{} should be a duration, not {:?}",
            name, e
        ))),
    }
}

fn parse_qtype(name: &str, fragment: &yaml::Yaml) -> Result<Option<dnspkt::Type>, Error> {
    match fragment {
        yaml::Yaml::Null => Ok(None),
        yaml::Yaml::Integer(i) => u16::try_from(*i)
            .map(|t| Some(dnspkt::Type(t)))
            .map_err(|_| Error::InvalidConfig(format!("{}: type {} out of range", name, i))),
        yaml::Yaml::String(s) => s
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", name, e))),
        e => Err(Error::InvalidConfig(format!(
            "{} should be an RR type, not {:?}",
            name, e
        ))),
    }
}

fn parse_domain(name: &str, fragment: &yaml::Yaml) -> Result<Option<dnspkt::Domain>, Error> {
    parse_string(name, fragment)?
        .map(|s| {
            s.parse()
                .map_err(|e| Error::InvalidConfig(format!("{}: {}: {:?}", name, e, s)))
        })
        .transpose()
}

/// Iterate over a mapping, rejecting non-string keys.
fn for_each_key<F>(name: &str, fragment: &yaml::Yaml, mut f: F) -> Result<(), Error>
where
    F: FnMut(&str, &yaml::Yaml) -> Result<(), Error>,
{
    match fragment {
        yaml::Yaml::Null => Ok(()),
        yaml::Yaml::Hash(h) => {
            for (k, v) in h {
                match k.as_str() {
                    Some(key) => f(key, v)?,
                    None => {
                        return Err(Error::InvalidConfig(format!(
                            "Expected string in {}, not {:?}",
                            name, k
                        )))
                    }
                }
            }
            Ok(())
        }
        e => Err(Error::InvalidConfig(format!(
            "{} should be a mapping, not {:?}",
            name, e
        ))),
    }
}

fn unknown(section: &str, key: &str) -> Error {
    Error::InvalidConfig(format!("Unknown {} keyword {}", section, key))
}

fn parse_target(conf: &mut Config, fragment: &yaml::Yaml) -> Result<(), Error> {
    for_each_key("target", fragment, |k, v| {
        match k {
            "address" => {
                if let Some(a) = parse_string("target.address", v)? {
                    let ip: std::net::IpAddr = a.parse().map_err(|e| {
                        Error::InvalidConfig(format!("target.address {:?}: {}", a, e))
                    })?;
                    conf.target.set_ip(ip);
                }
            }
            "port" => {
                if let Some(p) = parse_number("target.port", v)? {
                    conf.target.set_port(u16::try_from(p).map_err(|_| {
                        Error::InvalidConfig(format!("target.port {} out of range", p))
                    })?);
                }
            }
            key => return Err(unknown("target", key)),
        }
        Ok(())
    })
}

fn parse_oracle(conf: &mut OracleConfig, fragment: &yaml::Yaml) -> Result<(), Error> {
    for_each_key("oracle", fragment, |k, v| {
        match k {
            "domain" => {
                if let Some(d) = parse_domain("oracle.domain", v)? {
                    conf.domain = d
                }
            }
            "qtype" => {
                if let Some(t) = parse_qtype("oracle.qtype", v)? {
                    conf.qtype = t
                }
            }
            "timeout" => {
                if let Some(t) = parse_duration("oracle.timeout", v)? {
                    conf.timeout = t
                }
            }
            key => return Err(unknown("oracle", key)),
        }
        Ok(())
    })
}

fn parse_isolation(conf: &mut IsolationConfig, fragment: &yaml::Yaml) -> Result<(), Error> {
    for_each_key("isolation", fragment, |k, v| {
        match k {
            "settle" => {
                if let Some(t) = parse_duration("isolation.settle", v)? {
                    conf.settle = t
                }
            }
            "strategies" => conf.strategies = parse_array("isolation.strategies", v, parse_string)?,
            key => return Err(unknown("isolation", key)),
        }
        Ok(())
    })
}

fn parse_flood(conf: &mut FloodConfig, fragment: &yaml::Yaml) -> Result<(), Error> {
    for_each_key("flood", fragment, |k, v| {
        match k {
            "sweep-delay" => {
                if let Some(t) = parse_duration("flood.sweep-delay", v)? {
                    conf.sweep_delay = t
                }
            }
            "random-packets" => {
                if let Some(n) = parse_number("flood.random-packets", v)? {
                    conf.random_packets = usize::try_from(n).map_err(|_| {
                        Error::InvalidConfig(format!("flood.random-packets {} out of range", n))
                    })?
                }
            }
            "random-delay" => {
                if let Some(t) = parse_duration("flood.random-delay", v)? {
                    conf.random_delay = t
                }
            }
            "settle" => {
                if let Some(t) = parse_duration("flood.settle", v)? {
                    conf.settle = t
                }
            }
            key => return Err(unknown("flood", key)),
        }
        Ok(())
    })
}

fn parse_race(conf: &mut RaceConfig, fragment: &yaml::Yaml) -> Result<(), Error> {
    for_each_key("race", fragment, |k, v| {
        match k {
            "query-timeout" => {
                if let Some(t) = parse_duration("race.query-timeout", v)? {
                    conf.query_timeout = t
                }
            }
            "settle" => {
                if let Some(t) = parse_duration("race.settle", v)? {
                    conf.settle = t
                }
            }
            "reload-settle" => {
                if let Some(t) = parse_duration("race.reload-settle", v)? {
                    conf.reload_settle = t
                }
            }
            key => return Err(unknown("race", key)),
        }
        Ok(())
    })
}

fn parse_reload(conf: &mut ReloadConfig, fragment: &yaml::Yaml) -> Result<(), Error> {
    for_each_key("reload", fragment, |k, v| {
        match k {
            "process-pattern" => {
                if let Some(p) = parse_string("reload.process-pattern", v)? {
                    conf.process_pattern = p
                }
            }
            "signal" => {
                if let Some(s) = parse_string("reload.signal", v)? {
                    let upper = s.to_ascii_uppercase();
                    let full = if upper.starts_with("SIG") {
                        upper
                    } else {
                        format!("SIG{}", upper)
                    };
                    conf.signal = full.parse().map_err(|_| {
                        Error::InvalidConfig(format!("reload.signal: unknown signal {:?}", s))
                    })?
                }
            }
            key => return Err(unknown("reload", key)),
        }
        Ok(())
    })
}

pub fn load_config_from_string(cfg: &str) -> Result<SharedConfig, Error> {
    let y = YamlLoader::load_from_str(cfg).map_err(Error::YamlError)?;
    match y.len() {
        0 => return Err(Error::MissingConfig),
        1 => (),
        _ => return Err(Error::MultipleConfigs),
    }
    let mut conf = Config::default();
    for_each_key("configuration", &y[0], |k, v| match k {
        "target" => parse_target(&mut conf, v),
        "oracle" => parse_oracle(&mut conf.oracle, v),
        "isolation" => parse_isolation(&mut conf.isolation, v),
        "flood" => parse_flood(&mut conf.flood, v),
        "race" => parse_race(&mut conf.race, v),
        "reload" => parse_reload(&mut conf.reload, v),
        key => Err(unknown("top level", key)),
    })?;
    Ok(std::sync::Arc::new(conf))
}

/* We support reading configs from a yaml file, _or_ a program (eg a shell script?) that outputs
 * yaml on stdout.
 */
pub async fn load_config_from_path(path: &std::path::Path) -> Result<SharedConfig, Error> {
    let metadata = std::fs::metadata(path).map_err(Error::IoError)?;
    let configdata = if metadata.permissions().mode() & 0o111 != 0 {
        let output = tokio::process::Command::new(path)
            .output()
            .await
            .map_err(Error::IoError)?;
        if !output.status.success() {
            return Err(Error::ConfigProcessFailed);
        }
        String::from_utf8(output.stdout).map_err(Error::Utf8Error)?
    } else {
        let mut contents = vec![];
        tokio::fs::File::open(path)
            .await
            .map_err(Error::IoError)?
            .read_to_end(&mut contents)
            .await
            .map_err(Error::IoError)?;

        String::from_utf8(contents).map_err(Error::Utf8Error)?
    };

    load_config_from_string(&configdata)
}

#[test]
fn test_config_parse() -> Result<(), Error> {
    let conf = load_config_from_string(
        "---
target:
    address: '::1'
    port: 5300
oracle:
    domain: www.example.test
    qtype: AAAA
    timeout: 1500ms
isolation:
    settle: 0.25
    strategies: [compression_loop, invalid_counts]
flood:
    sweep-delay: 10ms
    random-packets: 7
    random-delay: 5ms
    settle: 1s
race:
    query-timeout: 100ms
    settle: 200ms
    reload-settle: 1m
reload:
    process-pattern: 'named.*-p {port}'
    signal: usr1
",
    )?;
    assert_eq!(
        conf.target,
        "[::1]:5300".parse::<std::net::SocketAddr>().unwrap()
    );
    assert_eq!(conf.oracle.domain.to_string(), "www.example.test");
    assert_eq!(conf.oracle.qtype, dnspkt::RR_AAAA);
    assert_eq!(conf.oracle.timeout, Duration::from_millis(1500));
    assert_eq!(conf.isolation.settle, Duration::from_millis(250));
    assert_eq!(
        conf.isolation.strategies,
        Some(vec!["compression_loop".into(), "invalid_counts".into()])
    );
    assert_eq!(conf.flood.random_packets, 7);
    assert_eq!(conf.race.reload_settle, Duration::from_secs(60));
    assert_eq!(conf.reload.process_pattern, "named.*-p {port}");
    assert_eq!(conf.reload.signal, nix::sys::signal::Signal::SIGUSR1);
    Ok(())
}

#[test]
fn test_config_defaults() -> Result<(), Error> {
    let conf = load_config_from_string("---\n{}\n")?;
    assert_eq!(
        conf.target,
        "127.0.0.1:15353".parse::<std::net::SocketAddr>().unwrap()
    );
    assert_eq!(conf.oracle.domain.to_string(), "host1.zone1.test");
    assert_eq!(conf.oracle.timeout, Duration::from_secs(2));
    assert_eq!(conf.isolation.settle, Duration::from_millis(500));
    assert!(conf.isolation.strategies.is_none());
    assert_eq!(conf.flood.random_packets, 100);
    assert_eq!(conf.race.reload_settle, Duration::from_secs(2));
    assert_eq!(conf.reload.signal, nix::sys::signal::Signal::SIGHUP);
    Ok(())
}

#[test]
fn test_config_unknown_keys() {
    assert!(matches!(
        load_config_from_string("---\nflood:\n    bogus: 1\n"),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        load_config_from_string("---\nbogus: 1\n"),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_config_bad_values() {
    assert!(load_config_from_string("---\noracle: {timeout: soon}\n").is_err());
    assert!(load_config_from_string("---\ntarget: {port: 70000}\n").is_err());
    assert!(load_config_from_string("---\nreload: {signal: SIGBOGUS}\n").is_err());
    assert!(load_config_from_string("---\noracle: {domain: 'a..b'}\n").is_err());
}

#[test]
fn test_durations() {
    assert_eq!(
        duration_from_str("t", "250ms").unwrap(),
        Duration::from_millis(250)
    );
    assert_eq!(duration_from_str("t", "3").unwrap(), Duration::from_secs(3));
    assert_eq!(
        duration_from_str("t", "2h").unwrap(),
        Duration::from_secs(7200)
    );
    assert!(duration_from_str("t", "ms").is_err());
    assert!(duration_from_str("t", "5 fortnights").is_err());
}
