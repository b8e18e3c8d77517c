//
// Copyright 2024-2025 Jeff Bush
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//
// Per-node ICMP configuration. Input is a list of KEY VALUE lines, e.g.
//
//     ICMP-ROUTER                              YES
//     ICMP-ROUTER-ADVERTISEMENT-MIN-INTERVAL   450S
//     ICMP-REDIRECT-RETRY-TIME                 500MS
//
// Durations take an optional NS, US, MS, S, M or H suffix; a bare number
// is seconds. Keys this module doesn't know are ignored so a whole node
// configuration file can be passed in.
//

use crate::error::ConfigError;
use log::{debug, warn};
use std::time::Duration;

pub const DEFAULT_MAX_ADVERTISEMENT_INTERVAL: Duration = Duration::from_secs(600);
pub const DEFAULT_MIN_ADVERTISEMENT_INTERVAL: Duration = Duration::from_secs(450);
pub const DEFAULT_ADVERTISEMENT_LIFETIME: Duration = Duration::from_secs(1800);
pub const DEFAULT_REDIRECT_RETRY_TIME: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_SOLICITATIONS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpConfig {
    pub router: bool,

    pub network_unreachable_enabled: bool,
    pub host_unreachable_enabled: bool,
    pub protocol_unreachable_enabled: bool,
    pub port_unreachable_enabled: bool,
    pub fragmentation_needed_enabled: bool,
    pub source_route_failed_enabled: bool,
    pub source_quench_enabled: bool,
    pub ttl_exceeded_enabled: bool,
    pub reassembly_timeout_enabled: bool,
    pub parameter_problem_enabled: bool,
    pub security_failure_enabled: bool,
    pub redirect_enabled: bool,

    pub redirect_override_routing: bool,
    pub redirect_retry_time: Duration,
    pub min_advertisement_interval: Duration,
    pub max_advertisement_interval: Duration,
    pub advertisement_lifetime: Duration,
    pub max_solicitations: u32,

    pub collect_statistics: bool,
    pub collect_error_statistics: bool,

    pub seed: u64,
}

impl Default for IcmpConfig {
    fn default() -> Self {
        IcmpConfig {
            router: false,
            network_unreachable_enabled: true,
            host_unreachable_enabled: true,
            protocol_unreachable_enabled: true,
            port_unreachable_enabled: true,
            fragmentation_needed_enabled: true,
            source_route_failed_enabled: true,
            source_quench_enabled: true,
            ttl_exceeded_enabled: true,
            reassembly_timeout_enabled: true,
            parameter_problem_enabled: true,
            security_failure_enabled: true,
            redirect_enabled: true,
            redirect_override_routing: true,
            redirect_retry_time: DEFAULT_REDIRECT_RETRY_TIME,
            min_advertisement_interval: DEFAULT_MIN_ADVERTISEMENT_INTERVAL,
            max_advertisement_interval: DEFAULT_MAX_ADVERTISEMENT_INTERVAL,
            advertisement_lifetime: DEFAULT_ADVERTISEMENT_LIFETIME,
            max_solicitations: DEFAULT_MAX_SOLICITATIONS,
            collect_statistics: false,
            collect_error_statistics: false,
            seed: 0,
        }
    }
}

impl IcmpConfig {
    pub fn router() -> IcmpConfig {
        IcmpConfig {
            router: true,
            ..IcmpConfig::default()
        }
    }

    /// Parse KEY VALUE lines. Blank lines and lines starting with '#'
    /// are skipped.
    pub fn parse(text: &str) -> Result<IcmpConfig, ConfigError> {
        let mut pairs = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let key = fields.next().ok_or(ConfigError::Syntax(index + 1))?;
            let value = fields.next().ok_or(ConfigError::Syntax(index + 1))?;
            pairs.push((key, value));
        }

        Self::from_pairs(pairs)
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Result<IcmpConfig, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = IcmpConfig::default();
        for (key, value) in pairs {
            config.apply(key, value)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "ICMP-ROUTER" => {
                self.router = match value.to_ascii_uppercase().as_str() {
                    "YES" => true,
                    "NO" => false,
                    _ => return Err(bad_value(key, value)),
                }
            }
            "ICMP-NETWORK-UNREACHABLE-ENABLED" => {
                self.network_unreachable_enabled = parse_enable(key, value)
            }
            "ICMP-HOST-UNREACHABLE-ENABLED" => self.host_unreachable_enabled = parse_enable(key, value),
            "ICMP-PROTOCOL-UNREACHABLE-ENABLED" => {
                self.protocol_unreachable_enabled = parse_enable(key, value)
            }
            "ICMP-PORT-UNREACHABLE-ENABLED" => self.port_unreachable_enabled = parse_enable(key, value),
            "ICMP-FRAGMENTATION-NEEDED-ENABLED" => {
                self.fragmentation_needed_enabled = parse_enable(key, value)
            }
            "ICMP-SOURCE-ROUTE-FAILED-ENABLED" => {
                self.source_route_failed_enabled = parse_enable(key, value)
            }
            "ICMP-SOURCE-QUENCE-ENABLED" => self.source_quench_enabled = parse_enable(key, value),
            "ICMP-TTL-EXCEEDED-ENABLED" => self.ttl_exceeded_enabled = parse_enable(key, value),
            "ICMP-FRAGMENTS-REASSEMBLY-TIMEOUT-ENABLED" => {
                self.reassembly_timeout_enabled = parse_enable(key, value)
            }
            "ICMP-PARAMETER-PROBLEM-ENABLED" => self.parameter_problem_enabled = parse_enable(key, value),
            "ICMP-SECURITY-FAILURE-ENABLED" => self.security_failure_enabled = parse_enable(key, value),
            "ICMP-REDIRECT-ENABLE" => self.redirect_enabled = parse_enable(key, value),
            "ICMP-REDIRECT-OVERRIDE-ROUTING" => self.redirect_override_routing = parse_enable(key, value),
            "ICMP-REDIRECT-RETRY-TIME" => self.redirect_retry_time = parse_duration(key, value)?,
            "ICMP-ROUTER-ADVERTISEMENT-MIN-INTERVAL" => {
                self.min_advertisement_interval = parse_duration(key, value)?
            }
            "ICMP-ROUTER-ADVERTISEMENT-MAX-INTERVAL" => {
                self.max_advertisement_interval = parse_duration(key, value)?
            }
            "ICMP-ROUTER-ADVERTISEMENT-LIFE-TIME" => {
                self.advertisement_lifetime = parse_duration(key, value)?
            }
            "ICMP-MAX-NUM-SOLICITATION" => {
                let count: i64 = value.parse().map_err(|_| bad_value(key, value))?;
                if count < 0 {
                    return Err(ConfigError::NegativeSolicitations);
                }

                self.max_solicitations = u32::try_from(count).map_err(|_| bad_value(key, value))?;
            }
            "ICMP-STATISTICS" => self.collect_statistics = parse_statistics(key, value),
            "ICMP-ERROR-STATISTICS" => self.collect_error_statistics = parse_statistics(key, value),
            "SEED" => self.seed = value.parse().map_err(|_| bad_value(key, value))?,
            _ => debug!("ICMP config: ignoring {}", key),
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_advertisement_interval < self.min_advertisement_interval {
            return Err(ConfigError::MaxBelowMin);
        }

        if self.advertisement_lifetime < Duration::from_secs(1) {
            return Err(ConfigError::LifetimeTooShort);
        }

        if self.advertisement_lifetime <= self.max_advertisement_interval {
            return Err(ConfigError::LifetimeNotAboveMax);
        }

        Ok(())
    }
}

fn bad_value(key: &str, value: &str) -> ConfigError {
    ConfigError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

// Feature switches are on unless explicitly turned off.
fn parse_enable(key: &str, value: &str) -> bool {
    match value.to_ascii_uppercase().as_str() {
        "YES" => true,
        "NO" => false,
        _ => {
            warn!("{}: unknown value '{}', using YES", key, value);
            true
        }
    }
}

// Statistics are off unless explicitly turned on.
fn parse_statistics(key: &str, value: &str) -> bool {
    match value.to_ascii_uppercase().as_str() {
        "YES" => true,
        "NO" => false,
        _ => {
            warn!("{}: unknown value '{}', using NO", key, value);
            false
        }
    }
}

pub fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let upper = value.to_ascii_uppercase();
    let split = upper
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(upper.len());
    let (digits, suffix) = upper.split_at(split);
    let count: u64 = digits.parse().map_err(|_| bad_value(key, value))?;
    let duration = match suffix {
        "NS" => Duration::from_nanos(count),
        "US" => Duration::from_micros(count),
        "MS" => Duration::from_millis(count),
        "" | "S" => Duration::from_secs(count),
        "M" => Duration::from_secs(count * 60),
        "H" => Duration::from_secs(count * 3600),
        _ => return Err(bad_value(key, value)),
    };

    Ok(duration)
}
