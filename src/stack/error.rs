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

use thiserror::Error;

/// Reasons an inbound packet is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IcmpError {
    #[error("packet too short: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("ICMP checksum mismatch")]
    BadChecksum,

    #[error("malformed IP header: {0}")]
    BadIpHeader(&'static str),

    #[error("unknown ICMP type {0}")]
    UnknownType(u8),

    #[error("no interface with index {0}")]
    NoSuchInterface(usize),
}

/// Fatal configuration problems detected at init.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: cannot parse '{value}'")]
    BadValue { key: String, value: String },

    #[error("ICMP-ROUTER-ADVERTISEMENT-MAX-INTERVAL is less than ICMP-ROUTER-ADVERTISEMENT-MIN-INTERVAL")]
    MaxBelowMin,

    #[error("ICMP-ROUTER-ADVERTISEMENT-LIFE-TIME must be at least 1 second")]
    LifetimeTooShort,

    #[error("ICMP-ROUTER-ADVERTISEMENT-LIFE-TIME must be greater than ICMP-ROUTER-ADVERTISEMENT-MAX-INTERVAL")]
    LifetimeNotAboveMax,

    #[error("ICMP-MAX-NUM-SOLICITATION cannot be negative")]
    NegativeSolicitations,

    #[error("line {0}: expected KEY VALUE")]
    Syntax(usize),
}

pub type Result<T> = ::std::result::Result<T, IcmpError>;
