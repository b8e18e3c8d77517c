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

use crate::error::{IcmpError, Result};
use crate::util;
use crate::util::IPv4Addr;

//    0               1               2               3
//    +---------------+---------------+-------------------------------+
//  0 |     Type      |     Code      |          Checksum             |
//    +---------------+---------------+-------------------------------+
//  4 |             Type specific (see HeaderFields)                  |
//    +---------------------------------------------------------------+
//  8 |                     Payload...                                |
//    +---------------------------------------------------------------+

pub const ICMP_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    SourceQuench = 4,
    Redirect = 5,
    Echo = 8,
    RouterAdvertisement = 9,
    RouterSolicitation = 10,
    TimeExceeded = 11,
    ParameterProblem = 12,
    Timestamp = 13,
    TimestampReply = 14,
    InformationRequest = 15,
    InformationReply = 16,
    Traceroute = 30,
    SecurityFailure = 40,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<IcmpType> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            4 => Some(IcmpType::SourceQuench),
            5 => Some(IcmpType::Redirect),
            8 => Some(IcmpType::Echo),
            9 => Some(IcmpType::RouterAdvertisement),
            10 => Some(IcmpType::RouterSolicitation),
            11 => Some(IcmpType::TimeExceeded),
            12 => Some(IcmpType::ParameterProblem),
            13 => Some(IcmpType::Timestamp),
            14 => Some(IcmpType::TimestampReply),
            15 => Some(IcmpType::InformationRequest),
            16 => Some(IcmpType::InformationReply),
            30 => Some(IcmpType::Traceroute),
            40 => Some(IcmpType::SecurityFailure),
            _ => None,
        }
    }
}

pub mod unreachable {
    pub const NETWORK: u8 = 0;
    pub const HOST: u8 = 1;
    pub const PROTOCOL: u8 = 2;
    pub const PORT: u8 = 3;
    pub const FRAGMENTATION_NEEDED: u8 = 4;
    pub const SOURCE_ROUTE_FAILED: u8 = 5;
    pub const NETWORK_UNKNOWN: u8 = 6;
    pub const HOST_UNKNOWN: u8 = 7;
    pub const SOURCE_HOST_ISOLATED: u8 = 8;
    pub const NETWORK_PROHIBITED: u8 = 9;
    pub const HOST_PROHIBITED: u8 = 10;
    pub const NETWORK_UNREACHABLE_TOS: u8 = 11;
    pub const HOST_UNREACHABLE_TOS: u8 = 12;
    pub const COMMUNICATION_PROHIBITED: u8 = 13;
    pub const HOST_PRECEDENCE_VIOLATION: u8 = 14;
    pub const PRECEDENCE_CUTOFF: u8 = 15;
}

pub mod redirect {
    pub const NETWORK: u8 = 0;
    pub const HOST: u8 = 1;
    pub const TOS_NETWORK: u8 = 2;
    pub const TOS_HOST: u8 = 3;
}

pub mod time_exceeded {
    pub const TTL_EXPIRED: u8 = 0;
    pub const REASSEMBLY_TIMEOUT: u8 = 1;
}

pub mod security_failure {
    pub const BAD_SPI: u8 = 0;
    pub const AUTHENTICATION_FAILED: u8 = 1;
    pub const DECOMPRESSION_FAILED: u8 = 2;
    pub const DECRYPTION_FAILED: u8 = 3;
    pub const NEED_AUTHENTICATION: u8 = 4;
    pub const NEED_AUTHORIZATION: u8 = 5;
}

/// The second word of the header. Which variant applies depends on the
/// message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFields {
    RouterAdvertisement {
        num_addrs: u8,
        entry_size: u8,
        lifetime: u16,
    },
    RouterSolicitation,
    Redirect {
        gateway: IPv4Addr,
    },
    EchoOrTimestamp {
        id: u16,
        sequence: u16,
    },
    Traceroute {
        id: u16,
    },
    ParameterProblem {
        pointer: u8,
    },
    Unused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub fields: HeaderFields,
}

/// Checksum over the even-length prefix of the message. A trailing odd
/// byte is not covered.
pub fn icmp_checksum(message: &[u8]) -> u16 {
    let even_len = (message.len() >> 1) << 1;
    util::compute_checksum(&message[..even_len])
}

fn layout_matches(icmp_type: IcmpType, fields: &HeaderFields) -> bool {
    use IcmpType::*;

    match icmp_type {
        RouterAdvertisement => matches!(fields, HeaderFields::RouterAdvertisement { .. }),
        RouterSolicitation => matches!(fields, HeaderFields::RouterSolicitation),
        Redirect => matches!(fields, HeaderFields::Redirect { .. }),
        EchoReply | Echo | Timestamp | TimestampReply => {
            matches!(fields, HeaderFields::EchoOrTimestamp { .. })
        }
        Traceroute => matches!(fields, HeaderFields::Traceroute { .. }),
        ParameterProblem => matches!(fields, HeaderFields::ParameterProblem { .. }),
        DestinationUnreachable | SourceQuench | TimeExceeded | SecurityFailure => {
            matches!(fields, HeaderFields::Unused)
        }
        InformationRequest | InformationReply => false,
    }
}

/// Fill in the ICMP header at the start of `message` and compute the
/// checksum over the whole message. The caller must have reserved
/// ICMP_HEADER_LEN bytes.
///
/// Panics if the type is one this stack never generates, or if `fields`
/// is not the layout for that type.
pub fn set_header(message: &mut [u8], icmp_type: u8, code: u8, fields: HeaderFields) {
    let kind = match IcmpType::from_u8(icmp_type) {
        Some(kind) => kind,
        None => panic!("set_header: ICMP type {} is not a valid one", icmp_type),
    };

    assert!(
        layout_matches(kind, &fields),
        "set_header: {:?} does not fit ICMP type {:?}",
        fields,
        kind
    );

    let header = &mut message[..ICMP_HEADER_LEN];
    header[0] = icmp_type;
    header[1] = code;
    header[2..8].fill(0);
    match fields {
        HeaderFields::RouterAdvertisement {
            num_addrs,
            entry_size,
            lifetime,
        } => {
            header[4] = num_addrs;
            header[5] = entry_size;
            util::set_be16(&mut header[6..8], lifetime);
        }
        HeaderFields::Redirect { gateway } => gateway.copy_to(&mut header[4..8]),
        HeaderFields::EchoOrTimestamp { id, sequence } => {
            util::set_be16(&mut header[4..6], id);
            util::set_be16(&mut header[6..8], sequence);
        }
        HeaderFields::Traceroute { id } => util::set_be16(&mut header[4..6], id),
        HeaderFields::ParameterProblem { pointer } => header[4] = pointer,
        HeaderFields::RouterSolicitation | HeaderFields::Unused => {}
    }

    let checksum = icmp_checksum(message);
    util::set_be16(&mut message[2..4], checksum);
}

pub fn parse_header(message: &[u8]) -> Result<IcmpHeader> {
    if message.len() < ICMP_HEADER_LEN {
        return Err(IcmpError::Truncated {
            needed: ICMP_HEADER_LEN,
            actual: message.len(),
        });
    }

    let icmp_type = message[0];
    let kind = IcmpType::from_u8(icmp_type).ok_or(IcmpError::UnknownType(icmp_type))?;
    let fields = match kind {
        IcmpType::RouterAdvertisement => HeaderFields::RouterAdvertisement {
            num_addrs: message[4],
            entry_size: message[5],
            lifetime: util::get_be16(&message[6..8]),
        },
        IcmpType::RouterSolicitation => HeaderFields::RouterSolicitation,
        IcmpType::Redirect => HeaderFields::Redirect {
            gateway: IPv4Addr::new_from(&message[4..8]),
        },
        IcmpType::EchoReply | IcmpType::Echo | IcmpType::Timestamp | IcmpType::TimestampReply => {
            HeaderFields::EchoOrTimestamp {
                id: util::get_be16(&message[4..6]),
                sequence: util::get_be16(&message[6..8]),
            }
        }
        IcmpType::Traceroute => HeaderFields::Traceroute {
            id: util::get_be16(&message[4..6]),
        },
        IcmpType::ParameterProblem => HeaderFields::ParameterProblem {
            pointer: message[4],
        },
        _ => HeaderFields::Unused,
    };

    Ok(IcmpHeader {
        icmp_type,
        code: message[1],
        checksum: util::get_be16(&message[2..4]),
        fields,
    })
}
