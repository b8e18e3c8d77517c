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

// ICMPv4 for a simulated IPv4 node: echo and timestamp queries, error
// reporting, redirects, and router discovery. The IP layer below and the
// transports above are reached through the traits in the ip module, so a
// node can be driven entirely from a simulation loop.

pub mod config;
pub mod error;
pub mod icmp;
pub mod ip;
pub mod netif;
pub mod packet;
pub mod sim;
pub mod timer;
pub mod util;

pub use config::IcmpConfig;
pub use error::{ConfigError, IcmpError};
pub use icmp::IcmpModule;
