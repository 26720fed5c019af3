// Copyright (c) 2026 Data Mesher
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! data-mesher - a peer-to-peer name-and-host directory.
//!
//! A small fleet of nodes gossips a signed, eventually-consistent view of
//! which IPv6 hosts exist in one or more named networks and which short
//! hostnames they claim. This crate provides:
//! - A deterministic canonical JSON codec shared by signer and verifier
//! - Ed25519-signed host and hostname records with last-writer-wins merge
//! - Atomic state persistence and a flat hostname export for DNS resolvers
//! - An HTTP gossip endpoint plus a background reconciliation loop

/// Core protocol primitives (codec, crypto, entity model, persistence).
pub mod core;
/// Gossip networking (HTTP endpoint, reconciliation client).
pub mod networking;
