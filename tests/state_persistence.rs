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

use data_mesher::core::crypto::Keypair;
use data_mesher::core::data::{Host, Hostname, HostnameOverride, Mesh, Network};
use data_mesher::core::store;
use std::collections::BTreeMap;
use std::fs;

fn keypair() -> Keypair {
    Keypair::generate().unwrap().0
}

fn sample_mesh() -> (Mesh, Keypair, Keypair) {
    let admin = keypair();
    let peer_a = keypair();
    let peer_b = keypair();

    let mut host_a = Host::new(peer_a.verify_key(), "42::1".parse().unwrap(), 7331);
    let mut claim = Hostname::new("wiki").unwrap();
    claim.update_signature(&admin, 500);
    host_a.hostnames.insert("wiki".into(), claim);
    host_a.update_signature(&peer_a, 1_000);

    let mut host_b = Host::new(peer_b.verify_key(), "42::2".parse().unwrap(), 7331);
    host_b
        .hostnames
        .insert("scratch".into(), Hostname::new("scratch").unwrap());
    host_b.update_signature(&peer_b, 1_001);

    let mut network = Network::new(admin.verify_key(), "mesh", true, 100);
    network.hosts.insert(host_a.public_key, host_a);
    network.hosts.insert(host_b.public_key, host_b);

    let mesh = Mesh::new(
        BTreeMap::from([(network.id, network)]),
        None,
        None,
    );
    (mesh, admin, peer_a)
}

#[test]
fn save_load_round_trip_preserves_signatures() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let (mut mesh, admin, peer_a) = sample_mesh();
    let doc = mesh.to_document(0);
    store::save_document(&doc, &path).unwrap();

    let networks = store::load_networks(&path);
    assert_eq!(networks.len(), 1);
    let network = &networks[&admin.verify_key()];
    assert_eq!(network.settings.tld, "mesh");
    assert_eq!(network.hosts.len(), 2);

    let host = &network.hosts[&peer_a.verify_key()];
    assert!(host.verify());
    assert!(host.hostnames["wiki"].verify(&[admin.verify_key()]));

    // Loading and re-serialising is byte-identical.
    let mut reloaded = Mesh::new(networks, None, None);
    assert_eq!(reloaded.to_document(0).to_bytes(), doc.to_bytes());
}

#[test]
fn missing_or_malformed_state_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(store::load_networks(&missing).is_empty());

    let garbled = dir.path().join("garbled.json");
    fs::write(&garbled, b"{not json").unwrap();
    assert!(store::load_networks(&garbled).is_empty());

    // Well-formed json that is not a mesh document is malformed too.
    let wrong = dir.path().join("wrong.json");
    fs::write(&wrong, b"{\"x\": 1}").unwrap();
    assert!(store::load_networks(&wrong).is_empty());
}

#[test]
fn failed_save_leaves_the_previous_state_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let (mut mesh, _, _) = sample_mesh();
    let doc = mesh.to_document(0);
    store::save_document(&doc, &path).unwrap();
    let before = fs::read(&path).unwrap();

    // Block the sibling temp file with a directory; the write must fail
    // without touching the target.
    fs::create_dir(dir.path().join("state.tmp")).unwrap();
    assert!(store::save_document(&doc, &path).is_err());
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn dns_export_is_stable_and_applies_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dns.json");

    let admin = keypair();
    let peer = keypair();
    let mut host = Host::new(peer.verify_key(), "42::1".parse().unwrap(), 7331);
    host.hostnames
        .insert("alpha".into(), Hostname::new("alpha").unwrap());
    host.hostnames
        .insert("wiki".into(), Hostname::new("wiki").unwrap());
    host.update_signature(&peer, 1_000);

    let mut network = Network::new(admin.verify_key(), "m", true, 100);
    network.hosts.insert(host.public_key, host);
    network.settings.hostname_overrides.push(HostnameOverride {
        hostname: "wiki".into(),
        address: "43::9".parse().unwrap(),
    });

    let mesh = Mesh::new(BTreeMap::from([(network.id, network)]), None, None);
    store::export_dns(&mesh, &path).unwrap();

    let exported = fs::read_to_string(&path).unwrap();
    assert_eq!(
        exported,
        concat!(
            "{\"hostname\":\"alpha.m\",\"ip\":\"42::1\"}\n",
            "{\"hostname\":\"wiki.m\",\"ip\":\"43::9\"}\n",
        )
    );
}

#[test]
fn dns_export_binds_a_contested_name_to_the_earliest_claim() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dns.json");

    let admin = keypair();
    let early = keypair();
    let late = keypair();

    let mut early_claim = Hostname::new("wiki").unwrap();
    early_claim.update_signature(&admin, 100);
    let mut early_host = Host::new(early.verify_key(), "42::1".parse().unwrap(), 7331);
    early_host.hostnames.insert("wiki".into(), early_claim);
    early_host.update_signature(&early, 1_000);

    let mut late_claim = Hostname::new("wiki").unwrap();
    late_claim.update_signature(&admin, 200);
    let mut late_host = Host::new(late.verify_key(), "42::2".parse().unwrap(), 7331);
    late_host.hostnames.insert("wiki".into(), late_claim);
    late_host.update_signature(&late, 1_001);

    let mut network = Network::new(admin.verify_key(), "m", true, 100);
    network.hosts.insert(early_host.public_key, early_host);
    network.hosts.insert(late_host.public_key, late_host);

    let mesh = Mesh::new(BTreeMap::from([(network.id, network)]), None, None);
    store::export_dns(&mesh, &path).unwrap();

    let exported = fs::read_to_string(&path).unwrap();
    assert_eq!(exported, "{\"hostname\":\"wiki.m\",\"ip\":\"42::1\"}\n");
}
