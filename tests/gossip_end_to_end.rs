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
use data_mesher::core::data::{Host, Mesh, Network};
use data_mesher::networking::server::{Server, ServerSettings};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Node {
    mesh: Arc<Mutex<Mesh>>,
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Node {
    async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn spawn_node(dir: &Path, name: &str, bootstrap: Vec<String>) -> Node {
    let mut settings = ServerSettings::new(
        "::1".parse().unwrap(),
        0,
        dir.join(format!("{name}-state.json")),
        dir.join(format!("{name}-dns.json")),
        dir.join(format!("{name}-key")),
    );
    settings.bootstrap_peers = bootstrap;
    settings.reconcile_interval = Duration::from_millis(100);
    settings.request_timeout = Duration::from_secs(1);

    let server = Server::bind(settings).await.unwrap();
    let mesh = server.mesh();
    let addr = server.local_addr();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server.run(cancel.clone()));
    Node {
        mesh,
        addr,
        cancel,
        handle,
    }
}

fn node_key(dir: &Path, name: &str) -> Keypair {
    // load_or_create persists the key, so the server binding the same file
    // comes up with the same identity.
    Keypair::load_or_create(&dir.join(format!("{name}-key"))).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn two_nodes_learn_each_other_through_a_bootstrap_peer() {
    let dir = tempfile::tempdir().unwrap();

    let key_a = node_key(dir.path(), "a");
    let network_id = key_a.verify_key();

    let node_a = spawn_node(dir.path(), "a", Vec::new()).await;
    node_a
        .mesh
        .lock()
        .unwrap()
        .networks
        .insert(network_id, Network::new(network_id, "test", true, 100));

    let node_b = spawn_node(
        dir.path(),
        "b",
        vec![format!("http://[::1]:{}/", node_a.addr.port())],
    )
    .await;
    let key_b = node_key(dir.path(), "b");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        {
            let a = node_a.mesh.lock().unwrap();
            let b = node_b.mesh.lock().unwrap();
            let knows = |mesh: &Mesh| {
                mesh.networks.get(&network_id).is_some_and(|network| {
                    network.hosts.contains_key(&key_a.verify_key())
                        && network.hosts.contains_key(&key_b.verify_key())
                })
            };
            if knows(&a) && knows(&b) {
                break;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "nodes did not converge within 10s"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    node_a.shutdown().await;
    node_b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn get_returns_the_current_view_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let key = node_key(dir.path(), "a");
    let network_id = key.verify_key();

    let node = spawn_node(dir.path(), "a", Vec::new()).await;
    node.mesh
        .lock()
        .unwrap()
        .networks
        .insert(network_id, Network::new(network_id, "test", true, 100));

    let url = format!("http://[::1]:{}/", node.addr.port());
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );

    let body: serde_json::Value = response.json().await.unwrap();
    let network = &body[network_id.to_base64()];
    assert_eq!(network["settings"]["tld"], "test");
    // The node's own freshly signed record is injected on serialisation.
    assert!(network["hosts"][key.verify_key().to_base64()].is_object());

    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_posts_are_rejected_with_400() {
    let dir = tempfile::tempdir().unwrap();
    let node = spawn_node(dir.path(), "a", Vec::new()).await;
    let url = format!("http://[::1]:{}/", node.addr.port());
    let client = reqwest::Client::new();

    for body in [
        &b"{"[..],
        &b"[1,2"[..],
        &br#"{"a":1,"a":2}"#[..],
        &br#"{"x": -1}"#[..],
        &br#"{"k": {"settings": {}, "hosts": {}}}"#[..],
    ] {
        let response = client
            .post(&url)
            .header("content-type", "application/json")
            .body(body.to_vec())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "body: {}", String::from_utf8_lossy(body));
    }

    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn a_stale_claim_for_a_known_host_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let key_a = node_key(dir.path(), "a");
    let network_id = key_a.verify_key();
    let key_x = Keypair::generate().unwrap().0;

    // The recipient knows X at last_seen 5000.
    let mut current = Host::new(key_x.verify_key(), "::1".parse().unwrap(), 9);
    current.update_signature(&key_x, 5_000);

    let node = spawn_node(dir.path(), "a", Vec::new()).await;
    {
        let mut mesh = node.mesh.lock().unwrap();
        let mut network = Network::new(network_id, "test", true, 100);
        network.hosts.insert(current.public_key, current);
        mesh.networks.insert(network_id, network);
    }

    // A peer gossips an older, genuinely signed record for X.
    let mut outdated = Host::new(key_x.verify_key(), "::1".parse().unwrap(), 9);
    outdated.update_signature(&key_x, 50);
    let mut network = Network::new(network_id, "test", true, 100);
    network.hosts.insert(outdated.public_key, outdated);
    let body = Mesh::new(BTreeMap::from([(network_id, network)]), None, None)
        .to_document(0)
        .to_bytes();

    let url = format!("http://[::1]:{}/", node.addr.port());
    let response = reqwest::Client::new()
        .post(&url)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let mesh = node.mesh.lock().unwrap();
    assert_eq!(
        mesh.networks[&network_id].hosts[&key_x.verify_key()].last_seen,
        5_000
    );
    drop(mesh);

    node.shutdown().await;
}
