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
#![deny(missing_docs)]

//! Background reconciliation loop.
//!
//! Every round the node pushes its view to each bootstrap peer, then to
//! each host it considers stale, and merges whatever comes back. Peer
//! failures are debug-logged and retried next round; nothing is ever
//! evicted from the bootstrap list. Cancellation is observed at the sleep
//! and between per-peer requests.

use crate::core::codec::Document;
use crate::core::data::Mesh;
use crate::networking::server::AppState;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reconciler knobs, split from the server settings.
pub(crate) struct ReconcilerSettings {
    pub(crate) bootstrap_peers: Vec<String>,
    pub(crate) interval: Duration,
    pub(crate) request_timeout: Duration,
}

/// Run rounds until cancelled.
pub(crate) async fn run(settings: ReconcilerSettings, state: AppState, cancel: CancellationToken) {
    let client = match reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!(err = %e, "reconciler could not build an http client");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(settings.interval) => {}
        }
        round(&client, &settings.bootstrap_peers, &state, &cancel).await;
    }
}

async fn round(
    client: &reqwest::Client,
    bootstrap_peers: &[String],
    state: &AppState,
    cancel: &CancellationToken,
) {
    for peer in bootstrap_peers {
        if cancel.is_cancelled() {
            return;
        }
        exchange(client, peer, state).await;
    }

    let targets = {
        let Ok(mesh) = state.mesh.lock() else { return };
        mesh.stale_targets(state.clock.now())
    };
    for (ip, port) in targets {
        if cancel.is_cancelled() {
            return;
        }
        exchange(client, &format!("http://[{ip}]:{port}/"), state).await;
    }
}

/// One push-pull with a peer: POST our view, merge the returned one.
async fn exchange(client: &reqwest::Client, url: &str, state: &AppState) {
    let doc = {
        let Ok(mut mesh) = state.mesh.lock() else { return };
        mesh.to_document(state.clock.now())
    };

    debug!(peer = %url, "gossip exchange");
    let response = match client.post(url).json(&doc).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(peer = %url, err = %e, "gossip request failed");
            return;
        }
    };
    let response = match response.error_for_status() {
        Ok(response) => response,
        Err(e) => {
            debug!(peer = %url, err = %e, "peer rejected gossip");
            return;
        }
    };
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            debug!(peer = %url, err = %e, "gossip response unreadable");
            return;
        }
    };
    let incoming = match Document::from_slice(&body).and_then(|doc| Mesh::from_document(&doc)) {
        Ok(mesh) => mesh,
        Err(e) => {
            debug!(peer = %url, err = %e, "gossip response malformed");
            return;
        }
    };

    let Ok(mut mesh) = state.mesh.lock() else { return };
    mesh.merge(&incoming, &state.policy);
    let doc = mesh.to_document(state.clock.now());
    if let Err(e) = state.persist(&doc, &mesh) {
        warn!(err = %e, "failed to persist reconciled state");
    }
}
