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

//! The gossip endpoint: `GET /` returns this node's view, `POST /` merges a
//! peer's view and returns the result. One coarse mutex serialises every
//! mutation; the background reconciler shares it and is cancelled and
//! awaited at shutdown.

use crate::core::clock::{Clock, SystemClock};
use crate::core::codec::Document;
use crate::core::crypto::Keypair;
use crate::core::data::{Host, MergePolicy, Mesh};
use crate::core::store;
use crate::networking::reconciler;
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::{Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a serving node needs to come up.
pub struct ServerSettings {
    /// IPv6 address to bind and advertise.
    pub ip: Ipv6Addr,
    /// Port to bind; 0 picks a free one (the advertised record follows).
    pub port: u16,
    /// Mesh state file.
    pub state_file: PathBuf,
    /// Hostname export consumed by the resolver.
    pub dns_file: PathBuf,
    /// Ed25519 key file; created on first run.
    pub key_file: PathBuf,
    /// Peer URLs contacted unconditionally every round.
    pub bootstrap_peers: Vec<String>,
    /// Sleep between reconciliation rounds.
    pub reconcile_interval: Duration,
    /// Per-request timeout for outbound gossip.
    pub request_timeout: Duration,
    /// Signature enforcement toggles.
    pub policy: MergePolicy,
}

impl ServerSettings {
    /// Settings with protocol-default timings for the given endpoint and
    /// file locations.
    pub fn new(ip: Ipv6Addr, port: u16, state_file: PathBuf, dns_file: PathBuf, key_file: PathBuf) -> Self {
        Self {
            ip,
            port,
            state_file,
            dns_file,
            key_file,
            bootstrap_peers: Vec::new(),
            reconcile_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            policy: MergePolicy::default(),
        }
    }
}

/// Shared handler state: the mesh under its mutex plus what persisting a
/// merge needs.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) mesh: Arc<Mutex<Mesh>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: MergePolicy,
    pub(crate) state_file: PathBuf,
    pub(crate) dns_file: PathBuf,
}

impl AppState {
    /// Persist the given document and the DNS export. Called with the mesh
    /// lock held so file writers stay exclusive.
    pub(crate) fn persist(&self, doc: &Document, mesh: &Mesh) -> Result<(), store::StoreError> {
        store::save_document(doc, &self.state_file)?;
        store::export_dns(mesh, &self.dns_file)
    }
}

/// A bound, not-yet-running node.
pub struct Server {
    state: AppState,
    listener: TcpListener,
    local_addr: SocketAddr,
    bootstrap_peers: Vec<String>,
    reconcile_interval: Duration,
    request_timeout: Duration,
}

impl Server {
    /// Load key material and state, then bind. Both failures are fatal at
    /// startup.
    pub async fn bind(settings: ServerSettings) -> anyhow::Result<Self> {
        Self::bind_with_clock(settings, Arc::new(SystemClock)).await
    }

    /// [`Server::bind`] with an injected clock.
    pub async fn bind_with_clock(
        settings: ServerSettings,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let keypair = Arc::new(
            Keypair::load_or_create(&settings.key_file)
                .with_context(|| format!("key file {}", settings.key_file.display()))?,
        );

        let listener = TcpListener::bind(SocketAddr::from((settings.ip, settings.port)))
            .await
            .with_context(|| format!("bind [{}]:{}", settings.ip, settings.port))?;
        let local_addr = listener.local_addr().context("local addr")?;

        let self_host = Host::new(keypair.verify_key(), settings.ip, local_addr.port());
        let networks = store::load_networks(&settings.state_file);
        let mesh = Mesh::new(networks, Some(self_host), Some(keypair));

        info!(addr = %local_addr, state = %settings.state_file.display(), "node bound");

        Ok(Self {
            state: AppState {
                mesh: Arc::new(Mutex::new(mesh)),
                clock,
                policy: settings.policy,
                state_file: settings.state_file,
                dns_file: settings.dns_file,
            },
            listener,
            local_addr,
            bootstrap_peers: settings.bootstrap_peers,
            reconcile_interval: settings.reconcile_interval,
            request_timeout: settings.request_timeout,
        })
    }

    /// The bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the shared mesh (used by tests to seed and inspect state).
    pub fn mesh(&self) -> Arc<Mutex<Mesh>> {
        Arc::clone(&self.state.mesh)
    }

    /// Serve until `cancel` fires; the reconciler is spawned alongside and
    /// awaited on the way out.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let recon = tokio::spawn(reconciler::run(
            reconciler::ReconcilerSettings {
                bootstrap_peers: self.bootstrap_peers,
                interval: self.reconcile_interval,
                request_timeout: self.request_timeout,
            },
            self.state.clone(),
            cancel.clone(),
        ));

        let app = router(self.state);
        let served = axum::serve(self.listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .await;

        cancel.cancel();
        let _ = recon.await;
        served.context("http server")
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_mesh).post(post_mesh))
        .with_state(state)
}

async fn get_mesh(State(state): State<AppState>) -> Response {
    let Ok(mut mesh) = state.mesh.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let doc = mesh.to_document(state.clock.now());
    drop(mesh);
    json_response(doc)
}

async fn post_mesh(State(state): State<AppState>, body: Bytes) -> Response {
    let incoming = match Document::from_slice(&body).and_then(|doc| Mesh::from_document(&doc)) {
        Ok(mesh) => mesh,
        Err(e) => {
            debug!(err = %e, "rejecting malformed gossip payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let Ok(mut mesh) = state.mesh.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    mesh.merge(&incoming, &state.policy);
    let doc = mesh.to_document(state.clock.now());
    if let Err(e) = state.persist(&doc, &mesh) {
        // The in-memory merge stands; persistence retries next round.
        warn!(err = %e, "failed to persist merged state");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    drop(mesh);
    json_response(doc)
}

fn json_response(doc: Document) -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        doc.to_bytes(),
    )
        .into_response()
}
