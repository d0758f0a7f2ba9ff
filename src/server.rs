//! Daemon core — listener, connection handling, and the three verb handlers.
//!
//! One daemon owns one TCP listener. Every accepted connection gets its own
//! spawned task that reads newline-terminated messages until EOF and answers
//! on the same socket; a single connection may interleave verbs freely, and
//! nothing is remembered between messages.
//!
//! The verb semantics:
//!
//! * `IAMAT` — always echo the canonical `AT` line; store and flood it only
//!   when the client's timestamp is strictly newer than what we hold.
//! * `AT` — fire-and-forget peer ingestion: same last-writer-wins gate, then
//!   flood onward excluding the daemon we heard it from. Never answered.
//! * `WHATSAT` — read-only store lookup plus one Places round-trip; the
//!   external call runs on the connection's own task and never holds up
//!   gossip.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::config::HerdConfig;
use crate::gossip::{self, Peer};
use crate::places::{self, PlacesClient};
use crate::protocol::{self, Command, LocationUpdate, NearbyQuery, PositionReport};
use crate::store::{self, ClientRecord, ClientStore};

/// One herd daemon: its identity, its outgoing edges, its client store, and
/// its Places client.
pub struct Server {
    name: String,
    bind_addr: String,
    peers: Vec<Peer>,
    store: ClientStore,
    places: PlacesClient,
}

impl Server {
    /// Resolve a daemon by name against the herd configuration.
    ///
    /// Fails when the name has no port entry or when one of its configured
    /// neighbors does not — a herd with dangling edges is a config bug worth
    /// catching before the first gossip event.
    pub fn from_config(name: &str, config: &HerdConfig) -> Result<Self> {
        let port = config
            .port_of(name)
            .with_context(|| format!("no port configured for server {name}"))?;

        let mut peers = Vec::new();
        for peer_name in config.neighbors_of(name) {
            let peer_port = config.port_of(peer_name).with_context(|| {
                format!("neighbor {peer_name} of {name} has no port entry")
            })?;
            peers.push(Peer {
                name: peer_name.clone(),
                addr: format!("{}:{}", config.host, peer_port),
            });
        }

        let places = PlacesClient::new(
            &config.places_url,
            &config.api_key,
            Duration::from_secs(config.http_timeout_secs),
        )?;

        Ok(Server {
            name: name.to_string(),
            bind_addr: format!("{}:{}", config.host, port),
            peers,
            store: store::new_store(),
            places,
        })
    }

    // ────────────────────────────────────────────────────────────────────
    // Listener
    // ────────────────────────────────────────────────────────────────────

    /// Bind the listener and accept connections until `cancel` fires.
    ///
    /// Only the bind itself is fatal. Accept failures are logged and the
    /// loop continues; errors on individual connections never reach here.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("binding {} on {}", self.name, self.bind_addr))?;

        info!("{} listening on {}", self.name, self.bind_addr);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            debug!("new connection from {peer_addr}");
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    warn!("connection from {peer_addr} ended: {e:#}");
                                }
                                debug!("closed connection from {peer_addr}");
                            });
                        }
                        Err(e) => warn!("accept error: {e}"),
                    }
                }
            }
        }

        info!("{} shut down", self.name);
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Connection handler
    // ────────────────────────────────────────────────────────────────────

    /// Read messages until EOF, dispatching each and writing any reply back
    /// on the same socket, in request order.
    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await.context("reading message")? {
            debug!("received: {line}");
            if let Some(reply) = self.dispatch(&line).await {
                writer
                    .write_all(reply.as_bytes())
                    .await
                    .context("writing reply")?;
                writer.flush().await.context("flushing reply")?;
            }
        }
        Ok(())
    }

    /// Tokenise and route one message. `None` means nothing goes back on
    /// the socket (blank lines and `AT` ingestion).
    async fn dispatch(&self, line: &str) -> Option<String> {
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        if tokens.is_empty() {
            return None;
        }

        match protocol::parse_command(&tokens) {
            Ok(Command::Report(report)) => Some(self.handle_report(report)),
            Ok(Command::Update(update)) => {
                self.handle_update(update);
                None
            }
            Ok(Command::Query(query)) => Some(self.handle_query(line, query).await),
            Err(reason) => {
                warn!("rejected message ({reason}): {line}");
                Some(protocol::error_reply(line))
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Verb handlers
    // ────────────────────────────────────────────────────────────────────

    /// `IAMAT` — always reply with the canonical line; store and propagate
    /// only a strictly newer report.
    fn handle_report(&self, report: PositionReport) -> String {
        let skew = protocol::format_skew(protocol::now_epoch_secs() - report.client_time);
        let line = protocol::format_record_line(
            &self.name,
            &skew,
            &report.client_id,
            &report.location,
            &report.time_token,
        );
        info!("position report from {}: {line}", report.client_id);

        let record = ClientRecord::from_report(&report, &self.name, &skew, &line);
        if store::apply_update(&self.store, record) {
            gossip::spawn_propagation(self.peers.clone(), line.clone(), HashSet::new());
        }

        format!("{line}\n")
    }

    /// `AT` — peer ingestion. No reply, ever. On acceptance, flood onward
    /// excluding the daemon named in the message: that is the only loop
    /// prevention, and the store's strict-inequality gate stops whatever
    /// echoes slip past it.
    fn handle_update(&self, update: LocationUpdate) {
        debug!(
            "relayed record for {} via {}: {}",
            update.client_id, update.origin_server, update.line
        );

        let record = ClientRecord::from(&update);
        if store::apply_update(&self.store, record) {
            let exclude: HashSet<String> = [update.origin_server].into_iter().collect();
            gossip::spawn_propagation(self.peers.clone(), update.line, exclude);
        }
    }

    /// `WHATSAT` — look up the client's stored record and attach the Places
    /// results. The reply is the stored canonical line, the JSON body with
    /// 4-space indentation, and a blank-line terminator.
    async fn handle_query(&self, line: &str, query: NearbyQuery) -> String {
        let Some(record) = store::lookup(&self.store, &query.client_id) else {
            warn!("query for unknown client {}", query.client_id);
            return protocol::error_reply(line);
        };
        let Some((latitude, longitude)) = protocol::parse_location(&record.location) else {
            warn!(
                "stored location for {} does not parse: {}",
                query.client_id, record.location
            );
            return protocol::error_reply(line);
        };

        let radius_m = query.radius_km * 1000.0;
        match self
            .places
            .search_nearby(latitude, longitude, radius_m, query.count)
            .await
        {
            Ok(mut body) => {
                places::truncate_results(&mut body, query.count);
                format!("{}\n{}\n\n", record.line, places::to_pretty_json(&body))
            }
            Err(e) => {
                warn!("places lookup for {} failed: {e:#}", query.client_id);
                protocol::error_reply(line)
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
