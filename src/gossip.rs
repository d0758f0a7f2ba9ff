//! Flood propagation of position records along the herd's adjacency edges.
//!
//! A propagation event pushes one `AT` line to every adjacent peer not in
//! the exclude-set: fresh TCP connection, single write, close. The whole
//! event runs on a detached task so ingestion never waits on peer I/O;
//! within one event the sends are sequential, but events from different
//! ingestions proceed in parallel.
//!
//! Delivery is best-effort. A peer that cannot be reached is logged and
//! skipped — the herd relies on some other path (and the store's
//! last-writer-wins gate) to make the record converge.

use std::collections::HashSet;
use std::io;

use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// Upper bound on one connect-and-write to a peer, so a wedged neighbour
/// cannot pin a propagation task forever.
const SEND_TIMEOUT_SECS: u64 = 10;

/// An adjacent daemon, resolved from the configuration at startup.
#[derive(Debug, Clone)]
pub struct Peer {
    pub name: String,
    /// `host:port` of the peer's listener.
    pub addr: String,
}

/// Dispatch a propagation event on a detached task and return immediately.
///
/// `line` is the canonical `AT` line without trailing newline; `exclude`
/// names the peers that must not receive it (the gossip sender, to break
/// trivial loops).
pub fn spawn_propagation(peers: Vec<Peer>, line: String, exclude: HashSet<String>) {
    tokio::spawn(async move {
        propagate(&peers, &line, &exclude).await;
    });
}

/// Push `line` to every peer not in `exclude`, one at a time.
async fn propagate(peers: &[Peer], line: &str, exclude: &HashSet<String>) {
    let payload = format!("{line}\n");
    for peer in peers {
        if exclude.contains(&peer.name) {
            continue;
        }
        match timeout(
            Duration::from_secs(SEND_TIMEOUT_SECS),
            send_one(&peer.addr, &payload),
        )
        .await
        {
            Ok(Ok(())) => debug!("propagated to {} ({})", peer.name, peer.addr),
            Ok(Err(e)) => warn!("propagation to {} ({}) failed: {}", peer.name, peer.addr, e),
            Err(_) => warn!(
                "propagation to {} ({}) timed out after {}s",
                peer.name, peer.addr, SEND_TIMEOUT_SECS
            ),
        }
    }
}

async fn send_one(addr: &str, payload: &str) -> io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(payload.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn listen() -> (Peer, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = Peer {
            name: format!("peer-{}", addr.port()),
            addr: addr.to_string(),
        };
        (peer, listener)
    }

    async fn read_all(listener: &TcpListener) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn delivers_the_line_to_every_peer() {
        let (peer_a, listener_a) = listen().await;
        let (peer_b, listener_b) = listen().await;

        spawn_propagation(
            vec![peer_a, peer_b],
            "AT Alpha +0.1 kiwi +34.0-118.4 1.5".to_string(),
            HashSet::new(),
        );

        assert_eq!(read_all(&listener_a).await, "AT Alpha +0.1 kiwi +34.0-118.4 1.5\n");
        assert_eq!(read_all(&listener_b).await, "AT Alpha +0.1 kiwi +34.0-118.4 1.5\n");
    }

    #[tokio::test]
    async fn excluded_peer_receives_nothing() {
        let (excluded, excluded_listener) = listen().await;
        let (included, included_listener) = listen().await;

        let exclude: HashSet<String> = [excluded.name.clone()].into_iter().collect();
        spawn_propagation(
            vec![excluded, included],
            "AT Alpha +0.1 kiwi +34.0-118.4 1.5".to_string(),
            exclude,
        );

        // The included peer is contacted after the excluded one was skipped,
        // so once its write has landed nothing more is coming.
        read_all(&included_listener).await;
        let nothing = timeout(Duration::from_millis(200), excluded_listener.accept()).await;
        assert!(nothing.is_err(), "excluded peer should never be dialled");
    }

    #[tokio::test]
    async fn unreachable_peer_does_not_stop_the_flood() {
        // Reserve a port and close it again so the connect is refused.
        let dead_addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().to_string()
        };
        let dead = Peer {
            name: "dead".to_string(),
            addr: dead_addr,
        };
        let (live, live_listener) = listen().await;

        spawn_propagation(
            vec![dead, live],
            "AT Alpha +0.1 kiwi +34.0-118.4 1.5".to_string(),
            HashSet::new(),
        );

        assert_eq!(read_all(&live_listener).await, "AT Alpha +0.1 kiwi +34.0-118.4 1.5\n");
    }
}
