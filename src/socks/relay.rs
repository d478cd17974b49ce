//! Bidirectional relay
//!
//! Once the success reply is out, bytes are pumped client->upstream and
//! upstream->client by two independent pipelines. Each pipeline owns one
//! fixed buffer and only reads again after the previous chunk has been
//! written, so a slow reader on one side stalls its own direction and
//! nothing else.

use crate::error::RelayError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

/// One of the two relay pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client socket to upstream socket
    ClientToUpstream,
    /// Upstream socket to client socket
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "client->upstream"),
            Direction::UpstreamToClient => write!(f, "upstream->client"),
        }
    }
}

/// Relay tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Per-pipeline buffer size
    pub buffer_size: usize,
    /// End the relay when neither direction moved data for this long
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            buffer_size: super::DEFAULT_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

/// Bytes forwarded in each direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes written to the upstream
    pub client_to_upstream: u64,
    /// Bytes written to the client
    pub upstream_to_client: u64,
}

/// Last time either pipeline made progress
#[derive(Debug)]
struct Activity {
    origin: Instant,
    last_millis: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Activity {
            origin: Instant::now(),
            last_millis: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_millis.store(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_millis.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }

    /// Completes once nothing happened for `timeout`; never when `None`
    async fn expired(&self, timeout: Option<Duration>) {
        let Some(timeout) = timeout else {
            return std::future::pending().await;
        };
        loop {
            let idle = self.idle_for();
            if idle >= timeout {
                return;
            }
            tokio::time::sleep(timeout - idle).await;
        }
    }
}

/// Pump one direction until end-of-stream, then half-close the destination
async fn pump<R, W>(
    direction: Direction,
    src: &mut R,
    dst: &mut W,
    buf: &mut [u8],
    activity: &Activity,
) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut total = 0u64;

    loop {
        let n = src
            .read(buf)
            .await
            .map_err(|source| RelayError::Read { direction, source })?;
        if n == 0 {
            break;
        }
        activity.touch();

        dst.write_all(&buf[..n])
            .await
            .map_err(|source| RelayError::Write { direction, source })?;
        dst.flush()
            .await
            .map_err(|source| RelayError::Write { direction, source })?;
        activity.touch();

        total += n as u64;
    }

    // The peer may already be gone; the other pipeline will notice
    if let Err(e) = dst.shutdown().await {
        debug!("{} half-close failed: {}", direction, e);
    }

    Ok(total)
}

/// Relay data bidirectionally between the client and the upstream
///
/// Returns once both pipelines reached end-of-stream. An I/O error on
/// either pipeline, or the idle timeout, ends the relay immediately; the
/// caller owns both streams and closes them afterwards.
pub async fn relay<C, U>(
    client: &mut C,
    upstream: &mut U,
    config: RelayConfig,
) -> Result<RelayStats, RelayError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let buffer_size = config.buffer_size.max(1);
    let mut c2u_buf = vec![0u8; buffer_size];
    let mut u2c_buf = vec![0u8; buffer_size];
    let activity = Activity::new();

    let c2u = pump(
        Direction::ClientToUpstream,
        &mut client_read,
        &mut upstream_write,
        &mut c2u_buf,
        &activity,
    );
    let u2c = pump(
        Direction::UpstreamToClient,
        &mut upstream_read,
        &mut client_write,
        &mut u2c_buf,
        &activity,
    );
    let idle = activity.expired(config.idle_timeout);
    tokio::pin!(c2u, u2c, idle);

    let mut stats = RelayStats::default();
    let mut c2u_done = false;
    let mut u2c_done = false;

    while !(c2u_done && u2c_done) {
        tokio::select! {
            result = &mut c2u, if !c2u_done => {
                stats.client_to_upstream = result?;
                c2u_done = true;
                debug!("client->upstream finished: {} bytes", stats.client_to_upstream);
            }
            result = &mut u2c, if !u2c_done => {
                stats.upstream_to_client = result?;
                u2c_done = true;
                debug!("upstream->client finished: {} bytes", stats.upstream_to_client);
            }
            _ = &mut idle => {
                return Err(RelayError::IdleTimeout(config.idle_timeout.unwrap_or_default()));
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::io::{duplex, DuplexStream};

    fn config(buffer_size: usize) -> RelayConfig {
        RelayConfig {
            buffer_size,
            idle_timeout: None,
        }
    }

    /// Returns (client peer, upstream peer, relay task)
    fn spawn_relay(
        capacity: usize,
        config: RelayConfig,
    ) -> (
        DuplexStream,
        DuplexStream,
        tokio::task::JoinHandle<Result<RelayStats, RelayError>>,
    ) {
        let (client_peer, mut client_side) = duplex(capacity);
        let (upstream_peer, mut upstream_side) = duplex(capacity);
        let handle = tokio::spawn(async move {
            relay(&mut client_side, &mut upstream_side, config).await
        });
        (client_peer, upstream_peer, handle)
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::ClientToUpstream.to_string(), "client->upstream");
        assert_eq!(Direction::UpstreamToClient.to_string(), "upstream->client");
    }

    #[tokio::test]
    async fn test_relay_bidirectional() {
        let (mut client, mut upstream, handle) = spawn_relay(1024, config(64));

        client.write_all(b"message A->B").await.unwrap();
        let mut buf = [0u8; 12];
        upstream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"message A->B");

        upstream.write_all(b"message B->A").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"message B->A");

        client.shutdown().await.unwrap();
        upstream.shutdown().await.unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stats.client_to_upstream, 12);
        assert_eq!(stats.upstream_to_client, 12);
    }

    #[tokio::test]
    async fn test_relay_preserves_order_across_partial_reads() {
        // Buffer smaller than the payload forces many read/write rounds
        let (mut client, mut upstream, handle) = spawn_relay(4096, config(7));

        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&payload).await.unwrap();
            client.shutdown().await.unwrap();
            client
        });

        let mut received = Vec::new();
        upstream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected);

        upstream.shutdown().await.unwrap();
        let _client = writer.await.unwrap();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.client_to_upstream, 50_000);
    }

    #[tokio::test]
    async fn test_relay_half_close_keeps_other_direction() {
        let (mut client, mut upstream, handle) = spawn_relay(1024, config(64));

        client.write_all(b"request").await.unwrap();
        client.shutdown().await.unwrap();

        // Upstream sees the data followed by end-of-stream
        let mut received = Vec::new();
        upstream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"request");

        // ...and can still answer
        upstream.write_all(b"response").await.unwrap();
        let mut buf = [0u8; 8];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"response");
        assert!(!handle.is_finished());

        upstream.shutdown().await.unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stats.client_to_upstream, 7);
        assert_eq!(stats.upstream_to_client, 8);
    }

    #[tokio::test]
    async fn test_relay_slow_destination_stalls_only_its_direction() {
        let capacity = 64;
        let buffer = 16;
        let (mut client, mut upstream, handle) = spawn_relay(capacity, config(buffer));

        // The client never reads, so upstream->client backs up
        let mut accepted = 0usize;
        loop {
            let chunk = [0x5Au8; 8];
            match tokio::time::timeout(Duration::from_millis(50), upstream.write_all(&chunk)).await
            {
                Ok(Ok(())) => accepted += chunk.len(),
                Ok(Err(e)) => panic!("unexpected write error: {}", e),
                Err(_) => break,
            }
        }
        // Two duplex pipes plus at most one relay buffer in flight
        assert!(
            accepted <= capacity + buffer + capacity,
            "accepted {} bytes",
            accepted
        );

        // The other direction is unaffected
        client.write_all(b"still flowing").await.unwrap();
        let mut buf = [0u8; 13];
        tokio::time::timeout(Duration::from_secs(1), upstream.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"still flowing");

        handle.abort();
    }

    #[tokio::test]
    async fn test_relay_read_error_ends_both_directions() {
        let mut client = tokio_test::io::Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (_upstream_peer, mut upstream_side) = duplex(1024);

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            relay(&mut client, &mut upstream_side, config(64)),
        )
        .await
        .unwrap();

        assert!(matches!(
            result,
            Err(RelayError::Read {
                direction: Direction::ClientToUpstream,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_relay_idle_timeout() {
        let idle = Duration::from_millis(100);
        let (_client, _upstream, handle) = spawn_relay(
            1024,
            RelayConfig {
                buffer_size: 64,
                idle_timeout: Some(idle),
            },
        );

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(RelayError::IdleTimeout(d)) if d == idle));
    }

    #[tokio::test]
    async fn test_relay_activity_defers_idle_timeout() {
        let idle = Duration::from_millis(200);
        let (mut client, mut upstream, handle) = spawn_relay(
            1024,
            RelayConfig {
                buffer_size: 64,
                idle_timeout: Some(idle),
            },
        );

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(80)).await;
            client.write_all(b"tick").await.unwrap();
            let mut buf = [0u8; 4];
            upstream.read_exact(&mut buf).await.unwrap();
        }
        assert!(!handle.is_finished());

        client.shutdown().await.unwrap();
        upstream.shutdown().await.unwrap();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.client_to_upstream, 20);
    }

    #[tokio::test]
    async fn test_relay_empty_transfer() {
        let (mut client, mut upstream, handle) = spawn_relay(1024, config(64));

        client.shutdown().await.unwrap();
        upstream.shutdown().await.unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stats, RelayStats::default());
    }
}
