use super::*;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Why a keepalive supervisor stopped.
#[derive(Debug)]
pub enum KeepaliveExit {
    /// The connection was closed gracefully.
    Closed,
    /// The link was already gone when the supervisor looked.
    Disconnected,
    /// The connection object itself was dropped.
    Dropped,
    /// A keepalive failed and the supervisor terminated the link.
    Failed(ConnectError),
}

/// Spawns a task that sends a keepalive over `conn` every `interval`.
///
/// A failed keepalive terminates the connection. The task ends as soon as the
/// connection is closed, terminated elsewhere or dropped. It only holds a weak
/// reference, so it never keeps the connection alive on its own.
pub fn spawn_keepalive<C, S>(
    conn: &Arc<ManagedConnection<C, S>>,
    done: DoneSignal,
    interval: Duration,
) -> JoinHandle<KeepaliveExit>
where
    C: TransportClient,
    S: RawSocket,
{
    let conn = Arc::downgrade(conn);
    tokio::spawn(supervise(conn, done, interval))
}

async fn supervise<C, S>(
    conn: Weak<ManagedConnection<C, S>>,
    done: DoneSignal,
    interval: Duration,
) -> KeepaliveExit
where
    C: TransportClient,
    S: RawSocket,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let done = done.wait();
    tokio::pin!(done);

    loop {
        tokio::select! {
            graceful = &mut done => {
                return if graceful {
                    KeepaliveExit::Closed
                } else {
                    KeepaliveExit::Dropped
                };
            }
            _ = ticker.tick() => {
                let Some(conn) = conn.upgrade() else {
                    return KeepaliveExit::Dropped;
                };
                if !conn.is_connected() {
                    debug!("{} Link gone, stopping keepalive", conn.host());
                    return KeepaliveExit::Disconnected;
                }
                match conn.keepalive().await {
                    Ok(()) => trace!("{} Keepalive ok", conn.host()),
                    // Closed between the liveness check and the keepalive.
                    Err(ConnectError::ConnectClosedError(_)) => {
                        return KeepaliveExit::Disconnected;
                    }
                    Err(err) => {
                        warn!("{} Keepalive failed, terminating: {}", conn.host(), err);
                        conn.terminate().await;
                        return KeepaliveExit::Failed(err);
                    }
                }
            }
        }
    }
}
