//! Heartbeat loop: send the time, await `ACK_TIME`, retry or give up.
//!
//! Each tick encodes one [`TimeMessage`] and re-sends that same payload on
//! every attempt; the timestamp is not refreshed mid-retry.

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::client::{AckWait, ClientError, ClientState, PulseClient, await_ack, discard_pending};
use crate::message::{AckStatus, TimeMessage};

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Timestamp carried by the tick's message.
    pub timestamp: DateTime<Utc>,
    /// Sends made for this tick.
    pub attempts: u32,
    /// Whether an `ACK_TIME` arrived.
    ///
    /// Only `false` on multicast, where missing acks are tolerated.
    pub acknowledged: bool,
}

impl PulseClient {
    /// Run one heartbeat tick.
    ///
    /// Makes up to `max_attempts` sends, each followed by a wait of up to
    /// `ack_timeout` for `ACK_TIME`. If none arrives, a TCP or UDP unicast
    /// session is closed and [`ClientError::RetryExhausted`] is returned; a
    /// multicast session logs a warning and stays open.
    pub async fn heartbeat(&mut self) -> Result<HeartbeatReport, ClientError> {
        self.require(ClientState::Authenticated)?;

        let protocol = self.config.protocol;
        let framing = protocol.framing();
        let max_attempts = self.config.max_attempts;
        let message = TimeMessage::now();
        let payload = framing.encode_as(message)?;

        let Some(transport) = self.transport.as_mut() else {
            return Err(ClientError::InvalidState(self.state));
        };

        // Acks that arrived after an earlier tick gave up belong to that tick.
        discard_pending(&mut **transport).await;

        for attempt in 1..=max_attempts {
            self.state = ClientState::Sending;
            if attempt == 1 {
                info!("[{} client] Sending time message", protocol);
            } else {
                warn!(
                    "[{} client] Retrying time message (attempt {}/{})",
                    protocol, attempt, max_attempts
                );
            }

            match transport.send(&payload).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    self.shutdown().await;
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("[{} client] send failed: {}", protocol, e);
                    continue;
                }
            }

            self.state = ClientState::AwaitingAck;
            let deadline = Instant::now() + self.config.ack_timeout;
            match await_ack(&mut **transport, framing, AckStatus::AckTime, deadline).await {
                AckWait::Received => {
                    debug!("[{} client] ACK_TIME on attempt {}", protocol, attempt);
                    self.state = ClientState::Authenticated;
                    return Ok(HeartbeatReport {
                        timestamp: message.timestamp,
                        attempts: attempt,
                        acknowledged: true,
                    });
                }
                AckWait::TimedOut => {
                    debug!("[{} client] no ACK_TIME within {:?}", protocol, self.config.ack_timeout);
                }
                AckWait::Failed(e) if e.is_fatal() => {
                    self.shutdown().await;
                    return Err(e.into());
                }
                AckWait::Failed(e) => {
                    warn!("[{} client] receive failed: {}", protocol, e);
                }
            }
        }

        if !protocol.acks_reliable() {
            warn!(
                "[{} client] No ACK_TIME after {} attempts; multicast acks are best-effort",
                protocol, max_attempts
            );
            self.state = ClientState::Authenticated;
            return Ok(HeartbeatReport {
                timestamp: message.timestamp,
                attempts: max_attempts,
                acknowledged: false,
            });
        }

        warn!(
            "[{} client] No ACK_TIME after {} attempts; closing session",
            protocol, max_attempts
        );
        self.shutdown().await;
        Err(ClientError::RetryExhausted {
            attempts: max_attempts,
        })
    }

    /// Send heartbeats every `heartbeat_interval` until the session fails.
    ///
    /// The first tick fires immediately.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.heartbeat().await?;
        }
    }

    /// Send `ticks` heartbeats, one per `heartbeat_interval`.
    ///
    /// Stops at the first failure.
    pub async fn run_ticks(&mut self, ticks: u32) -> Result<Vec<HeartbeatReport>, ClientError> {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut reports = Vec::with_capacity(ticks as usize);
        for _ in 0..ticks {
            interval.tick().await;
            reports.push(self.heartbeat().await?);
        }

        info!(
            "[{} client] Completed {} heartbeats",
            self.config.protocol, ticks
        );
        Ok(reports)
    }
}
