//! Bounded fixed-delay reconnection for the push channel.
//!
//! When the connection drops, the channel calls [`reconnect_loop`], which
//! waits [`ReconnectConfig::delay`] before each of at most
//! [`ReconnectConfig::max_attempts`] connection attempts.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{Connector, Link};

/// Default number of reconnection attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause before each reconnection attempt.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Tunable parameters for the reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// How a [`reconnect_loop`] run ended.
pub enum ReconnectOutcome {
    Connected(Link),
    /// Every attempt failed.
    Exhausted { attempts: u32 },
    Cancelled,
}

/// Try to re-establish the push connection.
pub async fn reconnect_loop(
    connector: &dyn Connector,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> ReconnectOutcome {
    for attempt in 1..=config.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            _ = tokio::time::sleep(config.delay) => {}
        }

        tracing::info!(
            endpoint = connector.endpoint(),
            attempt,
            max_attempts = config.max_attempts,
            "Reconnecting to push channel",
        );

        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            result = connector.connect() => match result {
                Ok(link) => {
                    tracing::info!(endpoint = connector.endpoint(), attempt, "Reconnected to push channel");
                    return ReconnectOutcome::Connected(link);
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = connector.endpoint(),
                        error = %e,
                        "Reconnect attempt {attempt} failed",
                    );
                }
            }
        }
    }

    ReconnectOutcome::Exhausted {
        attempts: config.max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use crate::client::ChannelError;

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyConnector {
        failures: u32,
        attempts: AtomicU32,
    }

    impl FlakyConnector {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn connect(&self) -> Result<Link, ChannelError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(ChannelError::Connection("refused".into()));
            }
            let (link, peer) = Link::in_memory();
            // Keep the peer alive for the duration of the test.
            std::mem::forget(peer);
            Ok(link)
        }

        fn endpoint(&self) -> &str {
            "memory://flaky"
        }
    }

    #[test]
    fn default_policy_is_five_attempts_one_second_apart() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.delay, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_later_attempt() {
        let connector = FlakyConnector::new(2);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let outcome = reconnect_loop(&connector, &ReconnectConfig::default(), &cancel).await;

        assert!(matches!(outcome, ReconnectOutcome::Connected(_)));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts_at_fixed_spacing() {
        let connector = FlakyConnector::new(u32::MAX);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let outcome = reconnect_loop(&connector, &ReconnectConfig::default(), &cancel).await;

        assert!(matches!(outcome, ReconnectOutcome::Exhausted { attempts: 5 }));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 5);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5100));
    }

    #[tokio::test]
    async fn cancellation_token_stops_reconnect() {
        let cancel = CancellationToken::new();
        // Cancel immediately; reconnect_loop must return without connecting.
        cancel.cancel();

        let connector = FlakyConnector::new(0);
        let outcome = reconnect_loop(&connector, &ReconnectConfig::default(), &cancel).await;

        assert!(matches!(outcome, ReconnectOutcome::Cancelled));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }
}
