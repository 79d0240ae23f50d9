//! Runtime services, shared state, and the connection supervisor.

use std::time::Duration;

use chrono::Local;
use tracing::{error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Err, Res, RunMode, Void},
    },
    interaction::{Pipeline, classifier::Classifier, responder::Responder},
    service::{
        chat::ChatClient,
        db::DbClient,
        directory::{DirectoryCache, DirectoryClient},
        slack_api,
    },
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the counter store, directory cache, chat client, and
/// configuration. It is designed to be trivially cloneable, allowing it to
/// be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The counter store.
    pub db: DbClient,
    /// The directory cache.
    pub directory: DirectoryCache,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    ///
    /// Opens (and if needed creates) the counter store; `reset_db` drops and
    /// recreates it.
    #[instrument(skip_all)]
    pub async fn new(config: Config, reset_db: bool) -> Res<Self> {
        // Initialize the counter store.
        let db = DbClient::surreal(&config.db_path, reset_db).await?;

        // Both Slack services share one HTTPS client.
        let slack = slack_api::full_client()?;

        // Initialize the directory cache.
        let directory = DirectoryCache::new(DirectoryClient::slack(&config, slack.clone()));

        // Initialize the chat client.
        let chat = ChatClient::slack(&config, slack).await?;

        Ok(Self { config, db, directory, chat })
    }

    /// Builds the event pipeline for this runtime.
    pub fn pipeline(&self) -> Pipeline {
        let classifier = Classifier::new(self.directory.clone(), self.config.mode, self.chat.bot_user_id());
        let responder = Responder::new(self.db.clone(), self.directory.clone(), self.chat.clone(), Local::now(), self.config.revision.clone());

        Pipeline::new(classifier, responder, self.db.clone(), self.directory.clone())
    }

    /// Runs the connection supervisor until a fatal error.
    pub async fn start(&self) -> Void {
        Supervisor::new(self).run().await
    }
}

// Backoff.

/// Linear reconnect backoff.
///
/// The delay before the next attempt is `retries * step`, so the first
/// retry after a successful connection is immediate.
#[derive(Debug, Clone)]
pub struct Backoff {
    retries: u32,
    step: Duration,
}

impl Backoff {
    pub fn new(step: Duration) -> Self {
        Self { retries: 0, step }
    }

    /// Consecutive failures since the last successful connection.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The delay to wait now; counts one more failure.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.step * self.retries;
        self.retries = self.retries.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.retries = 0;
    }
}

// Supervisor.

/// Lifecycle of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the streaming connection and feeds its events through the pipeline.
///
/// Transport failures lead back to [`ConnectionState::Disconnected`] and a
/// reconnect after the backoff delay, forever. Only fatal pipeline errors
/// end [`Supervisor::run`].
pub struct Supervisor {
    chat: ChatClient,
    directory: DirectoryCache,
    pipeline: Pipeline,
    backoff: Backoff,
    state: ConnectionState,
    poll_interval: Duration,
    debug: bool,
    mode: RunMode,
}

impl Supervisor {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            chat: runtime.chat.clone(),
            directory: runtime.directory.clone(),
            pipeline: runtime.pipeline(),
            backoff: Backoff::new(runtime.config.retry_step()),
            state: ConnectionState::Disconnected,
            poll_interval: runtime.config.poll_interval(),
            debug: runtime.config.debug,
            mode: runtime.config.mode,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Connects, processes events, and reconnects, until a fatal error.
    pub async fn run(&mut self) -> Void {
        loop {
            self.step().await?;
        }
    }

    /// One connection attempt: connect, process events until the transport
    /// fails, then wait out the backoff delay.
    #[instrument(name = "Supervisor::step", skip_all)]
    pub async fn step(&mut self) -> Void {
        self.state = ConnectionState::Connecting;

        match self.chat.connect().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.backoff.reset();

                info!("Bot connected and running in [ {} ] mode!", self.mode);

                if let Err(e) = self.directory.refresh().await {
                    warn!("Directory refresh failed: {}", e);
                }

                let reason = self.pump().await?;
                error!("Connection lost: {}", reason);
            }
            Err(e) => error!("Connection failed: {}", e),
        }

        self.state = ConnectionState::Disconnected;

        let attempt = self.backoff.retries();
        let delay = self.backoff.next_delay();
        info!("Connection retry #{} sleeping for {} seconds...", attempt, delay.as_secs());
        tokio::time::sleep(delay).await;

        Ok(())
    }

    /// Processes events until the transport fails.
    ///
    /// `Ok` carries the transport error that ended the session; `Err` is fatal.
    async fn pump(&mut self) -> Res<Err> {
        loop {
            match self.chat.next_event().await {
                Ok(Some(event)) => {
                    if self.debug {
                        info!("{}", event);
                    }

                    self.pipeline.handle(&event).await?;
                }
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => return Ok(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly_from_zero() {
        let mut backoff = Backoff::new(Duration::from_secs(2));

        let delays: Vec<_> = (0..4).map(|_| backoff.next_delay().as_secs()).collect();

        assert_eq!(delays, [0, 2, 4, 6]);
        assert_eq!(backoff.retries(), 4);
    }

    #[test]
    fn backoff_reset_starts_over() {
        let mut backoff = Backoff::new(Duration::from_secs(2));
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();

        assert_eq!(backoff.retries(), 0);
        assert_eq!(backoff.next_delay(), Duration::ZERO);
    }
}
