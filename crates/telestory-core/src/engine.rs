//! Per-request orchestration: admission, catalog, downloads, relay, ledger.
//!
//! ```text
//! ADMITTED → CATALOG_FETCHED → EMPTY
//!                            → DOWNLOADING → RELAYING → COMPLETE | PARTIAL
//! DENIED  (admission)
//! FAILED  (registration, quota lookup, catalog fetch)
//! ```
//!
//! EMPTY (when configured), COMPLETE and PARTIAL are written to the ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use strum::Display;
use telestory_fetch::{CatalogClient, Deadline, MediaFetcher};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::admission::{Admission, Denial, InFlightGate, RateLimiter};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::i18n::{Language, Text, render, text};
use crate::ledger::Ledger;
use crate::messenger::{ChatId, MessageRef, Messenger};
use crate::model::{User, UserProfile};
use crate::relay::{RelayPipeline, RelayReport, call_bounded};
use crate::store::{RequestStore, UserStore};
use crate::users::UserService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Admitted,
    CatalogFetched,
    Empty,
    Downloading,
    Relaying,
    Complete,
    Partial,
    Denied,
    Failed,
}

/// How a request ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Denied(Denial),
    Empty,
    Complete(RelayReport),
    Partial(RelayReport),
}

impl RequestOutcome {
    pub fn state(&self) -> RequestState {
        match self {
            RequestOutcome::Denied(_) => RequestState::Denied,
            RequestOutcome::Empty => RequestState::Empty,
            RequestOutcome::Complete(_) => RequestState::Complete,
            RequestOutcome::Partial(_) => RequestState::Partial,
        }
    }
}

struct StateLog {
    user_id: i64,
    state: Option<RequestState>,
}

impl StateLog {
    fn new(user_id: i64) -> Self {
        Self { user_id, state: None }
    }

    fn enter(&mut self, next: RequestState) {
        match self.state {
            Some(prev) => info!(user_id = self.user_id, from = %prev, to = %next, "request state"),
            None => info!(user_id = self.user_id, to = %next, "request state"),
        }
        self.state = Some(next);
    }
}

pub struct DownloadEngine<S, M> {
    config: EngineConfig,
    users: UserService<S>,
    limiter: RateLimiter<S>,
    ledger: Ledger<S>,
    gate: InFlightGate,
    catalog: CatalogClient,
    fetcher: MediaFetcher,
    relay: RelayPipeline<M>,
    messenger: Arc<M>,
    shutdown: CancellationToken,
}

impl<S, M> DownloadEngine<S, M>
where
    S: UserStore + RequestStore,
    M: Messenger,
{
    /// Build the engine, resolving the archive channel first.
    ///
    /// Fails if the channel cannot be reached, so a misconfigured process
    /// never accepts requests. Cancelling `shutdown` cancels every request
    /// in flight.
    pub async fn start(
        config: EngineConfig,
        store: Arc<S>,
        messenger: Arc<M>,
        catalog: CatalogClient,
        fetcher: MediaFetcher,
        shutdown: CancellationToken,
    ) -> Result<Self, CoreError> {
        let archive = call_bounded(
            &shutdown,
            config.call_timeout,
            messenger.resolve_channel(config.archive_channel_id),
        )
        .await?;
        info!(archive_channel = archive.0, "archive channel resolved");

        let ledger = Ledger::new(Arc::clone(&store));
        Ok(Self {
            users: UserService::new(store),
            limiter: RateLimiter::new(config.policy, ledger.clone()),
            ledger,
            gate: InFlightGate::new(),
            catalog,
            fetcher,
            relay: RelayPipeline::new(Arc::clone(&messenger), archive, config.call_timeout),
            messenger,
            shutdown,
            config,
        })
    }

    pub fn users(&self) -> &UserService<S> {
        &self.users
    }

    pub fn messenger(&self) -> &Arc<M> {
        &self.messenger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Serve one lookup for `input` on behalf of `profile`.
    ///
    /// The requester always gets a localized answer; an `Err` is returned
    /// only after the user has been told something went wrong.
    pub async fn handle_request(
        &self,
        profile: &UserProfile,
        input: &str,
    ) -> Result<RequestOutcome, CoreError> {
        let input = input.trim();
        let span = info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            user_id = profile.id,
            input,
        );
        self.run(profile, input).instrument(span).await
    }

    async fn run(&self, profile: &UserProfile, input: &str) -> Result<RequestOutcome, CoreError> {
        let chat = ChatId(profile.id);
        let now = Utc::now();
        let mut log = StateLog::new(profile.id);

        let user = match self.users.register(profile, now).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "failed to register user");
                log.enter(RequestState::Failed);
                self.say(chat, text(None, Text::SystemError)).await;
                return Err(e.into());
            }
        };
        let lang = user.language;

        let Some(_in_flight) = self.gate.try_acquire(user.id) else {
            return Ok(self.deny(&mut log, chat, lang, Denial::InFlight).await);
        };

        match self.limiter.check(&user, now).await {
            Ok(Admission::Allowed) => {}
            Ok(Admission::Denied(denial)) => {
                return Ok(self.deny(&mut log, chat, lang, denial).await);
            }
            Err(e) => {
                error!(error = %e, "quota lookup failed");
                log.enter(RequestState::Failed);
                self.say(chat, text(lang, Text::SystemError)).await;
                return Err(e.into());
            }
        }
        log.enter(RequestState::Admitted);

        let cancel = self.shutdown.child_token();
        let _deadline = Deadline::arm(cancel.clone(), self.config.request_deadline);

        let status = match call_bounded(
            &cancel,
            self.config.call_timeout,
            self.messenger.send_text(chat, text(lang, Text::Processing)),
        )
        .await
        {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "failed to send processing message");
                None
            }
        };

        if let Err(e) = self.users.record_activity(user.id, now).await {
            warn!(error = %e, "failed to record activity");
        }

        let catalog = match self.catalog.fetch(input, &cancel).await {
            Ok(catalog) => catalog,
            Err(e) => {
                let err = CoreError::from(e);
                warn!(error = %err, "catalog fetch failed");
                log.enter(RequestState::Failed);
                self.show(status, chat, text(lang, Text::FetchError)).await;
                return Err(err);
            }
        };
        log.enter(RequestState::CatalogFetched);

        if catalog.items.is_empty() {
            log.enter(RequestState::Empty);
            let body = render(lang, Text::NoItems, &[("input", &input)]);
            self.show(status, chat, &body).await;
            if self.config.count_empty_results {
                self.record(&user, input, Utc::now()).await;
            }
            return Ok(RequestOutcome::Empty);
        }

        let body = render(lang, Text::Downloading, &[("count", &catalog.items.len())]);
        self.show(status, chat, &body).await;
        log.enter(RequestState::Downloading);
        let outcomes = self
            .fetcher
            .fetch_all(&catalog.base_url, catalog.items, &cancel)
            .await;

        log.enter(RequestState::Relaying);
        let report = self.relay.relay(outcomes, &user, input, &cancel).await;

        if let Some(message) = status {
            let cleanup = CancellationToken::new();
            if let Err(e) =
                call_bounded(&cleanup, self.config.call_timeout, self.messenger.delete(message)).await
            {
                warn!(error = %e, "failed to delete processing message");
            }
        }

        self.record(&user, input, Utc::now()).await;

        let outcome = if report.is_complete() {
            RequestOutcome::Complete(report)
        } else {
            RequestOutcome::Partial(report)
        };
        log.enter(outcome.state());
        Ok(outcome)
    }

    async fn deny(
        &self,
        log: &mut StateLog,
        chat: ChatId,
        lang: Option<Language>,
        denial: Denial,
    ) -> RequestOutcome {
        info!(reason = %denial, "request denied");
        log.enter(RequestState::Denied);
        self.say(chat, &denial.message(lang)).await;
        RequestOutcome::Denied(denial)
    }

    async fn record(&self, user: &User, input: &str, at: DateTime<Utc>) {
        if let Err(e) = self.ledger.record(user.id, input, at).await {
            warn!(error = %e, "failed to record request");
        }
    }

    /// Best-effort text to the requester, outside any request token.
    async fn say(&self, chat: ChatId, body: &str) {
        let detached = CancellationToken::new();
        if let Err(e) =
            call_bounded(&detached, self.config.call_timeout, self.messenger.send_text(chat, body)).await
        {
            warn!(error = %e, "failed to send message");
        }
    }

    /// Replace the processing message, or send a new one if there is none.
    async fn show(&self, status: Option<MessageRef>, chat: ChatId, body: &str) {
        let Some(message) = status else {
            return self.say(chat, body).await;
        };
        let detached = CancellationToken::new();
        if let Err(e) = call_bounded(
            &detached,
            self.config.call_timeout,
            self.messenger.edit_text(message, body),
        )
        .await
        {
            warn!(error = %e, "failed to edit processing message");
        }
    }
}
