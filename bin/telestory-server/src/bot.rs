//! Long-polling update loop and command router.
//!
//! Each update is handled on its own task so one slow lookup never blocks
//! other users. The loop stops when the shutdown token fires and then waits
//! (bounded) for in-flight handlers.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use telestory_core::i18n::text;
use telestory_core::{ChatId, DownloadEngine, Language, Messenger, SqliteStore, Text, UserProfile};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::telegram::{CallbackQuery, Message, TelegramClient, Update};

pub type Engine = DownloadEngine<SqliteStore, TelegramClient>;

const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_secs(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// What an incoming update asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    SetLanguage(Language),
    Lookup(String),
    Ignore,
}

/// Classify a text message.
pub fn classify_text(text: &str) -> Command {
    let text = text.trim();
    if text.is_empty() {
        return Command::Ignore;
    }
    if let Some(command) = text.strip_prefix('/') {
        // `/start`, `/start@telestory_bot`, `/start payload`
        let name = command.split([' ', '@']).next().unwrap_or_default();
        return if name.eq_ignore_ascii_case("start") {
            Command::Start
        } else {
            Command::Ignore
        };
    }
    Command::Lookup(text.to_owned())
}

/// Classify callback data; only `lang|<code>` is understood.
pub fn classify_callback(data: &str) -> Command {
    data.strip_prefix("lang|")
        .and_then(|code| Language::from_str(code).ok())
        .map_or(Command::Ignore, Command::SetLanguage)
}

pub async fn run(engine: Arc<Engine>, shutdown: CancellationToken) {
    let telegram = Arc::clone(engine.messenger());
    let mut offset = 0;
    let mut handlers = JoinSet::new();
    info!("update loop started");

    loop {
        let polled = tokio::select! {
            _ = shutdown.cancelled() => break,
            polled = telegram.get_updates(offset, POLL_TIMEOUT) => polled,
        };

        match polled {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let engine = Arc::clone(&engine);
                    handlers.spawn(dispatch(engine, update));
                }
            }
            Err(e) => {
                warn!(error = %e, "getUpdates failed; retrying");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }

        while let Some(joined) = handlers.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "update handler panicked");
            }
        }
    }

    info!(in_flight = handlers.len(), "update loop stopping; draining handlers");
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("handlers still running after drain timeout; aborting");
        handlers.abort_all();
    }
    info!("update loop stopped");
}

async fn dispatch(engine: Arc<Engine>, update: Update) {
    if let Some(query) = update.callback_query {
        on_callback(&engine, query).await;
    } else if let Some(message) = update.message {
        on_message(&engine, message).await;
    }
}

async fn on_message(engine: &Engine, message: Message) {
    let (Some(from), Some(body)) = (message.from.as_ref(), message.text.as_deref()) else {
        return;
    };
    let profile = UserProfile::from(from);

    match classify_text(body) {
        Command::Start => on_start(engine, &profile).await,
        Command::Lookup(input) => {
            if let Err(e) = engine.handle_request(&profile, &input).await {
                warn!(user_id = profile.id, error = %e, "request failed");
            }
        }
        Command::SetLanguage(_) | Command::Ignore => {
            debug!(user_id = profile.id, "ignoring message");
        }
    }
}

async fn on_start(engine: &Engine, profile: &UserProfile) {
    let telegram = engine.messenger();
    let chat = ChatId(profile.id);

    let user = match engine.users().register(profile, Utc::now()).await {
        Ok(user) => user,
        Err(e) => {
            error!(user_id = profile.id, error = %e, "failed to register user");
            if let Err(e) = telegram.send_text(chat, text(None, Text::SystemError)).await {
                warn!(error = %e, "failed to send error message");
            }
            return;
        }
    };

    let sent = match user.language {
        None => telegram.send_language_menu(chat, text(None, Text::Welcome)).await,
        Some(lang) => telegram.send_markdown(chat, text(Some(lang), Text::Instruction)).await,
    };
    if let Err(e) = sent {
        warn!(user_id = user.id, error = %e, "failed to answer /start");
    }
}

async fn on_callback(engine: &Engine, query: CallbackQuery) {
    let telegram = engine.messenger();
    let profile = UserProfile::from(&query.from);
    let chat = ChatId(profile.id);

    if let Err(e) = telegram.answer_callback_query(&query.id).await {
        warn!(error = %e, "failed to answer callback query");
    }

    let Command::SetLanguage(lang) = classify_callback(query.data.as_deref().unwrap_or_default()) else {
        debug!(user_id = profile.id, data = ?query.data, "ignoring callback");
        return;
    };

    // The callback may be the user's first interaction since a restart.
    let updated = match engine.users().register(&profile, Utc::now()).await {
        Ok(_) => engine.users().update_language(profile.id, lang).await,
        Err(e) => Err(e),
    };
    if let Err(e) = updated {
        error!(user_id = profile.id, error = %e, "failed to store language");
        if let Err(e) = telegram.send_text(chat, text(None, Text::SystemError)).await {
            warn!(error = %e, "failed to send error message");
        }
        return;
    }

    if let Some(menu) = &query.message {
        if let Err(e) = telegram.delete(menu.reference()).await {
            debug!(error = %e, "failed to delete language menu");
        }
    }
    if let Err(e) = telegram.send_text(chat, text(Some(lang), Text::Registered)).await {
        warn!(error = %e, "failed to confirm language");
    }
    if let Err(e) = telegram.send_markdown(chat, text(Some(lang), Text::Instruction)).await {
        warn!(error = %e, "failed to send instructions");
    }
}
