//! The download orchestration and admission-control engine behind telestory.
//!
//! A request flows through [`DownloadEngine::handle_request`]: the
//! [`RateLimiter`] and [`InFlightGate`] decide whether it may run, the
//! catalog client lists the stories, the media fetcher downloads them in
//! parallel, the [`RelayPipeline`] archives and forwards each one, and the
//! [`Ledger`] records the request for quota accounting.
//!
//! Persistence sits behind [`UserStore`] / [`RequestStore`] and messaging
//! behind [`Messenger`], so the engine never touches SQL or HTTP directly.

pub mod admission;
pub mod caption;
pub mod config;
pub mod engine;
pub mod error;
pub mod i18n;
pub mod ledger;
pub mod messenger;
pub mod model;
pub mod relay;
pub mod store;
pub mod users;

#[cfg(test)]
mod testing;

pub use admission::{Admission, AdmissionPolicy, Denial, InFlightGate, InFlightGuard, RateLimiter};
pub use config::{EngineConfig, Environment};
pub use engine::{DownloadEngine, RequestOutcome, RequestState};
pub use error::CoreError;
pub use i18n::{Language, Text};
pub use ledger::Ledger;
pub use messenger::{ChatId, MediaKind, MessageRef, Messenger, MessengerError, RemoteMedia};
pub use model::{RequestRecord, RequestStatus, Role, User, UserProfile};
pub use relay::{RelayPipeline, RelayReport};
pub use store::{RequestStore, SqliteStore, UserStore};
pub use users::UserService;
