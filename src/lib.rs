//! Salon Ledger — financial reconciliation and payout core.
//!
//! The salon console's UI layers (booking calendar, check-in queue, report
//! screens) are thin CRUD views; the money handling lives here. This crate
//! owns:
//!
//! - normalization of heterogeneous money and date inputs at every ingestion
//!   boundary (`money`, `dates`);
//! - the two staff-earning stores and their reconciliation into one canonical
//!   figure per staff-day (`earnings`, `daily_summary`, `reconcile`);
//! - commission payouts with check/cash split and monthly/yearly rollups
//!   (`payout`);
//! - the append-only gift-card ledger with sequential code issuance
//!   (`gift_cards`, `codes`);
//! - the phone-keyed client reward schemes (`clients`).
//!
//! UI collaborators go through [`api::LedgerService`].

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod clients;
pub mod codes;
pub mod daily_summary;
pub mod dates;
pub mod db;
pub mod earnings;
pub mod error;
pub mod gift_cards;
pub mod money;
pub mod payout;
pub mod reconcile;
pub mod staff;

pub use api::{LedgerService, LedgerView};
pub use error::{LedgerError, LedgerResult};

/// Initialize logging: console plus a daily-rolling file in `log_dir`.
///
/// Call once at startup and hold the returned guard for the process
/// lifetime — dropping it flushes the file writer.
pub fn init_logging(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,salon_ledger=debug"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "ledger");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
