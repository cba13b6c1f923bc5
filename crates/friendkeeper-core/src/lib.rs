//! # FriendKeeper Core Library
//!
//! This library provides the core business logic for FriendKeeper, an
//! anonymous friendship tracker with a metered AI generation feature. The
//! CLI binary is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Identity**: anonymous per-device identifier resolution with a
//!   persisted fallback when fingerprinting is unavailable
//! - **Health**: pure classification of relationship health from contact
//!   cadence and recency
//! - **Ledger**: per-device free-trial and purchased-token counters gating
//!   generation, with atomic consumption and idempotent purchase credits
//! - **Storage**: SQLite-based relationship/interaction storage and
//!   TOML-based configuration
//! - **Payment**: checkout pass-through and webhook-driven settlement
//!
//! ## Key Components
//!
//! - [`IdentityResolver`]: device identity resolution
//! - [`classify`]: health classification
//! - [`CreditLedger`]: generation credit accounting
//! - [`Database`]: relationship persistence
//! - [`StarterGenerator`]: metered talk-starter generation

pub mod contacts;
pub mod dashboard;
pub mod error;
pub mod health;
pub mod identity;
pub mod ledger;
pub mod payment;
pub mod starters;
pub mod storage;

pub use contacts::{
    Friend, FriendDetail, FriendSummary, Interaction, NewFriend, NewInteraction, RelationType,
};
pub use dashboard::{build_dashboard, friend_detail, list_with_health, Dashboard};
pub use error::{CoreError, ErrorDetail, Result, ValidationError};
pub use health::{classify, Cadence, Classification, HealthPolicy, HealthStatus};
pub use identity::{DeviceIdentity, IdentityResolver};
pub use ledger::{Balance, CreditLedger, CreditOutcome};
pub use payment::{await_settlement, reconcile, Checkout, PaymentClient, WebhookOutcome, PRODUCTS};
pub use starters::{StarterGenerator, TalkStarters};
pub use storage::{Config, Database};
