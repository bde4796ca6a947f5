#![warn(clippy::all, missing_docs)]

//! Session and gear-weighting core for the EQDB client.
//!
//! This crate hosts the shared domain models, configuration handling,
//! authentication/session lifecycle, and the weight-set combination
//! engine used by the EQDB frontends. Rendering, navigation, and search
//! views live in the frontends; they consume the session snapshots and
//! weight-set data published here.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod weights;

pub use api::ApiClient;
pub use config::AppConfig;
pub use error::ApiError;
pub use models::{NewWeightSet, User, Weight, WeightSet, WeightSetPatch};
pub use session::{SessionManager, SessionSnapshot, SessionState, TokenPair, TokenStore};
pub use weights::{combine, display_stat, WeightSetService};
