//! Program guide metadata reconciliation
//!
//! Leaves first: [`normalize`], [`similarity`] and [`pattern`] are pure
//! scoring functions, [`matcher`] combines them into per-channel decisions,
//! [`xmltv`] extracts channel identities from feeds and [`service`] drives a
//! full refresh against the repositories.

pub mod matcher;
pub mod normalize;
pub mod pattern;
pub mod service;
pub mod similarity;
pub mod xmltv;

pub use matcher::{
    reconcile, Candidate, EpgMatcher, MatchDecision, MatchOptions, ReconcileOutcome,
    ReconcileStats, Suggestion,
};
pub use normalize::normalize;
pub use service::{EpgService, RefreshReport};
