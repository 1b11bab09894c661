//! Type definitions for the risk scoring service

pub mod features;
pub mod response;

pub use features::{FeatureVector, TransactionType, FEATURE_COUNT, FEATURE_NAMES};
pub use response::{ReplyStatus, ScoreResponse, ServiceReply};
