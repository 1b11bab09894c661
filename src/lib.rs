//! Transaction Risk Scoring Service
//!
//! Assembles transaction features, standardizes them, runs a binary
//! classifier and maps its probability to a bounded risk score in [60, 95].
//! Requests arrive over NATS request/reply.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_assembler;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use consumer::{RequestConsumer, RequestKind};
pub use error::ScoringError;
pub use feature_assembler::FeatureAssembler;
pub use models::scorer::{RiskAssessment, RiskScorer, ScoringPolicy};
pub use producer::ReplyPublisher;
pub use service::ScoringService;
pub use types::{features::FeatureVector, response::ServiceReply};
