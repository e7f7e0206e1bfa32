use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Everything the engine ever broadcasts on the `EventHub`. Purely
/// observational: nothing in the dispatch path blocks on, or branches on,
/// whether an event was actually delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Operational(OperationalEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperationalEvent {
    /// A single-provider attempt exhausted its retry budget and is about to
    /// be surfaced to the caller (or considered for fallback).
    RetryExhausted(RetryExhaustedEvent),
    /// The dispatcher is about to try the next `{provider, model}` in a
    /// request's fallback list after the primary (or a prior fallback)
    /// failed.
    FallbackEngaged(FallbackEngagedEvent),
    /// A provider has no usable worker pool right now — either its account
    /// config is missing, or it requires keys and none are configured.
    ProviderUnavailable(ProviderUnavailableEvent),
    /// `update_provider` atomically installed a new provider instance.
    ProviderUpdated(ProviderUpdatedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryExhaustedEvent {
    pub at: SystemTime,
    pub provider: String,
    pub model: String,
    pub attempts: u32,
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackEngagedEvent {
    pub at: SystemTime,
    pub from_provider: String,
    pub from_model: String,
    pub to_provider: String,
    pub to_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUnavailableEvent {
    pub at: SystemTime,
    pub provider: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUpdatedEvent {
    pub at: SystemTime,
    pub provider: String,
}
