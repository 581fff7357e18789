//! Deterministic scripted implementation of the shared `inference_provider`
//! contract.
//!
//! This crate contains no transport logic and is intended for contract-level
//! integration testing of stream consumers. Each call to `stream` pops the
//! next scripted outcome; requests are captured for assertions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use inference_provider::{
    DeltaStream, InferenceProvider, ProviderError, ProviderProfile, StreamRequest,
};

/// Stable provider identifier reported by [`ScriptedProvider::profile`].
pub const SCRIPTED_PROVIDER_ID: &str = "scripted";

/// One scripted response to a `stream` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Yield these deltas in order, then end the stream cleanly.
    Stream(Vec<String>),
    /// Reject the request before any delta is produced.
    Rejected(String),
    /// Yield these deltas, then break the stream with an error.
    Interrupted { deltas: Vec<String>, error: String },
}

impl ScriptedOutcome {
    /// Convenience constructor for a clean delta sequence.
    #[must_use]
    pub fn deltas(deltas: &[&str]) -> Self {
        Self::Stream(deltas.iter().map(ToString::to_string).collect())
    }
}

/// Scripted provider used by orchestrator tests and local experiments.
#[derive(Debug)]
pub struct ScriptedProvider {
    model_id: String,
    outcomes: Mutex<VecDeque<ScriptedOutcome>>,
    requests: Mutex<Vec<StreamRequest>>,
    cancel_count: AtomicUsize,
}

impl ScriptedProvider {
    /// Creates a provider that answers successive `stream` calls with the
    /// given outcomes, in order.
    #[must_use]
    pub fn scripted(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            model_id: "scripted-model".to_string(),
            outcomes: Mutex::new(VecDeque::from(outcomes)),
            requests: Mutex::new(Vec::new()),
            cancel_count: AtomicUsize::new(0),
        }
    }

    /// Creates a provider from plain delta sequences, one per attempt.
    #[must_use]
    pub fn streams(sequences: Vec<Vec<&str>>) -> Self {
        Self::scripted(
            sequences
                .into_iter()
                .map(|sequence| ScriptedOutcome::deltas(&sequence))
                .collect(),
        )
    }

    /// Overrides the model identifier reported in the profile.
    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Returns every request observed so far, in call order.
    #[must_use]
    pub fn observed_requests(&self) -> Vec<StreamRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    /// Returns how many times `cancel` has been awaited.
    #[must_use]
    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }

    /// Returns how many scripted outcomes remain unconsumed.
    #[must_use]
    pub fn remaining_outcomes(&self) -> usize {
        lock_unpoisoned(&self.outcomes).len()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: SCRIPTED_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    async fn stream(&self, request: StreamRequest) -> Result<DeltaStream, ProviderError> {
        lock_unpoisoned(&self.requests).push(request);

        let outcome = lock_unpoisoned(&self.outcomes).pop_front();
        match outcome {
            Some(ScriptedOutcome::Stream(deltas)) => {
                Ok(stream::iter(deltas.into_iter().map(Ok)).boxed())
            }
            Some(ScriptedOutcome::Rejected(message)) => Err(ProviderError::Request(message)),
            Some(ScriptedOutcome::Interrupted { deltas, error }) => {
                let items = deltas
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(ProviderError::Stream(error))));
                Ok(stream::iter(items).boxed())
            }
            None => panic!("scripted outcomes should cover every stream request"),
        }
    }

    async fn cancel(&self) {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
