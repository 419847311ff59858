//! Composes the rate limiter, per-user gate, global priority queue, and
//! circuit breakers behind a single `admit`/`Ticket` contract (§4.2).

use crate::circuit_breaker::CircuitBreaker;
use crate::config::AdmissionConfig;
use crate::gate::ActiveGate;
use crate::memory::ConversationMemory;
use crate::queue::{PriorityQueue, RequestPriority};
use crate::rate_limiter::RateLimiter;
use dashmap::DashMap;
use searchagent_core::{AdmissionDenialReason, Error, Result, UserId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct AdmissionController {
    rate_limiter: RateLimiter,
    gate: Arc<ActiveGate>,
    queue: Arc<PriorityQueue>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    memory: Arc<ConversationMemory>,
    config: AdmissionConfig,
    flusher_shutdown: CancellationToken,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Arc<Self> {
        let memory = Arc::new(ConversationMemory::new());
        let flusher_shutdown = CancellationToken::new();
        crate::flusher::spawn(
            memory.clone(),
            config.stale_context_idle,
            config.stale_context_sweep_interval,
            flusher_shutdown.clone(),
        );

        Arc::new(Self {
            rate_limiter: RateLimiter::new(config.rate_limit_capacity, config.rate_limit_refill_per_sec),
            gate: Arc::new(ActiveGate::new(config.max_active_per_user, config.max_active_global)),
            queue: Arc::new(PriorityQueue::new(config.queue_capacity)),
            breakers: DashMap::new(),
            memory,
            config,
            flusher_shutdown,
        })
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    dependency,
                    self.config.breaker_failure_threshold,
                    self.config.breaker_window,
                    self.config.breaker_cooldown,
                ))
            })
            .clone()
    }

    /// Admit a request for `user`. Per-user gate is checked before the
    /// global queue (cheap, uncontended check first; see DESIGN.md).
    pub async fn admit(self: &Arc<Self>, user: UserId, priority: RequestPriority) -> Result<Ticket> {
        if !self.rate_limiter.try_acquire(&user) {
            return Err(Error::AdmissionDenied {
                reason: AdmissionDenialReason::RateLimited,
                retry_after_ms: Some(1000),
            });
        }

        if !self.gate.try_enter_user(&user) {
            return Err(Error::AdmissionDenied {
                reason: AdmissionDenialReason::UserActiveLimit,
                retry_after_ms: None,
            });
        }

        if !self.gate.try_enter_global() {
            match self.queue.try_enqueue(priority) {
                None => {
                    self.gate.leave_user(&user);
                    return Err(Error::AdmissionDenied {
                        reason: AdmissionDenialReason::QueueFull,
                        retry_after_ms: None,
                    });
                }
                Some(rx) => {
                    if rx.await.is_err() {
                        warn!("admission queue waiter dropped before dispatch");
                        self.gate.leave_user(&user);
                        return Err(Error::Aborted);
                    }
                    self.gate.enter_global();
                }
            }
        }

        Ok(Ticket {
            user,
            gate: self.gate.clone(),
            queue: self.queue.clone(),
            released: false,
        })
    }

    pub fn shutdown(&self) {
        self.flusher_shutdown.cancel();
    }
}

/// RAII admission grant (§4.2). Dropping it (success or failure path)
/// releases both the per-user and global slots and wakes the next queued
/// waiter, if any.
pub struct Ticket {
    user: UserId,
    gate: Arc<ActiveGate>,
    queue: Arc<PriorityQueue>,
    released: bool,
}

impl Ticket {
    /// Explicit release, for callers that want the recount to happen at a
    /// precise point rather than whenever the ticket happens to drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.gate.leave_global();
        self.gate.leave_user(&self.user);
        self.queue.dispatch_next();
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.release_inner();
    }
}
