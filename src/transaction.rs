//! Outstanding request tracking.
//!
//! [`TransactionManager`] assigns transaction identifiers to outbound
//! requests, correlates responses by identifier (never by arrival order), and
//! reports requests whose deadline passed without an answer. Timers are plain
//! deadlines polled by the owning worker via [`TransactionManager::next_deadline`]
//! and [`TransactionManager::expire_at`], so tests can drive them with
//! `tokio::time::pause`.

use std::collections::HashMap;

use log::debug;
use thiserror::Error;
use tokio::time::{Duration, Instant};

use crate::{
    chunk::{Chunk, IdGenerator, TransactionId},
    codec::contains_end_line,
};

/// Errors returned by [`TransactionManager`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// No outstanding transaction carries this identifier.
    #[error("no outstanding transaction {0}")]
    NotFound(TransactionId),
}

/// Lifecycle of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Completed,
    TimedOut,
}

/// A request awaiting its response.
#[derive(Debug)]
pub struct Transaction<C> {
    id: TransactionId,
    state: TransactionState,
    created_at: Instant,
    deadline: Option<Instant>,
    /// Caller data correlated with the request.
    pub context: C,
}

impl<C> Transaction<C> {
    #[must_use]
    pub fn id(&self) -> &TransactionId { &self.id }

    #[must_use]
    pub fn state(&self) -> TransactionState { self.state }

    #[must_use]
    pub fn created_at(&self) -> Instant { self.created_at }

    /// When the transaction times out, or `None` while it waits to be
    /// written.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    /// Consume the transaction, returning its context.
    #[must_use]
    pub fn into_context(self) -> C { self.context }
}

/// Registry of outstanding transactions on one connection.
///
/// # Examples
///
/// ```
/// use msrp::{
///     chunk::{Chunk, Method, TransactionId},
///     transaction::{TransactionManager, TransactionState},
/// };
/// use tokio::time::{Duration, Instant};
///
/// let mut transactions = TransactionManager::new(Duration::from_secs(30));
/// let mut chunk = Chunk::request(TransactionId::new("pending1").expect("valid id"), Method::Send);
/// let id = transactions.open_at(&mut chunk, "context", Instant::now());
/// assert_eq!(chunk.transaction_id, id);
///
/// let matched = transactions.match_response(&id).expect("outstanding");
/// assert_eq!(matched.state(), TransactionState::Completed);
/// assert!(transactions.match_response(&id).is_err());
/// ```
#[derive(Debug)]
pub struct TransactionManager<C> {
    ids: IdGenerator,
    timeout: Duration,
    pending: HashMap<TransactionId, Transaction<C>>,
}

impl<C> TransactionManager<C> {
    /// Create a manager whose transactions expire after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            ids: IdGenerator::default(),
            timeout,
            pending: HashMap::new(),
        }
    }

    /// Use `ids` for generating transaction identifiers.
    #[must_use]
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration { self.timeout }

    /// Register `chunk` as a new transaction started at `now`.
    ///
    /// A fresh identifier is generated and written into the chunk. It is
    /// unused among outstanding transactions and does not occur as an
    /// end-line inside the chunk's body.
    pub fn open_at(&mut self, chunk: &mut Chunk, context: C, now: Instant) -> TransactionId {
        self.insert(chunk, context, now, Some(now + self.timeout))
    }

    /// Register `chunk` without starting its timer.
    ///
    /// Used for requests that wait in a write queue. Call
    /// [`arm_at`](Self::arm_at) once the request is on the wire.
    pub fn open_queued_at(&mut self, chunk: &mut Chunk, context: C, now: Instant) -> TransactionId {
        self.insert(chunk, context, now, None)
    }

    fn insert(
        &mut self,
        chunk: &mut Chunk,
        context: C,
        now: Instant,
        deadline: Option<Instant>,
    ) -> TransactionId {
        let id = self.fresh_id(chunk);
        chunk.transaction_id = id.clone();
        self.pending.insert(
            id.clone(),
            Transaction {
                id: id.clone(),
                state: TransactionState::Pending,
                created_at: now,
                deadline,
                context,
            },
        );
        id
    }

    /// [`open_at`](Self::open_at) using the current time.
    pub fn open(&mut self, chunk: &mut Chunk, context: C) -> TransactionId {
        self.open_at(chunk, context, Instant::now())
    }

    fn fresh_id(&self, chunk: &Chunk) -> TransactionId {
        loop {
            let id = self.ids.transaction_id();
            let collides = self.pending.contains_key(&id)
                || chunk
                    .body
                    .as_ref()
                    .is_some_and(|body| contains_end_line(body, &id));
            if !collides {
                return id;
            }
            debug!("regenerating transaction id: candidate={id}");
        }
    }

    /// Complete the transaction `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NotFound`] when `id` is unknown, already
    /// matched, or already timed out.
    pub fn match_response(&mut self, id: &TransactionId) -> Result<Transaction<C>, TransactionError> {
        let mut transaction = self
            .pending
            .remove(id)
            .ok_or_else(|| TransactionError::NotFound(id.clone()))?;
        transaction.state = TransactionState::Completed;
        Ok(transaction)
    }

    /// Start (or restart) the timer of `id` from `now`.
    ///
    /// Returns `false` when `id` is not outstanding.
    pub fn arm_at(&mut self, id: &TransactionId, now: Instant) -> bool {
        let Some(transaction) = self.pending.get_mut(id) else {
            return false;
        };
        transaction.deadline = Some(now + self.timeout);
        true
    }

    /// Remove and return every transaction whose deadline is at or before
    /// `now`, marked [`TransactionState::TimedOut`].
    pub fn expire_at(&mut self, now: Instant) -> Vec<Transaction<C>> {
        let expired: Vec<TransactionId> = self
            .pending
            .values()
            .filter(|t| t.deadline.is_some_and(|deadline| deadline <= now))
            .map(|t| t.id.clone())
            .collect();
        let mut timed_out: Vec<Transaction<C>> = expired
            .iter()
            .filter_map(|id| self.pending.remove(id))
            .map(|mut t| {
                t.state = TransactionState::TimedOut;
                t
            })
            .collect();
        timed_out.sort_by_key(|t| t.deadline);
        timed_out
    }

    /// Earliest deadline among outstanding transactions.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().filter_map(|t| t.deadline).min()
    }

    /// Remove every outstanding transaction whose context matches `predicate`.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&C) -> bool) -> Vec<Transaction<C>> {
        let ids: Vec<TransactionId> = self
            .pending
            .values()
            .filter(|t| predicate(&t.context))
            .map(|t| t.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.pending.remove(id)).collect()
    }

    /// Remove every outstanding transaction, for example when the connection
    /// closes.
    pub fn drain(&mut self) -> Vec<Transaction<C>> {
        self.pending.drain().map(|(_, t)| t).collect()
    }

    /// Context of an outstanding transaction.
    #[must_use]
    pub fn context(&self, id: &TransactionId) -> Option<&C> {
        self.pending.get(id).map(|t| &t.context)
    }

    #[must_use]
    pub fn contains(&self, id: &TransactionId) -> bool { self.pending.contains_key(id) }

    #[must_use]
    pub fn len(&self) -> usize { self.pending.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }
}
