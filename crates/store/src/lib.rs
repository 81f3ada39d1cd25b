//! Persistence for the checkout entities.
//!
//! Each entity has its own repository trait; [`Store`] bundles them so the
//! checkout services can be generic over a single backend type. Two backends
//! are provided: [`InMemoryStore`] for tests and demos, and [`PostgresStore`]
//! for production.
//!
//! Every mutation of an existing entity goes through a closure-based
//! `update_*` method so the read-modify-write happens under the backend's
//! per-entity lock (a tokio `RwLock` in memory, `SELECT ... FOR UPDATE` in
//! PostgreSQL). Payment request status changes are a compare-and-set that
//! only succeeds while the request is still PENDING.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{
    CustomerRepository, MenuRepository, OrderRepository, PaymentRepository,
    PaymentRequestRepository, Store,
};
