//! # mercato-db: Storage and Services for the Order Economics Engine
//!
//! SQLite persistence through sqlx, plus the engine services that run the
//! pure rules of mercato-core inside transactions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mercato Data Flow                                │
//! │                                                                         │
//! │  HTTP handler / admin job (create_order, settle, issue_coupon)         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    mercato-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │    Engine     │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (service/)   │    │ (repository/) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ OrderService  │───►│ order         │    │ 001_initial_ │  │   │
//! │  │   │ LedgerService │    │ commission    │    │ schema.sql   │  │   │
//! │  │   │ Checkout ...  │    │ coupon ...    │    │              │  │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │           │                    │                               │   │
//! │  │           ▼                    ▼                               │   │
//! │  │   ┌───────────────┐    ┌───────────────┐                      │   │
//! │  │   │    Ports      │    │   Database    │                      │   │
//! │  │   │ geo, weather, │    │   (pool.rs)   │                      │   │
//! │  │   │ clock, random │    │  SqlitePool   │                      │   │
//! │  │   └───────────────┘    └───────────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Process configuration from `MERCATO_*` variables
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - SQL per table group, free functions over a connection
//! - [`service`] - The engine: transactional operations and ports
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mercato_db::{Database, Engine, EngineConfig, Ports};
//!
//! let config = EngineConfig::from_env()?;
//! let db = Database::new(config.db_config()).await?;
//! let engine = Engine::new(db, Ports::system(geo, weather), &config)?;
//!
//! let preview = engine.checkout().preview(user_id, Default::default()).await?;
//! let order = engine.orders().create_order(request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use service::{Engine, EngineError, EngineResult, ErrorKind, Ports};
