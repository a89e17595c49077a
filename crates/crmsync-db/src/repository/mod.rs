//! # Repository Module
//!
//! Database repository implementations for the sync engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  PullEngine / PushEngine                                                │
//! │       │                                                                 │
//! │       │  db.mappings().put_batch(..)                                    │
//! │       │  db.entities(ObjectType::Contact).find_to_update(..)            │
//! │       ▼                                                                 │
//! │  Repositories (one per table, cheap to construct)                       │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`MappingRepository`](mapping::MappingRepository) - Local ⇄ remote id mappings
//! - [`EntityRepository`](entity::EntityRepository) - Contacts and companies
//! - [`CompanyLinkRepository`](link::CompanyLinkRepository) - Contact ⇄ company links
//! - [`UserRepository`](user::UserRepository) - Record owners
//! - [`ActivityRepository`](activity::ActivityRepository) - Contact activity history
//! - [`LeaseRepository`](lease::LeaseRepository) - One run per integration

pub mod activity;
pub mod entity;
pub mod lease;
pub mod link;
pub mod mapping;
pub mod user;
