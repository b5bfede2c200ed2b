//! prjacl - Role-Based Permission Management for Project Storage
//!
//! A tool for granting and propagating user roles over large project trees
//! on shared storage. Roles (manager, contributor, writer, viewer) are
//! stored as POSIX ACL entries and applied concurrently across millions of
//! paths with bounded memory.
//!
//! # Features
//!
//! - **Fast Enumeration**: Reads directories with raw `getdents64` calls
//!   and reused buffers, keeping the walk well ahead of the appliers.
//!
//! - **Two-Stage Application**: Requested roles flow over the enumerated
//!   tree first; traverse permission is then backfilled on the ancestor
//!   directories users must pass through to reach the tree.
//!
//! - **Bounded Pipeline**: Stages are connected with bounded channels, so
//!   a slow storage backend applies backpressure all the way up to the
//!   enumerator.
//!
//! - **Safe Interruption**: Termination signals stop the pipeline at entry
//!   boundaries; a rerun converges partially applied state.
//!
//! # Architecture
//!
//! ```text
//!  enumerator ──▶ role appliers ──▶ propagator ──▶ traverse appliers
//!  (getdents64)   (N threads)       │ (ancestors)   (N threads)
//!                                   ▼                    │
//!                               reporter ◀───────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Grant roles on a project, with traverse backfill on parents
//! prjacl set 3010000.01 -m honlee -c edwger,alice -u bob
//!
//! # Operate on a subdirectory only
//! prjacl set 3010000.01 -p raw/session1 -c alice
//!
//! # Where does alice hold roles?
//! prjacl show alice
//! ```

pub mod acl;
pub mod cancel;
pub mod cli;
pub mod context;
pub mod engine;
pub mod error;
pub mod lock;
pub mod pipeline;
pub mod progress;
pub mod show;
pub mod stats;
pub mod traverse;
pub mod userdb;
pub mod walker;

pub use acl::{Role, RoleMap, RolePathMap};
pub use engine::{run_set, RunOutcome, SetRequest};
pub use error::{Error, Result, RolerError, RolerResult};
pub use show::run_show;
