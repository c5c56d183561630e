//! # extdd: External-memory Binary Decision Diagrams in Rust
//!
//! **`extdd`** builds, combines and canonicalizes **Binary Decision Diagrams (BDDs)**
//! that are larger than main memory.
//! Diagrams live in temporary files and every algorithm is a sequence of sweeps over sorted streams.
//!
//! ## How it works
//!
//! A diagram is stored as a file of nodes, ordered by level, together with the number of nodes on every level.
//! There is no unique table and no computed cache: instead, each operation is a **time-forward** sweep.
//!
//! - A top-down sweep (apply, quantify, restrict) produces the *arcs* of the result,
//!   deferring work for deeper levels to a **levelized priority queue**.
//! - A bottom-up sweep (reduce) turns those arcs into the canonical node file, level by level.
//!
//! Only the current level has to be sorted in memory; everything else resides on disk.
//!
//! ## Key Features
//!
//! - **Engine-Centric API**: All operations go through the [`Engine`][crate::bdd::Engine], which carries the [`Config`][crate::config::Config] (memory budget, queue buckets, temp directory).
//! - **Cheap Handles**: A [`Bdd`][crate::bdd::Bdd] is a shared file handle plus a negation flag, so cloning and negation never touch the disk.
//! - **Canonical**: Reduced diagrams of the same function are stored identically, which makes equality checks a linear scan.
//! - **Bounded Memory**: Queues and sorters spill to disk when their share of the budget is full.
//!
//! ## Basic Usage
//!
//! ```rust
//! use extdd::bdd::Engine;
//! use extdd::node::Assignment;
//!
//! // 1. Create an engine with the default configuration
//! let engine = Engine::default();
//!
//! // 2. Create variables (0-indexed)
//! let x0 = engine.ithvar(0)?;
//! let x1 = engine.ithvar(1)?;
//!
//! // 3. Build a formula: f = x0 AND (NOT x1)
//! let f = engine.apply_and(&x0, &!&x1)?;
//!
//! // 4. Check properties
//! assert!(!f.is_false()); // It is satisfiable
//! assert_eq!(engine.sat_count(&f, 2)?, 1);
//!
//! // 5. Evaluate (x0=true, x1=false) -> should be true
//! let input = [Assignment::new(0, true), Assignment::new(1, false)];
//! assert!(engine.evaluate(&f, &input)?);
//! # Ok::<(), extdd::error::Error>(())
//! ```
//!
//! ## Core Components
//!
//! - **[`bdd`]**: The [`Engine`][crate::bdd::Engine] and the [`Bdd`][crate::bdd::Bdd] handle.
//! - **[`queue`]**: The levelized priority queue every sweep is built on.
//! - **[`reduce`]**, **[`apply`]**, **[`quantify`]**, **[`restrict`]**: The core algorithms.
//! - **[`count`]**, **[`eval`]**: Model counting and satisfying assignments.

pub mod apply;
pub mod bdd;
pub mod build;
pub mod config;
pub mod count;
pub mod error;
pub mod eval;
pub mod file;
pub mod heap;
pub mod node;
pub mod op;
pub mod ptr;
pub mod quantify;
pub mod queue;
pub mod reduce;
pub mod restrict;
pub mod sorter;
pub mod store;
