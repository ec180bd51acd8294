//! dMAS Types - Canonical domain types for the dMAS control center
//!
//! This crate contains the foundational types shared by the control core and
//! its presentation surfaces, with zero dependencies on other dmas crates:
//!
//! - Agent identity types (AgentType, ConfigScope, AgentInstance)
//! - Per-scope configuration entries
//! - Population counts that distinguish "unknown" from "zero"
//! - Command and simulation request types
//! - The typed error taxonomy
//!
//! # Partitioning
//!
//! Every piece of state the control center holds is partitioned by
//! [`AgentType`] (or [`ConfigScope`] for configuration). Values of these
//! types are owned, never shared between partitions.

pub mod agent;
pub mod command;
pub mod config;
pub mod error;
pub mod population;

pub use agent::*;
pub use command::*;
pub use config::*;
pub use error::*;
pub use population::*;
