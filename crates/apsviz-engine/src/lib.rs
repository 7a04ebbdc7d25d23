// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The Run State Machine Engine: stage catalog, job template binder, per-run
//! transition logic, and the reconciliation loop that drives it all.

pub mod binder;
pub mod catalog;
pub mod error;
pub mod reconcile;
pub mod state_machine;

pub use catalog::{stage_def, ParamContext, StageDef};
pub use error::EngineError;
pub use reconcile::ReconciliationLoop;
