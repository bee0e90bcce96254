// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Constraint engine
//!
//! UNIQUE, EXISTS and NODE KEY rules over node labels. The registry owns the
//! definitions; the validator checks a view of the graph against them.

pub mod registry;
pub mod types;
pub mod validator;

pub use registry::ConstraintRegistry;
pub use types::{Constraint, ConstraintError, ConstraintKind, ConstraintViolation};
pub use validator::{check_node, validate, LabelScan, ValidationError};
