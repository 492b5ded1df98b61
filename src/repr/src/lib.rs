// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fundamental data representation.
//!
//! This crate contains the types for representing data that all layers of the
//! stack agree on. The core value type is the [`Datum`] enum, a single owned
//! scalar value. [`ColumnType`] pairs a [`ScalarType`] with a nullability
//! flag, and [`RelationType`] describes the columns of a relation.

#![warn(missing_debug_implementations)]

mod relation;
mod scalar;

pub mod adt;

pub use relation::{ColumnType, RelationType};
pub use scalar::{Datum, ScalarType};
