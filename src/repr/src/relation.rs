// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

use crate::ScalarType;

/// The type of a [`Datum`](crate::Datum), consisting of a scalar type and a
/// nullability flag.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
pub struct ColumnType {
    /// The underlying scalar type.
    pub scalar_type: ScalarType,
    /// Whether this datum can be null.
    pub nullable: bool,
}

impl ColumnType {
    /// Consumes this column type and returns a new one with the nullability
    /// set as specified.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Whether this type equals `other` up to nullability.
    pub fn base_eq(&self, other: &ColumnType) -> bool {
        self.scalar_type == other.scalar_type
    }

    /// The least restrictive column type covering both `self` and `other`.
    pub fn union(&self, other: &ColumnType) -> Option<ColumnType> {
        let scalar_type = self.scalar_type.least_restrictive(&other.scalar_type)?;
        Some(ColumnType {
            scalar_type,
            nullable: self.nullable || other.nullable,
        })
    }
}

/// The type of a relation: an ordered list of column types.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct RelationType {
    /// The type for each column, in order.
    pub column_types: Vec<ColumnType>,
}

impl RelationType {
    /// Constructs a `RelationType` representing the relation with no columns.
    pub fn empty() -> Self {
        RelationType::new(vec![])
    }

    /// Constructs a new `RelationType` from specified column types.
    pub fn new(column_types: Vec<ColumnType>) -> Self {
        RelationType { column_types }
    }

    /// The number of columns in the relation.
    pub fn arity(&self) -> usize {
        self.column_types.len()
    }
}
