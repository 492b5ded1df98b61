// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::ColumnType;

/// A single owned value.
///
/// Unlike SQL, `Datum` has a total order: `NULL` sorts before everything
/// else, and values of the numeric family compare by their numeric value
/// regardless of their width. The order between values of unrelated types is
/// arbitrary but stable; expressions are typed, so such comparisons only
/// arise in heterogeneous collections, never during evaluation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub enum Datum {
    /// An unknown value.
    Null,
    /// The `false` boolean value.
    False,
    /// The `true` boolean value.
    True,
    /// A 16-bit signed integer.
    Int16(i16),
    /// A 32-bit signed integer.
    Int32(i32),
    /// A 64-bit signed integer.
    Int64(i64),
    /// A 64-bit floating point number.
    Float64(OrderedFloat<f64>),
    /// An arbitrary-precision number, approximated by a float.
    Numeric(OrderedFloat<f64>),
    /// A date.
    Date(NaiveDate),
    /// A date and time, without a timezone.
    Timestamp(NaiveDateTime),
    /// A string.
    String(String),
    /// A sequence of field values.
    Record(Vec<Datum>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// The boolean datum for `b`.
    pub fn from_bool(b: bool) -> Datum {
        if b {
            Datum::True
        } else {
            Datum::False
        }
    }

    pub fn unwrap_bool(&self) -> bool {
        match self {
            Datum::False => false,
            Datum::True => true,
            _ => panic!("Datum::unwrap_bool called on {:?}", self),
        }
    }

    pub fn unwrap_str(&self) -> &str {
        match self {
            Datum::String(s) => s,
            _ => panic!("Datum::unwrap_str called on {:?}", self),
        }
    }

    /// The widest integer reading of this datum, if it is an integer.
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Datum::Int16(i) => Some(i64::from(*i)),
            Datum::Int32(i) => Some(i64::from(*i)),
            Datum::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// A floating-point reading of this datum, if it is of the numeric
    /// family.
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Datum::Int16(i) => Some(f64::from(*i)),
            Datum::Int32(i) => Some(f64::from(*i)),
            Datum::Int64(i) => Some(*i as f64),
            Datum::Float64(f) => Some(f.into_inner()),
            Datum::Numeric(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    /// Whether this datum is an instance of the given scalar type, ignoring
    /// embedded type parameters.
    pub fn is_instance_of(&self, typ: &ScalarType) -> bool {
        match self {
            Datum::Null => true,
            Datum::False | Datum::True => *typ == ScalarType::Bool,
            Datum::Int16(_) => *typ == ScalarType::Int16,
            Datum::Int32(_) => *typ == ScalarType::Int32,
            Datum::Int64(_) => *typ == ScalarType::Int64,
            Datum::Float64(_) => *typ == ScalarType::Float64,
            Datum::Numeric(_) => matches!(typ, ScalarType::Numeric { .. }),
            Datum::Date(_) => *typ == ScalarType::Date,
            Datum::Timestamp(_) => *typ == ScalarType::Timestamp,
            Datum::String(_) => *typ == ScalarType::String,
            Datum::Record(_) => matches!(typ, ScalarType::Record { .. }),
        }
    }

    /// A rank used to order datums of unrelated types. The whole numeric
    /// family shares one rank and is compared by value instead.
    fn rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::False | Datum::True => 1,
            Datum::Int16(_)
            | Datum::Int32(_)
            | Datum::Int64(_)
            | Datum::Float64(_)
            | Datum::Numeric(_) => 2,
            Datum::Date(_) => 3,
            Datum::Timestamp(_) => 4,
            Datum::String(_) => 5,
            Datum::Record(_) => 6,
        }
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Datum) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match (self, other) {
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::False, Datum::False) | (Datum::True, Datum::True) => Ordering::Equal,
            (Datum::False, Datum::True) => Ordering::Less,
            (Datum::True, Datum::False) => Ordering::Greater,
            (Datum::Date(a), Datum::Date(b)) => a.cmp(b),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a.cmp(b),
            (Datum::String(a), Datum::String(b)) => a.cmp(b),
            (Datum::Record(a), Datum::Record(b)) => a.cmp(b),
            (a, b) => {
                // Both are of the numeric family. Compare exactly when both
                // sides are integers, and through floats otherwise.
                match (a.as_int64(), b.as_int64()) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => {
                        let a = a.as_float64().expect("numeric rank implies numeric datum");
                        let b = b.as_float64().expect("numeric rank implies numeric datum");
                        OrderedFloat(a).cmp(&OrderedFloat(b))
                    }
                }
            }
        }
    }
}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Datum) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Datum {
        Datum::from_bool(b)
    }
}

impl From<i32> for Datum {
    fn from(i: i32) -> Datum {
        Datum::Int32(i)
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Datum {
        Datum::Int64(i)
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Datum {
        Datum::Float64(OrderedFloat(f))
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Datum {
        Datum::String(s.to_owned())
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("null"),
            Datum::False => f.write_str("false"),
            Datum::True => f.write_str("true"),
            Datum::Int16(i) => write!(f, "{}", i),
            Datum::Int32(i) => write!(f, "{}", i),
            Datum::Int64(i) => write!(f, "{}", i),
            Datum::Float64(n) => write!(f, "{}", n),
            Datum::Numeric(n) => write!(f, "{}", n),
            Datum::Date(d) => write!(f, "{}", d),
            Datum::Timestamp(t) => write!(f, "{}", t),
            Datum::String(s) => write!(f, "{:?}", s),
            Datum::Record(fields) => {
                f.write_str("(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// The type of a [`Datum`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
pub enum ScalarType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float64,
    /// An exact decimal number. Casts to `Numeric` perform bounds and scale
    /// checking and are therefore never no-ops.
    Numeric {
        max_scale: Option<u8>,
    },
    Date,
    Timestamp,
    String,
    Record {
        fields: Vec<(String, ColumnType)>,
    },
    /// The type of a measure over values of the inner type.
    Measure {
        inner: Box<ScalarType>,
    },
}

impl ScalarType {
    /// Derives a [`ColumnType`] from this scalar type with the given
    /// nullability.
    pub fn nullable(self, nullable: bool) -> ColumnType {
        ColumnType {
            scalar_type: self,
            nullable,
        }
    }

    /// Whether this type and `other` are the same ignoring embedded type
    /// parameters.
    pub fn base_eq(&self, other: &ScalarType) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int16
                | ScalarType::Int32
                | ScalarType::Int64
                | ScalarType::Float64
                | ScalarType::Numeric { .. }
        )
    }

    /// Position of this type on the numeric widening ladder, if it is
    /// numeric.
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            ScalarType::Int16 => Some(0),
            ScalarType::Int32 => Some(1),
            ScalarType::Int64 => Some(2),
            ScalarType::Numeric { .. } => Some(3),
            ScalarType::Float64 => Some(4),
            _ => None,
        }
    }

    /// The least restrictive type that both `self` and `other` convert to
    /// without explicit casts, if any.
    pub fn least_restrictive(&self, other: &ScalarType) -> Option<ScalarType> {
        if self == other {
            return Some(self.clone());
        }
        if let (Some(a), Some(b)) = (self.numeric_rank(), other.numeric_rank()) {
            return Some(if a >= b { self.clone() } else { other.clone() });
        }
        match (self, other) {
            (ScalarType::Date, ScalarType::Timestamp)
            | (ScalarType::Timestamp, ScalarType::Date) => Some(ScalarType::Timestamp),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datum_order() {
        let datums = vec![
            Datum::Null,
            Datum::False,
            Datum::True,
            Datum::Int64(-1),
            Datum::Int16(3),
            Datum::Int64(3),
            Datum::Float64(OrderedFloat(3.5)),
            Datum::Int32(4),
            Datum::from("a"),
        ];
        let mut sorted = datums.clone();
        sorted.sort();
        assert_eq!(datums, sorted);

        assert_eq!(Datum::Int16(3).cmp(&Datum::Int64(3)), Ordering::Equal);
        assert!(Datum::Numeric(OrderedFloat(2.5)) < Datum::Int32(3));
    }

    #[test]
    fn test_least_restrictive() {
        assert_eq!(
            ScalarType::Int16.least_restrictive(&ScalarType::Int64),
            Some(ScalarType::Int64)
        );
        assert_eq!(
            ScalarType::Int64.least_restrictive(&ScalarType::Float64),
            Some(ScalarType::Float64)
        );
        assert_eq!(ScalarType::Bool.least_restrictive(&ScalarType::Int64), None);
        assert_eq!(
            ScalarType::Date.least_restrictive(&ScalarType::Timestamp),
            Some(ScalarType::Timestamp)
        );
    }
}
