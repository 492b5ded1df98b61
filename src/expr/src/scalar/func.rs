// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use ordered_float::OrderedFloat;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use tern_repr::adt::datetime::DateTimeUnits;
use tern_repr::{ColumnType, Datum, ScalarType};

use crate::sarg::Sarg;
use crate::scalar::{EvalError, ScalarExpr};

/// A function that takes no arguments. These are placeholders for values that
/// are not known at plan time; they cannot be evaluated and are opaque to the
/// simplifier.
#[derive(
    Ord, PartialOrd, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub enum NullaryFunc {
    CurrentTimestamp,
    Random,
}

impl NullaryFunc {
    pub fn output_type(&self) -> ColumnType {
        match self {
            NullaryFunc::CurrentTimestamp => ScalarType::Timestamp.nullable(false),
            NullaryFunc::Random => ScalarType::Float64.nullable(false),
        }
    }
}

impl fmt::Display for NullaryFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NullaryFunc::CurrentTimestamp => f.write_str("current_timestamp"),
            NullaryFunc::Random => f.write_str("random"),
        }
    }
}

/// A function that takes one expression as an argument.
///
/// Parameters that the surface syntax passes as sibling operands are embedded
/// in the variant once known: the target type of a cast, the unit of a
/// datetime rollup, the search argument of a `SEARCH`.
#[derive(
    Ord, PartialOrd, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub enum UnaryFunc {
    Not,
    IsNull,
    IsNotNull,
    IsTrue,
    IsNotTrue,
    IsFalse,
    IsNotFalse,
    Neg,
    CheckedNeg,
    Pos,
    CeilNumeric,
    FloorNumeric,
    CeilTo(DateTimeUnits),
    FloorTo(DateTimeUnits),
    Cast { to: ColumnType, safe: bool },
    Search(Box<Sarg>),
    RecordGet(usize),
    MeasureToValue,
    ValueToMeasure,
}

impl UnaryFunc {
    pub fn output_type(&self, input_type: ColumnType) -> ColumnType {
        match self {
            UnaryFunc::Not => ScalarType::Bool.nullable(input_type.nullable),
            UnaryFunc::IsNull
            | UnaryFunc::IsNotNull
            | UnaryFunc::IsTrue
            | UnaryFunc::IsNotTrue
            | UnaryFunc::IsFalse
            | UnaryFunc::IsNotFalse => ScalarType::Bool.nullable(false),
            UnaryFunc::Neg | UnaryFunc::CheckedNeg | UnaryFunc::Pos => input_type,
            UnaryFunc::CeilNumeric | UnaryFunc::FloorNumeric => input_type,
            UnaryFunc::CeilTo(_) | UnaryFunc::FloorTo(_) => input_type,
            UnaryFunc::Cast { to, .. } => to.clone(),
            UnaryFunc::Search(sarg) => {
                ScalarType::Bool.nullable(input_type.nullable && sarg.null_as.is_unknown())
            }
            UnaryFunc::RecordGet(i) => match input_type.scalar_type {
                ScalarType::Record { fields } => {
                    let field = fields[*i].1.clone();
                    let nullable = field.nullable || input_type.nullable;
                    field.nullable(nullable)
                }
                other => panic!("RecordGet applied to non-record type {:?}", other),
            },
            UnaryFunc::MeasureToValue => match input_type.scalar_type {
                ScalarType::Measure { inner } => inner.nullable(input_type.nullable),
                other => panic!("MeasureToValue applied to non-measure type {:?}", other),
            },
            UnaryFunc::ValueToMeasure => ScalarType::Measure {
                inner: Box::new(input_type.scalar_type),
            }
            .nullable(input_type.nullable),
        }
    }

    /// Whether this function returns NULL whenever its input is NULL.
    pub fn propagates_nulls(&self) -> bool {
        match self {
            UnaryFunc::Not
            | UnaryFunc::Neg
            | UnaryFunc::CheckedNeg
            | UnaryFunc::Pos
            | UnaryFunc::CeilNumeric
            | UnaryFunc::FloorNumeric
            | UnaryFunc::CeilTo(_)
            | UnaryFunc::FloorTo(_)
            | UnaryFunc::Cast { .. }
            | UnaryFunc::RecordGet(_)
            | UnaryFunc::MeasureToValue
            | UnaryFunc::ValueToMeasure => true,
            UnaryFunc::IsNull
            | UnaryFunc::IsNotNull
            | UnaryFunc::IsTrue
            | UnaryFunc::IsNotTrue
            | UnaryFunc::IsFalse
            | UnaryFunc::IsNotFalse
            | UnaryFunc::Search(_) => false,
        }
    }

    /// Whether this function can return NULL on a non-NULL input.
    pub fn introduces_nulls(&self) -> bool {
        match self {
            // A failed safe cast yields NULL.
            UnaryFunc::Cast { safe, .. } => *safe,
            // The field itself may be NULL even when the record is not.
            UnaryFunc::RecordGet(_) => true,
            _ => false,
        }
    }

    /// The null-safe negation of this function, if it has one. `NOT (x IS
    /// NULL)` is exactly `x IS NOT NULL`, and similarly for the other
    /// `IS`-predicates.
    pub fn negate(&self) -> Option<UnaryFunc> {
        match self {
            UnaryFunc::IsNull => Some(UnaryFunc::IsNotNull),
            UnaryFunc::IsNotNull => Some(UnaryFunc::IsNull),
            UnaryFunc::IsTrue => Some(UnaryFunc::IsNotTrue),
            UnaryFunc::IsNotTrue => Some(UnaryFunc::IsTrue),
            UnaryFunc::IsFalse => Some(UnaryFunc::IsNotFalse),
            UnaryFunc::IsNotFalse => Some(UnaryFunc::IsFalse),
            _ => None,
        }
    }

    pub fn eval(&self, a: Datum) -> Result<Datum, EvalError> {
        if a.is_null() && self.propagates_nulls() {
            return Ok(Datum::Null);
        }
        match self {
            UnaryFunc::Not => Ok(match a {
                Datum::True => Datum::False,
                Datum::False => Datum::True,
                other => {
                    return Err(EvalError::Internal(format!(
                        "NOT applied to non-boolean datum: {:?}",
                        other
                    )))
                }
            }),
            UnaryFunc::IsNull => Ok(Datum::from_bool(a.is_null())),
            UnaryFunc::IsNotNull => Ok(Datum::from_bool(!a.is_null())),
            UnaryFunc::IsTrue => Ok(Datum::from_bool(a == Datum::True)),
            UnaryFunc::IsNotTrue => Ok(Datum::from_bool(a != Datum::True)),
            UnaryFunc::IsFalse => Ok(Datum::from_bool(a == Datum::False)),
            UnaryFunc::IsNotFalse => Ok(Datum::from_bool(a != Datum::False)),
            UnaryFunc::Neg => match a {
                Datum::Int16(i) => Ok(Datum::Int16(i.wrapping_neg())),
                Datum::Int32(i) => Ok(Datum::Int32(i.wrapping_neg())),
                Datum::Int64(i) => Ok(Datum::Int64(i.wrapping_neg())),
                Datum::Float64(f) => Ok(Datum::Float64(-f)),
                Datum::Numeric(f) => Ok(Datum::Numeric(-f)),
                other => Err(EvalError::Internal(format!("cannot negate {:?}", other))),
            },
            UnaryFunc::CheckedNeg => match a {
                Datum::Int16(i) => i
                    .checked_neg()
                    .map(Datum::Int16)
                    .ok_or(EvalError::Int16OutOfRange),
                Datum::Int32(i) => i
                    .checked_neg()
                    .map(Datum::Int32)
                    .ok_or(EvalError::Int32OutOfRange),
                Datum::Int64(i) => i
                    .checked_neg()
                    .map(Datum::Int64)
                    .ok_or(EvalError::Int64OutOfRange),
                Datum::Float64(f) => Ok(Datum::Float64(-f)),
                Datum::Numeric(f) => Ok(Datum::Numeric(-f)),
                other => Err(EvalError::Internal(format!("cannot negate {:?}", other))),
            },
            UnaryFunc::Pos => Ok(a),
            UnaryFunc::CeilNumeric => match a {
                Datum::Float64(f) => Ok(Datum::Float64(OrderedFloat(f.ceil()))),
                Datum::Numeric(f) => Ok(Datum::Numeric(OrderedFloat(f.ceil()))),
                int => Ok(int),
            },
            UnaryFunc::FloorNumeric => match a {
                Datum::Float64(f) => Ok(Datum::Float64(OrderedFloat(f.floor()))),
                Datum::Numeric(f) => Ok(Datum::Numeric(OrderedFloat(f.floor()))),
                int => Ok(int),
            },
            UnaryFunc::CeilTo(unit) => match a {
                Datum::Timestamp(ts) => Ok(Datum::Timestamp(date_ceil(ts, *unit)?)),
                Datum::Date(d) => Ok(Datum::Date(date_ceil_date(d, *unit)?)),
                other => Err(EvalError::Internal(format!(
                    "ceil with unit applied to {:?}",
                    other
                ))),
            },
            UnaryFunc::FloorTo(unit) => match a {
                Datum::Timestamp(ts) => Ok(Datum::Timestamp(date_trunc(ts, *unit))),
                Datum::Date(d) => Ok(Datum::Date(date_trunc_date(d, *unit))),
                other => Err(EvalError::Internal(format!(
                    "floor with unit applied to {:?}",
                    other
                ))),
            },
            UnaryFunc::Cast { to, safe } => cast_datum(&a, to, *safe),
            UnaryFunc::Search(sarg) => Ok(sarg.matches(&a)),
            UnaryFunc::RecordGet(i) => match a {
                Datum::Record(mut fields) => Ok(fields.swap_remove(*i)),
                other => Err(EvalError::Internal(format!(
                    "record field access on {:?}",
                    other
                ))),
            },
            // Measure lifting has no runtime behavior of its own.
            UnaryFunc::MeasureToValue | UnaryFunc::ValueToMeasure => Ok(a),
        }
    }
}

impl fmt::Display for UnaryFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryFunc::Not => f.write_str("!"),
            UnaryFunc::IsNull => f.write_str("isnull"),
            UnaryFunc::IsNotNull => f.write_str("isnotnull"),
            UnaryFunc::IsTrue => f.write_str("istrue"),
            UnaryFunc::IsNotTrue => f.write_str("isnottrue"),
            UnaryFunc::IsFalse => f.write_str("isfalse"),
            UnaryFunc::IsNotFalse => f.write_str("isnotfalse"),
            UnaryFunc::Neg | UnaryFunc::CheckedNeg => f.write_str("-"),
            UnaryFunc::Pos => f.write_str("+"),
            UnaryFunc::CeilNumeric => f.write_str("ceil"),
            UnaryFunc::FloorNumeric => f.write_str("floor"),
            UnaryFunc::CeilTo(unit) => write!(f, "ceil_{}", unit),
            UnaryFunc::FloorTo(unit) => write!(f, "floor_{}", unit),
            UnaryFunc::Cast { to, safe } => {
                if *safe {
                    write!(f, "safe_cast_{:?}", to.scalar_type)
                } else {
                    write!(f, "cast_{:?}", to.scalar_type)
                }
            }
            UnaryFunc::Search(sarg) => write!(f, "search[{}]", sarg),
            UnaryFunc::RecordGet(i) => write!(f, "record_get[{}]", i),
            UnaryFunc::MeasureToValue => f.write_str("m2v"),
            UnaryFunc::ValueToMeasure => f.write_str("v2m"),
        }
    }
}

/// A function that takes two expressions as arguments.
#[derive(
    Ord, PartialOrd, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub enum BinaryFunc {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    IsDistinctFrom,
    IsNotDistinctFrom,
    Add,
    CheckedAdd,
    Sub,
    CheckedSub,
    Mul,
    CheckedMul,
    Div,
    CheckedDiv,
    Mod,
    Like,
    Trim,
    TrimLeading,
    TrimTrailing,
}

impl BinaryFunc {
    pub fn output_type(&self, input1_type: ColumnType, input2_type: ColumnType) -> ColumnType {
        let in_nullable = input1_type.nullable || input2_type.nullable;
        match self {
            BinaryFunc::Eq
            | BinaryFunc::NotEq
            | BinaryFunc::Lt
            | BinaryFunc::Lte
            | BinaryFunc::Gt
            | BinaryFunc::Gte
            | BinaryFunc::Like => ScalarType::Bool.nullable(in_nullable),
            BinaryFunc::IsDistinctFrom | BinaryFunc::IsNotDistinctFrom => {
                ScalarType::Bool.nullable(false)
            }
            BinaryFunc::Add
            | BinaryFunc::CheckedAdd
            | BinaryFunc::Sub
            | BinaryFunc::CheckedSub
            | BinaryFunc::Mul
            | BinaryFunc::CheckedMul
            | BinaryFunc::Div
            | BinaryFunc::CheckedDiv
            | BinaryFunc::Mod => input1_type
                .union(&input2_type)
                .unwrap_or_else(|| {
                    panic!(
                        "arithmetic on incompatible types {:?} and {:?}",
                        input1_type, input2_type
                    )
                })
                .nullable(in_nullable),
            BinaryFunc::Trim | BinaryFunc::TrimLeading | BinaryFunc::TrimTrailing => {
                ScalarType::String.nullable(in_nullable)
            }
        }
    }

    pub fn propagates_nulls(&self) -> bool {
        !matches!(
            self,
            BinaryFunc::IsDistinctFrom | BinaryFunc::IsNotDistinctFrom
        )
    }

    pub fn introduces_nulls(&self) -> bool {
        false
    }

    /// Whether this function is one of the six ordering comparisons.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryFunc::Eq
                | BinaryFunc::NotEq
                | BinaryFunc::Lt
                | BinaryFunc::Lte
                | BinaryFunc::Gt
                | BinaryFunc::Gte
        )
    }

    /// Returns the negation of this function, if it has one. For the
    /// ordering comparisons the negation is also null-safe: `NOT (x < y)` is
    /// exactly `x >= y` under three-valued logic.
    pub fn negate(&self) -> Option<Self> {
        match self {
            BinaryFunc::Eq => Some(BinaryFunc::NotEq),
            BinaryFunc::NotEq => Some(BinaryFunc::Eq),
            BinaryFunc::Lt => Some(BinaryFunc::Gte),
            BinaryFunc::Gte => Some(BinaryFunc::Lt),
            BinaryFunc::Gt => Some(BinaryFunc::Lte),
            BinaryFunc::Lte => Some(BinaryFunc::Gt),
            BinaryFunc::IsDistinctFrom => Some(BinaryFunc::IsNotDistinctFrom),
            BinaryFunc::IsNotDistinctFrom => Some(BinaryFunc::IsDistinctFrom),
            _ => None,
        }
    }

    /// Returns the comparison with its operands swapped: `a < b` is `b > a`.
    pub fn reverse(&self) -> Option<Self> {
        match self {
            BinaryFunc::Eq => Some(BinaryFunc::Eq),
            BinaryFunc::NotEq => Some(BinaryFunc::NotEq),
            BinaryFunc::Lt => Some(BinaryFunc::Gt),
            BinaryFunc::Gt => Some(BinaryFunc::Lt),
            BinaryFunc::Lte => Some(BinaryFunc::Gte),
            BinaryFunc::Gte => Some(BinaryFunc::Lte),
            _ => None,
        }
    }

    pub fn is_infix_op(&self) -> bool {
        !matches!(
            self,
            BinaryFunc::Like | BinaryFunc::Trim | BinaryFunc::TrimLeading | BinaryFunc::TrimTrailing
        )
    }

    pub fn eval(&self, a: Datum, b: Datum) -> Result<Datum, EvalError> {
        match self {
            BinaryFunc::IsDistinctFrom => return Ok(Datum::from_bool(a != b)),
            BinaryFunc::IsNotDistinctFrom => return Ok(Datum::from_bool(a == b)),
            _ => {}
        }
        if a.is_null() || b.is_null() {
            return Ok(Datum::Null);
        }
        match self {
            BinaryFunc::Eq => Ok(Datum::from_bool(a.cmp(&b) == std::cmp::Ordering::Equal)),
            BinaryFunc::NotEq => Ok(Datum::from_bool(a.cmp(&b) != std::cmp::Ordering::Equal)),
            BinaryFunc::Lt => Ok(Datum::from_bool(a < b)),
            BinaryFunc::Lte => Ok(Datum::from_bool(a <= b)),
            BinaryFunc::Gt => Ok(Datum::from_bool(a > b)),
            BinaryFunc::Gte => Ok(Datum::from_bool(a >= b)),
            BinaryFunc::IsDistinctFrom | BinaryFunc::IsNotDistinctFrom => unreachable!(),
            BinaryFunc::Add | BinaryFunc::CheckedAdd => {
                eval_arith(&a, &b, matches!(self, BinaryFunc::CheckedAdd), ArithOp::Add)
            }
            BinaryFunc::Sub | BinaryFunc::CheckedSub => {
                eval_arith(&a, &b, matches!(self, BinaryFunc::CheckedSub), ArithOp::Sub)
            }
            BinaryFunc::Mul | BinaryFunc::CheckedMul => {
                eval_arith(&a, &b, matches!(self, BinaryFunc::CheckedMul), ArithOp::Mul)
            }
            BinaryFunc::Div | BinaryFunc::CheckedDiv => {
                eval_arith(&a, &b, matches!(self, BinaryFunc::CheckedDiv), ArithOp::Div)
            }
            BinaryFunc::Mod => eval_arith(&a, &b, false, ArithOp::Mod),
            BinaryFunc::Like => Ok(Datum::from_bool(like_matches(
                a.unwrap_str(),
                b.unwrap_str(),
            )?)),
            BinaryFunc::Trim => Ok(Datum::String(
                a.unwrap_str()
                    .trim_matches(|c| b.unwrap_str().contains(c))
                    .to_owned(),
            )),
            BinaryFunc::TrimLeading => Ok(Datum::String(
                a.unwrap_str()
                    .trim_start_matches(|c| b.unwrap_str().contains(c))
                    .to_owned(),
            )),
            BinaryFunc::TrimTrailing => Ok(Datum::String(
                a.unwrap_str()
                    .trim_end_matches(|c| b.unwrap_str().contains(c))
                    .to_owned(),
            )),
        }
    }
}

impl fmt::Display for BinaryFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BinaryFunc::Eq => f.write_str("="),
            BinaryFunc::NotEq => f.write_str("!="),
            BinaryFunc::Lt => f.write_str("<"),
            BinaryFunc::Lte => f.write_str("<="),
            BinaryFunc::Gt => f.write_str(">"),
            BinaryFunc::Gte => f.write_str(">="),
            BinaryFunc::IsDistinctFrom => f.write_str("IS DISTINCT FROM"),
            BinaryFunc::IsNotDistinctFrom => f.write_str("IS NOT DISTINCT FROM"),
            BinaryFunc::Add | BinaryFunc::CheckedAdd => f.write_str("+"),
            BinaryFunc::Sub | BinaryFunc::CheckedSub => f.write_str("-"),
            BinaryFunc::Mul | BinaryFunc::CheckedMul => f.write_str("*"),
            BinaryFunc::Div | BinaryFunc::CheckedDiv => f.write_str("/"),
            BinaryFunc::Mod => f.write_str("%"),
            BinaryFunc::Like => f.write_str("like"),
            BinaryFunc::Trim => f.write_str("btrim"),
            BinaryFunc::TrimLeading => f.write_str("ltrim"),
            BinaryFunc::TrimTrailing => f.write_str("rtrim"),
        }
    }
}

/// A function that takes an arbitrary number of arguments.
#[derive(
    Ord, PartialOrd, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub enum VariadicFunc {
    And,
    Or,
    Coalesce,
    /// `args[0] IN (args[1..])`.
    In,
    /// `args[0] NOT IN (args[1..])`.
    NotIn,
    /// `args[0] BETWEEN args[1] AND args[2]`.
    Between,
}

impl VariadicFunc {
    pub fn output_type(&self, input_types: Vec<ColumnType>) -> ColumnType {
        match self {
            VariadicFunc::And | VariadicFunc::Or => {
                ScalarType::Bool.nullable(input_types.iter().any(|t| t.nullable))
            }
            VariadicFunc::Coalesce => {
                let mut iter = input_types.into_iter();
                let mut typ = iter.next().expect("coalesce called without arguments");
                for t in iter {
                    let nullable = typ.nullable && t.nullable;
                    typ = typ
                        .union(&t)
                        .unwrap_or_else(|| panic!("coalesce on incompatible type {:?}", t))
                        .nullable(nullable);
                }
                typ
            }
            VariadicFunc::In | VariadicFunc::NotIn => {
                ScalarType::Bool.nullable(input_types.iter().any(|t| t.nullable))
            }
            VariadicFunc::Between => {
                assert_eq!(input_types.len(), 3, "BETWEEN requires exactly 3 arguments");
                ScalarType::Bool.nullable(input_types.iter().any(|t| t.nullable))
            }
        }
    }

    pub fn propagates_nulls(&self) -> bool {
        matches!(self, VariadicFunc::Between)
    }

    pub fn introduces_nulls(&self) -> bool {
        false
    }

    /// Evaluates the function over the given expressions. `And`, `Or` and
    /// `Coalesce` must not evaluate operands beyond the ones that determine
    /// the result; a FALSE conjunct absorbs an error from a sibling.
    pub fn eval(&self, datums: &[Datum], exprs: &[ScalarExpr]) -> Result<Datum, EvalError> {
        match self {
            VariadicFunc::And => {
                let mut null = false;
                let mut err = None;
                for expr in exprs {
                    match expr.eval(datums) {
                        Ok(Datum::False) => return Ok(Datum::False),
                        Ok(Datum::True) => {}
                        Ok(Datum::Null) => null = true,
                        Ok(other) => {
                            return Err(EvalError::Internal(format!(
                                "non-boolean datum in AND: {:?}",
                                other
                            )))
                        }
                        Err(e) => err = err.or(Some(e)),
                    }
                }
                match err {
                    Some(e) => Err(e),
                    None if null => Ok(Datum::Null),
                    None => Ok(Datum::True),
                }
            }
            VariadicFunc::Or => {
                let mut null = false;
                let mut err = None;
                for expr in exprs {
                    match expr.eval(datums) {
                        Ok(Datum::True) => return Ok(Datum::True),
                        Ok(Datum::False) => {}
                        Ok(Datum::Null) => null = true,
                        Ok(other) => {
                            return Err(EvalError::Internal(format!(
                                "non-boolean datum in OR: {:?}",
                                other
                            )))
                        }
                        Err(e) => err = err.or(Some(e)),
                    }
                }
                match err {
                    Some(e) => Err(e),
                    None if null => Ok(Datum::Null),
                    None => Ok(Datum::False),
                }
            }
            VariadicFunc::Coalesce => {
                for expr in exprs {
                    match expr.eval(datums)? {
                        Datum::Null => {}
                        datum => return Ok(datum),
                    }
                }
                Ok(Datum::Null)
            }
            VariadicFunc::In | VariadicFunc::NotIn => {
                // `x IN (a, b)` is `x = a OR x = b` under three-valued logic.
                let (needle, haystack) = exprs.split_first().expect("IN without needle");
                let needle = needle.eval(datums)?;
                let mut found = false;
                let mut null = false;
                for expr in haystack {
                    let datum = expr.eval(datums)?;
                    if needle.is_null() || datum.is_null() {
                        null = true;
                    } else if datum == needle {
                        found = true;
                    }
                }
                if found {
                    Ok(Datum::from_bool(*self == VariadicFunc::In))
                } else if null {
                    Ok(Datum::Null)
                } else {
                    Ok(Datum::from_bool(*self == VariadicFunc::NotIn))
                }
            }
            VariadicFunc::Between => {
                assert_eq!(exprs.len(), 3, "BETWEEN requires exactly 3 arguments");
                let x = exprs[0].eval(datums)?;
                let lo = exprs[1].eval(datums)?;
                let hi = exprs[2].eval(datums)?;
                if x.is_null() || lo.is_null() || hi.is_null() {
                    return Ok(Datum::Null);
                }
                Ok(Datum::from_bool(lo <= x && x <= hi))
            }
        }
    }
}

impl fmt::Display for VariadicFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VariadicFunc::And => f.write_str("and"),
            VariadicFunc::Or => f.write_str("or"),
            VariadicFunc::Coalesce => f.write_str("coalesce"),
            VariadicFunc::In => f.write_str("in"),
            VariadicFunc::NotIn => f.write_str("not_in"),
            VariadicFunc::Between => f.write_str("between"),
        }
    }
}

/// An aggregate function, usable only under a measure or a window.
#[derive(
    Ord, PartialOrd, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn output_type(&self, input_type: ColumnType) -> ColumnType {
        match self {
            AggregateFunc::Count => ScalarType::Int64.nullable(false),
            AggregateFunc::Sum => match input_type.scalar_type {
                ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64 => {
                    ScalarType::Int64.nullable(true)
                }
                other => other.nullable(true),
            },
            AggregateFunc::Min | AggregateFunc::Max => input_type.scalar_type.nullable(true),
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AggregateFunc::Count => f.write_str("count"),
            AggregateFunc::Sum => f.write_str("sum"),
            AggregateFunc::Min => f.write_str("min"),
            AggregateFunc::Max => f.write_str("max"),
        }
    }
}

/// One bound of a window frame.
#[derive(
    Ord, PartialOrd, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub enum WindowBound {
    UnboundedPreceding,
    CurrentRow,
    UnboundedFollowing,
}

/// A `ROWS` window frame.
#[derive(
    Ord, PartialOrd, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub struct WindowFrame {
    pub lower: WindowBound,
    pub upper: WindowBound,
}

impl WindowFrame {
    /// The single-row frame `ROWS CURRENT ROW`.
    pub fn current_row() -> WindowFrame {
        WindowFrame {
            lower: WindowBound::CurrentRow,
            upper: WindowBound::CurrentRow,
        }
    }
}

impl fmt::Display for WindowFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bound = |b: &WindowBound| match b {
            WindowBound::UnboundedPreceding => "UNBOUNDED PRECEDING",
            WindowBound::CurrentRow => "CURRENT ROW",
            WindowBound::UnboundedFollowing => "UNBOUNDED FOLLOWING",
        };
        if self.lower == self.upper {
            write!(f, "ROWS {}", bound(&self.lower))
        } else {
            write!(
                f,
                "ROWS BETWEEN {} AND {}",
                bound(&self.lower),
                bound(&self.upper)
            )
        }
    }
}

enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// The scalar type a datum naturally is an instance of, if unambiguous.
pub(crate) fn datum_scalar_type(datum: &Datum) -> Option<ScalarType> {
    match datum {
        Datum::Null | Datum::Record(_) => None,
        Datum::False | Datum::True => Some(ScalarType::Bool),
        Datum::Int16(_) => Some(ScalarType::Int16),
        Datum::Int32(_) => Some(ScalarType::Int32),
        Datum::Int64(_) => Some(ScalarType::Int64),
        Datum::Float64(_) => Some(ScalarType::Float64),
        Datum::Numeric(_) => Some(ScalarType::Numeric { max_scale: None }),
        Datum::Date(_) => Some(ScalarType::Date),
        Datum::Timestamp(_) => Some(ScalarType::Timestamp),
        Datum::String(_) => Some(ScalarType::String),
    }
}

fn eval_arith(a: &Datum, b: &Datum, checked: bool, op: ArithOp) -> Result<Datum, EvalError> {
    let target = match (datum_scalar_type(a), datum_scalar_type(b)) {
        (Some(a), Some(b)) => a.least_restrictive(&b).ok_or_else(|| {
            EvalError::Internal(format!("arithmetic on incompatible types {:?}, {:?}", a, b))
        })?,
        _ => {
            return Err(EvalError::Internal(format!(
                "arithmetic on non-numeric datums {:?}, {:?}",
                a, b
            )))
        }
    };
    match &target {
        ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64 => {
            let a = a.as_int64().expect("integer datum");
            let b = b.as_int64().expect("integer datum");
            if matches!(op, ArithOp::Div | ArithOp::Mod) && b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            let wide = match op {
                ArithOp::Add => {
                    if checked {
                        a.checked_add(b).ok_or(EvalError::Int64OutOfRange)?
                    } else {
                        a.wrapping_add(b)
                    }
                }
                ArithOp::Sub => {
                    if checked {
                        a.checked_sub(b).ok_or(EvalError::Int64OutOfRange)?
                    } else {
                        a.wrapping_sub(b)
                    }
                }
                ArithOp::Mul => {
                    if checked {
                        a.checked_mul(b).ok_or(EvalError::Int64OutOfRange)?
                    } else {
                        a.wrapping_mul(b)
                    }
                }
                ArithOp::Div => a.checked_div(b).ok_or(EvalError::Int64OutOfRange)?,
                ArithOp::Mod => a.checked_rem(b).ok_or(EvalError::Int64OutOfRange)?,
            };
            narrow_int(wide, &target, checked)
        }
        ScalarType::Float64 | ScalarType::Numeric { .. } => {
            let a = a.as_float64().expect("numeric datum");
            let b = b.as_float64().expect("numeric datum");
            if matches!(op, ArithOp::Div | ArithOp::Mod) && b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            let result = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Mod => a % b,
            };
            if checked && !result.is_finite() {
                return Err(EvalError::FloatOverflow);
            }
            Ok(match target {
                ScalarType::Float64 => Datum::Float64(OrderedFloat(result)),
                _ => Datum::Numeric(OrderedFloat(result)),
            })
        }
        other => Err(EvalError::Internal(format!(
            "arithmetic on non-numeric type {:?}",
            other
        ))),
    }
}

fn narrow_int(wide: i64, target: &ScalarType, checked: bool) -> Result<Datum, EvalError> {
    match target {
        ScalarType::Int16 => {
            if checked {
                i16::try_from(wide)
                    .map(Datum::Int16)
                    .map_err(|_| EvalError::Int16OutOfRange)
            } else {
                Ok(Datum::Int16(wide as i16))
            }
        }
        ScalarType::Int32 => {
            if checked {
                i32::try_from(wide)
                    .map(Datum::Int32)
                    .map_err(|_| EvalError::Int32OutOfRange)
            } else {
                Ok(Datum::Int32(wide as i32))
            }
        }
        _ => Ok(Datum::Int64(wide)),
    }
}

/// Casts a datum to the given type, evaluating to NULL instead of an error
/// when `safe` is set.
pub fn cast_datum(datum: &Datum, to: &ColumnType, safe: bool) -> Result<Datum, EvalError> {
    let result = cast_datum_inner(datum, &to.scalar_type);
    match result {
        Err(_) if safe => Ok(Datum::Null),
        other => other,
    }
}

fn cast_error(datum: &Datum, to: &ScalarType) -> EvalError {
    EvalError::InvalidCast {
        from: format!("{}", datum),
        to: format!("{:?}", to),
    }
}

fn cast_datum_inner(datum: &Datum, to: &ScalarType) -> Result<Datum, EvalError> {
    if datum.is_null() {
        return Ok(Datum::Null);
    }
    if datum.is_instance_of(to) && !matches!(to, ScalarType::Numeric { .. }) {
        return Ok(datum.clone());
    }
    match to {
        ScalarType::Bool => match datum {
            Datum::String(s) => match s.as_str() {
                "true" | "t" => Ok(Datum::True),
                "false" | "f" => Ok(Datum::False),
                _ => Err(EvalError::Parse {
                    typ: "boolean".to_string(),
                    input: s.clone(),
                }),
            },
            _ => Err(cast_error(datum, to)),
        },
        ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64 => {
            let wide = match datum {
                Datum::Int16(_) | Datum::Int32(_) | Datum::Int64(_) => {
                    datum.as_int64().expect("integer datum")
                }
                Datum::Float64(f) | Datum::Numeric(f) => {
                    let rounded = f.into_inner().round();
                    if !rounded.is_finite()
                        || rounded < i64::MIN as f64
                        || rounded > i64::MAX as f64
                    {
                        return Err(EvalError::Int64OutOfRange);
                    }
                    rounded as i64
                }
                Datum::String(s) => {
                    s.trim().parse::<i64>().map_err(|_| EvalError::Parse {
                        typ: "integer".to_string(),
                        input: s.clone(),
                    })?
                }
                _ => return Err(cast_error(datum, to)),
            };
            narrow_int(wide, to, true)
        }
        ScalarType::Float64 => match datum {
            Datum::Int16(_) | Datum::Int32(_) | Datum::Int64(_) | Datum::Numeric(_) => Ok(
                Datum::Float64(OrderedFloat(datum.as_float64().expect("numeric datum"))),
            ),
            Datum::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|f| Datum::Float64(OrderedFloat(f)))
                .map_err(|_| EvalError::Parse {
                    typ: "double precision".to_string(),
                    input: s.clone(),
                }),
            _ => Err(cast_error(datum, to)),
        },
        ScalarType::Numeric { max_scale } => {
            let f = match datum {
                Datum::Int16(_)
                | Datum::Int32(_)
                | Datum::Int64(_)
                | Datum::Float64(_)
                | Datum::Numeric(_) => datum.as_float64().expect("numeric datum"),
                Datum::String(s) => s.trim().parse::<f64>().map_err(|_| EvalError::Parse {
                    typ: "numeric".to_string(),
                    input: s.clone(),
                })?,
                _ => return Err(cast_error(datum, to)),
            };
            if !f.is_finite() {
                return Err(EvalError::NumericFieldOverflow);
            }
            let f = match max_scale {
                Some(scale) => {
                    let factor = 10f64.powi(i32::from(*scale));
                    (f * factor).round() / factor
                }
                None => f,
            };
            Ok(Datum::Numeric(OrderedFloat(f)))
        }
        ScalarType::Date => match datum {
            Datum::Timestamp(ts) => Ok(Datum::Date(ts.date())),
            Datum::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Datum::Date)
                .map_err(|_| EvalError::Parse {
                    typ: "date".to_string(),
                    input: s.clone(),
                }),
            _ => Err(cast_error(datum, to)),
        },
        ScalarType::Timestamp => match datum {
            Datum::Date(d) => Ok(Datum::Timestamp(
                d.and_hms_opt(0, 0, 0).expect("midnight is always valid"),
            )),
            Datum::String(s) => {
                NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
                    .map(Datum::Timestamp)
                    .map_err(|_| EvalError::Parse {
                        typ: "timestamp".to_string(),
                        input: s.clone(),
                    })
            }
            _ => Err(cast_error(datum, to)),
        },
        ScalarType::String => {
            let rendered = match datum {
                Datum::String(s) => s.clone(),
                Datum::False => "false".into(),
                Datum::True => "true".into(),
                other => format!("{}", other),
            };
            Ok(Datum::String(rendered))
        }
        ScalarType::Record { .. } | ScalarType::Measure { .. } => Err(cast_error(datum, to)),
    }
}

/// Whether the type coercion rules allow a cast from `from` to `to`.
pub fn can_cast(from: &ScalarType, to: &ScalarType) -> bool {
    if from.base_eq(to) {
        return true;
    }
    match (from, to) {
        (f, t) if f.is_numeric() && t.is_numeric() => true,
        (f, ScalarType::String) if !matches!(f, ScalarType::Record { .. }) => true,
        (ScalarType::String, t) if !matches!(t, ScalarType::Record { .. }) => true,
        (ScalarType::Date, ScalarType::Timestamp) | (ScalarType::Timestamp, ScalarType::Date) => {
            true
        }
        _ => false,
    }
}

/// Whether a cast from `from` to `to` embeds the source values injectively
/// into the target type.
pub fn is_lossless(from: &ScalarType, to: &ScalarType) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (ScalarType::Int16, ScalarType::Int32)
        | (ScalarType::Int16, ScalarType::Int64)
        | (ScalarType::Int16, ScalarType::Float64)
        | (ScalarType::Int32, ScalarType::Int64)
        | (ScalarType::Int32, ScalarType::Float64)
        | (ScalarType::Date, ScalarType::Timestamp) => true,
        (ScalarType::Int16, ScalarType::Numeric { max_scale })
        | (ScalarType::Int32, ScalarType::Numeric { max_scale })
        | (ScalarType::Int64, ScalarType::Numeric { max_scale }) => max_scale.is_none(),
        (ScalarType::Numeric { max_scale: from }, ScalarType::Numeric { max_scale: to }) => {
            match (from, to) {
                (Some(_), None) => true,
                (Some(from), Some(to)) => to >= from,
                _ => false,
            }
        }
        _ => false,
    }
}

/// Builds a regular expression that matches the same strings as a SQL
/// `LIKE` pattern.
///
/// LIKE patterns always cover the whole string, so the regex is anchored on
/// both sides. An underscore (`_`) matches any single character and a
/// percent sign (`%`) any sequence of zero or more characters, so they
/// translate to the equivalent regex operators `.` and `.*`; every other
/// character matches itself and is escaped as needed.
pub fn build_like_regex(pattern: &str) -> Result<Regex, EvalError> {
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '_' => regex.push('.'),
            '%' => regex.push_str(".*"),
            c => {
                let mut buf = [0; 4];
                regex.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
    }
    regex.push('$');
    RegexBuilder::new(&regex)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| {
            EvalError::Internal(format!("LIKE pattern compiled to invalid regex: {}", e))
        })
}

/// Whether `text` matches the SQL `LIKE` pattern `pattern`.
pub fn like_matches(text: &str, pattern: &str) -> Result<bool, EvalError> {
    Ok(build_like_regex(pattern)?.is_match(text))
}

fn quarter_start_month(month: u32) -> u32 {
    1 + 3 * ((month - 1) / 3)
}

/// Truncates a date to the given unit. Units finer than a day leave the date
/// unchanged.
pub fn date_trunc_date(d: NaiveDate, unit: DateTimeUnits) -> NaiveDate {
    let ymd = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).expect("truncated date is valid");
    match unit {
        DateTimeUnits::Year => ymd(d.year(), 1, 1),
        DateTimeUnits::Quarter => ymd(d.year(), quarter_start_month(d.month()), 1),
        DateTimeUnits::Month => ymd(d.year(), d.month(), 1),
        _ => d,
    }
}

/// Truncates a timestamp to the given unit.
pub fn date_trunc(ts: NaiveDateTime, unit: DateTimeUnits) -> NaiveDateTime {
    let date = ts.date();
    let midnight = |d: NaiveDate| d.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    match unit {
        DateTimeUnits::Year | DateTimeUnits::Quarter | DateTimeUnits::Month => {
            midnight(date_trunc_date(date, unit))
        }
        DateTimeUnits::Day => midnight(date),
        DateTimeUnits::Hour => midnight(date) + Duration::hours(i64::from(ts.hour())),
        DateTimeUnits::Minute => {
            midnight(date) + Duration::hours(i64::from(ts.hour())) + Duration::minutes(i64::from(ts.minute()))
        }
        DateTimeUnits::Second => ts.with_nanosecond(0).expect("zero nanoseconds is valid"),
        DateTimeUnits::Milliseconds => ts
            .with_nanosecond(ts.nanosecond() / 1_000_000 * 1_000_000)
            .expect("truncated nanoseconds are valid"),
        DateTimeUnits::Microseconds => ts
            .with_nanosecond(ts.nanosecond() / 1_000 * 1_000)
            .expect("truncated nanoseconds are valid"),
    }
}

fn advance(ts: NaiveDateTime, unit: DateTimeUnits) -> Result<NaiveDateTime, EvalError> {
    let months = |n| Months::new(n);
    match unit {
        DateTimeUnits::Year => ts.checked_add_months(months(12)),
        DateTimeUnits::Quarter => ts.checked_add_months(months(3)),
        DateTimeUnits::Month => ts.checked_add_months(months(1)),
        DateTimeUnits::Day => ts.checked_add_signed(Duration::days(1)),
        DateTimeUnits::Hour => ts.checked_add_signed(Duration::hours(1)),
        DateTimeUnits::Minute => ts.checked_add_signed(Duration::minutes(1)),
        DateTimeUnits::Second => ts.checked_add_signed(Duration::seconds(1)),
        DateTimeUnits::Milliseconds => ts.checked_add_signed(Duration::milliseconds(1)),
        DateTimeUnits::Microseconds => ts.checked_add_signed(Duration::microseconds(1)),
    }
    .ok_or(EvalError::TimestampOutOfRange)
}

/// Rounds a timestamp up to the given unit.
pub fn date_ceil(ts: NaiveDateTime, unit: DateTimeUnits) -> Result<NaiveDateTime, EvalError> {
    let truncated = date_trunc(ts, unit);
    if truncated == ts {
        Ok(ts)
    } else {
        advance(truncated, unit)
    }
}

/// Rounds a date up to the given unit. Units finer than a day leave the date
/// unchanged.
pub fn date_ceil_date(d: NaiveDate, unit: DateTimeUnits) -> Result<NaiveDate, EvalError> {
    let truncated = date_trunc_date(d, unit);
    if truncated == d {
        return Ok(d);
    }
    let months = match unit {
        DateTimeUnits::Year => 12,
        DateTimeUnits::Quarter => 3,
        DateTimeUnits::Month => 1,
        _ => return Ok(d),
    };
    truncated
        .checked_add_months(Months::new(months))
        .ok_or(EvalError::TimestampOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_matches() {
        let matches = |text, pattern| like_matches(text, pattern).unwrap();
        assert!(matches("hello", "hello"));
        assert!(matches("hello", "h%"));
        assert!(matches("hello", "%o"));
        assert!(matches("hello", "h_llo"));
        assert!(matches("hello", "%"));
        assert!(matches("", "%"));
        assert!(matches("abc", "%b%"));
        assert!(matches("a\nb", "a%b"));
        assert!(!matches("hello", "h"));
        assert!(!matches("hello", "_"));
        assert!(!matches("", "_"));
        assert!(!matches("abc", "%d%"));
        // Regex metacharacters in the pattern match themselves.
        assert!(matches("a.c", "a.c"));
        assert!(!matches("abc", "a.c"));
        assert!(matches("a+b", "%+%"));
    }

    #[test]
    fn test_date_trunc() {
        let ts = NaiveDate::from_ymd_opt(2021, 8, 17)
            .unwrap()
            .and_hms_milli_opt(13, 45, 30, 250)
            .unwrap();
        let check = |unit, expected: &str| {
            let got = date_trunc(ts, unit);
            assert_eq!(got.to_string(), expected, "truncating to {}", unit);
        };
        check(DateTimeUnits::Year, "2021-01-01 00:00:00");
        check(DateTimeUnits::Quarter, "2021-07-01 00:00:00");
        check(DateTimeUnits::Month, "2021-08-01 00:00:00");
        check(DateTimeUnits::Day, "2021-08-17 00:00:00");
        check(DateTimeUnits::Hour, "2021-08-17 13:00:00");
        check(DateTimeUnits::Minute, "2021-08-17 13:45:00");
        check(DateTimeUnits::Second, "2021-08-17 13:45:30");
    }

    #[test]
    fn test_date_ceil() {
        let ts = NaiveDate::from_ymd_opt(2021, 8, 17)
            .unwrap()
            .and_hms_opt(13, 45, 30)
            .unwrap();
        assert_eq!(
            date_ceil(ts, DateTimeUnits::Hour).unwrap().to_string(),
            "2021-08-17 14:00:00"
        );
        assert_eq!(
            date_ceil(ts, DateTimeUnits::Year).unwrap().to_string(),
            "2022-01-01 00:00:00"
        );
        let on_boundary = NaiveDate::from_ymd_opt(2021, 8, 17)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap();
        assert_eq!(date_ceil(on_boundary, DateTimeUnits::Hour).unwrap(), on_boundary);
    }

    #[test]
    fn test_arith_eval() {
        let eval = |f: BinaryFunc, a, b| f.eval(a, b);
        assert_eq!(
            eval(BinaryFunc::Add, Datum::Int32(1), Datum::Int32(2)),
            Ok(Datum::Int32(3))
        );
        assert_eq!(
            eval(BinaryFunc::Add, Datum::Int16(3), Datum::Int64(4)),
            Ok(Datum::Int64(7))
        );
        assert_eq!(
            eval(BinaryFunc::Div, Datum::Int64(7), Datum::Int64(0)),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(
            eval(BinaryFunc::CheckedAdd, Datum::Int64(i64::MAX), Datum::Int64(1)),
            Err(EvalError::Int64OutOfRange)
        );
        assert_eq!(
            eval(BinaryFunc::Add, Datum::Int64(i64::MAX), Datum::Int64(1)),
            Ok(Datum::Int64(i64::MIN))
        );
        assert_eq!(
            eval(BinaryFunc::Lt, Datum::Int16(3), Datum::Int64(4)),
            Ok(Datum::True)
        );
        assert_eq!(
            eval(BinaryFunc::Eq, Datum::Null, Datum::Int64(4)),
            Ok(Datum::Null)
        );
        assert_eq!(
            eval(BinaryFunc::IsDistinctFrom, Datum::Null, Datum::Int64(4)),
            Ok(Datum::True)
        );
        assert_eq!(
            eval(BinaryFunc::IsNotDistinctFrom, Datum::Null, Datum::Null),
            Ok(Datum::True)
        );
    }

    #[test]
    fn test_cast_datum() {
        let to = |t: ScalarType| t.nullable(true);
        assert_eq!(
            cast_datum(&Datum::Int64(7), &to(ScalarType::Int16), false),
            Ok(Datum::Int16(7))
        );
        assert_eq!(
            cast_datum(&Datum::Int64(1 << 40), &to(ScalarType::Int32), false),
            Err(EvalError::Int32OutOfRange)
        );
        assert_eq!(
            cast_datum(&Datum::Int64(1 << 40), &to(ScalarType::Int32), true),
            Ok(Datum::Null)
        );
        assert_eq!(
            cast_datum(&Datum::from("12"), &to(ScalarType::Int64), false),
            Ok(Datum::Int64(12))
        );
        assert_eq!(
            cast_datum(&Datum::Int64(12), &to(ScalarType::String), false),
            Ok(Datum::from("12"))
        );
        assert_eq!(
            cast_datum(&Datum::Null, &to(ScalarType::Int64), false),
            Ok(Datum::Null)
        );
    }
}
