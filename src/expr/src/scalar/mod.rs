// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeSet;
use std::fmt;
use std::mem;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use tern_repr::{ColumnType, Datum, RelationType, ScalarType};

use self::func::{AggregateFunc, BinaryFunc, NullaryFunc, UnaryFunc, VariadicFunc, WindowFrame};

pub mod func;

/// An immutable scalar expression over the columns of a single input row.
#[derive(
    Ord, PartialOrd, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub enum ScalarExpr {
    /// A column of the input row.
    Column(usize),
    /// A literal value. Errors raised while folding constants are carried
    /// here as values, to be raised if the expression is ever evaluated.
    Literal(Result<Datum, EvalError>, ColumnType),
    /// A function call that takes no arguments. Opaque to the simplifier.
    CallNullary(NullaryFunc),
    /// A function call that takes one expression as an argument.
    CallUnary {
        func: UnaryFunc,
        expr: Box<ScalarExpr>,
    },
    /// A function call that takes two expressions as arguments.
    CallBinary {
        func: BinaryFunc,
        expr1: Box<ScalarExpr>,
        expr2: Box<ScalarExpr>,
    },
    /// A function call that takes an arbitrary number of arguments.
    CallVariadic {
        func: VariadicFunc,
        exprs: Vec<ScalarExpr>,
    },
    /// Conditionally evaluated expressions.
    ///
    /// It is important that `then` and `els` only be evaluated if `cond` is
    /// true or not, respectively. This is the only way users can guard
    /// execution (other logical operators do not short-circuit), and
    /// rewrites must preserve it.
    If {
        cond: Box<ScalarExpr>,
        then: Box<ScalarExpr>,
        els: Box<ScalarExpr>,
    },
    /// An aggregate over the expression, windowed if `window` is set. Opaque
    /// to the simplifier except for measure lowering.
    Aggregate {
        func: AggregateFunc,
        expr: Box<ScalarExpr>,
        window: Option<WindowFrame>,
    },
    /// A dynamic parameter, bound at execution time. Opaque to the
    /// simplifier.
    Parameter(usize, ColumnType),
}

impl ScalarExpr {
    pub fn column(column: usize) -> Self {
        ScalarExpr::Column(column)
    }

    /// A literal with the given result and scalar type. The type's
    /// nullability records exactly whether the value is NULL.
    pub fn literal(res: Result<Datum, EvalError>, typ: ScalarType) -> Self {
        let typ = typ.nullable(matches!(res, Ok(Datum::Null)));
        ScalarExpr::Literal(res, typ)
    }

    pub fn literal_ok(datum: Datum, typ: ScalarType) -> Self {
        ScalarExpr::literal(Ok(datum), typ)
    }

    pub fn literal_null(typ: ScalarType) -> Self {
        ScalarExpr::literal_ok(Datum::Null, typ)
    }

    pub fn literal_true() -> Self {
        ScalarExpr::literal_ok(Datum::True, ScalarType::Bool)
    }

    pub fn literal_false() -> Self {
        ScalarExpr::literal_ok(Datum::False, ScalarType::Bool)
    }

    pub fn call_unary(self, func: UnaryFunc) -> Self {
        ScalarExpr::CallUnary {
            func,
            expr: Box::new(self),
        }
    }

    pub fn call_binary(self, other: Self, func: BinaryFunc) -> Self {
        ScalarExpr::CallBinary {
            func,
            expr1: Box::new(self),
            expr2: Box::new(other),
        }
    }

    pub fn call_is_null(self) -> Self {
        self.call_unary(UnaryFunc::IsNull)
    }

    pub fn if_then_else(self, t: Self, f: Self) -> Self {
        ScalarExpr::If {
            cond: Box::new(self),
            then: Box::new(t),
            els: Box::new(f),
        }
    }

    pub fn visit1<'a, F>(&'a self, mut f: F)
    where
        F: FnMut(&'a Self),
    {
        match self {
            ScalarExpr::Column(_)
            | ScalarExpr::Literal(_, _)
            | ScalarExpr::CallNullary(_)
            | ScalarExpr::Parameter(_, _) => (),
            ScalarExpr::CallUnary { expr, .. } => {
                f(expr);
            }
            ScalarExpr::CallBinary { expr1, expr2, .. } => {
                f(expr1);
                f(expr2);
            }
            ScalarExpr::CallVariadic { exprs, .. } => {
                for expr in exprs {
                    f(expr);
                }
            }
            ScalarExpr::If { cond, then, els } => {
                f(cond);
                f(then);
                f(els);
            }
            ScalarExpr::Aggregate { expr, .. } => {
                f(expr);
            }
        }
    }

    pub fn visit<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Self),
    {
        self.visit1(|e| e.visit(f));
        f(self);
    }

    pub fn visit1_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Self),
    {
        match self {
            ScalarExpr::Column(_)
            | ScalarExpr::Literal(_, _)
            | ScalarExpr::CallNullary(_)
            | ScalarExpr::Parameter(_, _) => (),
            ScalarExpr::CallUnary { expr, .. } => {
                f(expr);
            }
            ScalarExpr::CallBinary { expr1, expr2, .. } => {
                f(expr1);
                f(expr2);
            }
            ScalarExpr::CallVariadic { exprs, .. } => {
                for expr in exprs {
                    f(expr);
                }
            }
            ScalarExpr::If { cond, then, els } => {
                f(cond);
                f(then);
                f(els);
            }
            ScalarExpr::Aggregate { expr, .. } => {
                f(expr);
            }
        }
    }

    pub fn visit_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Self),
    {
        self.visit1_mut(|e| e.visit_mut(f));
        f(self);
    }

    /// The set of columns this expression references.
    pub fn support(&self) -> BTreeSet<usize> {
        let mut support = BTreeSet::new();
        self.visit(&mut |e| {
            if let ScalarExpr::Column(i) = e {
                support.insert(*i);
            }
        });
        support
    }

    /// Whether repeated evaluations of this expression yield the same
    /// result.
    pub fn is_deterministic(&self) -> bool {
        let mut deterministic = true;
        self.visit(&mut |e| {
            if let ScalarExpr::CallNullary(_) = e {
                deterministic = false;
            }
        });
        deterministic
    }

    pub fn take(&mut self) -> Self {
        mem::replace(self, ScalarExpr::literal_null(ScalarType::String))
    }

    pub fn as_literal(&self) -> Option<Result<&Datum, &EvalError>> {
        if let ScalarExpr::Literal(lit, _column_type) = self {
            Some(lit.as_ref())
        } else {
            None
        }
    }

    pub fn as_literal_str(&self) -> Option<&str> {
        match self.as_literal() {
            Some(Ok(Datum::String(s))) => Some(s),
            _ => None,
        }
    }

    pub fn as_literal_err(&self) -> Option<&EvalError> {
        self.as_literal().and_then(|lit| lit.err())
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, ScalarExpr::Literal(_, _))
    }

    pub fn is_literal_true(&self) -> bool {
        matches!(self, ScalarExpr::Literal(Ok(Datum::True), _))
    }

    pub fn is_literal_false(&self) -> bool {
        matches!(self, ScalarExpr::Literal(Ok(Datum::False), _))
    }

    pub fn is_literal_null(&self) -> bool {
        matches!(self, ScalarExpr::Literal(Ok(Datum::Null), _))
    }

    pub fn is_literal_ok(&self) -> bool {
        matches!(self, ScalarExpr::Literal(Ok(_), _))
    }

    pub fn is_literal_err(&self) -> bool {
        matches!(self, ScalarExpr::Literal(Err(_), _))
    }

    /// If self is a column, return the column index, otherwise `None`.
    pub fn as_column(&self) -> Option<usize> {
        if let ScalarExpr::Column(c) = self {
            Some(*c)
        } else {
            None
        }
    }

    /// The type of the value this expression evaluates to, given the types
    /// of the input columns.
    pub fn typ(&self, relation_type: &RelationType) -> ColumnType {
        match self {
            ScalarExpr::Column(i) => relation_type.column_types[*i].clone(),
            ScalarExpr::Literal(_, typ) => typ.clone(),
            ScalarExpr::CallNullary(func) => func.output_type(),
            ScalarExpr::CallUnary { expr, func } => func.output_type(expr.typ(relation_type)),
            ScalarExpr::CallBinary { expr1, expr2, func } => {
                func.output_type(expr1.typ(relation_type), expr2.typ(relation_type))
            }
            ScalarExpr::CallVariadic { exprs, func } => {
                func.output_type(exprs.iter().map(|e| e.typ(relation_type)).collect())
            }
            ScalarExpr::If { cond: _, then, els } => {
                let then_type = then.typ(relation_type);
                let else_type = els.typ(relation_type);
                debug_assert!(then_type.scalar_type.base_eq(&else_type.scalar_type));
                ColumnType {
                    nullable: then_type.nullable || else_type.nullable,
                    scalar_type: then_type.scalar_type,
                }
            }
            ScalarExpr::Aggregate { func, expr, .. } => func.output_type(expr.typ(relation_type)),
            ScalarExpr::Parameter(_, typ) => typ.clone(),
        }
    }

    /// Evaluates this expression over the given row.
    pub fn eval(&self, datums: &[Datum]) -> Result<Datum, EvalError> {
        match self {
            ScalarExpr::Column(index) => Ok(datums[*index].clone()),
            ScalarExpr::Literal(res, _column_type) => res.clone(),
            // Nullary functions are placeholders for data that is not known
            // at plan time; they must be inlined before evaluation.
            ScalarExpr::CallNullary(x) => Err(EvalError::Internal(format!(
                "cannot evaluate nullary function: {:?}",
                x
            ))),
            ScalarExpr::CallUnary { func, expr } => func.eval(expr.eval(datums)?),
            ScalarExpr::CallBinary { func, expr1, expr2 } => {
                func.eval(expr1.eval(datums)?, expr2.eval(datums)?)
            }
            ScalarExpr::CallVariadic { func, exprs } => func.eval(datums, exprs),
            ScalarExpr::If { cond, then, els } => match cond.eval(datums)? {
                Datum::True => then.eval(datums),
                Datum::False | Datum::Null => els.eval(datums),
                d => Err(EvalError::Internal(format!(
                    "if condition evaluated to non-boolean datum: {:?}",
                    d
                ))),
            },
            ScalarExpr::Aggregate { func, .. } => Err(EvalError::Internal(format!(
                "cannot evaluate aggregate function: {:?}",
                func
            ))),
            ScalarExpr::Parameter(i, _) => Err(EvalError::Internal(format!(
                "cannot evaluate unbound parameter: ${}",
                i
            ))),
        }
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use ScalarExpr::*;
        match self {
            Column(i) => write!(f, "#{}", i)?,
            Literal(Ok(datum), _) => write!(f, "{}", datum)?,
            Literal(Err(e), _) => write!(f, "(err: {})", e)?,
            CallNullary(func) => write!(f, "{}()", func)?,
            CallUnary { func, expr } => match func {
                UnaryFunc::Cast { to, safe } => {
                    let op = if *safe { "SAFE_CAST" } else { "CAST" };
                    write!(f, "{}({} AS {:?})", op, expr, to.scalar_type)?;
                }
                UnaryFunc::Search(sarg) => write!(f, "SEARCH({}, {})", expr, sarg)?,
                _ => write!(f, "{}({})", func, expr)?,
            },
            CallBinary { func, expr1, expr2 } => {
                if func.is_infix_op() {
                    write!(f, "({} {} {})", expr1, func, expr2)?;
                } else {
                    write!(f, "{}({}, {})", func, expr1, expr2)?;
                }
            }
            CallVariadic { func, exprs } => {
                write!(f, "{}({})", func, exprs.iter().join(", "))?;
            }
            If { cond, then, els } => {
                write!(f, "if {} then {{{}}} else {{{}}}", cond, then, els)?;
            }
            Aggregate { func, expr, window } => match window {
                Some(window) => write!(f, "{}({}) OVER ({})", func, expr, window)?,
                None => write!(f, "{}({})", func, expr)?,
            },
            Parameter(i, _) => write!(f, "${}", i)?,
        }
        Ok(())
    }
}

/// An error raised while evaluating an expression.
#[derive(
    Ord, PartialOrd, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub enum EvalError {
    DivisionByZero,
    Int16OutOfRange,
    Int32OutOfRange,
    Int64OutOfRange,
    FloatOverflow,
    NumericFieldOverflow,
    TimestampOutOfRange,
    InvalidCast { from: String, to: String },
    Parse { typ: String, input: String },
    Internal(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvalError::DivisionByZero => f.write_str("division by zero"),
            EvalError::Int16OutOfRange => f.write_str("smallint out of range"),
            EvalError::Int32OutOfRange => f.write_str("integer out of range"),
            EvalError::Int64OutOfRange => f.write_str("bigint out of range"),
            EvalError::FloatOverflow => f.write_str("value out of range: overflow"),
            EvalError::NumericFieldOverflow => f.write_str("numeric field overflow"),
            EvalError::TimestampOutOfRange => f.write_str("timestamp out of range"),
            EvalError::InvalidCast { from, to } => {
                write!(f, "cannot cast {} to type {}", from, to)
            }
            EvalError::Parse { typ, input } => {
                write!(f, "invalid input syntax for type {}: {:?}", typ, input)
            }
            EvalError::Internal(s) => write!(f, "internal error: {}", s),
        }
    }
}

impl std::error::Error for EvalError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation_type() -> RelationType {
        RelationType::new(vec![
            ScalarType::Int64.nullable(true),
            ScalarType::Bool.nullable(true),
            ScalarType::Int64.nullable(false),
        ])
    }

    #[test]
    fn test_typ() {
        let relation_type = relation_type();
        let e = ScalarExpr::column(0).call_binary(
            ScalarExpr::literal_ok(Datum::Int64(5), ScalarType::Int64),
            BinaryFunc::Lt,
        );
        assert_eq!(e.typ(&relation_type), ScalarType::Bool.nullable(true));

        let e = ScalarExpr::column(2).call_is_null();
        assert_eq!(e.typ(&relation_type), ScalarType::Bool.nullable(false));

        let e = ScalarExpr::literal_null(ScalarType::Int64);
        assert_eq!(e.typ(&relation_type), ScalarType::Int64.nullable(true));
    }

    #[test]
    fn test_eval() {
        let datums = vec![Datum::Int64(7), Datum::Null, Datum::Int64(3)];
        let lt = ScalarExpr::column(0).call_binary(
            ScalarExpr::literal_ok(Datum::Int64(5), ScalarType::Int64),
            BinaryFunc::Lt,
        );
        assert_eq!(lt.eval(&datums), Ok(Datum::False));

        // NULL AND FALSE is FALSE, not NULL.
        let e = ScalarExpr::CallVariadic {
            func: VariadicFunc::And,
            exprs: vec![ScalarExpr::column(1), ScalarExpr::literal_false()],
        };
        assert_eq!(e.eval(&datums), Ok(Datum::False));

        // A FALSE conjunct absorbs a sibling error.
        let e = ScalarExpr::CallVariadic {
            func: VariadicFunc::And,
            exprs: vec![
                ScalarExpr::literal(Err(EvalError::DivisionByZero), ScalarType::Bool),
                ScalarExpr::literal_false(),
            ],
        };
        assert_eq!(e.eval(&datums), Ok(Datum::False));

        // IF does not evaluate the untaken branch.
        let e = ScalarExpr::literal_false().if_then_else(
            ScalarExpr::literal(Err(EvalError::DivisionByZero), ScalarType::Int64),
            ScalarExpr::literal_ok(Datum::Int64(2), ScalarType::Int64),
        );
        assert_eq!(e.eval(&datums), Ok(Datum::Int64(2)));

        // x IN (3, NULL) is NULL when x matches nothing.
        let e = ScalarExpr::CallVariadic {
            func: VariadicFunc::In,
            exprs: vec![
                ScalarExpr::column(0),
                ScalarExpr::literal_ok(Datum::Int64(3), ScalarType::Int64),
                ScalarExpr::literal_null(ScalarType::Int64),
            ],
        };
        assert_eq!(e.eval(&datums), Ok(Datum::Null));
    }
}
