// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Core expression language and its simplifier.
//!
//! The central type is [`ScalarExpr`], an immutable typed expression tree
//! over the values of [`tern_repr`]. [`Simplifier`] rewrites such trees into
//! equivalent, usually smaller ones under a declared three-valued-logic
//! interpretation ([`UnknownAs`]) of their result, optionally consulting a
//! [`predicates::PredicateList`] of facts known to hold on the input.

#![warn(missing_debug_implementations)]

mod scalar;

pub mod interpret;
pub mod predicates;
pub mod sarg;
pub mod simplify;
pub mod strong;

pub use scalar::func::{
    build_like_regex, like_matches, AggregateFunc, BinaryFunc, NullaryFunc, UnaryFunc,
    VariadicFunc, WindowBound, WindowFrame,
};
pub use scalar::{EvalError, ScalarExpr};

pub use sarg::{Range, RangeSet, Sarg, UnknownAs};
pub use simplify::{EvalExecutor, Executor, Simplifier};
