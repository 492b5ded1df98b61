// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Units of date and time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unit of a date or a time, ordered from coarsest to finest.
///
/// `Quarter` sits between `Year` and `Month` but is not itself a power of any
/// finer unit; code that reasons about unit containment must treat it
/// specially.
#[derive(
    Ord, PartialOrd, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash,
)]
pub enum DateTimeUnits {
    Year,
    Quarter,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Milliseconds,
    Microseconds,
}

impl fmt::Display for DateTimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DateTimeUnits::Year => f.write_str("year"),
            DateTimeUnits::Quarter => f.write_str("quarter"),
            DateTimeUnits::Month => f.write_str("month"),
            DateTimeUnits::Day => f.write_str("day"),
            DateTimeUnits::Hour => f.write_str("hour"),
            DateTimeUnits::Minute => f.write_str("minute"),
            DateTimeUnits::Second => f.write_str("second"),
            DateTimeUnits::Milliseconds => f.write_str("milliseconds"),
            DateTimeUnits::Microseconds => f.write_str("microseconds"),
        }
    }
}
