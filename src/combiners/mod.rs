//! Decimal accumulators used by [`Aggregation`](crate::transforms::Aggregation).
//!
//! Each combiner implements [`CombineFn`] over `Option<BigDecimal>`: `None`
//! stands for SQL NULL on input and "no value yet" in the accumulator.
//!
//! - [`Sum`] -- running total, skipping nulls; an all-null group sums to zero.
//! - [`Min`] / [`Max`] -- running extreme, skipping nulls; stays null if
//!   every value was null.
//! - [`Count`] -- number of rows, nulls included.

mod basic;

pub use basic::{Count, Max, Min, Sum};

use bigdecimal::BigDecimal;

/// Accumulator contract: build an empty accumulator, fold inputs into it,
/// and produce the output.
pub trait CombineFn<V, A, O>: Send + Sync + 'static {
    fn create(&self) -> A;
    fn add_input(&self, acc: &mut A, v: V);
    fn finish(&self, acc: A) -> O;
}

/// Nullable decimal accumulator shared by the built-in combiners.
pub type DecimalAcc = Option<BigDecimal>;

/// Object-safe combiner over nullable decimals.
pub type DecimalCombiner = dyn CombineFn<DecimalAcc, DecimalAcc, DecimalAcc>;
