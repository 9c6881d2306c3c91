use bigdecimal::BigDecimal;

use crate::combiners::{CombineFn, DecimalAcc};

/* ===================== Sum ===================== */

#[derive(Clone, Copy, Debug, Default)]
pub struct Sum;

impl CombineFn<DecimalAcc, DecimalAcc, DecimalAcc> for Sum {
    fn create(&self) -> DecimalAcc {
        None
    }

    fn add_input(&self, acc: &mut DecimalAcc, v: DecimalAcc) {
        if let Some(v) = v {
            *acc = Some(acc.take().unwrap_or_default() + v);
        }
    }

    fn finish(&self, acc: DecimalAcc) -> DecimalAcc {
        Some(acc.unwrap_or_default())
    }
}

/* ===================== Min / Max ===================== */

fn keep_extreme(acc: &mut DecimalAcc, v: DecimalAcc, replace: impl Fn(&BigDecimal, &BigDecimal) -> bool) {
    let Some(v) = v else { return };
    match acc {
        Some(cur) if !replace(&v, cur) => {}
        _ => *acc = Some(v),
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Min;

impl CombineFn<DecimalAcc, DecimalAcc, DecimalAcc> for Min {
    fn create(&self) -> DecimalAcc {
        None
    }

    fn add_input(&self, acc: &mut DecimalAcc, v: DecimalAcc) {
        keep_extreme(acc, v, |new, cur| new < cur);
    }

    fn finish(&self, acc: DecimalAcc) -> DecimalAcc {
        acc
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Max;

impl CombineFn<DecimalAcc, DecimalAcc, DecimalAcc> for Max {
    fn create(&self) -> DecimalAcc {
        None
    }

    fn add_input(&self, acc: &mut DecimalAcc, v: DecimalAcc) {
        keep_extreme(acc, v, |new, cur| new > cur);
    }

    fn finish(&self, acc: DecimalAcc) -> DecimalAcc {
        acc
    }
}

/* ===================== Count ===================== */

#[derive(Clone, Copy, Debug, Default)]
pub struct Count;

impl CombineFn<DecimalAcc, DecimalAcc, DecimalAcc> for Count {
    fn create(&self) -> DecimalAcc {
        Some(BigDecimal::from(0))
    }

    fn add_input(&self, acc: &mut DecimalAcc, _v: DecimalAcc) {
        *acc = Some(acc.take().unwrap_or_default() + BigDecimal::from(1));
    }

    fn finish(&self, acc: DecimalAcc) -> DecimalAcc {
        Some(acc.unwrap_or_default())
    }
}
