//! Integer log-domain arithmetic.
//!
//! Probabilities are stored as `floor(log_base(p)) >> shift`. Addition of two
//! probabilities becomes `max(x, y) + log_base(1 + base^-|x - y|)`, where the
//! correction term is read from a precomputed table.

use crate::error::{DecodeError, DecodeResult};
use tracing::debug;

#[derive(Debug, Clone)]
enum AddTable {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl AddTable {
    fn with_width(width: usize, len: usize) -> Self {
        match width {
            1 => AddTable::U8(vec![0; len]),
            2 => AddTable::U16(vec![0; len]),
            _ => AddTable::U32(vec![0; len]),
        }
    }

    #[inline(always)]
    fn len(&self) -> usize {
        match self {
            AddTable::U8(t) => t.len(),
            AddTable::U16(t) => t.len(),
            AddTable::U32(t) => t.len(),
        }
    }

    #[inline(always)]
    fn get(&self, idx: usize) -> i32 {
        match self {
            AddTable::U8(t) => t[idx] as i32,
            AddTable::U16(t) => t[idx] as i32,
            AddTable::U32(t) => t[idx] as i32,
        }
    }

    fn set(&mut self, idx: usize, val: i32) {
        match self {
            AddTable::U8(t) => t[idx] = val as u8,
            AddTable::U16(t) => t[idx] = val as u16,
            AddTable::U32(t) => t[idx] = val as u32,
        }
    }

    fn width(&self) -> usize {
        match self {
            AddTable::U8(_) => 1,
            AddTable::U16(_) => 2,
            AddTable::U32(_) => 4,
        }
    }
}

/// Quantized log-domain context. Immutable once built.
#[derive(Debug, Clone)]
pub struct LogMath {
    base: f64,
    log_of_base: f64,
    log10_of_base: f64,
    inv_log_of_base: f64,
    inv_log10_of_base: f64,
    shift: u32,
    zero: i32,
    table: Option<AddTable>,
}

impl LogMath {
    pub fn new(base: f64, shift: u32, use_table: bool) -> DecodeResult<Self> {
        if !(base > 1.0) {
            return Err(DecodeError::Config(format!(
                "log base must be greater than 1.0, got {}",
                base
            )));
        }
        if shift > 29 {
            return Err(DecodeError::Config(format!(
                "log shift {} leaves no integer range",
                shift
            )));
        }

        let log_of_base = base.ln();
        let log10_of_base = base.log10();
        let mut lmath = LogMath {
            base,
            log_of_base,
            log10_of_base,
            inv_log_of_base: 1.0 / log_of_base,
            inv_log10_of_base: 1.0 / log10_of_base,
            shift,
            zero: i32::MIN >> (shift + 2),
            table: None,
        };

        if use_table {
            lmath.table = Some(lmath.build_table());
        }
        Ok(lmath)
    }

    /// Correction for a (pre-shift) difference of `i` units, rounded to the
    /// shifted domain. `byx` is `base^-i`.
    #[inline]
    fn correction(&self, byx: f64) -> i32 {
        let lobyx = (1.0 + byx).ln() * self.inv_log_of_base;
        (lobyx + 0.5 * (1u64 << self.shift) as f64) as i32 >> self.shift
    }

    fn build_table(&self) -> AddTable {
        // Largest correction is log_base(2).
        let maxyx = ((2.0f64.ln() / self.log_of_base + 0.5) as u32) >> self.shift;
        let width = if maxyx < 256 {
            1
        } else if maxyx < 65536 {
            2
        } else {
            4
        };

        // Count steps until the correction rounds to zero.
        let mut byx = 1.0;
        let mut steps: usize = 0;
        loop {
            if self.correction(byx) <= 0 {
                break;
            }
            byx /= self.base;
            steps += 1;
        }
        let len = (steps >> self.shift).max(255) + 1;

        let mut table = AddTable::with_width(width, len);
        let mut byx = 1.0;
        for i in 0..=steps {
            let k = self.correction(byx);
            // Several unshifted steps share one slot; keep the first (largest).
            let idx = i >> self.shift;
            if table.get(idx) == 0 {
                table.set(idx, k);
            }
            byx /= self.base;
        }

        debug!(
            "log-add table: base {} shift {} -> {} entries of {} bytes",
            self.base, self.shift, len, width
        );
        table
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Multiplier taking natural logs to (unshifted) base logs.
    pub fn inv_log_of_base(&self) -> f64 {
        self.inv_log_of_base
    }

    /// Additive identity (log of zero).
    pub fn zero(&self) -> i32 {
        self.zero
    }

    pub fn table_width(&self) -> Option<usize> {
        self.table.as_ref().map(AddTable::width)
    }

    pub fn table_len(&self) -> usize {
        self.table.as_ref().map_or(0, AddTable::len)
    }

    /// Raw correction entry, if the table exists and covers `idx`.
    pub fn table_entry(&self, idx: usize) -> Option<i32> {
        self.table
            .as_ref()
            .filter(|t| idx < t.len())
            .map(|t| t.get(idx))
    }

    pub fn log(&self, p: f64) -> i32 {
        if p <= 0.0 {
            return self.zero;
        }
        ((p.ln() * self.inv_log_of_base) as i32) >> self.shift
    }

    pub fn exp(&self, logb_x: i32) -> f64 {
        self.base.powf(self.unshift(logb_x))
    }

    #[inline]
    fn unshift(&self, logb_x: i32) -> f64 {
        logb_x as f64 * (1u64 << self.shift) as f64
    }

    pub fn ln_to_log(&self, log_p: f64) -> i32 {
        ((log_p * self.inv_log_of_base) as i32) >> self.shift
    }

    pub fn log_to_ln(&self, logb_p: i32) -> f64 {
        self.unshift(logb_p) * self.log_of_base
    }

    pub fn log10_to_log(&self, log_p: f64) -> i32 {
        ((log_p * self.inv_log10_of_base) as i32) >> self.shift
    }

    pub fn log_to_log10(&self, logb_p: i32) -> f64 {
        self.unshift(logb_p) * self.log10_of_base
    }

    /// `log(base^x + base^y)`.
    #[inline]
    pub fn add(&self, logb_x: i32, logb_y: i32) -> i32 {
        if logb_x <= self.zero {
            return logb_y;
        }
        if logb_y <= self.zero {
            return logb_x;
        }
        let Some(table) = &self.table else {
            return self.add_exact(logb_x, logb_y);
        };

        let (d, r) = if logb_x > logb_y {
            (logb_x as i64 - logb_y as i64, logb_x)
        } else {
            (logb_y as i64 - logb_x as i64, logb_y)
        };
        // The final table entry is zero, so past it the larger value stands.
        if d as u64 >= table.len() as u64 {
            return r;
        }
        r.saturating_add(table.get(d as usize))
    }

    pub fn add_exact(&self, logb_p: i32, logb_q: i32) -> i32 {
        self.log(self.exp(logb_p) + self.exp(logb_q))
    }

    /// Log-add over negated values (costs): smaller is more probable, and the
    /// correction is subtracted.
    #[inline]
    pub fn fast_add_cost(&self, cost_x: i32, cost_y: i32) -> i32 {
        let (d, r) = if cost_x > cost_y {
            (cost_x as i64 - cost_y as i64, cost_y)
        } else {
            (cost_y as i64 - cost_x as i64, cost_x)
        };
        match &self.table {
            Some(table) if (d as u64) < table.len() as u64 => r - table.get(d as usize),
            Some(_) => r,
            None => -self.add_exact(-cost_x, -cost_y),
        }
    }
}
