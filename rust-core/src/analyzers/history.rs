//! Fixed-capacity history of scalar analysis values

/// Ring of the most recent values with allocation-free statistics
pub struct History {
    values: Vec<f64>,
    head: usize,
    len: usize,
    scratch: Vec<f64>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: vec![0.0; capacity],
            head: 0,
            len: 0,
            scratch: vec![0.0; capacity],
        }
    }

    /// Append a value, overwriting the oldest once full
    pub fn push(&mut self, value: f64) {
        self.values[self.head] = value;
        self.head = (self.head + 1) % self.values.len();
        self.len = (self.len + 1).min(self.values.len());
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Value `age` steps back from the newest (0 = newest)
    pub fn recent(&self, age: usize) -> Option<f64> {
        if age >= self.len {
            return None;
        }
        let cap = self.values.len();
        Some(self.values[(self.head + cap - 1 - age) % cap])
    }

    /// Copy the stored values, oldest first, into `out[..len]`
    pub fn copy_chronological(&self, out: &mut [f64]) -> usize {
        let cap = self.values.len();
        let start = (self.head + cap - self.len) % cap;
        for (i, o) in out.iter_mut().take(self.len).enumerate() {
            *o = self.values[(start + i) % cap];
        }
        self.len
    }

    /// Arithmetic mean of the stored values (0 when empty)
    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        (0..self.len).filter_map(|age| self.recent(age)).sum::<f64>() / self.len as f64
    }

    /// Median of the stored values (0 when empty)
    pub fn median(&mut self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        let n = self.copy_chronological_into_scratch();
        let mid = n / 2;
        let scratch = &mut self.scratch[..n];
        scratch.select_nth_unstable_by(mid, f64::total_cmp);
        let upper = scratch[mid];
        if n % 2 == 1 {
            upper
        } else {
            let lower = scratch[..mid]
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            0.5 * (lower + upper)
        }
    }

    fn copy_chronological_into_scratch(&mut self) -> usize {
        let cap = self.values.len();
        let start = (self.head + cap - self.len) % cap;
        for i in 0..self.len {
            self.scratch[i] = self.values[(start + i) % cap];
        }
        self.len
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}
