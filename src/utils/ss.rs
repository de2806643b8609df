use std::collections::VecDeque;

use ndarray::{Array1, ArrayView1};

/// Per-feature mean and variance over a stream of observations.
///
/// Global mode keeps Welford running sums over everything seen; windowed mode
/// keeps the last `window_len` observations and recomputes from them.
#[derive(Debug, Clone)]
pub struct StreamStatistic {
    is_global: bool,
    window_len: usize,
    window: VecDeque<Array1<f64>>,
    num_items: usize,
    mean: Array1<f64>,
    sum_squares: Array1<f64>,
}

impl StreamStatistic {
    /// Statistics over the whole stream.
    pub fn global(n_features: usize) -> Self {
        StreamStatistic {
            is_global: true,
            window_len: 0,
            window: VecDeque::new(),
            num_items: 0,
            mean: Array1::zeros(n_features),
            sum_squares: Array1::zeros(n_features),
        }
    }

    /// Statistics over the last `window_len` observations (at least 1).
    pub fn windowed(n_features: usize, window_len: usize) -> Self {
        let window_len = window_len.max(1);
        StreamStatistic {
            is_global: false,
            window_len,
            window: VecDeque::with_capacity(window_len),
            num_items: 0,
            mean: Array1::zeros(n_features),
            sum_squares: Array1::zeros(n_features),
        }
    }

    pub fn update(&mut self, x: ArrayView1<'_, f64>) {
        self.num_items += 1;

        if self.is_global {
            let n = self.num_items as f64;
            for ((m, ss), &item) in self.mean.iter_mut().zip(self.sum_squares.iter_mut()).zip(x.iter()) {
                let old_mean = *m;
                *m += (item - old_mean) / n;
                *ss += (item - old_mean) * (item - *m);
            }
            return;
        }

        if self.window.len() == self.window_len {
            self.window.pop_front();
        }
        self.window.push_back(x.to_owned());

        let n = self.window.len() as f64;
        self.mean.fill(0.0);
        for item in &self.window {
            self.mean += item;
        }
        self.mean /= n;

        self.sum_squares.fill(0.0);
        for item in &self.window {
            let diff = item - &self.mean;
            self.sum_squares += &(&diff * &diff);
        }
    }

    /// Number of observations currently contributing to the statistics.
    pub fn len(&self) -> usize {
        if self.is_global {
            self.num_items
        } else {
            self.window.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of observations ever pushed.
    pub fn count(&self) -> usize {
        self.num_items
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Population variance; zero until something is observed.
    pub fn var(&self) -> Array1<f64> {
        let n = self.len();
        if n == 0 {
            return Array1::zeros(self.mean.len());
        }
        &self.sum_squares / n as f64
    }

    pub fn std(&self) -> Array1<f64> {
        self.var().mapv(f64::sqrt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_global_mean_var() {
        let mut s = StreamStatistic::global(2);
        for x in [array![1.0, 10.0], array![2.0, 20.0], array![3.0, 30.0], array![4.0, 40.0]] {
            s.update(x.view());
        }
        assert_eq!(s.count(), 4);
        assert!((s.mean()[0] - 2.5).abs() < 1e-12);
        assert!((s.mean()[1] - 25.0).abs() < 1e-12);
        assert!((s.var()[0] - 1.25).abs() < 1e-12);
        assert!((s.var()[1] - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_windowed_forgets_old_values() {
        let mut s = StreamStatistic::windowed(1, 2);
        for v in [100.0, 1.0, 3.0] {
            s.update(array![v].view());
        }
        assert_eq!(s.len(), 2);
        assert_eq!(s.count(), 3);
        assert!((s.mean()[0] - 2.0).abs() < 1e-12);
        assert!((s.var()[0] - 1.0).abs() < 1e-12);
        assert!((s.std()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_var_is_zero() {
        let s = StreamStatistic::windowed(3, 5);
        assert!(s.is_empty());
        assert_eq!(s.var(), Array1::<f64>::zeros(3));
    }
}
