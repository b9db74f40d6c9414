//! Trailing-window smoothers for the elbow angle series.
//!
//! A trailing window of `n` samples reports each frame's centered value about
//! `n / 2` frames late. [`Smoother::flush`] recovers the frames still lagging
//! when the stream ends by re-evaluating them on windows truncated at the end.

use std::collections::VecDeque;

use statrs::statistics::{Data, Median, Statistics};

use crate::config::{SmoothingConfig, SmoothingMethod};

/// Causal smoother over the last `window_size` valid samples.
#[derive(Debug, Clone)]
pub struct Smoother {
    method: SmoothingMethod,
    window: VecDeque<f64>,
    capacity: usize,
    alpha: f64,
    ema: Option<f64>,
}

impl Smoother {
    pub fn new(config: &SmoothingConfig) -> Self {
        let capacity = config.window_size.max(1);
        Self {
            method: config.method,
            window: VecDeque::with_capacity(capacity),
            capacity,
            alpha: config.ema_alpha,
            ema: None,
        }
    }

    /// Add a valid sample and return the smoothed value.
    pub fn push(&mut self, value: f64) -> f64 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);

        match self.method {
            SmoothingMethod::Exponential => {
                let next = match self.ema {
                    Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
                    None => value,
                };
                self.ema = Some(next);
                next
            }
            SmoothingMethod::Median | SmoothingMethod::MovingAverage => self.window_value(),
        }
    }

    /// Smoothed values for the frames still behind the window centre, oldest
    /// first, then forget all history.
    ///
    /// Each value drops the oldest sample from the window, so the last one
    /// covers just the final `window_size / 2 + 1` samples. Exponential
    /// smoothing has no window and yields nothing.
    pub fn flush(&mut self) -> Vec<f64> {
        let lag = match self.method {
            SmoothingMethod::Exponential => 0,
            SmoothingMethod::Median | SmoothingMethod::MovingAverage => {
                (self.capacity / 2).min(self.window.len().saturating_sub(1))
            }
        };

        let mut tail = Vec::with_capacity(lag);
        for _ in 0..lag {
            self.window.pop_front();
            tail.push(self.window_value());
        }
        self.reset();
        tail
    }

    fn window_value(&self) -> f64 {
        match self.method {
            SmoothingMethod::MovingAverage => self.window.iter().mean(),
            _ => Data::new(self.window.iter().copied().collect::<Vec<f64>>()).median(),
        }
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.window.clear();
        self.ema = None;
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
