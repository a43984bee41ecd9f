// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Efficient storage for rolling snapshot history.

/// A fixed-size circular buffer for storing samples.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    data: [Option<T>; N],
    index: usize,
    count: usize,
}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    /// Creates a new, empty ring buffer.
    pub fn new() -> Self {
        Self {
            data: [None; N],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a new value into the buffer, overwriting the oldest if full.
    pub fn push(&mut self, value: T) {
        self.data[self.index] = Some(value);
        self.index = (self.index + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Returns the number of elements currently in the buffer.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Maximum number of retained elements.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// The most recently pushed value.
    pub fn latest(&self) -> Option<&T> {
        if self.count == 0 {
            return None;
        }
        self.data[(self.index + N - 1) % N].as_ref()
    }

    /// Returns an iterator over the values in chronological order (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (left, right) = self.data.split_at(self.index);
        // Slots after `index` are empty until the buffer wraps; `flatten` skips them.
        right.iter().chain(left.iter()).flatten()
    }

    /// Mean of the newest `window` values minus the mean of the oldest `window` values.
    ///
    /// The two windows overlap while fewer than `2 * window` values are retained.
    /// Returns 0.0 with fewer than two values.
    pub fn window_shift(&self, window: usize, value: impl Fn(&T) -> f64) -> f64 {
        if self.count < 2 || window == 0 {
            return 0.0;
        }
        let window = window.min(self.count);
        let oldest: f64 = self.iter().take(window).map(&value).sum::<f64>() / window as f64;
        let newest: f64 =
            self.iter().skip(self.count - window).map(&value).sum::<f64>() / window as f64;
        newest - oldest
    }

    /// Drops every retained value.
    pub fn clear(&mut self) {
        self.data = [None; N];
        self.index = 0;
        self.count = 0;
    }
}

impl<T: Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
