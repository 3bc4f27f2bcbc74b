//! Fixed-Size Paired Ring Buffer for Moving Averages
//!
//! ## Overview
//!
//! The acquisition task produces one value per channel per cycle. Telemetry
//! publishes the moving average of the last `N` cycles of both channels. This
//! module provides the storage for that window: two fixed arrays sharing one
//! write cursor, sized at compile time through const generics.
//!
//! ## Design Rationale
//!
//! ### Why One Cursor?
//!
//! Both channels are pushed together under the same lock, so slot `i` of one
//! channel always belongs to the same cycle as slot `i` of the other. A shared
//! cursor makes that pairing structural instead of something two buffers have
//! to keep in step.
//!
//! ### Why Divide by `N`?
//!
//! The average is always `sum / N`, including slots that have not been written
//! yet (they hold zero). Clients compare the startup ramp against this
//! behaviour, so it is kept as-is rather than dividing by the fill level.
//!
//! ### Memory Layout
//!
//! ```text
//! SampleRing<5>:
//! ch1  ┌─────┬─────┬─────┬─────┬─────┐
//!      │ a0  │ a1  │ a2  │ 0.0 │ 0.0 │
//!      └─────┴─────┴─────┴─────┴─────┘
//! ch2  ┌─────┬─────┬─────┬─────┬─────┐
//!      │ b0  │ b1  │ b2  │ 0.0 │ 0.0 │
//!      └─────┴─────┴─────┴─────┴─────┘
//!                          ↑
//!                          └── cursor = 3
//!
//! Total size = 8 * N + 16 bytes
//! ```
//!
//! ## Usage Example
//!
//! ```rust
//! use fieldnode_core::buffer::{Slot, SampleRing};
//!
//! let mut ring: SampleRing<10> = SampleRing::new();
//! for v in 1..=5 {
//!     ring.push_pair(v as f32, 0.0);
//! }
//!
//! // Unwritten slots count as zero
//! assert_eq!(ring.average(Slot::Primary), 1.5);
//! ```

/// Which half of a [`SampleRing`] to address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// First ADC channel (shunt differential)
    Primary,
    /// Second ADC channel (auxiliary input)
    Secondary,
}

/// Two-channel circular buffer with overwrite-oldest semantics
///
/// ## Internal Invariants
///
/// - `cursor < N`
/// - `filled <= N`
/// - slot `i` of both arrays was written in the same `push_pair` call
///
/// ## Thread Safety
///
/// Not thread-safe. The node keeps it inside the telemetry mutex.
#[derive(Clone, Debug)]
pub struct SampleRing<const N: usize> {
    primary: [f32; N],
    secondary: [f32; N],
    cursor: usize,
    filled: usize,
}

impl<const N: usize> SampleRing<N> {
    /// Creates a ring with every slot zeroed
    pub const fn new() -> Self {
        Self {
            primary: [0.0; N],
            secondary: [0.0; N],
            cursor: 0,
            filled: 0,
        }
    }

    /// Store one cycle's pair, overwriting the oldest pair when full
    pub fn push_pair(&mut self, primary: f32, secondary: f32) {
        self.primary[self.cursor] = primary;
        self.secondary[self.cursor] = secondary;
        self.cursor = (self.cursor + 1) % N;

        if self.filled < N {
            self.filled += 1;
        }
    }

    /// Moving average of one channel over the whole window
    pub fn average(&self, slot: Slot) -> f32 {
        let sum: f32 = self.channel(slot).iter().sum();
        sum / N as f32
    }

    /// Raw slots of one channel in physical order
    pub fn channel(&self, slot: Slot) -> &[f32; N] {
        match slot {
            Slot::Primary => &self.primary,
            Slot::Secondary => &self.secondary,
        }
    }

    /// Number of pairs written so far, capped at `N`
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Most recent pair
    pub fn latest(&self) -> Option<(f32, f32)> {
        if self.is_empty() {
            return None;
        }
        let idx = if self.cursor == 0 { N - 1 } else { self.cursor - 1 };
        Some((self.primary[idx], self.secondary[idx]))
    }

    /// Zero every slot
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl<const N: usize> Default for SampleRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
