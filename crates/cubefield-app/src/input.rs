//! Rotation input shared between an input thread and the render thread.

use std::sync::atomic::{AtomicU32, Ordering};

/// Accumulated rotation deltas in degrees, stored as `f32` bit patterns.
///
/// Writers add with a compare-and-swap loop; the render thread takes and
/// resets both axes once per frame. The two axes are independent, so a
/// frame may see one axis of a concurrent update before the other.
#[derive(Debug, Default)]
pub struct RotationDeltas {
    delta_x: AtomicU32,
    delta_y: AtomicU32,
}

impl RotationDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate a drag of `dx`, `dy` degrees.
    pub fn add(&self, dx: f32, dy: f32) {
        add_f32(&self.delta_x, dx);
        add_f32(&self.delta_y, dy);
    }

    /// Current totals without resetting.
    pub fn peek(&self) -> (f32, f32) {
        (
            f32::from_bits(self.delta_x.load(Ordering::Acquire)),
            f32::from_bits(self.delta_y.load(Ordering::Acquire)),
        )
    }

    /// Return the totals and reset them to zero.
    pub fn take(&self) -> (f32, f32) {
        let zero = 0.0f32.to_bits();
        (
            f32::from_bits(self.delta_x.swap(zero, Ordering::AcqRel)),
            f32::from_bits(self.delta_y.swap(zero, Ordering::AcqRel)),
        )
    }
}

fn add_f32(cell: &AtomicU32, delta: f32) {
    // The closure always returns Some, so this cannot fail.
    let _ = cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
        Some((f32::from_bits(bits) + delta).to_bits())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_take_resets() {
        let deltas = RotationDeltas::new();
        deltas.add(1.5, -2.0);
        deltas.add(0.5, 1.0);
        assert_eq!(deltas.peek(), (2.0, -1.0));
        assert_eq!(deltas.take(), (2.0, -1.0));
        assert_eq!(deltas.take(), (0.0, 0.0));
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let deltas = Arc::new(RotationDeltas::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let deltas = Arc::clone(&deltas);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        deltas.add(1.0, 0.5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(deltas.take(), (4000.0, 2000.0));
    }
}
