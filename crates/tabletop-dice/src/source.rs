use rand::Rng;

/// Supplies individual die outcomes.
///
/// Implementations must return a value in `1..=sides`, uniformly distributed.
/// Closures work too, which keeps tests deterministic:
///
/// ```
/// use tabletop_dice::roll;
/// let mut script = [4u32, 5].into_iter();
/// let result = roll("2d6+3", &mut |_sides: u32| script.next().unwrap()).unwrap();
/// assert_eq!(result.total, 12);
/// ```
pub trait RandomSource {
    fn next_roll(&mut self, sides: u32) -> u32;
}

impl<F> RandomSource for F
where
    F: FnMut(u32) -> u32,
{
    fn next_roll(&mut self, sides: u32) -> u32 {
        self(sides)
    }
}

/// Adapts any `rand` generator into a [`RandomSource`].
#[derive(Debug, Clone)]
pub struct RngSource<R>(pub R);

impl<R: Rng> RandomSource for RngSource<R> {
    fn next_roll(&mut self, sides: u32) -> u32 {
        self.0.random_range(1..=sides)
    }
}
