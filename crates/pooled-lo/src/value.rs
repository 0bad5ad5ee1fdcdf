use core::fmt;

/// An integral type that identifiers can be allocated in.
///
/// This is the value-type counterpart of a mutable numeric holder: every
/// operation returns a new value instead of mutating shared state. Copying
/// and comparison come from the `Copy + Ord` supertraits.
pub trait IntegralValue:
    Copy + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Zero for this type.
    const ZERO: Self;
    /// One for this type. Identifiers are never handed out below this.
    const ONE: Self;
    /// Largest representable value.
    const MAX: Self;

    /// Adds `n`, returning `None` if the result does not fit.
    fn checked_add_size(self, n: u32) -> Option<Self>;

    /// Adds `n`, clamping at the type's maximum.
    fn saturating_add_size(self, n: u32) -> Self;

    /// Widens the value for diagnostics.
    fn to_i128(self) -> i128;
}

macro_rules! impl_integral_value {
    ($($int:ty),* $(,)?) => {
        $(
            impl IntegralValue for $int {
                const ZERO: Self = 0;
                const ONE: Self = 1;
                const MAX: Self = <$int>::MAX;

                #[inline]
                fn checked_add_size(self, n: u32) -> Option<Self> {
                    <$int>::try_from(n).ok().and_then(|n| self.checked_add(n))
                }

                #[inline]
                fn saturating_add_size(self, n: u32) -> Self {
                    match <$int>::try_from(n) {
                        Ok(n) => self.saturating_add(n),
                        Err(_) => <$int>::MAX,
                    }
                }

                #[inline]
                #[allow(clippy::cast_lossless, clippy::cast_possible_wrap, clippy::unnecessary_cast)]
                fn to_i128(self) -> i128 {
                    self as i128
                }
            }
        )*
    };
}

impl_integral_value!(i32, i64, i128, u32, u64);
