use super::{CyCxHW, Rect};
use crate::common::*;

/// Bounding box in TLBR format, i.e. `(y_min, x_min, y_max, x_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TLBR<T> {
    pub(crate) t: T,
    pub(crate) l: T,
    pub(crate) b: T,
    pub(crate) r: T,
}

impl<T> TLBR<T>
where
    T: Copy + Num + PartialOrd,
{
    /// Clip the box into `[0, h] x [0, w]`.
    pub fn clip(&self, h: T, w: T) -> Self {
        let clamp = |v: T, max: T| {
            if v < T::zero() {
                T::zero()
            } else if v > max {
                max
            } else {
                v
            }
        };

        TLBR {
            t: clamp(self.t, h),
            l: clamp(self.l, w),
            b: clamp(self.b, h),
            r: clamp(self.r, w),
        }
    }
}

impl<T> Rect for TLBR<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn t(&self) -> Self::Type {
        self.t
    }

    fn l(&self) -> Self::Type {
        self.l
    }

    fn b(&self) -> Self::Type {
        self.b
    }

    fn r(&self) -> Self::Type {
        self.r
    }

    fn cy(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.t + self.h() / two
    }

    fn cx(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.l + self.w() / two
    }

    fn h(&self) -> Self::Type {
        self.b - self.t
    }

    fn w(&self) -> Self::Type {
        self.r - self.l
    }

    fn try_from_cycxhw(cycxhw: [Self::Type; 4]) -> Result<Self> {
        let [cy, cx, h, w] = cycxhw;
        let zero = T::zero();
        ensure!(h >= zero && w >= zero, "h and w must be non-negative");

        let two = T::one() + T::one();
        let t = cy - h / two;
        let b = cy + h / two;
        let l = cx - w / two;
        let r = cx + w / two;

        Ok(Self { t, l, b, r })
    }

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self> {
        let [t, l, b, r] = tlbr;
        ensure!(b >= t && r >= l, "b >= t and r >= l must hold");

        Ok(Self { t, l, b, r })
    }
}

impl<T> From<CyCxHW<T>> for TLBR<T>
where
    T: Copy + Num,
{
    fn from(from: CyCxHW<T>) -> Self {
        Self::from(&from)
    }
}

impl<T> From<&CyCxHW<T>> for TLBR<T>
where
    T: Copy + Num,
{
    fn from(from: &CyCxHW<T>) -> Self {
        let two = T::one() + T::one();
        let CyCxHW { cy, cx, h, w } = *from;
        let t = cy - h / two;
        let l = cx - w / two;
        let b = cy + h / two;
        let r = cx + w / two;
        Self { t, l, b, r }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_inverted_box() {
        assert!(TLBR::try_from_tlbr([2.0, 0.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn clip_into_image() -> Result<()> {
        let rect = TLBR::try_from_tlbr([-3.0, 2.0, 12.0, 30.0])?;
        let clipped = rect.clip(10.0, 20.0);
        assert_eq!(clipped, TLBR::try_from_tlbr([0.0, 2.0, 10.0, 20.0])?);
        Ok(())
    }
}
