use super::{Rect, TLBR};
use crate::{common::*, HW};

/// Axis-aligned scaling followed by translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transform<T> {
    pub sy: T,
    pub sx: T,
    pub ty: T,
    pub tx: T,
}

impl<T> Transform<T>
where
    T: Copy + Num + PartialOrd,
{
    pub fn from_rects<R>(src: &R, tgt: &R) -> Self
    where
        R: Rect<Type = T>,
    {
        let sy = tgt.h() / src.h();
        let sx = tgt.w() / src.w();
        let ty = tgt.t() - src.t() * sy;
        let tx = tgt.l() - src.l() * sx;

        Self { sy, sx, ty, tx }
    }

    /// The transform that stretches an image of `src_size` to `tgt_size`.
    pub fn from_sizes_exact(src_size: &HW<T>, tgt_size: &HW<T>) -> Self {
        let src = TLBR {
            t: T::zero(),
            l: T::zero(),
            b: src_size.h(),
            r: src_size.w(),
        };
        let tgt = TLBR {
            t: T::zero(),
            l: T::zero(),
            b: tgt_size.h(),
            r: tgt_size.w(),
        };
        Self::from_rects(&src, &tgt)
    }
}
