use crate::common::*;

/// Image or feature map size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HW<T> {
    h: T,
    w: T,
}

impl<T> HW<T>
where
    T: Num + PartialOrd + Copy,
{
    pub fn try_from_hw(hw: [T; 2]) -> Result<Self> {
        let [h, w] = hw;
        let zero = T::zero();
        ensure!(
            h > zero && w > zero,
            "height and width parameters must be positive"
        );
        Ok(Self { h, w })
    }

    pub fn h(&self) -> T {
        self.h
    }

    pub fn w(&self) -> T {
        self.w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_empty_size() -> Result<()> {
        let size = HW::try_from_hw([3.0, 2.0])?;
        assert_eq!((size.h(), size.w()), (3.0, 2.0));
        assert!(HW::try_from_hw([0, 5]).is_err());
        Ok(())
    }
}
