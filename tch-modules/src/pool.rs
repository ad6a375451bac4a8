use crate::common::*;

/// Max pooling that covers the whole input, i.e. rounds the output size up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxPool2D {
    pub ksize: i64,
    pub stride: i64,
    pub padding: i64,
}

impl MaxPool2D {
    pub fn new(ksize: i64) -> Self {
        Self {
            ksize,
            stride: ksize,
            padding: 0,
        }
    }

    pub fn forward(&self, xs: &Tensor) -> Tensor {
        let Self {
            ksize,
            stride,
            padding,
        } = *self;

        xs.max_pool2d(
            &[ksize, ksize],
            &[stride, stride],
            &[padding, padding],
            &[1, 1],
            true,
        )
    }
}

/// Resize the spatial dimensions of `xs` to match `reference`.
///
/// It is a no-op if the sizes already agree.
pub fn resize_like(xs: &Tensor, reference: &Tensor) -> Result<Tensor> {
    let (_, _, h, w) = xs.size4()?;
    let (_, _, ref_h, ref_w) = reference.size4()?;

    if (h, w) == (ref_h, ref_w) {
        Ok(xs.shallow_clone())
    } else {
        Ok(xs.upsample_nearest2d(&[ref_h, ref_w], None, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pool_covers_all() {
        let xs = Tensor::randn(&[1, 2, 75, 75], (Kind::Float, Device::Cpu));
        assert_eq!(MaxPool2D::new(2).forward(&xs).size(), vec![1, 2, 38, 38]);

        let xs = Tensor::randn(&[1, 2, 19, 19], (Kind::Float, Device::Cpu));
        let pool = MaxPool2D {
            ksize: 3,
            stride: 1,
            padding: 1,
        };
        assert_eq!(pool.forward(&xs).size(), vec![1, 2, 19, 19]);
    }

    #[test]
    fn resize_to_reference() -> Result<()> {
        let xs = Tensor::randn(&[1, 2, 20, 20], (Kind::Float, Device::Cpu));
        let reference = Tensor::zeros(&[1, 5, 19, 19], (Kind::Float, Device::Cpu));
        assert_eq!(resize_like(&xs, &reference)?.size(), vec![1, 2, 19, 19]);
        Ok(())
    }
}
