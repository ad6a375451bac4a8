use crate::common::*;

/// Channel-wise L2 normalization with a learnable scale, as used after `conv4_3` in SSD.
#[derive(Debug, Clone)]
pub struct NormalizeInit {
    pub initial: R64,
    pub eps: R64,
}

impl NormalizeInit {
    pub fn new(initial: f64) -> Self {
        Self {
            initial: r64(initial),
            eps: r64(1e-5),
        }
    }

    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, n_channel: usize) -> Normalize {
        let path = path.borrow();
        let Self { initial, eps } = self;
        let scale = path.var(
            "scale",
            &[n_channel as i64],
            nn::Init::Const(initial.raw()),
        );

        Normalize {
            scale,
            eps: eps.raw(),
        }
    }
}

#[derive(Debug)]
pub struct Normalize {
    scale: Tensor,
    eps: f64,
}

impl nn::Module for Normalize {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let norm = (xs * xs)
            .sum_dim_intlist(&[1], true, Kind::Float)
            .sqrt()
            + self.eps;
        let scale = self.scale.view([1, -1, 1, 1]);
        xs / norm * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tch::nn::Module as _;

    #[test]
    fn normalize_to_scale() {
        let vs = nn::VarStore::new(Device::Cpu);
        let norm = NormalizeInit::new(20.0).build(&vs.root() / "norm4", 6);
        let input = Tensor::randn(&[2, 6, 5, 5], (Kind::Float, Device::Cpu));
        let output = norm.forward(&input);
        assert_eq!(output.size(), vec![2, 6, 5, 5]);

        let norms = (&output * &output)
            .sum_dim_intlist(&[1], false, Kind::Float)
            .sqrt();
        let min = f64::from(norms.min());
        let max = f64::from(norms.max());
        assert_abs_diff_eq!(min, 20.0, epsilon = 1e-2);
        assert_abs_diff_eq!(max, 20.0, epsilon = 1e-2);
    }
}
