use crate::common::*;

#[cfg(debug_assertions)]
static SMALL_VAR_WARN: Once = Once::new();

#[derive(Debug, Clone)]
pub struct BatchNorm2DInit {
    pub cudnn_enabled: bool,
    pub eps: R64,
    pub momentum: R64,
    pub affine: bool,
}

impl Default for BatchNorm2DInit {
    fn default() -> Self {
        Self {
            cudnn_enabled: true,
            eps: r64(2e-5),
            momentum: r64(0.1),
            affine: true,
        }
    }
}

impl BatchNorm2DInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, out_dim: usize) -> BatchNorm2D {
        let path = path.borrow();
        let out_dim = out_dim as i64;
        let Self {
            cudnn_enabled,
            eps,
            momentum,
            affine,
        } = self;

        let ws = affine.then(|| path.var("weight", &[out_dim], nn::Init::Const(1.0)));
        let bs = affine.then(|| path.var("bias", &[out_dim], nn::Init::Const(0.0)));

        BatchNorm2D {
            running_mean: path.zeros_no_train("running_mean", &[out_dim]),
            running_var: path.ones_no_train("running_var", &[out_dim]),
            ws,
            bs,
            cudnn_enabled,
            eps: eps.raw(),
            momentum: momentum.raw(),
        }
    }
}

#[derive(Debug)]
pub struct BatchNorm2D {
    running_mean: Tensor,
    running_var: Tensor,
    ws: Option<Tensor>,
    bs: Option<Tensor>,
    cudnn_enabled: bool,
    eps: f64,
    momentum: f64,
}

impl nn::ModuleT for BatchNorm2D {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let Self {
            ref running_mean,
            ref running_var,
            ref ws,
            ref bs,
            momentum,
            eps,
            cudnn_enabled,
        } = *self;

        #[cfg(debug_assertions)]
        if !train && bool::from(running_var.abs().le(1e-15).any()) {
            SMALL_VAR_WARN.call_once(|| {
                warn!(
                    "running variance {} is too small",
                    f64::from(running_var.abs().min())
                );
            });
        }

        Tensor::batch_norm(
            input,
            ws.as_ref(),
            bs.as_ref(),
            Some(running_mean),
            Some(running_var),
            train,
            momentum,
            eps,
            cudnn_enabled,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::nn::ModuleT as _;

    #[test]
    fn batch_norm_normalizes_in_training() {
        let vs = nn::VarStore::new(Device::Cpu);
        let bn = BatchNorm2DInit::default().build(&vs.root() / "bn", 3);
        let input = Tensor::randn(&[8, 3, 4, 4], (Kind::Float, Device::Cpu)) * 5.0 + 2.0;
        let output = bn.forward_t(&input, true);
        let mean = f64::from(output.mean(Kind::Float));
        assert!(mean.abs() < 1e-4);
    }
}
