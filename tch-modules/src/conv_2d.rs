use crate::{common::*, init::WeightInit};

pub use conv_2d_::*;
pub use conv_2d_init::*;

mod conv_2d_init {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct Conv2DInit {
        pub ksize: usize,
        pub stride: usize,
        pub padding: usize,
        pub dilation: usize,
        pub bias: bool,
        pub ws_init: WeightInit,
        pub bs_init: nn::Init,
    }

    impl Conv2DInit {
        /// A `ksize x ksize` convolution that keeps the spatial size for odd kernels.
        pub fn new(ksize: usize) -> Self {
            Self {
                ksize,
                stride: 1,
                padding: ksize / 2,
                dilation: 1,
                bias: true,
                ws_init: WeightInit::LeCunNormal,
                bs_init: nn::Init::Const(0.0),
            }
        }

        pub fn stride(self, stride: usize) -> Self {
            Self { stride, ..self }
        }

        pub fn padding(self, padding: usize) -> Self {
            Self { padding, ..self }
        }

        pub fn dilation(self, dilation: usize) -> Self {
            Self { dilation, ..self }
        }

        pub fn ws_init(self, ws_init: WeightInit) -> Self {
            Self { ws_init, ..self }
        }

        pub fn build<'a>(
            self,
            path: impl Borrow<nn::Path<'a>>,
            in_dim: usize,
            out_dim: usize,
        ) -> Result<Conv2D> {
            let Self {
                ksize,
                stride,
                padding,
                dilation,
                bias,
                ws_init,
                bs_init,
            } = self;

            ensure!(ksize > 0, "ksize must be positive");
            ensure!(stride > 0, "stride must be positive");
            ensure!(dilation > 0, "dilation must be positive");
            ensure!(in_dim > 0 && out_dim > 0, "channel sizes must be positive");

            let path = path.borrow();
            let in_dim = in_dim as i64;
            let out_dim = out_dim as i64;
            let ksize = ksize as i64;
            let fan_in = in_dim * ksize * ksize;

            let bs = bias.then(|| path.var("bias", &[out_dim], bs_init));
            let ws = path.var(
                "weight",
                &[out_dim, in_dim, ksize, ksize],
                ws_init.to_init(fan_in),
            );

            Ok(Conv2D {
                stride: [stride as i64; 2],
                padding: [padding as i64; 2],
                dilation: [dilation as i64; 2],
                weight: ws,
                bias: bs,
            })
        }
    }
}

mod conv_2d_ {
    use super::*;

    #[derive(Debug)]
    pub struct Conv2D {
        pub(super) stride: [i64; 2],
        pub(super) padding: [i64; 2],
        pub(super) dilation: [i64; 2],
        pub(super) weight: Tensor,
        pub(super) bias: Option<Tensor>,
    }

    impl nn::Module for Conv2D {
        fn forward(&self, input: &Tensor) -> Tensor {
            let Self {
                ref stride,
                ref padding,
                ref dilation,
                ref weight,
                ref bias,
            } = *self;

            input.convolution(
                weight,
                bias.as_ref(),
                stride,
                padding,
                dilation,
                false,
                &[0, 0],
                1,
            )
        }
    }
}
