use crate::{common::*, init::WeightInit};

#[derive(Debug, Clone)]
pub struct Deconv2DInit {
    pub ksize: usize,
    pub stride: usize,
    pub padding: usize,
    pub output_padding: usize,
    pub bias: bool,
    pub ws_init: WeightInit,
    pub bs_init: nn::Init,
}

impl Deconv2DInit {
    /// A transposed convolution that upsamples by `stride`.
    pub fn new(ksize: usize, stride: usize) -> Self {
        Self {
            ksize,
            stride,
            padding: 0,
            output_padding: 0,
            bias: true,
            ws_init: WeightInit::LeCunUniform,
            bs_init: nn::Init::Const(0.0),
        }
    }

    pub fn build<'p, P>(self, path: P, in_c: usize, out_c: usize) -> Result<Deconv2D>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            ksize,
            stride,
            padding,
            output_padding,
            bias,
            ws_init,
            bs_init,
        } = self;

        ensure!(ksize > 0 && stride > 0, "ksize and stride must be positive");
        ensure!(
            output_padding < stride,
            "output_padding must be less than stride"
        );

        let in_c = in_c as i64;
        let out_c = out_c as i64;
        let ksize = ksize as i64;

        let weight = path.var(
            "weight",
            &[in_c, out_c, ksize, ksize],
            ws_init.to_init(out_c * ksize * ksize),
        );
        let bias = bias.then(|| path.var("bias", &[out_c], bs_init));

        Ok(Deconv2D {
            stride: [stride as i64; 2],
            padding: [padding as i64; 2],
            output_padding: [output_padding as i64; 2],
            weight,
            bias,
        })
    }
}

#[derive(Debug)]
pub struct Deconv2D {
    stride: [i64; 2],
    padding: [i64; 2],
    output_padding: [i64; 2],
    weight: Tensor,
    bias: Option<Tensor>,
}

impl nn::Module for Deconv2D {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let Self {
            ref stride,
            ref padding,
            ref output_padding,
            ref weight,
            ref bias,
        } = *self;

        xs.convolution(
            weight,
            bias.as_ref(),
            stride,
            padding,
            &[1, 1],
            true,
            output_padding,
            1,
        )
    }
}
