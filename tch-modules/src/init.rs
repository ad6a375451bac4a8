use crate::common::*;

/// Weight initialization schemes that depend on the fan-in of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInit {
    /// Normal distribution with `std = sqrt(1 / fan_in)`.
    LeCunNormal,
    /// Uniform distribution in `[-sqrt(3 / fan_in), sqrt(3 / fan_in)]`.
    LeCunUniform,
    Const(R64),
}

impl WeightInit {
    pub fn to_init(self, fan_in: i64) -> nn::Init {
        let fan_in = fan_in.max(1) as f64;

        match self {
            Self::LeCunNormal => nn::Init::Randn {
                mean: 0.0,
                stdev: (1.0 / fan_in).sqrt(),
            },
            Self::LeCunUniform => {
                let bound = (3.0 / fan_in).sqrt();
                nn::Init::Uniform {
                    lo: -bound,
                    up: bound,
                }
            }
            Self::Const(value) => nn::Init::Const(value.raw()),
        }
    }
}

impl Default for WeightInit {
    fn default() -> Self {
        Self::LeCunNormal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn lecun_uniform_bound() {
        match WeightInit::LeCunUniform.to_init(3 * 3 * 512) {
            nn::Init::Uniform { lo, up } => {
                assert_abs_diff_eq!(up, (3.0f64 / 4608.0).sqrt());
                assert_abs_diff_eq!(lo, -up);
            }
            _ => unreachable!(),
        }
    }
}
