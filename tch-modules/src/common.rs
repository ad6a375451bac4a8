pub use anyhow::{ensure, Result};
pub use log::warn;
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{borrow::Borrow, sync::Once};
pub use tch::{nn, Device, Kind, Tensor};
