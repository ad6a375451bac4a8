pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use bbox::{prelude::*, CyCxHW, Transform, HW, TLBR};
pub use getset::{CopyGetters, Getters};
pub use itertools::{izip, Itertools as _};
pub use log::{debug, info, warn};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
};
pub use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator as _};
pub use tch::{
    nn::{self, Module as _, ModuleT as _},
    Device, IndexOp, Kind, Reduction, Tensor,
};
pub use tch_modules::{
    BatchNorm2D, BatchNorm2DInit, Conv2D, Conv2DInit, Deconv2D, Deconv2DInit, MaxPool2D,
    Normalize, NormalizeInit, WeightInit,
};
pub use tch_tensor_like::TensorLike;
