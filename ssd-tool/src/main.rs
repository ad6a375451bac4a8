mod config;

use crate::config::Config;
use anyhow::{ensure, format_err, Context, Result};
use bbox::{prelude::*, TLBR};
use clap::Parser;
use log::info;
use prettytable::{cell, row, Table};
use ssd_zoo::{
    download::download_model,
    model::{ModelKind, Ssd},
    pretrained::find_pretrained_model,
};
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use tch::{nn, vision};

#[derive(Debug, Clone, Parser)]
/// Single shot multibox detector tool
enum Opts {
    /// List the models and their registered weights
    Info,
    /// Download a registered weight set
    Fetch {
        /// model name, e.g. ssd300_plus
        model: ModelKind,
        /// weight set name, e.g. voc0712
        key: String,
    },
    /// Detect objects in images
    Detect {
        /// configuration file
        #[clap(long, default_value = "detect.json5")]
        config: PathBuf,
        /// input images
        images: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    match Opts::parse() {
        Opts::Info => {
            print_info();
        }
        Opts::Fetch { model, key } => {
            fetch(model, &key)?;
        }
        Opts::Detect {
            config: config_file,
            images,
        } => {
            let config = Config::open(&config_file).with_context(|| {
                format!("failed to load config file '{}'", config_file.display())
            })?;
            detect(&config, &images)?;
        }
    }

    Ok(())
}

fn print_info() {
    let mut table = Table::new();
    table.add_row(row!["model", "input size", "grids", "weights"]);

    ModelKind::iter().for_each(|kind| {
        let weights: Vec<_> = kind
            .pretrained_models()
            .iter()
            .map(|(key, model)| match model.n_fg_class {
                Some(n_fg_class) => format!("{} ({} classes)", key, n_fg_class),
                None => key.to_string(),
            })
            .collect();

        table.add_row(row![
            kind,
            kind.insize(),
            format!("{:?}", kind.grids()),
            weights.join(", "),
        ]);
    });

    table.printstd();
}

fn fetch(kind: ModelKind, key: &str) -> Result<()> {
    let model = find_pretrained_model(kind, key)
        .ok_or_else(|| format_err!("'{}' is not a registered weight set of {}", key, kind))?;
    let path = download_model(model.url)?;
    println!("{}", path.display());
    Ok(())
}

fn detect(config: &Config, images: &[PathBuf]) -> Result<()> {
    let vs = nn::VarStore::new(config.device);
    let mut model = config.model.build(
        &vs,
        config.n_fg_class,
        config.pretrained_model.as_deref(),
    )?;
    info!(
        "built {} with {} foreground classes",
        config.model,
        model.n_fg_class()
    );

    model.use_preset(config.preset);
    if let Some(nms_thresh) = config.nms_thresh {
        model.set_nms_thresh(nms_thresh);
    }
    if let Some(score_thresh) = config.score_thresh {
        model.set_score_thresh(score_thresh);
    }
    if let Some(label_names) = &config.label_names {
        ensure!(
            label_names.len() == model.n_fg_class(),
            "expect {} label names, but get {}",
            model.n_fg_class(),
            label_names.len()
        );
    }

    let mut table = Table::new();
    table.add_row(row!["image", "label", "score", "y_min", "x_min", "y_max", "x_max"]);

    for path in images {
        detect_image(&model, path, config.label_names.as_deref(), &mut table)?;
    }

    table.printstd();
    Ok(())
}

fn detect_image(
    model: &Ssd,
    path: &Path,
    label_names: Option<&[String]>,
    table: &mut Table,
) -> Result<()> {
    let image = vision::image::load(path)
        .with_context(|| format!("unable to load image '{}'", path.display()))?;
    let (_, image_h, image_w) = image.size3()?;
    let detection = model
        .predict(&[image])?
        .pop()
        .ok_or_else(|| format_err!("no prediction for '{}'", path.display()))?;

    let bboxes: Vec<f32> = Vec::from(&detection.bboxes.contiguous());
    let labels: Vec<i64> = Vec::from(&detection.labels);
    let scores: Vec<f32> = Vec::from(&detection.scores);
    info!("{} objects in {}", scores.len(), path.display());

    for ((bbox, label), score) in bboxes.chunks(4).zip(labels).zip(scores) {
        let bbox = TLBR::try_from_tlbr([bbox[0], bbox[1], bbox[2], bbox[3]])?
            .clip(image_h as f32, image_w as f32);
        let label = match label_names {
            Some(names) => names[label as usize].clone(),
            None => label.to_string(),
        };
        let [t, l, b, r] = bbox.tlbr();
        table.add_row(row![
            path.display(),
            label,
            format!("{:.3}", score),
            format!("{:.1}", t),
            format!("{:.1}", l),
            format!("{:.1}", b),
            format!("{:.1}", r),
        ]);
    }

    Ok(())
}
