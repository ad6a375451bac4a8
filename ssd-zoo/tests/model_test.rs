use anyhow::Result;
use noisy_float::prelude::*;
use ssd_zoo::{
    coder::Detection,
    model::{ModelKind, Preset, Ssd},
    multibox::HeadOutput,
};
use std::str::FromStr;
use strum::IntoEnumIterator;
use tch::{nn, Device, Kind, Tensor};

#[test]
fn model_output_shapes() -> Result<()> {
    let n_fg_class = 4;

    for kind in ModelKind::iter() {
        let vs = nn::VarStore::new(Device::Cpu);
        let model = kind.build_network(&vs.root(), n_fg_class)?;
        let insize = kind.insize();
        let n_boxes = model.coder().n_default_bboxes() as i64;

        let xs = Tensor::rand(&[2, 3, insize, insize], (Kind::Float, Device::Cpu));
        let output = tch::no_grad(|| model.forward_t(&xs, false))?;

        match output {
            HeadOutput::Multibox(output) => {
                assert_ne!(kind, ModelKind::RefineDet320);
                assert_eq!(output.locs.size(), vec![2, n_boxes, 4]);
                assert_eq!(output.confs.size(), vec![2, n_boxes, n_fg_class as i64 + 1]);
            }
            HeadOutput::Refined(output) => {
                assert_eq!(kind, ModelKind::RefineDet320);
                assert_eq!(output.arm_locs.size(), vec![2, n_boxes, 4]);
                assert_eq!(output.arm_confs.size(), vec![2, n_boxes, 2]);
                assert_eq!(output.odm_locs.size(), vec![2, n_boxes, 4]);
                assert_eq!(output.odm_confs.size(), vec![2, n_boxes, n_fg_class as i64 + 1]);
            }
        }
    }

    Ok(())
}

#[test]
fn predict_on_images_of_any_size() -> Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let mut model = ModelKind::Essd300.build_network(&vs.root(), 3)?;
    model.use_preset(Preset::Evaluate);
    assert_eq!(model.score_thresh().raw(), 0.01);
    assert_eq!(model.nms_thresh().raw(), 0.45);

    let images = vec![
        Tensor::rand(&[3, 120, 200], (Kind::Float, Device::Cpu)) * 255.0,
        Tensor::rand(&[3, 480, 360], (Kind::Float, Device::Cpu)) * 255.0,
    ];
    let detections = model.predict(&images)?;
    assert_eq!(detections.len(), 2);

    for detection in &detections {
        let n = detection.len() as i64;
        assert_eq!(detection.bboxes.size(), vec![n, 4]);
        assert_eq!(detection.labels.size(), vec![n]);
        if n > 0 {
            assert!(i64::from(&detection.labels.max()) < 3);
            assert!(f64::from(&detection.scores.min()) >= 0.01);
        }
    }

    // grayscale images are rejected
    let gray = Tensor::rand(&[1, 32, 32], (Kind::Float, Device::Cpu));
    assert!(model.predict(&[gray]).is_err());
    Ok(())
}

#[test]
fn presets_override_thresholds() -> Result<()> {
    assert_eq!(Preset::default(), Preset::Visualize);
    assert_eq!(Preset::from_str("evaluate")?, Preset::Evaluate);

    let vs = nn::VarStore::new(Device::Cpu);
    let mut model = ModelKind::Ssd300Plus.build_network(&vs.root(), 2)?;
    assert_eq!(model.nms_thresh().raw(), 0.45);
    assert_eq!(model.score_thresh().raw(), 0.6);

    model.set_nms_thresh(r64(0.3));
    model.set_score_thresh(r64(0.2));
    assert_eq!(model.nms_thresh().raw(), 0.3);
    assert_eq!(model.score_thresh().raw(), 0.2);

    model.use_preset(Preset::Visualize);
    assert_eq!(model.nms_thresh().raw(), 0.45);
    assert_eq!(model.score_thresh().raw(), 0.6);

    model.set_score_thresh(r64(0.2));
    model.use_preset(Preset::Evaluate);
    assert_eq!(model.nms_thresh().raw(), 0.45);
    assert_eq!(model.score_thresh().raw(), 0.01);
    Ok(())
}

/// Decode the network output of a single image in input coordinates.
fn decode_in_input_coords(model: &Ssd, image: &Tensor) -> Result<Detection> {
    tch::no_grad(|| {
        let xs = model.prepare(image)?.unsqueeze(0);
        let nms_thresh = model.nms_thresh().raw();
        let score_thresh = model.score_thresh().raw();

        match model.forward_t(&xs, false)? {
            HeadOutput::Multibox(output) => model.coder().decode(
                &output.locs.get(0),
                &output.confs.get(0),
                nms_thresh,
                score_thresh,
            ),
            HeadOutput::Refined(output) => model.coder().decode_refined(
                &output.arm_locs.get(0),
                &output.arm_confs.get(0),
                &output.odm_locs.get(0),
                &output.odm_confs.get(0),
                nms_thresh,
                score_thresh,
            ),
        }
    })
}

#[test]
fn predict_rescales_to_image_size() -> Result<()> {
    for kind in [ModelKind::Ssd300Plus, ModelKind::RefineDet320] {
        let vs = nn::VarStore::new(Device::Cpu);
        let mut model = kind.build_network(&vs.root(), 3)?;
        model.use_preset(Preset::Evaluate);

        // input side is 300 or 320, so y scales by h / insize and x by w / insize
        let insize = kind.insize() as f32;
        let (height, width) = (insize / 2.0, insize * 2.0);
        let image =
            Tensor::rand(&[3, height as i64, width as i64], (Kind::Float, Device::Cpu)) * 255.0;

        let expect = decode_in_input_coords(&model, &image)?;
        let detection = model
            .predict(&[image])?
            .pop()
            .expect("one detection per image");

        assert!(!expect.is_empty(), "{} detects nothing", kind);
        assert_eq!(detection.len(), expect.len());
        assert!(detection.labels.equal(&expect.labels));
        assert!(detection.scores.allclose(&expect.scores, 1e-5, 1e-6, false));

        let scale = Tensor::of_slice(&[0.5f32, 2.0, 0.5, 2.0]);
        let expect_bboxes = &expect.bboxes * scale;
        assert!(
            detection.bboxes.allclose(&expect_bboxes, 1e-4, 1e-3, false),
            "{} boxes are not rescaled",
            kind
        );
    }
    Ok(())
}
