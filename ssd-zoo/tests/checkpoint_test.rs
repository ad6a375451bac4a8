use anyhow::Result;
use ssd_zoo::{model::ModelKind, serializer::save_npz};
use tch::{nn, Device};

#[test]
fn load_checkpoint_file_as_pretrained_model() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ssd300_plus.npz");

    let src = nn::VarStore::new(Device::Cpu);
    let _ = ModelKind::Ssd300Plus.build_network(&src.root(), 2)?;
    save_npz(&path, &src)?;
    let path_str = path.to_str().unwrap();

    // a checkpoint path requires an explicit class count
    let dst = nn::VarStore::new(Device::Cpu);
    let err = ModelKind::Ssd300Plus
        .build(&dst, None, Some(path_str))
        .unwrap_err();
    assert_eq!(err.to_string(), "n_fg_class must be specified");

    let model = ModelKind::Ssd300Plus.build(&dst, Some(2), Some(path_str))?;
    assert_eq!(model.n_fg_class(), 2);

    let src_vars = src.variables();
    let dst_vars = dst.variables();
    assert_eq!(src_vars.len(), dst_vars.len());
    for (name, var) in &src_vars {
        assert!(var.equal(&dst_vars[name]), "{} differs", name);
    }
    Ok(())
}

#[test]
fn share_backbone_between_models() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ssd300_plus.npz");

    let src = nn::VarStore::new(Device::Cpu);
    let _ = ModelKind::Ssd300Plus.build_network(&src.root(), 20)?;
    save_npz(&path, &src)?;

    // the extended model shares the extractor and has a different head
    let dst = nn::VarStore::new(Device::Cpu);
    let _ = ModelKind::Essd300Plus.build(&dst, Some(5), Some(path.to_str().unwrap()))?;

    let src_vars = src.variables();
    let dst_vars = dst.variables();
    for name in ["extractor.conv1_1.weight", "extractor.norm4.scale", "extractor.conv11_2.bias"] {
        assert!(src_vars[name].equal(&dst_vars[name]), "{} differs", name);
    }
    assert!(!dst_vars["multibox.conf.0.weight"].equal(&src_vars["multibox.conf.0.weight"]));
    Ok(())
}

#[test]
fn unrelated_checkpoint_keeps_initial_weights() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("unrelated.npz");

    let src = nn::VarStore::new(Device::Cpu);
    let _ = src.root().zeros("unrelated", &[3]);
    save_npz(&path, &src)?;

    let dst = nn::VarStore::new(Device::Cpu);
    let model = ModelKind::Dssd300.build(&dst, Some(3), Some(path.to_str().unwrap()))?;
    assert_eq!(model.n_fg_class(), 3);
    assert!(!dst.variables().contains_key("unrelated"));
    Ok(())
}
