//! Loading and saving `.npz` checkpoints.
//!
//! Checkpoints name their arrays with `/` separators and short parameter names
//! (`W`, `b`, `gamma`, `beta`, `avg_mean`, `avg_var`). They are mapped onto the
//! var store names, which use `.` separators and `weight`, `bias`, `running_mean`
//! and `running_var`.

use crate::common::*;

const IGNORED_PREFIXES: &[&str] = &["predictor/"];
const IGNORED_PARAMETERS: &[&str] = &["N"];
const PARAMETER_NAMES: &[(&str, &str)] = &[
    ("W", "weight"),
    ("b", "bias"),
    ("gamma", "weight"),
    ("beta", "bias"),
    ("avg_mean", "running_mean"),
    ("avg_var", "running_var"),
];

/// The outcome of [load_npz].
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Variables assigned from the checkpoint.
    pub loaded: Vec<String>,
    /// Checkpoint entries that were not used.
    pub skipped: Vec<String>,
    /// Variables absent from the checkpoint, which keep their initial values.
    pub missing: Vec<String>,
}

/// Map a checkpoint array name to a var store name.
///
/// Returns `None` for entries that carry no variable.
pub fn checkpoint_to_var_name(name: &str) -> Option<String> {
    let name = name.trim_start_matches('/');
    let name = IGNORED_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name);

    let mut components: Vec<&str> = name.split('/').collect();
    let last = components.last_mut()?;
    if IGNORED_PARAMETERS.contains(last) {
        return None;
    }
    if let Some((_, var_name)) = PARAMETER_NAMES.iter().find(|(param, _)| *param == *last) {
        *last = *var_name;
    }
    Some(components.join("."))
}

/// Map a var store name to a checkpoint array name.
pub fn var_to_checkpoint_name(name: &str, is_batch_norm: bool) -> String {
    let mut components: Vec<&str> = name.split('.').collect();
    if let Some(last) = components.last_mut() {
        let found = PARAMETER_NAMES
            .iter()
            .filter(|(param, _)| {
                let is_bn_param = !matches!(*param, "W" | "b");
                is_bn_param == is_batch_norm
            })
            .find(|(_, var_name)| *var_name == *last);
        if let Some((param, _)) = found {
            *last = *param;
        }
    }
    components.join("/")
}

/// Load a checkpoint into the var store.
///
/// Entries without a matching variable and entries whose shape disagrees with the
/// variable are skipped.
pub fn load_npz(path: impl AsRef<Path>, vs: &nn::VarStore) -> Result<LoadReport> {
    let path = path.as_ref();
    let arrays = Tensor::read_npz(path)
        .with_context(|| format!("unable to read checkpoint {}", path.display()))?;
    let mut variables = vs.variables();

    let mut report = LoadReport::default();
    let mut assigned = HashSet::new();

    tch::no_grad(|| {
        for (name, array) in arrays {
            let var_name = match checkpoint_to_var_name(&name) {
                Some(var_name) => var_name,
                None => {
                    report.skipped.push(name);
                    continue;
                }
            };

            match variables.get_mut(&var_name) {
                Some(var) if var.size() == array.size() => {
                    var.copy_(&array);
                    assigned.insert(var_name.clone());
                    report.loaded.push(var_name);
                }
                Some(var) => {
                    warn!(
                        "skip '{}': checkpoint shape {:?} does not match variable shape {:?}",
                        name,
                        array.size(),
                        var.size()
                    );
                    report.skipped.push(name);
                }
                None => {
                    debug!("skip '{}': no such variable", name);
                    report.skipped.push(name);
                }
            }
        }
    });

    report.missing = variables
        .into_keys()
        .filter(|name| !assigned.contains(name))
        .sorted()
        .collect();
    report.loaded.sort();

    info!(
        "loaded {} variables from {}, {} skipped, {} missing",
        report.loaded.len(),
        path.display(),
        report.skipped.len(),
        report.missing.len()
    );

    Ok(report)
}

/// Save the var store as a checkpoint.
pub fn save_npz(path: impl AsRef<Path>, vs: &nn::VarStore) -> Result<()> {
    let path = path.as_ref();
    let variables = vs.variables();

    // layers keeping running statistics are batch norms
    let batch_norms: HashSet<String> = variables
        .keys()
        .filter_map(|name| name.strip_suffix(".running_mean"))
        .map(|layer| layer.to_string())
        .collect();

    let named: Vec<(String, Tensor)> = variables
        .into_iter()
        .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
        .map(|(name, var)| {
            let is_batch_norm = name
                .rsplit_once('.')
                .map(|(layer, _)| batch_norms.contains(layer))
                .unwrap_or(false);
            (var_to_checkpoint_name(&name, is_batch_norm), var)
        })
        .collect();

    Tensor::write_npz(&named, path)
        .with_context(|| format!("unable to write checkpoint {}", path.display()))?;
    Ok(())
}
