//! Map CRI container config to an engine container descriptor.
//!
//! Fixed settings (detached, working directory, stop signal) come from
//! [`ContainerDefaults`]; the command comes from the image unless the
//! request overrides it.

use podshim_core::config::ContainerDefaults;
use podshim_core::{ContainerDescriptor, IdMappingSet, ImageDetails, PulledImage};

use crate::cri_api::{ContainerConfig, ContainerMetadata};

/// Engine container name for CRI metadata: `<name>_<attempt>`.
///
/// Characters the engine rejects in names are replaced with `-`.
pub fn container_name(metadata: Option<&ContainerMetadata>) -> Option<String> {
    let metadata = metadata?;
    if metadata.name.is_empty() {
        return None;
    }

    let sanitized: String = metadata
        .name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    Some(format!("{}_{}", sanitized, metadata.attempt))
}

/// Resolve the entrypoint override and arguments.
///
/// CRI `command` replaces the image entrypoint and `args` replace its CMD.
/// With neither set, the image CMD is kept and the entrypoint is left to the
/// engine, so an image ENTRYPOINT runs exactly once.
pub fn resolve_command(
    config: &ContainerConfig,
    image: &ImageDetails,
) -> (Option<Vec<String>>, Vec<String>) {
    let entrypoint = (!config.command.is_empty()).then(|| config.command.clone());
    let args = if !config.args.is_empty() {
        config.args.clone()
    } else if entrypoint.is_some() {
        Vec::new()
    } else {
        image.cmd.clone()
    };
    (entrypoint, args)
}

/// Build the descriptor submitted to the engine's create call.
pub fn build_descriptor(
    config: &ContainerConfig,
    pod_sandbox_id: &str,
    pulled: &PulledImage,
    image: &ImageDetails,
    id_mappings: IdMappingSet,
    defaults: &ContainerDefaults,
) -> ContainerDescriptor {
    let work_dir = if config.working_dir.is_empty() {
        defaults.work_dir.clone()
    } else {
        config.working_dir.clone()
    };

    let (entrypoint, command) = resolve_command(config, image);

    ContainerDescriptor {
        name: container_name(config.metadata.as_ref()),
        entrypoint,
        command,
        detach: true,
        env: config
            .envs
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect(),
        labels: config.labels.clone(),
        id_mappings,
        image: pulled.input_name.clone(),
        image_id: pulled.id.clone(),
        network: pod_sandbox_id.to_string(),
        work_dir,
        stop_signal: defaults.stop_signal.clone(),
    }
}
