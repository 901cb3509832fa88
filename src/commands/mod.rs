pub mod apply;
pub mod keys;
pub mod plans;
pub mod proxy;
pub mod status;

use anyhow::Result;
use reconcile::ResourceDescriptor;

use crate::config::DevboxConfig;
use crate::desired::DesiredState;

/// Validated descriptors from the configured desired-state file
pub fn desired_resources(config: &DevboxConfig) -> Result<Vec<ResourceDescriptor>> {
    let path = config.desired_state_path()?;
    DesiredState::load(&path)?.into_resources()
}

/// Carry observed state over from the stored records
pub fn with_observed_state(
    desired: Vec<ResourceDescriptor>,
    previous: &[ResourceDescriptor],
) -> Vec<ResourceDescriptor> {
    desired
        .into_iter()
        .map(|mut resource| {
            if let Some(stored) = previous.iter().find(|p| p.id == resource.id) {
                if stored.provider_key != resource.provider_key && stored.exists_remotely() {
                    log::warn!(
                        "{} moved from {} to {}; remove it and re-add it under a new id to migrate",
                        resource.id,
                        stored.provider_key,
                        resource.provider_key
                    );
                }
                resource.observed_state.clone_from(&stored.observed_state);
                resource.pending_state.clone_from(&stored.pending_state);
            }
            resource
        })
        .collect()
}
