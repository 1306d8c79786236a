use anyhow::Result;
use tracing::info;

use super::Pipeline;
use crate::config::ImageDefinition;
use crate::context::UserIdentity;
use crate::distrobox::ExportHelper;
use crate::engine::{self, BuildArgs};

/// Containerfile shared by all dev images.
const DEV_CONTAINERFILE: &str = "Containerfile.img-dx";

/// `Containerfile.<name>`, or the shared dev Containerfile for dev images.
pub fn containerfile(image: &ImageDefinition) -> String {
    if image.is_dev() {
        DEV_CONTAINERFILE.to_string()
    } else {
        format!("Containerfile.{}", image.name())
    }
}

/// Dev images get the caller's identity and the base image they extend.
pub fn build_args(image: &ImageDefinition, engine: &str, identity: &UserIdentity) -> BuildArgs {
    let Some(base) = image.base_name() else {
        return Vec::new();
    };
    vec![
        ("USER".to_string(), identity.user.clone()),
        ("UID".to_string(), identity.uid.to_string()),
        ("GID".to_string(), identity.gid.to_string()),
        ("IMG".to_string(), engine::for_name(engine).local_reference(base)),
        ("TAG".to_string(), image.tag().to_string()),
    ]
}

impl Pipeline<'_> {
    /// Build every enabled image in file order with the export helper in
    /// place. The helper copies are removed however this returns.
    pub fn build(&self) -> Result<()> {
        let helper = ExportHelper::prepare(
            self.runner,
            self.options.export_helper.as_deref(),
            self.options.workdir(),
        )?;
        for image in self.registry.enabled() {
            self.build_image(image, &helper)?;
        }
        Ok(())
    }

    fn build_image(&self, image: &ImageDefinition, helper: &ExportHelper) -> Result<()> {
        let engine = self.registry.engine_for(image);
        let full_name = image.fully_qualified_name();
        info!(image = %full_name, engine, "Creating image");

        // Pruning already left nothing behind.
        if !self.options.prune_before_run {
            self.adapter.stop_container(engine, image.sandbox_name());
            self.adapter.remove_container(engine, image.sandbox_name());
            self.adapter.remove_image(engine, &full_name);
        }

        let _helper_copy = helper.place_in(image.build_path())?;
        self.adapter.build_image(
            engine,
            &containerfile(image),
            &full_name,
            &build_args(image, engine, &self.options.identity),
            image.build_path(),
        )?;

        info!(image = %full_name, engine, "Creating image done");
        Ok(())
    }
}
