use tracing::info;

use super::Pipeline;

impl Pipeline<'_> {
    /// Remove build-only images newest first, so images built on top of
    /// earlier ones go before their bases, then prune each engine's build
    /// cache.
    pub fn clean(&self) {
        for image in self.registry.build_only().into_iter().rev() {
            let engine = self.registry.engine_for(image);
            let full_name = image.fully_qualified_name();
            info!(image = %full_name, engine, "Cleaning image");
            self.adapter.remove_image(engine, &full_name);
        }

        for engine in self.registry.engines_in_play() {
            self.adapter.prune_build_cache(&engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cmd::fake::RecordingRunner;
    use crate::config::ImageRegistry;
    use crate::context::{Mode, RunOptions};
    use crate::pipeline::Pipeline;

    #[test]
    fn removes_build_only_images_in_reverse_order() {
        let yaml = r#"
- name: base
  path: .
  enabled: true
- name: base-dx
  path: .
  enabled: true
- name: tools
  path: .
  enabled: true
  tag: "2"
- name: old
  path: .
  enabled: false
"#;
        let registry = ImageRegistry::parse(yaml, "docker").unwrap();
        let options = RunOptions::new(Mode::Clean, "ocisictl.yaml");
        let runner = RecordingRunner::new();
        Pipeline::new(&options, &registry, &runner).clean();

        assert_eq!(
            runner.lines(),
            vec![
                "docker rmi -f tools:2",
                "docker rmi -f base:latest",
                "docker buildx prune -af",
            ]
        );
    }

    #[test]
    fn each_image_is_removed_with_its_own_engine() {
        let yaml = r#"
- name: a
  path: .
  enabled: true
  manager: podman
- name: b
  path: .
  enabled: true
"#;
        let registry = ImageRegistry::parse(yaml, "docker").unwrap();
        let options = RunOptions::new(Mode::Clean, "ocisictl.yaml");
        let runner = RecordingRunner::new();
        Pipeline::new(&options, &registry, &runner).clean();

        assert_eq!(
            runner.lines(),
            vec![
                "docker rmi -f b:latest",
                "podman rmi -f a:latest",
                "podman buildx prune -af",
            ]
        );
    }
}
