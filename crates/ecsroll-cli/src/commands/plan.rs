use ecsroll_core::EcsrollConfig;
use ecsroll_stack::{DeployPlan, DeployRequest, UpstreamMode};
use std::path::Path;

/// Print the identities and deployment spec a deploy of `image_tag` would use.
/// Makes no AWS call.
pub async fn plan(image_tag: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = EcsrollConfig::load(Path::new("."))?;
    let request = DeployRequest::new(image_tag, UpstreamMode::Provision)?;
    let plan = ecsroll_stack::plan(&config, &request.tag);

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render(&plan));
    }
    Ok(())
}

fn render(plan: &DeployPlan) -> String {
    let spec = &plan.spec;
    let mut out = String::new();
    let mut line = |label: &str, value: &str| {
        out.push_str(&format!("{label:<18} {value}\n"));
    };

    line("Image tag:", plan.image_tag.as_str());
    line(
        "Revision:",
        plan.revision.as_ref().map_or("(disabled)", |r| r.as_str()),
    );
    line("Task definition:", &plan.task_definition_id);
    match (&plan.trigger_key, &plan.skip_reason) {
        (Some(key), _) => line("Trigger key:", key.as_str()),
        (None, Some(reason)) => line("Trigger:", &format!("skipped ({reason})")),
        (None, None) => line("Trigger:", "none"),
    }
    line("Image:", &spec.image.to_string());
    line("Family:", &spec.family);
    line("Container:", &format!("{} (port {})", spec.container_name, spec.port));
    line("Size:", &format!("{} CPU / {} MiB", spec.cpu, spec.memory));
    line("Stacks:", &plan.stacks.join(", "));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecsroll_core::TagSelection;

    #[test]
    fn renders_revision_and_key() {
        let config = EcsrollConfig::default();
        let tag = TagSelection::resolve(Some("abcdef1234567890")).unwrap();

        let text = render(&ecsroll_stack::plan(&config, &tag));

        assert!(text.contains("abcdef12"));
        assert!(text.contains("force-update-abcdef1234567890"));
        assert!(text.contains("TaskDefinitionabcdef12"));
    }

    #[test]
    fn renders_skipped_trigger() {
        let config = EcsrollConfig::default();
        let tag = TagSelection::resolve(None).unwrap();

        let text = render(&ecsroll_stack::plan(&config, &tag));

        assert!(text.contains("skipped (no image tag given)"));
        assert!(text.contains("ecsroll-app:latest"));
    }
}
