//! Definition lint — `funnel-engine validate`.

use anyhow::Result;
use console::style;
use std::path::Path;

use funnel_engine::EngineConfig;
use funnel_engine::funnel::intent::StepIntent;
use funnel_engine::funnel::{FunnelDefinition, StepType, consent};

pub fn cmd_validate(funnel_path: &Path, config: &EngineConfig) -> Result<()> {
    let definition = FunnelDefinition::load(funnel_path)?;

    println!();
    println!(
        "Funnel {} ({})",
        style(&definition.name).bold(),
        definition.id
    );
    println!("{} steps", definition.steps.len());
    println!();

    let mut warnings = Vec::new();

    for step in &definition.steps {
        let intent = StepIntent::classify(step.step_type);
        let policy_url = consent::resolve_policy_url(
            step,
            &definition,
            config.team.privacy_policy_url.as_deref(),
        );

        let mut flags = Vec::new();
        if step.content.is_required {
            flags.push("required");
        }
        if consent::requires_consent_checkbox(step, &policy_url) {
            flags.push("consent");
        }

        println!(
            "  {:>3}  {:<16} {:<10} {}",
            step.order_index,
            step.step_type.to_string(),
            intent.to_string(),
            style(flags.join(", ")).dim()
        );

        if intent == StepIntent::Capture && policy_url.is_empty() {
            warnings.push(format!(
                "step {} ({}) captures contact details but no privacy policy URL resolves; \
                 submissions will be blocked",
                step.id, step.step_type
            ));
        }
        if step.step_type == StepType::Embed && step.content.embed_url.is_none() {
            warnings.push(format!(
                "step {} is an embed step without an embed_url",
                step.id
            ));
        }
        if step.step_type == StepType::Unknown {
            warnings.push(format!(
                "step {} has an unrecognized step type and will render nothing",
                step.id
            ));
        }
    }

    println!();
    if warnings.is_empty() {
        println!("{}", style("Definition valid, no warnings").green());
    } else {
        println!(
            "{}",
            style(format!("Definition valid with {} warning(s):", warnings.len())).yellow()
        );
        for warning in &warnings {
            println!("  {} {}", style("warning:").yellow().bold(), warning);
        }
    }
    println!();

    Ok(())
}
