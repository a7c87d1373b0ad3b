// Scenario runs

use anyhow::Result;
use sightflow_scenarios::{Scenario, ScenarioContext, ScenarioReport};

use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};
use crate::settings::Settings;

pub async fn run(scenario: Scenario, settings: &Settings, output: OutputFormat) -> Result<()> {
    let (chain, flow) = settings.resolve()?;
    tracing::debug!(?chain, ?flow, "configuration resolved");
    let ctx = ScenarioContext::new(chain, &flow);

    match scenario.run(&ctx).await {
        Ok(report) => print_report(&report, output),
        Err(e) => {
            // A run that finished with failed checks still has a report worth showing
            if let Some(report) = e.report() {
                print_report(report, output)?;
            }
            Err(anyhow::Error::new(e).context(format!("scenario {} failed", scenario.name())))
        }
    }
}

fn print_report(report: &ScenarioReport, output: OutputFormat) -> Result<()> {
    if !output.is_text() {
        return output.print_value(report);
    }

    print_field("Scenario", &report.scenario);
    print_field("Run", &report.workflow.run_id.to_string());
    print_field("Chain id", &report.chain_id.to_string());
    println!();

    print_table_header(&[
        ("#", 3),
        ("STEP", 24),
        ("REQUEST", 22),
        ("WAITED", 10),
        ("DISCARDED", 9),
    ]);
    for step in &report.workflow.steps {
        print_table_row(&[
            (&step.index.to_string(), 3),
            (&step.name, 24),
            (&step.token.to_string(), 22),
            (&format!("{}ms", step.waited.as_millis()), 10),
            (&(step.mismatched + step.stale).to_string(), 9),
        ]);
    }

    if !report.observations.is_empty() {
        println!();
        println!("Observations:");
        for observation in &report.observations {
            println!("  {}: {}", observation.label, observation.value);
        }
    }

    if !report.checks.is_empty() {
        println!();
        println!("Checks:");
        for check in &report.checks {
            if check.passed {
                println!("  [ok]     {} = {}", check.label, check.actual);
            } else {
                println!(
                    "  [FAILED] {}: expected {}, got {}",
                    check.label, check.expected, check.actual
                );
            }
        }
    }

    Ok(())
}
