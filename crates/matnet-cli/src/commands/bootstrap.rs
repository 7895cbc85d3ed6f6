//! `matnet bootstrap` - run the full setup state machine.

use matnet_core::artifacts::HubClient;
use matnet_core::{BootstrapOrchestrator, BootstrapResult, MatnetConfig};

use crate::exit_codes::codes;

pub fn run(config: &MatnetConfig, json_output: bool) -> u8 {
    let source = match HubClient::new(config.artifacts.endpoint.clone()) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("ERROR: {error}");
            return codes::GENERIC_ERROR;
        }
    };

    if !json_output {
        println!("Bootstrapping SVBRDF capture environment...");
    }
    let orchestrator = BootstrapOrchestrator::new(config, &source);
    let result = orchestrator.bootstrap();
    emit_result(&result, json_output);

    if result.ready {
        codes::SUCCESS
    } else {
        codes::GENERIC_ERROR
    }
}

fn emit_result(result: &BootstrapResult, json_output: bool) {
    if json_output {
        if let Ok(json) = serde_json::to_string_pretty(result) {
            println!("{json}");
        }
        return;
    }

    for stage in &result.completed {
        println!("  {stage}: ok");
    }
    match &result.failure {
        None => println!("Environment ready."),
        Some(failure) => {
            eprintln!("  {}: FAILED ({})", failure.stage, failure.kind);
            eprintln!("ERROR: {}", failure.message);
            eprintln!("Remedy: {}", failure.kind.remedy());
        }
    }
}
