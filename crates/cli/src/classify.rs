//! `lure classify`: run one hit through the configured classifier.

use std::process;

use lure_core::{GatewayClassifier, GatewayMatch};

use crate::config::LureConfig;
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_classify(
    config: &LureConfig,
    ip: &str,
    user_agent: &str,
    output: OutputFormat,
    quiet: bool,
) {
    let classifier = match GatewayClassifier::from_config(&config.classifier) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: invalid classifier config: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let verdict = classifier.evaluate(ip, user_agent);

    match output {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "gateway": verdict.is_gateway(),
                "user_agent_signature": verdict.user_agent_signature,
                "cidr_block": verdict.cidr_block,
            });
            println!("{}", body);
        }
        OutputFormat::Text => print_text(&verdict, quiet),
    }
}

fn print_text(verdict: &GatewayMatch, quiet: bool) {
    if !verdict.is_gateway() {
        println!("human");
        return;
    }
    println!("gateway");
    if quiet {
        return;
    }
    if let Some(sig) = &verdict.user_agent_signature {
        println!("  user-agent signature: {}", sig);
    }
    if let Some(block) = &verdict.cidr_block {
        println!("  cidr block: {}", block);
    }
}
