//! `agent-engine` — load one agent YAML file, run it once, print JSON.
//!
//! Follows the teacher's thin-binary convention (a `main` that wires
//! collaborators and delegates straight to the library) rather than hosting
//! an HTTP front door: there is no model/vector-store/tool-server to wire up
//! outside a real deployment, so this binary runs agents against the
//! in-process stub collaborators the crate's own tests use.

use std::collections::HashMap;
use std::sync::Arc;

use declarative_agent_engine::agent::AgentDefinition;
use declarative_agent_engine::audit::{AuditTrail, NullAlertSink};
use declarative_agent_engine::compliance::AlwaysAllow;
use declarative_agent_engine::registry::Registry;
use declarative_agent_engine::runtime::IsolatedRuntime;
use declarative_agent_engine::schema::SchemaCompiler;
use declarative_agent_engine::steps::test_support::stub_collaborators;
use declarative_agent_engine::supervisor::Supervisor;
use declarative_agent_engine::threat::ThreatScorer;

struct CliArgs {
    agent_file: String,
    input_json: String,
    tenant_id: String,
}

fn parse_args() -> Result<CliArgs, String> {
    let mut args = std::env::args().skip(1);
    let agent_file = args
        .next()
        .ok_or_else(|| "usage: agent-engine <agent.yaml> [input-json] [tenant-id]".to_string())?;
    let input_json = args.next().unwrap_or_else(|| "{}".to_string());
    let tenant_id = args.next().unwrap_or_else(|| "default-tenant".to_string());
    Ok(CliArgs {
        agent_file,
        input_json,
        tenant_id,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = match parse_args() {
        Ok(a) => a,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    let source = match std::fs::read_to_string(&args.agent_file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to read {:?}: {e}", args.agent_file);
            std::process::exit(1);
        }
    };

    let compiler = SchemaCompiler::new();
    let agent = match AgentDefinition::from_yaml(&source, &compiler) {
        Ok(agent) => agent,
        Err(e) => {
            eprintln!("failed to load agent file: {e}");
            std::process::exit(1);
        }
    };

    let registry = Registry::new();
    if let Err(e) = registry.load_builtins() {
        eprintln!("failed to load built-in agents: {e}");
        std::process::exit(1);
    }
    let agent_name = agent.id.clone();
    if let Err(e) = registry.register(agent, true) {
        eprintln!("failed to register agent: {e}");
        std::process::exit(1);
    }

    let input: serde_json::Value = match serde_json::from_str(&args.input_json) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("invalid input JSON: {e}");
            std::process::exit(2);
        }
    };

    let supervisor = Supervisor::new(
        Arc::new(registry),
        Arc::new(IsolatedRuntime::default()),
        stub_collaborators(),
        Arc::new(AlwaysAllow),
        Arc::new(AuditTrail::new(Arc::new(NullAlertSink))),
        Arc::new(ThreatScorer::new()),
    );

    match supervisor
        .execute(&agent_name, input, HashMap::new(), &args.tenant_id)
        .await
    {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output).unwrap());
        }
        Err(e) => {
            eprintln!("execution failed ({}): {e}", e.code());
            std::process::exit(1);
        }
    }
}
