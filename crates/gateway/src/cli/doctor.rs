use stepwise_domain::config::{Config, ConfigSeverity};
use stepwise_mcp::McpBroker;

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("stepwise doctor");
    println!("===============\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_llm_provider(config, &mut all_passed);
    check_mcp_servers(config, &mut all_passed).await;
    check_bearer_token(config, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({error_count} error(s))", issues.len()),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_llm_provider(config: &Config, all_passed: &mut bool) {
    let selected = std::env::var("LLM_PROVIDER").ok();
    let ok = selected
        .as_ref()
        .and_then(|wanted| crate::bootstrap::provider_kind_for(wanted).ok())
        .map(|kind| config.llm.providers.iter().any(|p| p.kind == kind))
        .unwrap_or(false);

    print_check(
        "LLM_PROVIDER resolves to a configured provider",
        ok,
        match &selected {
            Some(wanted) => format!("LLM_PROVIDER={wanted}"),
            None => "LLM_PROVIDER is unset".into(),
        },
    );

    if !ok {
        *all_passed = false;
    }
}

async fn check_mcp_servers(config: &Config, all_passed: &mut bool) {
    let configured = config.mcp.servers.len();
    if configured == 0 {
        print_check("MCP servers", true, "none configured".into());
        return;
    }

    let broker = McpBroker::from_config(&config.mcp).await;
    let connected = broker.server_count().await;
    let ok = connected == configured;
    print_check(
        "MCP servers reachable",
        ok,
        format!("{connected}/{configured} connected"),
    );
    broker.shutdown().await;

    if !ok {
        *all_passed = false;
    }
}

fn check_bearer_token(config: &Config, all_passed: &mut bool) {
    let present = std::env::var(&config.server.token_env)
        .map(|v| !v.is_empty())
        .unwrap_or(false);

    if present {
        print_check("Bearer token configured", true, config.server.token_env.clone());
        return;
    }

    if config.server.require_auth {
        print_check(
            "Bearer token configured",
            false,
            format!("{} is unset (require_auth=true)", config.server.token_env),
        );
        *all_passed = false;
    } else {
        print_check(
            "Bearer token configured",
            true,
            format!("{} is unset (dev mode, auth not enforced)", config.server.token_env),
        );
    }
}

// ── Formatting helper ─────────────────────────────────────────────────

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
