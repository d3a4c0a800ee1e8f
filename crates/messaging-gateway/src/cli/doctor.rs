use messaging_domain::config::{ConfigSeverity, RuntimeConfig};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub fn run(config: &RuntimeConfig, config_path: &str) -> anyhow::Result<bool> {
    println!("messaging-gateway doctor");
    println!("========================\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_gateway_partitions(config, &mut all_passed);
    check_webhook_token();

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

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

fn check_config_validation(config: &RuntimeConfig, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_gateway_partitions(config: &RuntimeConfig, all_passed: &mut bool) {
    let count = config.gateway.resolved_partition_count();
    let ok = count > 0;
    print_check("Outbound gateway partitions", ok, format!("{count} partition(s)"));
    if !ok {
        *all_passed = false;
    }
}

/// Informational only — running without a token is a supported dev mode.
fn check_webhook_token() {
    let set = std::env::var("MESSAGING_WEBHOOK_TOKEN").map(|v| !v.is_empty()).unwrap_or(false);
    print_check(
        "Webhook bearer-token auth",
        true,
        if set { "enabled".into() } else { "DISABLED — set MESSAGING_WEBHOOK_TOKEN to enable".into() },
    );
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
