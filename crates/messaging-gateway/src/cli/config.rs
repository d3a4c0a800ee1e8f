use messaging_domain::config::{ConfigSeverity, RuntimeConfig};

pub fn validate(config: &RuntimeConfig, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{config_path}: no issues");
        return true;
    }
    for issue in &issues {
        let tag = match issue.severity {
            ConfigSeverity::Warning => "WARN",
            ConfigSeverity::Error => "ERROR",
        };
        println!("[{tag}] {issue}");
    }
    !issues.iter().any(|i| i.severity == ConfigSeverity::Error)
}

pub fn show(config: &RuntimeConfig) {
    match toml::to_string_pretty(config) {
        Ok(s) => print!("{s}"),
        Err(e) => eprintln!("failed to serialize config: {e}"),
    }
}
