use cw_domain::config::{Config, ConfigSeverity};

/// Validate the configuration and print any issues.
///
/// Returns `true` when valid (warnings are fine; only errors fail).
pub fn validate(config: &Config) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK");
        return true;
    }

    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{error_count} error(s), {warning_count} warning(s)");

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}
