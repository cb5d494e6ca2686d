use cw_automation::RuleRegistry;
use cw_bitable::{BitableClient, TokenCache};
use cw_domain::config::{Config, ConfigSeverity, Role};
use std::sync::Arc;

/// Run all diagnostic checks and print a summary.
///
/// Returns `true` when every check passes.
pub async fn run(config: &Config) -> bool {
    println!("casewire doctor");
    println!("===============\n");

    let mut all_passed = true;

    check_config_validation(config, &mut all_passed);
    check_bitable(config, &mut all_passed).await;
    check_llm(config, &mut all_passed);
    check_state_dir(config, &mut all_passed);
    if config.server.role == Role::AutomationWorker {
        check_rules_file(config, &mut all_passed);
    }

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    all_passed
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check("Config validation", error_count == 0, format!("{} issue(s) ({} error(s))", issues.len(), error_count));
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

async fn check_bitable(config: &Config, all_passed: &mut bool) {
    let domain = config.bitable.domain.clone().unwrap_or_else(|| "https://open.feishu.cn/open-apis".to_string());
    let tokens = Arc::new(TokenCache::new(config.channel.app_id.clone().unwrap_or_default(), config.channel.app_secret.clone().unwrap_or_default(), domain.clone()));
    let reachable = match BitableClient::new(domain.clone(), tokens, 5) {
        Ok(client) => client.list_tables(&config.bitable.default_app_token.clone().unwrap_or_default()).await.is_ok(),
        Err(_) => false,
    };

    print_check("Tabular backend reachable", reachable, if reachable { domain } else { format!("{domain} (unreachable or unauthenticated)") });
    if !reachable {
        *all_passed = false;
    }
}

fn check_llm(config: &Config, all_passed: &mut bool) {
    let task_ok = config.llm.task_base_url.is_some();
    let chat_ok = config.llm.chat_base_url.is_some();
    let ok = task_ok || chat_ok;
    print_check("LLM providers configured", ok, format!("task={task_ok} chat={chat_ok}"));
    if !ok {
        *all_passed = false;
    }
}

fn check_state_dir(config: &Config, all_passed: &mut bool) {
    let path = std::path::Path::new(&config.server.state_dir);
    let writable = std::fs::create_dir_all(path).is_ok() && {
        let probe = path.join(".casewire_doctor_probe");
        let w = std::fs::write(&probe, b"probe").is_ok();
        let _ = std::fs::remove_file(&probe);
        w
    };
    print_check("State directory writable", writable, config.server.state_dir.clone());
    if !writable {
        *all_passed = false;
    }
}

fn check_rules_file(config: &Config, all_passed: &mut bool) {
    let parseable = RuleRegistry::load(&config.server.rules_path).is_ok();
    print_check("Rules file parses", parseable, config.server.rules_path.clone());
    if !parseable {
        *all_passed = false;
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
