use serde::Serialize;

use crate::commands::CommandResult;
use tagwatch_core::config::{AppConfig, LoadOptions};
use tagwatch_db::repositories::{ConfigRepository, SqlConfigRepository};
use tagwatch_engine::{REQUIRED_SLACK_KEYS, REQUIRED_ZENDESK_KEYS};

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    status: &'static str,
    checks: Vec<DoctorCheck>,
}

pub fn run(json: bool) -> CommandResult {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "process_config",
                status: "ok",
                detail: format!("database at {}", config.database.url),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "process_config",
                status: "failed",
                detail: error.to_string(),
            });
            None
        }
    };

    if let Some(config) = config {
        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(async {
                match tagwatch_db::connect(&config.database).await {
                    Ok(pool) => {
                        checks.push(DoctorCheck {
                            name: "database",
                            status: "ok",
                            detail: "connection established".to_string(),
                        });

                        let repo = SqlConfigRepository::new(pool.clone());
                        checks.push(runtime_keys_check(&repo, "zendesk_keys", REQUIRED_ZENDESK_KEYS).await);
                        checks.push(runtime_keys_check(&repo, "slack_keys", REQUIRED_SLACK_KEYS).await);

                        pool.close().await;
                    }
                    Err(error) => checks.push(DoctorCheck {
                        name: "database",
                        status: "failed",
                        detail: error.to_string(),
                    }),
                }
            }),
            Err(error) => checks.push(DoctorCheck {
                name: "runtime",
                status: "failed",
                detail: error.to_string(),
            }),
        }
    }

    let healthy = checks.iter().all(|check| check.status == "ok");
    let report =
        DoctorReport { status: if healthy { "ok" } else { "degraded" }, checks };

    let output = if json {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| error.to_string())
    } else {
        render_report(&report)
    };

    CommandResult { exit_code: if healthy { 0 } else { 1 }, output }
}

async fn runtime_keys_check(
    repo: &SqlConfigRepository,
    name: &'static str,
    keys: &[&str],
) -> DoctorCheck {
    let mut missing = Vec::new();
    for key in keys {
        match repo.get(key).await {
            Ok(Some(value)) if !value.trim().is_empty() => {}
            Ok(_) => missing.push(*key),
            Err(error) => {
                return DoctorCheck { name, status: "failed", detail: error.to_string() };
            }
        }
    }

    if missing.is_empty() {
        DoctorCheck { name, status: "ok", detail: "all keys configured".to_string() }
    } else {
        DoctorCheck {
            name,
            status: "failed",
            detail: format!("missing: {}", missing.join(", ")),
        }
    }
}

fn render_report(report: &DoctorReport) -> String {
    let mut lines = vec![format!("doctor: {}", report.status)];
    for check in &report.checks {
        lines.push(format!("- {} [{}] {}", check.name, check.status, check.detail));
    }
    lines.join("\n")
}
