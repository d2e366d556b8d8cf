use serde::Serialize;
use slackbridge_core::config::{AppConfig, LoadOptions};
use slackbridge_core::domain::jid::has_namespace;
use slackbridge_slack::{HttpSlackApi, SlackApi};

use crate::commands::runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn passed(&self) -> bool {
        self.overall_status == CheckStatus::Pass
    }
}

/// Returns the rendered report and whether every check passed.
pub fn run(json_output: bool) -> (String, bool) {
    let report = build_report();
    let passed = report.passed();

    if json_output {
        let rendered = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return (rendered, passed);
    }

    (render_human(&report), passed)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_token_shape(&config));
            checks.extend(check_slack(&config));
            checks.push(check_registered_groups(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["token_shape", "bot_identity", "socket_mode", "registered_groups"] {
                checks.push(skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    // Warnings are advisory; only failures and skips fail the report.
    let all_pass =
        checks.iter().all(|check| matches!(check.status, CheckStatus::Pass | CheckStatus::Warn));
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_token_shape(config: &AppConfig) -> DoctorCheck {
    let warnings = config.slack.token_warnings();
    if warnings.is_empty() {
        return DoctorCheck {
            name: "token_shape",
            status: CheckStatus::Pass,
            details: "app and bot tokens have the expected prefixes".to_string(),
        };
    }
    DoctorCheck { name: "token_shape", status: CheckStatus::Warn, details: warnings.join("; ") }
}

fn check_slack(config: &AppConfig) -> Vec<DoctorCheck> {
    let api = match HttpSlackApi::from_config(&config.slack) {
        Ok(api) => api,
        Err(error) => {
            return vec![
                DoctorCheck { name: "bot_identity", status: CheckStatus::Fail, details: error.to_string() },
                skipped("socket_mode", "skipped because the http client could not be built"),
            ];
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck { name: "bot_identity", status: CheckStatus::Fail, details: error },
                skipped("socket_mode", "skipped because the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let identity = match api.auth_test().await {
            Ok(identity) => DoctorCheck {
                name: "bot_identity",
                status: CheckStatus::Pass,
                details: format!(
                    "bot `{}` ({}) in team `{}`",
                    identity.user.as_deref().unwrap_or("<unknown>"),
                    identity.user_id,
                    identity.team.as_deref().unwrap_or("<unknown>")
                ),
            },
            Err(error) => DoctorCheck {
                name: "bot_identity",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        };

        let socket = match api.open_socket_connection(&config.slack.app_token).await {
            Ok(_) => DoctorCheck {
                name: "socket_mode",
                status: CheckStatus::Pass,
                details: "apps.connections.open issued a socket url".to_string(),
            },
            Err(error) => DoctorCheck {
                name: "socket_mode",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        };

        vec![identity, socket]
    })
}

fn check_registered_groups(config: &AppConfig) -> DoctorCheck {
    let slack_groups = config.groups.iter().filter(|group| has_namespace(&group.jid, "slack")).count();
    DoctorCheck {
        name: "registered_groups",
        status: CheckStatus::Pass,
        details: if slack_groups == 0 {
            "no slack groups registered; inbound messages will only report chat metadata".to_string()
        } else {
            format!("{slack_groups} slack group(s) registered")
        },
    }
}

fn skipped(name: &'static str, details: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: details.to_string() }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
