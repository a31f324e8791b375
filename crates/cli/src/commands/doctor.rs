use krishi_core::config::{AppConfig, LoadOptions};
use krishi_core::spoilage::ProfileIndex;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
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

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
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
            checks.push(check_model_credentials(&config));
            checks.push(check_static_assets(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["model_credentials", "static_assets"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }
    checks.push(check_profile_table());

    // A missing model key degrades features but is not a failure.
    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_model_credentials(config: &AppConfig) -> DoctorCheck {
    if config.llm.has_api_key() {
        DoctorCheck {
            name: "model_credentials",
            status: CheckStatus::Pass,
            details: format!(
                "{:?} key present; text model `{}`, vision model `{}`",
                config.llm.provider, config.llm.model, config.llm.vision_model
            ),
        }
    } else {
        DoctorCheck {
            name: "model_credentials",
            status: CheckStatus::Skipped,
            details: "no api key; static tables and fallbacks only".to_string(),
        }
    }
}

fn check_static_assets(config: &AppConfig) -> DoctorCheck {
    let Some(dir) = &config.server.static_dir else {
        return DoctorCheck {
            name: "static_assets",
            status: CheckStatus::Skipped,
            details: "no static_dir configured; serving API routes only".to_string(),
        };
    };

    if dir.join("index.html").is_file() {
        DoctorCheck {
            name: "static_assets",
            status: CheckStatus::Pass,
            details: format!("serving `{}`", dir.display()),
        }
    } else {
        DoctorCheck {
            name: "static_assets",
            status: CheckStatus::Fail,
            details: format!("`{}` has no index.html", dir.display()),
        }
    }
}

fn check_profile_table() -> DoctorCheck {
    let index = ProfileIndex::builtin();
    let status = if index.is_empty() { CheckStatus::Fail } else { CheckStatus::Pass };
    DoctorCheck {
        name: "crop_profile_table",
        status,
        details: format!("{} built-in crop profiles", index.len()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
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
