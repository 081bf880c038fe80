use pagebot_core::config::{AppConfig, LoadOptions};
use pagebot_db::{collection_exists, connect, DbPool};
use serde::Serialize;

use crate::commands::{current_thread_runtime, CommandResult, EXIT_CONFIG, EXIT_DATABASE};

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

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn exit_code(&self) -> u8 {
        let failed = |name: &str| {
            self.checks.iter().any(|check| check.name == name && check.status == CheckStatus::Fail)
        };
        if failed("config_validation") {
            EXIT_CONFIG
        } else if failed("database_connectivity") || failed("collection_exists") {
            EXIT_DATABASE
        } else {
            0
        }
    }
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = report.exit_code();

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped(
                "database_connectivity",
                "configuration did not load",
            ));
            checks.push(DoctorCheck::skipped("collection_exists", "configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("collection_exists", "no async runtime was available"),
            ];
        }
    };

    runtime.block_on(async {
        let target = match config.database.target() {
            Ok(target) => target,
            Err(error) => {
                return vec![
                    DoctorCheck::fail("database_connectivity", error.to_string()),
                    DoctorCheck::skipped("collection_exists", "the database target is incomplete"),
                ];
            }
        };

        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to `{target}`: {error}"),
                    ),
                    DoctorCheck::skipped("collection_exists", "the database was unreachable"),
                ];
            }
        };

        let checks = vec![
            DoctorCheck::pass("database_connectivity", format!("connected using `{target}`")),
            check_collection(&pool, &config.qa.retriever.collection).await,
        ];
        pool.close().await;
        checks
    })
}

async fn check_collection(pool: &DbPool, collection: &str) -> DoctorCheck {
    match collection_exists(pool, collection).await {
        Ok(true) => {
            DoctorCheck::pass("collection_exists", format!("collection `{collection}` is present"))
        }
        Ok(false) => DoctorCheck::fail(
            "collection_exists",
            format!("collection `{collection}` was not found in langchain_pg_collection"),
        ),
        Err(error) => DoctorCheck::fail("collection_exists", error.to_string()),
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

#[cfg(test)]
mod tests {
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};

    fn report(checks: Vec<DoctorCheck>) -> DoctorReport {
        DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks,
        }
    }

    #[test]
    fn exit_code_prefers_config_failures() {
        let report = report(vec![
            DoctorCheck::fail("config_validation", "missing DB_NAME"),
            DoctorCheck::skipped("database_connectivity", "configuration did not load"),
        ]);

        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn missing_collection_is_a_database_failure() {
        let report = report(vec![
            DoctorCheck::pass("config_validation", "ok"),
            DoctorCheck::pass("database_connectivity", "ok"),
            DoctorCheck::fail("collection_exists", "collection `pages` was not found"),
        ]);

        assert_eq!(report.exit_code(), 4);
    }

    #[test]
    fn human_output_marks_each_check() {
        let rendered = render_human(&report(vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            DoctorCheck::skipped("collection_exists", "the database was unreachable"),
        ]));

        assert_eq!(
            rendered,
            "doctor: one or more readiness checks failed\n\
             - [ok] config_validation: configuration loaded and validated\n\
             - [skip] collection_exists: skipped because the database was unreachable"
        );
    }
}
