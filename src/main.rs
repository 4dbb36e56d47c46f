//! infra-validate - Polling validation harness for cloud infrastructure
//!
//! Deploys infrastructure with Terraform (or a compatible CLI), validates it
//! by polling until every check answers as expected or runs out of retries,
//! then tears it down.
//!
//! ## Features
//!
//! - Scoped deployments: teardown runs exactly once, even on panic
//! - Checks over SSH through a bastion host, raw TCP, HTTP and gRPC
//! - Stages skippable with `SKIP_<stage>` to re-validate a live deployment
//! - Typed microservice and data storage module inputs
//! - Parallel suites, stored reports, multiple output formats
//!
//! ## Usage
//!
//! ```bash
//! # Run suites end to end
//! infra-validate run suites/mongodb.yaml suites/grpc.yaml --save
//!
//! # Re-validate an existing deployment
//! SKIP_deploy=true SKIP_cleanup=true infra-validate run suites/mongodb.yaml
//!
//! # One ad-hoc check through a bastion
//! infra-validate check ssh --bastion 3.3.3.3 --host 10.0.1.5 --key key.pem \
//!     --command 'echo ok' --expect ok
//!
//! # Stored results
//! infra-validate results --suite mongodb --export mongodb.csv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

mod checks;
mod cli;
mod config;
mod http;
mod infra;
mod models;
mod output;
mod results;
mod retry;
mod ssh;
mod stage;
mod suite;
mod terraform;
mod utils;

use checks::{CheckContext, CheckKind, ValidationCheck};
use cli::Args;
use config::{AccountContext, AppConfig, ConfigFile, EnvConfig, HopKind};
use http::HttpClient;
use output::{OutputFormat, ResultFormatter};
use results::{EnvironmentInfo, ExportFormat, ResultsStorage, StoredRun};
use retry::RetryPolicy;
use ssh::{BastionExecutor, HopMode, SshClient};
use stage::StageSet;
use suite::{InfraSection, SuiteDefinition, SuiteExecutor, SuiteRunner};
use utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(LogLevel::from_verbosity(args.verbose));

    let env = EnvConfig::load();
    let (config, source) = ConfigFile::resolve(args.config.as_deref(), &env)?;
    if let Some(path) = &source {
        debug!("Using configuration from {}", path.display());
    }

    match args.command {
        cli::Command::Run(run_args) => {
            run_suites(run_args, config).await?;
        }
        cli::Command::Check(check_args) => {
            run_check(check_args, config).await?;
        }
        cli::Command::List(list_args) => {
            list_suites(list_args, &config)?;
        }
        cli::Command::Results(results_args) => {
            show_results(results_args, &config)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, config, source, &env)?;
        }
    }

    Ok(())
}

fn output_format(flag: Option<&str>, config: &AppConfig) -> Result<OutputFormat> {
    flag.unwrap_or(&config.format)
        .parse()
        .map_err(anyhow::Error::msg)
}

async fn run_suites(args: cli::RunArgs, config: AppConfig) -> Result<()> {
    let suites = SuiteDefinition::load_all(&args.files)?;
    let format = output_format(args.format.as_deref(), &config)?;

    let stages = args
        .skip
        .iter()
        .fold(StageSet::new(), |set, stage| set.skip(stage.as_str()));

    let mut runner = SuiteRunner::new(config.clone())?.with_stages(stages);
    if suites.iter().any(|suite| suite.infra.is_some()) {
        let account = AccountContext::from_env().context("Account context is required by typed infra suites")?;
        info!("Account {} ({}) in {}", account.account_name, account.account_id, account.region);
        runner = runner.with_account(account);
    }

    let mut executor = SuiteExecutor::new(runner);
    if let Some(parallel) = args.parallel {
        executor = executor.with_max_concurrent(parallel);
    }
    let reports = executor.run_all(&suites).await;

    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_reports(&reports));

    if let Some(path) = &args.output {
        output::write_reports_to_file(path, &reports, format)?;
        println!("✓ Reports written to {}", path.display());
    }

    if args.save {
        let storage = ResultsStorage::from_config(config.results_dir.as_deref());
        let environment = EnvironmentInfo::new(&config.terraform_binary);
        for report in &reports {
            storage.save(&StoredRun::new(report.clone(), environment.clone()))?;
        }
        println!("✓ Results saved under {}", storage.base_dir().display());
    }

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} suite(s) failed", failed, reports.len());
    }
    Ok(())
}

async fn run_check(args: cli::CheckArgs, config: AppConfig) -> Result<()> {
    let format = output_format(args.format.as_deref(), &config)?;

    let mut policy = config.retry;
    if let Some(retries) = args.retry.retries {
        policy = RetryPolicy::new(retries, policy.interval);
    }
    if let Some(secs) = args.retry.interval {
        if !secs.is_finite() || secs < 0.0 {
            anyhow::bail!("--interval must be a non-negative number of seconds");
        }
        policy = policy.with_interval(Duration::from_secs_f64(secs));
    }

    let mut ctx = CheckContext::new(HttpClient::with_timeout(config.http_timeout_secs)?);

    let check = match args.target {
        cli::CheckTarget::Ssh {
            bastion,
            host,
            key,
            user,
            command,
            expect,
        } => {
            let mut ssh_config = config.ssh.clone();
            if let Some(user) = user {
                ssh_config.username = user;
            }
            let client = SshClient::new(ssh_config).with_identity(key);
            let bastion = client.host(bastion);
            let target = client.host(host);
            let mut executor = BastionExecutor::new(client, bastion, target);
            if config.hop == HopKind::Nested {
                let remote_identity = executor.upload_identity().await?;
                executor = executor.with_mode(HopMode::Nested { remote_identity });
            }
            ctx = ctx.with_executor(executor);

            ValidationCheck::new(format!("'{command}' returns '{expect}'"), CheckKind::Command { command, expect })
        }
        cli::CheckTarget::Http {
            url,
            method,
            status,
            contains,
        } => ValidationCheck::new(
            format!("{method} {url} returns {status}"),
            CheckKind::Http {
                url,
                method,
                status,
                contains,
                body: None,
                headers: Default::default(),
            },
        ),
        cli::CheckTarget::Tcp {
            host,
            port,
            timeout,
        } => ValidationCheck::new(
            format!("{host}:{port} accepts connections"),
            CheckKind::Tcp {
                host,
                port,
                timeout_secs: timeout,
            },
        ),
        cli::CheckTarget::Grpc {
            url,
            path,
            request,
            status,
        } => ValidationCheck::new(
            format!("{url}{path} returns grpc-status {status}"),
            CheckKind::Grpc {
                url,
                path,
                request,
                status,
            },
        ),
    };

    let result = check.run(&ctx, &policy).await;
    println!("{}", ResultFormatter::new(format).format_check(&result));

    if result.status.is_failure() {
        anyhow::bail!("Check failed: {}", check.description);
    }
    Ok(())
}

fn list_suites(args: cli::ListArgs, config: &AppConfig) -> Result<()> {
    let suites = SuiteDefinition::load_all(&args.files)?;

    println!("\n📋 Suites\n");
    for suite in &suites {
        let mode = if suite.parallel { "parallel" } else { "serial" };
        let infra = match &suite.infra {
            Some(InfraSection::Microservice(_)) => "microservice",
            Some(InfraSection::DataStorage(_)) => "data storage",
            None => "terraform module",
        };
        println!(
            "  {} [{}] {} in {}",
            suite.name,
            mode,
            infra,
            suite.terraform.terraform_dir.display()
        );
        if let Some(description) = &suite.description {
            println!("      {description}");
        }

        let stages: Vec<&str> = [stage::DEPLOY, stage::VALIDATE, stage::CLEANUP]
            .into_iter()
            .map(|name| if suite.skip.iter().any(|s| s == name) { "skip" } else { name })
            .collect();
        println!("      stages: {}", stages.join(" → "));

        let policy = suite.default_policy(&config.retry);
        println!(
            "      {} check(s), default {} attempt(s) every {:?} (up to {:?} waiting)",
            suite.checks.len(),
            policy.max_retries,
            policy.interval,
            policy.total_wait()
        );
        if suite.endpoint_tests {
            if let Some(InfraSection::Microservice(microservice)) = &suite.infra {
                println!(
                    "      + {} endpoint check(s) from traffic rules",
                    microservice.traffics.len()
                );
            }
        }

        if args.detailed {
            for check in &suite.checks {
                let policy = check.policy(&suite.default_policy(&config.retry));
                println!(
                    "        - [{}] {} (expects '{}', {}x {:?})",
                    check.kind.name(),
                    check.description,
                    check.kind.expected(),
                    policy.max_retries,
                    policy.interval
                );
            }
        }
        println!();
    }

    println!("Total: {} suite(s)", suites.len());
    Ok(())
}

fn show_results(args: cli::ResultsArgs, config: &AppConfig) -> Result<()> {
    let storage = ResultsStorage::from_config(config.results_dir.as_deref());
    let format: OutputFormat = args.format.parse().map_err(anyhow::Error::msg)?;

    let Some(suite) = &args.suite else {
        let suites = storage.list_suites()?;
        if suites.is_empty() {
            println!("\n📭 No stored results found.");
            println!("   Run suites with: infra-validate run <suite files> --save");
            return Ok(());
        }

        println!("\n┌─────────────────────────────────────────────────────────────┐");
        println!("│ Stored Results                                              │");
        println!("├─────────────────────────────────────────────────────────────┤");
        for suite in &suites {
            let runs = storage.list_runs(suite)?;
            if let Some(latest) = runs.first() {
                println!(
                    "│ {:25} │ {:3} runs │ Latest: {} {:5.1}% │",
                    suite,
                    runs.len(),
                    if latest.passed { "PASS" } else { "FAIL" },
                    latest.pass_rate
                );
            }
        }
        println!("└─────────────────────────────────────────────────────────────┘");
        println!("\nUse --suite <name> to view details for a specific suite.\n");
        return Ok(());
    };

    let run = match &args.run {
        Some(run_id) => storage.load(suite, run_id)?,
        None => match storage.latest(suite)? {
            Some(run) => run,
            None => {
                println!("No results found for suite: {suite}");
                return Ok(());
            }
        },
    };

    println!("{}", ResultFormatter::new(format).format_report(&run.report));

    if args.run.is_none() {
        let runs = storage.list_runs(suite)?;
        if runs.len() > 1 {
            println!("\nOther runs ({}):", runs.len() - 1);
            for info in runs.iter().skip(1).take(5) {
                println!(
                    "  - {} | {} | {:.1}%",
                    info.id,
                    info.started_at.format("%Y-%m-%d %H:%M:%S"),
                    info.pass_rate
                );
            }
        }
    }

    if let Some(path) = &args.export {
        let export_format = ExportFormat::from_extension(path).unwrap_or(ExportFormat::Json);
        storage.export(&run, path, export_format)?;
        println!("\n✓ Run exported to: {}", path.display());
    }

    Ok(())
}

fn manage_config(
    args: cli::ConfigArgs,
    config: AppConfig,
    source: Option<PathBuf>,
    env: &EnvConfig,
) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = output.unwrap_or_else(ConfigFile::default_path);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            ConfigFile::default().save(&path)?;
            println!("✓ Configuration file created: {}", path.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { format } => {
            match &source {
                Some(path) => println!("# Loaded from {}", path.display()),
                None => println!("# No configuration file found, showing defaults"),
            }
            let file = ConfigFile {
                app: config,
                ..Default::default()
            };
            let output = if format == "json" {
                serde_json::to_string_pretty(&file)?
            } else {
                serde_yaml::to_string(&file)?
            };
            println!("{output}");

            if env.has_any() {
                env.print_summary();
            }
        }

        cli::ConfigAction::Env => {
            config::print_env_help();
            println!();
            match AccountContext::from_env() {
                Ok(account) => account.print_summary(),
                Err(e) => println!("Account context unavailable: {e}"),
            }
        }
    }

    Ok(())
}
