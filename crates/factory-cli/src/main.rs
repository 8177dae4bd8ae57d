// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result};
use config::Config;
use factory_api::Client;
use factory_app::AppState;
use factory_store::SessionVault;
use factory_testkit::{DemoData, MockBackend};
use runtime::ApiRuntime;
use std::env;
use std::path::PathBuf;
use tracing::info;

const DEMO_SEED: u64 = 2026;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `factory --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let log_path = config.log_path()?;
    logging::init(&log_path, &config.log_level())?;

    let store_path = config.store_path()?;
    if options.logout {
        let vault = open_vault(&store_path)?;
        vault.clear()?;
        info!("stored session cleared");
        println!("signed out; session cleared from {}", store_path.display());
        return Ok(());
    }

    let demo = if options.demo {
        Some(MockBackend::start(DemoData::generate(DEMO_SEED)).context("start demo backend")?)
    } else {
        None
    };
    let base_url = match &demo {
        Some(backend) => backend.base_url().to_owned(),
        None => config.api_base_url().to_owned(),
    };

    let client = Client::new(&base_url, config.fetch_size(), config.api_timeout()?)
        .with_context(|| {
            format!(
                "invalid [api] config in {}; fix base_url/timeout/fetch_size values",
                options.config_path.display()
            )
        })?;
    let vault = if demo.is_some() {
        SessionVault::in_memory()?
    } else {
        open_vault(&store_path)?
    };
    if options.check_only {
        println!("config, session store and API client look good");
        return Ok(());
    }

    info!(
        base_url = %base_url,
        demo = demo.is_some(),
        log = %log_path.display(),
        "starting factory console"
    );
    let mut runtime = ApiRuntime::new(client, vault, config.page_size());
    if demo.is_some() {
        runtime = runtime.with_login_hint(DemoData::ADMIN_USERNAME);
    }

    let mut state = AppState::default();
    factory_tui::run_app(&mut state, &mut runtime)
}

fn open_vault(path: &std::path::Path) -> Result<SessionVault> {
    SessionVault::open(path).with_context(|| {
        format!(
            "open session store {} -- if this path is wrong, set [session].store_path or {}",
            path.display(),
            factory_store::STORE_PATH_ENV
        )
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    demo: bool,
    check_only: bool,
    logout: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        demo: false,
        check_only: false,
        logout: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--logout" => {
                options.logout = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow::anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("factory admin console");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --demo                   Run against a local mock backend with seeded data");
    println!("  --check                  Validate config, session store and API client");
    println!("  --logout                 Clear the stored session and exit");
    println!("  --help                   Show this help");
}
