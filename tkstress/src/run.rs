use std::sync::Arc;

use anyhow::Context as _;
use rand::SeedableRng as _;
use rand::rngs::SmallRng;
use tkstress_core::{
    Authenticator as _, Catalog, CycleConfig, CycleRunner, Event, HarnessConfig, LoadHarness,
    Outcome, ResultAggregator, Scenario, Session, StopSignal, execute, select,
};
use tkstress_http::{ApiAuthenticator, ApiClient, ApiConfig, cycle_catalog, stress_catalog};

use crate::cli::{ConnectionArgs, CycleArgs, OutputFormat, RunArgs, StressArgs};
use crate::exit_codes::ExitCode;
use crate::output;

fn api_config(conn: &ConnectionArgs) -> ApiConfig {
    let mut config = ApiConfig {
        base_url: conn.base_url.clone(),
        username: conn.username.clone(),
        password: conn.password.clone(),
        timeout: conn.request_timeout,
        ..ApiConfig::default()
    };
    if let Some(date) = &conn.date {
        config.travel_date = date.clone();
    }
    config
}

/// Installs a SIGINT watcher that trips the shared stop signal.
fn watch_interrupt(stop: Arc<StopSignal>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            stop.stop();
        }
    });
}

fn single_scenario_catalog(catalog: &Catalog, name: &str) -> anyhow::Result<Catalog> {
    let scenario = catalog
        .get(name)
        .with_context(|| format!("unknown scenario '{name}'"))?;
    let mut only = Catalog::new();
    only.register((*scenario).clone());
    Ok(only)
}

pub async fn stress(args: StressArgs) -> anyhow::Result<ExitCode> {
    let api = ApiClient::new(api_config(&args.connection));
    let mut catalog = stress_catalog(&api);
    if let Some(name) = &args.scenario {
        catalog = single_scenario_catalog(&catalog, name)?;
    }

    let auth = Arc::new(ApiAuthenticator::new(api));
    let config = HarnessConfig {
        total: args.count,
        concurrency: args.concurrency,
        start_interval: args.start_interval,
        timeout: args.timeout,
        ..HarnessConfig::default()
    };

    let harness = LoadHarness::new(catalog, auth, config).with_observer(Arc::new(|event| {
        match event {
            Event::ApiError {
                scenario,
                status,
                detail,
            } => tracing::warn!(%scenario, status, %detail, "api error"),
            Event::Error { scenario, detail } if !scenario.is_empty() => {
                tracing::warn!(%scenario, %detail, "scenario error");
            }
            _ => {}
        }
    }));

    let stop = Arc::new(StopSignal::new());
    watch_interrupt(stop.clone());

    let summary = harness
        .run(stop.clone())
        .await
        .context("stress run failed")?;

    match args.output {
        OutputFormat::HumanReadable => print!("{}", output::render_human(&summary)),
        OutputFormat::Json => println!("{}", output::render_json(&summary)),
    }

    if stop.is_stopped() {
        return Ok(ExitCode::Interrupted);
    }
    if summary.error_rate > args.max_error_rate {
        tracing::error!(
            error_rate = summary.error_rate,
            max = args.max_error_rate,
            "error rate above threshold"
        );
        return Ok(ExitCode::Failure);
    }
    Ok(ExitCode::Success)
}

pub async fn cycle(args: CycleArgs) -> anyhow::Result<ExitCode> {
    let api = ApiClient::new(api_config(&args.connection));
    api.check_connection()
        .await
        .context("target is not reachable")?;

    let catalog = cycle_catalog(&api);
    let auth = Arc::new(ApiAuthenticator::new(api));
    let config = CycleConfig {
        interval: args.interval,
        refresh_after: args.refresh_after,
        health_path: args.health_file.clone(),
        relogin_on_wrap: !args.keep_session,
    };
    let mut runner = CycleRunner::new(&catalog, auth, config)?;

    let stop = Arc::new(StopSignal::new());
    watch_interrupt(stop.clone());

    runner.run(stop.clone()).await.context("cycle run failed")?;

    if stop.is_stopped() {
        Ok(ExitCode::Interrupted)
    } else {
        Ok(ExitCode::Success)
    }
}

pub async fn run_one(args: RunArgs) -> anyhow::Result<ExitCode> {
    let api = ApiClient::new(api_config(&args.connection));

    let plan: Vec<Arc<Scenario>> = if let Some(name) = &args.scenario {
        // collect only exists in the cycle set, so consult both catalogs.
        let scenario = stress_catalog(&api)
            .get(name)
            .or_else(|| cycle_catalog(&api).get(name))
            .with_context(|| format!("unknown scenario '{name}'"))?;
        vec![scenario]
    } else if let Some(draws) = args.random {
        let catalog = stress_catalog(&api);
        let mut rng = SmallRng::from_rng(&mut rand::rng());
        let mut plan = Vec::with_capacity(draws as usize);
        for _ in 0..draws {
            plan.push(select(&catalog, &mut rng)?);
        }
        plan
    } else {
        cycle_catalog(&api).scenarios().cloned().collect()
    };

    let session = Arc::new(Session::new());
    let auth = ApiAuthenticator::new(api);
    if !auth.login(&session).await {
        anyhow::bail!("login failed");
    }

    let stats = ResultAggregator::new();
    for (position, scenario) in plan.iter().enumerate() {
        if position > 0 && !args.interval.is_zero() {
            tokio::time::sleep(args.interval).await;
        }
        let record = execute(scenario, session.clone()).await;
        match &record.outcome {
            Outcome::Success { latency } => println!(
                "{}: ok in {:.2}ms",
                record.scenario,
                latency.as_secs_f64() * 1000.0
            ),
            Outcome::Failure { detail, .. } => {
                println!("{}: failed: {detail}", record.scenario);
            }
        }
        stats.record(&record);
    }
    stats.complete();

    let summary = stats.summary();
    if plan.len() > 1 {
        print!("{}", output::render_human(&summary));
    }
    if summary.fail_count == 0 {
        Ok(ExitCode::Success)
    } else {
        Ok(ExitCode::Failure)
    }
}

pub async fn check(args: ConnectionArgs) -> anyhow::Result<ExitCode> {
    let api = ApiClient::new(api_config(&args));
    api.check_connection()
        .await
        .context("target is not reachable")?;
    println!("connection ok: {}", api.config().base_url);

    let session = Arc::new(Session::new());
    let auth = ApiAuthenticator::new(api);
    if auth.login(&session).await {
        println!("login ok");
        Ok(ExitCode::Success)
    } else {
        println!("login failed");
        Ok(ExitCode::Failure)
    }
}
