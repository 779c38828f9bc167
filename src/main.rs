#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::io::Write;
use std::net::TcpListener;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use clap::Parser;
use outage_mock::cli::{Cli, LogFormat};
use outage_mock::display::Display;
use outage_mock::{cleanup, serve, Config, Controller, Error, Metrics, StopReason, Tuning};
use tracing::{error, info, warn};

fn init_tracing(format: LogFormat) {
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => fmt.json().init(),
        LogFormat::Text => fmt.init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some((path, delay)) = cli.helper_job() {
        cleanup::run_helper(&path, delay).await;
        return ExitCode::SUCCESS;
    }
    init_tracing(cli.log_format);
    let config = match cli.to_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "rejected configuration");
            eprintln!("error: {e}");
            return ExitCode::from(e.exit_code());
        }
    };
    match run(config, cli.listen).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "run failed");
            ExitCode::from(e.downcast_ref::<Error>().map_or(1, Error::exit_code))
        }
    }
}

// stdout may be a closed pipe; losing output must not skip cleanup
fn say(line: &str) {
    if let Err(e) = writeln!(std::io::stdout().lock(), "{line}") {
        warn!(error = %e, "stdout write failed");
    }
}

fn show_row(display: &Display, ctrl: &Controller) {
    if let Err(e) = display.print_row(&mut std::io::stdout().lock(), &ctrl.status()) {
        warn!(error = %e, "status row write failed");
    }
}

async fn run(config: Config, listen: Option<String>) -> AnyResult<()> {
    let metrics = Metrics::new()?;
    let tuning = Tuning::default();
    let display = Display::new(&config, tuning.cores);
    let every = tuning.status_interval;
    let listener = listen
        .map(|addr| TcpListener::bind(&addr).with_context(|| format!("bind {addr}")))
        .transpose()?;
    let ctrl = Arc::new(Controller::new(config, tuning, metrics));

    {
        let mut out = std::io::stdout().lock();
        if let Err(e) = display.banner(&mut out).and_then(|()| display.header(&mut out)) {
            warn!(error = %e, "banner write failed");
        }
    }

    if let Err(e) = ctrl.start() {
        ctrl.cleanup().await;
        return Err(e).context("start actuators");
    }

    let http = match listener.map(|l| serve(l, Arc::clone(&ctrl))).transpose() {
        Ok(server) => server.map(|server| {
            let handle = server.handle();
            tokio::spawn(async move {
                if let Err(e) = server.await {
                    error!(error = %e, "http surface failed");
                }
            });
            handle
        }),
        Err(e) => {
            error!(error = %e, "http surface not started");
            None
        }
    };

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut signalled = false;
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    let reason = loop {
        tokio::select! {
            reason = ctrl.wait() => break reason,
            () = &mut shutdown, if !signalled => {
                signalled = true;
                say("Received shutdown signal, shutting down...");
                ctrl.stop();
            }
            _ = ticker.tick() => show_row(&display, &ctrl),
        }
    };
    if reason == StopReason::Expired {
        say("Duration completed, shutting down...");
    }

    ctrl.cleanup().await;
    if let Some(handle) = http {
        handle.stop(true).await;
    }
    show_row(&display, &ctrl);
    info!(?reason, "run finished");
    say("Resource mock completed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
