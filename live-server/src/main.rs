//! Binary entry point: loads configuration, wires up logging, and runs the RTMP service loop.

mod app;
mod config;

use std::sync::Arc;

use clap::Parser;
use scuffle_context::ContextFutExt;
use scuffle_live::RtmpHandler;
use scuffle_rtmp::ServerSession;
use scuffle_settings::Cli;
use scuffle_signal::SignalHandler;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::app::App;
use crate::config::{LogRotation, ServiceProtocol, ServiceTransport};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (settings, domains) = config::load(&cli.config)?;

    let _log_guard = init_logging(&settings.log);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.threads.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(run(settings, domains))
}

/// Sets up a `tracing` subscriber per the config's `log` block: stdout always, plus a rolling
/// file appender when `path` is set. Returns the file appender's guard, which must stay alive for
/// the process lifetime or buffered lines are lost on exit.
fn init_logging(log: &config::LogSettings) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(log.level.as_tracing_level().into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer());

    let Some(path) = &log.path else {
        registry.init();
        return None;
    };

    let rotation = match log.rotate {
        LogRotation::Day => tracing_appender::rolling::Rotation::DAILY,
        LogRotation::Hour => tracing_appender::rolling::Rotation::HOURLY,
        LogRotation::Minute => tracing_appender::rolling::Rotation::MINUTELY,
        LogRotation::Never => tracing_appender::rolling::Rotation::NEVER,
    };
    let file_name = if log.name.is_empty() { "live-server.log" } else { log.name.as_str() };
    let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, path, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    registry.with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)).init();
    Some(guard)
}

async fn run(settings: config::Settings, domains: Vec<config::DomainConfig>) -> anyhow::Result<()> {
    let (ctx, handler) = scuffle_context::Context::new();
    let app = App::new(settings, domains);

    let mut listeners = Vec::new();
    for service in &app.settings.service {
        if service.protocol != ServiceProtocol::Rtmp || service.transport != ServiceTransport::Tcp {
            tracing::warn!(addr = %service.addr, port = service.port, "skipping unsupported service entry");
            continue;
        }

        let addr = format!("{}:{}", service.addr, service.port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "listening for rtmp connections");
        listeners.push(listener);
    }

    let sweeper = {
        let registry = app.registry.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { registry.run_sweeper(ctx, std::time::Duration::from_secs(5)).await })
    };

    let mut accept_tasks = Vec::new();
    for listener in listeners {
        let app = app.clone();
        let ctx = ctx.clone();
        accept_tasks.push(tokio::spawn(accept_loop(listener, app, ctx)));
    }

    let mut signal_handler = SignalHandler::new()
        .with_signal(scuffle_signal::SignalKind::Interrupt)
        .with_signal(scuffle_signal::SignalKind::Terminate);

    tokio::select! {
        signal = signal_handler.recv() => {
            tracing::info!(?signal, "received shutdown signal");
        }
        _ = ctx.done() => {}
    }

    handler.shutdown().await;
    sweeper.abort();
    for task in accept_tasks {
        task.abort();
    }

    Ok(())
}

async fn accept_loop(listener: TcpListener, app: Arc<App>, ctx: scuffle_context::Context) {
    loop {
        let accepted = listener.accept().with_context(&ctx).await;
        let Some(accepted) = accepted else {
            return;
        };

        let (socket, peer_addr) = match accepted {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%err, "failed to accept connection");
                continue;
            }
        };

        let app = app.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, peer_addr.to_string(), app, ctx).await {
                tracing::debug!(%err, %peer_addr, "rtmp session ended with an error");
            }
        });
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    peer_addr: String,
    app: Arc<App>,
    ctx: scuffle_context::Context,
) -> anyhow::Result<()> {
    let (tx, rx) = scuffle_rtmp::outgoing_channel();
    let registry = app.registry.clone();
    let handler = RtmpHandler::new(registry, app, peer_addr, tx, ctx.clone());
    let session = ServerSession::new(socket, handler).with_context(ctx).with_outgoing(rx);
    session.run().await?;
    Ok(())
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use clap::Parser;

    #[test]
    fn cli_accepts_a_config_path() {
        let cli = scuffle_settings::Cli::try_parse_from(["live-server", "config.json"]);
        assert!(cli.is_ok());
    }
}
