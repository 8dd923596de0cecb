use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, ensure};
use network_monitor::{EventDispatcher, ProcfsResolver, pipeline};
use nix::unistd::geteuid;
use probe_common::{InstrumentationPort, ProbeRegistry, TracefsPort};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::{mpsc, watch},
};
use whitelist::WhitelistTable;

use crate::{cli::netlogd::NetlogdOpts, params::Parameters, utils::report_error};

mod config;

pub use config::{
    LOGGER_SECTION, NETLOG_SECTION, NetlogConfig, ProbesConfig, TRACEFS_SECTION, tracefs_path,
};

/// Events waiting to be written by the logger.
const EVENT_QUEUE_SIZE: usize = 4096;

pub async fn netlog_daemon_run(options: &NetlogdOpts) -> Result<()> {
    log::trace!("Netlog Daemon Options: {:?}", options);

    ensure!(geteuid().is_root(), "You must run this as root user!!!");

    let config = if let Some(custom_file) = &options.config_file {
        NetlogConfig::with_custom_file(custom_file)?
    } else {
        NetlogConfig::new()?
    };

    let tracefs = tracefs_path(&config.section(TRACEFS_SECTION))?;
    let mut port = TracefsPort::new(tracefs).context("Error opening tracefs")?;
    port.clear_stale();
    let trace_pipe = port.trace_pipe();

    let registry = Arc::new(ProbeRegistry::new(port));
    let whitelist = Arc::new(WhitelistTable::new());
    let params = Parameters::new(registry.clone(), whitelist.clone());

    let logger_config = event_logger::Config::try_from(&config.section(LOGGER_SECTION))?;
    let (tx_logger_config, rx_logger_config) = watch::channel(logger_config);
    let (tx_events, rx_events) = mpsc::channel(EVENT_QUEUE_SIZE);
    let logger_handle = tokio::spawn(event_logger::logger_task(rx_events, rx_logger_config));

    let dispatcher = EventDispatcher::new(ProcfsResolver::default(), whitelist, tx_events)
        .with_armed_probes(registry.armed());
    // the pipeline must be stopped before the whitelist is destroyed
    let result = pipeline::run(
        trace_pipe,
        Arc::new(dispatcher),
        serve(config, &params, &tx_logger_config),
    )
    .await;

    log::info!("Terminating netlog daemon...");
    registry.unplant_all();
    params.whitelist().destroy();
    // the dispatcher owned the last event sender: the logger stops once the
    // queue is drained
    if tokio::time::timeout(Duration::from_secs(1), logger_handle)
        .await
        .is_err()
    {
        log::warn!("Logger didn't stop in time");
    }

    result
}

/// Apply the configuration and wait for signals.
async fn serve<P: InstrumentationPort>(
    mut config: NetlogConfig,
    params: &Parameters<P>,
    logger_config: &watch::Sender<event_logger::Config>,
) -> Result<()> {
    let mut sig_int = signal(SignalKind::interrupt())?;
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_hup = signal(SignalKind::hangup())?;

    ProbesConfig::try_from(&config.section(NETLOG_SECTION))?.apply(params)?;

    loop {
        tokio::select! {
            _ = sig_int.recv() => {
                log::trace!("SIGINT received");
                return Ok(());
            }
            _ = sig_term.recv() => {
                log::trace!("SIGTERM received");
                return Ok(());
            }
            _ = sig_hup.recv() => {
                log::trace!("SIGHUP received");
                match reload(&config, params, logger_config) {
                    Ok(new_config) => config = new_config,
                    Err(e) => report_error(&e.context("Reloading configuration failed")),
                }
            }
        }
    }
}

fn reload<P: InstrumentationPort>(
    config: &NetlogConfig,
    params: &Parameters<P>,
    logger_config: &watch::Sender<event_logger::Config>,
) -> Result<NetlogConfig> {
    log::info!(
        "Reloading configuration from {}",
        config.config_file().display()
    );
    let config = config.reload()?;
    let logger = event_logger::Config::try_from(&config.section(LOGGER_SECTION))?;
    let probes = ProbesConfig::try_from(&config.section(NETLOG_SECTION))?;
    logger_config.send_replace(logger);
    probes.apply(params)?;
    Ok(config)
}
