//! glasslinkd: drives the glasses write scheduler over loopback links.
//!
//! Reads one command per line from stdin (see `help`) and prints one
//! result line per arm. Logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use glasslink_core::config::GlasslinkConfig;
use glasslink_core::payload;
use glasslink_core::{Arm, QueueResult, WriteTarget};
use glasslink_services::{LinkHandle, LoopbackLink, LoopbackOptions, ResultReceiver, WriteScheduler};

mod command;
mod status;

use command::{Command, Fault};

#[tokio::main]
async fn main() -> Result<()> {
    // Config before logging: the filter may come from the file.
    let written = GlasslinkConfig::write_default_if_missing();
    let loaded = GlasslinkConfig::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = written {
        tracing::warn!(error = %e, "failed to write default config");
    }
    if let Err(e) = loaded {
        tracing::warn!(error = %e, "failed to load config, using defaults");
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let _ = ctrl_c_tx.send(());
        }
    });

    let mut daemon = Daemon::new(&config);
    tracing::info!(
        left = %daemon.targets[Arm::Left.index()],
        right = %daemon.targets[Arm::Right.index()],
        "glasslinkd ready"
    );

    let mut shutdown = shutdown_tx.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break,
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else { break };

        match command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(cmd)) => daemon.execute(cmd, &shutdown_tx).await?,
            Ok(None) => {}
            Err(e) => println!("error: {e}"),
        }
    }

    for arm in Arm::ALL {
        daemon.scheduler.fail_queue(arm, "glasslinkd shutting down");
    }
    tracing::info!("glasslinkd stopped");
    Ok(())
}

struct Daemon {
    scheduler: Arc<WriteScheduler>,
    options: LoopbackOptions,
    targets: [WriteTarget; 2],
    links: [Option<Arc<LoopbackLink>>; 2],
}

impl Daemon {
    fn new(config: &GlasslinkConfig) -> Self {
        let mut daemon = Self {
            scheduler: WriteScheduler::shared(),
            options: LoopbackOptions::from(&config.loopback),
            targets: [
                WriteTarget::new(config.links.left_target.clone()),
                WriteTarget::new(config.links.right_target.clone()),
            ],
            links: [None, None],
        };
        for arm in Arm::ALL {
            daemon.bind(arm);
        }
        daemon
    }

    fn bind(&mut self, arm: Arm) {
        let link = LoopbackLink::spawn(self.scheduler.completion_sink(arm), self.options.clone());
        let target = self.targets[arm.index()].clone();
        self.scheduler.bind(arm, LinkHandle::new(link.clone(), target));
        self.links[arm.index()] = Some(link);
    }

    async fn execute(&mut self, cmd: Command, shutdown: &broadcast::Sender<()>) -> Result<()> {
        match cmd {
            Command::Send { arm, packets } => {
                log_packets(&packets);
                let rx = self.scheduler.submit(arm, &packets, "stdin");
                print_result(&wait(rx, shutdown).await);
            }
            Command::Both { packets } => {
                log_packets(&packets);
                let mut interrupted = shutdown.subscribe();
                tokio::select! {
                    results = self.scheduler.submit_same_to_both_arms_async(packets.as_slice(), "stdin") => {
                        print_result(&results.left);
                        print_result(&results.right);
                    }
                    _ = interrupted.recv() => println!("interrupted while waiting for both arms"),
                }
            }
            Command::Bind { arm } => {
                self.bind(arm);
                println!("{arm} bound to {}", self.targets[arm.index()]);
            }
            Command::Unbind { arm, reason } => {
                self.scheduler.unbind(arm, &reason);
                self.links[arm.index()] = None;
                println!("{arm} unbound");
            }
            Command::Fail { arm, reason } => {
                self.scheduler.fail_queue(arm, &reason);
                println!("{arm} queue failed");
            }
            Command::Inject { arm, fault } => match &self.links[arm.index()] {
                Some(link) => {
                    match fault {
                        Fault::Refuse => link.refuse_next(),
                        Fault::Fail => link.fail_next(1),
                    }
                    println!("{arm} fault armed");
                }
                None => println!("error: {arm} has no link bound"),
            },
            Command::Status => {
                let report = status::StatusReport::collect(&self.scheduler);
                let json = serde_json::to_string_pretty(&report)
                    .context("failed to serialize status")?;
                println!("{json}");
            }
            Command::Help => println!("{}", command::USAGE),
            Command::Quit => {}
        }
        Ok(())
    }
}

async fn wait(rx: ResultReceiver, shutdown: &broadcast::Sender<()>) -> QueueResult {
    rx.wait_until(&mut shutdown.subscribe()).await
}

fn log_packets(packets: &[Vec<u8>]) {
    for (index, packet) in packets.iter().enumerate() {
        tracing::debug!(packet = index, payload = %payload::to_hex(packet), "submitting");
    }
}

fn print_result(result: &QueueResult) {
    println!("{result}");
}
