mod actuators;
mod cli;
mod config;
mod procedure;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use tokio::io::{stdin, BufReader};
use tokio_util::sync::CancellationToken;

use actuators::esc::Esc;
use actuators::pwm::fake::Fake;
use actuators::pwm::pigpiod::Pigpiod;
use cli::{Backend, Cli};
use config::Config;
use procedure::Plan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
#[cfg(not(unix))]
use tokio::signal;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Impossible de créer le runtime")?;

    let result = runtime.block_on(start(cli));

    // Une lecture de stdin en attente bloquerait l'arrêt du runtime.
    runtime.shutdown_background();
    result
}

async fn start(cli: Cli) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    watch_signals(token.clone())?;

    let config = Config::new();
    let plan = Plan { calibrate: cli.calibrate };
    let input = BufReader::new(stdin());

    match cli.backend {
        Backend::Pigpiod => {
            let conn = Pigpiod::connect(&cli.host, cli.port).await?;
            procedure::run(Esc::new(conn, cli.pin, config, input), plan, token).await
        }

        #[cfg(feature = "real-actuators")]
        Backend::Gpio => {
            let conn = actuators::pwm::gpio::Gpio::new(cli.pin)?;
            procedure::run(Esc::new(conn, cli.pin, config, input), plan, token).await
        }

        Backend::Fake => {
            info!("[ESC] Mode simulé, aucune sortie matérielle.");
            let conn = Fake::new();
            let journal = conn.journal();
            let result = procedure::run(Esc::new(conn, cli.pin, config, input), plan, token).await;

            if let Ok(events) = journal.lock() {
                info!("[FAKE] {} commandes reçues.", events.len());
            }
            result
        }
    }
}

/// Annule `token` à la réception d'un signal d'arrêt.
/// Les handlers sont installés avant le retour pour ne rater aucun signal.
fn watch_signals(token: CancellationToken) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => {
                    warn!("[SIGNAL] Signal d'interruption reçu");
                },
                _ = terminate.recv() => {
                    warn!("[SIGNAL] Signal de terminaison reçu");
                },
            }
            token.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    warn!("[SIGNAL] Signal de contrôle C reçu");
                    token.cancel();
                }
                Err(e) => log::error!("[SIGNAL] Impossible d'écouter Ctrl-C: {}", e),
            }
        });
    }

    Ok(())
}
