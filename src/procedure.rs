use log::warn;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;

use crate::actuators::esc::Esc;
use crate::actuators::pwm::PwmService;

/// Séquences à dérouler avant l'arrêt.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plan {
    /// Recommandé au changement d'émetteur / contrôleur.
    pub calibrate: bool,
}

async fn sequence<P, I>(esc: &mut Esc<P, I>, plan: Plan) -> anyhow::Result<()>
where
    P: PwmService,
    I: AsyncBufRead + Unpin,
{
    if plan.calibrate {
        esc.calibrate().await?;
    }

    esc.arm().await?;
    esc.test().await?;
    Ok(())
}

/// Déroule le plan puis arrête l'ESC, une seule fois, quelle que soit l'issue.
/// Une interruption via `token` n'est pas une erreur.
pub async fn run<P, I>(mut esc: Esc<P, I>, plan: Plan, token: CancellationToken) -> anyhow::Result<()>
where
    P: PwmService,
    I: AsyncBufRead + Unpin,
{
    let result = tokio::select! {
        biased;
        _ = token.cancelled() => {
            warn!("[ESC] Séquence interrompue.");
            Ok(())
        }
        r = sequence(&mut esc, plan) => r,
    };

    let halted = esc.halt().await;

    // L'erreur de la séquence prime sur celle de l'arrêt.
    result.and(halted)
}
