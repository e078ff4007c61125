use std::time::Duration;

use anyhow::{bail, Context};
use log::info;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};
use tokio::time::sleep;

use crate::actuators::pwm::PwmService;
use crate::config::Config;

const CALIBRATE_PROMPT: &str = "Branchez l'alimentation puis appuyez sur Entrée pour calibrer...";
const RUN_UP_PROMPT: &str = "Appuyez sur Entrée pour lancer le test de montée en régime...";

/// ESC Turnigy (testé avec un Plush 30A), piloté en largeur d'impulsion.
pub struct Esc<P, I> {
    conn: P,
    pin: u8,
    config: Config,
    input: I,
}

impl<P: PwmService, I: AsyncBufRead + Unpin> Esc<P, I> {
    /// `input` fournit les confirmations de l'opérateur (stdin en général).
    pub fn new(conn: P, pin: u8, config: Config, input: I) -> Self {
        info!("[ESC] Initialisation sur la broche {} ...", pin);
        Esc { conn, pin, config, input }
    }

    /// Défini la largeur d'impulsion (µs, 0 coupe les impulsions) puis attend `snooze`.
    pub async fn pwm(&mut self, width: u32, snooze: Duration) -> anyhow::Result<()> {
        info!("[ESC] Largeur d'impulsion {} µs pendant {} s.", width, snooze.as_secs_f64());
        self.conn.set_servo_pulsewidth(self.pin, width).await?;

        if !snooze.is_zero() {
            sleep(snooze).await;
        }

        Ok(())
    }

    /// Apprend la plage complète (min - max) à l'ESC.
    /// A faire seulement au changement de contrôleur / émetteur.
    /// ATTENTION: si l'ESC est déjà calibré, il passe brièvement plein gaz !
    pub async fn calibrate(&mut self) -> anyhow::Result<()> {
        info!("[ESC] Calibration ...");
        let (min, max) = (self.config.min_width, self.config.max_width);

        self.pwm(max, Duration::ZERO).await?;
        self.confirm(CALIBRATE_PROMPT).await?;
        // Doc officielle : "environ 2 secondes".
        self.pwm(max, Duration::from_secs(2)).await?;
        // Le temps des bips (nombre d'éléments, etc).
        self.pwm(min, Duration::from_secs(4)).await?;

        info!("[ESC] Calibration terminée.");
        Ok(())
    }

    /// Arme l'ESC. Obligatoire à chaque mise sous tension.
    pub async fn arm(&mut self) -> anyhow::Result<()> {
        info!("[ESC] Armement ...");
        self.pwm(self.config.min_width, Duration::from_secs(4)).await?;
        info!("[ESC] Armé.");
        Ok(())
    }

    /// Test de montée puis descente en régime, pour trouver les bornes utiles.
    pub async fn test(&mut self) -> anyhow::Result<()> {
        let run_up = self.config.run_up.clone();

        self.confirm(RUN_UP_PROMPT).await?;

        info!("[ESC] Montée ...");
        for width in run_up.ramp_up() {
            self.pwm(width, run_up.up_snooze).await?;
        }

        sleep(run_up.top_hold).await;

        info!("[ESC] Maintien au maximum ...");
        info!("[ESC] Descente ...");
        for width in run_up.ramp_down() {
            self.pwm(width, run_up.down_snooze).await?;
        }

        Ok(())
    }

    /// Ralenti, coupe les impulsions puis libère le service PWM.
    /// Doit tourner sur toutes les sorties, même en cas d'arrêt brutal.
    pub async fn halt(mut self) -> anyhow::Result<()> {
        info!("[ESC] Ralentissement ...");
        // Cette seconde semble *accélérer* l'arrêt.
        let slowed = self.pwm(self.config.min_width, Duration::from_secs(1)).await;

        info!("[ESC] Failsafe ...");
        let failsafe = self.pwm(0, Duration::ZERO).await;

        info!("[ESC] Libération du GPIO.");
        let stopped = self.conn.stop().await;

        slowed.and(failsafe).and(stopped)?;
        info!("[ESC] Arrêté.");
        Ok(())
    }

    /// Attend que l'opérateur valide avec Entrée.
    async fn confirm(&mut self, prompt: &str) -> anyhow::Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line).await.context("[ESC] Lecture de la confirmation impossible")?;
        if read == 0 {
            bail!("[ESC] Entrée standard fermée avant confirmation");
        }

        Ok(())
    }
}
