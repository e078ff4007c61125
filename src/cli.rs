use clap::{Parser, ValueEnum};

/// Pilote d'ESC : armement, test de montée en régime puis arrêt.
#[derive(Debug, Parser, Clone)]
pub struct Cli {
    /// Broche GPIO (BCM) reliée au signal de l'ESC.
    #[arg(long, default_value_t = 4)]
    pub pin: u8,

    /// Calibre la plage de l'ESC avant l'armement (plein gaz bref !).
    #[arg(long)]
    pub calibrate: bool,

    /// Service générant les impulsions.
    #[arg(long, value_enum, default_value_t = Backend::Pigpiod)]
    pub backend: Backend,

    /// Hôte du démon pigpiod.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port du démon pigpiod.
    #[arg(long, default_value_t = 8888)]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Démon pigpiod via socket.
    Pigpiod,
    /// PWM logicielle directe (rppal).
    #[cfg(feature = "real-actuators")]
    Gpio,
    /// Aucun matériel, journalise seulement.
    Fake,
}
