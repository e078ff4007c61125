pub mod fake;
pub mod pigpiod;

#[cfg(feature = "real-actuators")]
pub mod gpio;

/// Service de génération PWM (mode servo, trame 20 ms).
#[allow(async_fn_in_trait)]
pub trait PwmService: Sized {
    /// Défini la largeur d'impulsion (µs) sur la broche. 0 coupe les impulsions.
    async fn set_servo_pulsewidth(&mut self, pin: u8, width: u32) -> anyhow::Result<()>;

    /// Libère la connexion au service.
    async fn stop(self) -> anyhow::Result<()>;
}
