use std::time::Duration;

use anyhow::{anyhow, bail};
use log::info;
use rppal::gpio::{Gpio as RpiGpio, OutputPin};

use super::PwmService;

const PERIOD: Duration = Duration::from_millis(20);

/// PWM logicielle directe sur une broche (sans démon).
pub struct Gpio {
    esc_pin: OutputPin,
}

impl Gpio {
    pub fn new(pin: u8) -> anyhow::Result<Self> {
        info!("[GPIO] Initialisation de la broche {} ...", pin);
        let gpio = RpiGpio::new()?;
        let esc_pin = gpio.get(pin)?.into_output_low();

        Ok(Gpio { esc_pin })
    }
}

impl PwmService for Gpio {
    async fn set_servo_pulsewidth(&mut self, pin: u8, width: u32) -> anyhow::Result<()> {
        if pin != self.esc_pin.pin() {
            bail!("[GPIO] Broche {} non initialisée (broche active: {})", pin, self.esc_pin.pin());
        }

        if width == 0 {
            self.esc_pin.clear_pwm().map_err(|x| anyhow!(x))?;
            self.esc_pin.set_low();
            return Ok(());
        }

        self.esc_pin
            .set_pwm(PERIOD, Duration::from_micros(width as u64))
            .map_err(|x| anyhow!(x))?;
        Ok(())
    }

    async fn stop(mut self) -> anyhow::Result<()> {
        self.esc_pin.clear_pwm().map_err(|x| anyhow!(x))?;
        self.esc_pin.set_low();
        info!("[GPIO] Broche {} libérée.", self.esc_pin.pin());
        Ok(())
    }
}
