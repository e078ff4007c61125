use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use log::info;
use tokio::time::Instant;

use super::PwmService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    PulseWidth { pin: u8, width: u32 },
    Stop,
}

pub type Journal = Arc<Mutex<Vec<(Instant, Event)>>>;

/// Service PWM simulé : journalise les commandes reçues.
pub struct Fake {
    journal: Journal,
    calls: usize,
    fail_at: Option<usize>,
}

impl Fake {
    pub fn new() -> Self {
        Fake {
            journal: Arc::new(Mutex::new(Vec::new())),
            calls: 0,
            fail_at: None,
        }
    }

    /// Refuse la n-ième commande de largeur (à partir de 0).
    #[cfg(test)]
    pub fn failing_at(n: usize) -> Self {
        Fake { fail_at: Some(n), ..Fake::new() }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn record(&self, event: Event) -> anyhow::Result<()> {
        self.journal
            .lock()
            .map_err(|_| anyhow!("[FAKE] Journal inaccessible"))?
            .push((Instant::now(), event));
        Ok(())
    }
}

impl PwmService for Fake {
    async fn set_servo_pulsewidth(&mut self, pin: u8, width: u32) -> anyhow::Result<()> {
        let call = self.calls;
        self.calls += 1;

        if self.fail_at == Some(call) {
            return Err(anyhow!("[FAKE] Commande {} refusée", call));
        }

        info!("[FAKE] GPIO {} -> {} µs", pin, width);
        self.record(Event::PulseWidth { pin, width })
    }

    async fn stop(self) -> anyhow::Result<()> {
        info!("[FAKE] Connexion fermée.");
        self.record(Event::Stop)
    }
}

/// Largeurs envoyées, dans l'ordre.
#[cfg(test)]
pub fn widths(journal: &Journal) -> Vec<u32> {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter_map(|(_, e)| match e {
            Event::PulseWidth { width, .. } => Some(*width),
            Event::Stop => None,
        })
        .collect()
}
