use std::time::Duration;

/// Constantes de l'ESC (Turnigy Plush 30A). Trouvées par essais successifs.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) min_width: u32,
    pub(crate) max_width: u32,
    pub(crate) run_up: RunUp,
}

/// Profil du test de montée en régime.
#[derive(Debug, Clone)]
pub struct RunUp {
    pub(crate) floor: u32,
    pub(crate) ceiling: u32,
    pub(crate) step: u32,
    pub(crate) up_snooze: Duration,
    pub(crate) top_hold: Duration,
    pub(crate) down_snooze: Duration,
}

impl Config {
    pub fn new() -> Self {
        // Certaines batteries (ou alim 12V) plafonnent bien avant 2400 (~1350),
        // mais on garde toute la plage pour la résolution.
        let min_width = 650;
        let max_width = 2400;

        let config = Config {
            min_width,
            max_width,
            run_up: RunUp {
                floor: min_width + 80,
                ceiling: max_width - 1330,
                step: 9,
                up_snooze: Duration::from_millis(300),
                top_hold: Duration::from_secs(1),
                down_snooze: Duration::from_millis(100),
            },
        };

        config
    }
}

impl RunUp {
    /// Largeurs envoyées pendant la montée : [floor, ceiling[ par pas de `step`.
    pub(crate) fn ramp_up(&self) -> impl Iterator<Item = u32> {
        (self.floor..self.ceiling).step_by(self.step as usize)
    }

    /// Largeurs envoyées pendant la descente : ]floor, ceiling] par pas de `step`.
    pub(crate) fn ramp_down(&self) -> impl Iterator<Item = u32> {
        let floor = self.floor;
        let step = self.step;
        std::iter::successors(Some(self.ceiling), move |w| w.checked_sub(step))
            .take_while(move |w| *w > floor)
    }
}
