//! Running totals for a simulation session

use log::info;

/// Counters updated by the world as it ticks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimStats {
    pub ticks: u32,
    pub elapsed_time: f32,
    pub total_trains_added: u32,
    pub total_accidents: u32,
    pub total_horns: u32,
    pub active_trains: u32,
    pub total_segments: u32,
    pub total_signals: u32,
}

impl SimStats {
    /// Share of placed trains that are still running
    pub fn survival_rate(&self) -> f32 {
        if self.total_trains_added > 0 {
            (self.active_trains as f32 / self.total_trains_added as f32) * 100.0
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        info!("=== SIMULATION COMPLETE ===");
        info!("Elapsed time: {:.2}s over {} ticks", self.elapsed_time, self.ticks);
        info!("Total trains added: {}", self.total_trains_added);
        info!("Active trains: {}", self.active_trains);
        info!("Total accidents: {}", self.total_accidents);
        info!("Horn signals: {}", self.total_horns);
        info!("Total segments: {}", self.total_segments);
        info!("Total signals: {}", self.total_signals);
        info!("Survival rate: {:.1}%", self.survival_rate());
    }
}
