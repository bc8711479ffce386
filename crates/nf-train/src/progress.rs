use std::path::PathBuf;

use nf_results::{CheckpointRecord, Phase};

/// Emitted once per evaluation.
#[derive(Debug, Clone)]
pub struct CheckpointEvent {
    pub iteration: usize,
    pub phase: Phase,
    /// Full-trajectory MAE
    pub total_loss: f64,
    pub loss_avg: f64,
    pub time_avg_s: f64,
    pub image: Option<PathBuf>,
}

impl CheckpointEvent {
    /// `Iter 0020 | Total Loss 0.123456`; a diverged loss prints as `nan`.
    pub fn console_line(&self) -> String {
        if self.total_loss.is_nan() {
            format!("Iter {:04} | Total Loss nan", self.iteration)
        } else {
            format!("Iter {:04} | Total Loss {:.6}", self.iteration, self.total_loss)
        }
    }
}

impl From<&CheckpointEvent> for CheckpointRecord {
    fn from(event: &CheckpointEvent) -> Self {
        CheckpointRecord {
            iteration: event.iteration,
            phase: event.phase.clone(),
            total_loss: event.total_loss,
            loss_avg: event.loss_avg,
            time_avg_s: event.time_avg_s,
            image: event.image.as_ref().map(|p| p.display().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(iteration: usize, total_loss: f64) -> CheckpointEvent {
        CheckpointEvent {
            iteration,
            phase: Phase::Minibatch,
            total_loss,
            loss_avg: 0.0,
            time_avg_s: 0.0,
            image: None,
        }
    }

    #[test]
    fn console_line_format() {
        assert_eq!(event(20, 0.5).console_line(), "Iter 0020 | Total Loss 0.500000");
        assert_eq!(event(12345, 1.0 / 3.0).console_line(), "Iter 12345 | Total Loss 0.333333");
    }

    #[test]
    fn non_finite_losses_print_lowercase() {
        assert_eq!(event(1, f64::NAN).console_line(), "Iter 0001 | Total Loss nan");
        assert_eq!(event(2, f64::INFINITY).console_line(), "Iter 0002 | Total Loss inf");
        assert_eq!(event(3, f64::NEG_INFINITY).console_line(), "Iter 0003 | Total Loss -inf");
    }

    #[test]
    fn record_keeps_image_path() {
        let mut e = event(3, 0.1);
        e.image = Some(PathBuf::from("png/000.png"));
        let record = CheckpointRecord::from(&e);
        assert_eq!(record.image.as_deref(), Some("png/000.png"));
        assert_eq!(record.iteration, 3);
    }
}
