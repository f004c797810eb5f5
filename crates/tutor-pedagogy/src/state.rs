use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tutor_core::types::clamp_level;

/// Per-user pedagogical state: effective levels, the embedding of the last
/// exchange, and when it was last updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentState {
    pub programming_level: f32,
    pub maths_level: f32,
    pub last_embedding: Option<Vec<f32>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for StudentState {
    fn default() -> Self {
        Self {
            programming_level: 2.5,
            maths_level: 2.5,
            last_embedding: None,
            last_updated: None,
        }
    }
}

impl StudentState {
    /// Drifts both effective levels toward the observed difficulty by `step`,
    /// clamped to [1.0, 5.0], then replaces the last embedding and timestamp.
    pub fn apply_update(
        &mut self,
        programming_difficulty: u8,
        maths_difficulty: u8,
        step: f32,
        combined_embedding: Option<Vec<f32>>,
        now: DateTime<Utc>,
    ) {
        self.programming_level = drift(self.programming_level, programming_difficulty as f32, step);
        self.maths_level = drift(self.maths_level, maths_difficulty as f32, step);
        if let Some(embedding) = combined_embedding {
            self.last_embedding = Some(embedding);
        }
        self.last_updated = Some(now);
    }
}

fn drift(current: f32, target: f32, step: f32) -> f32 {
    let delta = (target - current).clamp(-step, step);
    clamp_level(current + delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_moves_toward_target_by_step() {
        assert_eq!(drift(2.5, 5.0, 0.05), 2.55);
        assert_eq!(drift(2.5, 1.0, 0.05), 2.45);
    }

    #[test]
    fn drift_does_not_overshoot_close_target() {
        assert_eq!(drift(3.0, 3.02, 0.05), 3.02);
    }

    #[test]
    fn apply_update_clamps_and_refreshes_timestamp() {
        let mut state = StudentState {
            programming_level: 4.98,
            maths_level: 2.5,
            last_embedding: None,
            last_updated: None,
        };
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        state.apply_update(5, 3, 0.05, Some(vec![0.1, 0.2]), now);
        assert!(state.programming_level <= 5.0);
        assert_eq!(state.last_updated, Some(now));
        assert_eq!(state.last_embedding, Some(vec![0.1, 0.2]));
    }
}
