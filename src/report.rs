use std::fs::File;
use std::io;
use std::path::Path;

use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::environment::{EpisodeStatus, TrainingObserver};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub outcome: EpisodeStatus,
    pub steps: usize,
    pub total_reward: f64,
    pub final_exploration_rate: f64,
}

impl EpisodeSummary {
    pub fn reached_goal(&self) -> bool {
        self.outcome == EpisodeStatus::Done
    }
}

/// Per-episode results of a training run.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    episodes: Vec<EpisodeSummary>,
}

impl TrainingReport {
    pub fn from_summaries(episodes: Vec<EpisodeSummary>) -> Self {
        TrainingReport { episodes }
    }

    pub fn episodes(&self) -> &[EpisodeSummary] {
        &self.episodes
    }

    pub fn successes(&self) -> usize {
        self.episodes.iter().filter(|e| e.reached_goal()).count()
    }

    pub fn success_rate(&self) -> f64 {
        if self.episodes.is_empty() {
            0.0
        } else {
            self.successes() as f64 / self.episodes.len() as f64
        }
    }

    /// Mean total reward over each full window of consecutive episodes.
    pub fn moving_average_reward(&self, window: usize) -> Vec<f64> {
        if window == 0 {
            return Vec::new();
        }
        self.episodes
            .windows(window)
            .map(|w| w.iter().map(|e| e.total_reward).sum::<f64>() / window as f64)
            .collect()
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = Writer::from_writer(writer);
        for episode in &self.episodes {
            wtr.serialize(episode)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.write_csv(File::create(path)?)?;
        info!(path = %path.display(), episodes = self.episodes.len(), "training report written");
        Ok(())
    }
}

impl TrainingObserver for TrainingReport {
    fn on_episode(&mut self, summary: &EpisodeSummary) {
        self.episodes.push(summary.clone());
    }
}
