use burn::train::{
    checkpoint::{CheckpointingAction, CheckpointingStrategy},
    metric::store::EventStoreClient,
};
use derive_new::new;

/// Saves a checkpoint on the first epoch and every `every` epochs after it.
/// Checkpoints are never deleted.
#[derive(new, Debug, Clone, Copy)]
pub struct EveryNEpochs {
    every: usize,
}

impl EveryNEpochs {
    /// `epoch` starts at 1.
    pub fn should_save(&self, epoch: usize) -> bool {
        self.every > 0 && epoch > 0 && (epoch - 1) % self.every == 0
    }
}

impl CheckpointingStrategy for EveryNEpochs {
    fn checkpointing(
        &mut self,
        epoch: usize,
        _collector: &EventStoreClient,
    ) -> Vec<CheckpointingAction> {
        if self.should_save(epoch) {
            tracing::debug!("Checkpointing epoch {}", epoch);
            vec![CheckpointingAction::Save]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_first_epoch_then_every_n() {
        let strategy = EveryNEpochs::new(50);

        let saved: Vec<usize> = (1..=120).filter(|&e| strategy.should_save(e)).collect();

        assert_eq!(saved, vec![1, 51, 101]);
    }

    #[test]
    fn zero_disables_checkpoints() {
        let strategy = EveryNEpochs::new(0);

        assert!((1..10).all(|e| !strategy.should_save(e)));
    }
}
