use types::phase0::{containers::Validator, primitives::Gwei};

pub trait ValidatorSummary {
    fn update_from(&mut self, validator: &Validator);
}

pub trait EpochDeltas: Copy {
    fn combined_reward(self) -> Gwei;
    fn combined_penalty(self) -> Gwei;
}
