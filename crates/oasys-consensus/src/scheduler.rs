// oasys-consensus/src/scheduler.rs

//! Per-epoch proposer schedule.
//!
//! Built once per `(environment, epoch start, chooser)` and shared; the
//! choice stream is pre-computed for the epoch and grown on demand when a
//! turn lookup runs past its end.

use crate::chooser::WeightedChooser;
use crate::environment::EnvironmentValue;
use crate::{diff_in_turn, diff_no_turn, total_supply, EngineError, BACKOFF_WIGGLE_TIME};
use oasys_chain::types::{Amount, BlockNumber};
use oasys_crypto::Address;
use std::collections::HashMap;
use std::sync::Mutex;

/// Extended-difficulty floor: `totalSupply / validatorThreshold`
pub fn min_difficulty(environment: &EnvironmentValue) -> Amount {
    let floor = total_supply().div_floor(&environment.validator_threshold);
    if floor.is_zero() {
        diff_no_turn()
    } else {
        floor
    }
}

struct SchedulerInner {
    chooser: WeightedChooser,
    choices: Vec<Address>,
    turns: HashMap<BlockNumber, HashMap<Address, usize>>,
}

impl SchedulerInner {
    fn choice_at(&mut self, index: usize) -> Address {
        while self.choices.len() <= index {
            let next = self.chooser.random();
            self.choices.push(next);
        }
        self.choices[index]
    }
}

/// Deterministic proposer schedule for one epoch
pub struct Scheduler {
    environment: EnvironmentValue,
    start_block: BlockNumber,
    validators: Vec<Address>,
    inner: Mutex<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        environment: EnvironmentValue,
        start_block: BlockNumber,
        mut chooser: WeightedChooser,
    ) -> Self {
        let validators = chooser.validators().to_vec();
        let mut choices = Vec::with_capacity(environment.epoch_period as usize);
        for _ in 0..environment.epoch_period {
            choices.push(chooser.random());
        }

        Self {
            environment,
            start_block,
            validators,
            inner: Mutex::new(SchedulerInner {
                chooser,
                choices,
                turns: HashMap::new(),
            }),
        }
    }

    pub fn environment(&self) -> &EnvironmentValue {
        &self.environment
    }

    pub fn start_block(&self) -> BlockNumber {
        self.start_block
    }

    pub fn exists(&self, validator: &Address) -> bool {
        self.validators.contains(validator)
    }

    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// The in-turn validator for the given block
    pub fn expect(&self, number: BlockNumber) -> Result<Address, EngineError> {
        let index = self.stream_index(number)?;
        Ok(self.inner.lock().unwrap().choice_at(index))
    }

    /// The epoch's ordered proposer assignment (slashing input)
    pub fn schedules(&self) -> Vec<Address> {
        let mut inner = self.inner.lock().unwrap();
        let period = self.environment.epoch_period as usize;
        inner.choice_at(period.saturating_sub(1));
        inner.choices[..period].to_vec()
    }

    /// The validator's rank at the given block: 0 for the in-turn validator,
    /// then first-seen order along the choice stream starting at the block's
    /// position.
    pub fn turn(&self, number: BlockNumber, validator: &Address) -> Result<usize, EngineError> {
        if !self.exists(validator) {
            return Err(EngineError::UnauthorizedValidator);
        }
        let start = self.stream_index(number)?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(turns) = inner.turns.get(&number) {
            return Ok(turns[validator]);
        }

        let mut turns: HashMap<Address, usize> = HashMap::with_capacity(self.validators.len());
        let mut position = start;
        while turns.len() < self.validators.len() {
            let chosen = inner.choice_at(position);
            let rank = turns.len();
            turns.entry(chosen).or_insert(rank);
            position += 1;
        }

        let rank = turns[validator];
        inner.turns.insert(number, turns);
        Ok(rank)
    }

    /// Seconds the validator must wait past `parent.time + blockPeriod`
    pub fn back_off_time(&self, number: BlockNumber, validator: &Address) -> u64 {
        match self.turn(number, validator) {
            Ok(0) | Err(_) => 0,
            Ok(turn) => turn as u64 + BACKOFF_WIGGLE_TIME,
        }
    }

    /// Schedule difficulty of a seal by `validator` at `number`
    pub fn difficulty(&self, number: BlockNumber, validator: &Address, extended: bool) -> Amount {
        if !extended {
            return match self.expect(number) {
                Ok(expected) if expected == *validator => diff_in_turn(),
                _ => diff_no_turn(),
            };
        }
        match self.turn(number, validator) {
            Ok(turn) => min_difficulty(&self.environment)
                .scaled((self.validators.len() - turn) as u64),
            Err(_) => diff_no_turn(),
        }
    }

    fn stream_index(&self, number: BlockNumber) -> Result<usize, EngineError> {
        number
            .checked_sub(self.start_block)
            .map(|index| index as usize)
            .ok_or(EngineError::UnknownBlock)
    }
}
