//! Core engine — simulate → settle → commit.

pub mod director;
pub mod noise;
pub mod settlement;
pub mod simulation;

pub use director::{RaceDirector, RaceReport, RaceRequest};
pub use noise::{NoNoise, NoiseSource, UniformNoise};
pub use settlement::{PrizePool, Settlement};
pub use simulation::{RaceOutcome, RaceSettings};
