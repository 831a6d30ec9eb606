pub mod aggregator;
pub mod allocation;
pub mod demand;
pub mod emissions;
pub mod optimiser;
pub mod scenario;
pub mod shares;
pub mod solvers;
pub mod technology;
pub mod units;
