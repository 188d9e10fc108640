pub mod accrual;
pub mod accrual_cycle;
pub mod audit;
pub mod followup;
pub mod scheduler;
pub mod tasks;
pub mod visits;
