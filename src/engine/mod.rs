//! Wagering engines — race lifecycle, bet placement, settlement, deletion.

pub mod deletion;
pub mod lifecycle;
pub mod settlement;
pub mod wagering;
