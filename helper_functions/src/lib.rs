pub mod accessors;
pub mod altair;
pub mod bellatrix;
pub mod error;
pub mod fork;
pub mod misc;
pub mod mutators;
pub mod phase0;
pub mod predicates;
pub mod signing;
pub mod slot_report;
pub mod verifier;
