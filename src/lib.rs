//! crew-bidder core
//!
//! Watches an airline crew portal for open time and submits trip swaps that
//! improve a crewmember's monthly schedule.

pub mod error;
pub mod calendar;
pub mod clock;
pub mod model;
pub mod config;
pub mod traits;
pub mod score;
pub mod overlap;
pub mod filter;
pub mod proposal;
pub mod solver;
pub mod transition;
pub mod tree;
pub mod collector;
pub mod daemon;
pub mod loaders;
pub mod trip_database;
pub mod stats;
pub mod worker;
pub mod replay;
pub mod portal;
pub mod bidder;
