// Wire decoding
pub mod conntrack;
pub mod netfilter;

// Tracking and ingestion
pub mod listen;
pub mod state;

// Configuration and reporting
pub mod config;
pub mod export;
