//! Test support: scripted providers, fixtures and a wired-up harness.

pub mod fixtures;
pub mod mocks;

pub use fixtures::{raw_payload, TestHarness};
pub use mocks::{
    ScriptedScraper, ScriptedSynthesizer, ScriptedTextAnalyzer, ScriptedVisualAnalyzer,
};
