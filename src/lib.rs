//! Stereo Parametric EQ Library
//!
//! Core library for the real-time stereo equalizer and its spectrum analyzer.

pub mod analyzer;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod persistence;
