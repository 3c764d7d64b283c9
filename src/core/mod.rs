//! Core Module
//!
//! Infraestrutura independente de hardware usada pelo resto da crate.

pub mod logging;
